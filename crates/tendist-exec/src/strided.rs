//! Strided panel copies
//!
//! A panel is `rows` runs of `width` contiguous elements whose starts are
//! `ld` elements apart. Callers pass slices already offset to the first
//! element of the panel.

use tendist_core::Element;

/// Shape of a strided panel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Panel {
    pub rows: usize,
    pub width: usize,
}

impl Panel {
    pub fn new(rows: usize, width: usize) -> Self {
        Self { rows, width }
    }

    pub fn len(&self) -> usize {
        self.rows * self.width
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Copy a panel from rows `src_ld` apart into rows `dst_ld` apart
pub fn lda_cpy<T: Copy>(panel: Panel, src: &[T], src_ld: usize, dst: &mut [T], dst_ld: usize) {
    if panel.width == 0 {
        return;
    }
    for r in 0..panel.rows {
        let s = r * src_ld;
        let d = r * dst_ld;
        dst[d..d + panel.width].copy_from_slice(&src[s..s + panel.width]);
    }
}

/// `dst = beta * dst + alpha * src` over a panel
pub fn lda_axpby<T: Element>(
    panel: Panel,
    alpha: T,
    src: &[T],
    src_ld: usize,
    beta: T,
    dst: &mut [T],
    dst_ld: usize,
) {
    if panel.width == 0 {
        return;
    }
    for r in 0..panel.rows {
        let s = r * src_ld;
        let d = r * dst_ld;
        tendist_core::axpby(alpha, &src[s..s + panel.width], beta, &mut dst[d..d + panel.width]);
    }
}

/// Merge two packed panels into one, in place and back to front.
///
/// On entry `buf` holds `rows` rows of `head` elements, packed, and `aux`
/// holds `rows` rows of `tail` elements. On exit `buf` holds `rows` rows of
/// `head + tail` elements, each the head row followed by the tail row.
pub fn coalesce_bwd<T: Copy>(buf: &mut [T], aux: &[T], rows: usize, head: usize, tail: usize) {
    let width = head + tail;
    for r in (0..rows).rev() {
        buf.copy_within(r * head..(r + 1) * head, r * width);
        buf[r * width + head..(r + 1) * width].copy_from_slice(&aux[r * tail..(r + 1) * tail]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lda_cpy_gathers_columns() {
        // 3 rows of 4, take columns 1..3
        let src: Vec<i32> = (0..12).collect();
        let mut dst = vec![0; 6];
        lda_cpy(Panel::new(3, 2), &src[1..], 4, &mut dst, 2);
        assert_eq!(dst, vec![1, 2, 5, 6, 9, 10]);
    }

    #[test]
    fn test_lda_axpby_scatters_back() {
        let mut dst = vec![1.0; 8];
        let src = [1.0, 2.0, 3.0, 4.0];
        lda_axpby(Panel::new(2, 2), 2.0, &src, 2, 0.5, &mut dst[2..], 4);
        assert_eq!(dst, vec![1.0, 1.0, 2.5, 4.5, 1.0, 1.0, 6.5, 8.5]);
    }

    #[test]
    fn test_coalesce_bwd() {
        // rows of 2 head + 1 tail
        let mut buf = vec![1, 2, 4, 5, 7, 8, 0, 0, 0];
        let aux = [3, 6, 9];
        coalesce_bwd(&mut buf, &aux, 3, 2, 1);
        assert_eq!(buf, vec![1, 2, 3, 4, 5, 6, 7, 8, 9]);
    }

    #[test]
    fn test_coalesce_single_row() {
        let mut buf = vec![1, 0, 0];
        coalesce_bwd(&mut buf, &[2, 3], 1, 1, 2);
        assert_eq!(buf, vec![1, 2, 3]);
    }
}
