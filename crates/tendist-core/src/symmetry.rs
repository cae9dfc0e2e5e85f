//! Tensor symmetry and symmetry-packed storage
//!
//! Symmetry is described per dimension: entry `i` relates dimension `i` to
//! dimension `i + 1`. Consecutive related dimensions form a *group*. Inside a
//! group only index tuples with `o_i <= o_{i+1}` are stored, in an order
//! where the first dimension varies fastest. Groups themselves are laid out
//! as a mixed radix, first group fastest.
//!
//! The packed offset of a sorted tuple `o_0 <= o_1 <= ... <= o_{s-1}` is
//! `sum_t C(o_t + t, t + 1)`, the multiset combinatorial number system.
//!
//! # Examples
//!
//! ```
//! use tendist_core::symmetry::{packed_offset, packed_size, Symmetry};
//!
//! let sym = [Symmetry::Symmetric, Symmetry::NonSymmetric];
//! // 4x4 symmetric matrix keeps the 10 entries of its upper triangle
//! assert_eq!(packed_size(&[4, 4], &sym), 10);
//! assert_eq!(packed_offset(&[4, 4], &sym, &[1, 2]), 4);
//! ```

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::ops::Range;

/// Relation between a dimension and its successor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Symmetry {
    /// No relation
    #[default]
    NonSymmetric,
    /// `T[..i..j..] == T[..j..i..]`
    Symmetric,
    /// `T[..i..j..] == -T[..j..i..]`, zero diagonal
    Antisymmetric,
    /// Symmetric with a zero diagonal
    SymmetricHollow,
}

impl Symmetry {
    /// Whether the dimension is tied to its successor
    pub fn is_linked(self) -> bool {
        self != Symmetry::NonSymmetric
    }

    /// Whether equal indices are excluded from the canonical set
    pub fn is_strict(self) -> bool {
        matches!(self, Symmetry::Antisymmetric | Symmetry::SymmetricHollow)
    }
}

/// Binomial coefficient `C(n, k)`
pub fn binomial(n: usize, k: usize) -> usize {
    if k > n {
        return 0;
    }
    let k = k.min(n - k);
    let mut acc: usize = 1;
    for i in 0..k {
        acc = acc * (n - i) / (i + 1);
    }
    acc
}

/// Maximal runs of linked dimensions, including singleton runs
pub fn symmetry_groups(sym: &[Symmetry]) -> Vec<Range<usize>> {
    let mut groups = Vec::new();
    let mut start = 0;
    for d in 0..sym.len() {
        let linked = d + 1 < sym.len() && sym[d].is_linked();
        if !linked {
            groups.push(start..d + 1);
            start = d + 1;
        }
    }
    groups
}

/// Every pair of dimensions that must share a phase
pub fn symmetry_table(sym: &[Symmetry]) -> Vec<(usize, usize)> {
    let mut pairs = Vec::new();
    for group in symmetry_groups(sym) {
        for i in group.clone() {
            for j in (i + 1)..group.end {
                pairs.push((i, j));
            }
        }
    }
    pairs
}

/// Whether a global index tuple satisfies the canonical ordering constraint
pub fn is_canonical(sym: &[Symmetry], idx: &[usize]) -> bool {
    for d in 0..idx.len().saturating_sub(1) {
        match sym.get(d).copied().unwrap_or_default() {
            Symmetry::NonSymmetric => {}
            Symmetry::Symmetric => {
                if idx[d] > idx[d + 1] {
                    return false;
                }
            }
            Symmetry::Antisymmetric | Symmetry::SymmetricHollow => {
                if idx[d] >= idx[d + 1] {
                    return false;
                }
            }
        }
    }
    true
}

/// Number of stored elements of a packed block with the given edges
pub fn packed_size(edge: &[usize], sym: &[Symmetry]) -> usize {
    symmetry_groups(sym)
        .into_iter()
        .map(|g| {
            let len = g.len();
            binomial(edge[g.start] + len - 1, len)
        })
        .product()
}

/// Linear offset of a (non-decreasing within groups) tuple in packed storage
pub fn packed_offset(edge: &[usize], sym: &[Symmetry], idx: &[usize]) -> usize {
    let mut offset = 0;
    let mut radix = 1;
    for g in symmetry_groups(sym) {
        let len = g.len();
        let within: usize = g
            .clone()
            .enumerate()
            .map(|(t, d)| binomial(idx[d] + t, t + 1))
            .sum();
        offset += within * radix;
        radix *= binomial(edge[g.start] + len - 1, len);
    }
    offset
}

/// Advance `idx` to the next tuple in packed storage order.
///
/// Returns `false` once every tuple has been visited; `idx` is then reset to
/// all zeros.
pub fn next_packed(edge: &[usize], sym: &[Symmetry], idx: &mut [usize]) -> bool {
    let n = idx.len();
    for d in 0..n {
        let bound = if d + 1 < n && sym[d].is_linked() {
            idx[d + 1]
        } else {
            edge[d].saturating_sub(1)
        };
        if idx[d] < bound {
            idx[d] += 1;
            return true;
        }
        idx[d] = 0;
    }
    false
}

/// Advance `idx` through a dense column-major box.
pub fn next_dense(edge: &[usize], idx: &mut [usize]) -> bool {
    for d in 0..idx.len() {
        if idx[d] + 1 < edge[d] {
            idx[d] += 1;
            return true;
        }
        idx[d] = 0;
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use Symmetry::*;

    #[test]
    fn test_binomial() {
        assert_eq!(binomial(5, 2), 10);
        assert_eq!(binomial(4, 0), 1);
        assert_eq!(binomial(2, 3), 0);
    }

    #[test]
    fn test_groups_and_table() {
        let sym = [Symmetric, Symmetric, NonSymmetric, NonSymmetric];
        assert_eq!(symmetry_groups(&sym), vec![0..3, 3..4]);
        assert_eq!(symmetry_table(&sym), vec![(0, 1), (0, 2), (1, 2)]);
    }

    #[test]
    fn test_canonical() {
        let sy = [Symmetric, NonSymmetric];
        assert!(is_canonical(&sy, &[1, 1]));
        assert!(!is_canonical(&sy, &[2, 1]));

        let asym = [Antisymmetric, NonSymmetric];
        assert!(!is_canonical(&asym, &[1, 1]));
        assert!(is_canonical(&asym, &[0, 1]));
    }

    #[test]
    fn test_packed_order_matches_offsets() {
        let edge = [3, 3, 3, 2];
        let sym = [Symmetric, Symmetric, NonSymmetric, NonSymmetric];
        let mut idx = vec![0; 4];
        let mut count = 0;
        loop {
            assert_eq!(packed_offset(&edge, &sym, &idx), count);
            count += 1;
            if !next_packed(&edge, &sym, &mut idx) {
                break;
            }
        }
        // C(5,3) sorted triples of {0,1,2} times 2
        assert_eq!(count, packed_size(&edge, &sym));
        assert_eq!(count, 20);
    }

    #[test]
    fn test_dense_iteration() {
        let mut idx = vec![0, 0];
        let mut seen = vec![idx.clone()];
        while next_dense(&[2, 2], &mut idx) {
            seen.push(idx.clone());
        }
        assert_eq!(seen, vec![vec![0, 0], vec![1, 0], vec![0, 1], vec![1, 1]]);
    }
}
