//! Element trait for distributed tensor data
//!
//! Any numeric type that is `Copy`, thread-safe and closed under the
//! assigning arithmetic operators can be distributed, redistributed and
//! contracted. `f32`, `f64`, the integer types and `Complex<f64>` all qualify.

use scirs2_core::numeric::NumAssign;
use std::fmt::Debug;

/// Scalar stored in a distributed tensor
pub trait Element: NumAssign + Copy + Send + Sync + Debug + 'static {}

impl<T> Element for T where T: NumAssign + Copy + Send + Sync + Debug + 'static {}

/// Scale `dst` by `beta`, treating a zero `beta` as an overwrite.
///
/// Overwriting avoids propagating NaN or stale values out of uninitialized
/// destination buffers.
pub fn scale_in_place<T: Element>(dst: &mut [T], beta: T) {
    if beta.is_zero() {
        dst.iter_mut().for_each(|x| *x = T::zero());
    } else if !beta.is_one() {
        dst.iter_mut().for_each(|x| *x *= beta);
    }
}

/// `dst = beta * dst + alpha * src`, element-wise
pub fn axpby<T: Element>(alpha: T, src: &[T], beta: T, dst: &mut [T]) {
    debug_assert_eq!(src.len(), dst.len());
    if beta.is_zero() {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = alpha * s;
        }
    } else {
        for (d, &s) in dst.iter_mut().zip(src) {
            *d = beta * *d + alpha * s;
        }
    }
}
