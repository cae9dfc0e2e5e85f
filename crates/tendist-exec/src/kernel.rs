//! Sequential contraction of one block triple
//!
//! The executor hands a [`LocalKernel`] one block of A, B and C at a time.
//! Blocks are dense column-major over the operand's own index order unless
//! marked packed.

use tendist_core::{scale_in_place, Element, Result, TendistError};
use tendist_planner::contraction::Role;
use tendist_planner::shape::LeafShape;

/// Shape of one block triple
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LocalSpec {
    /// Every index of the contraction, in first-appearance order
    pub labels: Vec<char>,
    /// Elements per block along each label
    pub block_edge: Vec<usize>,
    /// Position in `labels` of every dimension of A, B and C
    pub dims: [Vec<usize>; 3],
    pub block_size: [usize; 3],
    pub packed: [bool; 3],
}

impl LocalSpec {
    pub fn from_leaf(leaf: &LeafShape) -> Self {
        Self {
            labels: leaf.labels.clone(),
            block_edge: leaf.block_edge.clone(),
            dims: leaf.dims.clone(),
            block_size: leaf.block_size,
            packed: leaf.packed,
        }
    }

    /// Multiply-add flops of one block triple
    pub fn flops(&self) -> f64 {
        2.0 * self.block_edge.iter().map(|&e| e as f64).product::<f64>()
    }

    /// Column-major element stride of every label in `role`'s block, 0 where
    /// the operand lacks the label
    pub fn strides(&self, role: Role) -> Vec<usize> {
        let mut strides = vec![0; self.labels.len()];
        let mut stride = 1;
        for &l in &self.dims[role.index()] {
            strides[l] = stride;
            stride *= self.block_edge[l];
        }
        strides
    }

    fn check_block(&self, role: Role, len: usize) -> Result<()> {
        let expected = self.block_size[role.index()];
        if len != expected {
            return Err(TendistError::dimension_mismatch(
                "LocalKernel::contract",
                format!("block of {} has {} elements, expected {}", role, len, expected),
            ));
        }
        Ok(())
    }
}

/// Sequential contraction of one block triple: `c = beta * c + alpha * a . b`
pub trait LocalKernel<T: Element>: Sync {
    /// Reject shapes the kernel cannot handle, before any data moves
    fn validate(&self, _spec: &LocalSpec) -> Result<()> {
        Ok(())
    }

    fn contract(&self, spec: &LocalSpec, a: &[T], b: &[T], c: &mut [T], alpha: T, beta: T) -> Result<()>;

    /// Flops of one call, for reporting
    fn flops(&self, spec: &LocalSpec) -> f64 {
        spec.flops()
    }
}

/// Dense column-major kernel
///
/// Visits every combination of block indices, so it is only suitable for
/// tests and small problems.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReferenceKernel;

impl<T: Element> LocalKernel<T> for ReferenceKernel {
    fn validate(&self, spec: &LocalSpec) -> Result<()> {
        if let Some(role) = Role::ALL.into_iter().find(|r| spec.packed[r.index()]) {
            return Err(TendistError::protocol(format!(
                "reference kernel cannot contract symmetry-packed blocks of {}",
                role
            )));
        }
        Ok(())
    }

    fn contract(&self, spec: &LocalSpec, a: &[T], b: &[T], c: &mut [T], alpha: T, beta: T) -> Result<()> {
        spec.check_block(Role::A, a.len())?;
        spec.check_block(Role::B, b.len())?;
        spec.check_block(Role::C, c.len())?;
        scale_in_place(c, beta);
        if spec.block_edge.iter().any(|&e| e == 0) {
            return Ok(());
        }

        let strides = Role::ALL.map(|r| spec.strides(r));
        let n = spec.labels.len();
        let mut idx = vec![0usize; n];
        let mut off = [0usize; 3];
        loop {
            c[off[2]] += alpha * a[off[0]] * b[off[1]];

            // odometer over the labels, first fastest
            let mut l = 0;
            loop {
                if l == n {
                    return Ok(());
                }
                idx[l] += 1;
                for (o, s) in off.iter_mut().zip(&strides) {
                    *o += s[l];
                }
                if idx[l] < spec.block_edge[l] {
                    break;
                }
                for (o, s) in off.iter_mut().zip(&strides) {
                    *o -= s[l] * idx[l];
                }
                idx[l] = 0;
                l += 1;
            }
        }
    }
}
