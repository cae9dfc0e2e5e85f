//! Processor-grid topologies
//!
//! A [`Topology`] is an ordered list of physical axes. Axis `i` has a process
//! count and a linear stride equal to the product of the counts of axes
//! `0..i`, so rank `r` has coordinate `(r / stride_i) % size_i` on axis `i`.
//! Topologies are immutable once built.
//!
//! # Examples
//!
//! ```
//! use tendist_core::Topology;
//!
//! let topo = Topology::new(&[2, 3]).unwrap();
//! assert_eq!(topo.num_procs(), 6);
//! assert_eq!(topo.coords(5), vec![1, 2]);
//! assert_eq!(topo.rank_of(&[1, 2]), 5);
//! ```

use crate::error::{Result, TendistError};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// One physical communicator axis of a processor grid
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GridAxis {
    /// Number of processes along the axis
    pub size: usize,
    /// Distance in global rank between neighbours along the axis
    pub stride: usize,
}

/// Multi-dimensional processor grid
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Topology {
    axes: Vec<GridAxis>,
}

impl Topology {
    /// Build a topology from its axis sizes.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` for an empty grid or a zero-sized axis.
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.is_empty() {
            return Err(TendistError::dimension_mismatch(
                "Topology::new",
                "grid must have at least one axis",
            ));
        }
        if let Some(pos) = dims.iter().position(|&d| d == 0) {
            return Err(TendistError::dimension_mismatch(
                "Topology::new",
                format!("axis {} has zero processes", pos),
            ));
        }

        let mut stride = 1;
        let axes = dims
            .iter()
            .map(|&size| {
                let axis = GridAxis { size, stride };
                stride *= size;
                axis
            })
            .collect();
        Ok(Self { axes })
    }

    /// Axes in order
    pub fn axes(&self) -> &[GridAxis] {
        &self.axes
    }

    /// Axis sizes in order
    pub fn dims(&self) -> Vec<usize> {
        self.axes.iter().map(|a| a.size).collect()
    }

    /// Number of axes
    pub fn order(&self) -> usize {
        self.axes.len()
    }

    /// Total number of processes in the grid
    pub fn num_procs(&self) -> usize {
        self.axes.iter().map(|a| a.size).product()
    }

    /// Coordinate of `rank` on every axis
    pub fn coords(&self, rank: usize) -> Vec<usize> {
        self.axes
            .iter()
            .map(|a| (rank / a.stride) % a.size)
            .collect()
    }

    /// Coordinate of `rank` on a single axis
    pub fn coord(&self, rank: usize, axis: usize) -> usize {
        let a = &self.axes[axis];
        (rank / a.stride) % a.size
    }

    /// Global rank for a full coordinate vector
    pub fn rank_of(&self, coords: &[usize]) -> usize {
        coords
            .iter()
            .zip(&self.axes)
            .map(|(&c, a)| c * a.stride)
            .sum()
    }

    /// Index of the axis with the given stride, ignoring unit axes
    pub fn axis_with_stride(&self, stride: usize) -> Option<usize> {
        self.axes
            .iter()
            .position(|a| a.stride == stride && a.size > 1)
    }

    /// The run of consecutive axes starting at `stride` whose sizes multiply
    /// to `count`.
    ///
    /// This is how a distribution dimension with processor stride `stride`
    /// and physical phase `count` is laid over the grid.
    pub fn axes_spanning(&self, stride: usize, count: usize) -> Option<Vec<usize>> {
        if count <= 1 {
            return Some(Vec::new());
        }
        let start = self.axis_with_stride(stride)?;
        let mut covered = 1;
        let mut run = Vec::new();
        for (i, axis) in self.axes.iter().enumerate().skip(start) {
            covered *= axis.size;
            run.push(i);
            if covered == count {
                return Some(run);
            }
            if covered > count {
                break;
            }
        }
        None
    }
}

impl fmt::Display for Topology {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = self.axes.iter().map(|a| a.size.to_string()).collect();
        write!(f, "[{}]", dims.join("x"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strides() {
        let topo = Topology::new(&[2, 3, 4]).unwrap();
        let strides: Vec<usize> = topo.axes().iter().map(|a| a.stride).collect();
        assert_eq!(strides, vec![1, 2, 6]);
        assert_eq!(topo.num_procs(), 24);
        assert_eq!(topo.to_string(), "[2x3x4]");
    }

    #[test]
    fn test_coords_roundtrip() {
        let topo = Topology::new(&[3, 2]).unwrap();
        for rank in 0..topo.num_procs() {
            assert_eq!(topo.rank_of(&topo.coords(rank)), rank);
        }
        assert_eq!(topo.coord(4, 0), 1);
        assert_eq!(topo.coord(4, 1), 1);
    }

    #[test]
    fn test_rejects_degenerate() {
        assert!(Topology::new(&[]).is_err());
        assert!(Topology::new(&[2, 0]).is_err());
    }

    #[test]
    fn test_axes_spanning() {
        let topo = Topology::new(&[2, 3, 2]).unwrap();
        assert_eq!(topo.axes_spanning(1, 6), Some(vec![0, 1]));
        assert_eq!(topo.axes_spanning(2, 3), Some(vec![1]));
        assert_eq!(topo.axes_spanning(2, 4), None);
        assert_eq!(topo.axes_spanning(7, 1), Some(vec![]));
    }
}
