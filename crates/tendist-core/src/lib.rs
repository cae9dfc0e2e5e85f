//! # tendist-core
//!
//! Core data model for distributed tensor contraction.
//!
//! This crate provides:
//! - [`Topology`]: immutable processor grids with per-axis strides
//! - [`MappingChains`] / [`TensorMapping`]: arena-backed descriptor chains assigning
//!   each tensor dimension to physical grid axes and virtual blocks
//! - [`Distribution`]: per-rank snapshot of a mapping with a fixed wire form
//! - [`LocalLayout`]: the process-local storage order, including symmetry packing
//! - [`TendistError`]: the error taxonomy shared by the workspace
//!
//! # Features
//!
//! - `serde`: `Serialize`/`Deserialize` for topologies, mappings and distributions
//!
//! # Example
//!
//! ```
//! use tendist_core::{Distribution, Symmetry, TensorMapping, Topology};
//!
//! let topo = Topology::new(&[2, 2]).unwrap();
//! let mut mapping = TensorMapping::new(&[8, 6], &[Symmetry::NonSymmetric; 2], 0).unwrap();
//! mapping.chains_mut().map_physical(0, 0, 2).unwrap();
//! mapping.chains_mut().map_physical(1, 1, 2).unwrap();
//! mapping.set_padding();
//!
//! let dist = Distribution::from_mapping(&mapping, &topo, 3).unwrap();
//! assert_eq!(dist.perank, vec![1, 1]);
//! assert_eq!(dist.size, 4 * 3);
//! ```

#![deny(warnings)]

pub mod distribution;
pub mod element;
pub mod error;
pub mod layout;
pub mod mapping;
pub mod symmetry;
pub mod topology;

#[cfg(test)]
mod property_tests;

pub use distribution::Distribution;
pub use element::{axpby, scale_in_place, Element};
pub use error::{Result, TendistError};
pub use layout::{dense_linear, gather_global, scatter_global, LocalLayout, SlotLocation};
pub use mapping::{MapNode, MappingChains, NodeId, TensorMapping};
pub use symmetry::Symmetry;
pub use topology::{GridAxis, Topology};
