//! # tendist-planner
//!
//! Decides where the data of a distributed contraction lives.
//!
//! Given three operands of a contraction `C = alpha * A * B + beta * C` and a
//! world of processes, the planner enumerates candidate processor grids,
//! maps every tensor dimension onto grid axes and virtual blocks, and picks
//! the grid whose plan has the lowest estimated time.
//!
//! ## Features
//!
//! - **Topology Registry**: folds of the world's prime factorization (or a
//!   configured base grid) into 1-D to N-D grids
//! - **Mapping Engine**: greedy staged axis assignment, validity repair,
//!   phase matching and symmetry propagation under a virtualization ceiling
//! - **Cost Ranking**: closed-form latency/bandwidth estimates of the plan
//!   each candidate would run
//! - **Morphing**: moving mappings between grids that describe the same
//!   process groups
//!
//! ## Quick Start
//!
//! ```
//! use tendist_comm::ThreadComm;
//! use tendist_planner::{map_tensors, Contraction, PlannerConfig, Session};
//!
//! let topologies = ThreadComm::run(4, |comm| {
//!     let mut session = Session::new(comm, PlannerConfig::default()).unwrap();
//!     let mut ctr = Contraction::from_einsum("ik,kj->ij", [&[64, 64], &[64, 64], &[64, 64]]).unwrap();
//!     map_tensors(&mut session, &mut ctr).unwrap().topology
//! });
//! // every rank makes the same choice
//! assert!(topologies.iter().all(|&t| t == topologies[0]));
//! ```
//!
//! ## Configuration
//!
//! [`PlannerConfig`] carries the virtualization ceiling (`max_phase`,
//! default 2048), the symmetry round limit (20), the largest grid order (4),
//! an optional memory budget and an optional base grid. `from_env()` reads
//! `TENDIST_MAX_PHASE` and `TENDIST_MEMORY_LIMIT`.

#![deny(warnings)]

pub mod config;
pub mod contraction;
pub mod engine;
pub mod morph;
pub mod rank;
pub mod registry;
pub mod shape;
pub mod validate;

#[cfg(test)]
mod property_tests;

// Re-exports
pub use config::*;
pub use contraction::*;
pub use engine::*;
pub use morph::*;
pub use rank::*;
pub use registry::*;
pub use shape::*;
pub use validate::{check_mappings, AxisUse, Step};
