//! # tendist-exec
//!
//! Execution of distributed tensor contractions.
//!
//! This crate provides:
//! - [`ContractionPlan`]: the operator tree for one contraction, built from the
//!   mappings chosen by `tendist-planner`
//! - [`SummaStep`]: a generalized 2D SUMMA sweep over one stepping index, with
//!   chunk broadcasts, straddle coalescing and all-reduced outputs
//! - [`LocalKernel`] / [`ReferenceKernel`]: the sequential block contraction
//!   collaborator
//! - [`redistribute`]: content-preserving moves between distributions
//! - [`ScratchArena`]: stack-discipline scratch shared by nested plan levels
//!
//! # Example
//!
//! ```
//! use tendist_comm::ThreadComm;
//! use tendist_core::scatter_global;
//! use tendist_exec::{plan_contraction, ReferenceKernel};
//! use tendist_planner::{Contraction, PlannerConfig, Role, Session};
//!
//! let ok = ThreadComm::run(4, |comm| {
//!     let mut session = Session::new(comm, PlannerConfig::default()).unwrap();
//!     let mut ctr = Contraction::from_einsum("ik,kj->ij", [&[4, 4], &[4, 4], &[4, 4]]).unwrap();
//!     let plan = plan_contraction(&mut session, &mut ctr).unwrap();
//!
//!     let ones = vec![1.0; 16];
//!     let local = |role| scatter_global(plan.distribution(role), plan.symmetry(role), &ones).unwrap();
//!     let (a, b) = (local(Role::A), local(Role::B));
//!     let mut c = vec![0.0; plan.local_len(Role::C)];
//!     plan.run(&a, &b, &mut c, 1.0, 0.0, &ReferenceKernel).unwrap();
//!     // every entry of C is 4
//!     c.iter().all(|&x| x == 4.0)
//! });
//! assert!(ok.into_iter().all(|x| x));
//! ```

#![deny(warnings)]

pub mod kernel;
pub mod plan;
pub mod redistribute;
pub mod scratch;
pub mod strided;
pub mod summa;

#[cfg(test)]
mod property_tests;

// Re-exports
pub use kernel::*;
pub use plan::*;
pub use redistribute::*;
pub use scratch::*;
pub use summa::*;
