//! # tendist - Distributed Tensor Contraction
//!
//! Contracts dense and symmetric tensors that are spread over a group of
//! processes. A contraction is planned once per call: every factorization
//! of the world into a processor grid is tried, each operand dimension is
//! mapped onto grid axes and local virtual blocks, the cheapest feasible
//! mapping is chosen by estimated time, and a tree of 2D SUMMA steps
//! executes it with block broadcasts and reductions.
//!
//! This is the **meta crate** that re-exports all tendist components.
//!
//! ## Quick Start
//!
//! ```
//! use tendist::prelude::*;
//!
//! // four ranks on threads, each planning and running the same matmul
//! let views = ThreadComm::run(4, |comm| {
//!     let mut session = Session::new(comm, PlannerConfig::default()).unwrap();
//!     let mut ctr = Contraction::from_einsum("ik,kj->ij", [&[6, 4], &[4, 6], &[6, 6]]).unwrap();
//!     let plan = plan_contraction(&mut session, &mut ctr).unwrap();
//!
//!     let ones = vec![1.0; 24];
//!     let a = scatter_global(plan.distribution(Role::A), plan.symmetry(Role::A), &ones).unwrap();
//!     let b = scatter_global(plan.distribution(Role::B), plan.symmetry(Role::B), &ones).unwrap();
//!     let mut c = vec![0.0; plan.local_len(Role::C)];
//!     plan.run(&a, &b, &mut c, 1.0, 0.0, &ReferenceKernel).unwrap();
//!
//!     let mut full = vec![0.0; 36];
//!     gather_global(plan.distribution(Role::C), plan.symmetry(Role::C), &c, &mut full).unwrap();
//!     full
//! });
//! // every entry of C is held by some rank and equals 4
//! let merged: Vec<f64> = (0..36).map(|i| views.iter().map(|v| v[i]).fold(0.0, f64::max)).collect();
//! assert!(merged.iter().all(|&x| x == 4.0));
//! ```
//!
//! ## Components
//!
//! ### Core Types ([`core`])
//!
//! Processor grids, per-tensor mapping chains, distribution snapshots and
//! the local block layout that every other crate agrees on.
//!
//! ```
//! use tendist::core::Topology;
//!
//! let grid = Topology::new(&[2, 3]).unwrap();
//! assert_eq!(grid.num_procs(), 6);
//! assert_eq!(grid.to_string(), "[2x3]");
//! ```
//!
//! ### Communication ([`comm`])
//!
//! The [`Communicator`](comm::Communicator) seam, an in-process
//! [`ThreadComm`](comm::ThreadComm) world, collective cost estimates and
//! tracing setup.
//!
//! ### Planning ([`planner`])
//!
//! Topology enumeration, the per-topology mapping search and the default
//! placement of standalone tensors.
//!
//! ```
//! use tendist::planner::TopologyRegistry;
//!
//! let registry = TopologyRegistry::enumerate(8, None, 3).unwrap();
//! assert!(registry.topologies().iter().all(|t| t.num_procs() == 8));
//! ```
//!
//! ### Execution ([`exec`])
//!
//! Contraction plans, the SUMMA step, local kernels, scratch arenas and
//! redistribution between layouts.
//!
//! ## Features
//!
//! - `serde`: serde derives on mapping and configuration types

#![deny(warnings)]

// Re-export all components
pub use tendist_comm as comm;
pub use tendist_core as core;
pub use tendist_exec as exec;
pub use tendist_planner as planner;

pub mod prelude {
    //! Prelude module for convenient imports
    //!
    //! # Example
    //!
    //! ```
    //! use tendist::prelude::*;
    //!
    //! let grid = Topology::new(&[4]).unwrap();
    //! assert_eq!(grid.order(), 1);
    //! ```

    // Core types
    pub use crate::core::{
        gather_global, scatter_global, Distribution, Element, Result, Symmetry, TendistError, TensorMapping,
        Topology,
    };

    // Communication
    pub use crate::comm::{init_tracing, CostModel, Communicator, ThreadComm, TracingConfig};

    // Planner
    pub use crate::planner::{default_mapping, map_tensors, Contraction, PlannerConfig, Role, Session};

    // Execution
    pub use crate::exec::{
        plan_contraction, redistribute, ContractionPlan, LocalKernel, ReferenceKernel, ScratchArena,
    };
}
