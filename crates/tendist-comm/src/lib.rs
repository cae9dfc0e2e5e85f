//! # tendist-comm
//!
//! Transport and cost layer for distributed tensor contraction.
//!
//! - [`Communicator`]: the collective interface (broadcast, all-reduce,
//!   all-to-allv, split, barrier, clock) every distributed operation runs on
//! - [`ThreadComm`]: an in-process implementation with one rank per thread
//! - [`cost`]: closed-form latency/bandwidth estimates for collectives
//! - [`tracing_support`]: subscriber setup for the workspace's `tracing` events
//!
//! # Features
//!
//! - `subscriber` (default): enables [`tracing_support::init_tracing`] via
//!   `tracing-subscriber`
//!
//! # Example
//!
//! ```
//! use tendist_comm::{Communicator, ThreadComm};
//!
//! let gathered = ThreadComm::run(3, |comm| comm.all_gather(comm.rank() * 2).unwrap());
//! assert_eq!(gathered[1], vec![0, 2, 4]);
//! ```

#![deny(warnings)]

pub mod communicator;
pub mod cost;
pub mod thread_comm;
pub mod tracing_support;

#[cfg(test)]
mod property_tests;

pub use communicator::{collective_status, CommStats, Communicator};
pub use cost::{
    estimate_allreduce_time, estimate_alltoall_time, estimate_alltoallv_time,
    estimate_bcast_time, CostModel,
};
pub use thread_comm::ThreadComm;
pub use tracing_support::{init_tracing, TracingConfig, TracingFormat};
