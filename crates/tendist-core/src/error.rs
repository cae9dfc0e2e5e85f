//! Error taxonomy shared by every tendist crate
//!
//! # Design
//!
//! - **`MappingInfeasible`**: no topology admits a valid mapping (symmetry
//!   ceiling exceeded, memory budget exceeded, candidates exhausted)
//! - **`AllocationFailure`**: a scratch request could not be satisfied
//! - **`DimensionMismatch`**: operand shapes or index correspondence are inconsistent
//! - **`ProtocolMisuse`**: a collective protocol was configured incorrectly
//!
//! Only `MappingInfeasible` is recoverable, and only inside the mapping engine
//! where the next topology candidate is tried.
//!
//! # Examples
//!
//! ```
//! use tendist_core::error::{Result, TendistError};
//!
//! fn check_order(expected: usize, actual: usize) -> Result<()> {
//!     if expected != actual {
//!         return Err(TendistError::dimension_mismatch(
//!             "check_order",
//!             format!("expected order {}, got {}", expected, actual),
//!         ));
//!     }
//!     Ok(())
//! }
//!
//! assert!(check_order(3, 3).is_ok());
//! assert!(!check_order(3, 2).unwrap_err().is_recoverable());
//! ```

use thiserror::Error;

/// Top-level error type for mapping, redistribution and contraction
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TendistError {
    /// No candidate topology admits a valid mapping
    #[error("Mapping infeasible: {reason}")]
    MappingInfeasible { reason: String },

    /// Scratch memory could not be reserved
    #[error("Allocation failure: requested {requested} elements, {available} available")]
    AllocationFailure { requested: usize, available: usize },

    /// Operand shapes or index correspondence are inconsistent
    #[error("Dimension mismatch in {operation}: {detail}")]
    DimensionMismatch { operation: String, detail: String },

    /// A collective protocol was configured incorrectly
    #[error("Protocol misuse: {0}")]
    ProtocolMisuse(String),

    /// The transport failed underneath a collective
    #[error("Transport error: {0}")]
    Transport(String),
}

impl TendistError {
    /// Create a mapping infeasibility error
    pub fn infeasible(reason: impl Into<String>) -> Self {
        TendistError::MappingInfeasible {
            reason: reason.into(),
        }
    }

    /// Create a dimension mismatch error
    pub fn dimension_mismatch(operation: impl Into<String>, detail: impl Into<String>) -> Self {
        TendistError::DimensionMismatch {
            operation: operation.into(),
            detail: detail.into(),
        }
    }

    /// Create a protocol misuse error
    pub fn protocol(detail: impl Into<String>) -> Self {
        TendistError::ProtocolMisuse(detail.into())
    }

    /// Whether a caller may retry with a different topology
    pub fn is_recoverable(&self) -> bool {
        matches!(self, TendistError::MappingInfeasible { .. })
    }
}

/// Result alias used throughout tendist
pub type Result<T> = std::result::Result<T, TendistError>;
