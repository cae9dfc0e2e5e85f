//! Ranking of feasible topologies

use std::cmp::Ordering;
use tendist_core::mapping::TensorMapping;

/// A topology on which all three operands could be mapped
#[derive(Debug, Clone)]
pub struct Candidate {
    pub topology: usize,
    /// Mappings of A, B and C
    pub mappings: [TensorMapping; 3],
    /// Estimated execution time in seconds
    pub est_time: f64,
    /// Estimated bytes per process: operands plus scratch
    pub memory: usize,
}

/// Outcome of a successful mapping search
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Selection {
    pub topology: usize,
    pub est_time: f64,
    pub memory: usize,
    /// Feasible topologies considered
    pub feasible: usize,
}

/// Sort `(topology id, estimated time)` pairs, fastest first.
///
/// Ties go to the lower topology id, so every rank picks the same topology.
pub fn rank_candidates(candidates: &mut [(usize, f64)]) {
    candidates.sort_by(|a, b| match a.1.total_cmp(&b.1) {
        Ordering::Equal => a.0.cmp(&b.0),
        other => other,
    });
}
