//! Planner configuration
//!
//! [`PlannerConfig`] bounds the mapping search: the virtualization ceiling,
//! the number of symmetry propagation rounds, the largest grid order that is
//! enumerated and an optional per-process memory budget.
//!
//! # Environment Variables
//!
//! - `TENDIST_MAX_PHASE`: overrides [`PlannerConfig::max_phase`]
//! - `TENDIST_MEMORY_LIMIT`: per-process budget in bytes

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Default virtualization ceiling
pub const DEFAULT_MAX_PHASE: usize = 2048;

/// Default bound on symmetry propagation rounds
pub const DEFAULT_MAX_SYMMETRY_ROUNDS: usize = 20;

/// Default bound on the number of grid axes
pub const DEFAULT_MAX_TOPOLOGY_ORDER: usize = 4;

/// Knobs of the mapping engine
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct PlannerConfig {
    /// A topology is rejected once any index phase reaches this value
    pub max_phase: usize,
    /// A topology is rejected if symmetric phases do not settle within this many rounds
    pub max_symmetry_rounds: usize,
    /// Grids with more axes are not enumerated
    pub max_topology_order: usize,
    /// Per-process memory budget in bytes, None = unlimited
    pub memory_limit: Option<usize>,
    /// Grid to fold candidates from; the prime factorization of the world size if None
    pub base_grid: Option<Vec<usize>>,
}

impl Default for PlannerConfig {
    fn default() -> Self {
        Self {
            max_phase: DEFAULT_MAX_PHASE,
            max_symmetry_rounds: DEFAULT_MAX_SYMMETRY_ROUNDS,
            max_topology_order: DEFAULT_MAX_TOPOLOGY_ORDER,
            memory_limit: None,
            base_grid: None,
        }
    }
}

impl PlannerConfig {
    /// Defaults overridden by `TENDIST_MAX_PHASE` and `TENDIST_MEMORY_LIMIT`.
    ///
    /// Unparseable values are ignored with a warning.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Some(v) = read_env("TENDIST_MAX_PHASE") {
            config.max_phase = v;
        }
        if let Some(v) = read_env("TENDIST_MEMORY_LIMIT") {
            config.memory_limit = Some(v);
        }
        config
    }

    pub fn with_max_phase(mut self, max_phase: usize) -> Self {
        self.max_phase = max_phase;
        self
    }

    pub fn with_max_symmetry_rounds(mut self, rounds: usize) -> Self {
        self.max_symmetry_rounds = rounds;
        self
    }

    pub fn with_max_topology_order(mut self, order: usize) -> Self {
        self.max_topology_order = order;
        self
    }

    /// Per-process memory budget in bytes
    pub fn with_memory_limit(mut self, bytes: usize) -> Self {
        self.memory_limit = Some(bytes);
        self
    }

    /// Fold candidate grids from `dims` instead of the prime factorization
    pub fn with_base_grid(mut self, dims: Vec<usize>) -> Self {
        self.base_grid = Some(dims);
        self
    }
}

fn read_env(name: &str) -> Option<usize> {
    let raw = std::env::var(name).ok()?;
    match raw.trim().parse::<usize>() {
        Ok(v) => Some(v),
        Err(_) => {
            tracing::warn!(variable = name, value = %raw, "ignoring unparseable planner setting");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = PlannerConfig::default();
        assert_eq!(config.max_phase, 2048);
        assert_eq!(config.max_symmetry_rounds, 20);
        assert_eq!(config.max_topology_order, 4);
        assert!(config.memory_limit.is_none());
        assert!(config.base_grid.is_none());
    }

    #[test]
    fn test_builders() {
        let config = PlannerConfig::default()
            .with_max_phase(64)
            .with_max_symmetry_rounds(3)
            .with_max_topology_order(2)
            .with_memory_limit(1 << 20)
            .with_base_grid(vec![2, 2]);
        assert_eq!(config.max_phase, 64);
        assert_eq!(config.max_symmetry_rounds, 3);
        assert_eq!(config.max_topology_order, 2);
        assert_eq!(config.memory_limit, Some(1 << 20));
        assert_eq!(config.base_grid, Some(vec![2, 2]));
    }
}
