//! Analytic cost model for collectives and local work
//!
//! Closed-form latency/bandwidth estimates used to rank topologies and
//! compare plans before any data moves. Nothing here communicates.
//!
//! # Model
//!
//! With `L = log2(group)`:
//!
//! - broadcast: `bytes * L * netbw + latency`
//! - all-reduce: `bytes * L * (2 * membw + flop + netbw) + latency`
//! - all-to-all: `chunk * group * L * netbw + 2 * L * latency`
//! - all-to-allv: `2 * total * L * netbw + 2 * L * latency`
//!
//! Every estimate is zero for a group of one process.

/// Machine constants of the cost model, in seconds
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostModel {
    /// Per-message latency
    pub latency: f64,
    /// Per-byte memory bandwidth cost
    pub membw: f64,
    /// Per-byte network bandwidth cost
    pub netbw: f64,
    /// Per-flop compute cost
    pub flop: f64,
}

impl Default for CostModel {
    fn default() -> Self {
        Self {
            latency: 1e-6,
            membw: 1e-9,
            netbw: 5e-10,
            flop: 2e-11,
        }
    }
}

fn log2_group(group: usize) -> f64 {
    (group as f64).log2()
}

impl CostModel {
    /// Time to broadcast `bytes` over `group` processes
    pub fn bcast_time(&self, bytes: usize, group: usize) -> f64 {
        if group <= 1 {
            return 0.0;
        }
        bytes as f64 * log2_group(group) * self.netbw + self.latency
    }

    /// Time to sum-reduce `bytes` over `group` processes, result everywhere
    pub fn allreduce_time(&self, bytes: usize, group: usize) -> f64 {
        if group <= 1 {
            return 0.0;
        }
        bytes as f64 * log2_group(group) * (2.0 * self.membw + self.flop + self.netbw)
            + self.latency
    }

    /// Time for a uniform all-to-all of `chunk` bytes per pair
    pub fn alltoall_time(&self, chunk: usize, group: usize) -> f64 {
        if group <= 1 {
            return 0.0;
        }
        let l = log2_group(group);
        chunk as f64 * group as f64 * l * self.netbw + 2.0 * l * self.latency
    }

    /// Time for an irregular all-to-all moving `total` bytes per process
    pub fn alltoallv_time(&self, total: usize, group: usize) -> f64 {
        if group <= 1 {
            return 0.0;
        }
        let l = log2_group(group);
        2.0 * total as f64 * l * self.netbw + 2.0 * l * self.latency
    }

    /// Time for `flops` floating-point operations
    pub fn flop_time(&self, flops: f64) -> f64 {
        flops * self.flop
    }

    /// Time to stream `bytes` through memory once
    pub fn memcpy_time(&self, bytes: usize) -> f64 {
        bytes as f64 * self.membw
    }
}

/// Broadcast estimate with the default machine constants
pub fn estimate_bcast_time(bytes: usize, group: usize) -> f64 {
    CostModel::default().bcast_time(bytes, group)
}

/// All-reduce estimate with the default machine constants
pub fn estimate_allreduce_time(bytes: usize, group: usize) -> f64 {
    CostModel::default().allreduce_time(bytes, group)
}

/// All-to-all estimate with the default machine constants
pub fn estimate_alltoall_time(chunk: usize, group: usize) -> f64 {
    CostModel::default().alltoall_time(chunk, group)
}

/// All-to-allv estimate with the default machine constants
pub fn estimate_alltoallv_time(total: usize, group: usize) -> f64 {
    CostModel::default().alltoallv_time(total, group)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn close(a: f64, b: f64) -> bool {
        (a - b).abs() < 1e-15
    }

    #[test]
    fn test_bcast_formula() {
        // 1 MB over 8 ranks: 1e6 * 3 * 5e-10 + 1e-6
        assert!(close(estimate_bcast_time(1_000_000, 8), 1.5e-3 + 1e-6));
        assert_eq!(estimate_bcast_time(1_000_000, 1), 0.0);
    }

    #[test]
    fn test_allreduce_costs_more_than_bcast() {
        let bytes = 4096;
        for group in [2, 4, 16] {
            assert!(estimate_allreduce_time(bytes, group) > estimate_bcast_time(bytes, group));
        }
        // 1000 bytes over 4: 1000 * 2 * (2e-9 + 2e-11 + 5e-10) + 1e-6
        assert!(close(estimate_allreduce_time(1000, 4), 5.04e-6 + 1e-6));
    }

    #[test]
    fn test_alltoall_formulas() {
        // 100 bytes per pair over 4: 100 * 4 * 2 * 5e-10 + 2 * 2 * 1e-6
        assert!(close(estimate_alltoall_time(100, 4), 4e-7 + 4e-6));
        // 800 bytes total over 4: 2 * 800 * 2 * 5e-10 + 4e-6
        assert!(close(estimate_alltoallv_time(800, 4), 1.6e-6 + 4e-6));
    }

    #[test]
    fn test_custom_constants() {
        let model = CostModel {
            latency: 0.0,
            netbw: 1.0,
            ..CostModel::default()
        };
        assert!(close(model.bcast_time(10, 4), 20.0));
        assert!(close(model.flop_time(1e6), 2e-5));
    }
}
