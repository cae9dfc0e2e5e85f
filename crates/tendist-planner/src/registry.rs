//! Candidate processor grids and the planning session
//!
//! [`TopologyRegistry::enumerate`] folds a base grid (the prime
//! factorization of the world size unless one is configured) into every grid
//! obtainable by merging adjacent axes. The mapping engine tries each of
//! them.
//!
//! A [`Session`] is the explicit context of all distributed planning: the
//! world communicator, the candidate topologies, the sub-communicators of
//! grid axes (created collectively on first use) and the outcome of the most
//! recent topology search.
//!
//! # Example
//!
//! ```
//! use tendist_planner::registry::TopologyRegistry;
//!
//! let registry = TopologyRegistry::enumerate(12, None, 4).unwrap();
//! let grids: Vec<Vec<usize>> = registry.topologies().iter().map(|t| t.dims()).collect();
//! assert_eq!(grids[0], vec![3, 2, 2]);
//! assert!(grids.contains(&vec![6, 2]));
//! assert!(grids.contains(&vec![12]));
//! ```

use crate::config::PlannerConfig;
use std::collections::HashMap;
use tendist_comm::{Communicator, CostModel};
use tendist_core::{Result, TendistError, Topology};

/// Prime factors of `n`, largest first
pub fn prime_factors(mut n: usize) -> Vec<usize> {
    let mut factors = Vec::new();
    let mut p = 2;
    while p * p <= n {
        while n % p == 0 {
            factors.push(p);
            n /= p;
        }
        p += 1;
    }
    if n > 1 {
        factors.push(n);
    }
    factors.reverse();
    factors
}

/// Every grid obtained by merging runs of adjacent axes of `base`,
/// starting with `base` itself and ending with the 1-D grid.
fn folds(base: &[usize]) -> Vec<Vec<usize>> {
    if base.is_empty() {
        return vec![vec![1]];
    }
    let cuts = base.len() - 1;
    let mut grids = Vec::with_capacity(1 << cuts);
    for mask in (0..1usize << cuts).rev() {
        let mut grid = Vec::new();
        let mut acc = base[0];
        for (i, &size) in base.iter().enumerate().skip(1) {
            if mask & (1 << (i - 1)) != 0 {
                grid.push(acc);
                acc = size;
            } else {
                acc *= size;
            }
        }
        grid.push(acc);
        grids.push(grid);
    }
    grids
}

/// Candidate topologies of a world, indexed by topology id
#[derive(Debug, Clone)]
pub struct TopologyRegistry {
    topologies: Vec<Topology>,
}

impl TopologyRegistry {
    /// Enumerate candidate grids for `num_procs` processes.
    ///
    /// Axes of size 1 are dropped, duplicates removed and grids with more
    /// than `max_order` axes skipped. The 1-D grid is always present.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `base_grid` does not multiply to `num_procs`.
    pub fn enumerate(num_procs: usize, base_grid: Option<&[usize]>, max_order: usize) -> Result<Self> {
        if num_procs == 0 {
            return Err(TendistError::dimension_mismatch(
                "TopologyRegistry::enumerate",
                "empty world",
            ));
        }
        let base: Vec<usize> = match base_grid {
            Some(dims) => {
                if dims.iter().product::<usize>() != num_procs || dims.contains(&0) {
                    return Err(TendistError::dimension_mismatch(
                        "TopologyRegistry::enumerate",
                        format!("base grid {:?} does not hold {} processes", dims, num_procs),
                    ));
                }
                dims.iter().copied().filter(|&d| d > 1).collect()
            }
            None => prime_factors(num_procs),
        };

        let mut grids: Vec<Vec<usize>> = Vec::new();
        for grid in folds(&base) {
            let grid: Vec<usize> = grid.into_iter().filter(|&d| d > 1).collect();
            let grid = if grid.is_empty() { vec![1] } else { grid };
            if grid.len() <= max_order.max(1) && !grids.contains(&grid) {
                grids.push(grid);
            }
        }

        let topologies = grids
            .iter()
            .map(|dims| Topology::new(dims))
            .collect::<Result<Vec<_>>>()?;
        tracing::debug!(
            num_procs,
            candidates = topologies.len(),
            base = ?base,
            "enumerated topologies"
        );
        Ok(Self { topologies })
    }

    pub fn topologies(&self) -> &[Topology] {
        &self.topologies
    }

    /// Topology by id
    pub fn get(&self, id: usize) -> Result<&Topology> {
        self.topologies.get(id).ok_or_else(|| {
            TendistError::protocol(format!(
                "topology {} is not one of the {} candidates",
                id,
                self.topologies.len()
            ))
        })
    }

    pub fn len(&self) -> usize {
        self.topologies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.topologies.is_empty()
    }
}

/// A topology the mapping engine could not use, with the reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Rejection {
    pub topology: usize,
    pub reason: String,
}

/// Planning context of one process
pub struct Session<C: Communicator> {
    comm: C,
    registry: TopologyRegistry,
    group_comms: HashMap<(usize, Vec<usize>), C>,
    rejected: Vec<Rejection>,
    config: PlannerConfig,
    cost: CostModel,
}

impl<C: Communicator> Session<C> {
    /// Enumerate the candidate topologies of `comm`'s world
    pub fn new(comm: C, config: PlannerConfig) -> Result<Self> {
        let registry = TopologyRegistry::enumerate(
            comm.size(),
            config.base_grid.as_deref(),
            config.max_topology_order,
        )?;
        Ok(Self {
            comm,
            registry,
            group_comms: HashMap::new(),
            rejected: Vec::new(),
            config,
            cost: CostModel::default(),
        })
    }

    /// Replace the machine constants used to rank candidates
    pub fn with_cost_model(mut self, cost: CostModel) -> Self {
        self.cost = cost;
        self
    }

    /// World communicator
    pub fn comm(&self) -> &C {
        &self.comm
    }

    pub fn registry(&self) -> &TopologyRegistry {
        &self.registry
    }

    pub fn topologies(&self) -> &[Topology] {
        self.registry.topologies()
    }

    pub fn topology(&self, id: usize) -> Result<&Topology> {
        self.registry.get(id)
    }

    pub fn config(&self) -> &PlannerConfig {
        &self.config
    }

    pub fn cost_model(&self) -> &CostModel {
        &self.cost
    }

    /// Topologies rejected by the most recent mapping call
    pub fn rejected(&self) -> &[Rejection] {
        &self.rejected
    }

    pub(crate) fn set_rejected(&mut self, rejected: Vec<Rejection>) {
        self.rejected = rejected;
    }

    /// Communicator over the processes that differ only in their
    /// coordinates along `axes` of topology `topology`.
    ///
    /// Ranks are ordered by the combined coordinate, first axis fastest.
    /// Collective on first use for a given `(topology, axes)`; every rank
    /// must request the same groups in the same order.
    pub fn group_comm(&mut self, topology: usize, axes: &[usize]) -> Result<C> {
        let key = (topology, axes.to_vec());
        if let Some(comm) = self.group_comms.get(&key) {
            return Ok(comm.clone());
        }

        let topo = self.registry.get(topology)?;
        let rank = self.comm.rank();
        let mut coords = topo.coords(rank);
        let mut position = 0;
        let mut radix = 1;
        for &a in axes {
            let axis = topo.axes().get(a).ok_or_else(|| {
                TendistError::protocol(format!("axis {} outside topology {}", a, topo))
            })?;
            position += coords[a] * radix;
            radix *= axis.size;
            coords[a] = 0;
        }
        let color = topo.rank_of(&coords);

        let group = self.comm.split(color, position)?;
        tracing::trace!(topology, axes = ?axes, size = group.size(), "created group communicator");
        self.group_comms.insert(key, group.clone());
        Ok(group)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tendist_comm::ThreadComm;

    fn dims_of(registry: &TopologyRegistry) -> Vec<Vec<usize>> {
        registry.topologies().iter().map(|t| t.dims()).collect()
    }

    #[test]
    fn test_prime_factors() {
        assert_eq!(prime_factors(12), vec![3, 2, 2]);
        assert_eq!(prime_factors(7), vec![7]);
        assert_eq!(prime_factors(1), Vec::<usize>::new());
        assert_eq!(prime_factors(36), vec![3, 3, 2, 2]);
    }

    #[test]
    fn test_enumerate_folds_and_dedupes() {
        let registry = TopologyRegistry::enumerate(8, None, 4).unwrap();
        // [2,2,2], [2,4], [4,2], [8]
        assert_eq!(
            dims_of(&registry),
            vec![vec![2, 2, 2], vec![4, 2], vec![2, 4], vec![8]]
        );
    }

    #[test]
    fn test_enumerate_respects_max_order() {
        let registry = TopologyRegistry::enumerate(8, None, 2).unwrap();
        assert!(dims_of(&registry).iter().all(|g| g.len() <= 2));
        assert!(dims_of(&registry).contains(&vec![8]));
    }

    #[test]
    fn test_enumerate_base_grid() {
        let registry = TopologyRegistry::enumerate(6, Some(&[2, 1, 3]), 4).unwrap();
        assert_eq!(dims_of(&registry), vec![vec![2, 3], vec![6]]);

        let err = TopologyRegistry::enumerate(6, Some(&[2, 2]), 4).unwrap_err();
        assert!(matches!(err, TendistError::DimensionMismatch { .. }));
    }

    #[test]
    fn test_single_process() {
        let registry = TopologyRegistry::enumerate(1, None, 4).unwrap();
        assert_eq!(dims_of(&registry), vec![vec![1]]);
        assert!(registry.get(1).is_err());
    }

    #[test]
    fn test_group_comm_rows_and_columns() {
        let sums = ThreadComm::run(6, |comm| {
            let config = PlannerConfig::default().with_base_grid(vec![3, 2]);
            let mut session = Session::new(comm.clone(), config).unwrap();
            assert_eq!(session.topology(0).unwrap().dims(), vec![3, 2]);

            let along_x = session.group_comm(0, &[0]).unwrap();
            let along_y = session.group_comm(0, &[1]).unwrap();
            // cached: no second split
            let again = session.group_comm(0, &[0]).unwrap();
            assert_eq!(again.rank(), along_x.rank());

            let mut v = [comm.rank() as u64];
            along_x.all_reduce_sum(&mut v).unwrap();
            (along_x.size(), along_x.rank(), along_y.size(), v[0])
        });
        // x groups: {0,1,2} and {3,4,5}
        assert_eq!(sums[4], (3, 1, 2, 12));
        assert_eq!(sums[0], (3, 0, 2, 3));
    }
}
