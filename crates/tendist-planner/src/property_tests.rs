//! Property-based tests for the planner
//!
//! Random contractions on random grids must always map onto an assignment
//! the executor can run, with consistent phases and symmetric pairs.

#[cfg(test)]
mod tests {
    use crate::{
        can_morph, check_mappings, map_on_topology, prime_factors, Contraction, Operand, PlanShape,
        PlannerConfig, TopologyRegistry,
    };
    use proptest::prelude::*;
    use tendist_comm::CostModel;
    use tendist_core::{Symmetry, Topology};

    fn grid_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(2usize..5, 1..=3)
    }

    proptest! {
        #[test]
        fn prop_mapping_is_executable(
            grid in grid_strategy(),
            i in 1usize..24,
            k in 1usize..24,
            j in 1usize..24,
        ) {
            let topo = Topology::new(&grid).unwrap();
            let ctr = Contraction::from_einsum("ik,kj->ij", [&[i, k], &[k, j], &[i, j]]).unwrap();
            let cand = map_on_topology(&topo, 0, &ctr, &PlannerConfig::default(), &CostModel::default()).unwrap();
            let [a, b, c] = &cand.mappings;

            prop_assert!(check_mappings(&topo, &ctr, [a, b, c]).is_ok());
            let shape = PlanShape::derive(&ctr, [a, b, c]).unwrap();
            for step in &shape.steps {
                prop_assert!(step.moving_count() <= 2);
                prop_assert_eq!(step.edge_len % step.db, 0);
            }
            prop_assert!(cand.est_time.is_finite());
        }

        #[test]
        fn prop_symmetric_pairs_share_phase(
            grid in grid_strategy(),
            n in 2usize..16,
            m in 1usize..16,
        ) {
            let topo = Topology::new(&grid).unwrap();
            let sym = [Symmetry::Symmetric, Symmetry::NonSymmetric];
            let ctr = Contraction::new(
                Operand::new(&[n, n], &sym, "ik"),
                Operand::dense(&[n, m], "kj"),
                Operand::dense(&[n, m], "ij"),
            ).unwrap();
            let config = PlannerConfig::default();
            if let Ok(cand) = map_on_topology(&topo, 0, &ctr, &config, &CostModel::default()) {
                for mapping in &cand.mappings {
                    prop_assert!(mapping.is_symmetry_consistent());
                    prop_assert!(mapping.phases().iter().all(|&p| p < config.max_phase));
                }
            }
        }

        #[test]
        fn prop_enumerated_grids_fold_the_base(n in 1usize..=64, max_order in 1usize..=4) {
            let registry = TopologyRegistry::enumerate(n, None, max_order).unwrap();
            let mut factors = prime_factors(n);
            if factors.is_empty() {
                factors.push(1);
            }
            let base = Topology::new(&factors).unwrap();
            for topo in registry.topologies() {
                prop_assert_eq!(topo.num_procs(), n);
                prop_assert!(topo.order() <= max_order);
                prop_assert!(can_morph(&base, topo));
            }
            prop_assert!(registry.topologies().iter().any(|t| t.order() == 1));
        }
    }
}
