//! Property-based tests for redistribution
//!
//! Random placements of a matrix on a 2 x 2 grid: moving data to another
//! layout and back must return every rank's buffer unchanged, and the
//! intermediate layout must hold every element with its original value.

#[cfg(test)]
mod tests {
    use crate::redistribute;
    use proptest::prelude::*;
    use tendist_comm::{Communicator, ThreadComm};
    use tendist_core::{gather_global, scatter_global, Distribution, Symmetry, TensorMapping, Topology};

    type Placement = ([Option<usize>; 2], [usize; 2]);

    fn placement() -> impl Strategy<Value = Placement> {
        let axes = prop::sample::select(vec![
            [None, None],
            [Some(0), None],
            [Some(1), None],
            [None, Some(0)],
            [None, Some(1)],
            [Some(0), Some(1)],
            [Some(1), Some(0)],
        ]);
        (axes, 1usize..3, 1usize..3).prop_map(|(axes, v0, v1)| (axes, [v0, v1]))
    }

    fn snapshot(topo: &Topology, edges: &[usize], place: &Placement, rank: usize) -> Distribution {
        let sym = [Symmetry::NonSymmetric; 2];
        let mut m = TensorMapping::new(edges, &sym, 0).unwrap();
        for d in 0..2 {
            if let Some(a) = place.0[d] {
                m.chains_mut().map_physical(d, a, topo.axes()[a].size).unwrap();
            }
            m.chains_mut().stretch_virtual(d, place.1[d]).unwrap();
        }
        m.set_padding();
        Distribution::from_mapping(&m, topo, rank).unwrap()
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(24))]

        #[test]
        fn prop_round_trip_preserves_content(
            rows in 1usize..7,
            cols in 1usize..7,
            from in placement(),
            to in placement(),
        ) {
            let edges = [rows, cols];
            let sym = [Symmetry::NonSymmetric; 2];
            let global: Vec<f64> = (0..rows * cols).map(|i| i as f64 + 1.0).collect();
            let results = ThreadComm::run(4, |comm| {
                let topo = Topology::new(&[2, 2]).unwrap();
                let old = snapshot(&topo, &edges, &from, comm.rank());
                let new = snapshot(&topo, &edges, &to, comm.rank());
                let start = scatter_global(&old, &sym, &global).unwrap();
                let mut there = vec![0.0; new.size];
                redistribute(&comm, &topo, &sym, &old, &start, 1.0, &new, &mut there, 0.0).unwrap();
                let mut back = vec![0.0; old.size];
                redistribute(&comm, &topo, &sym, &new, &there, 1.0, &old, &mut back, 0.0).unwrap();
                let mut view = vec![f64::NAN; global.len()];
                gather_global(&new, &sym, &there, &mut view).unwrap();
                (start, back, view)
            });

            for (start, back, _) in &results {
                prop_assert_eq!(start, back);
            }
            for (i, &want) in global.iter().enumerate() {
                let held: Vec<f64> = results.iter().map(|r| r.2[i]).filter(|v| !v.is_nan()).collect();
                prop_assert!(!held.is_empty(), "entry {} lost", i);
                prop_assert!(held.iter().all(|&v| v == want));
            }
        }
    }
}
