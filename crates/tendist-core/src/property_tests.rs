//! Property-based tests for layouts and topologies
//!
//! These use proptest to check the bookkeeping invariants that every other
//! crate relies on: packed offsets are a bijection, padding makes every edge
//! a multiple of its phase, and every valid element has exactly one owner.

#[cfg(test)]
mod tests {
    use crate::layout::dense_linear;
    use crate::symmetry::{next_packed, packed_offset, packed_size, Symmetry};
    use crate::{Distribution, LocalLayout, TensorMapping, Topology};
    use proptest::prelude::*;

    fn grid_strategy() -> impl Strategy<Value = Vec<usize>> {
        prop::collection::vec(1usize..5, 1..=3)
    }

    proptest! {
        #[test]
        fn prop_topology_coords_roundtrip(dims in grid_strategy()) {
            let topo = Topology::new(&dims).unwrap();
            for rank in 0..topo.num_procs() {
                let coords = topo.coords(rank);
                prop_assert_eq!(topo.rank_of(&coords), rank);
                for (c, d) in coords.iter().zip(&dims) {
                    prop_assert!(c < d);
                }
            }
        }

        #[test]
        fn prop_packed_offsets_are_dense(edge in 1usize..6, group in 1usize..4, tail in 1usize..4) {
            let mut edges = vec![edge; group];
            edges.push(tail);
            let mut sym = vec![Symmetry::Symmetric; group - 1];
            sym.push(Symmetry::NonSymmetric);
            sym.push(Symmetry::NonSymmetric);

            let mut idx = vec![0; edges.len()];
            let mut expected = 0;
            loop {
                prop_assert_eq!(packed_offset(&edges, &sym, &idx), expected);
                expected += 1;
                if !next_packed(&edges, &sym, &mut idx) {
                    break;
                }
            }
            prop_assert_eq!(expected, packed_size(&edges, &sym));
        }

        #[test]
        fn prop_padding_aligns_to_phase(edge in 1usize..40, phys in 1usize..5, virt in 1usize..5) {
            let topo = Topology::new(&[phys]).unwrap();
            let mut m = TensorMapping::new(&[edge], &[Symmetry::NonSymmetric], 0).unwrap();
            if phys > 1 {
                m.chains_mut().map_physical(0, 0, phys).unwrap();
            }
            m.chains_mut().stretch_virtual(0, virt).unwrap();
            m.set_padding();

            let phase = phys * virt;
            prop_assert_eq!(m.padded_edge(0) % phase, 0);
            prop_assert!(m.padding()[0] < phase);

            // local padded extents add up to the padded global edge
            let total: usize = (0..topo.num_procs())
                .map(|r| Distribution::from_mapping(&m, &topo, r).unwrap().size)
                .sum();
            prop_assert_eq!(total, m.padded_edge(0));
        }

        #[test]
        fn prop_every_element_has_one_owner(e0 in 1usize..7, e1 in 1usize..7, p0 in 1usize..4, p1 in 1usize..4) {
            let topo = Topology::new(&[p0, p1]).unwrap();
            let sym = [Symmetry::NonSymmetric, Symmetry::NonSymmetric];
            let mut m = TensorMapping::new(&[e0, e1], &sym, 0).unwrap();
            if p0 > 1 {
                m.chains_mut().map_physical(1, 0, p0).unwrap();
            }
            if p1 > 1 {
                m.chains_mut().map_physical(0, 1, p1).unwrap();
            }
            m.set_padding();

            let mut hits = vec![0usize; e0 * e1];
            for rank in 0..topo.num_procs() {
                let dist = Distribution::from_mapping(&m, &topo, rank).unwrap();
                let layout = LocalLayout::new(&dist, &sym).unwrap();
                let owned_by_replica = topo.coords(rank).iter().enumerate().all(|(a, &c)| {
                    let used = (a == 0 && p0 > 1) || (a == 1 && p1 > 1);
                    used || c == 0
                });
                layout.for_each_slot(|_, g, valid| {
                    if valid && owned_by_replica {
                        hits[dense_linear(&[e0, e1], g)] += 1;
                    }
                });
            }
            prop_assert!(hits.iter().all(|&h| h == 1));
        }
    }
}
