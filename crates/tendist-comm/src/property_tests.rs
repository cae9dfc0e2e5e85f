//! Property-based tests for communicator splitting
//!
//! A split must order the members of each color by key, ties broken by the
//! parent rank, and the resulting groups must run collectives independently.

#[cfg(test)]
mod tests {
    use crate::{Communicator, ThreadComm};
    use proptest::prelude::*;

    /// Expected (rank, size) of `rank` after splitting by `colors[r]`, `keys[r]`
    fn expected_position(colors: &[usize], keys: &[usize], rank: usize) -> (usize, usize) {
        let mut members: Vec<usize> = (0..colors.len())
            .filter(|&r| colors[r] == colors[rank])
            .collect();
        members.sort_by_key(|&r| (keys[r], r));
        let pos = members.iter().position(|&r| r == rank).unwrap_or(usize::MAX);
        (pos, members.len())
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(32))]

        #[test]
        fn prop_split_orders_by_key_then_rank(
            keys in prop::collection::vec(0usize..4, 1..7),
            ncolors in 1usize..4,
        ) {
            let colors: Vec<usize> = (0..keys.len()).map(|r| r % ncolors).collect();
            let results = ThreadComm::run(keys.len(), |world| {
                let rank = world.rank();
                let sub = world.split(colors[rank], keys[rank]).unwrap();
                let mut sum = [rank as f64];
                sub.all_reduce_sum(&mut sum).unwrap();
                (sub.rank(), sub.size(), sum[0])
            });
            for (rank, (sub_rank, sub_size, sum)) in results.into_iter().enumerate() {
                prop_assert_eq!((sub_rank, sub_size), expected_position(&colors, &keys, rank));
                let members: usize = (0..keys.len()).filter(|&r| colors[r] == colors[rank]).sum();
                prop_assert_eq!(sum, members as f64);
            }
        }
    }
}
