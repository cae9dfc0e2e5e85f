//! Moving mappings between topologies
//!
//! Two grids of the same world describe the same processes when one is a
//! coarsening of the other. A physical chain starting at processor stride
//! `s` and covering `c` processes denotes the same rank groups on any grid
//! that has a run of consecutive axes starting at `s` whose sizes multiply to
//! `c`; [`morph_mapping`] re-expresses a mapping that way.

use tendist_core::mapping::{MappingChains, TensorMapping};
use tendist_core::{Result, TendistError, Topology};

/// Whether every axis of `change` is a product of consecutive axes of `keep`
pub fn can_morph(keep: &Topology, change: &Topology) -> bool {
    if keep.num_procs() != change.num_procs() {
        return false;
    }
    let mut fine = keep.axes().iter().map(|a| a.size).filter(|&s| s > 1);
    for coarse in change.axes().iter().map(|a| a.size).filter(|&s| s > 1) {
        let mut covered = 1;
        while covered < coarse {
            match fine.next() {
                Some(size) => covered *= size,
                None => return false,
            }
        }
        if covered != coarse {
            return false;
        }
    }
    fine.next().is_none()
}

/// Re-express `mapping` (on `from`) on topology `to` with id `to_id`.
///
/// Virtual factors are kept; each physical chain becomes the run of `to`'s
/// axes covering the same processes.
///
/// # Errors
///
/// `MappingInfeasible` if some chain has no counterpart on `to`.
pub fn morph_mapping(
    mapping: &TensorMapping,
    from: &Topology,
    to: &Topology,
    to_id: usize,
) -> Result<TensorMapping> {
    let old = mapping.chains();
    let mut chains = MappingChains::new(mapping.order());
    for d in 0..mapping.order() {
        let axes = old.physical_axes(d);
        if let Some(&first) = axes.first() {
            let stride = from.axes()[first].stride;
            let count = old.phys_phase(d);
            let run = to.axes_spanning(stride, count).ok_or_else(|| {
                TendistError::infeasible(format!(
                    "dimension {} (stride {}, {} processes) has no counterpart on {}",
                    d, stride, count, to
                ))
            })?;
            for a in run {
                chains.map_physical(d, a, to.axes()[a].size)?;
            }
        }
        chains.stretch_virtual(d, old.virt_phase(d))?;
    }
    let mut morphed = TensorMapping::new(mapping.edge_len(), mapping.symmetry(), to_id)?
        .with_cyclic(mapping.is_cyclic());
    morphed.remap(chains, to_id)?;
    Ok(morphed)
}

/// Axes of `topology` no mapping uses, largest first
pub fn extract_free_axes(topology: &Topology, mappings: &[&TensorMapping]) -> Vec<usize> {
    let mut free: Vec<usize> = (0..topology.order())
        .filter(|&a| topology.axes()[a].size > 1)
        .filter(|&a| !mappings.iter().any(|m| m.chains().uses_axis(a)))
        .collect();
    free.sort_by_key(|&a| std::cmp::Reverse(topology.axes()[a].size));
    free
}

/// Map still-unmapped dimensions of `mapping` onto axes from `free`.
///
/// Longest dimensions pick first and take the largest axis that does not
/// exceed their length. Used axes are removed from `free`. Returns the
/// number of dimensions mapped; padding is not recomputed.
pub fn map_remaining(mapping: &mut TensorMapping, topology: &Topology, free: &mut Vec<usize>) -> Result<usize> {
    let mut dims: Vec<usize> = (0..mapping.order())
        .filter(|&d| mapping.chains().phase(d) == 1)
        .collect();
    dims.sort_by_key(|&d| std::cmp::Reverse(mapping.edge_len()[d]));

    let mut mapped = 0;
    for d in dims {
        let edge = mapping.edge_len()[d];
        let Some(pos) = free.iter().position(|&a| topology.axes()[a].size <= edge) else {
            continue;
        };
        let axis = free.remove(pos);
        mapping
            .chains_mut()
            .map_physical(d, axis, topology.axes()[axis].size)?;
        mapped += 1;
    }
    Ok(mapped)
}
