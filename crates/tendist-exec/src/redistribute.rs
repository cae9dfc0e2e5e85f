//! Moving tensor data between distributions
//!
//! Content-preserving: every valid global element of the old layout lands,
//! scaled by `alpha`, on every rank that stores it under the new layout,
//! which first scales its buffer by `beta`. Padding and non-canonical slots
//! of symmetric tensors never travel.

use tendist_comm::{collective_status, estimate_alltoall_time, estimate_alltoallv_time, Communicator};
use tendist_core::{scale_in_place, Distribution, Element, LocalLayout, Result, Symmetry, TendistError, Topology};

/// How a grid axis relates to the two layouts
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum AxisRoute {
    /// Both layouts replicate along the axis: keep the sender's coordinate
    Own,
    /// Only the old layout splits along the axis: every coordinate needs it
    FanOut,
    /// The new layout splits along the axis
    Required { dim: usize, radix: usize, replicated_before: bool },
}

/// Summary of one redistribution on this rank
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RedistStats {
    /// Whether the local fast path was taken
    pub local_only: bool,
    /// Elements this rank sent, counted once per destination
    pub sent: usize,
    /// Elements this rank received
    pub received: usize,
}

fn grid_axes(topology: &Topology, dist: &Distribution, dim: usize) -> Result<Vec<usize>> {
    topology
        .axes_spanning(dist.pe_lda[dim], dist.phys_phase(dim))
        .ok_or_else(|| {
            TendistError::protocol(format!(
                "dimension {} (stride {}, {} processes) does not fit topology {}",
                dim,
                dist.pe_lda[dim],
                dist.phys_phase(dim),
                topology
            ))
        })
}

/// Per-axis routes from `old` to `new`
fn plan_routes(topology: &Topology, old: &Distribution, new: &Distribution) -> Result<Vec<AxisRoute>> {
    let mut old_mapped = vec![false; topology.order()];
    let mut routes = vec![AxisRoute::Own; topology.order()];
    for d in 0..old.order {
        for a in grid_axes(topology, old, d)? {
            old_mapped[a] = true;
            routes[a] = AxisRoute::FanOut;
        }
    }
    for d in 0..new.order {
        let mut radix = 1;
        for a in grid_axes(topology, new, d)? {
            routes[a] = AxisRoute::Required {
                dim: d,
                radix,
                replicated_before: !old_mapped[a],
            };
            radix *= topology.axes()[a].size;
        }
    }
    Ok(routes)
}

/// Modelled time of the exchange, uniform when every destination gets the
/// same number of elements
fn exchange_time(counts: &[usize], elem_bytes: usize) -> f64 {
    let group = counts.len();
    match counts.first() {
        Some(&first) if counts.iter().all(|&n| n == first) => estimate_alltoall_time(first * elem_bytes, group),
        _ => estimate_alltoallv_time(counts.iter().sum::<usize>() * elem_bytes, group),
    }
}

fn check_compatible<T>(
    comm_size: usize,
    topology: &Topology,
    sym: &[Symmetry],
    old: (&Distribution, &[T]),
    new: (&Distribution, &[T]),
) -> Result<()> {
    let mismatch = |detail: String| TendistError::dimension_mismatch("redistribute", detail);
    if comm_size != topology.num_procs() {
        return Err(mismatch(format!(
            "{} ranks for topology {} of {} processes",
            comm_size,
            topology,
            topology.num_procs()
        )));
    }
    let (old_dist, old_data) = old;
    let (new_dist, new_data) = new;
    if old_dist.order != new_dist.order || sym.len() != old_dist.order {
        return Err(mismatch(format!(
            "orders {} and {} with {} symmetry entries",
            old_dist.order,
            new_dist.order,
            sym.len()
        )));
    }
    for d in 0..old_dist.order {
        if old_dist.unpadded_edge(d) != new_dist.unpadded_edge(d) {
            return Err(mismatch(format!(
                "dimension {} has length {} before and {} after",
                d,
                old_dist.unpadded_edge(d),
                new_dist.unpadded_edge(d)
            )));
        }
    }
    for (which, dist, len) in [("old", old_dist, old_data.len()), ("new", new_dist, new_data.len())] {
        let expected = LocalLayout::new(dist, sym)?.local_len();
        if len != expected {
            return Err(mismatch(format!(
                "{} buffer has {} elements, layout needs {}",
                which, len, expected
            )));
        }
    }
    Ok(())
}

/// `new_data = beta * new_data + alpha * old_data` across layouts.
///
/// Collective over `comm`, whose ranks must be the processes of `topology`
/// and whose rank order matches the topology's. Both distributions must be
/// this rank's snapshots over `topology`.
///
/// # Errors
///
/// `DimensionMismatch` if the orders, the unpadded edges or the buffer
/// lengths disagree; `ProtocolMisuse` if a distribution does not fit the
/// topology. The checks are collective: when one rank fails, the others
/// return `DimensionMismatch` instead of entering the exchange.
#[allow(clippy::too_many_arguments)]
pub fn redistribute<T, C>(
    comm: &C,
    topology: &Topology,
    sym: &[Symmetry],
    old_dist: &Distribution,
    old_data: &[T],
    alpha: T,
    new_dist: &Distribution,
    new_data: &mut [T],
    beta: T,
) -> Result<RedistStats>
where
    T: Element,
    C: Communicator,
{
    // every rank validates before anyone enters the exchange
    let mut prepared = None;
    collective_status(
        comm,
        || {
            check_compatible(comm.size(), topology, sym, (old_dist, old_data), (new_dist, &*new_data))?;
            let old_layout = LocalLayout::new(old_dist, sym)?;
            let new_layout = LocalLayout::new(new_dist, sym)?;
            let local = old_dist.is_block_compatible(new_dist) && old_dist.perank == new_dist.perank;
            let routes = if local {
                Vec::new()
            } else {
                plan_routes(topology, old_dist, new_dist)?
            };
            prepared = Some((old_layout, new_layout, local, routes));
            Ok(())
        },
        || TendistError::dimension_mismatch("redistribute", "another rank rejected its layouts or buffers"),
    )?;
    let Some((old_layout, new_layout, local, routes)) = prepared else {
        return Err(TendistError::protocol("layouts missing after status check"));
    };

    if local {
        scale_in_place(new_data, beta);
        let mut copied = 0;
        old_layout.for_each_slot(|slot, _, valid| {
            if valid {
                new_data[slot] += alpha * old_data[slot];
                copied += 1;
            }
        });
        tracing::debug!(elements = copied, "redistribution is a local copy");
        return Ok(RedistStats {
            local_only: true,
            sent: 0,
            received: copied,
        });
    }

    let fan_out: Vec<usize> = (0..topology.order())
        .filter(|&a| routes[a] == AxisRoute::FanOut)
        .collect();
    let fan_count: usize = fan_out.iter().map(|&a| topology.axes()[a].size).product();

    let own = topology.coords(comm.rank());
    let mut send: Vec<Vec<(usize, T)>> = vec![Vec::new(); comm.size()];
    let mut sent = 0;
    old_layout.for_each_slot(|slot, global, valid| {
        if !valid {
            return;
        }
        let loc = new_layout.locate(global);
        let mut dest = own.clone();
        for (a, route) in routes.iter().enumerate() {
            if let AxisRoute::Required {
                dim,
                radix,
                replicated_before,
            } = *route
            {
                let required = (loc.perank[dim] / radix) % topology.axes()[a].size;
                // a replicated sender only serves its own coordinate
                if replicated_before && own[a] != required {
                    return;
                }
                dest[a] = required;
            }
        }
        for mut combo in 0..fan_count {
            for &a in &fan_out {
                let size = topology.axes()[a].size;
                dest[a] = combo % size;
                combo /= size;
            }
            send[topology.rank_of(&dest)].push((loc.slot, old_data[slot]));
            sent += 1;
        }
    });

    let counts: Vec<usize> = send.iter().map(Vec::len).collect();
    let elem_bytes = std::mem::size_of::<(usize, T)>();
    let est_time = exchange_time(&counts, elem_bytes);
    let recv = comm.all_to_allv(send)?;
    scale_in_place(new_data, beta);
    let mut received = 0;
    for (slot, value) in recv.into_iter().flatten() {
        let target = new_data.get_mut(slot).ok_or_else(|| {
            TendistError::protocol(format!(
                "received slot {} beyond local length {}",
                slot,
                new_layout.local_len()
            ))
        })?;
        *target += alpha * value;
        received += 1;
    }
    tracing::debug!(
        sent,
        received,
        bytes = sent * elem_bytes,
        est_time,
        "redistribution exchanged"
    );
    Ok(RedistStats {
        local_only: false,
        sent,
        received,
    })
}
