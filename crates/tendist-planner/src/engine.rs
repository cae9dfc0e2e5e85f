//! Mapping engine
//!
//! For every candidate topology of a [`Session`] the engine
//!
//! 1. assigns grid axes greedily, stage by stage: contracted indices, then
//!    indices shared by all three operands, then free indices, each stage in
//!    decreasing edge length, taking the largest axis that fits;
//! 2. strips axes that break an executable pattern (see [`crate::validate`]);
//! 3. gives every index the LCM of its physical counts as phase, topping up
//!    with virtual blocks;
//! 4. raises symmetric index pairs to a common phase until stable;
//! 5. pads, estimates memory and rejects candidates over budget.
//!
//! The feasible candidate with the lowest estimated time wins. All of this is
//! local computation: every rank reaches the same answer.

use crate::config::PlannerConfig;
use crate::contraction::{Contraction, IndexClass, Role};
use crate::morph::{extract_free_axes, map_remaining};
use crate::rank::{rank_candidates, Candidate, Selection};
use crate::registry::{Rejection, Session};
use crate::shape::PlanShape;
use crate::validate::{repair, Assignment};
use tendist_comm::{Communicator, CostModel};
use tendist_core::mapping::TensorMapping;
use tendist_core::symmetry::symmetry_table;
use tendist_core::{Result, Symmetry, TendistError, Topology};

pub(crate) fn gcd(mut a: usize, mut b: usize) -> usize {
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub(crate) fn lcm(a: usize, b: usize) -> usize {
    a / gcd(a, b) * b
}

/// Axes by decreasing size, lower id first on ties; unit axes excluded
fn axes_by_size(topology: &Topology) -> Vec<usize> {
    let mut axes: Vec<usize> = (0..topology.order())
        .filter(|&a| topology.axes()[a].size > 1)
        .collect();
    axes.sort_by_key(|&a| std::cmp::Reverse(topology.axes()[a].size));
    axes
}

fn greedy_assign(topology: &Topology, ctr: &Contraction) -> Assignment {
    let mut asg: Assignment = Role::ALL.map(|r| vec![Vec::new(); ctr.operand(r).order()]);
    let mut used = [vec![false; topology.order()], vec![false; topology.order()], vec![false; topology.order()]];
    let axes = axes_by_size(topology);
    let size = |a: usize| topology.axes()[a].size;

    for stage in [IndexClass::Contracted, IndexClass::Weigh, IndexClass::Free] {
        let mut infos: Vec<_> = ctr.indices().iter().filter(|i| i.class == stage).collect();
        infos.sort_by_key(|i| std::cmp::Reverse(i.edge_len));

        for info in infos {
            let fits = |a: usize| size(a) <= info.edge_len;
            if stage == IndexClass::Contracted {
                let (Some(da), Some(db)) = (info.dim(Role::A), info.dim(Role::B)) else {
                    continue;
                };
                let on_a = axes.iter().copied().find(|&a| fits(a) && !used[0][a]);
                let on_b = axes
                    .iter()
                    .copied()
                    .find(|&a| fits(a) && !used[1][a] && Some(a) != on_a)
                    .or_else(|| on_a.filter(|&a| !used[1][a]));
                if let Some(a) = on_a {
                    asg[0][da].push(a);
                    used[0][a] = true;
                }
                if let Some(a) = on_b {
                    asg[1][db].push(a);
                    used[1][a] = true;
                }
            } else {
                let holders: Vec<Role> = info.holders().collect();
                let pick = axes
                    .iter()
                    .copied()
                    .find(|&a| fits(a) && holders.iter().all(|r| !used[r.index()][a]));
                if let Some(a) = pick {
                    for r in holders {
                        if let Some(d) = info.dim(r) {
                            asg[r.index()][d].push(a);
                            used[r.index()][a] = true;
                        }
                    }
                }
            }
        }
    }
    asg
}

/// Raise symmetric pairs in `phase` to a common value until stable
fn settle_symmetric(
    phase: &mut [usize],
    pairs: &[(usize, usize)],
    labels: &[char],
    config: &PlannerConfig,
) -> Result<usize> {
    let mut rounds = 0;
    loop {
        let mut changed = false;
        for &(x, y) in pairs {
            if phase[x] == phase[y] {
                continue;
            }
            let l = lcm(phase[x], phase[y]);
            if l >= config.max_phase {
                return Err(TendistError::infeasible(format!(
                    "symmetric indices '{}' and '{}' need phase {}, ceiling is {}",
                    labels[x], labels[y], l, config.max_phase
                )));
            }
            phase[x] = l;
            phase[y] = l;
            changed = true;
        }
        if !changed {
            return Ok(rounds);
        }
        rounds += 1;
        if rounds > config.max_symmetry_rounds {
            return Err(TendistError::infeasible(format!(
                "symmetric phases did not settle within {} rounds",
                config.max_symmetry_rounds
            )));
        }
    }
}

/// Map the operands of `ctr` onto one topology.
///
/// # Errors
///
/// `MappingInfeasible` if a phase reaches the ceiling, symmetric phases do
/// not settle or the memory estimate exceeds the budget.
pub fn map_on_topology(
    topology: &Topology,
    id: usize,
    ctr: &Contraction,
    config: &PlannerConfig,
    cost: &CostModel,
) -> Result<Candidate> {
    let mut asg = greedy_assign(topology, ctr);
    let stripped = repair(topology, ctr, &mut asg);
    if !stripped.is_empty() {
        tracing::trace!(topology = id, stripped = ?stripped, "stripped axes");
    }

    let labels: Vec<char> = ctr.indices().iter().map(|i| i.label).collect();
    let mut phase = Vec::with_capacity(labels.len());
    for info in ctr.indices() {
        let p = info
            .holders()
            .filter_map(|r| info.dim(r).map(|d| &asg[r.index()][d]))
            .map(|axes| axes.iter().map(|&a| topology.axes()[a].size).product::<usize>())
            .fold(1, lcm);
        if p > 1 && p >= config.max_phase {
            return Err(TendistError::infeasible(format!(
                "index '{}' needs phase {}, ceiling is {}",
                info.label, p, config.max_phase
            )));
        }
        phase.push(p);
    }

    let mut pairs = Vec::new();
    for role in Role::ALL {
        let op = ctr.operand(role);
        for (i, j) in symmetry_table(op.symmetry()) {
            let pos = |d: usize| labels.iter().position(|&l| l == op.indices()[d]).unwrap_or_default();
            pairs.push((pos(i), pos(j)));
        }
    }
    let rounds = settle_symmetric(&mut phase, &pairs, &labels, config)?;

    let mut mappings = Vec::with_capacity(3);
    for role in Role::ALL {
        let op = ctr.operand(role);
        let mut m = TensorMapping::new(op.edge_len(), op.symmetry(), id)?;
        for (d, axes) in asg[role.index()].iter().enumerate() {
            let mut phys = 1;
            for &a in axes {
                let size = topology.axes()[a].size;
                m.chains_mut().map_physical(d, a, size)?;
                phys *= size;
            }
            let pos = labels
                .iter()
                .position(|&l| l == op.indices()[d])
                .unwrap_or_default();
            m.chains_mut().stretch_virtual(d, phase[pos] / phys)?;
        }
        m.set_padding();
        debug_assert!(m.is_symmetry_consistent());
        mappings.push(m);
    }
    let mappings: [TensorMapping; 3] = mappings
        .try_into()
        .map_err(|_| TendistError::protocol("expected three operand mappings"))?;

    let elem = ctr.element_size();
    let shape = PlanShape::derive(ctr, [&mappings[0], &mappings[1], &mappings[2]])?;
    let est_time = shape.est_time_rec(cost, elem);
    let memory = mappings.iter().map(|m| m.size() * elem).sum::<usize>() + shape.mem_rec(elem);
    if let Some(limit) = config.memory_limit {
        if memory > limit {
            return Err(TendistError::infeasible(format!(
                "needs {} bytes per process, budget is {}",
                memory, limit
            )));
        }
    }

    tracing::debug!(
        topology = id,
        grid = %topology,
        est_time,
        memory,
        symmetry_rounds = rounds,
        steps = shape.steps.len(),
        "feasible topology"
    );
    Ok(Candidate {
        topology: id,
        mappings,
        est_time,
        memory,
    })
}

/// Map the operands of `ctr` onto the best topology of the session.
///
/// On success all three operand mappings are replaced; on failure they are
/// left as they were. Rejected topologies are recorded in the session.
///
/// # Errors
///
/// `MappingInfeasible` if every topology is rejected. `DimensionMismatch`
/// and `ProtocolMisuse` are returned as soon as they occur.
pub fn map_tensors<C: Communicator>(session: &mut Session<C>, ctr: &mut Contraction) -> Result<Selection> {
    let mut feasible: Vec<Candidate> = Vec::new();
    let mut rejected = Vec::new();
    for (id, topology) in session.topologies().iter().enumerate() {
        match map_on_topology(topology, id, ctr, session.config(), session.cost_model()) {
            Ok(candidate) => feasible.push(candidate),
            Err(e) if e.is_recoverable() => {
                tracing::debug!(topology = id, grid = %topology, reason = %e, "rejected topology");
                rejected.push(Rejection {
                    topology: id,
                    reason: e.to_string(),
                });
            }
            Err(e) => return Err(e),
        }
    }
    let total = session.topologies().len();
    session.set_rejected(rejected);

    let mut order: Vec<(usize, f64)> = feasible.iter().map(|c| (c.topology, c.est_time)).collect();
    rank_candidates(&mut order);
    let Some(&(best, _)) = order.first() else {
        tracing::warn!(contraction = %ctr, candidates = total, "no feasible topology");
        return Err(TendistError::infeasible(format!(
            "all {} candidate topologies rejected",
            total
        )));
    };
    let count = feasible.len();
    let chosen = feasible
        .into_iter()
        .find(|c| c.topology == best)
        .ok_or_else(|| TendistError::protocol("ranked topology vanished"))?;

    let selection = Selection {
        topology: chosen.topology,
        est_time: chosen.est_time,
        memory: chosen.memory,
        feasible: count,
    };
    tracing::info!(
        contraction = %ctr,
        topology = selection.topology,
        est_time = selection.est_time,
        memory = selection.memory,
        feasible = count,
        "selected mapping"
    );
    ctr.install(chosen.mappings);
    Ok(selection)
}

/// Standalone placement of a tensor on a topology.
///
/// Dimensions take free axes longest first, then symmetric groups are
/// brought to a common phase. Useful as the starting layout of tensors that
/// are later redistributed into a contraction's mapping.
pub fn default_mapping(
    topology: &Topology,
    id: usize,
    edge_len: &[usize],
    sym: &[Symmetry],
    config: &PlannerConfig,
) -> Result<TensorMapping> {
    let mut m = TensorMapping::new(edge_len, sym, id)?;
    let mut free = extract_free_axes(topology, &[]);
    map_remaining(&mut m, topology, &mut free)?;

    let mut phase = m.phases();
    let labels: Vec<char> = (0..m.order())
        .map(|d| char::from_digit(d as u32 % 36, 36).unwrap_or('?'))
        .collect();
    settle_symmetric(&mut phase, &m.symmetry_table(), &labels, config)?;
    for (d, &p) in phase.iter().enumerate() {
        let now = m.chains().phase(d);
        m.chains_mut().stretch_virtual(d, p / now)?;
    }
    m.set_padding();
    Ok(m)
}
