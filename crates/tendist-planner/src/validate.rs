//! Validity of an axis assignment
//!
//! An index *steps* when the operands holding it do not all distribute it
//! over the same grid axes. The operands that do distribute it are then
//! *moving*: the executor sweeps the index in chunks, broadcasting moving
//! inputs and reducing a moving output.
//!
//! Seen from one grid axis, each operand is either replicated along it, split
//! by one of its indices, or (for C only) reduced along it. An assignment is
//! valid when every axis shows one of these patterns:
//!
//! | C            | A                        | B                        |
//! |--------------|--------------------------|--------------------------|
//! | `Split(i)`   | `Replicated` or `Split(i)` | `Replicated` or `Split(i)` |
//! | `Replicated` | `Replicated`             | `Replicated`             |
//! | `Reduced(i)` | `Split(k)`               | `Split(k)`, k contracted |
//!
//! and no index has three moving operands.

use crate::contraction::{Contraction, IndexClass, IndexInfo, Role};
use tendist_core::mapping::TensorMapping;
use tendist_core::{Result, TendistError, Topology};

/// Physical grid axes of every dimension of A, B and C
pub type Assignment = [Vec<Vec<usize>>; 3];

/// How an operand relates to one grid axis
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AxisUse {
    /// Not distributed along the axis, or moving along it
    Replicated,
    /// Index `label` is distributed along the axis
    Split(char),
    /// C holds partial sums along the axis for index `label`
    Reduced(char),
}

/// An index swept by the executor
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Step {
    pub label: char,
    /// Whether A, B and C are moving
    pub moving: [bool; 3],
}

impl Step {
    pub fn moving_count(&self) -> usize {
        self.moving.iter().filter(|&&m| m).count()
    }
}

/// Assignment read back from existing mappings
pub fn assignment_of(mappings: [&TensorMapping; 3]) -> Assignment {
    mappings.map(|m| {
        (0..m.order())
            .map(|d| m.chains().physical_axes(d))
            .collect()
    })
}

fn axes_of<'a>(asg: &'a Assignment, info: &IndexInfo, role: Role) -> Option<&'a [usize]> {
    info.dim(role).map(|d| asg[role.index()][d].as_slice())
}

/// The stepping indices of an assignment, in label order
pub fn steps(ctr: &Contraction, asg: &Assignment) -> Vec<Step> {
    let mut out = Vec::new();
    for info in ctr.indices() {
        let holders: Vec<&[usize]> = info
            .holders()
            .filter_map(|r| axes_of(asg, info, r))
            .collect();
        let uniform = holders.windows(2).all(|w| w[0] == w[1]);
        if uniform {
            continue;
        }
        let mut moving = [false; 3];
        for role in info.holders() {
            moving[role.index()] = axes_of(asg, info, role).is_some_and(|axes| !axes.is_empty());
        }
        out.push(Step {
            label: info.label,
            moving,
        });
    }
    out
}

/// How each of A, B and C relates to grid axis `axis`
pub fn classify(ctr: &Contraction, asg: &Assignment, stepping: &[Step], axis: usize) -> [AxisUse; 3] {
    Role::ALL.map(|role| {
        let op = ctr.operand(role);
        let Some(d) = asg[role.index()].iter().position(|axes| axes.contains(&axis)) else {
            return AxisUse::Replicated;
        };
        let label = op.indices()[d];
        let moving = stepping
            .iter()
            .any(|s| s.label == label && s.moving[role.index()]);
        match (moving, role) {
            (true, Role::C) => AxisUse::Reduced(label),
            (true, _) => AxisUse::Replicated,
            (false, _) => AxisUse::Split(label),
        }
    })
}

fn is_contracted(ctr: &Contraction, label: char) -> bool {
    ctr.index(label)
        .is_some_and(|info| info.class == IndexClass::Contracted)
}

/// Whether one axis shows an accepted pattern
pub fn axis_is_valid(ctr: &Contraction, uses: [AxisUse; 3]) -> bool {
    let [a, b, c] = uses;
    match c {
        AxisUse::Split(i) => {
            let ok = |u: AxisUse| u == AxisUse::Replicated || u == AxisUse::Split(i);
            ok(a) && ok(b)
        }
        AxisUse::Replicated => a == AxisUse::Replicated && b == AxisUse::Replicated,
        AxisUse::Reduced(_) => match (a, b) {
            (AxisUse::Split(ka), AxisUse::Split(kb)) => ka == kb && is_contracted(ctr, ka),
            _ => false,
        },
    }
}

/// Grid axes violating an accepted pattern, ascending
pub fn offending_axes(topology: &Topology, ctr: &Contraction, asg: &Assignment) -> Vec<usize> {
    let stepping = steps(ctr, asg);
    let mut bad = Vec::new();

    for step in stepping.iter().filter(|s| s.moving_count() == 3) {
        if let Some(info) = ctr.index(step.label) {
            if let Some(axes) = axes_of(asg, info, Role::C) {
                bad.extend_from_slice(axes);
            }
        }
    }
    for axis in 0..topology.order() {
        if !axis_is_valid(ctr, classify(ctr, asg, &stepping, axis)) {
            bad.push(axis);
        }
    }
    bad.sort_unstable();
    bad.dedup();
    bad
}

/// Strip offending axes from every operand until the assignment validates.
///
/// Returns the stripped axes in the order they were removed.
pub fn repair(topology: &Topology, ctr: &Contraction, asg: &mut Assignment) -> Vec<usize> {
    let mut stripped = Vec::new();
    loop {
        let bad = offending_axes(topology, ctr, asg);
        if bad.is_empty() {
            return stripped;
        }
        for dims in asg.iter_mut() {
            for axes in dims.iter_mut() {
                axes.retain(|a| !bad.contains(a));
            }
        }
        stripped.extend(bad);
    }
}

/// Check explicit mappings before a plan is built on them.
///
/// # Errors
///
/// `ProtocolMisuse` if the mappings live on different topologies, an
/// operand uses an axis twice, a shared index has different phases, or an
/// axis shows a pattern the executor cannot run.
pub fn check_mappings(topology: &Topology, ctr: &Contraction, mappings: [&TensorMapping; 3]) -> Result<()> {
    let topo_id = mappings[0].topology();
    if mappings.iter().any(|m| m.topology() != topo_id) {
        return Err(TendistError::protocol(
            "operands are mapped onto different topologies",
        ));
    }
    let asg = assignment_of(mappings);
    for role in Role::ALL {
        let mut used: Vec<usize> = asg[role.index()].iter().flatten().copied().collect();
        let total = used.len();
        used.sort_unstable();
        used.dedup();
        if used.len() != total {
            return Err(TendistError::protocol(format!(
                "operand {} uses a grid axis twice",
                role
            )));
        }
        if let Some(&a) = used.iter().find(|&&a| a >= topology.order()) {
            return Err(TendistError::protocol(format!(
                "operand {} uses axis {} outside {}",
                role, a, topology
            )));
        }
    }
    for info in ctr.indices() {
        let phases: Vec<usize> = info
            .holders()
            .filter_map(|r| info.dim(r).map(|d| mappings[r.index()].chains().phase(d)))
            .collect();
        if phases.windows(2).any(|w| w[0] != w[1]) {
            return Err(TendistError::protocol(format!(
                "index '{}' has phases {:?} across operands",
                info.label, phases
            )));
        }
    }
    let bad = offending_axes(topology, ctr, &asg);
    if !bad.is_empty() {
        return Err(TendistError::protocol(format!(
            "axes {:?} of {} cannot be executed",
            bad, topology
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn matmul() -> Contraction {
        Contraction::from_einsum("ik,kj->ij", [&[8, 8], &[8, 8], &[8, 8]]).unwrap()
    }

    #[test]
    fn test_summa_pattern_is_valid() {
        let topo = Topology::new(&[2, 2]).unwrap();
        let ctr = matmul();
        // A: i->1 k->0, B: k->1 j->0, C: i->1 j->0
        let asg: Assignment = [
            vec![vec![1], vec![0]],
            vec![vec![1], vec![0]],
            vec![vec![1], vec![0]],
        ];
        let stepping = steps(&ctr, &asg);
        assert_eq!(
            stepping,
            vec![Step {
                label: 'k',
                moving: [true, true, false]
            }]
        );
        assert_eq!(
            classify(&ctr, &asg, &stepping, 0),
            [AxisUse::Replicated, AxisUse::Split('j'), AxisUse::Split('j')]
        );
        assert!(offending_axes(&topo, &ctr, &asg).is_empty());
    }

    #[test]
    fn test_reduce_pattern_is_valid() {
        let topo = Topology::new(&[4]).unwrap();
        let ctr = matmul();
        // A: k->0, B: k->0, C: i->0
        let asg: Assignment = [
            vec![vec![], vec![0]],
            vec![vec![0], vec![]],
            vec![vec![0], vec![]],
        ];
        let stepping = steps(&ctr, &asg);
        assert_eq!(stepping.len(), 1);
        assert_eq!(stepping[0].label, 'i');
        assert_eq!(stepping[0].moving, [false, false, true]);
        assert_eq!(
            classify(&ctr, &asg, &stepping, 0),
            [AxisUse::Split('k'), AxisUse::Split('k'), AxisUse::Reduced('i')]
        );
        assert!(offending_axes(&topo, &ctr, &asg).is_empty());
    }

    #[test]
    fn test_unreduced_partial_sums_are_stripped() {
        let topo = Topology::new(&[4]).unwrap();
        let ctr = matmul();
        // k split in A and B but C replicated: partial sums never combined
        let mut asg: Assignment = [
            vec![vec![], vec![0]],
            vec![vec![0], vec![]],
            vec![vec![], vec![]],
        ];
        assert_eq!(offending_axes(&topo, &ctr, &asg), vec![0]);
        assert_eq!(repair(&topo, &ctr, &mut asg), vec![0]);
        assert!(asg.iter().flatten().all(|axes| axes.is_empty()));
    }

    #[test]
    fn test_three_moving_operands_rejected() {
        let topo = Topology::new(&[2, 2, 2]).unwrap();
        let ctr = Contraction::from_einsum("wk,kw->w", [&[8, 8], &[8, 8], &[8]]).unwrap();
        let asg: Assignment = [
            vec![vec![0], vec![]],
            vec![vec![], vec![1]],
            vec![vec![2]],
        ];
        let stepping = steps(&ctr, &asg);
        assert_eq!(stepping[0].moving_count(), 3);
        assert!(offending_axes(&topo, &ctr, &asg).contains(&2));
    }

    #[test]
    fn test_check_mappings_rejects_axis_reuse() {
        let topo = Topology::new(&[2, 2]).unwrap();
        let ctr = matmul();
        let mut a = ctr.operand(Role::A).blank_mapping(0).unwrap();
        a.chains_mut().map_physical(0, 0, 2).unwrap();
        a.chains_mut().map_physical(1, 0, 2).unwrap();
        a.set_padding();
        let b = ctr.operand(Role::B).blank_mapping(0).unwrap();
        let c = ctr.operand(Role::C).blank_mapping(0).unwrap();
        let err = check_mappings(&topo, &ctr, [&a, &b, &c]).unwrap_err();
        assert!(matches!(err, TendistError::ProtocolMisuse(_)));
    }

    #[test]
    fn test_check_mappings_rejects_phase_mismatch() {
        let topo = Topology::new(&[2]).unwrap();
        let ctr = matmul();
        let mut a = ctr.operand(Role::A).blank_mapping(0).unwrap();
        a.chains_mut().stretch_virtual(1, 2).unwrap();
        a.set_padding();
        let b = ctr.operand(Role::B).blank_mapping(0).unwrap();
        let c = ctr.operand(Role::C).blank_mapping(0).unwrap();
        let err = check_mappings(&topo, &ctr, [&a, &b, &c]).unwrap_err();
        assert!(err.to_string().contains("phases"));
    }
}
