//! Contraction plans
//!
//! A [`ContractionPlan`] is a tree built once per contraction call: one
//! [`SummaStep`] per stepping index, outermost first, above a leaf that
//! either contracts a single block triple ([`PlanNode::Local`]) or loops
//! over every local block combination ([`PlanNode::Virtualized`]).

use crate::kernel::{LocalKernel, LocalSpec};
use crate::scratch::{Scratch, ScratchArena};
use crate::summa::SummaStep;
use std::fmt;
use tendist_comm::{collective_status, Communicator, CostModel};
use tendist_core::{Distribution, Element, Result, Symmetry, TendistError, Topology};
use tendist_planner::contraction::{Contraction, Role};
use tendist_planner::engine::map_tensors;
use tendist_planner::registry::Session;
use tendist_planner::shape::{LeafShape, PlanShape};
use tendist_planner::validate::check_mappings;

/// Loop over every local block combination of the contraction's indices
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockLoop {
    /// Blocks per label
    counts: Vec<usize>,
    /// Block stride of every label in A, B and C, 0 where absent
    block_strides: [Vec<usize>; 3],
    block_count: [usize; 3],
    spec: LocalSpec,
}

impl BlockLoop {
    pub fn new(leaf: &LeafShape) -> Self {
        let block_strides = Role::ALL.map(|role| {
            let mut strides = vec![0; leaf.labels.len()];
            let mut stride = 1;
            for &l in &leaf.dims[role.index()] {
                strides[l] = stride;
                stride *= leaf.counts[l];
            }
            strides
        });
        Self {
            counts: leaf.counts.clone(),
            block_strides,
            block_count: Role::ALL.map(|r| leaf.block_count(r)),
            spec: LocalSpec::from_leaf(leaf),
        }
    }

    pub fn spec(&self) -> &LocalSpec {
        &self.spec
    }

    /// Number of block triples visited
    pub fn iterations(&self) -> usize {
        self.counts.iter().product()
    }

    fn run<T: Element, K: LocalKernel<T>>(
        &self,
        bufs: (&[T], &[T], &mut [T]),
        alpha: T,
        beta: T,
        kernel: &K,
    ) -> Result<()> {
        let (a, b, c) = bufs;
        let bs = self.spec.block_size;
        for (role, len) in Role::ALL.into_iter().zip([a.len(), b.len(), c.len()]) {
            let expected = self.block_count[role.index()] * bs[role.index()];
            if len != expected {
                return Err(TendistError::dimension_mismatch(
                    "BlockLoop::run",
                    format!("{} buffer has {} elements, expected {}", role, len, expected),
                ));
            }
        }

        let n = self.counts.len();
        let mut idx = vec![0usize; n];
        let mut blk = [0usize; 3];
        let mut touched = vec![false; self.block_count[2]];
        loop {
            let [ba, bb, bc] = blk;
            let scale = if touched[bc] { T::one() } else { beta };
            touched[bc] = true;
            kernel.contract(
                &self.spec,
                &a[ba * bs[0]..(ba + 1) * bs[0]],
                &b[bb * bs[1]..(bb + 1) * bs[1]],
                &mut c[bc * bs[2]..(bc + 1) * bs[2]],
                alpha,
                scale,
            )?;

            let mut l = 0;
            loop {
                if l == n {
                    return Ok(());
                }
                idx[l] += 1;
                for (o, s) in blk.iter_mut().zip(&self.block_strides) {
                    *o += s[l];
                }
                if idx[l] < self.counts[l] {
                    break;
                }
                for (o, s) in blk.iter_mut().zip(&self.block_strides) {
                    *o -= s[l] * idx[l];
                }
                idx[l] = 0;
                l += 1;
            }
        }
    }
}

/// One level of a contraction plan
pub enum PlanNode<C: Communicator> {
    /// A single block triple handed to the kernel
    Local(LocalSpec),
    /// Every local block triple handed to the kernel in turn
    Virtualized(BlockLoop),
    SummaStep(Box<SummaStep<C>>),
}

impl<C: Communicator> PlanNode<C> {
    /// Leaf for `leaf`: a block loop unless every index has one local block
    pub fn leaf(leaf: &LeafShape) -> Self {
        if leaf.counts.iter().all(|&c| c == 1) {
            PlanNode::Local(LocalSpec::from_leaf(leaf))
        } else {
            PlanNode::Virtualized(BlockLoop::new(leaf))
        }
    }

    pub fn local_spec(&self) -> &LocalSpec {
        match self {
            PlanNode::Local(spec) => spec,
            PlanNode::Virtualized(inner) => inner.spec(),
            PlanNode::SummaStep(step) => step.nested().local_spec(),
        }
    }

    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run<T: Element, K: LocalKernel<T>>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        alpha: T,
        beta: T,
        kernel: &K,
        scratch: Scratch<'_, T>,
    ) -> Result<()> {
        match self {
            PlanNode::Local(spec) => kernel.contract(spec, a, b, c, alpha, beta),
            PlanNode::Virtualized(inner) => inner.run((a, b, c), alpha, beta, kernel),
            PlanNode::SummaStep(step) => step.run(a, b, c, alpha, beta, kernel, scratch),
        }
    }

    /// Estimated time of this level and everything below it
    pub fn est_time_rec(&self, cost: &CostModel, elem_size: usize) -> f64 {
        match self {
            PlanNode::Local(spec) => cost.flop_time(spec.flops()),
            PlanNode::Virtualized(inner) => {
                cost.flop_time(inner.iterations() as f64 * inner.spec().flops())
            }
            PlanNode::SummaStep(step) => step.est_time_rec(cost, elem_size),
        }
    }

    /// Scratch bytes of this level and everything below it
    pub fn mem_rec(&self, elem_size: usize) -> usize {
        match self {
            PlanNode::SummaStep(step) => step.mem_rec(elem_size),
            _ => 0,
        }
    }

    pub fn scratch_len(&self) -> usize {
        match self {
            PlanNode::SummaStep(step) => step.scratch_len(),
            _ => 0,
        }
    }

    fn fmt_tree(&self, f: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
        write!(f, "{:indent$}", "", indent = 2 * depth)?;
        match self {
            PlanNode::Local(spec) => writeln!(f, "local {}", describe_blocks(spec, None)),
            PlanNode::Virtualized(inner) => {
                writeln!(f, "virtualized {}", describe_blocks(inner.spec(), Some(inner.counts.as_slice())))
            }
            PlanNode::SummaStep(step) => {
                writeln!(f, "{}", step)?;
                step.nested().fmt_tree(f, depth + 1)
            }
        }
    }
}

fn describe_blocks(spec: &LocalSpec, counts: Option<&[usize]>) -> String {
    spec.labels
        .iter()
        .enumerate()
        .map(|(l, label)| match counts {
            Some(counts) => format!("{}:{}x{}", label, counts[l], spec.block_edge[l]),
            None => format!("{}:{}", label, spec.block_edge[l]),
        })
        .collect::<Vec<_>>()
        .join(" ")
}

impl<C: Communicator> fmt::Debug for PlanNode<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanNode::Local(spec) => f.debug_tuple("Local").field(spec).finish(),
            PlanNode::Virtualized(inner) => f.debug_tuple("Virtualized").field(inner).finish(),
            PlanNode::SummaStep(step) => f.debug_tuple("SummaStep").field(step).finish(),
        }
    }
}

/// Estimated cost of running a plan
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlanCost {
    /// Seconds
    pub time: f64,
    /// Bytes per process: operands plus scratch
    pub peak_memory: usize,
}

/// Executable plan for one contraction on one topology
pub struct ContractionPlan<C: Communicator> {
    root: PlanNode<C>,
    topology: usize,
    grid: Topology,
    einsum: String,
    distributions: [Distribution; 3],
    symmetry: [Vec<Symmetry>; 3],
    cost: PlanCost,
    comm: C,
}

impl<C: Communicator> ContractionPlan<C> {
    /// Build the plan for the mappings installed on `ctr`.
    ///
    /// Collective: group communicators are created on first use.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse` if an operand is unmapped or the mappings do not
    /// describe a valid SUMMA schedule.
    pub fn build(session: &mut Session<C>, ctr: &Contraction) -> Result<Self> {
        let mappings = ctr
            .mappings()
            .ok_or_else(|| TendistError::protocol(format!("{} has unmapped operands", ctr)))?;
        let topology = mappings[0].topology();
        let grid = session.topology(topology)?.clone();
        check_mappings(&grid, ctr, mappings)?;
        let shape = PlanShape::derive(ctr, mappings)?;

        let mut root = PlanNode::leaf(&shape.leaf);
        for step in shape.steps.iter().rev() {
            let mut comms: [Option<C>; 3] = [None, None, None];
            for role in Role::ALL {
                if step.moving(role) {
                    comms[role.index()] = Some(session.group_comm(topology, &step.operand(role).axes)?);
                }
            }
            root = PlanNode::SummaStep(Box::new(SummaStep::new(step.clone(), comms, root)?));
        }

        let rank = session.comm().rank();
        let distributions = [
            Distribution::from_mapping(mappings[0], &grid, rank)?,
            Distribution::from_mapping(mappings[1], &grid, rank)?,
            Distribution::from_mapping(mappings[2], &grid, rank)?,
        ];
        let elem = ctr.element_size();
        let cost = PlanCost {
            time: root.est_time_rec(session.cost_model(), elem),
            peak_memory: mappings.iter().map(|m| m.size() * elem).sum::<usize>() + root.mem_rec(elem),
        };
        tracing::debug!(
            contraction = %ctr,
            topology,
            steps = shape.steps.len(),
            est_time = cost.time,
            peak_memory = cost.peak_memory,
            "built contraction plan"
        );

        Ok(Self {
            root,
            topology,
            grid,
            einsum: ctr.to_string(),
            distributions,
            symmetry: Role::ALL.map(|r| ctr.operand(r).symmetry().to_vec()),
            cost,
            comm: session.comm().clone(),
        })
    }

    pub fn root(&self) -> &PlanNode<C> {
        &self.root
    }

    pub fn topology(&self) -> usize {
        self.topology
    }

    pub fn grid(&self) -> &Topology {
        &self.grid
    }

    pub fn estimated_cost(&self) -> PlanCost {
        self.cost
    }

    /// This rank's view of `role`'s layout
    pub fn distribution(&self, role: Role) -> &Distribution {
        &self.distributions[role.index()]
    }

    pub fn symmetry(&self, role: Role) -> &[Symmetry] {
        &self.symmetry[role.index()]
    }

    /// Local elements `role` must provide
    pub fn local_len(&self, role: Role) -> usize {
        self.distributions[role.index()].size
    }

    /// Scratch elements one run needs
    pub fn scratch_len(&self) -> usize {
        self.root.scratch_len()
    }

    fn check_lengths<T>(&self, a: &[T], b: &[T], c: &[T]) -> Result<()> {
        for (role, len) in Role::ALL.into_iter().zip([a.len(), b.len(), c.len()]) {
            if len != self.local_len(role) {
                return Err(TendistError::dimension_mismatch(
                    "ContractionPlan::run",
                    format!(
                        "local buffer of {} has {} elements, expected {}",
                        role,
                        len,
                        self.local_len(role)
                    ),
                ));
            }
        }
        Ok(())
    }

    /// `C = beta * C + alpha * A . B`. Blocking and collective.
    ///
    /// Scratch is reserved and checked on every rank before any data moves,
    /// so a failure anywhere is reported everywhere and C is left untouched.
    ///
    /// # Errors
    ///
    /// `AllocationFailure` if any rank cannot reserve scratch,
    /// `DimensionMismatch` if a local buffer has the wrong length and
    /// `ProtocolMisuse` if the kernel rejects the block shape.
    pub fn run<T, K>(&self, a: &[T], b: &[T], c: &mut [T], alpha: T, beta: T, kernel: &K) -> Result<()>
    where
        T: Element,
        K: LocalKernel<T>,
    {
        kernel.validate(self.root.local_spec())?;
        let required = self.scratch_len();
        self.check_lengths_collective(a, b, c)?;
        let mut arena = None;
        collective_status(
            &self.comm,
            || {
                arena = Some(ScratchArena::try_new(required)?);
                Ok(())
            },
            || TendistError::AllocationFailure {
                requested: required,
                available: 0,
            },
        )?;
        let Some(mut arena) = arena else {
            return Err(TendistError::protocol("scratch arena missing after status check"));
        };
        self.execute(a, b, c, alpha, beta, kernel, arena.frame())
    }

    /// Like [`run`](Self::run), with scratch from a caller-owned arena
    #[allow(clippy::too_many_arguments)]
    pub fn run_with_scratch<T, K>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        alpha: T,
        beta: T,
        kernel: &K,
        arena: &mut ScratchArena<T>,
    ) -> Result<()>
    where
        T: Element,
        K: LocalKernel<T>,
    {
        kernel.validate(self.root.local_spec())?;
        let required = self.scratch_len();
        self.check_lengths_collective(a, b, c)?;
        collective_status(
            &self.comm,
            || arena.reserve_check(required),
            || TendistError::AllocationFailure {
                requested: required,
                available: 0,
            },
        )?;
        self.execute(a, b, c, alpha, beta, kernel, arena.frame())
    }

    /// Buffer lengths, agreed on by every rank before scratch is sized
    fn check_lengths_collective<T>(&self, a: &[T], b: &[T], c: &[T]) -> Result<()> {
        collective_status(
            &self.comm,
            || self.check_lengths(a, b, c),
            || {
                TendistError::dimension_mismatch(
                    "ContractionPlan::run",
                    "another rank passed local buffers of the wrong length",
                )
            },
        )
    }

    #[allow(clippy::too_many_arguments)]
    fn execute<T: Element, K: LocalKernel<T>>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        alpha: T,
        beta: T,
        kernel: &K,
        scratch: Scratch<'_, T>,
    ) -> Result<()> {
        let start = self.comm.wtime();
        self.root.run(a, b, c, alpha, beta, kernel, scratch)?;
        tracing::debug!(
            contraction = %self.einsum,
            elapsed = self.comm.wtime() - start,
            estimated = self.cost.time,
            "contraction done"
        );
        Ok(())
    }
}

impl<C: Communicator> fmt::Display for ContractionPlan<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "{} on topology {} {}: {:.3e} s, {} bytes",
            self.einsum, self.topology, self.grid, self.cost.time, self.cost.peak_memory
        )?;
        self.root.fmt_tree(f, 1)
    }
}

impl<C: Communicator> fmt::Debug for ContractionPlan<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContractionPlan")
            .field("einsum", &self.einsum)
            .field("topology", &self.topology)
            .field("root", &self.root)
            .field("cost", &self.cost)
            .finish()
    }
}

/// Map `ctr` onto the best topology and build its plan.
///
/// # Errors
///
/// `MappingInfeasible` if no topology can host the contraction; the
/// operands keep their previous mappings.
pub fn plan_contraction<C: Communicator>(session: &mut Session<C>, ctr: &mut Contraction) -> Result<ContractionPlan<C>> {
    map_tensors(session, ctr)?;
    ContractionPlan::build(session, ctr)
}
