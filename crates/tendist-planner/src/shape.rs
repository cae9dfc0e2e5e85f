//! Block-level skeleton of a contraction plan
//!
//! Derived from the three operand mappings without any communication. The
//! executor builds its operator tree from a [`PlanShape`]; the ranker
//! estimates candidate topologies from the same value, so an estimate always
//! describes the plan that would run.
//!
//! Local buffers are sequences of virtual blocks in mixed radix, dimension 0
//! fastest. Seen from one dimension `d` a buffer is a `[lda][count][sub_lda]`
//! array, row-major in that notation, with
//!
//! - `sub_lda = block_size * prod(virt[d'] for d' < d)`
//! - `count = virt[d]`
//! - `lda = prod(virt[d'] for d' > d)`
//!
//! Every stepping index becomes one nested sweep. Once an index is swept,
//! its count in all deeper levels is the chunk size `db`.

use crate::contraction::{Contraction, Role};
use crate::validate::{assignment_of, steps};
use tendist_comm::CostModel;
use tendist_core::mapping::TensorMapping;
use tendist_core::{Result, TendistError};

/// View of a local buffer along one dimension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlockStride {
    pub lda: usize,
    /// Zero when the operand does not hold the swept index
    pub sub_lda: usize,
    /// Blocks of the swept index held in the buffer
    pub count: usize,
}

/// One operand's part in a sweep
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct StepOperand {
    pub stride: BlockStride,
    pub moving: bool,
    /// Grid axes the operand moves along
    pub axes: Vec<usize>,
    /// Processes the operand moves across
    pub group: usize,
}

/// One swept index
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StepShape {
    pub label: char,
    /// Phase of the index: blocks along the whole index
    pub edge_len: usize,
    /// Blocks per chunk
    pub db: usize,
    pub operands: [StepOperand; 3],
}

impl StepShape {
    pub fn operand(&self, role: Role) -> &StepOperand {
        &self.operands[role.index()]
    }

    /// Whether `role` holds the swept index
    pub fn holds(&self, role: Role) -> bool {
        self.operand(role).stride.sub_lda > 0
    }

    pub fn moving(&self, role: Role) -> bool {
        self.operand(role).moving
    }

    pub fn moving_count(&self) -> usize {
        self.operands.iter().filter(|o| o.moving).count()
    }

    /// Number of chunks in a full sweep
    pub fn rounds(&self) -> usize {
        if self.db == 0 {
            0
        } else {
            self.edge_len / self.db
        }
    }

    /// Elements of `role`'s chunk buffer
    pub fn buf_len(&self, role: Role) -> usize {
        let s = self.operand(role).stride;
        if s.sub_lda == 0 {
            0
        } else {
            s.lda * self.db * s.sub_lda
        }
    }

    /// Whether a chunk of a moving operand can straddle two owners
    pub fn straddles(&self, role: Role) -> bool {
        let op = self.operand(role);
        op.moving && op.stride.count % self.db != 0
    }

    /// Elements of the overflow region for straddling chunks
    pub fn aux_len(&self) -> usize {
        Role::ALL
            .into_iter()
            .filter(|&r| self.straddles(r))
            .map(|r| self.buf_len(r))
            .max()
            .unwrap_or(0)
    }

    /// Elements of scratch this level reserves
    pub fn scratch_len(&self) -> usize {
        Role::ALL.into_iter().map(|r| self.buf_len(r)).sum::<usize>() + self.aux_len()
    }

    /// Communication time of a full sweep split over `layers` layers
    pub fn est_time_fp(&self, cost: &CostModel, elem_size: usize, layers: usize) -> f64 {
        let rounds = self.rounds();
        if rounds == 0 {
            return 0.0;
        }
        let mut per_round = 0.0;
        for role in Role::ALL {
            let op = self.operand(role);
            if !op.moving {
                continue;
            }
            let bytes = elem_size * self.buf_len(role);
            per_round += match role {
                Role::C => cost.allreduce_time(bytes, op.group),
                _ => cost.bcast_time(bytes, op.group),
            };
            if role != Role::C && self.straddles(role) {
                per_round += cost.bcast_time(bytes, op.group);
            }
        }
        per_round * rounds as f64 / layers.clamp(1, rounds) as f64
    }

    /// Scratch bytes of this level
    pub fn mem_fp(&self, elem_size: usize) -> usize {
        elem_size * self.scratch_len()
    }
}

/// Innermost loop over local blocks
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeafShape {
    pub labels: Vec<char>,
    /// Elements per block along each label
    pub block_edge: Vec<usize>,
    /// Blocks per label in the buffers reaching the leaf
    pub counts: Vec<usize>,
    /// Position in `labels` of every dimension of A, B and C
    pub dims: [Vec<usize>; 3],
    /// Elements per block of A, B and C
    pub block_size: [usize; 3],
    /// Whether the operand's blocks are symmetry-packed
    pub packed: [bool; 3],
}

impl LeafShape {
    /// Multiply-add flops over all block triples
    pub fn flops(&self) -> f64 {
        let elems: f64 = self
            .block_edge
            .iter()
            .zip(&self.counts)
            .map(|(&e, &c)| (e * c) as f64)
            .product();
        2.0 * elems
    }

    /// Blocks of `role` in the buffers reaching the leaf
    pub fn block_count(&self, role: Role) -> usize {
        self.dims[role.index()]
            .iter()
            .map(|&l| self.counts[l])
            .product()
    }
}

/// Sweeps, outermost first, and the leaf
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlanShape {
    pub steps: Vec<StepShape>,
    pub leaf: LeafShape,
}

impl PlanShape {
    /// Derive the skeleton of the plan over `mappings`.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse` if an index has different phases or padded lengths in
    /// different operands.
    pub fn derive(ctr: &Contraction, mappings: [&TensorMapping; 3]) -> Result<Self> {
        let asg = assignment_of(mappings);
        let mut cur: [Vec<usize>; 3] = mappings
            .map(|m| (0..m.order()).map(|d| m.chains().virt_phase(d)).collect());
        let block_size = mappings.map(|m| m.size() / m.nvirt().max(1));

        let mut phase = Vec::with_capacity(ctr.indices().len());
        let mut block_edge = Vec::with_capacity(ctr.indices().len());
        for info in ctr.indices() {
            let mut seen: Option<(usize, usize)> = None;
            for role in info.holders() {
                let d = info.dim(role).unwrap_or_default();
                let m = mappings[role.index()];
                let here = (m.chains().phase(d), m.padded_edge(d));
                match seen {
                    None => seen = Some(here),
                    Some(prev) if prev != here => {
                        return Err(TendistError::protocol(format!(
                            "index '{}' has (phase, padded edge) {:?} and {:?}",
                            info.label, prev, here
                        )))
                    }
                    Some(_) => {}
                }
            }
            let (p, edge) = seen.unwrap_or((1, info.edge_len));
            phase.push(p);
            block_edge.push(edge / p);
        }

        let mut shaped = Vec::new();
        for step in steps(ctr, &asg) {
            let (pos, info) = ctr
                .indices()
                .iter()
                .enumerate()
                .find(|(_, i)| i.label == step.label)
                .ok_or_else(|| TendistError::protocol(format!("unknown index '{}'", step.label)))?;

            let mut operands: [StepOperand; 3] = Default::default();
            for role in Role::ALL {
                let Some(d) = info.dim(role) else { continue };
                let r = role.index();
                let virt = &cur[r];
                operands[r] = StepOperand {
                    stride: BlockStride {
                        lda: virt[d + 1..].iter().product(),
                        sub_lda: block_size[r] * virt[..d].iter().product::<usize>(),
                        count: virt[d],
                    },
                    moving: step.moving[r],
                    axes: asg[r][d].clone(),
                    group: mappings[r].chains().phys_phase(d),
                };
            }
            let db = operands
                .iter()
                .filter(|o| o.moving)
                .map(|o| o.stride.count)
                .min()
                .ok_or_else(|| {
                    TendistError::protocol(format!("index '{}' steps without moving", info.label))
                })?;
            for role in info.holders() {
                if let Some(d) = info.dim(role) {
                    cur[role.index()][d] = db;
                }
            }
            shaped.push(StepShape {
                label: info.label,
                edge_len: phase[pos],
                db,
                operands,
            });
        }

        let mut counts = vec![1; ctr.indices().len()];
        for (pos, info) in ctr.indices().iter().enumerate() {
            let mut per_holder = info
                .holders()
                .filter_map(|r| info.dim(r).map(|d| cur[r.index()][d]));
            if let Some(first) = per_holder.next() {
                if per_holder.any(|c| c != first) {
                    return Err(TendistError::protocol(format!(
                        "index '{}' reaches the leaf with different block counts",
                        info.label
                    )));
                }
                counts[pos] = first;
            }
        }
        let dims = Role::ALL.map(|role| {
            ctr.operand(role)
                .indices()
                .iter()
                .map(|&l| {
                    ctr.indices()
                        .iter()
                        .position(|i| i.label == l)
                        .unwrap_or_default()
                })
                .collect()
        });

        Ok(Self {
            steps: shaped,
            leaf: LeafShape {
                labels: ctr.indices().iter().map(|i| i.label).collect(),
                block_edge,
                counts,
                dims,
                block_size,
                packed: mappings.map(|m| m.is_packed()),
            },
        })
    }

    /// Estimated execution time with one layer per sweep
    pub fn est_time_rec(&self, cost: &CostModel, elem_size: usize) -> f64 {
        let leaf = cost.flop_time(self.leaf.flops());
        self.steps.iter().rev().fold(leaf, |inner, step| {
            step.rounds() as f64 * inner + step.est_time_fp(cost, elem_size, 1)
        })
    }

    /// Scratch bytes of all levels together
    pub fn mem_rec(&self, elem_size: usize) -> usize {
        self.steps.iter().map(|s| s.mem_fp(elem_size)).sum()
    }
}
