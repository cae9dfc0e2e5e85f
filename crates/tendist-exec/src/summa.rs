//! One SUMMA sweep over a stepping index
//!
//! A [`SummaStep`] walks the phase blocks of one index in chunks of `db`
//! blocks. Moving inputs are broadcast from the owner of the chunk along
//! their group communicator, stationary inputs are sliced locally, and the
//! nested plan contracts the assembled views. A moving output is summed
//! across its group and written back by its owner.
//!
//! Every rank of a group walks the same chunks in the same order, so the
//! collectives pair up without tags.

use crate::kernel::LocalKernel;
use crate::plan::PlanNode;
use crate::scratch::Scratch;
use crate::strided::{coalesce_bwd, lda_axpby, lda_cpy, Panel};
use std::fmt;
use tendist_comm::{Communicator, CostModel};
use tendist_core::{Element, Result, TendistError};
use tendist_planner::contraction::Role;
use tendist_planner::shape::{BlockStride, StepShape};

/// Sweep over one stepping index, with the plan it runs per chunk
pub struct SummaStep<C: Communicator> {
    shape: StepShape,
    comms: [Option<C>; 3],
    layer_count: usize,
    layer_index: usize,
    nested: PlanNode<C>,
}

impl<C: Communicator> SummaStep<C> {
    /// Sweep described by `shape`, with one communicator per moving operand.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse` if all three operands move, if the index length is
    /// not a multiple of a moving operand's group, or if a moving operand
    /// lacks a communicator of its group size.
    pub fn new(shape: StepShape, comms: [Option<C>; 3], nested: PlanNode<C>) -> Result<Self> {
        if shape.moving_count() > 2 {
            return Err(TendistError::protocol(format!(
                "index '{}' would move all three operands",
                shape.label
            )));
        }
        if shape.db == 0 || shape.edge_len % shape.db != 0 {
            return Err(TendistError::protocol(format!(
                "index '{}': chunk of {} blocks does not divide {}",
                shape.label, shape.db, shape.edge_len
            )));
        }
        for role in Role::ALL {
            let op = shape.operand(role);
            if op.moving {
                if op.group == 0 || shape.edge_len % op.group != 0 {
                    return Err(TendistError::protocol(format!(
                        "index '{}' of length {} cannot be split over {} processes of {}",
                        shape.label, shape.edge_len, op.group, role
                    )));
                }
                if op.stride.count * op.group != shape.edge_len || op.stride.count < shape.db {
                    return Err(TendistError::protocol(format!(
                        "{} holds {} blocks of index '{}', expected {}",
                        role,
                        op.stride.count,
                        shape.label,
                        shape.edge_len / op.group
                    )));
                }
                match &comms[role.index()] {
                    Some(comm) if comm.size() == op.group => {}
                    _ => {
                        return Err(TendistError::protocol(format!(
                            "{} moves over {} processes without a matching communicator",
                            role, op.group
                        )))
                    }
                }
            } else if shape.holds(role) && op.stride.count != shape.edge_len {
                return Err(TendistError::protocol(format!(
                    "stationary {} holds {} of {} blocks of index '{}'",
                    role, op.stride.count, shape.edge_len, shape.label
                )));
            }
        }
        Ok(Self {
            shape,
            comms,
            layer_count: 1,
            layer_index: 0,
            nested,
        })
    }

    /// Split the sweep over `count` replica layers; this rank walks layer
    /// `index`.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse` if `index >= count`, or if C lacks the swept index:
    /// its partial sums would then need a reduction across layers.
    pub fn with_layers(mut self, count: usize, index: usize) -> Result<Self> {
        if count == 0 || index >= count {
            return Err(TendistError::protocol(format!(
                "layer {} of {} does not exist",
                index, count
            )));
        }
        if count > 1 && !self.shape.holds(Role::C) {
            return Err(TendistError::protocol(format!(
                "layered sweep over '{}' leaves partial sums of C on every layer",
                self.shape.label
            )));
        }
        self.layer_count = count;
        self.layer_index = index;
        Ok(self)
    }

    pub fn shape(&self) -> &StepShape {
        &self.shape
    }

    pub fn nested(&self) -> &PlanNode<C> {
        &self.nested
    }

    pub fn db(&self) -> usize {
        self.shape.db
    }

    pub fn layers(&self) -> (usize, usize) {
        (self.layer_count, self.layer_index)
    }

    /// Chunks this rank visits
    pub fn local_rounds(&self) -> usize {
        self.chunk_starts().count()
    }

    fn chunk_starts(&self) -> impl Iterator<Item = usize> {
        let db = self.shape.db;
        (self.layer_index * db..self.shape.edge_len).step_by(db * self.layer_count)
    }

    /// Communication time of this level alone
    pub fn est_time_fp(&self, cost: &CostModel, elem_size: usize) -> f64 {
        self.shape.est_time_fp(cost, elem_size, self.layer_count)
    }

    /// Time of this level and everything below it
    pub fn est_time_rec(&self, cost: &CostModel, elem_size: usize) -> f64 {
        self.local_rounds() as f64 * self.nested.est_time_rec(cost, elem_size)
            + self.est_time_fp(cost, elem_size)
    }

    /// Scratch bytes of this level alone
    pub fn mem_fp(&self, elem_size: usize) -> usize {
        self.shape.mem_fp(elem_size)
    }

    pub fn mem_rec(&self, elem_size: usize) -> usize {
        self.mem_fp(elem_size) + self.nested.mem_rec(elem_size)
    }

    /// Scratch elements of this level and everything below it
    pub fn scratch_len(&self) -> usize {
        self.shape.scratch_len() + self.nested.scratch_len()
    }

    fn comm(&self, role: Role) -> Result<&C> {
        self.comms[role.index()].as_ref().ok_or_else(|| {
            TendistError::protocol(format!("{} moves without a communicator", role))
        })
    }

    /// Run the sweep. Collective over the world communicator.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn run<T, K>(
        &self,
        a: &[T],
        b: &[T],
        c: &mut [T],
        alpha: T,
        beta: T,
        kernel: &K,
        scratch: Scratch<'_, T>,
    ) -> Result<()>
    where
        T: Element,
        K: LocalKernel<T>,
    {
        let s = &self.shape;
        let (buf_a, rest) = scratch.take(s.buf_len(Role::A))?;
        let (buf_b, rest) = rest.take(s.buf_len(Role::B))?;
        let (buf_c, rest) = rest.take(s.buf_len(Role::C))?;
        let (aux, mut rest) = rest.take(s.aux_len())?;

        tracing::debug!(
            index = %s.label,
            rounds = self.local_rounds(),
            db = s.db,
            moving = s.moving_count(),
            "summa sweep"
        );

        let mut first = true;
        for ib in self.chunk_starts() {
            let a_view: &[T] = if s.holds(Role::A) {
                self.gather(Role::A, ib, a, buf_a, aux)?;
                &*buf_a
            } else {
                a
            };
            let b_view: &[T] = if s.holds(Role::B) {
                self.gather(Role::B, ib, b, buf_b, aux)?;
                &*buf_b
            } else {
                b
            };

            if s.holds(Role::C) {
                self.nested
                    .run(a_view, b_view, buf_c, alpha, T::zero(), kernel, rest.reborrow())?;
                self.write_back(ib, buf_c, c, beta)?;
            } else {
                let scale = if first { beta } else { T::one() };
                self.nested
                    .run(a_view, b_view, c, alpha, scale, kernel, rest.reborrow())?;
            }
            first = false;
        }
        Ok(())
    }

    /// Assemble chunk `ib` of an input operand into `buf`
    fn gather<T: Element>(&self, role: Role, ib: usize, src: &[T], buf: &mut [T], aux: &mut [T]) -> Result<()> {
        let op = self.shape.operand(role);
        let BlockStride { lda, sub_lda, count } = op.stride;
        let db = self.shape.db;
        let src_ld = count * sub_lda;
        let off = ib % count;

        if !op.moving {
            lda_cpy(Panel::new(lda, db * sub_lda), &src[off * sub_lda..], src_ld, buf, db * sub_lda);
            return Ok(());
        }

        let comm = self.comm(role)?;
        let owner = ib / count;
        let head = (count - off).min(db);
        if comm.rank() == owner {
            lda_cpy(Panel::new(lda, head * sub_lda), &src[off * sub_lda..], src_ld, buf, head * sub_lda);
        }
        comm.broadcast(&mut buf[..lda * head * sub_lda], owner)?;

        if head < db {
            // the chunk continues on the next owner
            let tail = db - head;
            if comm.rank() == owner + 1 {
                lda_cpy(Panel::new(lda, tail * sub_lda), src, src_ld, aux, tail * sub_lda);
            }
            comm.broadcast(&mut aux[..lda * tail * sub_lda], owner + 1)?;
            coalesce_bwd(buf, aux, lda, head * sub_lda, tail * sub_lda);
        }
        Ok(())
    }

    /// Fold chunk `ib` of C from `buf` into the local output
    fn write_back<T: Element>(&self, ib: usize, buf: &mut [T], c: &mut [T], beta: T) -> Result<()> {
        let op = self.shape.operand(Role::C);
        let BlockStride { lda, sub_lda, count } = op.stride;
        let db = self.shape.db;
        let buf_ld = db * sub_lda;
        let dst_ld = count * sub_lda;
        let off = ib % count;

        if !op.moving {
            lda_axpby(Panel::new(lda, db * sub_lda), T::one(), buf, buf_ld, beta, &mut c[off * sub_lda..], dst_ld);
            return Ok(());
        }

        let comm = self.comm(Role::C)?;
        comm.all_reduce_sum(buf)?;
        let owner = ib / count;
        let head = (count - off).min(db);
        if comm.rank() == owner {
            lda_axpby(
                Panel::new(lda, head * sub_lda),
                T::one(),
                buf,
                buf_ld,
                beta,
                &mut c[off * sub_lda..],
                dst_ld,
            );
        }
        if head < db && comm.rank() == owner + 1 {
            lda_axpby(
                Panel::new(lda, (db - head) * sub_lda),
                T::one(),
                &buf[head * sub_lda..],
                buf_ld,
                beta,
                c,
                dst_ld,
            );
        }
        Ok(())
    }
}

impl<C: Communicator> fmt::Debug for SummaStep<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SummaStep")
            .field("shape", &self.shape)
            .field("layer_count", &self.layer_count)
            .field("layer_index", &self.layer_index)
            .field("nested", &self.nested)
            .finish()
    }
}

impl<C: Communicator> fmt::Display for SummaStep<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let moving: Vec<String> = Role::ALL
            .into_iter()
            .filter(|&r| self.shape.moving(r))
            .map(|r| r.to_string())
            .collect();
        write!(
            f,
            "summa '{}': {} of {} chunks of {} blocks, moving {}",
            self.shape.label,
            self.local_rounds(),
            self.shape.rounds(),
            self.shape.db,
            moving.join(" ")
        )?;
        if self.layer_count > 1 {
            write!(f, ", layer {} of {}", self.layer_index, self.layer_count)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::LocalSpec;
    use tendist_comm::ThreadComm;
    use tendist_planner::shape::StepOperand;

    fn operand(count: usize, moving: bool, group: usize) -> StepOperand {
        StepOperand {
            stride: BlockStride { lda: 1, sub_lda: 4, count },
            moving,
            axes: if moving { vec![0] } else { Vec::new() },
            group,
        }
    }

    fn leaf() -> PlanNode<ThreadComm> {
        PlanNode::Local(LocalSpec {
            labels: vec!['i', 'k', 'j'],
            block_edge: vec![2, 2, 2],
            dims: [vec![0, 1], vec![1, 2], vec![0, 2]],
            block_size: [4, 4, 4],
            packed: [false; 3],
        })
    }

    fn step(operands: [StepOperand; 3], db: usize) -> StepShape {
        StepShape {
            label: 'k',
            edge_len: 4,
            db,
            operands,
        }
    }

    #[test]
    fn test_three_moving_operands_rejected() {
        let shape = step([operand(2, true, 2), operand(2, true, 2), operand(2, true, 2)], 2);
        let err = SummaStep::new(shape, [None, None, None], leaf()).unwrap_err();
        assert!(matches!(err, TendistError::ProtocolMisuse(_)));
    }

    #[test]
    fn test_indivisible_group_rejected() {
        let shape = step([operand(1, true, 3), operand(4, false, 1), StepOperand::default()], 1);
        let err = SummaStep::new(shape, [None, None, None], leaf()).unwrap_err();
        assert!(matches!(err, TendistError::ProtocolMisuse(_)));
    }

    #[test]
    fn test_missing_communicator_rejected() {
        let shape = step([operand(2, true, 2), operand(4, false, 1), StepOperand::default()], 2);
        let err = SummaStep::new(shape, [None, None, None], leaf()).unwrap_err();
        assert!(err.to_string().contains("communicator"));
    }

    #[test]
    fn test_layers() {
        let shape = step([operand(4, false, 1), operand(4, false, 1), operand(4, false, 1)], 1);
        let s = SummaStep::<ThreadComm>::new(shape.clone(), [None, None, None], leaf()).unwrap();
        assert_eq!(s.local_rounds(), 4);
        let s = s.with_layers(3, 1).unwrap();
        // only chunk 1; the next start is past the end
        assert_eq!(s.local_rounds(), 1);
        assert_eq!(s.layers(), (3, 1));

        let passthrough = step([operand(4, false, 1), operand(4, false, 1), StepOperand::default()], 1);
        let s = SummaStep::<ThreadComm>::new(passthrough, [None, None, None], leaf()).unwrap();
        assert!(s.with_layers(2, 0).is_err());

        let s = SummaStep::<ThreadComm>::new(shape, [None, None, None], leaf()).unwrap();
        assert!(s.with_layers(2, 2).is_err());
    }

    #[test]
    fn test_output_chunk_straddles_two_owners() {
        use crate::kernel::ReferenceKernel;
        use crate::scratch::ScratchArena;

        // 3 x 2 world: A moves along x with 2 blocks per rank, C moves along y
        // with 3 blocks per rank. Chunks of 2 blocks split C's rank boundary at 2..4.
        let results = ThreadComm::run(6, |world| -> Result<Vec<f64>> {
            let (x, y) = (world.rank() % 3, world.rank() / 3);
            let along_x = world.split(y, x)?;
            let along_y = world.split(x, y)?;
            let shape = StepShape {
                label: 'i',
                edge_len: 6,
                db: 2,
                operands: [
                    StepOperand {
                        stride: BlockStride { lda: 1, sub_lda: 1, count: 2 },
                        moving: true,
                        axes: vec![0],
                        group: 3,
                    },
                    StepOperand::default(),
                    StepOperand {
                        stride: BlockStride { lda: 1, sub_lda: 1, count: 3 },
                        moving: true,
                        axes: vec![1],
                        group: 2,
                    },
                ],
            };
            let nested = PlanNode::Local(LocalSpec {
                labels: vec!['i'],
                block_edge: vec![2],
                dims: [vec![0], Vec::new(), vec![0]],
                block_size: [2, 1, 2],
                packed: [false; 3],
            });
            let step = SummaStep::new(shape, [Some(along_x), None, Some(along_y)], nested)?;

            // a(i) = i + 1, b differs per y so the sum over C's group matters
            let a: Vec<f64> = (2 * x..2 * x + 2).map(|i| (i + 1) as f64).collect();
            let b = [(y + 1) as f64];
            let mut c = vec![10.0; 3];
            let mut arena = ScratchArena::try_new(step.scratch_len())?;
            step.run(&a, &b, &mut c, 2.0, 0.5, &ReferenceKernel, arena.frame())?;
            Ok(c)
        });

        // c(i) = 0.5 * 10 + 2 * (1 + 2) * (i + 1)
        for (rank, c) in results.into_iter().enumerate() {
            let expected = if rank / 3 == 0 {
                vec![11.0, 17.0, 23.0]
            } else {
                vec![29.0, 35.0, 41.0]
            };
            assert_eq!(c.unwrap(), expected, "rank {}", rank);
        }
    }

    #[test]
    fn test_estimates_follow_shape() {
        let cost = CostModel::default();
        let shape = step([operand(4, false, 1), operand(4, false, 1), StepOperand::default()], 1);
        let s = SummaStep::<ThreadComm>::new(shape.clone(), [None, None, None], leaf()).unwrap();
        assert_eq!(s.scratch_len(), shape.scratch_len());
        assert_eq!(s.mem_rec(8), shape.mem_fp(8));
        let expected = 4.0 * cost.flop_time(16.0) + shape.est_time_fp(&cost, 8, 1);
        assert!((s.est_time_rec(&cost, 8) - expected).abs() < 1e-15);
    }
}
