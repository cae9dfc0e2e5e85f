//! Process-local storage layout of a distributed tensor
//!
//! Along a dimension with phase `p`, `phys` owning processes and
//! `virt = p / phys` local blocks, phase index `k` belongs to physical rank
//! `k / virt` as its local block `k % virt`. A global index `g` has phase
//! index `g % p` and in-block offset `g / p` in cyclic layout, or `g / e` and
//! `g % e` in blocked layout, where `e = L / p` is the block edge.
//!
//! Local storage is the sequence of virtual blocks in mixed radix (dimension
//! 0 fastest); each block is dense column-major, or symmetry-packed when the
//! layout is cyclic and the tensor has symmetric groups.
//!
//! A slot is *valid* when its global index is inside the unpadded extent and
//! satisfies the canonical ordering of its symmetric groups. Only valid slots
//! carry tensor content.

use crate::distribution::Distribution;
use crate::element::Element;
use crate::error::{Result, TendistError};
use crate::symmetry::{is_canonical, next_dense, next_packed, packed_offset, packed_size, Symmetry};

/// Owner and storage position of one global element
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotLocation {
    /// Physical coordinate of the owner along each tensor dimension
    pub perank: Vec<usize>,
    /// Offset inside the owner's local buffer
    pub slot: usize,
}

/// Local layout derived from a [`Distribution`]
#[derive(Debug, Clone)]
pub struct LocalLayout<'a> {
    dist: &'a Distribution,
    sym: &'a [Symmetry],
    block_edges: Vec<usize>,
    packed: bool,
    block_size: usize,
}

impl<'a> LocalLayout<'a> {
    /// Layout for `dist` with symmetry `sym`.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `sym` does not match the distribution order, if
    /// an edge is not a multiple of its phase, or if symmetric dimensions
    /// differ in phase or block edge.
    pub fn new(dist: &'a Distribution, sym: &'a [Symmetry]) -> Result<Self> {
        if sym.len() != dist.order {
            return Err(TendistError::dimension_mismatch(
                "LocalLayout::new",
                format!(
                    "symmetry of order {} for a distribution of order {}",
                    sym.len(),
                    dist.order
                ),
            ));
        }
        for d in 0..dist.order {
            if dist.phase[d] == 0 || dist.edge_len[d] % dist.phase[d] != 0 {
                return Err(TendistError::dimension_mismatch(
                    "LocalLayout::new",
                    format!(
                        "padded edge {} of dimension {} is not a multiple of phase {}",
                        dist.edge_len[d], d, dist.phase[d]
                    ),
                ));
            }
        }
        let block_edges: Vec<usize> = (0..dist.order).map(|d| dist.block_edge(d)).collect();
        for d in 0..dist.order.saturating_sub(1) {
            if sym[d].is_linked()
                && (dist.phase[d] != dist.phase[d + 1] || block_edges[d] != block_edges[d + 1])
            {
                return Err(TendistError::dimension_mismatch(
                    "LocalLayout::new",
                    format!(
                        "symmetric dimensions {} and {} have phases {} and {}, blocks {} and {}",
                        d,
                        d + 1,
                        dist.phase[d],
                        dist.phase[d + 1],
                        block_edges[d],
                        block_edges[d + 1]
                    ),
                ));
            }
        }
        let packed = dist.is_cyclic && sym.iter().any(|s| s.is_linked());
        let block_size = if packed {
            packed_size(&block_edges, sym)
        } else {
            block_edges.iter().product()
        };
        Ok(Self {
            dist,
            sym,
            block_edges,
            packed,
            block_size,
        })
    }

    /// Elements per virtual block
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Total local elements
    pub fn local_len(&self) -> usize {
        self.block_size * self.dist.nvirt()
    }

    /// Whether blocks use symmetry-packed storage
    pub fn is_packed(&self) -> bool {
        self.packed
    }

    /// Edge lengths of one virtual block
    pub fn block_edges(&self) -> &[usize] {
        &self.block_edges
    }

    fn global_index(&self, d: usize, phase_idx: usize, offset: usize) -> usize {
        if self.dist.is_cyclic {
            offset * self.dist.phase[d] + phase_idx
        } else {
            phase_idx * self.block_edges[d] + offset
        }
    }

    /// Whether a global index carries tensor content
    pub fn is_valid(&self, global: &[usize]) -> bool {
        global
            .iter()
            .enumerate()
            .all(|(d, &g)| g < self.dist.unpadded_edge(d))
            && is_canonical(self.sym, global)
    }

    /// Visit every local slot of the rank described by the distribution's
    /// `perank`, in storage order, with its global index and validity.
    pub fn for_each_slot<F>(&self, mut f: F)
    where
        F: FnMut(usize, &[usize], bool),
    {
        let order = self.dist.order;
        let mut vblock = vec![0usize; order];
        let mut offset = vec![0usize; order];
        let mut global = vec![0usize; order];
        let mut slot = 0;
        if self.block_size == 0 {
            return;
        }
        loop {
            loop {
                for d in 0..order {
                    let k = self.dist.perank[d] * self.dist.virt_phase[d] + vblock[d];
                    global[d] = self.global_index(d, k, offset[d]);
                }
                f(slot, &global, self.is_valid(&global));
                slot += 1;
                let more = if self.packed {
                    next_packed(&self.block_edges, self.sym, &mut offset)
                } else {
                    next_dense(&self.block_edges, &mut offset)
                };
                if !more {
                    break;
                }
            }
            if !next_dense(&self.dist.virt_phase, &mut vblock) {
                break;
            }
        }
    }

    /// Owner coordinates and local slot of a valid global index
    pub fn locate(&self, global: &[usize]) -> SlotLocation {
        let order = self.dist.order;
        let mut perank = Vec::with_capacity(order);
        let mut offset = Vec::with_capacity(order);
        let mut vblock = 0;
        let mut radix = 1;
        for (d, &g) in global.iter().enumerate() {
            let (k, o) = if self.dist.is_cyclic {
                (g % self.dist.phase[d], g / self.dist.phase[d])
            } else {
                (g / self.block_edges[d], g % self.block_edges[d])
            };
            let virt = self.dist.virt_phase[d];
            perank.push(k / virt);
            vblock += (k % virt) * radix;
            radix *= virt;
            offset.push(o);
        }
        let within = if self.packed {
            packed_offset(&self.block_edges, self.sym, &offset)
        } else {
            let mut lin = 0;
            let mut stride = 1;
            for (d, &o) in offset.iter().enumerate() {
                lin += o * stride;
                stride *= self.block_edges[d];
            }
            lin
        };
        SlotLocation {
            perank,
            slot: vblock * self.block_size + within,
        }
    }
}

/// Column-major linear index of `global` in a dense box of `edges`
pub fn dense_linear(edges: &[usize], global: &[usize]) -> usize {
    let mut lin = 0;
    let mut stride = 1;
    for (&g, &e) in global.iter().zip(edges) {
        lin += g * stride;
        stride *= e;
    }
    lin
}

/// Build this rank's local buffer from a dense, column-major global tensor
/// over the unpadded edges. Padding and non-canonical slots are zero.
pub fn scatter_global<T: Element>(
    dist: &Distribution,
    sym: &[Symmetry],
    global: &[T],
) -> Result<Vec<T>> {
    let layout = LocalLayout::new(dist, sym)?;
    let edges: Vec<usize> = (0..dist.order).map(|d| dist.unpadded_edge(d)).collect();
    let expected: usize = edges.iter().product();
    if global.len() != expected {
        return Err(TendistError::dimension_mismatch(
            "scatter_global",
            format!("global tensor has {} elements, expected {}", global.len(), expected),
        ));
    }
    let mut local = vec![T::zero(); layout.local_len()];
    layout.for_each_slot(|slot, g, valid| {
        if valid {
            local[slot] = global[dense_linear(&edges, g)];
        }
    });
    Ok(local)
}

/// Write this rank's valid local elements into a dense global tensor.
///
/// Non-canonical entries of symmetric tensors are left untouched.
pub fn gather_global<T: Element>(
    dist: &Distribution,
    sym: &[Symmetry],
    local: &[T],
    global: &mut [T],
) -> Result<()> {
    let layout = LocalLayout::new(dist, sym)?;
    if local.len() != layout.local_len() {
        return Err(TendistError::dimension_mismatch(
            "gather_global",
            format!(
                "local buffer has {} elements, layout needs {}",
                local.len(),
                layout.local_len()
            ),
        ));
    }
    let edges: Vec<usize> = (0..dist.order).map(|d| dist.unpadded_edge(d)).collect();
    layout.for_each_slot(|slot, g, valid| {
        if valid {
            global[dense_linear(&edges, g)] = local[slot];
        }
    });
    Ok(())
}
