//! Mapping descriptor chains and per-tensor mappings
//!
//! Every tensor dimension carries a chain of [`MapNode`]s. A physical node
//! distributes the dimension over one grid axis; a virtual node adds local
//! blocks iterated by each process. Nodes live in an arena owned by the
//! tensor's [`TensorMapping`]: slot `d` is the root for dimension `d` and
//! child links are arena indices.
//!
//! The phase of a dimension is the product of all counts on its chain. It is
//! always recomputed from the chain.
//!
//! # Examples
//!
//! ```
//! use tendist_core::mapping::MappingChains;
//!
//! let mut chains = MappingChains::new(2);
//! chains.map_physical(0, 1, 4).unwrap();
//! chains.stretch_virtual(0, 3).unwrap();
//! chains.stretch_virtual(1, 2).unwrap();
//!
//! assert_eq!(chains.phase(0), 12);
//! assert_eq!(chains.phys_phase(0), 4);
//! assert_eq!(chains.virt_phase(0), 3);
//! assert_eq!(chains.physical_axes(1), Vec::<usize>::new());
//! ```

use crate::error::{Result, TendistError};
use crate::symmetry::{packed_size, symmetry_table, Symmetry};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::fmt;

/// Index of a node in a [`MappingChains`] arena
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct NodeId(pub usize);

/// One link of a dimension's mapping chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum MapNode {
    /// The dimension is neither distributed nor virtualized
    Unmapped,
    /// Distributed over `count` processes of grid axis `axis`
    Physical {
        axis: usize,
        count: usize,
        child: Option<NodeId>,
    },
    /// `count` local blocks per process
    Virtual { count: usize, child: Option<NodeId> },
}

impl MapNode {
    fn child(&self) -> Option<NodeId> {
        match *self {
            MapNode::Unmapped => None,
            MapNode::Physical { child, .. } | MapNode::Virtual { child, .. } => child,
        }
    }

    fn set_child(&mut self, id: NodeId) {
        match self {
            MapNode::Unmapped => {}
            MapNode::Physical { child, .. } | MapNode::Virtual { child, .. } => *child = Some(id),
        }
    }
}

/// Arena of mapping chains, one chain per tensor dimension
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MappingChains {
    nodes: Vec<MapNode>,
    order: usize,
}

impl MappingChains {
    /// All dimensions unmapped
    pub fn new(order: usize) -> Self {
        Self {
            nodes: vec![MapNode::Unmapped; order],
            order,
        }
    }

    /// Number of tensor dimensions
    pub fn order(&self) -> usize {
        self.order
    }

    /// Reset every dimension to `Unmapped`, dropping all child nodes
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.nodes.resize(self.order, MapNode::Unmapped);
    }

    /// Walk the chain of dimension `dim` from its root
    pub fn chain(&self, dim: usize) -> impl Iterator<Item = &MapNode> + '_ {
        let mut next = Some(NodeId(dim));
        std::iter::from_fn(move || {
            let id = next?;
            let node = self.nodes.get(id.0)?;
            next = node.child();
            Some(node)
        })
    }

    fn leaf(&self, dim: usize) -> Result<NodeId> {
        if dim >= self.order {
            return Err(TendistError::dimension_mismatch(
                "MappingChains",
                format!("dimension {} of a tensor of order {}", dim, self.order),
            ));
        }
        let mut id = NodeId(dim);
        while let Some(child) = self.nodes[id.0].child() {
            id = child;
        }
        Ok(id)
    }

    fn push_child(&mut self, parent: NodeId, node: MapNode) {
        let id = NodeId(self.nodes.len());
        self.nodes.push(node);
        self.nodes[parent.0].set_child(id);
    }

    /// Total phase: product of physical and virtual counts on the chain
    pub fn phase(&self, dim: usize) -> usize {
        self.chain(dim)
            .map(|n| match *n {
                MapNode::Unmapped => 1,
                MapNode::Physical { count, .. } | MapNode::Virtual { count, .. } => count,
            })
            .product()
    }

    /// Product of the physical counts on the chain
    pub fn phys_phase(&self, dim: usize) -> usize {
        self.chain(dim)
            .map(|n| match *n {
                MapNode::Physical { count, .. } => count,
                _ => 1,
            })
            .product()
    }

    /// Local blocks per process along `dim`
    pub fn virt_phase(&self, dim: usize) -> usize {
        self.phase(dim) / self.phys_phase(dim)
    }

    /// Grid axes the dimension is distributed over, outermost first
    pub fn physical_axes(&self, dim: usize) -> Vec<usize> {
        self.chain(dim)
            .filter_map(|n| match *n {
                MapNode::Physical { axis, .. } => Some(axis),
                _ => None,
            })
            .collect()
    }

    /// Whether any dimension uses grid axis `axis`
    pub fn uses_axis(&self, axis: usize) -> bool {
        (0..self.order).any(|d| self.physical_axes(d).contains(&axis))
    }

    /// Append a physical link for `axis` to the chain of `dim`.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if `dim` is out of range; `ProtocolMisuse` if the
    /// chain already ends in a virtual link.
    pub fn map_physical(&mut self, dim: usize, axis: usize, count: usize) -> Result<()> {
        let node = MapNode::Physical {
            axis,
            count,
            child: None,
        };
        let leaf = self.leaf(dim)?;
        match self.nodes[leaf.0] {
            MapNode::Unmapped => self.nodes[leaf.0] = node,
            MapNode::Physical { .. } => self.push_child(leaf, node),
            MapNode::Virtual { .. } => {
                return Err(TendistError::protocol(format!(
                    "dimension {} is virtualized before axis {} is mapped",
                    dim, axis
                )))
            }
        }
        Ok(())
    }

    /// Multiply the virtual factor of `dim` by `factor`.
    ///
    /// A virtual leaf is scaled in place, a physical leaf gains a virtual
    /// child and an unmapped root becomes virtual. Fails with
    /// `DimensionMismatch` if `dim` is out of range.
    pub fn stretch_virtual(&mut self, dim: usize, factor: usize) -> Result<()> {
        let leaf = self.leaf(dim)?;
        if factor <= 1 {
            return Ok(());
        }
        let stretched = MapNode::Virtual {
            count: factor,
            child: None,
        };
        match self.nodes[leaf.0] {
            MapNode::Virtual { count, child } => {
                self.nodes[leaf.0] = MapNode::Virtual {
                    count: count * factor,
                    child,
                }
            }
            MapNode::Physical { .. } => self.push_child(leaf, stretched),
            MapNode::Unmapped => self.nodes[leaf.0] = stretched,
        }
        Ok(())
    }

    /// Human-readable chain, e.g. `p1(4)->v3`
    pub fn describe(&self, dim: usize) -> String {
        let parts: Vec<String> = self
            .chain(dim)
            .map(|n| match *n {
                MapNode::Unmapped => "-".to_string(),
                MapNode::Physical { axis, count, .. } => format!("p{}({})", axis, count),
                MapNode::Virtual { count, .. } => format!("v{}", count),
            })
            .collect();
        parts.join("->")
    }
}

/// Complete mapping of one tensor onto a topology
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TensorMapping {
    chains: MappingChains,
    topology: usize,
    edge_len: Vec<usize>,
    padding: Vec<usize>,
    sym: Vec<Symmetry>,
    is_cyclic: bool,
    size: usize,
}

impl TensorMapping {
    /// Unmapped tensor with the given unpadded edges and symmetry.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the symmetry vector has the wrong length or a
    /// symmetric group has unequal edge lengths.
    pub fn new(edge_len: &[usize], sym: &[Symmetry], topology: usize) -> Result<Self> {
        if edge_len.len() != sym.len() {
            return Err(TendistError::dimension_mismatch(
                "TensorMapping::new",
                format!(
                    "{} edge lengths but {} symmetry entries",
                    edge_len.len(),
                    sym.len()
                ),
            ));
        }
        for (i, j) in symmetry_table(sym) {
            if edge_len[i] != edge_len[j] {
                return Err(TendistError::dimension_mismatch(
                    "TensorMapping::new",
                    format!(
                        "symmetric dimensions {} and {} have edges {} and {}",
                        i, j, edge_len[i], edge_len[j]
                    ),
                ));
            }
        }
        let mut mapping = Self {
            chains: MappingChains::new(edge_len.len()),
            topology,
            edge_len: edge_len.to_vec(),
            padding: vec![0; edge_len.len()],
            sym: sym.to_vec(),
            is_cyclic: true,
            size: 0,
        };
        mapping.set_padding();
        Ok(mapping)
    }

    /// Switch between cyclic (default) and blocked element layout
    pub fn with_cyclic(mut self, is_cyclic: bool) -> Self {
        self.is_cyclic = is_cyclic;
        self.set_padding();
        self
    }

    /// Descriptor chains
    pub fn chains(&self) -> &MappingChains {
        &self.chains
    }

    /// Mutable descriptor chains; call [`set_padding`](Self::set_padding) after editing
    pub fn chains_mut(&mut self) -> &mut MappingChains {
        &mut self.chains
    }

    /// Replace the chains and the topology they refer to
    pub fn remap(&mut self, chains: MappingChains, topology: usize) -> Result<()> {
        if chains.order() != self.order() {
            return Err(TendistError::dimension_mismatch(
                "TensorMapping::remap",
                format!("chains of order {} for a tensor of order {}", chains.order(), self.order()),
            ));
        }
        self.chains = chains;
        self.topology = topology;
        self.set_padding();
        Ok(())
    }

    /// Number of dimensions
    pub fn order(&self) -> usize {
        self.edge_len.len()
    }

    /// Topology id within the owning session
    pub fn topology(&self) -> usize {
        self.topology
    }

    /// Unpadded edge lengths
    pub fn edge_len(&self) -> &[usize] {
        &self.edge_len
    }

    /// Per-dimension padding
    pub fn padding(&self) -> &[usize] {
        &self.padding
    }

    /// Padded edge length of `dim`
    pub fn padded_edge(&self, dim: usize) -> usize {
        self.edge_len[dim] + self.padding[dim]
    }

    /// Symmetry relations
    pub fn symmetry(&self) -> &[Symmetry] {
        &self.sym
    }

    /// Pairs of dimensions that must share a phase
    pub fn symmetry_table(&self) -> Vec<(usize, usize)> {
        symmetry_table(&self.sym)
    }

    /// Cyclic element layout
    pub fn is_cyclic(&self) -> bool {
        self.is_cyclic
    }

    /// Number of locally stored elements
    pub fn size(&self) -> usize {
        self.size
    }

    /// Phase of every dimension
    pub fn phases(&self) -> Vec<usize> {
        (0..self.order()).map(|d| self.chains.phase(d)).collect()
    }

    /// Number of local virtual blocks
    pub fn nvirt(&self) -> usize {
        (0..self.order()).map(|d| self.chains.virt_phase(d)).product()
    }

    /// Whether every symmetric pair shares its phase
    pub fn is_symmetry_consistent(&self) -> bool {
        self.symmetry_table()
            .iter()
            .all(|&(i, j)| self.chains.phase(i) == self.chains.phase(j))
    }

    /// Whether local blocks use symmetry-packed storage
    pub fn is_packed(&self) -> bool {
        self.is_cyclic && self.sym.iter().any(|s| s.is_linked())
    }

    /// Recompute padding and the local element count from the chains.
    ///
    /// Each edge is padded up to a multiple of its phase.
    pub fn set_padding(&mut self) {
        let mut block = Vec::with_capacity(self.order());
        for d in 0..self.order() {
            let phase = self.chains.phase(d);
            let rem = self.edge_len[d] % phase;
            self.padding[d] = if rem == 0 { 0 } else { phase - rem };
            block.push((self.edge_len[d] + self.padding[d]) / phase);
        }
        let block_size = if self.is_packed() {
            packed_size(&block, &self.sym)
        } else {
            block.iter().product()
        };
        self.size = self.nvirt() * block_size;
    }
}

impl fmt::Display for TensorMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let dims: Vec<String> = (0..self.order())
            .map(|d| format!("{}:{}", self.edge_len[d], self.chains.describe(d)))
            .collect();
        write!(f, "topo {} [{}]", self.topology, dims.join(", "))
    }
}
