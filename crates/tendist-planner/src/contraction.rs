//! Operands and index correspondence of one contraction
//!
//! A contraction `C = alpha * A * B + beta * C` is described by three
//! [`Operand`]s whose dimensions carry single-character index labels, as in
//! Einstein notation: `ik,kj->ij` is a matrix product. Labels shared by
//! operands must have equal edge lengths.
//!
//! Each label is classified by where it appears:
//!
//! | class        | A | B | C |
//! |--------------|---|---|---|
//! | `Contracted` | x | x |   |
//! | `Weigh`      | x | x | x |
//! | `Free`       | one of A, B | | x |
//! | `Extra`      | in exactly one operand | | |

use std::collections::HashSet;
use std::fmt;
use tendist_core::mapping::TensorMapping;
use tendist_core::symmetry::symmetry_table;
use tendist_core::{Result, Symmetry, TendistError};

/// Position of an operand in `C = A * B`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Role {
    A,
    B,
    C,
}

impl Role {
    pub const ALL: [Role; 3] = [Role::A, Role::B, Role::C];

    /// Position in `[A, B, C]` arrays
    pub fn index(self) -> usize {
        match self {
            Role::A => 0,
            Role::B => 1,
            Role::C => 2,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::A => "A",
            Role::B => "B",
            Role::C => "C",
        };
        f.write_str(name)
    }
}

/// Where an index label appears
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexClass {
    /// In A and B, summed over
    Contracted,
    /// In all three operands
    Weigh,
    /// In C and one input
    Free,
    /// In a single operand; always kept local
    Extra,
}

/// One index label of a contraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexInfo {
    pub label: char,
    pub edge_len: usize,
    /// Dimension carrying the label in A, B and C
    pub dims: [Option<usize>; 3],
    pub class: IndexClass,
}

impl IndexInfo {
    /// Dimension of `role` carrying this label
    pub fn dim(&self, role: Role) -> Option<usize> {
        self.dims[role.index()]
    }

    /// Operands holding this label
    pub fn holders(&self) -> impl Iterator<Item = Role> + '_ {
        Role::ALL
            .into_iter()
            .filter(move |r| self.dims[r.index()].is_some())
    }
}

/// One tensor taking part in a contraction
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Operand {
    edge_len: Vec<usize>,
    sym: Vec<Symmetry>,
    indices: Vec<char>,
    mapping: Option<TensorMapping>,
}

impl Operand {
    /// Operand with edge lengths, symmetry and one label per dimension
    pub fn new(edge_len: &[usize], sym: &[Symmetry], indices: &str) -> Self {
        Self {
            edge_len: edge_len.to_vec(),
            sym: sym.to_vec(),
            indices: indices.chars().collect(),
            mapping: None,
        }
    }

    /// Nonsymmetric operand
    pub fn dense(edge_len: &[usize], indices: &str) -> Self {
        Self::new(edge_len, &vec![Symmetry::NonSymmetric; edge_len.len()], indices)
    }

    pub fn order(&self) -> usize {
        self.edge_len.len()
    }

    pub fn edge_len(&self) -> &[usize] {
        &self.edge_len
    }

    pub fn symmetry(&self) -> &[Symmetry] {
        &self.sym
    }

    pub fn indices(&self) -> &[char] {
        &self.indices
    }

    /// Current mapping, if the operand has been placed
    pub fn mapping(&self) -> Option<&TensorMapping> {
        self.mapping.as_ref()
    }

    /// Place the operand with an explicit mapping
    pub fn set_mapping(&mut self, mapping: TensorMapping) -> Result<()> {
        if mapping.edge_len() != self.edge_len.as_slice() || mapping.symmetry() != self.sym.as_slice()
        {
            return Err(TendistError::dimension_mismatch(
                "Operand::set_mapping",
                format!(
                    "mapping of edges {:?} for an operand of edges {:?}",
                    mapping.edge_len(),
                    self.edge_len
                ),
            ));
        }
        self.mapping = Some(mapping);
        Ok(())
    }

    /// Unmapped layout of this operand, as a starting point for explicit mappings
    pub fn blank_mapping(&self, topology: usize) -> Result<TensorMapping> {
        TensorMapping::new(&self.edge_len, &self.sym, topology)
    }

    fn check(&self, role: Role) -> Result<()> {
        let op = format!("operand {}", role);
        if self.indices.len() != self.order() || self.sym.len() != self.order() {
            return Err(TendistError::dimension_mismatch(
                op,
                format!(
                    "{} labels and {} symmetry entries for {} dimensions",
                    self.indices.len(),
                    self.sym.len(),
                    self.order()
                ),
            ));
        }
        if let Some(d) = self.edge_len.iter().position(|&e| e == 0) {
            return Err(TendistError::dimension_mismatch(
                op,
                format!("dimension {} has zero length", d),
            ));
        }
        let mut seen = HashSet::new();
        for &c in &self.indices {
            if !seen.insert(c) {
                return Err(TendistError::dimension_mismatch(
                    op,
                    format!("index '{}' repeats", c),
                ));
            }
        }
        for (i, j) in symmetry_table(&self.sym) {
            if self.edge_len[i] != self.edge_len[j] {
                return Err(TendistError::dimension_mismatch(
                    op,
                    format!(
                        "symmetric dimensions {} and {} have edges {} and {}",
                        i, j, self.edge_len[i], self.edge_len[j]
                    ),
                ));
            }
        }
        Ok(())
    }
}

/// Validated operands plus their index correspondence
#[derive(Debug, Clone)]
pub struct Contraction {
    operands: [Operand; 3],
    indices: Vec<IndexInfo>,
    element_size: usize,
}

impl Contraction {
    /// Contraction `c = a * b` over the operands' labels.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if an operand's labels do not match its order, a
    /// label repeats within an operand, a label has different edge lengths in
    /// different operands, or symmetric dimensions have unequal edges.
    pub fn new(a: Operand, b: Operand, c: Operand) -> Result<Self> {
        let operands = [a, b, c];
        for role in Role::ALL {
            operands[role.index()].check(role)?;
        }

        let mut indices: Vec<IndexInfo> = Vec::new();
        for role in Role::ALL {
            let op = &operands[role.index()];
            for (d, (&label, &edge)) in op.indices.iter().zip(&op.edge_len).enumerate() {
                match indices.iter_mut().find(|info| info.label == label) {
                    Some(info) => {
                        if info.edge_len != edge {
                            return Err(TendistError::dimension_mismatch(
                                "Contraction::new",
                                format!(
                                    "index '{}' has length {} in {} but {} elsewhere",
                                    label, edge, role, info.edge_len
                                ),
                            ));
                        }
                        info.dims[role.index()] = Some(d);
                    }
                    None => {
                        let mut dims = [None; 3];
                        dims[role.index()] = Some(d);
                        indices.push(IndexInfo {
                            label,
                            edge_len: edge,
                            dims,
                            class: IndexClass::Extra,
                        });
                    }
                }
            }
        }
        for info in &mut indices {
            info.class = match (info.dims[0].is_some(), info.dims[1].is_some(), info.dims[2].is_some()) {
                (true, true, true) => IndexClass::Weigh,
                (true, true, false) => IndexClass::Contracted,
                (true, false, true) | (false, true, true) => IndexClass::Free,
                _ => IndexClass::Extra,
            };
        }

        Ok(Self {
            operands,
            indices,
            element_size: std::mem::size_of::<f64>(),
        })
    }

    /// Build from Einstein notation, e.g. `"ik,kj->ij"`, with dense operands.
    ///
    /// # Examples
    ///
    /// ```
    /// use tendist_planner::contraction::{Contraction, IndexClass};
    ///
    /// let ctr = Contraction::from_einsum("ik,kj->ij", [&[4, 6], &[6, 5], &[4, 5]]).unwrap();
    /// assert_eq!(ctr.index('k').unwrap().class, IndexClass::Contracted);
    /// assert_eq!(ctr.index('i').unwrap().class, IndexClass::Free);
    /// ```
    pub fn from_einsum(spec: &str, edges: [&[usize]; 3]) -> Result<Self> {
        let (inputs, output) = spec.trim().split_once("->").ok_or_else(|| {
            TendistError::dimension_mismatch("Contraction::from_einsum", "missing '->'")
        })?;
        let inputs: Vec<&str> = inputs.split(',').map(str::trim).collect();
        if inputs.len() != 2 {
            return Err(TendistError::dimension_mismatch(
                "Contraction::from_einsum",
                format!("expected two inputs, found {}", inputs.len()),
            ));
        }
        let labels = [inputs[0], inputs[1], output.trim()];
        if let Some(bad) = labels
            .iter()
            .flat_map(|s| s.chars())
            .find(|c| !c.is_ascii_alphabetic())
        {
            return Err(TendistError::dimension_mismatch(
                "Contraction::from_einsum",
                format!("invalid index character '{}'", bad),
            ));
        }
        Self::new(
            Operand::dense(edges[0], labels[0]),
            Operand::dense(edges[1], labels[1]),
            Operand::dense(edges[2], labels[2]),
        )
    }

    /// Bytes per tensor element used by cost and memory estimates
    pub fn with_element_size(mut self, bytes: usize) -> Self {
        self.element_size = bytes;
        self
    }

    pub fn element_size(&self) -> usize {
        self.element_size
    }

    pub fn operand(&self, role: Role) -> &Operand {
        &self.operands[role.index()]
    }

    pub fn operand_mut(&mut self, role: Role) -> &mut Operand {
        &mut self.operands[role.index()]
    }

    /// Labels in order of first appearance in A, B, C
    pub fn indices(&self) -> &[IndexInfo] {
        &self.indices
    }

    pub fn index(&self, label: char) -> Option<&IndexInfo> {
        self.indices.iter().find(|info| info.label == label)
    }

    /// Mappings of all three operands, if every operand is placed
    pub fn mappings(&self) -> Option<[&TensorMapping; 3]> {
        Some([
            self.operands[0].mapping()?,
            self.operands[1].mapping()?,
            self.operands[2].mapping()?,
        ])
    }

    /// Replace all three mappings at once
    pub(crate) fn install(&mut self, mappings: [TensorMapping; 3]) {
        for (op, m) in self.operands.iter_mut().zip(mappings) {
            op.mapping = Some(m);
        }
    }
}

impl fmt::Display for Contraction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let labels: Vec<String> = self
            .operands
            .iter()
            .map(|op| op.indices.iter().collect())
            .collect();
        write!(f, "{},{}->{}", labels[0], labels[1], labels[2])
    }
}
