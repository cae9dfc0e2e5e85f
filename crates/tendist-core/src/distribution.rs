//! Distribution snapshots and their wire form
//!
//! A [`Distribution`] freezes a [`TensorMapping`] as seen by one rank: the
//! phase, virtual phase, processor stride, padded edge length, padding and
//! the rank's own physical coordinate along every tensor dimension. It is a
//! value type consumed by redistribution.
//!
//! # Wire form
//!
//! Little-endian, fixed field order:
//!
//! ```text
//! order:i32 is_cyclic:i32 size:i64
//! phase[order]:i32 virt_phase[order]:i32 pe_lda[order]:i32
//! edge_len[order]:i32 padding[order]:i32 perank[order]:i32
//! ```

use crate::error::{Result, TendistError};
use crate::mapping::TensorMapping;
use crate::topology::Topology;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Immutable per-rank snapshot of a tensor mapping
#[derive(Debug, Clone, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Distribution {
    pub order: usize,
    pub is_cyclic: bool,
    /// Local element count
    pub size: usize,
    pub phase: Vec<usize>,
    pub virt_phase: Vec<usize>,
    /// Global-rank stride of the first grid axis of each dimension, 0 if unmapped
    pub pe_lda: Vec<usize>,
    /// Padded edge lengths
    pub edge_len: Vec<usize>,
    pub padding: Vec<usize>,
    /// This rank's physical coordinate along each dimension
    pub perank: Vec<usize>,
}

impl Distribution {
    /// Snapshot `mapping` for `rank` of `topology`.
    ///
    /// # Errors
    ///
    /// `ProtocolMisuse` if a dimension spans grid axes that are not
    /// contiguous, since a single processor stride cannot describe them.
    pub fn from_mapping(mapping: &TensorMapping, topology: &Topology, rank: usize) -> Result<Self> {
        let order = mapping.order();
        let chains = mapping.chains();
        let mut pe_lda = Vec::with_capacity(order);
        let mut perank = Vec::with_capacity(order);

        for d in 0..order {
            let axes = chains.physical_axes(d);
            let mut expected_stride = None;
            let mut local_rank = 0;
            let mut radix = 1;
            for &a in &axes {
                let axis = topology.axes().get(a).ok_or_else(|| {
                    TendistError::protocol(format!("axis {} outside topology {}", a, topology))
                })?;
                if let Some(stride) = expected_stride {
                    if stride != axis.stride {
                        return Err(TendistError::protocol(format!(
                            "dimension {} spans non-contiguous axes {:?}",
                            d, axes
                        )));
                    }
                }
                expected_stride = Some(axis.stride * axis.size);
                local_rank += topology.coord(rank, a) * radix;
                radix *= axis.size;
            }
            pe_lda.push(axes.first().map_or(0, |&a| topology.axes()[a].stride));
            perank.push(local_rank);
        }

        Ok(Self {
            order,
            is_cyclic: mapping.is_cyclic(),
            size: mapping.size(),
            phase: mapping.phases(),
            virt_phase: (0..order).map(|d| chains.virt_phase(d)).collect(),
            pe_lda,
            edge_len: (0..order).map(|d| mapping.padded_edge(d)).collect(),
            padding: mapping.padding().to_vec(),
            perank,
        })
    }

    /// Number of processes a dimension is distributed over
    pub fn phys_phase(&self, dim: usize) -> usize {
        self.phase[dim] / self.virt_phase[dim]
    }

    /// Edge length of one local block along `dim`
    pub fn block_edge(&self, dim: usize) -> usize {
        self.edge_len[dim] / self.phase[dim]
    }

    /// Edge length without padding
    pub fn unpadded_edge(&self, dim: usize) -> usize {
        self.edge_len[dim] - self.padding[dim]
    }

    /// Number of local virtual blocks
    pub fn nvirt(&self) -> usize {
        self.virt_phase.iter().product()
    }

    /// Same phase, virtualization, processor stride, padding and layout
    /// in every dimension: data can be moved with a purely local copy.
    pub fn is_block_compatible(&self, other: &Distribution) -> bool {
        self.order == other.order
            && self.is_cyclic == other.is_cyclic
            && self.phase == other.phase
            && self.virt_phase == other.virt_phase
            && self.pe_lda == other.pe_lda
            && self.padding == other.padding
    }

    /// Whether only the block-to-process assignment differs, so data can be
    /// moved block by block.
    pub fn can_block_reshuffle(&self, other: &Distribution) -> bool {
        self.order == other.order && self.phase == other.phase
    }

    /// Bytes needed for the wire form of an order-`order` distribution
    pub fn serialized_len(order: usize) -> usize {
        2 * 4 + 8 + 6 * order * 4
    }

    /// Encode in the fixed wire form.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if a field does not fit in its wire integer.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(Self::serialized_len(self.order));
        buf.extend_from_slice(&to_i32(self.order, "order")?.to_le_bytes());
        buf.extend_from_slice(&i32::from(self.is_cyclic).to_le_bytes());
        let size = i64::try_from(self.size)
            .map_err(|_| TendistError::dimension_mismatch("Distribution::to_bytes", "size overflows i64"))?;
        buf.extend_from_slice(&size.to_le_bytes());
        for (name, field) in self.fields() {
            for &v in field {
                buf.extend_from_slice(&to_i32(v, name)?.to_le_bytes());
            }
        }
        Ok(buf)
    }

    /// Decode the wire form, checking it against the receiving tensor's order.
    ///
    /// # Errors
    ///
    /// `DimensionMismatch` if the declared order differs from
    /// `expected_order`, the buffer length is wrong or a field is negative.
    pub fn from_bytes(buf: &[u8], expected_order: usize) -> Result<Self> {
        let mut reader = WireReader { buf, pos: 0 };
        let order = reader.read_usize("order")?;
        if order != expected_order {
            return Err(TendistError::dimension_mismatch(
                "Distribution::from_bytes",
                format!(
                    "buffer declares order {} but the tensor has order {}",
                    order, expected_order
                ),
            ));
        }
        if buf.len() != Self::serialized_len(order) {
            return Err(TendistError::dimension_mismatch(
                "Distribution::from_bytes",
                format!(
                    "expected {} bytes, got {}",
                    Self::serialized_len(order),
                    buf.len()
                ),
            ));
        }
        let is_cyclic = reader.read_i32()? != 0;
        let size = usize::try_from(reader.read_i64()?).map_err(|_| {
            TendistError::dimension_mismatch("Distribution::from_bytes", "negative size")
        })?;
        let mut read_vec = |name: &str| -> Result<Vec<usize>> {
            (0..order).map(|_| reader.read_usize(name)).collect()
        };
        let phase = read_vec("phase")?;
        let virt_phase = read_vec("virt_phase")?;
        let pe_lda = read_vec("pe_lda")?;
        let edge_len = read_vec("edge_len")?;
        let padding = read_vec("padding")?;
        let perank = read_vec("perank")?;

        if phase.iter().chain(&virt_phase).any(|&p| p == 0) {
            return Err(TendistError::dimension_mismatch(
                "Distribution::from_bytes",
                "zero phase",
            ));
        }

        Ok(Self {
            order,
            is_cyclic,
            size,
            phase,
            virt_phase,
            pe_lda,
            edge_len,
            padding,
            perank,
        })
    }

    fn fields(&self) -> [(&'static str, &[usize]); 6] {
        [
            ("phase", self.phase.as_slice()),
            ("virt_phase", self.virt_phase.as_slice()),
            ("pe_lda", self.pe_lda.as_slice()),
            ("edge_len", self.edge_len.as_slice()),
            ("padding", self.padding.as_slice()),
            ("perank", self.perank.as_slice()),
        ]
    }
}

fn to_i32(v: usize, field: &str) -> Result<i32> {
    i32::try_from(v).map_err(|_| {
        TendistError::dimension_mismatch(
            "Distribution::to_bytes",
            format!("{} value {} overflows i32", field, v),
        )
    })
}

struct WireReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl WireReader<'_> {
    fn take<const N: usize>(&mut self) -> Result<[u8; N]> {
        let end = self.pos + N;
        let bytes = self.buf.get(self.pos..end).ok_or_else(|| {
            TendistError::dimension_mismatch(
                "Distribution::from_bytes",
                format!("truncated buffer at byte {}", self.pos),
            )
        })?;
        self.pos = end;
        let mut out = [0u8; N];
        out.copy_from_slice(bytes);
        Ok(out)
    }

    fn read_i32(&mut self) -> Result<i32> {
        Ok(i32::from_le_bytes(self.take::<4>()?))
    }

    fn read_i64(&mut self) -> Result<i64> {
        Ok(i64::from_le_bytes(self.take::<8>()?))
    }

    fn read_usize(&mut self, field: &str) -> Result<usize> {
        let v = self.read_i32()?;
        usize::try_from(v).map_err(|_| {
            TendistError::dimension_mismatch(
                "Distribution::from_bytes",
                format!("negative {} value {}", field, v),
            )
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::symmetry::Symmetry::NonSymmetric;

    fn sample() -> (TensorMapping, Topology) {
        let topo = Topology::new(&[2, 3]).unwrap();
        let mut m = TensorMapping::new(&[10, 9], &[NonSymmetric, NonSymmetric], 0).unwrap();
        m.chains_mut().map_physical(0, 1, 3).unwrap();
        m.chains_mut().stretch_virtual(0, 2).unwrap();
        m.chains_mut().map_physical(1, 0, 2).unwrap();
        m.set_padding();
        (m, topo)
    }

    #[test]
    fn test_from_mapping() {
        let (m, topo) = sample();
        // rank 5 sits at coords (1, 2)
        let dist = Distribution::from_mapping(&m, &topo, 5).unwrap();
        assert_eq!(dist.phase, vec![6, 2]);
        assert_eq!(dist.virt_phase, vec![2, 1]);
        assert_eq!(dist.pe_lda, vec![2, 1]);
        assert_eq!(dist.perank, vec![2, 1]);
        assert_eq!(dist.edge_len, vec![12, 10]);
        assert_eq!(dist.padding, vec![2, 1]);
        assert_eq!(dist.size, m.size());
        assert_eq!(dist.block_edge(0), 2);
        assert_eq!(dist.unpadded_edge(1), 9);
    }

    #[test]
    fn test_wire_roundtrip() {
        let (m, topo) = sample();
        let dist = Distribution::from_mapping(&m, &topo, 3).unwrap();
        let bytes = dist.to_bytes().unwrap();
        assert_eq!(bytes.len(), Distribution::serialized_len(2));
        assert_eq!(&bytes[0..4], &2i32.to_le_bytes());
        let back = Distribution::from_bytes(&bytes, 2).unwrap();
        assert_eq!(back, dist);
    }

    #[test]
    fn test_wire_rejects_order_mismatch() {
        let (m, topo) = sample();
        let bytes = Distribution::from_mapping(&m, &topo, 0)
            .unwrap()
            .to_bytes()
            .unwrap();
        let err = Distribution::from_bytes(&bytes, 3).unwrap_err();
        assert!(matches!(err, TendistError::DimensionMismatch { .. }));
        assert!(Distribution::from_bytes(&bytes[..20], 2).is_err());
    }

    #[test]
    fn test_non_contiguous_axes_rejected() {
        let topo = Topology::new(&[2, 2, 2]).unwrap();
        let mut m = TensorMapping::new(&[8], &[NonSymmetric], 0).unwrap();
        m.chains_mut().map_physical(0, 0, 2).unwrap();
        m.chains_mut().map_physical(0, 2, 2).unwrap();
        m.set_padding();
        assert!(Distribution::from_mapping(&m, &topo, 0).is_err());
    }

    #[test]
    fn test_compatibility() {
        let (m, topo) = sample();
        let a = Distribution::from_mapping(&m, &topo, 0).unwrap();
        let mut b = a.clone();
        assert!(a.is_block_compatible(&b));
        b.pe_lda[0] = 1;
        assert!(!a.is_block_compatible(&b));
        assert!(a.can_block_reshuffle(&b));
    }
}
