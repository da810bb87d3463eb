//! Reconstruction error metrics.
//!
//! Per field, the mean absolute error and the mean absolute percentage error
//! `100 * |a - b| / (1e-6 + |a|)` are averaged over the elements of each
//! packet, then over packets. Auxiliary arrays are not compared.

use std::collections::BTreeMap;

use crate::error::{PclError, Result};
use crate::field::FieldArray;
use crate::packet::{Packet, PacketSource};

/// Offset keeping the percentage error finite for zero-valued originals.
pub const MAPE_EPSILON: f64 = 1e-6;

/// Error of one field, averaged over packets.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldError {
    pub mae: f64,
    pub mape: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct FidelityReport {
    pub packets: usize,
    pub fields: BTreeMap<String, FieldError>,
}

impl FidelityReport {
    /// True when every field reconstructed bit-exactly.
    pub fn is_exact(&self) -> bool {
        self.fields.values().all(|e| e.mae == 0.0)
    }

    /// Largest per-field MAPE.
    pub fn worst_mape(&self) -> f64 {
        self.fields.values().map(|e| e.mape).fold(0.0, f64::max)
    }
}

/// Mean absolute and mean absolute percentage error between two arrays.
pub fn array_error(original: &FieldArray, decoded: &FieldArray) -> Result<FieldError> {
    if original.element_type() != decoded.element_type() {
        return Err(PclError::TypeMismatch {
            expected: original.element_type().name(),
            found: decoded.element_type().name(),
        });
    }
    if original.shape() != decoded.shape() {
        return Err(PclError::CorruptLayout(format!(
            "shape {:?} compared against {:?}",
            original.shape(),
            decoded.shape()
        )));
    }
    if original.is_empty() {
        return Ok(FieldError::default());
    }

    let (mut abs, mut pct) = (0.0, 0.0);
    for (a, b) in original.to_f64_vec().into_iter().zip(decoded.to_f64_vec()) {
        let diff = (a - b).abs();
        abs += diff;
        pct += 100.0 * diff / (MAPE_EPSILON + a.abs());
    }

    let n = original.len() as f64;
    Ok(FieldError {
        mae: abs / n,
        mape: pct / n,
    })
}

/// Running per-field averages over packet pairs.
#[derive(Debug, Default)]
pub struct FidelityAccumulator {
    packets: usize,
    sums: BTreeMap<String, FieldError>,
}

impl FidelityAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Compare one packet pair. Fields of `original` must all be present in `decoded`.
    pub fn add(&mut self, original: &Packet, decoded: &Packet) -> Result<()> {
        if original.timestamp != decoded.timestamp {
            return Err(PclError::ConsistencyError(format!(
                "packet {} has timestamp {} in one stream and {} in the other",
                self.packets, original.timestamp, decoded.timestamp
            )));
        }

        for (name, array) in &original.fields {
            let other = decoded.fields.get(name).ok_or_else(|| {
                PclError::ConsistencyError(format!("field '{name}' missing from packet {}", self.packets))
            })?;
            let error = array_error(array, other)?;
            let sum = self.sums.entry(name.clone()).or_default();
            sum.mae += error.mae;
            sum.mape += error.mape;
        }
        self.packets += 1;
        Ok(())
    }

    pub fn finish(self) -> FidelityReport {
        let n = self.packets.max(1) as f64;
        FidelityReport {
            packets: self.packets,
            fields: self
                .sums
                .into_iter()
                .map(|(name, sum)| {
                    (
                        name,
                        FieldError {
                            mae: sum.mae / n,
                            mape: sum.mape / n,
                        },
                    )
                })
                .collect(),
        }
    }
}

fn next_valid(source: &mut dyn PacketSource) -> Result<Option<Packet>> {
    while let Some(packet) = source.next_packet()? {
        if packet.has_valid_timestamp() {
            return Ok(Some(packet));
        }
    }
    Ok(None)
}

/// Compare two packet streams pairwise, skipping invalid-timestamp packets
/// on both sides (archives never hold them).
pub fn compare(original: &mut dyn PacketSource, decoded: &mut dyn PacketSource) -> Result<FidelityReport> {
    let mut acc = FidelityAccumulator::new();
    loop {
        match (next_valid(original)?, next_valid(decoded)?) {
            (Some(a), Some(b)) => acc.add(&a, &b)?,
            (None, None) => break,
            (Some(_), None) | (None, Some(_)) => {
                return Err(PclError::ConsistencyError(format!(
                    "packet streams differ in length after {} packets",
                    acc.packets
                )));
            }
        }
    }

    let report = acc.finish();
    tracing::debug!("Compared {} packets across {} fields", report.packets, report.fields.len());
    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{ElementType, FieldType};
    use crate::packet::MemorySource;

    fn packet(ts: u64, values: &[u16]) -> Packet {
        Packet::new(ts).with_field(
            "signal",
            FieldArray::from_values(vec![1, values.len()], values).unwrap(),
        )
    }

    fn source(packets: Vec<Packet>) -> MemorySource {
        MemorySource::new(vec![FieldType::new("signal", ElementType::U16)], packets)
    }

    #[test]
    fn test_identical_arrays_are_exact() {
        let a = FieldArray::from_values(vec![3], &[1.5f32, -2.0, 0.0]).unwrap();
        assert_eq!(array_error(&a, &a).unwrap(), FieldError::default());
    }

    #[test]
    fn test_error_values() {
        let a = FieldArray::from_values(vec![2], &[100u16, 200]).unwrap();
        let b = FieldArray::from_values(vec![2], &[110u16, 200]).unwrap();
        let error = array_error(&a, &b).unwrap();

        assert!((error.mae - 5.0).abs() < 1e-12);
        // (10% + 0%) / 2
        assert!((error.mape - 5.0).abs() < 1e-6);
    }

    #[test]
    fn test_type_and_shape_mismatch() {
        let a = FieldArray::from_values(vec![2], &[1u16, 2]).unwrap();
        let b = FieldArray::from_values(vec![2], &[1u32, 2]).unwrap();
        let c = FieldArray::from_values(vec![1, 2], &[1u16, 2]).unwrap();

        assert!(matches!(array_error(&a, &b), Err(PclError::TypeMismatch { .. })));
        assert!(matches!(array_error(&a, &c), Err(PclError::CorruptLayout(_))));
    }

    #[test]
    fn test_compare_averages_over_packets() {
        let mut original = source(vec![packet(0, &[5, 5]), packet(1, &[10, 10]), packet(2, &[10, 10])]);
        let mut decoded = source(vec![packet(1, &[10, 10]), packet(2, &[12, 12])]);

        let report = compare(&mut original, &mut decoded).unwrap();
        assert_eq!(report.packets, 2);
        assert!(!report.is_exact());
        assert!((report.fields["signal"].mae - 1.0).abs() < 1e-12);
        assert!((report.worst_mape() - 10.0).abs() < 1e-4);
    }

    #[test]
    fn test_compare_length_mismatch() {
        let mut original = source(vec![packet(1, &[1]), packet(2, &[2])]);
        let mut decoded = source(vec![packet(1, &[1])]);

        assert!(matches!(
            compare(&mut original, &mut decoded),
            Err(PclError::ConsistencyError(_))
        ));
    }
}
