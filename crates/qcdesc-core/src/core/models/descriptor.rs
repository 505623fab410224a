use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single quantum-chemical descriptor value with an explicit shape tag.
///
/// The pipeline handles three shapes uniformly: molecule-level scalars
/// (total energy, HOMO-LUMO gap), per-atom arrays aligned to the conformer
/// geometry (partial charges, shieldings), and higher-rank tensors stored
/// row-major with an explicit shape (polarizabilities). Aggregation
/// dispatches on this tag rather than inspecting dynamic structure.
///
/// The serde representation is the natural JSON one: a bare number, a flat
/// array, or a `{ "shape": [...], "data": [...] }` object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DescriptorValue {
    /// A single molecule-level value.
    Scalar(f64),
    /// One value per atom, in geometry order.
    PerAtom(Vec<f64>),
    /// A higher-rank array, row-major, with its shape recorded explicitly.
    Tensor { shape: Vec<usize>, data: Vec<f64> },
}

/// The shape tag of a [`DescriptorValue`], used to check cross-conformer
/// consistency before aggregation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueShape {
    Scalar,
    PerAtom(usize),
    Tensor(Vec<usize>),
}

impl DescriptorValue {
    pub fn shape(&self) -> ValueShape {
        match self {
            DescriptorValue::Scalar(_) => ValueShape::Scalar,
            DescriptorValue::PerAtom(values) => ValueShape::PerAtom(values.len()),
            DescriptorValue::Tensor { shape, .. } => ValueShape::Tensor(shape.clone()),
        }
    }

    /// Flat view of the numeric payload, independent of shape.
    pub fn flat(&self) -> &[f64] {
        match self {
            DescriptorValue::Scalar(v) => std::slice::from_ref(v),
            DescriptorValue::PerAtom(values) => values,
            DescriptorValue::Tensor { data, .. } => data,
        }
    }
}

/// Which conformer produced a record, and with what exact invocation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Provenance {
    /// Identity of the conformer within its ensemble.
    pub conformer: usize,
    /// The exact engine command line used, rendered deterministically.
    pub program_call: String,
}

/// The normalized engine output for one conformer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DescriptorRecord {
    pub provenance: Provenance,
    /// Descriptor name to value; `BTreeMap` keeps output ordering stable.
    pub values: BTreeMap<String, DescriptorValue>,
}

impl DescriptorRecord {
    pub fn conformer(&self) -> usize {
        self.provenance.conformer
    }
}

/// The Boltzmann-weighted combination of an ensemble's descriptor records.
///
/// Alongside the weighted values, the unweighted arithmetic mean and the
/// lowest-energy conformer's raw values are carried under distinct tags for
/// comparison, together with full provenance: contributing identities, their
/// weights, and how many conformers were excluded by failures.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedDescriptor {
    pub molecule: String,
    /// Element sequence shared by every conformer, in geometry order.
    pub atom_types: Vec<String>,
    /// Identities of the conformers that contributed, sorted ascending.
    pub contributors: Vec<usize>,
    /// Number of conformers excluded from the aggregate (failed jobs).
    pub excluded: usize,
    /// Normalized Boltzmann weight per contributing conformer.
    pub weights: BTreeMap<usize, f64>,
    /// Boltzmann-weighted descriptor values.
    pub boltzmann: BTreeMap<String, DescriptorValue>,
    /// Unweighted arithmetic mean, for comparison and debugging.
    pub mean: BTreeMap<String, DescriptorValue>,
    /// Raw values of the lowest-energy contributing conformer.
    pub lowest: BTreeMap<String, DescriptorValue>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn shapes_are_tagged_by_variant() {
        assert_eq!(DescriptorValue::Scalar(1.5).shape(), ValueShape::Scalar);
        assert_eq!(
            DescriptorValue::PerAtom(vec![0.1, 0.2]).shape(),
            ValueShape::PerAtom(2)
        );
        assert_eq!(
            DescriptorValue::Tensor {
                shape: vec![3, 3],
                data: vec![0.0; 9]
            }
            .shape(),
            ValueShape::Tensor(vec![3, 3])
        );
    }

    #[test]
    fn scalar_serializes_as_bare_number() {
        let json = serde_json::to_string(&DescriptorValue::Scalar(-42.5)).unwrap();
        assert_eq!(json, "-42.5");
        let back: DescriptorValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, DescriptorValue::Scalar(-42.5));
    }

    #[test]
    fn per_atom_serializes_as_flat_array() {
        let value = DescriptorValue::PerAtom(vec![0.25, -0.5]);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, "[0.25,-0.5]");
        let back: DescriptorValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn tensor_round_trips_with_shape() {
        let value = DescriptorValue::Tensor {
            shape: vec![2, 2],
            data: vec![1.0, 2.0, 3.0, 4.0],
        };
        let json = serde_json::to_string(&value).unwrap();
        let back: DescriptorValue = serde_json::from_str(&json).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn record_round_trips_through_json() {
        let mut values = BTreeMap::new();
        values.insert("total_energy".to_string(), DescriptorValue::Scalar(-5.07));
        values.insert(
            "partial_charges".to_string(),
            DescriptorValue::PerAtom(vec![-0.6, 0.3, 0.3]),
        );
        let record = DescriptorRecord {
            provenance: Provenance {
                conformer: 2,
                program_call: "xtb input.xyz --json".to_string(),
            },
            values,
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: DescriptorRecord = serde_json::from_str(&json).unwrap();
        assert_eq!(back, record);
        assert_eq!(back.conformer(), 2);
    }

    #[test]
    fn flat_view_exposes_all_payloads() {
        assert_eq!(DescriptorValue::Scalar(2.0).flat(), &[2.0]);
        assert_eq!(DescriptorValue::PerAtom(vec![1.0, 2.0]).flat(), &[1.0, 2.0]);
        assert_eq!(
            DescriptorValue::Tensor {
                shape: vec![2],
                data: vec![5.0, 6.0]
            }
            .flat(),
            &[5.0, 6.0]
        );
    }
}
