use crate::core::models::descriptor::{AggregatedDescriptor, DescriptorRecord, DescriptorValue};
use crate::core::stats::boltzmann::WeightSet;
use itertools::Itertools;
use std::collections::BTreeMap;
use thiserror::Error;
use tracing::instrument;

#[derive(Debug, Error, PartialEq)]
pub enum AggregationError {
    #[error("No descriptor records to aggregate")]
    EmptyRecordSet,

    #[error("No weight available for conformer {0}")]
    MissingWeight(usize),

    #[error("Lowest-energy conformer {0} is not among the aggregated records")]
    LowestNotPresent(usize),
}

/// A non-fatal aggregation finding, surfaced alongside the result.
#[derive(Debug, Clone, PartialEq)]
pub enum AggregationWarning {
    /// A descriptor was present in only a subset of the records and was
    /// excluded: averaging it over a shrunk weight basis would silently
    /// change the meaning of the aggregate.
    PartialDescriptor {
        name: String,
        present: usize,
        total: usize,
    },
    /// A descriptor changed shape between records and was excluded.
    ShapeMismatch { name: String },
}

impl std::fmt::Display for AggregationWarning {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AggregationWarning::PartialDescriptor {
                name,
                present,
                total,
            } => write!(
                f,
                "descriptor '{}' present in only {} of {} records; excluded from the aggregate",
                name, present, total
            ),
            AggregationWarning::ShapeMismatch { name } => write!(
                f,
                "descriptor '{}' has inconsistent shapes across records; excluded from the aggregate",
                name
            ),
        }
    }
}

/// Combines per-conformer records into one Boltzmann-averaged record.
///
/// Only descriptors present in every contributing record with a consistent
/// shape are averaged; the rest are excluded with a warning. Records are
/// summed in identity order, so the result is reproducible regardless of job
/// completion order. The unweighted mean and the lowest-energy conformer's
/// raw values are emitted alongside the weighted values under distinct tags.
#[instrument(skip_all, fields(records = records.len()))]
pub fn aggregate(
    molecule: &str,
    atom_types: &[String],
    records: &[DescriptorRecord],
    weights: &WeightSet,
    lowest_id: usize,
    excluded: usize,
) -> Result<(AggregatedDescriptor, Vec<AggregationWarning>), AggregationError> {
    if records.is_empty() {
        return Err(AggregationError::EmptyRecordSet);
    }

    let ordered: Vec<&DescriptorRecord> = records
        .iter()
        .sorted_by_key(|r| r.conformer())
        .collect();
    for record in &ordered {
        if !weights.contains_key(&record.conformer()) {
            return Err(AggregationError::MissingWeight(record.conformer()));
        }
    }
    let lowest_record = ordered
        .iter()
        .find(|r| r.conformer() == lowest_id)
        .ok_or(AggregationError::LowestNotPresent(lowest_id))?;

    let mut warnings = Vec::new();
    let mut boltzmann = BTreeMap::new();
    let mut mean = BTreeMap::new();

    let names: Vec<&String> = ordered
        .iter()
        .flat_map(|r| r.values.keys())
        .unique()
        .sorted()
        .collect();

    for name in names {
        let present: Vec<(&DescriptorRecord, &DescriptorValue)> = ordered
            .iter()
            .filter_map(|r| r.values.get(name).map(|v| (*r, v)))
            .collect();

        if present.len() < ordered.len() {
            warnings.push(AggregationWarning::PartialDescriptor {
                name: name.clone(),
                present: present.len(),
                total: ordered.len(),
            });
            continue;
        }

        let reference_shape = present[0].1.shape();
        if present.iter().any(|(_, v)| v.shape() != reference_shape) {
            warnings.push(AggregationWarning::ShapeMismatch { name: name.clone() });
            continue;
        }

        let weighted = combine(&present, |record| weights[&record.conformer()]);
        let uniform = 1.0 / present.len() as f64;
        let arithmetic = combine(&present, |_| uniform);

        boltzmann.insert(name.clone(), weighted);
        mean.insert(name.clone(), arithmetic);
    }

    // Raw block of the best conformer, restricted to the descriptors that
    // survived aggregation so the three blocks stay comparable.
    let lowest: BTreeMap<String, DescriptorValue> = lowest_record
        .values
        .iter()
        .filter(|(name, _)| boltzmann.contains_key(*name))
        .map(|(name, value)| (name.clone(), value.clone()))
        .collect();

    let aggregated = AggregatedDescriptor {
        molecule: molecule.to_string(),
        atom_types: atom_types.to_vec(),
        contributors: ordered.iter().map(|r| r.conformer()).collect(),
        excluded,
        weights: ordered
            .iter()
            .map(|r| (r.conformer(), weights[&r.conformer()]))
            .collect(),
        boltzmann,
        mean,
        lowest,
    };

    Ok((aggregated, warnings))
}

fn combine(
    present: &[(&DescriptorRecord, &DescriptorValue)],
    weight_of: impl Fn(&DescriptorRecord) -> f64,
) -> DescriptorValue {
    let len = present[0].1.flat().len();
    let mut acc = vec![0.0; len];
    for (record, value) in present {
        let w = weight_of(record);
        for (slot, &component) in acc.iter_mut().zip(value.flat()) {
            *slot += w * component;
        }
    }

    match present[0].1 {
        DescriptorValue::Scalar(_) => DescriptorValue::Scalar(acc[0]),
        DescriptorValue::PerAtom(_) => DescriptorValue::PerAtom(acc),
        DescriptorValue::Tensor { shape, .. } => DescriptorValue::Tensor {
            shape: shape.clone(),
            data: acc,
        },
    }
}
