//! Post-hoc linear recalibration of per-atom descriptors.
//!
//! Raw magnetic shieldings from a QM engine are not directly comparable to
//! experimental chemical shifts; a per-element affine map closes the gap.
//! Rules can be loaded from a TOML table or taken from the built-in NMR set,
//! and an optional experimental reference table yields signed residuals.

use crate::core::models::descriptor::{AggregatedDescriptor, DescriptorValue};
use crate::core::utils::elements;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;

/// A per-atom-type affine mapping, applied as `intercept + slope * raw`.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
pub struct CalibrationRule {
    pub slope: f64,
    pub intercept: f64,
}

impl CalibrationRule {
    pub fn apply(&self, raw: f64) -> f64 {
        self.intercept + self.slope * raw
    }
}

/// A named rule set: which per-atom descriptor to calibrate, what to call
/// the calibrated result, and one rule per element symbol. Elements absent
/// from the map pass through uncalibrated.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    pub source: String,
    pub target: String,
    pub rules: BTreeMap<String, CalibrationRule>,
}

/// Signed residuals against experimental references, keyed by atom index.
/// Attached next to the calibrated record, never altering it.
#[derive(Debug, Clone, PartialEq)]
pub struct ResidualReport {
    pub descriptor: String,
    pub residuals: BTreeMap<usize, f64>,
}

#[derive(Debug, Error)]
pub enum CalibrationError {
    #[error("Aggregate has no per-atom descriptor '{0}' to calibrate")]
    MissingSource(String),

    #[error("Descriptor '{0}' is not per-atom; calibration applies to per-atom values only")]
    NotPerAtom(String),

    #[error("Atom type list has {found} entries, per-atom descriptor '{name}' has {expected}")]
    AtomTypeLengthMismatch {
        name: String,
        expected: usize,
        found: usize,
    },

    #[error("Unknown element symbol '{0}' in calibration rules")]
    UnknownElement(String),

    #[error("Failed to read calibration rules: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse calibration rules: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("Failed to read experimental references: {0}")]
    Csv(#[from] csv::Error),
}

impl CalibrationSet {
    /// The built-in NMR rule set for carbon and hydrogen shieldings,
    /// obtained from a linear fit of GFN2 isotropic shieldings against
    /// experimental shifts and expressed as `shift = intercept + slope *
    /// shielding`.
    pub fn default_nmr() -> Self {
        let mut rules = BTreeMap::new();
        rules.insert(
            "C".to_string(),
            CalibrationRule {
                slope: -0.9490,
                intercept: 172.5173,
            },
        );
        rules.insert(
            "H".to_string(),
            CalibrationRule {
                slope: -0.9273,
                intercept: 29.5552,
            },
        );
        Self {
            source: "shielding".to_string(),
            target: "chemical_shift".to_string(),
            rules,
        }
    }

    /// Loads a rule set from a TOML table of the form
    /// `C = { slope = -0.9490, intercept = 172.5173 }`, one entry per
    /// element. Element symbols are case-normalized and validated.
    pub fn from_toml_str(
        source: &str,
        target: &str,
        text: &str,
    ) -> Result<Self, CalibrationError> {
        let raw: BTreeMap<String, CalibrationRule> = toml::from_str(text)?;
        let mut rules = BTreeMap::new();
        for (symbol, rule) in raw {
            let canonical = elements::normalize_symbol(&symbol)
                .ok_or_else(|| CalibrationError::UnknownElement(symbol.clone()))?;
            rules.insert(canonical.to_string(), rule);
        }
        Ok(Self {
            source: source.to_string(),
            target: target.to_string(),
            rules,
        })
    }

    pub fn load(source: &str, target: &str, path: &Path) -> Result<Self, CalibrationError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_toml_str(source, target, &text)
    }
}

/// Reads experimental reference values from a headered CSV with
/// `atom_index,value` rows (indices are 0-based positions in the geometry).
pub fn load_experimental_csv(path: &Path) -> Result<BTreeMap<usize, f64>, CalibrationError> {
    #[derive(Deserialize)]
    struct Row {
        atom_index: usize,
        value: f64,
    }

    let mut reader = csv::Reader::from_path(path)?;
    let mut references = BTreeMap::new();
    for row in reader.deserialize() {
        let row: Row = row?;
        references.insert(row.atom_index, row.value);
    }
    Ok(references)
}

/// Produces a calibrated copy of `aggregated`.
///
/// For the configured source descriptor, each atom's element is looked up
/// positionally in `atom_types`; if a rule exists the affine map is applied,
/// otherwise the raw value passes through. The calibrated array is inserted
/// under the rule set's target name in every block that carries the source
/// (Boltzmann, mean, lowest); the input record is left untouched. With
/// experimental references, signed residuals (`experimental - calibrated`
/// against the Boltzmann block) are reported separately.
pub fn calibrate(
    aggregated: &AggregatedDescriptor,
    atom_types: &[String],
    set: &CalibrationSet,
    experimental: Option<&BTreeMap<usize, f64>>,
) -> Result<(AggregatedDescriptor, Option<ResidualReport>), CalibrationError> {
    let mut result = aggregated.clone();

    if !result.boltzmann.contains_key(&set.source) {
        return Err(CalibrationError::MissingSource(set.source.clone()));
    }

    for block in [&mut result.boltzmann, &mut result.mean, &mut result.lowest] {
        if let Some(value) = block.get(&set.source) {
            let calibrated = calibrate_value(&set.source, value, atom_types, set)?;
            block.insert(set.target.clone(), calibrated);
        }
    }

    let residuals = match experimental {
        Some(references) => {
            let Some(DescriptorValue::PerAtom(calibrated)) = result.boltzmann.get(&set.target)
            else {
                unreachable!("target was inserted as per-atom above");
            };
            let residuals: BTreeMap<usize, f64> = references
                .iter()
                .filter_map(|(&index, &reference)| {
                    calibrated.get(index).map(|&value| (index, reference - value))
                })
                .collect();
            debug!(
                descriptor = %set.target,
                n = residuals.len(),
                "computed experimental residuals"
            );
            Some(ResidualReport {
                descriptor: set.target.clone(),
                residuals,
            })
        }
        None => None,
    };

    Ok((result, residuals))
}

fn calibrate_value(
    name: &str,
    value: &DescriptorValue,
    atom_types: &[String],
    set: &CalibrationSet,
) -> Result<DescriptorValue, CalibrationError> {
    let DescriptorValue::PerAtom(raw) = value else {
        return Err(CalibrationError::NotPerAtom(name.to_string()));
    };
    if raw.len() != atom_types.len() {
        return Err(CalibrationError::AtomTypeLengthMismatch {
            name: name.to_string(),
            expected: raw.len(),
            found: atom_types.len(),
        });
    }

    let calibrated = raw
        .iter()
        .zip(atom_types)
        .map(|(&value, element)| match set.rules.get(element) {
            Some(rule) => rule.apply(value),
            None => value,
        })
        .collect();
    Ok(DescriptorValue::PerAtom(calibrated))
}
