use crate::core::models::descriptor::DescriptorValue;
use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("output is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("output is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("field '{field}' is malformed: {reason}")]
    Malformed {
        field: &'static str,
        reason: String,
    },
}

/// Parses the engine's JSON output stream into normalized descriptor values.
///
/// The recognized vocabulary follows the xTB `--json` output file. A
/// recognized field that is present but non-numeric or mis-shaped is a parse
/// failure, never a silent zero; unrecognized fields are ignored. `total
/// energy` is the one required field; an output without it is incomplete.
///
/// | engine field            | descriptor            | shape    |
/// |-------------------------|-----------------------|----------|
/// | `total energy`          | `total_energy`        | scalar   |
/// | `electronic energy`     | `electronic_energy`   | scalar   |
/// | `HOMO-LUMO gap/eV`      | `homo_lumo_gap`       | scalar   |
/// | `dipole`                | `dipole` + `dipole_moment` | 3-vector + scalar |
/// | `partial charges`       | `partial_charges`     | per-atom |
/// | `shielding constants`   | `shielding`           | per-atom |
/// | `polarizability tensor` | `polarizability`      | 3x3      |
pub fn parse_output(text: &str) -> Result<BTreeMap<String, DescriptorValue>, ParseError> {
    let root: Value = serde_json::from_str(text)?;
    let mut values = BTreeMap::new();

    let total = root
        .get("total energy")
        .ok_or(ParseError::MissingField("total energy"))?;
    values.insert(
        "total_energy".to_string(),
        DescriptorValue::Scalar(scalar(total, "total energy")?),
    );

    if let Some(value) = root.get("electronic energy") {
        values.insert(
            "electronic_energy".to_string(),
            DescriptorValue::Scalar(scalar(value, "electronic energy")?),
        );
    }
    if let Some(value) = root.get("HOMO-LUMO gap/eV") {
        values.insert(
            "homo_lumo_gap".to_string(),
            DescriptorValue::Scalar(scalar(value, "HOMO-LUMO gap/eV")?),
        );
    }

    if let Some(value) = root.get("dipole") {
        let components = numeric_array(value, "dipole")?;
        if components.len() != 3 {
            return Err(ParseError::Malformed {
                field: "dipole",
                reason: format!("expected 3 components, found {}", components.len()),
            });
        }
        let norm = components.iter().map(|c| c * c).sum::<f64>().sqrt();
        values.insert(
            "dipole".to_string(),
            DescriptorValue::Tensor {
                shape: vec![3],
                data: components,
            },
        );
        values.insert("dipole_moment".to_string(), DescriptorValue::Scalar(norm));
    }

    if let Some(value) = root.get("partial charges") {
        values.insert(
            "partial_charges".to_string(),
            DescriptorValue::PerAtom(numeric_array(value, "partial charges")?),
        );
    }
    if let Some(value) = root.get("shielding constants") {
        values.insert(
            "shielding".to_string(),
            DescriptorValue::PerAtom(numeric_array(value, "shielding constants")?),
        );
    }

    if let Some(value) = root.get("polarizability tensor") {
        values.insert(
            "polarizability".to_string(),
            square_tensor(value, "polarizability tensor")?,
        );
    }

    Ok(values)
}

fn scalar(value: &Value, field: &'static str) -> Result<f64, ParseError> {
    value.as_f64().ok_or_else(|| ParseError::Malformed {
        field,
        reason: format!("expected a number, found {value}"),
    })
}

fn numeric_array(value: &Value, field: &'static str) -> Result<Vec<f64>, ParseError> {
    let array = value.as_array().ok_or_else(|| ParseError::Malformed {
        field,
        reason: format!("expected an array, found {value}"),
    })?;
    array.iter().map(|v| scalar(v, field)).collect()
}

/// Accepts either a nested row-major matrix or a flat 9-element array for a
/// 3x3 tensor.
fn square_tensor(value: &Value, field: &'static str) -> Result<DescriptorValue, ParseError> {
    let array = value.as_array().ok_or_else(|| ParseError::Malformed {
        field,
        reason: format!("expected an array, found {value}"),
    })?;

    if array.iter().all(|row| row.is_array()) {
        let rows = array.len();
        let mut data = Vec::new();
        let mut cols = None;
        for row in array {
            let row = numeric_array(row, field)?;
            if *cols.get_or_insert(row.len()) != row.len() {
                return Err(ParseError::Malformed {
                    field,
                    reason: "ragged rows".to_string(),
                });
            }
            data.extend(row);
        }
        return Ok(DescriptorValue::Tensor {
            shape: vec![rows, cols.unwrap_or(0)],
            data,
        });
    }

    let data = numeric_array(value, field)?;
    if data.len() != 9 {
        return Err(ParseError::Malformed {
            field,
            reason: format!("expected 9 elements for a 3x3 tensor, found {}", data.len()),
        });
    }
    Ok(DescriptorValue::Tensor {
        shape: vec![3, 3],
        data,
    })
}
