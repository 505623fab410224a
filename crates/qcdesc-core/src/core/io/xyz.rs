use crate::core::models::conformer::{ConformerInput, Ensemble, EnsembleError, Site};
use crate::core::utils::elements;
use nalgebra::Point3;
use std::io::Write;
use std::path::Path;
use std::str::FromStr;
use thiserror::Error;
use tracing::debug;

/// Conversion factor from hartree to kcal/mol (CODATA).
pub const HARTREE_TO_KCAL_PER_MOL: f64 = 627.509474;

/// Unit of the energies found on the XYZ comment lines.
///
/// CREST-style ensembles carry absolute hartree energies; other tools emit
/// relative kcal/mol. Either way `Ensemble::new` re-references to the
/// minimum, so only the scale matters here.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EnergyUnit {
    #[default]
    Hartree,
    KcalPerMol,
}

impl FromStr for EnergyUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "hartree" | "au" => Ok(EnergyUnit::Hartree),
            "kcal-mol" | "kcal/mol" | "kcal" => Ok(EnergyUnit::KcalPerMol),
            _ => Err(()),
        }
    }
}

impl EnergyUnit {
    fn to_kcal(self, value: f64) -> f64 {
        match self {
            EnergyUnit::Hartree => value * HARTREE_TO_KCAL_PER_MOL,
            EnergyUnit::KcalPerMol => value,
        }
    }
}

#[derive(Debug, Error)]
pub enum XyzError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Record {record}: invalid atom count line '{line}'")]
    InvalidAtomCount { record: usize, line: String },

    #[error("Record {record}: no parseable energy on comment line '{line}'")]
    MissingEnergy { record: usize, line: String },

    #[error("Record {record}, atom {index}: malformed atom line '{line}'")]
    MalformedAtomLine {
        record: usize,
        index: usize,
        line: String,
    },

    #[error("Record {record}, atom {index}: unknown element symbol '{symbol}'")]
    UnknownElement {
        record: usize,
        index: usize,
        symbol: String,
    },

    #[error("Record {record}: file ended mid-record")]
    TruncatedRecord { record: usize },

    #[error(transparent)]
    Ensemble(#[from] EnsembleError),
}

/// Reads a multi-record XYZ ensemble file.
///
/// Each record is the usual XYZ block (atom count, comment, atom lines);
/// the first numeric token on the comment line is taken as the conformer's
/// energy in `unit`. Conformers are assigned 1-based identities in file
/// order.
pub fn read_ensemble(path: &Path, molecule: &str, unit: EnergyUnit) -> Result<Ensemble, XyzError> {
    let text = std::fs::read_to_string(path)?;
    let ensemble = parse_ensemble(&text, molecule, unit)?;
    debug!(
        molecule,
        conformers = ensemble.len(),
        path = %path.display(),
        "read conformer ensemble"
    );
    Ok(ensemble)
}

pub fn parse_ensemble(text: &str, molecule: &str, unit: EnergyUnit) -> Result<Ensemble, XyzError> {
    let mut lines = text.lines().peekable();
    let mut conformers = Vec::new();
    let mut record = 0;

    while let Some(&line) = lines.peek() {
        if line.trim().is_empty() {
            lines.next();
            continue;
        }
        record += 1;

        let count_line = lines.next().expect("peeked line exists");
        let atom_count: usize =
            count_line
                .trim()
                .parse()
                .map_err(|_| XyzError::InvalidAtomCount {
                    record,
                    line: count_line.to_string(),
                })?;

        let comment = lines
            .next()
            .ok_or(XyzError::TruncatedRecord { record })?;
        let energy = comment
            .split_whitespace()
            .find_map(|token| token.parse::<f64>().ok())
            .ok_or_else(|| XyzError::MissingEnergy {
                record,
                line: comment.to_string(),
            })?;

        let mut geometry = Vec::with_capacity(atom_count);
        for index in 0..atom_count {
            let line = lines
                .next()
                .ok_or(XyzError::TruncatedRecord { record })?;
            let fields: Vec<&str> = line.split_whitespace().collect();
            let [symbol, x, y, z] = fields.as_slice() else {
                return Err(XyzError::MalformedAtomLine {
                    record,
                    index,
                    line: line.to_string(),
                });
            };
            let element =
                elements::normalize_symbol(symbol).ok_or_else(|| XyzError::UnknownElement {
                    record,
                    index,
                    symbol: symbol.to_string(),
                })?;
            let parse = |s: &str| {
                s.parse::<f64>().map_err(|_| XyzError::MalformedAtomLine {
                    record,
                    index,
                    line: line.to_string(),
                })
            };
            geometry.push(Site::new(
                element,
                Point3::new(parse(x)?, parse(y)?, parse(z)?),
            ));
        }

        conformers.push(ConformerInput {
            id: record,
            geometry,
            relative_energy: unit.to_kcal(energy),
        });
    }

    Ok(Ensemble::new(molecule, conformers)?)
}

/// Writes a single conformer as an XYZ file, the geometry format handed to
/// the QM engine.
pub fn write_conformer(conformer: &ConformerInput, writer: &mut impl Write) -> std::io::Result<()> {
    writeln!(writer, "{}", conformer.geometry.len())?;
    writeln!(writer, "conformer {}", conformer.id)?;
    for site in &conformer.geometry {
        writeln!(
            writer,
            "{:<2} {:>14.8} {:>14.8} {:>14.8}",
            site.element, site.position.x, site.position.y, site.position.z
        )?;
    }
    Ok(())
}

pub fn write_conformer_to_path(conformer: &ConformerInput, path: &Path) -> std::io::Result<()> {
    let mut file = std::fs::File::create(path)?;
    write_conformer(conformer, &mut file)
}
