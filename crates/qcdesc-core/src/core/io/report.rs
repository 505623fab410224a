use crate::core::models::descriptor::{AggregatedDescriptor, DescriptorRecord};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("I/O error writing report: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Writes one conformer's record as `<molecule>_conf_<id>.json` under `dir`.
pub fn write_record(
    dir: &Path,
    molecule: &str,
    record: &DescriptorRecord,
) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("{}_conf_{}.json", molecule, record.conformer()));
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, record)?;
    debug!(path = %path.display(), "wrote conformer record");
    Ok(path)
}

/// Writes the Boltzmann-averaged record as `<molecule>_boltz.json` under `dir`.
pub fn write_aggregated(
    dir: &Path,
    aggregated: &AggregatedDescriptor,
) -> Result<PathBuf, ReportError> {
    let path = dir.join(format!("{}_boltz.json", aggregated.molecule));
    let file = std::fs::File::create(&path)?;
    serde_json::to_writer_pretty(file, aggregated)?;
    debug!(path = %path.display(), "wrote aggregated record");
    Ok(path)
}

/// Reads an aggregated record back, for post-hoc calibration runs.
pub fn read_aggregated(path: &Path) -> Result<AggregatedDescriptor, ReportError> {
    let file = std::fs::File::open(path)?;
    Ok(serde_json::from_reader(file)?)
}
