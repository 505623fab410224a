use crate::core::calibration::CalibrationError;
use crate::core::io::report::ReportError;
use crate::core::io::xyz::XyzError;
use crate::core::models::conformer::EnsembleError;
use crate::core::stats::aggregate::AggregationError;
use crate::engine::config::ConfigError;
use crate::engine::state::FailureManifest;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Configuration error: {source}")]
    Config {
        #[from]
        source: ConfigError,
    },

    #[error("Inconsistent conformer ensemble: {source}")]
    Ensemble {
        #[from]
        source: EnsembleError,
    },

    #[error("No conformer produced a usable descriptor record ({} job(s) failed)", manifest.len())]
    NoUsableConformers { manifest: FailureManifest },

    #[error("Aggregation failed: {source}")]
    Aggregation {
        #[from]
        source: AggregationError,
    },

    #[error("Calibration failed: {source}")]
    Calibration {
        #[from]
        source: CalibrationError,
    },

    #[error("Failed to write descriptor output: {source}")]
    Report {
        #[from]
        source: ReportError,
    },

    #[error("Failed to read conformer ensemble: {source}")]
    EnsembleInput {
        #[from]
        source: XyzError,
    },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
