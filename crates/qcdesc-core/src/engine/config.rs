use crate::core::calibration::CalibrationSet;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error, PartialEq, Clone)]
pub enum ConfigError {
    #[error("Missing required parameter: {0}")]
    MissingParameter(&'static str),

    #[error("Electronic temperature must be positive and finite, got {0} K")]
    InvalidElectronicTemperature(f64),

    #[error("Weighting temperature must be positive and finite, got {0} K")]
    InvalidWeightingTemperature(f64),

    #[error("Accuracy must be positive and finite, got {0}")]
    InvalidAccuracy(f64),

    #[error("Multiplicity must be at least 1, got {0}")]
    InvalidMultiplicity(u32),

    #[error("Worker count must be at least 1")]
    ZeroWorkers,

    #[error("Per-job thread count must be at least 1")]
    ZeroJobThreads,

    #[error("Job timeout must be non-zero")]
    ZeroTimeout,
}

/// The QM method requested from the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    GfnFf,
    Gfn0,
    Gfn1,
    Gfn2,
}

impl Method {
    /// Command-line arguments selecting this method.
    pub fn as_args(&self) -> Vec<String> {
        match self {
            Method::GfnFf => vec!["--gfnff".to_string()],
            Method::Gfn0 => vec!["--gfn".to_string(), "0".to_string()],
            Method::Gfn1 => vec!["--gfn".to_string(), "1".to_string()],
            Method::Gfn2 => vec!["--gfn".to_string(), "2".to_string()],
        }
    }
}

impl FromStr for Method {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "gfnff" | "gfn-ff" => Ok(Method::GfnFf),
            "gfn0" | "gfn0-xtb" => Ok(Method::Gfn0),
            "gfn1" | "gfn1-xtb" => Ok(Method::Gfn1),
            "gfn2" | "gfn2-xtb" => Ok(Method::Gfn2),
            other => Err(format!("unknown method '{other}'")),
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Method::GfnFf => write!(f, "GFN-FF"),
            Method::Gfn0 => write!(f, "GFN0-xTB"),
            Method::Gfn1 => write!(f, "GFN1-xTB"),
            Method::Gfn2 => write!(f, "GFN2-xTB"),
        }
    }
}

/// Resolved parameters for one QM invocation, identical across all
/// conformers of a batch and immutable once the batch starts.
#[derive(Debug, Clone, PartialEq)]
pub struct JobParameters {
    pub engine_path: PathBuf,
    pub method: Method,
    pub solvent: Option<String>,
    pub electronic_temperature: f64,
    pub accuracy: f64,
    pub charge: i32,
    pub multiplicity: u32,
    pub threads_per_job: usize,
    /// Per-process stack memory budget, passed through as `OMP_STACKSIZE`.
    pub memory: String,
    pub timeout: Duration,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WeightingConfig {
    /// Thermodynamic temperature for Boltzmann population weights, in K.
    pub temperature: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationConfig {
    pub set: CalibrationSet,
    /// Optional CSV of experimental reference values (`atom_index,value`).
    pub experimental: Option<PathBuf>,
}

/// The complete, validated configuration for one batch.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchConfig {
    pub job: JobParameters,
    pub weighting: WeightingConfig,
    pub max_workers: usize,
    pub calibration: Option<CalibrationConfig>,
    pub output_dir: PathBuf,
}

#[derive(Default)]
pub struct BatchConfigBuilder {
    engine_path: Option<PathBuf>,
    method: Option<Method>,
    solvent: Option<String>,
    electronic_temperature: Option<f64>,
    accuracy: Option<f64>,
    charge: Option<i32>,
    multiplicity: Option<u32>,
    threads_per_job: Option<usize>,
    memory: Option<String>,
    timeout: Option<Duration>,
    weighting_temperature: Option<f64>,
    max_workers: Option<usize>,
    calibration: Option<CalibrationConfig>,
    output_dir: Option<PathBuf>,
}

impl BatchConfigBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn engine_path(mut self, path: PathBuf) -> Self {
        self.engine_path = Some(path);
        self
    }
    pub fn method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }
    pub fn solvent(mut self, solvent: Option<String>) -> Self {
        self.solvent = solvent;
        self
    }
    pub fn electronic_temperature(mut self, kelvin: f64) -> Self {
        self.electronic_temperature = Some(kelvin);
        self
    }
    pub fn accuracy(mut self, accuracy: f64) -> Self {
        self.accuracy = Some(accuracy);
        self
    }
    pub fn charge(mut self, charge: i32) -> Self {
        self.charge = Some(charge);
        self
    }
    pub fn multiplicity(mut self, multiplicity: u32) -> Self {
        self.multiplicity = Some(multiplicity);
        self
    }
    pub fn threads_per_job(mut self, threads: usize) -> Self {
        self.threads_per_job = Some(threads);
        self
    }
    pub fn memory(mut self, memory: &str) -> Self {
        self.memory = Some(memory.to_string());
        self
    }
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
    pub fn weighting_temperature(mut self, kelvin: f64) -> Self {
        self.weighting_temperature = Some(kelvin);
        self
    }
    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }
    pub fn calibration(mut self, calibration: Option<CalibrationConfig>) -> Self {
        self.calibration = calibration;
        self
    }
    pub fn output_dir(mut self, dir: PathBuf) -> Self {
        self.output_dir = Some(dir);
        self
    }

    pub fn build(self) -> Result<BatchConfig, ConfigError> {
        let job = JobParameters {
            engine_path: self.engine_path.unwrap_or_else(|| PathBuf::from("xtb")),
            method: self.method.ok_or(ConfigError::MissingParameter("method"))?,
            solvent: self.solvent,
            electronic_temperature: self
                .electronic_temperature
                .ok_or(ConfigError::MissingParameter("electronic_temperature"))?,
            accuracy: self
                .accuracy
                .ok_or(ConfigError::MissingParameter("accuracy"))?,
            charge: self.charge.ok_or(ConfigError::MissingParameter("charge"))?,
            multiplicity: self
                .multiplicity
                .ok_or(ConfigError::MissingParameter("multiplicity"))?,
            threads_per_job: self
                .threads_per_job
                .ok_or(ConfigError::MissingParameter("threads_per_job"))?,
            memory: self.memory.ok_or(ConfigError::MissingParameter("memory"))?,
            timeout: self.timeout.ok_or(ConfigError::MissingParameter("timeout"))?,
        };
        let weighting = WeightingConfig {
            temperature: self
                .weighting_temperature
                .ok_or(ConfigError::MissingParameter("weighting_temperature"))?,
        };
        let config = BatchConfig {
            job,
            weighting,
            max_workers: self
                .max_workers
                .ok_or(ConfigError::MissingParameter("max_workers"))?,
            calibration: self.calibration,
            output_dir: self
                .output_dir
                .ok_or(ConfigError::MissingParameter("output_dir"))?,
        };
        config.validate()?;
        Ok(config)
    }
}

impl BatchConfig {
    /// Batch-start validation; any violation here is fatal before the first
    /// job is dispatched. Accuracy and electronic temperature are opaque
    /// engine parameters validated for range only.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let job = &self.job;
        if !job.electronic_temperature.is_finite() || job.electronic_temperature <= 0.0 {
            return Err(ConfigError::InvalidElectronicTemperature(
                job.electronic_temperature,
            ));
        }
        if !self.weighting.temperature.is_finite() || self.weighting.temperature <= 0.0 {
            return Err(ConfigError::InvalidWeightingTemperature(
                self.weighting.temperature,
            ));
        }
        if !job.accuracy.is_finite() || job.accuracy <= 0.0 {
            return Err(ConfigError::InvalidAccuracy(job.accuracy));
        }
        if job.multiplicity < 1 {
            return Err(ConfigError::InvalidMultiplicity(job.multiplicity));
        }
        if self.max_workers == 0 {
            return Err(ConfigError::ZeroWorkers);
        }
        if job.threads_per_job == 0 {
            return Err(ConfigError::ZeroJobThreads);
        }
        if job.timeout.is_zero() {
            return Err(ConfigError::ZeroTimeout);
        }
        Ok(())
    }
}
