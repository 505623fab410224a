use crate::error::{CliError, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// The TOML configuration surface. Every option is optional; the merge
/// order is defaults < file < CLI flags. Unknown keys are reported as
/// warnings, never errors, and do not perturb recognized options.
#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileConfig {
    pub energy_unit: Option<String>,
    pub max_workers: Option<usize>,
    pub output_dir: Option<PathBuf>,
    pub engine: Option<FileEngineConfig>,
    pub weighting: Option<FileWeightingConfig>,
    pub calibration: Option<FileCalibrationConfig>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileEngineConfig {
    pub path: Option<PathBuf>,
    pub method: Option<String>,
    pub solvent: Option<String>,
    pub accuracy: Option<f64>,
    pub electronic_temperature: Option<f64>,
    pub charge: Option<i32>,
    pub multiplicity: Option<u32>,
    pub threads: Option<usize>,
    pub memory: Option<String>,
    pub timeout_secs: Option<u64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileWeightingConfig {
    pub temperature: Option<f64>,
}

#[derive(Deserialize, Debug, Default, Clone)]
#[serde(rename_all = "kebab-case")]
pub struct FileCalibrationConfig {
    pub enabled: Option<bool>,
    pub source: Option<String>,
    pub target: Option<String>,
    pub experimental: Option<PathBuf>,
    pub rules: Option<BTreeMap<String, FileCalibrationRule>>,
}

#[derive(Deserialize, Debug, Clone, Copy)]
pub struct FileCalibrationRule {
    pub slope: f64,
    pub intercept: f64,
}

const TOP_LEVEL_KEYS: &[&str] = &[
    "energy-unit",
    "max-workers",
    "output-dir",
    "engine",
    "weighting",
    "calibration",
];
const ENGINE_KEYS: &[&str] = &[
    "path",
    "method",
    "solvent",
    "accuracy",
    "electronic-temperature",
    "charge",
    "multiplicity",
    "threads",
    "memory",
    "timeout-secs",
];
const WEIGHTING_KEYS: &[&str] = &["temperature"];
const CALIBRATION_KEYS: &[&str] = &["enabled", "source", "target", "experimental", "rules"];

/// Collects dotted paths of unrecognized keys. `calibration.rules` entries
/// are element symbols and deliberately not enumerated here; they are
/// validated when the rule set is built.
pub(crate) fn unknown_keys(table: &toml::Table) -> Vec<String> {
    let mut unknown = Vec::new();
    for (key, value) in table {
        if !TOP_LEVEL_KEYS.contains(&key.as_str()) {
            unknown.push(key.clone());
            continue;
        }
        let section_keys = match key.as_str() {
            "engine" => ENGINE_KEYS,
            "weighting" => WEIGHTING_KEYS,
            "calibration" => CALIBRATION_KEYS,
            _ => continue,
        };
        if let Some(section) = value.as_table() {
            for nested in section.keys() {
                if !section_keys.contains(&nested.as_str()) {
                    unknown.push(format!("{key}.{nested}"));
                }
            }
        }
    }
    unknown
}

impl FileConfig {
    pub fn from_file(path: &Path) -> Result<Self> {
        debug!("Loading configuration from file: {:?}", path);
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content).map_err(|e| CliError::FileParsing {
            path: path.to_path_buf(),
            source: e,
        })
    }

    pub fn from_toml_str(content: &str) -> std::result::Result<Self, anyhow::Error> {
        let table: toml::Table = toml::from_str(content)?;
        for key in unknown_keys(&table) {
            warn!(
                "Unrecognized configuration option '{}'; ignoring it. \
                 Recognized options keep their defaults.",
                key
            );
        }
        Ok(strip_unknown(table).try_into()?)
    }
}

/// Removes unrecognized keys before typed deserialization so they can never
/// clash with the schema (e.g. an unknown key holding an unexpected type).
fn strip_unknown(mut table: toml::Table) -> toml::Table {
    table.retain(|key, _| TOP_LEVEL_KEYS.contains(&key));
    for (key, section_keys) in [
        ("engine", ENGINE_KEYS),
        ("weighting", WEIGHTING_KEYS),
        ("calibration", CALIBRATION_KEYS),
    ] {
        if let Some(section) = table.get_mut(key).and_then(|v| v.as_table_mut()) {
            section.retain(|nested, _| section_keys.contains(&nested));
        }
    }
    table
}
