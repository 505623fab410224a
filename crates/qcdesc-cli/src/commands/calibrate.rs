use crate::cli::CalibrateArgs;
use crate::config::FileConfig;
use crate::error::{CliError, Result};
use qcdesc::core::calibration::{self, CalibrationRule, CalibrationSet};
use qcdesc::core::io::report;
use qcdesc::core::utils::elements;
use qcdesc::engine::error::EngineError;
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::info;

/// Applies a calibration rule set to a previously computed Boltzmann-averaged
/// descriptor file, without re-running any engine jobs.
pub async fn run(args: CalibrateArgs) -> Result<()> {
    let aggregated = report::read_aggregated(&args.input)
        .map_err(|e| CliError::Core(EngineError::from(e)))?;
    info!(
        molecule = %aggregated.molecule,
        atoms = aggregated.atom_types.len(),
        "loaded aggregated descriptors"
    );

    let set = resolve_rule_set(&args)?;
    let experimental = match &args.experim {
        Some(path) => Some(
            calibration::load_experimental_csv(path)
                .map_err(|e| CliError::Core(EngineError::from(e)))?,
        ),
        None => None,
    };

    let atom_types = aggregated.atom_types.clone();
    let (calibrated, residuals) =
        calibration::calibrate(&aggregated, &atom_types, &set, experimental.as_ref())
            .map_err(|e| CliError::Core(EngineError::from(e)))?;

    let output = args.output.clone().unwrap_or_else(|| derive_output(&args.input));
    let file = std::fs::File::create(&output)?;
    serde_json::to_writer_pretty(file, &calibrated)
        .map_err(|e| CliError::Other(e.into()))?;

    println!(
        "✓ Calibrated '{}' into '{}' for {} atom(s); written to {}",
        set.source,
        set.target,
        atom_types.len(),
        output.display()
    );
    if let Some(report) = residuals {
        println!("  Residuals vs. experiment (experimental - calibrated):");
        for (atom, residual) in &report.residuals {
            println!("    atom {atom}: {residual:+.3}");
        }
    }
    Ok(())
}

fn derive_output(input: &PathBuf) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "calibrated".to_string());
    input.with_file_name(format!("{stem}_calibrated.json"))
}

fn resolve_rule_set(args: &CalibrateArgs) -> Result<CalibrationSet> {
    let Some(config_path) = &args.config else {
        return Ok(CalibrationSet::default_nmr());
    };

    let file_config = FileConfig::from_file(config_path)?;
    let Some(calibration) = file_config.calibration else {
        return Ok(CalibrationSet::default_nmr());
    };

    let mut set = CalibrationSet::default_nmr();
    if let Some(source) = calibration.source {
        set.source = source;
    }
    if let Some(target) = calibration.target {
        set.target = target;
    }
    if let Some(rules) = calibration.rules {
        let mut canonical = BTreeMap::new();
        for (symbol, rule) in rules {
            let element = elements::normalize_symbol(&symbol).ok_or_else(|| {
                CliError::Config(format!(
                    "Unknown element symbol '{symbol}' in calibration.rules."
                ))
            })?;
            canonical.insert(
                element.to_string(),
                CalibrationRule {
                    slope: rule.slope,
                    intercept: rule.intercept,
                },
            );
        }
        set.rules = canonical;
    }
    Ok(set)
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcdesc::core::models::descriptor::{AggregatedDescriptor, DescriptorValue};

    fn write_sample_boltz(dir: &std::path::Path) -> PathBuf {
        let mut boltzmann = BTreeMap::new();
        boltzmann.insert(
            "shielding".to_string(),
            DescriptorValue::PerAtom(vec![28.0, 120.0]),
        );
        let aggregated = AggregatedDescriptor {
            molecule: "sample".to_string(),
            atom_types: vec!["H".to_string(), "C".to_string()],
            contributors: vec![1],
            excluded: 0,
            weights: [(1, 1.0)].into_iter().collect(),
            boltzmann: boltzmann.clone(),
            mean: boltzmann.clone(),
            lowest: boltzmann,
        };
        report::write_aggregated(dir, &aggregated).unwrap()
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn calibrates_an_existing_boltz_file() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample_boltz(dir.path());
        let output = dir.path().join("calibrated.json");

        let args = CalibrateArgs {
            input: input.clone(),
            output: Some(output.clone()),
            config: None,
            experim: None,
        };
        run(args).await.unwrap();

        let calibrated = report::read_aggregated(&output).unwrap();
        assert!(calibrated.boltzmann.contains_key("chemical_shift"));
        assert!(calibrated.boltzmann.contains_key("shielding"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn default_output_name_gets_calibrated_suffix() {
        let dir = tempfile::tempdir().unwrap();
        let input = write_sample_boltz(dir.path());

        let args = CalibrateArgs {
            input: input.clone(),
            output: None,
            config: None,
            experim: None,
        };
        run(args).await.unwrap();

        assert!(dir.path().join("sample_boltz_calibrated.json").exists());
    }

    #[test]
    fn rule_set_falls_back_to_builtin_without_config() {
        let args = CalibrateArgs {
            input: PathBuf::from("x.json"),
            output: None,
            config: None,
            experim: None,
        };
        let set = resolve_rule_set(&args).unwrap();
        assert_eq!(set.source, "shielding");
        assert!(set.rules.contains_key("C"));
    }
}
