use super::defaults::DefaultsConfig;
use super::file::{FileCalibrationConfig, FileConfig};
use super::models::AppConfig;
use crate::cli::RunArgs;
use crate::error::{CliError, Result};
use qcdesc::core::calibration::{CalibrationRule, CalibrationSet};
use qcdesc::core::io::xyz::EnergyUnit;
use qcdesc::core::utils::elements;
use qcdesc::engine::config::{BatchConfigBuilder, CalibrationConfig, Method};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

pub fn build_config(args: &RunArgs) -> Result<AppConfig> {
    let defaults = DefaultsConfig::default();

    let file_config = if let Some(config_path) = &args.config {
        FileConfig::from_file(config_path)?
    } else {
        FileConfig::default()
    };
    let mut file_config = apply_set_values(file_config, &args.set_values)?;

    let engine_file = file_config.engine.take().unwrap_or_default();
    let weighting_file = file_config.weighting.take().unwrap_or_default();

    let molecule = match &args.name {
        Some(name) => name.clone(),
        None => args
            .input
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .ok_or_else(|| {
                CliError::Argument(format!(
                    "Cannot derive a molecule name from input path {:?}; pass --name.",
                    args.input
                ))
            })?,
    };

    let method_text = args
        .method
        .clone()
        .or(engine_file.method)
        .unwrap_or_else(|| defaults.method.clone());
    let method = Method::from_str(&method_text).map_err(CliError::Argument)?;

    let energy_unit_text = args
        .energy_unit
        .clone()
        .or(file_config.energy_unit.take())
        .unwrap_or_else(|| defaults.energy_unit.clone());
    let energy_unit = EnergyUnit::from_str(&energy_unit_text).map_err(|_| {
        CliError::Argument(format!(
            "Unknown energy unit '{energy_unit_text}' (expected 'hartree' or 'kcal-mol')."
        ))
    })?;

    // 'none' explicitly disables solvation, also when a config file set one.
    let solvent = match args.solvent.clone().or(engine_file.solvent) {
        Some(s) if s.eq_ignore_ascii_case("none") => None,
        other => other.or_else(|| defaults.solvent.clone()),
    };

    let charge = args
        .charge
        .or(engine_file.charge)
        .ok_or_else(|| missing("charge", "--charge", "engine.charge"))?;
    let multiplicity = args
        .multiplicity
        .or(engine_file.multiplicity)
        .ok_or_else(|| missing("multiplicity", "--multiplicity", "engine.multiplicity"))?;

    let output_dir = args
        .output_dir
        .clone()
        .or(file_config.output_dir.take())
        .unwrap_or_else(|| PathBuf::from(&defaults.output_dir));

    let calibration = build_calibration(args, file_config.calibration.take(), &defaults)?;

    let core_config = BatchConfigBuilder::new()
        .engine_path(
            args.engine
                .clone()
                .or(engine_file.path)
                .unwrap_or_else(|| PathBuf::from(&defaults.engine)),
        )
        .method(method)
        .solvent(solvent)
        .electronic_temperature(
            args.etemp
                .or(engine_file.electronic_temperature)
                .unwrap_or(defaults.electronic_temperature),
        )
        .accuracy(args.accuracy.or(engine_file.accuracy).unwrap_or(defaults.accuracy))
        .charge(charge)
        .multiplicity(multiplicity)
        .threads_per_job(
            args.job_threads
                .or(engine_file.threads)
                .unwrap_or(defaults.job_threads),
        )
        .memory(
            &args
                .memory
                .clone()
                .or(engine_file.memory)
                .unwrap_or_else(|| defaults.memory.clone()),
        )
        .timeout(Duration::from_secs(
            args.timeout
                .or(engine_file.timeout_secs)
                .unwrap_or(defaults.timeout_secs),
        ))
        .weighting_temperature(
            args.temperature
                .or(weighting_file.temperature)
                .unwrap_or(defaults.temperature),
        )
        .max_workers(
            args.workers
                .or(file_config.max_workers.take())
                .unwrap_or(defaults.max_workers),
        )
        .calibration(calibration)
        .output_dir(output_dir)
        .build()
        .map_err(|e| CliError::Config(e.to_string()))?;

    Ok(AppConfig {
        input_path: args.input.clone(),
        molecule,
        energy_unit,
        core_config,
    })
}

fn missing(what: &str, cli_flag: &str, file_key: &str) -> CliError {
    CliError::Config(format!(
        "A value for '{what}' is required, either via {cli_flag} or '{file_key}' in the config file."
    ))
}

fn build_calibration(
    args: &RunArgs,
    file: Option<FileCalibrationConfig>,
    defaults: &DefaultsConfig,
) -> Result<Option<CalibrationConfig>> {
    let file = file.unwrap_or_default();
    let enabled = args.nmr || args.experim.is_some() || file.enabled.unwrap_or(false);
    if !enabled {
        return Ok(None);
    }

    let source = file
        .source
        .unwrap_or_else(|| defaults.calibration_source.clone());
    let target = file
        .target
        .unwrap_or_else(|| defaults.calibration_target.clone());

    let set = match file.rules {
        Some(rules) => {
            let mut canonical = std::collections::BTreeMap::new();
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
            CalibrationSet {
                source,
                target,
                rules: canonical,
            }
        }
        None => {
            let mut set = CalibrationSet::default_nmr();
            set.source = source;
            set.target = target;
            set
        }
    };

    Ok(Some(CalibrationConfig {
        set,
        experimental: args.experim.clone().or(file.experimental),
    }))
}

/// Applies `--set KEY=VALUE` overrides onto the file configuration.
/// Unrecognized keys are warnings, not errors, and leave everything else
/// untouched.
fn apply_set_values(mut config: FileConfig, set_values: &[String]) -> Result<FileConfig> {
    for kv_pair in set_values {
        let Some((key, value_str)) = kv_pair.split_once('=') else {
            return Err(CliError::Config(format!(
                "Invalid --set format: '{kv_pair}'. Expected KEY=VALUE."
            )));
        };

        let parse_f64 = |key: &str, value: &str| -> Result<f64> {
            value.parse().map_err(|_| {
                CliError::Config(format!("Invalid float value for {key}: {value}"))
            })
        };

        match key {
            "engine.method" => {
                config.engine.get_or_insert_with(Default::default).method =
                    Some(value_str.to_string());
            }
            "engine.solvent" => {
                config.engine.get_or_insert_with(Default::default).solvent =
                    Some(value_str.to_string());
            }
            "engine.accuracy" => {
                config.engine.get_or_insert_with(Default::default).accuracy =
                    Some(parse_f64(key, value_str)?);
            }
            "engine.electronic-temperature" => {
                config
                    .engine
                    .get_or_insert_with(Default::default)
                    .electronic_temperature = Some(parse_f64(key, value_str)?);
            }
            "engine.timeout-secs" => {
                config
                    .engine
                    .get_or_insert_with(Default::default)
                    .timeout_secs = Some(value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {key}: {value_str}"))
                })?);
            }
            "weighting.temperature" => {
                config
                    .weighting
                    .get_or_insert_with(Default::default)
                    .temperature = Some(parse_f64(key, value_str)?);
            }
            "max-workers" => {
                config.max_workers = Some(value_str.parse().map_err(|_| {
                    CliError::Config(format!("Invalid integer value for {key}: {value_str}"))
                })?);
            }
            _ => {
                warn!(
                    "Unrecognized --set key '{}'; ignoring it. Recognized options keep their values.",
                    key
                );
            }
        }
    }
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn base_run_args() -> RunArgs {
        RunArgs {
            input: PathBuf::from("taxol.xyz"),
            output_dir: None,
            config: None,
            name: None,
            method: None,
            solvent: None,
            charge: Some(0),
            multiplicity: Some(1),
            accuracy: None,
            etemp: None,
            engine: None,
            temperature: None,
            energy_unit: None,
            workers: None,
            job_threads: None,
            memory: None,
            timeout: None,
            nmr: false,
            experim: None,
            set_values: vec![],
        }
    }

    #[test]
    fn defaults_fill_everything_not_given() {
        let app = build_config(&base_run_args()).unwrap();
        let cfg = app.core_config;

        assert_eq!(app.molecule, "taxol");
        assert_eq!(app.energy_unit, EnergyUnit::Hartree);
        assert_eq!(cfg.job.method, Method::Gfn2);
        assert_eq!(cfg.job.engine_path, PathBuf::from("xtb"));
        assert_eq!(cfg.job.solvent, None);
        assert_eq!(cfg.job.accuracy, 0.2);
        assert_eq!(cfg.job.electronic_temperature, 300.0);
        assert_eq!(cfg.weighting.temperature, 298.15);
        assert_eq!(cfg.max_workers, 4);
        assert_eq!(cfg.job.memory, "1G");
        assert_eq!(cfg.output_dir, PathBuf::from("descriptors"));
        assert!(cfg.calibration.is_none());
    }

    #[test]
    fn missing_charge_is_a_config_error() {
        let mut args = base_run_args();
        args.charge = None;
        let result = build_config(&args);
        let Err(CliError::Config(message)) = result else {
            panic!("expected config error");
        };
        assert!(message.contains("charge"));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
            max-workers = 12
            energy-unit = "kcal-mol"

            [engine]
            method = "gfn1"
            solvent = "chcl3"
            accuracy = 0.1

            [weighting]
            temperature = 310.0
            "#,
        )
        .unwrap();

        let mut args = base_run_args();
        args.config = Some(config_path);

        let app = build_config(&args).unwrap();
        let cfg = app.core_config;
        assert_eq!(app.energy_unit, EnergyUnit::KcalPerMol);
        assert_eq!(cfg.job.method, Method::Gfn1);
        assert_eq!(cfg.job.solvent.as_deref(), Some("chcl3"));
        assert_eq!(cfg.job.accuracy, 0.1);
        assert_eq!(cfg.weighting.temperature, 310.0);
        assert_eq!(cfg.max_workers, 12);
    }

    #[test]
    fn cli_flags_override_file_values() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
            [engine]
            method = "gfn1"
            solvent = "water"
            "#,
        )
        .unwrap();

        let mut args = base_run_args();
        args.config = Some(config_path);
        args.method = Some("gfnff".to_string());
        args.solvent = Some("none".to_string());
        args.workers = Some(2);

        let app = build_config(&args).unwrap();
        let cfg = app.core_config;
        assert_eq!(cfg.job.method, Method::GfnFf);
        assert_eq!(cfg.job.solvent, None);
        assert_eq!(cfg.max_workers, 2);
    }

    #[test]
    fn set_values_override_file_and_unknown_keys_warn_only() {
        let mut args = base_run_args();
        args.set_values = vec![
            "engine.accuracy=0.05".to_string(),
            "weighting.temperature=273.15".to_string(),
            "qdescp.rdkit=true".to_string(),
        ];

        let app = build_config(&args).unwrap();
        let cfg = app.core_config;
        assert_eq!(cfg.job.accuracy, 0.05);
        assert_eq!(cfg.weighting.temperature, 273.15);
    }

    #[test]
    fn malformed_set_value_is_an_error() {
        let mut args = base_run_args();
        args.set_values = vec!["engine.accuracy".to_string()];
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }

    #[test]
    fn nmr_flag_enables_default_calibration() {
        let mut args = base_run_args();
        args.nmr = true;

        let app = build_config(&args).unwrap();
        let calibration = app.core_config.calibration.unwrap();
        assert_eq!(calibration.set.source, "shielding");
        assert_eq!(calibration.set.target, "chemical_shift");
        assert!(calibration.set.rules.contains_key("C"));
        assert!(calibration.set.rules.contains_key("H"));
        assert!(calibration.experimental.is_none());
    }

    #[test]
    fn experim_path_implies_calibration() {
        let mut args = base_run_args();
        args.experim = Some(PathBuf::from("shifts.csv"));

        let app = build_config(&args).unwrap();
        let calibration = app.core_config.calibration.unwrap();
        assert_eq!(
            calibration.experimental,
            Some(PathBuf::from("shifts.csv"))
        );
    }

    #[test]
    fn file_calibration_rules_replace_builtin_set() {
        let dir = tempdir().unwrap();
        let config_path = dir.path().join("config.toml");
        fs::write(
            &config_path,
            r#"
            [calibration]
            enabled = true

            [calibration.rules]
            f = { slope = -1.1, intercept = 195.0 }
            "#,
        )
        .unwrap();

        let mut args = base_run_args();
        args.config = Some(config_path);

        let app = build_config(&args).unwrap();
        let calibration = app.core_config.calibration.unwrap();
        assert_eq!(calibration.set.rules.len(), 1);
        assert!(calibration.set.rules.contains_key("F"));
    }

    #[test]
    fn invalid_method_is_an_argument_error() {
        let mut args = base_run_args();
        args.method = Some("b3lyp".to_string());
        assert!(matches!(build_config(&args), Err(CliError::Argument(_))));
    }

    #[test]
    fn invalid_temperature_is_rejected_at_build() {
        let mut args = base_run_args();
        args.temperature = Some(-4.0);
        assert!(matches!(build_config(&args), Err(CliError::Config(_))));
    }
}
