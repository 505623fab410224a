use crate::core::calibration::{self, ResidualReport};
use crate::core::io::report;
use crate::core::models::conformer::Ensemble;
use crate::core::models::descriptor::{AggregatedDescriptor, DescriptorRecord};
use crate::core::stats::aggregate::{self, AggregationWarning};
use crate::core::stats::boltzmann::{self, WeightingError, WeightSet};
use crate::engine::config::{BatchConfig, ConfigError};
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::state::{BatchOutcome, BatchStatus, CancelToken, FailureManifest};
use crate::engine::tasks;
use std::collections::BTreeMap;
use tracing::{info, instrument, warn};

/// Runs the full descriptor pipeline for one molecule.
///
/// Per-conformer engine failures are collected, not thrown; the batch ends
/// `Completed` or `CompletedWithFailures` as long as at least one conformer
/// survives. Configuration problems and an empty usable set abort the batch
/// with no partial aggregate.
#[instrument(skip_all, name = "descriptor_workflow", fields(molecule = ensemble.molecule()))]
pub fn run(
    ensemble: &Ensemble,
    config: &BatchConfig,
    reporter: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<BatchOutcome, EngineError> {
    // === Phase 0: Validation and preparation ===
    reporter.report(Progress::PhaseStart {
        name: "Preparation",
    });
    config.validate()?;
    let experimental = load_experimental(config)?;
    std::fs::create_dir_all(&config.output_dir)?;
    info!(
        conformers = ensemble.len(),
        method = %config.job.method,
        workers = config.max_workers,
        "starting descriptor batch"
    );
    reporter.report(Progress::PhaseFinish);

    // === Phase 1: Engine fan-out ===
    reporter.report(Progress::PhaseStart {
        name: "Engine Jobs",
    });
    let (records, manifest) = tasks::run_jobs::run(ensemble, config, reporter, cancel)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 2: Boltzmann weighting over the usable set ===
    reporter.report(Progress::PhaseStart { name: "Weighting" });
    let weights = compute_weights(ensemble, &records, config, &manifest)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 3: Aggregation ===
    reporter.report(Progress::PhaseStart {
        name: "Aggregation",
    });
    let (aggregated, warnings) = aggregate_records(ensemble, &records, &weights, &manifest)?;
    reporter.report(Progress::PhaseFinish);

    // === Phase 4: Calibration (optional) ===
    let (aggregated, residuals) =
        apply_calibration(aggregated, ensemble, config, experimental.as_ref(), reporter)?;

    // === Phase 5: Persist results ===
    reporter.report(Progress::PhaseStart { name: "Writing" });
    for record in &records {
        report::write_record(&config.output_dir, ensemble.molecule(), record)?;
    }
    let aggregated_path = report::write_aggregated(&config.output_dir, &aggregated)?;
    reporter.report(Progress::Message(format!(
        "Boltzmann-averaged descriptors written to {}",
        aggregated_path.display()
    )));
    reporter.report(Progress::PhaseFinish);

    let status = if manifest.is_empty() {
        BatchStatus::Completed
    } else {
        BatchStatus::CompletedWithFailures
    };
    info!(
        ?status,
        contributors = aggregated.contributors.len(),
        excluded = manifest.len(),
        warnings = warnings.len(),
        "descriptor batch finished"
    );

    Ok(BatchOutcome {
        status,
        aggregated,
        records,
        manifest,
        warnings,
        residuals,
    })
}

fn load_experimental(
    config: &BatchConfig,
) -> Result<Option<BTreeMap<usize, f64>>, EngineError> {
    match config.calibration.as_ref().and_then(|c| c.experimental.as_ref()) {
        Some(path) => Ok(Some(calibration::load_experimental_csv(path)?)),
        None => Ok(None),
    }
}

fn compute_weights(
    ensemble: &Ensemble,
    records: &[DescriptorRecord],
    config: &BatchConfig,
    manifest: &FailureManifest,
) -> Result<WeightSet, EngineError> {
    // Failed conformers are excluded before normalization; their population
    // mass is redistributed, not zeroed.
    let usable: BTreeMap<usize, f64> = ensemble
        .conformers()
        .iter()
        .filter(|c| records.iter().any(|r| r.conformer() == c.id))
        .map(|c| (c.id, c.relative_energy))
        .collect();

    boltzmann::weights(&usable, config.weighting.temperature).map_err(|e| match e {
        WeightingError::NoUsableConformers => EngineError::NoUsableConformers {
            manifest: manifest.clone(),
        },
        WeightingError::InvalidTemperature(t) => {
            ConfigError::InvalidWeightingTemperature(t).into()
        }
    })
}

fn aggregate_records(
    ensemble: &Ensemble,
    records: &[DescriptorRecord],
    weights: &WeightSet,
    manifest: &FailureManifest,
) -> Result<(AggregatedDescriptor, Vec<AggregationWarning>), EngineError> {
    let lowest_id = ensemble
        .conformers()
        .iter()
        .filter(|c| weights.contains_key(&c.id))
        .min_by(|a, b| {
            a.relative_energy
                .partial_cmp(&b.relative_energy)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        })
        .map(|c| c.id)
        .expect("weights are non-empty here");

    let (aggregated, warnings) = aggregate::aggregate(
        ensemble.molecule(),
        &ensemble.atom_elements(),
        records,
        weights,
        lowest_id,
        manifest.len(),
    )?;
    for warning in &warnings {
        warn!(%warning, "aggregation warning");
    }
    Ok((aggregated, warnings))
}

fn apply_calibration(
    aggregated: AggregatedDescriptor,
    ensemble: &Ensemble,
    config: &BatchConfig,
    experimental: Option<&BTreeMap<usize, f64>>,
    reporter: &ProgressReporter,
) -> Result<(AggregatedDescriptor, Option<ResidualReport>), EngineError> {
    let Some(calibration_config) = &config.calibration else {
        return Ok((aggregated, None));
    };
    reporter.report(Progress::PhaseStart {
        name: "Calibration",
    });
    info!(
        source = %calibration_config.set.source,
        target = %calibration_config.set.target,
        "applying linear calibration"
    );
    let (calibrated, residuals) = calibration::calibrate(
        &aggregated,
        &ensemble.atom_elements(),
        &calibration_config.set,
        experimental,
    )?;
    reporter.report(Progress::PhaseFinish);
    Ok((calibrated, residuals))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::calibration::CalibrationSet;
    use crate::core::models::conformer::{ConformerInput, Site};
    use crate::engine::config::{BatchConfigBuilder, CalibrationConfig, Method};
    use nalgebra::Point3;
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    fn ensemble(n: usize) -> Ensemble {
        let conformers = (1..=n)
            .map(|id| ConformerInput {
                id,
                geometry: vec![Site::new("He", Point3::origin())],
                relative_energy: (id - 1) as f64 * 0.5,
            })
            .collect();
        Ensemble::new("helium", conformers).unwrap()
    }

    fn config(engine: PathBuf, output: PathBuf) -> BatchConfig {
        BatchConfigBuilder::new()
            .engine_path(engine)
            .method(Method::Gfn2)
            .electronic_temperature(300.0)
            .accuracy(0.2)
            .charge(0)
            .multiplicity(1)
            .threads_per_job(1)
            .memory("1G")
            .timeout(Duration::from_secs(30))
            .weighting_temperature(298.15)
            .max_workers(2)
            .output_dir(output)
            .build()
            .unwrap()
    }

    #[cfg(unix)]
    mod with_fake_engine {
        use super::*;
        use crate::engine::state::FailureKind;
        use std::os::unix::fs::PermissionsExt;

        fn fake_engine(dir: &Path, body: &str) -> PathBuf {
            let path = dir.join("fake-engine");
            std::fs::write(&path, format!("#!/bin/sh\n{body}\n")).unwrap();
            let mut perms = std::fs::metadata(&path).unwrap().permissions();
            perms.set_mode(0o755);
            std::fs::set_permissions(&path, perms).unwrap();
            path
        }

        const HAPPY_ENGINE: &str =
            r#"printf '{"total energy": -5.0, "partial charges": [0.0]}' > xtbout.json"#;

        #[test]
        fn clean_batch_completes_and_persists_results() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), HAPPY_ENGINE);
            let output = dir.path().join("out");
            let config = config(engine, output.clone());

            let outcome = run(
                &ensemble(3),
                &config,
                &ProgressReporter::new(),
                &CancelToken::new(),
            )
            .unwrap();

            assert_eq!(outcome.status, BatchStatus::Completed);
            assert!(outcome.manifest.is_empty());
            assert_eq!(outcome.aggregated.contributors, vec![1, 2, 3]);
            assert_eq!(outcome.aggregated.excluded, 0);
            let total: f64 = outcome.aggregated.weights.values().sum();
            assert!((total - 1.0).abs() < 1e-12);

            assert!(output.join("helium_boltz.json").exists());
            for id in 1..=3 {
                assert!(output.join(format!("helium_conf_{id}.json")).exists());
                assert!(output.join(format!("raw/conf_{id}/engine.out")).exists());
            }
        }

        #[test]
        fn partial_failures_complete_with_manifest_and_reweighting() {
            let dir = tempfile::tempdir().unwrap();
            // Conformers 2 and 4 fail; the input geometry's comment line
            // carries the conformer identity.
            let engine = fake_engine(
                dir.path(),
                &format!(
                    "if grep -qE 'conformer (2|4)$' input.xyz; then exit 1; fi\n{HAPPY_ENGINE}"
                ),
            );
            let output = dir.path().join("out");
            let config = config(engine, output.clone());

            let outcome = run(
                &ensemble(5),
                &config,
                &ProgressReporter::new(),
                &CancelToken::new(),
            )
            .unwrap();

            assert_eq!(outcome.status, BatchStatus::CompletedWithFailures);
            assert_eq!(outcome.manifest.conformer_ids(), vec![2, 4]);
            for failure in outcome.manifest.entries() {
                assert!(matches!(
                    failure.kind,
                    FailureKind::NonZeroExit { code: Some(1) }
                ));
            }

            let ids: Vec<usize> = outcome.aggregated.weights.keys().copied().collect();
            assert_eq!(ids, vec![1, 3, 5]);
            let total: f64 = outcome.aggregated.weights.values().sum();
            assert!((total - 1.0).abs() < 1e-12);
            assert_eq!(outcome.aggregated.excluded, 2);

            assert!(!output.join("helium_conf_2.json").exists());
            assert!(output.join("helium_conf_3.json").exists());
        }

        #[test]
        fn all_failures_abort_with_no_usable_conformers() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), "exit 1");
            let output = dir.path().join("out");
            let config = config(engine, output.clone());

            let result = run(
                &ensemble(3),
                &config,
                &ProgressReporter::new(),
                &CancelToken::new(),
            );

            let Err(EngineError::NoUsableConformers { manifest }) = result else {
                panic!("expected NoUsableConformers");
            };
            assert_eq!(manifest.len(), 3);
            assert!(!output.join("helium_boltz.json").exists());
        }

        #[test]
        fn cancelled_batch_reports_cancelled_conformers() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), HAPPY_ENGINE);
            let config = config(engine, dir.path().join("out"));
            let cancel = CancelToken::new();
            cancel.cancel();

            let result = run(&ensemble(2), &config, &ProgressReporter::new(), &cancel);
            let Err(EngineError::NoUsableConformers { manifest }) = result else {
                panic!("expected NoUsableConformers");
            };
            for failure in manifest.entries() {
                assert!(matches!(failure.kind, FailureKind::Cancelled));
            }
        }

        #[test]
        fn calibration_adds_target_descriptor_and_residuals() {
            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(
                dir.path(),
                r#"printf '{"total energy": -5.0, "shielding constants": [28.0]}' > xtbout.json"#,
            );
            let experim = dir.path().join("experim.csv");
            std::fs::write(&experim, "atom_index,value\n0,3.7\n").unwrap();

            let config = BatchConfigBuilder::new()
                .engine_path(engine)
                .method(Method::Gfn2)
                .electronic_temperature(300.0)
                .accuracy(0.2)
                .charge(0)
                .multiplicity(1)
                .threads_per_job(1)
                .memory("1G")
                .timeout(Duration::from_secs(30))
                .weighting_temperature(298.15)
                .max_workers(1)
                .calibration(Some(CalibrationConfig {
                    set: CalibrationSet::default_nmr(),
                    experimental: Some(experim),
                }))
                .output_dir(dir.path().join("out"))
                .build()
                .unwrap();

            let conformers = vec![ConformerInput {
                id: 1,
                geometry: vec![Site::new("H", Point3::origin())],
                relative_energy: 0.0,
            }];
            let ensemble = Ensemble::new("hydrogen", conformers).unwrap();

            let outcome = run(
                &ensemble,
                &config,
                &ProgressReporter::new(),
                &CancelToken::new(),
            )
            .unwrap();

            assert!(outcome.aggregated.boltzmann.contains_key("chemical_shift"));
            assert!(outcome.aggregated.boltzmann.contains_key("shielding"));
            let residuals = outcome.residuals.unwrap();
            assert_eq!(residuals.residuals.len(), 1);
        }

        #[test]
        fn progress_reports_phases_and_jobs() {
            use std::sync::Mutex;

            let dir = tempfile::tempdir().unwrap();
            let engine = fake_engine(dir.path(), HAPPY_ENGINE);
            let config = config(engine, dir.path().join("out"));

            let events: Mutex<Vec<Progress>> = Mutex::new(Vec::new());
            let reporter = ProgressReporter::with_callback(Box::new(|event| {
                events.lock().unwrap().push(event);
            }));

            run(&ensemble(2), &config, &reporter, &CancelToken::new()).unwrap();

            let events = events.lock().unwrap();
            let job_finishes = events
                .iter()
                .filter(|e| matches!(e, Progress::JobFinished { .. }))
                .count();
            assert_eq!(job_finishes, 2);
            assert!(events
                .iter()
                .any(|e| matches!(e, Progress::JobsStart { total: 2 })));
        }
    }
}
