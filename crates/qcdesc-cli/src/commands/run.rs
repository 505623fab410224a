use crate::cli::RunArgs;
use crate::config;
use crate::error::{CliError, Result};
use crate::utils::progress::CliProgressHandler;
use qcdesc::core::io::xyz;
use qcdesc::engine::error::EngineError;
use qcdesc::engine::progress::ProgressReporter;
use qcdesc::engine::state::{BatchOutcome, BatchStatus, CancelToken, FailureManifest};
use qcdesc::workflows;
use tracing::{info, warn};

pub async fn run(args: RunArgs) -> Result<()> {
    info!("Merging configuration from defaults, file, and CLI arguments...");
    let app = config::build_config(&args)?;

    info!("Loading conformer ensemble from {:?}", &app.input_path);
    let ensemble = xyz::read_ensemble(&app.input_path, &app.molecule, app.energy_unit)
        .map_err(|e| CliError::Core(EngineError::from(e)))?;
    println!(
        "Loaded {} conformer(s) for molecule '{}'.",
        ensemble.len(),
        ensemble.molecule()
    );

    let progress_handler = CliProgressHandler::new();
    let reporter = ProgressReporter::with_callback(progress_handler.get_callback());

    let cancel = CancelToken::new();
    let signal_token = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupt received; cancelling remaining engine jobs.");
            signal_token.cancel();
        }
    });

    println!("Computing descriptors...");
    let result = tokio::task::block_in_place(|| {
        workflows::descriptors::run(&ensemble, &app.core_config, &reporter, &cancel)
    });

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            if let EngineError::NoUsableConformers { manifest } = &e {
                print_manifest(manifest);
            }
            return Err(CliError::Core(e));
        }
    };

    print_summary(&outcome);
    Ok(())
}

fn print_summary(outcome: &BatchOutcome) {
    match outcome.status {
        BatchStatus::Completed => {
            println!(
                "✓ All {} conformer(s) contributed to the aggregate.",
                outcome.aggregated.contributors.len()
            );
        }
        BatchStatus::CompletedWithFailures => {
            println!(
                "⚠ Completed with failures: {} contributed, {} excluded.",
                outcome.aggregated.contributors.len(),
                outcome.manifest.len()
            );
            print_manifest(&outcome.manifest);
        }
        _ => {}
    }

    for warning in &outcome.warnings {
        println!("  ⚠ {warning}");
    }

    println!("  Boltzmann weights:");
    for (conformer, weight) in &outcome.aggregated.weights {
        println!("    conformer {conformer}: {weight:.4}");
    }

    if let Some(residuals) = &outcome.residuals {
        println!(
            "  Residuals vs. experiment for '{}' (experimental - calibrated):",
            residuals.descriptor
        );
        for (atom, residual) in &residuals.residuals {
            println!("    atom {atom}: {residual:+.3}");
        }
    }
}

fn print_manifest(manifest: &FailureManifest) {
    for failure in manifest.entries() {
        println!("  ✗ conformer {}: {}", failure.conformer, failure.kind);
    }
}
