use crate::core::io::xyz;
use crate::core::models::conformer::ConformerInput;
use crate::core::models::descriptor::{DescriptorRecord, Provenance};
use crate::engine::config::JobParameters;
use crate::engine::parser;
use crate::engine::state::FailureKind;
use std::path::Path;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

use super::state::CancelToken;

/// Name of the geometry file staged for the engine.
const INPUT_FILE: &str = "input.xyz";
/// Name of the structured output file the engine leaves in its working
/// directory when invoked with `--json`.
const OUTPUT_FILE: &str = "xtbout.json";
/// Poll interval while waiting on the engine process.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Builds the engine argument vector for one job.
///
/// The mapping from parameters to flags is total and fixed: every field of
/// [`JobParameters`] lands in a deterministic position, independent of any
/// map iteration order, so the rendered program call is reproducible. The
/// spin is passed as the unpaired-electron count (`multiplicity - 1`).
pub(crate) fn build_args(params: &JobParameters) -> Vec<String> {
    let mut args = vec![INPUT_FILE.to_string(), "--json".to_string()];
    args.extend(params.method.as_args());
    args.push("--chrg".to_string());
    args.push(params.charge.to_string());
    args.push("--uhf".to_string());
    args.push((params.multiplicity - 1).to_string());
    args.push("--acc".to_string());
    args.push(params.accuracy.to_string());
    args.push("--etemp".to_string());
    args.push(params.electronic_temperature.to_string());
    if let Some(solvent) = &params.solvent {
        args.push("--alpb".to_string());
        args.push(solvent.clone());
    }
    args
}

/// Environment handed to the engine: thread count and stack memory budget,
/// the engine's own resource-limit convention.
pub(crate) fn build_env(params: &JobParameters) -> Vec<(String, String)> {
    vec![
        (
            "OMP_NUM_THREADS".to_string(),
            params.threads_per_job.to_string(),
        ),
        ("OMP_STACKSIZE".to_string(), params.memory.clone()),
    ]
}

fn render_program_call(params: &JobParameters, args: &[String]) -> String {
    let mut call = params.engine_path.display().to_string();
    for arg in args {
        call.push(' ');
        call.push_str(arg);
    }
    call
}

/// Runs one conformer through the engine and normalizes its output.
///
/// The scratch directory receives the staged geometry, the engine's raw
/// stdout/stderr (kept for later inspection), and the JSON output. Failures
/// are classified per conformer and never abort the batch.
#[instrument(skip_all, fields(conformer = conformer.id))]
pub fn run_job(
    conformer: &ConformerInput,
    params: &JobParameters,
    scratch: &Path,
    cancel: &CancelToken,
) -> Result<DescriptorRecord, FailureKind> {
    if cancel.is_cancelled() {
        return Err(FailureKind::Cancelled);
    }

    xyz::write_conformer_to_path(conformer, &scratch.join(INPUT_FILE))
        .map_err(|e| FailureKind::Io(e.to_string()))?;

    let args = build_args(params);
    let program_call = render_program_call(params, &args);
    debug!(call = %program_call, "launching engine");

    let stdout = std::fs::File::create(scratch.join("engine.out"))
        .map_err(|e| FailureKind::Io(e.to_string()))?;
    let stderr = std::fs::File::create(scratch.join("engine.err"))
        .map_err(|e| FailureKind::Io(e.to_string()))?;

    let mut child = Command::new(&params.engine_path)
        .args(&args)
        .envs(build_env(params))
        .current_dir(scratch)
        .stdin(Stdio::null())
        .stdout(stdout)
        .stderr(stderr)
        .spawn()
        .map_err(|e| {
            warn!(engine = %params.engine_path.display(), error = %e, "failed to start engine");
            FailureKind::EngineNotFound
        })?;

    let status = wait_with_deadline(&mut child, params.timeout, cancel)?;
    if !status.success() {
        return Err(FailureKind::NonZeroExit {
            code: status.code(),
        });
    }

    let output_path = scratch.join(OUTPUT_FILE);
    let text = match std::fs::read_to_string(&output_path) {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(FailureKind::ParseFailure(format!(
                "engine produced no {OUTPUT_FILE}"
            )));
        }
        Err(e) => return Err(FailureKind::Io(e.to_string())),
    };
    let values = parser::parse_output(&text).map_err(|e| FailureKind::ParseFailure(e.to_string()))?;

    Ok(DescriptorRecord {
        provenance: Provenance {
            conformer: conformer.id,
            program_call,
        },
        values,
    })
}

fn wait_with_deadline(
    child: &mut Child,
    timeout: Duration,
    cancel: &CancelToken,
) -> Result<std::process::ExitStatus, FailureKind> {
    let deadline = Instant::now() + timeout;
    loop {
        if cancel.is_cancelled() {
            kill_quietly(child);
            return Err(FailureKind::Cancelled);
        }
        match child.try_wait() {
            Ok(Some(status)) => return Ok(status),
            Ok(None) => {
                if Instant::now() >= deadline {
                    kill_quietly(child);
                    return Err(FailureKind::Timeout { limit: timeout });
                }
                std::thread::sleep(POLL_INTERVAL);
            }
            Err(e) => return Err(FailureKind::Io(e.to_string())),
        }
    }
}

fn kill_quietly(child: &mut Child) {
    if let Err(e) = child.kill() {
        warn!(error = %e, "failed to kill engine process");
    }
    let _ = child.wait();
}
