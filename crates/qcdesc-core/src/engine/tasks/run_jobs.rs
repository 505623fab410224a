use crate::core::models::conformer::Ensemble;
use crate::core::models::descriptor::DescriptorRecord;
use crate::engine::config::BatchConfig;
use crate::engine::error::EngineError;
use crate::engine::progress::{Progress, ProgressReporter};
use crate::engine::runner;
use crate::engine::state::{CancelToken, FailureKind, FailureManifest, JobFailure};
use rayon::prelude::*;
use tracing::{info, instrument};

/// Dispatches one engine job per conformer on a bounded worker pool.
///
/// Jobs are independent and share nothing mutable beyond the read-only batch
/// configuration; the pool size is the configured worker limit, so at most
/// `max_workers` engine processes run at once. Results are re-sorted by
/// conformer identity afterwards, making the downstream aggregation
/// independent of completion order.
#[instrument(skip_all, name = "run_jobs_task")]
pub fn run(
    ensemble: &Ensemble,
    config: &BatchConfig,
    reporter: &ProgressReporter,
    cancel: &CancelToken,
) -> Result<(Vec<DescriptorRecord>, FailureManifest), EngineError> {
    let raw_dir = config.output_dir.join("raw");
    std::fs::create_dir_all(&raw_dir)?;

    let pool = rayon::ThreadPoolBuilder::new()
        .num_threads(config.max_workers)
        .build()
        .map_err(|e| EngineError::ThreadPool(e.to_string()))?;

    reporter.report(Progress::JobsStart {
        total: ensemble.len() as u64,
    });

    let results: Vec<(usize, Result<DescriptorRecord, FailureKind>)> = pool.install(|| {
        ensemble
            .conformers()
            .par_iter()
            .map(|conformer| {
                let scratch = raw_dir.join(format!("conf_{}", conformer.id));
                let result = std::fs::create_dir_all(&scratch)
                    .map_err(|e| FailureKind::Io(e.to_string()))
                    .and_then(|_| runner::run_job(conformer, &config.job, &scratch, cancel));

                reporter.report(Progress::JobFinished {
                    conformer: conformer.id,
                    success: result.is_ok(),
                });
                (conformer.id, result)
            })
            .collect()
    });

    let mut records = Vec::new();
    let mut manifest = FailureManifest::new();
    for (conformer, result) in results {
        match result {
            Ok(record) => records.push(record),
            Err(kind) => manifest.record(JobFailure { conformer, kind }),
        }
    }
    records.sort_by_key(|r| r.conformer());

    info!(
        succeeded = records.len(),
        failed = manifest.len(),
        "engine fan-out finished"
    );
    Ok((records, manifest))
}
