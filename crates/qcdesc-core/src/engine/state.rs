use crate::core::calibration::ResidualReport;
use crate::core::models::descriptor::{AggregatedDescriptor, DescriptorRecord};
use crate::core::stats::aggregate::AggregationWarning;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

/// Lifecycle of one batch. `Pending` and `Running` are transient; a batch
/// ends in exactly one of the three terminal states.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchStatus {
    Pending,
    Running,
    Completed,
    CompletedWithFailures,
    Failed,
}

/// Why a single conformer's job produced no usable record.
#[derive(Debug, Clone, PartialEq)]
pub enum FailureKind {
    /// The engine executable could not be started.
    EngineNotFound,
    /// The engine ran but reported an error.
    NonZeroExit { code: Option<i32> },
    /// Output was present but unreadable or incomplete.
    ParseFailure(String),
    /// The job exceeded its wall-clock budget and was killed.
    Timeout { limit: Duration },
    /// The batch was cancelled before or while this job ran.
    Cancelled,
    /// A filesystem fault around the job (unwritable scratch, lost output).
    Io(String),
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FailureKind::EngineNotFound => write!(f, "engine executable not found"),
            FailureKind::NonZeroExit { code: Some(code) } => {
                write!(f, "engine exited with status {code}")
            }
            FailureKind::NonZeroExit { code: None } => {
                write!(f, "engine terminated abnormally")
            }
            FailureKind::ParseFailure(reason) => write!(f, "unparseable output: {reason}"),
            FailureKind::Timeout { limit } => {
                write!(f, "timed out after {}s", limit.as_secs())
            }
            FailureKind::Cancelled => write!(f, "cancelled"),
            FailureKind::Io(reason) => write!(f, "I/O failure: {reason}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobFailure {
    pub conformer: usize,
    pub kind: FailureKind,
}

/// Itemized account of every excluded conformer, kept sorted by identity.
/// Results are never presented without it.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FailureManifest {
    entries: Vec<JobFailure>,
}

impl FailureManifest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, failure: JobFailure) {
        let position = self
            .entries
            .partition_point(|e| e.conformer < failure.conformer);
        self.entries.insert(position, failure);
    }

    pub fn entries(&self) -> &[JobFailure] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn conformer_ids(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.conformer).collect()
    }
}

/// The result of a batch that produced an aggregate.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    pub status: BatchStatus,
    pub aggregated: AggregatedDescriptor,
    /// Successful per-conformer records, identity-sorted.
    pub records: Vec<DescriptorRecord>,
    pub manifest: FailureManifest,
    pub warnings: Vec<AggregationWarning>,
    pub residuals: Option<ResidualReport>,
}

/// Cooperative cancellation shared between the orchestrator and in-flight
/// jobs. Cancelling prevents new launches and kills running engines; work
/// already completed is preserved.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn manifest_keeps_entries_sorted_by_identity() {
        let mut manifest = FailureManifest::new();
        manifest.record(JobFailure {
            conformer: 4,
            kind: FailureKind::Timeout {
                limit: Duration::from_secs(60),
            },
        });
        manifest.record(JobFailure {
            conformer: 2,
            kind: FailureKind::EngineNotFound,
        });
        assert_eq!(manifest.conformer_ids(), vec![2, 4]);
        assert_eq!(manifest.len(), 2);
    }

    #[test]
    fn cancel_token_is_shared_between_clones() {
        let token = CancelToken::new();
        let clone = token.clone();
        assert!(!clone.is_cancelled());
        token.cancel();
        assert!(clone.is_cancelled());
    }

    #[test]
    fn failure_kinds_render_human_readable() {
        assert_eq!(
            FailureKind::NonZeroExit { code: Some(2) }.to_string(),
            "engine exited with status 2"
        );
        assert_eq!(
            FailureKind::Timeout {
                limit: Duration::from_secs(600)
            }
            .to_string(),
            "timed out after 600s"
        );
        assert_eq!(FailureKind::Cancelled.to_string(), "cancelled");
    }
}
