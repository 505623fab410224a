/// Progress events emitted by the descriptor workflow.
///
/// Granularity is phase-level for the sequential stages and job-level while
/// the engine fan-out is running, so a front-end can render both a phase
/// spinner and a per-conformer progress bar.
#[derive(Debug, Clone)]
pub enum Progress {
    PhaseStart { name: &'static str },
    PhaseFinish,

    /// The engine fan-out begins; `total` jobs will be dispatched.
    JobsStart { total: u64 },
    /// One conformer's job finished (successfully or not).
    JobFinished { conformer: usize, success: bool },

    Message(String),
}

pub type ProgressCallback<'a> = Box<dyn Fn(Progress) + Send + Sync + 'a>;

#[derive(Default)]
pub struct ProgressReporter<'a> {
    callback: Option<ProgressCallback<'a>>,
}

impl<'a> ProgressReporter<'a> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_callback(callback: ProgressCallback<'a>) -> Self {
        Self {
            callback: Some(callback),
        }
    }

    #[inline]
    pub fn report(&self, event: Progress) {
        if let Some(cb) = &self.callback {
            cb(event);
        }
    }
}
