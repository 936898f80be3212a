use crate::app::RecordOutcome;
use crate::domain::SortMode;

#[derive(Debug, Clone, PartialEq)]
pub enum ProgressEvent {
    /// A metadata page was appended to the pool.
    PageFetched { fetched: usize, target: usize },
    /// An over-fetched pool was reordered or sampled down.
    PoolSelected {
        mode: SortMode,
        pool: usize,
        selected: usize,
    },
    RecordStarted {
        index: usize,
        total: usize,
        id: u64,
        title: String,
        file_name: String,
    },
    /// Cumulative bytes written for the current attempt.
    Bytes { done: u64, total: Option<u64> },
    AttemptFailed {
        url: String,
        attempt: u32,
        retries: u32,
        message: String,
    },
    RecordFinished {
        index: usize,
        total: usize,
        id: u64,
        title: String,
        outcome: RecordOutcome,
    },
}

/// Observer for everything the pipeline would otherwise print.
pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}
