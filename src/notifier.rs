use serde::{Deserialize, Serialize};
use tracing::info;

use crate::types::RunSummary;

/// Payload of the run-start signal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunStarted {
    pub run_id: String,
    pub total_items: usize,
    pub batch_size: usize,
    pub max_retries: u32,
}

/// Start and end-of-run signals for the host environment.
///
/// Purely observational: nothing a notifier does affects the run.
pub trait LifecycleNotifier: Send + Sync + 'static {
    /// Return `true` when the host already signals a run as soon as it
    /// accepts the work; the uploader then skips [`run_started`](Self::run_started).
    fn auto_notifies_start(&self) -> bool {
        false
    }

    fn run_started(&self, _event: &RunStarted) {}

    /// Called exactly once per run, after the retry loop has finished.
    fn run_finished(&self, _summary: &RunSummary) {}
}

/// Default notifier: writes run boundaries to the `tracing` log.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogNotifier;

impl LifecycleNotifier for LogNotifier {
    fn run_started(&self, event: &RunStarted) {
        info!(
            run_id = %event.run_id,
            items = event.total_items,
            batch_size = event.batch_size,
            "upload run started"
        );
    }

    fn run_finished(&self, summary: &RunSummary) {
        info!(
            run_id = %summary.run_id,
            uploaded = summary.uploaded,
            dropped = summary.dropped.len(),
            retry_rounds = summary.retry_rounds,
            duration_ms = summary.duration_ms,
            "upload run finished"
        );
    }
}

/// Notifier that ignores every signal.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

impl LifecycleNotifier for Silent {}
