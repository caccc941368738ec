use tauri::{AppHandle, Emitter, Runtime};
use tracing::warn;

use crate::events::*;
use crate::notifier::{LifecycleNotifier, RunStarted};
use crate::types::{BatchReport, ItemFailure, ItemSuccess, RunSummary};
use crate::UploadHandler;

/// Forwards upload progress to the frontend as Tauri events.
///
/// Implements both [`UploadHandler`] and [`LifecycleNotifier`], so one
/// reporter can be handed to the uploader builder twice (it is cheap to clone).
///
/// | Event | Payload |
/// |---|---|
/// | `media_upload:item_uploaded` | [`ItemUploadedEvent`] |
/// | `media_upload:item_failed` | [`ItemFailedEvent`] |
/// | `media_upload:batch_completed` | [`BatchCompletedEvent`] |
/// | `media_upload:run_started` | [`RunStarted`] |
/// | `media_upload:run_finished` | [`RunSummary`] |
pub struct TauriReporter<R: Runtime> {
    app_handle: AppHandle<R>,
    auto_start: bool,
}

impl<R: Runtime> Clone for TauriReporter<R> {
    fn clone(&self) -> Self {
        Self {
            app_handle: self.app_handle.clone(),
            auto_start: self.auto_start,
        }
    }
}

impl<R: Runtime> TauriReporter<R> {
    pub fn new(app_handle: AppHandle<R>) -> Self {
        Self {
            app_handle,
            auto_start: false,
        }
    }

    /// Skip the run-started event when the host already announces runs.
    pub fn with_auto_start(mut self, auto_start: bool) -> Self {
        self.auto_start = auto_start;
        self
    }

    fn emit<S: serde::Serialize + Clone>(&self, event: &str, payload: S) {
        if let Err(e) = self.app_handle.emit(event, payload) {
            warn!(event, error = %e, "failed to emit upload event");
        }
    }
}

impl<R: Runtime> UploadHandler for TauriReporter<R> {
    fn on_item_success(&self, success: &ItemSuccess) {
        self.emit(ITEM_UPLOADED, ItemUploadedEvent::from(success));
    }

    fn on_item_failure(&self, failure: &ItemFailure) {
        self.emit(ITEM_FAILED, ItemFailedEvent::from(failure));
    }

    fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
        self.app_handle
            .emit(BATCH_COMPLETED, BatchCompletedEvent::from(report))
            .map_err(|e| anyhow::anyhow!("emit {}: {}", BATCH_COMPLETED, e))
    }
}

impl<R: Runtime> LifecycleNotifier for TauriReporter<R> {
    fn auto_notifies_start(&self) -> bool {
        self.auto_start
    }

    fn run_started(&self, event: &RunStarted) {
        self.emit(RUN_STARTED, event.clone());
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.emit(RUN_FINISHED, summary.clone());
    }
}
