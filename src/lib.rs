//! # Media Upload Queue
//!
//! Batched media uploads with a single-flight run guard, late-arrival
//! queueing, and bounded retries.
//!
//! ## How a run works
//!
//! - **Single-flight**: only one run is active at a time. Calling
//!   [`Uploader::upload`] while a run is active appends the items to that
//!   run's pending queue and returns immediately.
//! - **Primary pass**: the submitted items are split into batches of
//!   `batch_size`. Items within a batch upload concurrently; the next batch
//!   starts only after every item of the current one has settled.
//! - **Queue drain**: items queued during the primary pass are uploaded next,
//!   in the same batched fashion.
//! - **Retry loop**: failed items are retried for up to `max_retries` rounds.
//!   Items still failing afterwards are dropped and listed in the
//!   [`RunSummary`].
//!
//! Outcomes are delivered through [`UploadHandler`] callbacks as they happen;
//! the [`RunHandle`] returned for a started run can optionally be awaited for
//! a summary.
//!
//! ## Quick Start
//!
//! 1. Pick a [`Transport`] ([`HttpTransport`] posts multipart form data)
//! 2. Implement [`UploadHandler`] for your progress reporting
//! 3. Build an [`Uploader`] and call [`Uploader::upload`] from a tokio runtime
//!
//! With the `tauri` feature, `TauriReporter` forwards every callback to the
//! frontend as Tauri events.

pub mod batch;
pub mod config;
pub mod error;
pub mod events;
mod guard;
pub mod notifier;
pub mod submit;
pub mod transform;
pub mod transport;
pub mod types;
pub mod uploader;

#[cfg(feature = "tauri")]
pub mod tauri_bridge;

use std::sync::Arc;

pub use config::{UploadConfig, UploadConfigBuilder};
pub use error::{Result, SubmitError, TransportError, UploadError};
pub use notifier::{LifecycleNotifier, LogNotifier, RunStarted, Silent};
pub use transform::{Passthrough, Transform};
pub use transport::{HttpTransport, Transport, UploadPayload};
pub use types::{
    BatchReport, ItemFailure, ItemStatus, ItemSuccess, Phase, RunSummary, Settlement, UploadItem,
};
pub use uploader::{RunHandle, Submission, Uploader, UploaderBuilder};

#[cfg(feature = "tauri")]
pub use tauri_bridge::TauriReporter;

/// Receives per-item and per-batch upload outcomes.
///
/// Item callbacks fire as soon as the item settles, before the rest of its
/// batch. A failure callback fires for every failed attempt; check
/// [`ItemFailure::will_retry`] to tell a final failure from one that will be
/// retried.
///
/// A panic inside any callback is caught and logged; it does not end the run.
///
/// # Example
///
/// ```
/// use media_upload_queue::*;
///
/// struct Progress;
///
/// impl UploadHandler for Progress {
///     fn on_item_success(&self, success: &ItemSuccess) {
///         println!("uploaded {}", success.id);
///     }
///
///     fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
///         println!("batch {}: {} ok, {} failed", report.index, report.uploaded(), report.failed());
///         Ok(())
///     }
/// }
/// ```
pub trait UploadHandler: Send + Sync + 'static {
    fn on_item_success(&self, _success: &ItemSuccess) {}

    fn on_item_failure(&self, _failure: &ItemFailure) {}

    /// Called once per batch after all of its items settled.
    ///
    /// An error is logged and does not affect the run.
    fn on_batch_complete(&self, _report: &BatchReport) -> anyhow::Result<()> {
        Ok(())
    }
}

/// Handler that ignores every outcome.
impl UploadHandler for () {}

impl<H: UploadHandler> UploadHandler for Arc<H> {
    fn on_item_success(&self, success: &ItemSuccess) {
        (**self).on_item_success(success)
    }

    fn on_item_failure(&self, failure: &ItemFailure) {
        (**self).on_item_failure(failure)
    }

    fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
        (**self).on_batch_complete(report)
    }
}

impl<T: Transport> Transport for Arc<T> {
    fn submit(
        &self,
        endpoint: &str,
        payload: UploadPayload,
        headers: &std::collections::BTreeMap<String, String>,
    ) -> impl std::future::Future<Output = std::result::Result<serde_json::Value, TransportError>> + Send
    {
        (**self).submit(endpoint, payload, headers)
    }
}

impl<N: LifecycleNotifier> LifecycleNotifier for Arc<N> {
    fn auto_notifies_start(&self) -> bool {
        (**self).auto_notifies_start()
    }

    fn run_started(&self, event: &RunStarted) {
        (**self).run_started(event)
    }

    fn run_finished(&self, summary: &RunSummary) {
        (**self).run_finished(summary)
    }
}
