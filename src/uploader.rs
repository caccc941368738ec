use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use tokio::sync::oneshot;
use tracing::{debug, error, info, warn};

use crate::batch::{run_batches, PassOutcome};
use crate::config::UploadConfig;
use crate::error::{Result, SubmitError, TransportError, UploadError};
use crate::guard::{guarded, guarded_async};
use crate::notifier::{LifecycleNotifier, LogNotifier, RunStarted};
use crate::submit::submit_item;
use crate::transform::{effective_locator, Passthrough, Transform};
use crate::transport::Transport;
use crate::types::*;
use crate::UploadHandler;

/// Shared state guarded by the single-flight lock.
#[derive(Debug, Default)]
struct RunState {
    active: bool,
    /// Items submitted while a run was active.
    pending: Vec<UploadItem>,
}

struct Inner<T, H, X, N> {
    transport: T,
    handler: H,
    transform: X,
    notifier: N,
    state: Mutex<RunState>,
}

/// Per-run bookkeeping. Owned by exactly one run.
#[derive(Debug, Default)]
struct RunContext {
    /// Items that failed in the current phase or retry round.
    failed: Vec<UploadItem>,
    uploaded: usize,
    batches: usize,
    rounds: u32,
}

impl RunContext {
    fn absorb(&mut self, outcome: PassOutcome) {
        self.batches += outcome.batches;
        for settlement in outcome.settlements {
            match settlement {
                Settlement::Uploaded(_) => self.uploaded += 1,
                Settlement::Failed(failure) => self.failed.push(failure.item),
            }
        }
    }
}

/// Result of [`Uploader::upload`].
#[derive(Debug)]
pub enum Submission {
    /// No run was active; a new run was started.
    Started(RunHandle),
    /// A run is active; the items were appended to its pending queue and will
    /// be uploaded during that run's drain phase.
    Queued { queued: usize, pending: usize },
}

impl Submission {
    pub fn is_started(&self) -> bool {
        matches!(self, Submission::Started(_))
    }

    /// The run handle, if this submission started a run.
    pub fn into_handle(self) -> Option<RunHandle> {
        match self {
            Submission::Started(handle) => Some(handle),
            Submission::Queued { .. } => None,
        }
    }
}

/// Handle to a started run. Dropping it does not cancel the run.
#[derive(Debug)]
pub struct RunHandle {
    run_id: String,
    summary: oneshot::Receiver<RunSummary>,
}

impl RunHandle {
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Wait for the run to finish all of its phases.
    ///
    /// If no items were queued after the drain phase, the single-flight guard
    /// is released before this resolves. Otherwise a follow-up run is already
    /// active.
    pub async fn wait(self) -> Result<RunSummary> {
        self.summary
            .await
            .map_err(|_| UploadError::Join(format!("run {} ended without a summary", self.run_id)))
    }
}

/// Releases the single-flight guard if a run task unwinds past the
/// per-callback panic isolation.
struct ActiveGuard<'a> {
    state: &'a Mutex<RunState>,
    armed: bool,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        if self.armed {
            let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
            state.active = false;
        }
    }
}

/// Builder for [`Uploader`].
pub struct UploaderBuilder<T, H, X = Passthrough, N = LogNotifier> {
    transport: T,
    handler: H,
    transform: X,
    notifier: N,
}

impl<T, H, X, N> UploaderBuilder<T, H, X, N>
where
    T: Transport,
    H: UploadHandler,
    X: Transform,
    N: LifecycleNotifier,
{
    /// Transform applied before submission when a config enables it.
    pub fn with_transform<X2: Transform>(self, transform: X2) -> UploaderBuilder<T, H, X2, N> {
        UploaderBuilder {
            transport: self.transport,
            handler: self.handler,
            transform,
            notifier: self.notifier,
        }
    }

    /// Notifier receiving run start/end signals.
    pub fn with_notifier<N2: LifecycleNotifier>(self, notifier: N2) -> UploaderBuilder<T, H, X, N2> {
        UploaderBuilder {
            transport: self.transport,
            handler: self.handler,
            transform: self.transform,
            notifier,
        }
    }

    pub fn build(self) -> Uploader<T, H, X, N> {
        Uploader {
            inner: Arc::new(Inner {
                transport: self.transport,
                handler: self.handler,
                transform: self.transform,
                notifier: self.notifier,
                state: Mutex::new(RunState::default()),
            }),
        }
    }
}

/// Single-flight batched uploader.
///
/// At most one run is active at a time. A run uploads its items in batches of
/// `batch_size`, then drains items queued while it was running, then retries
/// failed items for up to `max_retries` rounds. Item and batch outcomes are
/// reported through the [`UploadHandler`]; run boundaries through the
/// [`LifecycleNotifier`].
///
/// Cloning is cheap and clones share the same queue and guard.
pub struct Uploader<T, H, X = Passthrough, N = LogNotifier> {
    inner: Arc<Inner<T, H, X, N>>,
}

impl<T, H, X, N> Clone for Uploader<T, H, X, N> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T, H> Uploader<T, H>
where
    T: Transport,
    H: UploadHandler,
{
    /// Uploader with no transform and the logging notifier.
    pub fn new(transport: T, handler: H) -> Self {
        Self::builder(transport, handler).build()
    }

    pub fn builder(transport: T, handler: H) -> UploaderBuilder<T, H> {
        UploaderBuilder {
            transport,
            handler,
            transform: Passthrough,
            notifier: LogNotifier,
        }
    }
}

impl<T, H, X, N> Uploader<T, H, X, N>
where
    T: Transport,
    H: UploadHandler,
    X: Transform,
    N: LifecycleNotifier,
{
    /// Request an upload run.
    ///
    /// Returns immediately. If a run is already active the items are appended
    /// to its pending queue; otherwise a run is spawned on the current tokio
    /// runtime. Must be called from within a tokio runtime.
    pub fn upload(&self, items: Vec<UploadItem>, config: UploadConfig) -> Result<Submission> {
        config.validate()?;

        {
            let mut state = self.lock_state();
            if state.active {
                let queued = items.len();
                state.pending.extend(items);
                debug!(queued, pending = state.pending.len(), "run active, items queued");
                return Ok(Submission::Queued {
                    queued,
                    pending: state.pending.len(),
                });
            }
            state.active = true;
        }

        Ok(Submission::Started(self.spawn_run(items, config)))
    }

    /// Whether a run is currently active.
    pub fn is_running(&self) -> bool {
        self.lock_state().active
    }

    /// Number of items waiting in the pending queue.
    pub fn pending_len(&self) -> usize {
        self.lock_state().pending.len()
    }

    pub fn handler(&self) -> &H {
        &self.inner.handler
    }

    fn lock_state(&self) -> MutexGuard<'_, RunState> {
        self.inner
            .state
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot-then-clear the pending queue.
    fn take_pending(&self) -> Vec<UploadItem> {
        std::mem::take(&mut self.lock_state().pending)
    }

    fn spawn_run(&self, items: Vec<UploadItem>, config: UploadConfig) -> RunHandle {
        let (tx, rx) = oneshot::channel();
        let run_id = uuid::Uuid::new_v4().to_string();
        let this = self.clone();
        let id = run_id.clone();
        tokio::spawn(async move {
            this.drive(id, items, config, tx).await;
        });
        RunHandle {
            run_id,
            summary: rx,
        }
    }

    /// Run until no work is left, then release the guard.
    ///
    /// Items queued after the drain phase of a run are picked up by a
    /// follow-up run in the same task instead of being discarded.
    async fn drive(
        &self,
        mut run_id: String,
        mut items: Vec<UploadItem>,
        config: UploadConfig,
        reply: oneshot::Sender<RunSummary>,
    ) {
        let mut guard = ActiveGuard {
            state: &self.inner.state,
            armed: true,
        };
        let mut reply = Some(reply);

        loop {
            let summary = self.execute(&run_id, &items, &config).await;

            let leftover = {
                let mut state = self.lock_state();
                let leftover = std::mem::take(&mut state.pending);
                if leftover.is_empty() {
                    state.active = false;
                }
                leftover
            };
            let finished = leftover.is_empty();
            if finished {
                guard.armed = false;
            }

            // The guard is already released when the last run replies.
            if let Some(tx) = reply.take() {
                let _ = tx.send(summary);
            }
            if finished {
                return;
            }

            run_id = uuid::Uuid::new_v4().to_string();
            info!(
                run_id = %run_id,
                items = leftover.len(),
                "items arrived after drain, starting follow-up run"
            );
            items = leftover;
        }
    }

    /// One run: primary pass, queue drain, retry loop.
    async fn execute(
        &self,
        run_id: &str,
        items: &[UploadItem],
        config: &UploadConfig,
    ) -> RunSummary {
        let started = Instant::now();
        let notifier = &self.inner.notifier;
        if !notifier.auto_notifies_start() {
            let started = RunStarted {
                run_id: run_id.to_string(),
                total_items: items.len(),
                batch_size: config.batch_size,
                max_retries: config.max_retries,
            };
            if let Err(e) = guarded(|| {
                notifier.run_started(&started);
                Ok(())
            }) {
                error!(run_id, error = %e, "run start notifier failed");
            }
        }

        let mut run = RunContext::default();

        let outcome = self.pass(items, Phase::Primary, config).await;
        run.absorb(outcome);

        let queued = self.take_pending();
        if !queued.is_empty() {
            debug!(run_id, items = queued.len(), "draining pending queue");
            let outcome = self.pass(&queued, Phase::Drain, config).await;
            run.absorb(outcome);
        }

        while !run.failed.is_empty() && run.rounds < config.max_retries {
            let snapshot = std::mem::take(&mut run.failed);
            run.rounds += 1;
            debug!(run_id, round = run.rounds, items = snapshot.len(), "retrying failed items");
            let outcome = self
                .pass(&snapshot, Phase::Retry { round: run.rounds }, config)
                .await;
            run.absorb(outcome);
        }

        let dropped: Vec<String> = std::mem::take(&mut run.failed)
            .into_iter()
            .map(|item| item.id)
            .collect();
        if !dropped.is_empty() {
            warn!(run_id, dropped = dropped.len(), "retry budget exhausted");
        }

        let summary = RunSummary {
            run_id: run_id.to_string(),
            uploaded: run.uploaded,
            batches: run.batches,
            retry_rounds: run.rounds,
            dropped,
            duration_ms: started.elapsed().as_millis() as u64,
        };
        if let Err(e) = guarded(|| {
            notifier.run_finished(&summary);
            Ok(())
        }) {
            error!(run_id, error = %e, "run finish notifier failed");
        }
        summary
    }

    async fn pass(&self, items: &[UploadItem], phase: Phase, config: &UploadConfig) -> PassOutcome {
        let will_retry = phase.round() < config.max_retries;
        let handler = &self.inner.handler;

        run_batches(
            items,
            config.batch_size,
            phase,
            |item| self.process_item(item, config, phase, will_retry),
            |report| handler.on_batch_complete(report),
        )
        .await
    }

    /// Transform then submit one item, reporting the outcome immediately.
    async fn process_item(
        &self,
        item: &UploadItem,
        config: &UploadConfig,
        phase: Phase,
        will_retry: bool,
    ) -> Settlement {
        let start = Instant::now();

        let locator = if config.enable_transform {
            effective_locator(&self.inner.transform, item).await
        } else {
            item.source.clone()
        };

        let result = guarded_async(submit_item(&self.inner.transport, item, locator, config))
            .await
            .unwrap_or_else(|panic| {
                Err(SubmitError::Transport(Arc::new(TransportError::Other(format!(
                    "transport panicked: {}",
                    panic
                )))))
            });
        let duration_ms = start.elapsed().as_millis() as u64;
        let handler = &self.inner.handler;

        match result {
            Ok(response) => {
                let success = ItemSuccess {
                    id: item.id.clone(),
                    item: item.with_status(ItemStatus::Uploaded),
                    response,
                    duration_ms,
                    completed_at: chrono::Utc::now().to_rfc3339(),
                };
                if let Err(e) = guarded(|| {
                    handler.on_item_success(&success);
                    Ok(())
                }) {
                    error!(item_id = %item.id, error = %e, "item success handler failed");
                }
                Settlement::Uploaded(success)
            }
            Err(error) => {
                warn!(item_id = %item.id, round = phase.round(), will_retry, error = %error, "upload failed");
                let failure = ItemFailure {
                    id: item.id.clone(),
                    item: item.with_status(ItemStatus::Failed),
                    error,
                    round: phase.round(),
                    duration_ms,
                    will_retry,
                };
                if let Err(e) = guarded(|| {
                    handler.on_item_failure(&failure);
                    Ok(())
                }) {
                    error!(item_id = %item.id, error = %e, "item failure handler failed");
                }
                Settlement::Failed(failure)
            }
        }
    }
}
