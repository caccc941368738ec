#![allow(dead_code)]

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use media_upload_queue::*;
use serde_json::{json, Value};
use tokio::sync::{Notify, Semaphore};

pub const ENDPOINT: &str = "https://media.example.com/upload";

pub fn items(prefix: &str, count: usize) -> Vec<UploadItem> {
    (0..count)
        .map(|i| {
            let id = format!("{}-{}", prefix, i);
            UploadItem::new(id.clone(), format!("/media/{}.jpg", id)).with_extra("item_id", id)
        })
        .collect()
}

pub fn config(batch_size: usize, max_retries: u32) -> UploadConfig {
    UploadConfig::builder(ENDPOINT)
        .with_batch_size(batch_size)
        .with_max_retries(max_retries)
        .build()
        .unwrap()
}

/// Transport whose outcome per item is scripted by id.
#[derive(Default)]
pub struct ScriptedTransport {
    /// Number of leading attempts that fail, per item id.
    failures: HashMap<String, usize>,
    network_errors: bool,
    gate: Option<(Arc<Semaphore>, usize)>,
    attempts: Mutex<HashMap<String, usize>>,
    locators: Mutex<Vec<String>>,
    /// Signalled when any item starts its second attempt.
    pub retry_entered: Arc<Notify>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn failing(mut self, id: &str, times: usize) -> Self {
        self.failures.insert(id.to_string(), times);
        self
    }

    pub fn always_failing(self, id: &str) -> Self {
        self.failing(id, usize::MAX)
    }

    /// Fail with an unstructured transport error instead of an HTTP status.
    pub fn with_network_errors(mut self) -> Self {
        self.network_errors = true;
        self
    }

    /// Block attempts numbered `from_attempt` or later until permits are added.
    pub fn with_gate(mut self, gate: Arc<Semaphore>, from_attempt: usize) -> Self {
        self.gate = Some((gate, from_attempt));
        self
    }

    pub fn attempts(&self, id: &str) -> usize {
        self.attempts.lock().unwrap().get(id).copied().unwrap_or(0)
    }

    pub fn total_attempts(&self) -> usize {
        self.attempts.lock().unwrap().values().sum()
    }

    pub fn locators(&self) -> Vec<String> {
        self.locators.lock().unwrap().clone()
    }

    fn record(&self, id: &str, locator: &str) -> usize {
        self.locators.lock().unwrap().push(locator.to_string());
        let mut attempts = self.attempts.lock().unwrap();
        let n = attempts.entry(id.to_string()).or_insert(0);
        *n += 1;
        *n
    }
}

impl Transport for ScriptedTransport {
    async fn submit(
        &self,
        endpoint: &str,
        payload: UploadPayload,
        _headers: &BTreeMap<String, String>,
    ) -> std::result::Result<Value, TransportError> {
        assert_eq!(endpoint, ENDPOINT);
        let id = payload
            .fields
            .get("item_id")
            .cloned()
            .unwrap_or_default();
        let attempt = self.record(&id, &payload.locator);

        if attempt == 2 {
            self.retry_entered.notify_one();
        }

        if let Some((gate, from_attempt)) = &self.gate {
            if attempt >= *from_attempt {
                let _permit = gate.acquire().await.unwrap();
            }
        }

        tokio::time::sleep(Duration::from_millis(1)).await;

        let failing = self.failures.get(&id).copied().unwrap_or(0);
        if attempt <= failing {
            if self.network_errors {
                return Err(TransportError::Other("connection reset".into()));
            }
            return Err(TransportError::Remote {
                status: 500,
                body: format!("scripted failure of {}", id),
            });
        }

        Ok(json!({ "url": format!("https://cdn.example.com/{}", id) }))
    }
}

/// Handler recording every callback.
#[derive(Default)]
pub struct Recorder {
    successes: Mutex<Vec<ItemSuccess>>,
    failures: Mutex<Vec<ItemFailure>>,
    batches: Mutex<Vec<(Phase, usize, Vec<String>)>>,
    reject_batch_reports: bool,
    panic_on_first_report: bool,
}

impl Recorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `on_batch_complete` call return an error.
    pub fn rejecting_batch_reports() -> Self {
        Self {
            reject_batch_reports: true,
            ..Self::default()
        }
    }

    /// Panic inside the first `on_batch_complete` call.
    pub fn panicking_on_first_report() -> Self {
        Self {
            panic_on_first_report: true,
            ..Self::default()
        }
    }

    pub fn successes(&self) -> Vec<ItemSuccess> {
        self.successes.lock().unwrap().clone()
    }

    pub fn success_ids(&self) -> Vec<String> {
        self.successes().into_iter().map(|s| s.id).collect()
    }

    pub fn failures(&self) -> Vec<ItemFailure> {
        self.failures.lock().unwrap().clone()
    }

    /// (phase, index, ids) per reported batch, in report order.
    pub fn batches(&self) -> Vec<(Phase, usize, Vec<String>)> {
        self.batches.lock().unwrap().clone()
    }
}

impl UploadHandler for Recorder {
    fn on_item_success(&self, success: &ItemSuccess) {
        self.successes.lock().unwrap().push(success.clone());
    }

    fn on_item_failure(&self, failure: &ItemFailure) {
        self.failures.lock().unwrap().push(failure.clone());
    }

    fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
        let ids = report
            .settlements
            .iter()
            .map(|s| s.id().to_string())
            .collect();
        let reported = {
            let mut batches = self.batches.lock().unwrap();
            batches.push((report.phase, report.index, ids));
            batches.len()
        };
        if self.panic_on_first_report && reported == 1 {
            panic!("progress listener crashed");
        }
        if self.reject_batch_reports {
            anyhow::bail!("progress listener unavailable");
        }
        Ok(())
    }
}

/// Notifier recording run boundaries.
#[derive(Default)]
pub struct RunLog {
    auto_start: bool,
    started: Mutex<Vec<RunStarted>>,
    finished: Mutex<Vec<RunSummary>>,
}

impl RunLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn auto_starting() -> Self {
        Self {
            auto_start: true,
            ..Self::default()
        }
    }

    pub fn started(&self) -> Vec<RunStarted> {
        self.started.lock().unwrap().clone()
    }

    pub fn finished(&self) -> Vec<RunSummary> {
        self.finished.lock().unwrap().clone()
    }
}

impl LifecycleNotifier for RunLog {
    fn auto_notifies_start(&self) -> bool {
        self.auto_start
    }

    fn run_started(&self, event: &RunStarted) {
        self.started.lock().unwrap().push(event.clone());
    }

    fn run_finished(&self, summary: &RunSummary) {
        self.finished.lock().unwrap().push(summary.clone());
    }
}

/// Appends `.min` to every locator.
pub struct Minify;

impl Transform for Minify {
    async fn apply(&self, locator: &str) -> anyhow::Result<String> {
        Ok(format!("{}.min", locator))
    }
}

/// Always fails.
pub struct BrokenCompressor;

impl Transform for BrokenCompressor {
    async fn apply(&self, locator: &str) -> anyhow::Result<String> {
        anyhow::bail!("cannot decode {}", locator)
    }
}

/// Poll until the uploader has no active run.
pub async fn wait_idle<T, H, X, N>(uploader: &Uploader<T, H, X, N>)
where
    T: Transport,
    H: UploadHandler,
    X: Transform,
    N: LifecycleNotifier,
{
    for _ in 0..500 {
        if !uploader.is_running() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("uploader still running");
}
