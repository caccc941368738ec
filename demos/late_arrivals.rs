use std::collections::BTreeMap;
use std::time::Duration;

use media_upload_queue::*;
use serde_json::{json, Value};

/// Pretends to upload; every third item fails on its first attempt.
#[derive(Default)]
struct SimulatedTransport {
    seen: std::sync::Mutex<std::collections::HashSet<String>>,
}

impl Transport for SimulatedTransport {
    async fn submit(
        &self,
        _endpoint: &str,
        payload: UploadPayload,
        _headers: &BTreeMap<String, String>,
    ) -> std::result::Result<Value, TransportError> {
        tokio::time::sleep(Duration::from_millis(50)).await;

        let first_attempt = self
            .seen
            .lock()
            .map(|mut seen| seen.insert(payload.locator.clone()))
            .unwrap_or(false);
        let n: usize = payload
            .fields
            .get("n")
            .and_then(|n| n.parse().ok())
            .unwrap_or(0);

        if first_attempt && n % 3 == 0 {
            return Err(TransportError::Remote {
                status: 503,
                body: "storage busy".into(),
            });
        }
        Ok(json!({ "stored": payload.locator }))
    }
}

struct Summary;

impl UploadHandler for Summary {
    fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
        let ids: Vec<&str> = report.settlements.iter().map(|s| s.id()).collect();
        println!("{:?} #{} -> {:?}", report.phase, report.index, ids);
        Ok(())
    }
}

fn items(prefix: &str, range: std::ops::Range<usize>) -> Vec<UploadItem> {
    range
        .map(|n| {
            UploadItem::new(format!("{}-{}", prefix, n), format!("/camera/{}-{}.jpg", prefix, n))
                .with_extra("n", n.to_string())
        })
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_upload_queue=info".into()),
        )
        .init();

    let uploader = Uploader::new(SimulatedTransport::default(), Summary);
    let config = UploadConfig::builder("memory://uploads")
        .with_batch_size(4)
        .build()?;

    let first = uploader.upload(items("roll", 0..10), config.clone())?;

    // Arrives while the first run is busy: queued, then drained.
    tokio::time::sleep(Duration::from_millis(20)).await;
    match uploader.upload(items("late", 0..3), config)? {
        Submission::Queued { queued, pending } => {
            println!("queued {} items ({} pending)", queued, pending)
        }
        Submission::Started(_) => println!("started a new run"),
    }

    if let Some(handle) = first.into_handle() {
        let summary = handle.wait().await?;
        println!(
            "{} uploaded in {} batches, {} retry rounds",
            summary.uploaded, summary.batches, summary.retry_rounds
        );
    }

    Ok(())
}
