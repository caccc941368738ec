use media_upload_queue::*;

struct PrintProgress;

impl UploadHandler for PrintProgress {
    fn on_item_success(&self, success: &ItemSuccess) {
        println!("uploaded {} in {}ms", success.id, success.duration_ms);
    }

    fn on_item_failure(&self, failure: &ItemFailure) {
        println!(
            "failed {} (round {}, retry: {}): {}",
            failure.id, failure.round, failure.will_retry, failure.error
        );
    }

    fn on_batch_complete(&self, report: &BatchReport) -> anyhow::Result<()> {
        println!(
            "{:?} batch {}: {} uploaded, {} failed",
            report.phase,
            report.index,
            report.uploaded(),
            report.failed()
        );
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "media_upload_queue=debug".into()),
        )
        .init();

    let endpoint =
        std::env::var("UPLOAD_ENDPOINT").unwrap_or_else(|_| "http://127.0.0.1:8080/upload".into());

    let transport = HttpTransport::new().with_timeout(std::time::Duration::from_secs(30));
    let uploader = Uploader::new(transport, PrintProgress);

    let items = vec![
        UploadItem::new("img-1", "/photos/cat.jpg").with_extra("album", "pets"),
        UploadItem::new("img-2", "/photos/dog.jpg").with_extra("album", "pets"),
        UploadItem::new("img-3", "file:///photos/sunset.png")
            .with_kind("image/png")
            .with_name("sunset.png"),
    ];

    let config = UploadConfig::builder(endpoint)
        .with_batch_size(2)
        .with_max_retries(1)
        .build()?;

    if let Some(handle) = uploader.upload(items, config)?.into_handle() {
        let summary = handle.wait().await?;
        println!(
            "run {} done: {} uploaded, {} dropped",
            summary.run_id,
            summary.uploaded,
            summary.dropped.len()
        );
    }

    Ok(())
}
