use std::future::Future;

use tracing::warn;

use crate::guard::guarded_async;
use crate::types::UploadItem;

/// Optional pre-submission transform (e.g. image compression).
///
/// Receives the item's source locator and returns the locator of the
/// transformed resource. Failures never reach the caller: the uploader falls
/// back to the original locator.
pub trait Transform: Send + Sync + 'static {
    fn apply(&self, locator: &str) -> impl Future<Output = anyhow::Result<String>> + Send;
}

/// Transform that leaves every locator unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct Passthrough;

impl Transform for Passthrough {
    async fn apply(&self, locator: &str) -> anyhow::Result<String> {
        Ok(locator.to_string())
    }
}

/// Resolve the locator to submit for `item`.
///
/// Any transform error or panic is logged and absorbed; the original source
/// is returned instead. No retries happen here.
pub async fn effective_locator<X: Transform>(transform: &X, item: &UploadItem) -> String {
    let applied = guarded_async(transform.apply(&item.source))
        .await
        .unwrap_or_else(|panic| Err(anyhow::anyhow!("transform panicked: {}", panic)));
    match applied {
        Ok(locator) => locator,
        Err(e) => {
            warn!(
                item_id = %item.id,
                error = %e,
                "transform failed, uploading original"
            );
            item.source.clone()
        }
    }
}
