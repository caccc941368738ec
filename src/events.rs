use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::types::{BatchReport, ItemFailure, ItemSuccess, Phase, Settlement};

pub const ITEM_UPLOADED: &str = "media_upload:item_uploaded";
pub const ITEM_FAILED: &str = "media_upload:item_failed";
pub const BATCH_COMPLETED: &str = "media_upload:batch_completed";
pub const RUN_STARTED: &str = "media_upload:run_started";
pub const RUN_FINISHED: &str = "media_upload:run_finished";

/// Emitted when an item uploads successfully.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemUploadedEvent {
    pub item_id: String,
    pub response: Value,
    pub duration_ms: u64,
}

/// Emitted every time an item upload fails.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemFailedEvent {
    pub item_id: String,
    pub error: String,
    /// HTTP status for remote rejections.
    pub status: Option<u16>,
    pub round: u32,
    pub will_retry: bool,
}

/// Emitted once every item of a batch has settled.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchCompletedEvent {
    pub index: usize,
    pub phase: Phase,
    pub uploaded: Vec<String>,
    pub failed: Vec<String>,
}

impl From<&ItemSuccess> for ItemUploadedEvent {
    fn from(success: &ItemSuccess) -> Self {
        Self {
            item_id: success.id.clone(),
            response: success.response.clone(),
            duration_ms: success.duration_ms,
        }
    }
}

impl From<&ItemFailure> for ItemFailedEvent {
    fn from(failure: &ItemFailure) -> Self {
        Self {
            item_id: failure.id.clone(),
            error: failure.error.to_string(),
            status: failure.error.status(),
            round: failure.round,
            will_retry: failure.will_retry,
        }
    }
}

impl From<&BatchReport> for BatchCompletedEvent {
    fn from(report: &BatchReport) -> Self {
        let (uploaded, failed): (Vec<&Settlement>, Vec<&Settlement>) =
            report.settlements.iter().partition(|s| s.is_uploaded());
        Self {
            index: report.index,
            phase: report.phase,
            uploaded: uploaded.iter().map(|s| s.id().to_string()).collect(),
            failed: failed.iter().map(|s| s.id().to_string()).collect(),
        }
    }
}
