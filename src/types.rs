use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::SubmitError;

/// Per-item upload status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ItemStatus {
    Pending,
    Uploaded,
    Failed,
}

/// A single media item to upload.
///
/// Identity is the caller-assigned `id`. Items are plain values and are
/// cloned freely between the pending queue, batches, and retry rounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadItem {
    /// Stable identifier assigned by the caller.
    pub id: String,
    /// Current upload status.
    pub status: ItemStatus,
    /// Opaque locator of the media (a path or `file://` URI).
    pub source: String,
    /// Media kind (MIME type). Defaults to `image/jpeg` on submission.
    pub kind: Option<String>,
    /// Display name. Defaults to `image.jpg` on submission.
    pub name: Option<String>,
    /// Extra form fields sent alongside the file.
    #[serde(default)]
    pub extras: BTreeMap<String, String>,
}

impl UploadItem {
    /// Create a pending item with no kind, name, or extras.
    pub fn new(id: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: ItemStatus::Pending,
            source: source.into(),
            kind: None,
            name: None,
            extras: BTreeMap::new(),
        }
    }

    /// Set the media kind (builder pattern).
    pub fn with_kind(mut self, kind: impl Into<String>) -> Self {
        self.kind = Some(kind.into());
        self
    }

    /// Set the display name (builder pattern).
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Add one extra form field (builder pattern).
    pub fn with_extra(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.extras.insert(key.into(), value.into());
        self
    }

    /// Copy of this item carrying `status`.
    pub fn with_status(&self, status: ItemStatus) -> Self {
        Self {
            status,
            ..self.clone()
        }
    }
}

/// Which phase of a run produced a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", tag = "phase")]
pub enum Phase {
    /// The caller-supplied items.
    Primary,
    /// Items that were queued while the run was active.
    Drain,
    /// A retry round over previously failed items (1-based).
    Retry { round: u32 },
}

impl Phase {
    /// Retry round this phase belongs to; 0 outside the retry loop.
    pub fn round(&self) -> u32 {
        match self {
            Phase::Retry { round } => *round,
            _ => 0,
        }
    }
}

/// A successful item upload.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ItemSuccess {
    pub id: String,
    /// The item as submitted, with status set to `Uploaded`.
    pub item: UploadItem,
    /// Transport response merged with the item id.
    pub response: Value,
    pub duration_ms: u64,
    /// RFC 3339 timestamp of settlement.
    pub completed_at: String,
}

/// A failed item upload.
#[derive(Debug, Clone)]
pub struct ItemFailure {
    pub id: String,
    /// The item as submitted, with status set to `Failed`.
    pub item: UploadItem,
    pub error: SubmitError,
    /// Retry round in which the failure happened (0 = primary pass or drain).
    pub round: u32,
    pub duration_ms: u64,
    /// Whether the item will be submitted again in a later retry round.
    pub will_retry: bool,
}

/// Outcome of one item within a batch.
#[derive(Debug, Clone)]
pub enum Settlement {
    Uploaded(ItemSuccess),
    Failed(ItemFailure),
}

impl Settlement {
    pub fn id(&self) -> &str {
        match self {
            Settlement::Uploaded(s) => &s.id,
            Settlement::Failed(f) => &f.id,
        }
    }

    pub fn is_uploaded(&self) -> bool {
        matches!(self, Settlement::Uploaded(_))
    }
}

/// Settlement summary of one batch, in item order.
#[derive(Debug, Clone)]
pub struct BatchReport {
    /// 1-based batch index within its phase.
    pub index: usize,
    pub phase: Phase,
    pub settlements: Vec<Settlement>,
}

impl BatchReport {
    pub fn uploaded(&self) -> usize {
        self.settlements.iter().filter(|s| s.is_uploaded()).count()
    }

    pub fn failed(&self) -> usize {
        self.settlements.len() - self.uploaded()
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunSummary {
    pub run_id: String,
    /// Number of items uploaded across all phases.
    pub uploaded: usize,
    /// Number of batches processed across all phases.
    pub batches: usize,
    /// Retry rounds actually executed.
    pub retry_rounds: u32,
    /// Ids still failing after the retry budget was exhausted.
    pub dropped: Vec<String>,
    pub duration_ms: u64,
}
