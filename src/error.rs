use std::sync::Arc;

use thiserror::Error;

/// Errors raised by a [`Transport`](crate::Transport) while submitting one item.
#[derive(Error, Debug)]
pub enum TransportError {
    /// The endpoint was reached and answered with a non-success status.
    #[error("Upload endpoint returned HTTP {status}: {body}")]
    Remote { status: u16, body: String },

    /// Network-level request failure with context.
    #[error("{context}: {source}")]
    Network {
        context: String,
        source: reqwest::Error,
    },

    /// The effective locator could not be read from disk.
    #[error("Failed to read {path}: {source}")]
    Io {
        path: String,
        source: std::io::Error,
    },

    /// The request could not be assembled (bad MIME type, header, etc.).
    #[error("Invalid upload payload: {0}")]
    InvalidPayload(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for TransportError {
    fn from(err: anyhow::Error) -> Self {
        TransportError::Other(format!("{:#}", err))
    }
}

/// Classified failure of a single item submission.
///
/// Cheap to clone so the same failure can be handed to the per-item callback,
/// stored in a batch report, and carried into the next retry round.
#[derive(Error, Debug, Clone)]
pub enum SubmitError {
    /// The remote endpoint rejected the upload.
    #[error("Upload rejected with HTTP {status}: {error}")]
    Remote { status: u16, error: String },

    /// No response was received; the raw transport error is kept as-is.
    #[error(transparent)]
    Transport(Arc<TransportError>),
}

impl SubmitError {
    /// HTTP status of a remote rejection, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            SubmitError::Remote { status, .. } => Some(*status),
            SubmitError::Transport(_) => None,
        }
    }

    pub fn is_remote(&self) -> bool {
        matches!(self, SubmitError::Remote { .. })
    }
}

/// Errors surfaced by the uploader itself.
#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The run task ended (panicked or was aborted) before reporting a summary.
    #[error("Upload run task failed: {0}")]
    Join(String),

    #[error("{0}")]
    Other(String),
}

impl From<anyhow::Error> for UploadError {
    fn from(err: anyhow::Error) -> Self {
        UploadError::Other(err.to_string())
    }
}

/// Convenience alias.
pub type Result<T> = std::result::Result<T, UploadError>;
