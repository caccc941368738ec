use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::error::{Result, UploadError};

pub const DEFAULT_BATCH_SIZE: usize = 10;
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Configuration for one upload run.
///
/// Use [`UploadConfig::builder()`] for validated construction. A config is
/// fixed for the lifetime of the run it starts; items queued behind an active
/// run are uploaded with that run's config.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UploadConfig {
    /// Target URL the transport submits to.
    pub endpoint: String,

    /// Maximum number of items uploaded concurrently in one batch.
    pub batch_size: usize,

    /// Retry rounds over failed items after the primary pass and drain.
    pub max_retries: u32,

    /// Run the configured transform (e.g. compression) before submission.
    pub enable_transform: bool,

    /// Extra request headers handed to the transport.
    pub headers: BTreeMap<String, String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            endpoint: String::new(),
            batch_size: DEFAULT_BATCH_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            enable_transform: true,
            headers: BTreeMap::new(),
        }
    }
}

impl UploadConfig {
    /// Start building a config for the given endpoint.
    pub fn builder(endpoint: impl Into<String>) -> UploadConfigBuilder {
        UploadConfigBuilder {
            config: UploadConfig {
                endpoint: endpoint.into(),
                ..UploadConfig::default()
            },
        }
    }

    /// Check the invariants [`UploadConfigBuilder::build`] enforces. Useful
    /// for configs obtained through deserialization.
    pub fn validate(&self) -> Result<()> {
        if self.endpoint.trim().is_empty() {
            return Err(UploadError::InvalidConfig("endpoint is empty".into()));
        }
        if self.batch_size == 0 {
            return Err(UploadError::InvalidConfig(
                "batch size must be at least 1".into(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`UploadConfig`].
#[derive(Debug)]
pub struct UploadConfigBuilder {
    config: UploadConfig,
}

impl UploadConfigBuilder {
    /// Set the number of items uploaded concurrently per batch.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.config.batch_size = size;
        self
    }

    /// Set the number of retry rounds (0 disables retries).
    pub fn with_max_retries(mut self, max: u32) -> Self {
        self.config.max_retries = max;
        self
    }

    /// Enable or disable the pre-submission transform.
    pub fn with_transform(mut self, enabled: bool) -> Self {
        self.config.enable_transform = enabled;
        self
    }

    /// Add a request header passed through to the transport.
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.config.headers.insert(name.into(), value.into());
        self
    }

    /// Build the final [`UploadConfig`].
    pub fn build(self) -> Result<UploadConfig> {
        self.config.validate()?;
        Ok(self.config)
    }
}
