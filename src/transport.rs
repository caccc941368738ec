use std::collections::BTreeMap;
use std::future::Future;
use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::Client;
use serde_json::Value;

use crate::error::TransportError;

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_FILE_FIELD: &str = "file";

/// Multipart-style request body for one item: one binary field plus any
/// number of string fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadPayload {
    /// Effective locator of the bytes to send (possibly transformed).
    pub locator: String,
    /// File name reported for the binary field.
    pub file_name: String,
    /// MIME type reported for the binary field.
    pub kind: String,
    /// Flattened item extras.
    pub fields: BTreeMap<String, String>,
}

/// Performs the actual transfer of one item.
///
/// Return [`TransportError::Remote`] when the endpoint answered with an error
/// status so the failure is classified as a remote rejection; any other
/// variant is passed through untouched. Timeouts are the transport's concern.
///
/// # Example
///
/// ```ignore
/// use media_upload_queue::*;
///
/// struct Recorder;
///
/// impl Transport for Recorder {
///     async fn submit(
///         &self,
///         endpoint: &str,
///         payload: UploadPayload,
///         _headers: &std::collections::BTreeMap<String, String>,
///     ) -> Result<serde_json::Value, TransportError> {
///         println!("POST {} <- {}", endpoint, payload.locator);
///         Ok(serde_json::json!({ "ok": true }))
///     }
/// }
/// ```
pub trait Transport: Send + Sync + 'static {
    fn submit(
        &self,
        endpoint: &str,
        payload: UploadPayload,
        headers: &BTreeMap<String, String>,
    ) -> impl Future<Output = Result<Value, TransportError>> + Send;
}

/// [`Transport`] that posts each item as `multipart/form-data` with `reqwest`.
///
/// The effective locator is read from the local filesystem; a `file://`
/// prefix is accepted. The response body is parsed as JSON when possible and
/// otherwise returned as a JSON string.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    http: Client,
    timeout: Duration,
    file_field: String,
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpTransport {
    pub fn new() -> Self {
        Self {
            http: Client::new(),
            timeout: DEFAULT_TIMEOUT,
            file_field: DEFAULT_FILE_FIELD.to_string(),
        }
    }

    /// Use a custom `reqwest::Client` (for connection pooling, proxies, TLS).
    pub fn with_http_client(mut self, client: Client) -> Self {
        self.http = client;
        self
    }

    /// Per-request timeout (default 60s).
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Name of the multipart field carrying the file bytes (default `file`).
    pub fn with_file_field(mut self, name: impl Into<String>) -> Self {
        self.file_field = name.into();
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn build_form(&self, payload: UploadPayload) -> Result<Form, TransportError> {
        let path = local_path(&payload.locator);
        let bytes = tokio::fs::read(path)
            .await
            .map_err(|e| TransportError::Io {
                path: path.to_string(),
                source: e,
            })?;

        let part = Part::bytes(bytes)
            .file_name(payload.file_name)
            .mime_str(&payload.kind)
            .map_err(|e| {
                TransportError::InvalidPayload(format!("media kind '{}': {}", payload.kind, e))
            })?;

        let mut form = Form::new().part(self.file_field.clone(), part);
        for (key, value) in payload.fields {
            form = form.text(key, value);
        }
        Ok(form)
    }
}

impl Transport for HttpTransport {
    async fn submit(
        &self,
        endpoint: &str,
        payload: UploadPayload,
        headers: &BTreeMap<String, String>,
    ) -> Result<Value, TransportError> {
        let form = self.build_form(payload).await?;

        let mut request = self
            .http
            .post(endpoint)
            .timeout(self.timeout)
            .multipart(form);
        for (name, value) in headers {
            request = request.header(name.as_str(), value.as_str());
        }

        let resp = request.send().await.map_err(|e| TransportError::Network {
            context: format!("Cannot reach upload endpoint {}", endpoint),
            source: e,
        })?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(TransportError::Remote { status, body });
        }

        let text = resp.text().await.map_err(|e| TransportError::Network {
            context: "Failed to read upload response".into(),
            source: e,
        })?;
        Ok(parse_body(&text))
    }
}

fn local_path(locator: &str) -> &str {
    locator.strip_prefix("file://").unwrap_or(locator)
}

fn parse_body(text: &str) -> Value {
    if text.trim().is_empty() {
        return Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| Value::String(text.to_string()))
}
