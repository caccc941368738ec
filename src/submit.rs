use std::sync::Arc;

use serde_json::{Map, Value};

use crate::config::UploadConfig;
use crate::error::{SubmitError, TransportError};
use crate::transport::{Transport, UploadPayload};
use crate::types::UploadItem;

/// Media kind used when an item does not specify one.
pub const DEFAULT_MEDIA_KIND: &str = "image/jpeg";
/// File name used when an item does not specify one.
pub const DEFAULT_FILE_NAME: &str = "image.jpg";

/// Build the transport payload for `item`, sending `locator` as the file.
pub fn build_payload(item: &UploadItem, locator: String) -> UploadPayload {
    UploadPayload {
        locator,
        file_name: item
            .name
            .clone()
            .unwrap_or_else(|| DEFAULT_FILE_NAME.to_string()),
        kind: item
            .kind
            .clone()
            .unwrap_or_else(|| DEFAULT_MEDIA_KIND.to_string()),
        fields: item.extras.clone(),
    }
}

/// Normalize a transport failure.
///
/// Remote rejections become [`SubmitError::Remote`] with the response body as
/// the error; everything else is kept as the raw transport error.
pub fn classify(err: TransportError) -> SubmitError {
    match err {
        TransportError::Remote { status, body } => SubmitError::Remote {
            status,
            error: body,
        },
        other => SubmitError::Transport(Arc::new(other)),
    }
}

/// Attach the item id to a transport response.
///
/// Object responses gain an `id` key; any other value is wrapped as
/// `{"id": .., "response": ..}`.
pub fn merge_id(response: Value, id: &str) -> Value {
    match response {
        Value::Object(mut map) => {
            map.insert("id".into(), Value::String(id.to_string()));
            Value::Object(map)
        }
        other => {
            let mut map = Map::new();
            map.insert("id".into(), Value::String(id.to_string()));
            map.insert("response".into(), other);
            Value::Object(map)
        }
    }
}

/// Submit one item through `transport` and return the merged response.
pub async fn submit_item<T: Transport>(
    transport: &T,
    item: &UploadItem,
    locator: String,
    config: &UploadConfig,
) -> Result<Value, SubmitError> {
    let payload = build_payload(item, locator);
    transport
        .submit(&config.endpoint, payload, &config.headers)
        .await
        .map(|response| merge_id(response, &item.id))
        .map_err(classify)
}
