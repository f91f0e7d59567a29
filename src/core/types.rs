//! # Core Types
//!
//! Wire models of the cache and module-storage APIs, and the record shape the
//! backends persist.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Media types the gateway knows how to serve back
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaType {
    Json,
    Xml,
    Text,
}

impl MediaType {
    /// Resolve a stored type tag. Unknown tags are `None`: they are accepted
    /// on write and rejected on read.
    pub fn from_tag(tag: &str) -> Option<Self> {
        match tag {
            "json" => Some(Self::Json),
            "xml" => Some(Self::Xml),
            "text" => Some(Self::Text),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Xml => "xml",
            Self::Text => "text",
        }
    }

    /// Content type used when the payload is served
    pub fn content_type(&self) -> &'static str {
        match self {
            Self::Json => "application/json",
            Self::Xml => "application/xml",
            Self::Text => "text/plain",
        }
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body of `POST /cache`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestObject {
    pub puts: Vec<PutRequest>,
}

/// One write candidate. Fields outside this set (bidder, aid, timestamp, ...)
/// are accepted and dropped.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PutRequest {
    #[serde(rename = "type")]
    pub media_type: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub key: Option<String>,

    pub value: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expiry: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ttlseconds: Option<i64>,
}

impl PutRequest {
    /// Strings are kept verbatim, any other JSON value is stored serialized
    pub fn value_as_string(&self) -> String {
        value_as_string(&self.value)
    }
}

pub(crate) fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Body of a successful `POST /cache`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResponseObject {
    pub responses: Vec<UuidResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UuidResponse {
    pub uuid: String,
}

impl ResponseObject {
    pub fn from_uuids(uuids: impl IntoIterator<Item = String>) -> Self {
        Self {
            responses: uuids.into_iter().map(|uuid| UuidResponse { uuid }).collect(),
        }
    }
}

/// A stored item as persisted by every backend kind
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredPayload {
    #[serde(rename = "type")]
    pub media_type: String,

    /// Key as assigned to the client, without the namespace prefix
    pub key: String,

    pub value: String,

    pub prefix: String,

    /// Effective ttl in seconds
    pub expiry: u64,

    pub created_at: DateTime<Utc>,
}

impl StoredPayload {
    pub fn new(
        media_type: impl Into<String>,
        key: impl Into<String>,
        value: impl Into<String>,
        prefix: impl Into<String>,
        expiry: u64,
    ) -> Self {
        Self {
            media_type: media_type.into(),
            key: key.into(),
            value: value.into(),
            prefix: prefix.into(),
            expiry,
            created_at: Utc::now(),
        }
    }

    /// Key the backend stores the record under
    pub fn normalized_key(&self) -> String {
        format!("{}{}", self.prefix, self.key)
    }
}

/// Body of `POST /storage`. Every field is optional here so that the
/// validator can report all missing fields at once.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StoragePayload {
    #[serde(default)]
    pub key: Option<String>,

    #[serde(rename = "type", default)]
    pub media_type: Option<MediaType>,

    #[serde(default)]
    pub value: Option<Value>,

    #[serde(default)]
    pub application: Option<String>,

    #[serde(default)]
    pub ttlseconds: Option<i64>,
}

/// Body of a successful `GET /storage`. `application` is never part of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleEntryResponse {
    #[serde(rename = "type")]
    pub media_type: String,
    pub key: String,
    pub value: String,
}

impl From<StoredPayload> for ModuleEntryResponse {
    fn from(payload: StoredPayload) -> Self {
        Self {
            media_type: payload.media_type,
            key: payload.key,
            value: payload.value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_put_request_ignores_extra_fields() {
        let put: PutRequest = serde_json::from_value(json!({
            "type": "json",
            "value": {"adm": "<div/>"},
            "bidder": "appnexus",
            "aid": "auction",
            "timestamp": 11
        }))
        .unwrap();

        assert_eq!(put.media_type, "json");
        assert!(put.key.is_none());
        assert_eq!(put.value_as_string(), r#"{"adm":"<div/>"}"#);
    }

    #[test]
    fn test_string_value_kept_verbatim() {
        let put: PutRequest =
            serde_json::from_value(json!({"type": "xml", "value": "<VAST version=\"3.0\"/>"}))
                .unwrap();
        assert_eq!(put.value_as_string(), "<VAST version=\"3.0\"/>");
    }

    #[test]
    fn test_media_type_tags() {
        assert_eq!(MediaType::from_tag("json"), Some(MediaType::Json));
        assert_eq!(MediaType::from_tag("xml").unwrap().content_type(), "application/xml");
        assert_eq!(MediaType::from_tag("unsupported"), None);
    }

    #[test]
    fn test_module_response_drops_prefix_and_expiry() {
        let stored = StoredPayload::new("text", "k1", "hello", "", 60);
        let value = serde_json::to_value(ModuleEntryResponse::from(stored)).unwrap();
        assert_eq!(value, json!({"type": "text", "key": "k1", "value": "hello"}));
    }
}
