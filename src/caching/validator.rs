//! # Request Validator
//!
//! Checks write and read requests before anything reaches a backend. A cache
//! write batch is validated as a whole: every put gets its key and ttl
//! resolved up front, and the first failure rejects the batch with nothing
//! written.

use crate::caching::expiry::ExpiryPolicy;
use crate::caching::key_resolver::{KeyResolver, ResolvedKey};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{value_as_string, MediaType, RequestObject, StoragePayload, StoredPayload};
use serde_json::Value;

/// A put that passed validation and is ready to be stored
#[derive(Debug, Clone)]
pub struct ValidatedPut {
    pub key: ResolvedKey,
    pub payload: StoredPayload,
    /// Effective ttl in seconds
    pub ttl: u64,
}

/// A module storage entry that passed validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModuleEntry {
    pub application: String,
    pub key: String,
    pub media_type: MediaType,
    pub value: String,
    pub ttl: u64,
}

#[derive(Debug, Clone)]
pub struct RequestValidator {
    resolver: KeyResolver,
    expiry: ExpiryPolicy,
}

impl RequestValidator {
    pub fn new(resolver: KeyResolver, expiry: ExpiryPolicy) -> Self {
        Self { resolver, expiry }
    }

    pub fn resolver(&self) -> &KeyResolver {
        &self.resolver
    }

    /// Validate a whole `POST /cache` batch. `authorized` tells whether the
    /// caller presented a valid API key.
    pub fn validate_batch(
        &self,
        request: RequestObject,
        authorized: bool,
    ) -> GatewayResult<Vec<ValidatedPut>> {
        if request.puts.is_empty() {
            return Err(GatewayError::validation("No Elements Found."));
        }

        request
            .puts
            .into_iter()
            .map(|put| {
                let key = self.resolver.resolve(put.key.as_deref(), authorized)?;
                let ttl = self.expiry.effective_ttl(put.ttlseconds, put.expiry);
                let payload = StoredPayload::new(
                    put.media_type.clone(),
                    key.as_str(),
                    put.value_as_string(),
                    self.resolver.prefix(),
                    ttl,
                );
                Ok(ValidatedPut { key, payload, ttl })
            })
            .collect()
    }

    /// The `uuid` parameter of `GET /cache`
    pub fn require_uuid(uuid: Option<&str>) -> GatewayResult<&str> {
        uuid.ok_or_else(|| GatewayError::validation("Invalid Parameter(s): uuid not found."))
    }

    /// The `k` and `a` parameters of `GET /storage`
    pub fn require_storage_params<'a>(
        key: Option<&'a str>,
        application: Option<&'a str>,
    ) -> GatewayResult<(&'a str, &'a str)> {
        match (key, application) {
            (Some(key), Some(application)) => Ok((key, application)),
            _ => Err(GatewayError::validation(
                "Invalid parameters: key and application are required",
            )),
        }
    }

    /// Validate a `POST /storage` body, reporting every violation at once.
    /// An absent or zero `ttlseconds` takes `default_ttl`.
    pub fn validate_storage_payload(
        payload: StoragePayload,
        default_ttl: u64,
    ) -> GatewayResult<ModuleEntry> {
        let mut violations = Vec::new();

        if is_blank_str(payload.key.as_deref()) {
            violations.push("key must not be empty");
        }
        if payload.media_type.is_none() {
            violations.push("type must not be null");
        }
        if is_empty_value(payload.value.as_ref()) {
            violations.push("value must not be empty");
        }
        if is_blank_str(payload.application.as_deref()) {
            violations.push("application must not be empty");
        }
        if payload.ttlseconds.is_some_and(|ttl| ttl < 0) {
            violations.push("ttlseconds must be greater than or equal to 0");
        }

        match (payload.key, payload.media_type, payload.value, payload.application) {
            (Some(key), Some(media_type), Some(value), Some(application)) if violations.is_empty() => {
                let ttl = payload
                    .ttlseconds
                    .and_then(|ttl| u64::try_from(ttl).ok())
                    .filter(|ttl| *ttl > 0)
                    .unwrap_or(default_ttl);
                Ok(ModuleEntry {
                    application,
                    key,
                    media_type,
                    value: value_as_string(&value),
                    ttl,
                })
            }
            _ => Err(GatewayError::validation(violations.join(", "))),
        }
    }
}

fn is_blank_str(value: Option<&str>) -> bool {
    value.map_or(true, str::is_empty)
}

fn is_empty_value(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => true,
        Some(Value::String(s)) => s.is_empty(),
        Some(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn validator(allow_external: bool) -> RequestValidator {
        RequestValidator::new(
            KeyResolver::new(allow_external).with_prefix("prebid_".into()),
            ExpiryPolicy::new(100, 15, 300),
        )
    }

    fn batch(puts: serde_json::Value) -> RequestObject {
        serde_json::from_value(json!({ "puts": puts })).unwrap()
    }

    #[test]
    fn test_empty_batch() {
        let err = validator(false).validate_batch(batch(json!([])), false).unwrap_err();
        assert_eq!(err.to_string(), "No Elements Found.");
    }

    #[test]
    fn test_batch_resolves_keys_and_ttls_in_order() {
        let puts = validator(true)
            .validate_batch(
                batch(json!([
                    {"type": "json", "value": {"a": 1}, "ttlseconds": 400},
                    {"type": "xml", "value": "<x/>", "key": "fixed", "expiry": 1}
                ])),
                false,
            )
            .unwrap();

        assert_eq!(puts.len(), 2);
        assert!(!puts[0].key.is_external());
        assert_eq!(puts[0].ttl, 300);
        assert_eq!(puts[0].payload.value, r#"{"a":1}"#);
        assert_eq!(puts[1].key.as_str(), "fixed");
        assert_eq!(puts[1].ttl, 15);
        assert_eq!(puts[1].payload.normalized_key(), "prebid_fixed");
    }

    #[test]
    fn test_one_bad_put_rejects_batch() {
        let err = validator(false)
            .validate_batch(
                batch(json!([
                    {"type": "json", "value": 1},
                    {"type": "json", "value": 2, "key": "mine"}
                ])),
                true,
            )
            .unwrap_err();
        assert_eq!(err.to_string(), "Prebid cache host forbids specifying UUID in request.");
    }

    #[test]
    fn test_unknown_type_accepted_on_write() {
        let puts = validator(false)
            .validate_batch(batch(json!([{"type": "unsupported", "value": "x"}])), false)
            .unwrap();
        assert_eq!(puts[0].payload.media_type, "unsupported");
    }

    #[test]
    fn test_require_uuid() {
        assert_eq!(RequestValidator::require_uuid(Some("abc")).unwrap(), "abc");
        let err = RequestValidator::require_uuid(None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid Parameter(s): uuid not found.");
    }

    #[test]
    fn test_require_storage_params() {
        assert!(RequestValidator::require_storage_params(Some("k"), Some("a")).is_ok());
        let err = RequestValidator::require_storage_params(Some("k"), None).unwrap_err();
        assert_eq!(err.to_string(), "Invalid parameters: key and application are required");
    }

    #[test]
    fn test_storage_payload_default_ttl() {
        let payload: StoragePayload = serde_json::from_value(json!({
            "key": "k1", "type": "json", "value": {"x": 1}, "application": "app"
        }))
        .unwrap();

        let entry = RequestValidator::validate_storage_payload(payload, 1000).unwrap();
        assert_eq!(entry.ttl, 1000);
        assert_eq!(entry.value, r#"{"x":1}"#);
        assert_eq!(entry.media_type, MediaType::Json);
    }

    #[test]
    fn test_storage_payload_reports_all_violations() {
        let payload: StoragePayload = serde_json::from_value(json!({
            "key": "", "value": "", "application": "", "ttlseconds": -1
        }))
        .unwrap();

        let err = RequestValidator::validate_storage_payload(payload, 1000).unwrap_err();
        assert_eq!(
            err.to_string(),
            "key must not be empty, type must not be null, value must not be empty, \
             application must not be empty, ttlseconds must be greater than or equal to 0"
        );
    }
}
