//! # API Key Gate
//!
//! Shared-secret check on the `x-pbc-api-key` header. The header must match
//! the configured key exactly (case-sensitive). Without a configured key no
//! caller is ever authorized.

use axum::http::HeaderMap;
use tracing::debug;

use crate::core::config::ApiConfig;
use crate::core::error::{GatewayError, GatewayResult};

pub const API_KEY_HEADER: &str = "x-pbc-api-key";

#[derive(Debug, Clone, Default)]
pub struct ApiKeyGate {
    api_key: Option<String>,
    cache_write_secured: bool,
}

impl ApiKeyGate {
    pub fn new(api_key: Option<String>) -> Self {
        Self {
            api_key: api_key.filter(|key| !key.is_empty()),
            cache_write_secured: false,
        }
    }

    pub fn from_config(config: &ApiConfig) -> Self {
        Self::new(config.api_key.clone()).with_cache_write_secured(config.cache_write_secured)
    }

    pub fn with_cache_write_secured(mut self, secured: bool) -> Self {
        self.cache_write_secured = secured;
        self
    }

    pub fn api_key(&self) -> Option<&str> {
        self.api_key.as_deref()
    }

    /// Whether the first `x-pbc-api-key` header carries the configured key
    pub fn is_authorized(&self, headers: &HeaderMap) -> bool {
        let Some(expected) = self.api_key.as_deref() else {
            return false;
        };

        headers
            .get(API_KEY_HEADER)
            .map(|value| constant_time_eq(value.as_bytes(), expected.as_bytes()))
            .unwrap_or(false)
    }

    /// Gate for `POST /cache`. Returns whether the caller is authorized so
    /// that external UUID checks can reuse the answer.
    pub fn check_cache_write(&self, headers: &HeaderMap) -> GatewayResult<bool> {
        let authorized = self.is_authorized(headers);
        if self.cache_write_secured && !authorized {
            debug!("cache write rejected, api key missing or invalid");
            return Err(GatewayError::unauthorized());
        }
        Ok(authorized)
    }

    /// Gate for module storage, which always requires the key
    pub fn require(&self, headers: &HeaderMap) -> GatewayResult<()> {
        if self.is_authorized(headers) {
            Ok(())
        } else {
            debug!("module storage request rejected, api key missing or invalid");
            Err(GatewayError::unauthorized())
        }
    }
}

fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |acc, (x, y)| acc | (x ^ y)) == 0
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn headers(key: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_str(key).unwrap());
        headers
    }

    #[test]
    fn test_matching_key() {
        let gate = ApiKeyGate::new(Some("secret".into()));
        assert!(gate.is_authorized(&headers("secret")));
    }

    #[test]
    fn test_wrong_case_and_empty_keys_rejected() {
        let gate = ApiKeyGate::new(Some("secret".into()));
        assert!(!gate.is_authorized(&headers("SECRET")));
        assert!(!gate.is_authorized(&headers("")));
        assert!(!gate.is_authorized(&HeaderMap::new()));
    }

    #[test]
    fn test_unconfigured_gate_never_authorizes() {
        let gate = ApiKeyGate::new(None);
        assert!(!gate.is_authorized(&headers("anything")));
        assert!(gate.require(&headers("anything")).is_err());
    }

    #[test]
    fn test_open_cache_write() {
        let gate = ApiKeyGate::new(Some("secret".into()));
        assert_eq!(gate.check_cache_write(&HeaderMap::new()).unwrap(), false);
        assert_eq!(gate.check_cache_write(&headers("secret")).unwrap(), true);
    }

    #[test]
    fn test_secured_cache_write() {
        let gate = ApiKeyGate::new(Some("secret".into())).with_cache_write_secured(true);
        let err = gate.check_cache_write(&headers("wrong")).unwrap_err();
        assert_eq!(err, GatewayError::unauthorized());
    }
}
