//! # Key Resolver
//!
//! Decides the UUID a put is stored under. A put without a key gets a fresh
//! random UUID; a client supplied key is only accepted when the deployment
//! allows external UUIDs, and must then match `^[a-zA-Z0-9_-]+$`.
//!
//! Duplicate handling is not decided here: the resolver only produces a key,
//! the cache manager asks the backend for a create-only write when duplicate
//! prevention applies.

use regex::Regex;
use std::sync::OnceLock;
use uuid::Uuid;

use crate::core::config::{ApiConfig, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Where the key of a resolved put came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedKey {
    /// Generated by the gateway
    Generated(String),
    /// Supplied by the client and accepted
    External(String),
}

impl ResolvedKey {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Generated(key) | Self::External(key) => key,
        }
    }

    pub fn into_string(self) -> String {
        match self {
            Self::Generated(key) | Self::External(key) => key,
        }
    }

    pub fn is_external(&self) -> bool {
        matches!(self, Self::External(_))
    }
}

/// Resolves put keys according to the external UUID policy
#[derive(Debug, Clone)]
pub struct KeyResolver {
    allow_external_uuid: bool,
    external_uuid_secured: bool,
    prefix: String,
}

impl KeyResolver {
    pub fn new(allow_external_uuid: bool) -> Self {
        Self {
            allow_external_uuid,
            external_uuid_secured: false,
            prefix: String::new(),
        }
    }

    pub fn from_config(cache: &CacheConfig, api: &ApiConfig) -> Self {
        Self::new(cache.allow_external_uuid)
            .with_external_uuid_secured(api.external_uuid_secured)
            .with_prefix(cache.prefix.clone())
    }

    /// Require a valid API key from callers that supply their own UUID
    pub fn with_external_uuid_secured(mut self, secured: bool) -> Self {
        self.external_uuid_secured = secured;
        self
    }

    /// Prefix applied to every key when it reaches the backend
    pub fn with_prefix(mut self, prefix: String) -> Self {
        self.prefix = prefix;
        self
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Resolve the key of one put. `authorized` tells whether the caller
    /// presented a valid API key.
    pub fn resolve(&self, requested: Option<&str>, authorized: bool) -> GatewayResult<ResolvedKey> {
        let Some(key) = requested else {
            return Ok(ResolvedKey::Generated(generate_uuid()));
        };

        if !self.allow_external_uuid {
            return Err(GatewayError::validation(
                "Prebid cache host forbids specifying UUID in request.",
            ));
        }
        if self.external_uuid_secured && !authorized {
            return Err(GatewayError::unauthorized_with(
                "Prebid cache host forbids specifying UUID in request by unauthorized users.",
            ));
        }
        if !is_valid_uuid(key) {
            return Err(GatewayError::validation(format!("Invalid UUID: [{}].", key)));
        }

        Ok(ResolvedKey::External(key.to_string()))
    }

    /// Key the backend stores `key` under
    pub fn normalize(&self, key: &str) -> String {
        format!("{}{}", self.prefix, key)
    }
}

fn uuid_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]+$").expect("static uuid pattern"))
}

/// Whether `key` is an acceptable UUID. Empty keys are rejected.
pub fn is_valid_uuid(key: &str) -> bool {
    uuid_pattern().is_match(key)
}

pub fn generate_uuid() -> String {
    Uuid::new_v4().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generates_when_no_key() {
        let resolver = KeyResolver::new(false);
        let key = resolver.resolve(None, false).unwrap();
        assert!(!key.is_external());
        assert!(is_valid_uuid(key.as_str()));
        assert_eq!(key.as_str().len(), 36);
    }

    #[test]
    fn test_generated_keys_are_distinct() {
        let resolver = KeyResolver::new(false);
        let a = resolver.resolve(None, false).unwrap();
        let b = resolver.resolve(None, false).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_external_key_forbidden() {
        let resolver = KeyResolver::new(false);
        let err = resolver.resolve(Some("abc"), true).unwrap_err();
        assert_eq!(err.to_string(), "Prebid cache host forbids specifying UUID in request.");
        assert_eq!(err.status_code(), axum::http::StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_external_key_accepted() {
        let resolver = KeyResolver::new(true);
        let key = resolver.resolve(Some("my_key-01"), false).unwrap();
        assert_eq!(key, ResolvedKey::External("my_key-01".into()));
    }

    #[test]
    fn test_malformed_external_key() {
        let resolver = KeyResolver::new(true);
        for bad in ["", "has space", "slash/key", "dot.key"] {
            let err = resolver.resolve(Some(bad), false).unwrap_err();
            assert_eq!(err.to_string(), format!("Invalid UUID: [{}].", bad));
        }
    }

    #[test]
    fn test_secured_external_key_needs_api_key() {
        let resolver = KeyResolver::new(true).with_external_uuid_secured(true);

        let err = resolver.resolve(Some("abc"), false).unwrap_err();
        assert_eq!(err.status_code(), axum::http::StatusCode::UNAUTHORIZED);
        assert_eq!(
            err.to_string(),
            "Prebid cache host forbids specifying UUID in request by unauthorized users."
        );

        assert!(resolver.resolve(Some("abc"), true).is_ok());
        // generated keys never need the api key
        assert!(resolver.resolve(None, false).is_ok());
    }

    #[test]
    fn test_normalize_applies_prefix() {
        let resolver = KeyResolver::new(true).with_prefix("prebid_".into());
        assert_eq!(resolver.normalize("abc"), "prebid_abc");
    }
}
