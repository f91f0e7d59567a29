//! Expiry policy: picks the ttl of a put and clamps it into the configured bounds.

use crate::core::config::CacheConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExpiryPolicy {
    default_secs: u64,
    min_secs: u64,
    max_secs: u64,
}

impl ExpiryPolicy {
    /// `min_secs` must not exceed `max_secs`; config validation enforces it
    pub fn new(default_secs: u64, min_secs: u64, max_secs: u64) -> Self {
        Self {
            default_secs,
            min_secs,
            max_secs,
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.expiry_sec, config.min_expiry, config.max_expiry)
    }

    /// Effective ttl in seconds. `ttlseconds` wins over the legacy `expiry`
    /// field, the default applies when neither is present. Out of range
    /// values saturate, negative values count as zero.
    pub fn effective_ttl(&self, ttlseconds: Option<i64>, expiry: Option<i64>) -> u64 {
        let requested = ttlseconds
            .or(expiry)
            .map(|secs| u64::try_from(secs).unwrap_or(0))
            .unwrap_or(self.default_secs);

        requested.clamp(self.min_secs, self.max_secs)
    }
}
