//! # Storage Backends
//!
//! One trait, three interchangeable kinds:
//!
//! | kind     | engine                         | reject on duplicate |
//! |----------|--------------------------------|---------------------|
//! | `redis`  | Redis via `ConnectionManager`  | yes (`SET NX`)      |
//! | `record` | namespaced record store        | yes (create-only)   |
//! | `grid`   | named-cache data grid          | no, always overwrites |
//!
//! Namespace, cache name and key prefix are bound when a backend instance is
//! built, so callers only deal in keys.

pub mod grid_store;
pub mod memory;
pub mod record_store;
pub mod redis_store;

pub use grid_store::{GridStore, GridStoreConfig};
pub use memory::ExpiringTable;
pub use record_store::{RecordStore, RecordStoreConfig};
pub use redis_store::{RedisStore, RedisStoreConfig};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use super::StorageResult;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::StoredPayload;

/// How a put treats an existing key
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteMode {
    /// Replace any existing value
    Overwrite,
    /// Fail with `StorageError::Duplicate` when the key exists
    CreateOnly,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    Redis,
    Record,
    Grid,
}

impl BackendKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Redis => "redis",
            Self::Record => "record",
            Self::Grid => "grid",
        }
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait for storage backend implementations
#[async_trait]
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Whether `WriteMode::CreateOnly` is enforced atomically by the engine.
    /// Backends returning `false` treat every put as an overwrite.
    fn supports_reject_on_duplicate(&self) -> bool;

    /// Store `payload` under `key` for `ttl`
    async fn put(
        &self,
        key: &str,
        payload: &StoredPayload,
        ttl: Duration,
        mode: WriteMode,
    ) -> StorageResult<()>;

    /// Fetch a live entry, `None` when absent or expired
    async fn get(&self, key: &str) -> StorageResult<Option<StoredPayload>>;

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    async fn health_check(&self) -> StorageResult<bool>;
}

/// Backend selection, tagged by `kind`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum BackendConfig {
    Redis(RedisStoreConfig),
    Record(RecordStoreConfig),
    Grid(GridStoreConfig),
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self::Record(RecordStoreConfig::default())
    }
}

impl BackendConfig {
    pub fn kind(&self) -> BackendKind {
        match self {
            Self::Redis(_) => BackendKind::Redis,
            Self::Record(_) => BackendKind::Record,
            Self::Grid(_) => BackendKind::Grid,
        }
    }

    pub fn validate(&self) -> GatewayResult<()> {
        match self {
            Self::Redis(config) => {
                if !config.url.starts_with("redis://") && !config.url.starts_with("rediss://") {
                    return Err(GatewayError::config(format!(
                        "Redis url must start with redis:// or rediss://: {}",
                        config.url
                    )));
                }
            }
            Self::Record(config) => {
                if config.namespace.is_empty() {
                    return Err(GatewayError::config("Record store namespace must not be empty"));
                }
                if config.sweep_interval.is_zero() {
                    return Err(GatewayError::config("Record store sweep_interval must be greater than 0"));
                }
            }
            Self::Grid(config) => {
                if config.cache_name.is_empty() {
                    return Err(GatewayError::config("Grid cache name must not be empty"));
                }
                if config.sweep_interval.is_zero() {
                    return Err(GatewayError::config("Grid sweep_interval must be greater than 0"));
                }
            }
        }
        Ok(())
    }
}

/// Build a backend instance from its configuration
pub async fn build_backend(config: &BackendConfig) -> StorageResult<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config {
        BackendConfig::Redis(redis) => Arc::new(RedisStore::connect(redis.clone()).await?),
        BackendConfig::Record(record) => Arc::new(RecordStore::new(record.clone())),
        BackendConfig::Grid(grid) => Arc::new(GridStore::new(grid.clone())),
    };
    Ok(backend)
}
