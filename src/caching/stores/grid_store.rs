//! # Grid Store
//!
//! Named-cache data grid. Entries expire a fixed time after creation. The
//! grid has no conditional write, so every put overwrites and duplicate
//! prevention on this kind is advisory only.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::debug;

use super::memory::ExpiringTable;
use super::{BackendKind, StorageBackend, WriteMode};
use crate::caching::{StorageError, StorageResult};
use crate::core::types::StoredPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GridStoreConfig {
    /// Cache this backend instance reads and writes
    pub cache_name: String,

    /// Caches created on the grid at startup
    pub caches: Vec<String>,

    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for GridStoreConfig {
    fn default() -> Self {
        Self {
            cache_name: "prebid".to_string(),
            caches: vec!["prebid".to_string()],
            sweep_interval: Duration::from_secs(30),
        }
    }
}

pub struct GridStore {
    cache_name: String,
    caches: HashMap<String, Arc<ExpiringTable>>,
    sweepers: Vec<JoinHandle<()>>,
}

impl GridStore {
    pub fn new(config: GridStoreConfig) -> Self {
        let caches: HashMap<String, Arc<ExpiringTable>> = config
            .caches
            .iter()
            .map(|name| (name.clone(), Arc::new(ExpiringTable::new())))
            .collect();
        let sweepers = caches
            .values()
            .map(|table| ExpiringTable::spawn_sweeper(table, config.sweep_interval))
            .collect();

        Self {
            cache_name: config.cache_name,
            caches,
            sweepers,
        }
    }

    fn cache(&self) -> StorageResult<&ExpiringTable> {
        self.caches
            .get(&self.cache_name)
            .map(Arc::as_ref)
            .ok_or_else(|| StorageError::backend(format!("Cache does not exist: {}", self.cache_name)))
    }
}

impl Drop for GridStore {
    fn drop(&mut self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl StorageBackend for GridStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Grid
    }

    fn supports_reject_on_duplicate(&self) -> bool {
        false
    }

    async fn put(
        &self,
        key: &str,
        payload: &StoredPayload,
        ttl: Duration,
        _mode: WriteMode,
    ) -> StorageResult<()> {
        self.cache()?.insert(key, payload.clone(), ttl);
        debug!(cache = %self.cache_name, key, ttl_secs = ttl.as_secs(), "grid entry stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredPayload>> {
        Ok(self.cache()?.get(key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.cache()?.contains(key))
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(self.cache().is_ok())
    }
}
