//! # Record Store
//!
//! Namespaced record engine. The store serves a fixed set of namespaces (its
//! partition map); a backend instance is bound to one of them and every
//! operation fails when that namespace is not served. Create-only writes are
//! atomic, so duplicate rejection is enforced by the engine itself.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::memory::ExpiringTable;
use super::{BackendKind, StorageBackend, WriteMode};
use crate::caching::{StorageError, StorageResult};
use crate::core::types::StoredPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordStoreConfig {
    /// Namespace this backend instance reads and writes
    pub namespace: String,

    /// Namespaces served by the store
    pub namespaces: Vec<String>,

    /// Interval between expired-record sweeps
    #[serde(with = "humantime_serde")]
    pub sweep_interval: Duration,
}

impl Default for RecordStoreConfig {
    fn default() -> Self {
        Self {
            namespace: "prebid".to_string(),
            namespaces: vec!["prebid".to_string()],
            sweep_interval: Duration::from_secs(30),
        }
    }
}

pub struct RecordStore {
    namespace: String,
    partitions: HashMap<String, Arc<ExpiringTable>>,
    sweepers: Vec<JoinHandle<()>>,
}

impl RecordStore {
    pub fn new(config: RecordStoreConfig) -> Self {
        let mut partitions = HashMap::new();
        let mut sweepers = Vec::new();
        for namespace in &config.namespaces {
            let table = Arc::new(ExpiringTable::new());
            sweepers.push(ExpiringTable::spawn_sweeper(&table, config.sweep_interval));
            partitions.insert(namespace.clone(), table);
        }

        if !partitions.contains_key(&config.namespace) {
            warn!(namespace = %config.namespace, "record store namespace is not served");
        }

        Self {
            namespace: config.namespace,
            partitions,
            sweepers,
        }
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    fn partition(&self) -> StorageResult<&ExpiringTable> {
        self.partitions
            .get(&self.namespace)
            .map(Arc::as_ref)
            .ok_or_else(|| {
                StorageError::backend(format!(
                    "Namespace not found in partition map: {}",
                    self.namespace
                ))
            })
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        for sweeper in &self.sweepers {
            sweeper.abort();
        }
    }
}

#[async_trait]
impl StorageBackend for RecordStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Record
    }

    fn supports_reject_on_duplicate(&self) -> bool {
        true
    }

    async fn put(
        &self,
        key: &str,
        payload: &StoredPayload,
        ttl: Duration,
        mode: WriteMode,
    ) -> StorageResult<()> {
        let partition = self.partition()?;
        match mode {
            WriteMode::Overwrite => partition.insert(key, payload.clone(), ttl),
            WriteMode::CreateOnly => {
                if !partition.insert_if_absent(key, payload.clone(), ttl) {
                    return Err(StorageError::Duplicate {
                        key: key.to_string(),
                    });
                }
            }
        }
        debug!(namespace = %self.namespace, key, ttl_secs = ttl.as_secs(), "record stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredPayload>> {
        Ok(self.partition()?.get(key))
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        Ok(self.partition()?.contains(key))
    }

    async fn health_check(&self) -> StorageResult<bool> {
        Ok(self.partition().is_ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> RecordStore {
        RecordStore::new(RecordStoreConfig::default())
    }

    fn payload(value: &str) -> StoredPayload {
        StoredPayload::new("json", "abc", value, "", 60)
    }

    #[tokio::test]
    async fn test_put_get() {
        let store = store();
        store
            .put("abc", &payload("{}"), Duration::from_secs(60), WriteMode::Overwrite)
            .await
            .unwrap();

        assert_eq!(store.get("abc").await.unwrap().unwrap().value, "{}");
        assert!(store.exists("abc").await.unwrap());
        assert!(store.get("other").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_create_only_rejects_existing_key() {
        let store = store();
        let ttl = Duration::from_secs(60);
        store.put("abc", &payload("1"), ttl, WriteMode::CreateOnly).await.unwrap();

        let err = store
            .put("abc", &payload("2"), ttl, WriteMode::CreateOnly)
            .await
            .unwrap_err();
        assert_eq!(err, StorageError::Duplicate { key: "abc".into() });
        assert_eq!(store.get("abc").await.unwrap().unwrap().value, "1");
    }

    #[tokio::test]
    async fn test_overwrite_replaces() {
        let store = store();
        let ttl = Duration::from_secs(60);
        store.put("abc", &payload("1"), ttl, WriteMode::Overwrite).await.unwrap();
        store.put("abc", &payload("2"), ttl, WriteMode::Overwrite).await.unwrap();
        assert_eq!(store.get("abc").await.unwrap().unwrap().value, "2");
    }

    #[tokio::test]
    async fn test_unknown_namespace() {
        let store = RecordStore::new(RecordStoreConfig {
            namespace: "missing".into(),
            ..Default::default()
        });

        let err = store
            .put("abc", &payload("1"), Duration::from_secs(60), WriteMode::Overwrite)
            .await
            .unwrap_err();
        assert_eq!(err.to_string(), "Namespace not found in partition map: missing");
        assert!(!store.health_check().await.unwrap());
    }
}
