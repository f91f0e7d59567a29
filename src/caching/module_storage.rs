//! # Module Storage
//!
//! (application, key) storage for server modules. Each configured application
//! routes to its own backend instance with its own timeout. The application
//! name only selects the backend; it is never stored with the value and never
//! returned on read.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use super::guarded::GuardedBackend;
use super::stores::{build_backend, StorageBackend, WriteMode};
use super::validator::ModuleEntry;
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{MediaType, ModuleEntryResponse, StoredPayload};
use crate::middleware::timeout::Deadline;

struct ApplicationStore {
    backend: Arc<dyn StorageBackend>,
    deadline: Deadline,
}

#[derive(Default)]
pub struct ModuleStorage {
    applications: HashMap<String, ApplicationStore>,
}

impl ModuleStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect every configured application backend
    pub async fn from_config(config: &GatewayConfig) -> GatewayResult<Self> {
        let mut storage = Self::new();
        for (application, app) in &config.storage.applications {
            let backend = build_backend(&app.backend).await.map_err(|e| {
                GatewayError::config(format!(
                    "Failed to initialize storage for application {}: {}",
                    application, e
                ))
            })?;
            let guarded = GuardedBackend::new(
                format!("storage.{}", application),
                backend,
                config.circuit_breaker.clone(),
            );
            info!(application = %application, backend = %app.backend.kind(), "module storage application ready");
            storage = storage.with_application(
                application.clone(),
                Arc::new(guarded),
                Duration::from_millis(app.timeout_ms),
            );
        }
        Ok(storage)
    }

    pub fn with_application(
        mut self,
        application: impl Into<String>,
        backend: Arc<dyn StorageBackend>,
        timeout: Duration,
    ) -> Self {
        self.applications.insert(
            application.into(),
            ApplicationStore {
                backend,
                deadline: Deadline::new(timeout),
            },
        );
        self
    }

    pub fn applications(&self) -> impl Iterator<Item = &str> {
        self.applications.keys().map(String::as_str)
    }

    fn store_for(&self, application: &str) -> GatewayResult<&ApplicationStore> {
        self.applications
            .get(application)
            .ok_or_else(|| GatewayError::not_found(format!("Invalid application: {}", application)))
    }

    /// Store a validated entry, overwriting any previous value
    pub async fn save(&self, entry: ModuleEntry) -> GatewayResult<()> {
        let store = self.store_for(&entry.application)?;
        let payload = StoredPayload::new(
            entry.media_type.as_str(),
            entry.key.as_str(),
            entry.value,
            "",
            entry.ttl,
        );

        store
            .deadline
            .run(async {
                store
                    .backend
                    .put(&entry.key, &payload, Duration::from_secs(entry.ttl), WriteMode::Overwrite)
                    .await
                    .map_err(GatewayError::from)
            })
            .await?;

        debug!(application = %entry.application, key = %entry.key, ttl_secs = entry.ttl, "module entry stored");
        Ok(())
    }

    pub async fn find(&self, application: &str, key: &str) -> GatewayResult<ModuleEntryResponse> {
        let store = self.store_for(application)?;
        let found = store
            .deadline
            .run(async { store.backend.get(key).await.map_err(GatewayError::from) })
            .await?;

        let payload = found.ok_or_else(|| GatewayError::not_found("Invalid application or key"))?;
        if MediaType::from_tag(&payload.media_type).is_none() {
            return Err(GatewayError::unsupported_media_type());
        }
        Ok(payload.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::caching::stores::{RecordStore, RecordStoreConfig};

    fn storage() -> ModuleStorage {
        ModuleStorage::new().with_application(
            "module-a",
            Arc::new(RecordStore::new(RecordStoreConfig::default())),
            Duration::from_millis(500),
        )
    }

    fn entry(application: &str, key: &str) -> ModuleEntry {
        ModuleEntry {
            application: application.to_string(),
            key: key.to_string(),
            media_type: MediaType::Text,
            value: "stored".to_string(),
            ttl: 60,
        }
    }

    #[tokio::test]
    async fn test_save_and_find_strips_application() {
        let storage = storage();
        storage.save(entry("module-a", "k1")).await.unwrap();

        let found = storage.find("module-a", "k1").await.unwrap();
        assert_eq!(
            found,
            ModuleEntryResponse {
                media_type: "text".into(),
                key: "k1".into(),
                value: "stored".into(),
            }
        );
    }

    #[tokio::test]
    async fn test_unknown_application() {
        let storage = storage();
        let err = storage.save(entry("other", "k1")).await.unwrap_err();
        assert_eq!(err, GatewayError::not_found("Invalid application: other"));

        let err = storage.find("other", "k1").await.unwrap_err();
        assert_eq!(err.to_string(), "Invalid application: other");
    }

    #[tokio::test]
    async fn test_missing_key_is_ambiguous() {
        let err = storage().find("module-a", "missing").await.unwrap_err();
        assert_eq!(err, GatewayError::not_found("Invalid application or key"));
    }

    #[tokio::test]
    async fn test_from_config_builds_applications() {
        let config = GatewayConfig::from_yaml(
            "storage:\n  applications:\n    app:\n      timeout_ms: 100\n      backend:\n        kind: grid\n",
        )
        .unwrap();
        let storage = ModuleStorage::from_config(&config).await.unwrap();
        assert_eq!(storage.applications().collect::<Vec<_>>(), vec!["app"]);
    }
}
