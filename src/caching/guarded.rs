//! Circuit breaker decorator over any storage backend.
//!
//! Backend failures count against the breaker; a duplicate rejection is a
//! normal answer from a healthy backend and does not.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use super::stores::{BackendKind, StorageBackend, WriteMode};
use super::{StorageError, StorageResult};
use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::core::types::StoredPayload;

impl From<CircuitBreakerError> for StorageError {
    fn from(err: CircuitBreakerError) -> Self {
        StorageError::backend(err.to_string())
    }
}

fn counts_as_failure(err: &StorageError) -> bool {
    !matches!(err, StorageError::Duplicate { .. })
}

pub struct GuardedBackend {
    inner: Arc<dyn StorageBackend>,
    breaker: CircuitBreaker,
}

impl GuardedBackend {
    pub fn new(name: impl Into<String>, inner: Arc<dyn StorageBackend>, config: CircuitBreakerConfig) -> Self {
        Self {
            inner,
            breaker: CircuitBreaker::new(name, config),
        }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }

    fn log_failure(&self, operation: &str, key: &str, err: &StorageError) {
        if counts_as_failure(err) {
            warn!(
                breaker = %self.breaker.name(),
                backend = %self.inner.kind(),
                operation,
                key,
                error = %err,
                "storage operation failed"
            );
        }
    }
}

#[async_trait]
impl StorageBackend for GuardedBackend {
    fn kind(&self) -> BackendKind {
        self.inner.kind()
    }

    fn supports_reject_on_duplicate(&self) -> bool {
        self.inner.supports_reject_on_duplicate()
    }

    async fn put(
        &self,
        key: &str,
        payload: &StoredPayload,
        ttl: Duration,
        mode: WriteMode,
    ) -> StorageResult<()> {
        let result = self
            .breaker
            .call(self.inner.put(key, payload, ttl, mode), counts_as_failure)
            .await;
        if let Err(err) = &result {
            self.log_failure("put", key, err);
        }
        result
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredPayload>> {
        let result = self.breaker.call(self.inner.get(key), counts_as_failure).await;
        if let Err(err) = &result {
            self.log_failure("get", key, err);
        }
        result
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let result = self.breaker.call(self.inner.exists(key), counts_as_failure).await;
        if let Err(err) = &result {
            self.log_failure("exists", key, err);
        }
        result
    }

    async fn health_check(&self) -> StorageResult<bool> {
        self.inner.health_check().await
    }
}
