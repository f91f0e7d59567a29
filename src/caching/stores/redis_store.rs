//! # Redis Store
//!
//! Payloads are stored as JSON documents with a native Redis expiry.
//! Overwrites use `SET key value EX ttl`; create-only writes add `NX`, so
//! duplicate rejection is atomic on the server. Transient connection errors
//! are retried a bounded number of times with linear backoff, reconnecting
//! between attempts.

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::{AsyncCommands, Client, RedisError, RedisResult};
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, error, info, warn};

use super::{BackendKind, StorageBackend, WriteMode};
use crate::caching::{StorageError, StorageResult};
use crate::core::types::StoredPayload;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisStoreConfig {
    /// Redis connection URL
    pub url: String,

    /// Prepended to every key, lets several applications share one server
    pub key_prefix: String,

    #[serde(with = "humantime_serde")]
    pub connection_timeout: Duration,

    /// Retries after the first failed attempt
    pub max_retries: u32,

    /// Base delay, multiplied by the attempt number
    #[serde(with = "humantime_serde")]
    pub retry_delay: Duration,
}

impl Default for RedisStoreConfig {
    fn default() -> Self {
        Self {
            url: "redis://localhost:6379".to_string(),
            key_prefix: String::new(),
            connection_timeout: Duration::from_secs(5),
            max_retries: 2,
            retry_delay: Duration::from_millis(50),
        }
    }
}

pub struct RedisStore {
    config: RedisStoreConfig,
    connection: RwLock<ConnectionManager>,
    connection_errors: AtomicU64,
}

impl RedisStore {
    /// Connect to the configured server
    pub async fn connect(config: RedisStoreConfig) -> StorageResult<Self> {
        let connection = open_connection(&config).await?;
        info!(url = %config.url, "redis store connected");

        Ok(Self {
            config,
            connection: RwLock::new(connection),
            connection_errors: AtomicU64::new(0),
        })
    }

    pub fn connection_errors(&self) -> u64 {
        self.connection_errors.load(Ordering::Relaxed)
    }

    fn full_key(&self, key: &str) -> String {
        format!("{}{}", self.config.key_prefix, key)
    }

    async fn execute_with_retry<F, Fut, T>(&self, operation: F) -> StorageResult<T>
    where
        F: Fn(ConnectionManager) -> Fut,
        Fut: Future<Output = RedisResult<T>>,
    {
        let mut attempt = 0;

        loop {
            let conn = self.connection.read().await.clone();

            match operation(conn).await {
                Ok(result) => return Ok(result),
                Err(e) if attempt < self.config.max_retries && is_transient(&e) => {
                    self.connection_errors.fetch_add(1, Ordering::Relaxed);
                    attempt += 1;
                    warn!(attempt, error = %e, "redis operation failed, retrying");

                    tokio::time::sleep(self.config.retry_delay * attempt).await;

                    if let Err(reconnect_err) = self.reconnect().await {
                        warn!(error = %reconnect_err, "failed to reconnect to redis");
                    }
                }
                Err(e) => {
                    error!(error = %e, "redis operation failed");
                    return Err(e.into());
                }
            }
        }
    }

    async fn reconnect(&self) -> StorageResult<()> {
        let connection = open_connection(&self.config).await?;
        *self.connection.write().await = connection;
        info!("reconnected to redis");
        Ok(())
    }
}

async fn open_connection(config: &RedisStoreConfig) -> StorageResult<ConnectionManager> {
    let client = Client::open(config.url.as_str())?;

    tokio::time::timeout(config.connection_timeout, ConnectionManager::new(client))
        .await
        .map_err(|_| {
            StorageError::backend(format!(
                "Unable to connect to Redis at {} within {}ms",
                config.url,
                config.connection_timeout.as_millis()
            ))
        })?
        .map_err(StorageError::from)
}

fn is_transient(err: &RedisError) -> bool {
    err.is_io_error() || err.is_connection_dropped() || err.is_connection_refusal() || err.is_timeout()
}

#[async_trait]
impl StorageBackend for RedisStore {
    fn kind(&self) -> BackendKind {
        BackendKind::Redis
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
        let full_key = self.full_key(key);
        let document = serde_json::to_string(payload)?;
        // EX 0 is rejected by the server
        let ttl_secs = ttl.as_secs().max(1);

        let reply: Option<String> = self
            .execute_with_retry(|mut conn| {
                let mut cmd = redis::cmd("SET");
                cmd.arg(&full_key).arg(&document).arg("EX").arg(ttl_secs);
                if mode == WriteMode::CreateOnly {
                    cmd.arg("NX");
                }
                async move { cmd.query_async::<_, Option<String>>(&mut conn).await }
            })
            .await?;

        if reply.is_none() {
            return Err(StorageError::Duplicate {
                key: key.to_string(),
            });
        }

        debug!(key, ttl_secs, "redis entry stored");
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredPayload>> {
        let full_key = self.full_key(key);

        let document: Option<String> = self
            .execute_with_retry(|mut conn| {
                let full_key = full_key.clone();
                async move { conn.get::<_, Option<String>>(&full_key).await }
            })
            .await?;

        match document {
            Some(document) => Ok(Some(serde_json::from_str(&document)?)),
            None => Ok(None),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let full_key = self.full_key(key);

        self.execute_with_retry(|mut conn| {
            let full_key = full_key.clone();
            async move { conn.exists::<_, bool>(&full_key).await }
        })
        .await
    }

    async fn health_check(&self) -> StorageResult<bool> {
        let pong: String = self
            .execute_with_retry(|mut conn| async move {
                redis::cmd("PING").query_async::<_, String>(&mut conn).await
            })
            .await?;
        Ok(pong == "PONG")
    }
}
