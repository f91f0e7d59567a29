//! # Cache Manager
//!
//! [`CacheGateway`] is the entry point of the UUID-keyed cache.
//!
//! Writes: validate the batch → resolve keys and ttls → store every put →
//! replicate to secondary peers → return the assigned UUIDs in request order.
//! Any failing put fails the batch.
//!
//! Reads: relay to the allowed proxy host when `ch` names it, otherwise read
//! the local backend.

use axum::http::HeaderMap;
use futures::future::try_join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

use super::expiry::ExpiryPolicy;
use super::key_resolver::KeyResolver;
use super::stores::{StorageBackend, WriteMode};
use super::validator::{RequestValidator, ValidatedPut};
use crate::core::config::GatewayConfig;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{MediaType, RequestObject, ResponseObject, StoredPayload};
use crate::forwarding::{ProxyForwarder, ProxyResponse, SecondaryForwarder};
use crate::middleware::timeout::Deadline;

/// Caller facts a write depends on
#[derive(Debug, Clone, Copy, Default)]
pub struct WriteContext {
    /// The caller presented a valid API key
    pub authorized: bool,
    /// The request was replicated from a peer (`secondaryCache=yes`)
    pub from_secondary: bool,
}

/// A locally stored payload ready to be served
#[derive(Debug, Clone)]
pub struct CacheHit {
    pub media_type: MediaType,
    pub payload: StoredPayload,
}

pub enum ReadOutcome {
    Local(CacheHit),
    Proxied(ProxyResponse),
}

pub struct CacheGateway {
    validator: RequestValidator,
    backend: Arc<dyn StorageBackend>,
    secondary: Arc<SecondaryForwarder>,
    proxy: ProxyForwarder,
    deadline: Deadline,
    prevent_duplication: bool,
}

impl CacheGateway {
    pub fn new(
        config: &GatewayConfig,
        backend: Arc<dyn StorageBackend>,
        secondary: Arc<SecondaryForwarder>,
        proxy: ProxyForwarder,
    ) -> Self {
        let resolver = KeyResolver::from_config(&config.cache, &config.api);
        let validator = RequestValidator::new(resolver, ExpiryPolicy::from_config(&config.cache));

        let prevent_duplication = config.cache.prevent_uuid_duplication;
        if prevent_duplication && !backend.supports_reject_on_duplicate() {
            warn!(
                backend = %backend.kind(),
                "backend cannot reject duplicate keys, duplicate writes will overwrite"
            );
        }

        Self {
            validator,
            backend,
            secondary,
            proxy,
            deadline: Deadline::from_millis(config.cache.timeout_ms),
            prevent_duplication,
        }
    }

    pub fn backend(&self) -> &Arc<dyn StorageBackend> {
        &self.backend
    }

    /// Store a `POST /cache` batch
    pub async fn write_batch(
        &self,
        request: RequestObject,
        context: WriteContext,
    ) -> GatewayResult<ResponseObject> {
        let puts = self.validator.validate_batch(request, context.authorized)?;
        let stored = self.deadline.run(self.store_all(puts)).await?;

        if !context.from_secondary {
            self.secondary.forward(&stored);
        }

        debug!(count = stored.len(), "cache batch stored");
        Ok(ResponseObject::from_uuids(
            stored.into_iter().map(|payload| payload.key),
        ))
    }

    async fn store_all(&self, puts: Vec<ValidatedPut>) -> GatewayResult<Vec<StoredPayload>> {
        try_join_all(puts.into_iter().map(|put| self.store(put))).await
    }

    async fn store(&self, put: ValidatedPut) -> GatewayResult<StoredPayload> {
        let key = put.payload.normalized_key();
        let mode = self.write_mode();

        // the create-only put below stays the source of truth
        if mode == WriteMode::CreateOnly && self.backend.exists(&key).await? {
            info!(key = %key, "rejected duplicate uuid");
            return Err(GatewayError::Duplicate { key });
        }

        match self
            .backend
            .put(&key, &put.payload, Duration::from_secs(put.ttl), mode)
            .await
        {
            Ok(()) => Ok(put.payload),
            Err(err) => {
                let err = GatewayError::from(err);
                if let GatewayError::Duplicate { .. } = err {
                    info!(key = %key, "rejected duplicate uuid");
                }
                Err(err)
            }
        }
    }

    fn write_mode(&self) -> WriteMode {
        if self.prevent_duplication && self.backend.supports_reject_on_duplicate() {
            WriteMode::CreateOnly
        } else {
            WriteMode::Overwrite
        }
    }

    /// Serve `GET /cache`
    pub async fn read(
        &self,
        uuid: &str,
        cache_host: Option<&str>,
        headers: &HeaderMap,
    ) -> GatewayResult<ReadOutcome> {
        if let Some(target) = self.proxy.resolve_target(cache_host) {
            let response = self
                .deadline
                .run(self.proxy.fetch(target, uuid, headers))
                .await?;
            return Ok(ReadOutcome::Proxied(response));
        }

        self.read_local(uuid).await.map(ReadOutcome::Local)
    }

    /// Read `uuid` from the local backend
    pub async fn read_local(&self, uuid: &str) -> GatewayResult<CacheHit> {
        let key = self.validator.resolver().normalize(uuid);
        let found = self
            .deadline
            .run(async { self.backend.get(&key).await.map_err(GatewayError::from) })
            .await?;

        let payload =
            found.ok_or_else(|| GatewayError::not_found(format!("Resource Not Found: uuid {}", key)))?;

        match MediaType::from_tag(&payload.media_type) {
            Some(media_type) => Ok(CacheHit { media_type, payload }),
            None => {
                debug!(key = %key, media_type = %payload.media_type, "stored type cannot be served");
                Err(GatewayError::unsupported_media_type())
            }
        }
    }
}
