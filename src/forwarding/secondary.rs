//! # Secondary-Cache Forwarder
//!
//! After a successful local write the stored puts are replayed to every
//! configured peer as `POST <peer><path>?secondaryCache=yes`. The flag stops
//! peers from forwarding again. Replication runs in a detached task bounded
//! by its own timeout; its outcome never reaches the client.

use futures::future::join_all;
use reqwest::Client;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};
use url::Url;

use super::error_chain;
use crate::auth::API_KEY_HEADER;
use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::core::config::{ApiConfig, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{PutRequest, RequestObject, StoredPayload};

pub const SECONDARY_CACHE_PARAM: &str = "secondaryCache";

pub struct SecondaryForwarder {
    client: Client,
    peers: Vec<Url>,
    api_key: Option<String>,
    timeout: Duration,
    breaker: CircuitBreaker,
}

impl SecondaryForwarder {
    pub fn new(
        cache: &CacheConfig,
        api: &ApiConfig,
        breaker: CircuitBreakerConfig,
    ) -> GatewayResult<Self> {
        let timeout = cache.secondary_cache_timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build secondary cache client: {}", e)))?;

        let peers = cache
            .secondary_uris
            .iter()
            .map(|uri| peer_url(uri, &cache.secondary_cache_path))
            .collect::<GatewayResult<Vec<_>>>()?;

        Ok(Self {
            client,
            peers,
            api_key: api.api_key.clone().filter(|key| !key.is_empty()),
            timeout,
            breaker: CircuitBreaker::new("secondaryCache", breaker),
        })
    }

    pub fn is_enabled(&self) -> bool {
        !self.peers.is_empty()
    }

    pub fn peers(&self) -> &[Url] {
        &self.peers
    }

    /// Replicate `stored` to every peer in the background
    pub fn forward(self: &Arc<Self>, stored: &[StoredPayload]) -> Option<JoinHandle<()>> {
        if !self.is_enabled() || stored.is_empty() {
            return None;
        }

        let body = replication_body(stored);
        let forwarder = Arc::clone(self);
        Some(tokio::spawn(async move {
            join_all(forwarder.peers.iter().map(|peer| forwarder.send(peer, &body))).await;
        }))
    }

    async fn send(&self, peer: &Url, body: &RequestObject) {
        let mut request = self.client.post(peer.clone()).json(body);
        if let Some(api_key) = &self.api_key {
            request = request.header(API_KEY_HEADER, api_key);
        }

        let result: Result<reqwest::Response, SendError> = self
            .breaker
            .call(
                async { request.send().await.map_err(SendError::Http) },
                |_| true,
            )
            .await;

        match result {
            Ok(response) if response.status() == reqwest::StatusCode::OK => {
                debug!(peer = %peer, "replicated write to secondary cache");
            }
            Ok(response) => {
                error!(peer = %peer, status = response.status().as_u16(), "Failed to write to remote address");
            }
            Err(SendError::Http(err)) => {
                error!(
                    peer = %peer,
                    timeout_ms = self.timeout.as_millis() as u64,
                    error = %error_chain(&err),
                    "Failed to send request to secondary cache"
                );
            }
            Err(SendError::Open(err)) => {
                warn!(peer = %peer, error = %err, "secondary cache write skipped");
            }
        }
    }
}

enum SendError {
    Http(reqwest::Error),
    Open(CircuitBreakerError),
}

impl From<CircuitBreakerError> for SendError {
    fn from(err: CircuitBreakerError) -> Self {
        SendError::Open(err)
    }
}

fn peer_url(base: &str, path: &str) -> GatewayResult<Url> {
    let mut url = Url::parse(&format!("{}{}", base.trim_end_matches('/'), path))
        .map_err(|e| GatewayError::config(format!("Invalid secondary cache uri {}: {}", base, e)))?;
    url.query_pairs_mut().append_pair(SECONDARY_CACHE_PARAM, "yes");
    Ok(url)
}

/// Puts as stored locally: assigned key without prefix, effective ttl
fn replication_body(stored: &[StoredPayload]) -> RequestObject {
    RequestObject {
        puts: stored
            .iter()
            .map(|payload| PutRequest {
                media_type: payload.media_type.clone(),
                key: Some(payload.key.clone()),
                value: Value::String(payload.value.clone()),
                expiry: Some(payload.expiry as i64),
                ttlseconds: None,
            })
            .collect(),
    }
}
