//! # Proxy Read Forwarder
//!
//! `GET /cache?uuid=..&ch=<host>` is served by another cache instance when
//! the host of `<protocol>://<host><cache_path>` equals the allowed proxy
//! host (case-insensitive, port checked only when the allowed host names
//! one). Userinfo, paths and queries smuggled through `ch` are refused. The
//! upstream status, headers and body are returned unchanged, including
//! non-2xx answers. There is no local fallback.

use axum::body::Body;
use axum::http::{HeaderMap, HeaderName, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use bytes::Bytes;
use reqwest::Client;
use std::time::Duration;
use tracing::{debug, error};
use url::Url;

use super::{error_chain, is_hop_by_hop};
use crate::core::circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitBreakerError};
use crate::core::config::{ApiConfig, CacheConfig};
use crate::core::error::{GatewayError, GatewayResult};

/// Upstream answer relayed to the client
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: u16,
    pub headers: Vec<(String, Vec<u8>)>,
    pub body: Bytes,
}

impl IntoResponse for ProxyResponse {
    fn into_response(self) -> Response {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::BAD_GATEWAY);
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() = status;

        let headers = response.headers_mut();
        for (name, value) in self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::from_bytes(name.as_bytes()),
                HeaderValue::from_bytes(&value),
            ) {
                headers.append(name, value);
            }
        }
        response
    }
}

/// Host (and optional port) a `ch` parameter must name
#[derive(Debug, Clone, PartialEq, Eq)]
struct AllowedHost {
    host: String,
    port: Option<u16>,
}

impl AllowedHost {
    fn parse(raw: &str) -> GatewayResult<Option<Self>> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(None);
        }
        let url = Url::parse(&format!("http://{}", raw))
            .map_err(|e| GatewayError::config(format!("Invalid allowed_proxy_host '{}': {}", raw, e)))?;
        let host = url
            .host_str()
            .ok_or_else(|| GatewayError::config(format!("Invalid allowed_proxy_host '{}'", raw)))?;
        Ok(Some(Self {
            host: host.to_lowercase(),
            port: url.port(),
        }))
    }

    fn admits(&self, url: &Url) -> bool {
        let host_matches = url
            .host_str()
            .map_or(false, |host| host.eq_ignore_ascii_case(&self.host));
        let port_matches = match self.port {
            Some(port) => url.port_or_known_default() == Some(port),
            None => true,
        };
        host_matches && port_matches
    }
}

pub struct ProxyForwarder {
    client: Client,
    allowed_host: Option<AllowedHost>,
    protocol: String,
    cache_path: String,
    breaker: CircuitBreaker,
}

impl ProxyForwarder {
    pub fn new(cache: &CacheConfig, api: &ApiConfig, breaker: CircuitBreakerConfig) -> GatewayResult<Self> {
        let timeout: Duration = cache.timeout();
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| GatewayError::config(format!("Failed to build proxy client: {}", e)))?;

        Ok(Self {
            client,
            allowed_host: AllowedHost::parse(&cache.allowed_proxy_host)?,
            protocol: cache.host_param_protocol.clone(),
            cache_path: api.cache_path.clone(),
            breaker: CircuitBreaker::new("proxyCache", breaker),
        })
    }

    /// Proxy target for a `ch` parameter, `None` when the read is served locally
    pub fn resolve_target(&self, cache_host: Option<&str>) -> Option<Url> {
        let host = cache_host.map(str::trim).filter(|host| !host.is_empty())?;
        let allowed = self.allowed_host.as_ref()?;

        let candidate = format!("{}://{}{}", self.protocol, host, self.cache_path);
        let url = match Url::parse(&candidate) {
            Ok(url) => url,
            Err(e) => {
                debug!(cache_host = host, error = %e, "unparsable cache host, reading locally");
                return None;
            }
        };

        let smuggled = !url.username().is_empty()
            || url.password().is_some()
            || url.path() != self.cache_path
            || url.query().is_some()
            || url.fragment().is_some();
        if smuggled || !allowed.admits(&url) {
            debug!(cache_host = host, "cache host not allowed, reading locally");
            return None;
        }
        Some(url)
    }

    /// GET `target?uuid=<uuid>` and relay the answer
    pub async fn fetch(&self, target: Url, uuid: &str, inbound: &HeaderMap) -> GatewayResult<ProxyResponse> {
        let mut url = target;
        url.query_pairs_mut().append_pair("uuid", uuid);
        let host = url.host_str().unwrap_or_default().to_string();

        let mut request = self.client.get(url.clone());
        for (name, value) in inbound {
            if is_hop_by_hop(name.as_str()) {
                continue;
            }
            if let (Ok(name), Ok(value)) = (
                reqwest::header::HeaderName::from_bytes(name.as_str().as_bytes()),
                reqwest::header::HeaderValue::from_bytes(value.as_bytes()),
            ) {
                request = request.header(name, value);
            }
        }

        let result = self
            .breaker
            .call(async { relay(request).await }, |err: &ProxyError| {
                matches!(err, ProxyError::Http(_))
            })
            .await;

        match result {
            Ok(response) => {
                debug!(url = %url, status = response.status, "proxied cache read");
                Ok(response)
            }
            Err(ProxyError::Http(err)) => {
                let chain = error_chain(&err);
                error!(url = %url, error = %chain, "Failed to send request");
                Err(GatewayError::upstream(describe_failure(&host, &chain)))
            }
            Err(ProxyError::Open(err)) => Err(err.into()),
        }
    }
}

enum ProxyError {
    Http(reqwest::Error),
    Open(CircuitBreakerError),
}

impl From<CircuitBreakerError> for ProxyError {
    fn from(err: CircuitBreakerError) -> Self {
        ProxyError::Open(err)
    }
}

async fn relay(request: reqwest::RequestBuilder) -> Result<ProxyResponse, ProxyError> {
    let response = request.send().await.map_err(ProxyError::Http)?;
    let status = response.status().as_u16();
    let headers = response
        .headers()
        .iter()
        .filter(|(name, _)| !is_hop_by_hop(name.as_str()))
        .map(|(name, value)| (name.as_str().to_string(), value.as_bytes().to_vec()))
        .collect();
    let body = response.bytes().await.map_err(ProxyError::Http)?;

    Ok(ProxyResponse {
        status,
        headers,
        body,
    })
}

fn describe_failure(host: &str, chain: &str) -> String {
    if chain.contains("dns error") {
        format!("Failed to resolve '{}': {}", host, chain)
    } else {
        format!("Failed to send request to '{}': {}", host, chain)
    }
}
