//! # Request Handlers
//!
//! axum handlers for the cache, module storage and health endpoints. Every
//! handler renders failures through [`GatewayError::to_response`] with the
//! request path, so error bodies always name the route that was called.

use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{header, HeaderMap, HeaderValue, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, error};

use super::server::ServerState;
use crate::caching::cache_manager::{ReadOutcome, WriteContext};
use crate::caching::validator::RequestValidator;
use crate::core::error::{GatewayError, GatewayResult};
use crate::core::types::{RequestObject, StoragePayload};

#[derive(Debug, Default, Deserialize)]
pub struct CacheWriteParams {
    #[serde(rename = "secondaryCache")]
    pub secondary_cache: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct CacheReadParams {
    pub uuid: Option<String>,
    /// Proxy cache host
    pub ch: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct StorageReadParams {
    pub k: Option<String>,
    pub a: Option<String>,
}

/// `POST /cache`
pub async fn post_cache(
    State(state): State<ServerState>,
    uri: Uri,
    Query(params): Query<CacheWriteParams>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(uri.path(), write_cache(&state, &params, &headers, &body).await)
}

async fn write_cache(
    state: &ServerState,
    params: &CacheWriteParams,
    headers: &HeaderMap,
    body: &[u8],
) -> GatewayResult<Response> {
    let authorized = state.api_keys.check_cache_write(headers)?;
    let request = parse_body(headers, body)?;
    let context = WriteContext {
        authorized,
        from_secondary: params.secondary_cache.as_deref() == Some("yes"),
    };

    let uuids = state.cache.write_batch(request, context).await?;
    let mut response = Json(uuids).into_response();
    decorate(&mut response);
    Ok(response)
}

/// `GET /cache`
pub async fn get_cache(
    State(state): State<ServerState>,
    uri: Uri,
    Query(params): Query<CacheReadParams>,
    headers: HeaderMap,
) -> Response {
    respond(uri.path(), read_cache(&state, &params, &headers).await)
}

async fn read_cache(
    state: &ServerState,
    params: &CacheReadParams,
    headers: &HeaderMap,
) -> GatewayResult<Response> {
    let uuid = RequestValidator::require_uuid(params.uuid.as_deref())?;

    match state.cache.read(uuid, params.ch.as_deref(), headers).await? {
        ReadOutcome::Proxied(proxied) => Ok(proxied.into_response()),
        ReadOutcome::Local(hit) => {
            let mut response = hit.payload.value.into_response();
            response.headers_mut().insert(
                header::CONTENT_TYPE,
                HeaderValue::from_static(hit.media_type.content_type()),
            );
            decorate(&mut response);
            Ok(response)
        }
    }
}

/// `POST /storage` and `POST /module-storage`
pub async fn post_storage(
    State(state): State<ServerState>,
    uri: Uri,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    respond(uri.path(), write_storage(&state, &headers, &body).await)
}

async fn write_storage(state: &ServerState, headers: &HeaderMap, body: &[u8]) -> GatewayResult<Response> {
    state.api_keys.require(headers)?;
    if body.is_empty() {
        return Err(GatewayError::validation("Empty body"));
    }

    let payload: StoragePayload = serde_json::from_slice(body)?;
    let default_ttl = state
        .config
        .storage
        .default_ttl_for(payload.application.as_deref());
    let entry = RequestValidator::validate_storage_payload(payload, default_ttl)?;
    state.storage.save(entry).await?;
    Ok(StatusCode::NO_CONTENT.into_response())
}

/// `GET /storage?k=&a=` and `GET /module-storage?k=&a=`
pub async fn get_storage(
    State(state): State<ServerState>,
    uri: Uri,
    Query(params): Query<StorageReadParams>,
    headers: HeaderMap,
) -> Response {
    respond(uri.path(), read_storage(&state, &params, &headers).await)
}

async fn read_storage(
    state: &ServerState,
    params: &StorageReadParams,
    headers: &HeaderMap,
) -> GatewayResult<Response> {
    state.api_keys.require(headers)?;
    let (key, application) =
        RequestValidator::require_storage_params(params.k.as_deref(), params.a.as_deref())?;

    let entry = state.storage.find(application, key).await?;
    Ok(Json(entry).into_response())
}

/// `GET /health`
pub async fn health(State(state): State<ServerState>) -> Response {
    let backend = state.cache.backend();
    let kind = backend.kind();

    match backend.health_check().await {
        Ok(true) => (StatusCode::OK, Json(json!({"status": "UP", "backend": kind}))).into_response(),
        Ok(false) => {
            (StatusCode::SERVICE_UNAVAILABLE, Json(json!({"status": "DOWN", "backend": kind}))).into_response()
        }
        Err(e) => {
            error!(backend = %kind, error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({"status": "DOWN", "backend": kind, "error": e.to_string()})),
            )
                .into_response()
        }
    }
}

/// Parse a cache write body. JSON and plain-text bodies are both read as JSON.
fn parse_body(headers: &HeaderMap, body: &[u8]) -> GatewayResult<RequestObject> {
    if let Some(content_type) = headers.get(header::CONTENT_TYPE) {
        let content_type = content_type.to_str().unwrap_or_default().to_ascii_lowercase();
        if !content_type.starts_with("application/json") && !content_type.starts_with("text/plain") {
            return Err(GatewayError::unsupported_media_type());
        }
    }
    Ok(serde_json::from_slice(body)?)
}

fn decorate(response: &mut Response) {
    let headers = response.headers_mut();
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    headers.insert(header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*"));
    headers.insert(header::VARY, HeaderValue::from_static("Accept-Encoding"));
}

fn respond(path: &str, result: GatewayResult<Response>) -> Response {
    match result {
        Ok(response) => response,
        Err(err) => {
            if err.status_code().is_server_error() {
                error!(path, error = %err, "request failed");
            } else {
                debug!(path, status = err.status_code().as_u16(), error = %err, "request rejected");
            }
            err.to_response(path)
        }
    }
}
