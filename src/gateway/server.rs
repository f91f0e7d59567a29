//! # HTTP Server Module
//!
//! Wires the configured components into an axum router and runs it.
//!
//! Routes (paths configurable under `api`):
//! - `POST|GET /cache`
//! - `POST|GET /storage` and the legacy `/module-storage`
//! - `GET /health`

use axum::extract::DefaultBodyLimit;
use axum::routing::get;
use axum::Router;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::trace::TraceLayer;
use tracing::info;

use super::handlers;
use crate::auth::ApiKeyGate;
use crate::caching::cache_manager::CacheGateway;
use crate::caching::guarded::GuardedBackend;
use crate::caching::module_storage::ModuleStorage;
use crate::caching::stores::build_backend;
use crate::core::config::{GatewayConfig, HEALTH_PATH};
use crate::core::error::{GatewayError, GatewayResult};
use crate::forwarding::{ProxyForwarder, SecondaryForwarder};

/// Shared server state
#[derive(Clone)]
pub struct ServerState {
    pub config: Arc<GatewayConfig>,
    pub cache: Arc<CacheGateway>,
    pub storage: Arc<ModuleStorage>,
    pub api_keys: ApiKeyGate,
}

impl ServerState {
    /// Build every component from configuration, connecting backends
    pub async fn from_config(config: GatewayConfig) -> GatewayResult<Self> {
        config.validate_routes()?;
        let backend = build_backend(&config.backend).await.map_err(|e| {
            GatewayError::config(format!("Failed to initialize {} backend: {}", config.backend.kind(), e))
        })?;
        let backend = Arc::new(GuardedBackend::new(
            "cache",
            backend,
            config.circuit_breaker.clone(),
        ));

        let secondary = Arc::new(SecondaryForwarder::new(
            &config.cache,
            &config.api,
            config.circuit_breaker.clone(),
        )?);
        let proxy = ProxyForwarder::new(&config.cache, &config.api, config.circuit_breaker.clone())?;
        let cache = CacheGateway::new(&config, backend, secondary, proxy);
        let storage = ModuleStorage::from_config(&config).await?;

        Ok(Self::new(config, cache, storage))
    }

    pub fn new(config: GatewayConfig, cache: CacheGateway, storage: ModuleStorage) -> Self {
        let api_keys = ApiKeyGate::from_config(&config.api);
        Self {
            config: Arc::new(config),
            cache: Arc::new(cache),
            storage: Arc::new(storage),
            api_keys,
        }
    }
}

/// Build the axum router for `state`
pub fn create_router(state: ServerState) -> Router {
    let api = &state.config.api;
    let max_body_size = state.config.server.max_body_size;

    let mut router = Router::new()
        .route(
            &api.cache_path,
            get(handlers::get_cache).post(handlers::post_cache),
        )
        .route(
            &api.storage_path,
            get(handlers::get_storage).post(handlers::post_storage),
        )
        .route(HEALTH_PATH, get(handlers::health));

    if api.module_storage_path != api.storage_path {
        router = router.route(
            &api.module_storage_path,
            get(handlers::get_storage).post(handlers::post_storage),
        );
    }

    router
        .layer(DefaultBodyLimit::max(max_body_size))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

pub struct GatewayServer {
    state: ServerState,
    app: Router,
}

impl GatewayServer {
    pub async fn new(config: GatewayConfig) -> GatewayResult<Self> {
        let state = ServerState::from_config(config).await?;
        Ok(Self::with_state(state))
    }

    pub fn with_state(state: ServerState) -> Self {
        let app = create_router(state.clone());
        Self { state, app }
    }

    pub fn router(&self) -> Router {
        self.app.clone()
    }

    pub fn bind_addr(&self) -> GatewayResult<SocketAddr> {
        self.state.config.socket_addr()
    }

    /// Serve until `shutdown` completes
    pub async fn start<F>(self, shutdown: F) -> GatewayResult<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let bind_addr = self.bind_addr()?;
        let listener = TcpListener::bind(bind_addr)
            .await
            .map_err(|e| GatewayError::internal(format!("Failed to bind server to {}: {}", bind_addr, e)))?;

        info!(
            addr = %bind_addr,
            backend = %self.state.cache.backend().kind(),
            "cache gateway listening"
        );

        axum::serve(listener, self.app)
            .with_graceful_shutdown(shutdown)
            .await
            .map_err(|e| GatewayError::internal(format!("Server error: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum_test::TestServer;

    #[tokio::test]
    async fn test_health_reports_backend() {
        let server = GatewayServer::new(GatewayConfig::default()).await.unwrap();
        let client = TestServer::new(server.router()).unwrap();

        let response = client.get("/health").await;
        response.assert_status_ok();
        response.assert_json(&serde_json::json!({"status": "UP", "backend": "record"}));
    }

    #[tokio::test]
    async fn test_colliding_paths_fail_to_build() {
        let mut config = GatewayConfig::default();
        config.api.storage_path = config.api.cache_path.clone();

        let err = GatewayServer::new(config).await.err().unwrap();
        assert!(matches!(err, GatewayError::Configuration { .. }));
    }

    #[tokio::test]
    async fn test_legacy_storage_path_is_routed() {
        let mut config = GatewayConfig::default();
        config.api.api_key = Some("secret".into());
        let server = GatewayServer::new(config).await.unwrap();
        let client = TestServer::new(server.router()).unwrap();

        for path in ["/storage", "/module-storage"] {
            let response = client.get(path).await;
            response.assert_status(axum::http::StatusCode::UNAUTHORIZED);
        }
    }
}
