//! # Cache Gateway Library
//!
//! HTTP cache for short-lived ad payloads (JSON, XML, plain text) keyed by
//! UUID, plus a per-application module storage facade.
//!
//! ## Modules
//! - `core`: error taxonomy, configuration, wire models, circuit breaker
//! - `caching`: validation, key and expiry policy, storage backends, the
//!   cache gateway and module storage
//! - `forwarding`: secondary-cache replication and proxied reads
//! - `middleware`: request deadline
//! - `auth`: API key gate
//! - `gateway`: axum router, handlers and server lifecycle
//! - `observability`: structured logging
//!
//! ## Quick start
//! ```rust,ignore
//! let config = GatewayConfig::load_from_file("config/cache-gateway.yaml").await?;
//! init_logging(&config.logging)?;
//! let server = GatewayServer::new(config).await?;
//! server.start(async { let _ = tokio::signal::ctrl_c().await; }).await?;
//! ```

/// Error types, configuration, data models and the circuit breaker
pub mod core;

/// UUID cache and module storage
pub mod caching;

/// Outbound calls to peer caches
pub mod forwarding;

/// Request deadline
pub mod middleware;

/// Shared API key checks
pub mod auth;

/// HTTP server and handlers
pub mod gateway;

/// Logging initialisation
pub mod observability;

pub use crate::core::config::GatewayConfig;
pub use crate::core::error::{GatewayError, GatewayResult};
pub use crate::gateway::{create_router, GatewayServer, ServerState};
pub use crate::observability::init_logging;
