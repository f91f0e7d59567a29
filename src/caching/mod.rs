//! # Caching System Module
//!
//! The UUID-keyed payload cache and the per-application module storage.
//!
//! ## Architecture
//! 1. **Cache Manager**: runs a write batch through validation, key
//!    resolution, expiry policy and the backend, and serves reads
//! 2. **Stores**: the `StorageBackend` trait with Redis, record-store and
//!    grid implementations
//! 3. **Guarded backend**: circuit breaker around any store
//! 4. **Module storage**: (application, key) facade routing to one backend per
//!    application
//!
//! ## Usage Example
//! ```rust,ignore
//! let backend = stores::build_backend(&config.backend).await?;
//! let gateway = CacheGateway::new(&config, backend, secondary, proxy);
//!
//! let uuids = gateway.write_batch(request, WriteContext::default()).await?;
//! let hit = gateway.read_local(&uuids.responses[0].uuid).await?;
//! ```

pub mod cache_manager;
pub mod expiry;
pub mod guarded;
pub mod key_resolver;
pub mod module_storage;
pub mod stores;
pub mod validator;

pub use cache_manager::{CacheGateway, WriteContext};
pub use expiry::ExpiryPolicy;
pub use guarded::GuardedBackend;
pub use key_resolver::{KeyResolver, ResolvedKey};
pub use module_storage::ModuleStorage;
pub use stores::{build_backend, BackendConfig, BackendKind, StorageBackend, WriteMode};
pub use validator::RequestValidator;

/// Storage operation result
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors raised by storage backends
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StorageError {
    /// A create-only write found the key already present
    #[error("Key already exists: {key}")]
    Duplicate { key: String },

    /// Native backend failure, message kept verbatim
    #[error("{message}")]
    Backend { message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Storage operation timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
}

impl StorageError {
    pub fn backend<S: Into<String>>(message: S) -> Self {
        Self::Backend {
            message: message.into(),
        }
    }
}

impl From<redis::RedisError> for StorageError {
    fn from(err: redis::RedisError) -> Self {
        Self::Backend {
            message: err.to_string(),
        }
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            message: err.to_string(),
        }
    }
}
