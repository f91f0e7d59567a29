//! # Configuration Module
//!
//! The gateway reads one YAML document at startup, applies `CACHE_GATEWAY_*`
//! environment overrides on top of it and validates the result. The value is
//! never mutated afterwards; components receive it (or the section they need)
//! through their constructors.
//!
//! ```yaml
//! server:
//!   port: 8080
//! api:
//!   api_key: secret
//! cache:
//!   prefix: prebid_
//!   min_expiry: 15
//!   max_expiry: 28800
//! backend:
//!   kind: redis
//!   url: redis://localhost:6379
//! storage:
//!   default_ttl_seconds: 1000
//!   applications:
//!     my-module:
//!       timeout_ms: 500
//!       backend:
//!         kind: redis
//!         url: redis://localhost:6379/1
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;
use url::Url;

use crate::caching::stores::BackendConfig;
use crate::core::circuit_breaker::CircuitBreakerConfig;
use crate::core::error::{GatewayError, GatewayResult};

/// Liveness route, always served
pub const HEALTH_PATH: &str = "/health";

/// Complete gateway configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub server: ServerConfig,
    pub api: ApiConfig,
    pub cache: CacheConfig,
    /// Backend serving the UUID-keyed cache
    pub backend: BackendConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    /// Module storage applications
    pub storage: StorageConfig,
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    /// Maximum request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 8080,
            max_body_size: 10 * 1024 * 1024,
        }
    }
}

/// Routes and the shared API key
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub cache_path: String,
    pub storage_path: String,
    /// Legacy alias of `storage_path`
    pub module_storage_path: String,
    /// Shared secret expected in `x-pbc-api-key`
    pub api_key: Option<String>,
    /// Public writes to the cache require the API key
    pub cache_write_secured: bool,
    /// Client supplied UUIDs require the API key
    pub external_uuid_secured: bool,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            cache_path: "/cache".to_string(),
            storage_path: "/storage".to_string(),
            module_storage_path: "/module-storage".to_string(),
            api_key: None,
            cache_write_secured: false,
            external_uuid_secured: false,
        }
    }
}

/// Behaviour of the UUID-keyed cache
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Prepended to every key before it reaches the backend
    pub prefix: String,
    /// Ttl used when a put carries neither `ttlseconds` nor `expiry`
    pub expiry_sec: u64,
    pub min_expiry: u64,
    pub max_expiry: u64,
    /// Deadline for a whole request, including backend and proxy calls
    pub timeout_ms: u64,
    pub allow_external_uuid: bool,
    /// Reject a write whose key already exists, on backends that can
    pub prevent_uuid_duplication: bool,
    /// Peer caches that receive a copy of every write
    pub secondary_uris: Vec<String>,
    pub secondary_cache_path: String,
    pub secondary_cache_timeout_ms: u64,
    /// Host that `ch` may point reads at; empty disables proxying
    pub allowed_proxy_host: String,
    pub host_param_protocol: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            prefix: String::new(),
            expiry_sec: 300,
            min_expiry: 15,
            max_expiry: 28800,
            timeout_ms: 1000,
            allow_external_uuid: false,
            prevent_uuid_duplication: false,
            secondary_uris: Vec::new(),
            secondary_cache_path: "/cache".to_string(),
            secondary_cache_timeout_ms: 100,
            allowed_proxy_host: String::new(),
            host_param_protocol: "http".to_string(),
        }
    }
}

impl CacheConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn secondary_cache_timeout(&self) -> Duration {
        Duration::from_millis(self.secondary_cache_timeout_ms)
    }
}

/// Module storage: one backend per application
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Ttl applied when a module entry carries none
    pub default_ttl_seconds: u64,
    pub applications: HashMap<String, ApplicationStorageConfig>,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            default_ttl_seconds: 300,
            applications: HashMap::new(),
        }
    }
}

impl StorageConfig {
    /// Ttl for an entry of `application` that carries none
    pub fn default_ttl_for(&self, application: Option<&str>) -> u64 {
        application
            .and_then(|name| self.applications.get(name))
            .and_then(|app| app.default_ttl_seconds)
            .unwrap_or(self.default_ttl_seconds)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApplicationStorageConfig {
    #[serde(default = "default_application_timeout_ms")]
    pub timeout_ms: u64,
    /// Overrides `storage.default_ttl_seconds` for this application
    #[serde(default)]
    pub default_ttl_seconds: Option<u64>,
    pub backend: BackendConfig,
}

fn default_application_timeout_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive, `RUST_LOG` wins when set
    pub level: String,
    pub format: LogFormat,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: LogFormat::Json,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    Json,
    Text,
}

impl GatewayConfig {
    /// Load configuration from a YAML file, apply environment overrides and validate
    pub async fn load_from_file<P: AsRef<Path>>(path: P) -> GatewayResult<Self> {
        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| GatewayError::config(format!("Failed to read config file: {}", e)))?;

        let mut config = Self::from_yaml(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML document without overrides or validation
    pub fn from_yaml(content: &str) -> GatewayResult<Self> {
        serde_yaml::from_str(content)
            .map_err(|e| GatewayError::config(format!("Failed to parse config: {}", e)))
    }

    /// Apply `CACHE_GATEWAY_*` environment variables
    pub fn apply_env_overrides(&mut self) -> GatewayResult<()> {
        self.apply_overrides(|name| std::env::var(name).ok())
    }

    /// Apply overrides from an arbitrary variable source
    pub fn apply_overrides<F>(&mut self, lookup: F) -> GatewayResult<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup("CACHE_GATEWAY_BIND_ADDRESS") {
            self.server.bind_address = addr;
        }
        if let Some(port) = lookup("CACHE_GATEWAY_PORT") {
            self.server.port = parse_override("CACHE_GATEWAY_PORT", &port)?;
        }
        if let Some(key) = lookup("CACHE_GATEWAY_API_KEY") {
            self.api.api_key = Some(key);
        }
        if let Some(value) = lookup("CACHE_GATEWAY_CACHE_WRITE_SECURED") {
            self.api.cache_write_secured = parse_override("CACHE_GATEWAY_CACHE_WRITE_SECURED", &value)?;
        }
        if let Some(value) = lookup("CACHE_GATEWAY_EXTERNAL_UUID_SECURED") {
            self.api.external_uuid_secured =
                parse_override("CACHE_GATEWAY_EXTERNAL_UUID_SECURED", &value)?;
        }
        if let Some(prefix) = lookup("CACHE_GATEWAY_PREFIX") {
            self.cache.prefix = prefix;
        }
        if let Some(value) = lookup("CACHE_GATEWAY_TIMEOUT_MS") {
            self.cache.timeout_ms = parse_override("CACHE_GATEWAY_TIMEOUT_MS", &value)?;
        }
        if let Some(value) = lookup("CACHE_GATEWAY_ALLOW_EXTERNAL_UUID") {
            self.cache.allow_external_uuid = parse_override("CACHE_GATEWAY_ALLOW_EXTERNAL_UUID", &value)?;
        }
        if let Some(value) = lookup("CACHE_GATEWAY_SECONDARY_URIS") {
            self.cache.secondary_uris = value
                .split(',')
                .map(str::trim)
                .filter(|uri| !uri.is_empty())
                .map(String::from)
                .collect();
        }
        if let Some(host) = lookup("CACHE_GATEWAY_ALLOWED_PROXY_HOST") {
            self.cache.allowed_proxy_host = host;
        }
        if let Some(url) = lookup("CACHE_GATEWAY_REDIS_URL") {
            match &mut self.backend {
                BackendConfig::Redis(redis) => redis.url = url,
                _ => {
                    return Err(GatewayError::config(
                        "CACHE_GATEWAY_REDIS_URL is set but the cache backend is not redis",
                    ))
                }
            }
        }
        if let Some(level) = lookup("CACHE_GATEWAY_LOG_LEVEL") {
            self.logging.level = level;
        }
        Ok(())
    }

    /// Routed paths must be distinct. The legacy module storage path may
    /// equal `storage_path`, in which case it is not routed twice.
    pub fn validate_routes(&self) -> GatewayResult<()> {
        let mut routes = vec![
            ("api.cache_path", self.api.cache_path.as_str()),
            ("api.storage_path", self.api.storage_path.as_str()),
            ("health", HEALTH_PATH),
        ];
        if self.api.module_storage_path != self.api.storage_path {
            routes.push(("api.module_storage_path", self.api.module_storage_path.as_str()));
        }

        for (i, (name, path)) in routes.iter().enumerate() {
            if let Some((other, _)) = routes[..i].iter().find(|(_, seen)| seen == path) {
                return Err(GatewayError::config(format!(
                    "{} '{}' collides with {}",
                    name, path, other
                )));
            }
        }
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> GatewayResult<()> {
        self.socket_addr()?;

        for path in [
            &self.api.cache_path,
            &self.api.storage_path,
            &self.api.module_storage_path,
            &self.cache.secondary_cache_path,
        ] {
            if !path.starts_with('/') {
                return Err(GatewayError::config(format!("Path must start with '/': {}", path)));
            }
        }

        self.validate_routes()?;

        let has_api_key = self.api.api_key.as_deref().is_some_and(|key| !key.is_empty());
        if (self.api.cache_write_secured || self.api.external_uuid_secured) && !has_api_key {
            return Err(GatewayError::config(
                "api.api_key is required when cache writes or external UUIDs are secured",
            ));
        }
        if !self.storage.applications.is_empty() && !has_api_key {
            return Err(GatewayError::config(
                "api.api_key is required when module storage applications are configured",
            ));
        }

        if self.cache.min_expiry > self.cache.max_expiry {
            return Err(GatewayError::config(format!(
                "cache.min_expiry ({}) must not exceed cache.max_expiry ({})",
                self.cache.min_expiry, self.cache.max_expiry
            )));
        }
        if self.cache.timeout_ms == 0 {
            return Err(GatewayError::config("cache.timeout_ms must be greater than 0"));
        }
        if !matches!(self.cache.host_param_protocol.as_str(), "http" | "https") {
            return Err(GatewayError::config(format!(
                "cache.host_param_protocol must be http or https, got {}",
                self.cache.host_param_protocol
            )));
        }
        for uri in &self.cache.secondary_uris {
            Url::parse(uri)
                .map_err(|e| GatewayError::config(format!("Invalid secondary cache uri {}: {}", uri, e)))?;
        }

        self.backend.validate()?;
        for (application, app) in &self.storage.applications {
            if application.is_empty() {
                return Err(GatewayError::config("Module storage application name must not be empty"));
            }
            if app.timeout_ms == 0 {
                return Err(GatewayError::config(format!(
                    "storage.applications.{}.timeout_ms must be greater than 0",
                    application
                )));
            }
            app.backend.validate()?;
        }

        Ok(())
    }

    pub fn socket_addr(&self) -> GatewayResult<SocketAddr> {
        format!("{}:{}", self.server.bind_address, self.server.port)
            .parse()
            .map_err(|e| GatewayError::config(format!("Invalid bind address: {}", e)))
    }
}

fn parse_override<T>(name: &str, value: &str) -> GatewayResult<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    value
        .parse()
        .map_err(|e| GatewayError::config(format!("Invalid {}: {}", name, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE: &str = r#"
server:
  port: 9090
api:
  api_key: secret
  cache_write_secured: true
cache:
  prefix: prebid_
  min_expiry: 15
  max_expiry: 300
  allow_external_uuid: true
  secondary_uris:
    - http://peer-a:8080
backend:
  kind: redis
  url: redis://localhost:6379
storage:
  default_ttl_seconds: 1000
  applications:
    module-a:
      timeout_ms: 250
      default_ttl_seconds: 60
      backend:
        kind: record
        namespace: module_a
"#;

    #[test]
    fn test_parse_sample() {
        let config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        config.validate().unwrap();

        assert_eq!(config.server.port, 9090);
        assert_eq!(config.cache.prefix, "prebid_");
        assert_eq!(config.cache.max_expiry, 300);
        assert_eq!(config.api.cache_path, "/cache");
        assert!(matches!(config.backend, BackendConfig::Redis(_)));

        let app = &config.storage.applications["module-a"];
        assert_eq!(app.timeout_ms, 250);
        assert_eq!(config.storage.default_ttl_for(Some("module-a")), 60);
        assert_eq!(config.storage.default_ttl_for(Some("unknown")), 1000);
        assert!(matches!(app.backend, BackendConfig::Record(_)));
    }

    #[test]
    fn test_defaults_are_valid() {
        GatewayConfig::default().validate().unwrap();
    }

    #[test]
    fn test_rejects_inverted_expiry_bounds() {
        let mut config = GatewayConfig::default();
        config.cache.min_expiry = 500;
        config.cache.max_expiry = 100;
        assert!(matches!(config.validate(), Err(GatewayError::Configuration { .. })));
    }

    #[test]
    fn test_secured_writes_need_api_key() {
        let mut config = GatewayConfig::default();
        config.api.cache_write_secured = true;
        assert!(config.validate().is_err());

        config.api.api_key = Some("secret".into());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_colliding_routes() {
        let mut config = GatewayConfig::default();
        config.api.storage_path = config.api.cache_path.clone();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("api.storage_path '/cache' collides with api.cache_path"));

        let mut config = GatewayConfig::default();
        config.api.cache_path = HEALTH_PATH.into();
        assert!(matches!(config.validate(), Err(GatewayError::Configuration { .. })));

        let mut config = GatewayConfig::default();
        config.api.module_storage_path = config.api.cache_path.clone();
        assert!(config.validate().is_err());

        let mut config = GatewayConfig::default();
        config.api.module_storage_path = config.api.storage_path.clone();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_rejects_unknown_proxy_protocol() {
        let mut config = GatewayConfig::default();
        config.cache.host_param_protocol = "ftp".into();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_overrides() {
        let mut config = GatewayConfig::from_yaml(SAMPLE).unwrap();
        let vars: HashMap<&str, &str> = [
            ("CACHE_GATEWAY_PORT", "7070"),
            ("CACHE_GATEWAY_TIMEOUT_MS", "25"),
            ("CACHE_GATEWAY_SECONDARY_URIS", "http://a:1, http://b:2"),
            ("CACHE_GATEWAY_REDIS_URL", "redis://cache:6380"),
        ]
        .into_iter()
        .collect();

        config
            .apply_overrides(|name| vars.get(name).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.server.port, 7070);
        assert_eq!(config.cache.timeout_ms, 25);
        assert_eq!(config.cache.secondary_uris, vec!["http://a:1", "http://b:2"]);
        match &config.backend {
            BackendConfig::Redis(redis) => assert_eq!(redis.url, "redis://cache:6380"),
            other => panic!("unexpected backend {:?}", other),
        }
    }

    #[test]
    fn test_bad_override_is_config_error() {
        let mut config = GatewayConfig::default();
        let result = config.apply_overrides(|name| {
            (name == "CACHE_GATEWAY_PORT").then(|| "not-a-port".to_string())
        });
        assert!(matches!(result, Err(GatewayError::Configuration { .. })));
    }

    #[tokio::test]
    async fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(SAMPLE.as_bytes()).unwrap();

        let config = GatewayConfig::load_from_file(file.path()).await.unwrap();
        assert_eq!(config.cache.prefix, "prebid_");
    }
}
