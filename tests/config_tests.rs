//! # Configuration Tests
//!
//! The shipped sample configuration must load, validate and boot a server.

use cache_gateway::caching::BackendKind;
use cache_gateway::{GatewayConfig, GatewayServer};
use std::path::PathBuf;

fn sample_path() -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("config/cache-gateway.yaml")
}

#[tokio::test]
async fn test_sample_config_loads() {
    let content = tokio::fs::read_to_string(sample_path()).await.unwrap();
    let config = GatewayConfig::from_yaml(&content).unwrap();
    config.validate().unwrap();

    assert_eq!(config.cache.prefix, "prebid_");
    assert_eq!(config.backend.kind(), BackendKind::Record);
    assert_eq!(
        config.storage.applications["default-module"].backend.kind(),
        BackendKind::Grid
    );
}

#[tokio::test]
async fn test_sample_config_boots() {
    let content = tokio::fs::read_to_string(sample_path()).await.unwrap();
    let config = GatewayConfig::from_yaml(&content).unwrap();

    let server = GatewayServer::new(config).await.unwrap();
    assert_eq!(server.bind_addr().unwrap().port(), 8080);
}

#[tokio::test]
async fn test_missing_file_is_config_error() {
    let err = GatewayConfig::load_from_file("does/not/exist.yaml")
        .await
        .unwrap_err();
    assert!(err.to_string().contains("Failed to read config file"));
}
