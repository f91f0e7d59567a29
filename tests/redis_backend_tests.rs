//! # Redis Backend Integration Tests
//!
//! Runs against a real Redis started with testcontainers. Needs a Docker
//! daemon, so the tests are ignored by default:
//!
//! ```text
//! cargo test --test redis_backend_tests -- --ignored
//! ```

use axum::http::StatusCode;
use axum_test::TestServer;
use cache_gateway::caching::stores::{RedisStore, RedisStoreConfig, StorageBackend, WriteMode};
use cache_gateway::caching::{BackendConfig, StorageError};
use cache_gateway::core::types::StoredPayload;
use cache_gateway::{GatewayConfig, GatewayServer};
use serde_json::{json, Value};
use std::time::Duration;
use testcontainers::{clients::Cli, core::WaitFor, GenericImage};

fn redis_image() -> GenericImage {
    GenericImage::new("redis", "7.2.4")
        .with_wait_for(WaitFor::message_on_stdout("Ready to accept connections"))
}

fn store_config(port: u16) -> RedisStoreConfig {
    RedisStoreConfig {
        url: format!("redis://127.0.0.1:{}", port),
        key_prefix: "test:".into(),
        ..Default::default()
    }
}

/// Test put, get and exists against a live server
#[tokio::test]
#[ignore]
async fn test_redis_store_roundtrip() {
    let docker = Cli::default();
    let node = docker.run(redis_image());
    let store = RedisStore::connect(store_config(node.get_host_port_ipv4(6379)))
        .await
        .unwrap();

    assert!(store.health_check().await.unwrap());

    let payload = StoredPayload::new("xml", "abc", "<VAST/>", "", 60);
    store
        .put("abc", &payload, Duration::from_secs(60), WriteMode::Overwrite)
        .await
        .unwrap();

    assert!(store.exists("abc").await.unwrap());
    let found = store.get("abc").await.unwrap().unwrap();
    assert_eq!(found.value, "<VAST/>");
    assert_eq!(found.media_type, "xml");

    assert!(store.get("missing").await.unwrap().is_none());
}

/// Test create-only puts reject an existing key atomically
#[tokio::test]
#[ignore]
async fn test_redis_store_rejects_duplicates() {
    let docker = Cli::default();
    let node = docker.run(redis_image());
    let store = RedisStore::connect(store_config(node.get_host_port_ipv4(6379)))
        .await
        .unwrap();

    let first = StoredPayload::new("text", "dup", "first", "", 60);
    let second = StoredPayload::new("text", "dup", "second", "", 60);
    store
        .put("dup", &first, Duration::from_secs(60), WriteMode::CreateOnly)
        .await
        .unwrap();

    let err = store
        .put("dup", &second, Duration::from_secs(60), WriteMode::CreateOnly)
        .await
        .unwrap_err();
    assert_eq!(err, StorageError::Duplicate { key: "dup".into() });
    assert_eq!(store.get("dup").await.unwrap().unwrap().value, "first");

    store
        .put("dup", &second, Duration::from_secs(60), WriteMode::Overwrite)
        .await
        .unwrap();
    assert_eq!(store.get("dup").await.unwrap().unwrap().value, "second");
}

/// Test entries expire server-side
#[tokio::test]
#[ignore]
async fn test_redis_store_expiry() {
    let docker = Cli::default();
    let node = docker.run(redis_image());
    let store = RedisStore::connect(store_config(node.get_host_port_ipv4(6379)))
        .await
        .unwrap();

    let payload = StoredPayload::new("text", "short", "x", "", 1);
    store
        .put("short", &payload, Duration::from_secs(1), WriteMode::Overwrite)
        .await
        .unwrap();

    tokio::time::sleep(Duration::from_millis(1500)).await;
    assert!(!store.exists("short").await.unwrap());
}

/// Test the full cache API on a Redis backend
#[tokio::test]
#[ignore]
async fn test_cache_api_on_redis() {
    let docker = Cli::default();
    let node = docker.run(redis_image());

    let mut config = GatewayConfig::default();
    config.cache.prefix = "prebid_".into();
    config.cache.allow_external_uuid = true;
    config.cache.prevent_uuid_duplication = true;
    config.backend = BackendConfig::Redis(store_config(node.get_host_port_ipv4(6379)));

    let gateway = GatewayServer::new(config).await.unwrap();
    let server = TestServer::new(gateway.router()).unwrap();

    let health: Value = server.get("/health").await.json();
    assert_eq!(health, json!({"status": "UP", "backend": "redis"}));

    let body = json!({"puts": [{"type": "json", "value": {"a": 1}, "key": "redis-key"}]});
    server.post("/cache").json(&body).await.assert_status_ok();

    let response = server.post("/cache").json(&body).await;
    response.assert_status(StatusCode::BAD_REQUEST);

    let response = server.get("/cache").add_query_param("uuid", "redis-key").await;
    response.assert_status_ok();
    response.assert_text(r#"{"a":1}"#);
}
