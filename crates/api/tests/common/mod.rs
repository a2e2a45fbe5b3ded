#![allow(dead_code)]

use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::http::{Method, Request, Response};
use axum::Router;
use http_body_util::BodyExt;
use tower::ServiceExt;

use widgetcfg_api::config::{ServerConfig, StoreBackend, StoreConfig};
use widgetcfg_api::router::build_app_router;
use widgetcfg_api::state::AppState;
use widgetcfg_core::manager::{VersionManager, VersioningSettings};
use widgetcfg_core::memory::MemoryConfigurationStore;
use widgetcfg_core::retry::RetryPolicy;
use widgetcfg_core::store::ConfigurationStore;
use widgetcfg_core::types::DbId;

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        log_json: false,
        store: StoreConfig {
            backend: StoreBackend::Memory,
            database_url: None,
            max_connections: 1,
            lock_timeout: Duration::from_millis(500),
        },
        versioning: VersioningSettings {
            operation_timeout: Duration::from_secs(5),
            retry: RetryPolicy::none(),
        },
    }
}

/// Build the full application router over an in-memory store that knows the
/// given widgets.
///
/// Uses the same [`build_app_router`] as `main.rs`, so tests exercise the
/// production middleware stack (CORS, request ID, timeout, tracing, panic
/// recovery).
pub fn build_test_app(widgets: &[DbId]) -> Router {
    let store = MemoryConfigurationStore::with_widgets(widgets.iter().copied());
    build_test_app_with_store(Arc::new(store))
}

pub fn build_test_app_with_store(store: Arc<dyn ConfigurationStore>) -> Router {
    let config = test_config();
    let versions = Arc::new(VersionManager::new(store, config.versioning));
    build_app_router(AppState {
        config: Arc::new(config),
        versions,
    })
}

/// Read a response body as JSON.
pub async fn body_json(response: Response<Body>) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn send(app: Router, request: Request<Body>) -> Response<Body> {
    app.oneshot(request).await.unwrap()
}

pub async fn get(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::GET)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn delete(app: Router, uri: &str) -> Response<Body> {
    let request = Request::builder()
        .method(Method::DELETE)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    send(app, request).await
}

pub async fn post_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::POST, uri, body).await
}

pub async fn put_json(app: Router, uri: &str, body: serde_json::Value) -> Response<Body> {
    json_request(app, Method::PUT, uri, body).await
}

async fn json_request(
    app: Router,
    method: Method,
    uri: &str,
    body: serde_json::Value,
) -> Response<Body> {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(serde_json::to_vec(&body).unwrap()))
        .unwrap();
    send(app, request).await
}
