//! Integration tests for the backend.
//!
//! - **api_tests**: dashboard sessions, CSRF, API key ownership, settings
//! - **public_api_tests**: bearer-key flow and request limits
//! - **lifecycle_tests**: download processing, timeouts, cancellation, cleanup
//! - **stats_tests**: aggregate endpoints against recomputation
//! - **error_tests**: error envelope and validation field errors
//! - **config_tests**: layered configuration and validation
//! - **db_tests**: schema and foreign key behaviour
//! - **health_api_tests**: probes, metrics and version

pub mod health_api_tests;
pub mod lifecycle_tests;
pub mod public_api_tests;

use axum::{
    body::Body,
    http::{Request, Response, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use serde_json::Value;
use sqlx::{sqlite::SqlitePoolOptions, SqlitePool};
use tower::ServiceExt;

use crate::{config::AppConfig, middleware::csrf::CSRF_EXPECTED_VALUE, routes, state::AppState};

/// Defaults with a fast simulation so lifecycle tests finish quickly.
pub(crate) fn test_config() -> AppConfig {
    let mut cfg = AppConfig::default();
    cfg.database.url = "sqlite::memory:".into();
    cfg.simulation.step_delay_ms = 5;
    cfg
}

/// Single-connection in-memory database with schema and default settings.
pub(crate) async fn test_pool() -> SqlitePool {
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .idle_timeout(None)
        .max_lifetime(None)
        .connect("sqlite::memory:")
        .await
        .unwrap();
    crate::db::init_db(&pool).await.unwrap();
    crate::storage::Storage::new(pool.clone()).seed_default_settings().await.unwrap();
    pool
}

pub(crate) async fn test_app_with(cfg: AppConfig) -> (Router, AppState) {
    let state = AppState::new(test_pool().await, cfg);
    (routes::app(state.clone(), None), state)
}

pub(crate) async fn test_app() -> (Router, AppState) {
    test_app_with(test_config()).await
}

pub(crate) async fn send(app: &Router, req: Request<Body>) -> Response<Body> {
    app.clone().oneshot(req).await.unwrap()
}

pub(crate) async fn body_json(resp: Response<Body>) -> Value {
    let bytes = resp.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

/// Dashboard request with session cookie and CSRF header.
pub(crate) fn dashboard(method: &str, uri: &str, cookie: &str, body: Option<Value>) -> Request<Body> {
    let builder = Request::builder()
        .method(method)
        .uri(uri)
        .header("cookie", cookie)
        .header("x-csrf-token", CSRF_EXPECTED_VALUE);
    match body {
        Some(v) => builder.header("content-type", "application/json").body(Body::from(v.to_string())).unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    }
}

/// Logs in and returns `(cookie header, user id)`.
pub(crate) async fn login(app: &Router, email: &str) -> (String, String) {
    let req = Request::builder()
        .method("POST")
        .uri("/api/login")
        .header("content-type", "application/json")
        .header("x-csrf-token", CSRF_EXPECTED_VALUE)
        .body(Body::from(serde_json::json!({ "email": email, "firstName": "Test" }).to_string()))
        .unwrap();
    let resp = send(app, req).await;
    assert_eq!(resp.status(), StatusCode::OK);
    let cookie = resp
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .unwrap()
        .to_string();
    let user = body_json(resp).await;
    (cookie, user["id"].as_str().unwrap().to_string())
}

/// Polls until the download reaches `status` or five seconds pass.
pub(crate) async fn wait_for_status(state: &AppState, id: &str, status: &str) -> crate::types::DownloadRequest {
    for _ in 0..500 {
        if let Some(row) = state.storage.get_download(id).await.unwrap() {
            if row.status.as_str() == status {
                return row;
            }
        }
        tokio::time::sleep(std::time::Duration::from_millis(10)).await;
    }
    panic!("download {} never reached {}", id, status);
}
