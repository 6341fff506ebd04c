//! HTTP route handlers and router assembly.
//!
//! - `auth`: dashboard login, logout and current user
//! - `api_keys`: per-user API key management
//! - `downloads`: download request CRUD and progress events
//! - `logs`, `settings`, `stats`, `files`: admin dashboard tabs
//! - `search`: YouTube/Spotify search for the dashboard
//! - `public`: the bearer-key `/api/v1` API
//! - `health`: probes, metrics and version

use std::path::PathBuf;

use axum::extract::DefaultBodyLimit;
use axum::http::header::CONTENT_TYPE;
use axum::middleware::{from_fn, from_fn_with_state};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::compression::predicate::{DefaultPredicate, Predicate};
use tower_http::{
    compression::CompressionLayer,
    cors::CorsLayer,
    services::{ServeDir, ServeFile},
    trace::TraceLayer,
};

use crate::middleware::{self, validation::MAX_BODY_BYTES};
use crate::state::AppState;

pub mod api_keys;
pub mod auth;
pub mod downloads;
pub mod files;
pub mod health;
pub mod logs;
pub mod public;
pub mod search;
pub mod settings;
pub mod stats;

/// `?limit=` with a default and an inclusive clamp.
pub(crate) fn clamp_limit(limit: Option<i64>, default: i64, max: i64) -> i64 {
    limit.unwrap_or(default).clamp(1, max)
}

fn dashboard_routes() -> Router<AppState> {
    Router::new()
        .route("/api/login", post(auth::login))
        .route("/api/logout", post(auth::logout).get(auth::logout))
        .route("/api/auth/user", get(auth::current_user))
        .route("/api/users/{user_id}/api-keys", get(api_keys::list_keys).post(api_keys::create_key))
        .route("/api/api-keys/{key_id}", axum::routing::patch(api_keys::update_key).delete(api_keys::delete_key))
        .route("/api/download-requests", get(downloads::list_requests).post(downloads::create_request))
        .route(
            "/api/download-requests/{id}",
            get(downloads::get_request).patch(downloads::update_request).delete(downloads::delete_request),
        )
        .route("/api/download-requests/{id}/events", get(downloads::request_events))
        .route("/api/logs", get(logs::list_logs).post(logs::create_log))
        .route("/api/settings", get(settings::list_settings).post(settings::upsert_setting))
        .route("/api/settings/{key}", get(settings::get_setting))
        .route("/api/stats/users", get(stats::user_stats))
        .route("/api/stats/downloads", get(stats::download_stats))
        .route("/api/stats/storage", get(stats::storage_stats))
        .route("/api/files/cleanup", post(files::cleanup))
        .route("/api/search", get(search::search))
        .layer(from_fn(middleware::csrf::csrf_protection_middleware))
}

fn public_routes(state: &AppState) -> Router<AppState> {
    Router::new()
        .route("/api/v1/download", post(public::create_download))
        .route("/api/v1/download/{id}", get(public::download_status))
        .route("/api/v1/search", get(public::search))
        // layers run bottom-up: IP window first, then the key
        .layer(from_fn_with_state(state.clone(), middleware::auth::require_api_key))
        .layer(from_fn_with_state(state.clone(), middleware::rate_limit::rate_limit_middleware))
}

fn health_routes() -> Router<AppState> {
    Router::new()
        .route("/healthz", get(health::healthz))
        .route("/readyz", get(health::readyz))
        .route("/metrics", get(health::metrics))
        .route("/metrics/prometheus", get(health::metrics_prometheus))
        .route("/version", get(health::version))
}

// SSE must not be compressed or the progress stream stalls in buffers
#[derive(Clone)]
struct NoSseDefault(DefaultPredicate);

impl Predicate for NoSseDefault {
    fn should_compress<B: axum::body::HttpBody>(&self, res: &axum::http::Response<B>) -> bool {
        let is_sse = res
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .map(|s| s.starts_with("text/event-stream"))
            .unwrap_or(false);
        !is_sse && self.0.should_compress(res)
    }
}

/// Full application router. `ui_root` serves the dashboard bundle with an
/// `index.html` fallback for client-side routes.
pub fn app(state: AppState, ui_root: Option<PathBuf>) -> Router {
    let mut router = Router::new().merge(health_routes()).merge(dashboard_routes()).merge(public_routes(&state));

    if let Some(root) = ui_root {
        let index = root.join("index.html");
        let static_ui = ServeDir::new(root).append_index_html_on_directories(true).not_found_service(ServeFile::new(index));
        router = router.fallback_service(static_ui);
    }

    let cfg = state.config.clone();
    let app = router
        .with_state(state)
        .layer(DefaultBodyLimit::max(MAX_BODY_BYTES))
        .layer(from_fn(middleware::validation::validate_request_middleware))
        .layer(CompressionLayer::new().compress_when(NoSseDefault(DefaultPredicate::new())))
        .layer(TraceLayer::new_for_http())
        .layer(from_fn_with_state(cfg, middleware::security_headers::security_headers_middleware));

    // CORS only for local development against a separately served UI
    if cfg!(debug_assertions) {
        app.layer(CorsLayer::permissive())
    } else {
        app
    }
}

#[cfg(test)]
mod tests {
    use super::clamp_limit;

    #[test]
    fn limits_are_clamped() {
        assert_eq!(clamp_limit(None, 50, 500), 50);
        assert_eq!(clamp_limit(Some(0), 50, 500), 1);
        assert_eq!(clamp_limit(Some(-3), 50, 500), 1);
        assert_eq!(clamp_limit(Some(10_000), 50, 500), 500);
        assert_eq!(clamp_limit(Some(7), 100, 1000), 7);
    }
}
