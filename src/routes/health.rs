use crate::state::AppState;
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Json,
};

// Liveness probe, no DB access
pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

// Readiness probe: DB ping bounded by a 5s timeout
pub async fn readyz(State(state): State<AppState>) -> impl IntoResponse {
    let query = sqlx::query("SELECT 1").fetch_one(&state.db);
    match tokio::time::timeout(std::time::Duration::from_secs(5), query).await {
        Ok(Ok(_)) => (StatusCode::OK, "ready").into_response(),
        Ok(Err(e)) => (StatusCode::SERVICE_UNAVAILABLE, format!("not ready: {}", e)).into_response(),
        Err(_) => (StatusCode::SERVICE_UNAVAILABLE, "not ready: timeout").into_response(),
    }
}

// JSON snapshot of the counters plus the running job count
pub async fn metrics(State(state): State<AppState>) -> impl IntoResponse {
    let snapshot = state.metrics.get_snapshot();
    let mut body = serde_json::to_value(snapshot).unwrap_or_default();
    body["downloads_running"] = serde_json::json!(state.downloads.running().await);
    Json(body)
}

// Prometheus-compatible text exposition format
pub async fn metrics_prometheus(State(state): State<AppState>) -> impl IntoResponse {
    let m = state.metrics.get_snapshot();
    let running = state.downloads.running().await;
    let body = format!(
        "# HELP mediadl_downloads_started Total download requests started\n# TYPE mediadl_downloads_started counter\nmediadl_downloads_started {}\n\
# HELP mediadl_downloads_completed Total download requests completed\n# TYPE mediadl_downloads_completed counter\nmediadl_downloads_completed {}\n\
# HELP mediadl_downloads_failed Total download requests failed\n# TYPE mediadl_downloads_failed counter\nmediadl_downloads_failed {}\n\
# HELP mediadl_downloads_running Download jobs currently running\n# TYPE mediadl_downloads_running gauge\nmediadl_downloads_running {}\n\
# HELP mediadl_api_requests Public API calls accepted\n# TYPE mediadl_api_requests counter\nmediadl_api_requests {}\n\
# HELP mediadl_api_rejected Public API calls rejected by key or rate limit\n# TYPE mediadl_api_rejected counter\nmediadl_api_rejected {}\n\
# HELP mediadl_searches Searches executed\n# TYPE mediadl_searches counter\nmediadl_searches {}\n\
# HELP mediadl_bytes_downloaded Bytes downloaded\n# TYPE mediadl_bytes_downloaded counter\nmediadl_bytes_downloaded {}\n\
# HELP mediadl_uptime_seconds Uptime seconds\n# TYPE mediadl_uptime_seconds gauge\nmediadl_uptime_seconds {}\n",
        m.downloads_started,
        m.downloads_completed,
        m.downloads_failed,
        running,
        m.api_requests,
        m.api_rejected,
        m.searches,
        m.bytes_downloaded,
        m.uptime_seconds,
    );
    ([(header::CONTENT_TYPE, "text/plain; version=0.0.4")], body)
}

// Version/Build info endpoint (JSON)
pub async fn version() -> impl IntoResponse {
    let body = serde_json::json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "package": {
            "description": env!("CARGO_PKG_DESCRIPTION"),
            "authors": env!("CARGO_PKG_AUTHORS"),
            "license": env!("CARGO_PKG_LICENSE"),
        },
        "build": {
            "profile": if cfg!(debug_assertions) { "debug" } else { "release" },
            "os": std::env::consts::OS,
            "arch": std::env::consts::ARCH,
        }
    });
    (StatusCode::OK, Json(body))
}
