use axum::{
    extract::{Query, State},
    http::HeaderMap,
    Json,
};
use serde::Deserialize;

use crate::{
    error::{AppError, AppResult},
    middleware::{ip::MaybeRemoteAddr, CurrentUser},
    state::AppState,
    types::{SearchPlatform, SearchResult},
};

const MAX_QUERY_CHARS: usize = 200;

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    #[serde(default)]
    pub platform: SearchPlatform,
}

/// Shared by the dashboard and `/api/v1/search`.
pub(crate) async fn run_search(state: &AppState, q: SearchQuery) -> AppResult<Json<Vec<SearchResult>>> {
    let query = q.q.as_deref().map(str::trim).unwrap_or_default();
    if query.is_empty() {
        return Err(AppError::field("q", "Search query is required"));
    }
    if query.chars().count() > MAX_QUERY_CHARS {
        return Err(AppError::field("q", format!("Search query exceeds {} characters", MAX_QUERY_CHARS)));
    }
    Ok(Json(state.search.search(query, q.platform).await))
}

pub async fn search(
    State(state): State<AppState>,
    _current: CurrentUser,
    remote: MaybeRemoteAddr,
    headers: HeaderMap,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<SearchResult>>> {
    let ip = remote.ip(&headers, state.config.server.trust_proxy);
    state.rate_limiter.check_endpoint_limit("/api/search", ip).await?;
    run_search(&state, q).await
}
