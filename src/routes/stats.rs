use axum::{extract::State, Json};

use crate::{
    downloads::DownloadService,
    error::AppResult,
    middleware::CurrentUser,
    state::AppState,
    types::{DownloadStats, StorageStats, UserStats},
};

// Aggregates are recomputed per call; the dashboard polls these.

pub async fn user_stats(State(state): State<AppState>, _current: CurrentUser) -> AppResult<Json<UserStats>> {
    Ok(Json(state.storage.user_stats().await?))
}

pub async fn download_stats(State(state): State<AppState>, _current: CurrentUser) -> AppResult<Json<DownloadStats>> {
    Ok(Json(state.storage.download_stats().await?))
}

pub async fn storage_stats(State(state): State<AppState>, _current: CurrentUser) -> AppResult<Json<StorageStats>> {
    let days = state.downloads.cleanup_days().await?;
    let cutoff = DownloadService::cleanup_cutoff(days);
    Ok(Json(state.storage.storage_stats(&cutoff, days as i64).await?))
}
