use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::{error::AppResult, middleware::CurrentUser, state::AppState};

/// Deletes completed downloads older than `cleanupDays`, files first.
pub async fn cleanup(State(state): State<AppState>, current: CurrentUser) -> AppResult<Json<Value>> {
    let removed = state.downloads.cleanup_expired(Some(current.id())).await?;
    Ok(Json(json!({ "removed": removed })))
}
