use axum::{
    extract::{Query, State},
    Json,
};
use serde::Deserialize;
use validator::Validate;

use super::clamp_limit;
use crate::{
    error::{AppError, AppJson, AppResult},
    middleware::CurrentUser,
    state::AppState,
    types::{CreateLogRequest, LogLevel, NewLog, SystemLog},
};

#[derive(Debug, Default, Deserialize)]
pub struct LogsQuery {
    pub limit: Option<i64>,
    pub level: Option<String>,
}

pub async fn list_logs(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(q): Query<LogsQuery>,
) -> AppResult<Json<Vec<SystemLog>>> {
    let limit = clamp_limit(q.limit, 100, 1000);
    // the dashboard sends `all` for no filter
    let level = match q.level.as_deref() {
        None | Some("") | Some("all") => None,
        Some(raw) => Some(raw.parse::<LogLevel>().map_err(|e| AppError::field("level", e))?),
    };
    Ok(Json(state.storage.list_logs(limit, level).await?))
}

pub async fn create_log(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(body): AppJson<CreateLogRequest>,
) -> AppResult<Json<SystemLog>> {
    body.validate()?;

    if let Some(request_id) = body.request_id.as_deref() {
        if state.storage.get_download(request_id).await?.is_none() {
            return Err(AppError::field("requestId", "Download request not found"));
        }
    }

    let log = NewLog {
        level: body.level,
        message: body.message,
        details: body.details,
        user_id: Some(current.id().to_string()),
        request_id: body.request_id,
        metadata: body.metadata,
    };
    let created = state.storage.create_log(&log).await?;
    Ok(Json(created))
}
