use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::json;
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppResult},
    middleware::CurrentUser,
    state::AppState,
    storage::check_setting_value,
    types::{NewLog, SystemSetting, UpsertSettingRequest},
};

pub async fn list_settings(State(state): State<AppState>, _current: CurrentUser) -> AppResult<Json<Vec<SystemSetting>>> {
    Ok(Json(state.storage.list_settings().await?))
}

pub async fn get_setting(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(key): Path<String>,
) -> AppResult<Json<SystemSetting>> {
    state
        .storage
        .get_setting(&key)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Setting not found".into()))
}

pub async fn upsert_setting(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(body): AppJson<UpsertSettingRequest>,
) -> AppResult<Json<SystemSetting>> {
    body.validate()?;
    let key = body.key.trim();
    check_setting_value(key, &body.value).map_err(|msg| AppError::field("value", msg))?;
    let setting = state.storage.upsert_setting(key, &body.value, body.description.as_deref()).await?;

    state
        .storage
        .audit(
            NewLog::info("System setting updated")
                .details(format!("Setting {} was updated", setting.key))
                .user(current.id())
                .metadata(json!({ "key": setting.key, "value": setting.value })),
        )
        .await;
    Ok(Json(setting))
}
