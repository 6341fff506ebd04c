use axum::{
    extract::{Path, State},
    Json,
};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppResult, OptionExt},
    middleware::CurrentUser,
    state::AppState,
    types::{ApiKey, CreateApiKeyRequest, NewLog, UpdateApiKeyRequest},
};

pub async fn list_keys(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<String>,
) -> AppResult<Json<Vec<ApiKey>>> {
    current.ensure_owner(&user_id)?;
    Ok(Json(state.storage.list_api_keys(&user_id).await?))
}

pub async fn create_key(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(user_id): Path<String>,
    AppJson(body): AppJson<CreateApiKeyRequest>,
) -> AppResult<Json<ApiKey>> {
    current.ensure_owner(&user_id)?;
    body.validate()?;

    let limit = body.request_limit.unwrap_or(state.config.limits.default_request_limit);
    let key = state
        .storage
        .create_api_key(&user_id, body.name.trim(), limit, body.is_active.unwrap_or(true))
        .await?;

    state
        .storage
        .audit(
            NewLog::info("API key created")
                .details(format!("User created new API key: {}", key.name))
                .user(current.id())
                .metadata(json!({ "apiKeyId": key.id, "requestLimit": key.request_limit })),
        )
        .await;
    Ok(Json(key))
}

/// Loads the key and checks it belongs to the session user.
async fn owned_key(state: &AppState, current: &CurrentUser, key_id: &str) -> AppResult<ApiKey> {
    let key = state.storage.get_api_key(key_id).await?.ok_or_not_found("API key")?;
    current.ensure_owner(&key.user_id)?;
    Ok(key)
}

pub async fn update_key(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key_id): Path<String>,
    AppJson(body): AppJson<UpdateApiKeyRequest>,
) -> AppResult<Json<ApiKey>> {
    body.validate()?;
    owned_key(&state, &current, &key_id).await?;

    let key = state.storage.update_api_key(&key_id, &body).await?.ok_or_not_found("API key")?;
    state
        .storage
        .audit(
            NewLog::info("API key updated")
                .details(format!("API key {} was updated", key.name))
                .user(current.id())
                .metadata(json!({ "apiKeyId": key.id, "isActive": key.is_active })),
        )
        .await;
    Ok(Json(key))
}

pub async fn delete_key(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(key_id): Path<String>,
) -> AppResult<Json<Value>> {
    let key = owned_key(&state, &current, &key_id).await?;
    if !state.storage.delete_api_key(&key_id).await? {
        return Err(AppError::NotFound("API key not found".into()));
    }
    state
        .storage
        .audit(
            NewLog::info("API key deleted")
                .details(format!("API key {} was deleted", key.name))
                .user(current.id())
                .metadata(json!({ "apiKeyId": key.id })),
        )
        .await;
    Ok(Json(json!({ "success": true })))
}
