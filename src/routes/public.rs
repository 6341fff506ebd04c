//! `/api/v1`: the bearer-key API. `require_api_key` has already counted the
//! call and attached the `ApiKey` extension.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use serde_json::{json, Value};

use super::search::{run_search, SearchQuery};
use crate::{
    error::{AppError, AppJson, AppResult},
    middleware::validation::{parse_platform, validate_media_url},
    state::AppState,
    types::{ApiKey, NewDownload, NewLog, PublicDownloadRequest, SearchResult},
};

pub async fn create_download(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKey>,
    AppJson(body): AppJson<PublicDownloadRequest>,
) -> AppResult<Json<Value>> {
    let (url, platform) = match (body.url.as_deref(), body.platform.as_deref()) {
        (Some(u), Some(p)) if !u.trim().is_empty() && !p.trim().is_empty() => (u, p),
        _ => return Err(AppError::BadRequest("URL and platform are required".into())),
    };
    let platform = parse_platform(platform)?;
    let url = validate_media_url(url)?;

    let request = state
        .downloads
        .start(NewDownload {
            user_id: key.user_id.clone(),
            api_key_id: Some(key.id.clone()),
            url,
            title: body.title.filter(|t| !t.trim().is_empty()),
            platform,
            metadata: None,
        })
        .await?;

    state
        .storage
        .audit(
            NewLog::info("API download request received")
                .details(format!("External API request for {}: {}", platform, request.url))
                .user(&key.user_id)
                .request(&request.id)
                .metadata(json!({ "apiKeyId": key.id })),
        )
        .await;

    Ok(Json(json!({
        "id": request.id,
        "status": request.status,
        "message": "Download request queued successfully",
    })))
}

pub async fn download_status(
    State(state): State<AppState>,
    Extension(key): Extension<ApiKey>,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    // foreign requests look exactly like missing ones
    let request = state
        .storage
        .get_download(&id)
        .await?
        .filter(|r| r.user_id == key.user_id)
        .ok_or_else(|| AppError::NotFound("Download request not found".into()))?;

    Ok(Json(json!({
        "id": request.id,
        "status": request.status,
        "progress": request.progress,
        "fileName": request.file_name,
        "fileSize": request.file_size,
        "createdAt": request.created_at,
        "updatedAt": request.updated_at,
    })))
}

pub async fn search(
    State(state): State<AppState>,
    Extension(_key): Extension<ApiKey>,
    Query(q): Query<SearchQuery>,
) -> AppResult<Json<Vec<SearchResult>>> {
    run_search(&state, q).await
}
