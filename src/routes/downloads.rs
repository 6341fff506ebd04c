use std::time::Duration;

use axum::response::sse::{Event, KeepAlive, Sse};
use axum::{
    extract::{Path, Query, State},
    Json,
};
use futures::Stream;
use serde::Deserialize;
use serde_json::{json, Value};
use tokio_stream::{wrappers::BroadcastStream, StreamExt};
use validator::Validate;

use super::clamp_limit;
use crate::{
    error::{AppError, AppJson, AppResult, OptionExt},
    middleware::{
        validation::{parse_platform, validate_media_url},
        CurrentUser,
    },
    state::AppState,
    types::{CreateDownloadRequest, DownloadRequest, NewDownload, NewLog, UpdateDownloadRequest},
};

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub limit: Option<i64>,
    pub user_id: Option<String>,
}

pub async fn list_requests(
    State(state): State<AppState>,
    _current: CurrentUser,
    Query(q): Query<ListQuery>,
) -> AppResult<Json<Vec<DownloadRequest>>> {
    let limit = clamp_limit(q.limit, 50, 500);
    let user_id = q.user_id.as_deref().filter(|s| !s.is_empty());
    Ok(Json(state.storage.list_downloads(limit, user_id).await?))
}

pub async fn create_request(
    State(state): State<AppState>,
    current: CurrentUser,
    AppJson(body): AppJson<CreateDownloadRequest>,
) -> AppResult<Json<DownloadRequest>> {
    body.validate()?;
    let platform = parse_platform(&body.platform)?;
    let url = validate_media_url(&body.url)?;

    if let Some(key_id) = body.api_key_id.as_deref() {
        let key = state.storage.get_api_key(key_id).await?.ok_or_not_found("API key")?;
        current.ensure_owner(&key.user_id)?;
    }

    let request = state
        .downloads
        .start(NewDownload {
            user_id: current.id().to_string(),
            api_key_id: body.api_key_id.clone(),
            url,
            title: body.title.clone().filter(|t| !t.trim().is_empty()),
            platform,
            metadata: body.metadata.clone(),
        })
        .await?;

    state
        .storage
        .audit(
            NewLog::info("Download request created")
                .details(format!("New download request for {}: {}", request.platform, request.url))
                .user(current.id())
                .request(&request.id),
        )
        .await;
    Ok(Json(request))
}

pub async fn get_request(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<DownloadRequest>> {
    let request = state.storage.get_download(&id).await?.ok_or_not_found("Download request")?;
    Ok(Json(request))
}

pub async fn update_request(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
    AppJson(body): AppJson<UpdateDownloadRequest>,
) -> AppResult<Json<DownloadRequest>> {
    body.validate()?;
    let updated = state.downloads.update(&id, body).await?;

    state
        .storage
        .audit(
            NewLog::info("Download request updated")
                .details(format!("Download request {} status: {}", updated.id, updated.status))
                .user(current.id())
                .request(&updated.id),
        )
        .await;
    Ok(Json(updated))
}

pub async fn delete_request(
    State(state): State<AppState>,
    current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Json<Value>> {
    state.downloads.delete(&id).await?;

    // the row is gone, so the id travels in metadata instead of request_id
    state
        .storage
        .audit(
            NewLog::info("Download request deleted")
                .details(format!("Download request {} was deleted", id))
                .user(current.id())
                .metadata(json!({ "requestId": id })),
        )
        .await;
    Ok(Json(json!({ "success": true })))
}

pub async fn request_events(
    State(state): State<AppState>,
    _current: CurrentUser,
    Path(id): Path<String>,
) -> AppResult<Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>>> {
    let rx = state
        .downloads
        .subscribe(&id)
        .await
        .ok_or_else(|| AppError::NotFound("Download request not running".into()))?;

    let stream = BroadcastStream::new(rx).filter_map(|res| res.ok()).map(|ev| {
        let data = serde_json::to_string(&ev)
            .unwrap_or_else(|_| json!({"type":"warning","message":"serialization error"}).to_string());
        Ok::<Event, std::convert::Infallible>(Event::default().data(data))
    });

    Ok(Sse::new(stream).keep_alive(KeepAlive::new().interval(Duration::from_secs(10)).text("keep-alive")))
}
