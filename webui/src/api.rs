use reqwasm::http::{Request, Response};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value as JsonValue;
use wasm_bindgen::closure::Closure;
use wasm_bindgen::JsCast;
use web_sys::{EventSource, MessageEvent};

use crate::types::*;

pub const BASE: &str = ""; // use same-origin relative URLs

/// Must match the backend's CSRF check on state-changing dashboard calls.
const CSRF_HEADER: &str = "X-CSRF-Token";
const CSRF_VALUE: &str = "mediadl-dashboard";

fn url(path: &str) -> String { format!("{}{}", BASE, path) }

fn map_net(e: reqwasm::Error) -> String { format!("Network error: {}", e) }

/// Pulls `error.message` out of the backend envelope, falling back to the raw body.
async fn error_text(resp: Response) -> String {
    let status = resp.status();
    let text = resp.text().await.unwrap_or_else(|_| "HTTP error".into());
    if let Ok(v) = serde_json::from_str::<JsonValue>(&text) {
        if let Some(msg) = v.pointer("/error/message").and_then(|m| m.as_str()) {
            if status == 429 {
                if let Some(sec) = v.pointer("/error/details/retry_after_seconds").and_then(|x| x.as_u64()) {
                    return format!("{} (retry in {}s)", msg, sec);
                }
            }
            return msg.to_string();
        }
    }
    if text.is_empty() { format!("HTTP {}", status) } else { text }
}

async fn read<T: DeserializeOwned>(resp: Response) -> Result<T, String> {
    if !resp.ok() { return Err(error_text(resp).await); }
    resp.json().await.map_err(map_net)
}

async fn get_json<T: DeserializeOwned>(path: &str) -> Result<T, String> {
    let resp = Request::get(&url(path)).send().await.map_err(map_net)?;
    read(resp).await
}

fn with_csrf(req: Request) -> Request {
    req.header(CSRF_HEADER, CSRF_VALUE)
}

async fn send_json<B: Serialize, T: DeserializeOwned>(req: Request, body: &B) -> Result<T, String> {
    let body = serde_json::to_string(body).map_err(|e| e.to_string())?;
    let resp = with_csrf(req)
        .header("Content-Type", "application/json")
        .body(body)
        .send()
        .await
        .map_err(map_net)?;
    read(resp).await
}

async fn send_empty<T: DeserializeOwned>(req: Request) -> Result<T, String> {
    let resp = with_csrf(req).send().await.map_err(map_net)?;
    read(resp).await
}

// ----- Session -----

pub async fn current_user() -> Result<User, String> {
    get_json("/api/auth/user").await
}

pub async fn login(req: &LoginReq) -> Result<User, String> {
    send_json(Request::post(&url("/api/login")), req).await
}

pub async fn logout() -> Result<(), String> {
    let _: JsonValue = send_empty(Request::post(&url("/api/logout"))).await?;
    Ok(())
}

// ----- API keys -----

pub async fn list_keys(user_id: &str) -> Result<Vec<ApiKey>, String> {
    get_json(&format!("/api/users/{}/api-keys", urlencoding::encode(user_id))).await
}

pub async fn create_key(user_id: &str, req: &CreateKeyReq) -> Result<ApiKey, String> {
    send_json(Request::post(&url(&format!("/api/users/{}/api-keys", urlencoding::encode(user_id)))), req).await
}

pub async fn update_key(key_id: &str, req: &UpdateKeyReq) -> Result<ApiKey, String> {
    send_json(Request::patch(&url(&format!("/api/api-keys/{}", key_id))), req).await
}

pub async fn delete_key(key_id: &str) -> Result<(), String> {
    let _: JsonValue = send_empty(Request::delete(&url(&format!("/api/api-keys/{}", key_id)))).await?;
    Ok(())
}

// ----- Downloads -----

pub async fn list_downloads(limit: i64) -> Result<Vec<DownloadRequest>, String> {
    get_json(&format!("/api/download-requests?limit={}", limit)).await
}

pub async fn create_download(req: &CreateDownloadReq) -> Result<DownloadRequest, String> {
    send_json(Request::post(&url("/api/download-requests")), req).await
}

pub async fn delete_download(id: &str) -> Result<(), String> {
    let _: JsonValue = send_empty(Request::delete(&url(&format!("/api/download-requests/{}", id)))).await?;
    Ok(())
}

// ----- Logs, settings, stats -----

pub async fn list_logs(limit: i64, level: Option<&str>) -> Result<Vec<SystemLog>, String> {
    let mut path = format!("/api/logs?limit={}", limit);
    if let Some(l) = level { path.push_str(&format!("&level={}", urlencoding::encode(l))); }
    get_json(&path).await
}

pub async fn list_settings() -> Result<Vec<SystemSetting>, String> {
    get_json("/api/settings").await
}

pub async fn upsert_setting(req: &UpsertSettingReq) -> Result<SystemSetting, String> {
    send_json(Request::post(&url("/api/settings")), req).await
}

pub async fn user_stats() -> Result<UserStats, String> {
    get_json("/api/stats/users").await
}

pub async fn download_stats() -> Result<DownloadStats, String> {
    get_json("/api/stats/downloads").await
}

pub async fn storage_stats() -> Result<StorageStats, String> {
    get_json("/api/stats/storage").await
}

pub async fn cleanup_files() -> Result<CleanupResponse, String> {
    send_empty(Request::post(&url("/api/files/cleanup"))).await
}

pub async fn search(q: &str, platform: &str) -> Result<Vec<SearchResult>, String> {
    get_json(&format!("/api/search?q={}&platform={}", urlencoding::encode(q), urlencoding::encode(platform))).await
}

pub async fn healthz() -> Result<bool, String> {
    let resp = Request::get(&url("/healthz")).send().await.map_err(map_net)?;
    Ok(resp.ok())
}

// SSE helper: open EventSource and wire message callback. Returns the EventSource to be kept alive.
pub fn sse_attach<F>(id: &str, mut on_message: F) -> Result<EventSource, String>
where F: 'static + FnMut(DownloadEvent) {
    let es = EventSource::new(&url(&format!("/api/download-requests/{}/events", id)))
        .map_err(|e| format!("SSE error: {:?}", e))?;
    let closure = Closure::<dyn FnMut(web_sys::Event)>::new(move |ev: web_sys::Event| {
        if let Ok(me) = ev.dyn_into::<MessageEvent>() {
            if let Some(text) = me.data().as_string() {
                if let Ok(ev) = serde_json::from_str::<DownloadEvent>(&text) {
                    on_message(ev);
                }
            }
        }
    });
    es.set_onmessage(Some(closure.as_ref().unchecked_ref()));
    // the owner closes the EventSource; the closure lives as long as it does
    closure.forget();
    Ok(es)
}
