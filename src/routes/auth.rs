use axum::{extract::State, http::HeaderMap, Json};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use serde_json::{json, Value};
use validator::Validate;

use crate::{
    error::{AppError, AppJson, AppResult},
    middleware::{
        auth::{constant_time_eq, SESSION_COOKIE},
        ip::MaybeRemoteAddr,
        validation::sanitize_for_logging,
        CurrentUser,
    },
    state::AppState,
    types::{LoginRequest, NewLog, User},
};

/// Local email login. When `auth.admin_token` is set the body must carry it.
pub async fn login(
    State(state): State<AppState>,
    remote: MaybeRemoteAddr,
    headers: HeaderMap,
    jar: CookieJar,
    AppJson(body): AppJson<LoginRequest>,
) -> AppResult<(CookieJar, Json<User>)> {
    let ip = remote.ip(&headers, state.config.server.trust_proxy);
    state.rate_limiter.check_endpoint_limit("/api/login", ip).await?;
    body.validate()?;

    if let Some(expected) = state.config.auth.admin_token() {
        let provided = body.token.as_deref().unwrap_or_default();
        if !constant_time_eq(provided, expected) {
            tracing::info!(%ip, email = %sanitize_for_logging(&body.email), "login rejected");
            return Err(AppError::Unauthorized("Invalid login token".into()));
        }
    }

    let user = state
        .storage
        .upsert_user(
            body.email.trim(),
            body.first_name.as_deref(),
            body.last_name.as_deref(),
            body.profile_image_url.as_deref(),
        )
        .await?;
    let sid = state.storage.create_session(&user.id, state.config.auth.session_ttl_hours).await?;

    state.storage.audit(NewLog::info("User logged in").details(format!("Login from {}", ip)).user(&user.id)).await;
    tracing::info!(user_id = %user.id, "dashboard login");

    let cookie = Cookie::build((SESSION_COOKIE, sid))
        .path("/")
        .http_only(true)
        .same_site(SameSite::Lax)
        .secure(state.config.auth.cookie_secure)
        .build();
    Ok((jar.add(cookie), Json(user)))
}

pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> AppResult<(CookieJar, Json<Value>)> {
    if let Some(sid) = jar.get(SESSION_COOKIE).map(|c| c.value().to_string()) {
        state.storage.delete_session(&sid).await?;
    }
    let jar = jar.remove(Cookie::build(SESSION_COOKIE).path("/"));
    Ok((jar, Json(json!({ "success": true }))))
}

pub async fn current_user(current: CurrentUser) -> Json<User> {
    Json(current.user)
}
