//! Dashboard sessions and bearer API keys.

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{header, request::Parts},
    middleware::Next,
    response::Response,
};
use axum_extra::extract::cookie::CookieJar;

use crate::{
    error::AppError,
    state::AppState,
    types::{ApiKey, User},
};

pub const SESSION_COOKIE: &str = "mediadl_session";

/// The logged-in dashboard user, resolved from the session cookie.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub session_id: String,
}

impl CurrentUser {
    pub fn id(&self) -> &str {
        &self.user.id
    }

    /// 403 unless `user_id` is the session user.
    pub fn ensure_owner(&self, user_id: &str) -> Result<(), AppError> {
        if self.user.id == user_id {
            Ok(())
        } else {
            Err(AppError::Forbidden("Access denied".into()))
        }
    }
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = AppError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let jar = CookieJar::from_headers(&parts.headers);
        let sid = jar
            .get(SESSION_COOKIE)
            .map(|c| c.value().to_string())
            .ok_or_else(|| AppError::Unauthorized("Unauthorized".into()))?;

        match state.storage.session_user(&sid).await? {
            Some(user) => Ok(CurrentUser { user, session_id: sid }),
            None => Err(AppError::Unauthorized("Unauthorized".into())),
        }
    }
}

/// Byte-wise comparison whose duration does not depend on where the inputs differ.
pub fn constant_time_eq(provided: &str, expected: &str) -> bool {
    let a = provided.as_bytes();
    let b = expected.as_bytes();
    if a.len() != b.len() {
        return false;
    }
    a.iter().zip(b).fold(0u8, |diff, (x, y)| diff | (x ^ y)) == 0
}

fn bearer_token(req: &Request) -> Option<&str> {
    req.headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Guards `/api/v1`: resolves the bearer key, counts the call against its
/// limit and attaches the `ApiKey` as a request extension.
pub async fn require_api_key(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, AppError> {
    let secret = bearer_token(&req).map(str::to_owned);
    match authorize(&state, secret.as_deref()).await {
        Ok(key) => {
            state.metrics.inc_api_requests();
            req.extensions_mut().insert(key);
            Ok(next.run(req).await)
        }
        Err(e) => {
            state.metrics.inc_api_rejected();
            Err(e)
        }
    }
}

async fn authorize(state: &AppState, secret: Option<&str>) -> Result<ApiKey, AppError> {
    let secret = secret.ok_or_else(|| AppError::Unauthorized("Missing or invalid API key".into()))?;

    let key = match state.storage.find_api_key(secret).await? {
        Some(k) if k.is_active && constant_time_eq(secret, &k.key) => k,
        _ => return Err(AppError::Unauthorized("Invalid API key".into())),
    };

    if !state.storage.try_consume_api_key(&key.id).await? {
        tracing::info!(key_id = %key.id, "API key request limit reached");
        return Err(AppError::QuotaExceeded("Rate limit exceeded".into()));
    }

    Ok(key)
}
