//! Cross-Site Request Forgery (CSRF) protection for the dashboard API.
//!
//! The dashboard authenticates with a cookie, so every state-changing call
//! must also carry a custom header that a cross-site form cannot set.

use axum::{
    extract::Request,
    http::{HeaderMap, Method},
    middleware::Next,
    response::{IntoResponse, Response},
};

use crate::error::AppError;

pub const CSRF_HEADER: &str = "X-CSRF-Token";
pub const CSRF_EXPECTED_VALUE: &str = "mediadl-dashboard";

/// Rejects POST, PUT, PATCH and DELETE without the CSRF header with 403.
pub async fn csrf_protection_middleware(req: Request, next: Next) -> Response {
    if matches!(req.method(), &Method::POST | &Method::PUT | &Method::DELETE | &Method::PATCH)
        && !validate_csrf_token(req.headers())
    {
        return AppError::Forbidden(format!(
            "CSRF token required. Include '{}' header with value '{}'",
            CSRF_HEADER, CSRF_EXPECTED_VALUE
        ))
        .into_response();
    }

    next.run(req).await
}

fn validate_csrf_token(headers: &HeaderMap) -> bool {
    headers
        .get(CSRF_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|v| v == CSRF_EXPECTED_VALUE)
        .unwrap_or(false)
}
