use axum::{
    extract::Request,
    http::{Method, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

use crate::error::AppError;
use crate::types::Platform;

/// Largest accepted request body. JSON payloads here are small.
pub const MAX_BODY_BYTES: usize = 1024 * 1024;

const MAX_URL_LENGTH: usize = 2048;

/// Rejects path traversal in the URI and oversized declared bodies before
/// routing. Suspicious scanner user agents are only logged.
pub async fn validate_request_middleware(req: Request, next: Next) -> Response {
    if contains_path_traversal(req.uri().path()) {
        return AppError::BadRequest("Path traversal detected in request".into()).into_response();
    }

    if let Some(ua) = req.headers().get("user-agent").and_then(|v| v.to_str().ok()) {
        if is_suspicious_user_agent(ua) {
            tracing::warn!("Suspicious user agent detected: {}", sanitize_for_logging(ua));
        }
    }

    if matches!(req.method(), &Method::POST | &Method::PUT | &Method::PATCH) {
        let declared = req
            .headers()
            .get("content-length")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.parse::<usize>().ok());
        if let Some(length) = declared.filter(|l| *l > MAX_BODY_BYTES) {
            tracing::debug!(length, "rejecting oversized body");
            return (
                StatusCode::PAYLOAD_TOO_LARGE,
                Json(json!({
                    "error": {
                        "code": "PAYLOAD_TOO_LARGE",
                        "message": format!("Request body exceeds maximum size of {} bytes", MAX_BODY_BYTES),
                    },
                    "status": 413,
                    "timestamp": chrono::Utc::now().to_rfc3339(),
                })),
            )
                .into_response();
        }
    }

    next.run(req).await
}

fn contains_path_traversal(path: &str) -> bool {
    let lower = path.to_lowercase();

    if path.contains("/..") || path.contains("\\..") || path.starts_with("..") {
        return true;
    }
    if path.contains("/./") || path.contains("\\.\\") || path.contains("....") {
        return true;
    }

    // single and double URL-encoded dots, separators and NUL
    const ENCODED: [&str; 11] =
        ["%2e%2e", "%252e%252e", "%2e/", "%252e%2f", "/%2e", "%2f%2e", "%2e\\", "%2e%5c", "%5c%2e", "%5c%5c", "%00"];
    ENCODED.iter().any(|p| lower.contains(p)) || path.contains('\0')
}

fn is_suspicious_user_agent(ua: &str) -> bool {
    let ua_lower = ua.to_lowercase();
    ua_lower.contains("scanner")
        || (ua_lower.contains("crawler") && !ua_lower.contains("googlebot") && !ua_lower.contains("bingbot"))
        || ["nikto", "sqlmap", "havij", "acunetix"].iter().any(|t| ua_lower.contains(t))
}

/// Parses the platform field of a download request.
pub fn parse_platform(raw: &str) -> Result<Platform, AppError> {
    raw.parse::<Platform>()
        .map_err(|_| AppError::field("platform", "Platform must be one of youtube, spotify, instagram"))
}

/// Media URLs must be absolute http(s) URLs without whitespace.
pub fn validate_media_url(url: &str) -> Result<String, AppError> {
    let trimmed = url.trim();
    if trimmed.is_empty() {
        return Err(AppError::field("url", "URL is required"));
    }
    if trimmed.len() > MAX_URL_LENGTH {
        return Err(AppError::field("url", format!("URL exceeds {} characters", MAX_URL_LENGTH)));
    }
    let lower = trimmed.to_ascii_lowercase();
    let rest = lower.strip_prefix("https://").or_else(|| lower.strip_prefix("http://"));
    match rest {
        Some(host_and_path) if !host_and_path.is_empty() && !trimmed.chars().any(char::is_whitespace) => {
            Ok(trimmed.to_string())
        }
        _ => Err(AppError::field("url", "URL must be an absolute http(s) URL")),
    }
}

/// Strips control characters and caps the length for log lines.
pub fn sanitize_for_logging(input: &str) -> String {
    input
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .take(200)
        .collect::<String>()
        .replace('\\', "\\\\")
        .replace('"', "\\\"")
}
