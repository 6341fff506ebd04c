//! Security headers and cache policy for every response.

use axum::http::header::{CACHE_CONTROL, CONTENT_TYPE, PRAGMA};
use axum::{
    extract::{Request, State},
    http::{HeaderMap, HeaderName, HeaderValue},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::config::{AppConfig, SecurityConfig};

const STATIC_HEADERS: [(&str, &str); 6] = [
    ("x-content-type-options", "nosniff"),
    ("x-frame-options", "SAMEORIGIN"),
    ("referrer-policy", "no-referrer"),
    ("permissions-policy", "geolocation=(), microphone=(), camera=()"),
    ("cross-origin-opener-policy", "same-origin"),
    ("cross-origin-resource-policy", "same-origin"),
];

/// Adds nosniff, frame, referrer and cross-origin headers, optional HSTS and
/// CSP from `[security]`, and `no-store` on API JSON and SSE so progress and
/// key listings are never cached. Dashboard assets get a long-lived policy.
pub async fn security_headers_middleware(
    State(cfg): State<Arc<AppConfig>>,
    req: Request,
    next: Next,
) -> Response {
    let mut res = next.run(req).await;
    let headers = res.headers_mut();

    for (name, value) in STATIC_HEADERS {
        headers.insert(HeaderName::from_static(name), HeaderValue::from_static(value));
    }

    if let Some(sec) = cfg.security.as_ref() {
        apply_optional_headers(headers, sec);
    }

    apply_cache_policy(headers);
    res
}

fn apply_optional_headers(headers: &mut HeaderMap, sec: &SecurityConfig) {
    if sec.enable_hsts.unwrap_or(false) {
        let max_age = sec.hsts_max_age.unwrap_or(31_536_000);
        let include_sub = if sec.hsts_include_subdomains.unwrap_or(false) { "; includeSubDomains" } else { "" };
        if let Ok(val) = HeaderValue::from_str(&format!("max-age={}{}", max_age, include_sub)) {
            headers.insert(HeaderName::from_static("strict-transport-security"), val);
        }
    }
    if let Some(csp) = sec.csp.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        if let Ok(val) = HeaderValue::from_str(csp) {
            headers.insert(HeaderName::from_static("content-security-policy"), val);
        }
    }
}

fn apply_cache_policy(headers: &mut HeaderMap) {
    let content_type = match headers.get(CONTENT_TYPE).map(|ct| ct.to_str()) {
        Some(Ok(s)) => s.to_string(),
        Some(Err(e)) => {
            tracing::warn!("Invalid UTF-8 in Content-Type header: {}", e);
            return;
        }
        None => return,
    };

    let is_sse = content_type.starts_with("text/event-stream");
    if content_type.starts_with("application/json") || is_sse {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
        headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));
        if is_sse {
            // reverse proxies must not buffer the progress stream
            headers.insert(HeaderName::from_static("x-accel-buffering"), HeaderValue::from_static("no"));
        }
    } else if ["text/css", "application/javascript", "text/javascript", "application/wasm"]
        .iter()
        .any(|p| content_type.starts_with(p))
    {
        headers.insert(CACHE_CONTROL, HeaderValue::from_static("public, max-age=31536000, immutable"));
        headers.remove(PRAGMA);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn json_is_never_cached() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        apply_cache_policy(&mut headers);
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
    }

    #[test]
    fn sse_disables_proxy_buffering() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("text/event-stream"));
        apply_cache_policy(&mut headers);
        assert_eq!(headers.get("x-accel-buffering").unwrap(), "no");
    }

    #[test]
    fn hsts_only_when_enabled() {
        let mut headers = HeaderMap::new();
        apply_optional_headers(&mut headers, &SecurityConfig::default());
        assert!(headers.get("strict-transport-security").is_none());

        let sec = SecurityConfig {
            enable_hsts: Some(true),
            hsts_max_age: Some(600),
            hsts_include_subdomains: Some(true),
            csp: Some("default-src 'self'".into()),
        };
        apply_optional_headers(&mut headers, &sec);
        assert_eq!(headers.get("strict-transport-security").unwrap(), "max-age=600; includeSubDomains");
        assert_eq!(headers.get("content-security-policy").unwrap(), "default-src 'self'");
    }
}
