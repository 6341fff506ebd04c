use axum::{
    extract::{connect_info::ConnectInfo, FromRequestParts, Request},
    http::{request::Parts, HeaderMap},
};
use std::convert::Infallible;
use std::net::{IpAddr, SocketAddr};

/// Extract client IP from proxy headers and optional transport metadata.
///
/// `X-Forwarded-For` and `X-Real-IP` are only honoured with `trust_proxy`;
/// otherwise any client could pick its own rate limit bucket.
pub fn extract_ip_from_headers(headers: &HeaderMap, fallback: Option<IpAddr>, trust_proxy: bool) -> IpAddr {
    let fallback = fallback.unwrap_or(IpAddr::from([127, 0, 0, 1]));
    if !trust_proxy {
        return fallback;
    }
    if let Some(h) = headers.get("x-forwarded-for").and_then(|hv| hv.to_str().ok()) {
        if let Some(first) = h.split(',').next() {
            if let Ok(ip) = first.trim().parse::<IpAddr>() {
                return ip;
            }
        }
    }
    if let Some(h) = headers.get("x-real-ip").and_then(|hv| hv.to_str().ok()) {
        if let Ok(ip) = h.trim().parse::<IpAddr>() {
            return ip;
        }
    }
    fallback
}

/// Client IP of a request inside a `from_fn` middleware.
pub fn client_ip(req: &Request, trust_proxy: bool) -> IpAddr {
    let remote = req.extensions().get::<ConnectInfo<SocketAddr>>().map(|info| info.0.ip());
    extract_ip_from_headers(req.headers(), remote, trust_proxy)
}

/// Optional extractor for the remote socket address. Unlike `ConnectInfo`,
/// this never rejects when the extension is absent (tests, `oneshot`).
#[derive(Clone, Copy, Debug, Default)]
pub struct MaybeRemoteAddr(pub Option<SocketAddr>);

impl MaybeRemoteAddr {
    pub fn ip(&self, headers: &HeaderMap, trust_proxy: bool) -> IpAddr {
        extract_ip_from_headers(headers, self.0.map(|a| a.ip()), trust_proxy)
    }
}

impl<S> FromRequestParts<S> for MaybeRemoteAddr
where
    S: Send + Sync,
{
    type Rejection = Infallible;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        Ok(MaybeRemoteAddr(parts.extensions.get::<ConnectInfo<SocketAddr>>().map(|ci| ci.0)))
    }
}
