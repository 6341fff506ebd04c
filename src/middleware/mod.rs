//! Cross-cutting request handling: sessions and API keys, CSRF, client IP,
//! rate limiting, request validation and security headers.

pub mod auth;
pub mod csrf;
pub mod ip;
pub mod rate_limit;
pub mod security_headers;
pub mod validation;

pub use auth::CurrentUser;
pub use rate_limit::{EndpointRateLimiter, RateLimiter};
