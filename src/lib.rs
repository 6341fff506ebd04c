//! # Media DL Manager Backend Library
//!
//! Admin backend for media download requests. Dashboard users manage API
//! keys, download requests, audit logs and system settings; external
//! clients submit downloads through a bearer-key API that is counted
//! against each key's request limit.
//!
//! ## Architecture
//!
//! - **Axum**: HTTP server, routing and middleware
//! - **SQLx**: asynchronous SQLite access
//! - **Tokio**: runtime for the per-download processing jobs
//! - **Reqwest**: YouTube Data API and Spotify Web API search
//!
//! ## Core Components
//!
//! - [`config`]: layered configuration
//! - [`db`]: schema initialization
//! - [`downloads`]: download lifecycle and processing jobs
//! - [`error`]: error type and HTTP error envelope
//! - [`metrics`]: process-wide counters
//! - [`middleware`]: sessions, API keys, CSRF, rate limiting, validation, security headers
//! - [`routes`]: HTTP handlers and router assembly
//! - [`search`]: platform searchers
//! - [`state`]: shared application state
//! - [`storage`]: SQL queries per table
//! - [`types`]: entities, DTOs and enums

pub mod config;
pub mod db;
pub mod downloads;
pub mod error;
pub mod metrics;
pub mod middleware;
pub mod routes;
pub mod search;
pub mod state;
pub mod storage;
pub mod types;

#[cfg(test)]
mod tests;
