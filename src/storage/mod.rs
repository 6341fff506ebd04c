//! Typed data access over the SQLite pool.
//!
//! Each submodule adds an `impl Storage` block for one table. Handlers and
//! services never write SQL themselves.

use rand::Rng;
use serde_json::Value;
use sqlx::{sqlite::SqliteRow, Row, SqlitePool};

use crate::types::{ApiKey, DownloadRequest, DownloadStatus, SystemLog, SystemSetting, User};

mod api_keys;
mod downloads;
mod logs;
mod sessions;
mod settings;
mod stats;
mod users;

pub use downloads::StatusChange;
pub use settings::{check_setting_value, DEFAULT_SETTINGS, MAX_CLEANUP_DAYS, MAX_DOWNLOAD_TIMEOUT_SECS};

#[derive(Clone)]
pub struct Storage {
    pool: SqlitePool,
}

impl Storage {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Lowercase hex of `n` random bytes.
pub(crate) fn random_hex(n: usize) -> String {
    let mut bytes = vec![0u8; n];
    rand::rng().fill(&mut bytes[..]);
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

fn json_column(raw: Option<String>) -> Option<Value> {
    raw.and_then(|s| serde_json::from_str(&s).ok())
}

fn decode_err(msg: String) -> sqlx::Error {
    sqlx::Error::Decode(msg.into())
}

fn user_from_row(r: &SqliteRow) -> Result<User, sqlx::Error> {
    Ok(User {
        id: r.try_get("id")?,
        email: r.try_get("email")?,
        first_name: r.try_get("first_name")?,
        last_name: r.try_get("last_name")?,
        profile_image_url: r.try_get("profile_image_url")?,
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
    })
}

fn api_key_from_row(r: &SqliteRow) -> Result<ApiKey, sqlx::Error> {
    Ok(ApiKey {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        key: r.try_get("key")?,
        name: r.try_get("name")?,
        is_active: r.try_get("is_active")?,
        request_count: r.try_get("request_count")?,
        request_limit: r.try_get("request_limit")?,
        last_used_at: r.try_get("last_used_at")?,
        created_at: r.try_get("created_at")?,
    })
}

fn download_from_row(r: &SqliteRow) -> Result<DownloadRequest, sqlx::Error> {
    let status: String = r.try_get("status")?;
    Ok(DownloadRequest {
        id: r.try_get("id")?,
        user_id: r.try_get("user_id")?,
        api_key_id: r.try_get("api_key_id")?,
        url: r.try_get("url")?,
        title: r.try_get("title")?,
        platform: r.try_get("platform")?,
        status: status.parse::<DownloadStatus>().map_err(decode_err)?,
        progress: r.try_get("progress")?,
        file_size: r.try_get("file_size")?,
        file_name: r.try_get("file_name")?,
        file_path: r.try_get("file_path")?,
        error_message: r.try_get("error_message")?,
        metadata: json_column(r.try_get("metadata")?),
        created_at: r.try_get("created_at")?,
        updated_at: r.try_get("updated_at")?,
        // only present in joined queries
        user_email: r.try_get::<Option<String>, _>("user_email").ok().flatten(),
    })
}

fn log_from_row(r: &SqliteRow) -> Result<SystemLog, sqlx::Error> {
    Ok(SystemLog {
        id: r.try_get("id")?,
        level: r.try_get("level")?,
        message: r.try_get("message")?,
        details: r.try_get("details")?,
        user_id: r.try_get("user_id")?,
        request_id: r.try_get("request_id")?,
        timestamp: r.try_get("timestamp")?,
        metadata: json_column(r.try_get("metadata")?),
        user_email: r.try_get::<Option<String>, _>("user_email").ok().flatten(),
    })
}

fn setting_from_row(r: &SqliteRow) -> Result<SystemSetting, sqlx::Error> {
    Ok(SystemSetting {
        id: r.try_get("id")?,
        key: r.try_get("key")?,
        value: r.try_get("value")?,
        description: r.try_get("description")?,
        updated_at: r.try_get("updated_at")?,
    })
}
