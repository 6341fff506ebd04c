use std::{fmt, str::FromStr};

use serde::{Deserialize, Serialize};
use serde_json::Value;
use validator::Validate;

/// Format used for every persisted timestamp. Matches the SQLite column
/// defaults, so string comparison is chronological.
pub const TS_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn now_ts() -> String {
    chrono::Utc::now().format(TS_FORMAT).to_string()
}

pub fn ts_from(dt: chrono::DateTime<chrono::Utc>) -> String {
    dt.format(TS_FORMAT).to_string()
}

/// Midnight UTC of the current day.
pub fn start_of_today() -> String {
    let today = chrono::Utc::now().date_naive();
    format!("{}T00:00:00Z", today.format("%Y-%m-%d"))
}

// ---------------------- ENUMS ----------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadStatus {
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl DownloadStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadStatus::Pending => "pending",
            DownloadStatus::InProgress => "in_progress",
            DownloadStatus::Completed => "completed",
            DownloadStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DownloadStatus::Completed | DownloadStatus::Failed)
    }

    /// Allowed edges of `pending -> in_progress -> {completed | failed}`.
    /// `in_progress -> in_progress` is a progress update.
    pub fn can_transition_to(&self, next: DownloadStatus) -> bool {
        use DownloadStatus::*;
        matches!(
            (self, next),
            (Pending, InProgress)
                | (Pending, Failed)
                | (InProgress, InProgress)
                | (InProgress, Completed)
                | (InProgress, Failed)
        )
    }

    /// Statuses from which `next` may be reached, for `WHERE status IN (..)` guards.
    pub fn predecessors(next: DownloadStatus) -> &'static [DownloadStatus] {
        use DownloadStatus::*;
        match next {
            Pending => &[],
            InProgress => &[Pending, InProgress],
            Completed => &[InProgress],
            Failed => &[Pending, InProgress],
        }
    }
}

impl fmt::Display for DownloadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DownloadStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DownloadStatus::Pending),
            "in_progress" => Ok(DownloadStatus::InProgress),
            "completed" => Ok(DownloadStatus::Completed),
            "failed" => Ok(DownloadStatus::Failed),
            other => Err(format!("unknown status: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Platform {
    Youtube,
    Spotify,
    Instagram,
}

impl Platform {
    pub fn as_str(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtube",
            Platform::Spotify => "spotify",
            Platform::Instagram => "instagram",
        }
    }

    pub fn extension(&self) -> &'static str {
        match self {
            Platform::Spotify => "mp3",
            Platform::Youtube | Platform::Instagram => "mp4",
        }
    }

    /// Key of the system setting that toggles this platform.
    pub fn setting_key(&self) -> &'static str {
        match self {
            Platform::Youtube => "youtubeEnabled",
            Platform::Spotify => "spotifyEnabled",
            Platform::Instagram => "instagramEnabled",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Platform {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "youtube" => Ok(Platform::Youtube),
            "spotify" => Ok(Platform::Spotify),
            "instagram" => Ok(Platform::Instagram),
            other => Err(format!("unsupported platform: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Info,
    Warning,
    Error,
    Debug,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Info => "info",
            LogLevel::Warning => "warning",
            LogLevel::Error => "error",
            LogLevel::Debug => "debug",
        }
    }
}

impl FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "info" => Ok(LogLevel::Info),
            "warning" => Ok(LogLevel::Warning),
            "error" => Ok(LogLevel::Error),
            "debug" => Ok(LogLevel::Debug),
            other => Err(format!("unknown log level: {}", other)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchPlatform {
    Youtube,
    Spotify,
    #[default]
    All,
}

// ---------------------- ENTITIES ----------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub email: Option<String>,
    pub first_name: Option<String>,
    pub last_name: Option<String>,
    pub profile_image_url: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiKey {
    pub id: String,
    pub user_id: String,
    pub key: String,
    pub name: String,
    pub is_active: bool,
    pub request_count: i64,
    pub request_limit: i64,
    pub last_used_at: Option<String>,
    pub created_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadRequest {
    pub id: String,
    pub user_id: String,
    pub api_key_id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub platform: String,
    pub status: DownloadStatus,
    pub progress: i64,
    pub file_size: Option<i64>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub error_message: Option<String>,
    pub metadata: Option<Value>,
    pub created_at: String,
    pub updated_at: String,
    /// Owner email, joined in list queries only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemLog {
    pub id: String,
    pub level: String,
    pub message: String,
    pub details: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub timestamp: String,
    pub metadata: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_email: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemSetting {
    pub id: String,
    pub key: String,
    pub value: String,
    pub description: Option<String>,
    pub updated_at: String,
}

// ---------------------- INPUT DTOs ----------------------

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[validate(email(message = "A valid email is required"))]
    pub email: String,
    #[validate(length(max = 100))]
    pub first_name: Option<String>,
    #[validate(length(max = 100))]
    pub last_name: Option<String>,
    #[validate(url(message = "profileImageUrl must be a URL"))]
    pub profile_image_url: Option<String>,
    pub token: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: String,
    #[validate(range(min = 1, message = "requestLimit must be at least 1"))]
    pub request_limit: Option<i64>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateApiKeyRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    pub is_active: Option<bool>,
    #[validate(range(min = 1, message = "requestLimit must be at least 1"))]
    pub request_limit: Option<i64>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateDownloadRequest {
    #[validate(length(min = 1, max = 2048, message = "URL is required"))]
    pub url: String,
    #[validate(length(min = 1, message = "Platform is required"))]
    pub platform: String,
    #[validate(length(max = 500))]
    pub title: Option<String>,
    pub api_key_id: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateDownloadRequest {
    #[validate(length(max = 500))]
    pub title: Option<String>,
    pub metadata: Option<Value>,
    pub status: Option<DownloadStatus>,
    #[validate(range(min = 0, max = 100, message = "Progress must be between 0 and 100"))]
    pub progress: Option<i64>,
    pub error_message: Option<String>,
}

/// Body of `POST /api/v1/download`; missing fields are reported with one message.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PublicDownloadRequest {
    pub url: Option<String>,
    pub platform: Option<String>,
    pub title: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateLogRequest {
    pub level: LogLevel,
    #[validate(length(min = 1, message = "Message is required"))]
    pub message: String,
    pub details: Option<String>,
    pub request_id: Option<String>,
    pub metadata: Option<Value>,
}

#[derive(Debug, Clone, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpsertSettingRequest {
    #[validate(length(min = 1, max = 100, message = "Key is required"))]
    pub key: String,
    pub value: String,
    pub description: Option<String>,
}

/// Fields for a new download row.
#[derive(Debug, Clone)]
pub struct NewDownload {
    pub user_id: String,
    pub api_key_id: Option<String>,
    pub url: String,
    pub title: Option<String>,
    pub platform: Platform,
    pub metadata: Option<Value>,
}

/// Fields for a new audit log row.
#[derive(Debug, Clone)]
pub struct NewLog {
    pub level: LogLevel,
    pub message: String,
    pub details: Option<String>,
    pub user_id: Option<String>,
    pub request_id: Option<String>,
    pub metadata: Option<Value>,
}

impl NewLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self { level, message: message.into(), details: None, user_id: None, request_id: None, metadata: None }
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Info, message)
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(LogLevel::Error, message)
    }

    pub fn details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    pub fn user(mut self, user_id: impl Into<String>) -> Self {
        self.user_id = Some(user_id.into());
        self
    }

    pub fn request(mut self, request_id: impl Into<String>) -> Self {
        self.request_id = Some(request_id.into());
        self
    }

    pub fn metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }
}

// ---------------------- STATS ----------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserStats {
    pub total_users: i64,
    pub active_api_keys: i64,
    pub requests_today: i64,
    pub rate_limited: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct DownloadStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub completed_today: i64,
    pub failed: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StorageStats {
    pub total_files: i64,
    pub total_size: i64,
    pub cleanup_eligible: i64,
    pub cleanup_days: i64,
}

// ---------------------- EVENTS & SEARCH ----------------------

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DownloadEvent {
    Started { id: String, platform: String },
    Progress { id: String, progress: i64 },
    Completed { id: String, file_name: String, file_size: i64 },
    Failed { id: String, message: String },
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct SearchResult {
    pub id: String,
    pub title: String,
    pub artist: String,
    pub duration: Option<String>,
    pub thumbnail: Option<String>,
    pub platform: String,
    pub url: String,
}
