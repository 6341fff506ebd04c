use uuid::Uuid;

use super::{setting_from_row, Storage};
use crate::types::{now_ts, SystemSetting};

/// Settings seeded on first start: key, value, description.
pub const DEFAULT_SETTINGS: [(&str, &str, &str); 10] = [
    ("rateLimit", "60", "API rate limit per minute"),
    ("maxFileSize", "100MB", "Maximum file size for downloads"),
    ("downloadTimeout", "300", "Download timeout in seconds"),
    ("enableAuth", "true", "Enable API authentication"),
    ("cleanupDays", "30", "Days before files are eligible for cleanup"),
    ("maxStorage", "70", "Maximum storage in GB"),
    ("autoCleanup", "true", "Automatically cleanup old files"),
    ("youtubeEnabled", "true", "Enable YouTube downloads"),
    ("spotifyEnabled", "true", "Enable Spotify downloads"),
    ("instagramEnabled", "true", "Enable Instagram downloads"),
];

/// Upper bound for `cleanupDays`, roughly a century.
pub const MAX_CLEANUP_DAYS: u64 = 36_500;
/// Upper bound for `downloadTimeout`, one day.
pub const MAX_DOWNLOAD_TIMEOUT_SECS: u64 = 86_400;

/// Settings the server reads as numbers, with their accepted range.
const NUMERIC_SETTINGS: [(&str, u64, u64); 2] =
    [("cleanupDays", 1, MAX_CLEANUP_DAYS), ("downloadTimeout", 1, MAX_DOWNLOAD_TIMEOUT_SECS)];

/// Checks a value before it is stored. Keys the server does not interpret
/// are accepted as free text.
pub fn check_setting_value(key: &str, value: &str) -> Result<(), String> {
    let Some((_, min, max)) = NUMERIC_SETTINGS.iter().find(|(k, _, _)| *k == key) else {
        return Ok(());
    };
    match value.trim().parse::<u64>() {
        Ok(v) if (*min..=*max).contains(&v) => Ok(()),
        _ => Err(format!("{} must be a whole number between {} and {}", key, min, max)),
    }
}

impl Storage {
    pub async fn list_settings(&self) -> Result<Vec<SystemSetting>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM system_settings ORDER BY key")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(setting_from_row).collect()
    }

    pub async fn get_setting(&self, key: &str) -> Result<Option<SystemSetting>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM system_settings WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(setting_from_row).transpose()
    }

    /// Insert or overwrite by key. A missing description keeps the stored one.
    pub async fn upsert_setting(
        &self,
        key: &str,
        value: &str,
        description: Option<&str>,
    ) -> Result<SystemSetting, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO system_settings (id, key, value, description, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5)
               ON CONFLICT(key) DO UPDATE SET
                   value = excluded.value,
                   description = COALESCE(excluded.description, system_settings.description),
                   updated_at = excluded.updated_at
               RETURNING *"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(key)
        .bind(value)
        .bind(description)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        setting_from_row(&row)
    }

    pub async fn seed_default_settings(&self) -> Result<(), sqlx::Error> {
        for (key, value, description) in DEFAULT_SETTINGS {
            sqlx::query(
                r#"INSERT OR IGNORE INTO system_settings (id, key, value, description, updated_at)
                   VALUES (?1, ?2, ?3, ?4, ?5)"#,
            )
            .bind(Uuid::new_v4().to_string())
            .bind(key)
            .bind(value)
            .bind(description)
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        }
        Ok(())
    }

    /// Boolean setting; anything but a literal `"false"` counts as enabled.
    pub async fn setting_enabled(&self, key: &str) -> Result<bool, sqlx::Error> {
        Ok(self
            .get_setting(key)
            .await?
            .map(|s| !s.value.trim().eq_ignore_ascii_case("false"))
            .unwrap_or(true))
    }

    /// Positive integer setting, `None` when absent or unparsable.
    pub async fn setting_u64(&self, key: &str) -> Result<Option<u64>, sqlx::Error> {
        Ok(self
            .get_setting(key)
            .await?
            .and_then(|s| s.value.trim().parse::<u64>().ok())
            .filter(|v| *v > 0))
    }
}
