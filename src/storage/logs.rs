use uuid::Uuid;

use super::{log_from_row, Storage};
use crate::types::{now_ts, LogLevel, NewLog, SystemLog};

impl Storage {
    pub async fn create_log(&self, log: &NewLog) -> Result<SystemLog, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO system_logs (id, level, message, details, user_id, request_id, timestamp, metadata)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(log.level.as_str())
        .bind(&log.message)
        .bind(log.details.as_deref())
        .bind(log.user_id.as_deref())
        .bind(log.request_id.as_deref())
        .bind(now_ts())
        .bind(log.metadata.as_ref().map(|m| m.to_string()))
        .fetch_one(&self.pool)
        .await?;
        log_from_row(&row)
    }

    /// Writes an audit entry; a failure is traced and otherwise ignored so
    /// the action being audited still succeeds.
    pub async fn audit(&self, log: NewLog) {
        if let Err(e) = self.create_log(&log).await {
            tracing::warn!(message = %log.message, "Failed to write system log: {}", e);
        }
    }

    pub async fn list_logs(&self, limit: i64, level: Option<LogLevel>) -> Result<Vec<SystemLog>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT l.*, u.email AS user_email
               FROM system_logs l LEFT JOIN users u ON u.id = l.user_id
               WHERE (?1 IS NULL OR l.level = ?1)
               ORDER BY l.timestamp DESC, l.rowid DESC
               LIMIT ?2"#,
        )
        .bind(level.map(|l| l.as_str()))
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(log_from_row).collect()
    }
}
