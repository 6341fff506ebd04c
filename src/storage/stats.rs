use sqlx::Row;

use super::Storage;
use crate::types::{start_of_today, DownloadStats, StorageStats, UserStats};

impl Storage {
    pub async fn user_stats(&self) -> Result<UserStats, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT
                   (SELECT COUNT(*) FROM users) AS total_users,
                   (SELECT COUNT(*) FROM api_keys WHERE is_active = 1) AS active_api_keys,
                   (SELECT COUNT(*) FROM download_requests WHERE created_at >= ?1) AS requests_today,
                   (SELECT COUNT(*) FROM api_keys WHERE request_count >= request_limit) AS rate_limited"#,
        )
        .bind(start_of_today())
        .fetch_one(&self.pool)
        .await?;
        Ok(UserStats {
            total_users: row.try_get("total_users")?,
            active_api_keys: row.try_get("active_api_keys")?,
            requests_today: row.try_get("requests_today")?,
            rate_limited: row.try_get("rate_limited")?,
        })
    }

    pub async fn download_stats(&self) -> Result<DownloadStats, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT
                   COUNT(*) AS total,
                   COALESCE(SUM(status = 'pending'), 0) AS pending,
                   COALESCE(SUM(status = 'in_progress'), 0) AS in_progress,
                   COALESCE(SUM(status = 'completed'), 0) AS completed,
                   COALESCE(SUM(status = 'completed' AND updated_at >= ?1), 0) AS completed_today,
                   COALESCE(SUM(status = 'failed'), 0) AS failed
               FROM download_requests"#,
        )
        .bind(start_of_today())
        .fetch_one(&self.pool)
        .await?;
        Ok(DownloadStats {
            total: row.try_get("total")?,
            pending: row.try_get("pending")?,
            in_progress: row.try_get("in_progress")?,
            completed: row.try_get("completed")?,
            completed_today: row.try_get("completed_today")?,
            failed: row.try_get("failed")?,
        })
    }

    /// Completed downloads only. `cutoff` is the creation timestamp before
    /// which a file counts as cleanup-eligible.
    pub async fn storage_stats(&self, cutoff: &str, cleanup_days: i64) -> Result<StorageStats, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT
                   COUNT(*) AS total_files,
                   COALESCE(SUM(file_size), 0) AS total_size,
                   COALESCE(SUM(created_at < ?1), 0) AS cleanup_eligible
               FROM download_requests WHERE status = 'completed'"#,
        )
        .bind(cutoff)
        .fetch_one(&self.pool)
        .await?;
        Ok(StorageStats {
            total_files: row.try_get("total_files")?,
            total_size: row.try_get("total_size")?,
            cleanup_eligible: row.try_get("cleanup_eligible")?,
            cleanup_days,
        })
    }
}
