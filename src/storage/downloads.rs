use uuid::Uuid;

use super::{download_from_row, Storage};
use crate::types::{now_ts, DownloadRequest, DownloadStatus, NewDownload, UpdateDownloadRequest};

/// Column changes applied together with a status transition. `None` keeps
/// the stored value.
#[derive(Debug, Default, Clone)]
pub struct StatusChange {
    pub progress: Option<i64>,
    pub file_name: Option<String>,
    pub file_path: Option<String>,
    pub file_size: Option<i64>,
    pub error_message: Option<String>,
}

fn status_list(statuses: &[DownloadStatus]) -> String {
    statuses.iter().map(|s| format!("'{}'", s.as_str())).collect::<Vec<_>>().join(",")
}

impl Storage {
    pub async fn create_download(&self, new: &NewDownload) -> Result<DownloadRequest, sqlx::Error> {
        let now = now_ts();
        let metadata = new.metadata.as_ref().map(|m| m.to_string());
        let row = sqlx::query(
            r#"INSERT INTO download_requests
                   (id, user_id, api_key_id, url, title, platform, status, progress, metadata, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, 'pending', 0, ?7, ?8, ?8)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(&new.user_id)
        .bind(new.api_key_id.as_deref())
        .bind(&new.url)
        .bind(new.title.as_deref().unwrap_or("Unknown"))
        .bind(new.platform.as_str())
        .bind(metadata)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        download_from_row(&row)
    }

    pub async fn get_download(&self, id: &str) -> Result<Option<DownloadRequest>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM download_requests WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(download_from_row).transpose()
    }

    /// Newest first with the owner's email joined in.
    pub async fn list_downloads(
        &self,
        limit: i64,
        user_id: Option<&str>,
    ) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT d.*, u.email AS user_email
               FROM download_requests d LEFT JOIN users u ON u.id = d.user_id
               WHERE (?1 IS NULL OR d.user_id = ?1)
               ORDER BY d.created_at DESC, d.rowid DESC
               LIMIT ?2"#,
        )
        .bind(user_id)
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(download_from_row).collect()
    }

    /// Moves the row to `next` only if its current status is a legal
    /// predecessor. Returns `false` when the guard did not match.
    pub async fn transition_download(
        &self,
        id: &str,
        next: DownloadStatus,
        change: StatusChange,
    ) -> Result<bool, sqlx::Error> {
        let allowed = DownloadStatus::predecessors(next);
        if allowed.is_empty() {
            return Ok(false);
        }
        let sql = format!(
            r#"UPDATE download_requests SET
                   status = ?2,
                   progress = COALESCE(?3, progress),
                   file_name = COALESCE(?4, file_name),
                   file_path = COALESCE(?5, file_path),
                   file_size = COALESCE(?6, file_size),
                   error_message = COALESCE(?7, error_message),
                   updated_at = ?8
               WHERE id = ?1 AND status IN ({})"#,
            status_list(allowed)
        );
        let res = sqlx::query(&sql)
            .bind(id)
            .bind(next.as_str())
            .bind(change.progress)
            .bind(change.file_name)
            .bind(change.file_path)
            .bind(change.file_size)
            .bind(change.error_message)
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() == 1)
    }

    /// Applies a manual edit, guarded on the status the caller validated
    /// against. `None` when the row vanished or its status moved meanwhile.
    pub async fn update_download(
        &self,
        id: &str,
        expected: DownloadStatus,
        changes: &UpdateDownloadRequest,
    ) -> Result<Option<DownloadRequest>, sqlx::Error> {
        let metadata = changes.metadata.as_ref().map(|m| m.to_string());
        let row = sqlx::query(
            r#"UPDATE download_requests SET
                   title = COALESCE(?3, title),
                   metadata = COALESCE(?4, metadata),
                   status = COALESCE(?5, status),
                   progress = COALESCE(?6, progress),
                   error_message = COALESCE(?7, error_message),
                   updated_at = ?8
               WHERE id = ?1 AND status = ?2
               RETURNING *"#,
        )
        .bind(id)
        .bind(expected.as_str())
        .bind(changes.title.as_deref())
        .bind(metadata)
        .bind(changes.status.map(|s| s.as_str()))
        .bind(changes.progress)
        .bind(changes.error_message.as_deref())
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(download_from_row).transpose()
    }

    pub async fn delete_download(&self, id: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM download_requests WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected() > 0)
    }

    /// Completed downloads created before `cutoff`.
    pub async fn cleanup_candidates(&self, cutoff: &str) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        let rows = sqlx::query(
            r#"SELECT * FROM download_requests
               WHERE status = 'completed' AND created_at < ?1
               ORDER BY created_at"#,
        )
        .bind(cutoff)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(download_from_row).collect()
    }

    /// Rows still pending or in progress, e.g. after an unclean shutdown.
    pub async fn unfinished_downloads(&self) -> Result<Vec<DownloadRequest>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM download_requests WHERE status IN ('pending','in_progress')")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(download_from_row).collect()
    }
}
