use uuid::Uuid;

use super::{api_key_from_row, random_hex, Storage};
use crate::types::{now_ts, ApiKey, UpdateApiKeyRequest};

/// Secret format: `sk-` followed by 32 random bytes in hex.
pub fn generate_key_secret() -> String {
    format!("sk-{}", random_hex(32))
}

impl Storage {
    pub async fn list_api_keys(&self, user_id: &str) -> Result<Vec<ApiKey>, sqlx::Error> {
        let rows = sqlx::query("SELECT * FROM api_keys WHERE user_id = ?1 ORDER BY created_at DESC, rowid DESC")
            .bind(user_id)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(api_key_from_row).collect()
    }

    pub async fn get_api_key(&self, id: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    pub async fn find_api_key(&self, secret: &str) -> Result<Option<ApiKey>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM api_keys WHERE key = ?1")
            .bind(secret)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    pub async fn create_api_key(
        &self,
        user_id: &str,
        name: &str,
        request_limit: i64,
        is_active: bool,
    ) -> Result<ApiKey, sqlx::Error> {
        let row = sqlx::query(
            r#"INSERT INTO api_keys (id, user_id, key, name, is_active, request_limit, created_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
               RETURNING *"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(user_id)
        .bind(generate_key_secret())
        .bind(name)
        .bind(is_active)
        .bind(request_limit)
        .bind(now_ts())
        .fetch_one(&self.pool)
        .await?;
        api_key_from_row(&row)
    }

    pub async fn update_api_key(&self, id: &str, changes: &UpdateApiKeyRequest) -> Result<Option<ApiKey>, sqlx::Error> {
        let row = sqlx::query(
            r#"UPDATE api_keys SET
                   name = COALESCE(?2, name),
                   is_active = COALESCE(?3, is_active),
                   request_limit = COALESCE(?4, request_limit)
               WHERE id = ?1
               RETURNING *"#,
        )
        .bind(id)
        .bind(changes.name.as_deref())
        .bind(changes.is_active)
        .bind(changes.request_limit)
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(api_key_from_row).transpose()
    }

    /// Deletes the key. Download requests that used it keep their rows with
    /// `api_key_id` set to NULL.
    pub async fn delete_api_key(&self, id: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query("DELETE FROM api_keys WHERE id = ?1").bind(id).execute(&self.pool).await?;
        Ok(res.rows_affected() > 0)
    }

    /// Counts one external call against the key. Returns `false` when the key
    /// is inactive or already at its limit; the check and the increment are a
    /// single statement.
    pub async fn try_consume_api_key(&self, id: &str) -> Result<bool, sqlx::Error> {
        let res = sqlx::query(
            r#"UPDATE api_keys
               SET request_count = request_count + 1, last_used_at = ?2
               WHERE id = ?1 AND is_active = 1 AND request_count < request_limit"#,
        )
        .bind(id)
        .bind(now_ts())
        .execute(&self.pool)
        .await?;
        Ok(res.rows_affected() == 1)
    }
}
