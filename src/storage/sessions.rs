use super::{random_hex, user_from_row, Storage};
use crate::types::{now_ts, ts_from, User};

impl Storage {
    /// Creates a session for `user_id` valid for `ttl_hours` and returns its id.
    pub async fn create_session(&self, user_id: &str, ttl_hours: u64) -> Result<String, sqlx::Error> {
        let sid = random_hex(32);
        let expire = ts_from(chrono::Utc::now() + chrono::Duration::hours(ttl_hours as i64));
        sqlx::query("INSERT INTO sessions (sid, user_id, expire) VALUES (?1, ?2, ?3)")
            .bind(&sid)
            .bind(user_id)
            .bind(expire)
            .execute(&self.pool)
            .await?;
        Ok(sid)
    }

    /// The user behind an unexpired session.
    pub async fn session_user(&self, sid: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query(
            r#"SELECT u.* FROM sessions s JOIN users u ON u.id = s.user_id
               WHERE s.sid = ?1 AND s.expire > ?2"#,
        )
        .bind(sid)
        .bind(now_ts())
        .fetch_optional(&self.pool)
        .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn delete_session(&self, sid: &str) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM sessions WHERE sid = ?1").bind(sid).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn purge_expired_sessions(&self) -> Result<u64, sqlx::Error> {
        let res = sqlx::query("DELETE FROM sessions WHERE expire <= ?1")
            .bind(now_ts())
            .execute(&self.pool)
            .await?;
        Ok(res.rows_affected())
    }
}
