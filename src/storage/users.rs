use uuid::Uuid;

use super::{user_from_row, Storage};
use crate::types::{now_ts, User};

impl Storage {
    pub async fn get_user(&self, id: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM users WHERE id = ?1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    pub async fn get_user_by_email(&self, email: &str) -> Result<Option<User>, sqlx::Error> {
        let row = sqlx::query("SELECT * FROM users WHERE email = ?1")
            .bind(email)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(user_from_row).transpose()
    }

    /// Inserts the user or refreshes the profile fields of the existing row
    /// with the same email. Absent profile fields keep their stored values.
    pub async fn upsert_user(
        &self,
        email: &str,
        first_name: Option<&str>,
        last_name: Option<&str>,
        profile_image_url: Option<&str>,
    ) -> Result<User, sqlx::Error> {
        let now = now_ts();
        let row = sqlx::query(
            r#"INSERT INTO users (id, email, first_name, last_name, profile_image_url, created_at, updated_at)
               VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
               ON CONFLICT(email) DO UPDATE SET
                   first_name = COALESCE(excluded.first_name, users.first_name),
                   last_name = COALESCE(excluded.last_name, users.last_name),
                   profile_image_url = COALESCE(excluded.profile_image_url, users.profile_image_url),
                   updated_at = excluded.updated_at
               RETURNING *"#,
        )
        .bind(Uuid::new_v4().to_string())
        .bind(email)
        .bind(first_name)
        .bind(last_name)
        .bind(profile_image_url)
        .bind(&now)
        .fetch_one(&self.pool)
        .await?;
        user_from_row(&row)
    }
}
