use sqlx::SqlitePool;

pub async fn init_db(pool: &SqlitePool) -> anyhow::Result<()> {
    // Pragmas for better durability/performance
    if let Err(e) = sqlx::query("PRAGMA journal_mode=WAL;").execute(pool).await {
        tracing::warn!("Failed to set WAL journal mode: {}", e);
    }
    if let Err(e) = sqlx::query("PRAGMA synchronous=NORMAL;").execute(pool).await {
        tracing::warn!("Failed to set synchronous mode: {}", e);
    }
    // Foreign keys are critical - fail if this doesn't work
    sqlx::query("PRAGMA foreign_keys=ON;").execute(pool).await?;

    if let Err(e) = sqlx::query("PRAGMA busy_timeout=10000;").execute(pool).await {
        tracing::warn!("Failed to set busy_timeout: {}", e);
    }

    // users table
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS users (
            id TEXT PRIMARY KEY,
            email TEXT UNIQUE,
            first_name TEXT NULL,
            last_name TEXT NULL,
            profile_image_url TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    // sessions table (dashboard logins)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS sessions (
            sid TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            data TEXT NOT NULL DEFAULT '{}',
            expire TEXT NOT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // api_keys table
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS api_keys (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            key TEXT NOT NULL UNIQUE,
            name TEXT NOT NULL,
            is_active INTEGER NOT NULL DEFAULT 1,
            request_count INTEGER NOT NULL DEFAULT 0,
            request_limit INTEGER NOT NULL DEFAULT 10000,
            last_used_at TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE CASCADE
        )"#,
    )
    .execute(pool)
    .await?;

    // download_requests table; a deleted key only clears the reference
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS download_requests (
            id TEXT PRIMARY KEY,
            user_id TEXT NOT NULL,
            api_key_id TEXT NULL,
            url TEXT NOT NULL,
            title TEXT NULL,
            platform TEXT NOT NULL,
            status TEXT NOT NULL DEFAULT 'pending',
            progress INTEGER NOT NULL DEFAULT 0,
            file_size INTEGER NULL,
            file_name TEXT NULL,
            file_path TEXT NULL,
            error_message TEXT NULL,
            metadata TEXT NULL,
            created_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            FOREIGN KEY(user_id) REFERENCES users(id),
            FOREIGN KEY(api_key_id) REFERENCES api_keys(id) ON DELETE SET NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // system_logs table (append-only audit trail)
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS system_logs (
            id TEXT PRIMARY KEY,
            level TEXT NOT NULL,
            message TEXT NOT NULL,
            details TEXT NULL,
            user_id TEXT NULL,
            request_id TEXT NULL,
            timestamp TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now')),
            metadata TEXT NULL,
            FOREIGN KEY(user_id) REFERENCES users(id) ON DELETE SET NULL,
            FOREIGN KEY(request_id) REFERENCES download_requests(id) ON DELETE SET NULL
        )"#,
    )
    .execute(pool)
    .await?;

    // system_settings table
    sqlx::query(
        r#"CREATE TABLE IF NOT EXISTS system_settings (
            id TEXT PRIMARY KEY,
            key TEXT NOT NULL UNIQUE,
            value TEXT NOT NULL,
            description TEXT NULL,
            updated_at TEXT NOT NULL DEFAULT (strftime('%Y-%m-%dT%H:%M:%SZ','now'))
        )"#,
    )
    .execute(pool)
    .await?;

    let indexes = [
        ("idx_sessions_expire", "CREATE INDEX IF NOT EXISTS idx_sessions_expire ON sessions(expire)"),
        ("idx_api_keys_user", "CREATE INDEX IF NOT EXISTS idx_api_keys_user ON api_keys(user_id, created_at DESC)"),
        ("idx_requests_created", "CREATE INDEX IF NOT EXISTS idx_requests_created ON download_requests(created_at DESC)"),
        ("idx_requests_user", "CREATE INDEX IF NOT EXISTS idx_requests_user ON download_requests(user_id, created_at DESC)"),
        ("idx_requests_status", "CREATE INDEX IF NOT EXISTS idx_requests_status ON download_requests(status, updated_at)"),
        ("idx_logs_timestamp", "CREATE INDEX IF NOT EXISTS idx_logs_timestamp ON system_logs(timestamp DESC)"),
        ("idx_logs_level", "CREATE INDEX IF NOT EXISTS idx_logs_level ON system_logs(level, timestamp DESC)"),
    ];

    for (name, query) in indexes {
        if let Err(e) = sqlx::query(query).execute(pool).await {
            match &e {
                sqlx::Error::Database(db_err) => {
                    let msg = db_err.message().to_lowercase();
                    if msg.contains("already exists") || msg.contains("duplicate") {
                        tracing::debug!("Index {} already exists, skipping", name);
                    } else {
                        tracing::warn!("Failed to create index {}: {}", name, e);
                    }
                }
                _ => {
                    tracing::warn!("Failed to create index {}: {}", name, e);
                }
            }
        }
    }

    Ok(())
}
