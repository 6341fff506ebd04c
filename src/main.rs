use std::net::SocketAddr;
use std::path::PathBuf;

use sqlx::{migrate::MigrateDatabase, sqlite::SqlitePoolOptions, Sqlite};
use tokio::time::{self, Duration as TokioDuration};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use media_dl_manager::{config, db, routes, state::AppState};

const UI_DIR: &str = concat!(env!("CARGO_MANIFEST_DIR"), "/ui");
const SHUTDOWN_GRACE: TokioDuration = TokioDuration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout + daily rotated file under ./logs
    std::fs::create_dir_all("logs").ok();
    let (stdout_nb, stdout_guard) = tracing_appender::non_blocking(std::io::stdout());
    let file_appender = tracing_appender::rolling::daily("logs", "media-dl-manager.log");
    let (file_nb, file_guard) = tracing_appender::non_blocking(file_appender);
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info,tower_http=info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_writer(stdout_nb))
        .with(tracing_subscriber::fmt::layer().with_ansi(false).with_writer(file_nb))
        .init();
    // keep the guards alive so the non-blocking writers flush
    let _log_guards = (stdout_guard, file_guard);

    // embedded defaults -> media-dl-manager.toml -> MEDIADL_CONFIG -> env/.env
    let app_cfg = config::load()?;

    let db_url = &app_cfg.database.url;
    config::ensure_sqlite_parent_dir(db_url)?;
    if !Sqlite::database_exists(db_url).await.unwrap_or(false) {
        info!("Creating SQLite database at {}", db_url);
        Sqlite::create_database(db_url).await?;
    }
    let pool = SqlitePoolOptions::new()
        .max_connections(16)
        .after_connect(|conn, _meta| {
            Box::pin(async move {
                let _ = sqlx::query("PRAGMA foreign_keys=ON;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA busy_timeout=10000;").execute(&mut *conn).await;
                let _ = sqlx::query("PRAGMA temp_store=MEMORY;").execute(&mut *conn).await;
                Ok(())
            })
        })
        .connect(db_url)
        .await?;

    db::init_db(&pool).await?;

    let state = AppState::new(pool.clone(), app_cfg.clone());
    state.storage.seed_default_settings().await?;

    let recovered = state.downloads.recover_interrupted().await?;
    if recovered > 0 {
        info!(recovered, "marked interrupted downloads as failed");
    }

    spawn_maintenance(&state);

    let app = routes::app(state.clone(), ui_root());

    let port: u16 = app_cfg.server.port;
    let host: String = app_cfg.server.host.clone();
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid listen addr {}:{} - {}", host, port, e))?;
    let listener = tokio::net::TcpListener::bind(addr).await?;

    info!("Media DL Manager listening on http://{}", listener.local_addr()?);
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // running jobs record `failed` with "Download cancelled"
    state.downloads.shutdown(SHUTDOWN_GRACE).await;
    pool.close().await;
    Ok(())
}

/// Rate limiter and session sweeps plus the daily `autoCleanup` pass.
fn spawn_maintenance(state: &AppState) {
    {
        let rl = state.rate_limiter.clone();
        let api = state.api_limiter.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(300));
            loop {
                ticker.tick().await;
                rl.cleanup_all().await;
                api.cleanup_old_entries().await;
            }
        });
    }

    {
        let storage = state.storage.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(900));
            loop {
                ticker.tick().await;
                match storage.purge_expired_sessions().await {
                    Ok(0) => {}
                    Ok(n) => tracing::debug!(purged = n, "expired sessions removed"),
                    Err(e) => tracing::warn!("session sweep failed: {}", e),
                }
            }
        });
    }

    {
        let storage = state.storage.clone();
        let downloads = state.downloads.clone();
        tokio::spawn(async move {
            let mut ticker = time::interval(TokioDuration::from_secs(24 * 60 * 60));
            // the first tick fires immediately; skip it
            ticker.tick().await;
            loop {
                ticker.tick().await;
                match storage.setting_enabled("autoCleanup").await {
                    Ok(true) => {
                        if let Err(e) = downloads.cleanup_expired(None).await {
                            tracing::warn!("automatic cleanup failed: {}", e);
                        }
                    }
                    Ok(false) => {}
                    Err(e) => tracing::warn!("reading autoCleanup failed: {}", e),
                }
            }
        });
    }
}

/// `<exe_dir>/ui` when present, else the build-time `ui/` directory.
fn ui_root() -> Option<PathBuf> {
    let runtime_ui = std::env::current_exe()
        .ok()
        .and_then(|p| p.parent().map(|d| d.join("ui")))
        .unwrap_or_else(|| PathBuf::from("ui"));
    if runtime_ui.join("index.html").is_file() {
        return Some(runtime_ui);
    }
    let build_ui = PathBuf::from(UI_DIR);
    if build_ui.join("index.html").is_file() {
        Some(build_ui)
    } else {
        tracing::warn!("no dashboard bundle found; serving the API only");
        None
    }
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => {},
                    _ = term.recv() => {},
                }
            }
            Err(e) => {
                tracing::warn!("SIGTERM handler unavailable: {}", e);
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    info!("Shutdown signal received. Stopping server...");
}
