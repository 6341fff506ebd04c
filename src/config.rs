use std::path::Path;

use serde::Deserialize;

use crate::storage::{MAX_CLEANUP_DAYS, MAX_DOWNLOAD_TIMEOUT_SECS};

#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    /// Take the client IP from `X-Forwarded-For`/`X-Real-IP`. Enable only
    /// behind a reverse proxy that overwrites those headers.
    #[serde(default)]
    pub trust_proxy: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AuthConfig {
    /// Shared secret required by `/api/login`. Login is open when unset.
    pub admin_token: Option<String>,
    pub session_ttl_hours: u64,
    pub cookie_secure: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PlatformsConfig {
    pub youtube_api_key: String,
    pub youtube_api_url: String,
    pub spotify_client_id: String,
    pub spotify_client_secret: String,
    pub spotify_accounts_url: String,
    pub spotify_api_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub download_path: String,
    pub cleanup_days: u32,
}

#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    pub rate_limit_per_minute: usize,
    pub default_request_limit: i64,
    pub max_results_per_platform: usize,
    pub max_concurrent_searches: usize,
    pub search_timeout_secs: u64,
    pub download_timeout_secs: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulationConfig {
    pub step_delay_ms: u64,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct SecurityConfig {
    pub enable_hsts: Option<bool>,
    pub hsts_max_age: Option<u64>,
    pub hsts_include_subdomains: Option<bool>,
    pub csp: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub auth: AuthConfig,
    pub platforms: PlatformsConfig,
    pub storage: StorageConfig,
    pub limits: LimitsConfig,
    pub simulation: SimulationConfig,
    pub security: Option<SecurityConfig>,
}

const DEFAULTS: &str = include_str!("../config/default.toml");

/// Flat variable names understood for compatibility with older deployments.
const LEGACY_ENV: [(&str, &str); 6] = [
    ("YOUTUBE_API_KEY", "platforms.youtube_api_key"),
    ("YOUTUBE_API_URL", "platforms.youtube_api_url"),
    ("SPOTIFY_CLIENT_ID", "platforms.spotify_client_id"),
    ("SPOTIFY_CLIENT_SECRET", "platforms.spotify_client_secret"),
    ("DOWNLOAD_PATH", "storage.download_path"),
    ("RATE_LIMIT_PER_MINUTE", "limits.rate_limit_per_minute"),
];

impl Default for AppConfig {
    fn default() -> Self {
        // Fallback: parse the embedded default TOML
        match ::config::Config::builder()
            .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
            .build()
        {
            Ok(cfg) => match cfg.try_deserialize() {
                Ok(app_cfg) => app_cfg,
                Err(e) => {
                    eprintln!("FATAL: Failed to deserialize default config: {}", e);
                    panic!("Failed to deserialize default config: {}", e);
                }
            },
            Err(e) => {
                eprintln!("FATAL: Failed to parse default config: {}", e);
                panic!("Failed to parse default config: {}", e);
            }
        }
    }
}

impl AuthConfig {
    /// Returns the configured admin token, treating an empty string as unset.
    pub fn admin_token(&self) -> Option<&str> {
        self.admin_token.as_deref().map(str::trim).filter(|t| !t.is_empty())
    }
}

impl PlatformsConfig {
    pub fn youtube_enabled(&self) -> bool {
        !self.youtube_api_key.trim().is_empty()
    }

    pub fn spotify_enabled(&self) -> bool {
        !self.spotify_client_id.trim().is_empty() && !self.spotify_client_secret.trim().is_empty()
    }
}

pub fn load() -> anyhow::Result<AppConfig> {
    // Load .env first (optional)
    let _ = dotenvy::dotenv();
    let custom_path = std::env::var("MEDIADL_CONFIG").ok();
    load_layered(custom_path.as_deref(), true)
}

/// Embedded defaults, then `media-dl-manager.toml` in the CWD, then
/// `extra_file`. With `with_env` the `MEDIADL__*` and legacy flat variables
/// are applied last.
pub fn load_layered(extra_file: Option<&str>, with_env: bool) -> anyhow::Result<AppConfig> {
    let mut builder = ::config::Config::builder()
        .add_source(::config::File::from_str(DEFAULTS, ::config::FileFormat::Toml))
        .add_source(::config::File::with_name("media-dl-manager").required(false));

    if let Some(path) = extra_file {
        builder = builder.add_source(::config::File::with_name(path).required(false));
    }

    if with_env {
        builder = builder.add_source(::config::Environment::with_prefix("MEDIADL").separator("__"));
        // legacy flat variables win over everything else
        for (var, key) in LEGACY_ENV {
            let value = std::env::var(var).ok().filter(|v| !v.trim().is_empty());
            builder = builder.set_override_option(key, value)?;
        }
    }

    let app_cfg: AppConfig = builder.build()?.try_deserialize()?;
    validate(&app_cfg)?;
    Ok(app_cfg)
}

pub fn validate(cfg: &AppConfig) -> anyhow::Result<()> {
    // Server
    if cfg.server.port == 0 {
        return Err(anyhow::anyhow!("invalid server.port: {}", cfg.server.port));
    }
    #[cfg(unix)]
    if cfg.server.port < 1024 {
        tracing::warn!("Using privileged port {} - may require elevated permissions", cfg.server.port);
    }

    // Auth
    if cfg.auth.session_ttl_hours == 0 {
        return Err(anyhow::anyhow!("auth.session_ttl_hours must be > 0"));
    }

    // Storage
    if cfg.storage.download_path.trim().is_empty() {
        return Err(anyhow::anyhow!("storage.download_path must not be empty"));
    }

    // Limits
    if cfg.limits.rate_limit_per_minute == 0 {
        return Err(anyhow::anyhow!("limits.rate_limit_per_minute must be > 0"));
    }
    if cfg.limits.default_request_limit < 1 {
        return Err(anyhow::anyhow!("limits.default_request_limit must be >= 1"));
    }
    if cfg.limits.max_concurrent_searches == 0 || cfg.limits.max_concurrent_searches > 64 {
        return Err(anyhow::anyhow!("limits.max_concurrent_searches must be in 1..=64"));
    }
    if cfg.limits.max_results_per_platform == 0 {
        return Err(anyhow::anyhow!("limits.max_results_per_platform must be > 0"));
    }
    if cfg.limits.search_timeout_secs == 0 {
        return Err(anyhow::anyhow!("limits.search_timeout_secs must be > 0"));
    }
    if cfg.limits.download_timeout_secs == 0 || cfg.limits.download_timeout_secs > MAX_DOWNLOAD_TIMEOUT_SECS {
        return Err(anyhow::anyhow!("limits.download_timeout_secs must be in 1..={}", MAX_DOWNLOAD_TIMEOUT_SECS));
    }
    if u64::from(cfg.storage.cleanup_days) > MAX_CLEANUP_DAYS {
        return Err(anyhow::anyhow!("storage.cleanup_days must be <= {}", MAX_CLEANUP_DAYS));
    }

    Ok(())
}

pub fn ensure_sqlite_parent_dir(url: &str) -> anyhow::Result<()> {
    if let Some(path) = url.strip_prefix("sqlite://") {
        // sqlite:///C:/... on Windows carries a leading '/' before the drive letter
        #[cfg(windows)]
        let path = {
            let bytes = path.as_bytes();
            if bytes.len() >= 3 && bytes[0] == b'/' && bytes[2] == b':' && bytes[1].is_ascii_alphabetic() {
                &path[1..]
            } else {
                path
            }
        };
        let p = Path::new(path);
        if let Some(parent) = p.parent() {
            std::fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}
