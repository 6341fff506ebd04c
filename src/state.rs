use std::{collections::HashMap, sync::Arc};

use tokio::sync::{broadcast, RwLock};
use tokio_util::sync::CancellationToken;

use crate::config::AppConfig;
use crate::downloads::DownloadService;
use crate::metrics::Metrics;
use crate::middleware::{EndpointRateLimiter, RateLimiter};
use crate::search::SearchService;
use crate::storage::Storage;
use crate::types::DownloadEvent;

/// A handle to a running download job.
#[derive(Clone)]
pub struct JobHandle {
    /// Cancelled when the request is deleted or the server shuts down.
    pub cancel: CancellationToken,
    /// Progress events for SSE subscribers.
    pub sender: broadcast::Sender<DownloadEvent>,
}

/// Running jobs keyed by download request id.
pub type JobRegistry = Arc<RwLock<HashMap<String, JobHandle>>>;

/// The shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::SqlitePool,
    pub storage: Storage,
    pub jobs: JobRegistry,
    pub config: Arc<AppConfig>,
    pub metrics: Metrics,
    pub downloads: DownloadService,
    pub search: SearchService,
    /// Per-IP limiter for the public API (`limits.rate_limit_per_minute`).
    pub api_limiter: RateLimiter,
    /// Tighter per-endpoint limits for login and search.
    pub rate_limiter: EndpointRateLimiter,
}

impl AppState {
    pub fn new(db: sqlx::SqlitePool, config: AppConfig) -> Self {
        let config = Arc::new(config);
        let storage = Storage::new(db.clone());
        let metrics = Metrics::new();
        let jobs: JobRegistry = Arc::new(RwLock::new(HashMap::new()));

        let downloads = DownloadService::new(storage.clone(), config.clone(), metrics.clone(), jobs.clone());
        let search = SearchService::from_config(&config, metrics.clone());

        let api_limiter = RateLimiter::new(config.limits.rate_limit_per_minute, 60);
        let rate_limiter = EndpointRateLimiter::new().with_limits(vec![
            ("/api/login", 10, 60),  // 10 login attempts per minute
            ("/api/search", 60, 60), // 60 dashboard searches per minute
        ]);

        Self { db, storage, jobs, config, metrics, downloads, search, api_limiter, rate_limiter }
    }
}
