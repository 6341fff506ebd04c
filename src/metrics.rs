use serde::Serialize;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

/// Process-wide counters, exposed on `/metrics`.
#[derive(Clone)]
pub struct Metrics {
    pub downloads_started: Arc<AtomicUsize>,
    pub downloads_completed: Arc<AtomicUsize>,
    pub downloads_failed: Arc<AtomicUsize>,
    pub api_requests: Arc<AtomicUsize>,
    pub api_rejected: Arc<AtomicUsize>,
    pub searches: Arc<AtomicUsize>,
    pub bytes_downloaded: Arc<AtomicU64>,
    pub start_time: Instant,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            downloads_started: Arc::new(AtomicUsize::new(0)),
            downloads_completed: Arc::new(AtomicUsize::new(0)),
            downloads_failed: Arc::new(AtomicUsize::new(0)),
            api_requests: Arc::new(AtomicUsize::new(0)),
            api_rejected: Arc::new(AtomicUsize::new(0)),
            searches: Arc::new(AtomicUsize::new(0)),
            bytes_downloaded: Arc::new(AtomicU64::new(0)),
            start_time: Instant::now(),
        }
    }

    pub fn inc_downloads_started(&self) {
        self.downloads_started.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_downloads_completed(&self) {
        self.downloads_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_downloads_failed(&self) {
        self.downloads_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_requests(&self) {
        self.api_requests.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_api_rejected(&self) {
        self.api_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn inc_searches(&self) {
        self.searches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add_bytes(&self, bytes: u64) {
        self.bytes_downloaded.fetch_add(bytes, Ordering::Relaxed);
    }

    pub fn get_snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            downloads_started: self.downloads_started.load(Ordering::Relaxed),
            downloads_completed: self.downloads_completed.load(Ordering::Relaxed),
            downloads_failed: self.downloads_failed.load(Ordering::Relaxed),
            api_requests: self.api_requests.load(Ordering::Relaxed),
            api_rejected: self.api_rejected.load(Ordering::Relaxed),
            searches: self.searches.load(Ordering::Relaxed),
            bytes_downloaded: self.bytes_downloaded.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub downloads_started: usize,
    pub downloads_completed: usize,
    pub downloads_failed: usize,
    pub api_requests: usize,
    pub api_rejected: usize,
    pub searches: usize,
    pub bytes_downloaded: u64,
    pub uptime_seconds: u64,
}
