//! Song search across YouTube and Spotify.
//!
//! Each platform sits behind [`MediaSearcher`]. [`SearchService`] fans a
//! query out to the selected platforms under a shared semaphore and a
//! per-call timeout, drops failing platforms with a warning and caps the
//! merged list.

use std::{sync::Arc, time::Duration};

use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::Semaphore;

use crate::{
    config::AppConfig,
    metrics::Metrics,
    types::{SearchPlatform, SearchResult},
};

mod spotify;
mod youtube;

pub use spotify::SpotifySearcher;
pub use youtube::YouTubeSearcher;

/// Results requested from each upstream API per query.
pub const PER_PLATFORM_FETCH: usize = 10;

#[derive(Debug, Error)]
pub enum SearchError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("upstream returned status {0}")]
    Status(u16),
    #[error("unexpected response: {0}")]
    Decode(String),
    #[error("search timed out")]
    Timeout,
}

#[async_trait]
pub trait MediaSearcher: Send + Sync {
    /// Platform tag placed on every result.
    fn platform(&self) -> SearchPlatform;

    /// False when credentials are missing; the service then skips the call.
    fn is_configured(&self) -> bool;

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError>;
}

#[derive(Clone)]
pub struct SearchService {
    searchers: Vec<Arc<dyn MediaSearcher>>,
    permits: Arc<Semaphore>,
    timeout: Duration,
    max_results: usize,
    metrics: Metrics,
}

impl SearchService {
    pub fn new(
        searchers: Vec<Arc<dyn MediaSearcher>>,
        max_concurrent: usize,
        timeout: Duration,
        max_results: usize,
        metrics: Metrics,
    ) -> Self {
        Self { searchers, permits: Arc::new(Semaphore::new(max_concurrent.max(1))), timeout, max_results, metrics }
    }

    pub fn from_config(cfg: &AppConfig, metrics: Metrics) -> Self {
        let timeout = Duration::from_secs(cfg.limits.search_timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("media-dl-manager/", env!("CARGO_PKG_VERSION")))
            .build()
            .unwrap_or_else(|e| {
                tracing::warn!("falling back to default HTTP client: {}", e);
                reqwest::Client::new()
            });
        let searchers: Vec<Arc<dyn MediaSearcher>> = vec![
            Arc::new(YouTubeSearcher::new(client.clone(), &cfg.platforms)),
            Arc::new(SpotifySearcher::new(client, &cfg.platforms)),
        ];
        Self::new(searchers, cfg.limits.max_concurrent_searches, timeout, cfg.limits.max_results_per_platform, metrics)
    }

    /// Never fails: an erroring platform contributes no results.
    pub async fn search(&self, query: &str, platform: SearchPlatform) -> Vec<SearchResult> {
        self.metrics.inc_searches();
        let selected = self
            .searchers
            .iter()
            .filter(|s| platform == SearchPlatform::All || s.platform() == platform)
            .filter(|s| s.is_configured());

        let calls = selected.map(|s| self.search_one(s.clone(), query));
        let per_platform = futures::future::join_all(calls).await;

        let mut results: Vec<SearchResult> = per_platform.into_iter().flatten().collect();
        results.truncate(self.max_results);
        results
    }

    async fn search_one(&self, searcher: Arc<dyn MediaSearcher>, query: &str) -> Vec<SearchResult> {
        let _permit = match self.permits.acquire().await {
            Ok(p) => p,
            Err(_) => return Vec::new(),
        };
        let res = match tokio::time::timeout(self.timeout, searcher.search(query)).await {
            Ok(r) => r,
            Err(_) => Err(SearchError::Timeout),
        };
        match res {
            Ok(items) => items,
            Err(e) => {
                tracing::warn!(platform = ?searcher.platform(), "search failed: {}", e);
                Vec::new()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed {
        platform: SearchPlatform,
        count: usize,
        fail: bool,
        configured: bool,
    }

    #[async_trait]
    impl MediaSearcher for Fixed {
        fn platform(&self) -> SearchPlatform {
            self.platform
        }

        fn is_configured(&self) -> bool {
            self.configured
        }

        async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
            if self.fail {
                return Err(SearchError::Status(500));
            }
            Ok((0..self.count)
                .map(|i| SearchResult {
                    id: format!("{:?}-{}", self.platform, i),
                    title: format!("{} {}", query, i),
                    artist: "artist".into(),
                    duration: None,
                    thumbnail: None,
                    platform: format!("{:?}", self.platform).to_lowercase(),
                    url: format!("https://example.com/{}", i),
                })
                .collect())
        }
    }

    fn service(searchers: Vec<Arc<dyn MediaSearcher>>, max_results: usize) -> SearchService {
        SearchService::new(searchers, 2, Duration::from_secs(1), max_results, Metrics::new())
    }

    fn fixed(platform: SearchPlatform, count: usize, fail: bool) -> Arc<dyn MediaSearcher> {
        Arc::new(Fixed { platform, count, fail, configured: true })
    }

    #[tokio::test]
    async fn merges_and_truncates() {
        let svc = service(vec![fixed(SearchPlatform::Youtube, 10, false), fixed(SearchPlatform::Spotify, 10, false)], 15);
        let results = svc.search("q", SearchPlatform::All).await;
        assert_eq!(results.len(), 15);
        assert_eq!(results[0].platform, "youtube");
        assert_eq!(results[14].platform, "spotify");
    }

    #[tokio::test]
    async fn platform_filter() {
        let svc = service(vec![fixed(SearchPlatform::Youtube, 3, false), fixed(SearchPlatform::Spotify, 4, false)], 20);
        let results = svc.search("q", SearchPlatform::Spotify).await;
        assert_eq!(results.len(), 4);
        assert!(results.iter().all(|r| r.platform == "spotify"));
    }

    #[tokio::test]
    async fn failing_platform_contributes_nothing() {
        let svc = service(vec![fixed(SearchPlatform::Youtube, 3, true), fixed(SearchPlatform::Spotify, 2, false)], 20);
        assert_eq!(svc.search("q", SearchPlatform::All).await.len(), 2);
    }

    #[tokio::test]
    async fn unconfigured_platform_is_skipped() {
        let unconfigured: Arc<dyn MediaSearcher> =
            Arc::new(Fixed { platform: SearchPlatform::Youtube, count: 5, fail: false, configured: false });
        let svc = service(vec![unconfigured], 20);
        assert!(svc.search("q", SearchPlatform::All).await.is_empty());
    }
}
