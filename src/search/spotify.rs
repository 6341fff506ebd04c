use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::Mutex;

use super::{MediaSearcher, SearchError, PER_PLATFORM_FETCH};
use crate::{
    config::PlatformsConfig,
    types::{SearchPlatform, SearchResult},
};

/// Spotify Web API track search with a client-credentials token that is
/// reused until shortly before it expires.
pub struct SpotifySearcher {
    client: reqwest::Client,
    client_id: String,
    client_secret: String,
    accounts_url: String,
    api_url: String,
    token: Mutex<Option<(String, Instant)>>,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default = "default_expiry")]
    expires_in: u64,
}

fn default_expiry() -> u64 {
    3600
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    tracks: Tracks,
}

#[derive(Debug, Deserialize)]
struct Tracks {
    #[serde(default)]
    items: Vec<Track>,
}

#[derive(Debug, Deserialize)]
struct Track {
    id: String,
    name: String,
    #[serde(default)]
    artists: Vec<Artist>,
    duration_ms: u64,
    album: Option<Album>,
    external_urls: ExternalUrls,
}

#[derive(Debug, Deserialize)]
struct Artist {
    name: String,
}

#[derive(Debug, Deserialize)]
struct Album {
    #[serde(default)]
    images: Vec<Image>,
}

#[derive(Debug, Deserialize)]
struct Image {
    url: String,
}

#[derive(Debug, Deserialize)]
struct ExternalUrls {
    spotify: String,
}

/// `m:ss`, e.g. 213_000 ms is `3:33`.
fn format_duration(ms: u64) -> String {
    format!("{}:{:02}", ms / 60_000, (ms % 60_000) / 1000)
}

impl SpotifySearcher {
    pub fn new(client: reqwest::Client, cfg: &PlatformsConfig) -> Self {
        Self {
            client,
            client_id: cfg.spotify_client_id.trim().to_string(),
            client_secret: cfg.spotify_client_secret.trim().to_string(),
            accounts_url: cfg.spotify_accounts_url.clone(),
            api_url: cfg.spotify_api_url.trim_end_matches('/').to_string(),
            token: Mutex::new(None),
        }
    }

    async fn access_token(&self) -> Result<String, SearchError> {
        let mut cached = self.token.lock().await;
        if let Some((token, expires)) = cached.as_ref() {
            if Instant::now() < *expires {
                return Ok(token.clone());
            }
        }

        let resp = self
            .client
            .post(&self.accounts_url)
            .basic_auth(&self.client_id, Some(&self.client_secret))
            .form(&[("grant_type", "client_credentials")])
            .send()
            .await?;
        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        let body: TokenResponse = resp.json().await.map_err(|e| SearchError::Decode(e.to_string()))?;

        // refresh a minute early
        let ttl = Duration::from_secs(body.expires_in.saturating_sub(60).max(1));
        *cached = Some((body.access_token.clone(), Instant::now() + ttl));
        Ok(body.access_token)
    }

    fn map_response(body: SearchResponse) -> Vec<SearchResult> {
        body.tracks
            .items
            .into_iter()
            .map(|track| SearchResult {
                id: track.id,
                title: track.name,
                artist: track.artists.iter().map(|a| a.name.as_str()).collect::<Vec<_>>().join(", "),
                duration: Some(format_duration(track.duration_ms)),
                // smallest of Spotify's three album sizes
                thumbnail: track.album.and_then(|a| a.images.into_iter().nth(2)).map(|i| i.url),
                platform: "spotify".into(),
                url: track.external_urls.spotify,
            })
            .collect()
    }
}

#[async_trait]
impl MediaSearcher for SpotifySearcher {
    fn platform(&self) -> SearchPlatform {
        SearchPlatform::Spotify
    }

    fn is_configured(&self) -> bool {
        !self.client_id.is_empty() && !self.client_secret.is_empty()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let token = self.access_token().await?;
        let limit = PER_PLATFORM_FETCH.to_string();
        let resp = self
            .client
            .get(format!("{}/search", self.api_url))
            .bearer_auth(token)
            .query(&[("q", query), ("type", "track"), ("limit", limit.as_str())])
            .send()
            .await?;

        if resp.status() == reqwest::StatusCode::UNAUTHORIZED {
            // token revoked early; fetch a new one next time
            *self.token.lock().await = None;
        }
        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        let body: SearchResponse = resp.json().await.map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(Self::map_response(body))
    }
}
