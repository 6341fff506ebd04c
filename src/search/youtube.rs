use async_trait::async_trait;
use serde::Deserialize;

use super::{MediaSearcher, SearchError, PER_PLATFORM_FETCH};
use crate::{
    config::PlatformsConfig,
    types::{SearchPlatform, SearchResult},
};

/// YouTube Data API v3 `search.list`, restricted to the Music category.
pub struct YouTubeSearcher {
    client: reqwest::Client,
    api_key: String,
    api_url: String,
}

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    items: Vec<Item>,
}

#[derive(Debug, Deserialize)]
struct Item {
    id: ItemId,
    snippet: Snippet,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ItemId {
    video_id: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Snippet {
    title: String,
    #[serde(default)]
    channel_title: String,
    thumbnails: Option<Thumbnails>,
}

#[derive(Debug, Deserialize)]
struct Thumbnails {
    default: Option<Thumbnail>,
}

#[derive(Debug, Deserialize)]
struct Thumbnail {
    url: String,
}

impl YouTubeSearcher {
    pub fn new(client: reqwest::Client, cfg: &PlatformsConfig) -> Self {
        Self {
            client,
            api_key: cfg.youtube_api_key.trim().to_string(),
            api_url: cfg.youtube_api_url.trim_end_matches('/').to_string(),
        }
    }

    fn map_response(body: SearchResponse) -> Vec<SearchResult> {
        body.items
            .into_iter()
            .filter_map(|item| {
                // channel and playlist hits carry no videoId
                let video_id = item.id.video_id?;
                Some(SearchResult {
                    url: format!("https://www.youtube.com/watch?v={}", video_id),
                    id: video_id,
                    title: item.snippet.title,
                    artist: item.snippet.channel_title,
                    duration: None,
                    thumbnail: item.snippet.thumbnails.and_then(|t| t.default).map(|t| t.url),
                    platform: "youtube".into(),
                })
            })
            .collect()
    }
}

#[async_trait]
impl MediaSearcher for YouTubeSearcher {
    fn platform(&self) -> SearchPlatform {
        SearchPlatform::Youtube
    }

    fn is_configured(&self) -> bool {
        !self.api_key.is_empty()
    }

    async fn search(&self, query: &str) -> Result<Vec<SearchResult>, SearchError> {
        let max_results = PER_PLATFORM_FETCH.to_string();
        let resp = self
            .client
            .get(format!("{}/search", self.api_url))
            .query(&[
                ("part", "snippet"),
                ("type", "video"),
                ("videoCategoryId", "10"),
                ("maxResults", max_results.as_str()),
                ("q", query),
                ("key", self.api_key.as_str()),
            ])
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(SearchError::Status(resp.status().as_u16()));
        }
        let body: SearchResponse = resp.json().await.map_err(|e| SearchError::Decode(e.to_string()))?;
        Ok(Self::map_response(body))
    }
}
