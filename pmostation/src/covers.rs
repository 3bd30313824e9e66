//! Album art lookup through the iTunes search API

use crate::config::CoverConfig;
use crate::error::Result;
use crate::traits::CoverArtLookup;
use async_trait::async_trait;
use pmoicy::NowPlaying;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Default timeout for a search request
pub const DEFAULT_LOOKUP_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    results: Vec<SearchResult>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SearchResult {
    artwork_url100: Option<String>,
}

/// `CoverArtLookup` returning the `artworkUrl100` of the first iTunes hit
/// for "artist title"
#[derive(Debug, Clone)]
pub struct ItunesCoverLookup {
    client: Client,
    search_url: Url,
}

impl ItunesCoverLookup {
    pub fn new(config: &CoverConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(DEFAULT_LOOKUP_TIMEOUT_SECS))
            .build()?;
        Self::with_client(client, &config.search_url)
    }

    pub fn with_client(client: Client, search_url: &str) -> Result<Self> {
        Ok(Self {
            client,
            search_url: Url::parse(search_url)?,
        })
    }
}

#[async_trait]
impl CoverArtLookup for ItunesCoverLookup {
    async fn lookup(&self, track: &NowPlaying) -> Result<Option<String>> {
        let term = format!("{} {}", track.artist, track.title);
        let mut url = self.search_url.clone();
        url.query_pairs_mut().append_pair("term", term.trim());

        debug!(term = %term, "Searching album art");
        let response: SearchResponse = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(response
            .results
            .into_iter()
            .next()
            .and_then(|r| r.artwork_url100)
            .filter(|art| !art.is_empty()))
    }
}
