//! LRCLIB API client
//!
//! LRCLIB is a free lyrics API that provides synchronized (LRC format) lyrics.
//! API Documentation: https://lrclib.net/docs

use super::{LyricsFetcher, LyricsOutcome, text};
use crate::config::LyricsConfig;
use anyhow::Context;
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Deserialize;
use std::time::Duration;

/// LRCLIB API response
#[derive(Debug, Deserialize, Clone)]
pub struct LrclibResponse {
    #[serde(rename = "plainLyrics")]
    pub plain_lyrics: Option<String>,
    #[serde(rename = "syncedLyrics")]
    pub synced_lyrics: Option<String>,
    #[serde(default)]
    pub instrumental: bool,
}

impl LrclibResponse {
    /// Plain lyrics preferred, synced as fallback. Instrumental entries have
    /// nothing to detect.
    fn into_text(self) -> Option<String> {
        if self.instrumental {
            return None;
        }
        [self.plain_lyrics, self.synced_lyrics]
            .into_iter()
            .flatten()
            .map(|raw| text::plain_text(&raw))
            .find(|t| !t.is_empty())
    }
}

/// LRCLIB API client
#[derive(Debug, Clone)]
pub struct LrclibClient {
    client: reqwest::Client,
    base_url: String,
}

/// What one HTTP round trip produced before fallbacks.
enum Lookup {
    Hit(String),
    Miss,
    Transient(LyricsOutcome),
}

impl LrclibClient {
    const USER_AGENT: &'static str = concat!("songlang/", env!("CARGO_PKG_VERSION"));

    pub fn new(cfg: &LyricsConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent(Self::USER_AGENT)
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build lrclib client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Get lyrics with exact match
    async fn get_exact(&self, track_name: &str, artist_name: &str) -> anyhow::Result<Lookup> {
        let url = format!(
            "{}/get?track_name={}&artist_name={}",
            self.base_url,
            urlencoding::encode(track_name),
            urlencoding::encode(artist_name)
        );

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return transient_or_err(e),
        };
        if let Some(lookup) = classify_status(response.status()) {
            return Ok(lookup);
        }
        let lyrics: LrclibResponse = response.json().await.context("parse lrclib get")?;
        Ok(lyrics.into_text().map_or(Lookup::Miss, Lookup::Hit))
    }

    /// Search for lyrics
    async fn search(&self, track_name: &str, artist_name: &str) -> anyhow::Result<Lookup> {
        let query = format!("{} {}", track_name, artist_name);
        let url = format!("{}/search?q={}", self.base_url, urlencoding::encode(&query));

        let response = match self.client.get(&url).send().await {
            Ok(r) => r,
            Err(e) => return transient_or_err(e),
        };
        if let Some(lookup) = classify_status(response.status()) {
            return Ok(lookup);
        }
        let results: Vec<LrclibResponse> = response.json().await.context("parse lrclib search")?;
        Ok(results
            .into_iter()
            .find_map(LrclibResponse::into_text)
            .map_or(Lookup::Miss, Lookup::Hit))
    }
}

#[async_trait]
impl LyricsFetcher for LrclibClient {
    async fn fetch_lyrics(
        &self,
        title: &str,
        primary_artist: &str,
    ) -> anyhow::Result<LyricsOutcome> {
        // First try the "get" endpoint with exact match, then search.
        match self.get_exact(title, primary_artist).await? {
            Lookup::Hit(text) => return Ok(LyricsOutcome::Found(text)),
            Lookup::Transient(outcome) => return Ok(outcome),
            Lookup::Miss => {}
        }
        Ok(match self.search(title, primary_artist).await? {
            Lookup::Hit(text) => LyricsOutcome::Found(text),
            Lookup::Transient(outcome) => outcome,
            Lookup::Miss => LyricsOutcome::NotFound,
        })
    }
}

/// `None` means the body should be read.
fn classify_status(status: StatusCode) -> Option<Lookup> {
    if status.is_success() {
        None
    } else if status == StatusCode::NOT_FOUND {
        Some(Lookup::Miss)
    } else if status == StatusCode::TOO_MANY_REQUESTS {
        Some(Lookup::Transient(LyricsOutcome::RateLimited))
    } else if status.is_server_error() || status == StatusCode::REQUEST_TIMEOUT {
        Some(Lookup::Transient(LyricsOutcome::Timeout))
    } else {
        // Other client errors will not improve on retry.
        Some(Lookup::Miss)
    }
}

fn transient_or_err(e: reqwest::Error) -> anyhow::Result<Lookup> {
    if e.is_timeout() || e.is_connect() {
        Ok(Lookup::Transient(LyricsOutcome::Timeout))
    } else {
        Err(anyhow::Error::new(e).context("lrclib request"))
    }
}
