//! Lyrics lookup for language detection
//!
//! This module provides:
//! - the `LyricsFetcher` boundary the resolver depends on
//! - LRCLIB API client implementing it
//! - cleanup of LRC/plain lyrics into detectable text

pub mod lrclib;
pub mod text;

pub use lrclib::LrclibClient;

use async_trait::async_trait;

/// Result of one lyrics lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LyricsOutcome {
    Found(String),
    NotFound,
    /// Retryable.
    RateLimited,
    /// Retryable.
    Timeout,
}

impl LyricsOutcome {
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::RateLimited | Self::Timeout)
    }
}

/// `Err` is reserved for unexpected failures such as malformed payloads.
#[async_trait]
pub trait LyricsFetcher: Send + Sync {
    async fn fetch_lyrics(&self, title: &str, primary_artist: &str)
    -> anyhow::Result<LyricsOutcome>;
}
