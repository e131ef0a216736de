//! In-memory collaborators shared by the resolver, pipeline and validator
//! tests.

use crate::classify::{Resolver, aggregate};
use crate::config::Config;
use crate::detect::{Detection, TextDetector};
use crate::lyrics::{LyricsFetcher, LyricsOutcome};
use crate::model::{Artist, ClassificationSource, LanguageLabel, Song, StreamingHistoryEntry};
use crate::storage::{Listing, Repository, SqliteRepository};
use async_trait::async_trait;
use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

pub fn lang(code: &str) -> LanguageLabel {
    LanguageLabel::Language(code.into())
}

/// Defaults with millisecond backoff.
pub fn test_config() -> Config {
    let mut cfg = Config::default();
    cfg.retry.base_delay_ms = 1;
    cfg.retry.max_delay_ms = 4;
    cfg
}

pub struct FakeLyrics {
    queue: Mutex<VecDeque<LyricsOutcome>>,
    fallback: LyricsOutcome,
    error: Option<&'static str>,
    calls: AtomicUsize,
}

impl FakeLyrics {
    pub fn always(outcome: LyricsOutcome) -> Self {
        Self::sequence_then(Vec::new(), outcome)
    }

    /// Plays `outcomes` in order, then reports NotFound.
    pub fn sequence(outcomes: Vec<LyricsOutcome>) -> Self {
        Self::sequence_then(outcomes, LyricsOutcome::NotFound)
    }

    /// Every call returns `Err(message)`.
    pub fn failing(message: &'static str) -> Self {
        Self {
            error: Some(message),
            ..Self::always(LyricsOutcome::NotFound)
        }
    }

    fn sequence_then(outcomes: Vec<LyricsOutcome>, fallback: LyricsOutcome) -> Self {
        Self {
            queue: Mutex::new(outcomes.into()),
            fallback,
            error: None,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl LyricsFetcher for FakeLyrics {
    async fn fetch_lyrics(&self, _title: &str, _artist: &str) -> anyhow::Result<LyricsOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(message) = self.error {
            anyhow::bail!(message);
        }
        let next = self.queue.lock().unwrap().pop_front();
        Ok(next.unwrap_or_else(|| self.fallback.clone()))
    }
}

/// Answers by exact text, Unknown for anything else.
pub struct FakeDetector {
    answers: HashMap<String, Detection>,
    calls: AtomicUsize,
}

impl FakeDetector {
    pub fn unknown() -> Self {
        Self::by_text(&[])
    }

    pub fn by_text(answers: &[(&str, Detection)]) -> Self {
        Self {
            answers: answers
                .iter()
                .map(|(text, d)| (text.to_string(), d.clone()))
                .collect(),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl TextDetector for FakeDetector {
    async fn detect(&self, text: &str) -> anyhow::Result<Detection> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.answers.get(text).cloned().unwrap_or(Detection::Unknown))
    }
}

pub struct Fixture {
    pub repo: Arc<SqliteRepository>,
    pub lyrics: Arc<FakeLyrics>,
    pub detector: Arc<FakeDetector>,
    pub resolver: Arc<Resolver>,
}

impl Fixture {
    pub fn new(lyrics: FakeLyrics, detector: FakeDetector) -> Self {
        Self::with_config(test_config(), lyrics, detector)
    }

    pub fn with_config(cfg: Config, lyrics: FakeLyrics, detector: FakeDetector) -> Self {
        let repo = Arc::new(SqliteRepository::open_in_memory().unwrap());
        let lyrics = Arc::new(lyrics);
        let detector = Arc::new(detector);
        let resolver =
            Resolver::new(&cfg, repo.clone(), lyrics.clone(), detector.clone()).unwrap();
        Self {
            repo,
            lyrics,
            detector,
            resolver: Arc::new(resolver),
        }
    }

    pub fn artist(&self, id: &str, name: &str) -> Artist {
        let artist = Artist::new(id, name);
        self.repo.put_artist(&artist).unwrap();
        artist
    }

    pub fn song(&self, id: &str, title: &str, artists: &[&str]) -> Song {
        let song = Song::new(id, title, artists.iter().map(|a| a.to_string()).collect());
        self.repo.put_song(&song).unwrap();
        song
    }

    pub fn classified_song(
        &self,
        id: &str,
        artists: &[&str],
        label: LanguageLabel,
        classified_at: i64,
    ) -> Song {
        let mut song = Song::new(id, id, artists.iter().map(|a| a.to_string()).collect());
        song.is_soundtrack = label.is_soundtrack();
        song.classification_source = Some(if label.is_soundtrack() {
            ClassificationSource::Soundtrack
        } else {
            ClassificationSource::TitleDetector
        });
        song.language = label;
        song.classified_at = Some(classified_at);
        self.repo.put_song(&song).unwrap();
        song
    }

    /// Bring an artist's stored aggregate in line with its songs.
    pub fn refresh_artist(&self, id: &str) {
        let mut artist = self.repo.get_artist(id).unwrap().unwrap();
        let songs = self.repo.list_songs_by_artist(id).unwrap();
        aggregate::refresh(&mut artist, &songs.records, 1);
        self.repo.put_artist(&artist).unwrap();
    }
}

/// Passes through to SQLite, failing the configured reads.
pub struct FaultyRepo {
    pub inner: Arc<SqliteRepository>,
    /// Every `get_song` of this id fails.
    pub unreadable_song: Option<&'static str>,
    /// Every `list_songs_by_artist` fails.
    pub artist_listing_fails: bool,
}

impl FaultyRepo {
    pub fn new(inner: Arc<SqliteRepository>) -> Self {
        Self {
            inner,
            unreadable_song: None,
            artist_listing_fails: false,
        }
    }
}

impl Repository for FaultyRepo {
    fn get_song(&self, id: &str) -> anyhow::Result<Option<Song>> {
        if self.unreadable_song == Some(id) {
            anyhow::bail!("disk read error");
        }
        self.inner.get_song(id)
    }
    fn put_song(&self, song: &Song) -> anyhow::Result<()> {
        self.inner.put_song(song)
    }
    fn get_artist(&self, id: &str) -> anyhow::Result<Option<Artist>> {
        self.inner.get_artist(id)
    }
    fn put_artist(&self, artist: &Artist) -> anyhow::Result<()> {
        self.inner.put_artist(artist)
    }
    fn list_unclassified_songs(&self) -> anyhow::Result<Listing<Song>> {
        self.inner.list_unclassified_songs()
    }
    fn append_streaming_history_entry(&self, entry: &StreamingHistoryEntry) -> anyhow::Result<()> {
        self.inner.append_streaming_history_entry(entry)
    }
    fn list_songs(&self) -> anyhow::Result<Listing<Song>> {
        self.inner.list_songs()
    }
    fn list_artists(&self) -> anyhow::Result<Listing<Artist>> {
        self.inner.list_artists()
    }
    fn list_streaming_history(&self) -> anyhow::Result<Listing<StreamingHistoryEntry>> {
        self.inner.list_streaming_history()
    }
    fn list_songs_by_artist(&self, artist_id: &str) -> anyhow::Result<Listing<Song>> {
        if self.artist_listing_fails {
            anyhow::bail!("artist index unavailable");
        }
        self.inner.list_songs_by_artist(artist_id)
    }
    fn mark_song_unresolved(&self, id: &str, note: &str, at: i64) -> anyhow::Result<Vec<String>> {
        self.inner.mark_song_unresolved(id, note, at)
    }
}
