//! Priority-ordered fallback chain that labels one song.
//!
//! Tiers run strictly in [`State`] order and the first confident result wins.
//! A soundtrack hit ends the chain before any lyrics are fetched.

use super::aggregate;
use super::script::ScriptDetector;
use super::soundtrack::{SoundtrackInput, SoundtrackReference};
use crate::config::{Config, ResolverConfig, RetryConfig};
use crate::detect::{Detection, TextDetector};
use crate::error::{ConfigError, ResolveError};
use crate::lyrics::{LyricsFetcher, LyricsOutcome};
use crate::model::{Artist, ClassificationSource, LanguageLabel, Song, now_unix_ms};
use crate::storage::Repository;
use anyhow::Context;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Resolver states, in the order they are visited.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum State {
    New,
    SoundtrackCheck,
    ScriptCheck,
    LyricsFetch,
    LyricsDetect,
    TitleDetect,
    ArtistAggregate,
    Unresolved,
}

/// Outcome of running the chain over one song.
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub label: LanguageLabel,
    /// `None` when no tier was confident.
    pub source: Option<ClassificationSource>,
    /// States visited, ending with the one that decided.
    pub path: Vec<State>,
    /// `None` when no lyrics lookup completed.
    pub has_lyrics: Option<bool>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ResolveOutcome {
    /// Already classified and not forced; nothing was called or written.
    Skipped,
    Resolved(Resolution),
}

enum Step {
    Resolved(LanguageLabel, ClassificationSource),
    Next(State),
}

pub struct Resolver {
    thresholds: ResolverConfig,
    retry: RetryConfig,
    scripts: ScriptDetector,
    soundtrack: SoundtrackReference,
    lyrics: Arc<dyn LyricsFetcher>,
    detector: Arc<dyn TextDetector>,
    repo: Arc<dyn Repository>,
    /// Serializes song writes with the artist recomputation that follows,
    /// so a slower worker cannot store an older tally over a newer one.
    commit_lock: Mutex<()>,
}

impl Resolver {
    pub fn new(
        cfg: &Config,
        repo: Arc<dyn Repository>,
        lyrics: Arc<dyn LyricsFetcher>,
        detector: Arc<dyn TextDetector>,
    ) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self {
            thresholds: cfg.resolver.clone(),
            retry: cfg.retry.clone(),
            scripts: ScriptDetector::new(cfg.resolver.script_threshold),
            soundtrack: SoundtrackReference::from_config(&cfg.soundtrack)?,
            lyrics,
            detector,
            repo,
            commit_lock: Mutex::new(()),
        })
    }

    /// Classify and persist one song, re-reading its stored record first.
    pub async fn resolve_song(
        &self,
        song_id: &str,
        force: bool,
    ) -> Result<ResolveOutcome, ResolveError> {
        let mut song = self
            .repo
            .get_song(song_id)
            .and_then(|song| song.with_context(|| format!("song {song_id} not found")))
            .map_err(ResolveError::Unwritten)?;

        if song.is_classified() && !force {
            debug!(song = %song.id, "already classified, skipping");
            return Ok(ResolveOutcome::Skipped);
        }

        let resolution = self
            .classify(&song)
            .await
            .map_err(ResolveError::Unwritten)?;
        self.commit(&mut song, &resolution)?;

        match resolution.source {
            Some(source) => info!(
                song = %song.id,
                title = %song.title,
                language = %resolution.label,
                %source,
                "resolved"
            ),
            None => info!(song = %song.id, title = %song.title, "unresolved"),
        }
        Ok(ResolveOutcome::Resolved(resolution))
    }

    /// Store a song as unresolved after an unexpected failure. Works on
    /// records that no longer decode.
    pub fn record_failure(&self, song_id: &str, err: &anyhow::Error) -> anyhow::Result<()> {
        let note = format!("{err:#}");
        let _guard = self.lock_commits()?;
        let artist_ids = self
            .repo
            .mark_song_unresolved(song_id, &note, now_unix_ms())?;
        self.refresh_artists(&artist_ids)
    }

    /// Run the tier chain without writing anything.
    pub async fn classify(&self, song: &Song) -> anyhow::Result<Resolution> {
        let artists = self.load_artists(song)?;
        let mut state = State::New;
        let mut path = Vec::new();
        let mut lyrics: Option<String> = None;
        let mut has_lyrics = None;

        loop {
            path.push(state);
            let step = match state {
                State::New => Step::Next(State::SoundtrackCheck),
                State::SoundtrackCheck => self.soundtrack_check(song, &artists),
                State::ScriptCheck => match self.scripts.detect(&song.title) {
                    Some(m) => Step::Resolved(m.label(), ClassificationSource::ScriptDetector),
                    None => Step::Next(State::LyricsFetch),
                },
                State::LyricsFetch => {
                    let primary = song
                        .primary_artist_id()
                        .and_then(|id| artists.iter().find(|a| a.id == id));
                    match primary {
                        Some(artist) => match self.fetch_lyrics(&song.title, &artist.name).await {
                            LyricsOutcome::Found(text) => {
                                has_lyrics = Some(true);
                                lyrics = Some(text);
                                Step::Next(State::LyricsDetect)
                            }
                            LyricsOutcome::NotFound => {
                                has_lyrics = Some(false);
                                Step::Next(State::TitleDetect)
                            }
                            LyricsOutcome::RateLimited | LyricsOutcome::Timeout => {
                                Step::Next(State::TitleDetect)
                            }
                        },
                        None => {
                            debug!(song = %song.id, "no primary artist, skipping lyrics");
                            Step::Next(State::TitleDetect)
                        }
                    }
                }
                State::LyricsDetect => {
                    let text = lyrics.as_deref().unwrap_or_default();
                    self.lyrics_detect(&song.title, text).await
                }
                State::TitleDetect => {
                    match self
                        .detect_confident(&song.title, self.thresholds.title_min_chars)
                        .await
                    {
                        Some(label) => Step::Resolved(label, ClassificationSource::TitleDetector),
                        None => Step::Next(State::ArtistAggregate),
                    }
                }
                State::ArtistAggregate => match self.artist_aggregate(song)? {
                    Some(label) => Step::Resolved(label, ClassificationSource::ArtistAggregation),
                    None => Step::Next(State::Unresolved),
                },
                State::Unresolved => {
                    return Ok(Resolution {
                        label: LanguageLabel::Unknown,
                        source: None,
                        path,
                        has_lyrics,
                    });
                }
            };

            match step {
                Step::Resolved(label, source) => {
                    debug!(song = %song.id, ?state, %label, "tier confident");
                    return Ok(Resolution {
                        label,
                        source: Some(source),
                        path,
                        has_lyrics,
                    });
                }
                Step::Next(next) => state = next,
            }
        }
    }

    fn load_artists(&self, song: &Song) -> anyhow::Result<Vec<Artist>> {
        let mut artists = Vec::with_capacity(song.artist_ids.len());
        for id in &song.artist_ids {
            match self.repo.get_artist(id)? {
                Some(artist) => artists.push(artist),
                None => warn!(song = %song.id, artist = %id, "artist record missing"),
            }
        }
        Ok(artists)
    }

    fn soundtrack_check(&self, song: &Song, artists: &[Artist]) -> Step {
        let names: Vec<&str> = artists.iter().map(|a| a.name.as_str()).collect();
        let genres: Vec<&str> = artists
            .iter()
            .flat_map(|a| a.genres.iter().map(String::as_str))
            .collect();
        let input = SoundtrackInput {
            title: &song.title,
            album_name: song.album_name.as_deref(),
            artist_names: &names,
            artist_genres: &genres,
        };

        match self.soundtrack.classify(&input) {
            Some(reason) => {
                debug!(song = %song.id, %reason, "soundtrack");
                Step::Resolved(LanguageLabel::Soundtrack, ClassificationSource::Soundtrack)
            }
            None => Step::Next(State::ScriptCheck),
        }
    }

    /// Fetch with bounded exponential backoff on retryable outcomes. An
    /// unexpected error counts as the tier failing.
    async fn fetch_lyrics(&self, title: &str, artist: &str) -> LyricsOutcome {
        let attempts = self.retry.max_attempts.max(1);
        let mut last = LyricsOutcome::Timeout;

        for attempt in 1..=attempts {
            match self.lyrics.fetch_lyrics(title, artist).await {
                Ok(LyricsOutcome::Found(text)) if text.trim().is_empty() => {
                    return LyricsOutcome::NotFound;
                }
                Ok(outcome) if outcome.is_retryable() => {
                    debug!(title, attempt, ?outcome, "lyrics fetch retryable");
                    last = outcome;
                    if attempt < attempts {
                        tokio::time::sleep(self.backoff(attempt)).await;
                    }
                }
                Ok(LyricsOutcome::NotFound) => {
                    debug!(title, artist, "no lyrics");
                    return LyricsOutcome::NotFound;
                }
                Ok(outcome) => return outcome,
                Err(e) => {
                    warn!(title, "lyrics fetch failed: {e:#}");
                    return LyricsOutcome::Timeout;
                }
            }
        }

        warn!(title, attempts, ?last, "lyrics fetch gave up");
        last
    }

    fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64 << (attempt.saturating_sub(1)).min(16);
        let ms = self
            .retry
            .base_delay_ms
            .saturating_mul(factor)
            .min(self.retry.max_delay_ms);
        Duration::from_millis(ms)
    }

    async fn lyrics_detect(&self, title: &str, lyrics: &str) -> Step {
        let combined = format!("{title}\n{lyrics}");
        if let Some(m) = self.scripts.detect(&combined) {
            return Step::Resolved(m.label(), ClassificationSource::ScriptDetector);
        }
        match self
            .detect_confident(lyrics, self.thresholds.lyrics_min_chars)
            .await
        {
            Some(label) => Step::Resolved(label, ClassificationSource::LyricsDetector),
            None => Step::Next(State::TitleDetect),
        }
    }

    /// Ask the detector only when `text` is long enough, and accept only a
    /// guess above the confidence threshold.
    async fn detect_confident(&self, text: &str, min_chars: usize) -> Option<LanguageLabel> {
        let text = text.trim();
        if text.chars().count() <= min_chars {
            return None;
        }

        match self.detector.detect(text).await {
            Ok(Detection::Guess { code, confidence })
                if confidence > self.thresholds.confidence_threshold =>
            {
                let label = LanguageLabel::language(&code);
                if label.is_none() {
                    warn!(%code, "detector returned an unusable language code");
                }
                label
            }
            Ok(_) => None,
            Err(e) => {
                warn!("language detection failed: {e:#}");
                None
            }
        }
    }

    /// Reads the artists as currently committed, so songs finished earlier
    /// in the same run are taken into account.
    fn artist_aggregate(&self, song: &Song) -> anyhow::Result<Option<LanguageLabel>> {
        for id in &song.artist_ids {
            let Some(artist) = self.repo.get_artist(id)? else {
                continue;
            };
            let label = aggregate::majority(
                &artist.language_distribution,
                self.thresholds.aggregation_min_sample,
            );
            if !label.is_unknown() {
                return Ok(Some(label));
            }
        }
        Ok(None)
    }

    fn commit(&self, song: &mut Song, resolution: &Resolution) -> Result<(), ResolveError> {
        // The sentinel and the flag always travel together.
        song.is_soundtrack = resolution.label.is_soundtrack();
        song.language = resolution.label.clone();
        song.classification_source = resolution.source;
        if resolution.has_lyrics.is_some() {
            song.has_lyrics = resolution.has_lyrics;
        }
        song.classified_at = Some(now_unix_ms());
        song.classification_note = None;

        let _guard = self.lock_commits().map_err(ResolveError::Unwritten)?;
        self.repo.put_song(song).map_err(ResolveError::Unwritten)?;
        self.refresh_artists(&song.artist_ids)
            .map_err(|cause| ResolveError::ArtistRefresh {
                song: song.id.clone(),
                cause,
            })
    }

    fn lock_commits(&self) -> anyhow::Result<MutexGuard<'_, ()>> {
        self.commit_lock
            .lock()
            .map_err(|_| anyhow::anyhow!("commit lock poisoned"))
    }

    fn refresh_artists(&self, artist_ids: &[String]) -> anyhow::Result<()> {
        for id in artist_ids {
            let Some(mut artist) = self.repo.get_artist(id)? else {
                continue;
            };
            let songs = self.repo.list_songs_by_artist(id)?;
            for bad in &songs.malformed {
                warn!(artist = %id, song = %bad.id, "song left out of tally: {}", bad.reason);
            }
            let min_sample = self.thresholds.aggregation_min_sample;
            if aggregate::refresh(&mut artist, &songs.records, min_sample) {
                self.repo.put_artist(&artist)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeDetector, FakeLyrics, FaultyRepo, Fixture, lang, test_config};

    const DUTCH_LYRICS: &str = "Ik loop alleen door de stad vannacht\n\
        en ik denk aan jou, aan alles wat we hadden\n\
        de lichten gaan uit maar ik blijf nog even staan\n\
        want morgen is er weer een nieuwe dag";

    #[tokio::test]
    async fn test_scenario_a_composer_soundtrack() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.artist("a1", "Hans Zimmer");
        fx.song("s1", "Interstellar (Main Theme)", &["a1"]);

        let outcome = fx.resolver.resolve_song("s1", false).await.unwrap();
        let ResolveOutcome::Resolved(r) = outcome else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, LanguageLabel::Soundtrack);
        assert_eq!(r.source, Some(ClassificationSource::Soundtrack));
        assert_eq!(r.path, vec![State::New, State::SoundtrackCheck]);

        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert!(stored.is_soundtrack);
        assert_eq!(stored.language, LanguageLabel::Soundtrack);
        assert_eq!(fx.lyrics.calls(), 0);
        assert_eq!(fx.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_b_hebrew_title() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.artist("a1", "Omer Adam");
        fx.song("s1", "שלום עולם", &["a1"]);

        fx.resolver.resolve_song("s1", false).await.unwrap();
        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, lang("he"));
        assert_eq!(stored.classification_source, Some(ClassificationSource::ScriptDetector));
        assert_eq!(fx.lyrics.calls(), 0);
    }

    #[tokio::test]
    async fn test_scenario_c_title_detection_after_missing_lyrics() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::NotFound),
            FakeDetector::by_text(&[("Walking on the Moon", Detection::guess("en", 0.9))]),
        );
        fx.artist("a1", "The Police");
        fx.song("s1", "Walking on the Moon", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, lang("en"));
        assert_eq!(r.source, Some(ClassificationSource::TitleDetector));
        assert_eq!(r.has_lyrics, Some(false));
        // NotFound is not retried
        assert_eq!(fx.lyrics.calls(), 1);

        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.has_lyrics, Some(false));
    }

    #[tokio::test]
    async fn test_lyrics_error_falls_through_to_title() {
        let fx = Fixture::new(
            FakeLyrics::failing("connection reset"),
            FakeDetector::by_text(&[("Walking on the Moon", Detection::guess("en", 0.9))]),
        );
        fx.artist("a1", "The Police");
        fx.song("s1", "Walking on the Moon", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, lang("en"));
        assert_eq!(r.source, Some(ClassificationSource::TitleDetector));
        // an Err is not retried and says nothing about lyrics
        assert_eq!(fx.lyrics.calls(), 1);
        assert_eq!(r.has_lyrics, None);
        assert_eq!(fx.repo.get_song("s1").unwrap().unwrap().has_lyrics, None);
    }

    #[tokio::test]
    async fn test_scenario_d_artist_aggregation() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.artist("a1", "Frans Bauer");
        for i in 0..4 {
            fx.classified_song(&format!("nl{i}"), &["a1"], lang("nl"), i);
        }
        fx.classified_song("en0", &["a1"], lang("en"), 10);
        fx.refresh_artist("a1");
        fx.song("s1", "Heb je even voor mij", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, lang("nl"));
        assert_eq!(r.source, Some(ClassificationSource::ArtistAggregation));
        assert_eq!(*r.path.last().unwrap(), State::ArtistAggregate);

        let artist = fx.repo.get_artist("a1").unwrap().unwrap();
        assert_eq!(artist.language_distribution.get("nl").map(|t| t.count), Some(5));
        assert_eq!(artist.aggregated_language, lang("nl"));
    }

    #[tokio::test]
    async fn test_retries_transient_then_detects_lyrics() {
        let fx = Fixture::new(
            FakeLyrics::sequence(vec![
                LyricsOutcome::RateLimited,
                LyricsOutcome::Timeout,
                LyricsOutcome::Found(DUTCH_LYRICS.into()),
            ]),
            FakeDetector::by_text(&[(DUTCH_LYRICS, Detection::guess("nl", 0.95))]),
        );
        fx.artist("a1", "Marco Borsato");
        fx.song("s1", "Nacht", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(fx.lyrics.calls(), 3);
        assert_eq!(r.label, lang("nl"));
        assert_eq!(r.source, Some(ClassificationSource::LyricsDetector));
        assert_eq!(r.has_lyrics, Some(true));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::Timeout),
            FakeDetector::by_text(&[("Despacito", Detection::guess("es", 0.8))]),
        );
        fx.artist("a1", "Luis Fonsi");
        fx.song("s1", "Despacito", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(fx.lyrics.calls(), 3);
        assert_eq!(r.source, Some(ClassificationSource::TitleDetector));
        assert_eq!(r.has_lyrics, None);
    }

    #[tokio::test]
    async fn test_script_in_lyrics_beats_detector() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::Found("夜に駆ける 沈むように溶けてゆくように".into())),
            FakeDetector::by_text(&[]),
        );
        fx.artist("a1", "YOASOBI");
        fx.song("s1", "Yoru ni Kakeru", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, lang("ja"));
        assert_eq!(r.source, Some(ClassificationSource::ScriptDetector));
        assert_eq!(*r.path.last().unwrap(), State::LyricsDetect);
        assert_eq!(fx.detector.calls(), 0);
    }

    #[tokio::test]
    async fn test_low_confidence_and_short_text_fall_through() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::Found("la la la".into())),
            FakeDetector::by_text(&[("Mambo No. 5", Detection::guess("en", 0.5))]),
        );
        fx.artist("a1", "Lou Bega");
        fx.song("s1", "Mambo No. 5", &["a1"]);

        let ResolveOutcome::Resolved(r) = fx.resolver.resolve_song("s1", false).await.unwrap() else {
            panic!("expected a resolution");
        };
        assert_eq!(r.label, LanguageLabel::Unknown);
        assert_eq!(r.source, None);
        assert_eq!(*r.path.last().unwrap(), State::Unresolved);
        // short lyrics never reach the detector; the title does
        assert_eq!(fx.detector.calls(), 1);

        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, LanguageLabel::Unknown);
        assert!(!stored.is_classified());
        assert_eq!(fx.repo.list_unclassified_songs().unwrap().records.len(), 1);
    }

    #[tokio::test]
    async fn test_idempotent_without_force() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::NotFound),
            FakeDetector::by_text(&[("Walking on the Moon", Detection::guess("en", 0.9))]),
        );
        fx.artist("a1", "The Police");
        fx.song("s1", "Walking on the Moon", &["a1"]);

        fx.resolver.resolve_song("s1", false).await.unwrap();
        let first = fx.repo.get_song("s1").unwrap().unwrap();
        let calls = (fx.lyrics.calls(), fx.detector.calls());

        let again = fx.resolver.resolve_song("s1", false).await.unwrap();
        assert_eq!(again, ResolveOutcome::Skipped);
        assert_eq!((fx.lyrics.calls(), fx.detector.calls()), calls);
        assert_eq!(fx.repo.get_song("s1").unwrap().unwrap(), first);

        fx.resolver.resolve_song("s1", true).await.unwrap();
        assert_eq!(fx.lyrics.calls(), calls.0 + 1);
    }

    #[tokio::test]
    async fn test_deterministic_with_fixed_tier_outputs() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::Found(DUTCH_LYRICS.into())),
            FakeDetector::by_text(&[(DUTCH_LYRICS, Detection::guess("nl", 0.95))]),
        );
        fx.artist("a1", "Marco Borsato");
        let song = fx.song("s1", "Nacht", &["a1"]);

        let first = fx.resolver.classify(&song).await.unwrap();
        for _ in 0..3 {
            assert_eq!(fx.resolver.classify(&song).await.unwrap(), first);
        }
    }

    #[tokio::test]
    async fn test_aggregated_soundtrack_sets_flag() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.artist("a1", "Some Library Music");
        fx.classified_song("old", &["a1"], LanguageLabel::Soundtrack, 1);
        fx.refresh_artist("a1");
        fx.song("s1", "Cue 12", &["a1"]);

        fx.resolver.resolve_song("s1", false).await.unwrap();
        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, LanguageLabel::Soundtrack);
        assert!(stored.is_soundtrack);
    }

    #[tokio::test]
    async fn test_failure_is_recorded_as_unresolved() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.song("s1", "Anything", &[]);
        let err = anyhow::anyhow!("boom");

        fx.resolver.record_failure("s1", &err).unwrap();
        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, LanguageLabel::Unknown);
        assert_eq!(stored.classification_note.as_deref(), Some("boom"));
        assert!(!stored.is_classified());
    }

    #[tokio::test]
    async fn test_failed_artist_refresh_keeps_stored_label() {
        let fx = Fixture::new(
            FakeLyrics::always(LyricsOutcome::NotFound),
            FakeDetector::by_text(&[("Penny Lane", Detection::guess("en", 0.9))]),
        );
        fx.artist("a1", "The Band");
        fx.song("s1", "Penny Lane", &["a1"]);
        let repo = FaultyRepo {
            artist_listing_fails: true,
            ..FaultyRepo::new(fx.repo.clone())
        };
        let resolver = Resolver::new(
            &test_config(),
            Arc::new(repo),
            fx.lyrics.clone(),
            fx.detector.clone(),
        )
        .unwrap();

        let err = resolver.resolve_song("s1", false).await.unwrap_err();
        assert!(matches!(&err, ResolveError::ArtistRefresh { song, .. } if song == "s1"));

        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, lang("en"));
        assert_eq!(stored.classification_source, Some(ClassificationSource::TitleDetector));
        assert!(stored.classification_note.is_none());
    }

    #[test]
    fn test_failure_on_undecodable_song_is_recorded() {
        let fx = Fixture::new(FakeLyrics::always(LyricsOutcome::NotFound), FakeDetector::unknown());
        fx.artist("a1", "The Band");
        fx.classified_song("s1", &["a1"], lang("en"), 1);
        fx.refresh_artist("a1");
        fx.repo
            .execute_raw("UPDATE songs SET language = '???' WHERE id = 's1'")
            .unwrap();

        let err = fx.repo.get_song("s1").unwrap_err();
        fx.resolver.record_failure("s1", &err).unwrap();

        let stored = fx.repo.get_song("s1").unwrap().unwrap();
        assert_eq!(stored.language, LanguageLabel::Unknown);
        assert!(!stored.is_classified());
        let artist = fx.repo.get_artist("a1").unwrap().unwrap();
        assert!(artist.language_distribution.get("en").is_none());
    }

    #[test]
    fn test_backoff_doubles_and_caps() {
        let fx = Fixture::with_config(
            {
                let mut cfg = test_config();
                cfg.retry.base_delay_ms = 100;
                cfg.retry.max_delay_ms = 250;
                cfg
            },
            FakeLyrics::always(LyricsOutcome::NotFound),
            FakeDetector::unknown(),
        );
        assert_eq!(fx.resolver.backoff(1), Duration::from_millis(100));
        assert_eq!(fx.resolver.backoff(2), Duration::from_millis(200));
        assert_eq!(fx.resolver.backoff(3), Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let mut cfg = test_config();
        cfg.resolver.confidence_threshold = 2.0;
        let repo = Arc::new(crate::storage::SqliteRepository::open_in_memory().unwrap());
        let result = Resolver::new(
            &cfg,
            repo,
            Arc::new(FakeLyrics::always(LyricsOutcome::NotFound)),
            Arc::new(FakeDetector::unknown()),
        );
        assert!(result.is_err());
    }
}
