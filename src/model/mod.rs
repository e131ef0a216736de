use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use time::OffsetDateTime;

mod label;

pub use label::{ClassificationSource, LanguageLabel};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Song {
    pub id: String,
    pub title: String,
    /// Ordered, primary artist first.
    pub artist_ids: Vec<String>,
    #[serde(default)]
    pub album_id: Option<String>,
    #[serde(default)]
    pub album_name: Option<String>,
    #[serde(default)]
    pub release_year: Option<i32>,
    #[serde(default)]
    pub duration_ms: Option<u32>,
    #[serde(default)]
    pub language: LanguageLabel,
    #[serde(default)]
    pub is_soundtrack: bool,
    #[serde(default)]
    pub classification_source: Option<ClassificationSource>,
    /// `None` until a lyrics fetch has been attempted.
    #[serde(default)]
    pub has_lyrics: Option<bool>,
    /// Unix milliseconds of the last completed resolution.
    #[serde(default)]
    pub classified_at: Option<i64>,
    #[serde(default)]
    pub classification_note: Option<String>,
}

impl Song {
    /// A freshly sighted, unclassified song.
    #[cfg(test)]
    pub fn new(id: impl Into<String>, title: impl Into<String>, artist_ids: Vec<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist_ids,
            album_id: None,
            album_name: None,
            release_year: None,
            duration_ms: None,
            language: LanguageLabel::Unknown,
            is_soundtrack: false,
            classification_source: None,
            has_lyrics: None,
            classified_at: None,
            classification_note: None,
        }
    }

    pub fn is_classified(&self) -> bool {
        self.classification_source.is_some()
    }

    pub fn primary_artist_id(&self) -> Option<&str> {
        self.artist_ids.first().map(String::as_str)
    }

    /// Label as it should count towards artist aggregates.
    pub fn effective_label(&self) -> LanguageLabel {
        if self.is_soundtrack {
            LanguageLabel::Soundtrack
        } else {
            self.language.clone()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Artist {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub genres: BTreeSet<String>,
    #[serde(default)]
    pub language_distribution: LanguageDistribution,
    #[serde(default)]
    pub aggregated_language: LanguageLabel,
}

impl Artist {
    #[cfg(test)]
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            genres: BTreeSet::new(),
            language_distribution: LanguageDistribution::default(),
            aggregated_language: LanguageLabel::Unknown,
        }
    }
}

/// Per-label occurrence counts over an artist's classified songs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LanguageDistribution(BTreeMap<String, LabelTally>);

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelTally {
    pub count: u32,
    /// Latest `classified_at` among the songs counted here.
    pub last_added: i64,
}

impl LanguageDistribution {
    /// Count one more song carrying `label`. Unknown is ignored.
    pub fn record(&mut self, label: &LanguageLabel, at: i64) {
        let Some(key) = label.key() else {
            return;
        };
        let tally = self.0.entry(key.to_string()).or_default();
        tally.count += 1;
        tally.last_added = tally.last_added.max(at);
    }

    pub fn get(&self, key: &str) -> Option<&LabelTally> {
        self.0.get(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LabelTally)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn total(&self) -> u32 {
        self.0.values().map(|t| t.count).sum()
    }
}

/// One play of a song. Append-only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamingHistoryEntry {
    pub id: String,
    pub song_id: String,
    #[serde(with = "time::serde::rfc3339")]
    pub played_at: OffsetDateTime,
    pub ms_played: u32,
}

pub fn now_unix_ms() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distribution_record() {
        let mut dist = LanguageDistribution::default();
        dist.record(&LanguageLabel::Language("nl".into()), 10);
        dist.record(&LanguageLabel::Language("nl".into()), 5);
        dist.record(&LanguageLabel::Unknown, 20);
        dist.record(&LanguageLabel::Soundtrack, 7);

        assert_eq!(dist.get("nl"), Some(&LabelTally { count: 2, last_added: 10 }));
        assert_eq!(dist.get("soundtrack").map(|t| t.count), Some(1));
        assert_eq!(dist.total(), 3);
    }

    #[test]
    fn test_effective_label_prefers_soundtrack_flag() {
        let mut song = Song::new("s1", "Theme", vec!["a1".into()]);
        song.language = LanguageLabel::Language("en".into());
        song.is_soundtrack = true;
        assert_eq!(song.effective_label(), LanguageLabel::Soundtrack);
    }

    #[test]
    fn test_history_entry_json() {
        let raw = r#"{"id":"h1","song_id":"s1","played_at":"2024-03-01T12:00:00Z","ms_played":180000}"#;
        let entry: StreamingHistoryEntry = serde_json::from_str(raw).unwrap();
        assert_eq!(entry.played_at.unix_timestamp(), 1_709_294_400);
    }
}
