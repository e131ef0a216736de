//! Consistency checks over the stored records.
//!
//! Every violation is reported. With repair enabled, drifted artist
//! aggregates are rewritten; nothing else is ever modified.

use crate::classify::aggregate;
use crate::classify::script::ScriptDetector;
use crate::config::Config;
use crate::error::ConfigError;
use crate::model::{Artist, Song};
use crate::storage::{Listing, Repository};
use std::collections::{HashMap, HashSet};
use std::fmt;
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityType {
    Song,
    Artist,
    StreamingHistory,
}

impl fmt::Display for EntityType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Song => "song",
            Self::Artist => "artist",
            Self::StreamingHistory => "history",
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ViolationKind {
    MissingSong,
    MissingArtist,
    SoundtrackLabelMismatch,
    SentinelWithoutSoundtrack,
    DistributionMismatch,
    AggregateMismatch,
    ScriptMismatch,
    MissingTitle,
    /// A stored row that does not decode.
    MalformedRecord,
    /// Same title and primary artist as an earlier song.
    DuplicateSong,
    /// Same name as an earlier artist.
    DuplicateArtist,
}

impl ViolationKind {
    /// Kinds the validator can fix on its own.
    pub fn is_repairable(self) -> bool {
        matches!(self, Self::DistributionMismatch | Self::AggregateMismatch)
    }
}

impl fmt::Display for ViolationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Violation {
    pub entity_type: EntityType,
    pub entity_id: String,
    pub kind: ViolationKind,
    pub details: String,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ValidationSummary {
    pub violations: usize,
    pub repairs: usize,
    pub repair_enabled: bool,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValidationReport {
    pub violations: Vec<Violation>,
    pub summary: ValidationSummary,
}

impl ValidationReport {
    pub fn is_clean(&self) -> bool {
        self.violations.is_empty()
    }

    #[cfg(test)]
    pub fn count(&self, kind: ViolationKind) -> usize {
        self.violations.iter().filter(|v| v.kind == kind).count()
    }

    fn push(
        &mut self,
        entity_type: EntityType,
        entity_id: &str,
        kind: ViolationKind,
        details: String,
    ) {
        debug!(%entity_type, entity_id, %kind, "violation: {details}");
        self.violations.push(Violation {
            entity_type,
            entity_id: entity_id.to_string(),
            kind,
            details,
        });
    }
}

pub struct Validator {
    min_sample: u32,
    scripts: ScriptDetector,
    repair: bool,
}

impl Validator {
    pub fn new(min_sample: u32, scripts: ScriptDetector, repair: bool) -> Self {
        Self {
            min_sample,
            scripts,
            repair,
        }
    }

    /// `repair` overrides the configured default when given.
    pub fn from_config(cfg: &Config, repair: Option<bool>) -> Result<Self, ConfigError> {
        cfg.validate()?;
        Ok(Self::new(
            cfg.resolver.aggregation_min_sample,
            ScriptDetector::new(cfg.resolver.script_threshold),
            repair.unwrap_or(cfg.validator.repair),
        ))
    }

    pub fn run(&self, repo: &dyn Repository) -> anyhow::Result<ValidationReport> {
        let songs = repo.list_songs()?;
        let artists = repo.list_artists()?;
        let history = repo.list_streaming_history()?;

        let mut report = ValidationReport::default();
        report_malformed(&mut report, EntityType::Song, &songs);
        report_malformed(&mut report, EntityType::Artist, &artists);
        report_malformed(&mut report, EntityType::StreamingHistory, &history);

        // Rows that exist but do not decode are not dangling references.
        let unreadable_songs: HashSet<&str> =
            songs.malformed.iter().map(|m| m.id.as_str()).collect();
        let artist_ids: HashSet<&str> = artists
            .records
            .iter()
            .map(|a| a.id.as_str())
            .chain(artists.malformed.iter().map(|m| m.id.as_str()))
            .collect();
        let (songs, artists) = (&songs.records, &artists.records);
        let song_index: HashMap<&str, &Song> = songs.iter().map(|s| (s.id.as_str(), s)).collect();

        for entry in &history.records {
            match song_index.get(entry.song_id.as_str()) {
                None if unreadable_songs.contains(entry.song_id.as_str()) => {}
                None => report.push(
                    EntityType::StreamingHistory,
                    &entry.id,
                    ViolationKind::MissingSong,
                    format!("references unknown song {}", entry.song_id),
                ),
                Some(song) => {
                    for artist in missing_artists(song, &artist_ids) {
                        report.push(
                            EntityType::StreamingHistory,
                            &entry.id,
                            ViolationKind::MissingArtist,
                            format!("song {} references unknown artist {artist}", song.id),
                        );
                    }
                }
            }
        }
        for song in songs {
            for artist in missing_artists(song, &artist_ids) {
                report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::MissingArtist,
                    format!("references unknown artist {artist}"),
                );
            }
        }

        for song in songs {
            if song.is_soundtrack && !song.language.is_soundtrack() {
                report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::SoundtrackLabelMismatch,
                    format!("flagged as soundtrack but labelled {}", song.language),
                );
            } else if !song.is_soundtrack && song.language.is_soundtrack() {
                report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::SentinelWithoutSoundtrack,
                    "soundtrack label on a song not flagged as soundtrack".to_string(),
                );
            }
        }

        let mut by_artist: HashMap<&str, Vec<Song>> = HashMap::new();
        for song in songs {
            for id in &song.artist_ids {
                by_artist.entry(id.as_str()).or_default().push(song.clone());
            }
        }
        for artist in artists {
            let linked = by_artist.remove(artist.id.as_str()).unwrap_or_default();
            self.check_artist(repo, artist, &linked, &mut report)?;
        }

        for song in songs {
            if song.title.trim().is_empty() {
                report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::MissingTitle,
                    "empty title".to_string(),
                );
                continue;
            }
            let (Some(found), Some(stored)) = (self.scripts.detect(&song.title), song.language.code())
            else {
                continue;
            };
            if found.script.language_code() != stored {
                report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::ScriptMismatch,
                    format!(
                        "title is {:.0}% {} script but labelled {stored}",
                        found.fraction * 100.0,
                        found.label().display_name()
                    ),
                );
            }
        }

        self.check_duplicates(songs, artists, &mut report);

        report.summary.violations = report.violations.len();
        report.summary.repair_enabled = self.repair;
        info!(
            violations = report.summary.violations,
            repairs = report.summary.repairs,
            "validation finished"
        );
        Ok(report)
    }

    /// Songs match on trimmed, case-folded title plus primary artist; artists
    /// on trimmed, case-folded name. Every later member of a group is
    /// reported against the first.
    fn check_duplicates(&self, songs: &[Song], artists: &[Artist], report: &mut ValidationReport) {
        let mut seen_songs: HashMap<(String, &str), &str> = HashMap::new();
        for song in songs {
            let title = song.title.trim().to_lowercase();
            let Some(primary) = song.artist_ids.first() else {
                continue;
            };
            if title.is_empty() {
                continue;
            }
            match seen_songs.get(&(title.clone(), primary.as_str())) {
                Some(first) => report.push(
                    EntityType::Song,
                    &song.id,
                    ViolationKind::DuplicateSong,
                    format!("same title and primary artist as song {first}"),
                ),
                None => {
                    seen_songs.insert((title, primary.as_str()), song.id.as_str());
                }
            }
        }

        let mut seen_artists: HashMap<String, &str> = HashMap::new();
        for artist in artists {
            let name = artist.name.trim().to_lowercase();
            if name.is_empty() {
                continue;
            }
            match seen_artists.get(&name) {
                Some(first) => report.push(
                    EntityType::Artist,
                    &artist.id,
                    ViolationKind::DuplicateArtist,
                    format!("same name as artist {first}"),
                ),
                None => {
                    seen_artists.insert(name, artist.id.as_str());
                }
            }
        }
    }

    fn check_artist(
        &self,
        repo: &dyn Repository,
        artist: &Artist,
        songs: &[Song],
        report: &mut ValidationReport,
    ) -> anyhow::Result<()> {
        let mut fixed = artist.clone();
        if !aggregate::refresh(&mut fixed, songs, self.min_sample) {
            return Ok(());
        }

        if fixed.language_distribution != artist.language_distribution {
            report.push(
                EntityType::Artist,
                &artist.id,
                ViolationKind::DistributionMismatch,
                format!(
                    "stored tally of {} songs, recomputed {}",
                    artist.language_distribution.total(),
                    fixed.language_distribution.total()
                ),
            );
        }
        if fixed.aggregated_language != artist.aggregated_language {
            report.push(
                EntityType::Artist,
                &artist.id,
                ViolationKind::AggregateMismatch,
                format!(
                    "stored {}, recomputed {}",
                    artist.aggregated_language, fixed.aggregated_language
                ),
            );
        }

        if self.repair {
            repo.put_artist(&fixed)?;
            report.summary.repairs += 1;
            info!(
                artist = %artist.id,
                from = %artist.aggregated_language,
                to = %fixed.aggregated_language,
                "repaired artist aggregate"
            );
        }
        Ok(())
    }
}

fn report_malformed<T>(report: &mut ValidationReport, entity_type: EntityType, listing: &Listing<T>) {
    for bad in &listing.malformed {
        report.push(
            entity_type,
            &bad.id,
            ViolationKind::MalformedRecord,
            bad.reason.clone(),
        );
    }
}

fn missing_artists<'a>(song: &'a Song, known: &HashSet<&str>) -> Vec<&'a str> {
    song.artist_ids
        .iter()
        .map(String::as_str)
        .filter(|id| !known.contains(id))
        .collect()
}
