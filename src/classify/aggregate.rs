//! Majority-vote derivation of an artist's language from its songs.

use crate::model::{Artist, LabelTally, LanguageDistribution, LanguageLabel, Song};
use std::cmp::Reverse;

/// Tally the labels of `songs`. Unknown songs are not counted.
pub fn tally_songs<'a>(songs: impl IntoIterator<Item = &'a Song>) -> LanguageDistribution {
    let mut dist = LanguageDistribution::default();
    for song in songs {
        dist.record(&song.effective_label(), song.classified_at.unwrap_or(0));
    }
    dist
}

/// Pick the representative label of a distribution.
///
/// Soundtrack songs are ignored unless they are all the artist has. Ties go
/// to the label added most recently, then to the smaller code.
pub fn majority(dist: &LanguageDistribution, min_sample: u32) -> LanguageLabel {
    let spoken: Vec<(&str, &LabelTally)> = dist
        .iter()
        .filter(|(key, _)| *key != LanguageLabel::SOUNDTRACK_KEY)
        .collect();

    if spoken.is_empty() {
        return match dist.get(LanguageLabel::SOUNDTRACK_KEY) {
            Some(t) if t.count >= min_sample => LanguageLabel::Soundtrack,
            _ => LanguageLabel::Unknown,
        };
    }

    let sample: u32 = spoken.iter().map(|(_, t)| t.count).sum();
    if sample < min_sample {
        return LanguageLabel::Unknown;
    }

    spoken
        .into_iter()
        .max_by_key(|(key, t)| (t.count, t.last_added, Reverse(*key)))
        .and_then(|(key, _)| LanguageLabel::language(key))
        .unwrap_or(LanguageLabel::Unknown)
}

/// Rederive `artist`'s distribution and aggregate from its songs. Returns
/// whether either changed.
pub fn refresh(artist: &mut Artist, songs: &[Song], min_sample: u32) -> bool {
    let dist = tally_songs(songs);
    let label = majority(&dist, min_sample);
    if artist.language_distribution == dist && artist.aggregated_language == label {
        return false;
    }
    artist.language_distribution = dist;
    artist.aggregated_language = label;
    true
}
