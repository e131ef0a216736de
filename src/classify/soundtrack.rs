use crate::config::SoundtrackConfig;
use crate::error::ConfigError;
use std::collections::HashSet;
use std::fmt;

/// Why a song was judged to be soundtrack content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SoundtrackReason {
    Composer(String),
    Keyword(String),
    Genre(String),
}

impl fmt::Display for SoundtrackReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Composer(name) => write!(f, "composer {name}"),
            Self::Keyword(kw) => write!(f, "keyword {kw:?}"),
            Self::Genre(genre) => write!(f, "genre {genre}"),
        }
    }
}

/// Immutable curated reference data for soundtrack heuristics.
#[derive(Debug, Clone)]
pub struct SoundtrackReference {
    composers: HashSet<String>,
    /// Each keyword pre-split into lowercase word tokens.
    keywords: Vec<(String, Vec<String>)>,
    genres: HashSet<String>,
}

/// What the classifier looks at for one song.
#[derive(Debug, Clone, Copy)]
pub struct SoundtrackInput<'a> {
    pub title: &'a str,
    pub album_name: Option<&'a str>,
    pub artist_names: &'a [&'a str],
    pub artist_genres: &'a [&'a str],
}

impl SoundtrackReference {
    pub fn from_config(cfg: &SoundtrackConfig) -> Result<Self, ConfigError> {
        if cfg.composers.is_empty() {
            return Err(ConfigError::EmptyReferenceList("soundtrack.composers"));
        }
        if cfg.keywords.is_empty() {
            return Err(ConfigError::EmptyReferenceList("soundtrack.keywords"));
        }

        let mut keywords = Vec::with_capacity(cfg.keywords.len());
        for (index, kw) in cfg.keywords.iter().enumerate() {
            let tokens = tokenize(kw);
            if tokens.is_empty() {
                return Err(ConfigError::BlankReferenceEntry {
                    list: "soundtrack.keywords",
                    index,
                });
            }
            keywords.push((kw.trim().to_lowercase(), tokens));
        }

        Ok(Self {
            composers: cfg.composers.iter().map(|c| normalize(c)).collect(),
            keywords,
            genres: cfg.genres.iter().map(|g| normalize(g)).collect(),
        })
    }

    pub fn classify(&self, input: &SoundtrackInput<'_>) -> Option<SoundtrackReason> {
        if let Some(name) = input
            .artist_names
            .iter()
            .find(|n| self.composers.contains(&normalize(n)))
        {
            return Some(SoundtrackReason::Composer(name.to_string()));
        }

        let texts = std::iter::once(input.title)
            .chain(input.album_name)
            .chain(input.artist_names.iter().copied());
        for text in texts {
            let words = tokenize(text);
            if let Some((kw, _)) = self
                .keywords
                .iter()
                .find(|(_, tokens)| contains_phrase(&words, tokens))
            {
                return Some(SoundtrackReason::Keyword(kw.clone()));
            }
        }

        input
            .artist_genres
            .iter()
            .find(|g| self.genres.contains(&normalize(g)))
            .map(|g| SoundtrackReason::Genre(g.to_string()))
    }
}

fn normalize(s: &str) -> String {
    s.trim().to_lowercase()
}

/// Lowercase word tokens. Dots are dropped so `O.S.T.` reads as `ost`.
fn tokenize(text: &str) -> Vec<String> {
    text.to_lowercase()
        .replace('.', "")
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn contains_phrase(words: &[String], phrase: &[String]) -> bool {
    !phrase.is_empty() && words.windows(phrase.len()).any(|w| w == phrase)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference() -> SoundtrackReference {
        SoundtrackReference::from_config(&SoundtrackConfig::default()).unwrap()
    }

    fn input<'a>(title: &'a str, artists: &'a [&'a str]) -> SoundtrackInput<'a> {
        SoundtrackInput {
            title,
            album_name: None,
            artist_names: artists,
            artist_genres: &[],
        }
    }

    #[test]
    fn test_known_composer() {
        let r = reference();
        let reason = r.classify(&input("Interstellar (Main Theme)", &["Hans Zimmer"]));
        assert_eq!(reason, Some(SoundtrackReason::Composer("Hans Zimmer".into())));
    }

    #[test]
    fn test_keywords_match_whole_words() {
        let r = reference();
        assert!(matches!(
            r.classify(&input("Zelda OST - Overworld", &["Someone"])),
            Some(SoundtrackReason::Keyword(k)) if k == "ost"
        ));
        assert!(r.classify(&input("Ghost Town", &["Someone"])).is_none());
        assert!(r.classify(&input("Most of Us", &["Someone"])).is_none());
        assert!(matches!(
            r.classify(&input("Theme From \"Jurassic Park\"", &["Someone"])),
            Some(SoundtrackReason::Keyword(k)) if k == "theme from"
        ));
    }

    #[test]
    fn test_orchestra_artist_names() {
        let r = reference();
        assert!(matches!(
            r.classify(&input("Adagio", &["London Symphony Orchestra"])),
            Some(SoundtrackReason::Keyword(_))
        ));
        assert!(matches!(
            r.classify(&input("Nocturne", &["Berliner Philharmoniker"])),
            Some(SoundtrackReason::Keyword(kw)) if kw == "philharmoniker"
        ));
        assert!(r.classify(&input("Adagio", &["Ghost Orchestration Club"])).is_none());
    }

    #[test]
    fn test_album_name_and_genre() {
        let r = reference();
        let by_album = SoundtrackInput {
            title: "Opening",
            album_name: Some("Spirited Away (Original Soundtrack)"),
            artist_names: &["Someone"],
            artist_genres: &[],
        };
        assert!(r.classify(&by_album).is_some());

        let by_genre = SoundtrackInput {
            title: "Opening",
            album_name: None,
            artist_names: &["Someone"],
            artist_genres: &["Japanese VGM"],
        };
        assert_eq!(
            r.classify(&by_genre),
            Some(SoundtrackReason::Genre("Japanese VGM".into()))
        );
    }

    #[test]
    fn test_empty_reference_is_config_error() {
        let mut cfg = SoundtrackConfig::default();
        cfg.keywords.clear();
        assert!(SoundtrackReference::from_config(&cfg).is_err());
    }
}
