use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Resolved classification value of a song.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum LanguageLabel {
    /// Spoken-language code such as `en` or `zh-cn`.
    Language(String),
    /// Instrumental or score content.
    Soundtrack,
    #[default]
    Unknown,
}

impl LanguageLabel {
    pub const SOUNDTRACK_KEY: &'static str = "soundtrack";
    pub const UNKNOWN_KEY: &'static str = "unknown";

    /// Build a spoken-language label, normalizing case. Returns `None` for
    /// anything that does not look like a language code.
    pub fn language(code: &str) -> Option<Self> {
        let code = code.trim().to_ascii_lowercase();
        if is_language_code(&code) {
            Some(Self::Language(code))
        } else {
            None
        }
    }

    pub fn is_soundtrack(&self) -> bool {
        matches!(self, Self::Soundtrack)
    }

    pub fn is_unknown(&self) -> bool {
        matches!(self, Self::Unknown)
    }

    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Language(code) => Some(code),
            _ => None,
        }
    }

    /// Key used in artist language distributions. Unknown never counts.
    pub fn key(&self) -> Option<&str> {
        match self {
            Self::Language(code) => Some(code),
            Self::Soundtrack => Some(Self::SOUNDTRACK_KEY),
            Self::Unknown => None,
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Self::Language(code) => code,
            Self::Soundtrack => Self::SOUNDTRACK_KEY,
            Self::Unknown => Self::UNKNOWN_KEY,
        }
    }

    /// Human-readable name, falling back to the raw code.
    pub fn display_name(&self) -> &str {
        match self {
            Self::Soundtrack => "Soundtrack",
            Self::Unknown => "Unknown",
            Self::Language(code) => language_name(code).unwrap_or(code),
        }
    }
}

impl fmt::Display for LanguageLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LanguageLabel {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.eq_ignore_ascii_case(Self::SOUNDTRACK_KEY) {
            return Ok(Self::Soundtrack);
        }
        if s.eq_ignore_ascii_case(Self::UNKNOWN_KEY) {
            return Ok(Self::Unknown);
        }
        Self::language(s).ok_or_else(|| anyhow::anyhow!("invalid language label {s:?}"))
    }
}

impl TryFrom<String> for LanguageLabel {
    type Error = anyhow::Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<LanguageLabel> for String {
    fn from(label: LanguageLabel) -> Self {
        label.as_str().to_string()
    }
}

/// `xx`, `xxx`, optionally followed by `-` and a 2–4 letter region.
fn is_language_code(code: &str) -> bool {
    let (lang, region) = match code.split_once('-') {
        Some((lang, region)) => (lang, Some(region)),
        None => (code, None),
    };
    let lang_ok = (2..=3).contains(&lang.len()) && lang.bytes().all(|b| b.is_ascii_lowercase());
    let region_ok = region.is_none_or(|r| {
        (2..=4).contains(&r.len()) && r.bytes().all(|b| b.is_ascii_alphanumeric())
    });
    lang_ok && region_ok && code != LanguageLabel::UNKNOWN_KEY
}

fn language_name(code: &str) -> Option<&'static str> {
    let name = match code {
        "en" => "English",
        "es" => "Spanish",
        "fr" => "French",
        "de" => "German",
        "it" => "Italian",
        "pt" => "Portuguese",
        "ru" => "Russian",
        "ja" => "Japanese",
        "ko" => "Korean",
        "zh" | "zh-cn" | "zh-tw" => "Chinese",
        "ar" => "Arabic",
        "tr" => "Turkish",
        "nl" => "Dutch",
        "pl" => "Polish",
        "sv" => "Swedish",
        "no" => "Norwegian",
        "da" => "Danish",
        "fi" => "Finnish",
        "he" => "Hebrew",
        "hi" => "Hindi",
        "th" => "Thai",
        "vi" => "Vietnamese",
        "id" => "Indonesian",
        "ro" => "Romanian",
        "hu" => "Hungarian",
        "cs" => "Czech",
        "el" => "Greek",
        "uk" => "Ukrainian",
        "ca" => "Catalan",
        "is" => "Icelandic",
        _ => return None,
    };
    Some(name)
}

/// Which resolver tier produced a song's label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClassificationSource {
    Soundtrack,
    ScriptDetector,
    LyricsDetector,
    TitleDetector,
    ArtistAggregation,
}

impl ClassificationSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Soundtrack => "soundtrack",
            Self::ScriptDetector => "script_detector",
            Self::LyricsDetector => "lyrics_detector",
            Self::TitleDetector => "title_detector",
            Self::ArtistAggregation => "artist_aggregation",
        }
    }
}

impl fmt::Display for ClassificationSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ClassificationSource {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "soundtrack" => Self::Soundtrack,
            "script_detector" => Self::ScriptDetector,
            "lyrics_detector" => Self::LyricsDetector,
            "title_detector" => Self::TitleDetector,
            "artist_aggregation" => Self::ArtistAggregation,
            other => anyhow::bail!("unknown classification source {other:?}"),
        })
    }
}
