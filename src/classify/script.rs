//! Character-script language detection.
//!
//! Hebrew and Japanese are identified from their Unicode blocks alone, which
//! is far more reliable than statistical detection on short titles.

use crate::model::LanguageLabel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Script {
    Hebrew,
    Japanese,
}

impl Script {
    pub const ALL: [Script; 2] = [Script::Hebrew, Script::Japanese];

    pub fn language_code(self) -> &'static str {
        match self {
            Script::Hebrew => "he",
            Script::Japanese => "ja",
        }
    }

    pub fn contains(self, c: char) -> bool {
        let cp = c as u32;
        match self {
            Script::Hebrew => matches!(cp, 0x0590..=0x05FF | 0xFB1D..=0xFB4F),
            Script::Japanese => matches!(
                cp,
                0x3040..=0x309F     // hiragana
                | 0x30A0..=0x30FF   // katakana
                | 0xFF66..=0xFF9F   // half-width katakana
                | 0x3400..=0x4DBF   // CJK extension A
                | 0x4E00..=0x9FFF   // CJK unified ideographs
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ScriptMatch {
    pub script: Script,
    /// Share of in-script characters among alphabetic characters.
    pub fraction: f64,
}

impl ScriptMatch {
    pub fn label(&self) -> LanguageLabel {
        LanguageLabel::Language(self.script.language_code().to_string())
    }
}

#[derive(Debug, Clone)]
pub struct ScriptDetector {
    threshold: f64,
}

impl ScriptDetector {
    pub fn new(threshold: f64) -> Self {
        Self { threshold }
    }

    /// Returns the dominant script when its share meets the threshold.
    pub fn detect(&self, text: &str) -> Option<ScriptMatch> {
        let mut alphabetic = 0usize;
        let mut counts = [0usize; Script::ALL.len()];

        for c in text.chars().filter(|c| c.is_alphabetic()) {
            alphabetic += 1;
            for (i, script) in Script::ALL.iter().enumerate() {
                if script.contains(c) {
                    counts[i] += 1;
                }
            }
        }
        if alphabetic == 0 {
            return None;
        }

        Script::ALL
            .iter()
            .zip(counts)
            .map(|(&script, n)| ScriptMatch {
                script,
                fraction: n as f64 / alphabetic as f64,
            })
            .filter(|m| m.fraction >= self.threshold)
            .max_by(|a, b| a.fraction.total_cmp(&b.fraction))
    }
}
