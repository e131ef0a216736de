//! Statistical text-language detection boundary.

pub mod libretranslate;

pub use libretranslate::LibreTranslateClient;

use async_trait::async_trait;

/// A detector's best guess for a piece of text.
#[derive(Debug, Clone, PartialEq)]
pub enum Detection {
    Guess {
        code: String,
        /// 0.0-1.0
        confidence: f64,
    },
    Unknown,
}

impl Detection {
    pub fn guess(code: impl Into<String>, confidence: f64) -> Self {
        Self::Guess {
            code: code.into(),
            confidence,
        }
    }
}

/// `Err` is reserved for transport or payload failures.
#[async_trait]
pub trait TextDetector: Send + Sync {
    async fn detect(&self, text: &str) -> anyhow::Result<Detection>;
}
