//! LibreTranslate `/detect` client
//!
//! Any server speaking the LibreTranslate API works, self-hosted or not.
//! API Documentation: https://libretranslate.com/docs

use super::{Detection, TextDetector};
use crate::config::DetectorConfig;
use anyhow::Context;
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use std::time::Duration;

#[derive(Debug, Deserialize)]
struct DetectCandidate {
    language: String,
    /// 0-100
    confidence: f64,
}

#[derive(Debug, Clone)]
pub struct LibreTranslateClient {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl LibreTranslateClient {
    pub fn new(cfg: &DetectorConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(cfg.timeout_secs))
            .build()
            .context("build detector client")?;
        Ok(Self {
            client,
            base_url: cfg.base_url.trim_end_matches('/').to_string(),
            api_key: cfg.api_key.clone(),
        })
    }
}

#[async_trait]
impl TextDetector for LibreTranslateClient {
    async fn detect(&self, text: &str) -> anyhow::Result<Detection> {
        let mut body = json!({ "q": text });
        if let Some(key) = &self.api_key {
            body["api_key"] = json!(key);
        }

        let candidates: Vec<DetectCandidate> = self
            .client
            .post(format!("{}/detect", self.base_url))
            .json(&body)
            .send()
            .await
            .context("send detect request")?
            .error_for_status()
            .context("detect http status")?
            .json()
            .await
            .context("parse detect json")?;

        Ok(best_candidate(candidates))
    }
}

fn best_candidate(candidates: Vec<DetectCandidate>) -> Detection {
    candidates
        .into_iter()
        .filter(|c| !c.language.is_empty())
        .max_by(|a, b| a.confidence.total_cmp(&b.confidence))
        .map(|c| Detection::guess(c.language, (c.confidence / 100.0).clamp(0.0, 1.0)))
        .unwrap_or(Detection::Unknown)
}
