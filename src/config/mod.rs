use crate::error::ConfigError;
use anyhow::Context;
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

pub mod defaults;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub paths: PathsConfig,
    pub resolver: ResolverConfig,
    pub soundtrack: SoundtrackConfig,
    pub retry: RetryConfig,
    pub lyrics: LyricsConfig,
    pub detector: DetectorConfig,
    pub limits: LimitsConfig,
    pub validator: ValidatorConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PathsConfig {
    pub database: PathBuf,
}

/// Acceptance thresholds for the resolver tiers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Minimum share of in-script characters among alphabetic characters.
    pub script_threshold: f64,
    /// Lyrics must be longer than this (in characters) to be detected.
    pub lyrics_min_chars: usize,
    /// Titles must be longer than this (in characters) to be detected.
    pub title_min_chars: usize,
    /// Detector confidence must exceed this (0.0-1.0).
    pub confidence_threshold: f64,
    /// Classified songs an artist needs before aggregation is trusted.
    pub aggregation_min_sample: u32,
}

/// Curated soundtrack reference data.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SoundtrackConfig {
    pub composers: Vec<String>,
    pub keywords: Vec<String>,
    pub genres: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LyricsConfig {
    pub base_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectorConfig {
    /// LibreTranslate-compatible server exposing `/detect`.
    pub base_url: String,
    pub api_key: Option<String>,
    pub timeout_secs: u64,
}

/// Slowest accepted refill: one call every ~17 minutes.
pub const MIN_REQUESTS_PER_SEC: f64 = 0.001;
pub const MAX_REQUESTS_PER_SEC: f64 = 1_000.0;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    /// Songs resolved concurrently.
    pub workers: usize,
    /// Token bucket size shared by lyrics and detector calls.
    pub burst: u32,
    /// Tokens added back per second.
    pub requests_per_sec: f64,
    /// Stop dispatching after this many external calls.
    pub call_budget: Option<u64>,
    /// Stop dispatching after this many seconds.
    pub time_budget_secs: Option<u64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidatorConfig {
    /// Overwrite drifted artist aggregates.
    pub repair: bool,
}

impl Default for PathsConfig {
    fn default() -> Self {
        let proj = ProjectDirs::from("dev", "songlang", "songlang");
        let data_dir = proj
            .as_ref()
            .map(|p| p.data_dir().to_path_buf())
            .unwrap_or_else(|| std::env::temp_dir().join("songlang"));
        Self {
            database: data_dir.join("songlang.sqlite3"),
        }
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            script_threshold: 0.15,
            lyrics_min_chars: 100,
            title_min_chars: 2,
            confidence_threshold: 0.7,
            aggregation_min_sample: 1,
        }
    }
}

impl Default for SoundtrackConfig {
    fn default() -> Self {
        let owned = |list: &[&str]| list.iter().map(|s| s.to_string()).collect();
        Self {
            composers: owned(defaults::COMPOSERS),
            keywords: owned(defaults::SOUNDTRACK_KEYWORDS),
            genres: owned(defaults::SOUNDTRACK_GENRES),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay_ms: 500,
            max_delay_ms: 8_000,
        }
    }
}

impl Default for LyricsConfig {
    fn default() -> Self {
        Self {
            base_url: "https://lrclib.net/api".to_string(),
            timeout_secs: 10,
        }
    }
}

impl Default for DetectorConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:5000".to_string(),
            api_key: None,
            timeout_secs: 10,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            burst: 5,
            requests_per_sec: 2.0,
            call_budget: None,
            time_budget_secs: None,
        }
    }
}

impl Config {
    /// Reject thresholds and reference data that would silently degrade
    /// every tier.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let r = &self.resolver;
        unit_range("resolver.script_threshold", r.script_threshold, false)?;
        unit_range("resolver.confidence_threshold", r.confidence_threshold, true)?;
        if r.aggregation_min_sample == 0 {
            return Err(ConfigError::Zero("resolver.aggregation_min_sample"));
        }

        non_empty_list("soundtrack.composers", &self.soundtrack.composers)?;
        non_empty_list("soundtrack.keywords", &self.soundtrack.keywords)?;
        // Genre matching is optional, but a present list must be clean.
        if !self.soundtrack.genres.is_empty() {
            non_empty_list("soundtrack.genres", &self.soundtrack.genres)?;
        }

        if self.retry.max_attempts == 0 {
            return Err(ConfigError::Zero("retry.max_attempts"));
        }
        if self.limits.workers == 0 {
            return Err(ConfigError::Zero("limits.workers"));
        }
        if self.limits.burst == 0 {
            return Err(ConfigError::Zero("limits.burst"));
        }
        let rate = self.limits.requests_per_sec;
        if !(MIN_REQUESTS_PER_SEC..=MAX_REQUESTS_PER_SEC).contains(&rate) {
            return Err(ConfigError::OutOfRange {
                name: "limits.requests_per_sec",
                value: rate,
                min: MIN_REQUESTS_PER_SEC,
                max: MAX_REQUESTS_PER_SEC,
            });
        }

        http_url("lyrics.base_url", &self.lyrics.base_url)?;
        http_url("detector.base_url", &self.detector.base_url)?;
        Ok(())
    }
}

fn unit_range(name: &'static str, value: f64, zero_ok: bool) -> Result<(), ConfigError> {
    let lower_ok = if zero_ok { value >= 0.0 } else { value > 0.0 };
    if lower_ok && value <= 1.0 {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            name,
            value,
            min: 0.0,
            max: 1.0,
        })
    }
}

fn non_empty_list(name: &'static str, list: &[String]) -> Result<(), ConfigError> {
    if list.is_empty() {
        return Err(ConfigError::EmptyReferenceList(name));
    }
    match list.iter().position(|s| s.trim().is_empty()) {
        Some(index) => Err(ConfigError::BlankReferenceEntry { list: name, index }),
        None => Ok(()),
    }
}

fn http_url(name: &'static str, value: &str) -> Result<(), ConfigError> {
    if value.starts_with("http://") || value.starts_with("https://") {
        Ok(())
    } else {
        Err(ConfigError::InvalidUrl {
            name,
            value: value.to_string(),
        })
    }
}

pub fn default_config_path() -> anyhow::Result<PathBuf> {
    let proj =
        ProjectDirs::from("dev", "songlang", "songlang").context("ProjectDirs unavailable")?;
    Ok(proj.config_dir().join("config.toml"))
}

pub fn load(override_path: Option<&Path>) -> anyhow::Result<Config> {
    let path = match override_path {
        Some(p) => p.to_path_buf(),
        None => default_config_path()?,
    };

    if !path.exists() {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| format!("create dir {}", parent.display()))?;
        }
        let cfg = defaults::defaults();
        let raw = toml::to_string_pretty(&cfg).context("serialize default config")?;
        fs::write(&path, raw).with_context(|| format!("write {}", path.display()))?;
        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            let _ = fs::set_permissions(&path, fs::Permissions::from_mode(0o600));
        }
        return Ok(cfg);
    }

    let raw = fs::read_to_string(&path).with_context(|| format!("read {}", path.display()))?;
    let cfg = toml::from_str::<Config>(&raw).with_context(|| format!("parse {}", path.display()))?;
    Ok(cfg)
}
