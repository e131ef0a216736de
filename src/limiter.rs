//! Shared quota for external calls.
//!
//! Every worker goes through one governor bucket before reaching the lyrics
//! service or the language detector. The throttled wrappers implement the
//! same traits as what they wrap, so the resolver never sees the limiter.

use crate::config::LimitsConfig;
use crate::detect::{Detection, TextDetector};
use crate::lyrics::{LyricsFetcher, LyricsOutcome};
use async_trait::async_trait;
use governor::{DefaultDirectRateLimiter, Quota};
use std::fmt;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::time::Instant;

/// Slowest a bucket ever refills, whatever rate it is given.
const MAX_REFILL_PERIOD: Duration = Duration::from_secs(3_600);

pub struct RateLimiter {
    bucket: DefaultDirectRateLimiter,
    calls: AtomicU64,
}

impl RateLimiter {
    pub fn new(capacity: u32, refill_per_sec: f64) -> Self {
        Self {
            bucket: governor::RateLimiter::direct(quota(capacity, refill_per_sec)),
            calls: AtomicU64::new(0),
        }
    }

    pub fn from_config(cfg: &LimitsConfig) -> Self {
        Self::new(cfg.burst, cfg.requests_per_sec)
    }

    /// Wait for a token.
    pub async fn acquire(&self) {
        self.bucket.until_ready().await;
        self.calls.fetch_add(1, Ordering::Relaxed);
    }

    /// External calls let through so far.
    pub fn calls(&self) -> u64 {
        self.calls.load(Ordering::Relaxed)
    }
}

impl fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RateLimiter")
            .field("calls", &self.calls())
            .finish_non_exhaustive()
    }
}

/// One token every `1 / refill_per_sec` seconds, up to `capacity` banked.
/// Rates too small or not finite fall back to the slowest period.
fn quota(capacity: u32, refill_per_sec: f64) -> Quota {
    let burst = NonZeroU32::new(capacity).unwrap_or(NonZeroU32::MIN);
    let period = Duration::try_from_secs_f64(1.0 / refill_per_sec)
        .unwrap_or(MAX_REFILL_PERIOD)
        .clamp(Duration::from_nanos(1), MAX_REFILL_PERIOD);
    Quota::with_period(period)
        .unwrap_or_else(|| Quota::per_second(NonZeroU32::MAX))
        .allow_burst(burst)
}

/// Global stop condition for one run: wall clock and/or call count.
#[derive(Debug, Clone)]
pub struct RunBudget {
    started: Instant,
    time_budget: Option<Duration>,
    call_budget: Option<u64>,
    limiter: Arc<RateLimiter>,
}

impl RunBudget {
    pub fn new(
        limiter: Arc<RateLimiter>,
        time_budget: Option<Duration>,
        call_budget: Option<u64>,
    ) -> Self {
        Self {
            started: Instant::now(),
            time_budget,
            call_budget,
            limiter,
        }
    }

    pub fn from_config(limiter: Arc<RateLimiter>, cfg: &LimitsConfig) -> Self {
        Self::new(
            limiter,
            cfg.time_budget_secs.map(Duration::from_secs),
            cfg.call_budget,
        )
    }

    #[cfg(test)]
    pub fn unlimited(limiter: Arc<RateLimiter>) -> Self {
        Self::new(limiter, None, None)
    }

    pub fn exhausted(&self) -> bool {
        let out_of_time = self
            .time_budget
            .is_some_and(|budget| self.started.elapsed() >= budget);
        let out_of_calls = self
            .call_budget
            .is_some_and(|budget| self.limiter.calls() >= budget);
        out_of_time || out_of_calls
    }
}

pub struct ThrottledFetcher {
    inner: Arc<dyn LyricsFetcher>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledFetcher {
    pub fn new(inner: Arc<dyn LyricsFetcher>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl LyricsFetcher for ThrottledFetcher {
    async fn fetch_lyrics(
        &self,
        title: &str,
        primary_artist: &str,
    ) -> anyhow::Result<LyricsOutcome> {
        self.limiter.acquire().await;
        self.inner.fetch_lyrics(title, primary_artist).await
    }
}

pub struct ThrottledDetector {
    inner: Arc<dyn TextDetector>,
    limiter: Arc<RateLimiter>,
}

impl ThrottledDetector {
    pub fn new(inner: Arc<dyn TextDetector>, limiter: Arc<RateLimiter>) -> Self {
        Self { inner, limiter }
    }
}

#[async_trait]
impl TextDetector for ThrottledDetector {
    async fn detect(&self, text: &str) -> anyhow::Result<Detection> {
        self.limiter.acquire().await;
        self.inner.detect(text).await
    }
}
