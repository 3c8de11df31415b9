// =============================================================================
// Sentiment provider — twice-daily refresh with fallback backend
// =============================================================================
//
// Sentiment is slow-moving context, not a trading signal: one refresh per
// UTC half-day window (00:00 and 12:00 boundaries) per symbol. Within a
// window the cached snapshot is reused. A failing primary backend falls
// through to the secondary; if both fail the snapshot degrades to neutral
// rather than blocking the cycle.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Half-day refresh window in milliseconds.
const WINDOW_MS: i64 = 43_200_000;

/// One sentiment observation. Scores live in [-1, +1];
/// `sent_trend = sent_24h - sent_7d`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SentimentSnapshot {
    pub sent_24h: f64,
    pub sent_7d: f64,
    pub sent_trend: f64,
    pub burst: f64,
    pub sources: serde_json::Value,
}

impl SentimentSnapshot {
    /// The degraded snapshot used when every backend fails.
    pub fn neutral() -> Self {
        Self {
            sent_24h: 0.0,
            sent_7d: 0.0,
            sent_trend: 0.0,
            burst: 0.0,
            sources: serde_json::json!({"fallback": true}),
        }
    }

    fn clamped(sent_24h: f64, sent_7d: f64, burst: f64, sources: serde_json::Value) -> Self {
        let s24 = sent_24h.clamp(-1.0, 1.0);
        let s7 = sent_7d.clamp(-1.0, 1.0);
        Self {
            sent_24h: s24,
            sent_7d: s7,
            sent_trend: s24 - s7,
            burst: burst.max(0.0),
            sources,
        }
    }
}

/// A raw sentiment source. Implementations return unclamped scores; the
/// provider normalises them.
#[async_trait]
pub trait SentimentBackend: Send + Sync {
    async fn fetch(&self, symbol: &str) -> Result<(f64, f64, f64, serde_json::Value)>;
    fn name(&self) -> &'static str;
}

// ---------------------------------------------------------------------------
// HTTP backend
// ---------------------------------------------------------------------------

/// Keyed HTTP backend against a JSON sentiment API.
pub struct HttpSentimentBackend {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
    label: &'static str,
}

impl HttpSentimentBackend {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>, label: &'static str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");
        Self {
            client,
            base_url: base_url.into(),
            api_key: api_key.into(),
            label,
        }
    }
}

#[async_trait]
impl SentimentBackend for HttpSentimentBackend {
    async fn fetch(&self, symbol: &str) -> Result<(f64, f64, f64, serde_json::Value)> {
        let url = format!("{}?symbol={}", self.base_url, symbol);
        let resp = self
            .client
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .with_context(|| format!("{} sentiment request failed", self.label))?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .with_context(|| format!("{} sentiment response unparseable", self.label))?;
        if !status.is_success() {
            anyhow::bail!("{} sentiment returned {}: {}", self.label, status, body);
        }

        let sent_24h = body["sent_24h"].as_f64().context("missing sent_24h")?;
        let sent_7d = body["sent_7d"].as_f64().context("missing sent_7d")?;
        let burst = body["burst"].as_f64().unwrap_or(0.0);
        let sources = body
            .get("sources")
            .cloned()
            .unwrap_or_else(|| serde_json::json!({ "provider": self.label }));
        Ok((sent_24h, sent_7d, burst, sources))
    }

    fn name(&self) -> &'static str {
        self.label
    }
}

impl std::fmt::Debug for HttpSentimentBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpSentimentBackend")
            .field("base_url", &self.base_url)
            .field("api_key", &"<redacted>")
            .field("label", &self.label)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Provider with window cache
// ---------------------------------------------------------------------------

/// Caching provider over a primary and a secondary backend.
pub struct SentimentProvider {
    primary: Option<Box<dyn SentimentBackend>>,
    secondary: Option<Box<dyn SentimentBackend>>,
    cache: Mutex<HashMap<String, (i64, SentimentSnapshot)>>,
}

impl SentimentProvider {
    pub fn new(
        primary: Option<Box<dyn SentimentBackend>>,
        secondary: Option<Box<dyn SentimentBackend>>,
    ) -> Self {
        Self {
            primary,
            secondary,
            cache: Mutex::new(HashMap::new()),
        }
    }

    /// The standard stack: both backends against the same keyed API family.
    /// No key configured => no backends, every snapshot is neutral.
    pub fn from_key(api_key: Option<&str>) -> Self {
        match api_key {
            Some(key) => Self::new(
                Some(Box::new(HttpSentimentBackend::new(
                    "https://api.senticrypt.com/v2/score",
                    key,
                    "senticrypt",
                ))),
                Some(Box::new(HttpSentimentBackend::new(
                    "https://api.cryptopanic.com/v1/sentiment",
                    key,
                    "cryptopanic",
                ))),
            ),
            None => Self::new(None, None),
        }
    }

    /// Which half-day refresh window `now_ms` belongs to.
    pub fn window_id(now_ms: i64) -> i64 {
        now_ms.div_euclid(WINDOW_MS)
    }

    /// Return the snapshot for `symbol`, refreshing only when the current
    /// window has no cached value yet.
    ///
    /// The bool is true when a fresh fetch happened (the caller persists the
    /// snapshot only then).
    pub async fn snapshot(&self, symbol: &str, now_ms: i64) -> (SentimentSnapshot, bool) {
        let window = Self::window_id(now_ms);

        if let Some((cached_window, snap)) = self.cache.lock().get(symbol) {
            if *cached_window == window {
                debug!(symbol, window, "sentiment cache hit");
                return (snap.clone(), false);
            }
        }

        let snap = self.refresh(symbol).await;
        self.cache
            .lock()
            .insert(symbol.to_string(), (window, snap.clone()));
        (snap, true)
    }

    async fn refresh(&self, symbol: &str) -> SentimentSnapshot {
        for backend in [&self.primary, &self.secondary].into_iter().flatten() {
            match backend.fetch(symbol).await {
                Ok((s24, s7, burst, sources)) => {
                    debug!(symbol, backend = backend.name(), "sentiment refreshed");
                    return SentimentSnapshot::clamped(s24, s7, burst, sources);
                }
                Err(e) => {
                    warn!(symbol, backend = backend.name(), error = %e, "sentiment backend failed");
                }
            }
        }
        SentimentSnapshot::neutral()
    }
}

impl std::fmt::Debug for SentimentProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SentimentProvider")
            .field("primary", &self.primary.as_ref().map(|b| b.name()))
            .field("secondary", &self.secondary.as_ref().map(|b| b.name()))
            .finish()
    }
}
