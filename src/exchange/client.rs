// =============================================================================
// Binance REST adapter — public klines endpoint with self-imposed throttling
// =============================================================================
//
// Binance allows 1200 request-weight per minute on public endpoints; a
// single-user daemon polling a handful of symbols once a minute sits far
// below that, but the adapter still enforces a minimum gap between requests
// so that a misconfigured 1-second cycle cannot hammer the venue.
// =============================================================================

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::time::{Duration, Instant};
use tracing::debug;

use crate::market_data::Candle;

use super::ExchangeAdapter;

/// Minimum gap between consecutive requests.
const MIN_REQUEST_GAP: Duration = Duration::from_millis(250);

/// The newest kline returned by Binance is the still-open bar; it is fetched
/// and dropped so only closed bars reach the pipeline.
pub struct BinanceAdapter {
    client: reqwest::Client,
    base_url: String,
    last_request: Mutex<Option<Instant>>,
}

impl BinanceAdapter {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .expect("failed to build reqwest client");

        Self {
            client,
            base_url: "https://api.binance.com".to_string(),
            last_request: Mutex::new(None),
        }
    }

    #[cfg(test)]
    fn with_base_url(base_url: impl Into<String>) -> Self {
        let mut adapter = Self::new();
        adapter.base_url = base_url.into();
        adapter
    }

    /// Sleep just long enough to honour `MIN_REQUEST_GAP`.
    async fn throttle(&self) {
        let wait = {
            let last = self.last_request.lock();
            last.and_then(|t| MIN_REQUEST_GAP.checked_sub(t.elapsed()))
        };
        if let Some(d) = wait {
            tokio::time::sleep(d).await;
        }
        *self.last_request.lock() = Some(Instant::now());
    }

    async fn get_klines(&self, query: &str) -> Result<Vec<Candle>> {
        self.throttle().await;

        let url = format!("{}/api/v3/klines?{}", self.base_url, query);
        let resp = self
            .client
            .get(&url)
            .send()
            .await
            .context("GET /api/v3/klines request failed")?;

        let status = resp.status();
        let body: serde_json::Value = resp
            .json()
            .await
            .context("failed to parse klines response")?;

        if !status.is_success() {
            anyhow::bail!("Binance GET /api/v3/klines returned {}: {}", status, body);
        }

        let raw = body.as_array().context("klines response is not an array")?;
        let mut candles = Vec::with_capacity(raw.len());
        for entry in raw {
            candles.push(parse_kline_entry(entry)?);
        }

        // Drop the trailing in-progress bar.
        candles.pop();
        debug!(query, count = candles.len(), "klines fetched");
        Ok(candles)
    }
}

impl Default for BinanceAdapter {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ExchangeAdapter for BinanceAdapter {
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize) -> Result<Vec<Candle>> {
        // One extra row covers the dropped in-progress bar.
        let query = format!("symbol={symbol}&interval={timeframe}&limit={}", limit + 1);
        self.get_klines(&query).await
    }

    async fn fetch_ohlcv_since(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ts: i64,
    ) -> Result<Vec<Candle>> {
        let query = format!(
            "symbol={symbol}&interval={timeframe}&startTime={}&limit=1000",
            since_ts + 1
        );
        self.get_klines(&query).await
    }
}

/// Parse one kline from Binance's array-of-arrays format.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, ... (remaining fields unused)
fn parse_kline_entry(entry: &serde_json::Value) -> Result<Candle> {
    let arr = entry.as_array().context("kline entry is not an array")?;
    if arr.len() < 7 {
        anyhow::bail!("malformed kline entry with {} elements", arr.len());
    }

    Ok(Candle::new(
        arr[0].as_i64().context("missing kline open time")?,
        arr[6].as_i64().context("missing kline close time")?,
        parse_str_f64(&arr[1])?,
        parse_str_f64(&arr[2])?,
        parse_str_f64(&arr[3])?,
        parse_str_f64(&arr[4])?,
        parse_str_f64(&arr[5])?,
    ))
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &serde_json::Value) -> Result<f64> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .with_context(|| format!("failed to parse '{s}' as f64"))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        anyhow::bail!("expected string or number, got: {val}")
    }
}

impl std::fmt::Debug for BinanceAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceAdapter")
            .field("base_url", &self.base_url)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_kline_string_fields() {
        let entry = serde_json::json!([
            1700000000000i64,
            "100.5",
            "101.0",
            "99.5",
            "100.8",
            "1234.5",
            1700000299999i64,
            "124000.0",
            42,
            "600.0",
            "60400.0",
            "0"
        ]);
        let c = parse_kline_entry(&entry).unwrap();
        assert_eq!(c.open_time, 1700000000000);
        assert_eq!(c.close_time, 1700000299999);
        assert!((c.open - 100.5).abs() < 1e-12);
        assert!((c.close - 100.8).abs() < 1e-12);
        assert!((c.volume - 1234.5).abs() < 1e-12);
    }

    #[test]
    fn parse_kline_rejects_short_entry() {
        let entry = serde_json::json!([1, "2", "3"]);
        assert!(parse_kline_entry(&entry).is_err());
    }

    #[test]
    fn parse_str_f64_accepts_numbers() {
        assert_eq!(parse_str_f64(&serde_json::json!(3.25)).unwrap(), 3.25);
        assert_eq!(parse_str_f64(&serde_json::json!("3.25")).unwrap(), 3.25);
        assert!(parse_str_f64(&serde_json::json!(null)).is_err());
        assert!(parse_str_f64(&serde_json::json!("abc")).is_err());
    }

    #[tokio::test]
    async fn throttle_enforces_gap() {
        let adapter = BinanceAdapter::with_base_url("http://unused.invalid");
        let start = Instant::now();
        adapter.throttle().await;
        adapter.throttle().await;
        assert!(start.elapsed() >= MIN_REQUEST_GAP);
    }
}
