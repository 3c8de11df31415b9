// =============================================================================
// Market data types — OHLCV candles and series keys
// =============================================================================
//
// A candle is immutable once its bar closes. The ingest stage only ever
// persists closed bars; the in-progress bar is never fetched (the exchange
// adapter asks for `limit + 1` and drops the last, still-open entry).
// =============================================================================

use serde::{Deserialize, Serialize};

/// A single closed OHLCV candle.
///
/// `open_time` / `close_time` are UTC milliseconds. `close_time` is the
/// instant the bar stopped accepting trades, used by the staleness gate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        close_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Bar range as a fraction of the close. Feeds the slippage model.
    pub fn hl_pct(&self) -> f64 {
        if self.close > 0.0 {
            (self.high - self.low) / self.close
        } else {
            0.0
        }
    }
}

/// Composite key that identifies a unique candle series.
#[derive(Debug, Clone, Hash, Eq, PartialEq, Serialize, Deserialize)]
pub struct CandleKey {
    pub symbol: String,
    pub timeframe: String,
}

impl CandleKey {
    pub fn new(symbol: impl Into<String>, timeframe: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            timeframe: timeframe.into(),
        }
    }
}

impl std::fmt::Display for CandleKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}@{}", self.symbol, self.timeframe)
    }
}

/// Parse a timeframe label ("1m", "5m", "15m", "1h", "4h", "1d") into
/// milliseconds. Unknown labels return `None` so config validation can
/// reject them at boot.
pub fn timeframe_ms(tf: &str) -> Option<i64> {
    let (num, unit) = tf.split_at(tf.len().checked_sub(1)?);
    let n: i64 = num.parse().ok()?;
    if n <= 0 {
        return None;
    }
    let unit_ms = match unit {
        "m" => 60_000,
        "h" => 3_600_000,
        "d" => 86_400_000,
        _ => return None,
    };
    Some(n * unit_ms)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn candle_hl_pct() {
        let c = Candle::new(0, 0, 100.0, 102.0, 99.0, 100.0, 10.0);
        assert!((c.hl_pct() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn candle_hl_pct_zero_close() {
        let c = Candle::new(0, 0, 0.0, 0.0, 0.0, 0.0, 0.0);
        assert_eq!(c.hl_pct(), 0.0);
    }

    #[test]
    fn key_display() {
        let key = CandleKey::new("BTCUSDT", "5m");
        assert_eq!(key.to_string(), "BTCUSDT@5m");
    }

    #[test]
    fn timeframe_parsing() {
        assert_eq!(timeframe_ms("1m"), Some(60_000));
        assert_eq!(timeframe_ms("5m"), Some(300_000));
        assert_eq!(timeframe_ms("1h"), Some(3_600_000));
        assert_eq!(timeframe_ms("1d"), Some(86_400_000));
        assert_eq!(timeframe_ms("5x"), None);
        assert_eq!(timeframe_ms(""), None);
        assert_eq!(timeframe_ms("0m"), None);
    }
}
