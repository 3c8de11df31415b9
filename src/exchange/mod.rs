// =============================================================================
// Exchange adapter — public OHLCV fetch behind a trait seam
// =============================================================================
//
// Only public market-data endpoints are used; there is no order routing and
// no request signing. The trait exists so the orchestrator can be driven by
// an in-memory fake in tests.
// =============================================================================

pub mod client;

use anyhow::Result;
use async_trait::async_trait;

use crate::market_data::Candle;

pub use client::BinanceAdapter;

/// Source of closed OHLCV candles. Implementations MUST throttle themselves
/// to the venue's rate limit and return bars oldest-first.
#[async_trait]
pub trait ExchangeAdapter: Send + Sync {
    /// Fetch the most recent `limit` closed bars.
    async fn fetch_ohlcv(&self, symbol: &str, timeframe: &str, limit: usize)
        -> Result<Vec<Candle>>;

    /// Fetch closed bars with open time strictly after `since_ts`.
    async fn fetch_ohlcv_since(
        &self,
        symbol: &str,
        timeframe: &str,
        since_ts: i64,
    ) -> Result<Vec<Candle>>;
}

/// Retry policy for transient fetch failures: up to 3 attempts with
/// exponential backoff (500 ms, 1 s, 2 s).
pub const FETCH_RETRIES: u32 = 3;
pub const FETCH_BACKOFF_MS: u64 = 500;

/// Run `op` with the standard fetch retry schedule.
pub async fn with_retries<T, F, Fut>(label: &str, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T>>,
{
    let mut last_err = None;
    for attempt in 0..FETCH_RETRIES {
        match op().await {
            Ok(v) => return Ok(v),
            Err(e) => {
                tracing::warn!(label, attempt, error = %e, "fetch attempt failed");
                last_err = Some(e);
                if attempt + 1 < FETCH_RETRIES {
                    let delay = FETCH_BACKOFF_MS * (1 << attempt);
                    tokio::time::sleep(std::time::Duration::from_millis(delay)).await;
                }
            }
        }
    }
    Err(last_err.expect("at least one attempt ran"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[tokio::test]
    async fn retries_then_succeeds() {
        let calls = AtomicU32::new(0);
        let result: Result<u32> = with_retries("test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n < 2 {
                    anyhow::bail!("transient")
                } else {
                    Ok(n)
                }
            }
        })
        .await;
        assert_eq!(result.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn gives_up_after_budget() {
        let calls = AtomicU32::new(0);
        let result: Result<()> = with_retries("test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async move { anyhow::bail!("always down") }
        })
        .await;
        assert!(result.is_err());
        assert_eq!(calls.load(Ordering::SeqCst), FETCH_RETRIES);
    }
}
