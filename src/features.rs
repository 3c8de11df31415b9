// =============================================================================
// Feature computation — one row of indicator values per closed bar
// =============================================================================
//
// The feature stage recomputes every indicator over the fetched window and
// produces a `FeatureRow` per bar. Rows are derived data: they may be rebuilt
// from candles at any time and must never exist without the underlying
// candle. NaN fields mean "window not yet satisfied" and are persisted as
// NULL; the signal stage refuses to act until every field it needs is finite.
// =============================================================================

use serde::{Deserialize, Serialize};

use crate::indicators::{adx, atr, bollinger, donchian, ema, hma, roc, rsi, volume, vwap};
use crate::market_data::Candle;

/// The longest look-back any indicator requires (EMA200). The warm-up gate
/// inhibits signals until `3 * MAX_LOOKBACK` closed bars exist.
pub const MAX_LOOKBACK: usize = 200;

/// Closed bars required before the signal stage may fire.
pub const WARMUP_BARS: usize = 3 * MAX_LOOKBACK;

/// Bars fetched per cycle; keeps the window comfortably ahead of the gate.
pub const FETCH_BARS: usize = WARMUP_BARS + 50;

/// All computed indicators for one `(symbol, timeframe, ts)` bar.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRow {
    /// Bar open time, UTC milliseconds. Matches the candle's natural key.
    pub ts: i64,
    pub close: f64,
    pub ema50: f64,
    pub ema200: f64,
    pub hma21: f64,
    pub rsi14: f64,
    pub stoch_rsi: f64,
    pub roc10: f64,
    pub atr14: f64,
    pub bb_upper: f64,
    pub bb_mid: f64,
    pub bb_lower: f64,
    pub donchian_upper: f64,
    pub donchian_lower: f64,
    pub obv: f64,
    pub cmf20: f64,
    pub adx14: f64,
    pub rvol20: f64,
    pub session_vwap: f64,
    pub avwap: f64,
}

impl FeatureRow {
    /// True when every field the entry/regime predicates consume is finite.
    /// AVWAP is excluded: it stays NaN until the first breakout is observable
    /// and is advisory context, not a gate input.
    pub fn signal_ready(&self) -> bool {
        [
            self.ema50,
            self.ema200,
            self.atr14,
            self.donchian_upper,
            self.donchian_lower,
            self.cmf20,
            self.adx14,
            self.rvol20,
        ]
        .iter()
        .all(|v| v.is_finite())
    }
}

/// Compute a `FeatureRow` for every bar of `candles` (oldest first).
///
/// Deterministic: the same candle window always yields bit-identical rows.
pub fn compute_features(candles: &[Candle]) -> Vec<FeatureRow> {
    let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();

    let ema50 = ema::ema(&closes, 50);
    let ema200 = ema::ema(&closes, 200);
    let hma21 = hma::hma(&closes, 21);
    let rsi14 = rsi::rsi(&closes, 14);
    let stoch = rsi::stoch_rsi(&closes, 14, 14, 3);
    let roc10 = roc::roc(&closes, 10);
    let atr14 = atr::atr(candles, 14);
    let bb = bollinger::bollinger(&closes, 20, 2.0);
    let dc = donchian::donchian(candles, 20);
    let obv = volume::obv(candles);
    let cmf20 = volume::cmf(candles, 20);
    let adx14 = adx::adx(candles, 14);
    let rvol20 = volume::rvol(candles, 20);
    let svwap = vwap::session_vwap(candles);
    let avwap = vwap::anchored_vwap(candles, 20);

    candles
        .iter()
        .enumerate()
        .map(|(i, c)| FeatureRow {
            ts: c.open_time,
            close: c.close,
            ema50: ema50[i],
            ema200: ema200[i],
            hma21: hma21[i],
            rsi14: rsi14[i],
            stoch_rsi: stoch[i],
            roc10: roc10[i],
            atr14: atr14[i],
            bb_upper: bb.upper[i],
            bb_mid: bb.mid[i],
            bb_lower: bb.lower[i],
            donchian_upper: dc.upper[i],
            donchian_lower: dc.lower[i],
            obv: obv[i],
            cmf20: cmf20[i],
            adx14: adx14[i],
            rvol20: rvol20[i],
            session_vwap: svwap[i],
            avwap: avwap[i],
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synthetic(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.05 + (i as f64 * 0.21).sin();
                Candle::new(
                    i as i64 * 300_000,
                    i as i64 * 300_000 + 299_999,
                    base,
                    base + 0.8,
                    base - 0.8,
                    base + 0.2,
                    50.0 + (i % 11) as f64,
                )
            })
            .collect()
    }

    #[test]
    fn rows_match_input_length() {
        let candles = synthetic(300);
        let rows = compute_features(&candles);
        assert_eq!(rows.len(), 300);
        assert_eq!(rows[0].ts, 0);
        assert_eq!(rows[299].ts, 299 * 300_000);
    }

    #[test]
    fn early_rows_not_signal_ready() {
        let candles = synthetic(300);
        let rows = compute_features(&candles);
        assert!(!rows[0].signal_ready());
        assert!(!rows[100].signal_ready());
    }

    #[test]
    fn late_rows_signal_ready() {
        // EMA200 is the binding constraint; index 250 is well past it.
        let candles = synthetic(300);
        let rows = compute_features(&candles);
        assert!(rows[250].signal_ready());
        assert!(rows[299].signal_ready());
    }

    #[test]
    fn recompute_is_bit_identical() {
        let candles = synthetic(260);
        let a = compute_features(&candles);
        let b = compute_features(&candles);
        for (ra, rb) in a.iter().zip(b.iter()) {
            let ja = serde_json::to_string(ra).unwrap();
            let jb = serde_json::to_string(rb).unwrap();
            assert_eq!(ja, jb);
        }
    }

    #[test]
    fn short_window_never_ready() {
        // Fewer bars than the EMA200 look-back: nothing is signal-ready.
        let candles = synthetic(50);
        let rows = compute_features(&candles);
        assert!(rows.iter().all(|r| !r.signal_ready()));
    }
}
