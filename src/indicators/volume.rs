// =============================================================================
// Volume-based indicators — OBV, CMF, RVOL
// =============================================================================
//
// OBV (On-Balance Volume): running sum of volume signed by the close-to-close
// direction. The absolute level is meaningless; the slope carries the signal.
//
// CMF (Chaikin Money Flow):
//   mfm_t = ((C - L) - (H - C)) / (H - L)        money-flow multiplier
//   cmf_t = sum(mfm * V, n) / sum(V, n)          in [-1, +1]
//
// RVOL (Relative Volume): volume / SMA(volume, n). 1.0 means average
// participation; > 1.5 marks the burst the entry predicate requires.
// =============================================================================

use crate::indicators::sma;
use crate::market_data::Candle;

/// On-Balance Volume. Defined from the first bar (seeded at 0.0), so there is
/// no NaN warm-up prefix.
pub fn obv(candles: &[Candle]) -> Vec<f64> {
    let mut out = vec![0.0; candles.len()];
    for i in 1..candles.len() {
        let delta = candles[i].close - candles[i - 1].close;
        let signed = if delta > 0.0 {
            candles[i].volume
        } else if delta < 0.0 {
            -candles[i].volume
        } else {
            0.0
        };
        out[i] = out[i - 1] + signed;
    }
    out
}

/// Chaikin Money Flow over `period` bars. NaN for the first `period - 1`
/// positions and wherever the window's total volume is zero. A bar with
/// `high == low` contributes zero money flow.
pub fn cmf(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < period {
        return out;
    }

    let mfv: Vec<f64> = candles
        .iter()
        .map(|c| {
            let range = c.high - c.low;
            if range > 0.0 {
                ((c.close - c.low) - (c.high - c.close)) / range * c.volume
            } else {
                0.0
            }
        })
        .collect();

    for i in (period - 1)..n {
        let window = i + 1 - period..=i;
        let vol_sum: f64 = candles[window.clone()].iter().map(|c| c.volume).sum();
        if vol_sum > 0.0 {
            let mfv_sum: f64 = mfv[window].iter().sum();
            out[i] = mfv_sum / vol_sum;
        }
    }

    out
}

/// Relative volume: `volume / SMA(volume, period)`. NaN during the SMA
/// warm-up and wherever the average volume is zero.
pub fn rvol(candles: &[Candle], period: usize) -> Vec<f64> {
    let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();
    let avg = sma(&volumes, period);
    volumes
        .iter()
        .zip(avg.iter())
        .map(|(v, a)| if *a > 0.0 { v / a } else { f64::NAN })
        .collect()
}
