// =============================================================================
// Relative Strength Index (RSI) and Stochastic RSI
// =============================================================================
//
// RSI (Wilder):
//   RS_t  = avg_gain_t / avg_loss_t          (Wilder-smoothed)
//   RSI_t = 100 - 100 / (1 + RS_t)           in [0, 100]
//
// StochRSI(rsi_period, stoch_period, smooth):
//   stoch_t = (RSI_t - min(RSI, stoch_period)) /
//             (max(RSI, stoch_period) - min(RSI, stoch_period))
//   output  = SMA(stoch, smooth)              in [0, 1]
// =============================================================================

use crate::indicators::sma;

/// Compute the Wilder RSI series. Full-length output with NaN in the first
/// `period` positions.
///
/// An all-gain window yields 100, an all-loss window yields 0.
pub fn rsi(closes: &[f64], period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; closes.len()];
    if period == 0 || closes.len() < period + 1 {
        return out;
    }

    let mut gains = 0.0;
    let mut losses = 0.0;
    for i in 1..=period {
        let delta = closes[i] - closes[i - 1];
        if delta >= 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let period_f = period as f64;
    let mut avg_gain = gains / period_f;
    let mut avg_loss = losses / period_f;
    out[period] = rsi_from_averages(avg_gain, avg_loss);

    for i in (period + 1)..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta >= 0.0 { (delta, 0.0) } else { (0.0, -delta) };
        avg_gain = (avg_gain * (period_f - 1.0) + gain) / period_f;
        avg_loss = (avg_loss * (period_f - 1.0) + loss) / period_f;
        out[i] = rsi_from_averages(avg_gain, avg_loss);
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        if avg_gain == 0.0 {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

/// Compute the smoothed Stochastic RSI series in [0, 1].
///
/// NaN propagates from the inner RSI warm-up, the rolling min/max window,
/// and the final SMA smoothing.
pub fn stoch_rsi(closes: &[f64], rsi_period: usize, stoch_period: usize, smooth: usize) -> Vec<f64> {
    let r = rsi(closes, rsi_period);
    let mut stoch = vec![f64::NAN; r.len()];

    if stoch_period == 0 {
        return stoch;
    }

    for i in 0..r.len() {
        if i + 1 < stoch_period {
            continue;
        }
        let window = &r[i + 1 - stoch_period..=i];
        if window.iter().any(|v| v.is_nan()) {
            continue;
        }
        let lo = window.iter().cloned().fold(f64::INFINITY, f64::min);
        let hi = window.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
        stoch[i] = if hi > lo { (r[i] - lo) / (hi - lo) } else { 0.5 };
    }

    if smooth <= 1 {
        return stoch;
    }
    // sma() yields NaN wherever any window member is NaN, so the smoothing
    // extends the warm-up prefix by `smooth - 1` positions.
    sma(&stoch, smooth)
}
