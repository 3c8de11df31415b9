// =============================================================================
// Average Directional Index (ADX)
// =============================================================================
//
// ADX quantifies trend **strength** regardless of direction.
//
// Calculation pipeline:
//   1. Compute +DM (positive directional movement) and -DM per bar.
//   2. Compute True Range (TR) per bar.
//   3. Apply Wilder's smoothing (period) to +DM, -DM, and TR.
//   4. Derive +DI = smoothed(+DM) / smoothed(TR) * 100
//            -DI = smoothed(-DM) / smoothed(TR) * 100
//   5. DX  = |+DI - -DI| / (+DI + -DI) * 100
//   6. ADX = Wilder's smoothed average of DX over `period` bars.
//
// Interpretation (used by the regime classifier):
//   ADX > 20  => trending market
//   ADX <= 20 => ranging / choppy market
// =============================================================================

use crate::market_data::Candle;

/// Compute the ADX series. Output is in [0, 100] where finite.
///
/// The first finite value sits at index `2 * period`: one bar is consumed by
/// the first TR pair, `period` pairs seed the directional smoothing, and
/// another `period` DX values seed the ADX average.
pub fn adx(candles: &[Candle], period: usize) -> Vec<f64> {
    let n = candles.len();
    let mut out = vec![f64::NAN; n];
    if period == 0 || n < 2 * period + 1 {
        return out;
    }

    let period_f = period as f64;
    let bar_count = n - 1;

    // Step 1 & 2: raw +DM, -DM, TR per consecutive pair.
    let mut plus_dm = Vec::with_capacity(bar_count);
    let mut minus_dm = Vec::with_capacity(bar_count);
    let mut tr_vals = Vec::with_capacity(bar_count);

    for i in 1..n {
        let high = candles[i].high;
        let low = candles[i].low;
        let prev_high = candles[i - 1].high;
        let prev_low = candles[i - 1].low;
        let prev_close = candles[i - 1].close;

        let tr = (high - low)
            .max((high - prev_close).abs())
            .max((low - prev_close).abs());

        let up_move = high - prev_high;
        let down_move = prev_low - low;

        plus_dm.push(if up_move > down_move && up_move > 0.0 {
            up_move
        } else {
            0.0
        });
        minus_dm.push(if down_move > up_move && down_move > 0.0 {
            down_move
        } else {
            0.0
        });
        tr_vals.push(tr);
    }

    // Step 3: Wilder's smoothing, seeded with plain sums of the first window.
    let mut smooth_plus: f64 = plus_dm[..period].iter().sum();
    let mut smooth_minus: f64 = minus_dm[..period].iter().sum();
    let mut smooth_tr: f64 = tr_vals[..period].iter().sum();

    // DX per bar, aligned to candle index (pair j covers candle j + 1).
    let mut dx = vec![f64::NAN; n];
    dx[period] = compute_dx(smooth_plus, smooth_minus, smooth_tr);

    for j in period..bar_count {
        smooth_plus = smooth_plus - smooth_plus / period_f + plus_dm[j];
        smooth_minus = smooth_minus - smooth_minus / period_f + minus_dm[j];
        smooth_tr = smooth_tr - smooth_tr / period_f + tr_vals[j];
        dx[j + 1] = compute_dx(smooth_plus, smooth_minus, smooth_tr);
    }

    // Step 6: ADX seeded with the SMA of the first `period` DX values.
    let seed: f64 = dx[period..period + period].iter().sum::<f64>() / period_f;
    out[2 * period] = seed;

    let mut prev = seed;
    for i in (2 * period + 1)..n {
        let v = (prev * (period_f - 1.0) + dx[i]) / period_f;
        out[i] = v;
        prev = v;
    }

    out
}

/// DX from smoothed directional movement. A dead market (zero TR) yields 0.
fn compute_dx(smooth_plus: f64, smooth_minus: f64, smooth_tr: f64) -> f64 {
    if smooth_tr == 0.0 {
        return 0.0;
    }
    let plus_di = smooth_plus / smooth_tr * 100.0;
    let minus_di = smooth_minus / smooth_tr * 100.0;
    let di_sum = plus_di + minus_di;
    if di_sum == 0.0 {
        0.0
    } else {
        (plus_di - minus_di).abs() / di_sum * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle(high: f64, low: f64, close: f64) -> Candle {
        Candle::new(0, 0, close, high, low, close, 100.0)
    }

    fn trending(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle(base + 1.0, base - 1.0, base + 0.8)
            })
            .collect()
    }

    fn ranging(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + if i % 2 == 0 { 1.0 } else { -1.0 };
                candle(base + 1.0, base - 1.0, base)
            })
            .collect()
    }

    #[test]
    fn adx_insufficient_data() {
        assert!(adx(&trending(20), 14).iter().all(|x| x.is_nan()));
    }

    #[test]
    fn adx_warmup_prefix() {
        let a = adx(&trending(60), 14);
        assert!(a[..28].iter().all(|x| x.is_nan()));
        assert!(!a[28].is_nan());
    }

    #[test]
    fn adx_bounds() {
        for v in adx(&trending(100), 14).iter().filter(|v| !v.is_nan()) {
            assert!(*v >= 0.0 && *v <= 100.0, "ADX out of bounds: {v}");
        }
    }

    #[test]
    fn adx_high_in_steady_trend() {
        let a = adx(&trending(100), 14);
        let last = a[99];
        assert!(last > 25.0, "steady trend should give high ADX, got {last}");
    }

    #[test]
    fn adx_low_in_chop() {
        let a = adx(&ranging(100), 14);
        let last = a[99];
        assert!(last < 20.0, "alternating chop should give low ADX, got {last}");
    }

    #[test]
    fn adx_dead_market_is_zero() {
        // Identical bars: zero TR, zero DM.
        let candles: Vec<Candle> = (0..60).map(|_| candle(100.0, 100.0, 100.0)).collect();
        let a = adx(&candles, 14);
        assert!(a[59].abs() < 1e-12);
    }
}
