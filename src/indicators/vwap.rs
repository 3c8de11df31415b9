// =============================================================================
// VWAP — session-anchored and breakout-anchored variants
// =============================================================================
//
// Both accumulate typical-price * volume over volume:
//
//   vwap_t = sum(tp_i * v_i, anchor..t) / sum(v_i, anchor..t)
//   tp_i   = (high + low + close) / 3
//
// Session VWAP resets the anchor at every UTC day boundary (00:00), derived
// from the candle's `open_time`. Anchored VWAP (AVWAP) anchors at the most
// recent Donchian-upper breakout bar and re-anchors whenever a new breakout
// occurs.
// =============================================================================

use crate::indicators::donchian::donchian;
use crate::market_data::Candle;

const DAY_MS: i64 = 86_400_000;

fn typical_price(c: &Candle) -> f64 {
    (c.high + c.low + c.close) / 3.0
}

/// Session VWAP, reset at each UTC 00:00 boundary.
///
/// Defined from the first bar of each session; NaN only where a session's
/// cumulative volume is zero.
pub fn session_vwap(candles: &[Candle]) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    let mut session_day = i64::MIN;
    let mut pv_sum = 0.0;
    let mut v_sum = 0.0;

    for (i, c) in candles.iter().enumerate() {
        let day = c.open_time.div_euclid(DAY_MS);
        if day != session_day {
            session_day = day;
            pv_sum = 0.0;
            v_sum = 0.0;
        }
        pv_sum += typical_price(c) * c.volume;
        v_sum += c.volume;
        if v_sum > 0.0 {
            out[i] = pv_sum / v_sum;
        }
    }

    out
}

/// Anchored VWAP from the most recent Donchian-upper breakout.
///
/// A breakout bar is one whose close exceeds the prior `donchian_period`-bar
/// high. Accumulation restarts at every breakout, so after the latest
/// breakout the series reads "average price paid since the breakout". NaN
/// before the first breakout is observable.
pub fn anchored_vwap(candles: &[Candle], donchian_period: usize) -> Vec<f64> {
    let mut out = vec![f64::NAN; candles.len()];
    let channel = donchian(candles, donchian_period);

    let mut anchored = false;
    let mut pv_sum = 0.0;
    let mut v_sum = 0.0;

    for (i, c) in candles.iter().enumerate() {
        let upper = channel.upper[i];
        if !upper.is_nan() && c.close > upper {
            // New breakout: re-anchor here.
            anchored = true;
            pv_sum = 0.0;
            v_sum = 0.0;
        }
        if anchored {
            pv_sum += typical_price(c) * c.volume;
            v_sum += c.volume;
            if v_sum > 0.0 {
                out[i] = pv_sum / v_sum;
            }
        }
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn candle_at(open_time: i64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
        Candle::new(open_time, open_time + 299_999, close, high, low, close, volume)
    }

    #[test]
    fn session_vwap_equals_typical_price_for_single_bar() {
        let c = candle_at(0, 102.0, 98.0, 100.0, 10.0);
        let tp = (102.0 + 98.0 + 100.0) / 3.0;
        let v = session_vwap(&[c]);
        assert!((v[0] - tp).abs() < 1e-12);
    }

    #[test]
    fn session_vwap_resets_at_utc_midnight() {
        // Two bars on day 0, one bar just past the day-1 boundary.
        let candles = vec![
            candle_at(0, 110.0, 90.0, 100.0, 10.0),
            candle_at(300_000, 130.0, 110.0, 120.0, 10.0),
            candle_at(DAY_MS, 210.0, 190.0, 200.0, 5.0),
        ];
        let v = session_vwap(&candles);
        // Day 0 blends both bars; the day-1 value reflects only its own bar.
        let tp2 = (210.0 + 190.0 + 200.0) / 3.0;
        assert!((v[2] - tp2).abs() < 1e-12);
        assert!(v[1] < tp2);
    }

    #[test]
    fn session_vwap_volume_weighting() {
        let candles = vec![
            candle_at(0, 100.0, 100.0, 100.0, 90.0),
            candle_at(300_000, 200.0, 200.0, 200.0, 10.0),
        ];
        let v = session_vwap(&candles);
        // (100*90 + 200*10) / 100 = 110
        assert!((v[1] - 110.0).abs() < 1e-12);
    }

    #[test]
    fn avwap_nan_before_first_breakout() {
        let candles: Vec<Candle> = (0..30)
            .map(|i| candle_at(i * 300_000, 101.0, 99.0, 100.0, 10.0))
            .collect();
        let v = anchored_vwap(&candles, 20);
        assert!(v.iter().all(|x| x.is_nan()));
    }

    #[test]
    fn avwap_anchors_at_breakout() {
        // Flat range for 25 bars, then a breakout bar.
        let mut candles: Vec<Candle> = (0..25)
            .map(|i| candle_at(i * 300_000, 101.0, 99.0, 100.0, 10.0))
            .collect();
        candles.push(candle_at(25 * 300_000, 106.0, 102.0, 105.0, 10.0));
        let v = anchored_vwap(&candles, 20);
        assert!(v[24].is_nan());
        let tp = (106.0 + 102.0 + 105.0) / 3.0;
        assert!((v[25] - tp).abs() < 1e-12);
    }

    #[test]
    fn avwap_reanchors_on_next_breakout() {
        let mut candles: Vec<Candle> = (0..25)
            .map(|i| candle_at(i * 300_000, 101.0, 99.0, 100.0, 10.0))
            .collect();
        // First breakout, then drift, then a second, higher breakout.
        candles.push(candle_at(25 * 300_000, 106.0, 102.0, 105.0, 10.0));
        for i in 26..32 {
            candles.push(candle_at(i * 300_000, 105.0, 103.0, 104.0, 10.0));
        }
        candles.push(candle_at(32 * 300_000, 112.0, 108.0, 111.0, 10.0));
        let v = anchored_vwap(&candles, 20);
        // After re-anchor the value reflects only the newest breakout bar.
        let tp = (112.0 + 108.0 + 111.0) / 3.0;
        assert!((v[32] - tp).abs() < 1e-12);
    }
}
