// =============================================================================
// Donchian Channel
// =============================================================================
//
// upper_t = max(high_{t-n} .. high_{t-1})
// lower_t = min(low_{t-n}  .. low_{t-1})
//
// The window EXCLUDES the current bar: a close above `upper_t` is a breakout
// of the prior n-bar range, which is what the entry predicate needs. The
// channel at bar t is therefore computable before bar t closes.
// =============================================================================

use crate::market_data::Candle;

/// Full-length Donchian channel series (exclusive of the current bar).
#[derive(Debug, Clone)]
pub struct DonchianChannel {
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
}

/// Compute the Donchian channel over `candles` with look-back `period`.
///
/// NaN in the first `period` positions (the window needs `period` complete
/// prior bars).
pub fn donchian(candles: &[Candle], period: usize) -> DonchianChannel {
    let n = candles.len();
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];

    if period == 0 {
        return DonchianChannel { upper, lower };
    }

    for i in period..n {
        let window = &candles[i - period..i];
        let mut hi = f64::NEG_INFINITY;
        let mut lo = f64::INFINITY;
        for c in window {
            hi = hi.max(c.high);
            lo = lo.min(c.low);
        }
        upper[i] = hi;
        lower[i] = lo;
    }

    DonchianChannel { upper, lower }
}
