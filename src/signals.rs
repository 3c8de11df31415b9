// =============================================================================
// Signal rules — regime classifier, entry/exit predicates, sizing, stops
// =============================================================================
//
// Everything here is deterministic and pure: the same feature row and
// position state always produce the same verdict. The orchestrator owns
// sequencing; this module owns the rule arithmetic.
//
// Entry (trend-gated breakout):
//   long:  close > Donchian_upper(20)  AND  CMF(20) > 0  AND  RVOL(20) > 1.5
//   short: mirrored, only when enabled by config
//
// Exits, first match wins:
//   1. stop hit (fill at the stop price)
//   2. trailing-stop ratchet on each new extreme (not itself an exit)
//   3. time stop after TIME_STOP_BARS without a new extreme
// =============================================================================

use crate::features::FeatureRow;
use crate::market_data::Candle;
use crate::types::{ExitReason, Regime, Side};

/// ADX threshold separating trend from chop.
pub const ADX_TREND_MIN: f64 = 20.0;
/// RVOL participation floor for entries.
pub const RVOL_MIN: f64 = 1.5;
/// ATR multiplier for the initial and trailing stop distance.
pub const STOP_ATR_MULT: f64 = 2.0;
/// Bars without a new extreme before the time stop fires (2 x lookback 20).
pub const TIME_STOP_BARS: i64 = 40;
/// Bars of entry suppression after a stop-out.
pub const COOLDOWN_BARS: i64 = 3;
/// Smallest representable fill quantity; sizing below this rejects.
const QTY_EPSILON: f64 = 1e-6;

/// Classify the market regime from the latest feature row.
///
/// `trend` iff ADX(14) > 20 and EMA50 > EMA200; everything else is `chop`.
pub fn classify_regime(row: &FeatureRow) -> Regime {
    if row.adx14 > ADX_TREND_MIN && row.ema50 > row.ema200 {
        Regime::Trend
    } else {
        Regime::Chop
    }
}

/// Directional trend check used by the entry predicate and the validator's
/// regime gate: longs need a bullish trend, shorts the mirrored bearish one.
pub fn trend_direction(row: &FeatureRow) -> Option<Side> {
    if row.adx14 > ADX_TREND_MIN {
        if row.ema50 > row.ema200 {
            return Some(Side::Long);
        }
        if row.ema50 < row.ema200 {
            return Some(Side::Short);
        }
    }
    None
}

/// Evaluate the entry predicate on the latest closed bar.
///
/// Returns the side to enter, or `None` when no breakout condition holds.
/// NaN in any consumed field fails every comparison, so a not-yet-warm row
/// can never fire.
pub fn entry_signal(row: &FeatureRow, allow_shorts: bool) -> Option<Side> {
    match trend_direction(row) {
        Some(Side::Long) => {
            if row.close > row.donchian_upper && row.cmf20 > 0.0 && row.rvol20 > RVOL_MIN {
                return Some(Side::Long);
            }
            None
        }
        Some(Side::Short) if allow_shorts => {
            if row.close < row.donchian_lower && row.cmf20 < 0.0 && row.rvol20 > RVOL_MIN {
                return Some(Side::Short);
            }
            None
        }
        _ => None,
    }
}

/// Initial protective stop: `entry - side_sign * multiplier * ATR`. The
/// standard multiplier is [`STOP_ATR_MULT`]; the advisor may propose a
/// different one, bounded later by the consultant clamp and the validator.
pub fn initial_stop(entry: f64, atr: f64, multiplier: f64, side: Side) -> f64 {
    entry - side.sign() * multiplier * atr
}

/// Risk-budget position sizing with an exposure clamp.
///
/// `qty = (risk_budget * nav) / (side_sign * (entry - stop))`, clamped so
/// `qty * entry <= max_exposure * nav`. Returns `None` when the stop sits on
/// the wrong side of the entry or the clamped quantity rounds to zero.
pub fn position_size(
    nav: f64,
    entry: f64,
    stop: f64,
    side: Side,
    risk_budget: f64,
    max_exposure: f64,
) -> Option<f64> {
    let stop_distance = side.sign() * (entry - stop);
    if stop_distance <= 0.0 || entry <= 0.0 || nav <= 0.0 {
        return None;
    }

    let mut qty = (risk_budget * nav) / stop_distance;
    let exposure_cap = max_exposure * nav / entry;
    if qty > exposure_cap {
        qty = exposure_cap;
    }

    // Round down to exchange-style 1e-6 lot precision.
    qty = (qty * 1e6).floor() / 1e6;
    if qty < QTY_EPSILON {
        return None;
    }
    Some(qty)
}

/// Outcome of evaluating the exit rules for one open position on one bar.
#[derive(Debug, Clone, PartialEq)]
pub struct ExitEvaluation {
    /// Exit to execute, with the reference price to fill against.
    pub exit: Option<(ExitReason, f64)>,
    /// Ratcheted stop, present when the bar set a new extreme.
    pub updated_stop: Option<f64>,
    /// New extreme price + bar ts, present alongside `updated_stop`.
    pub updated_extreme: Option<(f64, i64)>,
}

/// Evaluate the exit predicates, in order, for one bar.
///
/// * `extreme_price` / `extreme_ts` — best price seen since entry and the
///   bar that set it (starts at the entry fill).
/// * `atr` — current ATR(14), used for the trailing distance.
/// * `tf_ms` — bar duration, for the time-stop bar count.
pub fn evaluate_exit(
    side: Side,
    stop: f64,
    extreme_price: f64,
    extreme_ts: i64,
    bar: &Candle,
    atr: f64,
    tf_ms: i64,
) -> ExitEvaluation {
    // 1. Stop hit — fill assumed at the stop price.
    let stop_hit = match side {
        Side::Long => bar.low <= stop,
        Side::Short => bar.high >= stop,
    };
    if stop_hit {
        return ExitEvaluation {
            exit: Some((ExitReason::Stop, stop)),
            updated_stop: None,
            updated_extreme: None,
        };
    }

    // 2. Trailing ratchet — new extreme pulls the stop along, never back.
    let (new_extreme, candidate_stop) = match side {
        Side::Long if bar.high > extreme_price => {
            (Some((bar.high, bar.open_time)), bar.high - STOP_ATR_MULT * atr)
        }
        Side::Short if bar.low < extreme_price => {
            (Some((bar.low, bar.open_time)), bar.low + STOP_ATR_MULT * atr)
        }
        _ => (None, stop),
    };
    if let Some(extreme) = new_extreme {
        let ratcheted = match side {
            Side::Long => candidate_stop.max(stop),
            Side::Short => candidate_stop.min(stop),
        };
        return ExitEvaluation {
            exit: None,
            updated_stop: Some(ratcheted),
            updated_extreme: Some(extreme),
        };
    }

    // 3. Time stop — no new extreme for TIME_STOP_BARS, exit at close.
    if tf_ms > 0 {
        let bars_since_extreme = (bar.open_time - extreme_ts) / tf_ms;
        if bars_since_extreme >= TIME_STOP_BARS {
            return ExitEvaluation {
                exit: Some((ExitReason::Time, bar.close)),
                updated_stop: None,
                updated_extreme: None,
            };
        }
    }

    ExitEvaluation {
        exit: None,
        updated_stop: None,
        updated_extreme: None,
    }
}
