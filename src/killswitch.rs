// =============================================================================
// Kill-switch, cooldown, and symbol pause registries
// =============================================================================
//
// Kill-switch: per symbol, compare short-horizon realized volatility against
// the rolling 30-day median of the same measure. A reading above 3x the
// median flattens the symbol and blocks new entries for the next K bars.
//
// Cooldown: after any stop-out, entries are suppressed for 3 bars.
//
// Pause: a symbol that violated a ledger invariant is flattened and parked
// until an operator resets it.
//
// All three are in-memory registries behind parking_lot locks; they are
// protective state, rebuilt conservatively (empty) on restart.
// =============================================================================

use parking_lot::RwLock;
use std::collections::{HashMap, HashSet, VecDeque};
use tracing::{info, warn};

use crate::market_data::Candle;
use crate::signals::COOLDOWN_BARS;

/// Bars in the short-horizon realized-volatility window.
pub const VOL_WINDOW: usize = 12;
/// Trip threshold as a multiple of the rolling median.
pub const VOL_TRIP_RATIO: f64 = 3.0;
/// Bars the switch stays engaged once tripped.
pub const KILL_BARS: i64 = 12;
/// Observations required before the breaker may trip (a fresh daemon should
/// not trip off a thin history).
pub const MIN_HISTORY: usize = 100;
/// 30 days of 5-minute bars.
const MAX_HISTORY: usize = 8_640;

/// Standard deviation of one-bar log returns over the last `VOL_WINDOW`
/// closed bars. `None` until enough bars exist or when a close is
/// non-positive.
pub fn realized_vol(candles: &[Candle]) -> Option<f64> {
    if candles.len() < VOL_WINDOW + 1 {
        return None;
    }
    let tail = &candles[candles.len() - (VOL_WINDOW + 1)..];
    let mut returns = Vec::with_capacity(VOL_WINDOW);
    for pair in tail.windows(2) {
        if pair[0].close <= 0.0 || pair[1].close <= 0.0 {
            return None;
        }
        returns.push((pair[1].close / pair[0].close).ln());
    }
    let mean = returns.iter().sum::<f64>() / returns.len() as f64;
    let variance =
        returns.iter().map(|r| (r - mean).powi(2)).sum::<f64>() / returns.len() as f64;
    Some(variance.sqrt())
}

fn median(values: &VecDeque<f64>) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted: Vec<f64> = values.iter().copied().collect();
    sorted.sort_by(|a, b| a.partial_cmp(b).expect("vol history is finite"));
    let mid = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        Some(sorted[mid])
    } else {
        Some((sorted[mid - 1] + sorted[mid]) / 2.0)
    }
}

/// Per-symbol volatility breaker.
pub struct KillSwitch {
    /// Symbol -> engaged-until bar ts.
    engaged: RwLock<HashMap<String, i64>>,
    /// Symbol -> rolling history of the realized-vol measure.
    history: RwLock<HashMap<String, VecDeque<f64>>>,
}

impl KillSwitch {
    pub fn new() -> Self {
        Self {
            engaged: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
        }
    }

    /// Feed the latest candle window. Records the current measure, then trips
    /// the switch when it exceeds `VOL_TRIP_RATIO` x the rolling median.
    ///
    /// Returns true when the switch transitioned from clear to engaged on
    /// this observation.
    pub fn observe(&self, symbol: &str, candles: &[Candle], now_bar_ts: i64, tf_ms: i64) -> bool {
        let Some(vol) = realized_vol(candles) else {
            return false;
        };

        let tripped = {
            let mut history = self.history.write();
            let series = history.entry(symbol.to_string()).or_default();

            let verdict = if series.len() >= MIN_HISTORY {
                match median(series) {
                    Some(med) if med > 0.0 => vol > VOL_TRIP_RATIO * med,
                    _ => false,
                }
            } else {
                false
            };

            series.push_back(vol);
            while series.len() > MAX_HISTORY {
                series.pop_front();
            }
            verdict
        };

        if !tripped {
            return false;
        }

        let until = now_bar_ts + KILL_BARS * tf_ms;
        let mut engaged = self.engaged.write();
        let was_clear = engaged
            .get(symbol)
            .map_or(true, |existing| *existing <= now_bar_ts);
        engaged.insert(symbol.to_string(), until);
        if was_clear {
            warn!(symbol, vol, until, "kill-switch engaged");
        }
        was_clear
    }

    /// Whether the switch blocks `symbol` at `now_bar_ts`.
    pub fn active(&self, symbol: &str, now_bar_ts: i64) -> bool {
        self.engaged
            .read()
            .get(symbol)
            .map_or(false, |until| now_bar_ts < *until)
    }

    /// Test/ops hook: engage the switch directly.
    pub fn engage(&self, symbol: &str, until_ts: i64) {
        self.engaged.write().insert(symbol.to_string(), until_ts);
    }
}

impl Default for KillSwitch {
    fn default() -> Self {
        Self::new()
    }
}

/// Post-stop-out entry suppression.
pub struct CooldownTracker {
    until: RwLock<HashMap<String, i64>>,
}

impl CooldownTracker {
    pub fn new() -> Self {
        Self {
            until: RwLock::new(HashMap::new()),
        }
    }

    /// Start the 3-bar window after a stop-out at `bar_ts`.
    pub fn start(&self, symbol: &str, bar_ts: i64, tf_ms: i64) {
        let until = bar_ts + COOLDOWN_BARS * tf_ms;
        self.until.write().insert(symbol.to_string(), until);
        info!(symbol, until, "entry cooldown started");
    }

    pub fn active(&self, symbol: &str, now_bar_ts: i64) -> bool {
        self.until
            .read()
            .get(symbol)
            .map_or(false, |until| now_bar_ts < *until)
    }
}

impl Default for CooldownTracker {
    fn default() -> Self {
        Self::new()
    }
}

/// Symbols parked after an invariant violation, until operator reset.
pub struct SymbolPause {
    paused: RwLock<HashSet<String>>,
}

impl SymbolPause {
    pub fn new() -> Self {
        Self {
            paused: RwLock::new(HashSet::new()),
        }
    }

    pub fn pause(&self, symbol: &str) {
        warn!(symbol, "trading paused pending operator reset");
        self.paused.write().insert(symbol.to_string());
    }

    pub fn is_paused(&self, symbol: &str) -> bool {
        self.paused.read().contains(symbol)
    }

    /// Operator reset: clear the pause for a symbol.
    pub fn reset(&self, symbol: &str) -> bool {
        let removed = self.paused.write().remove(symbol);
        if removed {
            info!(symbol, "trading pause cleared by operator");
        }
        removed
    }
}

impl Default for SymbolPause {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn flat_candles(n: usize, close: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let ts = i as i64 * 300_000;
                Candle::new(ts, ts + 299_999, close, close + 0.1, close - 0.1, close, 10.0)
            })
            .collect()
    }

    fn noisy_candles(n: usize, amplitude: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let ts = i as i64 * 300_000;
                let close = 100.0 + (i as f64 * 2.3).sin() * amplitude;
                Candle::new(ts, ts + 299_999, close, close + 0.1, close - 0.1, close, 10.0)
            })
            .collect()
    }

    #[test]
    fn realized_vol_needs_window() {
        assert!(realized_vol(&flat_candles(5, 100.0)).is_none());
        assert!(realized_vol(&flat_candles(VOL_WINDOW + 1, 100.0)).is_some());
    }

    #[test]
    fn realized_vol_zero_for_flat_series() {
        let vol = realized_vol(&flat_candles(20, 100.0)).unwrap();
        assert!(vol.abs() < 1e-15);
    }

    #[test]
    fn realized_vol_scales_with_amplitude() {
        let calm = realized_vol(&noisy_candles(20, 0.1)).unwrap();
        let wild = realized_vol(&noisy_candles(20, 5.0)).unwrap();
        assert!(wild > calm * 10.0);
    }

    #[test]
    fn no_trip_without_history() {
        let ks = KillSwitch::new();
        // A single wild observation with an empty history must not trip.
        let tripped = ks.observe("BTCUSDT", &noisy_candles(20, 8.0), 0, 300_000);
        assert!(!tripped);
        assert!(!ks.active("BTCUSDT", 0));
    }

    #[test]
    fn trips_after_quiet_history_then_spike() {
        let ks = KillSwitch::new();
        let calm = noisy_candles(VOL_WINDOW + 1, 0.1);
        for i in 0..MIN_HISTORY {
            assert!(!ks.observe("BTCUSDT", &calm, i as i64 * 300_000, 300_000));
        }
        let spike_ts = MIN_HISTORY as i64 * 300_000;
        let tripped = ks.observe("BTCUSDT", &noisy_candles(VOL_WINDOW + 1, 5.0), spike_ts, 300_000);
        assert!(tripped);
        assert!(ks.active("BTCUSDT", spike_ts));
        // Engaged for KILL_BARS bars, clear afterwards.
        assert!(ks.active("BTCUSDT", spike_ts + (KILL_BARS - 1) * 300_000));
        assert!(!ks.active("BTCUSDT", spike_ts + KILL_BARS * 300_000));
    }

    #[test]
    fn retrigger_while_engaged_is_not_a_transition() {
        let ks = KillSwitch::new();
        ks.engage("BTCUSDT", 10 * 300_000);
        let calm = noisy_candles(VOL_WINDOW + 1, 0.1);
        for i in 0..MIN_HISTORY {
            ks.observe("BTCUSDT", &calm, i as i64, 300_000);
        }
        // Already engaged: trip condition holds but it is not a fresh
        // transition.
        let again = ks.observe("BTCUSDT", &noisy_candles(VOL_WINDOW + 1, 5.0), 0, 300_000);
        assert!(!again);
    }

    #[test]
    fn kill_switch_is_per_symbol() {
        let ks = KillSwitch::new();
        ks.engage("BTCUSDT", 1_000_000);
        assert!(ks.active("BTCUSDT", 0));
        assert!(!ks.active("ETHUSDT", 0));
    }

    #[test]
    fn cooldown_window() {
        let cd = CooldownTracker::new();
        cd.start("BTCUSDT", 0, 300_000);
        assert!(cd.active("BTCUSDT", 0));
        assert!(cd.active("BTCUSDT", 2 * 300_000));
        assert!(!cd.active("BTCUSDT", 3 * 300_000));
        assert!(!cd.active("ETHUSDT", 0));
    }

    #[test]
    fn pause_and_reset() {
        let pause = SymbolPause::new();
        assert!(!pause.is_paused("BTCUSDT"));
        pause.pause("BTCUSDT");
        assert!(pause.is_paused("BTCUSDT"));
        assert!(pause.reset("BTCUSDT"));
        assert!(!pause.is_paused("BTCUSDT"));
        assert!(!pause.reset("BTCUSDT"));
    }

    #[test]
    fn median_of_history() {
        let mut v = VecDeque::new();
        assert!(median(&v).is_none());
        v.extend([3.0, 1.0, 2.0]);
        assert_eq!(median(&v), Some(2.0));
        v.push_back(4.0);
        assert_eq!(median(&v), Some(2.5));
    }
}
