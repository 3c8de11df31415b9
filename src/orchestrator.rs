// =============================================================================
// Cycle orchestrator — sequences the decision pipeline once per interval
// =============================================================================
//
// Per cycle, per symbol (stop-on-error within a symbol, continue with the
// next):
//
//   ingest -> staleness gate -> features -> warm-up gate -> regime
//     -> kill-switch -> manage open position -> entry candidate
//     -> sentiment -> advisor -> consultant -> validator -> paper broker
//     -> persist trade + rationale
//
// One fresh decision-id per symbol per cycle rides on every emitted event.
// After all symbols, exactly one NAV snapshot is computed and appended, even
// for a partial cycle.
// =============================================================================

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::agents::advisor::{Advisor, AdvisorContext};
use crate::agents::consultant::{volatility_band, Consultant, MarketContext, ReviewOutcome};
use crate::broker::PaperBroker;
use crate::config::Config;
use crate::events::{Action, DecisionRationale, EventRecord, FinalDecision, Level, Tag};
use crate::exchange::{with_retries, ExchangeAdapter};
use crate::features::{compute_features, FETCH_BARS, WARMUP_BARS};
use crate::killswitch::{CooldownTracker, KillSwitch, SymbolPause};
use crate::market_data::CandleKey;
use crate::nav;
use crate::sentiment::SentimentProvider;
use crate::signals;
use crate::store::{SentimentRow, Store};
use crate::types::{ExitReason, Regime, Side};
use crate::validator::{validate, RejectReason, ValidationRequest};

/// Staleness gate: newest candle may lag `now` by at most this many
/// timeframes.
const STALENESS_TIMEFRAMES: i64 = 2;

/// What happened across one `run_once` invocation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CycleSummary {
    pub data_errors: u32,
    pub signals_fired: u32,
    pub trades_opened: u32,
    pub trades_closed: u32,
    pub validator_rejections: u32,
    pub timeouts: u32,
    pub wall_time_ms: u64,
}

/// Outcome of a single symbol's pipeline, folded into the cycle summary.
#[derive(Debug, Clone, Default)]
struct SymbolOutcome {
    signal_fired: bool,
    opened: bool,
    closed: bool,
    validator_rejected: bool,
}

/// Operator-facing status: last cycle, cumulative errors, open positions.
#[derive(Debug, Clone, Serialize)]
pub struct StatusSnapshot {
    pub last_cycle_at: Option<DateTime<Utc>>,
    pub last_summary: Option<CycleSummary>,
    pub error_count: u64,
    pub open_position_symbols: Vec<String>,
}

#[derive(Default)]
struct StatusInner {
    last_cycle_at: Option<DateTime<Utc>>,
    last_summary: Option<CycleSummary>,
    error_count: u64,
}

pub struct Orchestrator {
    config: Config,
    store: Arc<Store>,
    exchange: Arc<dyn ExchangeAdapter>,
    sentiment: Arc<SentimentProvider>,
    advisor: Advisor,
    consultant: Consultant,
    broker: PaperBroker,
    killswitch: KillSwitch,
    cooldowns: CooldownTracker,
    pauses: SymbolPause,
    status: RwLock<StatusInner>,
}

impl Orchestrator {
    pub fn new(
        config: Config,
        store: Arc<Store>,
        exchange: Arc<dyn ExchangeAdapter>,
        sentiment: Arc<SentimentProvider>,
        advisor: Advisor,
        consultant: Consultant,
    ) -> Self {
        let broker = PaperBroker::new(store.clone());
        Self {
            config,
            store,
            exchange,
            sentiment,
            advisor,
            consultant,
            broker,
            killswitch: KillSwitch::new(),
            cooldowns: CooldownTracker::new(),
            pauses: SymbolPause::new(),
            status: RwLock::new(StatusInner::default()),
        }
    }

    // -------------------------------------------------------------------------
    // Outer loop
    // -------------------------------------------------------------------------

    /// Run cycles on a fixed schedule until `shutdown` flips true. A cycle
    /// in progress completes (bounded by its own deadline); cancellation is
    /// honoured between cycles.
    pub async fn run_forever(&self, mut shutdown: tokio::sync::watch::Receiver<bool>) {
        let interval = Duration::from_secs(self.config.cycle_secs);
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!(interval_secs = self.config.cycle_secs, "cycle loop starting");

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                _ = shutdown.changed() => break,
            }
            self.run_once(Utc::now()).await;
            if *shutdown.borrow() {
                break;
            }
        }

        info!("cycle loop stopped");
    }

    /// Execute one full cycle across the symbol universe.
    pub async fn run_once(&self, now: DateTime<Utc>) -> CycleSummary {
        let started = std::time::Instant::now();
        let now_ms = now.timestamp_millis();
        let deadline = started + Duration::from_secs(self.config.cycle_secs);
        let mut summary = CycleSummary::default();

        self.check_ledger_invariants(now_ms);

        for symbol in self.config.symbols.clone() {
            if self.pauses.is_paused(&symbol) {
                debug!(symbol = %symbol, "symbol paused, skipping");
                continue;
            }

            let decision_id = Uuid::new_v4().to_string();
            let remaining = deadline.saturating_duration_since(std::time::Instant::now());
            if remaining.is_zero() {
                summary.timeouts += 1;
                self.emit_soft(
                    EventRecord::new(now_ms, Level::Warn, vec![Tag::Cycle])
                        .symbol(&symbol)
                        .action(Action::Timeout)
                        .decision(&decision_id),
                );
                continue;
            }

            match tokio::time::timeout(remaining, self.run_symbol(&symbol, &decision_id, now_ms))
                .await
            {
                Ok(Ok(outcome)) => {
                    summary.signals_fired += outcome.signal_fired as u32;
                    summary.trades_opened += outcome.opened as u32;
                    summary.trades_closed += outcome.closed as u32;
                    summary.validator_rejections += outcome.validator_rejected as u32;
                }
                Ok(Err(e)) => {
                    summary.data_errors += 1;
                    self.status.write().error_count += 1;
                    error!(symbol = %symbol, decision_id = %decision_id, error = %e, "symbol pipeline failed");
                    self.emit_soft(
                        EventRecord::new(now_ms, Level::Error, vec![Tag::Error])
                            .symbol(&symbol)
                            .decision(&decision_id)
                            .payload(serde_json::json!({ "error": e.to_string() })),
                    );
                }
                Err(_) => {
                    summary.timeouts += 1;
                    self.status.write().error_count += 1;
                    warn!(symbol = %symbol, decision_id = %decision_id, "symbol pipeline abandoned at deadline");
                    self.emit_soft(
                        EventRecord::new(now_ms, Level::Warn, vec![Tag::Cycle])
                            .symbol(&symbol)
                            .action(Action::Timeout)
                            .decision(&decision_id),
                    );
                }
            }
        }

        // One NAV snapshot per cycle, including partial cycles.
        if let Err(e) = self.snapshot_nav(now_ms) {
            self.status.write().error_count += 1;
            error!(error = %e, "nav snapshot failed");
        }

        summary.wall_time_ms = started.elapsed().as_millis() as u64;
        info!(
            data_errors = summary.data_errors,
            signals_fired = summary.signals_fired,
            trades_opened = summary.trades_opened,
            trades_closed = summary.trades_closed,
            validator_rejections = summary.validator_rejections,
            timeouts = summary.timeouts,
            wall_time_ms = summary.wall_time_ms,
            "cycle complete"
        );

        let mut status = self.status.write();
        status.last_cycle_at = Some(now);
        status.last_summary = Some(summary.clone());
        summary
    }

    // -------------------------------------------------------------------------
    // Per-symbol pipeline
    // -------------------------------------------------------------------------

    async fn run_symbol(
        &self,
        symbol: &str,
        decision_id: &str,
        now_ms: i64,
    ) -> Result<SymbolOutcome> {
        let mut outcome = SymbolOutcome::default();
        let tf = self.config.timeframe.clone();
        let tf_ms = self.config.tf_ms();
        let key = CandleKey::new(symbol, &tf);

        // ── Ingest ───────────────────────────────────────────────────────
        let candles = with_retries("fetch_ohlcv", || {
            let exchange = self.exchange.clone();
            let symbol = symbol.to_string();
            let tf = tf.clone();
            async move { exchange.fetch_ohlcv(&symbol, &tf, FETCH_BARS).await }
        })
        .await
        .context("exchange fetch failed")?;

        if candles.is_empty() {
            anyhow::bail!("exchange returned no candles for {symbol}");
        }

        let inserted = self.store.insert_candles(&key, &candles)?;
        self.emit(
            EventRecord::new(now_ms, Level::Debug, vec![Tag::Data])
                .symbol(symbol)
                .timeframe(&tf)
                .decision(decision_id)
                .payload(serde_json::json!({
                    "fetched": candles.len(),
                    "inserted": inserted,
                })),
        )?;

        // Staleness gate: the newest bar must have closed recently.
        let newest = candles.last().expect("non-empty");
        let lag_ms = now_ms - newest.close_time;
        if lag_ms > STALENESS_TIMEFRAMES * tf_ms {
            warn!(symbol, lag_ms, "stale market data, skipping symbol");
            self.emit(
                EventRecord::new(now_ms, Level::Warn, vec![Tag::Risk])
                    .symbol(symbol)
                    .timeframe(&tf)
                    .action(Action::StaleData)
                    .decision(decision_id)
                    .payload(serde_json::json!({ "lag_ms": lag_ms })),
            )?;
            return Ok(outcome);
        }

        // ── Features ─────────────────────────────────────────────────────
        let rows = compute_features(&candles);
        self.store.upsert_features(&key, &rows)?;
        let row = rows.last().expect("non-empty").clone();
        self.emit(
            EventRecord::new(now_ms, Level::Debug, vec![Tag::Features])
                .symbol(symbol)
                .timeframe(&tf)
                .decision(decision_id)
                .payload(serde_json::json!({ "rows": rows.len(), "ts": row.ts })),
        )?;

        // ── Regime ───────────────────────────────────────────────────────
        let regime = signals::classify_regime(&row);
        self.emit(
            EventRecord::new(now_ms, Level::Info, vec![Tag::Signal])
                .symbol(symbol)
                .timeframe(&tf)
                .action(match regime {
                    Regime::Trend => Action::RegimeTrend,
                    Regime::Chop => Action::RegimeChop,
                })
                .decision(decision_id),
        )?;

        // ── Kill-switch ──────────────────────────────────────────────────
        let newly_tripped = self.killswitch.observe(symbol, &candles, newest.open_time, tf_ms);
        let kill_active = self.killswitch.active(symbol, newest.open_time);
        if newly_tripped {
            self.emit(
                EventRecord::new(now_ms, Level::Warn, vec![Tag::Risk])
                    .symbol(symbol)
                    .timeframe(&tf)
                    .action(Action::KillSwitch)
                    .decision(decision_id),
            )?;
        }
        if kill_active {
            if let Some(position) = self.store.get_position(symbol)? {
                let fill = self
                    .broker
                    .close_trade(&position, newest.close, newest, ExitReason::Kill)?;
                outcome.closed = true;
                self.emit(
                    EventRecord::new(now_ms, Level::Warn, vec![Tag::Exit, Tag::Risk])
                        .symbol(symbol)
                        .timeframe(&tf)
                        .action(Action::ExitKill)
                        .decision(decision_id)
                        .trade(&position.trade_id)
                        .payload(serde_json::json!({
                            "fill_price": fill.fill_price,
                            "realized_pnl": fill.realized_pnl,
                        })),
                )?;
            }
            return Ok(outcome);
        }

        // ── Manage open position ─────────────────────────────────────────
        if let Some(position) = self.store.get_position(symbol)? {
            let eval = signals::evaluate_exit(
                position.side,
                position.stop,
                position.extreme_price,
                position.extreme_ts,
                newest,
                row.atr14,
                tf_ms,
            );
            if let Some((reason, ref_price)) = eval.exit {
                let fill = self
                    .broker
                    .close_trade(&position, ref_price, newest, reason)?;
                outcome.closed = true;
                if reason == ExitReason::Stop {
                    self.cooldowns.start(symbol, newest.open_time, tf_ms);
                }
                self.emit(
                    EventRecord::new(now_ms, Level::Info, vec![Tag::Trade, Tag::Exit])
                        .symbol(symbol)
                        .timeframe(&tf)
                        .action(match reason {
                            ExitReason::Stop => Action::ExitStop,
                            ExitReason::Time => Action::ExitTime,
                            _ => Action::ExitKill,
                        })
                        .decision(decision_id)
                        .trade(&position.trade_id)
                        .payload(serde_json::json!({
                            "fill_price": fill.fill_price,
                            "realized_pnl": fill.realized_pnl,
                        })),
                )?;
                return Ok(outcome);
            }
            if let (Some(stop), Some((extreme, extreme_ts))) =
                (eval.updated_stop, eval.updated_extreme)
            {
                self.store
                    .update_position_stop(symbol, stop, extreme, extreme_ts, now_ms)?;
                debug!(symbol, stop, extreme, "trailing stop ratcheted");
            }
            // Existing position: no further entry this cycle.
            return Ok(outcome);
        }

        // ── Warm-up gate ─────────────────────────────────────────────────
        if candles.len() < WARMUP_BARS {
            debug!(
                symbol,
                bars = candles.len(),
                required = WARMUP_BARS,
                "warm-up in progress, entries inhibited"
            );
            return Ok(outcome);
        }

        // ── Entry candidate ──────────────────────────────────────────────
        let Some(side) = signals::entry_signal(&row, self.config.allow_shorts) else {
            self.emit(
                EventRecord::new(now_ms, Level::Debug, vec![Tag::Proposal])
                    .symbol(symbol)
                    .timeframe(&tf)
                    .action(Action::SkipNoSignal)
                    .decision(decision_id),
            )?;
            return Ok(outcome);
        };
        outcome.signal_fired = true;

        // ── Sentiment snapshot ───────────────────────────────────────────
        let (sentiment, refreshed) = self.sentiment.snapshot(symbol, now_ms).await;
        if refreshed {
            self.store.insert_sentiment(&SentimentRow {
                symbol: symbol.to_string(),
                ts: now_ms,
                sent_24h: sentiment.sent_24h,
                sent_7d: sentiment.sent_7d,
                sent_trend: sentiment.sent_trend,
                burst: sentiment.burst,
                sources: sentiment.sources.clone(),
            })?;
            self.emit(
                EventRecord::new(now_ms, Level::Debug, vec![Tag::Sentiment])
                    .symbol(symbol)
                    .decision(decision_id)
                    .payload(serde_json::to_value(&sentiment)?),
            )?;
        }

        // ── Advisor ──────────────────────────────────────────────────────
        let ctx = AdvisorContext {
            symbol,
            signal_side: side,
            regime,
            features: &row,
            position: None,
            sentiment: &sentiment,
            risk_budget: self.config.risk_budget,
            max_exposure: self.config.max_exposure,
        };
        let proposal = match self.advisor.propose(&ctx).await {
            Ok(p) => p,
            Err(failure) => {
                self.emit(
                    EventRecord::new(now_ms, Level::Warn, vec![Tag::Proposal])
                        .symbol(symbol)
                        .action(Action::AdvisorFail)
                        .decision(decision_id)
                        .payload(serde_json::json!({ "detail": failure.detail })),
                )?;
                return Ok(outcome);
            }
        };
        let proposal_json = serde_json::to_value(&proposal)?;
        self.emit(
            EventRecord::new(now_ms, Level::Info, vec![Tag::Proposal])
                .symbol(symbol)
                .decision(decision_id)
                .payload(proposal_json.clone()),
        )?;

        // Deterministic numbers: the advisor cannot move these, only shape
        // the stop multiplier within validator bounds.
        let proposal_side = proposal.side.as_side().unwrap_or(side);
        let entry = newest.close;
        let atr = row.atr14;
        let mut stop =
            signals::initial_stop(entry, atr, proposal.stop_multiplier(), proposal_side);
        let nav_now = self.current_nav()?;

        let Some(mut qty) = signals::position_size(
            nav_now,
            entry,
            stop,
            proposal_side,
            self.config.risk_budget,
            self.config.max_exposure,
        ) else {
            outcome.validator_rejected = true;
            self.emit(
                EventRecord::new(now_ms, Level::Info, vec![Tag::Validation])
                    .symbol(symbol)
                    .action(Action::ValidationReject)
                    .decision(decision_id)
                    .payload(serde_json::json!({ "code": "qty_rounds_to_zero" })),
            )?;
            return Ok(outcome);
        };

        // ── Consultant ───────────────────────────────────────────────────
        let market = MarketContext {
            regime,
            sentiment: &sentiment,
            volatility_band: volatility_band(atr, entry),
        };
        let (review_outcome, review_json) = self
            .consultant
            .review(&proposal, &market, entry, atr, proposal_side, qty)
            .await;

        let mut applied_mods: Option<(Option<f64>, Option<f64>)> = None;
        match &review_outcome {
            ReviewOutcome::Approve => {
                self.emit(
                    EventRecord::new(now_ms, Level::Info, vec![Tag::Consultant])
                        .symbol(symbol)
                        .action(Action::ConsultantApprove)
                        .decision(decision_id),
                )?;
            }
            ReviewOutcome::AutoApprove => {
                self.emit(
                    EventRecord::new(now_ms, Level::Warn, vec![Tag::Consultant])
                        .symbol(symbol)
                        .action(Action::ConsultantAutoApprove)
                        .decision(decision_id),
                )?;
            }
            ReviewOutcome::Reject(concerns) => {
                self.emit(
                    EventRecord::new(now_ms, Level::Info, vec![Tag::Consultant])
                        .symbol(symbol)
                        .action(Action::ConsultantReject)
                        .decision(decision_id)
                        .payload(serde_json::json!({ "concerns": concerns })),
                )?;
                return Ok(outcome);
            }
            ReviewOutcome::Modify {
                stop: new_stop,
                qty: new_qty,
            } => {
                if let Some(s) = new_stop {
                    stop = *s;
                }
                if let Some(q) = new_qty {
                    qty = *q;
                }
                applied_mods = Some((*new_stop, *new_qty));
                self.emit(
                    EventRecord::new(now_ms, Level::Info, vec![Tag::Consultant])
                        .symbol(symbol)
                        .action(Action::ConsultantModify)
                        .decision(decision_id)
                        .payload(serde_json::json!({ "stop": new_stop, "size": new_qty })),
                )?;
            }
        }

        // ── Validator ────────────────────────────────────────────────────
        let request = ValidationRequest {
            side: proposal_side,
            qty,
            entry,
            stop,
            nav: nav_now,
            trend_direction: signals::trend_direction(&row),
            has_open_position: self.store.get_position(symbol)?.is_some(),
            kill_switch_active: self.killswitch.active(symbol, newest.open_time),
            cooldown_active: self.cooldowns.active(symbol, newest.open_time),
            risk_budget: self.config.risk_budget,
            max_exposure: self.config.max_exposure,
            schema_error: proposal.validate().err(),
        };
        if let Err(reason) = validate(&request) {
            outcome.validator_rejected = true;
            info!(symbol, code = reason.code(), "proposal rejected by validator");
            self.emit(
                EventRecord::new(now_ms, Level::Info, vec![Tag::Validation])
                    .symbol(symbol)
                    .action(Action::ValidationReject)
                    .decision(decision_id)
                    .payload(serde_json::json!({ "code": reason.code() })),
            )?;
            self.record_rejected_rationale(&reason);
            return Ok(outcome);
        }

        // ── Paper broker ─────────────────────────────────────────────────
        let decision = match applied_mods {
            Some((mod_stop, mod_qty)) => FinalDecision::ExecutedModified {
                stop: mod_stop,
                qty: mod_qty,
            },
            None => FinalDecision::Executed,
        };
        let rationale = DecisionRationale {
            decision_id: decision_id.to_string(),
            indicators: row.clone(),
            regime,
            sentiment: serde_json::to_value(&sentiment)?,
            advisor_proposal: proposal_json,
            consultant_review: review_json,
            decision,
        };

        let fill = self.broker.open_trade(
            symbol,
            proposal_side,
            qty,
            newest,
            stop,
            decision_id,
            serde_json::to_value(&rationale)?,
        )?;
        outcome.opened = true;

        self.emit(
            EventRecord::new(now_ms, Level::Info, vec![Tag::Trade])
                .symbol(symbol)
                .timeframe(&tf)
                .action(match proposal_side {
                    Side::Long => Action::OpenLong,
                    Side::Short => Action::OpenShort,
                })
                .decision(decision_id)
                .trade(&fill.trade_id)
                .payload(serde_json::json!({
                    "qty": qty,
                    "fill_price": fill.fill_price,
                    "fees": fill.fees,
                    "slip_bps": fill.slip_bps,
                    "stop": stop,
                })),
        )?;

        Ok(outcome)
    }

    // -------------------------------------------------------------------------
    // Supporting pieces
    // -------------------------------------------------------------------------

    /// Detect position/open-trade pairing violations and park offending
    /// symbols after flattening them defensively.
    fn check_ledger_invariants(&self, now_ms: i64) {
        let mismatched = match self.store.position_trade_mismatches() {
            Ok(v) => v,
            Err(e) => {
                error!(error = %e, "invariant check failed");
                return;
            }
        };
        for symbol in mismatched {
            error!(symbol = %symbol, "position/trade ledger mismatch detected");
            self.emit_soft(
                EventRecord::new(now_ms, Level::Error, vec![Tag::Error])
                    .symbol(&symbol)
                    .action(Action::Invariant),
            );
            // Flatten whatever half of the pair exists, then park the symbol.
            let stray_open_trade = self
                .store
                .open_trades()
                .ok()
                .and_then(|ts| ts.into_iter().find(|t| t.symbol == symbol));
            if let Some(trade) = stray_open_trade {
                // Close at entry; the position (if any) is removed in the
                // same transaction.
                if let Err(e) = self.store.close_trade(
                    &trade.id,
                    &symbol,
                    now_ms,
                    trade.entry_price,
                    0.0,
                    ExitReason::Flatten,
                    -trade.entry_fees,
                ) {
                    error!(symbol = %symbol, error = %e, "defensive flatten failed");
                }
            } else if let Err(e) = self.store.delete_position(&symbol) {
                error!(symbol = %symbol, error = %e, "stray position cleanup failed");
            }
            self.pauses.pause(&symbol);
        }
    }

    /// NAV right now, marked to the latest stored closes. Used for sizing.
    fn current_nav(&self) -> Result<f64> {
        let realized = self.store.realized_pnl_sum()?;
        let mut unrealized = 0.0;
        for position in self.store.open_positions()? {
            let mark = self
                .store
                .latest_candle(&CandleKey::new(&position.symbol, &self.config.timeframe))?
                .map(|c| c.close)
                .unwrap_or(position.avg_price);
            unrealized += PaperBroker::mark_to_market(&position, mark);
        }
        Ok(self.config.starting_cash + realized + unrealized)
    }

    fn snapshot_nav(&self, now_ms: i64) -> Result<()> {
        let mut last_closes = HashMap::new();
        for symbol in &self.config.symbols {
            let key = CandleKey::new(symbol, &self.config.timeframe);
            if let Some(c) = self.store.latest_candle(&key)? {
                last_closes.insert(symbol.clone(), c.close);
            }
        }
        nav::snapshot(&self.store, self.config.starting_cash, &last_closes, now_ms)?;
        Ok(())
    }

    /// Rejected proposals leave no trade row, so their rationale lives only
    /// in the event log; nothing further to persist here.
    fn record_rejected_rationale(&self, reason: &RejectReason) {
        debug!(code = reason.code(), "decision closed without execution");
    }

    /// Emit an event; a failed write aborts the calling stage.
    fn emit(&self, ev: EventRecord) -> Result<()> {
        self.store.insert_event(&ev).context("event write failed")
    }

    /// Emit an event where failure must not cascade (error paths).
    fn emit_soft(&self, ev: EventRecord) {
        if let Err(e) = self.store.insert_event(&ev) {
            error!(error = %e, "event write failed");
        }
    }

    /// Operator status surface.
    pub fn status(&self) -> StatusSnapshot {
        let inner = self.status.read();
        let open = self
            .store
            .open_positions()
            .map(|v| v.into_iter().map(|p| p.symbol).collect())
            .unwrap_or_default();
        StatusSnapshot {
            last_cycle_at: inner.last_cycle_at,
            last_summary: inner.last_summary.clone(),
            error_count: inner.error_count,
            open_position_symbols: open,
        }
    }

    /// Operator reset for a symbol parked by an invariant violation.
    pub fn reset_symbol(&self, symbol: &str) -> bool {
        self.pauses.reset(symbol)
    }

    #[cfg(test)]
    fn killswitch(&self) -> &KillSwitch {
        &self.killswitch
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("symbols", &self.config.symbols)
            .field("timeframe", &self.config.timeframe)
            .finish_non_exhaustive()
    }
}

// =============================================================================
// Scenario tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::testing::ScriptedTransport;
    use crate::killswitch::KILL_BARS;
    use crate::market_data::Candle;
    use async_trait::async_trait;
    use parking_lot::Mutex;

    const TF_MS: i64 = 300_000;

    /// Serves a fixed candle window per symbol.
    struct FakeExchange {
        candles: Mutex<HashMap<String, Vec<Candle>>>,
    }

    impl FakeExchange {
        fn new() -> Self {
            Self {
                candles: Mutex::new(HashMap::new()),
            }
        }

        fn set(&self, symbol: &str, candles: Vec<Candle>) {
            self.candles.lock().insert(symbol.to_string(), candles);
        }
    }

    #[async_trait]
    impl ExchangeAdapter for FakeExchange {
        async fn fetch_ohlcv(
            &self,
            symbol: &str,
            _timeframe: &str,
            limit: usize,
        ) -> Result<Vec<Candle>> {
            let map = self.candles.lock();
            let all = map
                .get(symbol)
                .cloned()
                .ok_or_else(|| anyhow::anyhow!("no candles scripted for {symbol}"))?;
            let start = all.len().saturating_sub(limit);
            Ok(all[start..].to_vec())
        }

        async fn fetch_ohlcv_since(
            &self,
            symbol: &str,
            timeframe: &str,
            since_ts: i64,
        ) -> Result<Vec<Candle>> {
            let all = self.fetch_ohlcv(symbol, timeframe, usize::MAX).await?;
            Ok(all.into_iter().filter(|c| c.open_time > since_ts).collect())
        }
    }

    fn test_config(symbols: &[&str]) -> Config {
        Config {
            symbols: symbols.iter().map(|s| s.to_string()).collect(),
            max_exposure: 0.50,
            ..Config::default()
        }
    }

    fn orchestrator_with(
        config: Config,
        exchange: Arc<FakeExchange>,
        advisor_transport: Option<Arc<ScriptedTransport>>,
        consultant_transport: Option<Arc<ScriptedTransport>>,
    ) -> Orchestrator {
        let store = Arc::new(Store::open_in_memory().unwrap());
        let advisor = Advisor::new(
            advisor_transport.map(|t| t as Arc<dyn crate::agents::LlmTransport>),
            "primary",
            "fallback",
        );
        let consultant = Consultant::new(
            consultant_transport.map(|t| t as Arc<dyn crate::agents::LlmTransport>),
            "consultant",
        );
        Orchestrator::new(
            config,
            store,
            exchange,
            Arc::new(SentimentProvider::new(None, None)),
            advisor,
            consultant,
        )
    }

    /// Gentle uptrend: EMA50 > EMA200, consistent +DM (high ADX), closes in
    /// the upper part of each bar (positive CMF), steady volume.
    fn uptrend_candles(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64 * 0.05;
                let ts = i as i64 * TF_MS;
                Candle::new(ts, ts + TF_MS - 1, base, base + 0.5, base - 0.5, base + 0.3, 50.0)
            })
            .collect()
    }

    /// Append a breakout bar: close above the prior 20-bar high, closing
    /// near its own high on a volume burst.
    fn with_breakout(mut candles: Vec<Candle>) -> Vec<Candle> {
        let last = candles.last().unwrap().clone();
        let prior_high: f64 = candles[candles.len() - 20..]
            .iter()
            .map(|c| c.high)
            .fold(f64::NEG_INFINITY, f64::max);
        let ts = last.open_time + TF_MS;
        let close = prior_high + 1.0;
        candles.push(Candle::new(
            ts,
            ts + TF_MS - 1,
            last.close,
            close + 0.1,
            last.close - 0.1,
            close,
            250.0,
        ));
        candles
    }

    /// `now` one second after the newest bar closed.
    fn now_after(candles: &[Candle]) -> DateTime<Utc> {
        let ms = candles.last().unwrap().close_time + 1_000;
        DateTime::from_timestamp_millis(ms).unwrap()
    }

    fn actions_for(store: &Store, decision_id: &str) -> Vec<String> {
        store
            .events_for_decision(decision_id)
            .unwrap()
            .into_iter()
            .filter_map(|(_, action)| action)
            .collect()
    }

    fn all_actions(store: &Store) -> Vec<String> {
        assert!(store.event_count().unwrap() > 0, "no events were recorded");
        let conn = store.test_conn();
        let mut stmt = conn
            .prepare("SELECT action FROM event_log WHERE action IS NOT NULL ORDER BY id")
            .unwrap();
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap()
            .collect::<std::result::Result<Vec<_>, _>>()
            .unwrap();
        rows
    }

    // ---- S1: warm-up ----------------------------------------------------

    #[tokio::test]
    async fn s1_warmup_produces_no_trades() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = uptrend_candles(50);
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        let summary = orch.run_once(now_after(&candles)).await;

        assert_eq!(summary.trades_opened, 0);
        assert_eq!(summary.signals_fired, 0);
        assert_eq!(summary.data_errors, 0);

        let actions = all_actions(&orch.store);
        // Regime may be logged; nothing proposal- or trade-shaped may be.
        assert!(!actions.iter().any(|a| a.starts_with("OPEN_")));
        assert!(!actions.iter().any(|a| a == "SKIP_NO_SIGNAL"));
        assert!(orch.store.open_positions().unwrap().is_empty());
        // NAV snapshot still produced.
        assert!(orch.store.latest_nav().unwrap().is_some());
    }

    // ---- S2: clean long -------------------------------------------------

    #[tokio::test]
    async fn s2_clean_long_entry() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        let summary = orch.run_once(now_after(&candles)).await;

        assert_eq!(summary.signals_fired, 1);
        assert_eq!(summary.trades_opened, 1);
        assert_eq!(summary.validator_rejections, 0);

        let positions = orch.store.open_positions().unwrap();
        assert_eq!(positions.len(), 1);
        let pos = &positions[0];
        assert_eq!(pos.side, Side::Long);
        assert!(pos.qty > 0.0);
        // Initial stop sits below entry by the ATR multiple.
        assert!(pos.stop < pos.avg_price);

        // Risk sizing: qty * stop distance stays within the 0.5% budget.
        let entry_ref = candles.last().unwrap().close;
        let risk = pos.qty * (entry_ref - pos.stop);
        assert!(risk <= 0.005 * 10_000.0 * 1.001, "risk {risk} over budget");

        // Entry fill includes slippage above the reference close.
        assert!(pos.avg_price > entry_ref);

        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"REGIME_TREND".to_string()));
        assert!(actions.contains(&"CONSULTANT_AUTO_APPROVE".to_string()));
        assert!(actions.contains(&"OPEN_LONG".to_string()));

        // The trade carries the full rationale blob.
        let trade = orch.store.open_trades().unwrap().pop().unwrap();
        assert_eq!(trade.rationale["regime"], "trend");
        assert!(trade.rationale["advisor_proposal"]["confidence"].is_number());
        assert_eq!(trade.rationale["decision"]["outcome"], "executed");
    }

    // ---- S3: stop hit ---------------------------------------------------

    #[tokio::test]
    async fn s3_stop_hit_exit() {
        let exchange = Arc::new(FakeExchange::new());
        let mut candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange.clone(), None, None);
        orch.run_once(now_after(&candles)).await;
        let pos = orch.store.open_positions().unwrap().pop().expect("opened");
        let entry_fees = orch
            .store
            .get_trade(&pos.trade_id)
            .unwrap()
            .unwrap()
            .entry_fees;

        // Next bar gaps down through the stop.
        let last = candles.last().unwrap().clone();
        let ts = last.open_time + TF_MS;
        candles.push(Candle::new(
            ts,
            ts + TF_MS - 1,
            last.close,
            last.close + 0.2,
            pos.stop - 1.0,
            pos.stop - 0.5,
            80.0,
        ));
        exchange.set("BTCUSDT", candles.clone());

        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.trades_closed, 1);
        assert!(orch.store.open_positions().unwrap().is_empty());

        let trade = orch.store.get_trade(&pos.trade_id).unwrap().unwrap();
        assert_eq!(trade.exit_reason, Some(ExitReason::Stop));
        // Stop exits fill exactly at the stop.
        assert_eq!(trade.exit_price, Some(pos.stop));
        // Realized P&L nets out both fee legs.
        let expected = (pos.stop - pos.avg_price) * pos.qty
            - entry_fees
            - trade.exit_fees.unwrap();
        assert!((trade.realized_pnl.unwrap() - expected).abs() < 1e-9);

        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"EXIT_STOP".to_string()));
    }

    // ---- S4: consultant reject ------------------------------------------

    #[tokio::test]
    async fn s4_consultant_reject_blocks_trade() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let advisor_reply = serde_json::json!({
            "symbol": "BTCUSDT",
            "side": "long",
            "confidence": 0.8,
            "reasons": ["breakout"],
            "entry": { "type": "market" },
            "stop": { "type": "atr", "multiplier": 2.0 },
            "take_profit": { "rr": 2.0 },
            "max_hold_bars": 40
        });
        let consultant_reply = serde_json::json!({
            "recommendation": "reject",
            "concerns": ["sentiment divergence"],
            "modifications": null,
            "confidence": 0.9,
            "reasoning": "momentum exhausted"
        });

        let advisor_t = Arc::new(ScriptedTransport::new(vec![Ok(advisor_reply)]));
        let consultant_t = Arc::new(ScriptedTransport::new(vec![Ok(consultant_reply)]));
        let orch = orchestrator_with(
            test_config(&["BTCUSDT"]),
            exchange,
            Some(advisor_t),
            Some(consultant_t),
        );

        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.signals_fired, 1);
        assert_eq!(summary.trades_opened, 0);
        assert!(orch.store.open_positions().unwrap().is_empty());

        // Proposal and rejection share one decision-id.
        let decision_id = {
            let conn = orch.store.test_conn();
            let id: String = conn
                .query_row(
                    "SELECT decision_id FROM event_log WHERE action = 'CONSULTANT_REJECT'",
                    [],
                    |row| row.get(0),
                )
                .unwrap();
            id
        };
        let actions = actions_for(&orch.store, &decision_id);
        assert!(actions.contains(&"REGIME_TREND".to_string()));
        assert!(actions.contains(&"CONSULTANT_REJECT".to_string()));
        assert!(!actions.iter().any(|a| a.starts_with("OPEN_")));
    }

    // ---- S5: consultant size modification --------------------------------

    #[tokio::test]
    async fn s5_consultant_size_modification() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let advisor_reply = serde_json::json!({
            "symbol": "BTCUSDT",
            "side": "long",
            "confidence": 0.8,
            "reasons": ["breakout"],
            "entry": { "type": "market" },
            "stop": { "type": "atr", "multiplier": 2.0 },
            "take_profit": { "rr": 2.0 },
            "max_hold_bars": 40
        });
        let consultant_reply = serde_json::json!({
            "recommendation": "modify",
            "concerns": ["size rich for regime"],
            "modifications": { "size": 0.5 },
            "confidence": 0.8,
            "reasoning": "halve the exposure"
        });

        let advisor_t = Arc::new(ScriptedTransport::new(vec![Ok(advisor_reply)]));
        let consultant_t = Arc::new(ScriptedTransport::new(vec![Ok(consultant_reply)]));
        let orch = orchestrator_with(
            test_config(&["BTCUSDT"]),
            exchange,
            Some(advisor_t),
            Some(consultant_t),
        );

        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.trades_opened, 1);

        let pos = orch.store.open_positions().unwrap().pop().unwrap();
        assert!((pos.qty - 0.5).abs() < 1e-9, "modified qty applied");

        // Rationale records both the proposal and the modification.
        let trade = orch.store.get_trade(&pos.trade_id).unwrap().unwrap();
        assert_eq!(trade.rationale["decision"]["outcome"], "executed_modified");
        assert!((trade.rationale["decision"]["qty"].as_f64().unwrap() - 0.5).abs() < 1e-9);
        assert_eq!(
            trade.rationale["consultant_review"]["recommendation"],
            "modify"
        );

        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"CONSULTANT_MODIFY".to_string()));
        assert!(actions.contains(&"OPEN_LONG".to_string()));
    }

    // ---- consultant outage ------------------------------------------------

    #[tokio::test]
    async fn consultant_failure_auto_approves_and_trades() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let advisor_reply = serde_json::json!({
            "symbol": "BTCUSDT",
            "side": "long",
            "confidence": 0.8,
            "reasons": ["breakout"],
            "entry": { "type": "market" },
            "stop": { "type": "atr", "multiplier": 2.0 },
            "take_profit": { "rr": 2.0 },
            "max_hold_bars": 40
        });

        let advisor_t = Arc::new(ScriptedTransport::new(vec![Ok(advisor_reply)]));
        let consultant_t = Arc::new(ScriptedTransport::new(vec![Err(anyhow::anyhow!(
            "deadline exceeded"
        ))]));
        let orch = orchestrator_with(
            test_config(&["BTCUSDT"]),
            exchange,
            Some(advisor_t),
            Some(consultant_t),
        );

        // A valid advisor proposal still produces exactly one trade decision.
        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.trades_opened, 1);

        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"CONSULTANT_AUTO_APPROVE".to_string()));
        assert!(actions.contains(&"OPEN_LONG".to_string()));
    }

    // ---- S6: kill-switch -------------------------------------------------

    #[tokio::test]
    async fn s6_kill_switch_flattens_and_blocks() {
        let exchange = Arc::new(FakeExchange::new());
        let mut candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange.clone(), None, None);
        orch.run_once(now_after(&candles)).await;
        let pos = orch.store.open_positions().unwrap().pop().expect("opened");

        // Next bar: engage the switch directly (the volatility trip is
        // covered by killswitch unit tests).
        let last = candles.last().unwrap().clone();
        let ts = last.open_time + TF_MS;
        candles.push(Candle::new(
            ts,
            ts + TF_MS - 1,
            last.close,
            last.close + 0.6,
            last.close - 0.6,
            last.close + 0.2,
            90.0,
        ));
        exchange.set("BTCUSDT", candles.clone());
        orch.killswitch().engage("BTCUSDT", ts + KILL_BARS * TF_MS);

        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.trades_closed, 1);
        assert_eq!(summary.trades_opened, 0);
        assert!(orch.store.open_positions().unwrap().is_empty());

        let trade = orch.store.get_trade(&pos.trade_id).unwrap().unwrap();
        assert_eq!(trade.exit_reason, Some(ExitReason::Kill));

        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"EXIT_KILL".to_string()));

        // NAV snapshot still produced on the kill cycle.
        let nav_rows = {
            let conn = orch.store.test_conn();
            let n: i64 = conn
                .query_row("SELECT COUNT(*) FROM nav", [], |row| row.get(0))
                .unwrap();
            n
        };
        assert_eq!(nav_rows, 2);

        // While engaged, further cycles refuse new entries.
        let breakout2 = with_breakout(candles.clone());
        exchange.set("BTCUSDT", breakout2.clone());
        let summary = orch.run_once(now_after(&breakout2)).await;
        assert_eq!(summary.trades_opened, 0);
    }

    // ---- staleness gate ---------------------------------------------------

    #[tokio::test]
    async fn stale_data_skips_symbol() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        // Now is 3 timeframes past the newest close: stale.
        let stale_now = DateTime::from_timestamp_millis(
            candles.last().unwrap().close_time + 3 * TF_MS,
        )
        .unwrap();
        let summary = orch.run_once(stale_now).await;

        assert_eq!(summary.trades_opened, 0);
        assert_eq!(summary.signals_fired, 0);
        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"STALE_DATA".to_string()));
        assert!(!actions.iter().any(|a| a.starts_with("OPEN_")));
        // NAV still produced.
        assert!(orch.store.latest_nav().unwrap().is_some());
    }

    // ---- decision-id propagation -------------------------------------------

    #[tokio::test]
    async fn decision_id_joins_the_whole_trail() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        orch.run_once(now_after(&candles)).await;

        let trade = orch.store.open_trades().unwrap().pop().unwrap();
        let actions = actions_for(&orch.store, &trade.decision_id);
        // Ingest through execution all carry the trade's decision-id, in
        // causal order.
        assert!(actions.contains(&"REGIME_TREND".to_string()));
        assert!(actions.contains(&"CONSULTANT_AUTO_APPROVE".to_string()));
        assert!(actions.contains(&"OPEN_LONG".to_string()));
        let regime_idx = actions.iter().position(|a| a == "REGIME_TREND").unwrap();
        let open_idx = actions.iter().position(|a| a == "OPEN_LONG").unwrap();
        assert!(regime_idx < open_idx);
        // And the rationale blob echoes the same id.
        assert_eq!(trade.rationale["decision_id"], trade.decision_id);
    }

    // ---- error isolation --------------------------------------------------

    #[tokio::test]
    async fn one_failing_symbol_does_not_stop_others() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        // ETHUSDT has no scripted candles: its fetch fails every retry.
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["ETHUSDT", "BTCUSDT"]), exchange, None, None);
        let summary = orch.run_once(now_after(&candles)).await;

        assert_eq!(summary.data_errors, 1);
        assert_eq!(summary.trades_opened, 1);
        assert_eq!(orch.status().error_count, 1);
    }

    // ---- no-signal path ---------------------------------------------------

    #[tokio::test]
    async fn quiet_market_skips_with_no_signal() {
        let exchange = Arc::new(FakeExchange::new());
        // Warm but no breakout on the final bar.
        let candles = uptrend_candles(WARMUP_BARS + 20);
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        let summary = orch.run_once(now_after(&candles)).await;

        assert_eq!(summary.signals_fired, 0);
        assert_eq!(summary.trades_opened, 0);
        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"SKIP_NO_SIGNAL".to_string()));
    }

    // ---- cooldown after stop-out ------------------------------------------

    #[tokio::test]
    async fn cooldown_blocks_reentry_after_stop() {
        let exchange = Arc::new(FakeExchange::new());
        let mut candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange.clone(), None, None);
        orch.run_once(now_after(&candles)).await;
        let pos = orch.store.open_positions().unwrap().pop().expect("opened");

        // Stop out.
        let last = candles.last().unwrap().clone();
        let ts = last.open_time + TF_MS;
        candles.push(Candle::new(
            ts,
            ts + TF_MS - 1,
            last.close,
            last.close + 0.2,
            pos.stop - 1.0,
            pos.stop - 0.5,
            80.0,
        ));
        exchange.set("BTCUSDT", candles.clone());
        orch.run_once(now_after(&candles)).await;

        // Immediate new breakout bar while the cooldown window is open.
        let candles2 = with_breakout(candles.clone());
        exchange.set("BTCUSDT", candles2.clone());
        let summary = orch.run_once(now_after(&candles2)).await;

        assert_eq!(summary.trades_opened, 0);
        assert_eq!(summary.validator_rejections, 1);
        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"VALIDATION_REJECT".to_string()));
    }

    // ---- invariant violation + operator reset -----------------------------

    #[tokio::test]
    async fn invariant_violation_flattens_and_pauses_until_reset() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange.clone(), None, None);
        orch.run_once(now_after(&candles)).await;
        let trade = orch.store.open_trades().unwrap().pop().expect("opened");

        // Damage the ledger: drop the position row, orphaning the open trade.
        orch.store.delete_position("BTCUSDT").unwrap();
        assert_eq!(
            orch.store.position_trade_mismatches().unwrap(),
            vec!["BTCUSDT".to_string()]
        );

        // The next cycle flattens defensively and parks the symbol.
        let summary = orch.run_once(now_after(&candles)).await;
        assert_eq!(summary.trades_opened, 0);
        let repaired = orch.store.get_trade(&trade.id).unwrap().unwrap();
        assert_eq!(repaired.exit_reason, Some(ExitReason::Flatten));
        assert!(orch.store.position_trade_mismatches().unwrap().is_empty());
        let actions = all_actions(&orch.store);
        assert!(actions.contains(&"INVARIANT".to_string()));

        // Parked: a fresh breakout does not trade.
        let candles2 = with_breakout(candles.clone());
        exchange.set("BTCUSDT", candles2.clone());
        let summary = orch.run_once(now_after(&candles2)).await;
        assert_eq!(summary.trades_opened, 0);

        // Operator reset re-enables the symbol.
        assert!(orch.reset_symbol("BTCUSDT"));
        let candles3 = with_breakout(candles2.clone());
        exchange.set("BTCUSDT", candles3.clone());
        let summary = orch.run_once(now_after(&candles3)).await;
        assert_eq!(summary.trades_opened, 1);
    }

    // ---- status surface ---------------------------------------------------

    #[tokio::test]
    async fn status_reflects_last_cycle() {
        let exchange = Arc::new(FakeExchange::new());
        let candles = with_breakout(uptrend_candles(WARMUP_BARS + 20));
        exchange.set("BTCUSDT", candles.clone());

        let orch = orchestrator_with(test_config(&["BTCUSDT"]), exchange, None, None);
        assert!(orch.status().last_cycle_at.is_none());

        orch.run_once(now_after(&candles)).await;
        let status = orch.status();
        assert!(status.last_cycle_at.is_some());
        assert_eq!(status.last_summary.unwrap().trades_opened, 1);
        assert_eq!(status.open_position_symbols, vec!["BTCUSDT".to_string()]);
    }
}
