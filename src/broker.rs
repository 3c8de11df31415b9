// =============================================================================
// Paper broker — simulated fills with slippage and fees over the store
// =============================================================================
//
// Orders are marketable: filled at the cycle's reference price (the signal
// bar's close) adjusted by slippage, except stop exits which fill at the
// stop price itself.
//
//   slip_bps = max(3, 15 * HL_pct)    HL_pct = (high - low) / close in %
//   fees     = 2 bps of notional per leg, charged on entry AND exit
//   realized = (exit - entry) * qty * side_sign - entry_fees - exit_fees
//
// The broker owns the trade lifecycle against the store; every fill is one
// transaction (trade row + position row together), so a crash between the
// two cannot split the ledger.
// =============================================================================

use anyhow::Result;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info};
use uuid::Uuid;

use crate::market_data::Candle;
use crate::store::{PositionRow, Store, TradeRow};
use crate::types::{ExitReason, Side};

/// Taker fee per leg, in basis points of notional.
pub const FEE_BPS: f64 = 2.0;
/// Floor on simulated slippage, in basis points.
pub const MIN_SLIP_BPS: f64 = 3.0;
/// Slippage per percentage point of bar range, in basis points.
pub const SLIP_PER_HL_PCT_BPS: f64 = 15.0;

/// Simulated slippage for a bar with the given high-low fraction of close.
pub fn slippage_bps(hl_pct: f64) -> f64 {
    MIN_SLIP_BPS.max(SLIP_PER_HL_PCT_BPS * hl_pct * 100.0)
}

/// Reference price adjusted by slippage. Buys pay up, sells receive less.
pub fn fill_price(ref_price: f64, slip_bps: f64, is_buy: bool) -> f64 {
    let slip = slip_bps / 10_000.0;
    if is_buy {
        ref_price * (1.0 + slip)
    } else {
        ref_price * (1.0 - slip)
    }
}

fn fee_for(notional: f64) -> f64 {
    notional.abs() * FEE_BPS / 10_000.0
}

/// Result of an entry fill.
#[derive(Debug, Clone)]
pub struct OpenFill {
    pub trade_id: String,
    pub fill_price: f64,
    pub fees: f64,
    pub slip_bps: f64,
}

/// Result of an exit fill.
#[derive(Debug, Clone)]
pub struct CloseFill {
    pub fill_price: f64,
    pub fees: f64,
    pub realized_pnl: f64,
}

pub struct PaperBroker {
    store: Arc<Store>,
}

impl PaperBroker {
    pub fn new(store: Arc<Store>) -> Self {
        Self { store }
    }

    /// Open a trade at the reference bar's close, creating the trade and
    /// position rows atomically. Fails (without writing) when a position
    /// already exists for the symbol.
    #[allow(clippy::too_many_arguments)]
    pub fn open_trade(
        &self,
        symbol: &str,
        side: Side,
        qty: f64,
        ref_bar: &Candle,
        stop: f64,
        decision_id: &str,
        rationale: serde_json::Value,
    ) -> Result<OpenFill> {
        let slip_bps = slippage_bps(ref_bar.hl_pct());
        let is_buy = side == Side::Long;
        let fill = fill_price(ref_bar.close, slip_bps, is_buy);
        let fees = fee_for(fill * qty);
        let now_ms = Utc::now().timestamp_millis();

        let trade_id = Uuid::new_v4().to_string();
        let trade = TradeRow {
            id: trade_id.clone(),
            symbol: symbol.to_string(),
            side,
            qty,
            entry_ts: now_ms,
            entry_price: fill,
            entry_fees: fees,
            entry_slip_bps: slip_bps,
            exit_ts: None,
            exit_price: None,
            exit_fees: None,
            exit_reason: None,
            realized_pnl: None,
            decision_id: decision_id.to_string(),
            rationale,
        };
        let position = PositionRow {
            symbol: symbol.to_string(),
            side,
            qty,
            avg_price: fill,
            stop,
            trade_id: trade_id.clone(),
            opened_ts: now_ms,
            last_update_ts: now_ms,
            extreme_price: fill,
            extreme_ts: ref_bar.open_time,
        };

        self.store.open_trade(&trade, &position)?;

        info!(
            symbol,
            side = %side,
            qty,
            fill_price = fill,
            fees,
            slip_bps,
            stop,
            trade_id = %trade_id,
            decision_id,
            "paper fill: trade opened"
        );

        Ok(OpenFill {
            trade_id,
            fill_price: fill,
            fees,
            slip_bps,
        })
    }

    /// Close an open position. Stop exits fill exactly at the stop price;
    /// every other exit fills at the reference price minus slippage from the
    /// reference bar's range. Returns the realized P&L net of both fee legs.
    pub fn close_trade(
        &self,
        position: &PositionRow,
        ref_price: f64,
        ref_bar: &Candle,
        reason: ExitReason,
    ) -> Result<CloseFill> {
        let is_sell = position.side == Side::Long;
        let fill = if reason == ExitReason::Stop {
            ref_price
        } else {
            fill_price(ref_price, slippage_bps(ref_bar.hl_pct()), !is_sell)
        };

        let exit_fees = fee_for(fill * position.qty);
        let entry_fees = self
            .store
            .get_trade(&position.trade_id)?
            .map(|t| t.entry_fees)
            .unwrap_or(0.0);

        let realized = (fill - position.avg_price) * position.qty * position.side.sign()
            - entry_fees
            - exit_fees;

        let now_ms = Utc::now().timestamp_millis();
        self.store.close_trade(
            &position.trade_id,
            &position.symbol,
            now_ms,
            fill,
            exit_fees,
            reason,
            realized,
        )?;

        info!(
            symbol = %position.symbol,
            side = %position.side,
            qty = position.qty,
            fill_price = fill,
            exit_fees,
            realized_pnl = realized,
            reason = %reason,
            trade_id = %position.trade_id,
            "paper fill: trade closed"
        );

        Ok(CloseFill {
            fill_price: fill,
            fees: exit_fees,
            realized_pnl: realized,
        })
    }

    /// Unrealized P&L of a position marked to the last close. Pure read.
    pub fn mark_to_market(position: &PositionRow, last_close: f64) -> f64 {
        let pnl =
            (last_close - position.avg_price) * position.qty * position.side.sign();
        debug!(
            symbol = %position.symbol,
            last_close,
            unrealized_pnl = pnl,
            "mark to market"
        );
        pnl
    }
}

impl std::fmt::Debug for PaperBroker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PaperBroker").finish_non_exhaustive()
    }
}
