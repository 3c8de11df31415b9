// =============================================================================
// NAV accounting — derived snapshots, never edited
// =============================================================================
//
//   nav_usd = starting_cash
//           + sum(realized_pnl of closed trades)
//           + sum(unrealized_pnl of open positions marked to last close)
//
//   dd_pct  = (peak_nav - nav_usd) / peak_nav
//
// The snapshot is a pure function of the trade ledger, the live positions,
// and the latest closes; it is recomputed from those inputs at every cycle
// and appended, so NAV history can never drift from the ledger.
// =============================================================================

use anyhow::Result;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

use crate::broker::PaperBroker;
use crate::store::{NavRow, Store};

/// Compute and persist one NAV snapshot at `now_ms`.
///
/// `last_closes` maps symbol to the most recent closed price; a position
/// with no entry there is marked at its own average price (zero unrealized).
pub fn snapshot(
    store: &Arc<Store>,
    starting_cash: f64,
    last_closes: &HashMap<String, f64>,
    now_ms: i64,
) -> Result<NavRow> {
    let realized = store.realized_pnl_sum()?;

    let mut unrealized = 0.0;
    for position in store.open_positions()? {
        let mark = last_closes
            .get(&position.symbol)
            .copied()
            .unwrap_or(position.avg_price);
        unrealized += PaperBroker::mark_to_market(&position, mark);
    }

    let nav_usd = starting_cash + realized + unrealized;

    // Peak NAV is non-decreasing: the stored maximum, lifted by the current
    // value when it makes a new high.
    let peak = store.peak_nav()?.unwrap_or(nav_usd).max(nav_usd);
    let dd_pct = if peak > 0.0 { (peak - nav_usd) / peak } else { 0.0 };

    let row = NavRow {
        ts: now_ms,
        nav_usd,
        realized_pnl: realized,
        unrealized_pnl: unrealized,
        dd_pct,
    };
    store.insert_nav(&row)?;

    info!(
        nav_usd,
        realized_pnl = realized,
        unrealized_pnl = unrealized,
        dd_pct,
        "nav snapshot"
    );
    Ok(row)
}
