// =============================================================================
// Persistence layer — SQLite store, the single source of truth
// =============================================================================
//
// All durable state lives here: candles, features, sentiment, positions,
// trades, NAV snapshots, and the append-only event log. Natural keys
// throughout; candle inserts are idempotent; every multi-row write for one
// logical operation (open fill, close fill) runs inside one transaction so
// the position table and the trade ledger can never disagree on disk.
//
// Schema evolution is idempotent: CREATE TABLE IF NOT EXISTS plus a
// pragma-guarded ADD COLUMN for columns introduced after the first release.
// =============================================================================

use anyhow::{Context, Result};
use parking_lot::Mutex;
use rusqlite::{params, Connection, OptionalExtension};
use tracing::{debug, info};

use crate::events::EventRecord;
use crate::features::FeatureRow;
use crate::market_data::{Candle, CandleKey};
use crate::types::{ExitReason, Side};

// ---------------------------------------------------------------------------
// Row types
// ---------------------------------------------------------------------------

/// One open position. At most one row per symbol (primary key).
#[derive(Debug, Clone, PartialEq)]
pub struct PositionRow {
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub avg_price: f64,
    pub stop: f64,
    pub trade_id: String,
    pub opened_ts: i64,
    pub last_update_ts: i64,
    /// Best price seen since entry (highest for longs, lowest for shorts).
    pub extreme_price: f64,
    /// Bar ts that set the extreme; drives the time stop.
    pub extreme_ts: i64,
}

/// One trade, open (exit_ts NULL) or closed.
#[derive(Debug, Clone)]
pub struct TradeRow {
    pub id: String,
    pub symbol: String,
    pub side: Side,
    pub qty: f64,
    pub entry_ts: i64,
    pub entry_price: f64,
    pub entry_fees: f64,
    pub entry_slip_bps: f64,
    pub exit_ts: Option<i64>,
    pub exit_price: Option<f64>,
    pub exit_fees: Option<f64>,
    pub exit_reason: Option<ExitReason>,
    pub realized_pnl: Option<f64>,
    pub decision_id: String,
    pub rationale: serde_json::Value,
}

/// One NAV snapshot. Derived, append-only, never edited.
#[derive(Debug, Clone, PartialEq)]
pub struct NavRow {
    pub ts: i64,
    pub nav_usd: f64,
    pub realized_pnl: f64,
    pub unrealized_pnl: f64,
    pub dd_pct: f64,
}

/// Sentiment snapshot row.
#[derive(Debug, Clone, PartialEq)]
pub struct SentimentRow {
    pub symbol: String,
    pub ts: i64,
    pub sent_24h: f64,
    pub sent_7d: f64,
    pub sent_trend: f64,
    pub burst: f64,
    pub sources: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Store
// ---------------------------------------------------------------------------

/// Thread-safe SQLite store. One bounded connection guarded by a mutex is
/// enough at single-user cycle cadence.
pub struct Store {
    conn: Mutex<Connection>,
}

/// Map NaN indicator values to SQL NULL; they mean "window not satisfied".
fn nullable(v: f64) -> Option<f64> {
    v.is_finite().then_some(v)
}

impl Store {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &str) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open database at {path}"))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        info!(path, "store opened");
        Ok(store)
    }

    /// In-memory store for tests.
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().context("failed to open in-memory database")?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.migrate()?;
        Ok(store)
    }

    /// Idempotent schema migration. Safe to run on every boot.
    pub fn migrate(&self) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute_batch(
            "BEGIN;
            CREATE TABLE IF NOT EXISTS candles (
                symbol      TEXT NOT NULL,
                timeframe   TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                close_time  INTEGER NOT NULL,
                open        REAL NOT NULL,
                high        REAL NOT NULL,
                low         REAL NOT NULL,
                close       REAL NOT NULL,
                volume      REAL NOT NULL,
                PRIMARY KEY (symbol, timeframe, ts)
            );
            CREATE TABLE IF NOT EXISTS features (
                symbol      TEXT NOT NULL,
                timeframe   TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                close       REAL,
                ema50       REAL,
                ema200      REAL,
                hma21       REAL,
                rsi14       REAL,
                stoch_rsi   REAL,
                roc10       REAL,
                atr14       REAL,
                bb_upper    REAL,
                bb_mid      REAL,
                bb_lower    REAL,
                donchian_upper REAL,
                donchian_lower REAL,
                obv         REAL,
                cmf20       REAL,
                adx14       REAL,
                rvol20      REAL,
                session_vwap REAL,
                avwap       REAL,
                PRIMARY KEY (symbol, timeframe, ts)
            );
            CREATE TABLE IF NOT EXISTS sentiment (
                symbol      TEXT NOT NULL,
                ts          INTEGER NOT NULL,
                sent_24h    REAL NOT NULL,
                sent_7d     REAL NOT NULL,
                sent_trend  REAL NOT NULL,
                burst       REAL NOT NULL,
                sources     TEXT NOT NULL,
                PRIMARY KEY (symbol, ts)
            );
            CREATE TABLE IF NOT EXISTS positions (
                symbol          TEXT PRIMARY KEY,
                side            TEXT NOT NULL,
                qty             REAL NOT NULL,
                avg_price       REAL NOT NULL,
                stop            REAL NOT NULL,
                trade_id        TEXT NOT NULL,
                opened_ts       INTEGER NOT NULL,
                last_update_ts  INTEGER NOT NULL
            );
            CREATE TABLE IF NOT EXISTS trades (
                id           TEXT PRIMARY KEY,
                symbol       TEXT NOT NULL,
                side         TEXT NOT NULL,
                qty          REAL NOT NULL,
                entry_ts     INTEGER NOT NULL,
                entry_price  REAL NOT NULL,
                entry_fees   REAL NOT NULL,
                exit_ts      INTEGER,
                exit_price   REAL,
                exit_fees    REAL,
                exit_reason  TEXT,
                realized_pnl REAL,
                decision_id  TEXT NOT NULL,
                rationale    TEXT NOT NULL
            );
            CREATE TABLE IF NOT EXISTS nav (
                ts             INTEGER PRIMARY KEY,
                nav_usd        REAL NOT NULL,
                realized_pnl   REAL NOT NULL,
                unrealized_pnl REAL NOT NULL,
                dd_pct         REAL NOT NULL
            );
            CREATE TABLE IF NOT EXISTS event_log (
                id          INTEGER PRIMARY KEY AUTOINCREMENT,
                ts          INTEGER NOT NULL,
                level       TEXT NOT NULL,
                tags        TEXT NOT NULL,
                symbol      TEXT,
                timeframe   TEXT,
                action      TEXT,
                decision_id TEXT,
                trade_id    TEXT,
                payload     TEXT
            );
            COMMIT;",
        )
        .context("schema migration failed")?;

        // Columns added after the initial schema. Guarded, so re-running is a
        // no-op on an up-to-date database.
        Self::ensure_column(&conn, "positions", "extreme_price", "REAL NOT NULL DEFAULT 0")?;
        Self::ensure_column(&conn, "positions", "extreme_ts", "INTEGER NOT NULL DEFAULT 0")?;
        Self::ensure_column(&conn, "trades", "entry_slip_bps", "REAL NOT NULL DEFAULT 0")?;

        debug!("schema migration complete");
        Ok(())
    }

    fn ensure_column(conn: &Connection, table: &str, column: &str, decl: &str) -> Result<()> {
        let mut stmt = conn.prepare(&format!("PRAGMA table_info({table})"))?;
        let existing: Vec<String> = stmt
            .query_map([], |row| row.get::<_, String>(1))?
            .collect::<std::result::Result<_, _>>()?;
        if !existing.iter().any(|c| c == column) {
            conn.execute(
                &format!("ALTER TABLE {table} ADD COLUMN {column} {decl}"),
                [],
            )
            .with_context(|| format!("failed to add column {table}.{column}"))?;
            info!(table, column, "schema column added");
        }
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Candles
    // -------------------------------------------------------------------------

    /// Append-only candle insert. Duplicates (same natural key) are ignored.
    /// Returns the number of newly inserted rows.
    pub fn insert_candles(&self, key: &CandleKey, candles: &[Candle]) -> Result<usize> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let mut inserted = 0usize;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR IGNORE INTO candles
                 (symbol, timeframe, ts, close_time, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for c in candles {
                inserted += stmt.execute(params![
                    key.symbol,
                    key.timeframe,
                    c.open_time,
                    c.close_time,
                    c.open,
                    c.high,
                    c.low,
                    c.close,
                    c.volume
                ])?;
            }
        }
        tx.commit()?;
        Ok(inserted)
    }

    /// Most recent candle for a series, by open time.
    pub fn latest_candle(&self, key: &CandleKey) -> Result<Option<Candle>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT ts, close_time, open, high, low, close, volume
             FROM candles WHERE symbol = ?1 AND timeframe = ?2
             ORDER BY ts DESC LIMIT 1",
            params![key.symbol, key.timeframe],
            |row| {
                Ok(Candle::new(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                    row.get(6)?,
                ))
            },
        )
        .optional()
        .context("failed to read latest candle")
    }

    pub fn candle_count(&self, key: &CandleKey) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM candles WHERE symbol = ?1 AND timeframe = ?2",
            params![key.symbol, key.timeframe],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // -------------------------------------------------------------------------
    // Features
    // -------------------------------------------------------------------------

    /// Upsert feature rows. Features are derived data, so REPLACE is safe;
    /// a row is only written when its candle exists (same natural key is
    /// enforced by the caller fetching candles first).
    pub fn upsert_features(&self, key: &CandleKey, rows: &[FeatureRow]) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare_cached(
                "INSERT OR REPLACE INTO features
                 (symbol, timeframe, ts, close, ema50, ema200, hma21, rsi14, stoch_rsi, roc10,
                  atr14, bb_upper, bb_mid, bb_lower, donchian_upper, donchian_lower,
                  obv, cmf20, adx14, rvol20, session_vwap, avwap)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                         ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21, ?22)",
            )?;
            for r in rows {
                stmt.execute(params![
                    key.symbol,
                    key.timeframe,
                    r.ts,
                    nullable(r.close),
                    nullable(r.ema50),
                    nullable(r.ema200),
                    nullable(r.hma21),
                    nullable(r.rsi14),
                    nullable(r.stoch_rsi),
                    nullable(r.roc10),
                    nullable(r.atr14),
                    nullable(r.bb_upper),
                    nullable(r.bb_mid),
                    nullable(r.bb_lower),
                    nullable(r.donchian_upper),
                    nullable(r.donchian_lower),
                    nullable(r.obv),
                    nullable(r.cmf20),
                    nullable(r.adx14),
                    nullable(r.rvol20),
                    nullable(r.session_vwap),
                    nullable(r.avwap),
                ])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    pub fn feature_count(&self, key: &CandleKey) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM features WHERE symbol = ?1 AND timeframe = ?2",
            params![key.symbol, key.timeframe],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }

    // -------------------------------------------------------------------------
    // Sentiment
    // -------------------------------------------------------------------------

    pub fn insert_sentiment(&self, row: &SentimentRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO sentiment
             (symbol, ts, sent_24h, sent_7d, sent_trend, burst, sources)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                row.symbol,
                row.ts,
                row.sent_24h,
                row.sent_7d,
                row.sent_trend,
                row.burst,
                row.sources.to_string()
            ],
        )?;
        Ok(())
    }

    // -------------------------------------------------------------------------
    // Positions & trades (atomic pairs)
    // -------------------------------------------------------------------------

    /// Create a trade and its position row in one transaction.
    ///
    /// Fails without writing anything if a position already exists for the
    /// symbol — the no-open-position check and the insert are atomic.
    pub fn open_trade(&self, trade: &TradeRow, position: &PositionRow) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let existing: i64 = tx.query_row(
            "SELECT COUNT(*) FROM positions WHERE symbol = ?1",
            params![position.symbol],
            |row| row.get(0),
        )?;
        if existing > 0 {
            anyhow::bail!("position already exists for {}", position.symbol);
        }

        tx.execute(
            "INSERT INTO trades
             (id, symbol, side, qty, entry_ts, entry_price, entry_fees, entry_slip_bps,
              decision_id, rationale)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                trade.id,
                trade.symbol,
                trade.side.to_string(),
                trade.qty,
                trade.entry_ts,
                trade.entry_price,
                trade.entry_fees,
                trade.entry_slip_bps,
                trade.decision_id,
                trade.rationale.to_string()
            ],
        )?;
        tx.execute(
            "INSERT INTO positions
             (symbol, side, qty, avg_price, stop, trade_id, opened_ts, last_update_ts,
              extreme_price, extreme_ts)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
            params![
                position.symbol,
                position.side.to_string(),
                position.qty,
                position.avg_price,
                position.stop,
                position.trade_id,
                position.opened_ts,
                position.last_update_ts,
                position.extreme_price,
                position.extreme_ts
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Close a trade and delete its position in one transaction.
    pub fn close_trade(
        &self,
        trade_id: &str,
        symbol: &str,
        exit_ts: i64,
        exit_price: f64,
        exit_fees: f64,
        exit_reason: ExitReason,
        realized_pnl: f64,
    ) -> Result<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let updated = tx.execute(
            "UPDATE trades
             SET exit_ts = ?2, exit_price = ?3, exit_fees = ?4, exit_reason = ?5,
                 realized_pnl = ?6
             WHERE id = ?1 AND exit_ts IS NULL",
            params![
                trade_id,
                exit_ts,
                exit_price,
                exit_fees,
                exit_reason.to_string(),
                realized_pnl
            ],
        )?;
        if updated != 1 {
            anyhow::bail!("trade {trade_id} is not open");
        }
        tx.execute("DELETE FROM positions WHERE symbol = ?1", params![symbol])?;
        tx.commit()?;
        Ok(())
    }

    /// Drop a position row without touching the trade ledger. Only the
    /// defensive invariant-repair path uses this, for a stray position whose
    /// trade is already closed or missing.
    pub fn delete_position(&self, symbol: &str) -> Result<usize> {
        let conn = self.conn.lock();
        let n = conn.execute("DELETE FROM positions WHERE symbol = ?1", params![symbol])?;
        Ok(n)
    }

    /// Ratchet the stop / extreme on an open position.
    pub fn update_position_stop(
        &self,
        symbol: &str,
        stop: f64,
        extreme_price: f64,
        extreme_ts: i64,
        now_ts: i64,
    ) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "UPDATE positions
             SET stop = ?2, extreme_price = ?3, extreme_ts = ?4, last_update_ts = ?5
             WHERE symbol = ?1",
            params![symbol, stop, extreme_price, extreme_ts, now_ts],
        )?;
        Ok(())
    }

    pub fn get_position(&self, symbol: &str) -> Result<Option<PositionRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT symbol, side, qty, avg_price, stop, trade_id, opened_ts,
                    last_update_ts, extreme_price, extreme_ts
             FROM positions WHERE symbol = ?1",
            params![symbol],
            Self::position_from_row,
        )
        .optional()
        .context("failed to read position")
    }

    pub fn open_positions(&self) -> Result<Vec<PositionRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT symbol, side, qty, avg_price, stop, trade_id, opened_ts,
                    last_update_ts, extreme_price, extreme_ts
             FROM positions ORDER BY symbol",
        )?;
        let rows = stmt
            .query_map([], Self::position_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn position_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<PositionRow> {
        let side_str: String = row.get(1)?;
        Ok(PositionRow {
            symbol: row.get(0)?,
            side: Side::parse(&side_str).unwrap_or(Side::Long),
            qty: row.get(2)?,
            avg_price: row.get(3)?,
            stop: row.get(4)?,
            trade_id: row.get(5)?,
            opened_ts: row.get(6)?,
            last_update_ts: row.get(7)?,
            extreme_price: row.get(8)?,
            extreme_ts: row.get(9)?,
        })
    }

    pub fn get_trade(&self, trade_id: &str) -> Result<Option<TradeRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT id, symbol, side, qty, entry_ts, entry_price, entry_fees,
                    entry_slip_bps, exit_ts, exit_price, exit_fees, exit_reason,
                    realized_pnl, decision_id, rationale
             FROM trades WHERE id = ?1",
            params![trade_id],
            Self::trade_from_row,
        )
        .optional()
        .context("failed to read trade")
    }

    /// Trades with no exit yet. Each must pair with exactly one position.
    pub fn open_trades(&self) -> Result<Vec<TradeRow>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT id, symbol, side, qty, entry_ts, entry_price, entry_fees,
                    entry_slip_bps, exit_ts, exit_price, exit_fees, exit_reason,
                    realized_pnl, decision_id, rationale
             FROM trades WHERE exit_ts IS NULL ORDER BY entry_ts",
        )?;
        let rows = stmt
            .query_map([], Self::trade_from_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    fn trade_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TradeRow> {
        let side_str: String = row.get(2)?;
        let reason_str: Option<String> = row.get(11)?;
        let rationale_str: String = row.get(14)?;
        Ok(TradeRow {
            id: row.get(0)?,
            symbol: row.get(1)?,
            side: Side::parse(&side_str).unwrap_or(Side::Long),
            qty: row.get(3)?,
            entry_ts: row.get(4)?,
            entry_price: row.get(5)?,
            entry_fees: row.get(6)?,
            entry_slip_bps: row.get(7)?,
            exit_ts: row.get(8)?,
            exit_price: row.get(9)?,
            exit_fees: row.get(10)?,
            exit_reason: reason_str.and_then(|s| match s.as_str() {
                "stop" => Some(ExitReason::Stop),
                "time" => Some(ExitReason::Time),
                "kill" => Some(ExitReason::Kill),
                "flatten" => Some(ExitReason::Flatten),
                _ => None,
            }),
            realized_pnl: row.get(12)?,
            decision_id: row.get(13)?,
            rationale: serde_json::from_str(&rationale_str)
                .unwrap_or(serde_json::Value::Null),
        })
    }

    /// Sum of realized P&L over all closed trades.
    pub fn realized_pnl_sum(&self) -> Result<f64> {
        let conn = self.conn.lock();
        let sum: Option<f64> = conn.query_row(
            "SELECT SUM(realized_pnl) FROM trades WHERE exit_ts IS NOT NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(sum.unwrap_or(0.0))
    }

    /// Detect broken position/trade pairings: positions without a matching
    /// open trade, or open trades without a matching position. Returns the
    /// offending symbols.
    pub fn position_trade_mismatches(&self) -> Result<Vec<String>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT p.symbol FROM positions p
             LEFT JOIN trades t ON t.id = p.trade_id AND t.exit_ts IS NULL
             WHERE t.id IS NULL
             UNION
             SELECT t.symbol FROM trades t
             LEFT JOIN positions p ON p.trade_id = t.id
             WHERE t.exit_ts IS NULL AND p.symbol IS NULL",
        )?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    // -------------------------------------------------------------------------
    // NAV
    // -------------------------------------------------------------------------

    pub fn insert_nav(&self, row: &NavRow) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR REPLACE INTO nav (ts, nav_usd, realized_pnl, unrealized_pnl, dd_pct)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                row.ts,
                row.nav_usd,
                row.realized_pnl,
                row.unrealized_pnl,
                row.dd_pct
            ],
        )?;
        Ok(())
    }

    /// Running maximum of `nav_usd` over all snapshots.
    pub fn peak_nav(&self) -> Result<Option<f64>> {
        let conn = self.conn.lock();
        let max: Option<f64> = conn.query_row("SELECT MAX(nav_usd) FROM nav", [], |row| row.get(0))?;
        Ok(max)
    }

    pub fn latest_nav(&self) -> Result<Option<NavRow>> {
        let conn = self.conn.lock();
        conn.query_row(
            "SELECT ts, nav_usd, realized_pnl, unrealized_pnl, dd_pct
             FROM nav ORDER BY ts DESC LIMIT 1",
            [],
            |row| {
                Ok(NavRow {
                    ts: row.get(0)?,
                    nav_usd: row.get(1)?,
                    realized_pnl: row.get(2)?,
                    unrealized_pnl: row.get(3)?,
                    dd_pct: row.get(4)?,
                })
            },
        )
        .optional()
        .context("failed to read latest nav")
    }

    // -------------------------------------------------------------------------
    // Event log
    // -------------------------------------------------------------------------

    pub fn insert_event(&self, ev: &EventRecord) -> Result<()> {
        let conn = self.conn.lock();
        let tags = ev
            .tags
            .iter()
            .map(|t| t.as_str())
            .collect::<Vec<_>>()
            .join(",");
        conn.execute(
            "INSERT INTO event_log
             (ts, level, tags, symbol, timeframe, action, decision_id, trade_id, payload)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            params![
                ev.ts,
                ev.level.as_str(),
                tags,
                ev.symbol,
                ev.timeframe,
                ev.action.map(|a| a.as_str()),
                ev.decision_id,
                ev.trade_id,
                ev.payload.to_string()
            ],
        )?;
        Ok(())
    }

    /// All `(tags, action)` pairs recorded for a decision, in arrival order.
    pub fn events_for_decision(&self, decision_id: &str) -> Result<Vec<(String, Option<String>)>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached(
            "SELECT tags, action FROM event_log WHERE decision_id = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map(params![decision_id], |row| {
                Ok((row.get::<_, String>(0)?, row.get::<_, Option<String>>(1)?))
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn event_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM event_log", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    /// Raw connection access for assertions in crate-internal tests.
    #[cfg(test)]
    pub(crate) fn test_conn(&self) -> parking_lot::MutexGuard<'_, Connection> {
        self.conn.lock()
    }

    /// Feature rows whose underlying candle is missing. Should always be
    /// zero; features are derived from candles and never outlive them.
    pub fn orphan_feature_count(&self) -> Result<usize> {
        let conn = self.conn.lock();
        let n: i64 = conn.query_row(
            "SELECT COUNT(*) FROM features f
             LEFT JOIN candles c
               ON c.symbol = f.symbol AND c.timeframe = f.timeframe AND c.ts = f.ts
             WHERE c.ts IS NULL",
            [],
            |row| row.get(0),
        )?;
        Ok(n as usize)
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store").finish_non_exhaustive()
    }
}
