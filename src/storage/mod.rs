/// Storage façade: schema ownership, upserts, range deletes, metadata
/// interning, and transactions — the single relational source of truth.
pub mod models;
mod schema;

use rusqlite::{params, Connection, OptionalExtension, TransactionBehavior};
use std::path::Path;
use tracing::warn;

use crate::error::Result;
pub use models::{Candle, IndicatorRow, KnownGap, SeriesDescriptor, SeriesState};

pub struct Storage {
    conn: Connection,
}

impl Storage {
    pub fn open(db_path: &str) -> Result<Self> {
        let conn = Connection::open(Path::new(db_path))?;
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::init(&conn)?;
        Ok(Self { conn })
    }

    /// Upsert on `symbol`, updating `base_asset`/`quote_asset` if changed.
    pub fn ensure_symbol(&self, symbol: &str, base: &str, quote: &str) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO symbols (symbol, base_asset, quote_asset) VALUES (?1, ?2, ?3)
             ON CONFLICT(symbol) DO UPDATE SET base_asset = excluded.base_asset,
                                                quote_asset = excluded.quote_asset",
            params![symbol, base, quote],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM symbols WHERE symbol = ?1",
            params![symbol],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    /// Upsert on `code`. Updates `ms` unconditionally on every call,
    /// matching a relaxed interval registry rather than an append-only one.
    pub fn ensure_interval(&self, code: &str, ms: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT INTO intervals (code, ms) VALUES (?1, ?2)
             ON CONFLICT(code) DO UPDATE SET ms = excluded.ms",
            params![code, ms],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM intervals WHERE code = ?1",
            params![code],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn ensure_series(&self, symbol_id: i64, interval_id: i64) -> Result<i64> {
        self.conn.execute(
            "INSERT OR IGNORE INTO series (symbol_id, interval_id) VALUES (?1, ?2)",
            params![symbol_id, interval_id],
        )?;
        let id = self.conn.query_row(
            "SELECT id FROM series WHERE symbol_id = ?1 AND interval_id = ?2",
            params![symbol_id, interval_id],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    pub fn get_series_id(&self, symbol: &str, interval_code: &str) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT s.id FROM series s
                 JOIN symbols sy ON sy.id = s.symbol_id
                 JOIN intervals iv ON iv.id = s.interval_id
                 WHERE sy.symbol = ?1 AND iv.code = ?2",
                params![symbol, interval_code],
                |row| row.get(0),
            )
            .optional()
            .map_err(Into::into)
    }

    /// Every series currently in the store, regardless of what the active
    /// config lists — `verify`/`repair` scan the store's own truth rather
    /// than only the configured symbol/interval pairs.
    pub fn list_series(&self) -> Result<Vec<SeriesDescriptor>> {
        let mut stmt = self.conn.prepare(
            "SELECT s.id, sy.symbol, iv.code, iv.ms
             FROM series s
             JOIN symbols sy ON sy.id = s.symbol_id
             JOIN intervals iv ON iv.id = s.interval_id
             ORDER BY sy.symbol, iv.code",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(SeriesDescriptor {
                    series_id: row.get(0)?,
                    symbol: row.get(1)?,
                    interval_code: row.get(2)?,
                    interval_ms: row.get(3)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn get_max_open_time(&self, series_id: i64) -> Result<Option<i64>> {
        self.conn
            .query_row(
                "SELECT MAX(open_time) FROM candles WHERE series_id = ?1",
                params![series_id],
                |row| row.get(0),
            )
            .map_err(Into::into)
    }

    pub fn get_series_state(&self, series_id: i64) -> Result<Option<SeriesState>> {
        self.conn
            .query_row(
                "SELECT last_open_time, last_updated_at FROM series_state WHERE series_id = ?1",
                params![series_id],
                |row| {
                    Ok(SeriesState {
                        last_open_time: row.get(0)?,
                        last_updated_at: row.get(1)?,
                    })
                },
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn known_gaps(&self, series_id: i64) -> Result<Vec<KnownGap>> {
        let mut stmt = self.conn.prepare(
            "SELECT start_open_time, end_open_time FROM known_gaps
             WHERE series_id = ?1 ORDER BY start_open_time",
        )?;
        let rows = stmt
            .query_map(params![series_id], |row| {
                Ok(KnownGap {
                    start_open_time: row.get(0)?,
                    end_open_time: row.get(1)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Idempotent full-row upsert keyed by `(series_id, open_time)`.
    pub fn upsert_candles(&self, series_id: i64, rows: &[Candle]) -> Result<()> {
        upsert_candles_conn(&self.conn, series_id, rows)
    }

    pub fn upsert_indicators(&self, series_id: i64, rows: &[IndicatorRow]) -> Result<()> {
        upsert_indicators_conn(&self.conn, series_id, rows)
    }

    /// Deletes candles and indicator rows with `open_time` in `[from, to]`,
    /// atomically. Not required for idempotency (upserts already converge)
    /// but kept as an explicit operation for repair's surgical re-ingest.
    pub fn delete_range(&self, series_id: i64, from: i64, to: i64) -> Result<()> {
        delete_range_conn(&self.conn, series_id, from, to)
    }

    /// The `limit` candles immediately preceding (but not including)
    /// `before_open_time`, ascending, for seeding a recursive indicator
    /// recompute window.
    pub fn candles_before(&self, series_id: i64, before_open_time: i64, limit: usize) -> Result<Vec<Candle>> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time, open, high, low, close, volume, quote_asset_volume,
                    trades, taker_buy_base_volume, taker_buy_quote_volume
             FROM candles
             WHERE series_id = ?1 AND open_time < ?2
             ORDER BY open_time DESC
             LIMIT ?3",
        )?;
        let mut rows = stmt
            .query_map(params![series_id, before_open_time, limit as i64], |row| {
                Ok(Candle {
                    open_time: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    quote_asset_volume: row.get(6)?,
                    trades: row.get(7)?,
                    taker_buy_base_volume: row.get(8)?,
                    taker_buy_quote_volume: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        rows.reverse();
        Ok(rows)
    }

    /// All candles for a series, ascending, for a full indicator recompute.
    pub fn candles_all(&self, series_id: i64) -> Result<Vec<Candle>> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time, open, high, low, close, volume, quote_asset_volume,
                    trades, taker_buy_base_volume, taker_buy_quote_volume
             FROM candles
             WHERE series_id = ?1
             ORDER BY open_time ASC",
        )?;
        let rows = stmt
            .query_map(params![series_id], |row| {
                Ok(Candle {
                    open_time: row.get(0)?,
                    open: row.get(1)?,
                    high: row.get(2)?,
                    low: row.get(3)?,
                    close: row.get(4)?,
                    volume: row.get(5)?,
                    quote_asset_volume: row.get(6)?,
                    trades: row.get(7)?,
                    taker_buy_base_volume: row.get(8)?,
                    taker_buy_quote_volume: row.get(9)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn open_times(&self, series_id: i64) -> Result<Vec<i64>> {
        let mut stmt = self
            .conn
            .prepare("SELECT open_time FROM candles WHERE series_id = ?1 ORDER BY open_time ASC")?;
        let rows = stmt
            .query_map(params![series_id], |row| row.get(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn indicator_rows(&self, series_id: i64) -> Result<Vec<IndicatorRow>> {
        let mut stmt = self.conn.prepare(
            "SELECT open_time, ema50, ema200, rsi14, atr14, adx14, vol_ma20, macd,
                    macd_signal, macd_hist, bb_sma20, bb_upper, bb_lower,
                    pct_return_1, log_return_1
             FROM indicators WHERE series_id = ?1 ORDER BY open_time ASC",
        )?;
        let rows = stmt
            .query_map(params![series_id], |row| {
                Ok(IndicatorRow {
                    open_time: row.get(0)?,
                    ema50: row.get(1)?,
                    ema200: row.get(2)?,
                    rsi14: row.get(3)?,
                    atr14: row.get(4)?,
                    adx14: row.get(5)?,
                    vol_ma20: row.get(6)?,
                    macd: row.get(7)?,
                    macd_signal: row.get(8)?,
                    macd_hist: row.get(9)?,
                    bb_sma20: row.get(10)?,
                    bb_upper: row.get(11)?,
                    bb_lower: row.get(12)?,
                    pct_return_1: row.get(13)?,
                    log_return_1: row.get(14)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Denormalized join for the `query` command, newest first.
    pub fn query_rows(&self, series_id: i64, limit: u32) -> Result<Vec<serde_json::Value>> {
        let mut stmt = self.conn.prepare(
            "SELECT c.open_time, c.open, c.high, c.low, c.close, c.volume,
                    c.quote_asset_volume, c.trades, c.taker_buy_base_volume,
                    c.taker_buy_quote_volume,
                    i.ema50, i.ema200, i.rsi14, i.atr14, i.adx14, i.vol_ma20,
                    i.macd, i.macd_signal, i.macd_hist, i.bb_sma20, i.bb_upper,
                    i.bb_lower, i.pct_return_1, i.log_return_1
             FROM candles c
             LEFT JOIN indicators i ON i.series_id = c.series_id AND i.open_time = c.open_time
             WHERE c.series_id = ?1
             ORDER BY c.open_time DESC
             LIMIT ?2",
        )?;
        let rows = stmt
            .query_map(params![series_id, limit], |row| {
                Ok(serde_json::json!({
                    "open_time": row.get::<_, i64>(0)?,
                    "open": row.get::<_, f64>(1)?,
                    "high": row.get::<_, f64>(2)?,
                    "low": row.get::<_, f64>(3)?,
                    "close": row.get::<_, f64>(4)?,
                    "volume": row.get::<_, f64>(5)?,
                    "quote_asset_volume": row.get::<_, f64>(6)?,
                    "trades": row.get::<_, i64>(7)?,
                    "taker_buy_base_volume": row.get::<_, f64>(8)?,
                    "taker_buy_quote_volume": row.get::<_, f64>(9)?,
                    "ema50": row.get::<_, Option<f64>>(10)?,
                    "ema200": row.get::<_, Option<f64>>(11)?,
                    "rsi14": row.get::<_, Option<f64>>(12)?,
                    "atr14": row.get::<_, Option<f64>>(13)?,
                    "adx14": row.get::<_, Option<f64>>(14)?,
                    "vol_ma20": row.get::<_, Option<f64>>(15)?,
                    "macd": row.get::<_, Option<f64>>(16)?,
                    "macd_signal": row.get::<_, Option<f64>>(17)?,
                    "macd_hist": row.get::<_, Option<f64>>(18)?,
                    "bb_sma20": row.get::<_, Option<f64>>(19)?,
                    "bb_upper": row.get::<_, Option<f64>>(20)?,
                    "bb_lower": row.get::<_, Option<f64>>(21)?,
                    "pct_return_1": row.get::<_, Option<f64>>(22)?,
                    "log_return_1": row.get::<_, Option<f64>>(23)?,
                }))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    pub fn run_integrity_check(&self) -> Result<Vec<String>> {
        let mut stmt = self.conn.prepare("PRAGMA integrity_check")?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }

    /// Executes `f` inside an immediate-mode transaction: commits on
    /// success, rolls back on error, or rolls back unconditionally when
    /// `dry_run` is set (logging the rollback).
    pub fn tx<T>(
        &mut self,
        dry_run: bool,
        f: impl FnOnce(&rusqlite::Transaction) -> Result<T>,
    ) -> Result<T> {
        let txn = self
            .conn
            .transaction_with_behavior(TransactionBehavior::Immediate)?;
        let result = f(&txn)?;
        if dry_run {
            warn!("dry-run: rolling back transaction");
            txn.rollback()?;
        } else {
            txn.commit()?;
        }
        Ok(result)
    }
}

/// Same upsert `Storage::upsert_candles` runs, but against any connection
/// handle — a plain `Connection` or a `Transaction` (which derefs to one).
/// Lets ingest/repair batch candle and indicator writes into one
/// transaction alongside `touch_series_state_conn`.
pub(crate) fn upsert_candles_conn(conn: &Connection, series_id: i64, rows: &[Candle]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO candles (series_id, open_time, open, high, low, close, volume,
            quote_asset_volume, trades, taker_buy_base_volume, taker_buy_quote_volume)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
         ON CONFLICT(series_id, open_time) DO UPDATE SET
            open = excluded.open, high = excluded.high, low = excluded.low,
            close = excluded.close, volume = excluded.volume,
            quote_asset_volume = excluded.quote_asset_volume,
            trades = excluded.trades,
            taker_buy_base_volume = excluded.taker_buy_base_volume,
            taker_buy_quote_volume = excluded.taker_buy_quote_volume",
    )?;
    for c in rows {
        stmt.execute(params![
            series_id,
            c.open_time,
            c.open,
            c.high,
            c.low,
            c.close,
            c.volume,
            c.quote_asset_volume,
            c.trades,
            c.taker_buy_base_volume,
            c.taker_buy_quote_volume,
        ])?;
    }
    Ok(())
}

pub(crate) fn upsert_indicators_conn(conn: &Connection, series_id: i64, rows: &[IndicatorRow]) -> Result<()> {
    let mut stmt = conn.prepare(
        "INSERT INTO indicators (series_id, open_time, ema50, ema200, rsi14, atr14, adx14,
            vol_ma20, macd, macd_signal, macd_hist, bb_sma20, bb_upper, bb_lower,
            pct_return_1, log_return_1)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)
         ON CONFLICT(series_id, open_time) DO UPDATE SET
            ema50 = excluded.ema50, ema200 = excluded.ema200, rsi14 = excluded.rsi14,
            atr14 = excluded.atr14, adx14 = excluded.adx14, vol_ma20 = excluded.vol_ma20,
            macd = excluded.macd, macd_signal = excluded.macd_signal,
            macd_hist = excluded.macd_hist, bb_sma20 = excluded.bb_sma20,
            bb_upper = excluded.bb_upper, bb_lower = excluded.bb_lower,
            pct_return_1 = excluded.pct_return_1, log_return_1 = excluded.log_return_1",
    )?;
    for r in rows {
        stmt.execute(params![
            series_id,
            r.open_time,
            r.ema50,
            r.ema200,
            r.rsi14,
            r.atr14,
            r.adx14,
            r.vol_ma20,
            r.macd,
            r.macd_signal,
            r.macd_hist,
            r.bb_sma20,
            r.bb_upper,
            r.bb_lower,
            r.pct_return_1,
            r.log_return_1,
        ])?;
    }
    Ok(())
}

pub(crate) fn delete_range_conn(conn: &Connection, series_id: i64, from: i64, to: i64) -> Result<()> {
    conn.execute(
        "DELETE FROM candles WHERE series_id = ?1 AND open_time BETWEEN ?2 AND ?3",
        params![series_id, from, to],
    )?;
    conn.execute(
        "DELETE FROM indicators WHERE series_id = ?1 AND open_time BETWEEN ?2 AND ?3",
        params![series_id, from, to],
    )?;
    Ok(())
}

pub(crate) fn touch_series_state_conn(
    conn: &Connection,
    series_id: i64,
    last_open_time: i64,
    now_ms: i64,
) -> Result<()> {
    conn.execute(
        "INSERT INTO series_state (series_id, last_open_time, last_updated_at)
         VALUES (?1, ?2, ?3)
         ON CONFLICT(series_id) DO UPDATE SET last_open_time = excluded.last_open_time,
                                               last_updated_at = excluded.last_updated_at",
        params![series_id, last_open_time, now_ms],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ensure_symbol_interval_series_roundtrip() {
        let storage = Storage::open_in_memory().unwrap();
        let sym_id = storage.ensure_symbol("BTCUSDT", "BTC", "USDT").unwrap();
        let ivl_id = storage.ensure_interval("1h", 3_600_000).unwrap();
        let series_id = storage.ensure_series(sym_id, ivl_id).unwrap();

        let again = storage.ensure_series(sym_id, ivl_id).unwrap();
        assert_eq!(series_id, again);

        let found = storage.get_series_id("BTCUSDT", "1h").unwrap();
        assert_eq!(found, Some(series_id));
    }

    #[test]
    fn upsert_candles_is_idempotent() {
        let storage = Storage::open_in_memory().unwrap();
        let sym_id = storage.ensure_symbol("BTCUSDT", "BTC", "USDT").unwrap();
        let ivl_id = storage.ensure_interval("1h", 3_600_000).unwrap();
        let series_id = storage.ensure_series(sym_id, ivl_id).unwrap();

        let candle = Candle {
            open_time: 0,
            open: 1.0,
            high: 2.0,
            low: 0.5,
            close: 1.5,
            volume: 10.0,
            quote_asset_volume: 15.0,
            trades: 3,
            taker_buy_base_volume: 1.0,
            taker_buy_quote_volume: 1.5,
        };
        storage.upsert_candles(series_id, &[candle.clone()]).unwrap();
        storage.upsert_candles(series_id, &[candle]).unwrap();

        let times = storage.open_times(series_id).unwrap();
        assert_eq!(times, vec![0]);
    }

    #[test]
    fn delete_range_removes_candles_and_indicators() {
        let storage = Storage::open_in_memory().unwrap();
        let sym_id = storage.ensure_symbol("BTCUSDT", "BTC", "USDT").unwrap();
        let ivl_id = storage.ensure_interval("1h", 3_600_000).unwrap();
        let series_id = storage.ensure_series(sym_id, ivl_id).unwrap();

        let candle = Candle {
            open_time: 3_600_000,
            open: 1.0,
            high: 1.0,
            low: 1.0,
            close: 1.0,
            volume: 1.0,
            quote_asset_volume: 1.0,
            trades: 1,
            taker_buy_base_volume: 1.0,
            taker_buy_quote_volume: 1.0,
        };
        storage.upsert_candles(series_id, &[candle]).unwrap();
        storage
            .upsert_indicators(series_id, &[IndicatorRow { open_time: 3_600_000, ..Default::default() }])
            .unwrap();

        storage.delete_range(series_id, 0, 7_200_000).unwrap();
        assert!(storage.open_times(series_id).unwrap().is_empty());
        assert!(storage.indicator_rows(series_id).unwrap().is_empty());
    }

    #[test]
    fn dry_run_transaction_rolls_back() {
        let mut storage = Storage::open_in_memory().unwrap();
        let sym_id = storage.ensure_symbol("BTCUSDT", "BTC", "USDT").unwrap();
        let ivl_id = storage.ensure_interval("1h", 3_600_000).unwrap();
        let series_id = storage.ensure_series(sym_id, ivl_id).unwrap();

        storage
            .tx(true, |txn| {
                txn.execute(
                    "INSERT INTO candles (series_id, open_time, open, high, low, close, volume,
                        quote_asset_volume, trades, taker_buy_base_volume, taker_buy_quote_volume)
                     VALUES (?1, 0, 1, 1, 1, 1, 1, 1, 1, 1, 1)",
                    params![series_id],
                )?;
                Ok(())
            })
            .unwrap();

        assert!(storage.open_times(series_id).unwrap().is_empty());
    }
}
