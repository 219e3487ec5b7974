/// Schema and durability pragmas for the storage façade.
use rusqlite::Connection;

pub fn init(conn: &Connection) -> rusqlite::Result<()> {
    conn.execute_batch(
        "
        PRAGMA journal_mode = WAL;
        PRAGMA synchronous = NORMAL;
        PRAGMA foreign_keys = ON;
        PRAGMA busy_timeout = 5000;

        CREATE TABLE IF NOT EXISTS symbols (
            id INTEGER PRIMARY KEY,
            symbol TEXT NOT NULL UNIQUE,
            base_asset TEXT NOT NULL,
            quote_asset TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS intervals (
            id INTEGER PRIMARY KEY,
            code TEXT NOT NULL UNIQUE,
            ms INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS series (
            id INTEGER PRIMARY KEY,
            symbol_id INTEGER NOT NULL REFERENCES symbols(id),
            interval_id INTEGER NOT NULL REFERENCES intervals(id),
            UNIQUE(symbol_id, interval_id)
        );

        CREATE TABLE IF NOT EXISTS candles (
            series_id INTEGER NOT NULL REFERENCES series(id),
            open_time INTEGER NOT NULL,
            open REAL NOT NULL,
            high REAL NOT NULL,
            low REAL NOT NULL,
            close REAL NOT NULL,
            volume REAL NOT NULL,
            quote_asset_volume REAL NOT NULL,
            trades INTEGER NOT NULL,
            taker_buy_base_volume REAL NOT NULL,
            taker_buy_quote_volume REAL NOT NULL,
            PRIMARY KEY (series_id, open_time)
        );
        CREATE INDEX IF NOT EXISTS idx_candles_series_open
            ON candles(series_id, open_time);

        CREATE TABLE IF NOT EXISTS indicators (
            series_id INTEGER NOT NULL REFERENCES series(id),
            open_time INTEGER NOT NULL,
            ema50 REAL,
            ema200 REAL,
            rsi14 REAL,
            atr14 REAL,
            adx14 REAL,
            vol_ma20 REAL,
            macd REAL,
            macd_signal REAL,
            macd_hist REAL,
            bb_sma20 REAL,
            bb_upper REAL,
            bb_lower REAL,
            pct_return_1 REAL,
            log_return_1 REAL,
            PRIMARY KEY (series_id, open_time)
        );
        CREATE INDEX IF NOT EXISTS idx_indicators_series_open
            ON indicators(series_id, open_time);

        CREATE TABLE IF NOT EXISTS series_state (
            series_id INTEGER PRIMARY KEY REFERENCES series(id),
            last_open_time INTEGER,
            last_updated_at INTEGER NOT NULL
        );

        CREATE TABLE IF NOT EXISTS known_gaps (
            series_id INTEGER NOT NULL REFERENCES series(id),
            start_open_time INTEGER NOT NULL,
            end_open_time INTEGER NOT NULL,
            PRIMARY KEY (series_id, start_open_time, end_open_time)
        );
        ",
    )
}
