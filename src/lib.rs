/// Deterministic market-data ingestion pipeline: fetches OHLCV candles from
/// Binance's public REST API, computes a fixed battery of technical
/// indicators, and persists both to a local SQLite store. Four operating
/// modes live on top of these modules: bootstrap, update, verify, repair.
pub mod config;
pub mod error;
pub mod http;
pub mod indicators;
pub mod ingest;
pub mod logging;
pub mod repair;
pub mod storage;
pub mod time;
pub mod verify;
