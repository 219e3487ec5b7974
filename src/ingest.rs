/// Bootstrap and update: fetch candles from the exchange, recompute
/// indicators over an overlap window, and write both atomically per chunk.
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{info, warn};

use crate::error::{PipelineError, Result};
use crate::http::{Kline, RateLimitedClient};
use crate::indicators::{compute_all, IndicatorBatch, Ohlcv};
use crate::storage::models::{Candle, IndicatorRow};
use crate::storage::{self, Storage};
use crate::time::{interval_ms, last_closed_open_time_exclusive_end};

/// The exchange never returns more rows than this per request.
pub(crate) const MAX_API_LIMIT: u32 = 1000;

/// Trailing candles carried into each chunk so recursive indicators (EMA,
/// Wilder RSI/ATR/ADX, MACD) converge before the first newly written bar
/// rather than restarting cold at every chunk boundary.
const OVERLAP_BARS: usize = 600;

#[derive(Debug, Clone, Copy, Default)]
pub struct IngestSummary {
    pub chunks: u32,
    pub bars_fetched: u64,
    pub bars_written: u64,
}

/// First run for a series: fetches from `start_date` (RFC3339) through the
/// last fully closed bar.
pub async fn bootstrap(
    storage: &mut Storage,
    client: &RateLimitedClient,
    symbol: &str,
    interval_code: &str,
    base_asset: &str,
    quote_asset: &str,
    start_date: &str,
    now_ms: i64,
    dry_run: bool,
    shutdown: &Arc<AtomicBool>,
) -> Result<IngestSummary> {
    let start = DateTime::parse_from_rfc3339(start_date)
        .map_err(|e| PipelineError::Config(format!("invalid bootstrap.startDate {start_date:?}: {e}")))?
        .with_timezone(&Utc);
    let start_ms = start.timestamp_millis();

    run(
        storage,
        client,
        symbol,
        interval_code,
        base_asset,
        quote_asset,
        start_ms,
        now_ms,
        dry_run,
        shutdown,
    )
    .await
}

/// Subsequent runs: resumes from the series' last stored candle. Falls
/// back to `bootstrap` semantics (via the caller) if no series exists yet.
pub async fn update(
    storage: &mut Storage,
    client: &RateLimitedClient,
    symbol: &str,
    interval_code: &str,
    base_asset: &str,
    quote_asset: &str,
    now_ms: i64,
    dry_run: bool,
    shutdown: &Arc<AtomicBool>,
) -> Result<IngestSummary> {
    let step = interval_ms(interval_code)?;
    let series_id = storage.get_series_id(symbol, interval_code)?;
    let start_ms = match series_id {
        Some(id) => match storage.get_max_open_time(id)? {
            Some(max_open_time) => max_open_time + step,
            None => {
                return Err(PipelineError::Config(format!(
                    "series {symbol}/{interval_code} exists with no candles; run bootstrap first"
                )))
            }
        },
        None => {
            return Err(PipelineError::Config(format!(
                "no series for {symbol}/{interval_code}; run bootstrap first"
            )))
        }
    };

    run(
        storage,
        client,
        symbol,
        interval_code,
        base_asset,
        quote_asset,
        start_ms,
        now_ms,
        dry_run,
        shutdown,
    )
    .await
}

#[allow(clippy::too_many_arguments)]
async fn run(
    storage: &mut Storage,
    client: &RateLimitedClient,
    symbol: &str,
    interval_code: &str,
    base_asset: &str,
    quote_asset: &str,
    start_cursor: i64,
    now_ms: i64,
    dry_run: bool,
    shutdown: &Arc<AtomicBool>,
) -> Result<IngestSummary> {
    let step = interval_ms(interval_code)?;
    let sym_id = storage.ensure_symbol(symbol, base_asset, quote_asset)?;
    let ivl_id = storage.ensure_interval(interval_code, step)?;
    let series_id = storage.ensure_series(sym_id, ivl_id)?;

    let end_inclusive = last_closed_open_time_exclusive_end(now_ms, step);
    let mut cursor = start_cursor;
    let mut overlap = storage.candles_before(series_id, cursor, OVERLAP_BARS)?;
    let mut summary = IngestSummary::default();

    if cursor > end_inclusive {
        return Ok(summary);
    }

    loop {
        if cursor > end_inclusive {
            break;
        }
        if shutdown.load(Ordering::Relaxed) {
            warn!(symbol, interval_code, "shutdown requested, stopping at chunk boundary");
            break;
        }
        let chunk_end = (cursor + (MAX_API_LIMIT as i64 - 1) * step).min(end_inclusive);
        let klines = client
            .get_klines(symbol, interval_code, Some(cursor), Some(chunk_end), MAX_API_LIMIT)
            .await?;

        if klines.is_empty() {
            break;
        }
        summary.bars_fetched += klines.len() as u64;

        let new_candles: Vec<Candle> = klines.iter().map(kline_to_candle).collect();
        let mut combined = overlap.clone();
        combined.extend(new_candles.iter().cloned());

        let ohlcv = candles_to_ohlcv(&combined);
        let batch = compute_all(&ohlcv);
        let new_start_idx = combined.len() - new_candles.len();
        let new_indicators: Vec<IndicatorRow> = (new_start_idx..combined.len())
            .map(|i| indicator_row_at(&batch, i))
            .collect();

        let next_cursor = new_candles.last().expect("non-empty klines").open_time + step;
        let reached_end = (klines.len() as u32) < MAX_API_LIMIT;

        storage.tx(dry_run, |txn| {
            storage::upsert_candles_conn(txn, series_id, &new_candles)?;
            storage::upsert_indicators_conn(txn, series_id, &new_indicators)?;
            storage::touch_series_state_conn(txn, series_id, next_cursor - step, now_ms)?;
            Ok(())
        })?;

        summary.bars_written += new_candles.len() as u64;
        summary.chunks += 1;

        overlap = combined[combined.len().saturating_sub(OVERLAP_BARS)..].to_vec();
        cursor = next_cursor;

        info!(
            symbol,
            interval_code,
            chunk = summary.chunks,
            bars_written = summary.bars_written,
            dry_run,
            "wrote chunk"
        );

        if reached_end {
            break;
        }
    }

    Ok(summary)
}

pub(crate) fn kline_to_candle(k: &Kline) -> Candle {
    Candle {
        open_time: k.open_time,
        open: k.open,
        high: k.high,
        low: k.low,
        close: k.close,
        volume: k.volume,
        quote_asset_volume: k.quote_asset_volume,
        trades: k.number_of_trades,
        taker_buy_base_volume: k.taker_buy_base_volume,
        taker_buy_quote_volume: k.taker_buy_quote_volume,
    }
}

pub(crate) fn candles_to_ohlcv(rows: &[Candle]) -> Ohlcv {
    Ohlcv {
        open_time: rows.iter().map(|c| c.open_time).collect(),
        open: rows.iter().map(|c| c.open).collect(),
        high: rows.iter().map(|c| c.high).collect(),
        low: rows.iter().map(|c| c.low).collect(),
        close: rows.iter().map(|c| c.close).collect(),
        volume: rows.iter().map(|c| c.volume).collect(),
    }
}

pub(crate) fn indicator_row_at(batch: &IndicatorBatch, i: usize) -> IndicatorRow {
    IndicatorRow {
        open_time: batch.open_time[i],
        ema50: batch.ema50[i],
        ema200: batch.ema200[i],
        rsi14: batch.rsi14[i],
        atr14: batch.atr14[i],
        adx14: batch.adx14[i],
        vol_ma20: batch.vol_ma20[i],
        macd: batch.macd[i],
        macd_signal: batch.macd_signal[i],
        macd_hist: batch.macd_hist[i],
        bb_sma20: batch.bb_sma20[i],
        bb_upper: batch.bb_upper[i],
        bb_lower: batch.bb_lower[i],
        pct_return_1: batch.pct_return_1[i],
        log_return_1: batch.log_return_1[i],
    }
}
