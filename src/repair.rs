/// Targeted re-ingest: fixes the defects `verify` finds without
/// re-fetching a series from scratch.
use tracing::info;

use crate::error::{PipelineError, Result};
use crate::http::{Kline, RateLimitedClient};
use crate::indicators::compute_all;
use crate::storage::{self, Storage};
use crate::time::interval_ms;
use crate::verify::{detect_all_gaps, verify_series, GapSample, VerifyReport};

/// Bars fetched on either side of a gap so the recomputed indicator
/// window converges before the gap's first repaired bar.
const OVERLAP_BARS: i64 = 600;

#[derive(Debug, Clone, Copy, Default)]
pub struct RepairSummary {
    pub gaps_repaired: u32,
    pub bars_written: u64,
    pub gaps_remaining: u64,
    pub null_indicator_rows_remaining: u64,
}

pub async fn repair_series(
    storage: &mut Storage,
    client: &RateLimitedClient,
    symbol: &str,
    interval_code: &str,
    dry_run: bool,
) -> Result<RepairSummary> {
    let step = interval_ms(interval_code)?;
    let series_id = storage
        .get_series_id(symbol, interval_code)?
        .ok_or_else(|| PipelineError::Config(format!("no series for {symbol}/{interval_code}")))?;

    let before = verify_series(storage, symbol, interval_code)?;

    // `before.gap_samples` is capped at MAX_SAMPLES for reporting; repair
    // needs every gap window closed in one pass, so re-derive the
    // uncapped list from the same stored state instead.
    let open_times = storage.open_times(series_id)?;
    let known_gaps = storage.known_gaps(series_id)?;
    let all_gaps = detect_all_gaps(&open_times, step, &known_gaps);

    let mut summary = RepairSummary::default();

    for gap in &all_gaps {
        repair_gap(storage, client, series_id, symbol, interval_code, step, gap, dry_run).await?;
        summary.gaps_repaired += 1;
        summary.bars_written += gap.missing_bars;
    }

    if !before.null_indicator_samples.is_empty() {
        repair_null_spans(storage, series_id, symbol, interval_code, step, &before, dry_run)?;
    }

    let after = verify_series(storage, symbol, interval_code)?;
    summary.gaps_remaining = after.gaps_found;
    summary.null_indicator_rows_remaining = after.null_indicator_rows_found;
    Ok(summary)
}

async fn repair_gap(
    storage: &mut Storage,
    client: &RateLimitedClient,
    series_id: i64,
    symbol: &str,
    interval_code: &str,
    step: i64,
    gap: &GapSample,
    dry_run: bool,
) -> Result<()> {
    let fetch_start = gap.start_open_time - OVERLAP_BARS * step;
    let fetch_end = gap.end_open_time + OVERLAP_BARS * step;

    let klines = fetch_window(client, symbol, interval_code, fetch_start, fetch_end).await?;
    if klines.is_empty() {
        return Ok(());
    }

    let candles: Vec<crate::storage::models::Candle> = klines.iter().map(kline_to_candle).collect();
    let ohlcv = crate::ingest::candles_to_ohlcv(&candles);
    let batch = compute_all(&ohlcv);

    // Only the gap window itself is a hole; the overlap bars on either
    // side already exist and are left untouched on the candles table, but
    // indicators are rewritten for the whole fetched span so a
    // recursive kernel's convergence carries through correctly.
    let gap_candles: Vec<crate::storage::models::Candle> = candles
        .iter()
        .filter(|c| c.open_time >= gap.start_open_time && c.open_time <= gap.end_open_time)
        .cloned()
        .collect();
    let indicator_rows: Vec<crate::storage::models::IndicatorRow> = (0..candles.len())
        .map(|i| crate::ingest::indicator_row_at(&batch, i))
        .collect();

    storage.tx(dry_run, |txn| {
        storage::upsert_candles_conn(txn, series_id, &gap_candles)?;
        storage::upsert_indicators_conn(txn, series_id, &indicator_rows)?;
        Ok(())
    })?;

    info!(
        symbol,
        interval_code,
        gap_start = gap.start_open_time,
        gap_end = gap.end_open_time,
        bars = gap_candles.len(),
        dry_run,
        "repaired gap"
    );
    Ok(())
}

/// Null-indicator spans are not fetch failures: the candles already
/// exist, only the companion indicator row was never (re)computed. A
/// full-series recompute over the stored candles is the only way to
/// guarantee the recursive kernels see a correct run-in.
fn repair_null_spans(
    storage: &mut Storage,
    series_id: i64,
    symbol: &str,
    interval_code: &str,
    _step: i64,
    _before: &VerifyReport,
    dry_run: bool,
) -> Result<()> {
    let candles = storage.candles_all(series_id)?;
    if candles.is_empty() {
        return Ok(());
    }
    let ohlcv = crate::ingest::candles_to_ohlcv(&candles);
    let batch = compute_all(&ohlcv);
    let rows: Vec<crate::storage::models::IndicatorRow> = (0..candles.len())
        .map(|i| crate::ingest::indicator_row_at(&batch, i))
        .collect();

    storage.tx(dry_run, |txn| {
        storage::upsert_indicators_conn(txn, series_id, &rows)?;
        Ok(())
    })?;

    info!(symbol, interval_code, rows = rows.len(), dry_run, "recomputed indicators");
    Ok(())
}

/// Pages through `[start, end]` in `MAX_API_LIMIT`-sized requests — the
/// 600-bar overlap on each side of a gap routinely pushes a repair window
/// past the exchange's per-request row cap.
async fn fetch_window(
    client: &RateLimitedClient,
    symbol: &str,
    interval_code: &str,
    start: i64,
    end: i64,
) -> Result<Vec<Kline>> {
    let step = interval_ms(interval_code)?;
    let mut cursor = start;
    let mut all = Vec::new();

    while cursor <= end {
        let chunk_end = (cursor + (crate::ingest::MAX_API_LIMIT as i64 - 1) * step).min(end);
        let klines = client
            .get_klines(symbol, interval_code, Some(cursor), Some(chunk_end), crate::ingest::MAX_API_LIMIT)
            .await?;
        if klines.is_empty() {
            break;
        }
        let reached_end = (klines.len() as u32) < crate::ingest::MAX_API_LIMIT;
        cursor = klines.last().expect("non-empty").open_time + step;
        all.extend(klines);
        if reached_end {
            break;
        }
    }

    Ok(all)
}

fn kline_to_candle(k: &Kline) -> crate::storage::models::Candle {
    crate::storage::models::Candle {
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gap_repair_window_includes_overlap_on_both_sides() {
        let step = 3_600_000;
        let gap = GapSample {
            start_open_time: 10 * step,
            end_open_time: 12 * step,
            missing_bars: 3,
            duration: "3h".into(),
        };
        let fetch_start = gap.start_open_time - OVERLAP_BARS * step;
        let fetch_end = gap.end_open_time + OVERLAP_BARS * step;
        assert!(fetch_start < gap.start_open_time);
        assert!(fetch_end > gap.end_open_time);
    }
}
