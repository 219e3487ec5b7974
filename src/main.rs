/// CLI entry point: parses arguments, loads config, and dispatches to one
/// of the four pipeline commands plus the read-only query preview.
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{error, info};

use candle_pipeline::config::Config;
use candle_pipeline::error::PipelineError;
use candle_pipeline::http::RateLimitedClient;
use candle_pipeline::logging;
use candle_pipeline::repair::repair_series;
use candle_pipeline::storage::Storage;
use candle_pipeline::ingest;
use candle_pipeline::verify::verify_series;

#[derive(Parser, Debug)]
#[command(author, version, about = "Deterministic candle & indicator ingestion pipeline")]
struct Cli {
    #[arg(long, default_value = "./config/default.json", global = true)]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Full historical backfill from `bootstrap.startDate` through now.
    Bootstrap {
        #[arg(long)]
        dry_run: bool,
    },
    /// Incremental catch-up from each series' last stored candle.
    Update {
        #[arg(long)]
        dry_run: bool,
    },
    /// Read-only integrity report: gaps and null-indicator spans.
    Verify,
    /// Targeted re-ingest that closes the defects `verify` finds.
    Repair,
    /// Print the latest stored candles (denormalized with indicators).
    Query {
        #[arg(long)]
        symbol: String,
        #[arg(long)]
        interval: String,
        #[arg(long, default_value_t = 50)]
        limit: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            // Logging isn't configured yet without a parsed config; fall
            // back to a plain stderr line for this one failure mode.
            eprintln!("config error: {e}");
            return ExitCode::FAILURE;
        }
    };

    logging::init(&config.log_level);

    // `anyhow` is the dispatch-boundary error type here, matching the
    // pack's convention of threading typed errors up through `?` without
    // a bespoke "top-level error" enum; `PipelineError` below still
    // carries the structured kind operators and tests match on.
    match run(config, cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "command failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(config: Config, command: Command) -> anyhow::Result<()> {
    let shutdown = install_shutdown_handle();

    match command {
        Command::Bootstrap { dry_run } => run_bootstrap(&config, dry_run, &shutdown).await?,
        Command::Update { dry_run } => run_update(&config, dry_run, &shutdown).await?,
        Command::Verify => run_verify(&config)?,
        Command::Repair => run_repair(&config, &shutdown).await?,
        Command::Query { symbol, interval, limit } => run_query(&config, &symbol, &interval, limit)?,
    }
    Ok(())
}

/// Sets a shared flag on SIGINT; checked by the ingest loop between
/// chunks, its only suspension point besides I/O itself.
fn install_shutdown_handle() -> Arc<AtomicBool> {
    let flag = Arc::new(AtomicBool::new(false));
    let handle = flag.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.store(true, Ordering::Relaxed);
        }
    });
    flag
}

async fn run_bootstrap(config: &Config, dry_run: bool, shutdown: &Arc<AtomicBool>) -> Result<(), PipelineError> {
    let mut storage = Storage::open(&config.db_path)?;
    let client = RateLimitedClient::new(&config.rate_limit, &config.http)?;
    let now_ms = now_ms()?;

    for symbol in &config.symbols {
        let (base, quote) = split_symbol(symbol);
        for interval in &config.intervals {
            if shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping before next series");
                return Ok(());
            }
            info!(%symbol, %interval, "bootstrap starting");
            let summary = ingest::bootstrap(
                &mut storage,
                &client,
                symbol,
                interval,
                &base,
                &quote,
                &config.bootstrap.start_date,
                now_ms,
                dry_run,
                shutdown,
            )
            .await?;
            info!(
                %symbol,
                %interval,
                chunks = summary.chunks,
                bars_written = summary.bars_written,
                "bootstrap finished"
            );
        }
    }
    Ok(())
}

async fn run_update(config: &Config, dry_run: bool, shutdown: &Arc<AtomicBool>) -> Result<(), PipelineError> {
    let mut storage = Storage::open(&config.db_path)?;
    let client = RateLimitedClient::new(&config.rate_limit, &config.http)?;
    let now_ms = now_ms()?;

    for symbol in &config.symbols {
        let (base, quote) = split_symbol(symbol);
        for interval in &config.intervals {
            if shutdown.load(Ordering::Relaxed) {
                info!("shutdown requested, stopping before next series");
                return Ok(());
            }
            let series_exists = storage.get_series_id(symbol, interval)?.is_some();
            let summary = if series_exists {
                info!(%symbol, %interval, "update starting");
                ingest::update(
                    &mut storage,
                    &client,
                    symbol,
                    interval,
                    &base,
                    &quote,
                    now_ms,
                    dry_run,
                    shutdown,
                )
                .await?
            } else {
                info!(%symbol, %interval, "no prior series, bootstrapping instead");
                ingest::bootstrap(
                    &mut storage,
                    &client,
                    symbol,
                    interval,
                    &base,
                    &quote,
                    &config.bootstrap.start_date,
                    now_ms,
                    dry_run,
                    shutdown,
                )
                .await?
            };
            info!(
                %symbol,
                %interval,
                chunks = summary.chunks,
                bars_written = summary.bars_written,
                "update finished"
            );
        }
    }
    Ok(())
}

fn run_verify(config: &Config) -> Result<(), PipelineError> {
    let storage = Storage::open(&config.db_path)?;

    // Scans every series the store actually holds, not just the pairs the
    // active config lists — a series ingested under an older config is
    // still on the hook for integrity checks.
    let series = storage.list_series()?;
    if series.is_empty() {
        info!("series_empty");
        return Ok(());
    }

    let mut all_clean = true;
    for desc in &series {
        if storage.open_times(desc.series_id)?.is_empty() {
            info!(symbol = %desc.symbol, interval = %desc.interval_code, "series_empty");
            continue;
        }
        let report = verify_series(&storage, &desc.symbol, &desc.interval_code)?;
        all_clean &= report.is_clean();

        let state = storage.get_series_state(desc.series_id)?;
        info!(
            symbol = %desc.symbol,
            interval = %desc.interval_code,
            integrity_ok = report.integrity_ok,
            total_bars = report.total_bars,
            gaps_found = report.gaps_found,
            gap_samples = report.gap_samples.len(),
            null_indicator_rows_found = report.null_indicator_rows_found,
            null_indicator_samples = report.null_indicator_samples.len(),
            last_open_time = ?state.and_then(|s| s.last_open_time),
            "verify report"
        );
        for gap in report.gap_samples.iter().take(5) {
            info!(
                symbol = %desc.symbol,
                interval = %desc.interval_code,
                start_missing = gap.start_open_time,
                end_missing = gap.end_open_time,
                missing_bars = gap.missing_bars,
                duration = %gap.duration,
                "gap sample"
            );
        }
        for span in report.null_indicator_samples.iter().take(5) {
            info!(
                symbol = %desc.symbol,
                interval = %desc.interval_code,
                start_open_time = span.start_open_time,
                end_open_time = span.end_open_time,
                rows = span.rows,
                "null indicator span sample"
            );
        }
    }
    info!(all_clean, "verify complete");
    Ok(())
}

async fn run_repair(config: &Config, shutdown: &Arc<AtomicBool>) -> Result<(), PipelineError> {
    let mut storage = Storage::open(&config.db_path)?;
    let client = RateLimitedClient::new(&config.rate_limit, &config.http)?;

    let series = storage.list_series()?;
    for desc in &series {
        if shutdown.load(Ordering::Relaxed) {
            info!("shutdown requested, stopping before next series");
            return Ok(());
        }
        let summary = repair_series(&mut storage, &client, &desc.symbol, &desc.interval_code, false).await?;
        info!(
            symbol = %desc.symbol,
            interval = %desc.interval_code,
            gaps_repaired = summary.gaps_repaired,
            bars_written = summary.bars_written,
            gaps_remaining = summary.gaps_remaining,
            null_indicator_rows_remaining = summary.null_indicator_rows_remaining,
            "repair finished"
        );
    }
    Ok(())
}

fn run_query(config: &Config, symbol: &str, interval: &str, limit: u32) -> Result<(), PipelineError> {
    let storage = Storage::open(&config.db_path)?;
    let series_id = storage
        .get_series_id(symbol, interval)?
        .ok_or_else(|| PipelineError::Config(format!("no series for {symbol}/{interval}")))?;

    for row in storage.query_rows(series_id, limit)? {
        println!("{row}");
    }
    Ok(())
}

fn now_ms() -> Result<i64, PipelineError> {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .map_err(|e| PipelineError::Config(format!("system clock before epoch: {e}")))
}

/// Config only lists concatenated pair codes (`BTCUSDT`); the quote asset
/// is inferred from a fixed list of common Binance quote suffixes, longest
/// first so `BUSD` doesn't shadow `USD`-style overlaps.
const KNOWN_QUOTE_ASSETS: &[&str] = &[
    "FDUSD", "BUSD", "USDT", "USDC", "TUSD", "BIDR", "BKRW", "IDRT", "NGN", "RUB", "TRY", "UAH",
    "EUR", "GBP", "AUD", "BRL", "BTC", "ETH", "BNB",
];

fn split_symbol(symbol: &str) -> (String, String) {
    for quote in KNOWN_QUOTE_ASSETS {
        if let Some(base) = symbol.strip_suffix(quote) {
            if !base.is_empty() {
                return (base.to_string(), quote.to_string());
            }
        }
    }
    (symbol.to_string(), String::new())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_common_quote_assets() {
        assert_eq!(split_symbol("BTCUSDT"), ("BTC".into(), "USDT".into()));
        assert_eq!(split_symbol("ETHBTC"), ("ETH".into(), "BTC".into()));
        assert_eq!(split_symbol("BNBBUSD"), ("BNB".into(), "BUSD".into()));
    }

    #[test]
    fn falls_back_to_whole_symbol_when_unrecognized() {
        assert_eq!(split_symbol("XYZ"), ("XYZ".into(), "".into()));
    }
}
