/// Indicator kernels.
///
/// Pure, deterministic functions over aligned OHLCV vectors. No I/O, no
/// allocation beyond the output vectors, no shared state — every kernel
/// can be called standalone from a test, and `compute_all` simply wires
/// them together for the ingest/repair engines.
pub mod adx;
pub mod atr;
pub mod bollinger;
pub mod ema;
pub mod macd;
pub mod returns;
pub mod rsi;
pub mod sma;
pub mod stddev;

/// Bars the ingest engine fetches from the exchange, already ordered
/// ascending by `open_time`.
#[derive(Debug, Clone)]
pub struct Ohlcv {
    pub open_time: Vec<i64>,
    pub open: Vec<f64>,
    pub high: Vec<f64>,
    pub low: Vec<f64>,
    pub close: Vec<f64>,
    pub volume: Vec<f64>,
}

impl Ohlcv {
    pub fn len(&self) -> usize {
        self.open_time.len()
    }

    pub fn is_empty(&self) -> bool {
        self.open_time.is_empty()
    }
}

/// One row of the indicator companion table, parallel in length to the
/// `Ohlcv` it was computed from. Every field is nullable: indicators with
/// a warmup window leave earlier bars unset rather than approximating.
#[derive(Debug, Clone, Default)]
pub struct IndicatorBatch {
    pub open_time: Vec<i64>,
    pub ema50: Vec<Option<f64>>,
    pub ema200: Vec<Option<f64>>,
    pub rsi14: Vec<Option<f64>>,
    pub atr14: Vec<Option<f64>>,
    pub adx14: Vec<Option<f64>>,
    pub vol_ma20: Vec<Option<f64>>,
    pub macd: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub bb_sma20: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub pct_return_1: Vec<Option<f64>>,
    pub log_return_1: Vec<Option<f64>>,
}

/// Warm-up floor for the full indicator suite (driven by EMA200), used by
/// verify/repair to ignore expected nulls in the opening stretch of a
/// series.
pub const WARMUP_BARS: usize = 200;

/// Run the full indicator battery over an aligned OHLCV batch.
pub fn compute_all(bars: &Ohlcv) -> IndicatorBatch {
    let n = bars.len();
    let (bb_sma20, bb_upper, bb_lower) = bollinger::bollinger(&bars.close, 20, 2.0);
    let (macd_line, macd_signal, macd_hist) = macd::macd(&bars.close, 12, 26, 9);
    let (pct_return_1, log_return_1) = returns::returns(&bars.close);

    let mut batch = IndicatorBatch {
        open_time: bars.open_time.clone(),
        ema50: ema::ema(&bars.close, 50, None),
        ema200: ema::ema(&bars.close, 200, None),
        rsi14: rsi::wilder_rsi(&bars.close, 14),
        atr14: atr::wilder_atr(&bars.high, &bars.low, &bars.close, 14),
        adx14: adx::wilder_adx(&bars.high, &bars.low, &bars.close, 14),
        vol_ma20: sma::sma(&bars.volume, 20),
        macd: macd_line,
        macd_signal,
        macd_hist,
        bb_sma20,
        bb_upper,
        bb_lower,
        pct_return_1,
        log_return_1,
    };

    debug_assert_eq!(batch.open_time.len(), n);
    // Every vector must stay parallel in length to the input, even where
    // a kernel bails out early on short input.
    batch.ema50.resize(n, None);
    batch.ema200.resize(n, None);
    batch.rsi14.resize(n, None);
    batch.atr14.resize(n, None);
    batch.adx14.resize(n, None);
    batch.vol_ma20.resize(n, None);
    batch.macd.resize(n, None);
    batch.macd_signal.resize(n, None);
    batch.macd_hist.resize(n, None);
    batch.bb_sma20.resize(n, None);
    batch.bb_upper.resize(n, None);
    batch.bb_lower.resize(n, None);
    batch.pct_return_1.resize(n, None);
    batch.log_return_1.resize(n, None);
    batch
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize) -> Ohlcv {
        let close: Vec<f64> = (0..n).map(|i| 100.0 + 0.1 * i as f64).collect();
        Ohlcv {
            open_time: (0..n).map(|i| i as i64 * 3_600_000).collect(),
            open: close.clone(),
            high: close.iter().map(|c| c + 0.05).collect(),
            low: close.iter().map(|c| c - 0.05).collect(),
            close,
            volume: vec![10.0; n],
        }
    }

    #[test]
    fn scenario_1_linear_ramp_300_bars() {
        let bars = ramp(300);
        let batch = compute_all(&bars);

        assert_eq!(batch.ema50.len(), 300);
        assert_eq!(batch.rsi14.len(), 300);
        assert_eq!(batch.macd.len(), 300);

        let seed = sma::sma(&bars.close, 50)[49].unwrap();
        let ema50_49 = batch.ema50[49].unwrap();
        assert!((ema50_49 - seed).abs() < 1e-9);

        for i in 14..300 {
            assert_eq!(batch.rsi14[i], Some(100.0));
        }
    }
}
