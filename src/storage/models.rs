/// Row types for the storage façade.
#[derive(Debug, Clone, PartialEq)]
pub struct Candle {
    pub open_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub quote_asset_volume: f64,
    pub trades: i64,
    pub taker_buy_base_volume: f64,
    pub taker_buy_quote_volume: f64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IndicatorRow {
    pub open_time: i64,
    pub ema50: Option<f64>,
    pub ema200: Option<f64>,
    pub rsi14: Option<f64>,
    pub atr14: Option<f64>,
    pub adx14: Option<f64>,
    pub vol_ma20: Option<f64>,
    pub macd: Option<f64>,
    pub macd_signal: Option<f64>,
    pub macd_hist: Option<f64>,
    pub bb_sma20: Option<f64>,
    pub bb_upper: Option<f64>,
    pub bb_lower: Option<f64>,
    pub pct_return_1: Option<f64>,
    pub log_return_1: Option<f64>,
}

impl IndicatorRow {
    /// Used by verify's null-span detection: a row that carries no signal
    /// at all (every field null) is indistinguishable from "not yet
    /// computed".
    pub fn all_null(&self) -> bool {
        self.ema50.is_none()
            && self.ema200.is_none()
            && self.rsi14.is_none()
            && self.atr14.is_none()
            && self.adx14.is_none()
            && self.vol_ma20.is_none()
            && self.macd.is_none()
            && self.macd_signal.is_none()
            && self.macd_hist.is_none()
            && self.bb_sma20.is_none()
            && self.bb_upper.is_none()
            && self.bb_lower.is_none()
            && self.pct_return_1.is_none()
            && self.log_return_1.is_none()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SeriesState {
    pub last_open_time: Option<i64>,
    pub last_updated_at: i64,
}

#[derive(Debug, Clone)]
pub struct SeriesDescriptor {
    pub series_id: i64,
    pub symbol: String,
    pub interval_code: String,
    pub interval_ms: i64,
}

#[derive(Debug, Clone, Copy)]
pub struct KnownGap {
    pub start_open_time: i64,
    pub end_open_time: i64,
}
