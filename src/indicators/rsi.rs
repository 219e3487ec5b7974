/// Wilder-smoothed Relative Strength Index.
///
/// Differs from a plain EMA-smoothed RSI: the seed is a simple average
/// over the first `period` differences, then each subsequent average is
/// smoothed with weight `(period-1)/period` rather than the standard EMA
/// `k`.
pub fn wilder_rsi(close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = close.len();
    let mut out = vec![None; n];
    if n < period + 1 {
        return out;
    }

    let mut gains = vec![0.0; n];
    let mut losses = vec![0.0; n];
    for i in 1..n {
        let delta = close[i] - close[i - 1];
        if delta > 0.0 {
            gains[i] = delta;
        } else {
            losses[i] = -delta;
        }
    }

    let mut avg_gain: f64 = gains[1..=period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[1..=period].iter().sum::<f64>() / period as f64;

    out[period] = Some(rsi_from_averages(avg_gain, avg_loss));

    for i in (period + 1)..n {
        avg_gain = (avg_gain * (period - 1) as f64 + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period - 1) as f64 + losses[i]) / period as f64;
        out[i] = Some(rsi_from_averages(avg_gain, avg_loss));
    }

    out
}

fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - 100.0 / (1.0 + rs)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nulls_before_and_at_warmup_boundary() {
        let close = vec![100.0; 20];
        let out = wilder_rsi(&close, 14);
        for v in &out[0..14] {
            assert!(v.is_none());
        }
    }

    #[test]
    fn all_gains_yields_100() {
        let close: Vec<f64> = (0..40).map(|i| 100.0 + i as f64).collect();
        let out = wilder_rsi(&close, 14);
        for i in 14..40 {
            assert_eq!(out[i], Some(100.0));
        }
    }
}
