/// Wilder-smoothed Average Directional Index.
///
/// Three Wilder-smoothed running sums (`+DM14`, `-DM14`, `TR14`) feed a
/// directional index (`DX`) at every bar past the first warm-up window;
/// `ADX` itself is the Wilder smoothing of `DX` over a second window, so
/// the indicator only comes alive at `2*period - 1`.
pub fn wilder_adx(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = high.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let mut pdm = vec![0.0; n];
    let mut mdm = vec![0.0; n];
    let mut tr = vec![0.0; n];

    for i in 1..n {
        let up_move = high[i] - high[i - 1];
        let down_move = low[i - 1] - low[i];
        pdm[i] = if up_move.max(0.0) > down_move.max(0.0) {
            up_move.max(0.0)
        } else {
            0.0
        };
        mdm[i] = if down_move.max(0.0) > up_move.max(0.0) {
            down_move.max(0.0)
        } else {
            0.0
        };

        let a = high[i] - low[i];
        let b = (high[i] - close[i - 1]).abs();
        let c = (low[i] - close[i - 1]).abs();
        tr[i] = a.max(b).max(c);
    }

    let mut tr14: f64 = tr[1..=period].iter().sum();
    let mut pdm14: f64 = pdm[1..=period].iter().sum();
    let mut mdm14: f64 = mdm[1..=period].iter().sum();

    let mut dx = vec![None; n];
    dx[period] = dx_from_sums(pdm14, mdm14, tr14);

    for i in (period + 1)..n {
        tr14 = tr14 - tr14 / period as f64 + tr[i];
        pdm14 = pdm14 - pdm14 / period as f64 + pdm[i];
        mdm14 = mdm14 - mdm14 / period as f64 + mdm[i];
        dx[i] = dx_from_sums(pdm14, mdm14, tr14);
    }

    let first_adx_idx = 2 * period - 1;
    let window: Vec<f64> = dx[period..=first_adx_idx]
        .iter()
        .map(|v| v.unwrap_or(0.0))
        .collect();
    let mut adx = window.iter().sum::<f64>() / period as f64;
    out[first_adx_idx] = Some(adx);

    for i in (first_adx_idx + 1)..n {
        let dxi = dx[i].unwrap_or(adx);
        adx = (adx * (period - 1) as f64 + dxi) / period as f64;
        out[i] = Some(adx);
    }

    out
}

fn dx_from_sums(pdm14: f64, mdm14: f64, tr14: f64) -> Option<f64> {
    if tr14 <= 0.0 {
        return None;
    }
    let pdi = 100.0 * pdm14 / tr14;
    let mdi = 100.0 * mdm14 / tr14;
    if pdi + mdi == 0.0 {
        return Some(0.0);
    }
    Some(100.0 * (pdi - mdi).abs() / (pdi + mdi))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trending_series_has_rising_then_settling_adx() {
        let n = 80;
        let close: Vec<f64> = (0..n).map(|i| 100.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let out = wilder_adx(&high, &low, &close, 14);
        assert!(out[..27].iter().all(|v| v.is_none()));
        assert!(out[27].is_some());
        // a clean uptrend should report a strongly trending ADX
        assert!(out[79].unwrap() > 50.0);
    }

    #[test]
    fn flat_series_reports_zero_adx() {
        let n = 60;
        let high = vec![101.0; n];
        let low = vec![99.0; n];
        let close = vec![100.0; n];
        let out = wilder_adx(&high, &low, &close, 14);
        assert!((out[27].unwrap()).abs() < 1e-9);
    }
}
