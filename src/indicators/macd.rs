/// MACD(12, 26, 9).
///
/// The signal line seeds its 9-period EMA from the MACD line with nulls
/// replaced by zero, carried over bit-for-bit rather than "fixed", since
/// downstream consumers depend on parity with the reference behavior.
use super::ema::ema;

pub fn macd(
    close: &[f64],
    fast: usize,
    slow: usize,
    signal_period: usize,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    let ema_fast = ema(close, fast, None);
    let ema_slow = ema(close, slow, None);

    let macd_line: Vec<Option<f64>> = (0..n)
        .map(|i| match (ema_fast[i], ema_slow[i]) {
            (Some(f), Some(s)) => Some(f - s),
            _ => None,
        })
        .collect();

    let macd_zeroed: Vec<f64> = macd_line.iter().map(|v| v.unwrap_or(0.0)).collect();
    let signal = ema(&macd_zeroed, signal_period, None);

    let hist: Vec<Option<f64>> = (0..n)
        .map(|i| match (macd_line[i], signal[i]) {
            (Some(m), Some(s)) => Some(m - s),
            _ => None,
        })
        .collect();

    (macd_line, signal, hist)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lengths_match_input() {
        let close: Vec<f64> = (0..100).map(|i| 100.0 + i as f64 * 0.2).collect();
        let (m, s, h) = macd(&close, 12, 26, 9);
        assert_eq!(m.len(), 100);
        assert_eq!(s.len(), 100);
        assert_eq!(h.len(), 100);
    }

    #[test]
    fn signal_seeds_from_zeroed_macd_nulls() {
        // With a flat series MACD is 0 everywhere it's defined, and the
        // null prefix is fed to the signal EMA as zero, so once MACD
        // warms up, the signal should already equal 0, not be null for
        // the 9 bars right after MACD's own warm-up.
        let close = vec![100.0; 60];
        let (m, s, _) = macd(&close, 12, 26, 9);
        let macd_warm = m.iter().position(|v| v.is_some()).unwrap();
        assert!(s[macd_warm].is_some());
        assert!((s[macd_warm].unwrap()).abs() < 1e-9);
    }
}
