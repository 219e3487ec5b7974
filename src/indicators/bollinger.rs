/// Bollinger Bands: mid = SMA(close, period), bands = mid ± k·σ.
use super::sma::sma;
use super::stddev::stddev;

pub fn bollinger(
    close: &[f64],
    period: usize,
    k: f64,
) -> (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>) {
    let mid = sma(close, period);
    let sd = stddev(close, period, &mid);

    let n = close.len();
    let mut upper = vec![None; n];
    let mut lower = vec![None; n];

    for i in 0..n {
        if let (Some(m), Some(s)) = (mid[i], sd[i]) {
            upper[i] = Some(m + k * s);
            lower[i] = Some(m - k * s);
        }
    }

    (mid, upper, lower)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bands_are_symmetric_about_the_mid() {
        let close: Vec<f64> = (0..40).map(|i| 100.0 + (i as f64 * 0.7).sin() * 5.0).collect();
        let (mid, upper, lower) = bollinger(&close, 20, 2.0);
        for i in 19..40 {
            let m = mid[i].unwrap();
            let u = upper[i].unwrap();
            let l = lower[i].unwrap();
            assert!((u - m - (m - l)).abs() < 1e-9);
        }
    }
}
