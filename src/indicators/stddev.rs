/// Population standard deviation over a trailing window, referencing an
/// already-computed moving average (`ma`) so Bollinger can reuse its SMA.
pub fn stddev(values: &[f64], period: usize, ma: &[Option<f64>]) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    for i in (period - 1)..n {
        let Some(mean) = ma[i] else { continue };
        let window = &values[(i + 1 - period)..=i];
        let variance: f64 =
            window.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / period as f64;
        out[i] = Some(variance.sqrt());
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::indicators::sma::sma;

    #[test]
    fn zero_for_constant_series() {
        let values = vec![5.0; 10];
        let ma = sma(&values, 5);
        let sd = stddev(&values, 5, &ma);
        for i in 4..10 {
            assert!(sd[i].unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn matches_hand_computation() {
        let values = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let ma = sma(&values, 8);
        let sd = stddev(&values, 8, &ma);
        // population stddev of this classic example is 2.0
        assert!((sd[7].unwrap() - 2.0).abs() < 1e-9);
    }
}
