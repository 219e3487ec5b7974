/// Exponential moving average with the standard `k = 2/(period+1)`
/// smoothing factor, seeded by a simple average over the first window.
pub fn ema(values: &[f64], period: usize, alpha_override: Option<f64>) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }

    let k = alpha_override.unwrap_or(2.0 / (period as f64 + 1.0));

    let seed: f64 = values[0..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(seed);

    let mut prev = seed;
    for (i, &v) in values.iter().enumerate().skip(period) {
        let cur = v * k + prev * (1.0 - k);
        out[i] = Some(cur);
        prev = cur;
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn null_until_warm() {
        let values = vec![1.0, 2.0, 3.0];
        let out = ema(&values, 5, None);
        assert!(out.iter().all(|v| v.is_none()));
    }

    #[test]
    fn seed_is_simple_mean() {
        let values = vec![1.0, 2.0, 3.0, 4.0];
        let out = ema(&values, 4, None);
        assert_eq!(out[3], Some(2.5));
    }

    #[test]
    fn position_stable_on_suffix() {
        // EMA recursion forgets its seed geometrically; give it a wide
        // enough run-in (300 bars at period 10) that the two computations
        // have converged well past a 1e-9 relative tolerance before we
        // compare them.
        let values: Vec<f64> = (0..500).map(|i| 100.0 + i as f64 * 0.3).collect();
        let full = ema(&values, 10, None);
        let suffix = ema(&values[300..], 10, None);
        for i in 450..500 {
            let a = full[i].unwrap();
            let b = suffix[i - 300].unwrap();
            assert!((a - b).abs() / a.abs() < 1e-9, "mismatch at {i}: {a} vs {b}");
        }
    }
}
