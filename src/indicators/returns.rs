/// Single-bar percent and log returns. Null at the series start and
/// whenever the prior close is zero (division/log undefined).
pub fn returns(close: &[f64]) -> (Vec<Option<f64>>, Vec<Option<f64>>) {
    let n = close.len();
    let mut pct = vec![None; n];
    let mut log = vec![None; n];

    for i in 1..n {
        let prev = close[i - 1];
        if prev == 0.0 {
            continue;
        }
        pct[i] = Some(close[i] / prev - 1.0);
        log[i] = Some((close[i] / prev).ln());
    }

    (pct, log)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_bar_is_null() {
        let close = vec![100.0, 101.0, 99.0];
        let (pct, log) = returns(&close);
        assert!(pct[0].is_none());
        assert!(log[0].is_none());
    }

    #[test]
    fn pct_and_log_are_consistent() {
        let close = vec![100.0, 110.0, 90.0, 95.5];
        let (pct, log) = returns(&close);
        for i in 1..close.len() {
            let p = pct[i].unwrap();
            let l = log[i].unwrap();
            assert!((p + 1.0 - l.exp()).abs() < 1e-12);
        }
    }

    #[test]
    fn zero_prior_close_yields_null() {
        let close = vec![0.0, 5.0];
        let (pct, log) = returns(&close);
        assert!(pct[1].is_none());
        assert!(log[1].is_none());
    }
}
