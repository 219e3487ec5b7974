/// Canonical interval codes and their millisecond durations.
///
/// `floor_to_interval` is the single place that knows how a wall-clock
/// millisecond timestamp maps onto a bar's left edge; everything else
/// (ingest, verify, repair) goes through it rather than re-deriving bar
/// boundaries locally.
use crate::error::{PipelineError, Result};

/// All interval codes the pipeline understands, smallest first.
/// Unknown codes are rejected at the config-loading boundary.
pub const KNOWN_INTERVALS: &[(&str, i64)] = &[
    ("1m", 60_000),
    ("3m", 180_000),
    ("5m", 300_000),
    ("15m", 900_000),
    ("30m", 1_800_000),
    ("1h", 3_600_000),
    ("2h", 7_200_000),
    ("4h", 14_400_000),
    ("6h", 21_600_000),
    ("8h", 28_800_000),
    ("12h", 43_200_000),
    ("1d", 86_400_000),
    ("3d", 259_200_000),
    ("1w", 604_800_000),
];

/// Resolve an interval code to its duration in milliseconds, rejecting
/// anything outside the fixed set above.
pub fn interval_ms(code: &str) -> Result<i64> {
    KNOWN_INTERVALS
        .iter()
        .find(|(c, _)| *c == code)
        .map(|(_, ms)| *ms)
        .ok_or_else(|| PipelineError::Config(format!("unknown interval code: {code}")))
}

/// `⌊ms/step⌋·step`. `step` must be positive; callers only ever pass a
/// value already validated by `interval_ms`.
pub fn floor_to_interval(ms: i64, step: i64) -> i64 {
    debug_assert!(step > 0, "interval step must be positive");
    (ms.div_euclid(step)) * step
}

/// Millisecond epoch of "now", floored to the start of the last fully
/// closed bar boundary: the open_time of the last bar that has already
/// fully elapsed, minus one millisecond.
pub fn last_closed_open_time_exclusive_end(now_ms: i64, step: i64) -> i64 {
    floor_to_interval(now_ms, step) - 1
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_codes() {
        assert!(interval_ms("1y").is_err());
        assert!(interval_ms("1M").is_err());
    }

    #[test]
    fn known_codes_have_natural_durations() {
        assert_eq!(interval_ms("1m").unwrap(), 60_000);
        assert_eq!(interval_ms("1h").unwrap(), 3_600_000);
        assert_eq!(interval_ms("1w").unwrap(), 604_800_000);
    }

    #[test]
    fn floor_rounds_down_to_the_bar_boundary() {
        assert_eq!(floor_to_interval(3_600_001, 3_600_000), 3_600_000);
        assert_eq!(floor_to_interval(3_600_000, 3_600_000), 3_600_000);
        assert_eq!(floor_to_interval(0, 60_000), 0);
    }
}
