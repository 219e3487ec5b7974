/// Consistency checks over a stored series: SQLite-level integrity,
/// missing bars (gaps), and indicator rows left fully null past warmup.
use crate::error::Result;
use crate::indicators::WARMUP_BARS;
use crate::storage::models::KnownGap;
use crate::storage::Storage;
use crate::time::interval_ms;

/// Caps how many examples of each defect class a report carries; counts
/// are exact, only the sample list is bounded.
const MAX_SAMPLES: usize = 5;

#[derive(Debug, Clone)]
pub struct GapSample {
    pub start_open_time: i64,
    pub end_open_time: i64,
    pub missing_bars: u64,
    pub duration: String,
}

#[derive(Debug, Clone)]
pub struct NullSpanSample {
    pub start_open_time: i64,
    pub end_open_time: i64,
    pub rows: u64,
}

#[derive(Debug, Clone)]
pub struct VerifyReport {
    pub series_id: i64,
    pub symbol: String,
    pub interval_code: String,
    pub integrity_ok: bool,
    pub integrity_messages: Vec<String>,
    pub total_bars: usize,
    pub gaps_found: u64,
    pub gap_samples: Vec<GapSample>,
    pub null_indicator_rows_found: u64,
    pub null_indicator_samples: Vec<NullSpanSample>,
}

impl VerifyReport {
    pub fn is_clean(&self) -> bool {
        self.integrity_ok && self.gaps_found == 0 && self.null_indicator_rows_found == 0
    }
}

pub fn verify_series(storage: &Storage, symbol: &str, interval_code: &str) -> Result<VerifyReport> {
    let step = interval_ms(interval_code)?;
    let series_id = storage
        .get_series_id(symbol, interval_code)?
        .ok_or_else(|| crate::error::PipelineError::Config(format!(
            "no series for {symbol}/{interval_code}"
        )))?;

    let integrity_messages = storage.run_integrity_check()?;
    let integrity_ok = integrity_messages.len() == 1 && integrity_messages[0] == "ok";

    let open_times = storage.open_times(series_id)?;
    let known_gaps = storage.known_gaps(series_id)?;
    let all_gaps = detect_all_gaps(&open_times, step, &known_gaps);
    let gaps_found: u64 = all_gaps.iter().map(|g| g.missing_bars).sum();
    let gap_samples: Vec<GapSample> = all_gaps.iter().take(MAX_SAMPLES).cloned().collect();

    let indicator_rows = storage.indicator_rows(series_id)?;
    let (null_rows, null_samples) = detect_null_spans(&indicator_rows);

    Ok(VerifyReport {
        series_id,
        symbol: symbol.to_string(),
        interval_code: interval_code.to_string(),
        integrity_ok,
        integrity_messages,
        total_bars: open_times.len(),
        gaps_found,
        gap_samples,
        null_indicator_rows_found: null_rows,
        null_indicator_samples: null_samples,
    })
}

/// Scans consecutive open_times for skipped steps and returns every gap
/// window found, uncapped. A gap whose full span is already covered by a
/// registered known gap is not reported — it's an acknowledged hole (an
/// exchange-side outage, a delisting window), not a defect to repair.
///
/// Callers that only need a report sample (`verify_series`) take a prefix
/// of the result; `repair` needs the full list so a series with more than
/// `MAX_SAMPLES` gaps still gets every one of them closed in a single run.
pub fn detect_all_gaps(open_times: &[i64], step: i64, known_gaps: &[KnownGap]) -> Vec<GapSample> {
    let mut gaps = Vec::new();

    for window in open_times.windows(2) {
        let (prev, cur) = (window[0], window[1]);
        let diff = cur - prev;
        if diff <= step {
            continue;
        }
        let gap_start = prev + step;
        let gap_end = cur - step;
        if is_known(gap_start, gap_end, known_gaps) {
            continue;
        }
        let missing = (diff / step) - 1;
        gaps.push(GapSample {
            start_open_time: gap_start,
            end_open_time: gap_end,
            missing_bars: missing as u64,
            duration: format_duration_ms(diff - step),
        });
    }

    gaps
}

fn is_known(start: i64, end: i64, known_gaps: &[KnownGap]) -> bool {
    known_gaps
        .iter()
        .any(|g| g.start_open_time <= start && end <= g.end_open_time)
}

/// Rows before `WARMUP_BARS` are expected to be null; only spans at or
/// past the warmup floor count as defects.
fn detect_null_spans(rows: &[crate::storage::models::IndicatorRow]) -> (u64, Vec<NullSpanSample>) {
    let mut total = 0u64;
    let mut samples = Vec::new();
    let mut span_start: Option<(i64, u64)> = None;

    for (i, row) in rows.iter().enumerate() {
        let past_warmup = i >= WARMUP_BARS;
        if past_warmup && row.all_null() {
            total += 1;
            span_start = Some(match span_start {
                Some((start, count)) => (start, count + 1),
                None => (row.open_time, 1),
            });
        } else if let Some((start, count)) = span_start.take() {
            if samples.len() < MAX_SAMPLES {
                samples.push(NullSpanSample {
                    start_open_time: start,
                    end_open_time: rows[i - 1].open_time,
                    rows: count,
                });
            }
        }
    }
    if let Some((start, count)) = span_start {
        if samples.len() < MAX_SAMPLES {
            samples.push(NullSpanSample {
                start_open_time: start,
                end_open_time: rows.last().map(|r| r.open_time).unwrap_or(start),
                rows: count,
            });
        }
    }

    (total, samples)
}

fn format_duration_ms(ms: i64) -> String {
    let total_secs = ms / 1000;
    let days = total_secs / 86_400;
    let hours = (total_secs % 86_400) / 3_600;
    let minutes = (total_secs % 3_600) / 60;

    if days > 0 {
        format!("{days}d {hours}h")
    } else if hours > 0 {
        format!("{hours}h {minutes}m")
    } else {
        format!("{minutes}m")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::models::IndicatorRow;

    #[test]
    fn no_gaps_on_contiguous_series() {
        let times: Vec<i64> = (0..10).map(|i| i * 3_600_000).collect();
        let gaps = detect_all_gaps(&times, 3_600_000, &[]);
        assert!(gaps.is_empty());
    }

    #[test]
    fn detects_a_three_bar_gap() {
        let step = 3_600_000;
        let times = vec![0, step, step * 5, step * 6];
        let gaps = detect_all_gaps(&times, step, &[]);
        assert_eq!(gaps.len(), 1);
        assert_eq!(gaps[0].missing_bars, 3);
        assert_eq!(gaps[0].start_open_time, step * 2);
        assert_eq!(gaps[0].end_open_time, step * 4);
    }

    #[test]
    fn known_gap_is_not_reported() {
        let step = 3_600_000;
        let times = vec![0, step, step * 5, step * 6];
        let known = vec![KnownGap {
            start_open_time: step * 2,
            end_open_time: step * 4,
        }];
        let gaps = detect_all_gaps(&times, step, &known);
        assert!(gaps.is_empty());
    }

    #[test]
    fn uncaps_more_than_five_gaps() {
        // MAX_SAMPLES caps the report; `detect_all_gaps` itself must not,
        // since repair needs every gap window in one pass.
        let step = 3_600_000;
        let mut times = Vec::new();
        for i in 0..8 {
            times.push(i * 2 * step); // every other bar is missing
        }
        let gaps = detect_all_gaps(&times, step, &[]);
        assert_eq!(gaps.len(), 7);
        assert!(gaps.len() > MAX_SAMPLES);
    }

    #[test]
    fn null_spans_before_warmup_are_ignored() {
        let rows: Vec<IndicatorRow> = (0..WARMUP_BARS)
            .map(|i| IndicatorRow {
                open_time: i as i64,
                ..Default::default()
            })
            .collect();
        let (count, samples) = detect_null_spans(&rows);
        assert_eq!(count, 0);
        assert!(samples.is_empty());
    }

    #[test]
    fn null_spans_past_warmup_are_reported() {
        let mut rows: Vec<IndicatorRow> = (0..WARMUP_BARS + 5)
            .map(|i| IndicatorRow {
                open_time: i as i64,
                ema50: Some(1.0),
                ..Default::default()
            })
            .collect();
        for row in rows.iter_mut().skip(WARMUP_BARS).take(3) {
            row.ema50 = None;
        }
        let (count, samples) = detect_null_spans(&rows);
        assert_eq!(count, 3);
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].rows, 3);
    }
}
