//! Robust location/scale estimators and MAD-based outlier scoring.
//!
//! Shared by the QA/QC validator (static batch: "is the newest reading an
//! outlier against recent history?") and the spike detector (streaming:
//! trailing rolling window per sensor).
//!
//! Invariants:
//! * MAD >= 0 for any input.
//! * A zero MAD never produces a score: a perfectly flat window flags
//!   nothing, whatever the threshold.
//! * Fewer than `MIN_ROBUST_POINTS` values never produce a score.

use chrono::{DateTime, Duration, Utc};
use std::cmp::Ordering::Equal;

/// Converts a deviation in MAD units into a modified z-score
/// (Iglewicz & Hoaglin).
pub const MODIFIED_Z_FACTOR: f64 = 0.6745;

/// Smallest sample a robust score is computed from.
pub const MIN_ROBUST_POINTS: usize = 3;

// ============================================================================
// Estimators
// ============================================================================

pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

pub fn median(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut buf = values.to_vec();
    Some(median_inplace(&mut buf))
}

/// Median Absolute Deviation: `median(|x - median(x)|)`.
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let mut deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    Some(median_inplace(&mut deviations))
}

/// Percentile with linear interpolation between closest ranks
/// (`q` in [0, 1]; 0.95 is the 95th percentile).
pub fn percentile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() || !(0.0..=1.0).contains(&q) {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Equal));

    let pos = q * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    Some(sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64))
}

/// Quickselect median; reorders `vals`. Caller guarantees non-empty.
fn median_inplace(vals: &mut [f64]) -> f64 {
    let n = vals.len();
    let mid = n / 2;
    let (lower, upper, _) = vals.select_nth_unstable_by(mid, |a, b| a.partial_cmp(b).unwrap_or(Equal));
    let upper = *upper;
    if n % 2 == 1 {
        return upper;
    }
    // Everything left of `mid` is <= upper; its max is the other middle value.
    let lower_max = lower.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    (lower_max + upper) / 2.0
}

/// `0.6745 * (x - median) / mad`. Caller guarantees `mad > 0`.
pub fn modified_z(value: f64, median: f64, mad: f64) -> f64 {
    MODIFIED_Z_FACTOR * (value - median) / mad
}

// ============================================================================
// Batch outlier detection
// ============================================================================

/// Flags values whose modified z-score magnitude exceeds `z_threshold`.
///
/// Returns one flag per input value. Fewer than three values, or a zero MAD,
/// yield no outliers.
pub fn detect_outliers_mad(values: &[f64], z_threshold: f64) -> Vec<bool> {
    let mut flags = vec![false; values.len()];
    if values.len() < MIN_ROBUST_POINTS {
        return flags;
    }

    let (Some(center), Some(spread)) = (median(values), mad(values)) else {
        return flags;
    };
    if spread == 0.0 {
        return flags;
    }

    for (flag, value) in flags.iter_mut().zip(values) {
        *flag = modified_z(*value, center, spread).abs() > z_threshold;
    }
    flags
}

// ============================================================================
// Rolling robust statistics
// ============================================================================

/// Robust statistics of one point against its trailing window.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingScore {
    pub ts: DateTime<Utc>,
    pub value: f64,
    /// Points in the window `(ts - window, ts]`, including this one.
    pub window_points: usize,
    /// `None` until the window holds `MIN_ROBUST_POINTS` points.
    pub median: Option<f64>,
    pub mad: Option<f64>,
    /// `None` when the median is unavailable or the window MAD is zero.
    pub z_score: Option<f64>,
}

/// Scores every point against the points in its trailing time window.
///
/// `points` must be ordered by timestamp ascending. The window for a point
/// at `t` is `(t - window, t]`, so only past and present points contribute.
pub fn rolling_robust_z(points: &[(DateTime<Utc>, f64)], window: Duration) -> Vec<RollingScore> {
    let mut scores = Vec::with_capacity(points.len());
    let mut start = 0;

    for (i, &(ts, value)) in points.iter().enumerate() {
        let left_edge = ts - window;
        while start < i && points[start].0 <= left_edge {
            start += 1;
        }

        let window_values: Vec<f64> = points[start..=i].iter().map(|(_, v)| *v).collect();
        let mut score = RollingScore {
            ts,
            value,
            window_points: window_values.len(),
            median: None,
            mad: None,
            z_score: None,
        };

        if window_values.len() >= MIN_ROBUST_POINTS {
            score.median = median(&window_values);
            score.mad = mad(&window_values);
            if let (Some(center), Some(spread)) = (score.median, score.mad) {
                if spread > 0.0 {
                    score.z_score = Some(modified_z(value, center, spread));
                }
            }
        }

        scores.push(score);
    }

    scores
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use chrono::TimeZone;
    use proptest::prelude::*;

    fn at_minute(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 11, 8, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    #[test]
    fn test_median_odd_and_even() {
        assert_eq!(median(&[3.0, 1.0, 2.0]), Some(2.0));
        assert_eq!(median(&[4.0, 1.0, 3.0, 2.0]), Some(2.5));
        assert_eq!(median(&[]), None);
    }

    #[test]
    fn test_mad_of_known_series() {
        // median 10.9, |dev| sorted 0.1 0.1 0.4 0.6 0.9 39.1 -> 0.5
        let values = [10.0, 11.0, 10.5, 11.5, 10.8, 50.0];
        assert_relative_eq!(mad(&values).unwrap(), 0.5, epsilon = 1e-12);
    }

    #[test]
    fn test_percentile_interpolates() {
        let values = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_relative_eq!(percentile(&values, 0.5).unwrap(), 3.0);
        assert_relative_eq!(percentile(&values, 0.95).unwrap(), 4.8, epsilon = 1e-12);
        assert_eq!(percentile(&values, 1.5), None);
    }

    #[test]
    fn test_only_last_value_flagged_as_outlier() {
        let values = [10.0, 11.0, 10.5, 11.5, 10.8, 50.0];
        let flags = detect_outliers_mad(&values, 3.0);
        assert_eq!(flags, vec![false, false, false, false, false, true]);
    }

    #[test]
    fn test_fewer_than_three_values_never_flag() {
        assert_eq!(detect_outliers_mad(&[1.0, 1000.0], 0.1), vec![false, false]);
        assert!(detect_outliers_mad(&[], 0.1).is_empty());
    }

    #[test]
    fn test_flat_series_never_flags_even_at_tiny_threshold() {
        let values = [7.0; 10];
        assert!(detect_outliers_mad(&values, 1e-9).iter().all(|f| !f));
    }

    #[test]
    fn test_rolling_needs_three_points_in_window() {
        let points: Vec<_> = [(0, 10.0), (10, 11.0), (20, 12.0), (30, 13.0)]
            .into_iter()
            .map(|(m, v)| (at_minute(m), v))
            .collect();
        let scores = rolling_robust_z(&points, Duration::hours(1));

        assert!(scores[0].median.is_none());
        assert!(scores[1].median.is_none());
        assert_eq!(scores[2].median, Some(11.0));
        assert_eq!(scores[2].window_points, 3);
        assert!(scores[3].z_score.is_some());
    }

    #[test]
    fn test_rolling_window_excludes_left_edge() {
        // At t=60 the point at t=0 sits exactly on the left edge and drops out.
        let points: Vec<_> = [(0, 100.0), (20, 10.0), (40, 11.0), (60, 12.0)]
            .into_iter()
            .map(|(m, v)| (at_minute(m), v))
            .collect();
        let scores = rolling_robust_z(&points, Duration::hours(1));
        assert_eq!(scores[3].window_points, 3);
        assert_eq!(scores[3].median, Some(11.0));
    }

    #[test]
    fn test_rolling_flat_window_has_median_but_no_score() {
        let points: Vec<_> = (0..5).map(|m| (at_minute(m * 10), 20.0)).collect();
        let scores = rolling_robust_z(&points, Duration::hours(1));
        assert_eq!(scores[4].median, Some(20.0));
        assert_eq!(scores[4].mad, Some(0.0));
        assert!(scores[4].z_score.is_none());
    }

    #[test]
    fn test_rolling_spike_scores_high() {
        let mut points: Vec<_> = [20.0, 21.0, 19.0, 20.5, 19.5]
            .iter()
            .enumerate()
            .map(|(i, v)| (at_minute(i as i64 * 10), *v))
            .collect();
        points.push((at_minute(50), 80.0));
        let scores = rolling_robust_z(&points, Duration::hours(1));
        let z = scores[5].z_score.expect("spike should be scored");
        assert!(z > 4.0, "spike z-score should exceed 4, got {}", z);
    }

    proptest! {
        #[test]
        fn prop_outlier_flags_match_input_length(values in proptest::collection::vec(-1e6f64..1e6, 0..50)) {
            let flags = detect_outliers_mad(&values, 3.5);
            prop_assert_eq!(flags.len(), values.len());
            if values.len() < 3 {
                prop_assert!(flags.iter().all(|f| !f));
            }
        }

        #[test]
        fn prop_median_lies_within_range(values in proptest::collection::vec(-1e6f64..1e6, 1..50)) {
            let m = median(&values).unwrap();
            let lo = values.iter().cloned().fold(f64::INFINITY, f64::min);
            let hi = values.iter().cloned().fold(f64::NEG_INFINITY, f64::max);
            prop_assert!(lo <= m && m <= hi);
            prop_assert!(mad(&values).unwrap() >= 0.0);
        }
    }
}
