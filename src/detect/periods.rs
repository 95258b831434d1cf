//! Two-period comparison of a metric with the Mann–Whitney U test.

use crate::logging::{self, Component};
use crate::model::{DetectionError, Metric, TimeRange};
use crate::stats::hypothesis::{MannWhitneyMethod, mann_whitney_u};
use crate::stats::robust;
use crate::store::TimeSeriesAccessor;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Each period needs at least this many non-null values.
pub const MIN_PERIOD_SAMPLES: usize = 3;
pub const TEST_NAME: &str = "mann-whitney";

#[derive(Debug, Clone, PartialEq)]
pub struct PeriodQuery {
    pub period_a: TimeRange,
    pub period_b: TimeRange,
    pub metric: Metric,
    pub sensor_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStatus {
    Computed,
    InsufficientData,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodStats {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub n: usize,
    pub median: Option<f64>,
    pub mean: Option<f64>,
}

impl PeriodStats {
    fn of(range: &TimeRange, values: &[f64]) -> Self {
        PeriodStats {
            start: range.start,
            end: range.end,
            n: values.len(),
            median: robust::median(values),
            mean: robust::mean(values),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PeriodComparison {
    pub status: ComparisonStatus,
    pub test: &'static str,
    pub method: Option<MannWhitneyMethod>,
    /// U statistic of period A.
    pub statistic: Option<f64>,
    pub p_value: Option<f64>,
    /// Rank-biserial correlation `1 - 2U/(n_a n_b)`; positive when B tends
    /// to exceed A.
    pub effect_size: Option<f64>,
    pub metric: Metric,
    pub period_a: PeriodStats,
    pub period_b: PeriodStats,
    pub error: Option<String>,
}

fn period_values(
    store: &dyn TimeSeriesAccessor,
    range: &TimeRange,
    query: &PeriodQuery,
) -> Result<Vec<f64>, DetectionError> {
    let rows = store.air_quality(range, query.sensor_ids.as_deref())?;
    Ok(rows
        .iter()
        .filter_map(|row| query.metric.value_of(row))
        .filter(|v| v.is_finite())
        .collect())
}

pub fn compare_periods(
    store: &dyn TimeSeriesAccessor,
    query: &PeriodQuery,
) -> Result<PeriodComparison, DetectionError> {
    let a = period_values(store, &query.period_a, query)?;
    let b = period_values(store, &query.period_b, query)?;

    let mut result = PeriodComparison {
        status: ComparisonStatus::InsufficientData,
        test: TEST_NAME,
        method: None,
        statistic: None,
        p_value: None,
        effect_size: None,
        metric: query.metric,
        period_a: PeriodStats::of(&query.period_a, &a),
        period_b: PeriodStats::of(&query.period_b, &b),
        error: None,
    };

    if a.len() < MIN_PERIOD_SAMPLES || b.len() < MIN_PERIOD_SAMPLES {
        result.error = Some(format!(
            "Insufficient data: need at least {} values per period (got {} and {})",
            MIN_PERIOD_SAMPLES,
            a.len(),
            b.len()
        ));
        return Ok(result);
    }

    match mann_whitney_u(&a, &b) {
        Ok(test) => {
            let pairs = (a.len() * b.len()) as f64;
            result.status = ComparisonStatus::Computed;
            result.method = Some(test.method);
            result.statistic = Some(test.statistic);
            result.p_value = Some(test.p_value);
            result.effect_size = Some(1.0 - 2.0 * test.statistic / pairs);
        }
        Err(e) => {
            logging::warn(
                Component::Detect,
                None,
                &format!("period comparison on {} failed: {}", query.metric, e),
            );
            result.status = ComparisonStatus::Failed;
            result.error = Some(e.to_string());
        }
    }
    Ok(result)
}
