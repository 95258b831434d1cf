//! One-number summary of a metric over a time range.
//!
//! Observations are first resampled to bucket means at the requested
//! window (per sensor), then the requested aggregate is taken across those
//! bucket means. "Max of hourly PM2.5" is therefore the highest hourly
//! mean, not the highest single reading.

use crate::model::{Aggregation, DetectionError, Metric, QaFlags, TimeRange, Window};
use crate::store::{SeriesQuery, TimeSeriesAccessor, aggregate};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, PartialEq)]
pub struct SummaryQuery {
    pub range: TimeRange,
    pub metric: Metric,
    pub window: Window,
    pub aggregation: Aggregation,
    pub sensor_ids: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MetricSummary {
    pub metric: Metric,
    pub aggregate: Aggregation,
    /// `None` when the range holds no values.
    pub value: Option<f64>,
    pub unit: &'static str,
    /// Observations behind the summary.
    pub n_samples: usize,
    /// Buckets with a value.
    pub n_periods: usize,
    pub window: Window,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub qa_flags: QaFlags,
}

pub fn metric_summary(
    store: &dyn TimeSeriesAccessor,
    query: &SummaryQuery,
) -> Result<MetricSummary, DetectionError> {
    let points = store.fetch(&SeriesQuery {
        metric: query.metric,
        sensor_ids: query.sensor_ids.clone(),
        range: query.range,
        window: query.window,
        aggregation: Aggregation::Mean,
    })?;

    let bucket_means: Vec<f64> = points.iter().filter_map(|p| p.value).collect();
    let qa_flags = points.iter().fold(QaFlags::NONE, |acc, p| acc | p.qa_flags);

    Ok(MetricSummary {
        metric: query.metric,
        aggregate: query.aggregation,
        value: aggregate(query.aggregation, &bucket_means),
        unit: query.metric.unit(),
        n_samples: points.iter().map(|p| p.count).sum(),
        n_periods: bucket_means.len(),
        window: query.window,
        start: query.range.start,
        end: query.range.end,
        qa_flags,
    })
}
