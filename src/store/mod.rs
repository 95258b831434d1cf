/// Time-series access over the observation store.
///
/// `TimeSeriesAccessor` is the only way detection code reads data. An
/// implementation supplies two raw reads (air-quality rows for a time range
/// and optional sensor subset, weather rows for a time range), both ordered
/// by timestamp ascending; the trait derives resampled series and the
/// hourly air-quality/weather join from those.
///
/// Implementations:
/// - `memory::MemoryStore` : in-process vectors, for tests and fixtures
/// - `postgres::PgStore`   : blocking Postgres client

pub mod memory;
pub mod postgres;

use crate::model::{
    Aggregation, JoinedRow, Metric, Observation, QaFlags, StoreError, TimeRange, WeatherObservation,
    Window,
};
use crate::stats::robust;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub use memory::MemoryStore;
pub use postgres::PgStore;

// ---------------------------------------------------------------------------
// Query and result types
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesQuery {
    pub metric: Metric,
    /// `None` means every sensor.
    pub sensor_ids: Option<Vec<String>>,
    pub range: TimeRange,
    pub window: Window,
    pub aggregation: Aggregation,
}

/// One resampled bucket of one sensor's series.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SeriesPoint {
    /// Bucket start.
    pub ts: DateTime<Utc>,
    pub sensor_id: String,
    /// `None` when no row in the bucket had a value for the metric.
    pub value: Option<f64>,
    /// OR of every row's flags in the bucket.
    pub qa_flags: QaFlags,
    /// Rows in the bucket.
    pub count: usize,
}

// ---------------------------------------------------------------------------
// Accessor trait
// ---------------------------------------------------------------------------

pub trait TimeSeriesAccessor: Send + Sync {
    /// Air-quality rows with `range.start <= ts <= range.end`, ascending.
    fn air_quality(
        &self,
        range: &TimeRange,
        sensor_ids: Option<&[String]>,
    ) -> Result<Vec<Observation>, StoreError>;

    /// Weather rows with `range.start <= ts <= range.end`, ascending.
    fn weather(&self, range: &TimeRange) -> Result<Vec<WeatherObservation>, StoreError>;

    /// Per-sensor series resampled to `query.window`, sorted by bucket then sensor.
    fn fetch(&self, query: &SeriesQuery) -> Result<Vec<SeriesPoint>, StoreError> {
        let rows = self.air_quality(&query.range, query.sensor_ids.as_deref())?;
        Ok(resample(&rows, query.metric, query.window, query.aggregation))
    }

    /// Air-quality rows left-joined to weather rows of the same hour.
    ///
    /// Every air-quality row appears at least once; a bucket holding several
    /// weather rows yields one joined row per weather row.
    fn fetch_joined(&self, range: &TimeRange) -> Result<Vec<JoinedRow>, StoreError> {
        let aq = self.air_quality(range, None)?;
        let met = self.weather(range)?;
        Ok(join_hourly(&aq, &met))
    }
}

// ---------------------------------------------------------------------------
// Derivations shared by all accessors
// ---------------------------------------------------------------------------

/// Reduces `values` with `aggregation`. `None` for an empty slice.
pub fn aggregate(aggregation: Aggregation, values: &[f64]) -> Option<f64> {
    match aggregation {
        Aggregation::Mean => robust::mean(values),
        Aggregation::Median => robust::median(values),
        Aggregation::P95 => robust::percentile(values, 0.95),
        Aggregation::Max => values.iter().copied().reduce(f64::max),
        Aggregation::Min => values.iter().copied().reduce(f64::min),
    }
}

#[derive(Default)]
struct Bucket {
    values: Vec<f64>,
    flags: QaFlags,
    count: usize,
}

pub fn resample(
    rows: &[Observation],
    metric: Metric,
    window: Window,
    aggregation: Aggregation,
) -> Vec<SeriesPoint> {
    let mut buckets: BTreeMap<(DateTime<Utc>, &str), Bucket> = BTreeMap::new();
    for row in rows {
        let bucket = buckets
            .entry((window.truncate(row.ts), row.sensor_id.as_str()))
            .or_default();
        if let Some(v) = metric.value_of(row) {
            bucket.values.push(v);
        }
        bucket.flags |= row.qa_flags;
        bucket.count += 1;
    }

    buckets
        .into_iter()
        .map(|((ts, sensor_id), bucket)| SeriesPoint {
            ts,
            sensor_id: sensor_id.to_string(),
            value: aggregate(aggregation, &bucket.values),
            qa_flags: bucket.flags,
            count: bucket.count,
        })
        .collect()
}

pub fn join_hourly(aq: &[Observation], met: &[WeatherObservation]) -> Vec<JoinedRow> {
    let mut by_hour: BTreeMap<DateTime<Utc>, Vec<&WeatherObservation>> = BTreeMap::new();
    for w in met {
        by_hour.entry(Window::OneHour.truncate(w.ts)).or_default().push(w);
    }

    let mut joined = Vec::with_capacity(aq.len());
    for obs in aq {
        let base = JoinedRow {
            ts: obs.ts,
            sensor_id: obs.sensor_id.clone(),
            pm25_corr: obs.pm25_corr,
            pm25_raw: obs.pm25_raw,
            pm10: obs.pm10_raw,
            qa_flags: obs.qa_flags,
            temp_c: None,
            rh: None,
            wind_speed_ms: None,
            stability_idx: None,
        };
        match by_hour.get(&Window::OneHour.truncate(obs.ts)) {
            Some(matches) => {
                for w in matches {
                    joined.push(JoinedRow {
                        temp_c: Some(w.temp_c),
                        rh: Some(w.rh),
                        wind_speed_ms: Some(w.wind_speed_ms),
                        stability_idx: w.stability_idx,
                        ..base.clone()
                    });
                }
            }
            None => joined.push(base),
        }
    }
    joined
}
