//! Spike detection with trailing rolling robust z-scores.
//!
//! Each sensor's series is scored independently against its own trailing
//! window, so a sensor that reads high all day is not a "spike" relative to
//! a cleaner neighbour.

use crate::logging::{self, Component};
use crate::model::{DetectionError, Metric, QaFlags, TimeRange, Window};
use crate::stats::robust::rolling_robust_z;
use crate::store::TimeSeriesAccessor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_Z_THRESHOLD: f64 = 4.0;
pub const METHOD: &str = "MAD z-score";

#[derive(Debug, Clone, PartialEq)]
pub struct SpikeQuery {
    pub range: TimeRange,
    pub metric: Metric,
    pub z_threshold: f64,
    pub rolling_window: Window,
    pub sensor_ids: Option<Vec<String>>,
}

impl SpikeQuery {
    pub fn new(range: TimeRange, metric: Metric) -> Self {
        Self {
            range,
            metric,
            z_threshold: DEFAULT_Z_THRESHOLD,
            rolling_window: Window::OneHour,
            sensor_ids: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Spike {
    pub ts: DateTime<Utc>,
    pub sensor_id: String,
    pub value: f64,
    pub z_score: f64,
    pub rolling_median: f64,
    pub qa_flags: QaFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SpikeSet {
    pub spikes: Vec<Spike>,
    pub total_count: usize,
    pub method: &'static str,
    pub metric: Metric,
    pub threshold: f64,
    pub rolling_window: Window,
}

pub fn detect_spikes(
    store: &dyn TimeSeriesAccessor,
    query: &SpikeQuery,
) -> Result<SpikeSet, DetectionError> {
    let rows = store.air_quality(&query.range, query.sensor_ids.as_deref())?;

    let mut by_sensor: BTreeMap<&str, Vec<(DateTime<Utc>, f64, QaFlags)>> = BTreeMap::new();
    for row in &rows {
        if let Some(v) = query.metric.value_of(row).filter(|v| v.is_finite()) {
            by_sensor
                .entry(row.sensor_id.as_str())
                .or_default()
                .push((row.ts, v, row.qa_flags));
        }
    }

    let mut spikes = Vec::new();
    for (sensor_id, series) in &by_sensor {
        let points: Vec<(DateTime<Utc>, f64)> = series.iter().map(|(ts, v, _)| (*ts, *v)).collect();
        let scores = rolling_robust_z(&points, query.rolling_window.duration());

        for (score, (_, _, flags)) in scores.iter().zip(series) {
            let (Some(z), Some(median)) = (score.z_score, score.median) else {
                continue;
            };
            if z.abs() > query.z_threshold {
                spikes.push(Spike {
                    ts: score.ts,
                    sensor_id: sensor_id.to_string(),
                    value: score.value,
                    z_score: z,
                    rolling_median: median,
                    qa_flags: *flags,
                });
            }
        }
    }
    spikes.sort_by(|a, b| a.ts.cmp(&b.ts).then_with(|| a.sensor_id.cmp(&b.sensor_id)));

    logging::debug(
        Component::Detect,
        None,
        &format!(
            "spikes: {} across {} sensors (|z| > {}, {} window)",
            spikes.len(),
            by_sensor.len(),
            query.z_threshold,
            query.rolling_window
        ),
    );

    Ok(SpikeSet {
        total_count: spikes.len(),
        spikes,
        method: METHOD,
        metric: query.metric,
        threshold: query.z_threshold,
        rolling_window: query.rolling_window,
    })
}
