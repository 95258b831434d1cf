//! Regulatory exceedance detection on corrected PM2.5.
//!
//! Readings from every selected sensor are grouped by period start
//! (`period` truncation); a period is an exceedance when its mean is above
//! the threshold. The reported `window` names the standard being compared
//! against (the 24-hour PM2.5 NAAQS); `period` is the grouping actually
//! applied, hourly unless the caller asks for daily means.

use super::PM_UNIT;
use crate::logging::{self, Component};
use crate::model::{DetectionError, QaFlags, TimeRange, Window};
use crate::store::TimeSeriesAccessor;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;

/// 24-hour PM2.5 NAAQS, µg/m³.
pub const DEFAULT_THRESHOLD: f64 = 35.0;

#[derive(Debug, Clone, PartialEq)]
pub struct ExceedanceQuery {
    pub range: TimeRange,
    pub threshold: f64,
    pub window: Window,
    pub period: Window,
    pub sensor_ids: Option<Vec<String>>,
}

impl ExceedanceQuery {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            threshold: DEFAULT_THRESHOLD,
            window: Window::Day,
            period: Window::OneHour,
            sensor_ids: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Exceedance {
    pub period_start: DateTime<Utc>,
    pub avg_pm25: f64,
    pub max_pm25: f64,
    pub n_readings: usize,
    pub qa_flags: QaFlags,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExceedanceSet {
    pub exceedances: Vec<Exceedance>,
    pub total_count: usize,
    pub threshold: f64,
    pub unit: &'static str,
    pub window: Window,
    pub period: Window,
    /// Exceeding periods × period length.
    pub duration_hours: f64,
}

struct PeriodAccumulator {
    sum: f64,
    max: f64,
    count: usize,
    flags: QaFlags,
}

pub fn detect_exceedances(
    store: &dyn TimeSeriesAccessor,
    query: &ExceedanceQuery,
) -> Result<ExceedanceSet, DetectionError> {
    let rows = store.air_quality(&query.range, query.sensor_ids.as_deref())?;

    let mut periods: BTreeMap<DateTime<Utc>, PeriodAccumulator> = BTreeMap::new();
    for row in &rows {
        let acc = periods
            .entry(query.period.truncate(row.ts))
            .or_insert(PeriodAccumulator {
                sum: 0.0,
                max: f64::NEG_INFINITY,
                count: 0,
                flags: QaFlags::NONE,
            });
        acc.sum += row.pm25_corr;
        acc.max = acc.max.max(row.pm25_corr);
        acc.count += 1;
        acc.flags |= row.qa_flags;
    }

    let evaluated = periods.len();
    let exceedances: Vec<Exceedance> = periods
        .into_iter()
        .map(|(period_start, acc)| Exceedance {
            period_start,
            avg_pm25: acc.sum / acc.count as f64,
            max_pm25: acc.max,
            n_readings: acc.count,
            qa_flags: acc.flags,
        })
        .filter(|e| e.avg_pm25 > query.threshold)
        .collect();

    logging::debug(
        Component::Detect,
        None,
        &format!(
            "exceedances: {} of {} {} periods above {} {}",
            exceedances.len(),
            evaluated,
            query.period,
            query.threshold,
            PM_UNIT
        ),
    );

    Ok(ExceedanceSet {
        total_count: exceedances.len(),
        duration_hours: exceedances.len() as f64 * query.period.hours(),
        exceedances,
        threshold: query.threshold,
        unit: PM_UNIT,
        window: query.window,
        period: query.period,
    })
}
