//! Correlation between two joined variables, optionally controlling for
//! calendar confounders.
//!
//! With controls, each variable is regressed on the same dummy-coded design
//! (intercept plus one indicator per non-reference level of every control)
//! and the residuals are correlated. Rows are the hourly air-quality/weather
//! join, so each air-quality reading contributes once per matching weather
//! row.

use crate::logging::{self, Component};
use crate::model::{DetectionError, JoinedRow, TimeRange, Variable};
use crate::stats::hypothesis::{CorrelationEstimate, correlation};
use crate::stats::regression::{dummy_design, ols_residuals};
use crate::stats::{CorrelationMethod, StatsError};
use crate::store::TimeSeriesAccessor;
use chrono::{DateTime, Datelike, Timelike, Utc};
use serde::{Deserialize, Serialize};

/// Fewer rows than this (joined, then complete) is "insufficient data".
pub const MIN_SAMPLES: usize = 10;

/// Residual sum of squares at or below this fraction of the total means the
/// controls explain the variable completely.
const EXPLAINED_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Control {
    Hour,
    Month,
    DayOfWeek,
}

impl Control {
    /// Category of `ts` for this control. Day of week counts Monday as 0.
    pub fn code(self, ts: DateTime<Utc>) -> u32 {
        match self {
            Control::Hour => ts.hour(),
            Control::Month => ts.month(),
            Control::DayOfWeek => ts.weekday().num_days_from_monday(),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Control::Hour => "hour",
            Control::Month => "month",
            Control::DayOfWeek => "day_of_week",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CorrelationQuery {
    pub range: TimeRange,
    pub x: Variable,
    pub y: Variable,
    pub method: CorrelationMethod,
    /// Empty means a direct correlation.
    pub controls: Vec<Control>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationStatus {
    Computed,
    InsufficientData,
    Failed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CorrelationResult {
    pub status: CorrelationStatus,
    pub correlation: Option<f64>,
    pub p_value: Option<f64>,
    pub n_samples: usize,
    pub method: CorrelationMethod,
    pub x_metric: Variable,
    pub y_metric: Variable,
    pub controlled_for: Vec<Control>,
    pub partial_correlation: bool,
    pub error: Option<String>,
}

impl CorrelationResult {
    fn empty(query: &CorrelationQuery, controls: &[Control], status: CorrelationStatus) -> Self {
        CorrelationResult {
            status,
            correlation: None,
            p_value: None,
            n_samples: 0,
            method: query.method,
            x_metric: query.x,
            y_metric: query.y,
            controlled_for: controls.to_vec(),
            partial_correlation: !controls.is_empty(),
            error: None,
        }
    }
}

/// Controls in first-seen order with repeats removed.
fn dedup_controls(controls: &[Control]) -> Vec<Control> {
    let mut seen = Vec::with_capacity(controls.len());
    for c in controls {
        if !seen.contains(c) {
            seen.push(*c);
        }
    }
    seen
}

pub fn correlate(
    store: &dyn TimeSeriesAccessor,
    query: &CorrelationQuery,
) -> Result<CorrelationResult, DetectionError> {
    let controls = dedup_controls(&query.controls);
    let rows = store.fetch_joined(&query.range)?;

    if rows.len() < MIN_SAMPLES {
        return Ok(CorrelationResult {
            n_samples: rows.len(),
            error: Some("Insufficient data".into()),
            ..CorrelationResult::empty(query, &controls, CorrelationStatus::InsufficientData)
        });
    }

    let complete: Vec<(&JoinedRow, f64, f64)> = rows
        .iter()
        .filter_map(|row| {
            let x = row.value(query.x).filter(|v| v.is_finite())?;
            let y = row.value(query.y).filter(|v| v.is_finite())?;
            Some((row, x, y))
        })
        .collect();
    let n = complete.len();

    if n < MIN_SAMPLES {
        return Ok(CorrelationResult {
            n_samples: n,
            error: Some("Insufficient valid data".into()),
            ..CorrelationResult::empty(query, &controls, CorrelationStatus::InsufficientData)
        });
    }

    let xs: Vec<f64> = complete.iter().map(|(_, x, _)| *x).collect();
    let ys: Vec<f64> = complete.iter().map(|(_, _, y)| *y).collect();

    let estimate = if controls.is_empty() {
        correlation(query.method, &xs, &ys)
    } else {
        let columns: Vec<Vec<u32>> = controls
            .iter()
            .map(|c| complete.iter().map(|(row, _, _)| c.code(row.ts)).collect())
            .collect();
        partial(query, &controls, &columns, &xs, &ys)
    };

    let result = match estimate {
        Ok(est) => CorrelationResult {
            correlation: Some(est.coefficient),
            p_value: Some(est.p_value),
            n_samples: n,
            ..CorrelationResult::empty(query, &controls, CorrelationStatus::Computed)
        },
        Err(e) => {
            logging::warn(
                Component::Detect,
                None,
                &format!("correlation {} vs {} failed: {}", query.x, query.y, e),
            );
            CorrelationResult {
                n_samples: n,
                error: Some(e.to_string()),
                ..CorrelationResult::empty(query, &controls, CorrelationStatus::Failed)
            }
        }
    };
    Ok(result)
}

fn partial(
    query: &CorrelationQuery,
    controls: &[Control],
    columns: &[Vec<u32>],
    xs: &[f64],
    ys: &[f64],
) -> Result<CorrelationEstimate, StatsError> {
    let design = dummy_design(columns, xs.len());
    let rx = ols_residuals(xs, &design)?;
    let ry = ols_residuals(ys, &design)?;
    ensure_unexplained(query.x, xs, &rx, controls, columns)?;
    ensure_unexplained(query.y, ys, &ry, controls, columns)?;
    correlation(query.method, &rx, &ry)
}

/// True when `residuals` are numerically zero relative to the spread of
/// `values`; correlating them would only measure rounding noise.
fn fully_explained(values: &[f64], residuals: &[f64]) -> bool {
    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let ss_tot: f64 = values.iter().map(|v| (v - mean).powi(2)).sum();
    let ss_res: f64 = residuals.iter().map(|r| r * r).sum();
    ss_res <= EXPLAINED_TOLERANCE * ss_tot
}

/// Controls that explain `values` on their own.
fn absorbing_controls(controls: &[Control], columns: &[Vec<u32>], values: &[f64]) -> Vec<Control> {
    controls
        .iter()
        .zip(columns)
        .filter(|(_, column)| {
            let design = dummy_design(std::slice::from_ref(*column), values.len());
            ols_residuals(values, &design).is_ok_and(|resid| fully_explained(values, &resid))
        })
        .map(|(control, _)| *control)
        .collect()
}

fn ensure_unexplained(
    variable: Variable,
    values: &[f64],
    residuals: &[f64],
    controls: &[Control],
    columns: &[Vec<u32>],
) -> Result<(), StatsError> {
    if values.windows(2).all(|w| w[0] == w[1]) {
        return Err(StatsError::ConstantInput);
    }
    if !fully_explained(values, residuals) {
        return Ok(());
    }

    let absorbing = absorbing_controls(controls, columns, values);
    let message = if absorbing.is_empty() {
        let all: Vec<&str> = controls.iter().map(|c| c.as_str()).collect();
        format!(
            "controls {} jointly explain {}; residuals are degenerate",
            all.join(", "),
            variable
        )
    } else {
        let names: Vec<&str> = absorbing.iter().map(|c| c.as_str()).collect();
        format!(
            "{} alone explains {}; residuals are degenerate (drop {} from controls)",
            names.join(", "),
            variable,
            names.join(", ")
        )
    };
    Err(StatsError::Regression(message))
}
