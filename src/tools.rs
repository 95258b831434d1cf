/// Tool adapter: named, schema-validated, JSON-in/JSON-out access to the
/// detection primitives.
///
/// `execute_tool` is the boundary where untrusted parameters meet the
/// numeric core. Parameters are decoded into typed structs (unknown fields
/// rejected, enumerations enforced, defaults filled) and then checked
/// semantically before any primitive runs. Every outcome, including bad
/// input and store failures, comes back as a `ToolResponse`.

use crate::detect::{
    self, Control, CorrelationQuery, DetectionResult, ExceedanceQuery, InversionQuery, PeriodQuery,
    SpikeQuery, SummaryQuery,
};
use crate::logging::{self, Component};
use crate::model::{Aggregation, DetectionError, Metric, TimeRange, Variable, Window};
use crate::stats::CorrelationMethod;
use crate::store::TimeSeriesAccessor;
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Value, json};
use thiserror::Error;

pub const DEFAULT_LOCATION: &str = "bakersfield";
const MAX_LOCATION_LEN: usize = 64;

/// Aggregates offered by `get_metric_summary`.
const SUMMARY_AGGREGATES: [Aggregation; 4] =
    [Aggregation::Max, Aggregation::Mean, Aggregation::P95, Aggregation::Median];

// ---------------------------------------------------------------------------
// Errors and responses
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Unknown tool: {0}")]
    UnknownTool(String),
    #[error("invalid parameters: {0}")]
    InvalidParams(String),
    #[error(transparent)]
    DataUnavailable(#[from] DetectionError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolErrorKind {
    UnknownTool,
    InvalidParams,
    DataUnavailable,
}

impl ToolError {
    pub fn kind(&self) -> ToolErrorKind {
        match self {
            ToolError::UnknownTool(_) => ToolErrorKind::UnknownTool,
            ToolError::InvalidParams(_) => ToolErrorKind::InvalidParams,
            ToolError::DataUnavailable(_) => ToolErrorKind::DataUnavailable,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ToolResponse {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<DetectionResult>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ToolErrorKind>,
    pub tool: String,
    /// The parameters exactly as received.
    pub params: Value,
}

// ---------------------------------------------------------------------------
// Timestamps
// ---------------------------------------------------------------------------

/// Parses RFC 3339, or a naive ISO-8601 date-time or date taken as UTC.
pub fn parse_timestamp(s: &str) -> Result<DateTime<Utc>, String> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.with_timezone(&Utc));
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Ok(naive.and_utc());
        }
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(naive) = date.and_hms_opt(0, 0, 0) {
            return Ok(naive.and_utc());
        }
    }
    Err(format!("invalid timestamp '{}': expected ISO-8601", s))
}

fn timestamp<'de, D: Deserializer<'de>>(d: D) -> Result<DateTime<Utc>, D::Error> {
    let raw = String::deserialize(d)?;
    parse_timestamp(&raw).map_err(serde::de::Error::custom)
}

// ---------------------------------------------------------------------------
// Parameter types
// ---------------------------------------------------------------------------

fn default_location() -> String {
    DEFAULT_LOCATION.to_string()
}
fn default_threshold() -> f64 {
    detect::exceedance::DEFAULT_THRESHOLD
}
fn default_period() -> Window {
    Window::OneHour
}
fn default_z() -> f64 {
    detect::spikes::DEFAULT_Z_THRESHOLD
}
fn default_rolling() -> Window {
    Window::OneHour
}
fn default_method() -> CorrelationMethod {
    CorrelationMethod::Spearman
}
fn default_controls() -> Vec<Control> {
    vec![Control::Hour, Control::Month]
}
fn default_min_confidence() -> f64 {
    detect::inversion::DEFAULT_MIN_CONFIDENCE
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MetricSummaryParams {
    pub metric: Metric,
    pub window: Window,
    #[serde(deserialize_with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
    pub aggregate: Aggregation,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExceedanceParams {
    #[serde(default = "default_threshold")]
    pub threshold: f64,
    pub window: Window,
    #[serde(default = "default_period")]
    pub period: Window,
    #[serde(deserialize_with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SpikeParams {
    pub metric: Metric,
    #[serde(default = "default_z")]
    pub z_threshold: f64,
    #[serde(default = "default_rolling")]
    pub rolling_window: Window,
    #[serde(deserialize_with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CorrelationParams {
    pub x_metric: Variable,
    pub y_metric: Variable,
    #[serde(default = "default_method")]
    pub method: CorrelationMethod,
    #[serde(default = "default_controls")]
    pub controls: Vec<Control>,
    #[serde(deserialize_with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct InversionParams {
    #[serde(default = "default_min_confidence")]
    pub min_confidence: f64,
    #[serde(deserialize_with = "timestamp")]
    pub start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ComparePeriodsParams {
    pub metric: Metric,
    #[serde(deserialize_with = "timestamp")]
    pub period_a_start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub period_a_end: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub period_b_start: DateTime<Utc>,
    #[serde(deserialize_with = "timestamp")]
    pub period_b_end: DateTime<Utc>,
    #[serde(default = "default_location")]
    pub location: String,
}

// ---------------------------------------------------------------------------
// Semantic checks
// ---------------------------------------------------------------------------

fn invalid(message: impl Into<String>) -> ToolError {
    ToolError::InvalidParams(message.into())
}

fn checked_range(start: DateTime<Utc>, end: DateTime<Utc>) -> Result<TimeRange, ToolError> {
    let range = TimeRange::new(start, end);
    if !range.is_ordered() {
        return Err(invalid(format!("start ({}) is after end ({})", start, end)));
    }
    Ok(range)
}

fn check_positive(name: &str, value: f64) -> Result<(), ToolError> {
    if !value.is_finite() || value <= 0.0 {
        return Err(invalid(format!("{} must be a positive number, got {}", name, value)));
    }
    Ok(())
}

fn check_one_of<T: PartialEq + std::fmt::Display>(name: &str, value: T, allowed: &[T]) -> Result<(), ToolError> {
    if allowed.contains(&value) {
        return Ok(());
    }
    let names: Vec<String> = allowed.iter().map(ToString::to_string).collect();
    Err(invalid(format!("{} must be one of [{}], got {}", name, names.join(", "), value)))
}

fn check_location(location: &str) -> Result<(), ToolError> {
    let well_formed = !location.is_empty()
        && location.len() <= MAX_LOCATION_LEN
        && location.chars().all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-');
    if !well_formed {
        return Err(invalid(format!("invalid location identifier '{}'", location)));
    }
    Ok(())
}

fn decode<P: DeserializeOwned>(params: &Value) -> Result<P, ToolError> {
    serde_json::from_value(params.clone()).map_err(|e| invalid(e.to_string()))
}

// ---------------------------------------------------------------------------
// Dispatch
// ---------------------------------------------------------------------------

fn run_metric_summary(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: MetricSummaryParams = decode(params)?;
    check_location(&p.location)?;
    check_one_of("window", p.window, &[Window::OneHour, Window::Day])?;
    check_one_of("aggregate", p.aggregate, &SUMMARY_AGGREGATES)?;
    let query = SummaryQuery {
        range: checked_range(p.start, p.end)?,
        metric: p.metric,
        window: p.window,
        aggregation: p.aggregate,
        sensor_ids: None,
    };
    Ok(detect::metric_summary(store, &query)?.into())
}

fn run_exceedances(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: ExceedanceParams = decode(params)?;
    check_location(&p.location)?;
    check_positive("threshold", p.threshold)?;
    check_one_of("window", p.window, &[Window::Day])?;
    check_one_of("period", p.period, &[Window::OneHour, Window::Day])?;
    let query = ExceedanceQuery {
        threshold: p.threshold,
        window: p.window,
        period: p.period,
        ..ExceedanceQuery::new(checked_range(p.start, p.end)?)
    };
    Ok(detect::detect_exceedances(store, &query)?.into())
}

fn run_spikes(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: SpikeParams = decode(params)?;
    check_location(&p.location)?;
    check_positive("z_threshold", p.z_threshold)?;
    check_one_of("metric", p.metric, &[Metric::Pm25Corr, Metric::Pm25Raw])?;
    check_one_of(
        "rolling_window",
        p.rolling_window,
        &[Window::OneHour, Window::ThreeHours, Window::SixHours],
    )?;
    let query = SpikeQuery {
        z_threshold: p.z_threshold,
        rolling_window: p.rolling_window,
        ..SpikeQuery::new(checked_range(p.start, p.end)?, p.metric)
    };
    Ok(detect::detect_spikes(store, &query)?.into())
}

fn run_correlations(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: CorrelationParams = decode(params)?;
    check_location(&p.location)?;
    let query = CorrelationQuery {
        range: checked_range(p.start, p.end)?,
        x: p.x_metric,
        y: p.y_metric,
        method: p.method,
        controls: p.controls,
    };
    Ok(detect::correlate(store, &query)?.into())
}

fn run_inversion(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: InversionParams = decode(params)?;
    check_location(&p.location)?;
    if !(0.0..=1.0).contains(&p.min_confidence) {
        return Err(invalid(format!(
            "min_confidence must be within [0, 1], got {}",
            p.min_confidence
        )));
    }
    let query = InversionQuery {
        range: checked_range(p.start, p.end)?,
        min_confidence: p.min_confidence,
    };
    Ok(detect::infer_inversion(store, &query)?.into())
}

fn run_compare_periods(store: &dyn TimeSeriesAccessor, params: &Value) -> Result<DetectionResult, ToolError> {
    let p: ComparePeriodsParams = decode(params)?;
    check_location(&p.location)?;
    let period_a = checked_range(p.period_a_start, p.period_a_end)?;
    let period_b = checked_range(p.period_b_start, p.period_b_end)?;
    if period_a.overlaps(&period_b) {
        return Err(invalid("period_a and period_b must not overlap"));
    }
    let query = PeriodQuery {
        period_a,
        period_b,
        metric: p.metric,
        sensor_ids: None,
    };
    Ok(detect::compare_periods(store, &query)?.into())
}

fn dispatch(store: &dyn TimeSeriesAccessor, name: &str, params: &Value) -> Result<DetectionResult, ToolError> {
    match name {
        "get_metric_summary" => run_metric_summary(store, params),
        "detect_exceedances" => run_exceedances(store, params),
        "detect_spikes" => run_spikes(store, params),
        "find_correlations" => run_correlations(store, params),
        "infer_inversion" => run_inversion(store, params),
        "compare_periods" => run_compare_periods(store, params),
        other => Err(ToolError::UnknownTool(other.to_string())),
    }
}

/// Runs the named tool. Never panics on bad input; failures come back with
/// `success = false` and an `error_kind`.
pub fn execute_tool(store: &dyn TimeSeriesAccessor, name: &str, params: &Value) -> ToolResponse {
    match dispatch(store, name, params) {
        Ok(result) => {
            logging::info(Component::Tools, None, &format!("{} succeeded", name));
            ToolResponse {
                success: true,
                result: Some(result),
                error: None,
                error_kind: None,
                tool: name.to_string(),
                params: params.clone(),
            }
        }
        Err(e) => {
            match &e {
                ToolError::DataUnavailable(_) => logging::error(Component::Tools, None, &format!("{}: {}", name, e)),
                _ => logging::warn(Component::Tools, None, &format!("{}: {}", name, e)),
            }
            ToolResponse {
                success: false,
                result: None,
                error: Some(e.to_string()),
                error_kind: Some(e.kind()),
                tool: name.to_string(),
                params: params.clone(),
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Registry
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct ToolDefinition {
    pub name: &'static str,
    pub description: &'static str,
    pub input_schema: Value,
}

fn time_properties() -> Value {
    json!({
        "start": { "type": "string", "format": "date-time" },
        "end": { "type": "string", "format": "date-time" },
        "location": { "type": "string", "default": DEFAULT_LOCATION }
    })
}

fn schema(mut properties: Value, required: &[&str]) -> Value {
    if let (Some(props), Value::Object(time)) = (properties.as_object_mut(), time_properties()) {
        for (k, v) in time {
            props.entry(k).or_insert(v);
        }
    }
    let mut required: Vec<&str> = required.to_vec();
    required.extend(["start", "end"]);
    json!({
        "type": "object",
        "properties": properties,
        "required": required,
        "additionalProperties": false
    })
}

pub fn tool_definitions() -> Vec<ToolDefinition> {
    vec![
        ToolDefinition {
            name: "get_metric_summary",
            description: "Get summary statistics (max, mean, p95, median) for PM2.5 or PM10 over a time period",
            input_schema: schema(
                json!({
                    "metric": { "type": "string", "enum": ["pm25_corr", "pm25_raw", "pm10"] },
                    "window": { "type": "string", "enum": ["1h", "24h"] },
                    "aggregate": { "type": "string", "enum": SUMMARY_AGGREGATES.map(Aggregation::as_str) }
                }),
                &["metric", "window", "aggregate"],
            ),
        },
        ToolDefinition {
            name: "detect_exceedances",
            description: "Detect periods when PM2.5 exceeded EPA standards (35 µg/m³ for 24-hour average)",
            input_schema: schema(
                json!({
                    "threshold": { "type": "number", "default": 35.0, "exclusiveMinimum": 0 },
                    "window": { "type": "string", "enum": ["24h"] },
                    "period": { "type": "string", "enum": ["1h", "24h"], "default": "1h" }
                }),
                &["window"],
            ),
        },
        ToolDefinition {
            name: "detect_spikes",
            description: "Detect statistical outliers and spikes in PM2.5 data using robust MAD method",
            input_schema: schema(
                json!({
                    "metric": { "type": "string", "enum": ["pm25_corr", "pm25_raw"] },
                    "z_threshold": { "type": "number", "default": 4.0, "exclusiveMinimum": 0 },
                    "rolling_window": { "type": "string", "enum": ["1h", "3h", "6h"], "default": "1h" }
                }),
                &["metric"],
            ),
        },
        ToolDefinition {
            name: "find_correlations",
            description: "Find correlations between PM2.5 and weather variables, controlling for time-of-day and seasonal effects",
            input_schema: schema(
                json!({
                    "x_metric": { "type": "string", "enum": VARIABLES },
                    "y_metric": { "type": "string", "enum": VARIABLES },
                    "method": { "type": "string", "enum": ["spearman", "pearson"], "default": "spearman" },
                    "controls": {
                        "type": "array",
                        "items": { "type": "string", "enum": ["hour", "month", "day_of_week"] },
                        "default": ["hour", "month"]
                    }
                }),
                &["x_metric", "y_metric"],
            ),
        },
        ToolDefinition {
            name: "infer_inversion",
            description: "Infer surface-level atmospheric inversions from weather indicators (low wind, temperature drop, PM buildup)",
            input_schema: schema(
                json!({
                    "min_confidence": { "type": "number", "default": 0.7, "minimum": 0.0, "maximum": 1.0 }
                }),
                &[],
            ),
        },
        ToolDefinition {
            name: "compare_periods",
            description: "Compare a PM metric between two non-overlapping time periods with a Mann-Whitney U test",
            input_schema: json!({
                "type": "object",
                "properties": {
                    "metric": { "type": "string", "enum": ["pm25_corr", "pm25_raw", "pm10"] },
                    "period_a_start": { "type": "string", "format": "date-time" },
                    "period_a_end": { "type": "string", "format": "date-time" },
                    "period_b_start": { "type": "string", "format": "date-time" },
                    "period_b_end": { "type": "string", "format": "date-time" },
                    "location": { "type": "string", "default": DEFAULT_LOCATION }
                },
                "required": ["metric", "period_a_start", "period_a_end", "period_b_start", "period_b_end"],
                "additionalProperties": false
            }),
        },
    ]
}

const VARIABLES: [&str; 7] = [
    "pm25_corr",
    "pm25_raw",
    "pm10",
    "temp_c",
    "rh",
    "wind_speed_ms",
    "stability_idx",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::testutil::{FailingStore, at, ten_minute_day};
    use crate::store::MemoryStore;

    fn store() -> MemoryStore {
        MemoryStore::new(ten_minute_day("s1", 8, |h| if h == 19 { 47.3 } else { 20.0 }), vec![])
    }

    #[test]
    fn test_parse_timestamp_forms() {
        let expected = at(8, 19, 0);
        assert_eq!(parse_timestamp("2024-11-08T19:00:00Z"), Ok(expected));
        assert_eq!(parse_timestamp("2024-11-08T20:00:00+01:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-11-08T19:00:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-11-08 19:00:00"), Ok(expected));
        assert_eq!(parse_timestamp("2024-11-08"), Ok(at(8, 0, 0)));
        assert!(parse_timestamp("yesterday").is_err());
    }

    #[test]
    fn test_exceedance_defaults_fill_in() {
        let params = json!({ "window": "24h", "start": "2024-11-08T00:00:00", "end": "2024-11-09T00:00:00" });
        let resp = execute_tool(&store(), "detect_exceedances", &params);

        assert!(resp.success, "{:?}", resp.error);
        let Some(DetectionResult::ExceedanceSet(set)) = resp.result else {
            panic!("expected an exceedance set");
        };
        assert_eq!(set.threshold, 35.0);
        assert_eq!(set.total_count, 1);
        assert_eq!(resp.params, params, "params echoed unchanged");
    }

    #[test]
    fn test_unknown_tool() {
        let resp = execute_tool(&store(), "drop_tables", &json!({}));
        assert!(!resp.success);
        assert_eq!(resp.error_kind, Some(ToolErrorKind::UnknownTool));
        assert_eq!(resp.error.as_deref(), Some("Unknown tool: drop_tables"));
    }

    #[test]
    fn test_schema_violations_are_invalid_params() {
        let cases = [
            ("detect_exceedances", json!({ "window": "1h", "start": "2024-11-08", "end": "2024-11-09" })),
            ("detect_exceedances", json!({ "window": "24h", "start": "2024-11-08", "end": "2024-11-09", "extra": 1 })),
            ("detect_exceedances", json!({ "window": "24h", "threshold": -5.0, "start": "2024-11-08", "end": "2024-11-09" })),
            ("detect_exceedances", json!({ "window": "24h", "start": "2024-11-09", "end": "2024-11-08" })),
            ("detect_spikes", json!({ "metric": "pm10", "start": "2024-11-08", "end": "2024-11-09" })),
            ("detect_spikes", json!({ "metric": "pm25_corr", "rolling_window": "24h", "start": "2024-11-08", "end": "2024-11-09" })),
            ("get_metric_summary", json!({ "metric": "pm25_corr", "window": "24h", "start": "2024-11-08", "end": "2024-11-09" })),
            ("find_correlations", json!({ "x_metric": "pm25_corr", "y_metric": "ozone", "start": "2024-11-08", "end": "2024-11-09" })),
            ("find_correlations", json!({ "x_metric": "pm25_corr", "y_metric": "rh", "controls": ["weekday"], "start": "2024-11-08", "end": "2024-11-09" })),
            ("infer_inversion", json!({ "min_confidence": 1.5, "start": "2024-11-08", "end": "2024-11-09" })),
            ("infer_inversion", json!({ "start": "2024-11-08", "end": "2024-11-09", "location": "'; DROP TABLE--" })),
            ("infer_inversion", json!("not an object")),
        ];
        for (tool, params) in cases {
            let resp = execute_tool(&store(), tool, &params);
            assert!(!resp.success, "{} accepted {}", tool, params);
            assert_eq!(resp.error_kind, Some(ToolErrorKind::InvalidParams), "{} {}", tool, params);
        }
    }

    #[test]
    fn test_summary_aggregate_limited_to_published_set() {
        let params = json!({
            "metric": "pm25_corr", "window": "24h", "aggregate": "min",
            "start": "2024-11-08", "end": "2024-11-09"
        });
        let resp = execute_tool(&store(), "get_metric_summary", &params);
        assert!(!resp.success, "min is not an offered aggregate");
        assert_eq!(resp.error_kind, Some(ToolErrorKind::InvalidParams));
        assert!(resp.error.unwrap().contains("aggregate must be one of"));

        let summary = tool_definitions().into_iter().find(|d| d.name == "get_metric_summary").unwrap();
        assert_eq!(
            summary.input_schema["properties"]["aggregate"]["enum"],
            json!(["max", "mean", "p95", "median"])
        );
    }

    #[test]
    fn test_overlapping_periods_rejected() {
        let params = json!({
            "metric": "pm25_corr",
            "period_a_start": "2024-11-08T00:00:00Z",
            "period_a_end": "2024-11-08T12:00:00Z",
            "period_b_start": "2024-11-08T12:00:00Z",
            "period_b_end": "2024-11-08T23:59:00Z"
        });
        let resp = execute_tool(&store(), "compare_periods", &params);
        assert_eq!(resp.error_kind, Some(ToolErrorKind::InvalidParams));
    }

    #[test]
    fn test_compare_periods_runs() {
        let params = json!({
            "metric": "pm25_corr",
            "period_a_start": "2024-11-08T00:00:00Z",
            "period_a_end": "2024-11-08T11:59:00Z",
            "period_b_start": "2024-11-08T12:00:00Z",
            "period_b_end": "2024-11-08T23:59:00Z"
        });
        let resp = execute_tool(&store(), "compare_periods", &params);
        assert!(resp.success, "{:?}", resp.error);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["result"]["kind"], "period_comparison");
        assert_eq!(json["result"]["status"], "computed");
    }

    #[test]
    fn test_store_failure_is_data_unavailable() {
        let params = json!({ "start": "2024-11-08", "end": "2024-11-09" });
        let resp = execute_tool(&FailingStore, "infer_inversion", &params);
        assert!(!resp.success);
        assert_eq!(resp.error_kind, Some(ToolErrorKind::DataUnavailable));
        assert!(resp.error.unwrap().contains("connection refused"));
    }

    #[test]
    fn test_registry_lists_every_dispatchable_tool() {
        let defs = tool_definitions();
        assert_eq!(defs.len(), 6);
        for def in &defs {
            assert_eq!(def.input_schema["type"], "object");
            assert_eq!(def.input_schema["additionalProperties"], false);
            let resp = execute_tool(&store(), def.name, &json!({}));
            assert_ne!(resp.error_kind, Some(ToolErrorKind::UnknownTool), "{}", def.name);
        }
    }
}
