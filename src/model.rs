/// Core data types for the air-quality monitoring service.
///
/// This module defines the shared domain model imported by all other modules:
/// corrected observations and their QA flag bits, weather observations, the
/// metric/window vocabularies callers are allowed to ask about, and the
/// error types for the storage and detection layers.
///
/// It contains no I/O and no statistics, only types and their trivial
/// accessors.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{BitOr, BitOrAssign};
use std::str::FromStr;
use thiserror::Error;

// ---------------------------------------------------------------------------
// QA flags
// ---------------------------------------------------------------------------

/// Bit-set of QA/QC conditions attached to an observation.
///
/// The six conditions are independent; any combination may be set. During
/// validation of a single reading flags are only ever OR-ed in, so the type
/// deliberately offers no way to clear a bit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct QaFlags(u8);

impl QaFlags {
    pub const NONE: QaFlags = QaFlags(0x00);
    /// A/B laser channels disagree beyond both tolerances.
    pub const AB_MISMATCH: QaFlags = QaFlags(0x01);
    /// Relative humidity above 85%.
    pub const HIGH_HUMIDITY: QaFlags = QaFlags(0x02);
    /// Statistical outlier against recent history (MAD z-score).
    pub const OUTLIER: QaFlags = QaFlags(0x04);
    /// Reading older than the staleness threshold.
    pub const STALE_DATA: QaFlags = QaFlags(0x08);
    pub const SENSOR_OFFLINE: QaFlags = QaFlags(0x10);
    pub const MAINTENANCE: QaFlags = QaFlags(0x20);

    /// Every defined flag, in bit order.
    pub const ALL: [QaFlags; 6] = [
        QaFlags::AB_MISMATCH,
        QaFlags::HIGH_HUMIDITY,
        QaFlags::OUTLIER,
        QaFlags::STALE_DATA,
        QaFlags::SENSOR_OFFLINE,
        QaFlags::MAINTENANCE,
    ];

    const MASK: u8 = 0x3f;

    /// Builds a flag set from stored bits, dropping undefined bits.
    pub const fn from_bits_truncate(bits: u8) -> QaFlags {
        QaFlags(bits & Self::MASK)
    }

    pub const fn bits(self) -> u8 {
        self.0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// True when every bit of `other` is set in `self`.
    pub const fn contains(self, other: QaFlags) -> bool {
        self.0 & other.0 == other.0
    }

    /// True when any bit of `other` is set in `self`.
    pub const fn intersects(self, other: QaFlags) -> bool {
        self.0 & other.0 != 0
    }

    pub fn insert(&mut self, other: QaFlags) {
        self.0 |= other.0;
    }
}

impl BitOr for QaFlags {
    type Output = QaFlags;

    fn bitor(self, rhs: QaFlags) -> QaFlags {
        QaFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for QaFlags {
    fn bitor_assign(&mut self, rhs: QaFlags) {
        self.0 |= rhs.0;
    }
}

// ---------------------------------------------------------------------------
// Vocabularies
// ---------------------------------------------------------------------------

/// Upstream network that produced an air-quality observation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    PurpleAir,
    AirNow,
}

impl Source {
    pub fn as_str(self) -> &'static str {
        match self {
            Source::PurpleAir => "purpleair",
            Source::AirNow => "airnow",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Source {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "purpleair" => Ok(Source::PurpleAir),
            "airnow" => Ok(Source::AirNow),
            other => Err(format!("unknown source '{}'", other)),
        }
    }
}

/// Aggregation/averaging windows. Serialized with their short labels
/// (`"1h"`, `"24h"`, ...), which are also the labels stored with each row.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Window {
    #[serde(rename = "1m")]
    OneMinute,
    #[serde(rename = "10m")]
    TenMinutes,
    #[serde(rename = "1h")]
    OneHour,
    #[serde(rename = "3h")]
    ThreeHours,
    #[serde(rename = "6h")]
    SixHours,
    #[serde(rename = "24h")]
    Day,
}

impl Window {
    pub fn as_str(self) -> &'static str {
        match self {
            Window::OneMinute => "1m",
            Window::TenMinutes => "10m",
            Window::OneHour => "1h",
            Window::ThreeHours => "3h",
            Window::SixHours => "6h",
            Window::Day => "24h",
        }
    }

    pub fn seconds(self) -> i64 {
        match self {
            Window::OneMinute => 60,
            Window::TenMinutes => 600,
            Window::OneHour => 3_600,
            Window::ThreeHours => 3 * 3_600,
            Window::SixHours => 6 * 3_600,
            Window::Day => 24 * 3_600,
        }
    }

    pub fn duration(self) -> Duration {
        Duration::seconds(self.seconds())
    }

    pub fn hours(self) -> f64 {
        self.seconds() as f64 / 3_600.0
    }

    /// Floors `ts` to the start of its window bucket.
    ///
    /// Buckets are aligned to the Unix epoch; every window divides a day, so
    /// `Day` buckets start at UTC midnight and hourly buckets on the hour.
    pub fn truncate(self, ts: DateTime<Utc>) -> DateTime<Utc> {
        let step = self.seconds();
        let floored = ts.timestamp().div_euclid(step) * step;
        DateTime::from_timestamp(floored, 0).unwrap_or(ts)
    }
}

impl fmt::Display for Window {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Window {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "1m" => Ok(Window::OneMinute),
            "10m" => Ok(Window::TenMinutes),
            "1h" => Ok(Window::OneHour),
            "3h" => Ok(Window::ThreeHours),
            "6h" => Ok(Window::SixHours),
            "24h" => Ok(Window::Day),
            other => Err(format!("unknown window '{}'", other)),
        }
    }
}

/// Air-quality columns that can be fetched as a time series.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Metric {
    /// Barkjohn-corrected PM2.5.
    Pm25Corr,
    /// Mean of the raw A/B channels.
    Pm25Raw,
    Pm10,
}

impl Metric {
    pub fn as_str(self) -> &'static str {
        match self {
            Metric::Pm25Corr => "pm25_corr",
            Metric::Pm25Raw => "pm25_raw",
            Metric::Pm10 => "pm10",
        }
    }

    pub fn unit(self) -> &'static str {
        "µg/m³"
    }

    /// Reads this metric from an observation. PM10 is optional upstream.
    pub fn value_of(self, obs: &Observation) -> Option<f64> {
        match self {
            Metric::Pm25Corr => Some(obs.pm25_corr),
            Metric::Pm25Raw => Some(obs.pm25_raw),
            Metric::Pm10 => obs.pm10_raw,
        }
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Any column of the hourly air-quality/weather join.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Variable {
    Pm25Corr,
    Pm25Raw,
    Pm10,
    TempC,
    Rh,
    WindSpeedMs,
    StabilityIdx,
}

impl Variable {
    pub fn as_str(self) -> &'static str {
        match self {
            Variable::Pm25Corr => "pm25_corr",
            Variable::Pm25Raw => "pm25_raw",
            Variable::Pm10 => "pm10",
            Variable::TempC => "temp_c",
            Variable::Rh => "rh",
            Variable::WindSpeedMs => "wind_speed_ms",
            Variable::StabilityIdx => "stability_idx",
        }
    }
}

impl From<Metric> for Variable {
    fn from(metric: Metric) -> Self {
        match metric {
            Metric::Pm25Corr => Variable::Pm25Corr,
            Metric::Pm25Raw => Variable::Pm25Raw,
            Metric::Pm10 => Variable::Pm10,
        }
    }
}

impl fmt::Display for Variable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Reducers applied to a bucket of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aggregation {
    Mean,
    Max,
    Min,
    Median,
    P95,
}

impl Aggregation {
    pub fn as_str(self) -> &'static str {
        match self {
            Aggregation::Mean => "mean",
            Aggregation::Max => "max",
            Aggregation::Min => "min",
            Aggregation::Median => "median",
            Aggregation::P95 => "p95",
        }
    }
}

impl fmt::Display for Aggregation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Inclusive time range, matching SQL `BETWEEN` semantics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeRange {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        Self { start, end }
    }

    pub fn is_ordered(&self) -> bool {
        self.start <= self.end
    }

    pub fn contains(&self, ts: DateTime<Utc>) -> bool {
        self.start <= ts && ts <= self.end
    }

    /// True when the two ranges share at least one instant.
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }
}

// ---------------------------------------------------------------------------
// Observation types
// ---------------------------------------------------------------------------

/// A corrected, flagged air-quality reading.
///
/// Produced once by `qa::correction::validate_reading` (via the ingest
/// layer) and never mutated afterwards. `pm25_corr` is always >= 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub ts: DateTime<Utc>,
    pub source: Source,
    pub sensor_id: String,
    pub pm25_raw: f64,
    pub pm25_corr: f64,
    pub pm10_raw: Option<f64>,
    pub qa_flags: QaFlags,
    pub window: Window,
    pub lat: f64,
    pub lon: f64,
}

/// A surface weather observation. Derived values only; nothing is corrected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WeatherObservation {
    pub ts: DateTime<Utc>,
    pub station_id: String,
    pub temp_c: f64,
    /// Relative humidity, percent.
    pub rh: f64,
    pub wind_speed_ms: f64,
    pub wind_dir_deg: f64,
    pub pressure_mb: Option<f64>,
    /// 0–1, higher means more stable (inversion-prone).
    pub stability_idx: Option<f64>,
    pub mixing_height_m: Option<f64>,
    pub window: Window,
    pub lat: f64,
    pub lon: f64,
}

/// One air-quality row left-joined to the weather observed in the same hour.
///
/// Weather fields are `None` when no weather row shares the hourly bucket.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedRow {
    pub ts: DateTime<Utc>,
    pub sensor_id: String,
    pub pm25_corr: f64,
    pub pm25_raw: f64,
    pub pm10: Option<f64>,
    pub qa_flags: QaFlags,
    pub temp_c: Option<f64>,
    pub rh: Option<f64>,
    pub wind_speed_ms: Option<f64>,
    pub stability_idx: Option<f64>,
}

impl JoinedRow {
    pub fn value(&self, variable: Variable) -> Option<f64> {
        match variable {
            Variable::Pm25Corr => Some(self.pm25_corr),
            Variable::Pm25Raw => Some(self.pm25_raw),
            Variable::Pm10 => self.pm10,
            Variable::TempC => self.temp_c,
            Variable::Rh => self.rh,
            Variable::WindSpeedMs => self.wind_speed_ms,
            Variable::StabilityIdx => self.stability_idx,
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures of the underlying tabular store.
///
/// These are system faults ("data unavailable"), never "not enough data".
#[derive(Debug, Error)]
pub enum StoreError {
    /// The query was rejected or failed inside the database.
    #[error("database error: {0}")]
    Database(String),
    /// The connection could not be used at all.
    #[error("store unavailable: {0}")]
    Unavailable(String),
    /// A stored row could not be mapped onto the domain model.
    #[error("corrupt row in {table}: {message}")]
    CorruptRow { table: &'static str, message: String },
}

/// Errors a detection primitive can return.
///
/// Sparse or degenerate data is reported inside the result value; the only
/// error is an accessor failure, kept distinct so callers can decide to
/// retry instead of reporting "no data" to the end user.
#[derive(Debug, Error)]
pub enum DetectionError {
    #[error("data unavailable: {0}")]
    DataUnavailable(#[from] StoreError),
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_flags_accumulate_with_or() {
        let mut flags = QaFlags::NONE;
        flags |= QaFlags::AB_MISMATCH;
        flags.insert(QaFlags::STALE_DATA);
        assert!(flags.contains(QaFlags::AB_MISMATCH));
        assert!(flags.contains(QaFlags::STALE_DATA));
        assert!(!flags.intersects(QaFlags::OUTLIER));
        assert_eq!(flags.bits(), 0x09);
    }

    #[test]
    fn test_flag_bits_are_distinct() {
        let combined = QaFlags::ALL.iter().fold(QaFlags::NONE, |acc, f| acc | *f);
        assert_eq!(combined.bits(), 0x3f);
        assert_eq!(QaFlags::from_bits_truncate(0xff), combined);
    }

    #[test]
    fn test_flags_serialize_as_integer() {
        let json = serde_json::to_string(&(QaFlags::OUTLIER | QaFlags::MAINTENANCE)).unwrap();
        assert_eq!(json, "36");
    }

    #[test]
    fn test_window_labels_round_trip_through_from_str() {
        for w in [
            Window::OneMinute,
            Window::TenMinutes,
            Window::OneHour,
            Window::ThreeHours,
            Window::SixHours,
            Window::Day,
        ] {
            assert_eq!(w.as_str().parse::<Window>().unwrap(), w);
            assert_eq!(serde_json::to_string(&w).unwrap(), format!("\"{}\"", w));
        }
        assert!("2h".parse::<Window>().is_err());
    }

    #[test]
    fn test_window_truncate_aligns_to_bucket_start() {
        let ts = Utc.with_ymd_and_hms(2024, 11, 8, 19, 47, 13).unwrap();
        assert_eq!(
            Window::OneHour.truncate(ts),
            Utc.with_ymd_and_hms(2024, 11, 8, 19, 0, 0).unwrap()
        );
        assert_eq!(
            Window::TenMinutes.truncate(ts),
            Utc.with_ymd_and_hms(2024, 11, 8, 19, 40, 0).unwrap()
        );
        assert_eq!(
            Window::Day.truncate(ts),
            Utc.with_ymd_and_hms(2024, 11, 8, 0, 0, 0).unwrap()
        );
    }

    #[test]
    fn test_time_range_is_inclusive() {
        let start = Utc.with_ymd_and_hms(2024, 11, 8, 0, 0, 0).unwrap();
        let end = Utc.with_ymd_and_hms(2024, 11, 9, 0, 0, 0).unwrap();
        let range = TimeRange::new(start, end);
        assert!(range.contains(start));
        assert!(range.contains(end));
        assert!(!range.contains(end + Duration::seconds(1)));
        assert!(range.is_ordered());
        assert!(!TimeRange::new(end, start).is_ordered());
    }

    #[test]
    fn test_detection_error_wraps_store_error() {
        let err: DetectionError = StoreError::Unavailable("connection reset".into()).into();
        assert_eq!(
            err.to_string(),
            "data unavailable: store unavailable: connection reset"
        );
    }
}
