//! Row builders shared by the detection unit tests.

use crate::model::{Observation, QaFlags, Source, WeatherObservation, Window};
use chrono::{DateTime, Duration, TimeZone, Utc};

pub fn at(day: u32, hour: u32, minute: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, day, hour, minute, 0).unwrap()
}

pub fn aq(sensor: &str, ts: DateTime<Utc>, pm25_corr: f64) -> Observation {
    Observation {
        ts,
        source: Source::PurpleAir,
        sensor_id: sensor.to_string(),
        pm25_raw: pm25_corr * 1.1,
        pm25_corr,
        pm10_raw: Some(pm25_corr * 1.5),
        qa_flags: QaFlags::NONE,
        window: Window::TenMinutes,
        lat: 35.35,
        lon: -119.0,
    }
}

pub fn flagged(mut obs: Observation, flags: QaFlags) -> Observation {
    obs.qa_flags = flags;
    obs
}

pub fn met(ts: DateTime<Utc>, temp_c: f64, wind: f64, stability: Option<f64>) -> WeatherObservation {
    WeatherObservation {
        ts,
        station_id: "test_station".to_string(),
        temp_c,
        rh: 55.0,
        wind_speed_ms: wind,
        wind_dir_deg: 180.0,
        pressure_mb: Some(1013.0),
        stability_idx: stability,
        mixing_height_m: None,
        window: Window::OneHour,
        lat: 35.35,
        lon: -119.0,
    }
}

/// Six 10-minute readings per hour for one day, value from `pm_at(hour)`.
pub fn ten_minute_day(sensor: &str, day: u32, pm_at: impl Fn(u32) -> f64) -> Vec<Observation> {
    let start = at(day, 0, 0);
    (0..24 * 6)
        .map(|i| {
            let ts = start + Duration::minutes(i * 10);
            aq(sensor, ts, pm_at((i / 6) as u32))
        })
        .collect()
}

/// Accessor whose every read fails as an unreachable database would.
pub struct FailingStore;

impl crate::store::TimeSeriesAccessor for FailingStore {
    fn air_quality(
        &self,
        _: &crate::model::TimeRange,
        _: Option<&[String]>,
    ) -> Result<Vec<Observation>, crate::model::StoreError> {
        Err(crate::model::StoreError::Unavailable("connection refused".into()))
    }

    fn weather(
        &self,
        _: &crate::model::TimeRange,
    ) -> Result<Vec<WeatherObservation>, crate::model::StoreError> {
        Err(crate::model::StoreError::Unavailable("connection refused".into()))
    }
}
