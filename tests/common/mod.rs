//! Shared fixtures for the integration tests.
//!
//! The "gold" day is 2024-11-08 at one sensor: 10-minute corrected PM2.5
//! following `20 + 10·sin(2π·hour/24)`, except 47.3 µg/m³ for the whole of
//! 19:00, plus hourly weather with an evening temperature rise and light,
//! stable air from 17:00.

#![allow(dead_code)]

use aqmon_service::model::{Observation, QaFlags, Source, TimeRange, WeatherObservation, Window};
use aqmon_service::store::MemoryStore;
use chrono::{DateTime, Duration, TimeZone, Timelike, Utc};
use std::f64::consts::PI;

pub const GOLD_SENSOR: &str = "test_sensor_1";
pub const GOLD_SPIKE: f64 = 47.3;

pub fn gold_start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 11, 8, 0, 0, 0).unwrap()
}

pub fn gold_day() -> TimeRange {
    TimeRange::new(gold_start(), gold_start() + Duration::days(1))
}

/// Corrected PM2.5 for every reading in `hour`.
pub fn gold_pm(hour: u32) -> f64 {
    if hour == 19 {
        GOLD_SPIKE
    } else {
        20.0 + 10.0 * (2.0 * PI * hour as f64 / 24.0).sin()
    }
}

pub fn gold_air_quality() -> Vec<Observation> {
    (0..24 * 6)
        .map(|i| {
            let ts = gold_start() + Duration::minutes(i * 10);
            let pm = gold_pm(ts.hour());
            Observation {
                ts,
                source: Source::PurpleAir,
                sensor_id: GOLD_SENSOR.to_string(),
                pm25_raw: pm * 1.1,
                pm25_corr: pm,
                pm10_raw: Some(pm * 1.5),
                qa_flags: QaFlags::NONE,
                window: Window::TenMinutes,
                lat: 35.35,
                lon: -119.0,
            }
        })
        .collect()
}

pub fn gold_weather() -> Vec<WeatherObservation> {
    (0..24)
        .map(|i| {
            let evening = i >= 17;
            WeatherObservation {
                ts: gold_start() + Duration::hours(i),
                station_id: "test_station".to_string(),
                temp_c: 25.0 - 5.0 * (2.0 * PI * (i as f64 - 6.0) / 24.0).sin(),
                rh: 55.0,
                wind_speed_ms: if evening { 1.5 } else { 3.0 },
                wind_dir_deg: 180.0,
                pressure_mb: Some(1013.0),
                stability_idx: Some(if evening { 0.6 } else { 0.2 }),
                mixing_height_m: None,
                window: Window::OneHour,
                lat: 35.35,
                lon: -119.0,
            }
        })
        .collect()
}

pub fn gold_store() -> MemoryStore {
    MemoryStore::new(gold_air_quality(), gold_weather())
}
