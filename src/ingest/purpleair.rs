/// PurpleAir v1 API client
///
/// Retrieves current dual-channel PM readings for configured sensors and
/// turns each into a corrected, flagged `Observation`.
///
/// API Documentation: https://api.purpleair.com/
/// Requests are authenticated with the `X-API-Key` header and paced at
/// roughly one per second, the documented per-key limit.

use super::IngestError;
use crate::config::LocationConfig;
use crate::logging::{self, Component};
use crate::model::{Observation, Source, Window};
use crate::qa::validate_reading;
use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::thread;
use std::time::Duration;

const PURPLEAIR_BASE_URL: &str = "https://api.purpleair.com/v1";

/// Averaging period requested from the API, in minutes. Matches `Window::TenMinutes`.
pub const AVERAGE_MINUTES: u32 = 10;

/// Pause between consecutive sensor requests.
pub const REQUEST_SPACING: Duration = Duration::from_millis(1_100);

pub const SENSOR_FIELDS: &[&str] = &[
    "pm2.5_cf_1",
    "pm2.5_cf_1_a",
    "pm2.5_cf_1_b",
    "pm10.0_cf_1",
    "humidity",
    "temperature",
    "pressure",
    "latitude",
    "longitude",
    "last_seen",
];

// ============================================================================
// PurpleAir API Response Structures
// ============================================================================

#[derive(Debug, Deserialize)]
pub struct SensorResponse {
    pub sensor: PurpleAirSensor,
}

/// One sensor's current reading. Every field except the index may be absent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PurpleAirSensor {
    pub sensor_index: u64,
    #[serde(rename = "pm2.5_cf_1")]
    pub pm25_cf1: Option<f64>,
    #[serde(rename = "pm2.5_cf_1_a")]
    pub pm25_cf1_a: Option<f64>,
    #[serde(rename = "pm2.5_cf_1_b")]
    pub pm25_cf1_b: Option<f64>,
    #[serde(rename = "pm10.0_cf_1")]
    pub pm10_cf1: Option<f64>,
    /// Internal sensor humidity, percent.
    pub humidity: Option<f64>,
    /// Internal sensor temperature, °F.
    pub temperature: Option<f64>,
    pub pressure: Option<f64>,
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Unix seconds of the sensor's last report.
    pub last_seen: Option<i64>,
}

// ============================================================================
// API Client Functions
// ============================================================================

pub fn sensor_url(sensor_index: u64) -> String {
    format!(
        "{}/sensors/{}?fields={}&average={}",
        PURPLEAIR_BASE_URL,
        sensor_index,
        SENSOR_FIELDS.join(","),
        AVERAGE_MINUTES
    )
}

/// Fetch the current averaged reading for one sensor
pub fn fetch_sensor(
    client: &reqwest::blocking::Client,
    api_key: &str,
    sensor_index: u64,
) -> Result<PurpleAirSensor, IngestError> {
    let url = sensor_url(sensor_index);

    let response = client
        .get(&url)
        .header("X-API-Key", api_key)
        .header("Accept", "application/json")
        .send()?;

    if !response.status().is_success() {
        return Err(IngestError::Status {
            status: response.status().as_u16(),
            url,
        });
    }

    let body = response.text()?;
    parse_sensor_response(&body)
}

pub fn parse_sensor_response(body: &str) -> Result<PurpleAirSensor, IngestError> {
    let parsed: SensorResponse =
        serde_json::from_str(body).map_err(|e| IngestError::Parse(e.to_string()))?;
    Ok(parsed.sensor)
}

/// Fetch every sensor in turn, logging and skipping failures
pub fn fetch_sensors(
    client: &reqwest::blocking::Client,
    api_key: &str,
    sensor_indices: &[u64],
) -> Vec<PurpleAirSensor> {
    let mut sensors = Vec::with_capacity(sensor_indices.len());
    let mut failed = 0;

    for (i, &index) in sensor_indices.iter().enumerate() {
        if i > 0 {
            thread::sleep(REQUEST_SPACING);
        }
        match fetch_sensor(client, api_key, index) {
            Ok(sensor) => sensors.push(sensor),
            Err(e) => {
                failed += 1;
                logging::log_ingest_failure(Component::PurpleAir, &index.to_string(), "Sensor fetch", &e);
            }
        }
    }

    logging::log_batch_summary(Component::PurpleAir, "Sensor fetch", sensors.len(), failed);
    sensors
}

// ============================================================================
// Processing
// ============================================================================

/// Validate and correct one sensor reading.
///
/// Both channels are required. The reading timestamp is `last_seen`, or
/// `now` when the API omits it; coordinates fall back to the location's.
pub fn process_sensor(
    sensor: &PurpleAirSensor,
    location: &LocationConfig,
    now: DateTime<Utc>,
    history: Option<&[f64]>,
) -> Result<Observation, IngestError> {
    let sensor_id = sensor.sensor_index.to_string();

    let channel_a = sensor.pm25_cf1_a.ok_or_else(|| IngestError::MissingChannel {
        sensor: sensor_id.clone(),
        channel: 'a',
    })?;
    let channel_b = sensor.pm25_cf1_b.ok_or_else(|| IngestError::MissingChannel {
        sensor: sensor_id.clone(),
        channel: 'b',
    })?;

    let ts = match sensor.last_seen {
        Some(secs) => DateTime::from_timestamp(secs, 0)
            .ok_or_else(|| IngestError::Parse(format!("last_seen out of range: {}", secs)))?,
        None => now,
    };

    let validated = validate_reading(
        channel_a,
        channel_b,
        sensor.humidity,
        ts,
        now,
        &location.qa_rules,
        history,
    );

    if !validated.flags.is_empty() {
        logging::debug(
            Component::Qa,
            Some(&sensor_id),
            &format!("flags {:#04x} on reading at {}", validated.flags.bits(), ts),
        );
    }

    Ok(Observation {
        ts,
        source: Source::PurpleAir,
        sensor_id,
        pm25_raw: validated.raw,
        pm25_corr: validated.corrected,
        pm10_raw: sensor.pm10_cf1,
        qa_flags: validated.flags,
        window: Window::TenMinutes,
        lat: sensor.latitude.unwrap_or(location.latitude),
        lon: sensor.longitude.unwrap_or(location.longitude),
    })
}

/// Process a fetched batch, logging and skipping sensors that fail
pub fn process_batch(
    sensors: &[PurpleAirSensor],
    location: &LocationConfig,
    now: DateTime<Utc>,
) -> Vec<Observation> {
    let mut observations = Vec::with_capacity(sensors.len());
    for sensor in sensors {
        match process_sensor(sensor, location, now, None) {
            Ok(obs) => observations.push(obs),
            Err(e) => logging::log_ingest_failure(
                Component::PurpleAir,
                &sensor.sensor_index.to_string(),
                "QA/QC",
                &e,
            ),
        }
    }
    logging::log_batch_summary(
        Component::Qa,
        "QA/QC",
        observations.len(),
        sensors.len() - observations.len(),
    );
    observations
}

// ============================================================================
// Tests
// ============================================================================
