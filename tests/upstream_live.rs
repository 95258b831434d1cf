/// Live checks against the upstream APIs.
///
/// These tests verify:
/// 1. PurpleAir returns both PM channels for the configured sensors
/// 2. OpenWeather returns current conditions for the default location
/// 3. Fetched payloads pass through QA/QC into storable observations
///
/// Prerequisites:
/// - PURPLEAIR_API_KEY and OPENWEATHER_API_KEY set in .env
/// - Internet connectivity
///
/// Run with: cargo test --test upstream_live -- --ignored --test-threads=1
///
/// Note: these make real API calls and may fail when an API is down,
/// rate-limiting, or a sensor has gone offline.

use aqmon_service::config::{AppConfig, DEFAULT_CONFIG_PATH, Settings};
use aqmon_service::ingest::{http_client, purpleair, weather};
use aqmon_service::model::Window;
use chrono::Utc;
use std::path::Path;

fn settings() -> Settings {
    Settings::from_env().expect("settings should load")
}

fn config() -> AppConfig {
    AppConfig::load(Path::new(DEFAULT_CONFIG_PATH)).expect("bundled config should load")
}

#[test]
#[ignore = "calls the PurpleAir API"]
fn test_purpleair_sensors_return_channels() {
    let key = settings().purpleair_api_key.expect("PURPLEAIR_API_KEY must be set");
    let config = config();
    let location = config.default_location().unwrap();
    let client = http_client().unwrap();

    let sensors = purpleair::fetch_sensors(&client, &key, &location.purpleair_sensors);
    assert!(!sensors.is_empty(), "at least one configured sensor should respond");

    let observations = purpleair::process_batch(&sensors, location, Utc::now());
    for obs in &observations {
        assert!(obs.pm25_corr >= 0.0, "corrected PM2.5 is never negative");
        assert_eq!(obs.window, Window::TenMinutes);
    }
}

#[test]
#[ignore = "calls the OpenWeather API"]
fn test_openweather_current_conditions() {
    let key = settings().openweather_api_key.expect("OPENWEATHER_API_KEY must be set");
    let config = config();
    let location = config.default_location().unwrap();
    let client = http_client().unwrap();

    let response = weather::fetch_current(&client, &key, location.latitude, location.longitude)
        .expect("OpenWeather should respond");
    let obs = weather::parse_weather(&response, "live_test").expect("payload should parse");

    assert!((0.0..=100.0).contains(&obs.rh));
    let stability = obs.stability_idx.unwrap();
    assert!((0.0..=1.0).contains(&stability));
    assert!(obs.ts <= Utc::now());
}
