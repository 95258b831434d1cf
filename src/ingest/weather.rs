/// OpenWeather current-conditions client
///
/// Retrieves surface weather for a location's coordinates and derives a
/// 0–1 atmospheric stability proxy, used by inversion inference in the
/// absence of vertical profile data.
///
/// API Documentation: https://openweathermap.org/current

use super::IngestError;
use crate::config::LocationConfig;
use crate::model::{WeatherObservation, Window};
use chrono::DateTime;
use serde::Deserialize;

const OPENWEATHER_BASE_URL: &str = "https://api.openweathermap.org/data/2.5";

// ============================================================================
// OpenWeather API Response Structures
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct CurrentWeatherResponse {
    /// Unix seconds of the observation.
    pub dt: i64,
    pub coord: Option<Coord>,
    pub main: MainBlock,
    #[serde(default)]
    pub wind: WindBlock,
    #[serde(default)]
    pub clouds: CloudBlock,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Coord {
    pub lat: f64,
    pub lon: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MainBlock {
    /// °C when requested with `units=metric`.
    pub temp: f64,
    pub humidity: f64,
    /// hPa (== mb).
    pub pressure: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct WindBlock {
    /// m/s when requested with `units=metric`.
    pub speed: Option<f64>,
    pub deg: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CloudBlock {
    /// Cloud cover, percent.
    pub all: Option<f64>,
}

// ============================================================================
// API Client Functions
// ============================================================================

/// Request URL without credentials; the key is attached as a query
/// parameter at send time.
pub fn current_weather_url(base_url: &str, lat: f64, lon: f64) -> String {
    format!("{}/weather?lat={}&lon={}&units=metric", base_url, lat, lon)
}

/// Fetch current conditions at a point
pub fn fetch_current(
    client: &reqwest::blocking::Client,
    api_key: &str,
    lat: f64,
    lon: f64,
) -> Result<CurrentWeatherResponse, IngestError> {
    fetch_current_from(client, OPENWEATHER_BASE_URL, api_key, lat, lon)
}

/// Same as [`fetch_current`] against another endpoint.
///
/// Errors never carry the request URL, which holds the key.
pub fn fetch_current_from(
    client: &reqwest::blocking::Client,
    base_url: &str,
    api_key: &str,
    lat: f64,
    lon: f64,
) -> Result<CurrentWeatherResponse, IngestError> {
    let url = current_weather_url(base_url, lat, lon);

    let response = client
        .get(&url)
        .query(&[("appid", api_key)])
        .header("Accept", "application/json")
        .send()
        .map_err(|e| IngestError::Http(e.without_url()))?;

    if !response.status().is_success() {
        return Err(IngestError::Status {
            status: response.status().as_u16(),
            url,
        });
    }

    let body = response.text().map_err(|e| IngestError::Http(e.without_url()))?;
    serde_json::from_str(&body).map_err(|e| IngestError::Parse(e.to_string()))
}

// ============================================================================
// Derived values
// ============================================================================

/// Stability proxy in [0, 1]; higher means more inversion-prone.
///
/// `0.6·max(0, 1 − wind/10) + 0.4·(1 − cloud_fraction)`, clipped. Calm,
/// clear conditions favour radiative surface cooling.
pub fn stability_index(wind_speed_ms: f64, cloud_fraction: f64) -> f64 {
    let wind_factor = (1.0 - wind_speed_ms / 10.0).max(0.0);
    let cloud_factor = 1.0 - cloud_fraction;
    (0.6 * wind_factor + 0.4 * cloud_factor).clamp(0.0, 1.0)
}

/// Convert an API response into a stored observation.
///
/// Missing wind reads as calm and missing cloud cover as clear, as the API
/// omits those blocks when the values are zero.
pub fn parse_weather(
    response: &CurrentWeatherResponse,
    station_id: &str,
) -> Result<WeatherObservation, IngestError> {
    let ts = DateTime::from_timestamp(response.dt, 0)
        .ok_or_else(|| IngestError::Parse(format!("dt out of range: {}", response.dt)))?;

    let wind_speed_ms = response.wind.speed.unwrap_or(0.0);
    let cloud_fraction = response.clouds.all.unwrap_or(0.0) / 100.0;
    let (lat, lon) = response
        .coord
        .as_ref()
        .map(|c| (c.lat, c.lon))
        .unwrap_or((0.0, 0.0));

    Ok(WeatherObservation {
        ts,
        station_id: station_id.to_string(),
        temp_c: response.main.temp,
        rh: response.main.humidity,
        wind_speed_ms,
        wind_dir_deg: response.wind.deg.unwrap_or(0.0),
        pressure_mb: response.main.pressure,
        stability_idx: Some(stability_index(wind_speed_ms, cloud_fraction)),
        mixing_height_m: None,
        window: Window::TenMinutes,
        lat,
        lon,
    })
}

/// Station id stored with a location's weather rows.
pub fn station_id_for(location_id: &str, location: &LocationConfig) -> String {
    location
        .weather_station
        .clone()
        .unwrap_or_else(|| format!("openweather_{}", location_id))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    const SAMPLE: &str = r#"{
        "coord": {"lon": -119.02, "lat": 35.37},
        "weather": [{"id": 800, "main": "Clear"}],
        "main": {"temp": 14.2, "feels_like": 13.1, "pressure": 1019, "humidity": 62},
        "wind": {"speed": 1.5, "deg": 320},
        "clouds": {"all": 20},
        "dt": 1731096000,
        "name": "Bakersfield"
    }"#;

    #[test]
    fn test_stability_index_bounds_and_values() {
        assert_relative_eq!(stability_index(0.0, 0.0), 1.0);
        assert_relative_eq!(stability_index(20.0, 1.0), 0.0);
        // 0.6*0.85 + 0.4*0.8
        assert_relative_eq!(stability_index(1.5, 0.2), 0.83, epsilon = 1e-12);
    }

    #[test]
    fn test_parse_sample_payload() {
        let response: CurrentWeatherResponse = serde_json::from_str(SAMPLE).unwrap();
        let obs = parse_weather(&response, "openweather_bakersfield").unwrap();
        assert_eq!(obs.station_id, "openweather_bakersfield");
        assert_eq!(obs.temp_c, 14.2);
        assert_eq!(obs.rh, 62.0);
        assert_eq!(obs.pressure_mb, Some(1019.0));
        assert_eq!(obs.window, Window::TenMinutes);
        assert_relative_eq!(obs.stability_idx.unwrap(), 0.83, epsilon = 1e-12);
        assert_eq!(obs.ts.timestamp(), 1731096000);
    }

    #[test]
    fn test_missing_wind_and_clouds_read_as_calm_and_clear() {
        let text = r#"{"dt": 1731096000, "main": {"temp": 10.0, "humidity": 80}}"#;
        let response: CurrentWeatherResponse = serde_json::from_str(text).unwrap();
        let obs = parse_weather(&response, "station").unwrap();
        assert_eq!(obs.wind_speed_ms, 0.0);
        assert_eq!(obs.stability_idx, Some(1.0));
    }

    #[test]
    fn test_url_has_coordinates_but_no_key() {
        let url = current_weather_url(OPENWEATHER_BASE_URL, 35.37, -119.02);
        assert!(url.contains("lat=35.37&lon=-119.02"));
        assert!(!url.contains("appid"), "key is added at send time, got {}", url);
    }

    #[test]
    fn test_transport_error_does_not_show_api_key() {
        // Nothing listens on port 1, so the request fails before any response.
        let client = crate::ingest::http_client().unwrap();
        let err = fetch_current_from(&client, "http://127.0.0.1:1", "SECRETKEY123", 40.0, -88.0)
            .expect_err("connection should be refused");

        assert!(matches!(err, IngestError::Http(_)));
        let shown = err.to_string();
        assert!(!shown.contains("SECRETKEY123"), "API key leaked into error: {}", shown);
        assert!(!format!("{:?}", err).contains("SECRETKEY123"), "API key leaked into debug output");
    }
}
