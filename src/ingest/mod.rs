/// Upstream API clients and payload processing.
///
/// - `purpleair`: PurpleAir v1 sensor readings → QA/QC → `Observation`
/// - `weather`  : OpenWeather current conditions → `WeatherObservation`
///
/// Clients are blocking (`reqwest::blocking`) and make no retries; a failed
/// sensor is logged and skipped so one bad unit never stalls a batch.

pub mod purpleair;
pub mod weather;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("HTTP status {status} from {url}")]
    Status { status: u16, url: String },
    #[error("Parse error: {0}")]
    Parse(String),
    #[error("{0} is not configured")]
    MissingApiKey(&'static str),
    #[error("No data returned for {0}")]
    NoData(String),
    #[error("sensor {sensor} reported no value for channel {channel}")]
    MissingChannel { sensor: String, channel: char },
}

/// Builds the shared blocking HTTP client used by both sources.
pub fn http_client() -> Result<reqwest::blocking::Client, IngestError> {
    let client = reqwest::blocking::Client::builder()
        .timeout(std::time::Duration::from_secs(30))
        .user_agent(concat!("aqmon_service/", env!("CARGO_PKG_VERSION")))
        .build()?;
    Ok(client)
}
