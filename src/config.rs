/// Service configuration.
///
/// Two layers:
/// - `Settings`: process-level settings from the environment (`.env` is
///   honoured via `dotenv`): database URL, API keys, log level, config path.
/// - `AppConfig`: per-location configuration parsed from a TOML file:
///   coordinates, sensor lists, and the QA/QC thresholds applied to readings
///   from that location.
///
/// Thresholds are resolved into the typed `QaConfig` once, at load time;
/// every field has a documented default so a location may omit any of them.

use crate::logging::LogLevel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Default location table shipped with the service.
pub const DEFAULT_CONFIG_PATH: &str = "config/locations.toml";

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("location '{0}' not found in configuration")]
    UnknownLocation(String),
    #[error("invalid configuration: {0}")]
    Invalid(String),
    #[error("required setting {0} is not set")]
    Missing(&'static str),
}

// ---------------------------------------------------------------------------
// QA/QC thresholds
// ---------------------------------------------------------------------------

/// Thresholds used by `qa::correction::validate_reading`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Max |A − B| in µg/m³ for the channels to agree. Default 5.0.
    pub ab_diff_absolute: f64,
    /// Max |A − B| as a fraction of the channel mean. Default 0.20.
    pub ab_diff_relative: f64,
    /// Relative humidity (%) above which `HIGH_HUMIDITY` is set. Default 85.0;
    /// the flag additionally requires RH > 85 whatever this is set to.
    pub high_humidity_threshold: f64,
    /// Modified z-score above which a reading is an `OUTLIER`. Default 4.0.
    pub spike_threshold: f64,
    /// Age in hours beyond which a reading is `STALE_DATA`. Default 2.0.
    pub stale_data_hours: f64,
}

impl Default for QaConfig {
    fn default() -> Self {
        Self {
            ab_diff_absolute: 5.0,
            ab_diff_relative: 0.20,
            high_humidity_threshold: 85.0,
            spike_threshold: 4.0,
            stale_data_hours: 2.0,
        }
    }
}

impl QaConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        let fields = [
            ("ab_diff_absolute", self.ab_diff_absolute),
            ("ab_diff_relative", self.ab_diff_relative),
            ("high_humidity_threshold", self.high_humidity_threshold),
            ("spike_threshold", self.spike_threshold),
            ("stale_data_hours", self.stale_data_hours),
        ];
        for (name, value) in fields {
            if !value.is_finite() || value <= 0.0 {
                return Err(ConfigError::Invalid(format!(
                    "qa_rules.{} must be a positive number, got {}",
                    name, value
                )));
            }
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Locations
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct LocationConfig {
    pub name: String,
    pub latitude: f64,
    pub longitude: f64,
    /// PurpleAir `sensor_index` values polled for this location.
    #[serde(default)]
    pub purpleair_sensors: Vec<u64>,
    /// Identifier stored with weather observations for this location.
    #[serde(default)]
    pub weather_station: Option<String>,
    #[serde(default)]
    pub qa_rules: QaConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AppConfig {
    pub default_location: String,
    pub locations: BTreeMap<String, LocationConfig>,
}

impl AppConfig {
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if !self.locations.contains_key(&self.default_location) {
            return Err(ConfigError::UnknownLocation(self.default_location.clone()));
        }
        for (id, location) in &self.locations {
            if !(-90.0..=90.0).contains(&location.latitude)
                || !(-180.0..=180.0).contains(&location.longitude)
            {
                return Err(ConfigError::Invalid(format!(
                    "location '{}' has out-of-range coordinates",
                    id
                )));
            }
            location.qa_rules.validate()?;
        }
        Ok(())
    }

    pub fn location(&self, id: &str) -> Result<&LocationConfig, ConfigError> {
        self.locations
            .get(id)
            .ok_or_else(|| ConfigError::UnknownLocation(id.to_string()))
    }

    pub fn default_location(&self) -> Result<&LocationConfig, ConfigError> {
        self.location(&self.default_location)
    }

    pub fn location_ids(&self) -> Vec<&str> {
        self.locations.keys().map(String::as_str).collect()
    }
}

// ---------------------------------------------------------------------------
// Process settings
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub database_url: Option<String>,
    pub purpleair_api_key: Option<String>,
    pub openweather_api_key: Option<String>,
    pub log_level: LogLevel,
    pub log_file: Option<PathBuf>,
    pub config_path: PathBuf,
}

impl Settings {
    /// Reads settings from the process environment after loading `.env`.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds settings from an arbitrary key lookup. Empty values count as unset.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let log_level = match get("LOG_LEVEL") {
            Some(raw) => raw.parse::<LogLevel>().map_err(ConfigError::Invalid)?,
            None => LogLevel::Info,
        };

        Ok(Self {
            database_url: get("DATABASE_URL"),
            purpleair_api_key: get("PURPLEAIR_API_KEY"),
            openweather_api_key: get("OPENWEATHER_API_KEY"),
            log_level,
            log_file: get("LOG_FILE").map(PathBuf::from),
            config_path: get("AQMON_CONFIG")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_PATH)),
        })
    }

    pub fn require_database_url(&self) -> Result<&str, ConfigError> {
        self.database_url.as_deref().ok_or(ConfigError::Missing("DATABASE_URL"))
    }
}
