/// Command-line entry point: print the tool registry, run one tool against
/// Postgres, or ingest current readings for a location.

use aqmon_service::config::{AppConfig, Settings};
use aqmon_service::ingest::{self, IngestError, purpleair, weather};
use aqmon_service::logging::{self, Component};
use aqmon_service::store::PgStore;
use aqmon_service::tools;
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

#[derive(Debug, Parser)]
#[command(name = "aqmon_service")]
#[command(about = "Air-quality QA/QC and detection service", long_about = None)]
#[command(version)]
struct Cli {
    /// Locations file; overrides AQMON_CONFIG
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print the tool registry as JSON
    Tools,

    /// Run one tool against Postgres and print the response
    Run {
        /// Tool name, e.g. detect_exceedances
        tool: String,

        /// Parameters as a JSON object
        #[arg(default_value = "{}")]
        params: String,
    },

    /// Fetch, correct and store current readings
    Ingest {
        /// Location id from the locations file (default location if omitted)
        location: Option<String>,
    },
}

fn run_tool(settings: &Settings, name: &str, raw_params: &str) -> Result<bool, Box<dyn Error>> {
    let params: serde_json::Value = serde_json::from_str(raw_params)?;
    let store = PgStore::connect(settings.require_database_url()?)?;
    let response = tools::execute_tool(&store, name, &params);
    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(response.success)
}

fn run_ingest(settings: &Settings, location_id: Option<&str>) -> Result<(), Box<dyn Error>> {
    let config = AppConfig::load(&settings.config_path)?;
    let location_id = location_id.unwrap_or(config.default_location.as_str());
    let location = config.location(location_id).inspect_err(|_| {
        eprintln!("known locations: {}", config.location_ids().join(", "));
    })?;
    let store = PgStore::connect(settings.require_database_url()?)?;
    let client = ingest::http_client()?;
    let now = Utc::now();

    match settings.purpleair_api_key.as_deref() {
        Some(key) => {
            let sensors = purpleair::fetch_sensors(&client, key, &location.purpleair_sensors);
            if sensors.is_empty() {
                let err = IngestError::NoData(format!("{} sensors", location_id));
                logging::log_ingest_failure(Component::PurpleAir, location_id, "Sensor fetch", &err);
            }
            let observations = purpleair::process_batch(&sensors, location, now);
            match store.insert_air_quality(&observations) {
                Ok(written) => logging::info(
                    Component::Store,
                    None,
                    &format!("{}: stored {} of {} air-quality rows", location_id, written, observations.len()),
                ),
                Err(e) => logging::log_store_failure("Air-quality insert", &e),
            }
        }
        None => {
            let err = IngestError::MissingApiKey("PURPLEAIR_API_KEY");
            logging::log_ingest_failure(Component::PurpleAir, location_id, "Sensor fetch", &err);
        }
    }

    match settings.openweather_api_key.as_deref() {
        Some(key) => {
            let station_id = weather::station_id_for(location_id, location);
            match weather::fetch_current(&client, key, location.latitude, location.longitude)
                .and_then(|resp| weather::parse_weather(&resp, &station_id))
            {
                Ok(obs) => match store.insert_weather(std::slice::from_ref(&obs)) {
                    Ok(written) => {
                        logging::info(Component::Store, Some(&station_id), &format!("stored {} weather row", written))
                    }
                    Err(e) => logging::log_store_failure("Weather insert", &e),
                },
                Err(e) => logging::log_ingest_failure(Component::Weather, &station_id, "Weather fetch", &e),
            }
        }
        None => {
            let err = IngestError::MissingApiKey("OPENWEATHER_API_KEY");
            logging::log_ingest_failure(Component::Weather, location_id, "Weather fetch", &err);
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    let mut settings = match Settings::from_env() {
        Ok(s) => s,
        Err(e) => {
            eprintln!("configuration error: {}", e);
            return ExitCode::FAILURE;
        }
    };
    if let Some(path) = cli.config.clone() {
        settings.config_path = path;
    }
    logging::init_logger(settings.log_level, settings.log_file.as_deref(), true);

    let outcome: Result<bool, Box<dyn Error>> = match &cli.command {
        Command::Tools => serde_json::to_string_pretty(&tools::tool_definitions())
            .map(|json| println!("{}", json))
            .map(|_| true)
            .map_err(Into::into),
        Command::Run { tool, params } => run_tool(&settings, tool, params),
        Command::Ingest { location } => run_ingest(&settings, location.as_deref()).map(|_| true),
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            logging::error(Component::System, None, &e.to_string());
            ExitCode::FAILURE
        }
    }
}
