/// Postgres-backed accessor.
///
/// Reads `observations_aq` and `observations_met` (schema in
/// `sql/001_observations.sql`) through a single blocking connection. The
/// connection is shared behind a mutex so the store can be handed to
/// detection code as `&dyn TimeSeriesAccessor`; queries run one at a time.
///
/// The ingest path writes through `insert_air_quality` / `insert_weather`.
/// Both are idempotent on the table's primary key.

use super::TimeSeriesAccessor;
use crate::model::{
    Observation, QaFlags, Source, StoreError, TimeRange, WeatherObservation, Window,
};
use chrono::{DateTime, Utc};
use postgres::{Client, NoTls, Row};
use std::sync::Mutex;

pub struct PgStore {
    client: Mutex<Client>,
}

impl PgStore {
    pub fn connect(database_url: &str) -> Result<Self, StoreError> {
        let client = Client::connect(database_url, NoTls)
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;
        Ok(Self::from_client(client))
    }

    pub fn from_client(client: Client) -> Self {
        Self {
            client: Mutex::new(client),
        }
    }

    fn with_client<T>(
        &self,
        f: impl FnOnce(&mut Client) -> Result<T, postgres::Error>,
    ) -> Result<T, StoreError> {
        let mut client = self
            .client
            .lock()
            .map_err(|_| StoreError::Unavailable("connection lock poisoned".into()))?;
        f(&mut client).map_err(map_pg_error)
    }
}

fn map_pg_error(e: postgres::Error) -> StoreError {
    if e.is_closed() {
        StoreError::Unavailable(e.to_string())
    } else {
        StoreError::Database(e.to_string())
    }
}

// ---------------------------------------------------------------------------
// Row mapping
// ---------------------------------------------------------------------------

fn corrupt(table: &'static str, message: impl Into<String>) -> StoreError {
    StoreError::CorruptRow {
        table,
        message: message.into(),
    }
}

fn observation_from_row(row: &Row) -> Result<Observation, StoreError> {
    const TABLE: &str = "observations_aq";

    let source: String = row.try_get(1).map_err(|e| corrupt(TABLE, e.to_string()))?;
    let flags: i16 = row.try_get(6).map_err(|e| corrupt(TABLE, e.to_string()))?;
    let window: String = row.try_get(7).map_err(|e| corrupt(TABLE, e.to_string()))?;
    let flags = u8::try_from(flags).map_err(|_| corrupt(TABLE, format!("qa_flags out of range: {}", flags)))?;

    Ok(Observation {
        ts: row.try_get::<_, DateTime<Utc>>(0).map_err(|e| corrupt(TABLE, e.to_string()))?,
        source: source.parse::<Source>().map_err(|e| corrupt(TABLE, e))?,
        sensor_id: row.try_get(2).map_err(|e| corrupt(TABLE, e.to_string()))?,
        pm25_raw: row.try_get(3).map_err(|e| corrupt(TABLE, e.to_string()))?,
        pm25_corr: row.try_get(4).map_err(|e| corrupt(TABLE, e.to_string()))?,
        pm10_raw: row.try_get(5).map_err(|e| corrupt(TABLE, e.to_string()))?,
        qa_flags: QaFlags::from_bits_truncate(flags),
        window: window.parse::<Window>().map_err(|e| corrupt(TABLE, e))?,
        lat: row.try_get(8).map_err(|e| corrupt(TABLE, e.to_string()))?,
        lon: row.try_get(9).map_err(|e| corrupt(TABLE, e.to_string()))?,
    })
}

fn weather_from_row(row: &Row) -> Result<WeatherObservation, StoreError> {
    const TABLE: &str = "observations_met";

    let window: String = row.try_get(9).map_err(|e| corrupt(TABLE, e.to_string()))?;

    Ok(WeatherObservation {
        ts: row.try_get::<_, DateTime<Utc>>(0).map_err(|e| corrupt(TABLE, e.to_string()))?,
        station_id: row.try_get(1).map_err(|e| corrupt(TABLE, e.to_string()))?,
        temp_c: row.try_get(2).map_err(|e| corrupt(TABLE, e.to_string()))?,
        rh: row.try_get(3).map_err(|e| corrupt(TABLE, e.to_string()))?,
        wind_speed_ms: row.try_get(4).map_err(|e| corrupt(TABLE, e.to_string()))?,
        wind_dir_deg: row.try_get(5).map_err(|e| corrupt(TABLE, e.to_string()))?,
        pressure_mb: row.try_get(6).map_err(|e| corrupt(TABLE, e.to_string()))?,
        stability_idx: row.try_get(7).map_err(|e| corrupt(TABLE, e.to_string()))?,
        mixing_height_m: row.try_get(8).map_err(|e| corrupt(TABLE, e.to_string()))?,
        window: window.parse::<Window>().map_err(|e| corrupt(TABLE, e))?,
        lat: row.try_get(10).map_err(|e| corrupt(TABLE, e.to_string()))?,
        lon: row.try_get(11).map_err(|e| corrupt(TABLE, e.to_string()))?,
    })
}

// ---------------------------------------------------------------------------
// Accessor
// ---------------------------------------------------------------------------

impl TimeSeriesAccessor for PgStore {
    fn air_quality(
        &self,
        range: &TimeRange,
        sensor_ids: Option<&[String]>,
    ) -> Result<Vec<Observation>, StoreError> {
        let query = "
            SELECT ts, source, sensor_id, pm25_raw, pm25_corr, pm10_raw,
                   qa_flags, window_label, lat, lon
            FROM observations_aq
            WHERE ts BETWEEN $1 AND $2
              AND ($3::text[] IS NULL OR sensor_id = ANY($3))
            ORDER BY ts, sensor_id
        ";
        let ids: Option<Vec<String>> = sensor_ids.map(<[String]>::to_vec);

        let rows = self.with_client(|client| client.query(query, &[&range.start, &range.end, &ids]))?;
        rows.iter().map(observation_from_row).collect()
    }

    fn weather(&self, range: &TimeRange) -> Result<Vec<WeatherObservation>, StoreError> {
        let query = "
            SELECT ts, station_id, temp_c, rh, wind_speed_ms, wind_dir_deg,
                   pressure_mb, stability_idx, mixing_height_m, window_label, lat, lon
            FROM observations_met
            WHERE ts BETWEEN $1 AND $2
            ORDER BY ts, station_id
        ";

        let rows = self.with_client(|client| client.query(query, &[&range.start, &range.end]))?;
        rows.iter().map(weather_from_row).collect()
    }
}

impl PgStore {
    /// Inserts corrected readings, skipping rows already stored. Returns rows written.
    pub fn insert_air_quality(&self, rows: &[Observation]) -> Result<u64, StoreError> {
        let sql = "
            INSERT INTO observations_aq
                (ts, source, sensor_id, pm25_raw, pm25_corr, pm10_raw,
                 qa_flags, window_label, lat, lon)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ON CONFLICT (sensor_id, ts, window_label) DO NOTHING
        ";
        self.with_client(|client| {
            let mut tx = client.transaction()?;
            let stmt = tx.prepare(sql)?;
            let mut written = 0;
            for obs in rows {
                let flags = i16::from(obs.qa_flags.bits());
                written += tx.execute(
                    &stmt,
                    &[
                        &obs.ts,
                        &obs.source.as_str(),
                        &obs.sensor_id,
                        &obs.pm25_raw,
                        &obs.pm25_corr,
                        &obs.pm10_raw,
                        &flags,
                        &obs.window.as_str(),
                        &obs.lat,
                        &obs.lon,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(written)
        })
    }

    /// Inserts weather rows, skipping rows already stored. Returns rows written.
    pub fn insert_weather(&self, rows: &[WeatherObservation]) -> Result<u64, StoreError> {
        let sql = "
            INSERT INTO observations_met
                (ts, station_id, temp_c, rh, wind_speed_ms, wind_dir_deg,
                 pressure_mb, stability_idx, mixing_height_m, window_label, lat, lon)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12)
            ON CONFLICT (station_id, ts, window_label) DO NOTHING
        ";
        self.with_client(|client| {
            let mut tx = client.transaction()?;
            let stmt = tx.prepare(sql)?;
            let mut written = 0;
            for w in rows {
                written += tx.execute(
                    &stmt,
                    &[
                        &w.ts,
                        &w.station_id,
                        &w.temp_c,
                        &w.rh,
                        &w.wind_speed_ms,
                        &w.wind_dir_deg,
                        &w.pressure_mb,
                        &w.stability_idx,
                        &w.mixing_height_m,
                        &w.window.as_str(),
                        &w.lat,
                        &w.lon,
                    ],
                )?;
            }
            tx.commit()?;
            Ok(written)
        })
    }

    /// Earliest and latest air-quality timestamps, if any rows exist.
    pub fn data_range(&self) -> Result<Option<TimeRange>, StoreError> {
        let row = self.with_client(|client| {
            client.query_one("SELECT MIN(ts), MAX(ts) FROM observations_aq", &[])
        })?;
        let min: Option<DateTime<Utc>> = row.try_get(0).map_err(map_pg_error)?;
        let max: Option<DateTime<Utc>> = row.try_get(1).map_err(map_pg_error)?;

        match (min, max) {
            (Some(start), Some(end)) => Ok(Some(TimeRange::new(start, end))),
            _ => Ok(None),
        }
    }
}
