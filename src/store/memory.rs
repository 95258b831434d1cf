//! In-process accessor over owned vectors.

use super::TimeSeriesAccessor;
use crate::model::{Observation, StoreError, TimeRange, WeatherObservation};

/// Holds observations sorted by timestamp; reads filter by range and sensor.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    air_quality: Vec<Observation>,
    weather: Vec<WeatherObservation>,
}

impl MemoryStore {
    pub fn new(mut air_quality: Vec<Observation>, mut weather: Vec<WeatherObservation>) -> Self {
        // Stable sorts keep insertion order among equal timestamps.
        air_quality.sort_by_key(|o| o.ts);
        weather.sort_by_key(|w| w.ts);
        Self { air_quality, weather }
    }

    pub fn insert_air_quality(&mut self, obs: Observation) {
        let at = self.air_quality.partition_point(|o| o.ts <= obs.ts);
        self.air_quality.insert(at, obs);
    }

    pub fn insert_weather(&mut self, obs: WeatherObservation) {
        let at = self.weather.partition_point(|w| w.ts <= obs.ts);
        self.weather.insert(at, obs);
    }

    pub fn len(&self) -> usize {
        self.air_quality.len() + self.weather.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl TimeSeriesAccessor for MemoryStore {
    fn air_quality(
        &self,
        range: &TimeRange,
        sensor_ids: Option<&[String]>,
    ) -> Result<Vec<Observation>, StoreError> {
        Ok(self
            .air_quality
            .iter()
            .filter(|o| range.contains(o.ts))
            .filter(|o| sensor_ids.is_none_or(|ids| ids.contains(&o.sensor_id)))
            .cloned()
            .collect())
    }

    fn weather(&self, range: &TimeRange) -> Result<Vec<WeatherObservation>, StoreError> {
        Ok(self
            .weather
            .iter()
            .filter(|w| range.contains(w.ts))
            .cloned()
            .collect())
    }
}
