//! Surface-inferred temperature inversion candidates.
//!
//! Without a vertical temperature profile an inversion can only be guessed
//! from surface proxies. Each UTC calendar day of the hourly
//! air-quality/weather join is scored on four equally weighted indicators:
//!
//! - low wind:        more than 60% of rows with wind below 2 m/s
//! - high stability:  more than 50% of rows with stability index above 0.3
//! - PM buildup:      mean PM2.5 over 20–23h above 1.3× the 12–15h mean
//! - evening cooling: mean temperature at 15h minus 20h above 5 °C
//!
//! Missing weather counts against an indicator, never for it.

use crate::logging::{self, Component};
use crate::model::{DetectionError, JoinedRow, TimeRange};
use crate::stats::robust;
use crate::store::TimeSeriesAccessor;
use chrono::{NaiveDate, Timelike};
use serde::Serialize;
use std::collections::BTreeMap;

pub const DEFAULT_MIN_CONFIDENCE: f64 = 0.7;

const LOW_WIND_MS: f64 = 2.0;
const LOW_WIND_FRACTION: f64 = 0.6;
const HIGH_STABILITY_IDX: f64 = 0.3;
const HIGH_STABILITY_FRACTION: f64 = 0.5;
const PM_BUILDUP_RATIO: f64 = 1.3;
const EVENING_COOLING_C: f64 = 5.0;

const DAY_HOURS: [u32; 4] = [12, 13, 14, 15];
const NIGHT_HOURS: [u32; 4] = [20, 21, 22, 23];
const AFTERNOON_HOUR: u32 = 15;
const EVENING_HOUR: u32 = 20;

pub const CANDIDATE_CAVEAT: &str = "No vertical profile available";
pub const SET_CAVEAT: &str = "Surface-based inference without vertical profile data";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InversionQuery {
    pub range: TimeRange,
    pub min_confidence: f64,
}

impl InversionQuery {
    pub fn new(range: TimeRange) -> Self {
        Self {
            range,
            min_confidence: DEFAULT_MIN_CONFIDENCE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Indicators {
    pub low_wind: bool,
    pub high_stability: bool,
    pub pm_buildup: bool,
    pub evening_cooling: bool,
}

impl Indicators {
    pub fn count(&self) -> usize {
        [self.low_wind, self.high_stability, self.pm_buildup, self.evening_cooling]
            .iter()
            .filter(|b| **b)
            .count()
    }

    pub fn confidence(&self) -> f64 {
        self.count() as f64 / 4.0
    }
}

/// The numbers behind each indicator for one day.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Evidence {
    pub rows: usize,
    pub low_wind_fraction: f64,
    pub high_stability_fraction: f64,
    pub night_pm_mean: Option<f64>,
    pub day_pm_mean: Option<f64>,
    /// Afternoon minus evening temperature, °C.
    pub evening_cooling_c: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InversionCandidate {
    pub date: NaiveDate,
    pub confidence: f64,
    pub indicators: Indicators,
    pub evidence: Evidence,
    #[serde(rename = "type")]
    pub kind: &'static str,
    pub caveat: &'static str,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InversionSet {
    pub inversions: Vec<InversionCandidate>,
    pub total_count: usize,
    pub min_confidence: f64,
    pub days_evaluated: usize,
    pub caveat: &'static str,
}

fn fraction(rows: &[&JoinedRow], pred: impl Fn(&JoinedRow) -> bool) -> f64 {
    if rows.is_empty() {
        return 0.0;
    }
    rows.iter().filter(|r| pred(r)).count() as f64 / rows.len() as f64
}

fn mean_where(
    rows: &[&JoinedRow],
    hours: &[u32],
    value: impl Fn(&JoinedRow) -> Option<f64>,
) -> Option<f64> {
    let values: Vec<f64> = rows
        .iter()
        .filter(|r| hours.contains(&r.ts.hour()))
        .filter_map(|r| value(r))
        .collect();
    robust::mean(&values)
}

fn score_day(rows: &[&JoinedRow]) -> (Indicators, Evidence) {
    let low_wind_fraction = fraction(rows, |r| r.wind_speed_ms.is_some_and(|w| w < LOW_WIND_MS));
    let high_stability_fraction =
        fraction(rows, |r| r.stability_idx.is_some_and(|s| s > HIGH_STABILITY_IDX));

    let night_pm_mean = mean_where(rows, &NIGHT_HOURS, |r| Some(r.pm25_corr));
    let day_pm_mean = mean_where(rows, &DAY_HOURS, |r| Some(r.pm25_corr));

    let afternoon = mean_where(rows, &[AFTERNOON_HOUR], |r| r.temp_c);
    let evening = mean_where(rows, &[EVENING_HOUR], |r| r.temp_c);
    let evening_cooling_c = afternoon.zip(evening).map(|(a, e)| a - e);

    let indicators = Indicators {
        low_wind: low_wind_fraction > LOW_WIND_FRACTION,
        high_stability: high_stability_fraction > HIGH_STABILITY_FRACTION,
        pm_buildup: matches!(
            (night_pm_mean, day_pm_mean),
            (Some(night), Some(day)) if night > day * PM_BUILDUP_RATIO
        ),
        evening_cooling: evening_cooling_c.is_some_and(|c| c > EVENING_COOLING_C),
    };
    let evidence = Evidence {
        rows: rows.len(),
        low_wind_fraction,
        high_stability_fraction,
        night_pm_mean,
        day_pm_mean,
        evening_cooling_c,
    };
    (indicators, evidence)
}

pub fn infer_inversion(
    store: &dyn TimeSeriesAccessor,
    query: &InversionQuery,
) -> Result<InversionSet, DetectionError> {
    let rows = store.fetch_joined(&query.range)?;

    let mut days: BTreeMap<NaiveDate, Vec<&JoinedRow>> = BTreeMap::new();
    for row in &rows {
        days.entry(row.ts.date_naive()).or_default().push(row);
    }

    let inversions: Vec<InversionCandidate> = days
        .iter()
        .filter_map(|(date, day_rows)| {
            let (indicators, evidence) = score_day(day_rows);
            let confidence = indicators.confidence();
            (confidence >= query.min_confidence).then_some(InversionCandidate {
                date: *date,
                confidence,
                indicators,
                evidence,
                kind: "surface_inferred",
                caveat: CANDIDATE_CAVEAT,
            })
        })
        .collect();

    logging::debug(
        Component::Detect,
        None,
        &format!(
            "inversion: {} of {} days at confidence >= {}",
            inversions.len(),
            days.len(),
            query.min_confidence
        ),
    );

    Ok(InversionSet {
        total_count: inversions.len(),
        inversions,
        min_confidence: query.min_confidence,
        days_evaluated: days.len(),
        caveat: SET_CAVEAT,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detect::testutil::{FailingStore, at, aq, met};
    use crate::model::{Observation, WeatherObservation};
    use crate::store::MemoryStore;

    fn range() -> TimeRange {
        TimeRange::new(at(8, 0, 0), at(11, 23, 59))
    }

    struct DayShape {
        pm: fn(u32) -> f64,
        temp: fn(u32) -> f64,
        wind: f64,
        stability: Option<f64>,
    }

    fn day(d: u32, shape: &DayShape) -> (Vec<Observation>, Vec<WeatherObservation>) {
        (0..24)
            .map(|h| {
                let ts = at(d, h, 0);
                (
                    aq("s1", ts, (shape.pm)(h)),
                    met(ts, (shape.temp)(h), shape.wind, shape.stability),
                )
            })
            .unzip()
    }

    fn inversion_day() -> DayShape {
        DayShape {
            pm: |h| match h {
                12..=15 => 10.0,
                20..=23 => 30.0,
                _ => 15.0,
            },
            temp: |h| match h {
                15 => 30.0,
                20 => 20.0,
                _ => 25.0,
            },
            wind: 1.0,
            stability: Some(0.8),
        }
    }

    fn windy_day() -> DayShape {
        DayShape {
            pm: |_| 12.0,
            temp: |_| 18.0,
            wind: 6.0,
            stability: Some(0.1),
        }
    }

    fn store_of(days: &[(u32, DayShape)]) -> MemoryStore {
        let (mut aq_rows, mut met_rows) = (Vec::new(), Vec::new());
        for (d, shape) in days {
            let (a, m) = day(*d, shape);
            aq_rows.extend(a);
            met_rows.extend(m);
        }
        MemoryStore::new(aq_rows, met_rows)
    }

    #[test]
    fn test_all_indicators_give_full_confidence() {
        let store = store_of(&[(9, inversion_day()), (10, windy_day())]);
        let set = infer_inversion(&store, &InversionQuery::new(range())).unwrap();

        assert_eq!(set.days_evaluated, 2);
        assert_eq!(set.total_count, 1);
        let c = &set.inversions[0];
        assert_eq!(c.date, NaiveDate::from_ymd_opt(2024, 11, 9).unwrap());
        assert_eq!(c.confidence, 1.0);
        assert_eq!(c.indicators.count(), 4);
        assert_eq!(c.evidence.evening_cooling_c, Some(10.0));
        assert_eq!(c.evidence.night_pm_mean, Some(30.0));
        assert_eq!(c.caveat, "No vertical profile available");
    }

    #[test]
    fn test_confidence_is_fraction_of_indicators() {
        // Inversion day but stable air missing: three of four.
        let shape = DayShape {
            stability: None,
            ..inversion_day()
        };
        let store = store_of(&[(9, shape)]);
        let set = infer_inversion(&store, &InversionQuery::new(range())).unwrap();

        assert_eq!(set.inversions[0].confidence, 0.75);
        assert!(!set.inversions[0].indicators.high_stability);
    }

    #[test]
    fn test_half_confidence_day_needs_lower_threshold() {
        // Evening buildup and cooling, but breezy and well mixed: two of four.
        let shape = DayShape {
            wind: 6.0,
            stability: Some(0.1),
            ..inversion_day()
        };
        let store = store_of(&[(9, shape)]);

        let set = infer_inversion(&store, &InversionQuery::new(range())).unwrap();
        assert_eq!(set.days_evaluated, 1);
        assert_eq!(set.total_count, 0, "0.5 is below the default 0.7");

        let query = InversionQuery {
            min_confidence: 0.5,
            ..InversionQuery::new(range())
        };
        let set = infer_inversion(&store, &query).unwrap();
        assert_eq!(set.total_count, 1);
        let c = &set.inversions[0];
        assert_eq!(c.confidence, 0.5);
        assert!(c.indicators.pm_buildup && c.indicators.evening_cooling);
        assert!(!c.indicators.low_wind && !c.indicators.high_stability);
    }

    #[test]
    fn test_min_confidence_is_inclusive() {
        let store = store_of(&[(9, inversion_day()), (10, windy_day())]);
        let query = InversionQuery {
            min_confidence: 0.0,
            ..InversionQuery::new(range())
        };
        let set = infer_inversion(&store, &query).unwrap();

        assert_eq!(set.total_count, 2, "0.0 admits every evaluated day");
        assert_eq!(set.inversions[1].confidence, 0.0);
        assert!(set.inversions[0].date < set.inversions[1].date);
    }

    #[test]
    fn test_missing_weather_counts_as_false() {
        let (aq_rows, _) = day(9, &inversion_day());
        let store = MemoryStore::new(aq_rows, vec![]);
        let query = InversionQuery {
            min_confidence: 0.25,
            ..InversionQuery::new(range())
        };
        let set = infer_inversion(&store, &query).unwrap();

        // Only PM buildup survives without weather.
        let c = &set.inversions[0];
        assert!(c.indicators.pm_buildup);
        assert_eq!(c.confidence, 0.25);
        assert_eq!(c.evidence.low_wind_fraction, 0.0);
        assert_eq!(c.evidence.evening_cooling_c, None);
    }

    #[test]
    fn test_serialized_type_field() {
        let store = store_of(&[(9, inversion_day())]);
        let set = infer_inversion(&store, &InversionQuery::new(range())).unwrap();
        let json = serde_json::to_value(&set).unwrap();

        assert_eq!(json["inversions"][0]["type"], "surface_inferred");
        assert_eq!(json["inversions"][0]["date"], "2024-11-09");
        assert_eq!(json["caveat"], SET_CAVEAT);
    }

    #[test]
    fn test_empty_range_evaluates_nothing() {
        let set = infer_inversion(&MemoryStore::default(), &InversionQuery::new(range())).unwrap();
        assert_eq!(set.days_evaluated, 0);
        assert!(set.inversions.is_empty());
    }

    #[test]
    fn test_store_failure_propagates() {
        assert!(matches!(
            infer_inversion(&FailingStore, &InversionQuery::new(range())),
            Err(DetectionError::DataUnavailable(_))
        ));
    }
}
