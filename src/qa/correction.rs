/// Per-reading correction and validation for dual-channel PurpleAir sensors.
///
/// A PurpleAir unit carries two laser counters (channels A and B). Each
/// reading is averaged across channels, checked for channel agreement,
/// corrected with the EPA Barkjohn (2021) model, and tagged with QA flags
/// for humidity, outliers against recent history, and staleness.
///
/// Nothing here fails: every condition degrades to a flag on the result.

use crate::config::QaConfig;
use crate::model::QaFlags;
use crate::qa::staleness::{data_age_hours, is_stale_at};
use crate::stats::robust::detect_outliers_mad;
use chrono::{DateTime, Utc};
use serde::Serialize;

/// Above this RH the optical sizing bias is large enough to flag, whatever
/// the configured threshold.
pub const HIGH_HUMIDITY_FLOOR: f64 = 85.0;

/// Prior corrected values required before the outlier check runs.
pub const MIN_OUTLIER_HISTORY: usize = 5;

pub const CORRECTION_METHOD: &str = "barkjohn";

// ---------------------------------------------------------------------------
// Barkjohn correction
// ---------------------------------------------------------------------------

/// EPA US-wide PurpleAir correction (Barkjohn et al., 2021).
///
/// With humidity in [0, 100]: `0.52·raw − 0.085·RH + 5.71`.
/// Without usable humidity: `0.52·raw + 3.86`.
/// The result is clamped at zero.
pub fn correct_pm25(raw: f64, humidity: Option<f64>) -> f64 {
    let corrected = match usable_humidity(humidity) {
        Some(rh) => 0.52 * raw - 0.085 * rh + 5.71,
        None => 0.52 * raw + 3.86,
    };
    corrected.max(0.0)
}

fn usable_humidity(humidity: Option<f64>) -> Option<f64> {
    humidity.filter(|rh| (0.0..=100.0).contains(rh))
}

// ---------------------------------------------------------------------------
// A/B channel agreement
// ---------------------------------------------------------------------------

/// Returns `(is_valid, |A − B|)`.
///
/// Channels agree when the difference is within `abs_threshold` µg/m³ OR
/// within `rel_threshold` of the channel mean. The relative check passes
/// trivially when the mean is not positive.
pub fn validate_ab_channels(
    channel_a: f64,
    channel_b: f64,
    abs_threshold: f64,
    rel_threshold: f64,
) -> (bool, f64) {
    let mean = (channel_a + channel_b) / 2.0;
    let diff = (channel_a - channel_b).abs();

    let abs_ok = diff <= abs_threshold;
    let rel_ok = if mean > 0.0 { diff <= rel_threshold * mean } else { true };

    (abs_ok || rel_ok, diff)
}

// ---------------------------------------------------------------------------
// Full validation
// ---------------------------------------------------------------------------

/// What the validator observed, for audit alongside the flags.
///
/// Optional fields are present only when the corresponding flag was set.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidationMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ab_difference: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub humidity: Option<f64>,
    pub correction_method: &'static str,
    /// Whether the humidity term of the correction was applied.
    pub humidity_used: bool,
    pub outlier: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data_age_hours: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ValidatedReading {
    /// Mean of channels A and B.
    pub raw: f64,
    /// Barkjohn-corrected value, always >= 0.
    pub corrected: f64,
    pub flags: QaFlags,
    pub metadata: ValidationMetadata,
}

/// Averages, checks, corrects and flags one dual-channel reading.
///
/// `history` holds recent corrected values from the same sensor, oldest
/// first; the outlier check runs only when at least five are supplied.
pub fn validate_reading(
    channel_a: f64,
    channel_b: f64,
    humidity: Option<f64>,
    ts: DateTime<Utc>,
    now: DateTime<Utc>,
    config: &QaConfig,
    history: Option<&[f64]>,
) -> ValidatedReading {
    let mut flags = QaFlags::NONE;
    let raw = (channel_a + channel_b) / 2.0;

    let (ab_ok, ab_diff) = validate_ab_channels(
        channel_a,
        channel_b,
        config.ab_diff_absolute,
        config.ab_diff_relative,
    );
    let mut ab_difference = None;
    if !ab_ok {
        flags |= QaFlags::AB_MISMATCH;
        ab_difference = Some(ab_diff);
    }

    let mut flagged_humidity = None;
    if let Some(rh) = humidity {
        if rh > config.high_humidity_threshold && rh > HIGH_HUMIDITY_FLOOR {
            flags |= QaFlags::HIGH_HUMIDITY;
            flagged_humidity = Some(rh);
        }
    }

    let corrected = correct_pm25(raw, humidity);

    let mut outlier = false;
    if let Some(prior) = history.filter(|h| h.len() >= MIN_OUTLIER_HISTORY) {
        let mut values = prior.to_vec();
        values.push(corrected);
        outlier = detect_outliers_mad(&values, config.spike_threshold)
            .last()
            .copied()
            .unwrap_or(false);
        if outlier {
            flags |= QaFlags::OUTLIER;
        }
    }

    let mut stale_age = None;
    if is_stale_at(ts, config.stale_data_hours, now) {
        flags |= QaFlags::STALE_DATA;
        stale_age = Some(data_age_hours(ts, now));
    }

    ValidatedReading {
        raw,
        corrected,
        flags,
        metadata: ValidationMetadata {
            ab_difference,
            humidity: flagged_humidity,
            correction_method: CORRECTION_METHOD,
            humidity_used: usable_humidity(humidity).is_some(),
            outlier,
            data_age_hours: stale_age,
        },
    }
}

// ---------------------------------------------------------------------------
// Scoring and description
// ---------------------------------------------------------------------------

const PENALTIES: [(QaFlags, f64); 6] = [
    (QaFlags::AB_MISMATCH, 0.2),
    (QaFlags::HIGH_HUMIDITY, 0.1),
    (QaFlags::OUTLIER, 0.3),
    (QaFlags::STALE_DATA, 0.2),
    (QaFlags::SENSOR_OFFLINE, 1.0),
    (QaFlags::MAINTENANCE, 0.5),
];

/// 1.0 minus the summed penalty of every set flag, floored at 0.0.
pub fn quality_score(flags: QaFlags) -> f64 {
    let penalty: f64 = PENALTIES
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, p)| p)
        .sum();
    (1.0 - penalty).max(0.0)
}

/// Human-readable description of each set flag, or `["No issues"]`.
pub fn summarize_qa_flags(flags: QaFlags) -> Vec<&'static str> {
    let described = [
        (QaFlags::AB_MISMATCH, "A/B channel disagreement"),
        (QaFlags::HIGH_HUMIDITY, "High humidity (>85%)"),
        (QaFlags::OUTLIER, "Statistical outlier"),
        (QaFlags::STALE_DATA, "Stale data"),
        (QaFlags::SENSOR_OFFLINE, "Sensor offline"),
        (QaFlags::MAINTENANCE, "Maintenance period"),
    ];
    let mut out: Vec<&'static str> = described
        .iter()
        .filter(|(flag, _)| flags.contains(*flag))
        .map(|(_, text)| *text)
        .collect();
    if out.is_empty() {
        out.push("No issues");
    }
    out
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
