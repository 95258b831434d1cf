/// Reading staleness detection.
///
/// PurpleAir sensors report every two minutes and the ingest loop polls
/// every ten; a reading more than a couple of hours old means the sensor or
/// its uplink has stopped, and its value should not be presented as current.
///
/// # Clock injection
/// All functions take `now: DateTime<Utc>` instead of calling `Utc::now()`
/// internally, so staleness is deterministic in tests without mocking.

use chrono::{DateTime, Utc};

// ---------------------------------------------------------------------------
// Age and staleness
// ---------------------------------------------------------------------------

/// Age of a reading in fractional hours. Negative when `ts` is in the future.
pub fn data_age_hours(ts: DateTime<Utc>, now: DateTime<Utc>) -> f64 {
    (now - ts).num_milliseconds() as f64 / 3_600_000.0
}

/// Returns `true` if a reading taken at `ts` is older than `max_age_hours`.
///
/// Staleness is strictly greater than the threshold:
///   age >  max_age_hours  →  stale
///   age == max_age_hours  →  not stale
pub fn is_stale_at(ts: DateTime<Utc>, max_age_hours: f64, now: DateTime<Utc>) -> bool {
    data_age_hours(ts, now) > max_age_hours
}

/// Convenience wrapper that uses the real current time.
/// Use `is_stale_at` in tests to keep them deterministic.
pub fn is_stale(ts: DateTime<Utc>, max_age_hours: f64) -> bool {
    is_stale_at(ts, max_age_hours, Utc::now())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
