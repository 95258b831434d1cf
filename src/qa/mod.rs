/// QA/QC for incoming sensor readings.
///
/// - `correction`: channel averaging, A/B agreement, Barkjohn correction,
///   outlier and staleness flags, quality score.
/// - `staleness` : clock-injected reading-age checks.

pub mod correction;
pub mod staleness;

pub use correction::{ValidatedReading, quality_score, summarize_qa_flags, validate_reading};
