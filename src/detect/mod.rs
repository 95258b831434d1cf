/// Detection primitives over the observation store.
///
/// Each primitive takes a `&dyn TimeSeriesAccessor` and a typed query and
/// returns its result struct. Sparse or degenerate data is reported inside
/// the result (`status`, null statistics, a reason); the only `Err` is
/// `DetectionError::DataUnavailable`, raised when the accessor itself fails.
///
/// Primitives hold no state between calls, so identical queries over
/// unchanged data produce identical results.
///
/// - `exceedance` : periods whose mean corrected PM2.5 exceeds a standard
/// - `spikes`     : per-sensor rolling robust z-score outliers
/// - `correlation`: direct or partial (residualized) correlation
/// - `periods`    : Mann–Whitney comparison of two time ranges
/// - `inversion`  : surface-inferred inversion candidates per day
/// - `summary`    : single aggregate of a resampled metric

pub mod correlation;
pub mod exceedance;
pub mod inversion;
pub mod periods;
pub mod spikes;
pub mod summary;

use serde::Serialize;

pub use correlation::{Control, CorrelationQuery, CorrelationResult, CorrelationStatus, correlate};
pub use exceedance::{Exceedance, ExceedanceQuery, ExceedanceSet, detect_exceedances};
pub use inversion::{InversionCandidate, InversionQuery, InversionSet, infer_inversion};
pub use periods::{ComparisonStatus, PeriodComparison, PeriodQuery, compare_periods};
pub use spikes::{Spike, SpikeQuery, SpikeSet, detect_spikes};
pub use summary::{MetricSummary, SummaryQuery, metric_summary};

/// Any primitive's result, tagged with `kind` when serialized.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DetectionResult {
    ExceedanceSet(ExceedanceSet),
    SpikeSet(SpikeSet),
    Correlation(CorrelationResult),
    PeriodComparison(PeriodComparison),
    InversionCandidates(InversionSet),
    MetricSummary(MetricSummary),
}

impl From<ExceedanceSet> for DetectionResult {
    fn from(value: ExceedanceSet) -> Self {
        DetectionResult::ExceedanceSet(value)
    }
}

impl From<SpikeSet> for DetectionResult {
    fn from(value: SpikeSet) -> Self {
        DetectionResult::SpikeSet(value)
    }
}

impl From<CorrelationResult> for DetectionResult {
    fn from(value: CorrelationResult) -> Self {
        DetectionResult::Correlation(value)
    }
}

impl From<PeriodComparison> for DetectionResult {
    fn from(value: PeriodComparison) -> Self {
        DetectionResult::PeriodComparison(value)
    }
}

impl From<InversionSet> for DetectionResult {
    fn from(value: InversionSet) -> Self {
        DetectionResult::InversionCandidates(value)
    }
}

impl From<MetricSummary> for DetectionResult {
    fn from(value: MetricSummary) -> Self {
        DetectionResult::MetricSummary(value)
    }
}

pub const PM_UNIT: &str = "µg/m³";

#[cfg(test)]
pub(crate) mod testutil;
