/// Statistical building blocks for QA/QC and detection.
///
/// Submodules:
/// - `robust`    : median/MAD estimators, MAD outlier flags, rolling robust z-scores.
/// - `hypothesis`: Pearson/Spearman with p-values, Mann–Whitney U.
/// - `regression`: dummy-coded OLS residualization for partial correlation.

pub mod hypothesis;
pub mod regression;
pub mod robust;

pub use hypothesis::{CorrelationMethod, StatsError};
