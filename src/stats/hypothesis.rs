//! Correlation coefficients and rank tests with two-sided p-values.
//!
//! p-values come from `statrs` distributions: Student's t for both
//! correlation coefficients, and either the exact null distribution or the
//! tie-corrected normal approximation for Mann–Whitney U.

use serde::{Deserialize, Serialize};
use statrs::distribution::{ContinuousCDF, Normal, StudentsT};
use std::cmp::Ordering::Equal;
use thiserror::Error;

/// Errors from the numeric routines. Callers at the detection layer turn
/// these into "failed" result values; they never cross the tool boundary as
/// errors.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StatsError {
    #[error("need at least {needed} samples, got {got}")]
    TooFewSamples { needed: usize, got: usize },
    #[error("samples have different lengths ({0} vs {1})")]
    LengthMismatch(usize, usize),
    #[error("input has zero variance; correlation is undefined")]
    ConstantInput,
    #[error("regression failed: {0}")]
    Regression(String),
    #[error("distribution error: {0}")]
    Distribution(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CorrelationMethod {
    Spearman,
    Pearson,
}

impl CorrelationMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            CorrelationMethod::Spearman => "spearman",
            CorrelationMethod::Pearson => "pearson",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CorrelationEstimate {
    pub coefficient: f64,
    pub p_value: f64,
    pub n: usize,
}

// ============================================================================
// Correlation
// ============================================================================

pub fn correlation(
    method: CorrelationMethod,
    x: &[f64],
    y: &[f64],
) -> Result<CorrelationEstimate, StatsError> {
    match method {
        CorrelationMethod::Pearson => pearson(x, y),
        CorrelationMethod::Spearman => spearman(x, y),
    }
}

/// Pearson product-moment correlation with a two-sided t-test p-value.
pub fn pearson(x: &[f64], y: &[f64]) -> Result<CorrelationEstimate, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch(x.len(), y.len()));
    }
    let n = x.len();
    if n < 3 {
        return Err(StatsError::TooFewSamples { needed: 3, got: n });
    }

    let mean_x = x.iter().sum::<f64>() / n as f64;
    let mean_y = y.iter().sum::<f64>() / n as f64;

    let (mut sxx, mut syy, mut sxy) = (0.0, 0.0, 0.0);
    for (xi, yi) in x.iter().zip(y) {
        let dx = xi - mean_x;
        let dy = yi - mean_y;
        sxx += dx * dx;
        syy += dy * dy;
        sxy += dx * dy;
    }
    if sxx == 0.0 || syy == 0.0 {
        return Err(StatsError::ConstantInput);
    }

    let r = (sxy / (sxx.sqrt() * syy.sqrt())).clamp(-1.0, 1.0);
    let p_value = correlation_p_value(r, n)?;

    Ok(CorrelationEstimate {
        coefficient: r,
        p_value,
        n,
    })
}

/// Spearman rank correlation: Pearson on average ranks, same p-value model.
pub fn spearman(x: &[f64], y: &[f64]) -> Result<CorrelationEstimate, StatsError> {
    if x.len() != y.len() {
        return Err(StatsError::LengthMismatch(x.len(), y.len()));
    }
    pearson(&rank_average(x), &rank_average(y))
}

fn correlation_p_value(r: f64, n: usize) -> Result<f64, StatsError> {
    if r.abs() >= 1.0 {
        return Ok(0.0);
    }
    let df = (n - 2) as f64;
    let t = r * (df / (1.0 - r * r)).sqrt();
    let dist = StudentsT::new(0.0, 1.0, df).map_err(|e| StatsError::Distribution(e.to_string()))?;
    Ok((2.0 * dist.sf(t.abs())).min(1.0))
}

/// 1-based ranks, ties receiving the mean of the ranks they span.
pub fn rank_average(values: &[f64]) -> Vec<f64> {
    let mut order: Vec<usize> = (0..values.len()).collect();
    order.sort_by(|&a, &b| values[a].partial_cmp(&values[b]).unwrap_or(Equal));

    let mut ranks = vec![0.0; values.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && values[order[j + 1]] == values[order[i]] {
            j += 1;
        }
        // positions i..=j share ranks i+1..=j+1
        let shared = (i + j) as f64 / 2.0 + 1.0;
        for &idx in &order[i..=j] {
            ranks[idx] = shared;
        }
        i = j + 1;
    }
    ranks
}

// ============================================================================
// Mann–Whitney U
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MannWhitneyMethod {
    Exact,
    Asymptotic,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MannWhitney {
    /// U statistic of the first sample.
    pub statistic: f64,
    /// Two-sided p-value.
    pub p_value: f64,
    pub method: MannWhitneyMethod,
}

/// Largest sample size for which the exact null distribution is used
/// (when the other sample is larger, and neither has ties).
const EXACT_MAX_SMALLER_SAMPLE: usize = 8;

/// Two-sided Mann–Whitney U test.
///
/// Uses the exact null distribution when there are no ties and at least one
/// sample has at most 8 values; otherwise the normal approximation with tie
/// correction and continuity correction.
pub fn mann_whitney_u(a: &[f64], b: &[f64]) -> Result<MannWhitney, StatsError> {
    let (n1, n2) = (a.len(), b.len());
    if n1 == 0 || n2 == 0 {
        return Err(StatsError::TooFewSamples {
            needed: 1,
            got: n1.min(n2),
        });
    }

    let combined: Vec<f64> = a.iter().chain(b).copied().collect();
    let ranks = rank_average(&combined);
    let rank_sum_a: f64 = ranks[..n1].iter().sum();

    let u1 = rank_sum_a - (n1 * (n1 + 1)) as f64 / 2.0;
    let u2 = (n1 * n2) as f64 - u1;
    let u = u1.max(u2);

    let tie_sizes = tie_group_sizes(&combined);
    let has_ties = tie_sizes.iter().any(|&t| t > 1);

    let exact = !has_ties && (n1 <= EXACT_MAX_SMALLER_SAMPLE || n2 <= EXACT_MAX_SMALLER_SAMPLE);
    let (p_value, method) = if exact {
        (2.0 * exact_u_sf(u, n1, n2), MannWhitneyMethod::Exact)
    } else {
        (asymptotic_p(u, n1, n2, &tie_sizes)?, MannWhitneyMethod::Asymptotic)
    };

    Ok(MannWhitney {
        statistic: u1,
        p_value: p_value.clamp(0.0, 1.0),
        method,
    })
}

fn tie_group_sizes(values: &[f64]) -> Vec<usize> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(Equal));

    let mut sizes = Vec::new();
    let mut i = 0;
    while i < sorted.len() {
        let mut j = i + 1;
        while j < sorted.len() && sorted[j] == sorted[i] {
            j += 1;
        }
        sizes.push(j - i);
        i = j;
    }
    sizes
}

fn asymptotic_p(u: f64, n1: usize, n2: usize, tie_sizes: &[usize]) -> Result<f64, StatsError> {
    let n = (n1 + n2) as f64;
    let mu = (n1 * n2) as f64 / 2.0;
    let tie_term: f64 = tie_sizes
        .iter()
        .map(|&t| {
            let t = t as f64;
            t * t * t - t
        })
        .sum();
    let variance = (n1 * n2) as f64 / 12.0 * ((n + 1.0) - tie_term / (n * (n - 1.0)));
    if variance <= 0.0 {
        // every value tied: no evidence of a shift
        return Ok(1.0);
    }

    let z = (u - mu - 0.5) / variance.sqrt();
    let normal = Normal::new(0.0, 1.0).map_err(|e| StatsError::Distribution(e.to_string()))?;
    Ok(2.0 * normal.sf(z))
}

/// P(U >= u) under the null, from the exact distribution of U.
fn exact_u_sf(u: f64, n1: usize, n2: usize) -> f64 {
    let counts = u_null_counts(n1, n2);
    let total: f64 = counts.iter().sum();
    let from = u.round().max(0.0) as usize;
    if from >= counts.len() {
        return 0.0;
    }
    counts[from..].iter().sum::<f64>() / total
}

/// Number of rank arrangements producing each U value, for U in 0..=n1*n2.
///
/// These are the coefficients of the Gaussian binomial
/// `prod_{i=1..m} (1 - q^(n+i)) / (1 - q^i)` with `m = min(n1, n2)`.
fn u_null_counts(n1: usize, n2: usize) -> Vec<f64> {
    let (m, n) = if n1 <= n2 { (n1, n2) } else { (n2, n1) };
    let max_u = m * n;
    let mut coeffs = vec![0.0; max_u + 1];
    coeffs[0] = 1.0;

    for i in 1..=m {
        let shift = n + i;
        if shift <= max_u {
            for k in (shift..=max_u).rev() {
                coeffs[k] -= coeffs[k - shift];
            }
        }
        for k in i..=max_u {
            coeffs[k] += coeffs[k - i];
        }
    }
    coeffs
}

// ============================================================================
// Tests
// ============================================================================
