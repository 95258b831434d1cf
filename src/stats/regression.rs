//! Least-squares residualization on categorical controls.
//!
//! Partial correlation is computed by regressing each variable on the same
//! dummy-coded design (intercept plus treatment-coded levels of every
//! control) and correlating the residuals.

use super::hypothesis::StatsError;
use nalgebra::{DMatrix, DVector};
use std::collections::BTreeSet;

/// Dense row-major design matrix.
#[derive(Debug, Clone, PartialEq)]
pub struct DesignMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f64>,
}

impl DesignMatrix {
    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }
}

/// Builds an intercept + dummy design from categorical columns.
///
/// Each entry of `columns` holds one category code per row. Levels are the
/// distinct codes observed, in ascending order; the first level is the
/// reference and gets no column. A control with a single observed level
/// therefore contributes nothing.
pub fn dummy_design(columns: &[Vec<u32>], rows: usize) -> DesignMatrix {
    let level_sets: Vec<Vec<u32>> = columns
        .iter()
        .map(|col| col.iter().copied().collect::<BTreeSet<_>>().into_iter().skip(1).collect())
        .collect();
    let cols = 1 + level_sets.iter().map(Vec::len).sum::<usize>();

    let mut data = Vec::with_capacity(rows * cols);
    for row in 0..rows {
        data.push(1.0);
        for (col, levels) in columns.iter().zip(&level_sets) {
            for level in levels {
                data.push(if col[row] == *level { 1.0 } else { 0.0 });
            }
        }
    }

    DesignMatrix { rows, cols, data }
}

/// Residuals `y - X·beta` of the ordinary least-squares fit of `y` on `x`.
///
/// Solved through the SVD so rank-deficient designs (collinear controls)
/// fall back to the minimum-norm solution. Fails when there are no residual
/// degrees of freedom or the decomposition does not converge.
pub fn ols_residuals(y: &[f64], x: &DesignMatrix) -> Result<Vec<f64>, StatsError> {
    if y.len() != x.rows {
        return Err(StatsError::LengthMismatch(y.len(), x.rows));
    }
    if x.rows <= x.cols {
        return Err(StatsError::Regression(format!(
            "design has {} parameters for only {} rows",
            x.cols, x.rows
        )));
    }
    if y.iter().chain(&x.data).any(|v| !v.is_finite()) {
        return Err(StatsError::Regression("non-finite value in regression input".into()));
    }

    let design = DMatrix::from_row_slice(x.rows, x.cols, &x.data);
    let target = DVector::from_column_slice(y);

    let svd = design.clone().svd(true, true);
    let max_sv = svd.singular_values.max();
    let eps = max_sv * (x.rows.max(x.cols) as f64) * f64::EPSILON;

    let beta: DVector<f64> = svd
        .solve(&target, eps)
        .map_err(|e| StatsError::Regression(e.to_string()))?;

    let fitted = design * beta;
    Ok((target - fitted).as_slice().to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_dummy_design_drops_reference_level() {
        let hours = vec![0, 1, 2, 1];
        let design = dummy_design(&[hours], 4);
        assert_eq!(design.cols(), 3); // intercept + levels 1, 2
        assert_eq!(
            design.data,
            vec![
                1.0, 0.0, 0.0, //
                1.0, 1.0, 0.0, //
                1.0, 0.0, 1.0, //
                1.0, 1.0, 0.0,
            ]
        );
    }

    #[test]
    fn test_single_level_control_adds_no_columns() {
        let design = dummy_design(&[vec![11, 11, 11]], 3);
        assert_eq!(design.cols(), 1);
    }

    #[test]
    fn test_residuals_remove_group_means() {
        // Two groups with means 2 and 11; residuals are deviations from them.
        let group = vec![0, 0, 0, 1, 1, 1];
        let y = [1.0, 2.0, 3.0, 10.0, 11.0, 12.0];
        let design = dummy_design(&[group], 6);
        let resid = ols_residuals(&y, &design).unwrap();
        let expected = [-1.0, 0.0, 1.0, -1.0, 0.0, 1.0];
        for (r, e) in resid.iter().zip(expected) {
            assert_relative_eq!(*r, e, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_collinear_controls_still_residualize() {
        // Two identical controls: rank-deficient but solvable.
        let group = vec![0, 0, 1, 1, 0, 1];
        let y = [1.0, 3.0, 10.0, 12.0, 2.0, 11.0];
        let design = dummy_design(&[group.clone(), group], 6);
        let resid = ols_residuals(&y, &design).unwrap();
        let expected = [-1.0, 1.0, -1.0, 1.0, 0.0, 0.0];
        for (r, e) in resid.iter().zip(expected) {
            assert_relative_eq!(*r, e, epsilon = 1e-8);
        }
    }

    #[test]
    fn test_saturated_design_is_rejected() {
        let design = dummy_design(&[vec![0, 1, 2]], 3);
        let err = ols_residuals(&[1.0, 2.0, 3.0], &design).unwrap_err();
        assert!(matches!(err, StatsError::Regression(_)));
    }
}
