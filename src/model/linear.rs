//! Ordinary least squares / ridge regression via the normal equations

use serde::{Deserialize, Serialize};

use crate::frame::FeatureFrame;
use crate::search::Configuration;
use crate::{Error, Result};

/// Pivots below this (on the unit-diagonal scaled system) count as zero.
const PIVOT_TOLERANCE: f64 = 1e-10;

/// `y = intercept + Σ coefficients[j] * x[j]`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearModel {
    coefficients: Vec<f64>,
    intercept: f64,
}

impl LinearModel {
    /// Parameters this family understands.
    pub const PARAMS: &'static [&'static str] = &["fit_intercept", "alpha"];

    /// Solve `(XᵀX + αI) w = Xᵀy` on centred data.
    ///
    /// Constant or linearly dependent columns get a zero coefficient
    /// instead of failing the fit.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a negative `alpha`, and `FitFailure` for an
    /// empty frame or non-finite values.
    #[allow(clippy::cast_precision_loss, clippy::needless_range_loop)]
    pub fn fit(config: &Configuration, frame: &FeatureFrame) -> Result<Self> {
        let fit_intercept = config.bool_or("fit_intercept", true)?;
        let alpha = config.f64_or("alpha", 0.0)?;
        if alpha < 0.0 {
            return Err(Error::InvalidInput(format!(
                "alpha must be non-negative, got {alpha}"
            )));
        }

        let (n, d) = (frame.n_rows(), frame.n_features());
        if n == 0 {
            return Err(Error::FitFailure("empty training frame".to_string()));
        }
        let y = frame.target();
        if y.iter().any(|v| !v.is_finite()) || frame.rows().flatten().any(|v| !v.is_finite()) {
            return Err(Error::FitFailure(
                "non-finite value in training data".to_string(),
            ));
        }

        let (x_mean, y_mean) = if fit_intercept {
            let mut means = vec![0.0; d];
            for row in frame.rows() {
                for (m, v) in means.iter_mut().zip(row) {
                    *m += v;
                }
            }
            means.iter_mut().for_each(|m| *m /= n as f64);
            (means, y.iter().sum::<f64>() / n as f64)
        } else {
            (vec![0.0; d], 0.0)
        };

        let mut gram = vec![vec![0.0; d]; d];
        let mut rhs = vec![0.0; d];
        for (row, &target) in frame.rows().zip(y) {
            let centred: Vec<f64> = row.iter().zip(&x_mean).map(|(v, m)| v - m).collect();
            let yc = target - y_mean;
            for i in 0..d {
                rhs[i] += centred[i] * yc;
                for j in i..d {
                    gram[i][j] += centred[i] * centred[j];
                }
            }
        }
        for i in 0..d {
            gram[i][i] += alpha;
            for j in 0..i {
                gram[i][j] = gram[j][i];
            }
        }

        let coefficients = solve_scaled(gram, rhs)?;
        let intercept = y_mean
            - coefficients
                .iter()
                .zip(&x_mean)
                .map(|(w, m)| w * m)
                .sum::<f64>();

        Ok(Self {
            coefficients,
            intercept,
        })
    }

    /// Fitted coefficients in feature order.
    #[must_use]
    pub fn coefficients(&self) -> &[f64] {
        &self.coefficients
    }

    /// Fitted intercept.
    #[must_use]
    pub const fn intercept(&self) -> f64 {
        self.intercept
    }

    /// Check that there is one finite coefficient per feature.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on a count mismatch or a non-finite term.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.coefficients.len() != n_features {
            return Err(Error::InvalidInput(format!(
                "{} coefficients for {n_features} features",
                self.coefficients.len()
            )));
        }
        if !self.intercept.is_finite() || self.coefficients.iter().any(|w| !w.is_finite()) {
            return Err(Error::InvalidInput(
                "linear model has non-finite terms".to_string(),
            ));
        }
        Ok(())
    }

    /// Linear prediction for one row.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.intercept
            + self
                .coefficients
                .iter()
                .zip(row)
                .map(|(w, x)| w * x)
                .sum::<f64>()
    }
}

/// Gaussian elimination with partial pivoting on the Jacobi-scaled system.
///
/// Columns whose pivot vanishes are free variables and are pinned to zero,
/// which still yields a least-squares solution of the normal equations.
#[allow(clippy::needless_range_loop)]
fn solve_scaled(mut a: Vec<Vec<f64>>, mut b: Vec<f64>) -> Result<Vec<f64>> {
    let d = b.len();
    let scale: Vec<f64> = (0..d)
        .map(|i| {
            let diag = a[i][i].sqrt();
            if diag > 0.0 { 1.0 / diag } else { 0.0 }
        })
        .collect();
    for i in 0..d {
        b[i] *= scale[i];
        for j in 0..d {
            a[i][j] *= scale[i] * scale[j];
        }
    }

    let mut pivot_cols: Vec<usize> = Vec::with_capacity(d);
    let mut row = 0;
    for col in 0..d {
        if row == d {
            break;
        }
        let best = (row..d)
            .max_by(|&p, &q| a[p][col].abs().total_cmp(&a[q][col].abs()))
            .unwrap_or(row);
        if a[best][col].abs() < PIVOT_TOLERANCE {
            continue;
        }
        a.swap(row, best);
        b.swap(row, best);
        for r in row + 1..d {
            let factor = a[r][col] / a[row][col];
            if factor != 0.0 {
                for c in col..d {
                    a[r][c] -= factor * a[row][c];
                }
                b[r] -= factor * b[row];
            }
        }
        pivot_cols.push(col);
        row += 1;
    }

    let mut w = vec![0.0; d];
    for (r, &col) in pivot_cols.iter().enumerate().rev() {
        let tail: f64 = (col + 1..d).map(|c| a[r][c] * w[c]).sum();
        w[col] = (b[r] - tail) / a[r][col];
    }

    if w.iter().any(|v| !v.is_finite()) {
        return Err(Error::FitFailure(
            "normal equations produced non-finite coefficients".to_string(),
        ));
    }
    Ok(w.iter().zip(&scale).map(|(v, s)| v * s).collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeatureList;

    fn frame(rows: &[Vec<f64>], target: Vec<f64>) -> FeatureFrame {
        let names: Vec<String> = (0..rows[0].len()).map(|i| format!("x{i}")).collect();
        FeatureFrame::from_rows(FeatureList::new(names).unwrap(), rows, target).unwrap()
    }

    #[test]
    fn test_recovers_exact_plane() {
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![f64::from(i), f64::from((i * 7) % 11)])
            .collect();
        let target = rows.iter().map(|r| 5.0 + 2.0 * r[0] - 3.0 * r[1]).collect();
        let model = LinearModel::fit(&Configuration::new(), &frame(&rows, target)).unwrap();

        assert!((model.intercept() - 5.0).abs() < 1e-8);
        assert!((model.coefficients()[0] - 2.0).abs() < 1e-8);
        assert!((model.coefficients()[1] + 3.0).abs() < 1e-8);
    }

    #[test]
    fn test_constant_and_duplicate_columns_do_not_fail() {
        let rows: Vec<Vec<f64>> = (0..10)
            .map(|i| vec![f64::from(i), 1.0, f64::from(i)])
            .collect();
        let target: Vec<f64> = rows.iter().map(|r| 4.0 * r[0]).collect();
        let model = LinearModel::fit(&Configuration::new(), &frame(&rows, target)).unwrap();
        assert!((model.predict_row(&[3.0, 1.0, 3.0]) - 12.0).abs() < 1e-8);
    }

    #[test]
    fn test_ridge_shrinks() {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let target: Vec<f64> = rows.iter().map(|r| 2.0 * r[0]).collect();
        let data = frame(&rows, target);
        let ols = LinearModel::fit(&Configuration::new(), &data).unwrap();
        let ridge = LinearModel::fit(&Configuration::new().with("alpha", 50.0), &data).unwrap();
        assert!(ridge.coefficients()[0].abs() < ols.coefficients()[0].abs());
    }

    #[test]
    fn test_non_finite_data_fails() {
        let data = frame(&[vec![1.0], vec![f64::NAN]], vec![1.0, 2.0]);
        assert!(matches!(
            LinearModel::fit(&Configuration::new(), &data),
            Err(Error::FitFailure(_))
        ));
    }
}
