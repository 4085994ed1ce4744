//! Regression error metrics
//!
//! All functions take `(y_true, y_pred)` of equal, non-zero length.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

fn check(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(Error::InvalidInput(format!(
            "{} targets but {} predictions",
            y_true.len(),
            y_pred.len()
        )));
    }
    if y_true.is_empty() {
        return Err(Error::InvalidInput(
            "metrics need at least one sample".to_string(),
        ));
    }
    Ok(())
}

#[allow(clippy::cast_precision_loss)]
fn mean(values: impl Iterator<Item = f64>, n: usize) -> f64 {
    values.sum::<f64>() / n as f64
}

/// Mean squared error.
///
/// # Errors
///
/// Returns `InvalidInput` on empty or mismatched inputs.
pub fn mse(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    Ok(mean(
        y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)),
        y_true.len(),
    ))
}

/// Root mean squared error.
///
/// # Errors
///
/// Returns `InvalidInput` on empty or mismatched inputs.
pub fn rmse(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    mse(y_true, y_pred).map(f64::sqrt)
}

/// Mean absolute error.
///
/// # Errors
///
/// Returns `InvalidInput` on empty or mismatched inputs.
pub fn mae(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    Ok(mean(
        y_true.iter().zip(y_pred).map(|(t, p)| (t - p).abs()),
        y_true.len(),
    ))
}

/// Coefficient of determination.
///
/// A constant target yields `1.0` for a perfect prediction and `0.0`
/// otherwise.
///
/// # Errors
///
/// Returns `InvalidInput` on empty or mismatched inputs.
pub fn r2(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    let y_mean = mean(y_true.iter().copied(), y_true.len());
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - y_mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Held-out evaluation of a fitted model.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Root mean squared error
    pub rmse: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Coefficient of determination
    pub r2: f64,
}

impl RegressionMetrics {
    /// Compute all metrics at once.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on empty or mismatched inputs.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        Ok(Self {
            rmse: rmse(y_true, y_pred)?,
            mae: mae(y_true, y_pred)?,
            r2: r2(y_true, y_pred)?,
        })
    }

    /// Mean squared error, derived from RMSE.
    #[must_use]
    pub fn mse(&self) -> f64 {
        self.rmse * self.rmse
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_perfect_prediction() {
        let y = [1.0, 2.0, 3.0];
        let m = RegressionMetrics::compute(&y, &y).unwrap();
        assert_eq!(m.rmse, 0.0);
        assert_eq!(m.mae, 0.0);
        assert!((m.r2 - 1.0).abs() < f64::EPSILON);
    }

    #[test]
    fn test_known_values() {
        let y_true = [3.0, -0.5, 2.0, 7.0];
        let y_pred = [2.5, 0.0, 2.0, 8.0];
        assert!((mse(&y_true, &y_pred).unwrap() - 0.375).abs() < 1e-12);
        assert!((mae(&y_true, &y_pred).unwrap() - 0.5).abs() < 1e-12);
        assert!((r2(&y_true, &y_pred).unwrap() - 0.948_608_137_044_967_9).abs() < 1e-12);
    }

    #[test]
    fn test_constant_target() {
        assert_eq!(r2(&[2.0, 2.0], &[2.0, 2.0]).unwrap(), 1.0);
        assert_eq!(r2(&[2.0, 2.0], &[1.0, 3.0]).unwrap(), 0.0);
    }

    #[test]
    fn test_rejects_bad_input() {
        assert!(rmse(&[], &[]).is_err());
        assert!(mae(&[1.0], &[1.0, 2.0]).is_err());
    }
}
