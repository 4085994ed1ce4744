//! Signed scoring: higher is always better
//!
//! Error metrics are negated so the search can take the maximum regardless of
//! the metric's natural direction.

use serde::{Deserialize, Serialize};

use crate::metrics;
use crate::Result;

/// Score used to rank candidates during cross-validation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    /// `-RMSE`
    #[default]
    NegRootMeanSquaredError,
    /// `-MSE`
    NegMeanSquaredError,
    /// `-MAE`
    NegMeanAbsoluteError,
    /// `R²`
    R2,
}

impl Scoring {
    /// Score predictions against the truth.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on empty or mismatched inputs.
    pub fn score(self, y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
        match self {
            Self::NegRootMeanSquaredError => metrics::rmse(y_true, y_pred).map(|v| -v),
            Self::NegMeanSquaredError => metrics::mse(y_true, y_pred).map(|v| -v),
            Self::NegMeanAbsoluteError => metrics::mae(y_true, y_pred).map(|v| -v),
            Self::R2 => metrics::r2(y_true, y_pred),
        }
    }

    /// Name as written in configs and metadata.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::NegRootMeanSquaredError => "neg_root_mean_squared_error",
            Self::NegMeanSquaredError => "neg_mean_squared_error",
            Self::NegMeanAbsoluteError => "neg_mean_absolute_error",
            Self::R2 => "r2",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_better_predictions_score_higher() {
        let y = [10.0, 20.0, 30.0];
        let close = [11.0, 19.0, 30.0];
        let far = [0.0, 40.0, 10.0];
        for scoring in [
            Scoring::NegRootMeanSquaredError,
            Scoring::NegMeanSquaredError,
            Scoring::NegMeanAbsoluteError,
            Scoring::R2,
        ] {
            assert!(
                scoring.score(&y, &close).unwrap() > scoring.score(&y, &far).unwrap(),
                "{} is not higher-is-better",
                scoring.as_str()
            );
        }
    }

    #[test]
    fn test_serde_names() {
        let s: Scoring = serde_json::from_str("\"neg_root_mean_squared_error\"").unwrap();
        assert_eq!(s, Scoring::NegRootMeanSquaredError);
        assert_eq!(serde_json::to_string(&Scoring::R2).unwrap(), "\"r2\"");
    }
}
