//! Gradient boosting with squared loss
//!
//! Starts from the target mean and adds shallow trees fitted to the current
//! residuals, each shrunk by `learning_rate`. With `subsample < 1` every
//! stage sees a seeded random subset of rows (stochastic boosting).

use rand::rngs::StdRng;
use rand::seq::index;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use crate::frame::FeatureFrame;
use crate::search::Configuration;
use crate::{Error, Result};

/// Additive ensemble of residual-fitting trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    init: f64,
    learning_rate: f64,
    trees: Vec<RegressionTree>,
}

impl GradientBoosting {
    /// Parameters this family understands.
    pub const PARAMS: &'static [&'static str] = &[
        "n_estimators",
        "learning_rate",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "subsample",
        "random_state",
    ];

    /// Fit `n_estimators` boosting stages.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on bad parameters and `FitFailure` on an empty
    /// frame or a diverging fit.
    #[allow(
        clippy::cast_precision_loss,
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss
    )]
    pub fn fit(config: &Configuration, frame: &FeatureFrame) -> Result<Self> {
        let n_estimators = config.usize_or("n_estimators", 100)?;
        let learning_rate = config.f64_or("learning_rate", 0.1)?;
        let subsample = config.f64_or("subsample", 1.0)?;
        let params = TreeParams::from_config(config, Some(3))?;
        let seed = config.seed_or("random_state", 42)?;

        if learning_rate <= 0.0 {
            return Err(Error::InvalidInput(format!(
                "learning_rate must be positive, got {learning_rate}"
            )));
        }
        if !(subsample > 0.0 && subsample <= 1.0) {
            return Err(Error::InvalidInput(format!(
                "subsample must be in (0, 1], got {subsample}"
            )));
        }

        let n = frame.n_rows();
        if n == 0 {
            return Err(Error::FitFailure("empty training frame".to_string()));
        }
        let y = frame.target();
        let init = y.iter().sum::<f64>() / n as f64;
        let mut fitted = vec![init; n];
        let mut residuals = vec![0.0; n];
        let sample_size = ((subsample * n as f64).ceil() as usize).clamp(1, n);
        let all_rows: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(seed);

        let mut trees = Vec::with_capacity(n_estimators);
        for stage in 0..n_estimators {
            for ((r, t), f) in residuals.iter_mut().zip(y).zip(&fitted) {
                *r = t - f;
            }
            let tree = if sample_size < n {
                let rows = index::sample(&mut rng, n, sample_size).into_vec();
                RegressionTree::fit(frame, &residuals, &rows, params)?
            } else {
                RegressionTree::fit(frame, &residuals, &all_rows, params)?
            };
            for (i, f) in fitted.iter_mut().enumerate() {
                *f += learning_rate * tree.predict_row(frame.row(i));
            }
            if fitted.iter().any(|f| !f.is_finite()) {
                return Err(Error::FitFailure(format!(
                    "predictions diverged at stage {stage}"
                )));
            }
            trees.push(tree);
        }

        Ok(Self {
            init,
            learning_rate,
            trees,
        })
    }

    /// Number of boosting stages.
    #[must_use]
    pub fn n_stages(&self) -> usize {
        self.trees.len()
    }

    /// Check the stages and the scalar terms.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for no stages, non-finite terms or a
    /// malformed tree.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::InvalidInput("boosting model has no stages".to_string()));
        }
        if !self.init.is_finite() || !self.learning_rate.is_finite() {
            return Err(Error::InvalidInput(
                "boosting model has non-finite terms".to_string(),
            ));
        }
        self.trees.iter().try_for_each(|t| t.validate(n_features))
    }

    /// Initial prediction plus the shrunk sum of stage predictions.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.init
            + self.learning_rate * self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeatureList;
    use crate::metrics;

    fn frame() -> FeatureFrame {
        let rows: Vec<Vec<f64>> = (0..50).map(|i| vec![f64::from(i), f64::from(i % 5)]).collect();
        let target = (0..50)
            .map(|i| 3.0 * f64::from(i) + 10.0 * f64::from(i % 5))
            .collect();
        FeatureFrame::from_rows(FeatureList::new(["x", "z"]).unwrap(), &rows, target).unwrap()
    }

    fn training_rmse(model: &GradientBoosting, frame: &FeatureFrame) -> f64 {
        let preds: Vec<f64> = frame.rows().map(|r| model.predict_row(r)).collect();
        metrics::rmse(frame.target(), &preds).unwrap()
    }

    #[test]
    fn test_more_stages_fit_better() {
        let frame = frame();
        let few = GradientBoosting::fit(&Configuration::new().with("n_estimators", 5_i64), &frame)
            .unwrap();
        let many =
            GradientBoosting::fit(&Configuration::new().with("n_estimators", 100_i64), &frame)
                .unwrap();
        assert_eq!(many.n_stages(), 100);
        assert!(training_rmse(&many, &frame) < training_rmse(&few, &frame));
    }

    #[test]
    fn test_subsample_is_seeded() {
        let config = Configuration::new()
            .with("n_estimators", 10_i64)
            .with("subsample", 0.5);
        assert_eq!(
            GradientBoosting::fit(&config, &frame()).unwrap(),
            GradientBoosting::fit(&config, &frame()).unwrap()
        );
    }

    #[test]
    fn test_rejects_bad_learning_rate() {
        let config = Configuration::new().with("learning_rate", 0.0);
        assert!(GradientBoosting::fit(&config, &frame()).is_err());
    }
}
