//! Random forest: bagged regression trees averaged together

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use crate::frame::FeatureFrame;
use crate::search::Configuration;
use crate::{Error, Result};

/// Bootstrap-aggregated ensemble of unpruned-by-default trees.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForest {
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Parameters this family understands.
    pub const PARAMS: &'static [&'static str] = &[
        "n_estimators",
        "max_depth",
        "min_samples_split",
        "min_samples_leaf",
        "random_state",
    ];

    /// Fit `n_estimators` trees, each on its own bootstrap sample.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` on bad parameters and `FitFailure` on an empty
    /// frame.
    pub fn fit(config: &Configuration, frame: &FeatureFrame) -> Result<Self> {
        let n_estimators = config.usize_or("n_estimators", 100)?;
        let params = TreeParams::from_config(config, None)?;
        let seed = config.seed_or("random_state", 42)?;

        let n = frame.n_rows();
        if n == 0 {
            return Err(Error::FitFailure("empty training frame".to_string()));
        }

        let mut rng = StdRng::seed_from_u64(seed);
        let mut trees = Vec::with_capacity(n_estimators);
        let mut sample = vec![0usize; n];
        for _ in 0..n_estimators {
            for slot in &mut sample {
                *slot = rng.gen_range(0..n);
            }
            trees.push(RegressionTree::fit(frame, frame.target(), &sample, params)?);
        }
        Ok(Self { trees })
    }

    /// Number of trees.
    #[must_use]
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Check that the forest has trees and every tree is well formed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for an empty forest or a malformed tree.
    pub fn validate(&self, n_features: usize) -> Result<()> {
        if self.trees.is_empty() {
            return Err(Error::InvalidInput("forest has no trees".to_string()));
        }
        self.trees.iter().try_for_each(|t| t.validate(n_features))
    }

    /// Average of the tree predictions.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / self.trees.len() as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeatureList;

    fn frame() -> FeatureFrame {
        let rows: Vec<Vec<f64>> = (0..40).map(|i| vec![f64::from(i)]).collect();
        let target = (0..40).map(|i| f64::from(i) * 2.0).collect();
        FeatureFrame::from_rows(FeatureList::new(["x"]).unwrap(), &rows, target).unwrap()
    }

    #[test]
    fn test_forest_is_seeded() {
        let config = Configuration::new().with("n_estimators", 10_i64);
        let a = RandomForest::fit(&config, &frame()).unwrap();
        let b = RandomForest::fit(&config, &frame()).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 10);
    }

    #[test]
    fn test_forest_tracks_trend() {
        let config = Configuration::new()
            .with("n_estimators", 20_i64)
            .with("max_depth", 4_i64);
        let forest = RandomForest::fit(&config, &frame()).unwrap();
        assert!(forest.predict_row(&[5.0]) < forest.predict_row(&[35.0]));
    }

    #[test]
    fn test_forest_rejects_zero_trees() {
        let config = Configuration::new().with("n_estimators", 0_i64);
        assert!(RandomForest::fit(&config, &frame()).is_err());
    }
}
