//! Regression model families and fitted predictors
//!
//! ```text
//! Regressor (trait) ──fit(Configuration, FeatureFrame)──> FittedModel
//!     └── ModelFamily { LinearRegression, DecisionTree, RandomForest, GradientBoosting }
//!
//! FittedModel = FeatureList + Predictor   (serializable, see crate::artifact)
//! ```
//!
//! The search engine only relies on the [`Regressor`] trait, so callers can
//! plug in their own families.

mod boosting;
mod forest;
mod linear;
mod tree;

pub use boosting::GradientBoosting;
pub use forest::RandomForest;
pub use linear::LinearModel;
pub use tree::{RegressionTree, TreeParams};

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::frame::{FeatureFrame, FeatureList, Record};
use crate::search::Configuration;
use crate::{Error, Result};

/// A model family that can be fitted with a hyperparameter configuration.
pub trait Regressor: Send + Sync {
    /// Family name, used for logging and default run names.
    fn name(&self) -> &str;

    /// Hyperparameters the family accepts.
    ///
    /// The search engine rejects spaces naming anything else before any fit
    /// runs. An empty slice accepts every name.
    fn accepted_params(&self) -> &[&'static str];

    /// Fit on every row of `frame`.
    ///
    /// # Errors
    ///
    /// Any error is treated as a fit failure by the search engine.
    fn fit(&self, config: &Configuration, frame: &FeatureFrame) -> Result<FittedModel>;
}

/// Built-in regression families.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ModelFamily {
    /// Ordinary least squares, optionally ridge-penalised
    LinearRegression,
    /// Single CART tree
    DecisionTree,
    /// Bagged CART trees
    RandomForest,
    /// Squared-loss gradient boosted trees
    GradientBoosting,
}

impl ModelFamily {
    /// Every built-in family.
    pub const ALL: [Self; 4] = [
        Self::LinearRegression,
        Self::DecisionTree,
        Self::RandomForest,
        Self::GradientBoosting,
    ];

    /// Config name of the family.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::LinearRegression => "linear_regression",
            Self::DecisionTree => "decision_tree",
            Self::RandomForest => "random_forest",
            Self::GradientBoosting => "gradient_boosting",
        }
    }
}

impl fmt::Display for ModelFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

const TREE_PARAMS: &[&str] = &["max_depth", "min_samples_split", "min_samples_leaf"];

impl Regressor for ModelFamily {
    fn name(&self) -> &str {
        self.as_str()
    }

    fn accepted_params(&self) -> &[&'static str] {
        match self {
            Self::LinearRegression => LinearModel::PARAMS,
            Self::DecisionTree => TREE_PARAMS,
            Self::RandomForest => RandomForest::PARAMS,
            Self::GradientBoosting => GradientBoosting::PARAMS,
        }
    }

    fn fit(&self, config: &Configuration, frame: &FeatureFrame) -> Result<FittedModel> {
        if let Some((name, _)) = config
            .iter()
            .find(|(name, _)| !self.accepted_params().contains(&name.as_str()))
        {
            return Err(Error::InvalidInput(format!(
                "{self} does not accept parameter '{name}'"
            )));
        }

        let predictor = match self {
            Self::LinearRegression => Predictor::Linear(LinearModel::fit(config, frame)?),
            Self::DecisionTree => {
                let rows: Vec<usize> = (0..frame.n_rows()).collect();
                let params = TreeParams::from_config(config, None)?;
                Predictor::Tree(RegressionTree::fit(frame, frame.target(), &rows, params)?)
            }
            Self::RandomForest => Predictor::Forest(RandomForest::fit(config, frame)?),
            Self::GradientBoosting => Predictor::Boosting(GradientBoosting::fit(config, frame)?),
        };
        Ok(FittedModel::new(frame.features().clone(), predictor))
    }
}

/// Fitted model internals, one variant per family.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Predictor {
    /// Linear model
    Linear(LinearModel),
    /// Single tree
    Tree(RegressionTree),
    /// Random forest
    Forest(RandomForest),
    /// Gradient boosting
    Boosting(GradientBoosting),
}

impl Predictor {
    /// Predict one row laid out in training feature order.
    #[must_use]
    pub fn predict_row(&self, row: &[f64]) -> f64 {
        match self {
            Self::Linear(m) => m.predict_row(row),
            Self::Tree(m) => m.predict_row(row),
            Self::Forest(m) => m.predict_row(row),
            Self::Boosting(m) => m.predict_row(row),
        }
    }
}

/// A predictor bound to the feature list it was trained on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedModel {
    features: FeatureList,
    predictor: Predictor,
}

impl FittedModel {
    /// Bind a predictor to its training feature list.
    #[must_use]
    pub const fn new(features: FeatureList, predictor: Predictor) -> Self {
        Self {
            features,
            predictor,
        }
    }

    /// Training-time feature list.
    #[must_use]
    pub const fn features(&self) -> &FeatureList {
        &self.features
    }

    /// Underlying predictor.
    #[must_use]
    pub const fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    /// Check that the predictor can be evaluated on rows of this model's
    /// feature list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` naming the first structural problem.
    pub fn validate(&self) -> Result<()> {
        let n = self.features.len();
        match &self.predictor {
            Predictor::Linear(m) => m.validate(n),
            Predictor::Tree(m) => m.validate(n),
            Predictor::Forest(m) => m.validate(n),
            Predictor::Boosting(m) => m.validate(n),
        }
    }

    /// Predict the sale price of one record.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if the record's fields differ from the training
    /// feature list; nothing is predicted in that case.
    pub fn predict(&self, record: &Record) -> Result<f64> {
        let row = record.to_row(&self.features)?;
        Ok(self.predictor.predict_row(&row))
    }

    /// Predict every row of a frame.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` unless the frame has exactly the training
    /// features in the training order.
    pub fn predict_frame(&self, frame: &FeatureFrame) -> Result<Vec<f64>> {
        if frame.features() != &self.features {
            let theirs = frame.features();
            return Err(Error::DataShape {
                missing: self
                    .features
                    .names()
                    .iter()
                    .filter(|n| theirs.index_of(n).is_none())
                    .cloned()
                    .collect(),
                extra: theirs
                    .names()
                    .iter()
                    .filter(|n| self.features.index_of(n).is_none())
                    .cloned()
                    .collect(),
            });
        }
        Ok(frame
            .rows()
            .map(|row| self.predictor.predict_row(row))
            .collect())
    }
}
