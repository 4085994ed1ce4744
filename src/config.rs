//! Search and pipeline settings
//!
//! Both structs deserialize from JSON with every field optional:
//!
//! ```json
//! {
//!   "data": "kc_house_data.parquet",
//!   "target": "price",
//!   "date_column": "date",
//!   "drop": ["id"],
//!   "output_dir": "models",
//!   "search": { "folds": 3, "seed": 42, "pool_size": 8 },
//!   "families": [
//!     { "family": "random_forest", "grid": { "max_depth": [null, 10, 20] } }
//!   ]
//! }
//! ```

use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::model::ModelFamily;
use crate::search::{Scoring, SearchSpace};
use crate::{Error, Result};

/// Settings of one cross-validated search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Number of CV folds (at least 2)
    pub folds: usize,
    /// Seed for the train/test split and the fold assignment
    pub seed: u64,
    /// Fraction of rows held out for the final evaluation
    pub test_fraction: f64,
    /// Worker threads; `None` uses the host's available parallelism
    pub pool_size: Option<usize>,
    /// Ranking score
    pub scoring: Scoring,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            folds: 3,
            seed: 42,
            test_fraction: 0.2,
            pool_size: None,
            scoring: Scoring::default(),
        }
    }
}

impl SearchConfig {
    /// Set the fold count (clamped to at least 2).
    #[must_use]
    pub fn folds(mut self, folds: usize) -> Self {
        self.folds = folds.max(2);
        self
    }

    /// Set the seed.
    #[must_use]
    pub const fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Set the held-out fraction (clamped to `[0.01, 0.9]`).
    #[must_use]
    pub fn test_fraction(mut self, fraction: f64) -> Self {
        self.test_fraction = fraction.clamp(0.01, 0.9);
        self
    }

    /// Set the worker count (clamped to at least 1).
    #[must_use]
    pub fn pool_size(mut self, workers: usize) -> Self {
        self.pool_size = Some(workers.max(1));
        self
    }

    /// Set the ranking score.
    #[must_use]
    pub const fn scoring(mut self, scoring: Scoring) -> Self {
        self.scoring = scoring;
        self
    }

    /// Effective number of worker threads.
    #[must_use]
    pub fn workers(&self) -> usize {
        self.pool_size.map_or_else(
            || std::thread::available_parallelism().map_or(1, NonZeroUsize::get),
            |n| n.max(1),
        )
    }
}

/// One model family to search and the grid to search it over.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FamilySpec {
    /// Regression family
    pub family: ModelFamily,
    /// Artifact stem; defaults to the family name
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Hyperparameter grid
    #[serde(default)]
    pub grid: SearchSpace,
}

impl FamilySpec {
    /// Search `family` over `grid`.
    #[must_use]
    pub const fn new(family: ModelFamily, grid: SearchSpace) -> Self {
        Self {
            family,
            name: None,
            grid,
        }
    }

    /// Override the artifact stem.
    #[must_use]
    pub fn named(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Artifact stem of this family.
    #[must_use]
    pub fn stem(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.family.as_str())
    }

    /// Grids used when a config lists no families.
    #[must_use]
    pub fn defaults() -> Vec<Self> {
        vec![
            Self::new(
                ModelFamily::LinearRegression,
                SearchSpace::new().param("fit_intercept", [true]),
            ),
            Self::new(
                ModelFamily::DecisionTree,
                SearchSpace::new()
                    .param("max_depth", [None, Some(10_i64), Some(20)])
                    .param("min_samples_leaf", [1_i64, 5]),
            ),
            Self::new(
                ModelFamily::RandomForest,
                SearchSpace::new()
                    .param("n_estimators", [100_i64, 200])
                    .param("max_depth", [None, Some(10_i64), Some(20)])
                    .param("min_samples_split", [2_i64, 5])
                    .param("min_samples_leaf", [1_i64, 2]),
            ),
            Self::new(
                ModelFamily::GradientBoosting,
                SearchSpace::new()
                    .param("n_estimators", [100_i64, 200, 300])
                    .param("learning_rate", [0.05, 0.1, 0.2])
                    .param("max_depth", [3_i64, 5])
                    .param("min_samples_split", [2_i64, 5])
                    .param("min_samples_leaf", [1_i64, 2]),
            ),
        ]
    }
}

/// End-to-end training settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Parquet file with the property records
    pub data: PathBuf,
    /// Target column
    pub target: String,
    /// Timestamp column to widen into year/month/day
    pub date_column: Option<String>,
    /// Columns excluded from the features
    pub drop: Vec<String>,
    /// Directory receiving the artifact bundles
    pub output_dir: PathBuf,
    /// Search settings shared by every family
    pub search: SearchConfig,
    /// Families to search; empty means [`FamilySpec::defaults`]
    pub families: Vec<FamilySpec>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            data: PathBuf::from("kc_house_data.parquet"),
            target: "price".to_string(),
            date_column: Some("date".to_string()),
            drop: vec!["id".to_string()],
            output_dir: PathBuf::from("models"),
            search: SearchConfig::default(),
            families: Vec::new(),
        }
    }
}

impl PipelineConfig {
    /// Read a JSON config file.
    ///
    /// # Errors
    ///
    /// Returns `Io` if the file cannot be read and `InvalidInput` if it is not
    /// a valid config.
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&text).map_err(|e| {
            Error::InvalidInput(format!("invalid config {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Check the invariants deserialization cannot express.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for fewer than two folds, a held-out fraction
    /// outside `(0, 1)`, or two families sharing an artifact stem.
    pub fn validate(&self) -> Result<()> {
        if self.search.folds < 2 {
            return Err(Error::InvalidInput(format!(
                "folds must be at least 2, got {}",
                self.search.folds
            )));
        }
        if !(self.search.test_fraction > 0.0 && self.search.test_fraction < 1.0) {
            return Err(Error::InvalidInput(format!(
                "test_fraction must be in (0, 1), got {}",
                self.search.test_fraction
            )));
        }
        let families = self.families();
        for (i, spec) in families.iter().enumerate() {
            if families[..i].iter().any(|other| other.stem() == spec.stem()) {
                return Err(Error::InvalidInput(format!(
                    "artifact name '{}' is used by more than one family",
                    spec.stem()
                )));
            }
        }
        Ok(())
    }

    /// Families to search, falling back to the defaults.
    #[must_use]
    pub fn families(&self) -> Vec<FamilySpec> {
        if self.families.is_empty() {
            FamilySpec::defaults()
        } else {
            self.families.clone()
        }
    }
}
