//! End-to-end training: split, search every family, save the bundles
//!
//! ```text
//! FeatureFrame ──DataSplit(seed)──> train ─┬─ GridSearch(family 1) ─ select ─ save <stem>
//!                                  test ──┤  ...                     (same folds)
//!                                         └─ GridSearch(family n) ─ select ─ save <stem>
//!                                                  │
//!                                   highest CV score ─> save "selected"
//! ```

use std::path::{Path, PathBuf};

use tracing::{error, info};

use crate::artifact::{ArtifactBundle, ArtifactStore, BundlePaths, MetadataLayout};
use crate::config::{FamilySpec, PipelineConfig, SearchConfig};
use crate::frame::FeatureFrame;
use crate::model::ModelFamily;
use crate::search::{DataSplit, GridSearch, SearchReport};
use crate::selection::ModelSelector;
use crate::storage::{FrameSpec, StorageEngine};
use crate::{Error, Result};

/// Artifact stem of the overall winner.
pub const SELECTED_STEM: &str = "selected";

/// Result of searching one family.
#[derive(Debug)]
pub struct FamilyOutcome {
    /// Artifact stem
    pub stem: String,
    /// Family searched
    pub family: ModelFamily,
    /// Ranked search results
    pub report: SearchReport,
    /// Selected model and metadata
    pub bundle: ArtifactBundle,
    /// Where the bundle was saved
    pub paths: BundlePaths,
}

/// Result of a pipeline run.
#[derive(Debug)]
pub struct PipelineReport {
    /// Train/test row split shared by every family
    pub split: DataSplit,
    /// Families that produced a bundle, in config order
    pub families: Vec<FamilyOutcome>,
    /// Families whose every configuration failed
    pub failed: Vec<(String, Error)>,
    /// Stem of the winning family and where its copy was saved
    pub selected: Option<(String, BundlePaths)>,
}

impl PipelineReport {
    /// Outcome of the family saved as the overall winner.
    #[must_use]
    pub fn winner(&self) -> Option<&FamilyOutcome> {
        let (stem, _) = self.selected.as_ref()?;
        self.families.iter().find(|f| &f.stem == stem)
    }
}

/// Runs the whole training flow.
#[derive(Debug, Clone)]
pub struct TrainingPipeline {
    search: SearchConfig,
    output_dir: PathBuf,
    store: ArtifactStore,
}

impl TrainingPipeline {
    /// Pipeline saving bundles into `output_dir`.
    #[must_use]
    pub fn new(search: SearchConfig, output_dir: impl Into<PathBuf>) -> Self {
        Self {
            search,
            output_dir: output_dir.into(),
            store: ArtifactStore::new(),
        }
    }

    /// Pipeline described by a config file.
    #[must_use]
    pub fn from_config(config: &PipelineConfig) -> Self {
        Self::new(config.search.clone(), &config.output_dir)
    }

    /// Use a specific artifact store.
    #[must_use]
    pub const fn with_store(mut self, store: ArtifactStore) -> Self {
        self.store = store;
        self
    }

    /// Directory receiving the bundles.
    #[must_use]
    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    /// Load the configured Parquet data as a feature frame.
    ///
    /// # Errors
    ///
    /// Propagates storage errors from reading and converting the data.
    pub fn load_frame(config: &PipelineConfig) -> Result<FeatureFrame> {
        let mut spec = FrameSpec::new(&config.target);
        if let Some(column) = &config.date_column {
            spec = spec.date_column(column);
        }
        for column in &config.drop {
            spec = spec.drop_column(column);
        }
        StorageEngine::load_parquet(&config.data)?.to_feature_frame(&spec)
    }

    /// Search every family on one shared split and save the bundles.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` for a bad split or grid, artifact errors from
    /// saving, and `FitFailure` when no family produced a model. A family
    /// whose every configuration failed is reported, not fatal.
    pub fn run(&self, frame: &FeatureFrame, families: &[FamilySpec]) -> Result<PipelineReport> {
        if families.is_empty() {
            return Err(Error::InvalidInput("no model families to search".to_string()));
        }
        let split = DataSplit::train_test(frame.n_rows(), self.search.test_fraction, self.search.seed)?;
        let train = frame.take(split.train());
        let test = frame.take(split.test());
        info!(
            train_rows = train.n_rows(),
            test_rows = test.n_rows(),
            features = frame.n_features(),
            families = families.len(),
            "starting training pipeline"
        );

        let search = GridSearch::new(self.search.clone());
        let mut outcomes = Vec::with_capacity(families.len());
        let mut failed = Vec::new();
        for spec in families {
            let stem = spec.stem().to_string();
            let report = search.run(&spec.family, &spec.grid, &train)?;
            let bundle = match ModelSelector::new()
                .model_name(&stem)
                .select(&spec.family, &report, &train, &test)
            {
                Ok(bundle) => bundle,
                Err(e @ Error::FitFailure(_)) => {
                    error!(family = stem.as_str(), error = %e, "no usable model");
                    failed.push((stem, e));
                    continue;
                }
                Err(e) => return Err(e),
            };
            let paths = BundlePaths::in_dir(&self.output_dir, &stem);
            self.store.save(&bundle, &paths, MetadataLayout::GridSearch)?;
            outcomes.push(FamilyOutcome {
                stem,
                family: spec.family,
                report,
                bundle,
                paths,
            });
        }

        // Strictly greater keeps the earlier family on ties.
        let winner = outcomes.iter().fold(None::<&FamilyOutcome>, |best, candidate| {
            match best {
                Some(b) if b.report.best().map(|c| c.mean_score)
                    >= candidate.report.best().map(|c| c.mean_score) =>
                {
                    Some(b)
                }
                _ => Some(candidate),
            }
        });
        let Some(winner) = winner else {
            return Err(Error::FitFailure(format!(
                "none of the {} families produced a model",
                families.len()
            )));
        };

        // Renamed so the winner replays as its own run next to its family's.
        let mut chosen = winner.bundle.clone();
        chosen.metadata.model = format!("{SELECTED_STEM}_{}", winner.stem);
        let paths = BundlePaths::in_dir(&self.output_dir, SELECTED_STEM);
        self.store.save(&chosen, &paths, MetadataLayout::Selected)?;
        info!(
            family = winner.stem.as_str(),
            cv_score = winner.bundle.metadata.best_score(),
            "saved overall winner"
        );
        let selected = Some((winner.stem.clone(), paths));

        Ok(PipelineReport {
            split,
            families: outcomes,
            failed,
            selected,
        })
    }
}
