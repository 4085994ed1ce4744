//! Artifact bundles: a fitted model plus its metadata, saved as a pair
//!
//! ```text
//! <dir>/<stem>.bin   model blob   (see codec)
//! <dir>/<stem>.json  metadata     (one of the declared shapes, see replay::schema)
//! ```
//!
//! Both halves are written to `.tmp` siblings first and renamed into place
//! afterwards. Loading reads the metadata through the same reconciliation as
//! tracking replay, so any bundle this crate can replay it can also load.

pub mod codec;

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde_json::{Map, Value};
use tracing::{debug, info};

pub use codec::Codec;

use crate::frame::FeatureList;
use crate::metrics::RegressionMetrics;
use crate::model::FittedModel;
use crate::replay::schema::{self, ReconciledMetadata, BEST_SCORE, MAE, MSE, R2, RMSE};
use crate::search::Configuration;
use crate::{Error, Result};

/// Which declared metadata shape to write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum MetadataLayout {
    /// `params` plus nested `metrics.{RMSE,MAE,R²}`
    #[default]
    GridSearch,
    /// `best_params` plus top-level `rmse`/`mae`/`r2`
    Selected,
}

/// Descriptive half of a bundle.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelMetadata {
    /// Model (and default run) name
    pub model: String,
    /// Training-time feature list
    pub features: FeatureList,
    /// Winning hyperparameters
    pub params: Configuration,
    /// Metrics by canonical name
    pub metrics: BTreeMap<String, f64>,
    /// When the bundle was produced
    pub created_at: Option<DateTime<Utc>>,
}

impl ModelMetadata {
    /// Metadata stamped with the current time and no metrics.
    #[must_use]
    pub fn new(model: impl Into<String>, features: FeatureList, params: Configuration) -> Self {
        Self {
            model: model.into(),
            features,
            params,
            metrics: BTreeMap::new(),
            created_at: Some(Utc::now()),
        }
    }

    /// Record held-out metrics (`mse` is derived from `rmse`).
    #[must_use]
    pub fn with_evaluation(mut self, evaluation: &RegressionMetrics) -> Self {
        self.metrics.insert(RMSE.to_string(), evaluation.rmse);
        self.metrics.insert(MAE.to_string(), evaluation.mae);
        self.metrics.insert(R2.to_string(), evaluation.r2);
        self.metrics.insert(MSE.to_string(), evaluation.mse());
        self
    }

    /// Record the cross-validation score.
    #[must_use]
    pub fn with_best_score(mut self, score: f64) -> Self {
        self.metrics.insert(BEST_SCORE.to_string(), score);
        self
    }

    /// Metric by canonical name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }

    /// Cross-validation score, if recorded.
    #[must_use]
    pub fn best_score(&self) -> Option<f64> {
        self.metric(BEST_SCORE)
    }

    /// Render in the given layout. Non-finite metrics are left out.
    #[must_use]
    pub fn to_document(&self, layout: MetadataLayout) -> Value {
        let finite = |name: &str| self.metric(name).filter(|v| v.is_finite());
        let named = [(RMSE, "RMSE"), (MAE, "MAE"), (R2, "R²")];

        let mut doc = Map::new();
        doc.insert("model".into(), Value::from(self.model.as_str()));
        doc.insert("features".into(), Value::from(self.features.names().to_vec()));
        let params = serde_json::to_value(&self.params).unwrap_or(Value::Null);
        match layout {
            MetadataLayout::GridSearch => {
                doc.insert("params".into(), params);
                if let Some(score) = finite(BEST_SCORE) {
                    doc.insert(BEST_SCORE.into(), Value::from(score));
                }
                let metrics: Map<String, Value> = named
                    .iter()
                    .filter_map(|(canonical, alias)| {
                        finite(canonical).map(|v| ((*alias).to_string(), Value::from(v)))
                    })
                    .collect();
                doc.insert("metrics".into(), Value::Object(metrics));
            }
            MetadataLayout::Selected => {
                doc.insert("best_params".into(), params);
                if let Some(score) = finite(BEST_SCORE) {
                    doc.insert(BEST_SCORE.into(), Value::from(score));
                }
                for (canonical, _) in named {
                    if let Some(v) = finite(canonical) {
                        doc.insert(canonical.into(), Value::from(v));
                    }
                }
            }
        }
        if let Some(created_at) = self.created_at {
            doc.insert("created_at".into(), Value::from(created_at.to_rfc3339()));
        }
        Value::Object(doc)
    }

    fn from_reconciled(
        meta: ReconciledMetadata,
        blob_features: &FeatureList,
        paths: &BundlePaths,
    ) -> Result<Self> {
        let features = match meta.features {
            Some(features) if &features != blob_features => {
                return Err(Error::Corrupt {
                    path: paths.metadata.clone(),
                    reason: format!(
                        "metadata features {:?} disagree with the model's {:?}",
                        features.names(),
                        blob_features.names()
                    ),
                });
            }
            Some(features) => features,
            None => blob_features.clone(),
        };
        let model = meta.run_name.unwrap_or_else(|| paths.stem());
        let created_at = meta
            .created_at
            .as_deref()
            .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
            .map(|t| t.with_timezone(&Utc));
        Ok(Self {
            model,
            features,
            params: meta.params,
            metrics: meta.metrics,
            created_at,
        })
    }
}

/// A fitted model and its metadata, saved and loaded as a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct ArtifactBundle {
    /// Predictor
    pub model: FittedModel,
    /// Descriptive metadata
    pub metadata: ModelMetadata,
}

impl ArtifactBundle {
    /// Pair a model with its metadata.
    #[must_use]
    pub const fn new(model: FittedModel, metadata: ModelMetadata) -> Self {
        Self { model, metadata }
    }
}

/// On-disk locations of a bundle's two halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BundlePaths {
    /// Model blob
    pub model: PathBuf,
    /// Metadata document
    pub metadata: PathBuf,
}

impl BundlePaths {
    /// Explicit paths.
    #[must_use]
    pub fn new(model: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            metadata: metadata.into(),
        }
    }

    /// `<dir>/<stem>.bin` and `<dir>/<stem>.json`.
    #[must_use]
    pub fn in_dir(dir: impl AsRef<Path>, stem: &str) -> Self {
        let dir = dir.as_ref();
        Self {
            model: dir.join(format!("{stem}.bin")),
            metadata: dir.join(format!("{stem}.json")),
        }
    }

    /// File stem of the model blob.
    #[must_use]
    pub fn stem(&self) -> String {
        self.model
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default()
    }
}

/// Saves and loads artifact bundles.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArtifactStore {
    codec: Codec,
}

impl ArtifactStore {
    /// Store writing blobs with the default codec.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Override the blob codec.
    #[must_use]
    pub const fn with_codec(mut self, codec: Codec) -> Self {
        self.codec = codec;
        self
    }

    /// Write both halves of `bundle`, replacing any previous bundle.
    ///
    /// # Errors
    ///
    /// `InvalidInput` if the metadata features differ from the model's or
    /// the metadata carries no metric (it could not be read back), and
    /// `ArtifactIo` if a file cannot be written. Temporary files are removed
    /// on failure.
    pub fn save(
        &self,
        bundle: &ArtifactBundle,
        paths: &BundlePaths,
        layout: MetadataLayout,
    ) -> Result<()> {
        if &bundle.metadata.features != bundle.model.features() {
            return Err(Error::InvalidInput(
                "metadata features differ from the model's feature list".to_string(),
            ));
        }
        if ![RMSE, MAE, R2, MSE]
            .iter()
            .any(|m| bundle.metadata.metric(m).is_some_and(f64::is_finite))
        {
            return Err(Error::InvalidInput(format!(
                "bundle '{}' has no finite metric to record",
                bundle.metadata.model
            )));
        }

        let blob = codec::encode(&bundle.model, self.codec)?;
        let document = serde_json::to_vec_pretty(&bundle.metadata.to_document(layout))?;

        let model_tmp = temp_sibling(&paths.model)?;
        let metadata_tmp = temp_sibling(&paths.metadata)?;
        let written = write_file(&model_tmp, &blob)
            .and_then(|()| write_file(&metadata_tmp, &document))
            .and_then(|()| rename(&model_tmp, &paths.model))
            .and_then(|()| rename(&metadata_tmp, &paths.metadata));
        if written.is_err() {
            let _ = fs::remove_file(&model_tmp);
            let _ = fs::remove_file(&metadata_tmp);
        }
        written?;

        info!(
            model = bundle.metadata.model.as_str(),
            path = %paths.model.display(),
            codec = self.codec.as_str(),
            bytes = blob.len(),
            "saved artifact bundle"
        );
        Ok(())
    }

    /// Read both halves of a bundle.
    ///
    /// # Errors
    ///
    /// `ArtifactNotFound` for a missing half, `ArtifactIo` for an unreadable
    /// one, `MalformedMetadata`/`SchemaMismatch` for bad metadata, and
    /// `Corrupt` for a blob that does not decode or whose feature list
    /// disagrees with the metadata.
    pub fn load(&self, paths: &BundlePaths) -> Result<ArtifactBundle> {
        let metadata = schema::read_metadata(&paths.metadata)?;
        let model = Self::load_model(&paths.model)?;
        let metadata = ModelMetadata::from_reconciled(metadata, model.features(), paths)?;
        debug!(
            model = metadata.model.as_str(),
            path = %paths.model.display(),
            "loaded artifact bundle"
        );
        Ok(ArtifactBundle { model, metadata })
    }

    /// Read and decode a model blob on its own.
    ///
    /// # Errors
    ///
    /// `ArtifactNotFound`, `ArtifactIo` or `Corrupt`.
    pub fn load_model(path: &Path) -> Result<FittedModel> {
        let blob = fs::read(path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                Error::ArtifactNotFound(path.to_path_buf())
            } else {
                Error::ArtifactIo {
                    path: path.to_path_buf(),
                    source,
                }
            }
        })?;
        codec::decode(path, &blob)
    }
}

fn temp_sibling(path: &Path) -> Result<PathBuf> {
    let name = path.file_name().ok_or_else(|| {
        Error::InvalidInput(format!("artifact path {} has no file name", path.display()))
    })?;
    let mut name = name.to_os_string();
    name.push(".tmp");
    Ok(path.with_file_name(name))
}

fn write_file(path: &Path, bytes: &[u8]) -> Result<()> {
    let io = |source| Error::ArtifactIo {
        path: path.to_path_buf(),
        source,
    };
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(io)?;
    }
    fs::write(path, bytes).map_err(io)
}

fn rename(from: &Path, to: &Path) -> Result<()> {
    fs::rename(from, to).map_err(|source| Error::ArtifactIo {
        path: to.to_path_buf(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FeatureFrame, Record};
    use crate::model::{ModelFamily, Regressor};
    use tempfile::TempDir;

    fn bundle() -> ArtifactBundle {
        let features = FeatureList::new(["sqft_living", "bedrooms"]).unwrap();
        let rows: Vec<Vec<f64>> = (0..20)
            .map(|i| vec![f64::from(1000 + 50 * i), f64::from(1 + i % 4)])
            .collect();
        let target = rows.iter().map(|r| 200.0 * r[0] + 5000.0 * r[1]).collect();
        let frame = FeatureFrame::from_rows(features.clone(), &rows, target).unwrap();
        let params = Configuration::new().with("fit_intercept", true);
        let model = ModelFamily::LinearRegression.fit(&params, &frame).unwrap();
        let metadata = ModelMetadata::new("linear_regression", features, params)
            .with_evaluation(&RegressionMetrics {
                rmse: 10.0,
                mae: 8.0,
                r2: 0.99,
            })
            .with_best_score(-12.5);
        ArtifactBundle::new(model, metadata)
    }

    #[test]
    fn test_save_load_both_layouts() {
        let dir = TempDir::new().unwrap();
        let store = ArtifactStore::new();
        let original = bundle();
        let record = Record::new()
            .with("sqft_living", 1500.0)
            .with("bedrooms", 3.0);

        for (stem, layout) in [
            ("grid", MetadataLayout::GridSearch),
            ("selected", MetadataLayout::Selected),
        ] {
            let paths = BundlePaths::in_dir(dir.path(), stem);
            store.save(&original, &paths, layout).unwrap();
            let loaded = store.load(&paths).unwrap();

            assert_eq!(loaded.model, original.model);
            assert_eq!(loaded.metadata.features, original.metadata.features);
            assert_eq!(loaded.metadata.params, original.metadata.params);
            assert_eq!(loaded.metadata.metric(RMSE), Some(10.0));
            assert_eq!(loaded.metadata.metric(MSE), Some(100.0));
            assert_eq!(loaded.metadata.best_score(), Some(-12.5));
            assert_eq!(
                loaded.model.predict(&record).unwrap(),
                original.model.predict(&record).unwrap()
            );
        }
    }

    #[test]
    fn test_no_temp_files_left() {
        let dir = TempDir::new().unwrap();
        let paths = BundlePaths::in_dir(dir.path(), "m");
        ArtifactStore::new()
            .save(&bundle(), &paths, MetadataLayout::GridSearch)
            .unwrap();
        let mut names: Vec<String> = fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        assert_eq!(names, ["m.bin", "m.json"]);
    }

    #[test]
    fn test_missing_half() {
        let dir = TempDir::new().unwrap();
        let paths = BundlePaths::in_dir(dir.path(), "m");
        ArtifactStore::new()
            .save(&bundle(), &paths, MetadataLayout::GridSearch)
            .unwrap();
        fs::remove_file(&paths.model).unwrap();
        assert!(matches!(
            ArtifactStore::new().load(&paths),
            Err(Error::ArtifactNotFound(p)) if p == paths.model
        ));
    }

    #[test]
    fn test_feature_disagreement_is_corrupt() {
        let dir = TempDir::new().unwrap();
        let paths = BundlePaths::in_dir(dir.path(), "m");
        ArtifactStore::new()
            .save(&bundle(), &paths, MetadataLayout::Selected)
            .unwrap();
        let mut doc: Value =
            serde_json::from_slice(&fs::read(&paths.metadata).unwrap()).unwrap();
        doc["features"] = serde_json::json!(["bedrooms", "sqft_living"]);
        fs::write(&paths.metadata, doc.to_string()).unwrap();

        assert!(matches!(
            ArtifactStore::new().load(&paths),
            Err(Error::Corrupt { .. })
        ));
    }

    #[test]
    fn test_save_without_metrics_rejected() {
        let dir = TempDir::new().unwrap();
        let mut bare = bundle();
        bare.metadata.metrics.clear();
        let paths = BundlePaths::in_dir(dir.path(), "m");
        assert!(ArtifactStore::new()
            .save(&bare, &paths, MetadataLayout::GridSearch)
            .is_err());
        assert!(!paths.model.exists());
    }
}
