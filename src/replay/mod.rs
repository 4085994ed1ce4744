//! Tracking replay: register saved bundles as runs in a tracking store
//!
//! ```text
//! ReplaySource { model.bin, metadata.json }
//!        │ read_metadata ─── MalformedMetadata / SchemaMismatch ──┐
//!        │ load_model ────── ArtifactNotFound / Corrupt ──────────┤ skipped, reported
//!        ▼                                                        │
//! start_run → log_param* → log_metric* → log_model                │
//!        │                                                        │
//!        └── TrackingStore error ──> abort the whole replay       ┘
//! ```
//!
//! Nothing touches the store until both halves of a source have been read,
//! so a bad source never leaves a partial run behind.

pub mod schema;

use std::path::PathBuf;

use tracing::{error, info, warn};

use crate::artifact::{ArtifactStore, BundlePaths};
use crate::tracking::{RunHandle, TrackingStore};
use crate::{Error, Result};

/// Canonical metrics logged for every run, in logging order.
pub const LOGGED_METRICS: &[&str] = &[
    schema::RMSE,
    schema::MSE,
    schema::MAE,
    schema::R2,
    schema::BEST_SCORE,
];

/// One (model blob, metadata document) pair to replay.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplaySource {
    /// Model blob
    pub model: PathBuf,
    /// Metadata document
    pub metadata: PathBuf,
}

impl ReplaySource {
    /// Pair explicit paths.
    #[must_use]
    pub fn new(model: impl Into<PathBuf>, metadata: impl Into<PathBuf>) -> Self {
        Self {
            model: model.into(),
            metadata: metadata.into(),
        }
    }
}

impl From<BundlePaths> for ReplaySource {
    fn from(paths: BundlePaths) -> Self {
        Self::new(paths.model, paths.metadata)
    }
}

/// A source that was skipped.
#[derive(Debug)]
pub struct SkippedSource {
    /// The source pair
    pub source: ReplaySource,
    /// Why it was skipped
    pub error: Error,
}

/// Outcome of a batch replay.
#[derive(Debug, Default)]
pub struct ReplayReport {
    /// Runs created, in source order
    pub runs: Vec<RunHandle>,
    /// Sources that could not be replayed
    pub skipped: Vec<SkippedSource>,
}

impl ReplayReport {
    /// Whether every source became a run.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.skipped.is_empty()
    }
}

/// Replays artifact bundles into a [`TrackingStore`].
pub struct TrackingReplay<'a, S: TrackingStore + ?Sized> {
    store: &'a S,
}

impl<'a, S: TrackingStore + ?Sized> TrackingReplay<'a, S> {
    /// Replay into `store`.
    #[must_use]
    pub const fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Register one source as a run.
    ///
    /// The run is named after the metadata's `model` field, falling back to
    /// the model file stem. Parameters are logged as written and metrics
    /// under their canonical names.
    ///
    /// # Errors
    ///
    /// Artifact and schema errors (see [`Error::is_per_source`]) are returned
    /// before the store is touched, and reconciled metrics are already
    /// finite by then. Store errors are returned as they occur; the store
    /// closes a run it rejected as failed, so the source can be retried.
    pub fn replay_one(&self, source: &ReplaySource) -> Result<RunHandle> {
        let paths = BundlePaths::new(&source.model, &source.metadata);
        let metadata = schema::read_metadata(&source.metadata)?;
        let model = ArtifactStore::load_model(&source.model)?;
        if let Some(features) = &metadata.features {
            if features != model.features() {
                return Err(Error::Corrupt {
                    path: source.metadata.clone(),
                    reason: "metadata features disagree with the model's".to_string(),
                });
            }
        }

        let name = metadata.run_name.clone().unwrap_or_else(|| paths.stem());
        let run = self.store.start_run(&name)?;
        for (key, value) in metadata.params.iter() {
            self.store.log_param(&run, key, value)?;
        }
        for key in LOGGED_METRICS {
            if let Some(value) = metadata.metric(key) {
                self.store.log_metric(&run, key, value)?;
            }
        }
        self.store.log_model(&run, &model, &name)?;

        info!(
            run = name.as_str(),
            shape = metadata.shape,
            params = metadata.params.len(),
            metrics = metadata.metrics.len(),
            "replayed bundle"
        );
        Ok(run)
    }

    /// Replay every source independently.
    ///
    /// # Errors
    ///
    /// Only a tracking store error is returned; it stops the replay. Every
    /// other failure is logged and listed in [`ReplayReport::skipped`].
    pub fn replay_all(&self, sources: &[ReplaySource]) -> Result<ReplayReport> {
        let mut report = ReplayReport::default();
        for source in sources {
            match self.replay_one(source) {
                Ok(run) => report.runs.push(run),
                Err(e) if e.is_per_source() => {
                    warn!(
                        model = %source.model.display(),
                        metadata = %source.metadata.display(),
                        error = %e,
                        "skipping source"
                    );
                    report.skipped.push(SkippedSource {
                        source: source.clone(),
                        error: e,
                    });
                }
                Err(e) => {
                    error!(
                        model = %source.model.display(),
                        error = %e,
                        "tracking store rejected replay"
                    );
                    return Err(e);
                }
            }
        }
        info!(
            runs = report.runs.len(),
            skipped = report.skipped.len(),
            "replay finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracking::MemoryTrackingStore;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_missing_model_skipped_without_run() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("rf.json");
        fs::write(
            &metadata,
            r#"{"model": "rf", "params": {}, "metrics": {"RMSE": 1.0}}"#,
        )
        .unwrap();
        let store = MemoryTrackingStore::new("housing_price");
        let report = TrackingReplay::new(&store)
            .replay_all(&[ReplaySource::new(dir.path().join("rf.bin"), metadata)])
            .unwrap();

        assert!(report.runs.is_empty());
        assert!(matches!(
            report.skipped[0].error,
            Error::ArtifactNotFound(_)
        ));
        assert!(store.is_empty());
    }

    #[test]
    fn test_malformed_metadata() {
        let dir = TempDir::new().unwrap();
        let metadata = dir.path().join("x.json");
        fs::write(&metadata, "{ not json").unwrap();
        let store = MemoryTrackingStore::new("housing_price");
        let err = TrackingReplay::new(&store)
            .replay_one(&ReplaySource::new(dir.path().join("x.bin"), metadata))
            .unwrap_err();
        assert!(matches!(err, Error::MalformedMetadata { .. }));
    }
}
