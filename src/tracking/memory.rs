//! In-memory tracking store backed by `DashMap`.
//!
//! Model blobs live in a content-addressed map keyed by `sha256:<hex>`;
//! runs only hold an [`ArtifactRecord`] pointing into it.

use std::collections::btree_map::Entry as ParamEntry;
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use tracing::{debug, warn};

use super::records::{ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord, RunStatus};
use super::{RunHandle, TrackingStore};
use crate::artifact::codec::{self, Codec};
use crate::model::FittedModel;
use crate::search::ParamValue;
use crate::{Error, Result};

/// Everything recorded for one run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackedRun {
    record: RunRecord,
    params: BTreeMap<String, ParamValue>,
    metrics: Vec<MetricRecord>,
    model: Option<ArtifactRecord>,
}

impl TrackedRun {
    /// Run metadata and status.
    #[must_use]
    pub const fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Logged parameters.
    #[must_use]
    pub const fn params(&self) -> &BTreeMap<String, ParamValue> {
        &self.params
    }

    /// All metric points in logging order.
    #[must_use]
    pub fn metrics(&self) -> &[MetricRecord] {
        &self.metrics
    }

    /// Most recent value of a metric.
    #[must_use]
    pub fn latest_metric(&self, key: &str) -> Option<f64> {
        self.metrics
            .iter()
            .rev()
            .find(|m| m.key() == key)
            .map(MetricRecord::value)
    }

    /// Logged model reference.
    #[must_use]
    pub const fn model(&self) -> Option<&ArtifactRecord> {
        self.model.as_ref()
    }
}

#[derive(Serialize)]
struct Snapshot<'a> {
    experiment: &'a ExperimentRecord,
    runs: Vec<TrackedRun>,
}

/// Thread-safe tracking store kept in memory for the life of the process.
///
/// Run names are unique, parameters are write-once, metrics are
/// append-only, and logging the model closes the run. A rejected log call
/// closes its run as failed, after which the name may be started again.
#[derive(Debug)]
pub struct MemoryTrackingStore {
    experiment: ExperimentRecord,
    runs: DashMap<String, TrackedRun>,
    names: DashMap<String, String>,
    blobs: DashMap<String, Vec<u8>>,
    next_run: AtomicU64,
}

impl MemoryTrackingStore {
    /// Empty store for the named experiment.
    #[must_use]
    pub fn new(experiment: impl Into<String>) -> Self {
        let name = experiment.into();
        Self {
            experiment: ExperimentRecord::new(format!("exp-{name}"), name),
            runs: DashMap::new(),
            names: DashMap::new(),
            blobs: DashMap::new(),
            next_run: AtomicU64::new(1),
        }
    }

    /// The experiment every run belongs to.
    #[must_use]
    pub const fn experiment(&self) -> &ExperimentRecord {
        &self.experiment
    }

    /// Number of runs.
    #[must_use]
    pub fn run_count(&self) -> usize {
        self.runs.len()
    }

    /// Whether no run was started.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.runs.is_empty()
    }

    /// Snapshot of a run by ID.
    #[must_use]
    pub fn run(&self, run_id: &str) -> Option<TrackedRun> {
        self.runs.get(run_id).map(|r| r.value().clone())
    }

    /// Snapshot of a run by name.
    #[must_use]
    pub fn run_by_name(&self, name: &str) -> Option<TrackedRun> {
        let run_id = self.names.get(name)?.value().clone();
        self.run(&run_id)
    }

    /// Every run, ordered by ID.
    #[must_use]
    pub fn runs(&self) -> Vec<TrackedRun> {
        let mut runs: Vec<TrackedRun> = self.runs.iter().map(|r| r.value().clone()).collect();
        runs.sort_by(|a, b| a.record.run_id().cmp(b.record.run_id()));
        runs
    }

    /// Time series of one metric of one run, ordered by step.
    #[must_use]
    pub fn metrics_for_run(&self, run_id: &str, key: &str) -> Vec<MetricRecord> {
        let mut series: Vec<MetricRecord> = self
            .runs
            .get(run_id)
            .map(|run| {
                run.metrics
                    .iter()
                    .filter(|m| m.key() == key)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        series.sort_by_key(MetricRecord::step);
        series
    }

    /// Most recent value of a metric of one run.
    #[must_use]
    pub fn latest_metric(&self, run_id: &str, key: &str) -> Option<f64> {
        self.runs.get(run_id)?.latest_metric(key)
    }

    /// Decode a logged model by content hash.
    ///
    /// # Errors
    ///
    /// Returns `TrackingStore` for an unknown hash and `Corrupt` if the
    /// stored blob does not decode.
    pub fn load_model(&self, cas_hash: &str) -> Result<FittedModel> {
        let blob = self
            .blobs
            .get(cas_hash)
            .ok_or_else(|| Error::TrackingStore(format!("no artifact {cas_hash}")))?;
        codec::decode(Path::new(cas_hash), blob.value())
    }

    /// Write the experiment and every run as pretty JSON.
    ///
    /// # Errors
    ///
    /// Returns `Io` or `Json` errors from writing the snapshot.
    pub fn export_json<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let snapshot = Snapshot {
            experiment: &self.experiment,
            runs: self.runs(),
        };
        let text = serde_json::to_string_pretty(&snapshot)?;
        std::fs::write(path, text)?;
        Ok(())
    }

    fn next_run_id(&self) -> String {
        format!("run-{:04}", self.next_run.fetch_add(1, Ordering::Relaxed))
    }

    fn has_failed(&self, run_id: &str) -> bool {
        self.runs
            .get(run_id)
            .is_some_and(|run| run.record.status() == RunStatus::Failed)
    }

    /// Run `f` on an open run; a rejected registration closes the run as
    /// [`RunStatus::Failed`].
    fn with_open_run<T>(
        &self,
        handle: &RunHandle,
        f: impl FnOnce(&mut TrackedRun) -> Result<T>,
    ) -> Result<T> {
        let mut run = self
            .runs
            .get_mut(handle.run_id())
            .ok_or_else(|| Error::TrackingStore(format!("unknown run {}", handle.run_id())))?;
        if !run.record.is_open() {
            return Err(Error::TrackingStore(format!(
                "run '{}' is closed",
                run.record.run_name()
            )));
        }
        let outcome = f(run.value_mut());
        if outcome.is_err() {
            run.record.close(RunStatus::Failed);
            warn!(
                run_id = handle.run_id(),
                name = handle.name(),
                "registration rejected, run closed as failed"
            );
        }
        outcome
    }
}

impl TrackingStore for MemoryTrackingStore {
    fn start_run(&self, name: &str) -> Result<RunHandle> {
        if name.is_empty() {
            return Err(Error::TrackingStore("run name is empty".to_string()));
        }
        let run_id = match self.names.entry(name.to_string()) {
            // A failed run keeps its record but gives up its name.
            Entry::Occupied(mut slot) if self.has_failed(slot.get()) => {
                let run_id = self.next_run_id();
                let previous = slot.insert(run_id.clone());
                debug!(previous = previous.as_str(), name, "reusing name of failed run");
                run_id
            }
            Entry::Occupied(_) => {
                return Err(Error::TrackingStore(format!(
                    "a run named '{name}' already exists in experiment '{}'",
                    self.experiment.name()
                )))
            }
            Entry::Vacant(slot) => {
                let run_id = self.next_run_id();
                slot.insert(run_id.clone());
                run_id
            }
        };

        self.runs.insert(
            run_id.clone(),
            TrackedRun {
                record: RunRecord::start(&run_id, self.experiment.experiment_id(), name),
                params: BTreeMap::new(),
                metrics: Vec::new(),
                model: None,
            },
        );
        debug!(run_id = run_id.as_str(), name, "started run");
        Ok(RunHandle::new(run_id, name))
    }

    fn log_param(&self, run: &RunHandle, key: &str, value: &ParamValue) -> Result<()> {
        self.with_open_run(run, |tracked| match tracked.params.entry(key.to_string()) {
            ParamEntry::Occupied(existing) => Err(Error::TrackingStore(format!(
                "parameter '{key}' of run '{}' is already set to {}",
                run.name(),
                existing.get()
            ))),
            ParamEntry::Vacant(slot) => {
                slot.insert(value.clone());
                Ok(())
            }
        })
    }

    fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()> {
        self.with_open_run(run, |tracked| {
            if !value.is_finite() {
                return Err(Error::TrackingStore(format!(
                    "metric '{key}' of run '{}' is not finite: {value}",
                    run.name()
                )));
            }
            let step = tracked.metrics.iter().filter(|m| m.key() == key).count();
            let step = u64::try_from(step).unwrap_or(u64::MAX);
            tracked
                .metrics
                .push(MetricRecord::new(run.run_id(), key, step, value));
            Ok(())
        })
    }

    fn log_model(&self, run: &RunHandle, model: &FittedModel, name: &str) -> Result<()> {
        self.with_open_run(run, |tracked| {
            if tracked.model.is_some() {
                return Err(Error::TrackingStore(format!(
                    "run '{}' already has a model",
                    run.name()
                )));
            }
            let blob = codec::encode(model, Codec::Raw)
                .map_err(|e| Error::TrackingStore(format!("cannot store model '{name}': {e}")))?;
            let artifact = ArtifactRecord::for_bytes(run.run_id(), name, &blob);
            self.blobs
                .entry(artifact.cas_hash().to_string())
                .or_insert(blob);
            debug!(
                run_id = run.run_id(),
                cas_hash = artifact.cas_hash(),
                bytes = artifact.size_bytes(),
                "logged model"
            );
            tracked.model = Some(artifact);
            tracked.record.close(RunStatus::Finished);
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::{FeatureFrame, FeatureList};
    use crate::model::{ModelFamily, Regressor};
    use crate::search::Configuration;

    fn model() -> FittedModel {
        let rows: Vec<Vec<f64>> = (0..10).map(|i| vec![f64::from(i)]).collect();
        let target = (0..10).map(|i| f64::from(3 * i)).collect();
        let frame =
            FeatureFrame::from_rows(FeatureList::new(["x"]).unwrap(), &rows, target).unwrap();
        ModelFamily::LinearRegression
            .fit(&Configuration::new(), &frame)
            .unwrap()
    }

    #[test]
    fn test_store_starts_empty() {
        let store = MemoryTrackingStore::new("housing_price");
        assert!(store.is_empty());
        assert_eq!(store.experiment().name(), "housing_price");
    }

    #[test]
    fn test_run_names_are_unique() {
        let store = MemoryTrackingStore::new("housing_price");
        store.start_run("rf").unwrap();
        assert!(matches!(
            store.start_run("rf"),
            Err(Error::TrackingStore(_))
        ));
        assert_eq!(store.run_count(), 1);
    }

    #[test]
    fn test_params_are_write_once() {
        let store = MemoryTrackingStore::new("housing_price");
        let run = store.start_run("rf").unwrap();
        store.log_param(&run, "max_depth", &ParamValue::Int(5)).unwrap();
        assert!(store.log_param(&run, "max_depth", &ParamValue::Int(6)).is_err());
        assert_eq!(
            store.run(run.run_id()).unwrap().params()["max_depth"],
            ParamValue::Int(5)
        );
    }

    #[test]
    fn test_metrics_append_with_steps() {
        let store = MemoryTrackingStore::new("housing_price");
        let run = store.start_run("gb").unwrap();
        for loss in [3.0, 2.0, 1.5] {
            store.log_metric(&run, "rmse", loss).unwrap();
        }
        let series = store.metrics_for_run(run.run_id(), "rmse");
        let steps: Vec<u64> = series.iter().map(MetricRecord::step).collect();
        assert_eq!(steps, [0, 1, 2]);
        assert_eq!(store.latest_metric(run.run_id(), "rmse"), Some(1.5));
        assert!(store.log_metric(&run, "rmse", f64::NAN).is_err());
    }

    #[test]
    fn test_single_model_closes_run() {
        let store = MemoryTrackingStore::new("housing_price");
        let run = store.start_run("lr").unwrap();
        store.log_model(&run, &model(), "lr").unwrap();

        let tracked = store.run_by_name("lr").unwrap();
        assert_eq!(tracked.record().status(), RunStatus::Finished);
        let hash = tracked.model().unwrap().cas_hash().to_string();
        assert!(hash.starts_with("sha256:"));
        assert_eq!(store.load_model(&hash).unwrap(), model());

        assert!(store.log_model(&run, &model(), "again").is_err());
        assert!(store.log_metric(&run, "rmse", 1.0).is_err());
    }

    #[test]
    fn test_rejected_log_fails_run_and_frees_name() {
        let store = MemoryTrackingStore::new("housing_price");
        let first = store.start_run("gb").unwrap();
        store.log_metric(&first, "rmse", 2.0).unwrap();
        assert!(store.log_metric(&first, "mse", f64::INFINITY).is_err());

        let failed = store.run(first.run_id()).unwrap();
        assert_eq!(failed.record().status(), RunStatus::Failed);
        assert!(failed.record().ended_at().is_some());
        assert!(store.log_metric(&first, "mae", 1.0).is_err());

        let retry = store.start_run("gb").unwrap();
        assert_ne!(retry.run_id(), first.run_id());
        assert_eq!(store.run_by_name("gb").unwrap().record().run_id(), retry.run_id());
        assert_eq!(store.run_count(), 2);

        // A finished run still holds its name.
        store.log_model(&retry, &model(), "gb").unwrap();
        assert!(store.start_run("gb").is_err());
    }

    #[test]
    fn test_unknown_run() {
        let store = MemoryTrackingStore::new("housing_price");
        let ghost = RunHandle::new("run-9999", "ghost");
        assert!(store.log_metric(&ghost, "rmse", 1.0).is_err());
    }

    #[test]
    fn test_export_json() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("runs.json");
        let store = MemoryTrackingStore::new("housing_price");
        let run = store.start_run("lr").unwrap();
        store.log_metric(&run, "r2", 0.7).unwrap();
        store.export_json(&path).unwrap();

        let doc: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["experiment"]["name"], "housing_price");
        assert_eq!(doc["runs"][0]["record"]["run_name"], "lr");
    }
}
