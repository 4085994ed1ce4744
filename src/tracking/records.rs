//! Tracking records
//!
//! ```text
//! ExperimentRecord (1) ──< RunRecord (N)      unique run name per experiment
//!                              │
//!                              ├──< params     write-once, name → ParamValue
//!                              ├──< MetricRecord (N)  append-only, step-ordered
//!                              └──  ArtifactRecord (0..1)  sha256 CAS reference
//! ```

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Experiment all runs of a store belong to.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExperimentRecord {
    experiment_id: String,
    name: String,
    created_at: DateTime<Utc>,
}

impl ExperimentRecord {
    /// New experiment stamped with the current time.
    #[must_use]
    pub fn new(experiment_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            experiment_id: experiment_id.into(),
            name: name.into(),
            created_at: Utc::now(),
        }
    }

    /// Experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Experiment name, e.g. `housing_price`.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Creation time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// Lifecycle state of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Accepting params, metrics and a model
    Running,
    /// Model logged; the run is closed
    Finished,
    /// Closed without a model
    Failed,
}

/// One tracked run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RunRecord {
    run_id: String,
    experiment_id: String,
    run_name: String,
    status: RunStatus,
    started_at: DateTime<Utc>,
    ended_at: Option<DateTime<Utc>>,
}

impl RunRecord {
    /// A run that starts now.
    #[must_use]
    pub fn start(
        run_id: impl Into<String>,
        experiment_id: impl Into<String>,
        run_name: impl Into<String>,
    ) -> Self {
        Self {
            run_id: run_id.into(),
            experiment_id: experiment_id.into(),
            run_name: run_name.into(),
            status: RunStatus::Running,
            started_at: Utc::now(),
            ended_at: None,
        }
    }

    /// Run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Parent experiment ID.
    #[must_use]
    pub fn experiment_id(&self) -> &str {
        &self.experiment_id
    }

    /// Run name, unique within the experiment.
    #[must_use]
    pub fn run_name(&self) -> &str {
        &self.run_name
    }

    /// Current status.
    #[must_use]
    pub const fn status(&self) -> RunStatus {
        self.status
    }

    /// Start time.
    #[must_use]
    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// End time, once the run is closed.
    #[must_use]
    pub const fn ended_at(&self) -> Option<DateTime<Utc>> {
        self.ended_at
    }

    /// Whether the run still accepts writes.
    #[must_use]
    pub fn is_open(&self) -> bool {
        self.status == RunStatus::Running
    }

    /// Close the run with a final status.
    pub fn close(&mut self, status: RunStatus) {
        self.status = status;
        self.ended_at = Some(Utc::now());
    }
}

/// One point of a metric time series.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricRecord {
    run_id: String,
    key: String,
    step: u64,
    value: f64,
    timestamp: DateTime<Utc>,
}

impl MetricRecord {
    /// A metric value recorded now.
    #[must_use]
    pub fn new(run_id: impl Into<String>, key: impl Into<String>, step: u64, value: f64) -> Self {
        Self {
            run_id: run_id.into(),
            key: key.into(),
            step,
            value,
            timestamp: Utc::now(),
        }
    }

    /// Run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Metric name.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Position in the series for this key.
    #[must_use]
    pub const fn step(&self) -> u64 {
        self.step
    }

    /// Value.
    #[must_use]
    pub const fn value(&self) -> f64 {
        self.value
    }

    /// Recording time.
    #[must_use]
    pub const fn timestamp(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

/// Content-addressed reference to a logged model.
///
/// `cas_hash` is `sha256:<hex digest>` of the stored bytes, so identical
/// models logged by different runs share one stored blob.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ArtifactRecord {
    run_id: String,
    name: String,
    cas_hash: String,
    size_bytes: u64,
    created_at: DateTime<Utc>,
}

impl ArtifactRecord {
    /// Reference `bytes` logged under `name` by `run_id`.
    #[must_use]
    pub fn for_bytes(run_id: impl Into<String>, name: impl Into<String>, bytes: &[u8]) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
            cas_hash: cas_hash(bytes),
            size_bytes: bytes.len() as u64,
            created_at: Utc::now(),
        }
    }

    /// Run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Name the model was logged under.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// `sha256:<hex>` content hash.
    #[must_use]
    pub fn cas_hash(&self) -> &str {
        &self.cas_hash
    }

    /// Stored size.
    #[must_use]
    pub const fn size_bytes(&self) -> u64 {
        self.size_bytes
    }

    /// Logging time.
    #[must_use]
    pub const fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }
}

/// `sha256:<hex>` of `bytes`.
#[must_use]
pub fn cas_hash(bytes: &[u8]) -> String {
    format!("sha256:{:x}", Sha256::digest(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_lifecycle() {
        let mut run = RunRecord::start("run-1", "exp-1", "random_forest");
        assert!(run.is_open());
        assert!(run.ended_at().is_none());
        run.close(RunStatus::Finished);
        assert!(!run.is_open());
        assert!(run.ended_at().unwrap() >= run.started_at());
    }

    #[test]
    fn test_cas_hash_of_empty_input() {
        assert_eq!(
            cas_hash(b""),
            "sha256:e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn test_artifact_record_hashes_content() {
        let a = ArtifactRecord::for_bytes("run-1", "model", b"abc");
        let b = ArtifactRecord::for_bytes("run-2", "other", b"abc");
        assert_eq!(a.cas_hash(), b.cas_hash());
        assert_eq!(a.size_bytes(), 3);
    }
}
