//! Experiment tracking
//!
//! [`TrackingStore`] is the seam replay writes through. Handles are passed
//! explicitly; there is no ambient "active run".
//!
//! ```rust
//! use house_price_search::tracking::{MemoryTrackingStore, TrackingStore};
//! use house_price_search::search::ParamValue;
//!
//! let store = MemoryTrackingStore::new("housing_price");
//! let run = store.start_run("random_forest").unwrap();
//! store.log_param(&run, "n_estimators", &ParamValue::Int(200)).unwrap();
//! store.log_metric(&run, "rmse", 131_000.0).unwrap();
//! assert_eq!(store.latest_metric(run.run_id(), "rmse"), Some(131_000.0));
//! ```

mod memory;
mod records;

pub use memory::{MemoryTrackingStore, TrackedRun};
pub use records::{cas_hash, ArtifactRecord, ExperimentRecord, MetricRecord, RunRecord, RunStatus};

use serde::{Deserialize, Serialize};

use crate::model::FittedModel;
use crate::search::ParamValue;
use crate::Result;

/// Reference to a started run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunHandle {
    run_id: String,
    name: String,
}

impl RunHandle {
    /// Handle for an existing run.
    #[must_use]
    pub fn new(run_id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            run_id: run_id.into(),
            name: name.into(),
        }
    }

    /// Store-assigned run ID.
    #[must_use]
    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    /// Run name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Destination for replayed runs.
///
/// Every failure is reported as `Error::TrackingStore`; callers do not retry.
pub trait TrackingStore {
    /// Open a new run.
    ///
    /// # Errors
    ///
    /// Fails if the store rejects the run (for example a duplicate name).
    fn start_run(&self, name: &str) -> Result<RunHandle>;

    /// Record one hyperparameter of an open run.
    ///
    /// # Errors
    ///
    /// Fails for unknown or closed runs, or a parameter logged twice.
    fn log_param(&self, run: &RunHandle, key: &str, value: &ParamValue) -> Result<()>;

    /// Append one metric value to an open run.
    ///
    /// # Errors
    ///
    /// Fails for unknown or closed runs and non-finite values.
    fn log_metric(&self, run: &RunHandle, key: &str, value: f64) -> Result<()>;

    /// Attach the run's model.
    ///
    /// # Errors
    ///
    /// Fails for unknown or closed runs, or a run that already has a model.
    fn log_model(&self, run: &RunHandle, model: &FittedModel, name: &str) -> Result<()>;
}
