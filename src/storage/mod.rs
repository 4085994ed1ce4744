//! Storage backend (Arrow/Parquet)
//!
//! Loads the property table and turns it into a [`FeatureFrame`]:
//!
//! ```text
//! Parquet ──> RecordBatch* ──> widen date ──> drop columns ──> cast f64 ──> FeatureFrame
//! ```
//!
//! Append-only, like the source file: batches can be added, never edited.

use std::path::Path;

use arrow::array::{Array, Float64Array, RecordBatch};
use arrow::compute;
use arrow::datatypes::DataType;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::frame::{calendar, FeatureFrame, FeatureList};
use crate::{Error, Result};

/// How to carve a feature frame out of the raw table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSpec {
    /// Target column (sale price)
    pub target: String,
    /// String date column to widen into year/month/day, if any
    #[serde(default)]
    pub date_column: Option<String>,
    /// Columns that are neither features nor target (ids and the like)
    #[serde(default)]
    pub drop: Vec<String>,
}

impl FrameSpec {
    /// Spec with just a target column.
    #[must_use]
    pub fn new(target: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            date_column: None,
            drop: Vec::new(),
        }
    }

    /// Widen this date column into calendar features.
    #[must_use]
    pub fn date_column(mut self, column: impl Into<String>) -> Self {
        self.date_column = Some(column.into());
        self
    }

    /// Exclude a column from the features.
    #[must_use]
    pub fn drop_column(mut self, column: impl Into<String>) -> Self {
        self.drop.push(column.into());
        self
    }
}

/// Storage engine for Arrow/Parquet data
pub struct StorageEngine {
    batches: Vec<RecordBatch>,
}

impl StorageEngine {
    /// Create a new storage engine from existing batches
    ///
    /// Useful for testing
    #[must_use]
    pub fn new(batches: Vec<RecordBatch>) -> Self {
        Self { batches }
    }

    /// Load table from Parquet file
    ///
    /// # Errors
    /// Returns error if file cannot be read or parsed
    pub fn load_parquet<P: AsRef<Path>>(path: P) -> Result<Self> {
        use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;
        use std::fs::File;

        let file = File::open(path.as_ref())
            .map_err(|e| Error::StorageError(format!("Failed to open Parquet file: {e}")))?;

        let builder = ParquetRecordBatchReaderBuilder::try_new(file)
            .map_err(|e| Error::StorageError(format!("Failed to parse Parquet file: {e}")))?;

        let reader = builder
            .build()
            .map_err(|e| Error::StorageError(format!("Failed to create Parquet reader: {e}")))?;

        let mut batches = Vec::new();
        for batch in reader {
            let batch = batch
                .map_err(|e| Error::StorageError(format!("Failed to read record batch: {e}")))?;
            batches.push(batch);
        }

        info!(
            path = %path.as_ref().display(),
            batches = batches.len(),
            rows = batches.iter().map(RecordBatch::num_rows).sum::<usize>(),
            "loaded parquet table"
        );
        Ok(Self { batches })
    }

    /// Get all record batches
    #[must_use]
    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    /// Total row count across batches
    #[must_use]
    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(RecordBatch::num_rows).sum()
    }

    /// Append a batch
    ///
    /// # Errors
    ///
    /// Returns error if batch schema doesn't match existing batches
    pub fn append_batch(&mut self, batch: RecordBatch) -> Result<()> {
        if let Some(first) = self.batches.first() {
            let existing_schema = first.schema();
            if batch.schema() != existing_schema {
                return Err(Error::StorageError(format!(
                    "Schema mismatch: expected {:?}, got {:?}",
                    existing_schema,
                    batch.schema()
                )));
            }
        }

        self.batches.push(batch);
        Ok(())
    }

    /// Convert the stored table into a feature frame.
    ///
    /// Features are every remaining column (after widening the date and
    /// dropping `spec.drop` and the target), in table order.
    ///
    /// # Errors
    ///
    /// Returns error if the table is empty, the target is missing, a column
    /// cannot be cast to `Float64`, or any value is null.
    pub fn to_feature_frame(&self, spec: &FrameSpec) -> Result<FeatureFrame> {
        if self.batches.is_empty() {
            return Err(Error::InvalidInput("No data in storage".to_string()));
        }

        let mut feature_names: Option<Vec<String>> = None;
        let mut columns: Vec<Vec<f64>> = Vec::new();
        let mut target: Vec<f64> = Vec::with_capacity(self.num_rows());

        for batch in &self.batches {
            let batch = match &spec.date_column {
                Some(column) => calendar::widen_date_column(batch, column)?,
                None => batch.clone(),
            };
            let schema = batch.schema();

            let names: Vec<String> = schema
                .fields()
                .iter()
                .map(|f| f.name().clone())
                .filter(|name| *name != spec.target && !spec.drop.contains(name))
                .collect();
            if feature_names.is_none() {
                columns = vec![Vec::with_capacity(self.num_rows()); names.len()];
                feature_names = Some(names.clone());
            }

            let target_col = batch.column_by_name(&spec.target).ok_or_else(|| {
                Error::InvalidInput(format!("target column '{}' not found", spec.target))
            })?;
            target.extend_from_slice(float_values(target_col, &spec.target)?.values());

            for (slot, name) in columns.iter_mut().zip(&names) {
                let column = batch.column_by_name(name).ok_or_else(|| {
                    Error::StorageError(format!("column '{name}' missing from batch"))
                })?;
                slot.extend_from_slice(float_values(column, name)?.values());
            }
        }

        let features = FeatureList::new(feature_names.unwrap_or_default())?;
        debug!(
            features = features.len(),
            rows = target.len(),
            "built feature frame"
        );
        FeatureFrame::from_columns(features, &columns, target)
    }
}

fn float_values(column: &arrow::array::ArrayRef, name: &str) -> Result<Float64Array> {
    if column.null_count() > 0 {
        return Err(Error::InvalidInput(format!(
            "column '{name}' has {} null values",
            column.null_count()
        )));
    }
    let cast = compute::cast(column, &DataType::Float64)?;
    cast.as_any()
        .downcast_ref::<Float64Array>()
        .cloned()
        .ok_or_else(|| Error::StorageError(format!("column '{name}' did not cast to Float64")))
}
