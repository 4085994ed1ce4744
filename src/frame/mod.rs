//! Feature Frame - the numeric view of the dataset the search runs on
//!
//! ```text
//! FeatureFrame
//!   ├── FeatureList  (ordered column names, fixed at training time)
//!   ├── data         (row-major f64 matrix, n_rows × n_features)
//!   └── target       (sale price, one per row)
//! ```
//!
//! Ingestion and date widening live in [`crate::storage`] and [`calendar`];
//! by the time rows reach this module every column is already numeric.

pub mod calendar;

use std::collections::{BTreeMap, HashSet};

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Ordered, duplicate-free list of feature names agreed at training time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "Vec<String>", into = "Vec<String>")]
pub struct FeatureList(Vec<String>);

impl FeatureList {
    /// Create a feature list.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a name appears twice.
    pub fn new<I, S>(names: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut seen = HashSet::with_capacity(names.len());
        for name in &names {
            if !seen.insert(name.as_str()) {
                return Err(Error::InvalidInput(format!(
                    "duplicate feature name '{name}'"
                )));
            }
        }
        Ok(Self(names))
    }

    /// Feature names in training order.
    #[must_use]
    pub fn names(&self) -> &[String] {
        &self.0
    }

    /// Number of features.
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the list is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Position of a feature, if present.
    #[must_use]
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.0.iter().position(|n| n == name)
    }
}

impl TryFrom<Vec<String>> for FeatureList {
    type Error = Error;

    fn try_from(names: Vec<String>) -> Result<Self> {
        Self::new(names)
    }
}

impl From<FeatureList> for Vec<String> {
    fn from(list: FeatureList) -> Self {
        list.0
    }
}

/// One property observation: feature name → value, plus an optional sale price.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Record {
    values: BTreeMap<String, f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    target: Option<f64>,
}

impl Record {
    /// Create an empty record.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a feature value.
    #[must_use]
    pub fn with(mut self, name: impl Into<String>, value: f64) -> Self {
        self.values.insert(name.into(), value);
        self
    }

    /// Set the target value.
    #[must_use]
    pub const fn with_target(mut self, target: f64) -> Self {
        self.target = Some(target);
        self
    }

    /// Get a feature value.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<f64> {
        self.values.get(name).copied()
    }

    /// Target value, if known.
    #[must_use]
    pub const fn target(&self) -> Option<f64> {
        self.target
    }

    /// Number of feature fields carried.
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Whether the record has no feature fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Lay the record out in feature-list order.
    ///
    /// # Errors
    ///
    /// Returns `DataShape` if any listed feature is missing or the record
    /// carries a field the list does not know.
    pub fn to_row(&self, features: &FeatureList) -> Result<Vec<f64>> {
        let missing: Vec<String> = features
            .names()
            .iter()
            .filter(|name| !self.values.contains_key(name.as_str()))
            .cloned()
            .collect();
        let extra: Vec<String> = self
            .values
            .keys()
            .filter(|key| features.index_of(key).is_none())
            .cloned()
            .collect();

        if !missing.is_empty() || !extra.is_empty() {
            return Err(Error::DataShape { missing, extra });
        }

        Ok(features
            .names()
            .iter()
            .map(|name| self.values[name.as_str()])
            .collect())
    }
}

impl From<BTreeMap<String, f64>> for Record {
    fn from(values: BTreeMap<String, f64>) -> Self {
        Self {
            values,
            target: None,
        }
    }
}

/// Dense numeric matrix of named feature columns plus a target column.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureFrame {
    features: FeatureList,
    data: Vec<f64>,
    target: Vec<f64>,
}

impl FeatureFrame {
    /// Build a frame from rows.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if a row width differs from the feature count
    /// or the target length differs from the row count.
    pub fn from_rows(features: FeatureList, rows: &[Vec<f64>], target: Vec<f64>) -> Result<Self> {
        if rows.len() != target.len() {
            return Err(Error::InvalidInput(format!(
                "{} rows but {} target values",
                rows.len(),
                target.len()
            )));
        }
        let width = features.len();
        let mut data = Vec::with_capacity(rows.len() * width);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(Error::InvalidInput(format!(
                    "row {i} has {} values, expected {width}",
                    row.len()
                )));
            }
            data.extend_from_slice(row);
        }
        Ok(Self {
            features,
            data,
            target,
        })
    }

    /// Build a frame from columns (one `Vec` per feature, in list order).
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the column count or any column length is off.
    pub fn from_columns(
        features: FeatureList,
        columns: &[Vec<f64>],
        target: Vec<f64>,
    ) -> Result<Self> {
        if columns.len() != features.len() {
            return Err(Error::InvalidInput(format!(
                "{} columns for {} features",
                columns.len(),
                features.len()
            )));
        }
        let n_rows = target.len();
        if let Some((i, _)) = columns.iter().enumerate().find(|(_, c)| c.len() != n_rows) {
            return Err(Error::InvalidInput(format!(
                "column '{}' has {} values, expected {n_rows}",
                features.names()[i],
                columns[i].len()
            )));
        }
        let mut data = Vec::with_capacity(n_rows * columns.len());
        for row in 0..n_rows {
            data.extend(columns.iter().map(|c| c[row]));
        }
        Ok(Self {
            features,
            data,
            target,
        })
    }

    /// Feature list of this frame.
    #[must_use]
    pub const fn features(&self) -> &FeatureList {
        &self.features
    }

    /// Number of rows.
    #[must_use]
    pub fn n_rows(&self) -> usize {
        self.target.len()
    }

    /// Number of feature columns.
    #[must_use]
    pub fn n_features(&self) -> usize {
        self.features.len()
    }

    /// Whether the frame has no rows.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.target.is_empty()
    }

    /// Feature values of row `i`.
    ///
    /// # Panics
    ///
    /// Panics if `i` is out of bounds.
    #[must_use]
    pub fn row(&self, i: usize) -> &[f64] {
        let width = self.n_features();
        &self.data[i * width..(i + 1) * width]
    }

    /// Iterate over rows.
    pub fn rows(&self) -> impl Iterator<Item = &[f64]> + '_ {
        (0..self.n_rows()).map(move |i| self.row(i))
    }

    /// Target column.
    #[must_use]
    pub fn target(&self) -> &[f64] {
        &self.target
    }

    /// Copy the given rows (in the given order) into a new frame.
    ///
    /// # Panics
    ///
    /// Panics if an index is out of bounds.
    #[must_use]
    pub fn take(&self, indices: &[usize]) -> Self {
        let mut data = Vec::with_capacity(indices.len() * self.n_features());
        let mut target = Vec::with_capacity(indices.len());
        for &i in indices {
            data.extend_from_slice(self.row(i));
            target.push(self.target[i]);
        }
        Self {
            features: self.features.clone(),
            data,
            target,
        }
    }

    /// Row `i` as a [`Record`] (target included).
    #[must_use]
    pub fn record(&self, i: usize) -> Record {
        let values = self
            .features
            .names()
            .iter()
            .cloned()
            .zip(self.row(i).iter().copied())
            .collect::<BTreeMap<_, _>>();
        Record::from(values).with_target(self.target[i])
    }
}
