//! Metadata schema reconciliation
//!
//! Producers have written bundle metadata in more than one shape over time.
//! Each shape is declared once in [`DECLARED_SHAPES`]; a document is read
//! through the single shape it matches and comes out with canonical metric
//! names.
//!
//! ```text
//! grid-search shape               selected-model shape
//! {                               {
//!   "model": "rf_gridsearch",       "features": [...],
//!   "features": [...],              "best_params": {...},
//!   "params": {...},                "best_score": -1.9e10,
//!   "metrics": {                    "rmse": 131000.0,
//!     "RMSE": ..., "R²": ...        "mae": 70000.0,
//!   }                               "r2": 0.88
//! }                               }
//!            \                     /
//!             canonical: rmse mae r2 mse best_score
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde_json::{Map, Value};

use crate::frame::FeatureList;
use crate::search::{Configuration, ParamValue};
use crate::{Error, Result};

/// Canonical root mean squared error.
pub const RMSE: &str = "rmse";
/// Canonical mean absolute error.
pub const MAE: &str = "mae";
/// Canonical coefficient of determination.
pub const R2: &str = "r2";
/// Canonical mean squared error (derived from RMSE when absent).
pub const MSE: &str = "mse";
/// Canonical cross-validation score.
pub const BEST_SCORE: &str = "best_score";

/// Where a shape keeps its metrics.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricLocation {
    /// Inside the named object field
    Nested(&'static str),
    /// Directly in the document
    TopLevel,
}

/// Declaration of one metadata shape.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetadataShape {
    /// Shape name used in logs and errors
    pub name: &'static str,
    /// Object field holding the hyperparameters
    pub params_field: &'static str,
    /// Location of the metric fields
    pub metrics: MetricLocation,
    /// Accepted aliases per canonical metric, tried in order
    pub aliases: &'static [(&'static str, &'static [&'static str])],
    /// Top-level field holding the run name
    pub run_name_field: &'static str,
    /// Top-level field holding the feature list
    pub features_field: &'static str,
    /// Top-level field holding the cross-validation score
    pub score_field: &'static str,
}

/// Shape written by the per-family grid-search step.
pub const GRID_SEARCH_SHAPE: MetadataShape = MetadataShape {
    name: "grid_search",
    params_field: "params",
    metrics: MetricLocation::Nested("metrics"),
    aliases: &[
        (RMSE, &["RMSE", "rmse"]),
        (MAE, &["MAE", "mae"]),
        (R2, &["R²", "R2", "r2", "r2_score"]),
        (MSE, &["MSE", "mse"]),
    ],
    run_name_field: "model",
    features_field: "features",
    score_field: "best_score",
};

/// Shape written for the overall selected model.
pub const SELECTED_SHAPE: MetadataShape = MetadataShape {
    name: "selected",
    params_field: "best_params",
    metrics: MetricLocation::TopLevel,
    aliases: &[
        (RMSE, &["rmse", "RMSE"]),
        (MAE, &["mae", "MAE"]),
        (R2, &["r2", "R2", "R²", "r2_score"]),
        (MSE, &["mse", "MSE"]),
    ],
    run_name_field: "model",
    features_field: "features",
    score_field: "best_score",
};

/// Every shape a metadata document may take.
pub const DECLARED_SHAPES: &[MetadataShape] = &[GRID_SEARCH_SHAPE, SELECTED_SHAPE];

/// A metadata document read through its declared shape.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconciledMetadata {
    /// Name of the matched shape
    pub shape: &'static str,
    /// Run name, if the document carries one
    pub run_name: Option<String>,
    /// Hyperparameters
    pub params: Configuration,
    /// Metrics keyed by canonical name
    pub metrics: BTreeMap<String, f64>,
    /// Feature list, if the document carries one
    pub features: Option<FeatureList>,
    /// Creation time as written, if any
    pub created_at: Option<String>,
}

impl ReconciledMetadata {
    /// Metric by canonical name.
    #[must_use]
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).copied()
    }
}

/// Read and reconcile a metadata file.
///
/// # Errors
///
/// `ArtifactNotFound` if the file is missing, `ArtifactIo` if it cannot be
/// read, `MalformedMetadata` if it is not JSON, and `SchemaMismatch` if it
/// does not match exactly one declared shape.
pub fn read_metadata(path: &Path) -> Result<ReconciledMetadata> {
    let text = std::fs::read_to_string(path).map_err(|source| {
        if source.kind() == std::io::ErrorKind::NotFound {
            Error::ArtifactNotFound(path.to_path_buf())
        } else {
            Error::ArtifactIo {
                path: path.to_path_buf(),
                source,
            }
        }
    })?;
    let doc: Value = serde_json::from_str(&text).map_err(|source| Error::MalformedMetadata {
        path: path.to_path_buf(),
        source,
    })?;
    reconcile(path, &doc)
}

/// Reconcile an already parsed document. `path` is only used in errors.
///
/// # Errors
///
/// Returns `SchemaMismatch` unless exactly one declared shape matches, or
/// when a matched field has the wrong type.
pub fn reconcile(path: &Path, doc: &Value) -> Result<ReconciledMetadata> {
    let mismatch = |reason: String| Error::SchemaMismatch {
        path: path.to_path_buf(),
        reason,
    };

    let Value::Object(doc) = doc else {
        return Err(mismatch("metadata is not a JSON object".to_string()));
    };

    let matched: Vec<&MetadataShape> = DECLARED_SHAPES
        .iter()
        .filter(|shape| matches_shape(shape, doc))
        .collect();
    let shape = match matched.as_slice() {
        [shape] => *shape,
        [] => {
            let names: Vec<&str> = DECLARED_SHAPES.iter().map(|s| s.name).collect();
            return Err(mismatch(format!(
                "matches none of the declared shapes ({})",
                names.join(", ")
            )));
        }
        several => {
            let names: Vec<&str> = several.iter().map(|s| s.name).collect();
            return Err(mismatch(format!(
                "ambiguous: matches shapes {}",
                names.join(" and ")
            )));
        }
    };

    let params = match doc.get(shape.params_field) {
        Some(Value::Object(map)) => map
            .iter()
            .map(|(name, value)| (name.clone(), param_value(value)))
            .fold(Configuration::new(), |config, (name, value)| {
                config.with(name, value)
            }),
        _ => Configuration::new(),
    };

    let source = metric_source(shape, doc).unwrap_or(doc);
    let mut metrics = BTreeMap::new();
    for (canonical, aliases) in shape.aliases {
        if let Some((alias, value)) = aliases
            .iter()
            .find_map(|alias| source.get(*alias).map(|v| (*alias, v)))
        {
            let number = value.as_f64().ok_or_else(|| {
                mismatch(format!("metric '{alias}' is not a number: {value}"))
            })?;
            metrics.insert((*canonical).to_string(), number);
        }
    }
    if !metrics.contains_key(MSE) {
        if let Some(rmse) = metrics.get(RMSE).copied() {
            metrics.insert(MSE.to_string(), rmse * rmse);
        }
    }
    match doc.get(shape.score_field) {
        None | Some(Value::Null) => {}
        Some(value) => {
            let score = value.as_f64().ok_or_else(|| {
                mismatch(format!("'{}' is not a number: {value}", shape.score_field))
            })?;
            metrics.insert(BEST_SCORE.to_string(), score);
        }
    }
    if let Some((name, value)) = metrics.iter().find(|(_, v)| !v.is_finite()) {
        return Err(mismatch(format!("metric '{name}' is not finite: {value}")));
    }

    let run_name = match doc.get(shape.run_name_field) {
        None | Some(Value::Null) => None,
        Some(Value::String(name)) if name.is_empty() => None,
        Some(Value::String(name)) => Some(name.clone()),
        Some(other) => {
            return Err(mismatch(format!(
                "'{}' is not a string: {other}",
                shape.run_name_field
            )))
        }
    };

    let features = match doc.get(shape.features_field) {
        None | Some(Value::Null) => None,
        Some(Value::Array(items)) => {
            let names = items
                .iter()
                .map(|item| {
                    item.as_str().map(str::to_string).ok_or_else(|| {
                        mismatch(format!("feature name is not a string: {item}"))
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Some(FeatureList::new(names).map_err(|e| mismatch(e.to_string()))?)
        }
        Some(other) => {
            return Err(mismatch(format!(
                "'{}' is not an array: {other}",
                shape.features_field
            )))
        }
    };

    let created_at = doc
        .get("created_at")
        .and_then(Value::as_str)
        .map(str::to_string);

    Ok(ReconciledMetadata {
        shape: shape.name,
        run_name,
        params,
        metrics,
        features,
        created_at,
    })
}

fn metric_source<'a>(shape: &MetadataShape, doc: &'a Map<String, Value>) -> Option<&'a Map<String, Value>> {
    match shape.metrics {
        MetricLocation::Nested(field) => doc.get(field).and_then(Value::as_object),
        MetricLocation::TopLevel => Some(doc),
    }
}

fn matches_shape(shape: &MetadataShape, doc: &Map<String, Value>) -> bool {
    if !doc.get(shape.params_field).is_some_and(Value::is_object) {
        return false;
    }
    metric_source(shape, doc).is_some_and(|source| {
        shape
            .aliases
            .iter()
            .flat_map(|(_, aliases)| aliases.iter())
            .any(|alias| source.contains_key(*alias))
    })
}

/// Parameters are logged as written; nested values keep their JSON text.
fn param_value(value: &Value) -> ParamValue {
    ParamValue::from_json(value).unwrap_or_else(|| ParamValue::Text(value.to_string()))
}
