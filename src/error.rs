//! Error types for house-price-search
//!
//! Every variant names the offending input (feature, path, parameter) so the
//! message alone is enough to act on.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// house-price-search error types
#[derive(Error, Debug)]
pub enum Error {
    /// Record does not match the training-time feature list
    #[error("Record does not match feature list: missing {missing:?}, unexpected {extra:?}")]
    DataShape {
        /// Features in the list but absent from the record
        missing: Vec<String>,
        /// Fields in the record that are not in the list
        extra: Vec<String>,
    },

    /// A single model fit failed (degenerate data, bad parameter value, ...)
    #[error("Fit failed: {0}")]
    FitFailure(String),

    /// One half of an artifact bundle is missing on disk
    #[error("Artifact not found: {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// An artifact file exists but could not be read or written
    #[error("Artifact IO error at {}: {source}", path.display())]
    ArtifactIo {
        /// File being accessed
        path: PathBuf,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// Model blob cannot be turned back into a predictor
    #[error("Corrupt artifact {}: {reason}", path.display())]
    Corrupt {
        /// Offending file
        path: PathBuf,
        /// What went wrong while decoding
        reason: String,
    },

    /// Metadata document is not valid JSON
    #[error("Malformed metadata {}: {source}", path.display())]
    MalformedMetadata {
        /// Offending metadata file
        path: PathBuf,
        /// JSON parse error
        #[source]
        source: serde_json::Error,
    },

    /// Metadata document matches none (or more than one) of the declared shapes
    #[error("Metadata schema mismatch in {}: {reason}", path.display())]
    SchemaMismatch {
        /// Offending metadata file
        path: PathBuf,
        /// Which shapes were tried and why they failed
        reason: String,
    },

    /// The tracking store rejected a registration
    #[error("Tracking store error: {0}")]
    TrackingStore(String),

    /// Invalid caller input (empty grid, bad fold count, unknown parameter)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Storage error (Parquet/Arrow ingestion)
    #[error("Storage error: {0}")]
    StorageError(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Arrow/Parquet error
    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

impl Error {
    /// Whether a batch replay may continue past this error.
    ///
    /// Artifact and schema problems only poison their own source pair;
    /// everything else (tracking store rejections in particular) aborts.
    #[must_use]
    pub const fn is_per_source(&self) -> bool {
        matches!(
            self,
            Self::ArtifactNotFound(_)
                | Self::ArtifactIo { .. }
                | Self::Corrupt { .. }
                | Self::MalformedMetadata { .. }
                | Self::SchemaMismatch { .. }
        )
    }
}
