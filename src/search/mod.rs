//! Hyperparameter search
//!
//! - [`space`]: declarative grid and the configurations it expands to
//! - [`folds`]: seeded train/test split and k-fold assignment
//! - [`scoring`]: higher-is-better scores
//! - [`engine`]: parallel cross-validated evaluation and ranking

pub mod engine;
pub mod folds;
pub mod scoring;
pub mod space;

pub use engine::{CandidateScore, CandidateStatus, GridSearch, SearchReport, FAILED_SCORE};
pub use folds::{DataSplit, FoldAssignment};
pub use scoring::Scoring;
pub use space::{Configuration, ParamValue, SearchSpace};
