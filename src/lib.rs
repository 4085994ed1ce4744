//! # house-price-search: cross-validated model search for sale-price regression
//!
//! Trains several regression families on structured property records,
//! picks the best configuration of each through an exhaustive k-fold grid
//! search, saves the winners as artifact bundles and later replays those
//! bundles into an experiment-tracking store.
//!
//! ```text
//! Parquet ─> StorageEngine ─> FeatureFrame
//!                                │ DataSplit (held-out test rows)
//!                                ▼
//!           SearchSpace ─> GridSearch (rayon, shared folds) ─> SearchReport
//!                                                                │
//!                                   ModelSelector (refit + test) ▼
//!                                                         ArtifactBundle
//!                                                                │ ArtifactStore
//!                                                     <stem>.bin + <stem>.json
//!                                                                │
//!                                       TrackingReplay ─> TrackingStore runs
//! ```
//!
//! ## Example
//!
//! ```rust
//! use house_price_search::config::SearchConfig;
//! use house_price_search::frame::{FeatureFrame, FeatureList, Record};
//! use house_price_search::model::ModelFamily;
//! use house_price_search::search::{DataSplit, GridSearch, SearchSpace};
//! use house_price_search::selection::ModelSelector;
//!
//! let features = FeatureList::new(["sqft_living", "bedrooms"])?;
//! let rows: Vec<Vec<f64>> = (0..60)
//!     .map(|i| vec![f64::from(800 + 25 * i), f64::from(1 + i % 5)])
//!     .collect();
//! let prices = rows.iter().map(|r| 150.0 * r[0] + 8000.0 * r[1]).collect();
//! let frame = FeatureFrame::from_rows(features, &rows, prices)?;
//!
//! let split = DataSplit::train_test(frame.n_rows(), 0.2, 42)?;
//! let (train, test) = (frame.take(split.train()), frame.take(split.test()));
//!
//! let space = SearchSpace::new().param("max_depth", [3_i64, 5]);
//! let report = GridSearch::new(SearchConfig::default()).run(&ModelFamily::DecisionTree, &space, &train)?;
//! let bundle = ModelSelector::new().select(&ModelFamily::DecisionTree, &report, &train, &test)?;
//!
//! let house = Record::new().with("sqft_living", 1500.0).with("bedrooms", 3.0);
//! assert!(bundle.model.predict(&house)? > 0.0);
//! # Ok::<(), house_price_search::Error>(())
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

pub mod artifact;
pub mod config;
pub mod error;
pub mod frame;
pub mod metrics;
pub mod model;
pub mod pipeline;
pub mod replay;
pub mod search;
pub mod selection;
pub mod storage;
pub mod tracking;

pub use error::{Error, Result};
