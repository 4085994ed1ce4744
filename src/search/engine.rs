//! Cross-validated grid search
//!
//! ```text
//! SearchSpace ──expand──> [cfg_0 .. cfg_m)
//! train rows  ──seeded──> FoldAssignment (k folds, shared by every cfg)
//!
//! tasks = cfg × fold ──rayon pool──> one score slot per task
//!                                   └─merge by cfg─> mean / variance ─> ranking
//! ```
//!
//! Workers only read the training frame and the fold frames; each writes its
//! own output slot, so evaluation needs no locking. A failing fit never
//! aborts the search: its configuration is ranked last with
//! [`FAILED_SCORE`] and the reason is kept for the report.

use std::time::Instant;

use rayon::prelude::*;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use super::folds::FoldAssignment;
use super::scoring::Scoring;
use super::space::{Configuration, SearchSpace};
use crate::config::SearchConfig;
use crate::frame::FeatureFrame;
use crate::model::Regressor;
use crate::{Error, Result};

/// Sentinel score of a configuration that failed on at least one fold.
pub const FAILED_SCORE: f64 = f64::NEG_INFINITY;

/// Whether a candidate produced a usable score.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum CandidateStatus {
    /// Every fold fitted and scored
    Scored,
    /// At least one fold failed; the first reason is kept
    Failed {
        /// Fold that failed first
        fold: usize,
        /// Error message of that fold
        reason: String,
    },
}

/// Cross-validated score of one configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Position in the grid enumeration (tie-breaker)
    pub index: usize,
    /// 1-based rank after sorting
    pub rank: usize,
    /// Evaluated configuration
    pub configuration: Configuration,
    /// Mean fold score, or [`FAILED_SCORE`]
    pub mean_score: f64,
    /// Population variance of the fold scores (0 for failures)
    pub variance: f64,
    /// Per-fold scores of the folds that succeeded
    pub fold_scores: Vec<f64>,
    /// Outcome
    #[serde(flatten)]
    pub status: CandidateStatus,
}

impl CandidateScore {
    /// Whether the candidate was scored on every fold.
    #[must_use]
    pub const fn is_scored(&self) -> bool {
        matches!(self.status, CandidateStatus::Scored)
    }
}

/// Ranked outcome of a grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchReport {
    estimator: String,
    scoring: Scoring,
    folds: FoldAssignment,
    fits: usize,
    ranking: Vec<CandidateScore>,
}

impl SearchReport {
    /// Name of the estimator searched.
    #[must_use]
    pub fn estimator(&self) -> &str {
        &self.estimator
    }

    /// Scoring used for the ranking.
    #[must_use]
    pub const fn scoring(&self) -> Scoring {
        self.scoring
    }

    /// Fold assignment every configuration was scored against.
    #[must_use]
    pub const fn folds(&self) -> &FoldAssignment {
        &self.folds
    }

    /// Number of (configuration, fold) fits performed.
    #[must_use]
    pub const fn fits_performed(&self) -> usize {
        self.fits
    }

    /// Number of configurations evaluated.
    #[must_use]
    pub fn n_configurations(&self) -> usize {
        self.ranking.len()
    }

    /// Candidates, best first.
    #[must_use]
    pub fn ranking(&self) -> &[CandidateScore] {
        &self.ranking
    }

    /// Best scored candidate, if any configuration succeeded.
    #[must_use]
    pub fn best(&self) -> Option<&CandidateScore> {
        self.ranking.first().filter(|c| c.is_scored())
    }

    /// Candidates that failed, in ranking order.
    pub fn failures(&self) -> impl Iterator<Item = &CandidateScore> {
        self.ranking.iter().filter(|c| !c.is_scored())
    }
}

/// Exhaustive grid search with k-fold cross-validation.
#[derive(Debug, Clone, Default)]
pub struct GridSearch {
    config: SearchConfig,
}

type FoldOutcome = std::result::Result<f64, String>;

impl GridSearch {
    /// Create a search with the given settings.
    #[must_use]
    pub const fn new(config: SearchConfig) -> Self {
        Self { config }
    }

    /// Settings of this search.
    #[must_use]
    pub const fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Score every configuration of `space` on `train` and rank them.
    ///
    /// # Errors
    ///
    /// Returns `InvalidInput` if the space names a parameter the estimator
    /// does not accept, a parameter has no candidates, the fold count does
    /// not fit the data, or the worker pool cannot be built. Individual fit
    /// failures are not errors; they show up in [`SearchReport::failures`].
    pub fn run<R>(
        &self,
        estimator: &R,
        space: &SearchSpace,
        train: &FeatureFrame,
    ) -> Result<SearchReport>
    where
        R: Regressor + ?Sized,
    {
        let accepted = estimator.accepted_params();
        if !accepted.is_empty() {
            if let Some(unknown) = space.names().find(|name| !accepted.contains(name)) {
                return Err(Error::InvalidInput(format!(
                    "{} does not accept parameter '{unknown}'",
                    estimator.name()
                )));
            }
        }

        let configurations = space.configurations()?;
        let folds = FoldAssignment::new(train.n_rows(), self.config.folds, self.config.seed)?;
        let fold_frames: Vec<(FeatureFrame, FeatureFrame)> = (0..folds.k())
            .map(|i| (train.take(&folds.fit_rows(i)), train.take(folds.fold(i))))
            .collect();

        let tasks: Vec<(usize, usize)> = (0..configurations.len())
            .flat_map(|c| (0..folds.k()).map(move |f| (c, f)))
            .collect();

        let pool_size = self.config.workers();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(pool_size)
            .thread_name(|i| format!("cv-worker-{i}"))
            .build()
            .map_err(|e| Error::InvalidInput(format!("cannot build worker pool: {e}")))?;

        info!(
            estimator = estimator.name(),
            configurations = configurations.len(),
            folds = folds.k(),
            fits = tasks.len(),
            workers = pool_size,
            "starting grid search"
        );
        let started = Instant::now();

        let scoring = self.config.scoring;
        let outcomes: Vec<FoldOutcome> = pool.install(|| {
            tasks
                .par_iter()
                .map(|&(c, f)| {
                    let (fit_part, holdout) = &fold_frames[f];
                    evaluate(estimator, &configurations[c], fit_part, holdout, scoring)
                })
                .collect()
        });

        // Merge: every fold of a configuration has reported by now.
        let mut by_config: FxHashMap<usize, Vec<(usize, FoldOutcome)>> = FxHashMap::default();
        for (&(c, f), outcome) in tasks.iter().zip(outcomes) {
            by_config.entry(c).or_default().push((f, outcome));
        }

        let mut ranking: Vec<CandidateScore> = configurations
            .into_iter()
            .enumerate()
            .map(|(index, configuration)| {
                let mut outcomes = by_config.remove(&index).unwrap_or_default();
                outcomes.sort_by_key(|(f, _)| *f);
                summarize(index, configuration, outcomes)
            })
            .collect();

        // Stable: equal scores keep enumeration order, so the first-seen wins.
        ranking.sort_by(|a, b| b.mean_score.total_cmp(&a.mean_score));
        for (i, candidate) in ranking.iter_mut().enumerate() {
            candidate.rank = i + 1;
        }

        for failed in ranking.iter().filter(|c| !c.is_scored()) {
            if let CandidateStatus::Failed { fold, reason } = &failed.status {
                warn!(
                    estimator = estimator.name(),
                    configuration = %failed.configuration,
                    fold,
                    reason = reason.as_str(),
                    "configuration failed"
                );
            }
        }
        if let Some(best) = ranking.first() {
            info!(
                estimator = estimator.name(),
                best = %best.configuration,
                score = best.mean_score,
                elapsed_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
                "grid search finished"
            );
        }

        Ok(SearchReport {
            estimator: estimator.name().to_string(),
            scoring,
            folds,
            fits: tasks.len(),
            ranking,
        })
    }
}

fn evaluate<R>(
    estimator: &R,
    configuration: &Configuration,
    fit_part: &FeatureFrame,
    holdout: &FeatureFrame,
    scoring: Scoring,
) -> FoldOutcome
where
    R: Regressor + ?Sized,
{
    let model = estimator
        .fit(configuration, fit_part)
        .map_err(|e| e.to_string())?;
    let predictions = model.predict_frame(holdout).map_err(|e| e.to_string())?;
    let score = scoring
        .score(holdout.target(), &predictions)
        .map_err(|e| e.to_string())?;
    if score.is_finite() {
        debug!(configuration = %configuration, score, "fold scored");
        Ok(score)
    } else {
        Err(format!("non-finite {} score", scoring.as_str()))
    }
}

#[allow(clippy::cast_precision_loss)]
fn summarize(
    index: usize,
    configuration: Configuration,
    outcomes: Vec<(usize, FoldOutcome)>,
) -> CandidateScore {
    let mut fold_scores = Vec::with_capacity(outcomes.len());
    let mut failure = None;
    for (fold, outcome) in outcomes {
        match outcome {
            Ok(score) => fold_scores.push(score),
            Err(reason) => {
                failure.get_or_insert(CandidateStatus::Failed { fold, reason });
            }
        }
    }

    match failure {
        Some(status) => CandidateScore {
            index,
            rank: 0,
            configuration,
            mean_score: FAILED_SCORE,
            variance: 0.0,
            fold_scores,
            status,
        },
        None => {
            let n = fold_scores.len() as f64;
            let mean = fold_scores.iter().sum::<f64>() / n;
            let variance = fold_scores.iter().map(|s| (s - mean).powi(2)).sum::<f64>() / n;
            CandidateScore {
                index,
                rank: 0,
                configuration,
                mean_score: mean,
                variance,
                fold_scores,
                status: CandidateStatus::Scored,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::frame::FeatureList;
    use crate::model::{FittedModel, ModelFamily};

    fn frame(n: i32) -> FeatureFrame {
        let rows: Vec<Vec<f64>> = (0..n)
            .map(|i| vec![f64::from(i), f64::from((i * 13) % 7)])
            .collect();
        let target = rows
            .iter()
            .map(|r| 100.0 + 4.0 * r[0] + if r[1] > 3.0 { 30.0 } else { 0.0 })
            .collect();
        FeatureFrame::from_rows(FeatureList::new(["x", "z"]).unwrap(), &rows, target).unwrap()
    }

    /// Tree family that refuses `max_depth = 1`.
    struct Flaky;

    impl Regressor for Flaky {
        fn name(&self) -> &str {
            "flaky"
        }

        fn accepted_params(&self) -> &[&'static str] {
            &["max_depth"]
        }

        fn fit(&self, config: &Configuration, frame: &FeatureFrame) -> Result<FittedModel> {
            if config.opt_usize_or("max_depth", None)? == Some(1) {
                return Err(Error::FitFailure("degenerate fold".to_string()));
            }
            ModelFamily::DecisionTree.fit(config, frame)
        }
    }

    #[test]
    fn test_counts_configurations_and_fits() {
        let space = SearchSpace::new().param("max_depth", [1_i64, 2, 4]);
        let search = GridSearch::new(SearchConfig::default().folds(4).pool_size(2));
        let report = search
            .run(&ModelFamily::DecisionTree, &space, &frame(40))
            .unwrap();
        assert_eq!(report.n_configurations(), 3);
        assert_eq!(report.fits_performed(), 12);
        assert!(report
            .ranking()
            .iter()
            .all(|c| c.fold_scores.len() == 4 && c.is_scored()));
    }

    #[test]
    fn test_failure_is_recorded_not_fatal() {
        let space = SearchSpace::new().param("max_depth", [1_i64, 3]);
        let report = GridSearch::default()
            .run(&Flaky, &space, &frame(30))
            .unwrap();

        assert_eq!(report.best().unwrap().configuration.get("max_depth").unwrap().to_string(), "3");
        let failures: Vec<_> = report.failures().collect();
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].mean_score, FAILED_SCORE);
        assert_eq!(failures[0].rank, 2);
        assert!(matches!(
            &failures[0].status,
            CandidateStatus::Failed { fold: 0, reason } if reason.contains("degenerate fold")
        ));
    }

    #[test]
    fn test_all_failed_has_no_best() {
        let space = SearchSpace::new().param("max_depth", [1_i64]);
        let report = GridSearch::default()
            .run(&Flaky, &space, &frame(30))
            .unwrap();
        assert!(report.best().is_none());
    }

    #[test]
    fn test_ties_keep_enumeration_order() {
        // A depth-1 tree on 20 fit rows splits the same for every threshold.
        let space = SearchSpace::new()
            .param("max_depth", [1_i64])
            .param("min_samples_split", [2_i64, 3, 4]);
        let report = GridSearch::default()
            .run(&ModelFamily::DecisionTree, &space, &frame(30))
            .unwrap();
        let order: Vec<usize> = report.ranking().iter().map(|c| c.index).collect();
        assert_eq!(order, vec![0, 1, 2]);
    }

    #[test]
    fn test_unknown_parameter_rejected_up_front() {
        let space = SearchSpace::new().param("n_estimators", [10_i64]);
        let err = GridSearch::default()
            .run(&ModelFamily::DecisionTree, &space, &frame(30))
            .unwrap_err();
        assert!(err.to_string().contains("n_estimators"));
    }

    #[test]
    fn test_too_few_rows_for_folds() {
        let space = SearchSpace::new();
        let search = GridSearch::new(SearchConfig::default().folds(5));
        assert!(search
            .run(&ModelFamily::LinearRegression, &space, &frame(3))
            .is_err());
    }
}
