//! Model selection: refit the winning configuration and evaluate it once
//!
//! The held-out test split is never seen by the search; it is only used
//! here, after the winner is fixed.

use tracing::info;

use crate::artifact::{ArtifactBundle, ModelMetadata};
use crate::frame::FeatureFrame;
use crate::metrics::RegressionMetrics;
use crate::model::Regressor;
use crate::search::SearchReport;
use crate::{Error, Result};

/// Turns a search report into an artifact bundle.
#[derive(Debug, Clone, Default)]
pub struct ModelSelector {
    model_name: Option<String>,
}

impl ModelSelector {
    /// Selector naming bundles after the estimator.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Name bundles `name` instead of the estimator name.
    #[must_use]
    pub fn model_name(mut self, name: impl Into<String>) -> Self {
        self.model_name = Some(name.into());
        self
    }

    /// Refit the best scored candidate on all of `train` and score it on
    /// `test`.
    ///
    /// # Errors
    ///
    /// Returns `FitFailure` if every candidate failed or the refit fails,
    /// and `DataShape` if `test` does not have the training features.
    pub fn select<R>(
        &self,
        estimator: &R,
        report: &SearchReport,
        train: &FeatureFrame,
        test: &FeatureFrame,
    ) -> Result<ArtifactBundle>
    where
        R: Regressor + ?Sized,
    {
        let best = report.best().ok_or_else(|| {
            Error::FitFailure(format!(
                "every configuration of {} failed ({} tried)",
                report.estimator(),
                report.n_configurations()
            ))
        })?;

        let model = estimator.fit(&best.configuration, train)?;
        let predictions = model.predict_frame(test)?;
        let evaluation = RegressionMetrics::compute(test.target(), &predictions)?;

        let name = self
            .model_name
            .clone()
            .unwrap_or_else(|| report.estimator().to_string());
        info!(
            model = name.as_str(),
            configuration = %best.configuration,
            cv_score = best.mean_score,
            rmse = evaluation.rmse,
            mae = evaluation.mae,
            r2 = evaluation.r2,
            "selected model"
        );

        let metadata = ModelMetadata::new(name, train.features().clone(), best.configuration.clone())
            .with_evaluation(&evaluation)
            .with_best_score(best.mean_score);
        Ok(ArtifactBundle::new(model, metadata))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SearchConfig;
    use crate::frame::FeatureList;
    use crate::model::ModelFamily;
    use crate::replay::schema::{BEST_SCORE, RMSE};
    use crate::search::{GridSearch, SearchSpace};

    fn frame(range: std::ops::Range<i32>) -> FeatureFrame {
        let rows: Vec<Vec<f64>> = range.map(|i| vec![f64::from(i)]).collect();
        let target = rows.iter().map(|r| 7.0 * r[0] + 3.0).collect();
        FeatureFrame::from_rows(FeatureList::new(["sqft"]).unwrap(), &rows, target).unwrap()
    }

    #[test]
    fn test_selects_top_candidate() {
        let (train, test) = (frame(0..40), frame(40..50));
        let space = SearchSpace::new().param("alpha", [0.0, 1000.0]);
        let report = GridSearch::new(SearchConfig::default())
            .run(&ModelFamily::LinearRegression, &space, &train)
            .unwrap();
        let bundle = ModelSelector::new()
            .select(&ModelFamily::LinearRegression, &report, &train, &test)
            .unwrap();

        assert_eq!(bundle.metadata.model, "linear_regression");
        assert_eq!(
            bundle.metadata.params.get("alpha").unwrap().to_string(),
            "0"
        );
        assert!(bundle.metadata.metric(RMSE).unwrap() < 1e-6);
        assert_eq!(
            bundle.metadata.metric(BEST_SCORE),
            Some(report.best().unwrap().mean_score)
        );
    }

    #[test]
    fn test_all_failed_is_fit_failure() {
        let (train, test) = (frame(0..30), frame(30..35));
        let space = SearchSpace::new().param("alpha", [-1.0]);
        let report = GridSearch::default()
            .run(&ModelFamily::LinearRegression, &space, &train)
            .unwrap();
        let err = ModelSelector::new()
            .model_name("ridge")
            .select(&ModelFamily::LinearRegression, &report, &train, &test)
            .unwrap_err();
        assert!(matches!(err, Error::FitFailure(msg) if msg.contains("linear_regression")));
    }
}
