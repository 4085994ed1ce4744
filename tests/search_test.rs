//! Cross-validated search and selection tests
//!
//! Synthetic King County style data: price grows with living area and grade,
//! with a waterfront premium, so tree ensembles have something to find.

use std::collections::HashSet;

use house_price_search::config::SearchConfig;
use house_price_search::frame::{FeatureFrame, FeatureList, Record};
use house_price_search::model::ModelFamily;
use house_price_search::search::{
    CandidateStatus, DataSplit, FoldAssignment, GridSearch, Scoring, SearchSpace,
};
use house_price_search::selection::ModelSelector;
use house_price_search::Error;

fn houses(n: i32) -> FeatureFrame {
    let features = FeatureList::new(["sqft_living", "grade", "waterfront"]).unwrap();
    let rows: Vec<Vec<f64>> = (0..n)
        .map(|i| {
            vec![
                f64::from(700 + (i * 37) % 2500),
                f64::from(5 + (i * 7) % 6),
                f64::from(i32::from(i % 11 == 0)),
            ]
        })
        .collect();
    let prices = rows
        .iter()
        .map(|r| 120.0 * r[0] + 25_000.0 * r[1] + 300_000.0 * r[2])
        .collect();
    FeatureFrame::from_rows(features, &rows, prices).unwrap()
}

// ============================================================================
// Grid enumeration and fold fits
// ============================================================================

#[test]
fn test_four_configurations_twelve_fits() {
    let train = houses(90);
    let space = SearchSpace::new()
        .param("n_estimators", [100_i64, 200])
        .param("max_depth", [3_i64, 5]);
    let report = GridSearch::new(SearchConfig::default().folds(3))
        .run(&ModelFamily::GradientBoosting, &space, &train)
        .unwrap();

    assert_eq!(report.n_configurations(), 4);
    assert_eq!(report.fits_performed(), 12);
    assert_eq!(report.folds().k(), 3);

    let best = report.best().unwrap();
    assert_eq!(best.rank, 1);
    assert!(report
        .ranking()
        .iter()
        .all(|c| c.mean_score <= best.mean_score));
    assert!(report.ranking().iter().all(|c| c.fold_scores.len() == 3));
}

#[test]
fn test_every_configuration_sees_the_same_folds() {
    let train = houses(50);
    let config = SearchConfig::default().folds(5).seed(7);
    let report = GridSearch::new(config)
        .run(
            &ModelFamily::DecisionTree,
            &SearchSpace::new().param("max_depth", [2_i64, 4]),
            &train,
        )
        .unwrap();
    assert_eq!(report.folds(), &FoldAssignment::new(50, 5, 7).unwrap());
}

#[test]
fn test_ranking_is_deterministic_across_pool_sizes() {
    let train = houses(60);
    let space = SearchSpace::new()
        .param("max_depth", [None, Some(3_i64), Some(6)])
        .param("min_samples_leaf", [1_i64, 4]);

    let single = GridSearch::new(SearchConfig::default().pool_size(1))
        .run(&ModelFamily::DecisionTree, &space, &train)
        .unwrap();
    let many = GridSearch::new(SearchConfig::default().pool_size(4))
        .run(&ModelFamily::DecisionTree, &space, &train)
        .unwrap();

    assert_eq!(single.ranking(), many.ranking());
}

#[test]
fn test_scoring_changes_sign_convention_only() {
    let train = houses(40);
    let space = SearchSpace::new();
    let rmse = GridSearch::new(SearchConfig::default())
        .run(&ModelFamily::LinearRegression, &space, &train)
        .unwrap();
    let mse = GridSearch::new(SearchConfig::default().scoring(Scoring::NegMeanSquaredError))
        .run(&ModelFamily::LinearRegression, &space, &train)
        .unwrap();
    assert!(rmse.best().unwrap().mean_score <= 0.0);
    assert!(mse.best().unwrap().mean_score <= 0.0);
    assert_eq!(mse.scoring(), Scoring::NegMeanSquaredError);
}

#[test]
fn test_failed_configuration_is_ranked_last() {
    let train = houses(40);
    let space = SearchSpace::new().param("learning_rate", [-0.5, 0.1]);
    let report = GridSearch::default()
        .run(
            &ModelFamily::GradientBoosting,
            &space.param("n_estimators", [10_i64]),
            &train,
        )
        .unwrap();

    let last = report.ranking().last().unwrap();
    assert!(matches!(last.status, CandidateStatus::Failed { .. }));
    assert_eq!(last.mean_score, f64::NEG_INFINITY);
    assert!(report.best().unwrap().is_scored());
}

#[test]
fn test_empty_candidate_list_rejected() {
    let space = SearchSpace::new().param("max_depth", Vec::<i64>::new());
    assert!(matches!(
        GridSearch::default().run(&ModelFamily::DecisionTree, &space, &houses(30)),
        Err(Error::InvalidInput(_))
    ));
}

// ============================================================================
// Held-out evaluation
// ============================================================================

#[test]
fn test_held_out_rows_never_reach_the_search() {
    let frame = houses(100);
    let split = DataSplit::train_test(frame.n_rows(), 0.2, 42).unwrap();
    let train_rows: HashSet<usize> = split.train().iter().copied().collect();
    assert_eq!(split.test().len(), 20);
    assert!(split.test().iter().all(|i| !train_rows.contains(i)));

    let train = frame.take(split.train());
    let report = GridSearch::default()
        .run(&ModelFamily::LinearRegression, &SearchSpace::new(), &train)
        .unwrap();
    let folded: usize = (0..report.folds().k()).map(|i| report.folds().fold(i).len()).sum();
    assert_eq!(folded, split.train().len());
}

#[test]
fn test_selection_is_reproducible() {
    let frame = houses(80);
    let split = DataSplit::train_test(frame.n_rows(), 0.25, 3).unwrap();
    let (train, test) = (frame.take(split.train()), frame.take(split.test()));
    let space = SearchSpace::new()
        .param("n_estimators", [10_i64, 20])
        .param("max_depth", [None, Some(4_i64)]);

    let pick = || {
        let report = GridSearch::default()
            .run(&ModelFamily::RandomForest, &space, &train)
            .unwrap();
        ModelSelector::new()
            .select(&ModelFamily::RandomForest, &report, &train, &test)
            .unwrap()
    };
    let (first, second) = (pick(), pick());
    assert_eq!(first.model, second.model);
    assert_eq!(first.metadata.params, second.metadata.params);
    assert_eq!(first.metadata.metrics, second.metadata.metrics);
}

// ============================================================================
// Inference against the training feature list
// ============================================================================

#[test]
fn test_extra_field_rejected_before_prediction() {
    let frame = houses(40);
    let split = DataSplit::train_test(frame.n_rows(), 0.2, 42).unwrap();
    let (train, test) = (frame.take(split.train()), frame.take(split.test()));
    let report = GridSearch::default()
        .run(&ModelFamily::LinearRegression, &SearchSpace::new(), &train)
        .unwrap();
    let bundle = ModelSelector::new()
        .select(&ModelFamily::LinearRegression, &report, &train, &test)
        .unwrap();

    let record = Record::new()
        .with("sqft_living", 1800.0)
        .with("grade", 7.0)
        .with("waterfront", 0.0)
        .with("waterfront_view", 1.0);
    match bundle.model.predict(&record) {
        Err(Error::DataShape { missing, extra }) => {
            assert!(missing.is_empty());
            assert_eq!(extra, ["waterfront_view"]);
        }
        other => panic!("expected DataShape, got {other:?}"),
    }
}
