mod common;

use ancillary_classifiers::evaluation::{evaluate, Split};
use ancillary_classifiers::explain::{permutation_importance, AccuracyScorer, DependenceOutcome};
use ancillary_classifiers::io::artifacts;
use ancillary_classifiers::models::ProbabilisticClassifier;
use ancillary_classifiers::pipeline::Pipeline;
use ancillary_classifiers::resampling::class_counts;
use ancillary_classifiers::PipelineError;

#[test]
fn synthetic_run_produces_consistent_artifacts() {
    let _ = env_logger::builder().is_test(true).try_init();

    let ds = common::synthetic_bookings(1000, 2024);
    let outcome = Pipeline::new(common::test_config()).run(&ds).unwrap();

    // 80/20 split
    assert_eq!(outcome.split.test.len(), 200);
    assert_eq!(outcome.split.train.len(), 800);
    assert!(!outcome.history.epochs.is_empty());
    assert!(outcome.history.epochs.len() <= 20);

    let test = outcome.test_report().unwrap();
    assert!((0.0..=1.0).contains(&test.accuracy));
    assert!((0.0..=1.0).contains(&test.balanced_accuracy));
    assert_eq!(test.confusion_matrix.sum(), 200);
    assert_eq!(outcome.results.accuracy, test.accuracy);
    assert!(outcome.evaluation.contains_key(&Split::Train));

    // the held-out partition keeps exactly the labels of its source rows
    let labels = outcome.classifier.labels();
    let n_classes = labels.n_classes();
    let y_all = labels.encode_all(&ds.flags()).unwrap();
    let expected: Vec<usize> = outcome.split.test.iter().map(|&i| y_all[i]).collect();
    assert_eq!(outcome.y_test, expected);
    assert_eq!(
        class_counts(&outcome.y_test, n_classes),
        class_counts(&expected, n_classes)
    );

    // resampled training partition is balanced unless a class was skipped
    let summary = outcome.resample.as_ref().unwrap();
    let max = summary.counts_after.values().copied().max().unwrap();
    for (class, &count) in &summary.counts_after {
        if summary.skipped.iter().all(|s| s.class != *class) {
            assert_eq!(count, max, "class {}", class);
        }
    }

    let importance = outcome.importance.as_ref().unwrap();
    assert_eq!(importance.entries.len(), 5);
    assert!(importance.failures.is_empty());
    for pair in importance.entries.windows(2) {
        assert!(pair[0].mean >= pair[1].mean);
    }

    assert_eq!(outcome.dependence.len(), 2);
    for result in &outcome.dependence {
        let curve = match result {
            DependenceOutcome::Computed(c) => c,
            DependenceOutcome::Failed { feature, error } => panic!("{}: {}", feature, error),
        };
        assert_eq!(curve.grid.len(), 100);
        assert_eq!(curve.mean_proba.nrows(), 100);
        for row in curve.mean_proba.rows() {
            assert!(row.iter().all(|&p| (0.0..=1.0).contains(&p)));
            assert!((row.sum() - 1.0).abs() < 1e-4);
        }
    }

    // predictions are bit-identical across calls
    let a = outcome.classifier.predict_proba(&outcome.x_test).unwrap();
    let b = outcome.classifier.predict_proba(&outcome.x_test).unwrap();
    assert_eq!(a, b);

    // raw records go through the same encoder, network and label decoding
    let test_records: Vec<_> = outcome
        .split
        .test
        .iter()
        .map(|&i| ds.records[i].clone())
        .collect();
    let predicted_flags = outcome.classifier.predict_records(&test_records).unwrap();
    let x_encoded = outcome.classifier.encoder().transform(&test_records).unwrap();
    assert_eq!(x_encoded, outcome.x_test);
    let decoded: Vec<_> = outcome
        .classifier
        .predict(&x_encoded)
        .unwrap()
        .into_iter()
        .map(|label| labels.decode(label).unwrap())
        .collect();
    assert_eq!(predicted_flags, decoded);

    // importance only reads the model
    let cfg = common::test_config();
    permutation_importance(
        &AccuracyScorer::new(&outcome.classifier),
        &outcome.x_test,
        &outcome.y_test,
        outcome.classifier.encoder().feature_names(),
        &cfg.importance,
    )
    .unwrap();
    assert_eq!(outcome.classifier.predict_proba(&outcome.x_test).unwrap(), a);

    // artifacts reload into the same model and test split
    let dir = tempfile::tempdir().unwrap();
    let written = artifacts::write_outcome(&outcome, dir.path()).unwrap();
    assert!(written.iter().all(|p| p.exists()));

    let model = artifacts::load_model(dir.path().join(artifacts::MODEL_FILE)).unwrap();
    let (x_test, y_test) = artifacts::load_test_split(dir.path()).unwrap();
    assert_eq!(y_test, outcome.y_test);
    let reloaded = evaluate(
        Split::Test,
        &y_test,
        &model.predict_proba(&x_test).unwrap(),
        model.n_classes(),
    )
    .unwrap();
    assert_eq!(reloaded.confusion_matrix, test.confusion_matrix);
}

#[test]
fn unknown_dependence_feature_is_reported_not_fatal() {
    let ds = common::synthetic_bookings(300, 99);
    let mut cfg = common::test_config();
    cfg.training.epochs = 2;
    cfg.importance.enabled = false;
    cfg.dependence.features = vec!["lead".to_string(), "altitude".to_string()];
    cfg.dependence.grid_points = 10;

    let outcome = Pipeline::new(cfg).run(&ds).unwrap();
    assert!(outcome.importance.is_none());
    assert!(outcome.dependence[0].curve().is_some());
    assert!(matches!(
        &outcome.dependence[1],
        DependenceOutcome::Failed { feature, .. } if feature == "num__altitude"
    ));
}

#[test]
fn invalid_config_fails_before_training() {
    let ds = common::synthetic_bookings(50, 1);
    let mut cfg = common::test_config();
    cfg.model.dropout = 1.5;
    assert!(Pipeline::new(cfg).run(&ds).is_err());
}

#[test]
fn config_schema_must_match_dataset_schema() {
    let ds = common::synthetic_bookings(50, 3);
    let mut cfg = common::test_config();
    cfg.schema.continuous.push("ghost".to_string());
    let err = Pipeline::new(cfg).run(&ds).unwrap_err();
    assert!(matches!(err, PipelineError::InvalidConfig(_)));
}
