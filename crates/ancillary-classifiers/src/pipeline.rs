//! End-to-end batch run: encode, split, resample, train, evaluate, explain.

use std::collections::BTreeMap;

use ndarray::{Array2, Axis};

use crate::config::PipelineConfig;
use crate::data_handling::{train_test_split, Dataset, TrainTestSplit};
use crate::error::{PipelineError, Result};
use crate::evaluation::{evaluate, EvaluationReport, ResultsRow, Split};
use crate::explain::{
    partial_dependence_for, permutation_importance, AccuracyScorer, DependenceOutcome,
    ImportanceTable,
};
use crate::models::{FittedClassifier, ProbabilisticClassifier, Trainer, TrainingHistory};
use crate::preprocessing::{FeatureEncoder, LabelEncoding};
use crate::resampling::{class_counts, SkippedClass, Smote};

/// What the resampling step did to the training partition.
#[derive(Debug, Clone, Default)]
pub struct ResampleSummary {
    pub counts_before: BTreeMap<usize, usize>,
    pub counts_after: BTreeMap<usize, usize>,
    pub synthesized: BTreeMap<usize, usize>,
    pub skipped: Vec<SkippedClass>,
}

#[derive(Debug, Clone)]
pub struct PipelineOutcome {
    pub classifier: FittedClassifier,
    pub history: TrainingHistory,
    pub split: TrainTestSplit,
    pub x_test: Array2<f32>,
    pub y_test: Vec<usize>,
    pub resample: Option<ResampleSummary>,
    pub evaluation: BTreeMap<Split, EvaluationReport>,
    pub results: ResultsRow,
    pub importance: Option<ImportanceTable>,
    pub dependence: Vec<DependenceOutcome>,
}

impl PipelineOutcome {
    pub fn test_report(&self) -> Option<&EvaluationReport> {
        self.evaluation.get(&Split::Test)
    }
}

pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, dataset: &Dataset) -> Result<PipelineOutcome> {
        let cfg = &self.config;
        cfg.validate()?;
        if dataset.schema != cfg.schema {
            return Err(PipelineError::InvalidConfig(
                "dataset columns do not match the configured feature schema".to_string(),
            ));
        }
        dataset.log_input_data_summary();

        // Labels and encoder are fit on every row before the split.
        let flags = dataset.flags();
        let labels = LabelEncoding::fit(&flags)?;
        let y = labels.encode_all(&flags)?;
        let n_classes = labels.n_classes();
        log::info!("{} combined label(s): {:?}", n_classes, labels.keys());
        if cfg.headline_class >= n_classes {
            return Err(PipelineError::InvalidConfig(format!(
                "headline_class {} is outside the {} observed label(s)",
                cfg.headline_class, n_classes
            )));
        }

        let (x, encoder) = FeatureEncoder::new(cfg.encoder.clone()).fit_transform(dataset)?;
        log::warn!(
            "Encoder statistics were fit on all {} rows, including the held-out test rows",
            dataset.len()
        );

        let split = train_test_split(x.nrows(), cfg.split.test_fraction, cfg.split.seed)?;
        let x_train = x.select(Axis(0), &split.train);
        let y_train: Vec<usize> = split.train.iter().map(|&i| y[i]).collect();
        let x_test = x.select(Axis(0), &split.test);
        let y_test: Vec<usize> = split.test.iter().map(|&i| y[i]).collect();
        log::info!(
            "Split {} rows into {} train / {} test",
            x.nrows(),
            x_train.nrows(),
            x_test.nrows()
        );

        let (x_fit, y_fit, resample) = if cfg.resample.enabled {
            let counts_before = class_counts(&y_train, n_classes);
            let outcome = Smote::new(cfg.resample.clone()).resample(&x_train, &y_train, n_classes)?;
            let counts_after = class_counts(&outcome.y, n_classes);
            log::info!(
                "SMOTE: {} -> {} training rows",
                y_train.len(),
                outcome.y.len()
            );
            let summary = ResampleSummary {
                counts_before,
                counts_after,
                synthesized: outcome.synthesized,
                skipped: outcome.skipped,
            };
            (outcome.x, outcome.y, Some(summary))
        } else {
            (x_train, y_train, None)
        };

        let trained = Trainer::new(cfg.model.clone(), cfg.training.clone(), n_classes)
            .fit(&x_fit, &y_fit, &x_test, &y_test)?;
        let classifier = FittedClassifier::new(trained.network, encoder, labels)?;

        let mut evaluation = BTreeMap::new();
        let test_report = evaluate(Split::Test, &y_test, &classifier.predict_proba(&x_test)?, n_classes)?;
        let train_report = evaluate(Split::Train, &y_fit, &classifier.predict_proba(&x_fit)?, n_classes)?;
        let class_names: Vec<String> = classifier.labels().class_names().into_values().collect();
        for report in [&test_report, &train_report] {
            log::info!(
                "{} accuracy {:.4}, balanced accuracy {:.4}\n{}",
                report.split,
                report.accuracy,
                report.balanced_accuracy,
                report.render_text(Some(&class_names))
            );
        }
        let results = test_report.results_row(cfg.headline_class)?;
        evaluation.insert(Split::Test, test_report);
        evaluation.insert(Split::Train, train_report);

        let importance = if cfg.importance.enabled {
            let scorer = AccuracyScorer::new(&classifier);
            let table = permutation_importance(
                &scorer,
                &x,
                &y,
                classifier.encoder().feature_names(),
                &cfg.importance,
            )?;
            for entry in table.top_k(5) {
                log::info!(
                    "importance {:<32} {:.4} +/- {:.4}",
                    entry.feature,
                    entry.mean,
                    entry.std
                );
            }
            Some(table)
        } else {
            None
        };

        let dependence = if cfg.dependence.enabled {
            partial_dependence_for(
                &classifier,
                &x_test,
                classifier.encoder(),
                &cfg.dependence.features,
                cfg.dependence.grid_points,
            )
        } else {
            Vec::new()
        };

        Ok(PipelineOutcome {
            classifier,
            history: trained.history,
            split,
            x_test,
            y_test,
            resample,
            evaluation,
            results,
            importance,
            dependence,
        })
    }
}
