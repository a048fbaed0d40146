//! Permutation feature importance.

use std::cmp::Ordering;

use ndarray::{Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::ImportanceConfig;
use crate::error::{PipelineError, Result};
use crate::models::ProbabilisticClassifier;

/// Exposes `predict`, `predict_proba` and an accuracy `score` over a shared
/// reference to a fitted model. There is no way to train through it.
pub struct AccuracyScorer<'a, M: ProbabilisticClassifier> {
    model: &'a M,
}

impl<'a, M: ProbabilisticClassifier> AccuracyScorer<'a, M> {
    pub fn new(model: &'a M) -> Self {
        Self { model }
    }

    pub fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        self.model.predict(x)
    }

    pub fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.model.predict_proba(x)
    }

    /// Fraction of rows whose predicted label equals `y`.
    pub fn score(&self, x: &Array2<f32>, y: &[usize]) -> Result<f64> {
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if y.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let pred = self.predict(x)?;
        let hits = pred.iter().zip(y).filter(|(p, t)| p == t).count();
        Ok(hits as f64 / y.len() as f64)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceEntry {
    pub feature: String,
    pub index: usize,
    /// Mean drop in accuracy over the repeats.
    pub mean: f64,
    pub std: f64,
    pub drops: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureFailure {
    pub feature: String,
    pub error: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImportanceTable {
    pub baseline: f64,
    /// Sorted by descending mean importance.
    pub entries: Vec<ImportanceEntry>,
    pub failures: Vec<FeatureFailure>,
}

impl ImportanceTable {
    pub fn get(&self, feature: &str) -> Option<&ImportanceEntry> {
        self.entries.iter().find(|e| e.feature == feature)
    }

    pub fn top_k(&self, k: usize) -> &[ImportanceEntry] {
        &self.entries[..k.min(self.entries.len())]
    }
}

/// Drop in accuracy when each column of `x` is shuffled across rows.
///
/// Each feature draws its permutations from its own RNG seeded from
/// `config.seed` and the feature index, so results do not depend on how
/// rayon schedules the features.
pub fn permutation_importance<M>(
    scorer: &AccuracyScorer<'_, M>,
    x: &Array2<f32>,
    y: &[usize],
    feature_names: &[String],
    config: &ImportanceConfig,
) -> Result<ImportanceTable>
where
    M: ProbabilisticClassifier + Sync,
{
    if feature_names.len() != x.ncols() {
        return Err(PipelineError::ShapeMismatch(format!(
            "{} feature names for {} columns",
            feature_names.len(),
            x.ncols()
        )));
    }
    if config.n_repeats == 0 {
        return Err(PipelineError::InvalidConfig(
            "importance.n_repeats must be at least 1".to_string(),
        ));
    }

    let baseline = scorer.score(x, y)?;
    log::info!(
        "Permutation importance: baseline accuracy {:.4}, {} features x {} repeats",
        baseline,
        x.ncols(),
        config.n_repeats
    );

    let results: Vec<(usize, Result<Vec<f64>>)> = (0..x.ncols())
        .into_par_iter()
        .map(|feature| {
            let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(feature as u64));
            (feature, feature_drops(scorer, x, y, feature, baseline, config.n_repeats, &mut rng))
        })
        .collect();

    let mut entries = Vec::new();
    let mut failures = Vec::new();
    for (index, result) in results {
        let feature = feature_names[index].clone();
        match result {
            Ok(drops) => {
                let mean = drops.iter().mean();
                let std = drops.iter().population_std_dev();
                entries.push(ImportanceEntry {
                    feature,
                    index,
                    mean,
                    std: if std.is_finite() { std } else { 0.0 },
                    drops,
                });
            }
            Err(e) => {
                log::warn!("Permutation importance failed for '{}': {}", feature, e);
                failures.push(FeatureFailure {
                    feature,
                    error: e.to_string(),
                });
            }
        }
    }

    entries.sort_by(|a, b| {
        b.mean
            .partial_cmp(&a.mean)
            .unwrap_or(Ordering::Equal)
            .then(a.index.cmp(&b.index))
    });

    Ok(ImportanceTable {
        baseline,
        entries,
        failures,
    })
}

fn feature_drops<M: ProbabilisticClassifier>(
    scorer: &AccuracyScorer<'_, M>,
    x: &Array2<f32>,
    y: &[usize],
    feature: usize,
    baseline: f64,
    n_repeats: usize,
    rng: &mut StdRng,
) -> Result<Vec<f64>> {
    let original: Vec<f32> = x.column(feature).to_vec();
    let mut permuted = x.clone();
    let mut drops = Vec::with_capacity(n_repeats);

    for _ in 0..n_repeats {
        let mut values = original.clone();
        values.shuffle(rng);
        for (cell, v) in permuted.index_axis_mut(Axis(1), feature).iter_mut().zip(values) {
            *cell = v;
        }
        drops.push(baseline - scorer.score(&permuted, y)?);
    }
    Ok(drops)
}
