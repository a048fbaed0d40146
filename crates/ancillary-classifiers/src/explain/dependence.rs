//! Partial dependence of class probabilities on a single encoded feature.

use itertools_num::linspace;
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::ProbabilisticClassifier;
use crate::preprocessing::EncoderState;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DependenceCurve {
    /// Encoded feature name, e.g. `num__purchase_lead`.
    pub feature: String,
    pub index: usize,
    /// Sweep values in encoded (standardized) units.
    pub grid: Vec<f32>,
    /// Sweep values mapped back to the raw column scale, when known.
    pub raw_grid: Option<Vec<f32>>,
    /// `grid.len() x n_classes` mean predicted probabilities.
    pub mean_proba: Array2<f32>,
    /// The column had zero range, so every grid point is the same value.
    pub degenerate: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum DependenceOutcome {
    Computed(DependenceCurve),
    Failed { feature: String, error: String },
}

impl DependenceOutcome {
    pub fn feature(&self) -> &str {
        match self {
            DependenceOutcome::Computed(c) => &c.feature,
            DependenceOutcome::Failed { feature, .. } => feature,
        }
    }

    pub fn curve(&self) -> Option<&DependenceCurve> {
        match self {
            DependenceOutcome::Computed(c) => Some(c),
            DependenceOutcome::Failed { .. } => None,
        }
    }
}

/// Sweep column `feature_index` of `x_eval` over `grid_points` evenly spaced
/// values between its min and max, averaging predicted probabilities over all
/// rows at each value.
pub fn partial_dependence<M>(
    model: &M,
    x_eval: &Array2<f32>,
    feature_index: usize,
    feature_name: &str,
    grid_points: usize,
) -> Result<DependenceCurve>
where
    M: ProbabilisticClassifier + Sync,
{
    if x_eval.nrows() == 0 {
        return Err(PipelineError::EmptyDataset);
    }
    if feature_index >= x_eval.ncols() {
        return Err(PipelineError::ShapeMismatch(format!(
            "feature index {} is outside 0..{}",
            feature_index,
            x_eval.ncols()
        )));
    }
    if grid_points < 2 {
        return Err(PipelineError::InvalidConfig(
            "partial dependence needs at least 2 grid points".to_string(),
        ));
    }

    let column = x_eval.column(feature_index);
    let min = column.iter().cloned().fold(f32::INFINITY, f32::min);
    let max = column.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let degenerate = !(max > min);
    if degenerate {
        log::warn!(
            "Partial dependence: '{}' has zero range ({}); curve will be flat",
            feature_name,
            min
        );
    }

    let grid: Vec<f32> = linspace(min, max, grid_points).collect();

    let rows: Vec<Array1<f32>> = grid
        .par_iter()
        .map(|&value| {
            let mut swept = x_eval.clone();
            swept.index_axis_mut(Axis(1), feature_index).fill(value);
            let proba = model.predict_proba(&swept)?;
            proba
                .mean_axis(Axis(0))
                .ok_or(PipelineError::EmptyDataset)
        })
        .collect::<Result<Vec<_>>>()?;

    let n_classes = model.n_classes();
    let mut mean_proba = Array2::zeros((grid.len(), n_classes));
    for (mut out, row) in mean_proba.axis_iter_mut(Axis(0)).zip(&rows) {
        out.assign(row);
    }

    Ok(DependenceCurve {
        feature: feature_name.to_string(),
        index: feature_index,
        grid,
        raw_grid: None,
        mean_proba,
        degenerate,
    })
}

/// Partial dependence for each named continuous column (`num__{name}`).
///
/// Unknown names and failures are reported per feature; the other features
/// still run.
pub fn partial_dependence_for<M>(
    model: &M,
    x_eval: &Array2<f32>,
    encoder: &EncoderState,
    features: &[String],
    grid_points: usize,
) -> Vec<DependenceOutcome>
where
    M: ProbabilisticClassifier + Sync,
{
    features
        .iter()
        .map(|name| {
            let encoded = format!("num__{}", name);
            let result = encoder
                .feature_index(&encoded)
                .ok_or_else(|| PipelineError::MissingColumn(encoded.clone()))
                .and_then(|index| {
                    let mut curve = partial_dependence(model, x_eval, index, &encoded, grid_points)?;
                    if let Some(col) = encoder.continuous_columns.iter().position(|c| c == name) {
                        let (mean, std) = (encoder.scaler.mean[col], encoder.scaler.std[col]);
                        curve.raw_grid = Some(curve.grid.iter().map(|&v| v * std + mean).collect());
                    }
                    Ok(curve)
                });
            match result {
                Ok(curve) => DependenceOutcome::Computed(curve),
                Err(e) => {
                    log::warn!("Partial dependence failed for '{}': {}", name, e);
                    DependenceOutcome::Failed {
                        feature: encoded,
                        error: e.to_string(),
                    }
                }
            }
        })
        .collect()
}
