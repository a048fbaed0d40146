//! SMOTE oversampling of the training partition.
//!
//! Every class below the majority count is topped up with synthetic rows
//! interpolated between a random member and one of its nearest same-class
//! neighbors. Original rows are returned first and untouched.

use std::cmp::Ordering;
use std::collections::BTreeMap;

use ndarray::{Array2, ArrayView1, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::config::ResampleConfig;
use crate::error::{PipelineError, Result};

/// A class that could not be oversampled.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkippedClass {
    pub class: usize,
    pub count: usize,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct ResampleOutcome {
    pub x: Array2<f32>,
    pub y: Vec<usize>,
    /// Synthetic rows added per class.
    pub synthesized: BTreeMap<usize, usize>,
    pub skipped: Vec<SkippedClass>,
}

/// Number of rows per label; labels in `0..n_classes` with no rows are kept with count 0.
pub fn class_counts(y: &[usize], n_classes: usize) -> BTreeMap<usize, usize> {
    let mut counts: BTreeMap<usize, usize> = (0..n_classes).map(|c| (c, 0)).collect();
    for &label in y {
        *counts.entry(label).or_insert(0) += 1;
    }
    counts
}

pub struct Smote {
    config: ResampleConfig,
}

impl Smote {
    pub fn new(config: ResampleConfig) -> Self {
        Self { config }
    }

    pub fn resample(&self, x: &Array2<f32>, y: &[usize], n_classes: usize) -> Result<ResampleOutcome> {
        if x.nrows() == 0 {
            return Err(PipelineError::EmptyDataset);
        }
        if x.nrows() != y.len() {
            return Err(PipelineError::ShapeMismatch(format!(
                "{} feature rows but {} labels",
                x.nrows(),
                y.len()
            )));
        }
        if self.config.k_neighbors == 0 {
            return Err(PipelineError::InvalidConfig(
                "resample.k_neighbors must be at least 1".to_string(),
            ));
        }

        let counts = class_counts(y, n_classes);
        let target = counts.values().copied().max().unwrap_or(0);
        let mut rng = StdRng::seed_from_u64(self.config.seed);

        let mut synthetic_rows: Vec<f32> = Vec::new();
        let mut synthetic_y: Vec<usize> = Vec::new();
        let mut synthesized = BTreeMap::new();
        let mut skipped = Vec::new();

        for (&class, &count) in &counts {
            let needed = target - count;
            if needed == 0 {
                continue;
            }
            if count < 2 {
                if self.config.fail_on_small_class {
                    return Err(PipelineError::ClassTooSmall {
                        class,
                        count,
                        required: 2,
                    });
                }
                let reason = if count == 0 {
                    "absent from the training split".to_string()
                } else {
                    "a single member has no neighbor to interpolate with".to_string()
                };
                log::warn!(
                    "SMOTE: skipping class {} ({} sample(s)): {}",
                    class,
                    count,
                    reason
                );
                skipped.push(SkippedClass {
                    class,
                    count,
                    reason,
                });
                continue;
            }

            let members: Vec<usize> = y
                .iter()
                .enumerate()
                .filter(|(_, label)| **label == class)
                .map(|(i, _)| i)
                .collect();
            let k = self.config.k_neighbors.min(members.len() - 1);
            if k < self.config.k_neighbors {
                log::info!(
                    "SMOTE: class {} has {} samples, using k = {}",
                    class,
                    members.len(),
                    k
                );
            }

            let neighbors = nearest_neighbors(x, &members, k);

            for _ in 0..needed {
                let pick = rng.gen_range(0..members.len());
                let neighbor = neighbors[pick][rng.gen_range(0..k)];
                let gap: f32 = rng.gen();
                let base = x.row(members[pick]);
                let other = x.row(neighbor);
                synthetic_rows.extend(base.iter().zip(other.iter()).map(|(&b, &o)| b + gap * (o - b)));
                synthetic_y.push(class);
            }
            log::debug!("SMOTE: synthesized {} rows for class {}", needed, class);
            synthesized.insert(class, needed);
        }

        let synthetic = Array2::from_shape_vec((synthetic_y.len(), x.ncols()), synthetic_rows)
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        let x_out = ndarray::concatenate(Axis(0), &[x.view(), synthetic.view()])
            .map_err(|e| PipelineError::ShapeMismatch(e.to_string()))?;
        let mut y_out = y.to_vec();
        y_out.extend(synthetic_y);

        Ok(ResampleOutcome {
            x: x_out,
            y: y_out,
            synthesized,
            skipped,
        })
    }
}

fn squared_distance(a: ArrayView1<f32>, b: ArrayView1<f32>) -> f32 {
    a.iter().zip(b.iter()).map(|(&p, &q)| (p - q) * (p - q)).sum()
}

/// For each member, the row indices of its `k` nearest other members.
///
/// Self is excluded by index, so duplicated rows still count as neighbors.
/// Ties are broken by row index.
fn nearest_neighbors(x: &Array2<f32>, members: &[usize], k: usize) -> Vec<Vec<usize>> {
    members
        .par_iter()
        .map(|&i| {
            let row = x.row(i);
            let mut dists: Vec<(f32, usize)> = members
                .iter()
                .filter(|&&j| j != i)
                .map(|&j| (squared_distance(row, x.row(j)), j))
                .collect();
            dists.sort_by(|a, b| {
                a.0.partial_cmp(&b.0)
                    .unwrap_or(Ordering::Equal)
                    .then(a.1.cmp(&b.1))
            });
            dists.into_iter().take(k).map(|(_, j)| j).collect()
        })
        .collect()
}
