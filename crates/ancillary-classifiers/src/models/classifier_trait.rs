use ndarray::{Array2, Axis};

use crate::error::Result;

/// Read-only contract shared by every model that outputs class probabilities.
///
/// Nothing here can change the model. Analysis code (importance, dependence,
/// evaluation) only ever sees a `&impl ProbabilisticClassifier`.
pub trait ProbabilisticClassifier {
    /// Width of the encoded feature vectors the model accepts.
    fn n_features(&self) -> usize;

    fn n_classes(&self) -> usize;

    /// Per-row class probabilities, `x.nrows() x n_classes()`. Rows sum to 1.
    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>>;

    /// Most probable class per row.
    fn predict(&self, x: &Array2<f32>) -> Result<Vec<usize>> {
        Ok(argmax_rows(&self.predict_proba(x)?))
    }

    /// Optional human readable name for the model
    fn name(&self) -> &str {
        "classifier"
    }
}

/// Column index of the largest value in each row; ties go to the lowest index.
pub fn argmax_rows(proba: &Array2<f32>) -> Vec<usize> {
    proba
        .axis_iter(Axis(0))
        .map(|row| {
            let mut best = 0;
            for (i, &p) in row.iter().enumerate() {
                if p > row[best] {
                    best = i;
                }
            }
            best
        })
        .collect()
}
