//! Classification diagnostics: accuracy, balanced accuracy, confusion matrix,
//! per-class precision/recall/F1 and one-vs-rest ROC curves.

use std::cmp::Ordering;
use std::fmt::Write as _;

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::argmax_rows;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Split {
    Train,
    Test,
}

impl std::fmt::Display for Split {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Split::Train => write!(f, "train"),
            Split::Test => write!(f, "test"),
        }
    }
}

/// One-vs-rest ROC curve of a single class.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocCurve {
    pub fpr: Vec<f64>,
    pub tpr: Vec<f64>,
    pub thresholds: Vec<f64>,
    /// `None` when the split has no positives or no negatives for the class.
    pub auc: Option<f64>,
}

impl RocCurve {
    /// ROC of `scores` against binary `positive` labels.
    ///
    /// One point per distinct score (descending), starting from `(0, 0)` with
    /// an infinite threshold.
    pub fn compute(scores: &[f32], positive: &[bool]) -> Self {
        let n_pos = positive.iter().filter(|&&p| p).count();
        let n_neg = positive.len() - n_pos;
        if n_pos == 0 || n_neg == 0 {
            return RocCurve::default();
        }

        let mut order: Vec<usize> = (0..scores.len()).collect();
        order.sort_by(|&a, &b| {
            scores[b]
                .partial_cmp(&scores[a])
                .unwrap_or(Ordering::Equal)
        });

        let mut fpr = vec![0.0];
        let mut tpr = vec![0.0];
        let mut thresholds = vec![f64::INFINITY];
        let (mut tp, mut fp) = (0usize, 0usize);

        for (pos, &i) in order.iter().enumerate() {
            if positive[i] {
                tp += 1;
            } else {
                fp += 1;
            }
            let last_of_group = order
                .get(pos + 1)
                .map_or(true, |&next| scores[next] != scores[i]);
            if last_of_group {
                fpr.push(fp as f64 / n_neg as f64);
                tpr.push(tp as f64 / n_pos as f64);
                thresholds.push(scores[i] as f64);
            }
        }

        let auc = trapezoid(&fpr, &tpr);
        RocCurve {
            fpr,
            tpr,
            thresholds,
            auc: Some(auc),
        }
    }
}

fn trapezoid(x: &[f64], y: &[f64]) -> f64 {
    x.windows(2)
        .zip(y.windows(2))
        .map(|(xs, ys)| (xs[1] - xs[0]) * (ys[0] + ys[1]) / 2.0)
        .sum()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassMetrics {
    pub class: usize,
    /// 0 when the class is never predicted.
    pub precision: f64,
    /// 0 when the class has no support.
    pub recall: f64,
    pub f1: f64,
    pub support: usize,
    pub roc: RocCurve,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct AveragedMetrics {
    pub precision: f64,
    pub recall: f64,
    pub f1: f64,
}

/// The four numbers written to the results table.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ResultsRow {
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    pub precision: f64,
    pub recall: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvaluationReport {
    pub split: Split,
    pub n_samples: usize,
    pub accuracy: f64,
    pub balanced_accuracy: f64,
    /// Rows are true classes, columns are predicted classes.
    pub confusion_matrix: Array2<usize>,
    pub per_class: Vec<ClassMetrics>,
    pub macro_avg: AveragedMetrics,
    pub weighted_avg: AveragedMetrics,
}

impl EvaluationReport {
    /// Accuracy, balanced accuracy and the precision/recall of `headline_class`.
    pub fn results_row(&self, headline_class: usize) -> Result<ResultsRow> {
        let class = self.per_class.get(headline_class).ok_or_else(|| {
            PipelineError::InvalidConfig(format!(
                "headline class {} is outside 0..{}",
                headline_class,
                self.per_class.len()
            ))
        })?;
        Ok(ResultsRow {
            accuracy: self.accuracy,
            balanced_accuracy: self.balanced_accuracy,
            precision: class.precision,
            recall: class.recall,
        })
    }

    /// Classification report table, one line per class plus averages.
    pub fn render_text(&self, class_names: Option<&[String]>) -> String {
        let name = |c: usize| -> String {
            class_names
                .and_then(|n| n.get(c).cloned())
                .unwrap_or_else(|| c.to_string())
        };
        let mut out = String::new();
        writeln!(
            out,
            "{:>16} {:>10} {:>10} {:>10} {:>10} {:>8}",
            "", "precision", "recall", "f1-score", "support", "auc"
        ).ok();
        for m in &self.per_class {
            let auc = m
                .roc
                .auc
                .map_or_else(|| "-".to_string(), |a| format!("{:.4}", a));
            writeln!(
                out,
                "{:>16} {:>10.4} {:>10.4} {:>10.4} {:>10} {:>8}",
                name(m.class),
                m.precision,
                m.recall,
                m.f1,
                m.support,
                auc
            ).ok();
        }
        writeln!(out).ok();
        writeln!(
            out,
            "{:>16} {:>10} {:>10} {:>10.4} {:>10}",
            "accuracy", "", "", self.accuracy, self.n_samples
        ).ok();
        for (label, avg) in [("macro avg", self.macro_avg), ("weighted avg", self.weighted_avg)] {
            writeln!(
                out,
                "{:>16} {:>10.4} {:>10.4} {:>10.4} {:>10}",
                label, avg.precision, avg.recall, avg.f1, self.n_samples
            ).ok();
        }
        writeln!(
            out,
            "{:>16} {:>10} {:>10} {:>10.4}",
            "balanced acc", "", "", self.balanced_accuracy
        ).ok();
        out
    }
}

/// Evaluate class probabilities against true labels.
pub fn evaluate(
    split: Split,
    y_true: &[usize],
    proba: &Array2<f32>,
    n_classes: usize,
) -> Result<EvaluationReport> {
    if y_true.is_empty() {
        return Err(PipelineError::EmptyDataset);
    }
    if proba.nrows() != y_true.len() || proba.ncols() != n_classes {
        return Err(PipelineError::ShapeMismatch(format!(
            "probabilities are {}x{}, expected {}x{}",
            proba.nrows(),
            proba.ncols(),
            y_true.len(),
            n_classes
        )));
    }
    if let Some(&bad) = y_true.iter().find(|&&c| c >= n_classes) {
        return Err(PipelineError::ShapeMismatch(format!(
            "label {} is outside 0..{}",
            bad, n_classes
        )));
    }

    let y_pred = argmax_rows(proba);
    let n = y_true.len();

    let mut confusion = Array2::<usize>::zeros((n_classes, n_classes));
    for (&t, &p) in y_true.iter().zip(&y_pred) {
        confusion[[t, p]] += 1;
    }

    let correct: usize = (0..n_classes).map(|c| confusion[[c, c]]).sum();
    let accuracy = correct as f64 / n as f64;

    let per_class: Vec<ClassMetrics> = (0..n_classes)
        .map(|c| {
            let tp = confusion[[c, c]];
            let support: usize = confusion.row(c).sum();
            let predicted: usize = confusion.column(c).sum();
            let precision = ratio(tp, predicted);
            let recall = ratio(tp, support);
            let f1 = if precision + recall > 0.0 {
                2.0 * precision * recall / (precision + recall)
            } else {
                0.0
            };
            let scores: Vec<f32> = proba.column(c).to_vec();
            let positive: Vec<bool> = y_true.iter().map(|&t| t == c).collect();
            ClassMetrics {
                class: c,
                precision,
                recall,
                f1,
                support,
                roc: RocCurve::compute(&scores, &positive),
            }
        })
        .collect();

    let present: Vec<&ClassMetrics> = per_class.iter().filter(|m| m.support > 0).collect();
    let balanced_accuracy = present.iter().map(|m| m.recall).sum::<f64>() / present.len() as f64;

    let k = n_classes as f64;
    let macro_avg = AveragedMetrics {
        precision: per_class.iter().map(|m| m.precision).sum::<f64>() / k,
        recall: per_class.iter().map(|m| m.recall).sum::<f64>() / k,
        f1: per_class.iter().map(|m| m.f1).sum::<f64>() / k,
    };
    let weight = |f: fn(&ClassMetrics) -> f64| -> f64 {
        per_class
            .iter()
            .map(|m| f(m) * m.support as f64)
            .sum::<f64>()
            / n as f64
    };
    let weighted_avg = AveragedMetrics {
        precision: weight(|m| m.precision),
        recall: weight(|m| m.recall),
        f1: weight(|m| m.f1),
    };

    Ok(EvaluationReport {
        split,
        n_samples: n,
        accuracy,
        balanced_accuracy,
        confusion_matrix: confusion,
        per_class,
        macro_avg,
        weighted_avg,
    })
}

fn ratio(num: usize, den: usize) -> f64 {
    if den == 0 {
        0.0
    } else {
        num as f64 / den as f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn roc_of_perfect_ranking_has_auc_one() {
        let roc = RocCurve::compute(&[0.9, 0.8, 0.3, 0.1], &[true, true, false, false]);
        assert_eq!(roc.auc, Some(1.0));
        assert_eq!(roc.fpr.first(), Some(&0.0));
        assert_eq!(roc.tpr.last(), Some(&1.0));
    }

    #[test]
    fn roc_groups_tied_scores() {
        let roc = RocCurve::compute(&[0.5, 0.5, 0.5, 0.5], &[true, false, true, false]);
        assert_eq!(roc.fpr, vec![0.0, 1.0]);
        assert_eq!(roc.auc, Some(0.5));
    }

    #[test]
    fn roc_without_negatives_is_undefined() {
        let roc = RocCurve::compute(&[0.2, 0.7], &[true, true]);
        assert!(roc.auc.is_none());
        assert!(roc.fpr.is_empty());
    }

    #[test]
    fn report_counts_and_averages() {
        // true: 0 0 1 1 2 ; pred: 0 1 1 1 0
        let y = vec![0, 0, 1, 1, 2];
        let p = array![
            [0.7f32, 0.2, 0.1],
            [0.3, 0.6, 0.1],
            [0.1, 0.8, 0.1],
            [0.2, 0.5, 0.3],
            [0.5, 0.1, 0.4]
        ];
        let r = evaluate(Split::Test, &y, &p, 3).unwrap();
        assert_eq!(r.confusion_matrix.sum(), 5);
        assert_eq!(r.confusion_matrix[[0, 1]], 1);
        assert!((r.accuracy - 0.6).abs() < 1e-12);
        // recalls 0.5, 1.0, 0.0
        assert!((r.balanced_accuracy - 0.5).abs() < 1e-12);
        assert_eq!(r.per_class[2].precision, 0.0);
        assert!((r.per_class[0].precision - 0.5).abs() < 1e-12);

        let row = r.results_row(0).unwrap();
        assert_eq!(row.precision, r.per_class[0].precision);
        assert!(r.results_row(3).is_err());
        assert!(r.render_text(None).contains("macro avg"));
    }

    #[test]
    fn rendered_report_lists_every_class() {
        let y = vec![0, 1];
        let p = array![[0.9f32, 0.1], [0.2, 0.8]];
        let r = evaluate(Split::Test, &y, &p, 2).unwrap();
        let names = vec!["none".to_string(), "baggage".to_string()];
        let text = r.render_text(Some(&names));
        let lines: Vec<&str> = text.lines().collect();
        // header, 2 classes, blank, accuracy, macro, weighted, balanced
        assert_eq!(lines.len(), 8);
        assert!(lines[0].contains("precision"));
        assert!(lines[1].trim_start().starts_with("none"));
        assert!(lines[2].trim_start().starts_with("baggage"));
        assert!(lines[7].contains("balanced acc"));
    }

    #[test]
    fn balanced_accuracy_ignores_absent_classes() {
        let y = vec![0, 0, 1];
        let p = array![[0.9f32, 0.05, 0.05], [0.9, 0.05, 0.05], [0.1, 0.8, 0.1]];
        let r = evaluate(Split::Train, &y, &p, 3).unwrap();
        assert_eq!(r.balanced_accuracy, 1.0);
        assert!(r.per_class[2].roc.auc.is_none());
    }
}
