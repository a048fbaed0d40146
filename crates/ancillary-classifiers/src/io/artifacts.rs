//! Persisted outputs of a pipeline run and loaders for re-evaluation.
use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::evaluation::{EvaluationReport, ResultsRow, Split};
use crate::explain::{DependenceOutcome, ImportanceTable};
use crate::models::{FittedClassifier, TrainingHistory};
use crate::pipeline::PipelineOutcome;
use crate::preprocessing::EncoderState;

pub const MODEL_FILE: &str = "nn_model.json";
pub const PREPROCESSOR_FILE: &str = "nn_preprocessor.json";
pub const X_TEST_FILE: &str = "nn_x_test.csv";
pub const Y_TEST_FILE: &str = "nn_y_test.csv";
pub const ROC_FILE: &str = "nn_roc.json";
pub const RESULTS_FILE: &str = "nn_results.csv";
pub const IMPORTANCE_FILE: &str = "nn_feature_importance.csv";
pub const DEPENDENCE_FILE: &str = "nn_partial_dependence.csv";
pub const HISTORY_FILE: &str = "nn_training_history.csv";
pub const EVALUATION_FILE: &str = "nn_evaluation.json";

/// Per-class ROC data keyed by class label.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RocArtifact {
    pub fpr: BTreeMap<usize, Vec<f64>>,
    pub tpr: BTreeMap<usize, Vec<f64>>,
    pub roc_auc: BTreeMap<usize, Option<f64>>,
}

impl RocArtifact {
    pub fn from_report(report: &EvaluationReport) -> Self {
        let mut out = RocArtifact::default();
        for m in &report.per_class {
            out.fpr.insert(m.class, m.roc.fpr.clone());
            out.tpr.insert(m.class, m.roc.tpr.clone());
            out.roc_auc.insert(m.class, m.roc.auc);
        }
        out
    }
}

#[derive(Serialize)]
struct ResultsRecord {
    #[serde(rename = "Accuracy")]
    accuracy: f64,
    #[serde(rename = "Balanced Accuracy")]
    balanced_accuracy: f64,
    #[serde(rename = "Precision")]
    precision: f64,
    #[serde(rename = "Recall")]
    recall: f64,
}

#[derive(Serialize)]
struct ImportanceRecord<'a> {
    feature: &'a str,
    importance_mean: f64,
    importance_std: f64,
}

#[derive(Serialize)]
struct DependenceRecord<'a> {
    feature: &'a str,
    grid_value: f32,
    raw_value: Option<f32>,
    class: usize,
    mean_probability: f32,
}

fn create(path: &Path) -> Result<BufWriter<File>> {
    let file = File::create(path).with_context(|| format!("Failed to create {}", path.display()))?;
    Ok(BufWriter::new(file))
}

fn csv_writer(path: &Path) -> Result<csv::Writer<File>> {
    csv::Writer::from_path(path).with_context(|| format!("Failed to create {}", path.display()))
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    serde_json::to_writer_pretty(create(path)?, value)
        .with_context(|| format!("Failed to write {}", path.display()))
}

pub fn read_json<T: for<'de> Deserialize<'de>>(path: &Path) -> Result<T> {
    let file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    serde_json::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse {}", path.display()))
}

pub fn save_model(classifier: &FittedClassifier, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(MODEL_FILE);
    write_json(&path, classifier)?;
    Ok(path)
}

pub fn load_model<P: AsRef<Path>>(path: P) -> Result<FittedClassifier> {
    let path = path.as_ref();
    let classifier: FittedClassifier = read_json(path)?;
    // Re-run the constructor checks on what came off disk.
    FittedClassifier::new(
        classifier.network().clone(),
        classifier.encoder().clone(),
        classifier.labels().clone(),
    )
    .with_context(|| format!("Inconsistent model artifact {}", path.display()))
}

pub fn save_preprocessor(encoder: &EncoderState, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(PREPROCESSOR_FILE);
    write_json(&path, encoder)?;
    Ok(path)
}

/// Write the encoded test matrix and its one-hot labels.
pub fn save_test_split(
    x_test: &Array2<f32>,
    y_test: &[usize],
    n_classes: usize,
    feature_names: &[String],
    dir: &Path,
) -> Result<(PathBuf, PathBuf)> {
    let x_path = dir.join(X_TEST_FILE);
    let mut wtr = csv_writer(&x_path)?;
    wtr.write_record(feature_names)?;
    for row in x_test.rows() {
        wtr.write_record(row.iter().map(|v| v.to_string()))?;
    }
    wtr.flush()?;

    let y_path = dir.join(Y_TEST_FILE);
    let mut wtr = csv_writer(&y_path)?;
    wtr.write_record((0..n_classes).map(|c| format!("class_{}", c)))?;
    for &label in y_test {
        wtr.write_record((0..n_classes).map(|c| if c == label { "1" } else { "0" }))?;
    }
    wtr.flush()?;

    Ok((x_path, y_path))
}

/// Read back the matrices written by [`save_test_split`].
pub fn load_test_split(dir: &Path) -> Result<(Array2<f32>, Vec<usize>)> {
    let x_path = dir.join(X_TEST_FILE);
    let mut rdr = csv::Reader::from_path(&x_path)
        .with_context(|| format!("Failed to open {}", x_path.display()))?;
    let width = rdr.headers()?.len();
    let mut values = Vec::new();
    let mut rows = 0;
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {} of {}", i + 1, X_TEST_FILE))?;
        for field in record.iter() {
            values.push(
                field
                    .parse::<f32>()
                    .with_context(|| format!("Invalid value '{}' at row {}", field, i + 1))?,
            );
        }
        rows += 1;
    }
    let x = Array2::from_shape_vec((rows, width), values)
        .map_err(|e| anyhow!("{} is not rectangular: {}", X_TEST_FILE, e))?;

    let y_path = dir.join(Y_TEST_FILE);
    let mut rdr = csv::Reader::from_path(&y_path)
        .with_context(|| format!("Failed to open {}", y_path.display()))?;
    let mut y = Vec::new();
    for (i, record) in rdr.records().enumerate() {
        let record = record.with_context(|| format!("Failed to read row {} of {}", i + 1, Y_TEST_FILE))?;
        let label = record
            .iter()
            .position(|v| v.trim() == "1")
            .ok_or_else(|| anyhow!("Row {} of {} has no active class", i + 1, Y_TEST_FILE))?;
        y.push(label);
    }

    if y.len() != x.nrows() {
        return Err(anyhow!(
            "{} has {} rows but {} has {}",
            X_TEST_FILE,
            x.nrows(),
            Y_TEST_FILE,
            y.len()
        ));
    }
    Ok((x, y))
}

pub fn save_roc(report: &EvaluationReport, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(ROC_FILE);
    write_json(&path, &RocArtifact::from_report(report))?;
    Ok(path)
}

pub fn save_results(row: &ResultsRow, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(RESULTS_FILE);
    let mut wtr = csv_writer(&path)?;
    wtr.serialize(ResultsRecord {
        accuracy: row.accuracy,
        balanced_accuracy: row.balanced_accuracy,
        precision: row.precision,
        recall: row.recall,
    })?;
    wtr.flush()?;
    Ok(path)
}

pub fn save_importance(table: &ImportanceTable, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(IMPORTANCE_FILE);
    let mut wtr = csv_writer(&path)?;
    for e in &table.entries {
        wtr.serialize(ImportanceRecord {
            feature: &e.feature,
            importance_mean: e.mean,
            importance_std: e.std,
        })?;
    }
    wtr.flush()?;
    Ok(path)
}

/// Long format: one row per feature, grid value and class.
pub fn save_dependence(outcomes: &[DependenceOutcome], dir: &Path) -> Result<PathBuf> {
    let path = dir.join(DEPENDENCE_FILE);
    let mut wtr = csv_writer(&path)?;
    for curve in outcomes.iter().filter_map(DependenceOutcome::curve) {
        for (g, &grid_value) in curve.grid.iter().enumerate() {
            let raw_value = curve.raw_grid.as_ref().map(|r| r[g]);
            for (class, &p) in curve.mean_proba.row(g).iter().enumerate() {
                wtr.serialize(DependenceRecord {
                    feature: &curve.feature,
                    grid_value,
                    raw_value,
                    class,
                    mean_probability: p,
                })?;
            }
        }
    }
    wtr.flush()?;
    Ok(path)
}

pub fn save_history(history: &TrainingHistory, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(HISTORY_FILE);
    let mut wtr = csv_writer(&path)?;
    for m in &history.epochs {
        wtr.serialize(m)?;
    }
    wtr.flush()?;
    Ok(path)
}

pub fn save_evaluation(reports: &BTreeMap<Split, EvaluationReport>, dir: &Path) -> Result<PathBuf> {
    let path = dir.join(EVALUATION_FILE);
    write_json(&path, reports)?;
    Ok(path)
}

/// Write every tabular and JSON artifact of a run into `dir`.
pub fn write_outcome(outcome: &PipelineOutcome, dir: &Path) -> Result<Vec<PathBuf>> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create output directory {}", dir.display()))?;

    let classifier = &outcome.classifier;
    let mut written = vec![
        save_model(classifier, dir)?,
        save_preprocessor(classifier.encoder(), dir)?,
    ];
    let (x_path, y_path) = save_test_split(
        &outcome.x_test,
        &outcome.y_test,
        classifier.labels().n_classes(),
        classifier.encoder().feature_names(),
        dir,
    )?;
    written.push(x_path);
    written.push(y_path);

    if let Some(report) = outcome.test_report() {
        written.push(save_roc(report, dir)?);
    }
    written.push(save_results(&outcome.results, dir)?);
    written.push(save_evaluation(&outcome.evaluation, dir)?);
    written.push(save_history(&outcome.history, dir)?);
    if let Some(table) = &outcome.importance {
        written.push(save_importance(table, dir)?);
    }
    if !outcome.dependence.is_empty() {
        written.push(save_dependence(&outcome.dependence, dir)?);
    }

    for path in &written {
        log::debug!("Wrote {}", path.display());
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_split_round_trips_through_csv() {
        let dir = tempfile::tempdir().unwrap();
        let x = array![[0.5f32, -1.25], [2.0, 0.0], [1.0, 3.5]];
        let y = vec![2, 0, 1];
        let names = vec!["num__a".to_string(), "cat__b_x".to_string()];
        save_test_split(&x, &y, 3, &names, dir.path()).unwrap();

        let (x2, y2) = load_test_split(dir.path()).unwrap();
        assert_eq!(x2, x);
        assert_eq!(y2, y);

        let header = std::fs::read_to_string(dir.path().join(Y_TEST_FILE)).unwrap();
        assert!(header.starts_with("class_0,class_1,class_2\n0,0,1\n"));
    }

    #[test]
    fn results_header_matches_report_columns() {
        let dir = tempfile::tempdir().unwrap();
        let row = ResultsRow {
            accuracy: 0.5,
            balanced_accuracy: 0.25,
            precision: 0.75,
            recall: 1.0,
        };
        let path = save_results(&row, dir.path()).unwrap();
        let text = std::fs::read_to_string(path).unwrap();
        assert_eq!(text, "Accuracy,Balanced Accuracy,Precision,Recall\n0.5,0.25,0.75,1.0\n");
    }
}
