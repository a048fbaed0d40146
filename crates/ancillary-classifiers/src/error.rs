use thiserror::Error;

use crate::models::EpochMetrics;

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Failures raised by the encoding, resampling, training and analysis stages.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("missing expected column '{0}'")]
    MissingColumn(String),

    #[error("unexpected column '{0}' is not declared in the feature schema")]
    UnexpectedColumn(String),

    #[error("malformed value '{value}' in column '{column}' at row {row}")]
    MalformedValue {
        column: String,
        row: usize,
        value: String,
    },

    #[error("unknown category '{value}' in column '{column}' at row {row}")]
    UnknownCategory {
        column: String,
        row: usize,
        value: String,
    },

    #[error("flag combination '{0}' was not observed when the label encoding was fit")]
    UnknownLabelCombination(String),

    #[error("label {0} has no flag combination in the fitted label encoding")]
    UndecodableLabel(usize),

    #[error("column '{0}' has zero variance")]
    DegenerateColumn(String),

    #[error("dataset is empty")]
    EmptyDataset,

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("class {class} has {count} training sample(s); at least {required} are needed for synthesis")]
    ClassTooSmall {
        class: usize,
        count: usize,
        required: usize,
    },

    #[error("training diverged at epoch {epoch} (non-finite loss); last finite metrics: {last_metrics:?}")]
    TrainingDiverged {
        epoch: usize,
        last_metrics: Option<EpochMetrics>,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
