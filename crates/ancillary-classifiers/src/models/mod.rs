pub mod classifier_trait;
pub mod fitted;
pub mod network;
pub mod trainer;

pub use classifier_trait::{argmax_rows, ProbabilisticClassifier};
pub use fitted::FittedClassifier;
pub use network::{DenseLayer, Network};
pub use trainer::{EpochMetrics, TrainedModel, Trainer, TrainingHistory};
