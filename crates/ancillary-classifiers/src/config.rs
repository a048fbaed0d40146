use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::data_handling::FeatureSchema;
use crate::error::{PipelineError, Result};

/// Central configuration for a full pipeline run.
#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct PipelineConfig {
    pub schema: FeatureSchema,
    pub encoder: EncoderConfig,
    pub split: SplitConfig,
    pub resample: ResampleConfig,
    pub model: ModelConfig,
    pub training: TrainConfig,
    pub importance: ImportanceConfig,
    pub dependence: DependenceConfig,
    /// Class whose precision/recall is written to the results table.
    pub headline_class: usize,
}

impl PipelineConfig {
    /// Check every section before any data is touched.
    pub fn validate(&self) -> Result<()> {
        self.schema.validate()?;
        self.split.validate()?;
        self.resample.validate()?;
        self.model.validate()?;
        self.training.validate()?;
        self.importance.validate()?;
        self.dependence.validate()?;
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone, Default)]
#[serde(default)]
pub struct EncoderConfig {
    /// Fail instead of warning when a continuous column has zero variance.
    pub reject_constant_columns: bool,
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct SplitConfig {
    pub test_fraction: f64,
    pub seed: u64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_fraction: 0.2,
            seed: 42,
        }
    }
}

impl SplitConfig {
    fn validate(&self) -> Result<()> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PipelineError::InvalidConfig(format!(
                "split.test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ResampleConfig {
    pub enabled: bool,
    pub k_neighbors: usize,
    pub seed: u64,
    /// Raise `ClassTooSmall` instead of skipping classes that cannot be interpolated.
    pub fail_on_small_class: bool,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            k_neighbors: 5,
            seed: 123,
            fail_on_small_class: false,
        }
    }
}

impl ResampleConfig {
    fn validate(&self) -> Result<()> {
        if self.k_neighbors == 0 {
            return Err(PipelineError::InvalidConfig(
                "resample.k_neighbors must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

/// Hidden-layer nonlinearity.
#[derive(Deserialize, Serialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Relu,
    Tanh,
    Sigmoid,
}

impl FromStr for Activation {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "relu" => Ok(Activation::Relu),
            "tanh" => Ok(Activation::Tanh),
            "sigmoid" => Ok(Activation::Sigmoid),
            _ => Err(format!("Unknown activation: {}", s)),
        }
    }
}

/// Network architecture hyper-parameters.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct ModelConfig {
    pub hidden_layers: usize,
    pub units: usize,
    pub activation: Activation,
    pub dropout: f32,
    pub l2_penalty: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            hidden_layers: 2,
            units: 128,
            activation: Activation::Relu,
            dropout: 0.5,
            l2_penalty: 0.01,
        }
    }
}

impl ModelConfig {
    pub fn validate(&self) -> Result<()> {
        if self.hidden_layers == 0 {
            return Err(PipelineError::InvalidConfig(
                "model.hidden_layers must be at least 1".to_string(),
            ));
        }
        if self.units == 0 {
            return Err(PipelineError::InvalidConfig(
                "model.units must be at least 1".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.dropout) {
            return Err(PipelineError::InvalidConfig(format!(
                "model.dropout must be in [0, 1), got {}",
                self.dropout
            )));
        }
        if !(self.l2_penalty >= 0.0) || !self.l2_penalty.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "model.l2_penalty must be a finite non-negative number, got {}",
                self.l2_penalty
            )));
        }
        Ok(())
    }
}

/// Optimizer and training-loop settings.
#[derive(Deserialize, Serialize, Debug, Clone, PartialEq)]
#[serde(default)]
pub struct TrainConfig {
    pub learning_rate: f32,
    pub beta1: f32,
    pub beta2: f32,
    pub epsilon: f32,
    pub batch_size: usize,
    pub epochs: usize,
    pub early_stopping_patience: usize,
    pub seed: u64,
}

impl Default for TrainConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            beta1: 0.9,
            beta2: 0.999,
            epsilon: 1e-7,
            batch_size: 32,
            epochs: 20,
            early_stopping_patience: 5,
            seed: 42,
        }
    }
}

impl TrainConfig {
    pub fn validate(&self) -> Result<()> {
        if !(self.learning_rate > 0.0) || !self.learning_rate.is_finite() {
            return Err(PipelineError::InvalidConfig(format!(
                "training.learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        if !(0.0..1.0).contains(&self.beta1) || !(0.0..1.0).contains(&self.beta2) {
            return Err(PipelineError::InvalidConfig(
                "training.beta1 and training.beta2 must be in [0, 1)".to_string(),
            ));
        }
        if self.batch_size == 0 || self.epochs == 0 {
            return Err(PipelineError::InvalidConfig(
                "training.batch_size and training.epochs must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct ImportanceConfig {
    pub enabled: bool,
    pub n_repeats: usize,
    pub seed: u64,
}

impl Default for ImportanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            n_repeats: 10,
            seed: 42,
        }
    }
}

impl ImportanceConfig {
    fn validate(&self) -> Result<()> {
        if self.n_repeats == 0 {
            return Err(PipelineError::InvalidConfig(
                "importance.n_repeats must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct DependenceConfig {
    pub enabled: bool,
    /// Continuous columns to sweep, by schema name.
    pub features: Vec<String>,
    pub grid_points: usize,
}

impl Default for DependenceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            features: vec![
                "flight_duration".to_string(),
                "purchase_lead".to_string(),
                "num_passengers".to_string(),
                "length_of_stay".to_string(),
                "flight_hour".to_string(),
            ],
            grid_points: 100,
        }
    }
}

impl DependenceConfig {
    fn validate(&self) -> Result<()> {
        if self.grid_points < 2 {
            return Err(PipelineError::InvalidConfig(
                "dependence.grid_points must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}
