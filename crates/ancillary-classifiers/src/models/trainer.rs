//! Mini-batch Adam training with validation-loss early stopping.

use ndarray::{Array1, Array2, Axis, Zip};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::config::{ModelConfig, TrainConfig};
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::argmax_rows;
use crate::models::network::{cross_entropy, one_hot, LayerGradient, Network};

/// Metrics of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Running mean over the epoch's batches (dropout active), penalty included.
    pub train_loss: f64,
    pub train_accuracy: f64,
    pub val_loss: f64,
    pub val_accuracy: f64,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Epoch whose weights were restored.
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl TrainingHistory {
    pub fn best(&self) -> Option<&EpochMetrics> {
        self.epochs.iter().find(|m| m.epoch == self.best_epoch)
    }
}

#[derive(Debug, Clone)]
pub struct TrainedModel {
    pub network: Network,
    pub history: TrainingHistory,
}

/// First and second moment estimates for every parameter.
struct AdamState {
    m_w: Vec<Array2<f32>>,
    v_w: Vec<Array2<f32>>,
    m_b: Vec<Array1<f32>>,
    v_b: Vec<Array1<f32>>,
    t: i32,
}

impl AdamState {
    fn new(network: &Network) -> Self {
        let m_w: Vec<_> = network
            .layers()
            .iter()
            .map(|l| Array2::zeros(l.weights.raw_dim()))
            .collect();
        let m_b: Vec<_> = network
            .layers()
            .iter()
            .map(|l| Array1::zeros(l.bias.raw_dim()))
            .collect();
        Self {
            v_w: m_w.clone(),
            v_b: m_b.clone(),
            m_w,
            m_b,
            t: 0,
        }
    }

    fn step(&mut self, network: &mut Network, gradients: &[LayerGradient], cfg: &TrainConfig) {
        self.t += 1;
        let (b1, b2, eps) = (cfg.beta1, cfg.beta2, cfg.epsilon);
        let lr_t = cfg.learning_rate * (1.0 - b2.powi(self.t)).sqrt() / (1.0 - b1.powi(self.t));

        for (i, (layer, grad)) in network.layers_mut().iter_mut().zip(gradients).enumerate() {
            Zip::from(&mut layer.weights)
                .and(&mut self.m_w[i])
                .and(&mut self.v_w[i])
                .and(&grad.weights)
                .for_each(|w, m, v, &g| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *w -= lr_t * *m / (v.sqrt() + eps);
                });
            Zip::from(&mut layer.bias)
                .and(&mut self.m_b[i])
                .and(&mut self.v_b[i])
                .and(&grad.bias)
                .for_each(|b, m, v, &g| {
                    *m = b1 * *m + (1.0 - b1) * g;
                    *v = b2 * *v + (1.0 - b2) * g * g;
                    *b -= lr_t * *m / (v.sqrt() + eps);
                });
        }
    }
}

pub struct Trainer {
    model: ModelConfig,
    train: TrainConfig,
    n_classes: usize,
}

impl Trainer {
    pub fn new(model: ModelConfig, train: TrainConfig, n_classes: usize) -> Self {
        Self {
            model,
            train,
            n_classes,
        }
    }

    /// Train a fresh network on `(x_train, y_train)`, monitoring loss on
    /// `(x_val, y_val)` after every epoch.
    ///
    /// Training stops after `early_stopping_patience` epochs without a
    /// validation-loss improvement, and the best weights seen are restored
    /// before returning.
    pub fn fit(
        &self,
        x_train: &Array2<f32>,
        y_train: &[usize],
        x_val: &Array2<f32>,
        y_val: &[usize],
    ) -> Result<TrainedModel> {
        self.train.validate()?;
        self.check_inputs(x_train, y_train, x_val, y_val)?;

        let mut rng = StdRng::seed_from_u64(self.train.seed);
        let mut network = Network::new(x_train.ncols(), self.n_classes, &self.model, &mut rng)?;
        let mut adam = AdamState::new(&network);

        let y_train_onehot = one_hot(y_train, self.n_classes);
        let n = x_train.nrows();
        let mut indices: Vec<usize> = (0..n).collect();

        let mut history = TrainingHistory::default();
        let mut best: Option<(f64, Network)> = None;
        let mut wait = 0;

        log::info!(
            "Training {} hidden layer(s) x {} units on {} rows ({} features, {} classes)",
            self.model.hidden_layers,
            self.model.units,
            n,
            x_train.ncols(),
            self.n_classes
        );

        for epoch in 1..=self.train.epochs {
            indices.shuffle(&mut rng);
            let mut loss_sum = 0.0f64;
            let mut correct = 0usize;

            for batch in indices.chunks(self.train.batch_size) {
                let x_batch = x_train.select(Axis(0), batch);
                let y_batch_onehot = y_train_onehot.select(Axis(0), batch);
                let y_batch: Vec<usize> = batch.iter().map(|&i| y_train[i]).collect();

                let cache = network.forward_train(x_batch.view(), &mut rng);
                let batch_loss = network.loss(cache.output(), &y_batch);
                if !batch_loss.is_finite() {
                    return Err(self.diverged(epoch, &history));
                }
                loss_sum += batch_loss * batch.len() as f64;
                correct += argmax_rows(cache.output())
                    .iter()
                    .zip(&y_batch)
                    .filter(|(p, t)| p == t)
                    .count();

                let gradients = network.backward(&cache, &y_batch_onehot);
                adam.step(&mut network, &gradients, &self.train);
            }

            let val_proba = network.forward(x_val.view());
            let val_loss = cross_entropy(&val_proba, y_val) + network.penalty();
            if !val_loss.is_finite() {
                return Err(self.diverged(epoch, &history));
            }
            let val_accuracy = accuracy(&argmax_rows(&val_proba), y_val);

            let metrics = EpochMetrics {
                epoch,
                train_loss: loss_sum / n as f64,
                train_accuracy: correct as f64 / n as f64,
                val_loss,
                val_accuracy,
            };
            log::debug!(
                "Epoch {}/{}: loss {:.4}, acc {:.4}, val_loss {:.4}, val_acc {:.4}",
                epoch,
                self.train.epochs,
                metrics.train_loss,
                metrics.train_accuracy,
                metrics.val_loss,
                metrics.val_accuracy
            );
            history.epochs.push(metrics);

            let improved = best.as_ref().map_or(true, |(loss, _)| val_loss < *loss);
            if improved {
                best = Some((val_loss, network.clone()));
                history.best_epoch = epoch;
                wait = 0;
            } else {
                wait += 1;
                if wait >= self.train.early_stopping_patience {
                    log::info!(
                        "Early stopping at epoch {}: no val_loss improvement for {} epochs",
                        epoch,
                        wait
                    );
                    history.stopped_early = true;
                    break;
                }
            }
        }

        if let Some((loss, weights)) = best {
            log::info!(
                "Restoring weights from epoch {} (val_loss {:.4})",
                history.best_epoch,
                loss
            );
            network = weights;
        }

        Ok(TrainedModel { network, history })
    }

    fn diverged(&self, epoch: usize, history: &TrainingHistory) -> PipelineError {
        log::error!("Non-finite loss at epoch {}", epoch);
        PipelineError::TrainingDiverged {
            epoch,
            last_metrics: history.epochs.last().cloned(),
        }
    }

    fn check_inputs(
        &self,
        x_train: &Array2<f32>,
        y_train: &[usize],
        x_val: &Array2<f32>,
        y_val: &[usize],
    ) -> Result<()> {
        if x_train.nrows() == 0 || x_val.nrows() == 0 {
            return Err(PipelineError::EmptyDataset);
        }
        if x_train.nrows() != y_train.len() || x_val.nrows() != y_val.len() {
            return Err(PipelineError::ShapeMismatch(
                "feature rows and label count differ".to_string(),
            ));
        }
        if x_train.ncols() != x_val.ncols() {
            return Err(PipelineError::ShapeMismatch(format!(
                "train has {} features, validation has {}",
                x_train.ncols(),
                x_val.ncols()
            )));
        }
        if let Some(&bad) = y_train.iter().chain(y_val).find(|&&c| c >= self.n_classes) {
            return Err(PipelineError::ShapeMismatch(format!(
                "label {} is outside 0..{}",
                bad, self.n_classes
            )));
        }
        Ok(())
    }
}

fn accuracy(predicted: &[usize], truth: &[usize]) -> f64 {
    if truth.is_empty() {
        return 0.0;
    }
    let hits = predicted.iter().zip(truth).filter(|(p, t)| p == t).count();
    hits as f64 / truth.len() as f64
}
