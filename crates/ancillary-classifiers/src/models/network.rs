//! Feed-forward classifier network.
//!
//! Every hidden layer is `Dense -> activation -> Dropout`, the output layer is
//! `Dense -> softmax`. Hidden kernels carry an L2 penalty. Dropout is only
//! applied by [`Network::forward_train`]; [`Network::forward`] is
//! deterministic.

use ndarray::{Array1, Array2, ArrayView2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::config::{Activation, ModelConfig};
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::ProbabilisticClassifier;

/// Probabilities are clipped to `[EPS, 1 - EPS]` before taking the log.
const PROBA_EPS: f32 = 1e-7;

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// `fan_in x fan_out`
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    /// Glorot-uniform kernel, zero bias.
    fn glorot<R: Rng + ?Sized>(fan_in: usize, fan_out: usize, rng: &mut R) -> Self {
        let limit = (6.0 / (fan_in + fan_out) as f32).sqrt();
        let weights = Array2::from_shape_fn((fan_in, fan_out), |_| rng.gen_range(-limit..limit));
        Self {
            weights,
            bias: Array1::zeros(fan_out),
        }
    }

    fn apply(&self, x: ArrayView2<f32>) -> Array2<f32> {
        x.dot(&self.weights) + &self.bias
    }
}

/// Values kept from a training-mode forward pass for backpropagation.
#[derive(Debug)]
pub struct ForwardCache {
    /// Input to each layer; the last entry is the softmax output.
    pub activations: Vec<Array2<f32>>,
    /// Pre-activation of each hidden layer.
    pub pre_activations: Vec<Array2<f32>>,
    /// Scaled keep-masks of each hidden layer (`None` when dropout is 0).
    pub masks: Vec<Option<Array2<f32>>>,
}

impl ForwardCache {
    pub fn output(&self) -> &Array2<f32> {
        &self.activations[self.activations.len() - 1]
    }
}

/// Gradient of one dense layer.
#[derive(Debug, Clone)]
pub struct LayerGradient {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Network {
    input_dim: usize,
    n_classes: usize,
    activation: Activation,
    dropout: f32,
    l2_penalty: f32,
    layers: Vec<DenseLayer>,
}

impl Network {
    pub fn new<R: Rng + ?Sized>(
        input_dim: usize,
        n_classes: usize,
        config: &ModelConfig,
        rng: &mut R,
    ) -> Result<Self> {
        if input_dim == 0 {
            return Err(PipelineError::InvalidConfig(
                "network input dimension must be at least 1".to_string(),
            ));
        }
        if n_classes == 0 {
            return Err(PipelineError::InvalidConfig(
                "network needs at least one output class".to_string(),
            ));
        }
        config.validate()?;

        let mut layers = Vec::with_capacity(config.hidden_layers + 1);
        let mut fan_in = input_dim;
        for _ in 0..config.hidden_layers {
            layers.push(DenseLayer::glorot(fan_in, config.units, rng));
            fan_in = config.units;
        }
        layers.push(DenseLayer::glorot(fan_in, n_classes, rng));

        Ok(Self {
            input_dim,
            n_classes,
            activation: config.activation,
            dropout: config.dropout,
            l2_penalty: config.l2_penalty,
            layers,
        })
    }

    pub fn input_dim(&self) -> usize {
        self.input_dim
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    pub fn check_input(&self, x: &Array2<f32>) -> Result<()> {
        if x.ncols() != self.input_dim {
            return Err(PipelineError::ShapeMismatch(format!(
                "network expects {} features, got {}",
                self.input_dim,
                x.ncols()
            )));
        }
        Ok(())
    }

    fn hidden_count(&self) -> usize {
        self.layers.len() - 1
    }

    /// Inference pass without dropout.
    pub fn forward(&self, x: ArrayView2<f32>) -> Array2<f32> {
        let mut a = x.to_owned();
        for layer in &self.layers[..self.hidden_count()] {
            a = activate(&layer.apply(a.view()), self.activation);
        }
        let logits = self.layers[self.hidden_count()].apply(a.view());
        softmax(logits)
    }

    /// Training pass with inverted dropout drawn from `rng`.
    pub fn forward_train<R: Rng + ?Sized>(&self, x: ArrayView2<f32>, rng: &mut R) -> ForwardCache {
        let keep = 1.0 - self.dropout;
        let mut activations = vec![x.to_owned()];
        let mut pre_activations = Vec::with_capacity(self.hidden_count());
        let mut masks = Vec::with_capacity(self.hidden_count());

        for layer in &self.layers[..self.hidden_count()] {
            let z = layer.apply(activations[activations.len() - 1].view());
            let mut h = activate(&z, self.activation);
            let mask = if self.dropout > 0.0 {
                let m = Array2::from_shape_fn(h.raw_dim(), |_| {
                    if rng.gen::<f32>() < keep {
                        1.0 / keep
                    } else {
                        0.0
                    }
                });
                h *= &m;
                Some(m)
            } else {
                None
            };
            pre_activations.push(z);
            masks.push(mask);
            activations.push(h);
        }

        let logits = self.layers[self.hidden_count()].apply(activations[activations.len() - 1].view());
        activations.push(softmax(logits));

        ForwardCache {
            activations,
            pre_activations,
            masks,
        }
    }

    /// Gradients of mean cross-entropy plus the L2 penalty.
    pub fn backward(&self, cache: &ForwardCache, y_onehot: &Array2<f32>) -> Vec<LayerGradient> {
        let n = y_onehot.nrows().max(1) as f32;
        let mut delta = (cache.output() - y_onehot) / n;
        let mut gradients = Vec::with_capacity(self.layers.len());

        for i in (0..self.layers.len()).rev() {
            let a_prev = &cache.activations[i];
            let mut grad_w = a_prev.t().dot(&delta);
            if i < self.hidden_count() && self.l2_penalty > 0.0 {
                grad_w.scaled_add(2.0 * self.l2_penalty, &self.layers[i].weights);
            }
            let grad_b = delta.sum_axis(Axis(0));

            if i > 0 {
                let mut next = delta.dot(&self.layers[i].weights.t());
                if let Some(mask) = &cache.masks[i - 1] {
                    next *= mask;
                }
                next *= &activate_derivative(&cache.pre_activations[i - 1], self.activation);
                delta = next;
            }

            gradients.push(LayerGradient {
                weights: grad_w,
                bias: grad_b,
            });
        }

        gradients.reverse();
        gradients
    }

    /// `l2 * sum(W^2)` over hidden kernels.
    pub fn penalty(&self) -> f64 {
        if self.l2_penalty == 0.0 {
            return 0.0;
        }
        let sum: f64 = self.layers[..self.hidden_count()]
            .iter()
            .map(|l| l.weights.iter().map(|&w| (w as f64) * (w as f64)).sum::<f64>())
            .sum();
        self.l2_penalty as f64 * sum
    }

    /// Mean categorical cross-entropy plus the L2 penalty.
    pub fn loss(&self, proba: &Array2<f32>, y: &[usize]) -> f64 {
        cross_entropy(proba, y) + self.penalty()
    }
}

impl ProbabilisticClassifier for Network {
    fn n_features(&self) -> usize {
        self.input_dim
    }

    fn n_classes(&self) -> usize {
        self.n_classes
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.check_input(x)?;
        Ok(self.forward(x.view()))
    }

    fn name(&self) -> &str {
        "mlp"
    }
}

/// Mean negative log-probability of the true class.
pub fn cross_entropy(proba: &Array2<f32>, y: &[usize]) -> f64 {
    if y.is_empty() {
        return 0.0;
    }
    let total: f64 = y
        .iter()
        .enumerate()
        .map(|(row, &class)| {
            let p = proba[[row, class]].clamp(PROBA_EPS, 1.0 - PROBA_EPS);
            -(p as f64).ln()
        })
        .sum();
    total / y.len() as f64
}

pub fn one_hot(y: &[usize], n_classes: usize) -> Array2<f32> {
    let mut out = Array2::zeros((y.len(), n_classes));
    for (row, &class) in y.iter().enumerate() {
        out[[row, class]] = 1.0;
    }
    out
}

fn activate(z: &Array2<f32>, activation: Activation) -> Array2<f32> {
    match activation {
        Activation::Relu => z.mapv(|v| v.max(0.0)),
        Activation::Sigmoid => z.mapv(|v| 1.0 / (1.0 + (-v).exp())),
        Activation::Tanh => z.mapv(f32::tanh),
    }
}

fn activate_derivative(z: &Array2<f32>, activation: Activation) -> Array2<f32> {
    match activation {
        Activation::Relu => z.mapv(|v| if v > 0.0 { 1.0 } else { 0.0 }),
        Activation::Sigmoid => z.mapv(|v| {
            let s = 1.0 / (1.0 + (-v).exp());
            s * (1.0 - s)
        }),
        Activation::Tanh => z.mapv(|v| {
            let t = v.tanh();
            1.0 - t * t
        }),
    }
}

fn softmax(mut logits: Array2<f32>) -> Array2<f32> {
    for mut row in logits.rows_mut() {
        let max = row.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
        row.mapv_inplace(|v| (v - max).exp());
        let sum = row.sum();
        row.mapv_inplace(|v| v / sum);
    }
    logits
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn small_config() -> ModelConfig {
        ModelConfig {
            hidden_layers: 2,
            units: 8,
            activation: Activation::Relu,
            dropout: 0.5,
            l2_penalty: 0.01,
        }
    }

    #[test]
    fn new_rejects_bad_dimensions() {
        let mut rng = StdRng::seed_from_u64(0);
        assert!(Network::new(0, 3, &small_config(), &mut rng).is_err());
        assert!(Network::new(4, 0, &small_config(), &mut rng).is_err());
        let mut cfg = small_config();
        cfg.dropout = 1.0;
        assert!(Network::new(4, 3, &cfg, &mut rng).is_err());
    }

    #[test]
    fn glorot_weights_are_bounded() {
        let mut rng = StdRng::seed_from_u64(1);
        let net = Network::new(10, 3, &small_config(), &mut rng).unwrap();
        let limit = (6.0f32 / 18.0).sqrt();
        assert!(net.layers()[0].weights.iter().all(|w| w.abs() <= limit));
        assert!(net.layers()[0].bias.iter().all(|&b| b == 0.0));
        assert_eq!(net.layers().len(), 3);
    }

    #[test]
    fn inference_rows_sum_to_one_and_repeat_exactly() {
        let mut rng = StdRng::seed_from_u64(2);
        let net = Network::new(3, 4, &small_config(), &mut rng).unwrap();
        let x = array![[0.1f32, -1.0, 2.0], [0.0, 0.0, 0.0]];
        let a = net.predict_proba(&x).unwrap();
        let b = net.predict_proba(&x).unwrap();
        assert_eq!(a, b);
        for row in a.rows() {
            assert!((row.sum() - 1.0).abs() < 1e-5);
        }
    }

    #[test]
    fn width_mismatch_is_a_shape_error() {
        let mut rng = StdRng::seed_from_u64(3);
        let net = Network::new(3, 2, &small_config(), &mut rng).unwrap();
        let err = net.predict_proba(&Array2::zeros((1, 5))).unwrap_err();
        assert!(matches!(err, PipelineError::ShapeMismatch(_)));
    }

    #[test]
    fn gradient_matches_finite_difference() {
        let mut rng = StdRng::seed_from_u64(4);
        let cfg = ModelConfig {
            hidden_layers: 1,
            units: 5,
            activation: Activation::Tanh,
            dropout: 0.0,
            l2_penalty: 0.01,
        };
        let mut net = Network::new(3, 3, &cfg, &mut rng).unwrap();
        let x = array![[0.5f32, -0.2, 0.1], [-0.3, 0.8, 0.4]];
        let y = vec![2usize, 0];
        let cache = net.forward_train(x.view(), &mut rng);
        let grads = net.backward(&cache, &one_hot(&y, 3));

        let h = 1e-3f32;
        let original = net.layers()[0].weights[[1, 2]];
        net.layers_mut()[0].weights[[1, 2]] = original + h;
        let plus = net.loss(&net.forward(x.view()), &y);
        net.layers_mut()[0].weights[[1, 2]] = original - h;
        let minus = net.loss(&net.forward(x.view()), &y);
        let numeric = (plus - minus) / (2.0 * h as f64);

        assert!((numeric - grads[0].weights[[1, 2]] as f64).abs() < 1e-3);
    }
}
