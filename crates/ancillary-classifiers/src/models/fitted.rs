use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::data_handling::{BookingRecord, PreferenceFlags};
use crate::error::{PipelineError, Result};
use crate::models::classifier_trait::{argmax_rows, ProbabilisticClassifier};
use crate::models::network::Network;
use crate::preprocessing::{EncoderState, LabelEncoding};

/// A trained network bundled with the encoder and label mapping it was fit with.
///
/// Only read-only inference is exposed; training happens in
/// [`crate::models::Trainer`] before this value is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedClassifier {
    network: Network,
    encoder: EncoderState,
    labels: LabelEncoding,
}

impl FittedClassifier {
    pub fn new(network: Network, encoder: EncoderState, labels: LabelEncoding) -> Result<Self> {
        if network.input_dim() != encoder.n_features() {
            return Err(PipelineError::ShapeMismatch(format!(
                "network expects {} features but the encoder produces {}",
                network.input_dim(),
                encoder.n_features()
            )));
        }
        if network.n_classes() != labels.n_classes() {
            return Err(PipelineError::ShapeMismatch(format!(
                "network has {} outputs but the label encoding has {} classes",
                network.n_classes(),
                labels.n_classes()
            )));
        }
        Ok(Self {
            network,
            encoder,
            labels,
        })
    }

    pub fn network(&self) -> &Network {
        &self.network
    }

    pub fn encoder(&self) -> &EncoderState {
        &self.encoder
    }

    pub fn labels(&self) -> &LabelEncoding {
        &self.labels
    }

    /// Encode raw records and return the predicted preference flags.
    pub fn predict_records(&self, records: &[BookingRecord]) -> Result<Vec<PreferenceFlags>> {
        let x = self.encoder.transform(records)?;
        argmax_rows(&self.network.predict_proba(&x)?)
            .into_iter()
            .map(|label| {
                self.labels
                    .decode(label)
                    .ok_or(PipelineError::UndecodableLabel(label))
            })
            .collect()
    }
}

impl ProbabilisticClassifier for FittedClassifier {
    fn n_features(&self) -> usize {
        self.network.input_dim()
    }

    fn n_classes(&self) -> usize {
        self.labels.n_classes()
    }

    fn predict_proba(&self, x: &Array2<f32>) -> Result<Array2<f32>> {
        self.network.predict_proba(x)
    }

    fn name(&self) -> &str {
        self.network.name()
    }
}
