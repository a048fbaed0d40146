//! Feature encoding and combined-label derivation.
//!
//! Continuous columns are standardized with a per-column mean/std fit once,
//! categorical columns are expanded into indicator groups. The fitted state
//! ([`EncoderState`]) is an immutable value that is applied identically to
//! every record encoded afterwards.

use std::collections::{BTreeMap, BTreeSet};

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;

use crate::config::EncoderConfig;
use crate::data_handling::{BookingRecord, Dataset, PreferenceFlags};
use crate::error::{PipelineError, Result};

/// Simple standard scaler (per-column mean/std).
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Scaler {
    pub mean: Vec<f32>,
    pub std: Vec<f32>,
}

impl Scaler {
    /// Fit from column-major values. Uses the population standard deviation.
    ///
    /// A zero-variance column is scaled with std 1, or rejected when
    /// `reject_constant` is set.
    pub fn fit(columns: &[Vec<f32>], names: &[String], reject_constant: bool) -> Result<Self> {
        let mut mean = Vec::with_capacity(columns.len());
        let mut std = Vec::with_capacity(columns.len());

        for (values, name) in columns.iter().zip(names) {
            let as_f64: Vec<f64> = values.iter().map(|&v| v as f64).collect();
            let m = as_f64.iter().mean();
            let s = as_f64.iter().population_std_dev();

            if !(s > 0.0) {
                if reject_constant {
                    return Err(PipelineError::DegenerateColumn(name.clone()));
                }
                log::warn!(
                    "Continuous column '{}' has zero variance; scaling with std 1",
                    name
                );
                std.push(1.0);
            } else {
                std.push(s as f32);
            }
            mean.push(m as f32);
        }

        Ok(Scaler { mean, std })
    }

    #[inline]
    pub fn scale(&self, column: usize, value: f32) -> f32 {
        (value - self.mean[column]) / self.std[column]
    }
}

/// Sorted levels of one categorical column as observed at fit time.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoryVocabulary {
    pub column: String,
    pub levels: Vec<String>,
}

impl CategoryVocabulary {
    fn fit<'a>(column: &str, values: impl Iterator<Item = &'a str>) -> Self {
        let levels: BTreeSet<&str> = values.collect();
        Self {
            column: column.to_string(),
            levels: levels.into_iter().map(str::to_string).collect(),
        }
    }

    fn position(&self, value: &str) -> Option<usize> {
        self.levels
            .binary_search_by(|level| level.as_str().cmp(value))
            .ok()
    }
}

/// Immutable fitted encoder.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EncoderState {
    pub continuous_columns: Vec<String>,
    pub scaler: Scaler,
    pub vocabularies: Vec<CategoryVocabulary>,
    feature_names: Vec<String>,
}

impl EncoderState {
    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn n_features(&self) -> usize {
        self.feature_names.len()
    }

    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.feature_names.iter().position(|f| f == name)
    }

    /// Encode records with the fitted statistics and vocabularies.
    pub fn transform(&self, records: &[BookingRecord]) -> Result<Array2<f32>> {
        let width = self.n_features();
        let mut out = Array2::<f32>::zeros((records.len(), width));

        for (row, record) in records.iter().enumerate() {
            if record.continuous.len() != self.continuous_columns.len()
                || record.categorical.len() != self.vocabularies.len()
            {
                return Err(PipelineError::ShapeMismatch(format!(
                    "record {} does not match the fitted encoder columns",
                    row
                )));
            }

            let mut col = 0;
            for (i, &value) in record.continuous.iter().enumerate() {
                if !value.is_finite() {
                    return Err(PipelineError::MalformedValue {
                        column: self.continuous_columns[i].clone(),
                        row,
                        value: value.to_string(),
                    });
                }
                out[[row, col]] = self.scaler.scale(i, value);
                col += 1;
            }

            for (vocab, value) in self.vocabularies.iter().zip(&record.categorical) {
                let level = vocab
                    .position(value)
                    .ok_or_else(|| PipelineError::UnknownCategory {
                        column: vocab.column.clone(),
                        row,
                        value: value.clone(),
                    })?;
                out[[row, col + level]] = 1.0;
                col += vocab.levels.len();
            }
        }

        Ok(out)
    }
}

/// Fits an [`EncoderState`] from a dataset.
#[derive(Clone, Debug, Default)]
pub struct FeatureEncoder {
    config: EncoderConfig,
}

impl FeatureEncoder {
    pub fn new(config: EncoderConfig) -> Self {
        Self { config }
    }

    pub fn fit(&self, dataset: &Dataset) -> Result<EncoderState> {
        if dataset.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let schema = &dataset.schema;

        let columns: Vec<Vec<f32>> = (0..schema.continuous.len())
            .map(|c| dataset.records.iter().map(|r| r.continuous[c]).collect())
            .collect();
        let scaler = Scaler::fit(
            &columns,
            &schema.continuous,
            self.config.reject_constant_columns,
        )?;

        let vocabularies: Vec<CategoryVocabulary> = schema
            .categorical
            .iter()
            .enumerate()
            .map(|(c, name)| {
                CategoryVocabulary::fit(
                    name,
                    dataset.records.iter().map(|r| r.categorical[c].as_str()),
                )
            })
            .collect();

        let mut feature_names: Vec<String> = schema
            .continuous
            .iter()
            .map(|c| format!("num__{}", c))
            .collect();
        for vocab in &vocabularies {
            for level in &vocab.levels {
                feature_names.push(format!("cat__{}_{}", vocab.column, level));
            }
        }

        log::debug!(
            "Fitted encoder: {} continuous, {} categorical -> {} encoded features",
            schema.continuous.len(),
            vocabularies.len(),
            feature_names.len()
        );

        Ok(EncoderState {
            continuous_columns: schema.continuous.clone(),
            scaler,
            vocabularies,
            feature_names,
        })
    }

    /// Fit on every record and return the encoded matrix with the fitted state.
    pub fn fit_transform(&self, dataset: &Dataset) -> Result<(Array2<f32>, EncoderState)> {
        let state = self.fit(dataset)?;
        let x = state.transform(&dataset.records)?;
        Ok((x, state))
    }
}

/// First-occurrence factorization of the three preference flags.
///
/// Label `i` is the `i`-th distinct `"{baggage}{meals}{seat}"` key seen in
/// row order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelEncoding {
    keys: Vec<String>,
}

impl LabelEncoding {
    pub fn fit(flags: &[PreferenceFlags]) -> Result<Self> {
        if flags.is_empty() {
            return Err(PipelineError::EmptyDataset);
        }
        let mut keys: Vec<String> = Vec::new();
        for f in flags {
            let key = f.key();
            if !keys.contains(&key) {
                keys.push(key);
            }
        }
        Ok(Self { keys })
    }

    pub fn n_classes(&self) -> usize {
        self.keys.len()
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn encode(&self, flags: &PreferenceFlags) -> Result<usize> {
        let key = flags.key();
        self.keys
            .iter()
            .position(|k| *k == key)
            .ok_or(PipelineError::UnknownLabelCombination(key))
    }

    pub fn encode_all(&self, flags: &[PreferenceFlags]) -> Result<Vec<usize>> {
        flags.iter().map(|f| self.encode(f)).collect()
    }

    pub fn decode(&self, label: usize) -> Option<PreferenceFlags> {
        let key = self.keys.get(label)?;
        let mut bits = key.chars().map(|c| c == '1');
        Some(PreferenceFlags::new(bits.next()?, bits.next()?, bits.next()?))
    }

    /// Human readable names, e.g. `"baggage+seat"`, keyed by label.
    pub fn class_names(&self) -> BTreeMap<usize, String> {
        (0..self.n_classes())
            .filter_map(|label| {
                let f = self.decode(label)?;
                let parts: Vec<&str> = [
                    (f.extra_baggage, "baggage"),
                    (f.in_flight_meals, "meals"),
                    (f.preferred_seat, "seat"),
                ]
                .iter()
                .filter(|(on, _)| *on)
                .map(|(_, name)| *name)
                .collect();
                let name = if parts.is_empty() {
                    "none".to_string()
                } else {
                    parts.join("+")
                };
                Some((label, name))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data_handling::{FeatureSchema, FlagColumns};

    fn schema() -> FeatureSchema {
        FeatureSchema {
            continuous: vec!["a".into(), "b".into()],
            categorical: vec!["channel".into()],
            flags: FlagColumns::default(),
            dropped: vec![],
        }
    }

    fn record(a: f32, b: f32, channel: &str) -> BookingRecord {
        BookingRecord::new(
            vec![a, b],
            vec![channel.to_string()],
            PreferenceFlags::new(false, false, false),
        )
    }

    #[test]
    fn encodes_standardized_then_one_hot() {
        let ds = Dataset::new(
            schema(),
            vec![
                record(1.0, 10.0, "Mobile"),
                record(3.0, 10.0, "Internet"),
                record(5.0, 10.0, "Mobile"),
            ],
        )
        .unwrap();
        let (x, state) = FeatureEncoder::default().fit_transform(&ds).unwrap();

        assert_eq!(
            state.feature_names(),
            &[
                "num__a".to_string(),
                "num__b".to_string(),
                "cat__channel_Internet".to_string(),
                "cat__channel_Mobile".to_string()
            ]
        );
        assert_eq!(x.shape(), &[3, 4]);
        // population std of [1, 3, 5] is sqrt(8/3)
        let std = (8.0f32 / 3.0).sqrt();
        assert!((x[[0, 0]] + 2.0 / std).abs() < 1e-5);
        assert!((x[[1, 0]]).abs() < 1e-6);
        // constant column is centered and left unscaled
        assert_eq!(x[[0, 1]], 0.0);
        assert_eq!(x.row(1).to_vec()[2..].to_vec(), vec![1.0f32, 0.0]);
        assert_eq!(x.row(2).to_vec()[2..].to_vec(), vec![0.0f32, 1.0]);
    }

    #[test]
    fn constant_column_can_be_rejected() {
        let ds = Dataset::new(
            schema(),
            vec![record(1.0, 2.0, "x"), record(2.0, 2.0, "y")],
        )
        .unwrap();
        let encoder = FeatureEncoder::new(EncoderConfig {
            reject_constant_columns: true,
        });
        let err = encoder.fit(&ds).unwrap_err();
        assert!(matches!(err, PipelineError::DegenerateColumn(c) if c == "b"));
    }

    #[test]
    fn transform_rejects_unknown_category() {
        let ds = Dataset::new(
            schema(),
            vec![record(1.0, 2.0, "x"), record(2.0, 3.0, "y")],
        )
        .unwrap();
        let state = FeatureEncoder::default().fit(&ds).unwrap();
        let err = state.transform(&[record(1.0, 1.0, "z")]).unwrap_err();
        assert!(matches!(
            err,
            PipelineError::UnknownCategory { row: 0, ref value, .. } if value == "z"
        ));
    }

    #[test]
    fn label_encoding_uses_first_occurrence() {
        let flags = vec![
            PreferenceFlags::new(true, false, true),
            PreferenceFlags::new(false, false, false),
            PreferenceFlags::new(true, false, true),
            PreferenceFlags::new(true, true, true),
        ];
        let enc = LabelEncoding::fit(&flags).unwrap();
        assert_eq!(enc.n_classes(), 3);
        assert_eq!(enc.encode_all(&flags).unwrap(), vec![0, 1, 0, 2]);
        assert_eq!(enc.decode(2), Some(PreferenceFlags::new(true, true, true)));
        assert_eq!(enc.decode(3), None);
        assert_eq!(enc.class_names()[&0], "baggage+seat");
        assert_eq!(enc.class_names()[&1], "none");

        let err = enc
            .encode(&PreferenceFlags::new(false, true, false))
            .unwrap_err();
        assert!(matches!(err, PipelineError::UnknownLabelCombination(k) if k == "010"));
    }
}
