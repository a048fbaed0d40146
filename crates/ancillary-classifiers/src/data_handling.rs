//! Booking records, the declared column schema and train/test splitting.
//!
//! Column roles are never inferred from value types: every input column must
//! appear in a [`FeatureSchema`] as continuous, categorical, one of the three
//! preference flags, or a column dropped before modeling.
use std::collections::HashSet;

use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};

/// Names of the three binary ancillary-preference columns, in label-key order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FlagColumns {
    pub extra_baggage: String,
    pub in_flight_meals: String,
    pub preferred_seat: String,
}

impl Default for FlagColumns {
    fn default() -> Self {
        Self {
            extra_baggage: "wants_extra_baggage".to_string(),
            in_flight_meals: "wants_in_flight_meals".to_string(),
            preferred_seat: "wants_preferred_seat".to_string(),
        }
    }
}

impl FlagColumns {
    pub fn names(&self) -> [&str; 3] {
        [
            self.extra_baggage.as_str(),
            self.in_flight_meals.as_str(),
            self.preferred_seat.as_str(),
        ]
    }
}

/// Explicit declaration of every column in the booking table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureSchema {
    pub continuous: Vec<String>,
    pub categorical: Vec<String>,
    pub flags: FlagColumns,
    /// Present in the input but removed before modeling.
    pub dropped: Vec<String>,
}

impl Default for FeatureSchema {
    fn default() -> Self {
        Self {
            continuous: [
                "num_passengers",
                "purchase_lead",
                "length_of_stay",
                "flight_hour",
                "flight_duration",
                "booking_complete",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            categorical: ["sales_channel", "trip_type", "flight_day"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            flags: FlagColumns::default(),
            dropped: ["route", "booking_origin", "departure", "arrival"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
        }
    }
}

impl FeatureSchema {
    /// Every column name the schema knows about.
    pub fn all_columns(&self) -> impl Iterator<Item = &str> {
        self.continuous
            .iter()
            .map(String::as_str)
            .chain(self.categorical.iter().map(String::as_str))
            .chain(self.flags.names())
            .chain(self.dropped.iter().map(String::as_str))
    }

    pub fn validate(&self) -> Result<()> {
        if self.continuous.is_empty() && self.categorical.is_empty() {
            return Err(PipelineError::InvalidConfig(
                "schema declares no feature columns".to_string(),
            ));
        }
        let mut seen = HashSet::new();
        for name in self.all_columns() {
            if !seen.insert(name) {
                return Err(PipelineError::InvalidConfig(format!(
                    "column '{}' is declared more than once in the schema",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// The three binary ancillary-purchase preferences of one booking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct PreferenceFlags {
    pub extra_baggage: bool,
    pub in_flight_meals: bool,
    pub preferred_seat: bool,
}

impl PreferenceFlags {
    pub fn new(extra_baggage: bool, in_flight_meals: bool, preferred_seat: bool) -> Self {
        Self {
            extra_baggage,
            in_flight_meals,
            preferred_seat,
        }
    }

    /// Ordered key, e.g. `"101"` for baggage + seat.
    pub fn key(&self) -> String {
        [self.extra_baggage, self.in_flight_meals, self.preferred_seat]
            .iter()
            .map(|&b| if b { '1' } else { '0' })
            .collect()
    }
}

/// One booking observation, already split by column role.
#[derive(Debug, Clone, PartialEq)]
pub struct BookingRecord {
    /// Values in `FeatureSchema::continuous` order.
    pub continuous: Vec<f32>,
    /// Values in `FeatureSchema::categorical` order.
    pub categorical: Vec<String>,
    pub flags: PreferenceFlags,
}

impl BookingRecord {
    pub fn new(continuous: Vec<f32>, categorical: Vec<String>, flags: PreferenceFlags) -> Self {
        Self {
            continuous,
            categorical,
            flags,
        }
    }
}

/// Validated collection of booking records.
#[derive(Debug, Clone)]
pub struct Dataset {
    pub schema: FeatureSchema,
    pub records: Vec<BookingRecord>,
}

impl Dataset {
    /// Build a dataset from records that were constructed in code.
    pub fn new(schema: FeatureSchema, records: Vec<BookingRecord>) -> Result<Self> {
        schema.validate()?;
        for (row, record) in records.iter().enumerate() {
            if record.continuous.len() != schema.continuous.len()
                || record.categorical.len() != schema.categorical.len()
            {
                return Err(PipelineError::ShapeMismatch(format!(
                    "record {} has {} continuous and {} categorical values, schema expects {} and {}",
                    row,
                    record.continuous.len(),
                    record.categorical.len(),
                    schema.continuous.len(),
                    schema.categorical.len()
                )));
            }
        }
        Ok(Self { schema, records })
    }

    /// Build a dataset from a header row and string-valued rows.
    ///
    /// Columns not declared in the schema are rejected, as are declared
    /// columns absent from the header.
    pub fn from_table<I>(schema: FeatureSchema, headers: &[String], rows: I) -> Result<Self>
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        schema.validate()?;

        let declared: HashSet<&str> = schema.all_columns().collect();
        if let Some(extra) = headers.iter().find(|h| !declared.contains(h.trim())) {
            return Err(PipelineError::UnexpectedColumn(extra.trim().to_string()));
        }

        let position = |name: &str| -> Result<usize> {
            headers
                .iter()
                .position(|h| h.trim() == name)
                .ok_or_else(|| PipelineError::MissingColumn(name.to_string()))
        };

        let continuous_idx = schema
            .continuous
            .iter()
            .map(|c| position(c))
            .collect::<Result<Vec<_>>>()?;
        let categorical_idx = schema
            .categorical
            .iter()
            .map(|c| position(c))
            .collect::<Result<Vec<_>>>()?;
        let flag_idx = schema
            .flags
            .names()
            .iter()
            .map(|c| position(c))
            .collect::<Result<Vec<_>>>()?;
        for dropped in &schema.dropped {
            position(dropped)?;
        }

        let mut records = Vec::new();
        for (row, values) in rows.into_iter().enumerate() {
            if values.len() != headers.len() {
                return Err(PipelineError::ShapeMismatch(format!(
                    "row {} has {} fields, header has {}",
                    row,
                    values.len(),
                    headers.len()
                )));
            }

            let continuous = continuous_idx
                .iter()
                .zip(&schema.continuous)
                .map(|(&i, name)| parse_continuous(&values[i], name, row))
                .collect::<Result<Vec<f32>>>()?;

            let categorical = categorical_idx
                .iter()
                .map(|&i| values[i].trim().to_string())
                .collect();

            let flag_names = schema.flags.names();
            let mut flags = [false; 3];
            for (slot, (&i, name)) in flags.iter_mut().zip(flag_idx.iter().zip(flag_names)) {
                *slot = parse_flag(&values[i]).ok_or_else(|| PipelineError::MalformedValue {
                    column: name.to_string(),
                    row,
                    value: values[i].clone(),
                })?;
            }

            records.push(BookingRecord {
                continuous,
                categorical,
                flags: PreferenceFlags::new(flags[0], flags[1], flags[2]),
            });
        }

        Ok(Self { schema, records })
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn flags(&self) -> Vec<PreferenceFlags> {
        self.records.iter().map(|r| r.flags).collect()
    }

    pub fn log_input_data_summary(&self) {
        log::info!("----- Input Data Summary -----");
        log::info!("{} booking records", self.len());
        log::info!(
            "{} continuous and {} categorical feature columns ({} dropped)",
            self.schema.continuous.len(),
            self.schema.categorical.len(),
            self.schema.dropped.len()
        );
        log::info!("-------------------------------");
    }
}

fn parse_continuous(value: &str, column: &str, row: usize) -> Result<f32> {
    let trimmed = value.trim();
    match trimmed.parse::<f32>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(PipelineError::MalformedValue {
            column: column.to_string(),
            row,
            value: value.to_string(),
        }),
    }
}

/// Parse a binary flag written as `0`/`1` (optionally `0.0`/`1.0`) or `true`/`false`.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "1" | "1.0" | "true" => Some(true),
        "0" | "0.0" | "false" => Some(false),
        _ => None,
    }
}

/// Row indices of a shuffled train/test partition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrainTestSplit {
    pub train: Vec<usize>,
    pub test: Vec<usize>,
}

/// Shuffle `0..n_samples` with a seeded RNG and hold out `ceil(n * test_fraction)` rows.
pub fn train_test_split(n_samples: usize, test_fraction: f64, seed: u64) -> Result<TrainTestSplit> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }
    let n_test = (n_samples as f64 * test_fraction).ceil() as usize;
    if n_test == 0 || n_test >= n_samples {
        return Err(PipelineError::InvalidConfig(format!(
            "cannot split {} rows with test fraction {}",
            n_samples, test_fraction
        )));
    }

    let mut rng = StdRng::seed_from_u64(seed);
    let mut indices: Vec<usize> = (0..n_samples).collect();
    indices.shuffle(&mut rng);

    let train = indices.split_off(n_test);
    Ok(TrainTestSplit {
        train,
        test: indices,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn small_schema() -> FeatureSchema {
        FeatureSchema {
            continuous: vec!["lead".to_string()],
            categorical: vec!["channel".to_string()],
            flags: FlagColumns {
                extra_baggage: "bag".to_string(),
                in_flight_meals: "meal".to_string(),
                preferred_seat: "seat".to_string(),
            },
            dropped: vec!["route".to_string()],
        }
    }

    #[test]
    fn from_table_parses_rows() {
        let h = headers(&["lead", "channel", "bag", "meal", "seat", "route"]);
        let rows = vec![
            headers(&["12", "Internet", "1", "0", "1", "AKLDEL"]),
            headers(&["3.5", "Mobile", "0", "0", "0", "AKLHGH"]),
        ];
        let ds = Dataset::from_table(small_schema(), &h, rows).unwrap();
        assert_eq!(ds.len(), 2);
        assert_eq!(ds.records[0].continuous, vec![12.0]);
        assert_eq!(ds.records[1].categorical, vec!["Mobile".to_string()]);
        assert_eq!(ds.records[0].flags.key(), "101");
    }

    #[test]
    fn from_table_rejects_undeclared_column() {
        let h = headers(&["lead", "channel", "bag", "meal", "seat", "route", "extra"]);
        let err = Dataset::from_table(small_schema(), &h, Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::UnexpectedColumn(c) if c == "extra"));
    }

    #[test]
    fn from_table_rejects_missing_column() {
        let h = headers(&["lead", "channel", "bag", "meal", "route"]);
        let err = Dataset::from_table(small_schema(), &h, Vec::new()).unwrap_err();
        assert!(matches!(err, PipelineError::MissingColumn(c) if c == "seat"));
    }

    #[test]
    fn from_table_reports_malformed_value() {
        let h = headers(&["lead", "channel", "bag", "meal", "seat", "route"]);
        let rows = vec![headers(&["abc", "Internet", "1", "0", "1", "X"])];
        let err = Dataset::from_table(small_schema(), &h, rows).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedValue { row: 0, .. }));
    }

    #[test]
    fn parse_flag_accepts_common_spellings() {
        assert_eq!(parse_flag("1"), Some(true));
        assert_eq!(parse_flag(" TRUE "), Some(true));
        assert_eq!(parse_flag("0.0"), Some(false));
        assert_eq!(parse_flag("yes"), None);
    }

    #[test]
    fn split_is_a_deterministic_partition() {
        let a = train_test_split(1000, 0.2, 42).unwrap();
        let b = train_test_split(1000, 0.2, 42).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.test.len(), 200);
        assert_eq!(a.train.len(), 800);

        let mut all: Vec<usize> = a.train.iter().chain(a.test.iter()).copied().collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<_>>());
    }

    #[test]
    fn schema_rejects_duplicates() {
        let mut schema = small_schema();
        schema.categorical.push("lead".to_string());
        assert!(schema.validate().is_err());
    }
}
