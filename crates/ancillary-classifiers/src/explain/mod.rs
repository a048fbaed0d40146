//! Post-hoc model interpretation over a fitted, read-only classifier.

pub mod dependence;
pub mod importance;

pub use dependence::{partial_dependence, partial_dependence_for, DependenceCurve, DependenceOutcome};
pub use importance::{permutation_importance, AccuracyScorer, FeatureFailure, ImportanceEntry, ImportanceTable};
