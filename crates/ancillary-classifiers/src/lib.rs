//! ancillary-classifiers: predict combined ancillary-purchase preferences
//! (extra baggage, in-flight meals, preferred seat) from booking attributes.
//!
//! The crate covers feature encoding, SMOTE rebalancing, a regularized
//! feed-forward network trained with Adam and early stopping, evaluation
//! (accuracy, balanced accuracy, per-class metrics, ROC/AUC), permutation
//! importance and partial dependence, plus the I/O and plotting helpers the
//! `ancillary` CLI uses to persist a run.
pub mod config;
pub mod data_handling;
pub mod error;
pub mod evaluation;
pub mod explain;
pub mod io;
pub mod models;
pub mod pipeline;
pub mod preprocessing;
pub mod report;
pub mod resampling;

pub use error::{PipelineError, Result};
