use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::ArgMatches;
use serde::{Deserialize, Serialize};

use ancillary_classifiers::config::PipelineConfig;

/// Settings for `ancillary run`.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RunConfig {
    pub data: String,
    pub output_dir: String,
    pub plots: bool,
    pub report: bool,
    pub pipeline: PipelineConfig,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            data: String::new(),
            output_dir: String::from("ancillary_output"),
            plots: true,
            report: true,
            pipeline: PipelineConfig::default(),
        }
    }
}

impl RunConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.as_ref().display()))?;
        let config: RunConfig = serde_json::from_str(&content)
            .with_context(|| format!("Failed to parse config: {}", path.as_ref().display()))?;
        Ok(config)
    }

    /// Load the JSON config (or defaults when none is given) and apply CLI overrides.
    pub fn from_arguments(config_path: Option<&PathBuf>, matches: &ArgMatches) -> Result<Self> {
        let mut config = match config_path {
            Some(path) => Self::load(path)?,
            None => {
                log::info!("No config provided; using defaults.");
                Self::default()
            }
        };

        if let Some(data) = matches.get_one::<String>("data") {
            config.data = data.clone();
        }
        validate_tsv_or_csv_file(&config.data)?;

        if let Some(output_dir) = matches.get_one::<String>("output_dir") {
            config.output_dir = output_dir.clone();
        }
        if let Some(&epochs) = matches.get_one::<usize>("epochs") {
            config.pipeline.training.epochs = epochs;
        }
        if let Some(&seed) = matches.get_one::<u64>("seed") {
            config.pipeline.split.seed = seed;
            config.pipeline.training.seed = seed;
        }
        if matches.get_flag("no_plots") {
            config.plots = false;
        }
        if matches.get_flag("no_report") {
            config.report = false;
        }

        config
            .pipeline
            .validate()
            .context("Invalid pipeline configuration")?;
        Ok(config)
    }
}

/// Settings for `ancillary evaluate`.
#[derive(Debug, Clone)]
pub struct EvaluateConfig {
    pub artifacts_dir: PathBuf,
    pub output_dir: PathBuf,
    pub headline_class: usize,
}

impl EvaluateConfig {
    pub fn from_arguments(matches: &ArgMatches) -> Result<Self> {
        let artifacts_dir: PathBuf = matches
            .get_one::<PathBuf>("artifacts_dir")
            .cloned()
            .context("Missing artifacts directory")?;
        if !artifacts_dir.is_dir() {
            anyhow::bail!("Artifacts directory does not exist: {}", artifacts_dir.display());
        }
        let output_dir = matches
            .get_one::<PathBuf>("output_dir")
            .cloned()
            .unwrap_or_else(|| artifacts_dir.clone());
        let headline_class = matches.get_one::<usize>("headline_class").copied().unwrap_or(0);
        Ok(Self {
            artifacts_dir,
            output_dir,
            headline_class,
        })
    }
}

pub fn validate_tsv_or_csv_file(path: &str) -> Result<()> {
    let pb = PathBuf::from(path);

    let ext = pb
        .extension()
        .and_then(|s| s.to_str())
        .map(|s| s.to_lowercase());
    match ext.as_deref() {
        Some("tsv") | Some("csv") => {}
        _ => anyhow::bail!("File must have a .tsv or .csv extension: {}", path),
    }

    if !pb.exists() {
        anyhow::bail!("File does not exist: {}", path);
    }

    Ok(())
}
