//! Optional YAML configuration shared by every command.
//!
//! Every section and field has a default, so an empty file (or no file at
//! all) is a valid configuration. Command-line flags override what is read
//! here.

use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

use crate::{
    correctness::RuleSpec,
    ingest::{DEFAULT_MISSING_TOKENS, InferenceOptions},
};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfileConfig {
    pub ingest: IngestConfig,
    pub completeness: CompletenessConfig,
    pub cardinality: CardinalityConfig,
    pub distribution: DistributionConfig,
    pub correctness: CorrectnessConfig,
    pub compare: CompareConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    pub missing_tokens: Vec<String>,
    #[serde(flatten)]
    pub inference: InferenceOptions,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            missing_tokens: DEFAULT_MISSING_TOKENS
                .iter()
                .map(|t| t.to_string())
                .collect(),
            inference: InferenceOptions::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletenessConfig {
    /// Rows with a lower percentage of filled cells are flagged.
    pub row_threshold: f64,
}

impl Default for CompletenessConfig {
    fn default() -> Self {
        Self {
            row_threshold: 90.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CardinalityConfig {
    pub top_values: usize,
}

impl Default for CardinalityConfig {
    fn default() -> Self {
        Self { top_values: 50 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    pub bucket_count: usize,
    pub top_n: usize,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            bucket_count: 10,
            top_n: 10,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CorrectnessConfig {
    pub treat_blank_valid: bool,
    pub rules: BTreeMap<String, RuleSpec>,
    pub expression: Option<String>,
}

impl Default for CorrectnessConfig {
    fn default() -> Self {
        Self {
            treat_blank_valid: true,
            rules: BTreeMap::new(),
            expression: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompareConfig {
    pub row_key: Vec<String>,
}

impl ProfileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let file = File::open(path).with_context(|| format!("Opening config file {path:?}"))?;
        let reader = BufReader::new(file);
        let config: Option<ProfileConfig> =
            serde_yaml::from_reader(reader).context("Parsing config YAML")?;
        let config = config.unwrap_or_default();
        config.validate()?;
        Ok(config)
    }

    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    fn validate(&self) -> Result<()> {
        let inference = &self.ingest.inference;
        for (name, value) in [
            ("numeric_threshold", inference.numeric_threshold),
            ("boolean_threshold", inference.boolean_threshold),
            ("temporal_threshold", inference.temporal_threshold),
            ("min_filled_ratio", inference.min_filled_ratio),
        ] {
            ensure!(
                (0.0..=1.0).contains(&value),
                "ingest.{name} must be between 0 and 1 (got {value})"
            );
        }
        ensure!(
            (0.0..=100.0).contains(&self.completeness.row_threshold),
            "completeness.row_threshold must be a percentage (got {})",
            self.completeness.row_threshold
        );
        ensure!(
            self.distribution.bucket_count > 0,
            "distribution.bucket_count must be at least 1"
        );
        Ok(())
    }
}
