//! Index configuration management via TOML files.
//!
//! ```toml
//! [training]
//! palette_size = 50
//! reference_color = "white"   # "black" or "#rrggbb" also accepted
//! metric = "cie94"
//! extensions = ["png"]
//! decode_failure = "fail"
//! parallel = true
//!
//! [query]
//! unmatched_policy = "skip"
//! ranking_order = "descending"
//! ```
//!
//! Missing sections and keys fall back to defaults.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::color::{DistanceMetric, ReferenceColor};
use crate::error::{RaptorError, RaptorResult};
use crate::grid_hash::{RankingOrder, UnmatchedColorPolicy};
use crate::palette::DEFAULT_PALETTE_SIZE;
use crate::pipeline::DecodeFailurePolicy;

/// Settings for the two-pass index build.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Number of palette entries (K). Must be at least 2.
    pub palette_size: usize,
    /// Color every observed color is keyed against before sampling.
    pub reference_color: ReferenceColor,
    /// Color difference formula.
    pub metric: DistanceMetric,
    /// File extensions picked up by directory discovery.
    pub extensions: Vec<String>,
    /// What to do with images that fail to decode.
    pub decode_failure: DecodeFailurePolicy,
    /// Decode the first pass and build the quantization map on the rayon pool.
    pub parallel: bool,
}

impl TrainingConfig {
    /// # Errors
    ///
    /// `InvalidConfiguration` for `palette_size < 2` or an empty extension list.
    pub fn validate(&self) -> RaptorResult<()> {
        if self.palette_size < 2 {
            return Err(RaptorError::invalid_config(
                "palette_size",
                self.palette_size.to_string(),
                "must be >= 2",
            ));
        }
        if self.extensions.iter().all(|ext| ext.trim().is_empty()) {
            return Err(RaptorError::invalid_config(
                "extensions",
                format!("{:?}", self.extensions),
                "at least one file extension is required",
            ));
        }
        Ok(())
    }
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            palette_size: DEFAULT_PALETTE_SIZE,
            reference_color: ReferenceColor::default(),
            metric: DistanceMetric::default(),
            extensions: vec!["png".to_string()],
            decode_failure: DecodeFailurePolicy::default(),
            parallel: true,
        }
    }
}

/// Settings applied when ranking rotations for a query image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QueryConfig {
    pub unmatched_policy: UnmatchedColorPolicy,
    pub ranking_order: RankingOrder,
}

/// Top-level configuration file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RaptorConfig {
    pub training: TrainingConfig,
    pub query: QueryConfig,
}

impl RaptorConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path)?;
        Self::from_str(&contents)
    }

    /// Parse and validate a TOML document.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let config: RaptorConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config
            .training
            .validate()
            .map_err(|err| ConfigError::Parse(err.to_string()))?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|err| ConfigError::Parse(err.to_string()))
    }
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}
