use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::anomaly::ScorerConfig;
use crate::features::RiskWeights;
use crate::pipeline::PipelineConfig;
use crate::state::StateConfig;

const DEFAULT_CONFIG_PATH: &str = "config/pipeline.toml";

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub features: RiskWeights,
    pub anomaly: ScorerConfig,
    pub state: StateConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    /// "pretty" or "json"
    pub output: String,
    /// Log file, appended to in either output format. Empty means stderr.
    pub file_path: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            output: "pretty".to_string(),
            file_path: String::new(),
        }
    }
}

impl Config {
    /// Load configuration from TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("reading config file {}", path.display()))?;
        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("parsing config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from the PIPELINE_CONFIG path, or the default path when present.
    ///
    /// Falls back to built-in defaults only when PIPELINE_CONFIG is unset and the
    /// default file does not exist.
    pub fn load() -> Result<Self> {
        match std::env::var("PIPELINE_CONFIG") {
            Ok(path) => Self::from_file(path),
            Err(_) if Path::new(DEFAULT_CONFIG_PATH).exists() => Self::from_file(DEFAULT_CONFIG_PATH),
            Err(_) => Ok(Self::default()),
        }
    }

    /// Validate every stage section
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        self.anomaly.validate()?;
        self.state.resolve()?;
        Ok(())
    }

    pub fn pipeline(&self) -> PipelineConfig {
        PipelineConfig {
            features: self.features,
            anomaly: self.anomaly.clone(),
            state: self.state.clone(),
        }
    }
}
