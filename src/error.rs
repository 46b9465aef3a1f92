use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Errors raised by the pipeline stages.
///
/// Each stage validates its own preconditions and fails fast with one of these.
/// The driver returns them unchanged so callers can tell "no data" from "bad schema".
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PipelineError {
    #[error("Malformed input: {reason}")]
    MalformedInput { reason: String },

    #[error("Insufficient data: {rows} rows supplied, at least {required} required")]
    InsufficientData { rows: usize, required: usize },

    #[error("Feature '{feature}' unusable: {reason}")]
    FeatureMissing { feature: String, reason: String },

    #[error("Invalid configuration: {reason}")]
    Configuration { reason: String },

    #[error("Export failed: {reason}")]
    Export { reason: String },
}

/// Stable error category, used in logs and run reports
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    MalformedInput,
    InsufficientData,
    FeatureMissing,
    Configuration,
    Export,
}

impl PipelineError {
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::MalformedInput { reason: reason.into() }
    }

    pub fn feature_missing(feature: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::FeatureMissing {
            feature: feature.into(),
            reason: reason.into(),
        }
    }

    pub fn configuration(reason: impl Into<String>) -> Self {
        Self::Configuration { reason: reason.into() }
    }

    pub fn export(err: impl fmt::Display) -> Self {
        Self::Export { reason: err.to_string() }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::MalformedInput { .. } => ErrorKind::MalformedInput,
            Self::InsufficientData { .. } => ErrorKind::InsufficientData,
            Self::FeatureMissing { .. } => ErrorKind::FeatureMissing,
            Self::Configuration { .. } => ErrorKind::Configuration,
            Self::Export { .. } => ErrorKind::Export,
        }
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
