pub mod data;
pub mod error;
pub mod features;
pub mod anomaly;
pub mod state;
pub mod pipeline;
pub mod utils;

// Re-export commonly used types
pub use data::{AnomalyFlag, Feature, FeatureRecord, ScoredRecord, StateRecord, UpdateRecord};
pub use error::{ErrorKind, PipelineError};
pub use features::{FeatureDeriver, RiskWeights};
pub use anomaly::{AnomalyScorer, IsolationForest, ScorerConfig};
pub use state::{ScalerParams, StateConfig, StateNormalizer, StateTable};
pub use pipeline::{ExportFormat, PipelineConfig, PipelineDriver, PipelineOutput, RunReport, Stage};
pub use utils::Config;
