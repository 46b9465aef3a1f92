use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{error, info};

use super::export::{self, ExportFormat};
use super::report::RunReport;
use crate::anomaly::{AnomalyScorer, ScorerConfig};
use crate::data::{ScoredRecord, UpdateRecord};
use crate::error::Result;
use crate::features::{FeatureDeriver, RiskWeights};
use crate::state::{StateConfig, StateNormalizer, StateTable};

/// Stage configuration for one pipeline run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: RiskWeights,
    pub anomaly: ScorerConfig,
    pub state: StateConfig,
}

/// Pipeline stages, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    DeriveFeatures,
    ScoreAnomalies,
    NormalizeState,
}

impl Stage {
    pub fn name(&self) -> &'static str {
        match self {
            Stage::DeriveFeatures => "derive_features",
            Stage::ScoreAnomalies => "score_anomalies",
            Stage::NormalizeState => "normalize_state",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Both export tables of a successful run
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// One row per input row, ordered by (region, month)
    pub anomalies: Vec<ScoredRecord>,

    /// Same row count and order as `anomalies`
    pub state: StateTable,

    pub report: RunReport,
}

impl PipelineOutput {
    pub fn anomalies_json(&self) -> Result<String> {
        self.render_anomalies(ExportFormat::Json)
    }

    pub fn state_json(&self) -> Result<String> {
        self.render_state(ExportFormat::Json)
    }

    pub fn render_anomalies(&self, format: ExportFormat) -> Result<String> {
        export::render_anomalies(&self.anomalies, format)
    }

    pub fn render_state(&self, format: ExportFormat) -> Result<String> {
        export::render_state(&self.state, format)
    }

    /// SHA-256 of both tables, as recorded in the run report
    pub fn digest(&self) -> &str {
        &self.report.digest
    }
}

/// Runs feature derivation, anomaly scoring and state normalization in order.
///
/// Every stage is a pure function of its input, so nothing is retried. The first
/// failing stage ends the run and its error is returned unchanged.
#[derive(Debug, Clone)]
pub struct PipelineDriver {
    deriver: FeatureDeriver,
    scorer: AnomalyScorer,
    normalizer: StateNormalizer,
}

impl PipelineDriver {
    /// Build all stages, validating the whole configuration up front
    pub fn new(config: &PipelineConfig) -> Result<Self> {
        Ok(Self {
            deriver: FeatureDeriver::new(config.features)?,
            scorer: AnomalyScorer::new(config.anomaly.clone())?,
            normalizer: StateNormalizer::new(&config.state)?,
        })
    }

    pub fn run(&self, records: Vec<UpdateRecord>) -> Result<PipelineOutput> {
        info!(rows = records.len(), "Pipeline run started");

        let features = run_stage(Stage::DeriveFeatures, || self.deriver.derive(&records))?;
        drop(records);

        let scoring = run_stage(Stage::ScoreAnomalies, || self.scorer.score_detailed(&features))?;
        drop(features);

        let state = run_stage(Stage::NormalizeState, || self.normalizer.normalize(&scoring.records))?;

        let digest = export::table_digest(&scoring.records, &state)?;

        let config = self.scorer.config();
        let report = RunReport::build(
            &scoring.records,
            config.contamination,
            config.seed,
            config.num_estimators,
            scoring.offset,
            state.scaler(),
            digest,
        );

        info!(
            rows = report.rows,
            regions = report.regions,
            flagged = report.flagged,
            digest = %report.digest,
            "Pipeline run completed"
        );

        Ok(PipelineOutput {
            anomalies: scoring.records,
            state,
            report,
        })
    }
}

fn run_stage<T>(stage: Stage, f: impl FnOnce() -> Result<T>) -> Result<T> {
    info!(stage = %stage, "Stage started");
    match f() {
        Ok(value) => {
            info!(stage = %stage, "Stage finished");
            Ok(value)
        }
        Err(e) => {
            error!(stage = %stage, kind = ?e.kind(), error = %e, "Stage failed");
            Err(e)
        }
    }
}
