use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::str::FromStr;

use crate::data::ScoredRecord;
use crate::error::{PipelineError, Result};
use crate::state::StateTable;

/// Column order of the anomaly table, shared by every export format
pub const ANOMALY_COLUMNS: [&str; 9] = [
    "region",
    "month",
    "update_count",
    "volatility",
    "instability_score",
    "volatility_norm",
    "risk_score",
    "anomaly_flag",
    "anomaly_score",
];

/// Supported export formats
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    /// Pretty-printed JSON array of row objects
    #[default]
    Json,
    /// Header row plus one line per row, fixed column order
    Csv,
}

impl ExportFormat {
    pub fn name(&self) -> &'static str {
        match self {
            ExportFormat::Json => "json",
            ExportFormat::Csv => "csv",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ExportFormat {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "json" => Ok(ExportFormat::Json),
            "csv" => Ok(ExportFormat::Csv),
            other => Err(PipelineError::configuration(format!(
                "unknown export format '{}', expected json or csv",
                other
            ))),
        }
    }
}

/// Render the anomaly table
pub fn render_anomalies(rows: &[ScoredRecord], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(rows).map_err(PipelineError::export),
        ExportFormat::Csv => anomalies_csv(rows),
    }
}

/// Render the state table
pub fn render_state(table: &StateTable, format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Json => serde_json::to_string_pretty(table).map_err(PipelineError::export),
        ExportFormat::Csv => state_csv(table),
    }
}

/// SHA-256 over both tables in compact JSON
///
/// Equal digests mean byte-identical exports.
pub fn table_digest(anomalies: &[ScoredRecord], state: &StateTable) -> Result<String> {
    let mut hasher = Sha256::new();
    hasher.update(serde_json::to_vec(anomalies).map_err(PipelineError::export)?);
    hasher.update(b"\n");
    hasher.update(serde_json::to_vec(state).map_err(PipelineError::export)?);
    Ok(hex::encode(hasher.finalize()))
}

fn anomalies_csv(rows: &[ScoredRecord]) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());
    writer
        .write_record(ANOMALY_COLUMNS)
        .map_err(PipelineError::export)?;

    for row in rows {
        let f = &row.features;
        writer
            .write_record([
                f.region.clone(),
                f.month.clone(),
                f.update_count.to_string(),
                f.volatility.to_string(),
                f.instability_score.to_string(),
                f.volatility_norm.to_string(),
                f.risk_score.to_string(),
                row.anomaly_flag.label().to_string(),
                row.anomaly_score.to_string(),
            ])
            .map_err(PipelineError::export)?;
    }

    finish(writer)
}

fn state_csv(table: &StateTable) -> Result<String> {
    let mut writer = csv::Writer::from_writer(Vec::new());

    let mut header = vec!["region".to_string(), "month".to_string()];
    header.extend(table.columns().iter().cloned());
    writer.write_record(&header).map_err(PipelineError::export)?;

    for row in table.rows() {
        let mut record = Vec::with_capacity(header.len());
        record.push(row.region.clone());
        record.push(row.month.clone());
        record.extend(row.values.iter().map(|v| v.to_string()));
        writer.write_record(&record).map_err(PipelineError::export)?;
    }

    finish(writer)
}

fn finish(writer: csv::Writer<Vec<u8>>) -> Result<String> {
    let bytes = writer
        .into_inner()
        .map_err(|e| PipelineError::export(e.error()))?;
    String::from_utf8(bytes).map_err(PipelineError::export)
}
