use serde::ser::{SerializeMap, SerializeSeq};
use serde::{Deserialize, Serialize, Serializer};
use tracing::{debug, instrument};

use crate::data::{Feature, ScoredRecord, StateRecord};
use crate::error::{PipelineError, Result};

/// State export configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    /// Exported features, in column order. Consumers rely on this order.
    pub feature_order: Vec<String>,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            feature_order: [
                Feature::RiskScore,
                Feature::AnomalyScore,
                Feature::Volatility,
                Feature::InstabilityScore,
            ]
            .iter()
            .map(|f| f.name().to_string())
            .collect(),
        }
    }
}

impl StateConfig {
    /// Resolve the configured names into features
    pub fn resolve(&self) -> Result<Vec<Feature>> {
        if self.feature_order.is_empty() {
            return Err(PipelineError::configuration("feature_order must not be empty"));
        }

        let mut features = Vec::with_capacity(self.feature_order.len());
        for name in &self.feature_order {
            let feature: Feature = name.parse()?;
            if features.contains(&feature) {
                return Err(PipelineError::configuration(format!(
                    "feature '{}' listed twice in feature_order",
                    feature
                )));
            }
            features.push(feature);
        }
        Ok(features)
    }
}

/// Fitted min/max of one exported feature
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalerParams {
    pub feature: Feature,
    pub min: f64,
    pub max: f64,
}

impl ScalerParams {
    /// Map `value` into [0, 1]. A flat feature maps everything to 0.
    pub fn scale(&self, value: f64) -> f64 {
        let range = self.max - self.min;
        if range <= 0.0 {
            return 0.0;
        }
        ((value - self.min) / range).clamp(0.0, 1.0)
    }

    pub fn is_degenerate(&self) -> bool {
        self.max <= self.min
    }
}

/// Min-max scaler fitted once over the whole batch
#[derive(Debug, Clone, PartialEq)]
pub struct MinMaxScaler {
    params: Vec<ScalerParams>,
}

impl MinMaxScaler {
    pub fn fit(records: &[ScoredRecord], features: &[Feature]) -> Result<Self> {
        let mut params = Vec::with_capacity(features.len());

        for &feature in features {
            let mut min = f64::INFINITY;
            let mut max = f64::NEG_INFINITY;

            for record in records {
                let value = record.feature(feature);
                if !value.is_finite() {
                    return Err(PipelineError::feature_missing(
                        feature.name(),
                        format!(
                            "non-finite value for region '{}' month '{}'",
                            record.region(),
                            record.month()
                        ),
                    ));
                }
                min = min.min(value);
                max = max.max(value);
            }

            if records.is_empty() {
                min = 0.0;
                max = 0.0;
            }

            params.push(ScalerParams { feature, min, max });
        }

        Ok(Self { params })
    }

    pub fn transform(&self, record: &ScoredRecord) -> Vec<f64> {
        self.params
            .iter()
            .map(|p| p.scale(record.feature(p.feature)))
            .collect()
    }

    pub fn params(&self) -> &[ScalerParams] {
        &self.params
    }
}

/// Normalized state table: identifiers plus scaled features in a fixed column order
#[derive(Debug, Clone, PartialEq)]
pub struct StateTable {
    columns: Vec<String>,
    rows: Vec<StateRecord>,
    scaler: Vec<ScalerParams>,
}

impl StateTable {
    /// Scaled feature column names, without the identifier columns
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[StateRecord] {
        &self.rows
    }

    pub fn scaler(&self) -> &[ScalerParams] {
        &self.scaler
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Value of a named column (e.g. "risk_score_scaled") in row `row`
    pub fn value(&self, row: usize, column: &str) -> Option<f64> {
        let col = self.columns.iter().position(|c| c == column)?;
        self.rows.get(row).and_then(|r| r.values.get(col).copied())
    }
}

impl Serialize for StateTable {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut seq = serializer.serialize_seq(Some(self.rows.len()))?;
        for record in &self.rows {
            seq.serialize_element(&StateRow {
                columns: &self.columns,
                record,
            })?;
        }
        seq.end()
    }
}

struct StateRow<'a> {
    columns: &'a [String],
    record: &'a StateRecord,
}

impl Serialize for StateRow<'_> {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.columns.len() + 2))?;
        map.serialize_entry("region", &self.record.region)?;
        map.serialize_entry("month", &self.record.month)?;
        for (column, value) in self.columns.iter().zip(&self.record.values) {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// State normalizer
///
/// Rescales a fixed, ordered feature set into [0, 1] using min/max computed once
/// over the whole batch. Identifiers pass through untouched; row count and order
/// are preserved.
#[derive(Debug, Clone)]
pub struct StateNormalizer {
    features: Vec<Feature>,
}

impl StateNormalizer {
    pub fn new(config: &StateConfig) -> Result<Self> {
        Ok(Self {
            features: config.resolve()?,
        })
    }

    pub fn features(&self) -> &[Feature] {
        &self.features
    }

    #[instrument(name = "normalize_state", skip_all, fields(rows = records.len()))]
    pub fn normalize(&self, records: &[ScoredRecord]) -> Result<StateTable> {
        let scaler = MinMaxScaler::fit(records, &self.features)?;

        for p in scaler.params().iter().filter(|p| p.is_degenerate()) {
            debug!(feature = %p.feature, value = p.min, "Flat feature, scaled to 0");
        }

        let rows = records
            .iter()
            .map(|record| StateRecord {
                region: record.region().to_string(),
                month: record.month().to_string(),
                values: scaler.transform(record),
            })
            .collect();

        Ok(StateTable {
            columns: self.features.iter().map(|f| f.scaled_name()).collect(),
            rows,
            scaler: scaler.params().to_vec(),
        })
    }
}
