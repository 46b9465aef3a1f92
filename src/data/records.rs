use serde::{Deserialize, Serialize};

use super::Feature;

/// One aggregated observation of update activity for a region in a month
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateRecord {
    pub region: String,
    /// "YYYY-MM"
    pub month: String,
    pub update_count: f64,
}

impl UpdateRecord {
    pub fn new(region: impl Into<String>, month: impl Into<String>, update_count: f64) -> Self {
        Self {
            region: region.into(),
            month: month.into(),
            update_count,
        }
    }
}

/// Update record widened with per-region instability statistics
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub region: String,
    pub month: String,
    pub update_count: f64,

    /// Absolute change from the previous month of the same region (0 for the first month)
    pub volatility: f64,

    /// Z-score of update_count within the region
    pub instability_score: f64,

    /// Z-score of volatility within the region
    pub volatility_norm: f64,

    /// Weighted combination of instability_score and volatility_norm
    pub risk_score: f64,
}

impl FeatureRecord {
    /// Look up a numeric column by feature.
    ///
    /// Returns None for columns that only exist after anomaly scoring.
    pub fn feature(&self, feature: Feature) -> Option<f64> {
        match feature {
            Feature::UpdateCount => Some(self.update_count),
            Feature::Volatility => Some(self.volatility),
            Feature::InstabilityScore => Some(self.instability_score),
            Feature::VolatilityNorm => Some(self.volatility_norm),
            Feature::RiskScore => Some(self.risk_score),
            Feature::AnomalyScore => None,
        }
    }
}

/// Outcome of the outlier model for one row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnomalyFlag {
    Normal,
    Anomalous,
}

impl AnomalyFlag {
    /// Conventional outlier-model label: +1 inlier, -1 outlier
    pub fn label(&self) -> i8 {
        match self {
            AnomalyFlag::Normal => 1,
            AnomalyFlag::Anomalous => -1,
        }
    }

    pub fn is_anomalous(&self) -> bool {
        matches!(self, AnomalyFlag::Anomalous)
    }
}

/// Feature record plus anomaly flag and score
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredRecord {
    #[serde(flatten)]
    pub features: FeatureRecord,

    pub anomaly_flag: AnomalyFlag,

    /// Lower means more anomalous. Only comparable within one run.
    pub anomaly_score: f64,
}

impl ScoredRecord {
    pub fn region(&self) -> &str {
        &self.features.region
    }

    pub fn month(&self) -> &str {
        &self.features.month
    }

    pub fn feature(&self, feature: Feature) -> f64 {
        match feature {
            Feature::AnomalyScore => self.anomaly_score,
            other => self.features.feature(other).unwrap_or(f64::NAN),
        }
    }
}

/// Rescaled state row. Values follow the owning table's column order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateRecord {
    pub region: String,
    pub month: String,
    pub values: Vec<f64>,
}
