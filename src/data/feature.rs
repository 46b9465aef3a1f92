use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::PipelineError;

/// Named numeric columns of the pipeline tables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    UpdateCount,
    Volatility,
    InstabilityScore,
    VolatilityNorm,
    RiskScore,
    AnomalyScore,
}

impl Feature {
    pub const ALL: [Feature; 6] = [
        Feature::UpdateCount,
        Feature::Volatility,
        Feature::InstabilityScore,
        Feature::VolatilityNorm,
        Feature::RiskScore,
        Feature::AnomalyScore,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Feature::UpdateCount => "update_count",
            Feature::Volatility => "volatility",
            Feature::InstabilityScore => "instability_score",
            Feature::VolatilityNorm => "volatility_norm",
            Feature::RiskScore => "risk_score",
            Feature::AnomalyScore => "anomaly_score",
        }
    }

    /// Column name in the exported state table
    pub fn scaled_name(&self) -> String {
        format!("{}_scaled", self.name())
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Feature {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Feature::ALL
            .iter()
            .copied()
            .find(|f| f.name() == s.trim())
            .ok_or_else(|| PipelineError::feature_missing(s, "no such column in the pipeline tables"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_names() {
        for feature in Feature::ALL {
            assert_eq!(feature.name().parse::<Feature>().unwrap(), feature);
        }
        assert_eq!(" risk_score ".parse::<Feature>().unwrap(), Feature::RiskScore);
    }

    #[test]
    fn test_unknown_name() {
        let err = "biometric_risk".parse::<Feature>().unwrap_err();
        assert!(matches!(err, PipelineError::FeatureMissing { ref feature, .. } if feature == "biometric_risk"));
    }

    #[test]
    fn test_scaled_name() {
        assert_eq!(Feature::InstabilityScore.scaled_name(), "instability_score_scaled");
    }
}
