use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::ops::Range;
use tracing::{debug, instrument};

use super::stats::{abs_diffs, zscores};
use crate::data::{FeatureRecord, UpdateRecord};
use crate::error::{PipelineError, Result};

/// Weights of the risk score combination.
///
/// Changing them changes the meaning of `risk_score` for every consumer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RiskWeights {
    pub instability: f64,
    pub volatility: f64,
}

impl Default for RiskWeights {
    fn default() -> Self {
        Self {
            instability: 0.5,
            volatility: 0.5,
        }
    }
}

impl RiskWeights {
    pub fn validate(&self) -> Result<()> {
        for (name, weight) in [("instability", self.instability), ("volatility", self.volatility)] {
            if !weight.is_finite() || weight < 0.0 {
                return Err(PipelineError::configuration(format!(
                    "risk weight '{}' must be finite and non-negative, got {}",
                    name, weight
                )));
            }
        }
        Ok(())
    }

    pub fn combine(&self, instability_score: f64, volatility_norm: f64) -> f64 {
        self.instability * instability_score + self.volatility * volatility_norm
    }
}

/// Per-region instability feature deriver
///
/// Algorithm:
/// 1. Validate keys and counts
/// 2. Sort rows by (region, month); input order is never relied upon
/// 3. Within each region: volatility = |count[i] - count[i-1]|, 0 for the first month
/// 4. Within each region: z-score update_count and volatility
/// 5. risk_score = weighted sum of both z-scores
///
/// All statistics are computed per region, so regions never influence each other.
#[derive(Debug, Clone, Default)]
pub struct FeatureDeriver {
    weights: RiskWeights,
}

impl FeatureDeriver {
    pub fn new(weights: RiskWeights) -> Result<Self> {
        weights.validate()?;
        Ok(Self { weights })
    }

    pub fn weights(&self) -> RiskWeights {
        self.weights
    }

    /// Derive features for every row.
    ///
    /// The output has one row per input row, ordered by (region, month).
    #[instrument(name = "derive_features", skip_all, fields(rows = records.len()))]
    pub fn derive(&self, records: &[UpdateRecord]) -> Result<Vec<FeatureRecord>> {
        for record in records {
            validate_record(record)?;
        }

        let mut sorted: Vec<&UpdateRecord> = records.iter().collect();
        sorted.sort_by(|a, b| compare_keys(a, b));

        if let Some(pair) = sorted.windows(2).find(|w| compare_keys(w[0], w[1]) == Ordering::Equal) {
            return Err(PipelineError::malformed(format!(
                "duplicate key: region '{}' month '{}'",
                pair[0].region, pair[0].month
            )));
        }

        let spans = region_spans(&sorted);
        let mut output = Vec::with_capacity(sorted.len());

        for span in &spans {
            let group = &sorted[span.clone()];
            let counts: Vec<f64> = group.iter().map(|r| r.update_count).collect();

            let volatility = abs_diffs(&counts);
            let instability = zscores(&counts);
            let volatility_norm = zscores(&volatility);

            for (i, record) in group.iter().enumerate() {
                output.push(FeatureRecord {
                    region: record.region.clone(),
                    month: record.month.clone(),
                    update_count: record.update_count,
                    volatility: volatility[i],
                    instability_score: instability[i],
                    volatility_norm: volatility_norm[i],
                    risk_score: self.weights.combine(instability[i], volatility_norm[i]),
                });
            }
        }

        debug!(regions = spans.len(), rows = output.len(), "Derived instability features");

        Ok(output)
    }
}

fn compare_keys(a: &UpdateRecord, b: &UpdateRecord) -> Ordering {
    a.region
        .cmp(&b.region)
        .then_with(|| a.month.cmp(&b.month))
}

fn validate_record(record: &UpdateRecord) -> Result<()> {
    if record.region.trim().is_empty() {
        return Err(PipelineError::malformed(format!(
            "empty region for month '{}'",
            record.month
        )));
    }

    validate_month(&record.month).map_err(|reason| {
        PipelineError::malformed(format!("region '{}': {}", record.region, reason))
    })?;

    if !record.update_count.is_finite() || record.update_count < 0.0 {
        return Err(PipelineError::malformed(format!(
            "region '{}' month '{}': update count must be a non-negative number, got {}",
            record.region, record.month, record.update_count
        )));
    }

    Ok(())
}

/// Months must be zero-padded "YYYY-MM" so lexical order matches chronological order
fn validate_month(month: &str) -> std::result::Result<(), String> {
    let well_formed = month.len() == 7
        && month.as_bytes()[4] == b'-'
        && month.bytes().enumerate().all(|(i, b)| i == 4 || b.is_ascii_digit());

    if !well_formed {
        return Err(format!("month '{}' is not in YYYY-MM form", month));
    }

    NaiveDate::parse_from_str(&format!("{}-01", month), "%Y-%m-%d")
        .map(|_| ())
        .map_err(|e| format!("month '{}' is not a calendar month: {}", month, e))
}

/// Index ranges of consecutive rows sharing a region
fn region_spans(sorted: &[&UpdateRecord]) -> Vec<Range<usize>> {
    let mut spans = Vec::new();
    let mut start = 0;

    for i in 1..=sorted.len() {
        if i == sorted.len() || sorted[i].region != sorted[start].region {
            spans.push(start..i);
            start = i;
        }
    }

    spans
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rec(region: &str, month: &str, count: f64) -> UpdateRecord {
        UpdateRecord::new(region, month, count)
    }

    fn scenario() -> Vec<UpdateRecord> {
        vec![
            rec("P1", "2024-01", 10.0),
            rec("P1", "2024-02", 15.0),
            rec("P1", "2024-03", 10.0),
            rec("P2", "2024-01", 100.0),
            rec("P2", "2024-02", 100.0),
        ]
    }

    #[test]
    fn test_volatility_per_region() {
        let out = FeatureDeriver::default().derive(&scenario()).unwrap();

        assert_eq!(out.len(), 5);
        let volatility: Vec<f64> = out.iter().map(|r| r.volatility).collect();
        assert_eq!(volatility, vec![0.0, 5.0, 5.0, 0.0, 0.0]);
    }

    #[test]
    fn test_constant_region_scores_zero() {
        let out = FeatureDeriver::default().derive(&scenario()).unwrap();

        for row in out.iter().filter(|r| r.region == "P2") {
            assert_eq!(row.instability_score, 0.0);
            assert_eq!(row.volatility_norm, 0.0);
            assert_eq!(row.risk_score, 0.0);
        }
    }

    #[test]
    fn test_input_order_ignored() {
        let mut shuffled = scenario();
        shuffled.reverse();
        shuffled.swap(0, 3);

        let a = FeatureDeriver::default().derive(&scenario()).unwrap();
        let b = FeatureDeriver::default().derive(&shuffled).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_regions_do_not_leak() {
        let base = FeatureDeriver::default().derive(&scenario()).unwrap();

        let mut extended = scenario();
        extended.push(rec("P3", "2024-01", 1.0));
        extended.push(rec("P3", "2024-02", 90000.0));
        let wider = FeatureDeriver::default().derive(&extended).unwrap();

        assert_eq!(&wider[..5], &base[..]);
    }

    #[test]
    fn test_risk_weights_applied() {
        let deriver = FeatureDeriver::new(RiskWeights {
            instability: 1.0,
            volatility: 0.0,
        })
        .unwrap();
        let out = deriver.derive(&scenario()).unwrap();

        for row in &out {
            assert_eq!(row.risk_score, row.instability_score);
        }
    }

    #[test]
    fn test_invalid_weights_rejected() {
        let err = FeatureDeriver::new(RiskWeights {
            instability: f64::NAN,
            volatility: 0.5,
        })
        .unwrap_err();
        assert!(matches!(err, PipelineError::Configuration { .. }));
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let mut records = scenario();
        records.push(rec("P1", "2024-02", 3.0));

        let err = FeatureDeriver::default().derive(&records).unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
        assert!(err.to_string().contains("duplicate"));
    }

    #[test]
    fn test_negative_count_rejected() {
        let err = FeatureDeriver::default()
            .derive(&[rec("P1", "2024-01", -1.0)])
            .unwrap_err();
        assert!(matches!(err, PipelineError::MalformedInput { .. }));
    }

    #[test]
    fn test_bad_keys_rejected() {
        for bad in [
            rec("", "2024-01", 1.0),
            rec("P1", "", 1.0),
            rec("P1", "2024-1", 1.0),
            rec("P1", "2024-13", 1.0),
            rec("P1", "01-2024", 1.0),
        ] {
            let err = FeatureDeriver::default().derive(&[bad]).unwrap_err();
            assert!(matches!(err, PipelineError::MalformedInput { .. }));
        }
    }

    #[test]
    fn test_empty_input() {
        let out = FeatureDeriver::default().derive(&[]).unwrap();
        assert!(out.is_empty());
    }

    #[test]
    fn test_single_month_region() {
        let out = FeatureDeriver::default()
            .derive(&[rec("P9", "2023-12", 77.0)])
            .unwrap();
        assert_eq!(out[0].volatility, 0.0);
        assert_eq!(out[0].instability_score, 0.0);
        assert_eq!(out[0].volatility_norm, 0.0);
    }
}
