use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use super::forest::IsolationForest;
use crate::data::{AnomalyFlag, Feature, FeatureRecord, ScoredRecord};
use crate::error::{PipelineError, Result};

/// Anomaly scorer configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScorerConfig {
    /// Number of isolation trees
    pub num_estimators: usize,

    /// Expected outlier fraction, in (0, 0.5]
    pub contamination: f64,

    /// Seed of the model's RNG. Part of the output contract.
    pub seed: u64,

    /// Subsample size per tree
    pub max_samples: usize,

    /// Fewer rows than this are rejected
    pub min_rows: usize,

    /// Behavioural features the model is fitted on
    pub features: Vec<Feature>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            num_estimators: 200,
            contamination: 0.05,
            seed: 42,
            max_samples: 256,
            min_rows: 5,
            features: vec![Feature::InstabilityScore, Feature::VolatilityNorm],
        }
    }
}

impl ScorerConfig {
    pub fn validate(&self) -> Result<()> {
        if self.num_estimators == 0 {
            return Err(PipelineError::configuration("num_estimators must be at least 1"));
        }
        if !(self.contamination > 0.0 && self.contamination <= 0.5) {
            return Err(PipelineError::configuration(format!(
                "contamination must be in (0, 0.5], got {}",
                self.contamination
            )));
        }
        if self.max_samples < 2 {
            return Err(PipelineError::configuration("max_samples must be at least 2"));
        }
        if self.min_rows < 2 {
            return Err(PipelineError::configuration("min_rows must be at least 2"));
        }
        if self.features.is_empty() {
            return Err(PipelineError::configuration("at least one scoring feature is required"));
        }
        if self.features.contains(&Feature::UpdateCount) {
            return Err(PipelineError::configuration(
                "raw update counts cannot be used as a scoring feature",
            ));
        }
        for (i, feature) in self.features.iter().enumerate() {
            if self.features[..i].contains(feature) {
                return Err(PipelineError::configuration(format!(
                    "scoring feature '{}' listed twice",
                    feature
                )));
            }
        }
        Ok(())
    }
}

/// Number of rows flagged anomalous for a batch of `rows`.
///
/// ceil(rows * contamination), kept within [1, rows - 1] so both classes exist.
pub fn flagged_count(rows: usize, contamination: f64) -> usize {
    if rows < 2 {
        return rows.min(1);
    }
    let k = (rows as f64 * contamination - 1e-9).ceil().max(0.0) as usize;
    k.clamp(1, rows - 1)
}

/// Number of rows to flag from an ascending score list, given the `target` count.
///
/// The cut always falls between two distinct scores so equal scores share a flag.
/// When the target splits a tie group the cut moves to the nearer edge of that group,
/// preferring fewer flags at equal distance, and never to 0 or `sorted.len()`.
/// Returns None when every score is equal.
fn flag_cut(sorted: &[f64], target: usize) -> Option<usize> {
    let tied = sorted[target];
    if sorted[target - 1] < tied {
        return Some(target);
    }

    let below = sorted[..target].iter().rposition(|&s| s < tied).map(|i| i + 1);
    let above = sorted[target..].iter().position(|&s| s > tied).map(|i| target + i);

    match (below, above) {
        (Some(lo), Some(hi)) if hi - target < target - lo => Some(hi),
        (Some(lo), _) => Some(lo),
        (None, hi) => hi,
    }
}

/// Scored rows together with the model's decision threshold
#[derive(Debug, Clone)]
pub struct Scoring {
    pub records: Vec<ScoredRecord>,

    /// Raw model score at the decision boundary; anomaly_score = raw - offset
    pub offset: f64,

    pub flagged: usize,
}

/// Unsupervised anomaly scorer
///
/// Fits an isolation forest over behavioural features only (never identifiers or raw
/// counts), then flags the `ceil(n * contamination)` lowest-scoring rows.
/// Rows with equal scores always get the same flag: if that count would split a
/// group of tied scores, the whole group is flagged or none of it, whichever lands
/// closer to the count.
#[derive(Debug, Clone)]
pub struct AnomalyScorer {
    config: ScorerConfig,
}

impl AnomalyScorer {
    pub fn new(config: ScorerConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &ScorerConfig {
        &self.config
    }

    pub fn score(&self, records: &[FeatureRecord]) -> Result<Vec<ScoredRecord>> {
        Ok(self.score_detailed(records)?.records)
    }

    #[instrument(name = "score_anomalies", skip_all, fields(rows = records.len(), seed = self.config.seed))]
    pub fn score_detailed(&self, records: &[FeatureRecord]) -> Result<Scoring> {
        if records.len() < self.config.min_rows {
            return Err(PipelineError::InsufficientData {
                rows: records.len(),
                required: self.config.min_rows,
            });
        }

        let matrix = self.feature_matrix(records)?;

        let mut rng = StdRng::seed_from_u64(self.config.seed);
        let forest = IsolationForest::fit(
            &matrix,
            self.config.num_estimators,
            self.config.max_samples,
            &mut rng,
        );
        let raw = forest.score_samples(&matrix);

        let n = records.len();
        let target = flagged_count(n, self.config.contamination);

        let mut ranking: Vec<usize> = (0..n).collect();
        ranking.sort_by(|&a, &b| raw[a].total_cmp(&raw[b]).then(a.cmp(&b)));
        let sorted: Vec<f64> = ranking.iter().map(|&row| raw[row]).collect();

        let flagged = flag_cut(&sorted, target).ok_or_else(|| {
            PipelineError::feature_missing(
                Feature::AnomalyScore.name(),
                "every row received the same model score, no anomaly boundary exists",
            )
        })?;
        if flagged != target {
            info!(expected = target, flagged, "Flag boundary moved to keep tied scores together");
        }

        // midpoint between the last flagged and the first unflagged raw score
        let offset = (sorted[flagged - 1] + sorted[flagged]) / 2.0;

        let mut flags = vec![AnomalyFlag::Normal; n];
        for &row in &ranking[..flagged] {
            flags[row] = AnomalyFlag::Anomalous;
        }

        debug!(
            sample_size = forest.sample_size(),
            trees = forest.num_trees(),
            offset,
            "Isolation forest fitted"
        );

        let scored: Vec<ScoredRecord> = records
            .iter()
            .zip(raw.iter())
            .zip(flags)
            .map(|((record, &score), flag)| ScoredRecord {
                features: record.clone(),
                anomaly_flag: flag,
                anomaly_score: score - offset,
            })
            .collect();

        info!(rows = n, flagged, "Anomaly scoring complete");

        Ok(Scoring {
            records: scored,
            offset,
            flagged,
        })
    }

    /// Row-major matrix of the configured features.
    ///
    /// Every column must exist, be finite, and vary across rows.
    fn feature_matrix(&self, records: &[FeatureRecord]) -> Result<Vec<Vec<f64>>> {
        let mut matrix = vec![Vec::with_capacity(self.config.features.len()); records.len()];

        for &feature in &self.config.features {
            let mut lo = f64::INFINITY;
            let mut hi = f64::NEG_INFINITY;

            for (row, record) in matrix.iter_mut().zip(records) {
                let value = record.feature(feature).ok_or_else(|| {
                    PipelineError::feature_missing(feature.name(), "not present on feature rows")
                })?;
                if !value.is_finite() {
                    return Err(PipelineError::feature_missing(
                        feature.name(),
                        format!("non-finite value for region '{}' month '{}'", record.region, record.month),
                    ));
                }
                lo = lo.min(value);
                hi = hi.max(value);
                row.push(value);
            }

            if hi <= lo {
                return Err(PipelineError::feature_missing(
                    feature.name(),
                    "constant across all rows",
                ));
            }
        }

        Ok(matrix)
    }
}
