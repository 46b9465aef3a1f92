pub mod forest;
pub mod scorer;

pub use forest::IsolationForest;
pub use scorer::{flagged_count, AnomalyScorer, Scoring, ScorerConfig};
