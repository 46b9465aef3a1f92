pub mod deriver;
pub mod stats;

pub use deriver::{FeatureDeriver, RiskWeights};
pub use stats::{SeriesStats, EPSILON};
