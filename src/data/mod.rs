pub mod feature;
pub mod records;

pub use feature::Feature;
pub use records::{AnomalyFlag, FeatureRecord, ScoredRecord, StateRecord, UpdateRecord};
