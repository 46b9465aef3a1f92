pub mod normalizer;

pub use normalizer::{MinMaxScaler, ScalerParams, StateConfig, StateNormalizer, StateTable};
