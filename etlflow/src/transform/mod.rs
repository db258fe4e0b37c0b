//! Transform stage: feature rules and the staged artifact.

mod features;
mod staged;

pub use features::{
    median, Band, BandTable, Bound, CodeTable, DatasetStep, FeatureEngine, FeatureRule,
    NullPolicy, Threshold, ThresholdBands, WeightedScore,
};
pub use staged::{normalize_header, read_staged, write_staged};
