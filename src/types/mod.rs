//! Type definitions for the prediction pipeline

pub mod features;
pub mod prediction;

pub use features::{FeatureBatch, FeatureVector, FEATURE_WIDTH, SCALED_COLUMNS};
pub use prediction::{PredictResponse, Prediction};
