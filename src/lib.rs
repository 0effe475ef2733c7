//! Patient Risk Prediction Service
//!
//! Serves binary predictions from a pre-trained LSTM over 8-wide tabular
//! patient feature rows. A pre-fitted scaler normalizes the age, blood
//! pressure and cholesterol columns before the forward pass; the logit is
//! squashed to a probability and thresholded at 0.5.

pub mod config;
pub mod error;
pub mod http;
pub mod logging;
pub mod metrics;
pub mod models;
pub mod pipeline;
pub mod preprocessor;
pub mod types;

pub use config::AppConfig;
pub use error::{ServiceError, ServiceResult};
pub use models::inference::Predictor;
pub use pipeline::ServiceContext;
pub use preprocessor::{Preprocessor, Scaler};
pub use types::{FeatureBatch, FeatureVector, PredictResponse, Prediction};
