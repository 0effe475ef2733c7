//! Predictor: forward pass, logistic squashing and thresholding

use crate::config::ModelsConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::backend::{ComputeDevice, ForwardPass};
use crate::models::loader::ModelLoader;
use crate::types::features::FeatureBatch;
use crate::types::prediction::Prediction;
use anyhow::Result;
use ndarray::ArrayView3;
use std::sync::Arc;
use tracing::debug;

/// Turns normalized feature batches into binary predictions
pub struct Predictor {
    backend: Arc<dyn ForwardPass>,
}

impl Predictor {
    pub fn new(backend: Arc<dyn ForwardPass>) -> Self {
        Self { backend }
    }

    /// Load the configured backend
    pub fn from_config(config: &ModelsConfig) -> Result<Self> {
        let loader = ModelLoader::with_settings(config.onnx_threads, config.device);
        Ok(Self::new(loader.load(config)?))
    }

    pub fn backend_name(&self) -> &str {
        self.backend.name()
    }

    pub fn device(&self) -> ComputeDevice {
        self.backend.device()
    }

    /// Predict one label per row of an already-normalized batch, in row order
    pub fn predict(&self, batch: &FeatureBatch) -> ServiceResult<Vec<Prediction>> {
        let input = batch.to_sequence_tensor();
        self.predict_sequences(input.view())
    }

    /// Predict one label per sequence of a `(batch, seq_len, features)` input
    pub fn predict_sequences(&self, input: ArrayView3<'_, f32>) -> ServiceResult<Vec<Prediction>> {
        let batch = input.dim().0;
        let logits = self.backend.forward(input)?;

        if logits.len() != batch {
            return Err(ServiceError::inference(format!(
                "expected {} logits from {}, got {}",
                batch,
                self.backend.name(),
                logits.len()
            )));
        }

        if let Some(row) = logits.iter().position(|v| !v.is_finite()) {
            return Err(ServiceError::inference(format!(
                "{} produced a non-finite logit for row {}",
                self.backend.name(),
                row
            )));
        }

        let predictions: Vec<Prediction> = logits
            .iter()
            .map(|&logit| Prediction::from_probability(sigmoid(f64::from(logit))))
            .collect();

        debug!(
            backend = self.backend.name(),
            rows = predictions.len(),
            positives = predictions.iter().filter(|p| p.label == 1).count(),
            "Forward pass complete"
        );

        Ok(predictions)
    }
}

/// Logistic function, evaluated without overflow for large magnitudes
pub fn sigmoid(logit: f64) -> f64 {
    if logit >= 0.0 {
        1.0 / (1.0 + (-logit).exp())
    } else {
        let e = logit.exp();
        e / (1.0 + e)
    }
}
