//! Prediction results and the request/response wire shapes

use serde::{Deserialize, Serialize};

/// Decision threshold on the squashed model output; labels use strict `>`.
pub const DECISION_THRESHOLD: f64 = 0.5;

/// Outcome for one input row
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    /// Binary decision (0 or 1)
    pub label: u8,
    /// Probability the label was derived from, in (0, 1)
    pub probability: f64,
}

impl Prediction {
    /// Threshold a probability into a prediction
    pub fn from_probability(probability: f64) -> Self {
        Self {
            label: label_for(probability),
            probability,
        }
    }
}

/// 1 when `probability` is strictly above [`DECISION_THRESHOLD`], else 0
pub fn label_for(probability: f64) -> u8 {
    if probability > DECISION_THRESHOLD {
        1
    } else {
        0
    }
}

/// Successful `/predict` body
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictResponse {
    pub predictions: Vec<u8>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub probabilities: Option<Vec<f64>>,
}

impl PredictResponse {
    pub fn from_predictions(predictions: &[Prediction], include_probabilities: bool) -> Self {
        Self {
            predictions: predictions.iter().map(|p| p.label).collect(),
            probabilities: include_probabilities
                .then(|| predictions.iter().map(|p| p.probability).collect()),
        }
    }
}
