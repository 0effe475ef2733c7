//! Request pipeline: parse → structure check → shape check → normalize → predict.
//!
//! Stages run in this fixed order and the first failure ends the request;
//! the shape check has to come before normalization, which indexes fixed
//! columns.

use crate::config::AppConfig;
use crate::error::{ServiceError, ServiceResult};
use crate::models::inference::Predictor;
use crate::preprocessor::{Preprocessor, Scaler};
use crate::types::features::FeatureBatch;
use crate::types::prediction::{PredictResponse, Prediction};
use anyhow::Result;
use serde_json::Value;
use tracing::{debug, info};

/// Field of the request object holding the feature rows
pub const DATA_FIELD: &str = "data";

/// Process-wide, read-only state shared by every request
pub struct ServiceContext {
    preprocessor: Preprocessor,
    predictor: Predictor,
    include_probabilities: bool,
}

impl ServiceContext {
    pub fn new(preprocessor: Preprocessor, predictor: Predictor, include_probabilities: bool) -> Self {
        Self {
            preprocessor,
            predictor,
            include_probabilities,
        }
    }

    /// Load the scaler and the model named in the configuration
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        let scaler = Scaler::load(&config.models.scaler_path)?;
        let predictor = Predictor::from_config(&config.models)?;

        info!(
            backend = predictor.backend_name(),
            device = %predictor.device(),
            include_probabilities = config.response.include_probabilities,
            "Service context initialized"
        );

        Ok(Self::new(
            Preprocessor::new(scaler),
            predictor,
            config.response.include_probabilities,
        ))
    }

    pub fn predictor(&self) -> &Predictor {
        &self.predictor
    }

    pub fn preprocessor(&self) -> &Preprocessor {
        &self.preprocessor
    }

    /// Run every stage over a raw request body
    pub fn handle(&self, body: &[u8]) -> ServiceResult<Vec<Prediction>> {
        let rows = parse_request(body)?;
        self.predict_rows(&rows)
    }

    /// Shape check, normalization and prediction over already-parsed rows
    pub fn predict_rows(&self, rows: &[Vec<f64>]) -> ServiceResult<Vec<Prediction>> {
        let batch = FeatureBatch::from_rows(rows)?;
        let normalized = self.preprocessor.normalize(batch);
        self.predictor.predict(&normalized)
    }

    /// Serialize predictions into the response body
    pub fn respond(&self, predictions: &[Prediction]) -> PredictResponse {
        PredictResponse::from_predictions(predictions, self.include_probabilities)
    }
}

/// Parse and structure-check a request body into numeric rows.
///
/// Rows must share one width; whether that width is right is the shape stage's job.
pub fn parse_request(body: &[u8]) -> ServiceResult<Vec<Vec<f64>>> {
    if body.iter().all(u8::is_ascii_whitespace) {
        return Err(ServiceError::malformed("Missing request body"));
    }

    let payload: Value = serde_json::from_slice(body)
        .map_err(|e| ServiceError::malformed(format!("Request body is not valid JSON: {}", e)))?;

    let data = payload
        .as_object()
        .and_then(|obj| obj.get(DATA_FIELD))
        .ok_or_else(|| ServiceError::malformed(format!("Missing '{}' field in request", DATA_FIELD)))?;

    let rows = data.as_array().ok_or_else(|| {
        ServiceError::malformed(format!("'{}' must be an array of numeric rows", DATA_FIELD))
    })?;

    let rows = rows
        .iter()
        .enumerate()
        .map(|(i, row)| {
            let values = row
                .as_array()
                .ok_or_else(|| ServiceError::malformed(format!("row {} is not an array", i)))?;
            values
                .iter()
                .enumerate()
                .map(|(j, v)| parse_value(v, i, j))
                .collect::<ServiceResult<Vec<f64>>>()
        })
        .collect::<ServiceResult<Vec<Vec<f64>>>>()?;

    // Rows must agree on width before the width itself is checked
    if let Some(first) = rows.first() {
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != first.len()) {
            return Err(ServiceError::malformed(format!(
                "'{}' is not rectangular: row 0 has {} values, row {} has {}",
                DATA_FIELD,
                first.len(),
                i,
                row.len()
            )));
        }
    }

    debug!(rows = rows.len(), "Request parsed");
    Ok(rows)
}

/// A JSON number that survives conversion to the model's `f32` input
fn parse_value(value: &Value, row: usize, column: usize) -> ServiceResult<f64> {
    let v = value.as_f64().ok_or_else(|| {
        ServiceError::malformed(format!("row {}, column {} is not a number", row, column))
    })?;
    if !(v as f32).is_finite() {
        return Err(ServiceError::malformed(format!(
            "row {}, column {} is out of range: {}",
            row, column, v
        )));
    }
    Ok(v)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn malformed(body: &str) -> bool {
        matches!(parse_request(body.as_bytes()), Err(ServiceError::MalformedRequest(_)))
    }

    #[test]
    fn test_parse_valid_rows() {
        let rows = parse_request(br#"{"data": [[25, 1, 0, 0, 0.3, 1, 1, 2]]}"#).unwrap();
        assert_eq!(rows, vec![vec![25.0, 1.0, 0.0, 0.0, 0.3, 1.0, 1.0, 2.0]]);
    }

    #[test]
    fn test_parse_rejects_missing_or_ill_typed_payloads() {
        assert!(malformed(""));
        assert!(malformed("   "));
        assert!(malformed("{not json"));
        assert!(malformed("[[1, 2, 3]]"));
        assert!(malformed(r#"{"rows": [[1, 2]]}"#));
        assert!(malformed(r#"{"data": 5}"#));
        assert!(malformed(r#"{"data": [1, 2, 3]}"#));
        assert!(malformed(r#"{"data": [[1, 2, "High"]]}"#));
        assert!(malformed(r#"{"data": [[1, null]]}"#));
    }

    #[test]
    fn test_parse_leaves_width_to_shape_stage() {
        let rows = parse_request(br#"{"data": [[1, 2, 3], [4, 5, 6]]}"#).unwrap();
        assert_eq!(rows.len(), 2);
    }

    #[test]
    fn test_ragged_rows_are_malformed() {
        assert!(malformed(r#"{"data": [[1, 2, 3], [4]]}"#));
        assert!(malformed(r#"{"data": [[1, 2, 3, 4, 5, 6, 7, 8], [1, 2, 3, 4, 5, 6, 7]]}"#));
    }

    #[test]
    fn test_values_beyond_f32_range_are_malformed() {
        assert!(malformed(r#"{"data": [[1e39, 1, 0, 0, 30, 1, 1, 2]]}"#));
        assert!(malformed(r#"{"data": [[1, 1, 0, 0, -1e39, 1, 1, 2]]}"#));
        assert!(parse_request(br#"{"data": [[3.0e38, 1, 0, 0, 30, 1, 1, 2]]}"#).is_ok());
    }

    #[test]
    fn test_missing_data_message() {
        let err = parse_request(br#"{}"#).unwrap_err();
        assert_eq!(err.to_string(), "Missing 'data' field in request");
    }
}
