//! Error taxonomy for the prediction pipeline.
//!
//! Every stage returns `Result<_, ServiceError>`; the HTTP boundary converts
//! the error into a status code and a `{"error": ...}` body.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;
use thiserror::Error;

/// Result alias used by every pipeline stage
pub type ServiceResult<T> = Result<T, ServiceError>;

/// Failures a single prediction request can end in
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ServiceError {
    /// Body absent, not JSON, missing `data`, or `data` not a collection of numeric rows
    #[error("{0}")]
    MalformedRequest(String),

    /// A row does not have the expected number of features
    #[error("Invalid input shape, expected (N, {expected}): row {row} has {actual} values")]
    Shape {
        expected: usize,
        actual: usize,
        row: usize,
    },

    /// The model forward pass failed
    #[error("Inference failed: {0}")]
    Inference(String),

    /// Anything not anticipated by the pipeline (panics, task failures)
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ServiceError {
    pub fn malformed(msg: impl Into<String>) -> Self {
        Self::MalformedRequest(msg.into())
    }

    pub fn inference(msg: impl Into<String>) -> Self {
        Self::Inference(msg.into())
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal(msg.into())
    }

    /// HTTP status for this error: client errors for bad input, server errors otherwise
    pub fn status(&self) -> StatusCode {
        match self {
            Self::MalformedRequest(_) | Self::Shape { .. } => StatusCode::BAD_REQUEST,
            Self::Inference(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Stable short name used as a metrics key
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedRequest(_) => "malformed_request",
            Self::Shape { .. } => "shape",
            Self::Inference(_) => "inference",
            Self::Internal(_) => "internal",
        }
    }
}

/// JSON body returned for every failed request
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: String,
}

impl IntoResponse for ServiceError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            error: self.to_string(),
        };
        (self.status(), Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::malformed("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::Shape {
                expected: 8,
                actual: 7,
                row: 0
            }
            .status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::inference("nan").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
        assert_eq!(
            ServiceError::internal("panic").status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_shape_message_names_expected_width() {
        let err = ServiceError::Shape {
            expected: 8,
            actual: 9,
            row: 2,
        };
        let msg = err.to_string();
        assert!(msg.contains("expected (N, 8)"));
        assert!(msg.contains("row 2 has 9"));
    }

    #[test]
    fn test_inference_keeps_original_description() {
        let err = ServiceError::inference("shape mismatch in gemm");
        assert_eq!(err.to_string(), "Inference failed: shape mismatch in gemm");
        assert_eq!(err.kind(), "inference");
    }
}
