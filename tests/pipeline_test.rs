//! End-to-end pipeline behaviour without the HTTP layer

mod common;

use solace_inference::pipeline::parse_request;
use solace_inference::{FeatureBatch, ServiceError};

const SAMPLE: &[u8] = br#"{"data": [[25, 1, 0, 0, 0.3, 1, 1, 2]]}"#;

#[test]
fn test_single_row_yields_one_binary_label() {
    let context = common::context();
    let predictions = context.handle(SAMPLE).unwrap();

    assert_eq!(predictions.len(), 1);
    assert!(predictions[0].label <= 1);
    assert!(predictions[0].probability > 0.0 && predictions[0].probability < 1.0);
}

#[test]
fn test_repeated_requests_are_deterministic() {
    let context = common::context();
    let first = context.handle(SAMPLE).unwrap();
    let second = context.handle(SAMPLE).unwrap();
    assert_eq!(first, second);
}

#[test]
fn test_batch_output_preserves_length_and_order() {
    let context = common::context();
    let rows: Vec<Vec<f64>> = (0..6)
        .map(|i| {
            let i = i as f64;
            vec![i % 2.0, 1.0, 0.0, 1.0, 20.0 + 10.0 * i, i % 3.0, (i + 1.0) % 3.0, 2.0]
        })
        .collect();

    let batched = context.predict_rows(&rows).unwrap();
    assert_eq!(batched.len(), rows.len());

    // Each row predicted alone gives the same answer as its batched position
    for (row, expected) in rows.iter().zip(&batched) {
        let single = context.predict_rows(std::slice::from_ref(row)).unwrap();
        assert_eq!(single[0].label, expected.label);
        assert!((single[0].probability - expected.probability).abs() < 1e-5);
    }
}

#[test]
fn test_shape_violation_yields_no_predictions() {
    let context = common::context();
    for body in [
        r#"{"data": [[1, 2, 3, 4, 5, 6, 7]]}"#,
        r#"{"data": [[1, 2, 3, 4, 5, 6, 7, 8, 9]]}"#,
        r#"{"data": [[1, 2, 3, 4, 5, 6, 7], [1, 2, 3, 4, 5, 6, 7]]}"#,
    ] {
        let err = context.handle(body.as_bytes()).unwrap_err();
        assert!(matches!(err, ServiceError::Shape { expected: 8, .. }), "{body}: {err:?}");
    }
}

#[test]
fn test_ragged_batch_is_malformed_before_shape_check() {
    let context = common::context();
    let err = context
        .handle(br#"{"data": [[1, 2, 3, 4, 5, 6, 7, 8], [1, 2, 3, 4, 5, 6, 7]]}"#)
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)), "{err:?}");

    let err = context.handle(br#"{"data": [[1, 2, 3], [4]]}"#).unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)), "{err:?}");
}

#[test]
fn test_out_of_range_value_is_client_error() {
    let context = common::context();
    let err = context
        .handle(br#"{"data": [[1e39, 1, 0, 0, 30, 1, 1, 2]]}"#)
        .unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)), "{err:?}");
    assert!(err.status().is_client_error());
}

#[test]
fn test_non_finite_logit_is_inference_error() {
    let context = common::context_with(std::sync::Arc::new(common::NanBackend), false);
    let err = context.handle(SAMPLE).unwrap_err();
    assert!(matches!(err, ServiceError::Inference(_)), "{err:?}");
}

#[test]
fn test_empty_data_is_malformed() {
    let context = common::context();
    let err = context.handle(br#"{"data": []}"#).unwrap_err();
    assert!(matches!(err, ServiceError::MalformedRequest(_)));
}

#[test]
fn test_normalization_happens_before_prediction() {
    // Normalizing by hand and predicting directly matches the full pipeline
    let context = common::context();
    let rows = parse_request(SAMPLE).unwrap();
    let batch = FeatureBatch::from_rows(&rows).unwrap();
    let normalized = context.preprocessor().normalize(batch);

    let direct = context.predictor().predict(&normalized).unwrap();
    assert_eq!(direct, context.handle(SAMPLE).unwrap());
}

#[test]
fn test_backend_failure_is_inference_error() {
    let context = common::context_with(std::sync::Arc::new(common::FailingBackend), false);
    let err = context.handle(SAMPLE).unwrap_err();
    assert_eq!(
        err.to_string(),
        "Inference failed: numeric instability in layer 0"
    );
}
