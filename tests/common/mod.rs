//! Shared fixtures: a small deterministic LSTM and scaler

#![allow(dead_code)]

use ndarray::{Array1, Array2};
use solace_inference::error::ServiceResult;
use solace_inference::models::lstm::{LstmCell, NativeLstm};
use solace_inference::models::{ComputeDevice, ForwardPass, Predictor};
use solace_inference::{Preprocessor, Scaler, ServiceContext};
use std::sync::Arc;

pub const HIDDEN: usize = 4;

/// Deterministic weights with enough structure that inputs move the output
pub fn native_lstm() -> NativeLstm {
    let gates = 4 * HIDDEN;
    let w_ih = Array2::from_shape_fn((gates, 8), |(r, c)| ((r * 8 + c) as f32 * 0.37).sin() * 0.5);
    let w_hh = Array2::from_shape_fn((gates, HIDDEN), |(r, c)| ((r + 3 * c) as f32 * 0.11).cos() * 0.2);
    let b_ih = Array1::from_shape_fn(gates, |i| (i as f32 * 0.05) - 0.3);
    let cell = LstmCell::new(w_ih, w_hh, Some(b_ih), None).unwrap();

    let head_weight = Array2::from_shape_fn((1, HIDDEN), |(_, c)| 1.5 - c as f32);
    let head_bias = Array1::from(vec![0.1]);
    NativeLstm::new(vec![vec![cell]], head_weight, head_bias).unwrap()
}

pub fn scaler() -> Scaler {
    Scaler::new([49.6, 1.1, 1.0], [17.3, 0.8, 0.82]).unwrap()
}

pub fn context_with(backend: Arc<dyn ForwardPass>, include_probabilities: bool) -> ServiceContext {
    ServiceContext::new(
        Preprocessor::new(scaler()),
        Predictor::new(backend),
        include_probabilities,
    )
}

pub fn context() -> ServiceContext {
    context_with(Arc::new(native_lstm()), false)
}

/// Backend that panics, standing in for an unanticipated failure
pub struct PanickingBackend;

impl ForwardPass for PanickingBackend {
    fn name(&self) -> &str {
        "panicking"
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn forward(&self, _input: ndarray::ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>> {
        panic!("tensor allocation failed")
    }
}

/// Backend that reports a forward-pass failure
pub struct FailingBackend;

impl ForwardPass for FailingBackend {
    fn name(&self) -> &str {
        "failing"
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn forward(&self, _input: ndarray::ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>> {
        Err(solace_inference::ServiceError::inference("numeric instability in layer 0"))
    }
}

/// Backend whose forward pass blows up numerically
pub struct NanBackend;

impl ForwardPass for NanBackend {
    fn name(&self) -> &str {
        "nan"
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn forward(&self, input: ndarray::ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>> {
        Ok(vec![f32::NAN; input.dim().0])
    }
}
