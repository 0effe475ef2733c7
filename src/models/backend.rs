//! Forward-pass abstraction shared by every model backend

use crate::error::ServiceResult;
use ndarray::ArrayView3;
use serde::Serialize;
use std::fmt;

/// Hardware a backend executes on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComputeDevice {
    Cpu,
    Cuda,
}

impl fmt::Display for ComputeDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
        }
    }
}

/// One evaluation of the sequence model, without parameter updates.
///
/// `input` has shape `(batch, seq_len, features)`; the result holds exactly
/// one raw logit per sample, in input order. Implementations must be safe to
/// call concurrently and must not mutate the loaded parameters.
pub trait ForwardPass: Send + Sync {
    /// Backend name for logs and health output
    fn name(&self) -> &str;

    /// Device selected when the backend was loaded
    fn device(&self) -> ComputeDevice;

    fn forward(&self, input: ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>>;
}
