//! ONNX Runtime forward pass over an exported LSTM graph.
//!
//! The graph takes one `(batch, seq_len, features)` float input and returns
//! the raw logit per sample, shaped `(batch, 1)` or `(batch)`.

use super::backend::{ComputeDevice, ForwardPass};
use crate::config::DevicePreference;
use crate::error::{ServiceError, ServiceResult};
use anyhow::{Context, Result};
use ndarray::ArrayView3;
use ort::execution_providers::CUDAExecutionProvider;
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::value::Tensor;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};
use tracing::{info, warn};

/// Loaded ONNX session with its tensor names
pub struct OnnxLstm {
    /// `Session::run` needs exclusive access
    session: Mutex<Session>,
    input_name: String,
    output_name: String,
    device: ComputeDevice,
}

impl OnnxLstm {
    /// Load the graph, trying CUDA first unless the preference is `cpu`
    pub fn load<P: AsRef<Path>>(path: P, device: DevicePreference, threads: usize) -> Result<Self> {
        let path = path.as_ref();
        ort::init().commit()?;

        info!(path = %path.display(), threads = threads, device = ?device, "Loading ONNX model");

        let (session, device) = select_device(
            device,
            || Self::cuda_session(path, threads),
            || Self::cpu_session(path, threads),
        )?;

        let input_name = session
            .inputs
            .first()
            .map(|i| i.name.clone())
            .unwrap_or_else(|| "input".to_string());

        let output_name = session
            .outputs
            .iter()
            .find(|o| o.name.contains("logit") || o.name.contains("output"))
            .map(|o| o.name.clone())
            .unwrap_or_else(|| {
                session
                    .outputs
                    .first()
                    .map(|o| o.name.clone())
                    .unwrap_or_else(|| "output".to_string())
            });

        info!(
            input = %input_name,
            output = %output_name,
            device = %device,
            "ONNX model loaded successfully"
        );

        Ok(Self {
            session: Mutex::new(session),
            input_name,
            output_name,
            device,
        })
    }

    fn cpu_session(path: &Path, threads: usize) -> Result<Session> {
        Session::builder()?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model from {:?}", path))
    }

    fn cuda_session(path: &Path, threads: usize) -> Result<Session> {
        Session::builder()?
            .with_execution_providers([CUDAExecutionProvider::default().build().error_on_failure()])?
            .with_optimization_level(GraphOptimizationLevel::Level3)?
            .with_intra_threads(threads)?
            .commit_from_file(path)
            .context(format!("Failed to load model on CUDA from {:?}", path))
    }
}

impl ForwardPass for OnnxLstm {
    fn name(&self) -> &str {
        "onnx-lstm"
    }

    fn device(&self) -> ComputeDevice {
        self.device
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>> {
        let (batch, seq_len, features) = input.dim();
        let shape = vec![batch as i64, seq_len as i64, features as i64];
        let data: Vec<f32> = input.iter().copied().collect();

        let input_tensor = Tensor::from_array((shape, data))
            .map_err(|e| ServiceError::inference(format!("Failed to create input tensor: {}", e)))?;

        let mut session = lock_recovering(&self.session);

        let outputs = session
            .run(ort::inputs![&self.input_name => input_tensor])
            .map_err(|e| ServiceError::inference(e.to_string()))?;

        let output = outputs.get(&self.output_name).ok_or_else(|| {
            ServiceError::inference(format!("model produced no '{}' output", self.output_name))
        })?;

        let (_, logits) = output
            .try_extract_tensor::<f32>()
            .map_err(|e| ServiceError::inference(e.to_string()))?;

        if logits.len() != batch {
            return Err(ServiceError::inference(format!(
                "expected {} logits, model returned {}",
                batch,
                logits.len()
            )));
        }

        Ok(logits.to_vec())
    }
}

/// Lock the session even after a panic in an earlier run. `run` keeps no
/// state between calls, so a poisoned session is still usable.
fn lock_recovering<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Build a session on the preferred device. `auto` falls back to the CPU when
/// the CUDA provider cannot be registered; an explicit `cuda` does not.
fn select_device<S>(
    preference: DevicePreference,
    cuda: impl FnOnce() -> Result<S>,
    cpu: impl FnOnce() -> Result<S>,
) -> Result<(S, ComputeDevice)> {
    match preference {
        DevicePreference::Cpu => Ok((cpu()?, ComputeDevice::Cpu)),
        DevicePreference::Cuda => Ok((
            cuda().context("CUDA execution provider requested but unavailable")?,
            ComputeDevice::Cuda,
        )),
        DevicePreference::Auto => match cuda() {
            Ok(session) => Ok((session, ComputeDevice::Cuda)),
            Err(e) => {
                warn!(error = %e, "CUDA not available, falling back to CPU");
                Ok((cpu()?, ComputeDevice::Cpu))
            }
        },
    }
}
