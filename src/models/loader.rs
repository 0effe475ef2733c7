//! Model artifact loading and backend selection

use super::backend::ForwardPass;
use super::lstm::{LstmCell, NativeLstm};
use super::onnx::OnnxLstm;
use crate::config::{BackendKind, DevicePreference, ModelsConfig};
use crate::types::features::FEATURE_WIDTH;
use anyhow::{bail, ensure, Context, Result};
use ndarray::{Array1, Array2};
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Named float tensors read from a safetensors file
pub struct StateDict {
    tensors: HashMap<String, (Vec<usize>, Vec<f32>)>,
}

impl StateDict {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path).context(format!("Failed to read weights from {:?}", path))?;
        Self::from_bytes(&bytes).context(format!("Invalid weights file {:?}", path))
    }

    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let file = SafeTensors::deserialize(bytes)
            .map_err(|e| anyhow::anyhow!("Failed to parse safetensors: {:?}", e))?;

        let mut tensors = HashMap::new();
        for (name, view) in file.tensors() {
            let data = match view.dtype() {
                Dtype::F32 => view
                    .data()
                    .chunks_exact(4)
                    .map(|b| f32::from_le_bytes([b[0], b[1], b[2], b[3]]))
                    .collect(),
                Dtype::F64 => view
                    .data()
                    .chunks_exact(8)
                    .map(|b| {
                        f64::from_le_bytes([b[0], b[1], b[2], b[3], b[4], b[5], b[6], b[7]]) as f32
                    })
                    .collect(),
                other => bail!("tensor '{}' has unsupported dtype {:?}", name, other),
            };
            tensors.insert(name, (view.shape().to_vec(), data));
        }

        Ok(Self { tensors })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tensors.contains_key(name)
    }

    pub fn shape(&self, name: &str) -> Option<&[usize]> {
        self.tensors.get(name).map(|(shape, _)| shape.as_slice())
    }

    pub fn len(&self) -> usize {
        self.tensors.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tensors.is_empty()
    }

    pub fn matrix(&self, name: &str) -> Result<Array2<f32>> {
        let (shape, data) = self
            .tensors
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("missing tensor '{}'", name))?;
        ensure!(shape.len() == 2, "tensor '{}' has shape {:?}, expected 2-D", name, shape);
        Array2::from_shape_vec((shape[0], shape[1]), data.clone())
            .context(format!("tensor '{}' data does not match its shape", name))
    }

    pub fn vector(&self, name: &str) -> Result<Array1<f32>> {
        let (shape, data) = self
            .tensors
            .get(name)
            .ok_or_else(|| anyhow::anyhow!("missing tensor '{}'", name))?;
        ensure!(shape.len() == 1, "tensor '{}' has shape {:?}, expected 1-D", name, shape);
        Ok(Array1::from(data.clone()))
    }

    fn optional_vector(&self, name: &str) -> Result<Option<Array1<f32>>> {
        if self.contains(name) {
            self.vector(name).map(Some)
        } else {
            Ok(None)
        }
    }
}

/// Loader for model backends
pub struct ModelLoader {
    /// Number of threads for ONNX inference
    onnx_threads: usize,
    device: DevicePreference,
}

impl ModelLoader {
    pub fn with_settings(onnx_threads: usize, device: DevicePreference) -> Self {
        Self {
            onnx_threads,
            device,
        }
    }

    /// Load the backend named in the configuration
    pub fn load(&self, config: &ModelsConfig) -> Result<Arc<dyn ForwardPass>> {
        let backend: Arc<dyn ForwardPass> = match config.backend {
            BackendKind::Native => Arc::new(self.load_native(config)?),
            BackendKind::Onnx => Arc::new(self.load_onnx(&config.model_path)?),
        };

        info!(
            backend = backend.name(),
            device = %backend.device(),
            "Forward pass ready"
        );
        Ok(backend)
    }

    pub fn load_onnx<P: AsRef<Path>>(&self, path: P) -> Result<OnnxLstm> {
        OnnxLstm::load(path, self.device, self.onnx_threads)
    }

    /// Load the in-process LSTM from a safetensors state dict
    pub fn load_native(&self, config: &ModelsConfig) -> Result<NativeLstm> {
        if self.device == DevicePreference::Cuda {
            warn!("native backend has no accelerator path, running on CPU");
        }

        let path = Path::new(&config.model_path);
        info!(path = %path.display(), "Loading LSTM weights");

        let dict = StateDict::load(path)?;
        let model = Self::build_native(&dict, &config.lstm_prefix, &config.head_prefix)
            .context(format!("Failed to build LSTM from {:?}", path))?;
        Self::check_expected(&model, config)?;

        let arch = model.architecture();
        info!(
            tensors = dict.len(),
            input_size = arch.input_size,
            hidden_size = arch.hidden_size,
            num_layers = arch.num_layers,
            bidirectional = arch.bidirectional,
            output_size = arch.output_size,
            "LSTM loaded successfully"
        );
        Ok(model)
    }

    /// Assemble the model, inferring layer count and directionality from tensor names
    pub fn build_native(dict: &StateDict, lstm: &str, head: &str) -> Result<NativeLstm> {
        let bidirectional = dict.contains(&format!("{lstm}.weight_ih_l0_reverse"));
        let suffixes: &[&str] = if bidirectional { &["", "_reverse"] } else { &[""] };

        let mut layers = Vec::new();
        while dict.contains(&format!("{lstm}.weight_ih_l{}", layers.len())) {
            let k = layers.len();
            let cells = suffixes
                .iter()
                .map(|sfx| {
                    LstmCell::new(
                        dict.matrix(&format!("{lstm}.weight_ih_l{k}{sfx}"))?,
                        dict.matrix(&format!("{lstm}.weight_hh_l{k}{sfx}"))?,
                        dict.optional_vector(&format!("{lstm}.bias_ih_l{k}{sfx}"))?,
                        dict.optional_vector(&format!("{lstm}.bias_hh_l{k}{sfx}"))?,
                    )
                    .context(format!("layer {k}{sfx}"))
                })
                .collect::<Result<Vec<_>>>()?;
            layers.push(cells);
        }
        ensure!(!layers.is_empty(), "no '{lstm}.weight_ih_l0' tensor in state dict");

        let head_weight = dict.matrix(&format!("{head}.weight"))?;
        let head_bias = match dict.optional_vector(&format!("{head}.bias"))? {
            Some(bias) => bias,
            None => Array1::zeros(head_weight.nrows()),
        };

        let model = NativeLstm::new(layers, head_weight, head_bias)?;
        let arch = model.architecture();
        ensure!(
            arch.input_size == FEATURE_WIDTH,
            "model input width {}, expected {}",
            arch.input_size,
            FEATURE_WIDTH
        );
        ensure!(arch.output_size == 1, "model output width {}, expected 1", arch.output_size);
        Ok(model)
    }

    fn check_expected(model: &NativeLstm, config: &ModelsConfig) -> Result<()> {
        let arch = model.architecture();
        if let Some(hidden) = config.hidden_size {
            ensure!(arch.hidden_size == hidden, "weights have hidden size {}, configured {}", arch.hidden_size, hidden);
        }
        if let Some(layers) = config.num_layers {
            ensure!(arch.num_layers == layers, "weights have {} layers, configured {}", arch.num_layers, layers);
        }
        if let Some(bidirectional) = config.bidirectional {
            ensure!(
                arch.bidirectional == bidirectional,
                "weights bidirectional={}, configured {}",
                arch.bidirectional,
                bidirectional
            );
        }
        Ok(())
    }
}
