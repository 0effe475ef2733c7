//! Sequence-model backends and the predictor built on them

pub mod backend;
pub mod inference;
pub mod loader;
pub mod lstm;
pub mod onnx;

pub use backend::{ComputeDevice, ForwardPass};
pub use inference::Predictor;
pub use loader::ModelLoader;
pub use lstm::NativeLstm;
pub use onnx::OnnxLstm;
