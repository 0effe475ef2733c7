//! In-process LSTM forward pass on the CPU.
//!
//! Follows the usual recurrent-layer conventions: gate rows are stacked as
//! input, forget, cell, output; layer `k > 0` consumes the concatenated
//! outputs of both directions of layer `k - 1`; the reverse direction walks
//! the sequence back to front. The linear head reads the last time step of
//! the top layer.

use super::backend::{ComputeDevice, ForwardPass};
use crate::error::{ServiceError, ServiceResult};
use anyhow::{ensure, Result};
use ndarray::{concatenate, s, Array1, Array2, Array3, ArrayView3, Axis};

/// Fixed architecture hyperparameters of a loaded model
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LstmArchitecture {
    pub input_size: usize,
    pub hidden_size: usize,
    pub num_layers: usize,
    pub bidirectional: bool,
    pub output_size: usize,
}

impl LstmArchitecture {
    pub fn num_directions(&self) -> usize {
        if self.bidirectional {
            2
        } else {
            1
        }
    }
}

/// Parameters of one direction of one layer
#[derive(Debug, Clone)]
pub struct LstmCell {
    /// `(4 * hidden, input)`
    pub w_ih: Array2<f32>,
    /// `(4 * hidden, hidden)`
    pub w_hh: Array2<f32>,
    /// `b_ih + b_hh`, `(4 * hidden)`
    pub bias: Array1<f32>,
}

impl LstmCell {
    pub fn new(
        w_ih: Array2<f32>,
        w_hh: Array2<f32>,
        b_ih: Option<Array1<f32>>,
        b_hh: Option<Array1<f32>>,
    ) -> Result<Self> {
        let gates = w_ih.nrows();
        ensure!(gates % 4 == 0, "gate rows {} not divisible by 4", gates);
        let hidden = gates / 4;
        ensure!(
            w_hh.dim() == (gates, hidden),
            "recurrent weight shape {:?}, expected {:?}",
            w_hh.dim(),
            (gates, hidden)
        );

        let mut bias = Array1::<f32>::zeros(gates);
        for b in [b_ih, b_hh].into_iter().flatten() {
            ensure!(b.len() == gates, "bias length {}, expected {}", b.len(), gates);
            bias += &b;
        }

        Ok(Self { w_ih, w_hh, bias })
    }

    pub fn hidden_size(&self) -> usize {
        self.w_hh.ncols()
    }

    pub fn input_size(&self) -> usize {
        self.w_ih.ncols()
    }
}

/// Stacked, optionally bidirectional LSTM with a linear output head
#[derive(Debug, Clone)]
pub struct NativeLstm {
    architecture: LstmArchitecture,
    /// `layers[k][d]`: layer `k`, direction `d` (0 forward, 1 reverse)
    layers: Vec<Vec<LstmCell>>,
    /// `(output, hidden * directions)`
    head_weight: Array2<f32>,
    /// `(output)`
    head_bias: Array1<f32>,
}

impl NativeLstm {
    /// Assemble a model, checking that every tensor agrees with the first layer
    pub fn new(
        layers: Vec<Vec<LstmCell>>,
        head_weight: Array2<f32>,
        head_bias: Array1<f32>,
    ) -> Result<Self> {
        let first = layers
            .first()
            .and_then(|l| l.first())
            .ok_or_else(|| anyhow::anyhow!("model has no recurrent layers"))?;
        let hidden_size = first.hidden_size();
        let num_directions = layers[0].len();
        ensure!(
            num_directions == 1 || num_directions == 2,
            "unsupported direction count {}",
            num_directions
        );

        let architecture = LstmArchitecture {
            input_size: first.input_size(),
            hidden_size,
            num_layers: layers.len(),
            bidirectional: num_directions == 2,
            output_size: head_weight.nrows(),
        };

        for (k, layer) in layers.iter().enumerate() {
            ensure!(
                layer.len() == num_directions,
                "layer {} has {} directions, expected {}",
                k,
                layer.len(),
                num_directions
            );
            let expected_input = if k == 0 {
                architecture.input_size
            } else {
                hidden_size * num_directions
            };
            for cell in layer {
                ensure!(
                    cell.hidden_size() == hidden_size,
                    "layer {} hidden size {}, expected {}",
                    k,
                    cell.hidden_size(),
                    hidden_size
                );
                ensure!(
                    cell.input_size() == expected_input,
                    "layer {} input size {}, expected {}",
                    k,
                    cell.input_size(),
                    expected_input
                );
            }
        }

        ensure!(
            head_weight.ncols() == hidden_size * num_directions,
            "output layer expects {} inputs, recurrent stack produces {}",
            head_weight.ncols(),
            hidden_size * num_directions
        );
        ensure!(
            head_bias.len() == head_weight.nrows(),
            "output bias length {}, expected {}",
            head_bias.len(),
            head_weight.nrows()
        );

        Ok(Self {
            architecture,
            layers,
            head_weight,
            head_bias,
        })
    }

    pub fn architecture(&self) -> &LstmArchitecture {
        &self.architecture
    }

    /// Run one direction over the whole sequence, returning `(batch, seq, hidden)`
    fn run_direction(input: ArrayView3<'_, f32>, cell: &LstmCell, reverse: bool) -> Array3<f32> {
        let (batch, seq_len, _) = input.dim();
        let hidden = cell.hidden_size();

        let mut h = Array2::<f32>::zeros((batch, hidden));
        let mut c = Array2::<f32>::zeros((batch, hidden));
        let mut output = Array3::<f32>::zeros((batch, seq_len, hidden));

        let steps: Vec<usize> = if reverse {
            (0..seq_len).rev().collect()
        } else {
            (0..seq_len).collect()
        };

        for t in steps {
            let x_t = input.slice(s![.., t, ..]);
            let gates = x_t.dot(&cell.w_ih.t()) + h.dot(&cell.w_hh.t()) + &cell.bias;

            let i = gates.slice(s![.., 0..hidden]).mapv(sigmoid);
            let f = gates.slice(s![.., hidden..2 * hidden]).mapv(sigmoid);
            let g = gates.slice(s![.., 2 * hidden..3 * hidden]).mapv(f32::tanh);
            let o = gates.slice(s![.., 3 * hidden..]).mapv(sigmoid);

            c = &f * &c + &i * &g;
            h = &o * &c.mapv(f32::tanh);
            output.slice_mut(s![.., t, ..]).assign(&h);
        }

        output
    }
}

impl ForwardPass for NativeLstm {
    fn name(&self) -> &str {
        "native-lstm"
    }

    fn device(&self) -> ComputeDevice {
        ComputeDevice::Cpu
    }

    fn forward(&self, input: ArrayView3<'_, f32>) -> ServiceResult<Vec<f32>> {
        let (batch, seq_len, features) = input.dim();
        if features != self.architecture.input_size {
            return Err(ServiceError::inference(format!(
                "input has {} features, model expects {}",
                features, self.architecture.input_size
            )));
        }
        if seq_len == 0 {
            return Err(ServiceError::inference("input sequence is empty"));
        }

        let mut layer_input = input.to_owned();
        for layer in &self.layers {
            let outputs: Vec<Array3<f32>> = layer
                .iter()
                .enumerate()
                .map(|(direction, cell)| Self::run_direction(layer_input.view(), cell, direction == 1))
                .collect();
            let views: Vec<_> = outputs.iter().map(|o| o.view()).collect();
            layer_input = concatenate(Axis(2), &views)
                .map_err(|e| ServiceError::inference(e.to_string()))?;
        }

        let last_step = layer_input.slice(s![.., seq_len - 1, ..]);
        let logits = last_step.dot(&self.head_weight.t()) + &self.head_bias;

        if logits.iter().any(|v| !v.is_finite()) {
            return Err(ServiceError::inference("forward pass produced a non-finite logit"));
        }

        debug_assert_eq!(logits.nrows(), batch);
        Ok(logits.column(0).to_vec())
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
