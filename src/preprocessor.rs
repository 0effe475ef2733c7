//! Pre-fitted normalization of the age, blood pressure and cholesterol columns.
//!
//! The scaler parameters come from the training pipeline (a standard scaler
//! fitted on those three columns) and are only read here. Blood pressure and
//! cholesterol must already be integer codes (Low=0, Normal=1, High=2) when a
//! row reaches this stage; no categorical mapping happens in this crate.

use crate::error::ServiceResult;
use crate::types::features::{FeatureBatch, SCALED_COLUMNS};
use anyhow::{ensure, Context, Result};
use serde::Deserialize;
use std::path::Path;
use tracing::info;

const SCALED_COUNT: usize = SCALED_COLUMNS.len();

/// Per-column statistics of the pre-fitted scaler
#[derive(Debug, Clone, PartialEq)]
pub struct Scaler {
    mean: [f64; SCALED_COUNT],
    scale: [f64; SCALED_COUNT],
}

/// On-disk scaler artifact. Accepts the fitted-attribute names (`mean_`, `scale_`) too.
#[derive(Debug, Deserialize)]
struct ScalerFile {
    #[serde(alias = "mean_")]
    mean: Vec<f64>,
    #[serde(alias = "scale_")]
    scale: Vec<f64>,
}

impl Scaler {
    pub fn new(mean: [f64; SCALED_COUNT], scale: [f64; SCALED_COUNT]) -> Result<Self> {
        for (i, (&m, &s)) in mean.iter().zip(scale.iter()).enumerate() {
            ensure!(m.is_finite(), "scaler mean for column {} is not finite", SCALED_COLUMNS[i]);
            ensure!(
                s.is_finite() && s != 0.0,
                "scaler scale for column {} must be finite and non-zero, got {}",
                SCALED_COLUMNS[i],
                s
            );
        }
        Ok(Self { mean, scale })
    }

    /// Load the scaler artifact from a JSON file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path)
            .context(format!("Failed to read scaler from {:?}", path))?;
        let scaler = Self::from_json(&raw).context(format!("Invalid scaler file {:?}", path))?;

        info!(
            path = %path.display(),
            mean = ?scaler.mean,
            scale = ?scaler.scale,
            "Scaler loaded"
        );
        Ok(scaler)
    }

    pub fn from_json(raw: &str) -> Result<Self> {
        let file: ScalerFile = serde_json::from_str(raw).context("Failed to parse scaler JSON")?;
        let mean: [f64; SCALED_COUNT] = file.mean.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("expected {} mean values, got {}", SCALED_COUNT, file.mean.len())
        })?;
        let scale: [f64; SCALED_COUNT] = file.scale.as_slice().try_into().map_err(|_| {
            anyhow::anyhow!("expected {} scale values, got {}", SCALED_COUNT, file.scale.len())
        })?;
        Self::new(mean, scale)
    }

    pub fn mean(&self) -> &[f64; SCALED_COUNT] {
        &self.mean
    }

    pub fn scale(&self) -> &[f64; SCALED_COUNT] {
        &self.scale
    }
}

/// Applies the loaded [`Scaler`] to the designated columns of each row
pub struct Preprocessor {
    scaler: Scaler,
}

impl Preprocessor {
    pub fn new(scaler: Scaler) -> Self {
        Self { scaler }
    }

    /// Scale columns 4, 6 and 7 with `(x - mean) / scale`; other columns are untouched.
    pub fn normalize(&self, mut batch: FeatureBatch) -> FeatureBatch {
        for vector in batch.iter_mut() {
            for (i, &column) in SCALED_COLUMNS.iter().enumerate() {
                let raw = vector.values()[column];
                vector.set(column, (raw - self.scaler.mean[i]) / self.scaler.scale[i]);
            }
        }
        batch
    }

    /// Validate raw rows into a batch, then normalize it
    pub fn normalize_rows(&self, rows: &[Vec<f64>]) -> ServiceResult<FeatureBatch> {
        FeatureBatch::from_rows(rows).map(|batch| self.normalize(batch))
    }
}
