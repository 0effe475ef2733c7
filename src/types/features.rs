//! Patient feature rows as they flow through the pipeline

use crate::error::{ServiceError, ServiceResult};
use ndarray::Array3;

/// Number of features in every row
pub const FEATURE_WIDTH: usize = 8;

/// Column holding the patient's age
pub const AGE_COLUMN: usize = 4;

/// Column holding the blood pressure code (Low=0, Normal=1, High=2)
pub const BLOOD_PRESSURE_COLUMN: usize = 6;

/// Column holding the cholesterol code (Low=0, Normal=1, High=2)
pub const CHOLESTEROL_COLUMN: usize = 7;

/// Columns transformed by the pre-fitted scaler, in scaler order
pub const SCALED_COLUMNS: [usize; 3] = [AGE_COLUMN, BLOOD_PRESSURE_COLUMN, CHOLESTEROL_COLUMN];

/// One patient sample. The fixed-size array makes width 8 structural.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FeatureVector([f64; FEATURE_WIDTH]);

impl FeatureVector {
    pub fn new(values: [f64; FEATURE_WIDTH]) -> Self {
        Self(values)
    }

    /// Build from a raw row, reporting `row` in the error when the width is wrong
    pub fn from_row(values: &[f64], row: usize) -> ServiceResult<Self> {
        let values: [f64; FEATURE_WIDTH] =
            values.try_into().map_err(|_| ServiceError::Shape {
                expected: FEATURE_WIDTH,
                actual: values.len(),
                row,
            })?;
        Ok(Self(values))
    }

    pub fn values(&self) -> &[f64; FEATURE_WIDTH] {
        &self.0
    }

    pub fn get(&self, column: usize) -> Option<f64> {
        self.0.get(column).copied()
    }

    pub(crate) fn set(&mut self, column: usize, value: f64) {
        self.0[column] = value;
    }
}

/// Non-empty, order-preserving collection of feature rows
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureBatch(Vec<FeatureVector>);

impl FeatureBatch {
    /// The only way to build a batch from untyped rows.
    ///
    /// An empty batch is malformed; any row whose width is not
    /// [`FEATURE_WIDTH`] is a shape error.
    pub fn from_rows(rows: &[Vec<f64>]) -> ServiceResult<Self> {
        if rows.is_empty() {
            return Err(ServiceError::malformed("'data' must contain at least one row"));
        }

        rows.iter()
            .enumerate()
            .map(|(row, values)| FeatureVector::from_row(values, row))
            .collect::<ServiceResult<Vec<_>>>()
            .map(Self)
    }

    pub fn from_vectors(vectors: Vec<FeatureVector>) -> ServiceResult<Self> {
        if vectors.is_empty() {
            return Err(ServiceError::malformed("'data' must contain at least one row"));
        }
        Ok(Self(vectors))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn vectors(&self) -> &[FeatureVector] {
        &self.0
    }

    pub fn iter(&self) -> impl Iterator<Item = &FeatureVector> {
        self.0.iter()
    }

    pub(crate) fn iter_mut(&mut self) -> impl Iterator<Item = &mut FeatureVector> {
        self.0.iter_mut()
    }

    /// Sequence-model input of shape `(batch, 1, FEATURE_WIDTH)`.
    ///
    /// Every sample is a one-step sequence in this deployment.
    pub fn to_sequence_tensor(&self) -> Array3<f32> {
        Array3::from_shape_fn((self.0.len(), 1, FEATURE_WIDTH), |(sample, _, column)| {
            self.0[sample].0[column] as f32
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn row(width: usize) -> Vec<f64> {
        (0..width).map(|i| i as f64).collect()
    }

    #[test]
    fn test_from_rows_accepts_width_eight() {
        let batch = FeatureBatch::from_rows(&[row(8), row(8)]).unwrap();
        assert_eq!(batch.len(), 2);
        assert_eq!(batch.vectors()[1].get(7), Some(7.0));
    }

    #[test]
    fn test_from_rows_rejects_short_and_long_rows() {
        for width in [0, 7, 9] {
            let err = FeatureBatch::from_rows(&[row(8), row(width)]).unwrap_err();
            assert_eq!(
                err,
                ServiceError::Shape {
                    expected: FEATURE_WIDTH,
                    actual: width,
                    row: 1
                }
            );
        }
    }

    #[test]
    fn test_from_rows_rejects_empty_batch() {
        let err = FeatureBatch::from_rows(&[]).unwrap_err();
        assert!(matches!(err, ServiceError::MalformedRequest(_)));
    }

    #[test]
    fn test_sequence_tensor_layout() {
        let batch = FeatureBatch::from_rows(&[row(8), vec![1.5; 8]]).unwrap();
        let tensor = batch.to_sequence_tensor();

        assert_eq!(tensor.shape(), &[2, 1, FEATURE_WIDTH]);
        assert_eq!(tensor[[0, 0, 3]], 3.0);
        assert_eq!(tensor[[1, 0, 6]], 1.5);
    }
}
