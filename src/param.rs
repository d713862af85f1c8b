//! Flat parameter buffers for the factor H and its gradient.
//!
//! A buffer of length `k * n` is read as a `k×n` matrix in row-major order:
//! flat index `t * n + col` holds entry `(t, col)`.

use ndarray::ArrayView2;

use crate::error::{KlError, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ParamBuffer {
    data: Vec<f32>,
}

impl ParamBuffer {
    pub fn zeros(len: usize) -> Self {
        Self {
            data: vec![0.0; len],
        }
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        Self { data }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn get(&self, index: usize) -> Result<f32> {
        self.data
            .get(index)
            .copied()
            .ok_or(KlError::IndexOutOfRange {
                index,
                len: self.data.len(),
            })
    }

    pub fn set(&mut self, index: usize, value: f32) -> Result<()> {
        let len = self.data.len();
        match self.data.get_mut(index) {
            Some(slot) => {
                *slot = value;
                Ok(())
            }
            None => Err(KlError::IndexOutOfRange { index, len }),
        }
    }

    /// All values in flat order
    pub fn data(&self) -> &[f32] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [f32] {
        &mut self.data
    }

    pub fn fill(&mut self, value: f32) {
        self.data.iter_mut().for_each(|v| *v = value);
    }

    /// New zero-filled buffer of the same length with its own storage
    pub fn allocate_like(&self) -> Self {
        Self::zeros(self.data.len())
    }

    /// Row-major `rows×cols` view over the buffer
    pub fn view(&self, rows: usize, cols: usize) -> Result<ArrayView2<'_, f32>> {
        let len = rows.checked_mul(cols).ok_or_else(|| {
            KlError::ShapeMismatch(format!("view shape {}x{} overflows", rows, cols))
        })?;
        if len != self.data.len() {
            return Err(KlError::DimensionMismatch {
                expected: len,
                actual: self.data.len(),
            });
        }
        ArrayView2::from_shape((rows, cols), &self.data)
            .map_err(|e| KlError::ShapeMismatch(e.to_string()))
    }
}
