use serde::{Deserialize, Serialize};

use crate::errors::RelGraphError;

/// Row-major `f32` matrix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseMatrix {
    rows: usize,
    cols: usize,
    data: Vec<f32>,
}

impl DenseMatrix {
    pub fn zeros(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            data: vec![0.0; rows * cols],
        }
    }

    pub fn from_vec(rows: usize, cols: usize, data: Vec<f32>) -> Result<Self, RelGraphError> {
        if data.len() != rows * cols {
            return Err(RelGraphError::shape(format!(
                "{rows}x{cols} matrix needs {} values, got {}",
                rows * cols,
                data.len()
            )));
        }
        Ok(Self { rows, cols, data })
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    pub fn shape(&self) -> (usize, usize) {
        (self.rows, self.cols)
    }

    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    pub fn row(&self, row: usize) -> &[f32] {
        &self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn row_mut(&mut self, row: usize) -> &mut [f32] {
        &mut self.data[row * self.cols..(row + 1) * self.cols]
    }

    pub fn get(&self, row: usize, col: usize) -> f32 {
        self.data[row * self.cols + col]
    }

    pub fn set(&mut self, row: usize, col: usize, value: f32) {
        self.data[row * self.cols + col] = value;
    }

    /// Side-by-side concatenation. Every block must have `rows` rows.
    pub fn hconcat(rows: usize, blocks: &[&DenseMatrix]) -> Result<Self, RelGraphError> {
        let cols = blocks.iter().map(|b| b.cols).sum();
        let mut out = Self::zeros(rows, cols);
        let mut offset = 0;
        for block in blocks {
            if block.rows != rows {
                return Err(RelGraphError::shape(format!(
                    "block has {} rows, expected {rows}",
                    block.rows
                )));
            }
            for r in 0..rows {
                out.row_mut(r)[offset..offset + block.cols].copy_from_slice(block.row(r));
            }
            offset += block.cols;
        }
        Ok(out)
    }

    /// Gathers the given rows, in the given order, into a new matrix.
    pub fn select_rows(&self, rows: &[usize]) -> Self {
        let mut data = Vec::with_capacity(rows.len() * self.cols);
        for &r in rows {
            data.extend_from_slice(self.row(r));
        }
        Self {
            rows: rows.len(),
            cols: self.cols,
            data,
        }
    }

    /// Copies the column range `[start, start + width)`.
    pub fn column_slice(&self, start: usize, width: usize) -> Self {
        let mut data = Vec::with_capacity(self.rows * width);
        for r in 0..self.rows {
            data.extend_from_slice(&self.row(r)[start..start + width]);
        }
        Self {
            rows: self.rows,
            cols: width,
            data,
        }
    }
}
