use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, as_f64, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
};

/// Per-column mean and population standard deviation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericState {
    pub means: Vec<f64>,
    pub stds: Vec<f64>,
}

impl NumericState {
    /// Standardised value; zero-variance columns and nulls map to 0.
    pub fn scale(&self, column: usize, value: Option<f64>) -> Result<f32, RelGraphError> {
        let (Some(&mean), Some(&std)) = (self.means.get(column), self.stds.get(column)) else {
            return Err(RelGraphError::shape(format!(
                "numeric state has no column {column}"
            )));
        };
        let x = match value {
            Some(x) if std > 0.0 => x,
            _ => return Ok(0.0),
        };
        let mut z = (x - mean) / std;
        if !z.is_finite() {
            // x - mean overflowed; the split form stays finite for fitted data
            z = x / std - mean / std;
        }
        if !z.is_finite() || z.abs() > f32::MAX as f64 {
            return Err(RelGraphError::invalid_numeric(format!(
                "{x} standardises outside the f32 range"
            )));
        }
        Ok(z as f32)
    }
}

pub struct NumericEncoder;

fn numeric_cell(value: &Value, row: usize) -> Result<Option<f64>, RelGraphError> {
    match value {
        Value::Null => Ok(None),
        other => match as_f64(other) {
            Some(x) if x.is_finite() => Ok(Some(x)),
            _ => Err(RelGraphError::invalid_numeric(format!(
                "row {row}: {other} is not a finite number"
            ))),
        },
    }
}

impl FeatureEncoder for NumericEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Numeric
    }

    fn fit(
        &self,
        _binding: &FeatureBinding,
        _options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let columns = input.columns();
        // Moments are taken over values divided by a power of two near the
        // column's largest magnitude. The division is exact, so ordinary
        // inputs give the same moments while huge ones cannot overflow.
        let mut peaks = vec![0.0f64; columns];
        let mut counts = vec![0usize; columns];
        for (r, cells) in input.rows().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                if let Some(x) = numeric_cell(cell, r)? {
                    peaks[c] = peaks[c].max(x.abs());
                    counts[c] += 1;
                }
            }
        }
        for peak in peaks.iter_mut().filter(|p| **p > 0.0) {
            *peak = peak.log2().floor().exp2();
        }
        let unit = |c: usize, x: f64| if peaks[c] > 0.0 { x / peaks[c] } else { 0.0 };

        let mut sums = vec![0.0; columns];
        for (r, cells) in input.rows().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                if let Some(x) = numeric_cell(cell, r)? {
                    sums[c] += unit(c, x);
                }
            }
        }
        let unit_means: Vec<f64> = sums
            .iter()
            .zip(&counts)
            .map(|(s, &n)| if n == 0 { 0.0 } else { s / n as f64 })
            .collect();
        let mut sq = vec![0.0; columns];
        for (r, cells) in input.rows().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                if let Some(x) = numeric_cell(cell, r)? {
                    sq[c] += (unit(c, x) - unit_means[c]).powi(2);
                }
            }
        }
        let means: Vec<f64> = unit_means.iter().zip(&peaks).map(|(m, p)| m * p).collect();
        let stds: Vec<f64> = sq
            .iter()
            .zip(&counts)
            .zip(&peaks)
            .map(|((s, &n), p)| {
                if n == 0 {
                    0.0
                } else {
                    (s / n as f64).sqrt() * p
                }
            })
            .collect();
        let non_finite = (0..columns).find(|&c| !means[c].is_finite() || !stds[c].is_finite());
        if let Some(c) = non_finite {
            return Err(RelGraphError::invalid_numeric(format!(
                "column {c}: mean or standard deviation is not finite"
            )));
        }
        Ok(EncoderState::Numeric(NumericState { means, stds }))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Numeric(s) => Ok(s.means.len()),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::Numeric(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        if input.columns() != state.means.len() {
            return Err(RelGraphError::shape(format!(
                "numeric state covers {} columns, input has {}",
                state.means.len(),
                input.columns()
            )));
        }
        let mut out = DenseMatrix::zeros(input.len(), state.means.len());
        for (r, cells) in input.rows().enumerate() {
            for (c, cell) in cells.iter().enumerate() {
                out.set(r, c, state.scale(c, numeric_cell(cell, r)?)?);
            }
        }
        Ok(out)
    }
}
