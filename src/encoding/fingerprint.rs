use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, as_f64, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
};

/// Seeded Rademacher projection from `input_dim` to `output_dim`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FingerprintState {
    pub seed: u64,
    pub input_dim: usize,
    pub output_dim: usize,
    /// Row-major `input_dim x output_dim`.
    pub projection: Vec<f32>,
}

impl FingerprintState {
    pub fn new(seed: u64, input_dim: usize, output_dim: usize) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (output_dim as f32).sqrt();
        let projection = (0..input_dim * output_dim)
            .map(|_| if rng.gen_bool(0.5) { scale } else { -scale })
            .collect();
        Self {
            seed,
            input_dim,
            output_dim,
            projection,
        }
    }

    fn project(&self, input: &[f32], out: &mut [f32]) {
        for (i, &x) in input.iter().enumerate() {
            if x == 0.0 {
                continue;
            }
            let weights = &self.projection[i * self.output_dim..(i + 1) * self.output_dim];
            for (o, w) in out.iter_mut().zip(weights) {
                *o += x * w;
            }
        }
    }
}

pub struct FingerprintEncoder;

/// Flattens a row's cells into one input vector. `None` when every cell is null.
fn row_vector(cells: &[&Value], row: usize) -> Result<Option<Vec<f32>>, RelGraphError> {
    if cells.iter().all(|c| c.is_null()) {
        return Ok(None);
    }
    let mut vector = Vec::new();
    for cell in cells {
        match cell {
            Value::Null => {}
            Value::Array(items) => {
                for item in items {
                    let x = as_f64(item).ok_or_else(|| {
                        RelGraphError::invalid_numeric(format!(
                            "row {row}: fingerprint element {item} is not numeric"
                        ))
                    })?;
                    vector.push(x as f32);
                }
            }
            Value::String(bits) if bits.chars().all(|c| c == '0' || c == '1') => {
                vector.extend(bits.chars().map(|c| if c == '1' { 1.0 } else { 0.0 }));
            }
            other => {
                let x = as_f64(other).ok_or_else(|| {
                    RelGraphError::invalid_numeric(format!(
                        "row {row}: fingerprint cell {other} is not numeric"
                    ))
                })?;
                vector.push(x as f32);
            }
        }
    }
    Ok(Some(vector))
}

impl FeatureEncoder for FingerprintEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::HighDimFingerprint
    }

    fn fit(
        &self,
        binding: &FeatureBinding,
        options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let output_dim = binding.params.width.unwrap_or(options.fingerprint_width);
        if output_dim == 0 {
            return Err(RelGraphError::invalid_input("fingerprint width must be positive"));
        }
        let mut input_dim = binding.params.input_dim;
        for (r, cells) in input.rows().enumerate() {
            let Some(vector) = row_vector(cells, r)? else {
                continue;
            };
            match input_dim {
                None => input_dim = Some(vector.len()),
                Some(dim) if dim != vector.len() => {
                    return Err(RelGraphError::shape(format!(
                        "row {r}: fingerprint has {} elements, expected {dim}",
                        vector.len()
                    )));
                }
                Some(_) => {}
            }
        }
        let seed = binding.params.seed.unwrap_or(options.seed);
        Ok(EncoderState::HighDimFingerprint(FingerprintState::new(
            seed,
            input_dim.unwrap_or(0),
            output_dim,
        )))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::HighDimFingerprint(s) => Ok(s.output_dim),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::HighDimFingerprint(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), state.output_dim);
        for (r, cells) in input.rows().enumerate() {
            let Some(vector) = row_vector(cells, r)? else {
                continue;
            };
            if vector.len() != state.input_dim {
                return Err(RelGraphError::shape(format!(
                    "row {r}: fingerprint has {} elements, projection expects {}",
                    vector.len(),
                    state.input_dim
                )));
            }
            state.project(&vector, out.row_mut(r));
        }
        Ok(out)
    }
}
