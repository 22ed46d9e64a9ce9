use serde_json::Value;

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
};

pub struct BinaryEncoder;

/// Accepts booleans, the numbers 0 and 1, and the usual yes/no spellings.
pub(crate) fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 0.0 => Some(false),
            Some(x) if x == 1.0 => Some(true),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" => Some(true),
            "false" | "f" | "no" | "n" | "0" => Some(false),
            _ => None,
        },
        _ => None,
    }
}

impl FeatureEncoder for BinaryEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Binary
    }

    fn fit(
        &self,
        _binding: &FeatureBinding,
        _options: &EncoderOptions,
        _input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        Ok(EncoderState::Binary)
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Binary => Ok(1),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        if !matches!(state, EncoderState::Binary) {
            return Err(state_mismatch(self.kind(), state));
        }
        let mut out = DenseMatrix::zeros(input.len(), 1);
        for r in 0..input.len() {
            let cell = input.first(r);
            let flag = parse_bool(cell).ok_or_else(|| {
                RelGraphError::invalid_binary(format!("row {r}: {cell} is not boolean-like"))
            })?;
            out.set(r, 0, if flag { 1.0 } else { 0.0 });
        }
        Ok(out)
    }
}
