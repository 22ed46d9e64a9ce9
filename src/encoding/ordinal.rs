use serde::{Deserialize, Serialize};

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
    table::category_key,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrdinalState {
    pub order: Vec<String>,
    /// Out-of-order values get code `order.len()` instead of failing.
    pub fallback_bucket: bool,
}

impl OrdinalState {
    pub fn code(&self, value: &serde_json::Value) -> Result<usize, RelGraphError> {
        let key = category_key(value);
        let position = key
            .as_deref()
            .and_then(|k| self.order.iter().position(|o| o == k));
        match position {
            Some(code) => Ok(code),
            None if self.fallback_bucket => Ok(self.order.len()),
            None => Err(RelGraphError::unknown_ordinal(format!(
                "{} is not in declared order [{}]",
                key.unwrap_or_else(|| "null".to_string()),
                self.order.join(", ")
            ))),
        }
    }
}

pub struct OrdinalEncoder;

impl FeatureEncoder for OrdinalEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Ordinal
    }

    /// The order is declared, not learned; fit still checks the observed
    /// column so a bad value fails the build at fit time.
    fn fit(
        &self,
        binding: &FeatureBinding,
        _options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        if binding.params.order.is_empty() {
            return Err(RelGraphError::invalid_input(format!(
                "ordinal feature {} declares no order",
                binding.name
            )));
        }
        let state = OrdinalState {
            order: binding.params.order.clone(),
            fallback_bucket: binding.params.fallback_bucket,
        };
        for r in 0..input.len() {
            state
                .code(input.first(r))
                .map_err(|e| RelGraphError::unknown_ordinal(format!("row {r}: {e}")))?;
        }
        Ok(EncoderState::Ordinal(state))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Ordinal(_) => Ok(1),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::Ordinal(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), 1);
        for r in 0..input.len() {
            out.set(r, 0, state.code(input.first(r))? as f32);
        }
        Ok(out)
    }
}
