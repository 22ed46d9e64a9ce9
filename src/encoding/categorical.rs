use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
    table::category_key,
};

/// Sorted vocabulary; the unknown column sits after the last category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CategoricalState {
    pub vocabulary: Vec<String>,
}

impl CategoricalState {
    pub fn unknown_column(&self) -> usize {
        self.vocabulary.len()
    }

    pub fn column_of(&self, value: &serde_json::Value) -> usize {
        category_key(value)
            .and_then(|key| self.vocabulary.binary_search(&key).ok())
            .unwrap_or(self.unknown_column())
    }
}

pub struct CategoricalEncoder;

impl FeatureEncoder for CategoricalEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Categorical
    }

    fn fit(
        &self,
        _binding: &FeatureBinding,
        _options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let vocabulary: BTreeSet<String> = (0..input.len())
            .filter_map(|r| category_key(input.first(r)))
            .collect();
        Ok(EncoderState::Categorical(CategoricalState {
            vocabulary: vocabulary.into_iter().collect(),
        }))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Categorical(s) => Ok(s.vocabulary.len() + 1),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::Categorical(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), state.vocabulary.len() + 1);
        for r in 0..input.len() {
            out.set(r, state.column_of(input.first(r)), 1.0);
        }
        Ok(out)
    }
}
