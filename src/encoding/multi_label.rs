use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
    table::category_key,
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MultiLabelState {
    pub labels: Vec<String>,
    pub delimiter: String,
}

pub struct MultiLabelEncoder;

/// Labels of one row, unioned across its bound columns.
fn row_labels(cells: &[&Value], delimiter: &str) -> Vec<String> {
    let mut labels = Vec::new();
    for cell in cells {
        match cell {
            Value::Null => {}
            Value::Array(items) => labels.extend(items.iter().filter_map(category_key)),
            Value::String(s) => labels.extend(
                s.split(delimiter)
                    .map(str::trim)
                    .filter(|l| !l.is_empty())
                    .map(str::to_string),
            ),
            other => labels.extend(category_key(other)),
        }
    }
    labels
}

impl FeatureEncoder for MultiLabelEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::MultiLabel
    }

    fn fit(
        &self,
        binding: &FeatureBinding,
        options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let delimiter = binding
            .params
            .delimiter
            .clone()
            .unwrap_or_else(|| options.multi_label_delimiter.clone());
        if delimiter.is_empty() {
            return Err(RelGraphError::invalid_input("multi-label delimiter is empty"));
        }
        let labels: BTreeSet<String> = input
            .rows()
            .flat_map(|cells| row_labels(cells, &delimiter))
            .collect();
        Ok(EncoderState::MultiLabel(MultiLabelState {
            labels: labels.into_iter().collect(),
            delimiter,
        }))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::MultiLabel(s) => Ok(s.labels.len()),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::MultiLabel(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), state.labels.len());
        for (r, cells) in input.rows().enumerate() {
            for label in row_labels(cells, &state.delimiter) {
                if let Ok(col) = state.labels.binary_search(&label) {
                    out.set(r, col, 1.0);
                }
            }
        }
        Ok(out)
    }
}
