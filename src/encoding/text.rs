use ahash::AHashMap;
use rand::{Rng, SeedableRng, rngs::StdRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::{EncoderOptions, TextPooling},
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
};

/// Sorted token vocabulary with one embedding row per token.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextState {
    pub vocabulary: Vec<String>,
    pub width: usize,
    pub pooling: TextPooling,
    /// Row-major `vocabulary.len() x width`.
    pub embeddings: Vec<f32>,
}

impl TextState {
    fn embedding(&self, token: usize) -> &[f32] {
        &self.embeddings[token * self.width..(token + 1) * self.width]
    }

    fn encode(&self, text: &str, out: &mut [f32]) {
        let mut hits = 0usize;
        for token in tokenize(text) {
            if let Ok(idx) = self.vocabulary.binary_search(&token) {
                for (o, e) in out.iter_mut().zip(self.embedding(idx)) {
                    *o += e;
                }
                hits += 1;
            }
        }
        if hits > 1 && self.pooling == TextPooling::Mean {
            let n = hits as f32;
            for o in out.iter_mut() {
                *o /= n;
            }
        }
    }
}

pub struct TextEncoder;

/// Lower-cased alphanumeric runs.
pub(crate) fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(|t| t.to_lowercase())
}

fn row_text(cells: &[&Value]) -> String {
    let mut parts = Vec::with_capacity(cells.len());
    for cell in cells {
        match cell {
            Value::Null => {}
            Value::String(s) => parts.push(s.clone()),
            other => parts.push(other.to_string()),
        }
    }
    parts.join(" ")
}

impl FeatureEncoder for TextEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Text
    }

    fn fit(
        &self,
        binding: &FeatureBinding,
        options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let width = binding.params.width.unwrap_or(options.text_width);
        if width == 0 {
            return Err(RelGraphError::invalid_input("text width must be positive"));
        }
        let mut counts: AHashMap<String, usize> = AHashMap::new();
        for cells in input.rows() {
            for token in tokenize(&row_text(cells)) {
                *counts.entry(token).or_default() += 1;
            }
        }
        let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
        if let Some(cap) = binding.params.max_vocab.or(options.text_max_vocab) {
            ranked.truncate(cap);
        }
        let mut vocabulary: Vec<String> = ranked.into_iter().map(|(t, _)| t).collect();
        vocabulary.sort_unstable();

        let seed = binding.params.seed.unwrap_or(options.seed);
        let mut rng = StdRng::seed_from_u64(seed);
        let scale = 1.0 / (width as f32).sqrt();
        let embeddings = (0..vocabulary.len() * width)
            .map(|_| rng.gen_range(-1.0f32..1.0) * scale)
            .collect();
        Ok(EncoderState::Text(TextState {
            vocabulary,
            width,
            pooling: binding.params.pooling.unwrap_or(options.text_pooling),
            embeddings,
        }))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Text(s) => Ok(s.width),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::Text(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), state.width);
        for (r, cells) in input.rows().enumerate() {
            state.encode(&row_text(cells), out.row_mut(r));
        }
        Ok(out)
    }
}
