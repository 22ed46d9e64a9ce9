use serde::{Deserialize, Serialize};

use super::{DenseMatrix, EncoderState, FeatureEncoder, FeatureInput, state_mismatch};
use crate::{
    config::{EncoderOptions, TemporalReference},
    errors::RelGraphError,
    schema::{FeatureBinding, FeatureKind},
    temporal::{Timestamp, parse_timestamp},
};

/// Resolved reference point and scale.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemporalState {
    pub reference: Timestamp,
    pub scale_seconds: f64,
    pub default_delta: f32,
}

impl TemporalState {
    pub fn delta(&self, ts: Option<Timestamp>) -> Result<f32, RelGraphError> {
        let Some(t) = ts else {
            return Ok(self.default_delta);
        };
        // f64 keeps the difference of any two i64 timestamps finite
        let delta = (t as f64 - self.reference as f64) / self.scale_seconds;
        if !delta.is_finite() || delta.abs() > f32::MAX as f64 {
            return Err(RelGraphError::invalid_input(format!(
                "timestamp {t} is out of range for reference {}",
                self.reference
            )));
        }
        Ok(delta as f32)
    }
}

pub struct TemporalEncoder;

impl FeatureEncoder for TemporalEncoder {
    fn kind(&self) -> FeatureKind {
        FeatureKind::Temporal
    }

    fn fit(
        &self,
        binding: &FeatureBinding,
        options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError> {
        let scale_seconds = binding
            .params
            .scale_seconds
            .unwrap_or(options.temporal_scale_seconds);
        if !(scale_seconds > 0.0) {
            return Err(RelGraphError::invalid_input("temporal scale must be positive"));
        }
        let policy = binding.params.reference.unwrap_or(options.temporal_reference);
        let mut lo: Option<Timestamp> = None;
        let mut hi: Option<Timestamp> = None;
        for r in 0..input.len() {
            if let Some(ts) = parse_timestamp(input.first(r))? {
                lo = Some(lo.map_or(ts, |l| l.min(ts)));
                hi = Some(hi.map_or(ts, |h| h.max(ts)));
            }
        }
        let reference = match policy {
            TemporalReference::Min => lo.unwrap_or(0),
            TemporalReference::Max => hi.unwrap_or(0),
            TemporalReference::Fixed(ts) => ts,
        };
        Ok(EncoderState::Temporal(TemporalState {
            reference,
            scale_seconds,
            default_delta: binding
                .params
                .default_delta
                .unwrap_or(options.temporal_default_delta),
        }))
    }

    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError> {
        match state {
            EncoderState::Temporal(_) => Ok(1),
            other => Err(state_mismatch(self.kind(), other)),
        }
    }

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        let EncoderState::Temporal(state) = state else {
            return Err(state_mismatch(self.kind(), state));
        };
        let mut out = DenseMatrix::zeros(input.len(), 1);
        for r in 0..input.len() {
            out.set(r, 0, state.delta(parse_timestamp(input.first(r))?)?);
        }
        Ok(out)
    }
}
