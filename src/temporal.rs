//! Timestamps per node/edge instance and point-in-time visibility.

use chrono::{DateTime, NaiveDate, NaiveDateTime};
use serde_json::Value;

use crate::{errors::RelGraphError, table::Table};

/// Unix time in seconds.
pub type Timestamp = i64;

/// Parses integer/float unix seconds or an RFC 3339 / ISO date string.
/// Nulls and empty strings have no timestamp.
pub fn parse_timestamp(value: &Value) -> Result<Option<Timestamp>, RelGraphError> {
    match value {
        Value::Null => Ok(None),
        Value::Number(n) => n
            .as_i64()
            .or_else(|| {
                n.as_f64()
                    .map(f64::floor)
                    .filter(|f| in_i64_range(*f))
                    .map(|f| f as i64)
            })
            .map(Some)
            .ok_or_else(|| RelGraphError::invalid_input(format!("timestamp {n} out of range"))),
        Value::String(s) if s.trim().is_empty() => Ok(None),
        Value::String(s) => parse_timestamp_str(s.trim()).map(Some),
        other => Err(RelGraphError::invalid_input(format!(
            "{other} is not a timestamp"
        ))),
    }
}

/// `i64::MAX as f64` rounds up to 2^63, which is itself out of range.
fn in_i64_range(f: f64) -> bool {
    f.is_finite() && f >= i64::MIN as f64 && f < i64::MAX as f64
}

fn parse_timestamp_str(s: &str) -> Result<Timestamp, RelGraphError> {
    if let Ok(secs) = s.parse::<i64>() {
        return Ok(secs);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Ok(dt.timestamp());
    }
    if let Ok(dt) = NaiveDateTime::parse_from_str(s, "%Y-%m-%d %H:%M:%S") {
        return Ok(dt.and_utc().timestamp());
    }
    if let Ok(date) = NaiveDate::parse_from_str(s, "%Y-%m-%d") {
        if let Some(dt) = date.and_hms_opt(0, 0, 0) {
            return Ok(dt.and_utc().timestamp());
        }
    }
    Err(RelGraphError::invalid_input(format!("unparseable timestamp {s:?}")))
}

/// Optional timestamp for every instance of one node or edge type.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TemporalAttributes {
    owner: String,
    values: Vec<Option<Timestamp>>,
}

impl TemporalAttributes {
    /// No instance carries a timestamp; everything is always visible.
    pub fn untimed(owner: &str, instances: usize) -> Self {
        Self {
            owner: owner.to_string(),
            values: vec![None; instances],
        }
    }

    pub fn from_values(owner: &str, values: Vec<Option<Timestamp>>) -> Self {
        Self {
            owner: owner.to_string(),
            values,
        }
    }

    pub fn owner(&self) -> &str {
        &self.owner
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, instance: usize) -> Option<Timestamp> {
        self.values.get(instance).copied().flatten()
    }

    pub fn values(&self) -> &[Option<Timestamp>] {
        &self.values
    }

    pub fn is_visible(&self, instance: usize, cutoff: Timestamp) -> bool {
        self.get(instance).is_none_or(|ts| ts <= cutoff)
    }

    /// Visibility of every instance at `cutoff`.
    pub fn point_in_time_view(&self, cutoff: Timestamp) -> VisibilityMask {
        VisibilityMask {
            bits: self
                .values
                .iter()
                .map(|v| v.is_none_or(|ts| ts <= cutoff))
                .collect(),
        }
    }

    /// Earliest and latest timestamps present.
    pub fn range(&self) -> Option<(Timestamp, Timestamp)> {
        let mut it = self.values.iter().flatten().copied();
        let first = it.next()?;
        Some(it.fold((first, first), |(lo, hi), t| (lo.min(t), hi.max(t))))
    }
}

/// Reads `column` of the rows that supplied each instance.
pub fn attach(
    owner: &str,
    table: &Table,
    column: &str,
    source_rows: &[usize],
) -> Result<TemporalAttributes, RelGraphError> {
    let col = table.require_column(column)?;
    let mut values = Vec::with_capacity(source_rows.len());
    for &row in source_rows {
        let ts = parse_timestamp(table.cell(row, col)).map_err(|e| {
            RelGraphError::invalid_input(format!("{owner} row {row} column {column}: {e}"))
        })?;
        values.push(ts);
    }
    Ok(TemporalAttributes::from_values(owner, values))
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct VisibilityMask {
    bits: Vec<bool>,
}

impl VisibilityMask {
    pub fn all(len: usize) -> Self {
        Self {
            bits: vec![true; len],
        }
    }

    pub fn from_bits(bits: Vec<bool>) -> Self {
        Self { bits }
    }

    pub fn len(&self) -> usize {
        self.bits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bits.is_empty()
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.bits.get(index).copied().unwrap_or(false)
    }

    pub fn visible_count(&self) -> usize {
        self.bits.iter().filter(|b| **b).count()
    }

    /// Indices of visible instances, ascending.
    pub fn visible(&self) -> Vec<usize> {
        self.bits
            .iter()
            .enumerate()
            .filter_map(|(i, b)| b.then_some(i))
            .collect()
    }

    pub fn bits(&self) -> &[bool] {
        &self.bits
    }
}
