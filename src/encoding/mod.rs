//! Feature encoding engine.
//!
//! Every feature goes through two phases:
//!
//! - **fit** reads the full observed column once and produces an immutable
//!   [`EncoderState`] (vocabularies, moments, projections).
//! - **transform** maps any batch of rows to a dense block using that state
//!   alone. The same state encodes the build-time rows, later incremental
//!   batches and subgraph slices, so the feature space never changes width.
//!
//! The encoder for a binding is chosen by its [`FeatureKind`] tag through an
//! [`EncoderRegistry`]; the engine itself never inspects the data to decide
//! how a column should be encoded.

mod binary;
mod categorical;
mod fingerprint;
mod matrix;
mod multi_label;
mod numeric;
mod ordinal;
mod temporal;
mod text;

use std::sync::Arc;

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

pub use self::binary::BinaryEncoder;
pub use self::categorical::{CategoricalEncoder, CategoricalState};
pub use self::fingerprint::{FingerprintEncoder, FingerprintState};
pub use self::matrix::DenseMatrix;
pub use self::multi_label::{MultiLabelEncoder, MultiLabelState};
pub use self::numeric::{NumericEncoder, NumericState};
pub use self::ordinal::{OrdinalEncoder, OrdinalState};
pub use self::temporal::{TemporalEncoder, TemporalState};
pub use self::text::{TextEncoder, TextState};

use crate::{
    config::EncoderOptions,
    errors::RelGraphError,
    hashing::ContentHasher,
    schema::{FeatureBinding, FeatureKind},
    table::Table,
};

/// The cells of one binding, one row per entity instance.
///
/// Row `i` holds the bound columns of the source row that supplied
/// instance `i`, in binding order.
#[derive(Debug, Clone)]
pub struct FeatureInput<'a> {
    width: usize,
    cells: Vec<&'a Value>,
}

impl<'a> FeatureInput<'a> {
    pub fn from_table(
        table: &'a Table,
        columns: &[String],
        source_rows: &[usize],
    ) -> Result<Self, RelGraphError> {
        let col_idx = columns
            .iter()
            .map(|c| table.require_column(c))
            .collect::<Result<Vec<_>, _>>()?;
        let mut cells = Vec::with_capacity(source_rows.len() * col_idx.len());
        for &row in source_rows {
            if row >= table.len() {
                return Err(RelGraphError::shape(format!(
                    "row {row} is outside table {} ({} rows)",
                    table.name,
                    table.len()
                )));
            }
            for &col in &col_idx {
                cells.push(table.cell(row, col));
            }
        }
        Ok(Self {
            width: col_idx.len(),
            cells,
        })
    }

    /// Single-column input from a slice of values.
    pub fn from_values(values: &'a [Value]) -> Self {
        Self {
            width: 1,
            cells: values.iter().collect(),
        }
    }

    pub fn len(&self) -> usize {
        if self.width == 0 {
            0
        } else {
            self.cells.len() / self.width
        }
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn columns(&self) -> usize {
        self.width
    }

    pub fn row(&self, row: usize) -> &[&'a Value] {
        &self.cells[row * self.width..(row + 1) * self.width]
    }

    /// First bound column of `row`.
    pub fn first(&self, row: usize) -> &'a Value {
        self.cells[row * self.width]
    }

    pub fn rows(&self) -> impl Iterator<Item = &[&'a Value]> + '_ {
        (0..self.len()).map(move |r| self.row(r))
    }
}

/// Frozen output of a fit phase.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EncoderState {
    Categorical(CategoricalState),
    MultiLabel(MultiLabelState),
    Numeric(NumericState),
    Ordinal(OrdinalState),
    Binary,
    HighDimFingerprint(FingerprintState),
    Text(TextState),
    Temporal(TemporalState),
}

impl EncoderState {
    pub fn kind(&self) -> FeatureKind {
        match self {
            EncoderState::Categorical(_) => FeatureKind::Categorical,
            EncoderState::MultiLabel(_) => FeatureKind::MultiLabel,
            EncoderState::Numeric(_) => FeatureKind::Numeric,
            EncoderState::Ordinal(_) => FeatureKind::Ordinal,
            EncoderState::Binary => FeatureKind::Binary,
            EncoderState::HighDimFingerprint(_) => FeatureKind::HighDimFingerprint,
            EncoderState::Text(_) => FeatureKind::Text,
            EncoderState::Temporal(_) => FeatureKind::Temporal,
        }
    }
}

/// One encoder implementation per feature kind.
pub trait FeatureEncoder: Send + Sync {
    fn kind(&self) -> FeatureKind;

    fn fit(
        &self,
        binding: &FeatureBinding,
        options: &EncoderOptions,
        input: &FeatureInput<'_>,
    ) -> Result<EncoderState, RelGraphError>;

    /// Output width implied by a fitted state.
    fn width(&self, state: &EncoderState) -> Result<usize, RelGraphError>;

    fn transform(
        &self,
        state: &EncoderState,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError>;
}

pub(crate) fn state_mismatch(expected: FeatureKind, state: &EncoderState) -> RelGraphError {
    RelGraphError::invalid_input(format!(
        "{} encoder received {} state",
        expected.as_str(),
        state.kind().as_str()
    ))
}

/// Numeric view of a cell: numbers, numeric strings and booleans.
pub(crate) fn as_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Maps feature kinds to encoder implementations.
#[derive(Clone)]
pub struct EncoderRegistry {
    encoders: AHashMap<FeatureKind, Arc<dyn FeatureEncoder>>,
}

impl std::fmt::Debug for EncoderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut kinds: Vec<_> = self.encoders.keys().map(|k| k.as_str()).collect();
        kinds.sort_unstable();
        f.debug_struct("EncoderRegistry").field("kinds", &kinds).finish()
    }
}

impl Default for EncoderRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

impl EncoderRegistry {
    pub fn empty() -> Self {
        Self {
            encoders: AHashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(CategoricalEncoder));
        registry.register(Arc::new(MultiLabelEncoder));
        registry.register(Arc::new(NumericEncoder));
        registry.register(Arc::new(OrdinalEncoder));
        registry.register(Arc::new(BinaryEncoder));
        registry.register(Arc::new(FingerprintEncoder));
        registry.register(Arc::new(TextEncoder));
        registry.register(Arc::new(TemporalEncoder));
        registry
    }

    /// Installs `encoder` for its kind, replacing any previous one.
    pub fn register(&mut self, encoder: Arc<dyn FeatureEncoder>) {
        self.encoders.insert(encoder.kind(), encoder);
    }

    pub fn get(&self, kind: FeatureKind) -> Result<&Arc<dyn FeatureEncoder>, RelGraphError> {
        self.encoders.get(&kind).ok_or_else(|| {
            RelGraphError::invalid_input(format!("no encoder registered for {}", kind.as_str()))
        })
    }
}

/// A feature binding together with its frozen encoder state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFeature {
    pub name: String,
    pub kind: FeatureKind,
    pub columns: Vec<String>,
    pub width: usize,
    pub state: EncoderState,
}

/// Column range of one feature inside an owner's feature matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureSlot {
    pub name: String,
    pub kind: FeatureKind,
    pub offset: usize,
    pub width: usize,
}

/// All feature blocks of one node or edge type, concatenated in declared order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureMatrix {
    pub owner: String,
    pub matrix: DenseMatrix,
    pub layout: Vec<FeatureSlot>,
}

impl FeatureMatrix {
    pub fn rows(&self) -> usize {
        self.matrix.rows()
    }

    pub fn width(&self) -> usize {
        self.matrix.cols()
    }

    pub fn slot(&self, feature: &str) -> Option<&FeatureSlot> {
        self.layout.iter().find(|s| s.name == feature)
    }

    /// The block of one feature, all rows.
    pub fn block(&self, feature: &str) -> Option<DenseMatrix> {
        self.slot(feature)
            .map(|slot| self.matrix.column_slice(slot.offset, slot.width))
    }

    /// Rows for the given instance indices, same layout.
    pub fn select_rows(&self, rows: &[usize]) -> FeatureMatrix {
        FeatureMatrix {
            owner: self.owner.clone(),
            matrix: self.matrix.select_rows(rows),
            layout: self.layout.clone(),
        }
    }
}

/// Frozen encoders of one owner, reusable on new batches.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedFeatureSet {
    pub owner: String,
    pub features: Vec<FittedFeature>,
}

impl FittedFeatureSet {
    pub fn width(&self) -> usize {
        self.features.iter().map(|f| f.width).sum()
    }

    pub fn layout(&self) -> Vec<FeatureSlot> {
        let mut offset = 0;
        self.features
            .iter()
            .map(|f| {
                let slot = FeatureSlot {
                    name: f.name.clone(),
                    kind: f.kind,
                    offset,
                    width: f.width,
                };
                offset += f.width;
                slot
            })
            .collect()
    }

    /// Encodes `source_rows` of `table` with the frozen state.
    pub fn transform(
        &self,
        registry: &EncoderRegistry,
        table: &Table,
        source_rows: &[usize],
    ) -> Result<FeatureMatrix, RelGraphError> {
        let mut blocks = Vec::with_capacity(self.features.len());
        for feature in &self.features {
            let input = FeatureInput::from_table(table, &feature.columns, source_rows)?;
            let block = registry.get(feature.kind)?.transform(&feature.state, &input)?;
            check_block(&self.owner, feature, &block, source_rows.len())?;
            blocks.push(block);
        }
        let refs: Vec<&DenseMatrix> = blocks.iter().collect();
        Ok(FeatureMatrix {
            owner: self.owner.clone(),
            matrix: DenseMatrix::hconcat(source_rows.len(), &refs)?,
            layout: self.layout(),
        })
    }

    pub(crate) fn hash_into(&self, hasher: &mut ContentHasher) {
        hasher.str(&self.owner);
        hasher.u64(self.features.len() as u64);
        for feature in &self.features {
            hasher.bytes(&serde_json::to_vec(feature).unwrap_or_default());
        }
    }
}

fn check_block(
    owner: &str,
    feature: &FittedFeature,
    block: &DenseMatrix,
    expected_rows: usize,
) -> Result<(), RelGraphError> {
    if block.rows() != expected_rows {
        return Err(RelGraphError::shape(format!(
            "{owner}.{}: block has {} rows, {owner} has {expected_rows} instances",
            feature.name,
            block.rows()
        )));
    }
    if block.cols() != feature.width {
        return Err(RelGraphError::shape(format!(
            "{owner}.{}: block has {} columns, fitted width is {}",
            feature.name,
            block.cols(),
            feature.width
        )));
    }
    Ok(())
}

/// Dispatches bindings to registered encoders.
#[derive(Debug, Clone, Default)]
pub struct FeatureEngine {
    registry: EncoderRegistry,
    options: EncoderOptions,
}

impl FeatureEngine {
    pub fn new(registry: EncoderRegistry, options: EncoderOptions) -> Self {
        Self { registry, options }
    }

    pub fn registry(&self) -> &EncoderRegistry {
        &self.registry
    }

    pub fn options(&self) -> &EncoderOptions {
        &self.options
    }

    pub fn fit(
        &self,
        binding: &FeatureBinding,
        input: &FeatureInput<'_>,
    ) -> Result<FittedFeature, RelGraphError> {
        let encoder = self.registry.get(binding.kind)?;
        let state = encoder.fit(binding, &self.options, input)?;
        let width = encoder.width(&state)?;
        Ok(FittedFeature {
            name: binding.name.clone(),
            kind: binding.kind,
            columns: binding.columns.clone(),
            width,
            state,
        })
    }

    pub fn transform(
        &self,
        fitted: &FittedFeature,
        input: &FeatureInput<'_>,
    ) -> Result<DenseMatrix, RelGraphError> {
        self.registry.get(fitted.kind)?.transform(&fitted.state, input)
    }

    /// Fits and encodes every binding of `owner`, in declared order.
    ///
    /// `source_rows[i]` is the table row of instance `i`; `instances` is the
    /// owner's instance count and every block must match it.
    pub fn encode_feature_set(
        &self,
        owner: &str,
        bindings: &[FeatureBinding],
        table: &Table,
        source_rows: &[usize],
        instances: usize,
    ) -> Result<(FittedFeatureSet, FeatureMatrix), RelGraphError> {
        let mut features = Vec::with_capacity(bindings.len());
        let mut blocks = Vec::with_capacity(bindings.len());
        for binding in bindings {
            let input = FeatureInput::from_table(table, &binding.columns, source_rows)?;
            let fitted = self
                .fit(binding, &input)
                .map_err(|e| annotate(owner, &binding.name, e))?;
            let block = self
                .transform(&fitted, &input)
                .map_err(|e| annotate(owner, &binding.name, e))?;
            check_block(owner, &fitted, &block, instances)?;
            debug!(
                owner,
                feature = %binding.name,
                kind = binding.kind.as_str(),
                width = fitted.width,
                "encoded feature"
            );
            features.push(fitted);
            blocks.push(block);
        }
        let refs: Vec<&DenseMatrix> = blocks.iter().collect();
        let set = FittedFeatureSet {
            owner: owner.to_string(),
            features,
        };
        let matrix = FeatureMatrix {
            owner: owner.to_string(),
            matrix: DenseMatrix::hconcat(instances, &refs)?,
            layout: set.layout(),
        };
        Ok((set, matrix))
    }
}

/// Prefixes an encoder error with the feature it came from.
fn annotate(owner: &str, feature: &str, err: RelGraphError) -> RelGraphError {
    let prefix = format!("{owner}.{feature}");
    match err {
        RelGraphError::ShapeMismatch(m) => RelGraphError::shape(format!("{prefix}: {m}")),
        RelGraphError::UnknownOrdinalValue(m) => {
            RelGraphError::unknown_ordinal(format!("{prefix}: {m}"))
        }
        RelGraphError::InvalidBinaryValue(m) => {
            RelGraphError::invalid_binary(format!("{prefix}: {m}"))
        }
        RelGraphError::InvalidNumericValue(m) => {
            RelGraphError::invalid_numeric(format!("{prefix}: {m}"))
        }
        RelGraphError::InvalidInput(m) => RelGraphError::invalid_input(format!("{prefix}: {m}")),
        other => other,
    }
}
