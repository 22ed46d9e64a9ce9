//! Build configuration.
//!
//! Every policy the build pipeline applies is chosen here rather than inferred
//! from the data: identifier ordering, duplicate handling, dangling edge
//! handling and the defaults for each feature encoder. All structures
//! deserialize from JSON with missing fields falling back to their defaults,
//! so the upstream orchestration layer can ship a partial document.

use serde::{Deserialize, Serialize};

use crate::errors::RelGraphError;

/// Order in which identifiers receive their integer index.
///
/// # Default Behavior
///
/// [`IndexOrder::Lexicographic`] sorts raw identifiers so the assignment is
/// independent of source row order. Two builds over the same set of
/// identifiers always agree, even if the reader shuffles rows.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOrder {
    #[default]
    Lexicographic,
    /// Order of first appearance in the source table.
    ///
    /// Deterministic only for a fixed row order.
    FirstSeen,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexOptions {
    pub order: IndexOrder,
    /// Fail when one identifier appears on rows whose other columns differ.
    ///
    /// **Default:** `true`
    ///
    /// When disabled the first row for an identifier wins and later rows
    /// are ignored.
    pub detect_conflicts: bool,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            order: IndexOrder::Lexicographic,
            detect_conflicts: true,
        }
    }
}

/// What to do with an edge row whose endpoint is not in the node index.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DanglingPolicy {
    #[default]
    Drop,
    Fail,
}

/// Handling of repeated `(source, target)` pairs within one edge type.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MultiEdgePolicy {
    #[default]
    Dedup,
    Allow,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EdgeOptions {
    pub dangling: DanglingPolicy,
    pub multi_edges: MultiEdgePolicy,
}

/// Pooling of token embeddings for text features.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TextPooling {
    #[default]
    Mean,
    Sum,
}

/// Reference point a temporal feature measures its delta from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TemporalReference {
    /// Earliest timestamp observed at fit time.
    #[default]
    Min,
    /// Latest timestamp observed at fit time.
    Max,
    /// A fixed unix timestamp in seconds.
    Fixed(i64),
}

/// Defaults shared by all encoders of one build.
///
/// Individual bindings override these through [`FeatureParams`].
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EncoderOptions {
    /// Seed for fingerprint projections and text embedding tables.
    pub seed: u64,
    pub fingerprint_width: usize,
    pub text_width: usize,
    pub text_pooling: TextPooling,
    /// Keep only the most frequent tokens; `None` keeps all of them.
    pub text_max_vocab: Option<usize>,
    pub multi_label_delimiter: String,
    pub temporal_reference: TemporalReference,
    /// Seconds per unit of temporal delta. The default expresses deltas in days.
    pub temporal_scale_seconds: f64,
    pub temporal_default_delta: f32,
}

impl Default for EncoderOptions {
    fn default() -> Self {
        Self {
            seed: 0x5EED,
            fingerprint_width: 64,
            text_width: 32,
            text_pooling: TextPooling::Mean,
            text_max_vocab: None,
            multi_label_delimiter: "|".to_string(),
            temporal_reference: TemporalReference::Min,
            temporal_scale_seconds: 86_400.0,
            temporal_default_delta: 0.0,
        }
    }
}

/// Per-binding encoder parameters. Unset fields inherit [`EncoderOptions`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Declared total order for ordinal features, lowest first.
    pub order: Vec<String>,
    /// Map values outside `order` to an extra bucket instead of failing.
    pub fallback_bucket: bool,
    /// Output width for fingerprint and text features.
    pub width: Option<usize>,
    /// Expected fingerprint input length; inferred from the first row if unset.
    pub input_dim: Option<usize>,
    pub seed: Option<u64>,
    pub pooling: Option<TextPooling>,
    pub max_vocab: Option<usize>,
    pub delimiter: Option<String>,
    pub reference: Option<TemporalReference>,
    pub scale_seconds: Option<f64>,
    pub default_delta: Option<f32>,
}

/// Configuration for one graph build.
///
/// # Examples
///
/// ```rust
/// use relgraph::{BuildConfig, DanglingPolicy, MultiEdgePolicy};
///
/// let cfg = BuildConfig::strict();
/// assert_eq!(cfg.edges.dangling, DanglingPolicy::Fail);
///
/// let cfg = BuildConfig::default().with_seed(7).allow_multi_edges();
/// assert_eq!(cfg.encoders.seed, 7);
/// assert_eq!(cfg.edges.multi_edges, MultiEdgePolicy::Allow);
/// ```
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BuildConfig {
    pub index: IndexOptions,
    pub edges: EdgeOptions,
    pub encoders: EncoderOptions,
    /// Run per-type stages on the rayon pool.
    ///
    /// **Default:** `true`. Results are identical either way.
    pub parallel: bool,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            index: IndexOptions::default(),
            edges: EdgeOptions::default(),
            encoders: EncoderOptions::default(),
            parallel: true,
        }
    }
}

impl BuildConfig {
    /// Dangling edges abort the build instead of being dropped.
    pub fn strict() -> Self {
        let mut cfg = Self::default();
        cfg.edges.dangling = DanglingPolicy::Fail;
        cfg
    }

    pub fn sequential() -> Self {
        Self {
            parallel: false,
            ..Self::default()
        }
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.encoders.seed = seed;
        self
    }

    pub fn allow_multi_edges(mut self) -> Self {
        self.edges.multi_edges = MultiEdgePolicy::Allow;
        self
    }

    pub fn from_json(text: &str) -> Result<Self, RelGraphError> {
        let cfg: Self = serde_json::from_str(text)
            .map_err(|e| RelGraphError::invalid_input(format!("build config: {e}")))?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn validate(&self) -> Result<(), RelGraphError> {
        if self.encoders.fingerprint_width == 0 {
            return Err(RelGraphError::invalid_input(
                "fingerprint_width must be positive",
            ));
        }
        if self.encoders.text_width == 0 {
            return Err(RelGraphError::invalid_input("text_width must be positive"));
        }
        if !(self.encoders.temporal_scale_seconds > 0.0) {
            return Err(RelGraphError::invalid_input(
                "temporal_scale_seconds must be positive",
            ));
        }
        if self.encoders.multi_label_delimiter.is_empty() {
            return Err(RelGraphError::invalid_input(
                "multi_label_delimiter must not be empty",
            ));
        }
        Ok(())
    }
}
