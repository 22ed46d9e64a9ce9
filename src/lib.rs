//! Relational tables to typed, temporal, feature-encoded graph snapshots.
//!
//! A build validates a [`SchemaDecl`] against the supplied [`TableSet`],
//! assigns dense indices to every node type, resolves edge tables into index
//! pairs, fits and applies feature encoders, attaches timestamps and freezes
//! the result into an immutable [`Graph`]. [`SubgraphExtractor`] then serves
//! bounded, deterministic multi-hop neighbourhoods of that snapshot.
//!
//! Run Criterion benchmarks with `cargo bench` to inspect reports under `target/criterion`.

pub mod assembler;
pub mod cache;
pub mod config;
pub mod edges;
pub mod encoding;
pub mod errors;
pub mod graph;
mod hashing;
pub mod index;
pub mod safety;
pub mod schema;
pub mod subgraph;
pub mod table;
pub mod temporal;

pub use crate::assembler::{
    BuildComponent, BuildDiagnostics, BuildFailure, BuildParts, BuildState, GraphBuild, assemble,
    build_graph,
};
pub use crate::config::{
    BuildConfig, DanglingPolicy, EdgeOptions, EncoderOptions, FeatureParams, IndexOptions,
    IndexOrder, MultiEdgePolicy, TemporalReference, TextPooling,
};
pub use crate::edges::EdgeIndex;
pub use crate::encoding::{
    DenseMatrix, EncoderRegistry, EncoderState, FeatureEncoder, FeatureEngine, FeatureMatrix,
    FittedFeatureSet,
};
pub use crate::errors::RelGraphError;
pub use crate::graph::{Graph, GraphMetadata, PointInTimeView};
pub use crate::index::IdentifierIndex;
pub use crate::safety::{SafetyError, SafetyReport, run_safety_checks, run_strict_safety_checks};
pub use crate::schema::{
    EdgeType, FeatureBinding, FeatureKind, FeatureSpec, NodeType, SchemaDecl, ValidatedSchema,
};
pub use crate::subgraph::{
    CancelToken, Direction, ExtractOptions, SeedRef, Subgraph, SubgraphExtractor, SubgraphQuery,
    structural_signature,
};
pub use crate::table::{Table, TableSet};
pub use crate::temporal::{TemporalAttributes, Timestamp, VisibilityMask};
