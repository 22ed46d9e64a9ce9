//! Build orchestration and snapshot assembly.
//!
//! [`GraphBuild`] drives one build through
//! `Unbuilt -> Validating -> Building -> Ready`, or into `Failed` from either
//! working state. Per-type work inside a stage runs on the rayon pool; the
//! stages themselves are barriers. [`assemble`] is the last barrier: it only
//! checks that every per-type result is present and consistent, hashes, and
//! freezes the result into a [`Graph`].

use std::{fmt, sync::Arc};

use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::{
    config::BuildConfig,
    edges::{self, EdgeIndex},
    encoding::{EncoderRegistry, FeatureEngine, FeatureMatrix, FittedFeatureSet},
    errors::RelGraphError,
    graph::{EdgeTable, Graph, GraphMetadata, NodeTable, TypeCount},
    hashing::ContentHasher,
    index::{self, IdentifierIndex},
    schema::{self, OwnerKind, OwnerRef, SchemaDecl, ValidatedSchema},
    table::TableSet,
    temporal::{self, TemporalAttributes},
};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildState {
    Unbuilt,
    Validating,
    Building,
    Ready,
    Failed,
}

impl BuildState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, BuildState::Ready | BuildState::Failed)
    }
}

/// Pipeline component a failure is attributed to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BuildComponent {
    SchemaRegistry,
    IndexBuilder,
    EdgeResolver,
    FeatureEncoding,
    TemporalIndex,
    GraphAssembler,
}

impl fmt::Display for BuildComponent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            BuildComponent::SchemaRegistry => "schema registry",
            BuildComponent::IndexBuilder => "index builder",
            BuildComponent::EdgeResolver => "edge resolver",
            BuildComponent::FeatureEncoding => "feature encoding",
            BuildComponent::TemporalIndex => "temporal index",
            BuildComponent::GraphAssembler => "graph assembler",
        };
        f.write_str(name)
    }
}

/// What a build got through before it stopped.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct BuildDiagnostics {
    pub completed: Vec<BuildComponent>,
    pub node_counts: Vec<TypeCount>,
    pub edge_counts: Vec<TypeCount>,
    pub skipped_node_rows: usize,
    pub dropped_edge_rows: usize,
    pub duplicate_edge_rows: usize,
}

#[derive(Debug, Clone)]
pub struct BuildFailure {
    pub component: BuildComponent,
    pub error: RelGraphError,
    pub diagnostics: BuildDiagnostics,
}

impl fmt::Display for BuildFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} failed: {}", self.component, self.error)
    }
}

impl std::error::Error for BuildFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}

/// Per-type results handed to [`assemble`], each in schema declaration order.
#[derive(Debug, Clone, Default)]
pub struct BuildParts {
    pub node_indices: Vec<IdentifierIndex>,
    pub edge_indices: Vec<EdgeIndex>,
    pub node_features: Vec<(FittedFeatureSet, FeatureMatrix)>,
    pub edge_features: Vec<(FittedFeatureSet, FeatureMatrix)>,
    pub node_temporal: Vec<TemporalAttributes>,
    pub edge_temporal: Vec<TemporalAttributes>,
}

/// One build, from schema declaration to snapshot. Single use.
#[derive(Debug)]
pub struct GraphBuild {
    decl: SchemaDecl,
    config: BuildConfig,
    registry: EncoderRegistry,
    state: BuildState,
    diagnostics: BuildDiagnostics,
    failure: Option<BuildFailure>,
}

impl GraphBuild {
    pub fn new(decl: SchemaDecl, config: BuildConfig) -> Self {
        Self {
            decl,
            config,
            registry: EncoderRegistry::with_defaults(),
            state: BuildState::Unbuilt,
            diagnostics: BuildDiagnostics::default(),
            failure: None,
        }
    }

    pub fn with_registry(mut self, registry: EncoderRegistry) -> Self {
        self.registry = registry;
        self
    }

    pub fn state(&self) -> BuildState {
        self.state
    }

    pub fn diagnostics(&self) -> &BuildDiagnostics {
        &self.diagnostics
    }

    pub fn failure(&self) -> Option<&BuildFailure> {
        self.failure.as_ref()
    }

    /// Runs the whole pipeline over `tables`.
    ///
    /// Only valid from `Unbuilt`; a finished or failed build is never reused.
    pub fn run(&mut self, tables: &TableSet) -> Result<Arc<Graph>, BuildFailure> {
        if self.state != BuildState::Unbuilt {
            return Err(BuildFailure {
                component: BuildComponent::GraphAssembler,
                error: RelGraphError::assembly(format!(
                    "build is {:?}; start a new GraphBuild",
                    self.state
                )),
                diagnostics: self.diagnostics.clone(),
            });
        }

        self.state = BuildState::Validating;
        let schema = match self
            .config
            .validate()
            .and_then(|_| schema::validate(&self.decl, tables))
        {
            Ok(schema) => schema,
            Err(err) => return Err(self.fail(BuildComponent::SchemaRegistry, err)),
        };
        self.diagnostics.completed.push(BuildComponent::SchemaRegistry);
        debug!(schema_hash = schema.schema_hash(), "schema validated");

        self.state = BuildState::Building;
        match self.build(&schema, tables) {
            Ok(graph) => {
                self.state = BuildState::Ready;
                self.diagnostics.completed.push(BuildComponent::GraphAssembler);
                info!(snapshot = %graph.snapshot_id(), "graph ready");
                Ok(Arc::new(graph))
            }
            Err((component, err)) => Err(self.fail(component, err)),
        }
    }

    fn fail(&mut self, component: BuildComponent, error: RelGraphError) -> BuildFailure {
        warn!(%component, %error, "build failed");
        self.state = BuildState::Failed;
        let failure = BuildFailure {
            component,
            error,
            diagnostics: self.diagnostics.clone(),
        };
        self.failure = Some(failure.clone());
        failure
    }

    fn build(
        &mut self,
        schema: &Arc<ValidatedSchema>,
        tables: &TableSet,
    ) -> Result<Graph, (BuildComponent, RelGraphError)> {
        let parallel = self.config.parallel;

        let node_types = schema.node_types();
        let node_indices = run_stage(parallel, node_types.len(), |i| {
            let node_type = &node_types[i];
            index::build(node_type, tables.require(&node_type.source)?, &self.config.index)
        })
        .map_err(|e| (BuildComponent::IndexBuilder, e))?;
        self.diagnostics.completed.push(BuildComponent::IndexBuilder);
        self.diagnostics.skipped_node_rows = node_indices.iter().map(|i| i.skipped_rows()).sum();
        self.diagnostics.node_counts = node_types
            .iter()
            .zip(&node_indices)
            .map(|(t, i)| TypeCount {
                name: t.name.clone(),
                count: i.len(),
                feature_width: 0,
            })
            .collect();

        let edge_types = schema.edge_types();
        let edge_indices = run_stage(parallel, edge_types.len(), |i| {
            let edge_type = &edge_types[i];
            let src = lookup_index(schema, &node_indices, &edge_type.source_type)?;
            let dst = lookup_index(schema, &node_indices, &edge_type.target_type)?;
            edges::resolve(
                edge_type,
                tables.require(&edge_type.source)?,
                src,
                dst,
                &self.config.edges,
            )
        })
        .map_err(|e| (BuildComponent::EdgeResolver, e))?;
        self.diagnostics.completed.push(BuildComponent::EdgeResolver);
        self.diagnostics.dropped_edge_rows = edge_indices.iter().map(|e| e.dropped_rows()).sum();
        self.diagnostics.duplicate_edge_rows =
            edge_indices.iter().map(|e| e.duplicate_rows()).sum();
        self.diagnostics.edge_counts = edge_types
            .iter()
            .zip(&edge_indices)
            .map(|(t, e)| TypeCount {
                name: t.name.clone(),
                count: e.len(),
                feature_width: 0,
            })
            .collect();

        let owners = schema.owners();
        let source_rows = |owner: OwnerRef| owner_rows(&node_indices, &edge_indices, owner);

        let engine = FeatureEngine::new(self.registry.clone(), self.config.encoders.clone());
        let mut features = run_stage(parallel, owners.len(), |i| {
            let owner = owners[i];
            let rows = source_rows(owner);
            engine.encode_feature_set(
                schema.owner_name(owner),
                schema.features(owner),
                tables.require(schema.owner_source(owner))?,
                rows,
                rows.len(),
            )
        })
        .map_err(|e| (BuildComponent::FeatureEncoding, e))?;
        self.diagnostics.completed.push(BuildComponent::FeatureEncoding);

        let mut temporal = run_stage(parallel, owners.len(), |i| {
            let owner = owners[i];
            let name = schema.owner_name(owner);
            let rows = source_rows(owner);
            match schema.owner_timestamp_column(owner) {
                Some(column) => temporal::attach(
                    name,
                    tables.require(schema.owner_source(owner))?,
                    column,
                    rows,
                ),
                None => Ok(TemporalAttributes::untimed(name, rows.len())),
            }
        })
        .map_err(|e| (BuildComponent::TemporalIndex, e))?;
        self.diagnostics.completed.push(BuildComponent::TemporalIndex);

        let edge_features = features.split_off(node_types.len());
        let edge_temporal = temporal.split_off(node_types.len());
        let parts = BuildParts {
            node_indices,
            edge_indices,
            node_features: features,
            edge_features,
            node_temporal: temporal,
            edge_temporal,
        };
        assemble(
            Arc::clone(schema),
            self.registry.clone(),
            parts,
            chrono::Utc::now().timestamp(),
        )
        .map_err(|e| (BuildComponent::GraphAssembler, e))
    }
}

/// Builds a snapshot in one call with the default encoder registry.
pub fn build_graph(
    decl: SchemaDecl,
    tables: &TableSet,
    config: BuildConfig,
) -> Result<Arc<Graph>, BuildFailure> {
    GraphBuild::new(decl, config).run(tables)
}

/// Runs `f` for every type position, on the rayon pool when `parallel`.
///
/// Errors are reported for the lowest failing position so the outcome does
/// not depend on scheduling.
fn run_stage<T, F>(parallel: bool, len: usize, f: F) -> Result<Vec<T>, RelGraphError>
where
    T: Send,
    F: Fn(usize) -> Result<T, RelGraphError> + Sync + Send,
{
    let results: Vec<Result<T, RelGraphError>> = if parallel {
        (0..len).into_par_iter().map(&f).collect()
    } else {
        (0..len).map(&f).collect()
    };
    results.into_iter().collect()
}

fn owner_rows<'a>(
    nodes: &'a [IdentifierIndex],
    edges: &'a [EdgeIndex],
    owner: OwnerRef,
) -> &'a [usize] {
    match owner.kind {
        OwnerKind::Node => nodes[owner.position].source_rows(),
        OwnerKind::Edge => edges[owner.position].source_rows(),
    }
}

fn lookup_index<'a>(
    schema: &ValidatedSchema,
    indices: &'a [IdentifierIndex],
    node_type: &str,
) -> Result<&'a IdentifierIndex, RelGraphError> {
    schema
        .node_position(node_type)
        .and_then(|p| indices.get(p))
        .ok_or_else(|| RelGraphError::assembly(format!("no index for node type {node_type}")))
}

/// Combines per-type results into an immutable snapshot.
///
/// Fails with `AssemblyError` when a result set is missing, belongs to the
/// wrong type, or disagrees in row count with its index.
pub fn assemble(
    schema: Arc<ValidatedSchema>,
    registry: EncoderRegistry,
    parts: BuildParts,
    built_at: i64,
) -> Result<Graph, RelGraphError> {
    let node_types = schema.node_types();
    let edge_types = schema.edge_types();
    expect_len("node index", parts.node_indices.len(), node_types.len())?;
    expect_len("node feature", parts.node_features.len(), node_types.len())?;
    expect_len("node temporal", parts.node_temporal.len(), node_types.len())?;
    expect_len("edge index", parts.edge_indices.len(), edge_types.len())?;
    expect_len("edge feature", parts.edge_features.len(), edge_types.len())?;
    expect_len("edge temporal", parts.edge_temporal.len(), edge_types.len())?;

    let mut nodes = Vec::with_capacity(node_types.len());
    for (((node_type, index), (encoders, features)), temporal) in node_types
        .iter()
        .zip(parts.node_indices)
        .zip(parts.node_features)
        .zip(parts.node_temporal)
    {
        let name = node_type.name.as_str();
        expect_owner(name, index.node_type())?;
        expect_owner(name, &features.owner)?;
        expect_owner(name, &encoders.owner)?;
        expect_owner(name, temporal.owner())?;
        expect_rows(name, "feature", features.rows(), index.len())?;
        expect_rows(name, "temporal", temporal.len(), index.len())?;
        nodes.push(NodeTable {
            index,
            features,
            encoders,
            temporal,
        });
    }

    let mut edges = Vec::with_capacity(edge_types.len());
    for (((edge_type, index), (encoders, features)), temporal) in edge_types
        .iter()
        .zip(parts.edge_indices)
        .zip(parts.edge_features)
        .zip(parts.edge_temporal)
    {
        let name = edge_type.name.as_str();
        expect_owner(name, index.edge_type())?;
        expect_owner(name, &features.owner)?;
        expect_owner(name, &encoders.owner)?;
        expect_owner(name, temporal.owner())?;
        expect_rows(name, "feature", features.rows(), index.len())?;
        expect_rows(name, "temporal", temporal.len(), index.len())?;
        let src_len = schema
            .node_position(&edge_type.source_type)
            .map_or(0, |p| nodes[p].len());
        let dst_len = schema
            .node_position(&edge_type.target_type)
            .map_or(0, |p| nodes[p].len());
        if let Some((pos, (s, t))) = index
            .pairs()
            .iter()
            .enumerate()
            .find(|(_, (s, t))| *s >= src_len || *t >= dst_len)
        {
            return Err(RelGraphError::assembly(format!(
                "{name} edge {pos} ({s}, {t}) is outside node ranges ({src_len}, {dst_len})"
            )));
        }
        edges.push(EdgeTable {
            index,
            features,
            encoders,
            temporal,
        });
    }

    let content_hash = content_hash(&schema, &nodes, &edges);
    let snapshot_id = snapshot_id(&content_hash, &nodes, &edges);
    let metadata = GraphMetadata {
        schema_hash: schema.schema_hash().to_string(),
        content_hash,
        snapshot_id,
        built_at,
        node_counts: node_types
            .iter()
            .zip(&nodes)
            .map(|(t, n)| TypeCount {
                name: t.name.clone(),
                count: n.len(),
                feature_width: n.features.width(),
            })
            .collect(),
        edge_counts: edge_types
            .iter()
            .zip(&edges)
            .map(|(t, e)| TypeCount {
                name: t.name.clone(),
                count: e.len(),
                feature_width: e.features.width(),
            })
            .collect(),
    };
    Ok(Graph {
        schema,
        registry,
        nodes,
        edges,
        metadata,
    })
}

fn expect_len(what: &str, got: usize, expected: usize) -> Result<(), RelGraphError> {
    if got != expected {
        return Err(RelGraphError::assembly(format!(
            "{expected} {what} results expected, {got} supplied"
        )));
    }
    Ok(())
}

fn expect_owner(expected: &str, got: &str) -> Result<(), RelGraphError> {
    if expected != got {
        return Err(RelGraphError::assembly(format!(
            "result for {got} supplied in the slot of {expected}"
        )));
    }
    Ok(())
}

fn expect_rows(owner: &str, what: &str, got: usize, expected: usize) -> Result<(), RelGraphError> {
    if got != expected {
        return Err(RelGraphError::assembly(format!(
            "{owner} has {expected} instances but {got} {what} rows"
        )));
    }
    Ok(())
}

fn content_hash(schema: &ValidatedSchema, nodes: &[NodeTable], edges: &[EdgeTable]) -> String {
    let mut hasher = ContentHasher::new("relgraph.content.v1");
    hasher.str(schema.schema_hash());
    for node in nodes {
        node.encoders.hash_into(&mut hasher);
    }
    for edge in edges {
        edge.encoders.hash_into(&mut hasher);
    }
    hasher.finish()
}

fn snapshot_id(content_hash: &str, nodes: &[NodeTable], edges: &[EdgeTable]) -> String {
    let mut hasher = ContentHasher::new("relgraph.snapshot.v1");
    hasher.str(content_hash);
    for node in nodes {
        hasher.u64(node.len() as u64);
        for id in node.index.identifiers() {
            hasher.str(id);
        }
        hasher.f32s(node.features.matrix.as_slice());
        hash_temporal(&mut hasher, &node.temporal);
    }
    for edge in edges {
        hasher.u64(edge.len() as u64);
        for &(s, t) in edge.index.pairs() {
            hasher.u64(s as u64);
            hasher.u64(t as u64);
        }
        hasher.f32s(edge.features.matrix.as_slice());
        hash_temporal(&mut hasher, &edge.temporal);
    }
    hasher.finish()
}

fn hash_temporal(hasher: &mut ContentHasher, temporal: &TemporalAttributes) {
    for value in temporal.values() {
        match value {
            Some(ts) => {
                hasher.u64(1);
                hasher.u64(*ts as u64);
            }
            None => hasher.u64(0),
        }
    }
}
