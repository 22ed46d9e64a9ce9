//! Node, edge and feature declarations and their validation.

use std::sync::Arc;

use ahash::AHashSet;
use serde::{Deserialize, Serialize};

use crate::{
    config::FeatureParams,
    errors::RelGraphError,
    hashing::ContentHasher,
    table::{Table, TableSet},
};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NodeType {
    pub name: String,
    pub id_column: String,
    pub source: String,
    #[serde(default)]
    pub timestamp_column: Option<String>,
}

impl NodeType {
    pub fn new(name: &str, id_column: &str, source: &str) -> Self {
        Self {
            name: name.to_string(),
            id_column: id_column.to_string(),
            source: source.to_string(),
            timestamp_column: None,
        }
    }

    pub fn with_timestamp(mut self, column: &str) -> Self {
        self.timestamp_column = Some(column.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EdgeType {
    pub name: String,
    pub source_type: String,
    pub target_type: String,
    pub relation: String,
    pub source: String,
    pub source_column: String,
    pub target_column: String,
    #[serde(default)]
    pub timestamp_column: Option<String>,
}

impl EdgeType {
    /// Declares `source_type -[relation]-> target_type`. The backing table
    /// defaults to one named after the edge type, with the endpoint columns
    /// named after the two node types.
    pub fn new(name: &str, source_type: &str, relation: &str, target_type: &str) -> Self {
        Self {
            name: name.to_string(),
            source_type: source_type.to_string(),
            target_type: target_type.to_string(),
            relation: relation.to_string(),
            source: name.to_string(),
            source_column: source_type.to_string(),
            target_column: target_type.to_string(),
            timestamp_column: None,
        }
    }

    pub fn from_table(mut self, table: &str, source_column: &str, target_column: &str) -> Self {
        self.source = table.to_string();
        self.source_column = source_column.to_string();
        self.target_column = target_column.to_string();
        self
    }

    pub fn with_timestamp(mut self, column: &str) -> Self {
        self.timestamp_column = Some(column.to_string());
        self
    }

    /// Allowlists name an edge type either by its name or its relation label.
    pub fn matches(&self, name_or_relation: &str) -> bool {
        self.name == name_or_relation || self.relation == name_or_relation
    }
}

/// Closed set of column semantics. Each kind has exactly one encoder.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum FeatureKind {
    Categorical,
    MultiLabel,
    Numeric,
    Ordinal,
    Binary,
    HighDimFingerprint,
    Text,
    Temporal,
}

impl FeatureKind {
    pub const ALL: [FeatureKind; 8] = [
        FeatureKind::Categorical,
        FeatureKind::MultiLabel,
        FeatureKind::Numeric,
        FeatureKind::Ordinal,
        FeatureKind::Binary,
        FeatureKind::HighDimFingerprint,
        FeatureKind::Text,
        FeatureKind::Temporal,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            FeatureKind::Categorical => "categorical",
            FeatureKind::MultiLabel => "multi_label",
            FeatureKind::Numeric => "numeric",
            FeatureKind::Ordinal => "ordinal",
            FeatureKind::Binary => "binary",
            FeatureKind::HighDimFingerprint => "high_dim_fingerprint",
            FeatureKind::Text => "text",
            FeatureKind::Temporal => "temporal",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureBinding {
    pub name: String,
    pub kind: FeatureKind,
    pub columns: Vec<String>,
    #[serde(default)]
    pub params: FeatureParams,
}

impl FeatureBinding {
    pub fn new(name: &str, kind: FeatureKind, columns: &[&str]) -> Self {
        Self {
            name: name.to_string(),
            kind,
            columns: columns.iter().map(|c| c.to_string()).collect(),
            params: FeatureParams::default(),
        }
    }

    pub fn with_params(mut self, params: FeatureParams) -> Self {
        self.params = params;
        self
    }
}

/// Ordered feature bindings for one node or edge type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FeatureSpec {
    pub owner: String,
    pub features: Vec<FeatureBinding>,
}

/// Unvalidated schema as authored upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SchemaDecl {
    pub node_types: Vec<NodeType>,
    #[serde(default)]
    pub edge_types: Vec<EdgeType>,
    #[serde(default)]
    pub features: Vec<FeatureSpec>,
}

impl SchemaDecl {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_json(text: &str) -> Result<Self, RelGraphError> {
        serde_json::from_str(text).map_err(|e| RelGraphError::schema(e.to_string()))
    }

    pub fn node(mut self, node_type: NodeType) -> Self {
        self.node_types.push(node_type);
        self
    }

    pub fn edge(mut self, edge_type: EdgeType) -> Self {
        self.edge_types.push(edge_type);
        self
    }

    /// Appends a binding to `owner`'s feature list, keeping declaration order.
    pub fn feature(mut self, owner: &str, binding: FeatureBinding) -> Self {
        match self.features.iter_mut().find(|spec| spec.owner == owner) {
            Some(spec) => spec.features.push(binding),
            None => self.features.push(FeatureSpec {
                owner: owner.to_string(),
                features: vec![binding],
            }),
        }
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OwnerKind {
    Node,
    Edge,
}

/// Position of a node or edge type within the validated schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OwnerRef {
    pub kind: OwnerKind,
    pub position: usize,
}

/// Schema that passed validation. Frozen; shared by every stage of a build.
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedSchema {
    node_types: Vec<NodeType>,
    edge_types: Vec<EdgeType>,
    node_features: Vec<Vec<FeatureBinding>>,
    edge_features: Vec<Vec<FeatureBinding>>,
    schema_hash: String,
}

impl ValidatedSchema {
    pub fn node_types(&self) -> &[NodeType] {
        &self.node_types
    }

    pub fn edge_types(&self) -> &[EdgeType] {
        &self.edge_types
    }

    pub fn node_position(&self, name: &str) -> Option<usize> {
        self.node_types.iter().position(|n| n.name == name)
    }

    pub fn edge_position(&self, name: &str) -> Option<usize> {
        self.edge_types.iter().position(|e| e.name == name)
    }

    pub fn node_type(&self, name: &str) -> Option<&NodeType> {
        self.node_types.iter().find(|n| n.name == name)
    }

    pub fn edge_type(&self, name: &str) -> Option<&EdgeType> {
        self.edge_types.iter().find(|e| e.name == name)
    }

    pub fn owner(&self, name: &str) -> Option<OwnerRef> {
        if let Some(position) = self.node_position(name) {
            return Some(OwnerRef {
                kind: OwnerKind::Node,
                position,
            });
        }
        self.edge_position(name).map(|position| OwnerRef {
            kind: OwnerKind::Edge,
            position,
        })
    }

    pub fn owner_name(&self, owner: OwnerRef) -> &str {
        match owner.kind {
            OwnerKind::Node => &self.node_types[owner.position].name,
            OwnerKind::Edge => &self.edge_types[owner.position].name,
        }
    }

    pub fn owner_source(&self, owner: OwnerRef) -> &str {
        match owner.kind {
            OwnerKind::Node => &self.node_types[owner.position].source,
            OwnerKind::Edge => &self.edge_types[owner.position].source,
        }
    }

    pub fn owner_timestamp_column(&self, owner: OwnerRef) -> Option<&str> {
        match owner.kind {
            OwnerKind::Node => self.node_types[owner.position].timestamp_column.as_deref(),
            OwnerKind::Edge => self.edge_types[owner.position].timestamp_column.as_deref(),
        }
    }

    pub fn features(&self, owner: OwnerRef) -> &[FeatureBinding] {
        match owner.kind {
            OwnerKind::Node => &self.node_features[owner.position],
            OwnerKind::Edge => &self.edge_features[owner.position],
        }
    }

    /// Every node type followed by every edge type, in declaration order.
    pub fn owners(&self) -> Vec<OwnerRef> {
        let nodes = (0..self.node_types.len()).map(|position| OwnerRef {
            kind: OwnerKind::Node,
            position,
        });
        let edges = (0..self.edge_types.len()).map(|position| OwnerRef {
            kind: OwnerKind::Edge,
            position,
        });
        nodes.chain(edges).collect()
    }

    /// SHA-256 of the canonical declaration (types and bindings in order).
    pub fn schema_hash(&self) -> &str {
        &self.schema_hash
    }
}

/// Validates `decl` against the tables that will feed the build.
///
/// Pure: nothing is built and nothing in `sources` is read beyond column
/// names. Owners without a feature spec get an empty binding list.
pub fn validate(
    decl: &SchemaDecl,
    sources: &TableSet,
) -> Result<Arc<ValidatedSchema>, RelGraphError> {
    let mut node_names = AHashSet::new();
    for node in &decl.node_types {
        require_name("node type", &node.name)?;
        if !node_names.insert(node.name.as_str()) {
            return Err(RelGraphError::schema(format!(
                "node type {} declared twice",
                node.name
            )));
        }
        let table = source_table(sources, &node.name, &node.source)?;
        require_column(table, &node.name, "identifier", &node.id_column)?;
        if let Some(ts) = node.timestamp_column.as_deref() {
            require_column(table, &node.name, "timestamp", ts)?;
        }
    }

    let mut edge_names = AHashSet::new();
    for edge in &decl.edge_types {
        require_name("edge type", &edge.name)?;
        if node_names.contains(edge.name.as_str()) {
            return Err(RelGraphError::schema(format!(
                "edge type {} shares its name with a node type",
                edge.name
            )));
        }
        if !edge_names.insert(edge.name.as_str()) {
            return Err(RelGraphError::schema(format!(
                "edge type {} declared twice",
                edge.name
            )));
        }
        for endpoint in [&edge.source_type, &edge.target_type] {
            if !node_names.contains(endpoint.as_str()) {
                return Err(RelGraphError::schema(format!(
                    "edge type {} references undeclared node type {endpoint}",
                    edge.name
                )));
            }
        }
        let table = source_table(sources, &edge.name, &edge.source)?;
        require_column(table, &edge.name, "source", &edge.source_column)?;
        require_column(table, &edge.name, "target", &edge.target_column)?;
        if let Some(ts) = edge.timestamp_column.as_deref() {
            require_column(table, &edge.name, "timestamp", ts)?;
        }
    }

    let mut node_features = vec![Vec::new(); decl.node_types.len()];
    let mut edge_features = vec![Vec::new(); decl.edge_types.len()];
    let mut seen_owners = AHashSet::new();
    for spec in &decl.features {
        let node_pos = decl.node_types.iter().position(|n| n.name == spec.owner);
        let edge_pos = decl.edge_types.iter().position(|e| e.name == spec.owner);
        let (slot, source) = if let Some(pos) = node_pos {
            (&mut node_features[pos], decl.node_types[pos].source.as_str())
        } else if let Some(pos) = edge_pos {
            (&mut edge_features[pos], decl.edge_types[pos].source.as_str())
        } else {
            return Err(RelGraphError::schema(format!(
                "feature spec references undeclared type {}",
                spec.owner
            )));
        };
        if !seen_owners.insert(spec.owner.as_str()) {
            return Err(RelGraphError::schema(format!(
                "feature spec for {} declared twice",
                spec.owner
            )));
        }
        let table = source_table(sources, &spec.owner, source)?;
        let mut feature_names = AHashSet::new();
        for binding in &spec.features {
            validate_binding(&spec.owner, binding, table)?;
            if !feature_names.insert(binding.name.as_str()) {
                return Err(RelGraphError::schema(format!(
                    "feature {} declared twice on {}",
                    binding.name, spec.owner
                )));
            }
        }
        *slot = spec.features.clone();
    }

    let schema_hash = hash_schema(decl, &node_features, &edge_features);
    Ok(Arc::new(ValidatedSchema {
        node_types: decl.node_types.clone(),
        edge_types: decl.edge_types.clone(),
        node_features,
        edge_features,
        schema_hash,
    }))
}

fn validate_binding(
    owner: &str,
    binding: &FeatureBinding,
    table: &Table,
) -> Result<(), RelGraphError> {
    require_name("feature", &binding.name)?;
    if binding.columns.is_empty() {
        return Err(RelGraphError::schema(format!(
            "feature {}.{} binds no columns",
            owner, binding.name
        )));
    }
    for column in &binding.columns {
        require_column(table, owner, &format!("feature {}", binding.name), column)?;
    }
    if binding.kind == FeatureKind::Ordinal {
        let order = &binding.params.order;
        if order.is_empty() {
            return Err(RelGraphError::schema(format!(
                "ordinal feature {}.{} declares no order",
                owner, binding.name
            )));
        }
        let unique: AHashSet<&str> = order.iter().map(|s| s.as_str()).collect();
        if unique.len() != order.len() {
            return Err(RelGraphError::schema(format!(
                "ordinal feature {}.{} repeats a value in its order",
                owner, binding.name
            )));
        }
    }
    Ok(())
}

fn require_name(what: &str, name: &str) -> Result<(), RelGraphError> {
    if name.trim().is_empty() {
        return Err(RelGraphError::schema(format!("{what} name must be set")));
    }
    Ok(())
}

fn source_table<'a>(
    sources: &'a TableSet,
    owner: &str,
    source: &str,
) -> Result<&'a Table, RelGraphError> {
    sources.get(source).ok_or_else(|| {
        RelGraphError::schema(format!("{owner} reads missing source table {source}"))
    })
}

fn require_column(
    table: &Table,
    owner: &str,
    role: &str,
    column: &str,
) -> Result<(), RelGraphError> {
    if table.has_column(column) {
        Ok(())
    } else {
        Err(RelGraphError::schema(format!(
            "{owner}: {role} column {column} is absent from table {}",
            table.name
        )))
    }
}

fn hash_schema(
    decl: &SchemaDecl,
    node_features: &[Vec<FeatureBinding>],
    edge_features: &[Vec<FeatureBinding>],
) -> String {
    let mut hasher = ContentHasher::new("relgraph.schema.v1");
    // Serializing owned structs with derived Serialize keeps field order fixed.
    for node in &decl.node_types {
        hasher.bytes(&serde_json::to_vec(node).unwrap_or_default());
    }
    for edge in &decl.edge_types {
        hasher.bytes(&serde_json::to_vec(edge).unwrap_or_default());
    }
    for bindings in node_features.iter().chain(edge_features) {
        hasher.u64(bindings.len() as u64);
        for binding in bindings {
            hasher.bytes(&serde_json::to_vec(binding).unwrap_or_default());
        }
    }
    hasher.finish()
}
