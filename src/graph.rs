//! The immutable graph snapshot produced by a build.
//!
//! A [`Graph`] is only ever created by the assembler and exposes no `&mut`
//! API. Share it as `Arc<Graph>`: subgraph extraction and point-in-time
//! views read it concurrently without locks.

use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::{
    edges::EdgeIndex,
    encoding::{EncoderRegistry, FeatureMatrix, FittedFeatureSet},
    errors::RelGraphError,
    index::IdentifierIndex,
    schema::ValidatedSchema,
    table::Table,
    temporal::{TemporalAttributes, Timestamp, VisibilityMask},
};

/// Everything built for one node type.
#[derive(Debug, Clone, PartialEq)]
pub struct NodeTable {
    pub index: IdentifierIndex,
    pub features: FeatureMatrix,
    pub encoders: FittedFeatureSet,
    pub temporal: TemporalAttributes,
}

impl NodeTable {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Everything built for one edge type.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeTable {
    pub index: EdgeIndex,
    /// Zero columns when the edge type declares no features.
    pub features: FeatureMatrix,
    pub encoders: FittedFeatureSet,
    pub temporal: TemporalAttributes,
}

impl EdgeTable {
    pub fn len(&self) -> usize {
        self.index.len()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TypeCount {
    pub name: String,
    pub count: usize,
    pub feature_width: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GraphMetadata {
    pub schema_hash: String,
    /// SHA-256 over the schema and every frozen encoder state.
    pub content_hash: String,
    /// SHA-256 over the content hash and every index, edge and feature array.
    pub snapshot_id: String,
    /// Unix seconds at assembly.
    pub built_at: i64,
    pub node_counts: Vec<TypeCount>,
    pub edge_counts: Vec<TypeCount>,
}

#[derive(Debug)]
pub struct Graph {
    pub(crate) schema: Arc<ValidatedSchema>,
    pub(crate) registry: EncoderRegistry,
    pub(crate) nodes: Vec<NodeTable>,
    pub(crate) edges: Vec<EdgeTable>,
    pub(crate) metadata: GraphMetadata,
}

impl Graph {
    pub fn schema(&self) -> &ValidatedSchema {
        &self.schema
    }

    pub fn metadata(&self) -> &GraphMetadata {
        &self.metadata
    }

    pub fn snapshot_id(&self) -> &str {
        &self.metadata.snapshot_id
    }

    pub fn node_tables(&self) -> &[NodeTable] {
        &self.nodes
    }

    pub fn edge_tables(&self) -> &[EdgeTable] {
        &self.edges
    }

    pub fn node(&self, node_type: &str) -> Option<&NodeTable> {
        self.schema.node_position(node_type).map(|p| &self.nodes[p])
    }

    pub fn edge(&self, edge_type: &str) -> Option<&EdgeTable> {
        self.schema.edge_position(edge_type).map(|p| &self.edges[p])
    }

    pub fn node_count(&self, node_type: &str) -> Option<usize> {
        self.node(node_type).map(NodeTable::len)
    }

    pub fn edge_count(&self, edge_type: &str) -> Option<usize> {
        self.edge(edge_type).map(EdgeTable::len)
    }

    /// Global index of `identifier` within `node_type`.
    pub fn lookup(&self, node_type: &str, identifier: &str) -> Option<usize> {
        self.node(node_type)?.index.get(identifier)
    }

    /// Raw identifier behind a global index.
    pub fn node_id(&self, node_type: &str, index: usize) -> Option<&str> {
        self.node(node_type)?.index.identifier(index)
    }

    /// Encodes rows of a new batch for `owner` with the frozen encoders.
    ///
    /// The result has the same layout and width as the snapshot's matrix.
    pub fn transform_batch(
        &self,
        owner: &str,
        table: &Table,
    ) -> Result<FeatureMatrix, RelGraphError> {
        let encoders = match (self.node(owner), self.edge(owner)) {
            (Some(node), _) => &node.encoders,
            (None, Some(edge)) => &edge.encoders,
            (None, None) => {
                return Err(RelGraphError::invalid_input(format!(
                    "{owner} is neither a node nor an edge type"
                )));
            }
        };
        let rows: Vec<usize> = (0..table.len()).collect();
        encoders.transform(&self.registry, table, &rows)
    }

    /// Masks of every node and edge type visible at `cutoff`.
    ///
    /// A node is visible when it has no timestamp or its timestamp is at or
    /// before the cutoff. An edge additionally needs both endpoints visible.
    pub fn point_in_time_view(&self, cutoff: Timestamp) -> PointInTimeView {
        let nodes: Vec<VisibilityMask> = self
            .nodes
            .iter()
            .map(|n| n.temporal.point_in_time_view(cutoff))
            .collect();
        let edges = self
            .schema
            .edge_types()
            .iter()
            .zip(&self.edges)
            .map(|(edge_type, table)| {
                let src = self.schema.node_position(&edge_type.source_type);
                let dst = self.schema.node_position(&edge_type.target_type);
                let own = table.temporal.point_in_time_view(cutoff);
                let bits = table
                    .index
                    .pairs()
                    .iter()
                    .enumerate()
                    .map(|(e, &(s, t))| {
                        own.is_visible(e)
                            && src.is_some_and(|p| nodes[p].is_visible(s))
                            && dst.is_some_and(|p| nodes[p].is_visible(t))
                    })
                    .collect();
                VisibilityMask::from_bits(bits)
            })
            .collect();
        PointInTimeView {
            cutoff,
            nodes,
            edges,
        }
    }

    pub fn summary(&self) -> String {
        let nodes = self
            .metadata
            .node_counts
            .iter()
            .map(|c| format!("{}={}", c.name, c.count))
            .collect::<Vec<_>>()
            .join(",");
        let edges = self
            .metadata
            .edge_counts
            .iter()
            .map(|c| format!("{}={}", c.name, c.count))
            .collect::<Vec<_>>()
            .join(",");
        format!(
            "snapshot={} nodes[{nodes}] edges[{edges}]",
            &self.metadata.snapshot_id[..12.min(self.metadata.snapshot_id.len())]
        )
    }
}

/// Visibility masks of a snapshot at one cutoff. Owns only the masks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PointInTimeView {
    pub cutoff: Timestamp,
    nodes: Vec<VisibilityMask>,
    edges: Vec<VisibilityMask>,
}

impl PointInTimeView {
    /// Mask by node type position.
    pub fn node_mask(&self, position: usize) -> Option<&VisibilityMask> {
        self.nodes.get(position)
    }

    /// Mask by edge type position.
    pub fn edge_mask(&self, position: usize) -> Option<&VisibilityMask> {
        self.edges.get(position)
    }

    pub fn node_masks(&self) -> &[VisibilityMask] {
        &self.nodes
    }

    pub fn edge_masks(&self) -> &[VisibilityMask] {
        &self.edges
    }

    /// Visible pairs of one edge type, in edge order. Empty for an unknown
    /// position.
    pub fn visible_pairs(&self, graph: &Graph, position: usize) -> Vec<(usize, usize)> {
        let (Some(table), Some(mask)) = (graph.edges.get(position), self.edges.get(position))
        else {
            return Vec::new();
        };
        table
            .index
            .pairs()
            .iter()
            .enumerate()
            .filter(|(e, _)| mask.is_visible(*e))
            .map(|(_, pair)| *pair)
            .collect()
    }
}
