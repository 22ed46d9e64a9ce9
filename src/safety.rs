//! Post-hoc integrity checks over a finished snapshot.
//!
//! The assembler already refuses inconsistent parts; these checks exist for
//! snapshots that were deserialized, hand-assembled or built with relaxed
//! policies, and for tests that want a single report.

use std::fmt;

use ahash::AHashSet;
use serde::Serialize;
use tracing::warn;

use crate::{errors::RelGraphError, graph::Graph};

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SafetyReport {
    pub total_nodes: usize,
    pub total_edges: usize,
    /// Edges with an endpoint outside its node type's index range.
    pub orphan_edges: usize,
    /// Repeated `(source, target)` pairs within one edge type.
    pub duplicate_edges: usize,
    /// Owners whose feature matrix row count differs from their instance count.
    pub feature_row_mismatches: usize,
    /// Owners whose temporal attributes differ in length from their instance count.
    pub temporal_mismatches: usize,
}

impl SafetyReport {
    pub fn merge(&mut self, other: &SafetyReport) {
        self.total_nodes = self.total_nodes.max(other.total_nodes);
        self.total_edges = self.total_edges.max(other.total_edges);
        self.orphan_edges += other.orphan_edges;
        self.duplicate_edges += other.duplicate_edges;
        self.feature_row_mismatches += other.feature_row_mismatches;
        self.temporal_mismatches += other.temporal_mismatches;
    }

    pub fn has_issues(&self) -> bool {
        self.orphan_edges > 0
            || self.duplicate_edges > 0
            || self.feature_row_mismatches > 0
            || self.temporal_mismatches > 0
    }
}

#[derive(Debug)]
pub struct SafetyError {
    pub report: SafetyReport,
    pub source: Option<RelGraphError>,
}

impl fmt::Display for SafetyError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "safety violations detected: {} orphan, {} duplicate, {} feature, {} temporal",
            self.report.orphan_edges,
            self.report.duplicate_edges,
            self.report.feature_row_mismatches,
            self.report.temporal_mismatches
        )
    }
}

impl std::error::Error for SafetyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|err| err as &dyn std::error::Error)
    }
}

pub fn validate_referential_integrity(graph: &Graph) -> Result<SafetyReport, RelGraphError> {
    let mut report = base_report(graph);
    for (edge_type, table) in graph.schema().edge_types().iter().zip(graph.edge_tables()) {
        let src_len = node_len(graph, &edge_type.source_type)?;
        let dst_len = node_len(graph, &edge_type.target_type)?;
        report.orphan_edges += table
            .index
            .pairs()
            .iter()
            .filter(|(s, t)| *s >= src_len || *t >= dst_len)
            .count();
    }
    Ok(report)
}

/// Duplicates are only an issue when the build deduplicated; pass
/// `multi_edges = true` for snapshots built with multi-edges allowed.
pub fn validate_no_duplicate_edges(
    graph: &Graph,
    multi_edges: bool,
) -> Result<SafetyReport, RelGraphError> {
    let mut report = base_report(graph);
    if multi_edges {
        return Ok(report);
    }
    for table in graph.edge_tables() {
        let mut seen = AHashSet::with_capacity(table.len());
        report.duplicate_edges += table
            .index
            .pairs()
            .iter()
            .filter(|pair| !seen.insert(**pair))
            .count();
    }
    Ok(report)
}

pub fn validate_row_counts(graph: &Graph) -> Result<SafetyReport, RelGraphError> {
    let mut report = base_report(graph);
    for node in graph.node_tables() {
        if node.features.rows() != node.len() {
            report.feature_row_mismatches += 1;
        }
        if node.temporal.len() != node.len() {
            report.temporal_mismatches += 1;
        }
    }
    for edge in graph.edge_tables() {
        if edge.features.rows() != edge.len() {
            report.feature_row_mismatches += 1;
        }
        if edge.temporal.len() != edge.len() {
            report.temporal_mismatches += 1;
        }
    }
    Ok(report)
}

pub fn run_safety_checks(graph: &Graph, multi_edges: bool) -> Result<SafetyReport, RelGraphError> {
    let mut report = SafetyReport::default();
    report.merge(&validate_referential_integrity(graph)?);
    report.merge(&validate_no_duplicate_edges(graph, multi_edges)?);
    report.merge(&validate_row_counts(graph)?);
    if report.has_issues() {
        warn!(?report, snapshot = graph.snapshot_id(), "safety checks found issues");
    }
    Ok(report)
}

pub fn run_strict_safety_checks(graph: &Graph, multi_edges: bool) -> Result<(), SafetyError> {
    let report = run_safety_checks(graph, multi_edges).map_err(|err| SafetyError {
        report: SafetyReport::default(),
        source: Some(err),
    })?;
    if report.has_issues() {
        Err(SafetyError {
            report,
            source: None,
        })
    } else {
        Ok(())
    }
}

fn base_report(graph: &Graph) -> SafetyReport {
    SafetyReport {
        total_nodes: graph.node_tables().iter().map(|n| n.len()).sum(),
        total_edges: graph.edge_tables().iter().map(|e| e.len()).sum(),
        ..SafetyReport::default()
    }
}

fn node_len(graph: &Graph, node_type: &str) -> Result<usize, RelGraphError> {
    graph.node_count(node_type).ok_or_else(|| {
        RelGraphError::assembly(format!("edge endpoint type {node_type} has no node table"))
    })
}
