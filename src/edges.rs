use ahash::AHashSet;
use tracing::{debug, warn};

use crate::{
    config::{DanglingPolicy, EdgeOptions, MultiEdgePolicy},
    errors::RelGraphError,
    index::IdentifierIndex,
    schema::EdgeType,
    table::{Table, identifier_key},
};

/// Resolved `(source, target)` pairs of one edge type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EdgeIndex {
    edge_type: String,
    pairs: Vec<(usize, usize)>,
    rows: Vec<usize>,
    dropped_rows: usize,
    duplicate_rows: usize,
}

impl EdgeIndex {
    pub fn edge_type(&self) -> &str {
        &self.edge_type
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(usize, usize)] {
        &self.pairs
    }

    pub fn pair(&self, position: usize) -> Option<(usize, usize)> {
        self.pairs.get(position).copied()
    }

    /// Source-table row of each pair.
    pub fn source_rows(&self) -> &[usize] {
        &self.rows
    }

    /// Rows dropped for a missing endpoint.
    pub fn dropped_rows(&self) -> usize {
        self.dropped_rows
    }

    /// Rows collapsed onto an earlier identical pair.
    pub fn duplicate_rows(&self) -> usize {
        self.duplicate_rows
    }

    /// Splits the pairs into source and target columns, the usual
    /// `edge_index` layout of graph-learning libraries.
    pub fn to_coo(&self) -> (Vec<usize>, Vec<usize>) {
        self.pairs.iter().copied().unzip()
    }
}

/// Maps each row of `table` to a validated pair of node indices.
///
/// Output order is input row order after drops and deduplication.
pub fn resolve(
    edge_type: &EdgeType,
    table: &Table,
    source_index: &IdentifierIndex,
    target_index: &IdentifierIndex,
    options: &EdgeOptions,
) -> Result<EdgeIndex, RelGraphError> {
    let src_col = table.require_column(&edge_type.source_column)?;
    let dst_col = table.require_column(&edge_type.target_column)?;
    let mut pairs = Vec::with_capacity(table.len());
    let mut rows = Vec::with_capacity(table.len());
    let mut seen = AHashSet::new();
    let mut dropped = 0;
    let mut duplicates = 0;

    for row in 0..table.len() {
        let source = lookup(table.cell(row, src_col), source_index);
        let target = lookup(table.cell(row, dst_col), target_index);
        let (source, target) = match (source, target) {
            (Ok(s), Ok(t)) => (s, t),
            (Err(missing), _) | (_, Err(missing)) => {
                if options.dangling == DanglingPolicy::Fail {
                    return Err(RelGraphError::dangling(format!(
                        "{} row {row}: {missing}",
                        edge_type.name
                    )));
                }
                dropped += 1;
                continue;
            }
        };
        if options.multi_edges == MultiEdgePolicy::Dedup && !seen.insert((source, target)) {
            duplicates += 1;
            continue;
        }
        pairs.push((source, target));
        rows.push(row);
    }

    if dropped > 0 {
        warn!(edge_type = %edge_type.name, dropped, "dropped edge rows with dangling endpoints");
    }
    debug!(
        edge_type = %edge_type.name,
        edges = pairs.len(),
        duplicates,
        "resolved edge type"
    );
    Ok(EdgeIndex {
        edge_type: edge_type.name.clone(),
        pairs,
        rows,
        dropped_rows: dropped,
        duplicate_rows: duplicates,
    })
}

fn lookup(cell: &serde_json::Value, index: &IdentifierIndex) -> Result<usize, String> {
    match identifier_key(cell) {
        None => Err(format!("null {} identifier", index.node_type())),
        Some(id) => index
            .get(&id)
            .ok_or_else(|| format!("unknown {} identifier {id}", index.node_type())),
    }
}
