use ahash::AHashMap;
use tracing::{debug, warn};

use crate::{
    config::{IndexOptions, IndexOrder},
    errors::RelGraphError,
    schema::NodeType,
    table::{Table, identifier_key},
};

/// Bijection between one node type's raw identifiers and `0..len()`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentifierIndex {
    node_type: String,
    forward: AHashMap<String, usize>,
    reverse: Vec<String>,
    rows: Vec<usize>,
    skipped_rows: usize,
}

impl IdentifierIndex {
    /// Indexes a plain list of identifiers. Repeats collapse onto their first
    /// position, which is recorded as the entity's source row.
    pub fn from_identifiers<I, S>(node_type: &str, identifiers: I, order: IndexOrder) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut first_row = AHashMap::new();
        let mut seen = Vec::new();
        for (row, id) in identifiers.into_iter().enumerate() {
            let id = id.as_ref();
            if !first_row.contains_key(id) {
                first_row.insert(id.to_string(), row);
                seen.push(id.to_string());
            }
        }
        Self::assign(node_type, first_row, seen, order, 0)
    }

    fn assign(
        node_type: &str,
        first_row: AHashMap<String, usize>,
        mut ordered: Vec<String>,
        order: IndexOrder,
        skipped_rows: usize,
    ) -> Self {
        if order == IndexOrder::Lexicographic {
            ordered.sort_unstable();
        }
        let mut forward = AHashMap::with_capacity(ordered.len());
        let mut rows = Vec::with_capacity(ordered.len());
        for (index, id) in ordered.iter().enumerate() {
            forward.insert(id.clone(), index);
            rows.push(first_row[id]);
        }
        Self {
            node_type: node_type.to_string(),
            forward,
            reverse: ordered,
            rows,
            skipped_rows,
        }
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn len(&self) -> usize {
        self.reverse.len()
    }

    pub fn is_empty(&self) -> bool {
        self.reverse.is_empty()
    }

    pub fn get(&self, identifier: &str) -> Option<usize> {
        self.forward.get(identifier).copied()
    }

    pub fn identifier(&self, index: usize) -> Option<&str> {
        self.reverse.get(index).map(|s| s.as_str())
    }

    /// Identifiers in index order.
    pub fn identifiers(&self) -> &[String] {
        &self.reverse
    }

    /// Source-table row that supplied the entity at each index.
    pub fn source_rows(&self) -> &[usize] {
        &self.rows
    }

    /// Rows dropped because their identifier cell was null.
    pub fn skipped_rows(&self) -> usize {
        self.skipped_rows
    }
}

/// Builds the identifier index for `node_type` from its source table.
pub fn build(
    node_type: &NodeType,
    table: &Table,
    options: &IndexOptions,
) -> Result<IdentifierIndex, RelGraphError> {
    let id_col = table.require_column(&node_type.id_column)?;
    let mut first_row: AHashMap<String, usize> = AHashMap::with_capacity(table.len());
    let mut seen = Vec::new();
    let mut skipped = 0;
    for (row, cells) in table.rows.iter().enumerate() {
        let Some(id) = identifier_key(table.cell(row, id_col)) else {
            skipped += 1;
            continue;
        };
        match first_row.get(&id) {
            Some(&first) => {
                if options.detect_conflicts && table.rows[first] != *cells {
                    let column = first_difference(table, first, row).unwrap_or("?");
                    return Err(RelGraphError::duplicate_identifier(format!(
                        "{} identifier {id} on rows {first} and {row} differs in {column}",
                        node_type.name
                    )));
                }
            }
            None => {
                first_row.insert(id.clone(), row);
                seen.push(id);
            }
        }
    }
    if skipped > 0 {
        warn!(node_type = %node_type.name, skipped, "skipped rows with null identifier");
    }
    let index = IdentifierIndex::assign(&node_type.name, first_row, seen, options.order, skipped);
    debug!(
        node_type = %node_type.name,
        nodes = index.len(),
        rows = table.len(),
        "indexed node type"
    );
    Ok(index)
}

fn first_difference(table: &Table, a: usize, b: usize) -> Option<&str> {
    table.rows[a]
        .iter()
        .zip(&table.rows[b])
        .position(|(x, y)| x != y)
        .map(|col| table.columns[col].as_str())
}
