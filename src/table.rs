//! In-memory row batches handed over by the upstream table reader.
//!
//! relgraph never parses files. A reader (Parquet, CSV, a database cursor)
//! produces one [`Table`] per declared source and collects them in a
//! [`TableSet`]. Cells are `serde_json::Value`s so scalars, arrays and nulls
//! all travel through the same type.

use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::RelGraphError;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Table {
    pub name: String,
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new<N: Into<String>>(name: N, columns: &[&str]) -> Self {
        Self {
            name: name.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            rows: Vec::new(),
        }
    }

    /// Appends a row; the row must have one cell per column.
    pub fn push_row(&mut self, row: Vec<Value>) -> Result<(), RelGraphError> {
        if row.len() != self.columns.len() {
            return Err(RelGraphError::shape(format!(
                "table {} expects {} cells per row, got {}",
                self.name,
                self.columns.len(),
                row.len()
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn with_rows(mut self, rows: Vec<Vec<Value>>) -> Result<Self, RelGraphError> {
        for row in rows {
            self.push_row(row)?;
        }
        Ok(self)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn has_column(&self, column: &str) -> bool {
        self.column_index(column).is_some()
    }

    pub fn column_index(&self, column: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == column)
    }

    pub fn require_column(&self, column: &str) -> Result<usize, RelGraphError> {
        self.column_index(column).ok_or_else(|| {
            RelGraphError::schema(format!("table {} has no column {column}", self.name))
        })
    }

    pub fn cell(&self, row: usize, column: usize) -> &Value {
        self.rows
            .get(row)
            .and_then(|r| r.get(column))
            .unwrap_or(&Value::Null)
    }
}

/// All source tables for one build, keyed by table name.
#[derive(Debug, Clone, Default)]
pub struct TableSet {
    tables: AHashMap<String, Table>,
}

impl TableSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, table: Table) {
        self.tables.insert(table.name.clone(), table);
    }

    pub fn with(mut self, table: Table) -> Self {
        self.insert(table);
        self
    }

    pub fn get(&self, name: &str) -> Option<&Table> {
        self.tables.get(name)
    }

    pub fn require(&self, name: &str) -> Result<&Table, RelGraphError> {
        self.get(name)
            .ok_or_else(|| RelGraphError::schema(format!("source table {name} not supplied")))
    }

    pub fn len(&self) -> usize {
        self.tables.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }
}

impl FromIterator<Table> for TableSet {
    fn from_iter<I: IntoIterator<Item = Table>>(iter: I) -> Self {
        let mut set = TableSet::new();
        for table in iter {
            set.insert(table);
        }
        set
    }
}

/// Canonical string form of an identifier cell. Nulls have none.
pub fn identifier_key(value: &Value) -> Option<String> {
    match value {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        other => Some(other.to_string()),
    }
}

/// Canonical string form of a categorical cell.
pub fn category_key(value: &Value) -> Option<String> {
    identifier_key(value)
}
