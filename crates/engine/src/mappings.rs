//! Mapping/schema metadata boundary.
//!
//! The dataset's columns are mapped into the relational data model through
//! mapping paths: ordered sequences of field/relationship/tree-rank names.
//! This module resolves between spreadsheet headers, physical columns and
//! mapping paths, including the prefix-walk fallback used when a validation
//! result does not name its columns explicitly.

use serde::{Deserialize, Serialize};

/// An ordered sequence of field/relationship/tree-rank names describing
/// how a column maps into the data model.
pub type MappingPath = Vec<String>;

/// Relationship name that walks UP a tree table instead of descending.
pub const PARENT_RELATIONSHIP: &str = "parent";

/// 1-based marker segment for a to-many relationship index, e.g. `#1`.
pub fn to_many_marker(index: usize) -> String {
    format!("#{index}")
}

/// Join a mapping path into the stable string key used by the
/// disambiguation blob.
pub fn path_key(path: &[String]) -> String {
    path.join(".")
}

/// One mapped spreadsheet column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnMapping {
    /// Spreadsheet header, as it appears in validation payload column lists.
    pub header: String,
    /// Mapping path for this column.
    pub path: MappingPath,
    /// Table the mapped field belongs to.
    pub table: String,
    /// Default value substituted when a cell is empty.
    pub default_value: Option<String>,
}

/// Schema metadata for one dataset: the mapped columns in physical order
/// plus which tables are tree tables.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Mappings {
    columns: Vec<ColumnMapping>,
    tree_tables: Vec<String>,
}

impl Mappings {
    pub fn new(columns: Vec<ColumnMapping>, tree_tables: Vec<String>) -> Self {
        Self { columns, tree_tables }
    }

    /// Number of mapped columns. The hidden disambiguation column sits at
    /// this physical index.
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn columns(&self) -> &[ColumnMapping] {
        &self.columns
    }

    pub fn header(&self, physical_col: usize) -> Option<&str> {
        self.columns.get(physical_col).map(|c| c.header.as_str())
    }

    pub fn default_value(&self, physical_col: usize) -> Option<&str> {
        self.columns
            .get(physical_col)
            .and_then(|c| c.default_value.as_deref())
    }

    pub fn physical_col_of_header(&self, header: &str) -> Option<usize> {
        self.columns.iter().position(|c| c.header == header)
    }

    pub fn is_tree_table(&self, table: &str) -> bool {
        self.tree_tables.iter().any(|t| t.eq_ignore_ascii_case(table))
    }

    /// Resolve the physical columns a validation result concerns.
    ///
    /// The explicit header list from the payload wins. When it is absent,
    /// walk up the mapping path: find columns sharing a progressively
    /// shorter path prefix, taking the first non-empty set. An empty prefix
    /// matches everything, so the final iteration is the all-columns
    /// fallback.
    pub fn resolve_columns(&self, headers: &[String], path: &[String]) -> Vec<usize> {
        if !headers.is_empty() {
            return headers
                .iter()
                .filter_map(|h| self.physical_col_of_header(h))
                .collect();
        }

        for prefix_len in (0..=path.len()).rev() {
            let prefix = &path[..prefix_len];
            let matched: Vec<usize> = self
                .columns
                .iter()
                .enumerate()
                .filter(|(_, c)| c.path.len() >= prefix_len && c.path[..prefix_len] == *prefix)
                .map(|(i, _)| i)
                .collect();
            if !matched.is_empty() {
                return matched;
            }
        }
        Vec::new()
    }
}
