//! Upload/validation result trees.
//!
//! The validation service answers one tree per row, mirroring the
//! relational mapping graph: a record result plus nested `toOne` and
//! `toMany` sub-results. Trees are flattened into cell metadata as soon
//! as they arrive and then discarded.
//!
//! The record result is a closed sum type: an unhandled variant is a
//! compile error, and an unknown tag in the payload fails
//! deserialization with row context attached by the caller.

use std::collections::BTreeMap;
use std::fmt;
use std::marker::PhantomData;

use serde::de::{MapAccess, Visitor};
use serde::{Deserialize, Deserializer};
use serde_json::Value;

/// Issue text for a must-match table without a matching record.
pub const NO_MATCH_MESSAGE: &str = "No matching record for must-match table";
/// Issue text for an ambiguous match awaiting disambiguation.
pub const MATCHED_MULTIPLE_MESSAGE: &str =
    "Multiple records matched; the row must be disambiguated";

/// One node of the result tree.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RowResultNode {
    pub record_result: RecordResult,
    /// To-one sub-results, keyed by relationship name, in payload order.
    #[serde(rename = "toOne", default, deserialize_with = "ordered_entries")]
    pub to_one: Vec<(String, RowResultNode)>,
    /// To-many sub-results, keyed by relationship name, in payload order.
    #[serde(rename = "toMany", default, deserialize_with = "ordered_entries")]
    pub to_many: Vec<(String, Vec<RowResultNode>)>,
}

impl RowResultNode {
    /// Node with a bare record result and no children.
    pub fn leaf(record_result: RecordResult) -> Self {
        Self { record_result, to_one: Vec::new(), to_many: Vec::new() }
    }
}

/// Result of matching/uploading one record of the mapping graph.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub enum RecordResult {
    /// Nothing to do for this record (all cells empty).
    NullRecord {},
    /// A related record failed; this one was skipped.
    PropagatedFailure {},
    /// Exactly one existing record matched.
    Matched { id: i64, info: ResultInfo },
    /// One or more cell values failed to parse.
    ParseFailures { failures: Vec<ParseFailure> },
    /// A must-match table had no matching record.
    NoMatch { info: ResultInfo },
    /// A business rule rejected the record.
    FailedBusinessRule {
        message: String,
        #[serde(default)]
        payload: BTreeMap<String, Value>,
        info: ResultInfo,
    },
    /// Several records matched; needs disambiguation.
    MatchedMultiple {
        ids: Vec<i64>,
        key: String,
        info: ResultInfo,
    },
    /// A record was (or would be) created.
    Uploaded { id: i64, info: ResultInfo },
}

/// Which table and columns a record result concerns.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ResultInfo {
    #[serde(rename = "tableName")]
    pub table_name: String,
    /// Spreadsheet headers this result concerns. May be empty, in which
    /// case columns are inferred from the mapping path.
    #[serde(default)]
    pub columns: Vec<String>,
    /// Present when the record is a tree node.
    #[serde(rename = "treeInfo", default)]
    pub tree_info: Option<TreeInfo>,
}

impl ResultInfo {
    pub fn for_table(table_name: &str) -> Self {
        Self { table_name: table_name.to_string(), columns: Vec::new(), tree_info: None }
    }

    pub fn with_columns(table_name: &str, columns: &[&str]) -> Self {
        Self {
            table_name: table_name.to_string(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            tree_info: None,
        }
    }
}

/// Tree-rank context for a tree-table record.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TreeInfo {
    pub rank: String,
    pub name: String,
}

/// One cell value the parser rejected.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ParseFailure {
    pub message: String,
    #[serde(default)]
    pub payload: BTreeMap<String, Value>,
    /// Spreadsheet header of the offending cell.
    pub column: String,
}

/// Render a message with its payload interpolated, e.g.
/// `"value out of range (max: 100)"`.
pub fn format_message(message: &str, payload: &BTreeMap<String, Value>) -> String {
    if payload.is_empty() {
        return message.to_string();
    }
    let details: Vec<String> = payload
        .iter()
        .map(|(key, value)| format!("{key}: {}", render_value(value)))
        .collect();
    format!("{message} ({})", details.join(", "))
}

fn render_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Deserialize a JSON object into a vector of entries, preserving the
/// payload's key order (sub-results are applied in object order).
fn ordered_entries<'de, D, V>(deserializer: D) -> Result<Vec<(String, V)>, D::Error>
where
    D: Deserializer<'de>,
    V: Deserialize<'de>,
{
    struct Entries<V>(PhantomData<V>);

    impl<'de, V: Deserialize<'de>> Visitor<'de> for Entries<V> {
        type Value = Vec<(String, V)>;

        fn expecting(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            f.write_str("a JSON object")
        }

        fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
            let mut entries = Vec::with_capacity(map.size_hint().unwrap_or(0));
            while let Some(entry) = map.next_entry::<String, V>()? {
                entries.push(entry);
            }
            Ok(entries)
        }
    }

    deserializer.deserialize_map(Entries(PhantomData))
}
