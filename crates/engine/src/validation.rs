//! Validation engine.
//!
//! Drives two validation modes over the dataset: live (incremental, one
//! row per round trip as the user edits) and static (bulk results attached
//! to the dataset at load time). Either way, result trees are flattened
//! into cell metadata through the same application logic.
//!
//! The live pump is strictly serialized: one in-flight request at a time,
//! guarded against re-entrant starts. Editing a queued row moves it to the
//! end of the queue so the freshest edit wins without duplicate entries.

use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use serde::Serialize;

use crate::cell_meta::{CellMetaStore, MetaUpdate};
use crate::grid::GridAdapter;
use crate::mappings::{to_many_marker, MappingPath, Mappings, PARENT_RELATIONSHIP};
use crate::results::{
    format_message, RecordResult, RowResultNode, MATCHED_MULTIPLE_MESSAGE, NO_MATCH_MESSAGE,
};

// ============================================================================
// Core Types
// ============================================================================

/// Validation mode state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValidationMode {
    Off,
    /// Bulk results were attached at load time and applied in one batch.
    Static,
    /// Rows are validated one at a time against the remote service.
    Live,
}

/// Errors from the live validation round trip.
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    /// Network/transport failure. The pump stops with the queue left
    /// non-empty; the next edit or a re-toggle restarts it.
    Transport(String),
    /// The service answered something the engine cannot interpret. This is
    /// an invariant violation, not a user mistake.
    Protocol { row: usize, detail: String },
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(msg) => write!(f, "validation transport error: {msg}"),
            Self::Protocol { row, detail } => {
                write!(f, "row {row}: malformed validation result: {detail}")
            }
        }
    }
}

impl std::error::Error for ValidationError {}

/// One cell of a row submitted for validation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CellSubmission {
    pub header: String,
    pub value: String,
}

/// The remote validation service, one blocking round trip per row.
pub trait RowValidator {
    fn validate_row(
        &self,
        physical_row: usize,
        cells: &[CellSubmission],
    ) -> Result<RowResultNode, ValidationError>;
}

/// An ambiguous match recorded during validation, awaiting the user's
/// disambiguation choice.
#[derive(Debug, Clone, PartialEq)]
pub struct AmbiguousMatch {
    /// Physical columns the match concerns.
    pub physical_cols: Vec<usize>,
    /// Mapping path of the ambiguous record.
    pub mapping_path: MappingPath,
    /// Candidate record ids.
    pub ids: Vec<i64>,
    /// Dedup key from the service.
    pub key: String,
}

/// Provenance of a record created by an upload, kept per cell for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreatedRecord {
    pub table: String,
    pub id: i64,
    /// Tree-rank label when the record is a tree node.
    pub label: Option<String>,
}

#[derive(Default)]
struct RowEffects {
    issues: FxHashMap<usize, Vec<String>>,
    new_cols: FxHashSet<usize>,
    ambiguous: Vec<AmbiguousMatch>,
    created: FxHashMap<usize, Vec<CreatedRecord>>,
    uploaded_tables: Vec<String>,
}

// ============================================================================
// Engine
// ============================================================================

/// Drives validation and owns its per-row byproducts: ambiguous matches,
/// created-record provenance and per-table created counters.
#[derive(Debug)]
pub struct ValidationEngine {
    mode: ValidationMode,
    /// Pending physical rows. Consumed from the end; seeded reversed so
    /// the initial sweep pops rows in ascending order.
    queue: Vec<usize>,
    pump_active: bool,
    record_counts: std::collections::BTreeMap<String, usize>,
    ambiguous: FxHashMap<usize, Vec<AmbiguousMatch>>,
    created: FxHashMap<usize, FxHashMap<usize, Vec<CreatedRecord>>>,
}

impl ValidationEngine {
    /// Initial mode is `Static` when server results were attached to the
    /// loaded dataset, `Off` otherwise.
    pub fn new(has_static_results: bool) -> Self {
        Self {
            mode: if has_static_results { ValidationMode::Static } else { ValidationMode::Off },
            queue: Vec::new(),
            pump_active: false,
            record_counts: std::collections::BTreeMap::new(),
            ambiguous: FxHashMap::default(),
            created: FxHashMap::default(),
        }
    }

    pub fn mode(&self) -> ValidationMode {
        self.mode
    }

    /// Created-record count per table (lowercased table name).
    pub fn record_counts(&self) -> &std::collections::BTreeMap<String, usize> {
        &self.record_counts
    }

    pub fn ambiguous_matches(&self, physical_row: usize) -> &[AmbiguousMatch] {
        self.ambiguous.get(&physical_row).map_or(&[], Vec::as_slice)
    }

    pub fn created_records(&self, physical_row: usize, physical_col: usize) -> &[CreatedRecord] {
        self.created
            .get(&physical_row)
            .and_then(|cols| cols.get(&physical_col))
            .map_or(&[], Vec::as_slice)
    }

    pub fn queued_rows(&self) -> &[usize] {
        &self.queue
    }

    pub fn pump_active(&self) -> bool {
        self.pump_active
    }

    /// Switch to live mode. Requires at least one mapped column. Clears
    /// all result caches and cell meta, then seeds the queue with every
    /// physical row (reversed, so popping walks the sheet top to bottom).
    pub fn start_live(
        &mut self,
        store: &mut CellMetaStore,
        grid: Option<&mut (dyn GridAdapter + '_)>,
        mappings: &Mappings,
        row_count: usize,
    ) -> bool {
        if mappings.is_empty() {
            return false;
        }
        self.mode = ValidationMode::Live;
        self.record_counts.clear();
        self.ambiguous.clear();
        self.created.clear();
        store.clear_all(grid);
        self.queue = (0..row_count).rev().collect();
        true
    }

    /// Leave live mode: drop all pending work.
    pub fn stop_live(&mut self) {
        self.mode = ValidationMode::Off;
        self.queue.clear();
    }

    /// Shift physical row keys after a row insertion, keeping the queue
    /// and the per-row result caches aligned with the data.
    pub fn insert_row(&mut self, physical_row: usize) {
        for row in &mut self.queue {
            if *row >= physical_row {
                *row += 1;
            }
        }
        let ambiguous = std::mem::take(&mut self.ambiguous);
        self.ambiguous = ambiguous
            .into_iter()
            .map(|(row, v)| (if row >= physical_row { row + 1 } else { row }, v))
            .collect();
        let created = std::mem::take(&mut self.created);
        self.created = created
            .into_iter()
            .map(|(row, v)| (if row >= physical_row { row + 1 } else { row }, v))
            .collect();
    }

    /// Drop a row's pending work and result caches, shifting the keys
    /// above it down.
    pub fn remove_row(&mut self, physical_row: usize) {
        self.queue.retain(|&row| row != physical_row);
        for row in &mut self.queue {
            if *row > physical_row {
                *row -= 1;
            }
        }
        self.ambiguous.remove(&physical_row);
        let ambiguous = std::mem::take(&mut self.ambiguous);
        self.ambiguous = ambiguous
            .into_iter()
            .map(|(row, v)| (if row > physical_row { row - 1 } else { row }, v))
            .collect();
        self.created.remove(&physical_row);
        let created = std::mem::take(&mut self.created);
        self.created = created
            .into_iter()
            .map(|(row, v)| (if row > physical_row { row - 1 } else { row }, v))
            .collect();
    }

    /// Queue (or re-prioritize) one row for live validation. An already
    /// queued row moves to the end instead of being duplicated. Returns
    /// true when the caller should run the pump.
    pub fn start_validate_row(&mut self, physical_row: usize) -> bool {
        if self.mode != ValidationMode::Live {
            return false;
        }
        if let Some(pos) = self.queue.iter().position(|&r| r == physical_row) {
            self.queue.remove(pos);
        }
        self.queue.push(physical_row);
        !self.pump_active
    }

    /// Claim the pump. Returns false when a pump is already running; the
    /// running pump will pick up any newly queued rows itself.
    pub fn begin_pump(&mut self) -> bool {
        if self.pump_active || self.mode != ValidationMode::Live {
            return false;
        }
        self.pump_active = true;
        true
    }

    /// Pop the next row to validate. The queue is consumed from the end.
    pub fn take_next_row(&mut self) -> Option<usize> {
        self.queue.pop()
    }

    pub fn end_pump(&mut self) {
        self.pump_active = false;
    }

    /// Flatten one row's result tree into cell metadata and the engine's
    /// own caches. Replaces the row's previous issues, flags, ambiguous
    /// matches and provenance; unaffected columns are cleared.
    pub fn apply_row_result(
        &mut self,
        store: &mut CellMetaStore,
        mut grid: Option<&mut (dyn GridAdapter + '_)>,
        mappings: &Mappings,
        physical_row: usize,
        node: &RowResultNode,
    ) {
        let mut effects = RowEffects::default();
        collect_effects(node, &MappingPath::new(), mappings, &mut effects);

        for table in &effects.uploaded_tables {
            *self.record_counts.entry(table.clone()).or_insert(0) += 1;
        }
        if effects.ambiguous.is_empty() {
            self.ambiguous.remove(&physical_row);
        } else {
            self.ambiguous.insert(physical_row, std::mem::take(&mut effects.ambiguous));
        }
        if effects.created.is_empty() {
            self.created.remove(&physical_row);
        } else {
            self.created.insert(physical_row, std::mem::take(&mut effects.created));
        }

        let live = self.mode == ValidationMode::Live;
        for col in 0..mappings.column_count() {
            let issues = effects.issues.remove(&col).unwrap_or_default();
            let has_issues = !issues.is_empty();
            store.update_meta(
                grid.as_deref_mut(),
                physical_row,
                col,
                MetaUpdate::Issues(issues),
                None,
            );
            store.update_meta(
                grid.as_deref_mut(),
                physical_row,
                col,
                MetaUpdate::IsNew(effects.new_cols.contains(&col)),
                None,
            );
            // Errors take visual priority over modified styling
            if live && has_issues {
                store.update_meta(
                    grid.as_deref_mut(),
                    physical_row,
                    col,
                    MetaUpdate::IsModified(false),
                    None,
                );
            }
        }
    }

    /// Apply bulk pre-computed results, batched so the widget repaints
    /// once.
    pub fn apply_static_results(
        &mut self,
        store: &mut CellMetaStore,
        mut grid: Option<&mut (dyn GridAdapter + '_)>,
        mappings: &Mappings,
        results: &[(usize, RowResultNode)],
    ) {
        if let Some(g) = grid.as_deref_mut() {
            g.begin_render_batch();
        }
        for (row, node) in results {
            self.apply_row_result(store, grid.as_deref_mut(), mappings, *row, node);
        }
        if let Some(g) = grid.as_deref_mut() {
            g.end_render_batch();
        }
    }
}

// ============================================================================
// Result-tree walk
// ============================================================================

/// Recursive walk over a result tree, accumulating per-column effects.
///
/// `to_one` children extend the path with the relationship name, except a
/// `parent` traversal of a tree record, which strips one segment instead.
/// `to_many` children extend with the relationship name plus a 1-based
/// `#n` marker. Children are visited in payload order.
fn collect_effects(
    node: &RowResultNode,
    path: &MappingPath,
    mappings: &Mappings,
    effects: &mut RowEffects,
) {
    let table = match &node.record_result {
        RecordResult::Matched { info, .. }
        | RecordResult::NoMatch { info }
        | RecordResult::FailedBusinessRule { info, .. }
        | RecordResult::MatchedMultiple { info, .. }
        | RecordResult::Uploaded { info, .. } => Some(info.table_name.as_str()),
        RecordResult::NullRecord {}
        | RecordResult::PropagatedFailure {}
        | RecordResult::ParseFailures { .. } => None,
    };

    match &node.record_result {
        RecordResult::NullRecord {}
        | RecordResult::PropagatedFailure {}
        | RecordResult::Matched { .. } => {}
        RecordResult::ParseFailures { failures } => {
            for failure in failures {
                if let Some(col) = mappings.physical_col_of_header(&failure.column) {
                    effects
                        .issues
                        .entry(col)
                        .or_default()
                        .push(format_message(&failure.message, &failure.payload));
                }
            }
        }
        RecordResult::NoMatch { info } => {
            for col in mappings.resolve_columns(&info.columns, path) {
                effects.issues.entry(col).or_default().push(NO_MATCH_MESSAGE.to_string());
            }
        }
        RecordResult::FailedBusinessRule { message, payload, info } => {
            let formatted = format_message(message, payload);
            for col in mappings.resolve_columns(&info.columns, path) {
                effects.issues.entry(col).or_default().push(formatted.clone());
            }
        }
        RecordResult::MatchedMultiple { ids, key, info } => {
            let cols = mappings.resolve_columns(&info.columns, path);
            effects.ambiguous.push(AmbiguousMatch {
                physical_cols: cols.clone(),
                mapping_path: path.clone(),
                ids: ids.clone(),
                key: key.clone(),
            });
            for col in cols {
                let issues = effects.issues.entry(col).or_default();
                // This message class is deduplicated per column
                if !issues.iter().any(|i| i == MATCHED_MULTIPLE_MESSAGE) {
                    issues.push(MATCHED_MULTIPLE_MESSAGE.to_string());
                }
            }
        }
        RecordResult::Uploaded { id, info } => {
            let cols = mappings.resolve_columns(&info.columns, path);
            effects.uploaded_tables.push(info.table_name.to_lowercase());
            let label = info
                .tree_info
                .as_ref()
                .map(|tree| format!("{}: {}", tree.rank, tree.name));
            for col in cols {
                effects.new_cols.insert(col);
                effects.created.entry(col).or_default().push(CreatedRecord {
                    table: info.table_name.clone(),
                    id: *id,
                    label: label.clone(),
                });
            }
        }
    }

    for (relationship, child) in &node.to_one {
        let child_path = if relationship == PARENT_RELATIONSHIP
            && table.is_some_and(|t| mappings.is_tree_table(t))
        {
            let mut shorter = path.clone();
            shorter.pop();
            shorter
        } else {
            let mut longer = path.clone();
            longer.push(relationship.clone());
            longer
        };
        collect_effects(child, &child_path, mappings, effects);
    }
    for (relationship, children) in &node.to_many {
        for (index, child) in children.iter().enumerate() {
            let mut child_path = path.clone();
            child_path.push(relationship.clone());
            child_path.push(to_many_marker(index + 1));
            collect_effects(child, &child_path, mappings, effects);
        }
    }
}
