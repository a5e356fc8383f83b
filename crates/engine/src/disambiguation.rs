//! Disambiguation tracking.
//!
//! When validation matches multiple candidate records for a row, the user
//! picks one. The choice is pinned per row as a mapping-path-to-record-id
//! map, persisted as a JSON blob inside a hidden trailing spreadsheet
//! column so it travels with the dataset through the widget's own
//! undo/redo and persistence.
//!
//! The blob is never partially merged: any cell edit in the row clears the
//! whole record so the next validation round runs unpinned.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::grid::GridAdapter;
use crate::mappings::path_key;
use crate::validation::ValidationEngine;

#[derive(Debug, Default, Serialize, Deserialize)]
struct DisambiguationBlob {
    #[serde(default)]
    disambiguation: BTreeMap<String, i64>,
}

/// Reads and writes the hidden-column disambiguation blobs.
#[derive(Debug, Clone, Copy)]
pub struct DisambiguationTracker {
    /// Physical column holding the JSON blob.
    hidden_col: usize,
}

impl DisambiguationTracker {
    pub fn new(hidden_physical_col: usize) -> Self {
        Self { hidden_col: hidden_physical_col }
    }

    pub fn hidden_col(&self) -> usize {
        self.hidden_col
    }

    fn read_blob(&self, grid: &dyn GridAdapter, physical_row: usize) -> DisambiguationBlob {
        let visual_row = grid.to_visual_row(physical_row);
        let visual_col = grid.to_visual_col(self.hidden_col);
        grid.cell_value(visual_row, visual_col)
            // Absent or unparseable blobs read as empty, never as errors
            .and_then(|raw| serde_json::from_str(&raw).ok())
            .unwrap_or_default()
    }

    fn write_blob(&self, grid: &mut dyn GridAdapter, physical_row: usize, blob: &DisambiguationBlob) {
        if let Ok(json) = serde_json::to_string(blob) {
            let visual_row = grid.to_visual_row(physical_row);
            let visual_col = grid.to_visual_col(self.hidden_col);
            grid.set_cell_value(visual_row, visual_col, &json);
        }
    }

    /// The row's pinned choices, keyed by stringified mapping path.
    pub fn get_disambiguation(
        &self,
        grid: &dyn GridAdapter,
        physical_row: usize,
    ) -> BTreeMap<String, i64> {
        self.read_blob(grid, physical_row).disambiguation
    }

    /// Pin one choice: read-modify-write the blob as a single widget write.
    pub fn set_disambiguation(
        &self,
        grid: &mut dyn GridAdapter,
        physical_row: usize,
        mapping_path: &[String],
        record_id: i64,
    ) {
        let mut blob = self.read_blob(grid, physical_row);
        blob.disambiguation.insert(path_key(mapping_path), record_id);
        self.write_blob(grid, physical_row, &blob);
    }

    /// Drop every pinned choice for the row. Returns whether anything was
    /// written; an already-empty record is left alone so no spurious undo
    /// entry appears.
    pub fn clear_disambiguation(&self, grid: &mut dyn GridAdapter, physical_row: usize) -> bool {
        let blob = self.read_blob(grid, physical_row);
        if blob.disambiguation.is_empty() {
            return false;
        }
        self.write_blob(grid, physical_row, &DisambiguationBlob::default());
        true
    }

    /// Whether the currently selected cell sits on an unresolved ambiguous
    /// match (one with no pinned choice yet).
    pub fn is_ambiguous_cell(&self, grid: &dyn GridAdapter, engine: &ValidationEngine) -> bool {
        let Some((visual_row, visual_col)) = grid.selected_cell() else {
            return false;
        };
        let row = grid.to_physical_row(visual_row);
        let col = grid.to_physical_col(visual_col);

        let pinned = self.get_disambiguation(grid, row);
        engine.ambiguous_matches(row).iter().any(|m| {
            m.physical_cols.contains(&col) && !pinned.contains_key(&path_key(&m.mapping_path))
        })
    }

    /// Whether some ambiguous match covering this cell has a pinned choice.
    pub fn cell_was_disambiguated(
        &self,
        grid: &dyn GridAdapter,
        engine: &ValidationEngine,
        physical_row: usize,
        physical_col: usize,
    ) -> bool {
        let pinned = self.get_disambiguation(grid, physical_row);
        engine.ambiguous_matches(physical_row).iter().any(|m| {
            m.physical_cols.contains(&physical_col)
                && pinned.contains_key(&path_key(&m.mapping_path))
        })
    }

    /// Union of physical columns touched by the row's ambiguous matches.
    /// These are the columns whose `is_modified` needs recomputing after a
    /// disambiguation change.
    pub fn ambiguous_columns(engine: &ValidationEngine, physical_row: usize) -> Vec<usize> {
        let mut cols: Vec<usize> = engine
            .ambiguous_matches(physical_row)
            .iter()
            .flat_map(|m| m.physical_cols.iter().copied())
            .collect();
        cols.sort_unstable();
        cols.dedup();
        cols
    }
}
