//! Workbench session.
//!
//! One session owns one dataset's worth of engine state: the grid adapter,
//! the cell meta store, the validation engine, the disambiguation tracker
//! and the active search. The embedding UI forwards widget events (value
//! changes, row insertion/removal, sorting, selection) into the hooks here
//! and renders from the aggregate counts and per-cell flags the session
//! maintains.
//!
//! Everything runs on one thread. The validation pump suspends only on the
//! validator's blocking round trip, and the session drives the pump loop
//! itself so the one-at-a-time guarantee is local and testable.

use std::time::Instant;

use rustc_hash::FxHashMap;

use crate::cell_meta::{CellMetaStore, CellType, MetaUpdate};
use crate::disambiguation::DisambiguationTracker;
use crate::grid::{GridAdapter, ToggleAction};
use crate::mappings::Mappings;
use crate::navigation::{navigate_cells, Direction, NavigateOutcome, NavigateRequest};
use crate::results::RowResultNode;
use crate::search::{
    parse_search_query, replace_all, replace_next, search_cells, CompiledSearch, ReplaceMode,
    SearchParseError, SearchPreferences,
};
use crate::validation::{
    CellSubmission, RowValidator, ValidationEngine, ValidationError, ValidationMode,
};

/// Coordinator for one open dataset.
pub struct WorkbenchSession<G: GridAdapter> {
    grid: G,
    store: CellMetaStore,
    validation: ValidationEngine,
    disambiguation: DisambiguationTracker,
    mappings: Mappings,
    prefs: SearchPreferences,
    query: Option<CompiledSearch>,
    /// Displayed "n" of "n / total", per classification.
    nav_positions: FxHashMap<CellType, usize>,
}

impl<G: GridAdapter> WorkbenchSession<G> {
    /// Open a session over a mounted grid. `static_results` are the
    /// server-supplied row results attached to the loaded dataset, if any;
    /// their presence puts validation in static mode and paints them
    /// immediately.
    pub fn new(
        grid: G,
        mappings: Mappings,
        prefs: SearchPreferences,
        static_results: Option<Vec<(usize, RowResultNode)>>,
    ) -> Self {
        let mut grid = grid;
        let cell_count = grid.row_count() * mappings.column_count();
        let mut store = CellMetaStore::new(cell_count);
        // The disambiguation blob rides in the first column past the data
        let disambiguation = DisambiguationTracker::new(mappings.column_count());
        let mut validation = ValidationEngine::new(static_results.is_some());
        if let Some(results) = &static_results {
            validation.apply_static_results(&mut store, Some(&mut grid), &mappings, results);
            store.recount();
        }
        Self {
            grid,
            store,
            validation,
            disambiguation,
            mappings,
            prefs,
            query: None,
            nav_positions: FxHashMap::default(),
        }
    }

    pub fn grid(&self) -> &G {
        &self.grid
    }

    pub fn grid_mut(&mut self) -> &mut G {
        &mut self.grid
    }

    pub fn store(&self) -> &CellMetaStore {
        &self.store
    }

    pub fn counts(&self) -> &crate::cell_meta::CellCounts {
        self.store.counts()
    }

    pub fn validation(&self) -> &ValidationEngine {
        &self.validation
    }

    pub fn mappings(&self) -> &Mappings {
        &self.mappings
    }

    pub fn preferences(&self) -> &SearchPreferences {
        &self.prefs
    }

    // ========================================================================
    // Widget event hooks
    // ========================================================================

    /// Value-change hook, also the path undo and redo flow through.
    ///
    /// Captures the pre-edit value as `original_value` on the first edit,
    /// re-derives `is_modified`, drops the row's disambiguation pins (a
    /// changed row must re-validate unpinned) and queues live validation.
    /// Returns true when the caller should run [`Self::pump_validation`].
    pub fn cell_changed(&mut self, physical_row: usize, physical_col: usize, old_value: &str) -> bool {
        if physical_col >= self.mappings.column_count() {
            // Hidden-column writes (disambiguation blob) are not edits
            return false;
        }
        if self.store.get(physical_row, physical_col).original_value.is_none() {
            self.store.set_meta(
                physical_row,
                physical_col,
                MetaUpdate::OriginalValue(Some(old_value.to_string())),
            );
        }

        let cleared = self.disambiguation.clear_disambiguation(&mut self.grid, physical_row);
        if cleared {
            for col in DisambiguationTracker::ambiguous_columns(&self.validation, physical_row) {
                let value = self.cell_data(physical_row, col);
                self.store.recalculate_is_modified(
                    Some(&mut self.grid),
                    physical_row,
                    col,
                    &value,
                    false,
                );
            }
        }

        let value = self.cell_data(physical_row, physical_col);
        self.store.recalculate_is_modified(
            Some(&mut self.grid),
            physical_row,
            physical_col,
            &value,
            false,
        );

        if self.prefs.live_update {
            if let Some(query) = &self.query {
                let hit = query.matches(&value);
                self.store.update_meta(
                    Some(&mut self.grid),
                    physical_row,
                    physical_col,
                    MetaUpdate::IsSearchResult(hit),
                    None,
                );
            }
        }

        self.store.update_counts(Instant::now());
        self.validation.start_validate_row(physical_row)
    }

    pub fn row_inserted(&mut self, physical_row: usize) {
        self.store.insert_row(physical_row);
        self.validation.insert_row(physical_row);
    }

    pub fn row_removed(&mut self, physical_row: usize) {
        self.store.remove_row(physical_row);
        self.validation.remove_row(physical_row);
    }

    /// Sort-order or column-move hook. Meta is keyed physically so only
    /// the visual index cache goes stale.
    pub fn order_changed(&mut self) {
        self.store.invalidate_index();
    }

    // ========================================================================
    // Validation
    // ========================================================================

    /// Toggle "data check". Off goes live (when anything is mapped), live
    /// goes off. Going live seeds every row and runs the pump to
    /// completion. Returns the resulting mode.
    pub fn toggle_data_check(
        &mut self,
        validator: &dyn RowValidator,
    ) -> Result<ValidationMode, ValidationError> {
        if self.validation.mode() == ValidationMode::Live {
            self.validation.stop_live();
        } else {
            let row_count = self.grid.row_count();
            let started = self.validation.start_live(
                &mut self.store,
                Some(&mut self.grid),
                &self.mappings,
                row_count,
            );
            if started {
                self.pump_validation(validator)?;
            }
        }
        Ok(self.validation.mode())
    }

    /// Run the serialized validation pump until the queue drains.
    ///
    /// At most one pump runs at a time; a call while one is active returns
    /// immediately and the active loop picks up the queued work. A
    /// transport error stops the loop with the queue left non-empty, so
    /// the next edit or toggle resumes where it stopped.
    pub fn pump_validation(&mut self, validator: &dyn RowValidator) -> Result<(), ValidationError> {
        if !self.validation.begin_pump() {
            return Ok(());
        }
        let outcome = loop {
            let Some(row) = self.validation.take_next_row() else {
                break Ok(());
            };
            let cells = self.collect_row(row);
            match validator.validate_row(row, &cells) {
                Ok(node) => {
                    // A response for a since-edited row still applies; the
                    // re-queued row converges on the next iteration.
                    self.validation.apply_row_result(
                        &mut self.store,
                        Some(&mut self.grid),
                        &self.mappings,
                        row,
                        &node,
                    );
                    self.store.update_counts(Instant::now());
                }
                Err(err) => {
                    // The failed row stays pending for the next pump
                    self.validation.start_validate_row(row);
                    break Err(err);
                }
            }
        };
        self.validation.end_pump();
        outcome
    }

    fn collect_row(&self, physical_row: usize) -> Vec<CellSubmission> {
        (0..self.mappings.column_count())
            .map(|col| CellSubmission {
                header: self.mappings.header(col).unwrap_or_default().to_string(),
                value: self.cell_data(physical_row, col),
            })
            .collect()
    }

    /// A cell's effective data: its value, or the column default when the
    /// cell is empty.
    fn cell_data(&self, physical_row: usize, physical_col: usize) -> String {
        let visual_row = self.grid.to_visual_row(physical_row);
        let visual_col = self.grid.to_visual_col(physical_col);
        match self.grid.cell_value(visual_row, visual_col) {
            Some(value) if !value.is_empty() => value,
            _ => self.mappings.default_value(physical_col).unwrap_or("").to_string(),
        }
    }

    // ========================================================================
    // Search, navigation, replace
    // ========================================================================

    /// Compile and run a new search. Returns the hit count; a malformed
    /// regex comes back as a field-level error with search left disabled.
    pub fn search(&mut self, raw: &str) -> Result<usize, SearchParseError> {
        let query = match parse_search_query(raw, &self.prefs) {
            Ok(query) => query,
            Err(err) => {
                self.query = None;
                return Err(err);
            }
        };
        let hits = search_cells(&mut self.store, &mut self.grid, &self.mappings, &query);
        self.query = Some(query);
        self.nav_positions.insert(CellType::SearchResult, 0);
        Ok(hits)
    }

    /// Navigate to the closest cell of a classification and update the
    /// displayed "n / total" position for it. On the first visit to a
    /// classification (nothing navigated to yet) the start cell itself is
    /// eligible, so a match at the origin is not skipped.
    pub fn navigate(&mut self, cell_type: CellType, direction: Direction) -> NavigateOutcome {
        let first_visit = self.nav_positions.get(&cell_type).copied().unwrap_or(0) == 0;
        self.navigate_from(cell_type, direction, first_visit, None)
    }

    /// Jump to the first cell of a classification, walking from the grid
    /// origin regardless of the selection. Bound to Enter in the search
    /// field.
    pub fn navigate_to_first(&mut self, cell_type: CellType) -> NavigateOutcome {
        self.navigate_from(cell_type, Direction::Next, true, Some((0, 0)))
    }

    fn navigate_from(
        &mut self,
        cell_type: CellType,
        direction: Direction,
        match_current_cell: bool,
        origin: Option<(usize, usize)>,
    ) -> NavigateOutcome {
        let current_position = self.nav_positions.get(&cell_type).copied().unwrap_or(0);
        let total_count = self.store.counts().get(cell_type);
        let outcome = navigate_cells(
            &mut self.store,
            &mut self.grid,
            self.prefs.navigation_axis,
            &NavigateRequest {
                cell_type,
                direction,
                current_position,
                total_count,
                match_current_cell,
                origin,
            },
        );
        self.nav_positions.insert(cell_type, outcome.position);
        outcome
    }

    /// Run the configured replace operation against the active search.
    /// With no valid active search this is a no-op.
    pub fn replace(&mut self, with: &str) -> Option<NavigateOutcome> {
        let query = self.query.clone()?;
        match self.prefs.replace_mode {
            ReplaceMode::ReplaceAll => {
                replace_all(&self.store, &mut self.grid, &query, with);
                None
            }
            ReplaceMode::ReplaceNext => {
                let position =
                    self.nav_positions.get(&CellType::SearchResult).copied().unwrap_or(0);
                let total_count = self.store.counts().search_results;
                let outcome = replace_next(
                    &mut self.store,
                    &mut self.grid,
                    self.prefs.navigation_axis,
                    &query,
                    with,
                    total_count,
                    position,
                );
                self.nav_positions.insert(CellType::SearchResult, outcome.position);
                Some(outcome)
            }
        }
    }

    /// Show or hide one classification's highlighting without touching the
    /// underlying flags.
    pub fn toggle_cell_type_visibility(&mut self, cell_type: CellType, action: ToggleAction) {
        self.grid.toggle_container_class(cell_type, action);
    }

    /// Changing the navigation axis invalidates the transposed index.
    pub fn set_navigation_axis(&mut self, axis: crate::navigation::NavAxis) {
        if self.prefs.navigation_axis != axis {
            self.prefs.navigation_axis = axis;
            self.store.invalidate_index();
        }
    }

    // ========================================================================
    // Disambiguation
    // ========================================================================

    pub fn is_ambiguous_cell(&self) -> bool {
        self.disambiguation.is_ambiguous_cell(&self.grid, &self.validation)
    }

    pub fn cell_was_disambiguated(&self, physical_row: usize, physical_col: usize) -> bool {
        self.disambiguation
            .cell_was_disambiguated(&self.grid, &self.validation, physical_row, physical_col)
    }

    /// Pin the user's choice for one ambiguous match, then refresh
    /// `is_modified` over the affected columns and the aggregate counts.
    pub fn disambiguate(&mut self, physical_row: usize, mapping_path: &[String], record_id: i64) {
        self.disambiguation
            .set_disambiguation(&mut self.grid, physical_row, mapping_path, record_id);
        for col in DisambiguationTracker::ambiguous_columns(&self.validation, physical_row) {
            let value = self.cell_data(physical_row, col);
            self.store.recalculate_is_modified(
                Some(&mut self.grid),
                physical_row,
                col,
                &value,
                true,
            );
        }
        self.store.update_counts(Instant::now());
    }

    pub fn disambiguation(&self, physical_row: usize) -> std::collections::BTreeMap<String, i64> {
        self.disambiguation.get_disambiguation(&self.grid, physical_row)
    }
}
