//! Cell metadata store.
//!
//! Single source of truth for per-cell classification state: what is new,
//! modified, invalid, a search match, or the outcome of a batch-edit
//! upload. The store owns the aggregate counts the UI renders and the
//! transposed index used for ordered navigation.
//!
//! Key invariants:
//! - All state is keyed by PHYSICAL coordinates
//! - The default vector is shared and never mutated (copy-on-write)
//! - `is_modified` is derived, never set directly by external callers
//! - No-op writes short-circuit and leave the transposed index alone

use std::time::Instant;

use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::grid::GridAdapter;
use crate::navigation::NavAxis;
use crate::throttle::Throttle;

/// Issues carrying this suffix come from a front-end picklist check. Their
/// presence suppresses the `is_modified` flag so the error styling stays
/// visible. Deliberately narrow: other front-end issues do not suppress.
pub const FRONT_END_ISSUE_SUFFIX: &str = "is not a legal value in this picklist";

/// The shared all-defaults vector. Never handed out mutably.
static DEFAULT_META: CellMeta = CellMeta {
    is_new: false,
    is_modified: false,
    is_search_result: false,
    issues: Vec::new(),
    original_value: None,
    is_updated: false,
    is_deleted: false,
    is_matched_and_changed: false,
};

/// Per-cell state vector.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellMeta {
    /// Created by an upload operation.
    pub is_new: bool,
    /// Derived: value differs from `original_value`, or the row was
    /// disambiguated. See `CellMetaStore::recalculate_is_modified`.
    pub is_modified: bool,
    /// Matches the active search query.
    pub is_search_result: bool,
    /// Validation messages, in insertion order.
    pub issues: Vec<String>,
    /// Value captured at first edit. `None` means never edited this session.
    pub original_value: Option<String>,
    pub is_updated: bool,
    pub is_deleted: bool,
    pub is_matched_and_changed: bool,
}

impl CellMeta {
    /// Pure classifier shared by counting and navigation.
    pub fn is_of_type(&self, cell_type: CellType) -> bool {
        match cell_type {
            CellType::New => self.is_new,
            CellType::Invalid => !self.issues.is_empty(),
            CellType::SearchResult => self.is_search_result,
            CellType::Modified => self.is_modified,
            CellType::Updated => self.is_updated,
            CellType::Deleted => self.is_deleted,
            CellType::MatchedAndChanged => self.is_matched_and_changed,
        }
    }

    /// True for any classification produced by a batch-edit/update upload.
    pub fn is_result_cell(&self) -> bool {
        self.is_new || self.is_updated || self.is_deleted || self.is_matched_and_changed
    }
}

/// Cell classifications the UI can count, navigate and hide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum CellType {
    New,
    Invalid,
    SearchResult,
    Modified,
    Updated,
    Deleted,
    MatchedAndChanged,
}

impl CellType {
    pub const ALL: [CellType; 7] = [
        CellType::New,
        CellType::Invalid,
        CellType::SearchResult,
        CellType::Modified,
        CellType::Updated,
        CellType::Deleted,
        CellType::MatchedAndChanged,
    ];

    /// Class toggled on a cell's rendered element (or, prefixed, on the
    /// container to hide the classification).
    pub fn css_class(self) -> &'static str {
        match self {
            CellType::New => "wb-new-cell",
            CellType::Invalid => "wb-invalid-cell",
            CellType::SearchResult => "wb-search-match-cell",
            CellType::Modified => "wb-modified-cell",
            CellType::Updated => "wb-updated-cell",
            CellType::Deleted => "wb-deleted-cell",
            CellType::MatchedAndChanged => "wb-matched-and-changed-cell",
        }
    }
}

/// One field write against a cell's meta vector. Being a sum type, an
/// unknown key is a compile error rather than a runtime throw.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaUpdate {
    IsNew(bool),
    IsModified(bool),
    IsSearchResult(bool),
    Issues(Vec<String>),
    OriginalValue(Option<String>),
    IsUpdated(bool),
    IsDeleted(bool),
    IsMatchedAndChanged(bool),
}

/// Aggregate counts per classification, one integer each.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CellCounts {
    pub new_cells: usize,
    pub invalid_cells: usize,
    pub search_results: usize,
    pub modified_cells: usize,
    pub updated_cells: usize,
    pub deleted_cells: usize,
    pub matched_and_changed_cells: usize,
}

impl CellCounts {
    pub fn get(&self, cell_type: CellType) -> usize {
        match cell_type {
            CellType::New => self.new_cells,
            CellType::Invalid => self.invalid_cells,
            CellType::SearchResult => self.search_results,
            CellType::Modified => self.modified_cells,
            CellType::Updated => self.updated_cells,
            CellType::Deleted => self.deleted_cells,
            CellType::MatchedAndChanged => self.matched_and_changed_cells,
        }
    }

    fn slot(&mut self, cell_type: CellType) -> &mut usize {
        match cell_type {
            CellType::New => &mut self.new_cells,
            CellType::Invalid => &mut self.invalid_cells,
            CellType::SearchResult => &mut self.search_results,
            CellType::Modified => &mut self.modified_cells,
            CellType::Updated => &mut self.updated_cells,
            CellType::Deleted => &mut self.deleted_cells,
            CellType::MatchedAndChanged => &mut self.matched_and_changed_cells,
        }
    }
}

/// One entry of the transposed navigation index: a classified cell mapped
/// to visual coordinates, axis-swapped for column-first navigation.
#[derive(Debug, Clone)]
pub struct IndexedCell {
    pub primary: usize,
    pub secondary: usize,
    pub meta: CellMeta,
}

/// Sparse row-to-column table of cell meta vectors plus derived aggregates.
#[derive(Debug)]
pub struct CellMetaStore {
    meta: FxHashMap<usize, FxHashMap<usize, CellMeta>>,
    counts: CellCounts,
    index: Vec<IndexedCell>,
    index_stale: bool,
    index_axis: NavAxis,
    resync: Throttle,
}

impl Default for CellMetaStore {
    fn default() -> Self {
        Self::new(0)
    }
}

impl CellMetaStore {
    /// Create a store for a dataset of roughly `cell_count` cells. The
    /// count only tunes the resync throttle.
    pub fn new(cell_count: usize) -> Self {
        Self {
            meta: FxHashMap::default(),
            counts: CellCounts::default(),
            index: Vec::new(),
            index_stale: true,
            index_axis: NavAxis::RowFirst,
            resync: Throttle::scaled_to(cell_count),
        }
    }

    pub fn set_dataset_size(&mut self, cell_count: usize) {
        self.resync.rescale(cell_count);
    }

    /// Read a cell's meta vector. Cells never written return the shared
    /// default vector.
    pub fn get(&self, physical_row: usize, physical_col: usize) -> &CellMeta {
        self.meta
            .get(&physical_row)
            .and_then(|cols| cols.get(&physical_col))
            .unwrap_or(&DEFAULT_META)
    }

    /// Current aggregate counts, maintained incrementally on every write.
    pub fn counts(&self) -> &CellCounts {
        &self.counts
    }

    /// Apply one field write. Returns whether the value actually changed;
    /// no-op writes short-circuit without invalidating the index.
    pub fn set_meta(&mut self, physical_row: usize, physical_col: usize, update: MetaUpdate) -> bool {
        let existing = self.get(physical_row, physical_col);
        let changed = match &update {
            MetaUpdate::IsNew(v) => existing.is_new != *v,
            MetaUpdate::IsModified(v) => existing.is_modified != *v,
            MetaUpdate::IsSearchResult(v) => existing.is_search_result != *v,
            MetaUpdate::Issues(v) => existing.issues != *v,
            MetaUpdate::OriginalValue(v) => existing.original_value != *v,
            MetaUpdate::IsUpdated(v) => existing.is_updated != *v,
            MetaUpdate::IsDeleted(v) => existing.is_deleted != *v,
            MetaUpdate::IsMatchedAndChanged(v) => existing.is_matched_and_changed != *v,
        };
        if !changed {
            return false;
        }

        // Copy-on-write: materialize an owned vector only now
        let cell = self
            .meta
            .entry(physical_row)
            .or_default()
            .entry(physical_col)
            .or_default();
        let before = cell.clone();
        match update {
            MetaUpdate::IsNew(v) => cell.is_new = v,
            MetaUpdate::IsModified(v) => cell.is_modified = v,
            MetaUpdate::IsSearchResult(v) => cell.is_search_result = v,
            MetaUpdate::Issues(v) => cell.issues = v,
            MetaUpdate::OriginalValue(v) => cell.original_value = v,
            MetaUpdate::IsUpdated(v) => cell.is_updated = v,
            MetaUpdate::IsDeleted(v) => cell.is_deleted = v,
            MetaUpdate::IsMatchedAndChanged(v) => cell.is_matched_and_changed = v,
        }
        let after = cell.clone();

        for cell_type in CellType::ALL {
            let was = before.is_of_type(cell_type);
            let is = after.is_of_type(cell_type);
            if was != is {
                let slot = self.counts.slot(cell_type);
                *slot = if is { *slot + 1 } else { slot.saturating_sub(1) };
            }
        }

        self.index_stale = true;
        true
    }

    /// `set_meta` plus the visual side effect on the grid widget. Boolean
    /// flags toggle a CSS class, the issue list attaches or removes a
    /// comment, `original_value` has no visual.
    ///
    /// `hint` skips the physical-to-visual round trip when the caller
    /// already resolved the visual coordinates. A missing grid silently
    /// skips the visual (widget not mounted yet); state still updates.
    pub fn update_meta(
        &mut self,
        grid: Option<&mut (dyn GridAdapter + '_)>,
        physical_row: usize,
        physical_col: usize,
        update: MetaUpdate,
        hint: Option<(usize, usize)>,
    ) -> bool {
        enum Effect {
            Class(CellType, bool),
            Comment(Vec<String>),
            None,
        }
        let effect = match &update {
            MetaUpdate::IsNew(v) => Effect::Class(CellType::New, *v),
            MetaUpdate::IsModified(v) => Effect::Class(CellType::Modified, *v),
            MetaUpdate::IsSearchResult(v) => Effect::Class(CellType::SearchResult, *v),
            MetaUpdate::IsUpdated(v) => Effect::Class(CellType::Updated, *v),
            MetaUpdate::IsDeleted(v) => Effect::Class(CellType::Deleted, *v),
            MetaUpdate::IsMatchedAndChanged(v) => Effect::Class(CellType::MatchedAndChanged, *v),
            MetaUpdate::Issues(v) => Effect::Comment(v.clone()),
            MetaUpdate::OriginalValue(_) => Effect::None,
        };

        let changed = self.set_meta(physical_row, physical_col, update);
        if !changed {
            return false;
        }
        if let Some(grid) = grid {
            let (visual_row, visual_col) = hint.unwrap_or_else(|| {
                (grid.to_visual_row(physical_row), grid.to_visual_col(physical_col))
            });
            match effect {
                Effect::Class(class, enabled) => {
                    grid.toggle_cell_class(visual_row, visual_col, class, enabled)
                }
                Effect::Comment(issues) => grid.set_cell_comment(visual_row, visual_col, &issues),
                Effect::None => {}
            }
        }
        true
    }

    /// Re-derive `is_modified` for one cell.
    ///
    /// modified = no suppressing front-end issue present, AND (original
    /// value captured and different from the current value, OR the row was
    /// disambiguated). The suppression keeps error styling visible instead
    /// of masking it with modified styling.
    pub fn recalculate_is_modified(
        &mut self,
        grid: Option<&mut (dyn GridAdapter + '_)>,
        physical_row: usize,
        physical_col: usize,
        current_value: &str,
        row_disambiguated: bool,
    ) -> bool {
        let meta = self.get(physical_row, physical_col);
        let suppressed = meta
            .issues
            .iter()
            .any(|issue| issue.ends_with(FRONT_END_ISSUE_SUFFIX));
        let edited = matches!(&meta.original_value, Some(original) if original != current_value);
        let modified = !suppressed && (edited || row_disambiguated);
        self.update_meta(
            grid,
            physical_row,
            physical_col,
            MetaUpdate::IsModified(modified),
            None,
        );
        modified
    }

    /// Throttled consistency resync of the aggregate counts via a full
    /// rescan. The incremental accumulator is the primary mechanism; this
    /// guards against drift. Returns whether the rescan ran.
    pub fn update_counts(&mut self, now: Instant) -> bool {
        if !self.resync.poll(now) {
            return false;
        }
        self.recount();
        true
    }

    /// Unthrottled full recount.
    pub fn recount(&mut self) {
        let mut counts = CellCounts::default();
        for cols in self.meta.values() {
            for meta in cols.values() {
                for cell_type in CellType::ALL {
                    if meta.is_of_type(cell_type) {
                        *counts.slot(cell_type) += 1;
                    }
                }
            }
        }
        self.counts = counts;
    }

    /// Drop all meta vectors, undoing their visual decorations when a grid
    /// is attached.
    pub fn clear_all(&mut self, grid: Option<&mut (dyn GridAdapter + '_)>) {
        let table = std::mem::take(&mut self.meta);
        self.counts = CellCounts::default();
        self.index_stale = true;

        let Some(grid) = grid else { return };
        grid.begin_render_batch();
        for (&physical_row, cols) in &table {
            let visual_row = grid.to_visual_row(physical_row);
            for (&physical_col, meta) in cols {
                let visual_col = grid.to_visual_col(physical_col);
                for cell_type in [
                    CellType::New,
                    CellType::SearchResult,
                    CellType::Modified,
                    CellType::Updated,
                    CellType::Deleted,
                    CellType::MatchedAndChanged,
                ] {
                    if meta.is_of_type(cell_type) {
                        grid.toggle_cell_class(visual_row, visual_col, cell_type, false);
                    }
                }
                if !meta.issues.is_empty() {
                    grid.set_cell_comment(visual_row, visual_col, &[]);
                }
            }
        }
        grid.end_render_batch();
    }

    /// Shift physical row keys after a row insertion.
    pub fn insert_row(&mut self, physical_row: usize) {
        let table = std::mem::take(&mut self.meta);
        self.meta = table
            .into_iter()
            .map(|(row, cols)| (if row >= physical_row { row + 1 } else { row }, cols))
            .collect();
        self.index_stale = true;
    }

    /// Drop a row's meta and shift the keys above it down.
    pub fn remove_row(&mut self, physical_row: usize) {
        if let Some(cols) = self.meta.remove(&physical_row) {
            for meta in cols.values() {
                for cell_type in CellType::ALL {
                    if meta.is_of_type(cell_type) {
                        let slot = self.counts.slot(cell_type);
                        *slot = slot.saturating_sub(1);
                    }
                }
            }
        }
        let table = std::mem::take(&mut self.meta);
        self.meta = table
            .into_iter()
            .map(|(row, cols)| (if row > physical_row { row - 1 } else { row }, cols))
            .collect();
        self.index_stale = true;
    }

    /// Mark the transposed index stale without touching any meta. Called on
    /// row/column structure changes and navigation-axis changes.
    pub fn invalidate_index(&mut self) {
        self.index_stale = true;
    }

    #[cfg(test)]
    pub(crate) fn index_is_stale(&self) -> bool {
        self.index_stale
    }

    /// The transposed navigation index: every classified cell mapped
    /// through physical-to-visual resolution, axis-swapped when navigating
    /// column first, ordered by (primary, secondary). Rebuilt on demand;
    /// never a source of truth.
    pub fn transposed_index(&mut self, grid: &dyn GridAdapter, axis: NavAxis) -> &[IndexedCell] {
        if self.index_stale || axis != self.index_axis {
            let mut index: Vec<IndexedCell> = Vec::new();
            for (&physical_row, cols) in &self.meta {
                let visual_row = grid.to_visual_row(physical_row);
                for (&physical_col, meta) in cols {
                    let visual_col = grid.to_visual_col(physical_col);
                    let (primary, secondary) = match axis {
                        NavAxis::RowFirst => (visual_row, visual_col),
                        NavAxis::ColumnFirst => (visual_col, visual_row),
                    };
                    index.push(IndexedCell { primary, secondary, meta: meta.clone() });
                }
            }
            index.sort_unstable_by_key(|c| (c.primary, c.secondary));
            self.index = index;
            self.index_stale = false;
            self.index_axis = axis;
        }
        &self.index
    }

    /// Iterate all stored cells as (physical_row, physical_col, meta).
    pub fn iter(&self) -> impl Iterator<Item = (usize, usize, &CellMeta)> {
        self.meta.iter().flat_map(|(&row, cols)| {
            cols.iter().map(move |(&col, meta)| (row, col, meta))
        })
    }
}
