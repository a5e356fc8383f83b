//! Test doubles for the engine's external collaborators.
//!
//! `MockGrid` stands in for the spreadsheet widget: it records every
//! decoration call, supports visual reordering, and exposes counters so
//! tests can assert on batching and no-op behavior. `QueueValidator`
//! plays the remote validation service from a scripted result queue.

use std::cell::RefCell;
use std::collections::VecDeque;

use rustc_hash::{FxHashMap, FxHashSet};

use crate::cell_meta::CellType;
use crate::grid::{CellWrite, GridAdapter, Region, ToggleAction};
use crate::results::{RecordResult, RowResultNode};
use crate::validation::{CellSubmission, RowValidator, ValidationError};

/// In-memory grid widget double. Coordinates are visual; the physical to
/// visual permutation is configurable per axis (identity by default).
pub struct MockGrid {
    rows: usize,
    cols: usize,
    /// `row_order[physical] = visual`.
    row_order: Option<Vec<usize>>,
    col_order: Option<Vec<usize>>,
    values: FxHashMap<(usize, usize), String>,
    classes: FxHashSet<(usize, usize, CellType)>,
    comments: FxHashMap<(usize, usize), Vec<String>>,
    hidden: FxHashSet<CellType>,
    selected: Option<(usize, usize)>,
    region: Option<Region>,
    decoration_calls: usize,
    write_count: usize,
    batched_writes: usize,
    batch_depth: usize,
    render_batches: usize,
}

impl MockGrid {
    pub fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            row_order: None,
            col_order: None,
            values: FxHashMap::default(),
            classes: FxHashSet::default(),
            comments: FxHashMap::default(),
            hidden: FxHashSet::default(),
            selected: None,
            region: None,
            decoration_calls: 0,
            write_count: 0,
            batched_writes: 0,
            batch_depth: 0,
            render_batches: 0,
        }
    }

    pub fn set_row_order(&mut self, order: Vec<usize>) {
        assert_eq!(order.len(), self.rows);
        self.row_order = Some(order);
    }

    pub fn set_col_order(&mut self, order: Vec<usize>) {
        assert_eq!(order.len(), self.cols);
        self.col_order = Some(order);
    }

    /// Place a value directly, bypassing the write counters.
    pub fn seed_value(&mut self, visual_row: usize, visual_col: usize, value: &str) {
        self.values.insert((visual_row, visual_col), value.to_string());
    }

    pub fn set_visible_region(&mut self, region: Region) {
        self.region = Some(region);
    }

    pub fn has_cell_class(&self, visual_row: usize, visual_col: usize, class: CellType) -> bool {
        self.classes.contains(&(visual_row, visual_col, class))
    }

    pub fn comment(&self, visual_row: usize, visual_col: usize) -> Vec<String> {
        self.comments.get(&(visual_row, visual_col)).cloned().unwrap_or_default()
    }

    pub fn container_class_hidden(&self, class: CellType) -> bool {
        self.hidden.contains(&class)
    }

    /// Total class toggles and comment updates seen so far.
    pub fn decoration_calls(&self) -> usize {
        self.decoration_calls
    }

    /// Single-cell writes seen so far (seeding excluded).
    pub fn write_count(&self) -> usize {
        self.write_count
    }

    /// Batched multi-cell writes seen so far.
    pub fn batched_writes(&self) -> usize {
        self.batched_writes
    }

    /// Completed render batches.
    pub fn render_batches(&self) -> usize {
        self.render_batches
    }
}

impl GridAdapter for MockGrid {
    fn row_count(&self) -> usize {
        self.rows
    }

    fn col_count(&self) -> usize {
        self.cols
    }

    fn to_visual_row(&self, physical_row: usize) -> usize {
        self.row_order.as_ref().map_or(physical_row, |order| order[physical_row])
    }

    fn to_visual_col(&self, physical_col: usize) -> usize {
        self.col_order.as_ref().map_or(physical_col, |order| order[physical_col])
    }

    fn to_physical_row(&self, visual_row: usize) -> usize {
        self.row_order
            .as_ref()
            .and_then(|order| order.iter().position(|&v| v == visual_row))
            .unwrap_or(visual_row)
    }

    fn to_physical_col(&self, visual_col: usize) -> usize {
        self.col_order
            .as_ref()
            .and_then(|order| order.iter().position(|&v| v == visual_col))
            .unwrap_or(visual_col)
    }

    fn cell_value(&self, visual_row: usize, visual_col: usize) -> Option<String> {
        self.values.get(&(visual_row, visual_col)).cloned()
    }

    fn set_cell_value(&mut self, visual_row: usize, visual_col: usize, value: &str) {
        self.write_count += 1;
        self.values.insert((visual_row, visual_col), value.to_string());
    }

    fn set_cells(&mut self, writes: &[CellWrite]) {
        self.batched_writes += 1;
        for write in writes {
            self.values.insert((write.visual_row, write.visual_col), write.value.clone());
        }
    }

    fn toggle_cell_class(
        &mut self,
        visual_row: usize,
        visual_col: usize,
        class: CellType,
        enabled: bool,
    ) {
        self.decoration_calls += 1;
        let key = (visual_row, visual_col, class);
        if enabled {
            self.classes.insert(key);
        } else {
            self.classes.remove(&key);
        }
    }

    fn set_cell_comment(&mut self, visual_row: usize, visual_col: usize, issues: &[String]) {
        self.decoration_calls += 1;
        let key = (visual_row, visual_col);
        if issues.is_empty() {
            self.comments.remove(&key);
        } else {
            self.comments.insert(key, issues.to_vec());
        }
    }

    fn toggle_container_class(&mut self, class: CellType, action: ToggleAction) {
        match action {
            ToggleAction::Add => {
                self.hidden.insert(class);
            }
            ToggleAction::Remove => {
                self.hidden.remove(&class);
            }
            ToggleAction::Toggle => {
                if !self.hidden.remove(&class) {
                    self.hidden.insert(class);
                }
            }
        }
    }

    fn selected_cell(&self) -> Option<(usize, usize)> {
        self.selected
    }

    fn select_cell(&mut self, visual_row: usize, visual_col: usize) {
        self.selected = Some((visual_row, visual_col));
    }

    fn visible_region(&self) -> Option<Region> {
        self.region
    }

    fn begin_render_batch(&mut self) {
        self.batch_depth += 1;
    }

    fn end_render_batch(&mut self) {
        self.batch_depth = self.batch_depth.saturating_sub(1);
        if self.batch_depth == 0 {
            self.render_batches += 1;
        }
    }
}

/// Scripted validation service. Results are served in call order; every
/// submission is recorded for later assertions.
pub struct QueueValidator {
    results: RefCell<VecDeque<RowResultNode>>,
    unlimited: bool,
    fail_after: Option<usize>,
    submissions: RefCell<Vec<(usize, Vec<CellSubmission>)>>,
}

impl QueueValidator {
    pub fn new(results: Vec<RowResultNode>) -> Self {
        Self {
            results: RefCell::new(results.into()),
            unlimited: false,
            fail_after: None,
            submissions: RefCell::new(Vec::new()),
        }
    }

    /// Answers every call with a clean (effect-free) result.
    pub fn unlimited_clean() -> Self {
        Self { unlimited: true, ..Self::new(Vec::new()) }
    }

    /// Answers `calls` clean results, then fails with a transport error.
    pub fn failing_after(calls: usize) -> Self {
        Self { unlimited: true, fail_after: Some(calls), ..Self::new(Vec::new()) }
    }

    /// Physical rows submitted so far, in call order.
    pub fn submitted_rows(&self) -> Vec<usize> {
        self.submissions.borrow().iter().map(|(row, _)| *row).collect()
    }

    /// The cells of the n-th submission.
    pub fn submission(&self, index: usize) -> Vec<CellSubmission> {
        self.submissions.borrow()[index].1.clone()
    }
}

impl RowValidator for QueueValidator {
    fn validate_row(
        &self,
        physical_row: usize,
        cells: &[CellSubmission],
    ) -> Result<RowResultNode, ValidationError> {
        self.submissions.borrow_mut().push((physical_row, cells.to_vec()));
        if let Some(limit) = self.fail_after {
            if self.submissions.borrow().len() > limit {
                return Err(ValidationError::Transport("connection reset".to_string()));
            }
        }
        if self.unlimited {
            return Ok(RowResultNode::leaf(RecordResult::NullRecord {}));
        }
        self.results.borrow_mut().pop_front().ok_or_else(|| ValidationError::Protocol {
            row: physical_row,
            detail: "no scripted result left".to_string(),
        })
    }
}
