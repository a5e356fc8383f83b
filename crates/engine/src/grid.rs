//! Grid widget boundary.
//!
//! The engine never talks to a concrete spreadsheet widget. Everything it
//! needs is expressed through `GridAdapter`: coordinate translation between
//! the two coordinate spaces, cell reads/writes, and per-cell decoration.
//!
//! Key invariants:
//! - Persisted state is keyed by PHYSICAL coordinates (stable data order)
//! - User-facing navigation and all adapter calls use VISUAL coordinates
//! - Conversion happens at the boundary only, through the adapter

use crate::cell_meta::CellType;

/// A single pending cell write, addressed in visual coordinates.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CellWrite {
    pub visual_row: usize,
    pub visual_col: usize,
    pub value: String,
}

/// The currently rendered viewport, in visual coordinates (inclusive).
///
/// Only used as a rendering hint: cells inside the viewport (plus a small
/// margin) can be decorated through a cached widget reference, cells outside
/// it take the slower lookup path. Correctness never depends on this.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub first_row: usize,
    pub last_row: usize,
    pub first_col: usize,
    pub last_col: usize,
}

impl Region {
    /// Check whether a visual cell falls inside the region grown by `margin`.
    pub fn contains_with_margin(&self, visual_row: usize, visual_col: usize, margin: usize) -> bool {
        visual_row + margin >= self.first_row
            && visual_row <= self.last_row + margin
            && visual_col + margin >= self.first_col
            && visual_col <= self.last_col + margin
    }
}

/// How to change a container-level visibility class.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleAction {
    Add,
    Remove,
    Toggle,
}

/// Capabilities the engine consumes from the spreadsheet widget.
///
/// All row/col arguments are visual unless the name says otherwise. The
/// engine treats a missing adapter (widget not mounted yet) as a silent
/// no-op for visual side effects; state updates still happen.
pub trait GridAdapter {
    fn row_count(&self) -> usize;
    fn col_count(&self) -> usize;

    fn to_visual_row(&self, physical_row: usize) -> usize;
    fn to_visual_col(&self, physical_col: usize) -> usize;
    fn to_physical_row(&self, visual_row: usize) -> usize;
    fn to_physical_col(&self, visual_col: usize) -> usize;

    /// Read a cell. `None` means the cell holds no value at all.
    fn cell_value(&self, visual_row: usize, visual_col: usize) -> Option<String>;
    fn set_cell_value(&mut self, visual_row: usize, visual_col: usize, value: &str);
    /// Batched multi-cell write. One undo entry, one repaint.
    fn set_cells(&mut self, writes: &[CellWrite]);

    /// Toggle a classification class on one cell's rendered element.
    fn toggle_cell_class(&mut self, visual_row: usize, visual_col: usize, class: CellType, enabled: bool);
    /// Attach the issue list as a cell comment. Empty list removes it.
    fn set_cell_comment(&mut self, visual_row: usize, visual_col: usize, issues: &[String]);
    /// Toggle a container-level class hiding a classification's styling.
    fn toggle_container_class(&mut self, class: CellType, action: ToggleAction);

    fn selected_cell(&self) -> Option<(usize, usize)>;
    fn select_cell(&mut self, visual_row: usize, visual_col: usize);

    /// Currently rendered viewport, if the widget is mounted.
    fn visible_region(&self) -> Option<Region>;

    /// Suspend repaints until the matching `end_render_batch`.
    fn begin_render_batch(&mut self) {}
    fn end_render_batch(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_region_contains_with_margin() {
        let region = Region { first_row: 10, last_row: 20, first_col: 2, last_col: 5 };

        assert!(region.contains_with_margin(10, 2, 0));
        assert!(region.contains_with_margin(20, 5, 0));
        assert!(!region.contains_with_margin(9, 2, 0));
        assert!(!region.contains_with_margin(10, 6, 0));

        // Margin of 3 grows the region on every side
        assert!(region.contains_with_margin(7, 2, 3));
        assert!(region.contains_with_margin(23, 8, 3));
        assert!(!region.contains_with_margin(6, 2, 3));
        assert!(!region.contains_with_margin(10, 9, 3));
    }

    #[test]
    fn test_region_margin_near_origin() {
        let region = Region { first_row: 0, last_row: 4, first_col: 0, last_col: 4 };
        // No underflow when the region starts at the origin
        assert!(region.contains_with_margin(0, 0, 3));
        assert!(region.contains_with_margin(7, 7, 3));
        assert!(!region.contains_with_margin(8, 0, 3));
    }
}
