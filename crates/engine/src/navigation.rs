//! Ordered navigation between classified cells.
//!
//! Navigation walks the store's transposed index: every classified cell
//! mapped to visual coordinates and axis-swapped according to the user's
//! axis preference, ordered by (primary, secondary). The winner is the
//! closest qualifying cell in the requested direction, and the reported
//! relative position drives the "n / total" counter in the UI.

use serde::{Deserialize, Serialize};

use crate::cell_meta::{CellMetaStore, CellType};
use crate::grid::{GridAdapter, ToggleAction};

/// Which axis orders navigation first.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum NavAxis {
    #[default]
    RowFirst,
    ColumnFirst,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Next,
    Previous,
}

/// One navigation request.
#[derive(Debug, Clone)]
pub struct NavigateRequest {
    pub cell_type: CellType,
    pub direction: Direction,
    /// Currently displayed relative position ("n" of "n / total").
    pub current_position: usize,
    /// Total count of cells of this classification.
    pub total_count: usize,
    /// Whether the start cell itself is eligible to win.
    pub match_current_cell: bool,
    /// Start cell in visual coordinates; defaults to the grid selection,
    /// then to the origin.
    pub origin: Option<(usize, usize)>,
}

/// Navigation outcome.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NavigateOutcome {
    /// Selected cell in visual coordinates, if a qualifying cell exists.
    pub cell: Option<(usize, usize)>,
    /// Relative position to display after this request.
    pub position: usize,
}

/// Find, select and report the closest cell of `cell_type` in the
/// requested direction.
///
/// Candidates are walked in index order for `next` and reversed for
/// `previous`, counting cells of the target type seen on the way; the
/// first candidate past the current position wins, and the count gives
/// the relative position (`count` going forward, `total - count + 1`
/// going back).
///
/// The displayed position only moves when a match was found, when the
/// total is zero, or when it is not already holding at the boundary
/// value for this direction. Navigation does not wrap.
pub fn navigate_cells(
    store: &mut CellMetaStore,
    grid: &mut dyn GridAdapter,
    axis: NavAxis,
    request: &NavigateRequest,
) -> NavigateOutcome {
    let start = request
        .origin
        .or_else(|| grid.selected_cell())
        .unwrap_or((0, 0));
    let (current_primary, current_secondary) = match axis {
        NavAxis::RowFirst => start,
        NavAxis::ColumnFirst => (start.1, start.0),
    };

    let within_bounds = |primary: usize, secondary: usize| match request.direction {
        Direction::Next => {
            primary > current_primary
                || (primary == current_primary
                    && if request.match_current_cell {
                        secondary >= current_secondary
                    } else {
                        secondary > current_secondary
                    })
        }
        Direction::Previous => {
            primary < current_primary
                || (primary == current_primary
                    && if request.match_current_cell {
                        secondary <= current_secondary
                    } else {
                        secondary < current_secondary
                    })
        }
    };

    let index = store.transposed_index(grid, axis);
    let mut seen = 0usize;
    let mut matched: Option<((usize, usize), usize)> = None;

    let mut scan = |cell: &crate::cell_meta::IndexedCell| -> bool {
        let type_matches = cell.meta.is_of_type(request.cell_type);
        if type_matches {
            seen += 1;
        }
        if type_matches && within_bounds(cell.primary, cell.secondary) {
            matched = Some(((cell.primary, cell.secondary), seen));
            return true;
        }
        false
    };
    match request.direction {
        Direction::Next => {
            for cell in index {
                if scan(cell) {
                    break;
                }
            }
        }
        Direction::Previous => {
            for cell in index.iter().rev() {
                if scan(cell) {
                    break;
                }
            }
        }
    }

    let boundary = match request.direction {
        Direction::Next => request.total_count,
        Direction::Previous => 1,
    };
    let position = match matched {
        Some((_, count)) => match request.direction {
            Direction::Next => count,
            Direction::Previous => request.total_count + 1 - count,
        },
        None if request.total_count == 0 => 0,
        None if request.current_position != boundary => boundary,
        None => request.current_position,
    };

    let cell = matched.map(|((primary, secondary), _)| match axis {
        NavAxis::RowFirst => (primary, secondary),
        NavAxis::ColumnFirst => (secondary, primary),
    });
    if let Some((visual_row, visual_col)) = cell {
        grid.select_cell(visual_row, visual_col);
        // Force-show the classification in case the user hid it
        grid.toggle_container_class(request.cell_type, ToggleAction::Remove);
    }

    NavigateOutcome { cell, position }
}
