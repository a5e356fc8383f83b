//! Search and replace over the dataset.
//!
//! A query compiles once (literal or regex, with the configured case and
//! full-match handling folded in), then a full physical-grid scan flags
//! matching cells in their meta vectors. Replacement reuses the compiled
//! query: full-match swaps whole values, substring and regex modes
//! substitute within them.
//!
//! A malformed regex is user input, not a bug: it surfaces as a
//! `SearchParseError` the UI shows as a field-level validity message.

use std::fmt;

use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};

use crate::cell_meta::{CellMetaStore, CellType, MetaUpdate};
use crate::grid::{CellWrite, GridAdapter};
use crate::mappings::Mappings;
use crate::navigation::{navigate_cells, Direction, NavAxis, NavigateOutcome, NavigateRequest};

/// Viewport margin (rows and columns) inside which cell decoration may use
/// a cached widget reference.
pub const SEARCH_VIEWPORT_MARGIN: usize = 3;

// ============================================================================
// Preferences
// ============================================================================

/// What to do on a replace command.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ReplaceMode {
    #[default]
    ReplaceAll,
    ReplaceNext,
}

/// User-facing search configuration, persisted across sessions.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SearchPreferences {
    /// Match whole cell values instead of substrings.
    pub full_match: bool,
    pub case_sensitive: bool,
    pub use_regex: bool,
    /// Re-run the search on every keystroke in the query field.
    pub live_update: bool,
    pub navigation_axis: NavAxis,
    pub replace_mode: ReplaceMode,
}

impl Default for SearchPreferences {
    fn default() -> Self {
        Self {
            full_match: false,
            case_sensitive: false,
            use_regex: false,
            live_update: true,
            navigation_axis: NavAxis::RowFirst,
            replace_mode: ReplaceMode::ReplaceAll,
        }
    }
}

// ============================================================================
// Query compilation
// ============================================================================

/// The query text could not be compiled (invalid regex).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchParseError {
    pub pattern: String,
    pub detail: String,
}

impl fmt::Display for SearchParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid search pattern {:?}: {}", self.pattern, self.detail)
    }
}

impl std::error::Error for SearchParseError {}

#[derive(Debug, Clone)]
enum Matcher {
    /// Full-match literal; the needle is case-folded when insensitive.
    Exact(String),
    /// Substring literal, compiled as an escaped regex so matching and
    /// substitution share one code path.
    Substring(Regex),
    /// User-supplied regex, anchored when full-match is on.
    Pattern(Regex),
}

/// A search query compiled against one preferences snapshot.
#[derive(Debug, Clone)]
pub struct CompiledSearch {
    matcher: Matcher,
    full_match: bool,
    case_sensitive: bool,
}

/// Compile the raw query text under the given preferences.
pub fn parse_search_query(
    raw: &str,
    prefs: &SearchPreferences,
) -> Result<CompiledSearch, SearchParseError> {
    let build = |pattern: &str| {
        RegexBuilder::new(pattern)
            .case_insensitive(!prefs.case_sensitive)
            .build()
            .map_err(|err| SearchParseError {
                pattern: raw.to_string(),
                detail: err.to_string(),
            })
    };

    let matcher = if prefs.use_regex {
        let pattern = if prefs.full_match {
            format!("^(?:{raw})$")
        } else {
            raw.to_string()
        };
        Matcher::Pattern(build(&pattern)?)
    } else {
        let needle = raw.trim();
        if prefs.full_match {
            let needle =
                if prefs.case_sensitive { needle.to_string() } else { needle.to_lowercase() };
            Matcher::Exact(needle)
        } else {
            Matcher::Substring(build(&regex::escape(needle))?)
        }
    };

    Ok(CompiledSearch {
        matcher,
        full_match: prefs.full_match,
        case_sensitive: prefs.case_sensitive,
    })
}

impl CompiledSearch {
    /// An empty query matches nothing; the scan clears all search flags.
    pub fn is_empty(&self) -> bool {
        match &self.matcher {
            Matcher::Exact(needle) => needle.is_empty(),
            Matcher::Substring(re) | Matcher::Pattern(re) => re.as_str().is_empty(),
        }
    }

    pub fn matches(&self, value: &str) -> bool {
        if self.is_empty() {
            return false;
        }
        match &self.matcher {
            Matcher::Exact(needle) => {
                if self.case_sensitive {
                    value == needle
                } else {
                    value.to_lowercase() == *needle
                }
            }
            Matcher::Substring(re) | Matcher::Pattern(re) => re.is_match(value),
        }
    }

    /// Compute the replaced value of one matching cell. Full-match swaps
    /// the whole value; substring and regex modes substitute in place.
    pub fn replacement(&self, current: &str, with: &str) -> String {
        if self.full_match {
            return with.to_string();
        }
        match &self.matcher {
            Matcher::Exact(_) => with.to_string(),
            Matcher::Substring(re) => re.replace_all(current, regex::NoExpand(with)).into_owned(),
            Matcher::Pattern(re) => re.replace_all(current, with).into_owned(),
        }
    }
}

// ============================================================================
// Operations
// ============================================================================

/// Full scan over physical coordinates, flagging matching cells. Empty
/// cells compare against their column's default value. Returns the hit
/// count.
///
/// Cells inside the rendered viewport (grown by [`SEARCH_VIEWPORT_MARGIN`])
/// get their visual coordinates passed down as a decoration hint; the rest
/// take the slower lookup path inside the store.
pub fn search_cells(
    store: &mut CellMetaStore,
    grid: &mut dyn GridAdapter,
    mappings: &Mappings,
    query: &CompiledSearch,
) -> usize {
    let region = grid.visible_region();
    let mut hits = 0;

    grid.begin_render_batch();
    for row in 0..grid.row_count() {
        for col in 0..mappings.column_count() {
            let visual_row = grid.to_visual_row(row);
            let visual_col = grid.to_visual_col(col);
            let value = grid.cell_value(visual_row, visual_col);
            let value = match value.as_deref() {
                Some(v) if !v.is_empty() => v,
                _ => mappings.default_value(col).unwrap_or(""),
            };

            let hit = query.matches(value);
            if hit {
                hits += 1;
            }
            let hint = region
                .filter(|r| r.contains_with_margin(visual_row, visual_col, SEARCH_VIEWPORT_MARGIN))
                .map(|_| (visual_row, visual_col));
            store.update_meta(
                Some(&mut *grid),
                row,
                col,
                MetaUpdate::IsSearchResult(hit),
                hint,
            );
        }
    }
    grid.end_render_batch();
    hits
}

/// Replace every cell currently flagged as a search result, as one batched
/// multi-cell write. Cells whose current value is empty are skipped so
/// column defaults are never overwritten. Returns the number of cells
/// written.
pub fn replace_all(
    store: &CellMetaStore,
    grid: &mut dyn GridAdapter,
    query: &CompiledSearch,
    with: &str,
) -> usize {
    let mut writes = Vec::new();
    for (row, col, meta) in store.iter() {
        if !meta.is_search_result {
            continue;
        }
        let visual_row = grid.to_visual_row(row);
        let visual_col = grid.to_visual_col(col);
        let current = match grid.cell_value(visual_row, visual_col) {
            Some(v) if !v.is_empty() => v,
            _ => continue,
        };
        let replaced = query.replacement(&current, with);
        if replaced != current {
            writes.push(CellWrite { visual_row, visual_col, value: replaced });
        }
    }
    if !writes.is_empty() {
        grid.set_cells(&writes);
    }
    writes.len()
}

/// Replace the search result under the selection and advance to the next
/// one. When the selection is not itself a search result, navigate to the
/// next result first and replace that.
pub fn replace_next(
    store: &mut CellMetaStore,
    grid: &mut dyn GridAdapter,
    axis: NavAxis,
    query: &CompiledSearch,
    with: &str,
    total_count: usize,
    current_position: usize,
) -> NavigateOutcome {
    let selected = grid.selected_cell();
    let on_result = selected.is_some_and(|(visual_row, visual_col)| {
        let row = grid.to_physical_row(visual_row);
        let col = grid.to_physical_col(visual_col);
        store.get(row, col).is_search_result
    });

    let mut position = current_position;
    let target = if on_result {
        selected
    } else {
        let outcome = navigate_cells(
            store,
            grid,
            axis,
            &NavigateRequest {
                cell_type: CellType::SearchResult,
                direction: Direction::Next,
                current_position,
                total_count,
                match_current_cell: true,
                origin: None,
            },
        );
        position = outcome.position;
        outcome.cell
    };

    let Some((visual_row, visual_col)) = target else {
        return NavigateOutcome { cell: None, position };
    };

    if let Some(current) = grid.cell_value(visual_row, visual_col) {
        if !current.is_empty() {
            let replaced = query.replacement(&current, with);
            grid.set_cell_value(visual_row, visual_col, &replaced);
        }
    }

    navigate_cells(
        store,
        grid,
        axis,
        &NavigateRequest {
            cell_type: CellType::SearchResult,
            direction: Direction::Next,
            current_position: position,
            total_count,
            match_current_cell: false,
            origin: Some((visual_row, visual_col)),
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::harness::MockGrid;
    use crate::mappings::ColumnMapping;

    fn prefs() -> SearchPreferences {
        SearchPreferences::default()
    }

    fn mappings(headers: &[&str]) -> Mappings {
        Mappings::new(
            headers
                .iter()
                .map(|h| ColumnMapping {
                    header: h.to_string(),
                    path: vec![h.to_lowercase()],
                    table: "Taxon".to_string(),
                    default_value: None,
                })
                .collect(),
            Vec::new(),
        )
    }

    #[test]
    fn test_invalid_regex_is_recoverable() {
        let mut p = prefs();
        p.use_regex = true;
        let err = parse_search_query("fel(", &p).unwrap_err();
        assert_eq!(err.pattern, "fel(");
        assert!(!err.detail.is_empty());
    }

    #[test]
    fn test_full_match_vs_substring() {
        let value = "Felis catus";

        let mut full = prefs();
        full.full_match = true;
        full.case_sensitive = true;
        let query = parse_search_query("Felis", &full).unwrap();
        assert!(!query.matches(value));

        let mut sub = prefs();
        sub.case_sensitive = true;
        let query = parse_search_query("Felis", &sub).unwrap();
        assert!(query.matches(value));

        // Case-insensitive substring folds both sides
        let query = parse_search_query("felis", &prefs()).unwrap();
        assert!(query.matches(value));
    }

    #[test]
    fn test_full_match_literal_case_folding() {
        let mut p = prefs();
        p.full_match = true;
        let query = parse_search_query("  FELIS CATUS ", &p).unwrap();
        assert!(query.matches("Felis catus"));
        assert!(!query.matches("Felis"));
    }

    #[test]
    fn test_regex_full_match_is_anchored() {
        let mut p = prefs();
        p.use_regex = true;
        p.full_match = true;
        let query = parse_search_query("[A-Z][a-z]+", &p).unwrap();
        assert!(query.matches("Felis"));
        assert!(!query.matches("Felis catus"));
    }

    #[test]
    fn test_empty_query_matches_nothing() {
        let query = parse_search_query("   ", &prefs()).unwrap();
        assert!(query.is_empty());
        assert!(!query.matches("anything"));
        assert!(!query.matches(""));
    }

    #[test]
    fn test_search_cells_flags_matches() {
        let mut store = CellMetaStore::new(0);
        let mut grid = MockGrid::new(2, 2);
        grid.seed_value(0, 0, "Felis catus");
        grid.seed_value(0, 1, "Rattus rattus");
        grid.seed_value(1, 0, "felis silvestris");
        let mappings = mappings(&["A", "B"]);

        let query = parse_search_query("felis", &prefs()).unwrap();
        let hits = search_cells(&mut store, &mut grid, &mappings, &query);

        assert_eq!(hits, 2);
        assert!(store.get(0, 0).is_search_result);
        assert!(!store.get(0, 1).is_search_result);
        assert!(store.get(1, 0).is_search_result);
        assert_eq!(store.counts().search_results, 2);

        // A narrower query clears the stale flags
        let query = parse_search_query("silvestris", &prefs()).unwrap();
        let hits = search_cells(&mut store, &mut grid, &mappings, &query);
        assert_eq!(hits, 1);
        assert!(!store.get(0, 0).is_search_result);
        assert_eq!(store.counts().search_results, 1);
    }

    #[test]
    fn test_search_uses_column_default_for_empty_cells() {
        let mut store = CellMetaStore::new(0);
        let mut grid = MockGrid::new(1, 1);
        let mappings = Mappings::new(
            vec![ColumnMapping {
                header: "Country".to_string(),
                path: vec!["country".to_string()],
                table: "Geography".to_string(),
                default_value: Some("Brazil".to_string()),
            }],
            Vec::new(),
        );

        let query = parse_search_query("brazil", &prefs()).unwrap();
        let hits = search_cells(&mut store, &mut grid, &mappings, &query);
        assert_eq!(hits, 1);
        assert!(store.get(0, 0).is_search_result);
    }

    #[test]
    fn test_replace_all_skips_empty_cells() {
        let mut store = CellMetaStore::new(0);
        let mut grid = MockGrid::new(2, 1);
        grid.seed_value(0, 0, "abc");
        let mappings = Mappings::new(
            vec![ColumnMapping {
                header: "A".to_string(),
                path: vec!["a".to_string()],
                table: "Taxon".to_string(),
                default_value: Some("abc".to_string()),
            }],
            Vec::new(),
        );

        // Both cells match: one by value, one through the column default
        let query = parse_search_query("abc", &prefs()).unwrap();
        assert_eq!(search_cells(&mut store, &mut grid, &mappings, &query), 2);

        let written = replace_all(&store, &mut grid, &query, "xyz");
        assert_eq!(written, 1);
        assert_eq!(grid.cell_value(0, 0).as_deref(), Some("xyz"));
        // The empty cell keeps showing its default, untouched
        assert_eq!(grid.cell_value(1, 0), None);
        assert_eq!(grid.batched_writes(), 1);
    }

    #[test]
    fn test_replace_all_substring_substitution() {
        let mut store = CellMetaStore::new(0);
        let mut grid = MockGrid::new(1, 1);
        grid.seed_value(0, 0, "Felis Felis catus");
        let mappings = mappings(&["A"]);

        let query = parse_search_query("felis", &prefs()).unwrap();
        search_cells(&mut store, &mut grid, &mappings, &query);
        replace_all(&store, &mut grid, &query, "Canis");

        // Case-insensitive substitution hits every occurrence
        assert_eq!(grid.cell_value(0, 0).as_deref(), Some("Canis Canis catus"));
    }

    #[test]
    fn test_replace_next_navigates_then_replaces() {
        let mut store = CellMetaStore::new(0);
        let mut grid = MockGrid::new(3, 1);
        grid.seed_value(0, 0, "plain");
        grid.seed_value(1, 0, "match one");
        grid.seed_value(2, 0, "match two");
        let mappings = mappings(&["A"]);

        let query = parse_search_query("match", &prefs()).unwrap();
        let total = search_cells(&mut store, &mut grid, &mappings, &query);
        assert_eq!(total, 2);

        // Selection is not a search result: replace-next first navigates
        // to row 1, replaces it, then advances to row 2.
        grid.select_cell(0, 0);
        let outcome = replace_next(&mut store, &mut grid, NavAxis::RowFirst, &query, "hit", total, 0);
        assert_eq!(grid.cell_value(1, 0).as_deref(), Some("hit one"));
        assert_eq!(outcome.cell, Some((2, 0)));
        assert_eq!(grid.selected_cell(), Some((2, 0)));
    }
}
