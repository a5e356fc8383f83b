//! Persisted search preferences.
//!
//! One JSON file under the platform config directory. Missing or corrupt
//! files fall back to defaults rather than failing the session.

use std::fs;
use std::path::{Path, PathBuf};

use rowbench_engine::search::SearchPreferences;

/// Get the preferences file path
pub fn config_path() -> PathBuf {
    let config_dir = dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("rowbench");
    config_dir.join("search.json")
}

/// Load preferences from disk, falling back to defaults
pub fn load() -> SearchPreferences {
    load_from(&config_path())
}

pub fn load_from(path: &Path) -> SearchPreferences {
    match fs::read_to_string(path) {
        Ok(contents) => match serde_json::from_str(&contents) {
            Ok(prefs) => prefs,
            Err(e) => {
                eprintln!("Error parsing {}: {}", path.display(), e);
                eprintln!("Using default search preferences");
                SearchPreferences::default()
            }
        },
        Err(_) => SearchPreferences::default(),
    }
}

/// Save preferences to disk
pub fn save(prefs: &SearchPreferences) -> Result<(), String> {
    save_to(prefs, &config_path())
}

pub fn save_to(prefs: &SearchPreferences, path: &Path) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).map_err(|e| e.to_string())?;
    }
    let json = serde_json::to_string_pretty(prefs).map_err(|e| e.to_string())?;
    fs::write(path, json).map_err(|e| e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rowbench_engine::navigation::NavAxis;
    use rowbench_engine::search::ReplaceMode;

    #[test]
    fn test_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("search.json");

        let mut prefs = SearchPreferences::default();
        prefs.case_sensitive = true;
        prefs.use_regex = true;
        prefs.navigation_axis = NavAxis::ColumnFirst;
        prefs.replace_mode = ReplaceMode::ReplaceNext;

        save_to(&prefs, &path).unwrap();
        assert_eq!(load_from(&path), prefs);
    }

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = load_from(&dir.path().join("absent.json"));
        assert_eq!(prefs, SearchPreferences::default());
    }

    #[test]
    fn test_corrupt_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        fs::write(&path, "{ not json").unwrap();
        assert_eq!(load_from(&path), SearchPreferences::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("search.json");
        fs::write(&path, r#"{ "fullMatch": true }"#).unwrap();

        let prefs = load_from(&path);
        assert!(prefs.full_match);
        assert!(prefs.live_update);
        assert_eq!(prefs.navigation_axis, NavAxis::RowFirst);
    }
}
