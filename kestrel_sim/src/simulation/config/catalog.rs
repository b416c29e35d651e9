// kestrel_sim/src/simulation/config/catalog.rs

use std::path::{Path, PathBuf};
use tracing::warn;
use walkdir::WalkDir;

/// Walks `dir` and returns every `.toml` file below it, sorted by path.
pub fn discover_scenarios(dir: &Path) -> Vec<PathBuf> {
    if !dir.exists() {
        warn!("Scenario directory not found at {:?}", dir);
        return Vec::new();
    }

    let mut paths: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| !e.file_type().is_dir() && e.path().extension().map_or(false, |ext| ext == "toml"))
        .map(|e| e.into_path())
        .collect();
    paths.sort();
    paths
}
