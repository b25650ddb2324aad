use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
};

use crate::Result;

/// Directories that live next to album folders but never are one.
pub const DEFAULT_IGNORED_FOLDERS: &[&str] =
    &["__pycache__", ".venv", "JMComic", "Lagrange.OneBot", "src"];

pub fn default_ignored_folders() -> HashSet<String> {
    DEFAULT_IGNORED_FOLDERS
        .iter()
        .map(|s| s.to_string())
        .collect()
}

/// Immediate subdirectories of `dir` whose name is not in `ignored`.
///
/// Read-only. Sorted by name so repeated scans agree; callers must not rely on
/// any particular order beyond that.
pub fn find_target_folders(dir: &Path, ignored: &HashSet<String>) -> Result<Vec<PathBuf>> {
    let mut out = Vec::new();
    for ent in fs::read_dir(dir)? {
        let ent = ent?;
        if !ent.file_type()?.is_dir() {
            continue;
        }
        let name = ent.file_name().to_string_lossy().to_string();
        if ignored.contains(&name) {
            continue;
        }
        out.push(ent.path());
    }
    out.sort();
    Ok(out)
}
