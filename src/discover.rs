//! Script-file discovery for directory input.
//!
//! Discovery answers one question: which files under a directory look like
//! dialogue scripts worth feeding to the pipeline? It deliberately knows
//! nothing about parsing — it only produces paths, and `input` decides how
//! each one decodes.
//!
//! Selection is by extension (`.txt`, `.fountain`, `.tsv`, `.csv`), with
//! hidden files and editor backups skipped. Results are sorted by path so a
//! directory import is deterministic regardless of filesystem order.

use std::path::{Path, PathBuf};

use walkdir::WalkDir;

/// Extensions accepted as script documents.
const SCRIPT_EXTENSIONS: [&str; 4] = ["txt", "fountain", "tsv", "csv"];

/// Walk a directory and return all script files within it, sorted by path.
pub fn find_script_files(dir: &Path) -> Vec<PathBuf> {
    let mut results: Vec<PathBuf> = WalkDir::new(dir)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.path().is_file())
        .filter(|e| is_script_file(e.path()))
        .map(|e| e.into_path())
        .collect();
    results.sort();
    results
}

fn is_script_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    if name.starts_with('.') || name.ends_with('~') || name.ends_with(".bak") {
        return false;
    }
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            let ext = ext.to_lowercase();
            SCRIPT_EXTENSIONS.contains(&ext.as_str())
        })
}
