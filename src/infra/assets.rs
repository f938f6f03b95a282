//! Filesystem-backed asset enumeration.

use std::path::{Path, PathBuf};

use walkdir::{DirEntry, WalkDir};

use crate::invalidation::{AssetEnumerator, RuleFailure};

const SKIPPED_NAMES: &[&str] = &[".DS_Store", "Thumbs.db"];
const SKIPPED_DIRS: &[&str] = &["__MACOSX"];

/// Walks a real directory tree, skipping hidden entries, OS metadata files,
/// and archive-extraction artifacts.
#[derive(Debug, Clone, Copy, Default)]
pub struct DirectoryAssetEnumerator;

impl AssetEnumerator for DirectoryAssetEnumerator {
    fn enumerate(&self, root: &Path) -> Result<Vec<PathBuf>, RuleFailure> {
        if !root.is_dir() {
            return Err(RuleFailure::new(format!(
                "asset directory `{}` does not exist",
                root.display()
            )));
        }

        let mut files = Vec::new();
        let walker = WalkDir::new(root)
            .into_iter()
            .filter_entry(|entry| !skipped(entry));
        for entry in walker {
            let entry = entry.map_err(|err| RuleFailure::new(err.to_string()))?;
            if entry.file_type().is_file() {
                files.push(entry.into_path());
            }
        }

        // Stable order keeps plans reviewable and tests deterministic.
        files.sort();
        Ok(files)
    }
}

fn skipped(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if entry.depth() > 0 && name.starts_with('.') {
        return true;
    }
    SKIPPED_NAMES.contains(&name.as_ref()) || SKIPPED_DIRS.contains(&name.as_ref())
}
