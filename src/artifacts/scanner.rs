//! Depth-limited scan of project resource directories.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

use super::ends_with_one_of;

/// Levels below each root that are visited (the root itself is depth 0).
pub const MAX_SCAN_DEPTH: usize = 2;

#[derive(Error, Debug)]
#[error("failed to scan {root}: {source}")]
pub struct ScanError {
    pub root: PathBuf,
    #[source]
    pub source: walkdir::Error,
}

/// Collect regular files (or symlinks to them) under `roots` whose path ends with one of `suffixes`.
///
/// Roots that do not exist or are not directories contribute nothing. The
/// result is the sorted union over all roots.
pub fn scan<S: AsRef<str>>(
    roots: &[PathBuf],
    suffixes: &[S],
    max_depth: usize,
) -> Result<BTreeSet<PathBuf>, ScanError> {
    let mut found = BTreeSet::new();
    for root in roots {
        collect_files(root, suffixes, max_depth, &mut found)?;
    }
    Ok(found)
}

fn collect_files<S: AsRef<str>>(
    root: &Path,
    suffixes: &[S],
    max_depth: usize,
    found: &mut BTreeSet<PathBuf>,
) -> Result<(), ScanError> {
    if !root.is_dir() {
        tracing::debug!("Skipping resource dir {} (not a directory)", root.display());
        return Ok(());
    }

    for entry in WalkDir::new(root).max_depth(max_depth) {
        let entry = entry.map_err(|source| ScanError {
            root: root.to_path_buf(),
            source,
        })?;
        // symlinked files count, their target decides
        if !entry.path().is_file() {
            continue;
        }
        if ends_with_one_of(&entry.path().to_string_lossy(), suffixes) {
            found.insert(entry.into_path());
        }
    }
    Ok(())
}
