//! Common assertions for gs-fastcopy testing

use anyhow::Result;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

/// Asserts that no scratch session survived under `root`.
///
/// A root that was never created counts as empty.
pub fn assert_no_scratch_left(root: &Path) -> Result<()> {
    let leftovers = collect_entries(root)?;
    assert!(
        leftovers.is_empty(),
        "Scratch entries left under {}: {:?}",
        root.display(),
        leftovers
    );
    Ok(())
}

/// Asserts that a file exists and holds exactly `expected`
pub fn assert_file_contents(path: &Path, expected: &[u8]) -> Result<()> {
    assert!(path.exists(), "Missing file {}", path.display());
    let actual = std::fs::read(path)?;
    assert_eq!(
        actual,
        expected,
        "Content mismatch for {}",
        path.display()
    );
    Ok(())
}

fn collect_entries(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut entries: Vec<_> = WalkDir::new(dir)
        .min_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .map(|e| e.path().to_path_buf())
        .collect();

    entries.sort();
    Ok(entries)
}
