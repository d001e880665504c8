//! Best-effort removal of a task's temporary directories.
//!
//! Cleanup runs on every exit path, including after failures, so it never
//! returns an error: problems are reported as warnings and the task's own exit
//! status is what counts.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Remove a directory tree, ignoring failures.
///
/// Returns `true` if the directory existed and was removed.
pub fn remove_dir_best_effort(path: &Path) -> bool {
    match fs::remove_dir_all(path) {
        Ok(()) => true,
        Err(e) if e.kind() == ErrorKind::NotFound => false,
        Err(e) => {
            eprintln!(
                "Warning: failed to remove temporary directory '{}': {}",
                path.display(),
                e
            );
            false
        }
    }
}

/// Remove each directory in `dirs`; returns the ones actually removed.
pub fn remove_dirs(dirs: &[PathBuf]) -> Vec<PathBuf> {
    dirs.iter()
        .filter(|dir| remove_dir_best_effort(dir))
        .cloned()
        .collect()
}
