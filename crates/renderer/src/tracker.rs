//! Modification-time bookkeeping for every file a program was built from.
//!
//! The compiler records the entry source and each include it reads; the
//! orchestrator polls [`SourceTracker::has_any_changed`] once per frame to
//! decide whether the active program needs rebuilding.
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

#[derive(Debug, Default, Clone)]
pub struct SourceTracker {
    files: HashMap<PathBuf, SystemTime>,
}

fn modified(path: &Path) -> Option<SystemTime> {
    fs::metadata(path).and_then(|meta| meta.modified()).ok()
}

impl SourceTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Remembers `path` with its current modification time. Files whose
    /// timestamp cannot be read are left out.
    pub fn record_read(&mut self, path: &Path) {
        if let Some(stamp) = modified(path) {
            self.files.insert(path.to_path_buf(), stamp);
        }
    }

    /// Re-reads every timestamp and reports whether any moved.
    ///
    /// Observed timestamps are stored, so a given edit is reported once.
    /// Entries that cannot be read this time are skipped.
    pub fn has_any_changed(&mut self) -> bool {
        let mut changed = false;
        for (path, stamp) in self.files.iter_mut() {
            let Some(current) = modified(path) else {
                continue;
            };
            if current != *stamp {
                tracing::debug!(path = %path.display(), "source file changed");
                *stamp = current;
                changed = true;
            }
        }
        changed
    }

    pub fn replace_with(&mut self, other: SourceTracker) {
        self.files = other.files;
    }

    /// Adds every entry of `other`, keeping its timestamps where both know a path.
    pub fn merge(&mut self, other: SourceTracker) {
        self.files.extend(other.files);
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn paths(&self) -> impl Iterator<Item = &Path> {
        self.files.keys().map(PathBuf::as_path)
    }
}
