//! Discovers the programs a user can pick in the playground.
//!
//! A program is any file under the program root with the configured
//! extension. A sibling named `<stem>Solution.<ext>` is its alternate (the
//! reference solution) and never shows up as an entry of its own.
//!
//! The scanned catalog is cached process-wide: [`catalog`] scans on first use,
//! [`invalidate`] forces the next call to scan again and [`cached`] peeks
//! without scanning.
mod discover;

pub use discover::display_label;

use std::path::{Path, PathBuf};
use std::sync::{Arc, PoisonError, RwLock};

use tracing::info;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("program root {0} does not exist or is not a directory")]
    MissingRoot(PathBuf),
    #[error("program {0} is not inside the program root")]
    OutsideRoot(PathBuf),
    #[error("failed to walk program root: {0}")]
    Walk(#[from] walkdir::Error),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgramEntry {
    /// Display label, e.g. `Tutorial 0: Hello Compute`.
    pub label: String,
    /// Source path relative to the root, `/`-separated.
    pub source: String,
    /// Reference solution, relative to the root, if one exists.
    pub alternate: Option<String>,
}

impl ProgramEntry {
    pub fn has_alternate(&self) -> bool {
        self.alternate.is_some()
    }

    /// Source to compile for the given choice; `None` when the alternate is
    /// requested but missing.
    pub fn source_for(&self, use_alternate: bool) -> Option<&str> {
        if use_alternate {
            self.alternate.as_deref()
        } else {
            Some(self.source.as_str())
        }
    }
}

#[derive(Debug, Clone)]
pub struct ProgramCatalog {
    root: PathBuf,
    extension: String,
    entries: Vec<ProgramEntry>,
}

impl ProgramCatalog {
    pub fn scan(root: impl Into<PathBuf>, extension: &str) -> Result<Self, CatalogError> {
        let root = root.into();
        let entries = discover::scan(&root, extension)?;
        info!(root = %root.display(), programs = entries.len(), "scanned program catalog");
        Ok(Self {
            root,
            extension: extension.to_string(),
            entries,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn extension(&self) -> &str {
        &self.extension
    }

    pub fn entries(&self) -> &[ProgramEntry] {
        &self.entries
    }

    pub fn get(&self, index: usize) -> Option<&ProgramEntry> {
        self.entries.get(index)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

static CATALOG: RwLock<Option<Arc<ProgramCatalog>>> = RwLock::new(None);

/// Returns the cached catalog, scanning `root` if nothing is cached yet or the
/// cache was built for a different root or extension.
pub fn catalog(root: &Path, extension: &str) -> Result<Arc<ProgramCatalog>, CatalogError> {
    if let Some(existing) = cached() {
        if existing.root == root && existing.extension == extension {
            return Ok(existing);
        }
    }

    let mut slot = CATALOG.write().unwrap_or_else(PoisonError::into_inner);
    if let Some(existing) = slot.as_ref() {
        if existing.root == root && existing.extension == extension {
            return Ok(Arc::clone(existing));
        }
    }
    let fresh = Arc::new(ProgramCatalog::scan(root, extension)?);
    *slot = Some(Arc::clone(&fresh));
    Ok(fresh)
}

/// Drops the cached catalog so the next [`catalog`] call re-scans.
pub fn invalidate() {
    let mut slot = CATALOG.write().unwrap_or_else(PoisonError::into_inner);
    *slot = None;
}

pub fn cached() -> Option<Arc<ProgramCatalog>> {
    CATALOG
        .read()
        .unwrap_or_else(PoisonError::into_inner)
        .clone()
}
