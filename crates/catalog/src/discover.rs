//! Walks a program root and turns the source files it finds into catalog
//! entries.
//!
//! Functions:
//!
//! - `scan` walks the root recursively in file-name order, skips files whose
//!   stem ends in `Solution`, and pairs every remaining file with its
//!   `<stem>Solution.<ext>` sibling when one exists.
//! - `display_label` builds the human-readable `Tutorial N: Camel Case` label.
use std::path::{Component, Path};

use tracing::debug;
use walkdir::WalkDir;

use crate::{CatalogError, ProgramEntry};

pub(crate) const ALTERNATE_SUFFIX: &str = "Solution";

pub(crate) fn scan(root: &Path, extension: &str) -> Result<Vec<ProgramEntry>, CatalogError> {
    if !root.is_dir() {
        return Err(CatalogError::MissingRoot(root.to_path_buf()));
    }

    let mut entries = Vec::new();
    for item in WalkDir::new(root).sort_by_file_name() {
        let item = item?;
        if !item.file_type().is_file() {
            continue;
        }

        let path = item.path();
        if path.extension().and_then(|ext| ext.to_str()) != Some(extension) {
            continue;
        }
        let Some(stem) = path.file_stem().and_then(|stem| stem.to_str()) else {
            continue;
        };
        if stem.ends_with(ALTERNATE_SUFFIX) {
            continue;
        }

        let alternate_path = path.with_file_name(format!("{stem}{ALTERNATE_SUFFIX}.{extension}"));
        let alternate = if alternate_path.is_file() {
            Some(relative_generic(root, &alternate_path)?)
        } else {
            None
        };

        let entry = ProgramEntry {
            label: display_label(entries.len(), stem),
            source: relative_generic(root, path)?,
            alternate,
        };
        debug!(label = %entry.label, source = %entry.source, alternate = ?entry.alternate, "discovered program");
        entries.push(entry);
    }

    Ok(entries)
}

/// `HelloWorkGraphs` at index 0 becomes `Tutorial 0: Hello Work Graphs`.
pub fn display_label(index: usize, stem: &str) -> String {
    let mut label = format!("Tutorial {index}: ");
    let mut last_upper = true;
    for ch in stem.chars() {
        let upper = ch.is_uppercase();
        if upper && !last_upper {
            label.push(' ');
        }
        label.push(ch);
        last_upper = upper;
    }
    label
}

fn relative_generic(root: &Path, path: &Path) -> Result<String, CatalogError> {
    let relative = path
        .strip_prefix(root)
        .map_err(|_| CatalogError::OutsideRoot(path.to_path_buf()))?;
    let parts: Vec<String> = relative
        .components()
        .filter_map(|component| match component {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    Ok(parts.join("/"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn labels_split_camel_case() {
        assert_eq!(display_label(0, "HelloCompute"), "Tutorial 0: Hello Compute");
        assert_eq!(display_label(3, "GPUParticles"), "Tutorial 3: GPUParticles");
        assert_eq!(display_label(1, "mandelbrotZoom"), "Tutorial 1: mandelbrot Zoom");
        assert_eq!(display_label(7, "Scene2D"), "Tutorial 7: Scene2 D");
    }

    #[test]
    fn pairs_solutions_and_skips_them_as_entries() {
        let dir = tempfile::tempdir().unwrap();
        let lesson = dir.path().join("tutorial-0");
        fs::create_dir_all(&lesson).unwrap();
        fs::write(lesson.join("Foo.comp"), "void main() {}").unwrap();
        fs::write(lesson.join("FooSolution.comp"), "void main() {}").unwrap();
        fs::write(lesson.join("Bar.comp"), "void main() {}").unwrap();
        fs::write(lesson.join("Notes.txt"), "not a program").unwrap();

        let entries = scan(dir.path(), "comp").unwrap();
        assert_eq!(entries.len(), 2);

        assert_eq!(entries[0].label, "Tutorial 0: Bar");
        assert_eq!(entries[0].source, "tutorial-0/Bar.comp");
        assert_eq!(entries[0].alternate, None);

        assert_eq!(entries[1].label, "Tutorial 1: Foo");
        assert_eq!(entries[1].source, "tutorial-0/Foo.comp");
        assert_eq!(
            entries[1].alternate.as_deref(),
            Some("tutorial-0/FooSolution.comp")
        );
    }

    #[test]
    fn walks_directories_in_name_order() {
        let dir = tempfile::tempdir().unwrap();
        for (folder, file) in [("tutorial-1", "Second.comp"), ("tutorial-0", "First.comp")] {
            let path = dir.path().join(folder);
            fs::create_dir_all(&path).unwrap();
            fs::write(path.join(file), "").unwrap();
        }

        let entries = scan(dir.path(), "comp").unwrap();
        let sources: Vec<_> = entries.iter().map(|entry| entry.source.as_str()).collect();
        assert_eq!(sources, vec!["tutorial-0/First.comp", "tutorial-1/Second.comp"]);
    }

    #[test]
    fn missing_root_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let err = scan(&dir.path().join("absent"), "comp").unwrap_err();
        assert!(matches!(err, CatalogError::MissingRoot(_)));
    }
}
