//! `#include` resolution for program sources.
//!
//! Types:
//!
//! - `IncludeLoader` is the hook both compiler backends call for every include
//!   directive: given the requested name and the including file, return the
//!   content.
//! - `TrackingIncludeLoader` resolves relative to the including file, then the
//!   program root, and records every file it reads into a pending
//!   `SourceTracker`.
//!
//! Functions:
//!
//! - `expand_includes` splices includes textually for frontends without an
//!   include mechanism of their own (naga's GLSL frontend).
use std::cell::RefCell;
use std::collections::HashSet;
use std::fs;
use std::path::{Path, PathBuf};

use crate::tracker::SourceTracker;

/// Nesting limit for textual include expansion.
pub const MAX_INCLUDE_DEPTH: usize = 32;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadedInclude {
    /// Resolved location, used to de-duplicate and in diagnostics.
    pub path: PathBuf,
    pub content: String,
}

pub trait IncludeLoader {
    fn load(&self, requested: &str, requesting: &Path) -> Result<LoadedInclude, String>;
}

/// Loader used by the program compiler during a single compile.
pub struct TrackingIncludeLoader {
    root: PathBuf,
    pending: RefCell<SourceTracker>,
}

impl TrackingIncludeLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            pending: RefCell::new(SourceTracker::new()),
        }
    }

    pub fn record(&self, path: &Path) {
        self.pending.borrow_mut().record_read(path);
    }

    pub fn into_pending(self) -> SourceTracker {
        self.pending.into_inner()
    }

    fn candidates(&self, requested: &str, requesting: &Path) -> Vec<PathBuf> {
        let requested = Path::new(requested);
        if requested.is_absolute() {
            return vec![requested.to_path_buf()];
        }
        let mut candidates = Vec::with_capacity(2);
        if let Some(parent) = requesting.parent() {
            candidates.push(parent.join(requested));
        }
        candidates.push(self.root.join(requested));
        candidates
    }
}

impl IncludeLoader for TrackingIncludeLoader {
    fn load(&self, requested: &str, requesting: &Path) -> Result<LoadedInclude, String> {
        for candidate in self.candidates(requested, requesting) {
            if !candidate.is_file() {
                continue;
            }
            let content = fs::read_to_string(&candidate)
                .map_err(|err| format!("failed to read include {}: {err}", candidate.display()))?;
            self.record(&candidate);
            tracing::trace!(include = %candidate.display(), "loaded include");
            return Ok(LoadedInclude {
                path: candidate,
                content,
            });
        }
        Err(format!(
            "cannot resolve include \"{requested}\" from {}",
            requesting.display()
        ))
    }
}

/// Replaces every `#include "name"` / `#include <name>` line with the loaded
/// content, recursively. Each file is spliced at most once.
pub fn expand_includes(
    source: &str,
    origin: &Path,
    loader: &dyn IncludeLoader,
) -> Result<String, String> {
    let mut seen = HashSet::new();
    seen.insert(origin.to_path_buf());
    let mut out = String::with_capacity(source.len());
    expand_into(source, origin, loader, 0, &mut seen, &mut out)?;
    Ok(out)
}

fn expand_into(
    source: &str,
    origin: &Path,
    loader: &dyn IncludeLoader,
    depth: usize,
    seen: &mut HashSet<PathBuf>,
    out: &mut String,
) -> Result<(), String> {
    for (line_no, line) in source.lines().enumerate() {
        let trimmed = line.trim_start();
        if is_pragma_once(trimmed) {
            continue;
        }
        let Some(rest) = trimmed.strip_prefix("#include") else {
            out.push_str(line);
            out.push('\n');
            continue;
        };

        let requested = parse_include_target(rest).ok_or_else(|| {
            format!(
                "{}:{}: malformed include directive `{}`",
                origin.display(),
                line_no + 1,
                trimmed
            )
        })?;
        if depth + 1 > MAX_INCLUDE_DEPTH {
            return Err(format!(
                "{}:{}: include nesting exceeds {MAX_INCLUDE_DEPTH} levels",
                origin.display(),
                line_no + 1
            ));
        }

        let loaded = loader
            .load(requested, origin)
            .map_err(|err| format!("{}:{}: {err}", origin.display(), line_no + 1))?;
        if !seen.insert(loaded.path.clone()) {
            continue;
        }
        expand_into(&loaded.content, &loaded.path, loader, depth + 1, seen, out)?;
    }
    Ok(())
}

fn is_pragma_once(trimmed: &str) -> bool {
    trimmed
        .strip_prefix("#pragma")
        .map(|rest| rest.trim() == "once")
        .unwrap_or(false)
}

fn parse_include_target(rest: &str) -> Option<&str> {
    let rest = rest.trim();
    let (open, close) = match rest.chars().next()? {
        '"' => ('"', '"'),
        '<' => ('<', '>'),
        _ => return None,
    };
    let inner = rest.strip_prefix(open)?;
    let end = inner.find(close)?;
    let target = &inner[..end];
    (!target.is_empty()).then_some(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapLoader(HashMap<&'static str, &'static str>);

    impl IncludeLoader for MapLoader {
        fn load(&self, requested: &str, _requesting: &Path) -> Result<LoadedInclude, String> {
            self.0
                .get(requested)
                .map(|content| LoadedInclude {
                    path: PathBuf::from(requested),
                    content: content.to_string(),
                })
                .ok_or_else(|| format!("no such include {requested}"))
        }
    }

    #[test]
    fn splices_nested_includes_once() {
        let loader = MapLoader(HashMap::from([
            ("a.glsl", "#pragma once\n#include \"b.glsl\"\nfloat a;"),
            ("b.glsl", "float b;"),
        ]));
        let source = "#version 450\n#include \"a.glsl\"\n#include <b.glsl>\nvoid main() {}";
        let expanded = expand_includes(source, Path::new("main.comp"), &loader).unwrap();
        assert_eq!(
            expanded,
            "#version 450\nfloat b;\nfloat a;\nvoid main() {}\n"
        );
    }

    #[test]
    fn self_including_file_terminates() {
        let loader = MapLoader(HashMap::from([("loop.glsl", "#include \"loop.glsl\"\nint x;")]));
        let expanded =
            expand_includes("#include \"loop.glsl\"", Path::new("main.comp"), &loader).unwrap();
        assert_eq!(expanded, "int x;\n");
    }

    #[test]
    fn unresolved_include_names_the_origin() {
        let loader = MapLoader(HashMap::new());
        let err = expand_includes("\n#include \"missing.glsl\"", Path::new("main.comp"), &loader)
            .unwrap_err();
        assert!(err.starts_with("main.comp:2:"), "{err}");
        assert!(err.contains("missing.glsl"));
    }

    #[test]
    fn malformed_directive_is_rejected() {
        let loader = MapLoader(HashMap::new());
        let err = expand_includes("#include common", Path::new("main.comp"), &loader).unwrap_err();
        assert!(err.contains("malformed include"));
    }

    #[test]
    fn tracking_loader_prefers_including_directory_then_root() {
        let root = tempfile::tempdir().unwrap();
        let lesson = root.path().join("tutorial-0");
        fs::create_dir_all(&lesson).unwrap();
        fs::write(root.path().join("Common.glsl"), "root common").unwrap();
        fs::write(lesson.join("Local.glsl"), "local").unwrap();

        let loader = TrackingIncludeLoader::new(root.path());
        let requesting = lesson.join("Program.comp");

        let local = loader.load("Local.glsl", &requesting).unwrap();
        assert_eq!(local.content, "local");
        let common = loader.load("Common.glsl", &requesting).unwrap();
        assert_eq!(common.path, root.path().join("Common.glsl"));
        assert!(loader.load("Nope.glsl", &requesting).is_err());

        let pending = loader.into_pending();
        assert_eq!(pending.len(), 2);
        assert!(pending.contains(&lesson.join("Local.glsl")));
        assert!(pending.contains(&root.path().join("Common.glsl")));
    }
}
