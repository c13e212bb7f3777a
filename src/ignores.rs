//! Per-user ignore list: paths that are never staged or removed.
//!
//! The ignore file holds one glob pattern per line. Patterns are resolved
//! against the current working directory, the way a shell would expand them,
//! and only paths that exist at the time of the run end up in the set. As in
//! a shell, wildcards skip hidden entries: a name starting with `.` is only
//! matched by a pattern segment that starts with `.` too.

use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::Path;

use anyhow::{Context, Result};
use ignore::overrides::{Override, OverrideBuilder};
use ignore::WalkBuilder;
use tracing::{debug, warn};

/// Default location of the ignore file, before tilde expansion.
pub const DEFAULT_IGNORE_FILE: &str = "~/.r2gignore";

/// Expanded ignore paths, relative to the directory the globs were resolved in.
pub type IgnoreSet = BTreeSet<String>;

/// Read the ignore file and expand its patterns against `cwd`.
///
/// A missing ignore file is not an error and yields an empty set.
pub fn read_ignores(ignore_file: &Path, cwd: &Path) -> Result<IgnoreSet> {
    let contents = match fs::read_to_string(ignore_file) {
        Ok(contents) => contents,
        Err(e) if e.kind() == io::ErrorKind::NotFound => {
            debug!(path = %ignore_file.display(), "no ignore file");
            return Ok(IgnoreSet::new());
        }
        Err(e) => {
            return Err(e)
                .with_context(|| format!("Failed to read ignore file {}", ignore_file.display()))
        }
    };

    let patterns: Vec<&str> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .collect();

    let ignores = expand_globs(&patterns, cwd)?;
    debug!(patterns = patterns.len(), paths = ignores.len(), "loaded ignore list");
    Ok(ignores)
}

/// One compiled ignore pattern, with its `/`-separated segments kept for the
/// hidden-entry check.
struct CompiledPattern {
    segments: Vec<String>,
    glob: Override,
}

impl CompiledPattern {
    fn matches(&self, relative: &Path, is_dir: bool) -> bool {
        self.glob.matched(relative, is_dir).is_whitelist()
            && hidden_components_allowed(&self.segments, relative)
    }
}

/// Expand glob patterns to the existing paths under `root` they match.
pub fn expand_globs(patterns: &[&str], root: &Path) -> Result<IgnoreSet> {
    let mut compiled = Vec::new();
    let mut max_depth = Some(0);

    for pattern in patterns {
        let Some(relative) = relative_pattern(pattern, root) else {
            warn!(pattern, root = %root.display(), "ignore pattern outside working directory, skipping");
            continue;
        };

        // Anchor at root so `*.sql` only matches top-level files.
        let mut builder = OverrideBuilder::new(root);
        builder
            .add(&format!("/{}", relative))
            .with_context(|| format!("Invalid ignore pattern: {}", pattern))?;
        let glob = builder
            .build()
            .with_context(|| format!("Failed to compile ignore pattern: {}", pattern))?;

        max_depth = match (max_depth, pattern_depth(&relative)) {
            (Some(current), Some(depth)) => Some(current.max(depth)),
            _ => None,
        };
        compiled.push(CompiledPattern {
            segments: pattern_segments(&relative),
            glob,
        });
    }

    if compiled.is_empty() {
        return Ok(IgnoreSet::new());
    }

    let walker = WalkBuilder::new(root)
        .standard_filters(false)
        .max_depth(max_depth)
        .filter_entry(|entry| entry.file_name() != ".git")
        .build();

    let mut matches = IgnoreSet::new();
    for entry in walker {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                debug!(error = %e, "skipping unreadable path while expanding ignores");
                continue;
            }
        };
        if entry.depth() == 0 {
            continue;
        }

        let Ok(relative) = entry.path().strip_prefix(root) else {
            continue;
        };
        let is_dir = entry.file_type().is_some_and(|t| t.is_dir());
        if compiled.iter().any(|pattern| pattern.matches(relative, is_dir)) {
            matches.insert(relative.to_string_lossy().into_owned());
        }
    }

    Ok(matches)
}

/// Whether every hidden component of `path` lines up with a pattern segment
/// that itself starts with `.`.
///
/// Segments before the first `**` line up with path components from the
/// front, segments after the last `**` from the back. Components swallowed by
/// `**` are never allowed to be hidden.
fn hidden_components_allowed(segments: &[String], path: &Path) -> bool {
    let components: Vec<String> = path
        .iter()
        .map(|part| part.to_string_lossy().into_owned())
        .collect();
    let first_recursive = segments.iter().position(|s| s == "**");
    let last_recursive = segments.iter().rposition(|s| s == "**");

    components.iter().enumerate().all(|(i, component)| {
        if !component.starts_with('.') {
            return true;
        }
        let aligned = match (first_recursive, last_recursive) {
            (None, _) | (_, None) => segments.get(i),
            (Some(first), Some(last)) => {
                let from_end = components.len() - i;
                if i < first {
                    segments.get(i)
                } else if from_end < segments.len() - last {
                    segments.get(segments.len() - from_end)
                } else {
                    None
                }
            }
        };
        aligned.is_some_and(|segment| segment.starts_with('.'))
    })
}

fn pattern_segments(pattern: &str) -> Vec<String> {
    pattern
        .split('/')
        .filter(|part| !part.is_empty())
        .map(str::to_string)
        .collect()
}

/// Strip `./` and make absolute patterns relative to `root`.
fn relative_pattern(pattern: &str, root: &Path) -> Option<String> {
    let path = Path::new(pattern);
    if path.is_absolute() {
        let relative = path.strip_prefix(root).ok()?;
        return Some(relative.to_string_lossy().into_owned());
    }
    let mut pattern = pattern;
    while let Some(rest) = pattern.strip_prefix("./") {
        pattern = rest;
    }
    Some(pattern.to_string())
}

/// Directory depth a pattern can reach, or `None` if `**` makes it unbounded.
fn pattern_depth(pattern: &str) -> Option<usize> {
    if pattern.contains("**") {
        return None;
    }
    Some(pattern.split('/').filter(|part| !part.is_empty()).count())
}
