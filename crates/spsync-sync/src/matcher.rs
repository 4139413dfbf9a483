//! Path matcher
//!
//! Resolves include globs and exclusion patterns into the candidate list for
//! a run.
//!
//! ## Include patterns
//!
//! Patterns are relative to the sync root and applied in order. `*` stays
//! within one path segment, `**` spans any number of segments (only when
//! recursive matching is enabled, otherwise it behaves like `*`), `{a,b}` is
//! an alternation group, and a leading `!` removes files matched by earlier
//! patterns.
//!
//! ## Exclusion patterns
//!
//! A path is excluded when a pattern matches its basename, equals one of its
//! segments (for wildcard-free patterns such as `node_modules`), or matches
//! the whole relative path. A pattern that does not start with `*` or `.`
//! and has no `/` is also tried as an extension: `tmp` acts as `*.tmp` and
//! `ba?` as `*.ba?`. Excluded directories are not descended into.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use glob::{MatchOptions, Pattern};
use spsync_core::domain::{LocalFile, RelativePath};
use tracing::{debug, warn};

use crate::SyncError;

/// One include pattern after brace expansion
#[derive(Debug)]
struct IncludeRule {
    negated: bool,
    alternatives: Vec<Pattern>,
}

/// One exclusion pattern
#[derive(Debug)]
struct ExcludeRule {
    raw: String,
    pattern: Pattern,
    /// `*.{raw}` for bare extension tokens
    extension: Option<Pattern>,
    has_wildcard: bool,
}

/// Compiled include/exclude rules for one run
#[derive(Debug)]
pub struct PathMatcher {
    patterns: Vec<String>,
    include: Vec<IncludeRule>,
    exclude: Vec<ExcludeRule>,
    /// Deepest file depth any include pattern can reach; `None` when a
    /// recursive `**` makes it unbounded
    max_depth: Option<usize>,
    case_sensitive: bool,
}

impl PathMatcher {
    /// Compiles the patterns
    ///
    /// # Errors
    /// Returns `SyncError::Pattern` if a pattern is not a valid glob, or if
    /// no include pattern is given
    pub fn new(include: &[String], exclude: &[String], recursive: bool) -> Result<Self, SyncError> {
        let include_rules = include
            .iter()
            .map(|raw| compile_include(raw, recursive))
            .collect::<Result<Vec<_>, _>>()?;

        if include_rules.iter().all(|r| r.negated) {
            return Err(SyncError::Pattern {
                pattern: include.join(","),
                message: "at least one non-negated include pattern is required".to_string(),
            });
        }

        let exclude_rules = exclude
            .iter()
            .map(|raw| raw.trim())
            .filter(|raw| !raw.is_empty())
            .map(compile_exclude)
            .collect::<Result<Vec<_>, _>>()?;

        let max_depth = include_rules
            .iter()
            .filter(|r| !r.negated)
            .flat_map(|r| r.alternatives.iter())
            .map(|p| pattern_depth(p.as_str()))
            .try_fold(0usize, |acc, depth| depth.map(|d| acc.max(d)));

        Ok(Self {
            patterns: include.to_vec(),
            include: include_rules,
            exclude: exclude_rules,
            max_depth,
            case_sensitive: default_case_sensitivity(),
        })
    }

    /// Overrides the platform's case sensitivity
    #[must_use]
    pub fn with_case_sensitivity(mut self, case_sensitive: bool) -> Self {
        self.case_sensitive = case_sensitive;
        self
    }

    fn segment_options(&self) -> MatchOptions {
        MatchOptions {
            case_sensitive: self.case_sensitive,
            require_literal_separator: true,
            require_literal_leading_dot: false,
        }
    }

    fn anywhere_options(&self) -> MatchOptions {
        MatchOptions {
            require_literal_separator: false,
            ..self.segment_options()
        }
    }

    /// Whether the include rules select `path`
    ///
    /// The last rule that matches decides: a negated rule deselects.
    pub fn is_included(&self, path: &RelativePath) -> bool {
        let options = self.segment_options();
        let mut selected = false;
        for rule in &self.include {
            if rule
                .alternatives
                .iter()
                .any(|p| p.matches_with(path.as_str(), options))
            {
                selected = !rule.negated;
            }
        }
        selected
    }

    /// Whether any exclusion pattern matches `path`
    pub fn is_excluded(&self, path: &RelativePath) -> bool {
        let basename = path.file_name();
        let segment_opts = self.segment_options();
        let anywhere_opts = self.anywhere_options();

        self.exclude.iter().any(|rule| {
            if rule.pattern.matches_with(basename, segment_opts) {
                return true;
            }
            if !rule.has_wildcard && path.segments().any(|s| self.same_name(s, &rule.raw)) {
                return true;
            }
            if rule.pattern.matches_with(path.as_str(), anywhere_opts) {
                return true;
            }
            rule.extension
                .as_ref()
                .is_some_and(|ext| ext.matches_with(basename, segment_opts))
        })
    }

    fn same_name(&self, a: &str, b: &str) -> bool {
        if self.case_sensitive {
            a == b
        } else {
            a.to_lowercase() == b.to_lowercase()
        }
    }

    /// Walks `root` and returns the selected files, sorted by relative path
    ///
    /// Unreadable directories and entries are skipped with a warning.
    ///
    /// # Errors
    /// Returns `SyncError::NoMatch` if nothing is selected, or an I/O error
    /// if `root` itself cannot be read
    pub fn scan(&self, root: &Path) -> Result<Vec<LocalFile>, SyncError> {
        let mut found = BTreeMap::new();
        let mut excluded = 0usize;

        let mut pending = vec![(root.to_path_buf(), 0usize)];
        let mut first = true;
        while let Some((dir, depth)) = pending.pop() {
            let entries = match fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(e) if first => return Err(e.into()),
                Err(e) => {
                    warn!(dir = %dir.display(), error = %e, "Skipping unreadable directory");
                    continue;
                }
            };
            first = false;

            for entry in entries.flatten() {
                let path = entry.path();
                let rel = match RelativePath::from_path(root, &path) {
                    Ok(rel) => rel,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Skipping entry with unusable path");
                        continue;
                    }
                };

                let Ok(file_type) = entry.file_type() else {
                    continue;
                };
                // Symlinks are followed for files only
                let metadata = match fs::metadata(&path) {
                    Ok(m) => m,
                    Err(e) => {
                        warn!(path = %rel, error = %e, "Skipping entry that cannot be inspected");
                        continue;
                    }
                };

                if metadata.is_dir() {
                    if file_type.is_symlink() {
                        debug!(path = %rel, "Not following directory symlink");
                        continue;
                    }
                    if self.is_excluded(&rel) {
                        debug!(path = %rel, "Excluded directory");
                        excluded += 1;
                        continue;
                    }
                    if self.max_depth.map_or(true, |max| depth + 1 < max) {
                        pending.push((path, depth + 1));
                    }
                    continue;
                }

                if !metadata.is_file() || !self.is_included(&rel) {
                    continue;
                }
                if self.is_excluded(&rel) {
                    excluded += 1;
                    continue;
                }

                found.insert(
                    rel.as_str().to_string(),
                    LocalFile {
                        absolute_path: path,
                        relative_path: rel,
                        size_bytes: metadata.len(),
                    },
                );
            }
        }

        if excluded > 0 {
            debug!(excluded, "Excluded entries matching exclusion patterns");
        }

        if found.is_empty() {
            return Err(SyncError::NoMatch {
                root: root.to_path_buf(),
                patterns: self.patterns.clone(),
            });
        }

        Ok(found.into_values().collect())
    }
}

fn compile_include(raw: &str, recursive: bool) -> Result<IncludeRule, SyncError> {
    let trimmed = raw.trim();
    let (negated, body) = match trimmed.strip_prefix('!') {
        Some(rest) => (true, rest),
        None => (false, trimmed),
    };
    let body = body.replace('\\', "/");
    let body = body.trim_start_matches("./");

    let alternatives = expand_braces(body)
        .into_iter()
        .map(|alt| {
            let alt = if recursive { alt } else { collapse_globstar(&alt) };
            Pattern::new(&alt).map_err(|e| SyncError::Pattern {
                pattern: raw.to_string(),
                message: e.to_string(),
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    Ok(IncludeRule {
        negated,
        alternatives,
    })
}

fn compile_exclude(raw: &str) -> Result<ExcludeRule, SyncError> {
    let to_error = |e: glob::PatternError| SyncError::Pattern {
        pattern: raw.to_string(),
        message: e.to_string(),
    };
    let pattern = Pattern::new(raw).map_err(to_error)?;
    let has_wildcard = raw.contains(['*', '?', '[']);
    let extension = if !raw.starts_with('*') && !raw.starts_with('.') && !raw.contains('/') {
        Some(Pattern::new(&format!("*.{raw}")).map_err(to_error)?)
    } else {
        None
    };

    Ok(ExcludeRule {
        raw: raw.to_string(),
        pattern,
        extension,
        has_wildcard,
    })
}

/// Replaces `**` with `*` so it cannot cross segment boundaries
fn collapse_globstar(pattern: &str) -> String {
    let mut out = pattern.to_string();
    while out.contains("**") {
        out = out.replace("**", "*");
    }
    out
}

/// Number of segments a pattern can reach, `None` when unbounded
fn pattern_depth(pattern: &str) -> Option<usize> {
    if pattern.split('/').any(|s| s == "**") {
        None
    } else {
        Some(pattern.split('/').filter(|s| !s.is_empty()).count())
    }
}

/// Expands `{a,b}` alternation groups, including nested ones
///
/// `docs/{a,b}/*.{md,txt}` yields four patterns. Unbalanced braces are left
/// as literal text.
pub fn expand_braces(pattern: &str) -> Vec<String> {
    let Some(open) = pattern.find('{') else {
        return vec![pattern.to_string()];
    };

    let mut depth = 0usize;
    let mut close = None;
    let mut splits = Vec::new();
    for (idx, ch) in pattern[open..].char_indices() {
        let idx = open + idx;
        match ch {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    close = Some(idx);
                    break;
                }
            }
            ',' if depth == 1 => splits.push(idx),
            _ => {}
        }
    }

    let Some(close) = close else {
        return vec![pattern.to_string()];
    };

    let prefix = &pattern[..open];
    let suffix = &pattern[close + 1..];
    let mut bounds = vec![open];
    bounds.extend(splits);
    bounds.push(close);

    bounds
        .windows(2)
        .flat_map(|w| {
            let alternative = &pattern[w[0] + 1..w[1]];
            expand_braces(&format!("{prefix}{alternative}{suffix}"))
        })
        .collect()
}

/// Exclusion and include matching follow the filesystem: case-insensitive
/// where the platform's default filesystem is
fn default_case_sensitivity() -> bool {
    !cfg!(any(windows, target_os = "macos"))
}
