//! Glob-based exclusion of paths from all sync operations.
//!
//! Matching semantics: patterns are matched against the path relative to the
//! sync root, with separators normalized to `/`. `*` never crosses a
//! separator, `**` spans any number of segments including zero (so
//! `**/node_modules` also matches a top-level `node_modules`), and a bare
//! name matches only exact relative-path equality. An ignored directory
//! excludes its entire subtree.

use std::path::Path;

use anyhow::{bail, Context, Result};
use globset::{GlobBuilder, GlobSet, GlobSetBuilder};

const MAX_PATTERNS: usize = 100;
const MAX_PATTERN_CHARS: usize = 255;

#[derive(Debug, Clone)]
pub struct IgnoreMatcher {
    set: GlobSet,
}

impl IgnoreMatcher {
    /// Builds a matcher, rejecting oversized or malformed pattern sets so a
    /// bad pattern is reported once at operation start instead of per entry.
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        if patterns.len() > MAX_PATTERNS {
            bail!(
                "too many ignore patterns: {} (limit {MAX_PATTERNS})",
                patterns.len()
            );
        }
        let mut builder = GlobSetBuilder::new();
        for pattern in patterns {
            let trimmed = pattern.as_ref().trim();
            if trimmed.is_empty() {
                continue;
            }
            if trimmed.chars().count() > MAX_PATTERN_CHARS {
                bail!("ignore pattern exceeds {MAX_PATTERN_CHARS} characters");
            }
            if trimmed.chars().any(char::is_control) {
                bail!("ignore pattern contains control characters");
            }
            let glob = GlobBuilder::new(trimmed)
                .literal_separator(true)
                .build()
                .with_context(|| format!("invalid ignore pattern '{trimmed}'"))?;
            builder.add(glob);
        }
        Ok(Self {
            set: builder.build()?,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.set.is_empty()
    }

    /// Whether `relative` or any of its ancestors matches an ignore pattern.
    pub fn is_ignored(&self, relative: &Path) -> bool {
        if self.set.is_empty() {
            return false;
        }
        let normalized = normalize(relative);
        if normalized.is_empty() {
            return false;
        }
        let mut prefix = String::with_capacity(normalized.len());
        for segment in normalized.split('/') {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(segment);
            if self.set.is_match(prefix.as_str()) {
                return true;
            }
        }
        false
    }
}

/// Joins path components with `/` so matching behaves identically on every
/// platform, whatever separator the path came in with.
fn normalize(path: &Path) -> String {
    let mut out = String::new();
    for component in path.components() {
        if let Some(part) = component.as_os_str().to_str() {
            if !out.is_empty() {
                out.push('/');
            }
            out.push_str(part);
        }
    }
    out
}
