//! Path pattern matching: longest-prefix matching with a
//! trailing-wildcard glob, the shape every route, composite route, and
//! per-backend endpoint override is keyed by.
//!
//! A pattern is either:
//! - an exact path (`/api/users`), matching only that path;
//! - `*` alone, matching every path;
//! - a prefix ending in `/*` (`/api/users/*`), matching the prefix itself and
//!   anything nested under it.
//!
//! Specificity when several patterns could match the same path is resolved
//! by prefix length: the longest matching prefix wins, with an exact match
//! always beating a wildcard of the same or shorter length.

use ahash::HashMap as AHashMap;

/// Tests a single `pattern` against `path` without building a [`PathMatcher`].
/// Used where only one candidate pattern is in play, such as a backend's
/// per-endpoint override.
pub fn glob_matches(pattern: &str, path: &str) -> bool {
    if pattern == "*" {
        return true;
    }
    match pattern.strip_suffix("/*") {
        Some(prefix) => path == prefix || path.starts_with(&format!("{prefix}/")),
        None => path == pattern,
    }
}

/// The prefix length used to rank two patterns that both match the same
/// path; longer is more specific. An exact (non-wildcard) pattern is treated
/// as infinitely specific relative to a wildcard sharing the same prefix.
fn specificity(pattern: &str) -> (usize, bool) {
    match pattern.strip_suffix("/*") {
        Some(prefix) => (prefix.len(), false),
        None => (pattern.len(), true),
    }
}

/// A collection of patterns mapped to values of type `T`, pre-sorted so that
/// [`PathMatcher::find`] always returns the most specific match in a single
/// linear pass. Mirrors the static/dynamic split an ordinary router uses,
/// except every entry here is a candidate on every lookup since prefix
/// matching can't be reduced to a hash lookup the way exact matching can.
#[derive(Debug, Clone)]
pub struct PathMatcher<T> {
    entries: Vec<(String, T)>,
    exact: AHashMap<String, usize>,
}

impl<T> Default for PathMatcher<T> {
    fn default() -> Self {
        Self {
            entries: Vec::new(),
            exact: AHashMap::default(),
        }
    }
}

impl<T> PathMatcher<T> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a matcher from an iterator of `(pattern, value)` pairs.
    pub fn from_entries(entries: impl IntoIterator<Item = (String, T)>) -> Self {
        let mut matcher = Self::new();
        for (pattern, value) in entries {
            matcher.insert(pattern, value);
        }
        matcher
    }

    pub fn insert(&mut self, pattern: String, value: T) {
        if !pattern.ends_with("/*") && pattern != "*" {
            self.exact.insert(pattern.clone(), self.entries.len());
        }
        self.entries.push((pattern, value));
        self.entries
            .sort_by(|(a, _), (b, _)| specificity(b).cmp(&specificity(a)));
        self.exact.clear();
        for (idx, (pattern, _)) in self.entries.iter().enumerate() {
            if !pattern.ends_with("/*") && pattern != "*" {
                self.exact.insert(pattern.clone(), idx);
            }
        }
    }

    /// Finds the most specific entry whose pattern matches `path`.
    pub fn find(&self, path: &str) -> Option<&T> {
        if let Some(&idx) = self.exact.get(path) {
            return Some(&self.entries[idx].1);
        }
        self.entries
            .iter()
            .find(|(pattern, _)| glob_matches(pattern, path))
            .map(|(_, value)| value)
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
