//! Managed/unmanaged chunk classification.
//!
//! A chunk selected for content-addressed caching is *managed*; everything
//! else stays on normal network resolution.

use anyhow::{Context, Result};
use globset::{Glob, GlobSet, GlobSetBuilder};

/// Include/exclude predicate over chunk output paths.
pub struct ChunkSelector {
    include: GlobSet,
    exclude: GlobSet,
}

impl ChunkSelector {
    /// Build a selector from glob patterns. An invalid pattern aborts the
    /// build.
    pub fn new(include: &[String], exclude: &[String]) -> Result<Self> {
        Ok(Self {
            include: build_set(include).context("invalid include pattern")?,
            exclude: build_set(exclude).context("invalid exclude pattern")?,
        })
    }

    /// Whether the chunk at `path` is selected for content-addressed caching.
    pub fn is_managed(&self, path: &str) -> bool {
        self.include.is_match(path) && !self.exclude.is_match(path)
    }
}

fn build_set(patterns: &[String]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pattern in patterns {
        builder.add(Glob::new(pattern)?);
    }
    Ok(builder.build()?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(patterns: &[&str]) -> Vec<String> {
        patterns.iter().map(|p| p.to_string()).collect()
    }

    #[test]
    fn test_include_selects_exclude_vetoes() {
        let selector = ChunkSelector::new(&strings(&["a"]), &strings(&["b"])).unwrap();

        let managed: Vec<&str> = ["a", "b", "entry"]
            .into_iter()
            .filter(|path| selector.is_managed(path))
            .collect();

        assert_eq!(managed, vec!["a"]);
    }

    #[test]
    fn test_glob_patterns() {
        let selector =
            ChunkSelector::new(&strings(&["**/*.js"]), &strings(&["entry.js"])).unwrap();

        assert!(selector.is_managed("chunk-a.js"));
        assert!(selector.is_managed("assets/chunk-b.js"));
        assert!(!selector.is_managed("entry.js"));
        assert!(!selector.is_managed("styles.css"));
    }

    #[test]
    fn test_empty_include_selects_nothing() {
        let selector = ChunkSelector::new(&[], &[]).unwrap();
        assert!(!selector.is_managed("a.js"));
    }

    #[test]
    fn test_invalid_pattern_is_fatal() {
        assert!(ChunkSelector::new(&strings(&["a{"]), &[]).is_err());
    }
}
