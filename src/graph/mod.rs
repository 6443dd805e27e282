//! Chunk graph data structures
//!
//! The graph is loaded from an external bundler's output directory; chunks
//! are addressed by their final build-output path and are immutable once
//! rewriting is complete.

mod exports;

use std::collections::{BTreeMap, BTreeSet};
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use tracing::{debug, trace};
use walkdir::WalkDir;

use crate::rewriter::forms::{self, FormKind};
use crate::utils::resolve_specifier;

pub use exports::ExportSurface;

/// A reference from one chunk to another, by final build-output path.
#[derive(Debug, Clone, PartialEq)]
pub struct ChunkRef {
    /// The specifier as written in the source.
    pub specifier: String,

    /// Output path of the referenced chunk.
    pub target: String,

    /// Whether the reference is a dynamic `import()`.
    pub dynamic: bool,
}

/// A unit of compiled code produced by the external bundling step.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Output path relative to the chunk directory.
    pub path: String,

    /// Source text as emitted by the bundler.
    pub source: String,

    /// References to other chunks in the set, static and dynamic.
    pub refs: Vec<ChunkRef>,

    /// Statically-declared export surface.
    pub exports: ExportSurface,
}

/// The full chunk set, keyed by output path.
#[derive(Debug, Default)]
pub struct ChunkGraph {
    chunks: BTreeMap<String, Chunk>,
}

impl ChunkGraph {
    /// Load every script chunk under `dir`.
    pub fn load(dir: &Path) -> Result<Self> {
        let mut sources = BTreeMap::new();

        for entry in WalkDir::new(dir).into_iter().filter_map(|e| e.ok()) {
            if !entry.file_type().is_file() {
                continue;
            }
            let ext = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .unwrap_or("");
            if !matches!(ext, "js" | "mjs" | "cjs") {
                continue;
            }

            let rel = pathdiff::diff_paths(entry.path(), dir)
                .unwrap_or_else(|| entry.path().to_path_buf());
            let rel = rel.to_string_lossy().replace('\\', "/");

            let source = fs::read_to_string(entry.path())
                .with_context(|| format!("Failed to read chunk: {}", entry.path().display()))?;

            sources.insert(rel, source);
        }

        Ok(Self::from_sources(sources))
    }

    /// Build a graph from in-memory chunk sources keyed by output path.
    pub fn from_sources(sources: BTreeMap<String, String>) -> Self {
        let paths: BTreeSet<String> = sources.keys().cloned().collect();
        let mut chunks = BTreeMap::new();

        for (path, source) in sources {
            let mut refs = Vec::new();
            for reference in forms::scan(&source) {
                if let Some(target) = resolve_specifier(&path, &reference.specifier) {
                    if paths.contains(&target) {
                        refs.push(ChunkRef {
                            specifier: reference.specifier,
                            target,
                            dynamic: reference.kind == FormKind::DynamicImport,
                        });
                    }
                }
            }

            for r in &refs {
                trace!(
                    chunk = %path,
                    specifier = %r.specifier,
                    target = %r.target,
                    dynamic = r.dynamic,
                    "resolved chunk reference"
                );
            }

            let exports = exports::extract(&source);
            debug!(chunk = %path, refs = refs.len(), "scanned chunk");

            chunks.insert(
                path.clone(),
                Chunk {
                    path,
                    source,
                    refs,
                    exports,
                },
            );
        }

        Self { chunks }
    }

    /// Get a chunk by output path
    pub fn get(&self, path: &str) -> Option<&Chunk> {
        self.chunks.get(path)
    }

    /// Whether the set contains a chunk at `path`
    pub fn contains(&self, path: &str) -> bool {
        self.chunks.contains_key(path)
    }

    /// Iterate over chunks in path order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Chunk)> {
        self.chunks.iter()
    }

    /// Total number of chunks
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    /// Check if the graph is empty
    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sources(entries: &[(&str, &str)]) -> BTreeMap<String, String> {
        entries
            .iter()
            .map(|(path, source)| (path.to_string(), source.to_string()))
            .collect()
    }

    #[test]
    fn test_refs_resolve_to_output_paths() {
        let graph = ChunkGraph::from_sources(sources(&[
            ("entry.js", "import { a } from './nested/a.js';\n"),
            ("nested/a.js", "import { b } from '../b.js';\nexport const a = 1;\n"),
            ("b.js", "export const b = 2;\n"),
        ]));

        let entry = graph.get("entry.js").unwrap();
        assert_eq!(entry.refs.len(), 1);
        assert_eq!(entry.refs[0].target, "nested/a.js");

        let a = graph.get("nested/a.js").unwrap();
        assert_eq!(a.refs[0].target, "b.js");
    }

    #[test]
    fn test_bare_and_missing_targets_are_ignored() {
        let graph = ChunkGraph::from_sources(sources(&[(
            "entry.js",
            "import lodash from 'lodash';\nimport { x } from './missing.js';\n",
        )]));

        assert!(graph.get("entry.js").unwrap().refs.is_empty());
    }

    #[test]
    fn test_dynamic_references_are_marked() {
        let graph = ChunkGraph::from_sources(sources(&[
            ("entry.js", "const page = import('./page.js');\n"),
            ("page.js", "export default {};\n"),
        ]));

        let entry = graph.get("entry.js").unwrap();
        assert!(entry.refs[0].dynamic);
        assert!(graph.get("page.js").unwrap().exports.has_default);
    }
}
