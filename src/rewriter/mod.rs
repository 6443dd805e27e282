//! Build-time reference rewriting
//!
//! Replaces relative specifiers with virtual identifiers wherever a
//! reference touches a managed chunk. Once a chunk is loaded through an
//! ephemeral handle at runtime, relative paths no longer resolve against
//! anything useful, so every such reference has to become a stable,
//! context-independent identifier before it leaves the build.

pub mod forms;

use std::collections::BTreeMap;
use std::ops::Range;

use tracing::{debug, warn};

use crate::graph::ChunkGraph;
use crate::manifest::virtual_id;
use crate::selector::ChunkSelector;
use crate::utils::resolve_specifier;

/// A reference that resolves to a managed chunk but matches no recognized
/// form. Left untouched; it will fail once its container executes outside
/// its original path context.
#[derive(Debug, Clone, PartialEq)]
pub struct FlaggedReference {
    pub chunk: String,
    pub specifier: String,
}

/// Result of rewriting the whole chunk set.
#[derive(Debug, Default)]
pub struct RewriteOutcome {
    /// Rewritten source per chunk, keyed by output path.
    pub sources: BTreeMap<String, String>,

    /// References needing manual review.
    pub flagged: Vec<FlaggedReference>,

    /// Number of references rewritten.
    pub rewritten: usize,
}

pub struct Rewriter<'a> {
    selector: &'a ChunkSelector,
}

impl<'a> Rewriter<'a> {
    pub fn new(selector: &'a ChunkSelector) -> Self {
        Self { selector }
    }

    /// Rewrite every chunk in the graph. A reference is rewritten when its
    /// importer or its target is managed; unmanaged-to-unmanaged references
    /// run unmodified under normal network resolution and are left alone.
    pub fn rewrite_graph(&self, graph: &ChunkGraph) -> RewriteOutcome {
        let mut outcome = RewriteOutcome::default();

        for (path, chunk) in graph.iter() {
            let (source, covered, count) = self.rewrite_chunk(graph, path, &chunk.source);
            outcome.rewritten += count;

            // anything the statement patterns did not account for
            for (specifier, span) in forms::scan_relative_specifiers(&chunk.source) {
                if covered.iter().any(|c| c.start <= span.start && span.end <= c.end) {
                    continue;
                }
                let Some(target) = resolve_specifier(path, &specifier) else {
                    continue;
                };
                if graph.contains(&target) && self.touches_managed(path, &target) {
                    warn!(chunk = %path, %specifier, "unrecognized reference form left unrewritten");
                    outcome.flagged.push(FlaggedReference {
                        chunk: chunk.path.clone(),
                        specifier,
                    });
                }
            }

            outcome.sources.insert(path.clone(), source);
        }

        outcome
    }

    fn touches_managed(&self, importer: &str, target: &str) -> bool {
        self.selector.is_managed(importer) || self.selector.is_managed(target)
    }

    /// Rewrite one chunk. Only the quoted specifier is spliced; the binding
    /// list around it is preserved byte for byte.
    fn rewrite_chunk(
        &self,
        graph: &ChunkGraph,
        importer: &str,
        source: &str,
    ) -> (String, Vec<Range<usize>>, usize) {
        let refs = forms::scan(source);
        let mut out = String::with_capacity(source.len());
        let mut covered = Vec::new();
        let mut cursor = 0;
        let mut count = 0;

        for r in refs {
            let Some(target) = resolve_specifier(importer, &r.specifier) else {
                continue;
            };
            if !graph.contains(&target) || !self.touches_managed(importer, &target) {
                continue;
            }

            let id = virtual_id(&target);
            debug!(chunk = %importer, specifier = %r.specifier, %id, "rewrote reference");

            out.push_str(&source[cursor..r.span.start]);
            out.push_str(&id);
            cursor = r.span.end;
            covered.push(r.span.clone());
            count += 1;
        }

        out.push_str(&source[cursor..]);
        (out, covered, count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn graph(entries: &[(&str, &str)]) -> ChunkGraph {
        ChunkGraph::from_sources(
            entries
                .iter()
                .map(|(path, source)| (path.to_string(), source.to_string()))
                .collect(),
        )
    }

    fn selector(include: &[&str], exclude: &[&str]) -> ChunkSelector {
        let to_vec = |patterns: &[&str]| -> Vec<String> {
            patterns.iter().map(|p| p.to_string()).collect()
        };
        ChunkSelector::new(&to_vec(include), &to_vec(exclude)).unwrap()
    }

    #[test]
    fn test_binding_forms_are_preserved() {
        let g = graph(&[
            (
                "entry.js",
                "import def from './a.js';\nimport { one, two as three } from './a.js';\nimport * as ns from './a.js';\nimport './a.js';\n",
            ),
            ("a.js", "export const one = 1;\nexport const two = 2;\nexport default 3;\n"),
        ]);
        let s = selector(&["**/*.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(
            outcome.sources["entry.js"],
            "import def from 'vault:a.js';\nimport { one, two as three } from 'vault:a.js';\nimport * as ns from 'vault:a.js';\nimport 'vault:a.js';\n"
        );
        assert_eq!(outcome.rewritten, 4);
        assert!(outcome.flagged.is_empty());
    }

    #[test]
    fn test_reexports_and_dynamic_imports() {
        let g = graph(&[
            (
                "entry.js",
                "export { one } from './a.js';\nexport * from './a.js';\nconst p = import('./a.js');\n",
            ),
            ("a.js", "export const one = 1;\n"),
        ]);
        let s = selector(&["a.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(
            outcome.sources["entry.js"],
            "export { one } from 'vault:a.js';\nexport * from 'vault:a.js';\nconst p = import('vault:a.js');\n"
        );
    }

    #[test]
    fn test_unmanaged_to_unmanaged_is_untouched() {
        let g = graph(&[
            ("c.js", "import { d } from './d.js';\n"),
            ("d.js", "export const d = 4;\n"),
            ("a.js", "export const a = 1;\n"),
        ]);
        let s = selector(&["a.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(outcome.sources["c.js"], "import { d } from './d.js';\n");
        assert_eq!(outcome.rewritten, 0);
    }

    #[test]
    fn test_cross_boundary_references_are_rewritten() {
        // managed importer with an unmanaged target, and the reverse
        let g = graph(&[
            ("a.js", "import { c } from './c.js';\nexport const a = 1;\n"),
            ("c.js", "import { a } from './a.js';\nexport const c = 3;\n"),
        ]);
        let s = selector(&["a.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(
            outcome.sources["a.js"],
            "import { c } from 'vault:c.js';\nexport const a = 1;\n"
        );
        assert_eq!(
            outcome.sources["c.js"],
            "import { a } from 'vault:a.js';\nexport const c = 3;\n"
        );
    }

    #[test]
    fn test_unrecognized_reference_is_flagged_not_rewritten() {
        let g = graph(&[
            ("entry.js", "new Worker('./a.js');\nimport { a } from './a.js';\n"),
            ("a.js", "export const a = 1;\n"),
        ]);
        let s = selector(&["**/*.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(
            outcome.sources["entry.js"],
            "new Worker('./a.js');\nimport { a } from 'vault:a.js';\n"
        );
        assert_eq!(
            outcome.flagged,
            vec![FlaggedReference {
                chunk: "entry.js".to_string(),
                specifier: "./a.js".to_string(),
            }]
        );
    }

    #[test]
    fn test_references_to_non_chunks_are_left_alone() {
        let g = graph(&[(
            "entry.js",
            "import lodash from 'lodash';\nimport data from './data.json';\n",
        )]);
        let s = selector(&["**/*.js"], &[]);

        let outcome = Rewriter::new(&s).rewrite_graph(&g);
        assert_eq!(
            outcome.sources["entry.js"],
            "import lodash from 'lodash';\nimport data from './data.json';\n"
        );
        assert!(outcome.flagged.is_empty());
    }
}
