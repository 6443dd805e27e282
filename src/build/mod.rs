//! Build orchestration
//!
//! Runs the pipeline over an existing bundler output directory: scan the
//! chunk graph, classify chunks, rewrite references, hash the rewritten
//! bytes, and emit the manifest. Hashing always happens after rewriting;
//! the digest has to cover the exact bytes that will be served.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tracing::{debug, info, warn};

use crate::cli::BuildOptions;
use crate::config::Config;
use crate::graph::ChunkGraph;
use crate::manifest::{self, Manifest};
use crate::rewriter::{FlaggedReference, Rewriter};
use crate::selector::ChunkSelector;

/// Result of a build operation
#[derive(Debug)]
pub struct BuildResult {
    /// The emitted manifest
    pub manifest: Manifest,

    /// Where the manifest was written
    pub manifest_path: PathBuf,

    /// Output directory containing the rewritten chunks
    pub out_dir: PathBuf,

    /// Number of chunks in the graph
    pub chunk_count: usize,

    /// Number of references rewritten to virtual identifiers
    pub rewritten_refs: usize,

    /// References needing manual review
    pub flagged: Vec<FlaggedReference>,

    /// Total size of the written chunks
    pub total_bytes: usize,

    /// Wall-clock build time
    pub elapsed: Duration,
}

/// The build pipeline
pub struct Builder {
    /// Project configuration
    config: Arc<Config>,

    /// Build options
    options: BuildOptions,

    /// Managed-chunk classification
    selector: ChunkSelector,
}

impl Builder {
    /// Create a new builder instance. Invalid selection patterns are fatal.
    pub fn new(config: Config, options: BuildOptions) -> Result<Self> {
        let selector = ChunkSelector::new(&config.cache.include, &config.cache.exclude)
            .context("invalid chunk selection pattern")?;

        Ok(Self {
            config: Arc::new(config),
            options,
            selector,
        })
    }

    /// Run the pipeline
    pub fn build(&self) -> Result<BuildResult> {
        let start = Instant::now();

        // 1. Scan the bundler output into a chunk graph
        info!("Scanning chunk directory...");
        let chunk_dir = self.config.chunk_dir();
        let graph = ChunkGraph::load(&chunk_dir)?;
        anyhow::ensure!(
            graph.contains(&self.config.chunks.entry),
            "Entry chunk {} is not part of the chunk graph",
            self.config.chunks.entry
        );
        debug!(chunks = graph.len(), "scanned {}", chunk_dir.display());

        // 2. Rewrite references touching managed chunks
        info!("Rewriting module references...");
        let rewriter = Rewriter::new(&self.selector);
        let outcome = rewriter.rewrite_graph(&graph);
        if !outcome.flagged.is_empty() {
            warn!(
                count = outcome.flagged.len(),
                "references left unrewritten, manual review needed"
            );
            if self.options.strict {
                anyhow::bail!(
                    "{} reference(s) could not be rewritten",
                    outcome.flagged.len()
                );
            }
        }

        // 3. Hash the final bytes and assemble the manifest
        info!("Hashing chunks and assembling manifest...");
        let manifest = manifest::build_manifest(
            &graph,
            &outcome.sources,
            &self.selector,
            &self.config.chunks.entry,
            &self.config.chunks.base,
        );

        // 4. Write rewritten chunks and the manifest
        info!("Writing output...");
        let out_dir = self
            .options
            .outdir
            .clone()
            .unwrap_or_else(|| self.config.output_dir());
        fs::create_dir_all(&out_dir).context("Failed to create output directory")?;

        let mut total_bytes = 0;
        for (path, source) in &outcome.sources {
            let dest = out_dir.join(path);
            if let Some(parent) = dest.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&dest, source)
                .with_context(|| format!("Failed to write chunk: {}", dest.display()))?;
            total_bytes += source.len();
        }

        let manifest_path = out_dir.join(&self.config.output.manifest);
        fs::write(&manifest_path, manifest.to_json()?)
            .with_context(|| format!("Failed to write manifest: {}", manifest_path.display()))?;

        debug!("Build completed in {:?}", start.elapsed());

        Ok(BuildResult {
            chunk_count: graph.len(),
            rewritten_refs: outcome.rewritten,
            flagged: outcome.flagged,
            total_bytes,
            elapsed: start.elapsed(),
            manifest,
            manifest_path,
            out_dir,
        })
    }
}
