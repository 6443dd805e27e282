//! Build command implementation

use std::path::PathBuf;
use std::time::Instant;

use anyhow::Result;
use clap::Args;
use colored::Colorize;
use tracing::info;

use crate::build::Builder;
use crate::config::Config;
use crate::utils::{format_duration, format_size};

/// Rewrite chunks, hash them, and emit the manifest
#[derive(Args, Debug)]
pub struct BuildCommand {
    /// Output directory
    #[arg(short, long)]
    pub outdir: Option<PathBuf>,

    /// Treat references that cannot be rewritten as errors
    #[arg(long)]
    pub strict: bool,
}

impl BuildCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let start = Instant::now();

        info!("Loading configuration from {}", config_path);
        let config = Config::load(config_path)?;

        eprintln!("{} Rewriting chunks...", "→".blue());

        let builder = Builder::new(config, self.into())?;
        let result = builder.build()?;

        eprintln!(
            "\n{} Processed {} chunk(s) ({} managed) in {}\n",
            "✓".green().bold(),
            result.chunk_count,
            result.manifest.chunks.len(),
            format_duration(start.elapsed())
        );

        eprintln!(
            "  {} {} {}",
            "•".dimmed(),
            result.manifest_path.display().to_string().cyan(),
            format_size(result.total_bytes).dimmed()
        );
        eprintln!(
            "  {} {} reference(s) rewritten",
            "•".dimmed(),
            result.rewritten_refs
        );

        if !result.flagged.is_empty() {
            eprintln!(
                "\n{} {} reference(s) need manual review:",
                "!".yellow().bold(),
                result.flagged.len()
            );
            for flagged in &result.flagged {
                eprintln!(
                    "  {} {} in {}",
                    "•".yellow(),
                    flagged.specifier,
                    flagged.chunk.dimmed()
                );
            }
        }

        eprintln!();

        Ok(())
    }
}

/// Build options derived from command arguments
#[derive(Debug, Clone, Default)]
pub struct BuildOptions {
    pub outdir: Option<PathBuf>,
    pub strict: bool,
}

impl From<&BuildCommand> for BuildOptions {
    fn from(cmd: &BuildCommand) -> Self {
        Self {
            outdir: cmd.outdir.clone(),
            strict: cmd.strict,
        }
    }
}
