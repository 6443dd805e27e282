//! Inspect command implementation

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;

use crate::config::Config;
use crate::manifest::Manifest;

/// Print the chunk table of a build manifest
#[derive(Args, Debug)]
pub struct InspectCommand {
    /// Path to the manifest (defaults to the configured output)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

impl InspectCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let path = match &self.manifest {
            Some(path) => path.clone(),
            None => Config::load(config_path)?.manifest_path(),
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Manifest::from_json(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;

        eprintln!("{}  {}", "entry".bold(), manifest.entry.cyan());
        eprintln!("{}   {}", "base".bold(), manifest.base);

        eprintln!("\n{}", "managed chunks".bold());
        for (id, entry) in &manifest.chunks {
            let digest = entry.hash.get(..12).unwrap_or(&entry.hash);
            eprintln!(
                "  {} {} {} {}{}",
                "•".dimmed(),
                id.cyan(),
                digest.dimmed(),
                entry.path,
                if entry.has_default {
                    " (default)".yellow().to_string()
                } else {
                    String::new()
                }
            );
        }

        if !manifest.unmanaged.is_empty() {
            eprintln!("\n{}", "unmanaged".bold());
            for path in &manifest.unmanaged {
                eprintln!("  {} {}", "◦".dimmed(), path);
            }
        }

        eprintln!();

        Ok(())
    }
}
