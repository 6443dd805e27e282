//! Warm command implementation

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use tracing::warn;

use crate::config::Config;
use crate::manifest::{content_hash, Manifest};
use crate::runtime::{ContentStore, DigestKey, DirStore};

/// Seed the local content store from a built output directory
#[derive(Args, Debug)]
pub struct WarmCommand {
    /// Path to the manifest (defaults to the configured output)
    #[arg(short, long)]
    pub manifest: Option<PathBuf>,
}

impl WarmCommand {
    pub async fn execute(&self, config_path: &str) -> Result<()> {
        let config = Config::load(config_path)?;
        let path = match &self.manifest {
            Some(path) => path.clone(),
            None => config.manifest_path(),
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Failed to read manifest: {}", path.display()))?;
        let manifest = Manifest::from_json(&content)
            .with_context(|| format!("Failed to parse manifest: {}", path.display()))?;
        let out_dir = path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        let store = DirStore::probe(config.root.join(&config.cache.store))
            .context("Content store unavailable")?;

        let mut warmed = 0;
        for (id, entry) in &manifest.chunks {
            let bytes = fs::read(out_dir.join(&entry.path))
                .with_context(|| format!("Failed to read chunk: {}", entry.path))?;

            // the digest is the store key; never store bytes it does not cover
            if content_hash(&bytes) != entry.hash {
                warn!(virtual_id = %id, "chunk bytes do not match manifest digest, skipping");
                continue;
            }

            store
                .write(&DigestKey::sha256(entry.hash.clone()), &bytes)
                .await
                .with_context(|| format!("Failed to store chunk: {}", id))?;
            warmed += 1;
        }

        eprintln!(
            "{} Warmed {} of {} chunk(s) into {}\n",
            "✓".green().bold(),
            warmed,
            manifest.chunks.len(),
            config.cache.store.cyan()
        );

        Ok(())
    }
}
