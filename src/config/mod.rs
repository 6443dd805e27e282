//! Configuration handling for Chunkvault
//!
//! Parses and manages chunkvault.toml configuration files.

mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

pub use schema::*;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Project metadata
    pub project: ProjectConfig,

    /// Bundler output location and serving prefix
    #[serde(default)]
    pub chunks: ChunksConfig,

    /// Managed-chunk selection
    #[serde(default)]
    pub cache: CacheConfig,

    /// Output configuration
    #[serde(default)]
    pub output: OutputConfig,

    /// Root directory (computed from config file location)
    #[serde(skip)]
    pub root: PathBuf,
}

impl Config {
    /// Load configuration from a file path
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let canonical_path = if path.is_absolute() {
            path.to_path_buf()
        } else {
            std::env::current_dir()?.join(path)
        };

        let content = fs::read_to_string(&canonical_path)
            .with_context(|| format!("Failed to read config file: {}", canonical_path.display()))?;

        let mut config: Config =
            toml::from_str(&content).with_context(|| "Failed to parse chunkvault.toml")?;

        // Set root directory to the directory containing the config file
        config.root = canonical_path
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(|| PathBuf::from("."));

        // Validate configuration
        config.validate()?;

        Ok(config)
    }

    /// Create a default configuration
    pub fn default_config() -> Self {
        Self {
            project: ProjectConfig {
                name: "my-app".to_string(),
                version: "0.1.0".to_string(),
            },
            chunks: ChunksConfig::default(),
            cache: CacheConfig::default(),
            output: OutputConfig::default(),
            root: PathBuf::from("."),
        }
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.cache.include.is_empty() {
            anyhow::bail!("At least one include pattern must be set under [cache]");
        }

        let chunk_dir = self.chunk_dir();
        if !chunk_dir.is_dir() {
            anyhow::bail!("Chunk directory does not exist: {}", chunk_dir.display());
        }

        let entry = chunk_dir.join(&self.chunks.entry);
        if !entry.is_file() {
            anyhow::bail!("Entry chunk not found: {}", entry.display());
        }

        Ok(())
    }

    /// Get the absolute chunk input directory path
    pub fn chunk_dir(&self) -> PathBuf {
        self.root.join(&self.chunks.dir)
    }

    /// Get the absolute output directory path
    pub fn output_dir(&self) -> PathBuf {
        self.root.join(&self.output.dir)
    }

    /// Get the absolute path of the emitted manifest
    pub fn manifest_path(&self) -> PathBuf {
        self.output_dir().join(&self.output.manifest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default_config();
        assert_eq!(config.chunks.dir, "dist");
        assert_eq!(config.chunks.base, "/");
        assert_eq!(config.cache.include, vec!["**/*.js".to_string()]);
        assert_eq!(config.output.manifest, "manifest.json");
    }

    #[test]
    fn test_load_and_validate() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/entry.js"), "export {};\n").unwrap();
        std::fs::write(
            dir.path().join("chunkvault.toml"),
            r#"
[project]
name = "demo"

[chunks]
dir = "dist"
entry = "entry.js"
base = "/assets"

[cache]
include = ["**/*.js"]
exclude = ["entry.js"]
"#,
        )
        .unwrap();

        let config = Config::load(dir.path().join("chunkvault.toml")).unwrap();
        assert_eq!(config.project.name, "demo");
        assert_eq!(config.chunks.base, "/assets");
        assert_eq!(config.cache.exclude, vec!["entry.js".to_string()]);
        assert!(config.chunk_dir().ends_with("dist"));
    }

    #[test]
    fn test_missing_entry_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(
            dir.path().join("chunkvault.toml"),
            "[project]\nname = \"demo\"\n",
        )
        .unwrap();

        assert!(Config::load(dir.path().join("chunkvault.toml")).is_err());
    }

    #[test]
    fn test_empty_include_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("dist")).unwrap();
        std::fs::write(dir.path().join("dist/entry.js"), "export {};\n").unwrap();
        std::fs::write(
            dir.path().join("chunkvault.toml"),
            "[project]\nname = \"demo\"\n\n[cache]\ninclude = []\n",
        )
        .unwrap();

        assert!(Config::load(dir.path().join("chunkvault.toml")).is_err());
    }
}
