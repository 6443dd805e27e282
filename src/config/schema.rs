//! Configuration schema definitions

use serde::{Deserialize, Serialize};

/// Project metadata configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectConfig {
    /// Project name
    pub name: String,

    /// Project version
    #[serde(default = "default_version")]
    pub version: String,
}

fn default_version() -> String {
    "0.1.0".to_string()
}

/// Where the external bundler put its output, and how it is served
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunksConfig {
    /// Directory containing the bundler's output chunks
    #[serde(default = "default_chunk_dir")]
    pub dir: String,

    /// Entry chunk, relative to `dir`
    #[serde(default = "default_entry")]
    pub entry: String,

    /// Public path prefix the chunks are served under
    #[serde(default = "default_base")]
    pub base: String,
}

impl Default for ChunksConfig {
    fn default() -> Self {
        Self {
            dir: default_chunk_dir(),
            entry: default_entry(),
            base: default_base(),
        }
    }
}

fn default_chunk_dir() -> String {
    "dist".to_string()
}

fn default_entry() -> String {
    "entry.js".to_string()
}

fn default_base() -> String {
    "/".to_string()
}

/// Which chunks get content-addressed caching
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Glob patterns selecting managed chunks
    #[serde(default = "default_include")]
    pub include: Vec<String>,

    /// Glob patterns vetoing chunks from management
    #[serde(default)]
    pub exclude: Vec<String>,

    /// Local hash-addressed store directory used by the runtime preview
    #[serde(default = "default_store")]
    pub store: String,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            include: default_include(),
            exclude: Vec::new(),
            store: default_store(),
        }
    }
}

fn default_include() -> Vec<String> {
    vec!["**/*.js".to_string()]
}

fn default_store() -> String {
    ".chunkvault/store".to_string()
}

/// Output configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    /// Output directory for rewritten chunks
    #[serde(default = "default_output_dir")]
    pub dir: String,

    /// Manifest filename within the output directory
    #[serde(default = "default_manifest")]
    pub manifest: String,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            dir: default_output_dir(),
            manifest: default_manifest(),
        }
    }
}

fn default_output_dir() -> String {
    "dist-cached".to_string()
}

fn default_manifest() -> String {
    "manifest.json".to_string()
}
