//! The build/runtime contract: virtual identifiers, content hashing, and
//! the manifest artifact.
//!
//! The manifest is the only thing crossing the build/runtime boundary. It is
//! assembled after rewriting is finished, because the digest has to cover
//! the exact bytes that will be served.

use std::collections::{BTreeMap, BTreeSet};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::graph::ChunkGraph;
use crate::selector::ChunkSelector;

/// Namespace prefix for virtual identifiers.
pub const VIRTUAL_PREFIX: &str = "vault:";

/// Derive the virtual identifier for a build-output path.
///
/// Pure and collision-free as long as output paths never contain `:`, which
/// holds for bundler output on every supported platform. Stable across
/// builds that produce the same path layout.
pub fn virtual_id(path: &str) -> String {
    format!("{}{}", VIRTUAL_PREFIX, path.replace('\\', "/").replace('/', ":"))
}

/// Hex SHA-256 digest over the exact bytes that will be served.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Manifest record for one managed chunk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChunkEntry {
    /// Content digest of the final rewritten bytes.
    pub hash: String,

    /// Server path relative to the base prefix.
    pub path: String,

    /// Whether the chunk has a default export. A namespace re-export does
    /// not carry `default`, so the runtime shim forwards it explicitly.
    pub has_default: bool,

    /// Virtual identifiers of managed chunks this chunk references.
    #[serde(default)]
    pub deps: Vec<String>,

    /// Output paths of unmanaged chunks this chunk references.
    #[serde(default)]
    pub external: Vec<String>,
}

/// The build output contract consumed by the runtime bootstrap.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    /// Virtual identifier of the entry chunk.
    pub entry: String,

    /// Public path prefix the chunks are served under.
    pub base: String,

    /// Managed chunks by virtual identifier.
    pub chunks: BTreeMap<String, ChunkEntry>,

    /// Unmanaged chunks that managed chunks require, plus the entry when it
    /// is not itself managed. Registered directly by path at runtime.
    #[serde(default)]
    pub unmanaged: Vec<String>,
}

impl Manifest {
    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }

    pub fn from_json(content: &str) -> serde_json::Result<Self> {
        serde_json::from_str(content)
    }
}

/// Assemble the manifest from the rewritten chunk set. Hashing happens
/// here, strictly after rewriting.
pub fn build_manifest(
    graph: &ChunkGraph,
    rewritten: &BTreeMap<String, String>,
    selector: &ChunkSelector,
    entry_path: &str,
    base: &str,
) -> Manifest {
    let mut chunks = BTreeMap::new();
    let mut unmanaged = BTreeSet::new();

    for (path, chunk) in graph.iter() {
        if !selector.is_managed(path) {
            continue;
        }

        let source = rewritten
            .get(path)
            .map(String::as_str)
            .unwrap_or(&chunk.source);

        let mut deps = BTreeSet::new();
        let mut external = BTreeSet::new();
        for r in &chunk.refs {
            if selector.is_managed(&r.target) {
                deps.insert(virtual_id(&r.target));
            } else {
                external.insert(r.target.clone());
                unmanaged.insert(r.target.clone());
            }
        }

        chunks.insert(
            virtual_id(path),
            ChunkEntry {
                hash: content_hash(source.as_bytes()),
                path: path.clone(),
                has_default: chunk.exports.has_default,
                deps: deps.into_iter().collect(),
                external: external.into_iter().collect(),
            },
        );
    }

    if !selector.is_managed(entry_path) {
        unmanaged.insert(entry_path.to_string());
    }

    Manifest {
        entry: virtual_id(entry_path),
        base: base.to_string(),
        chunks,
        unmanaged: unmanaged.into_iter().collect(),
    }
}
