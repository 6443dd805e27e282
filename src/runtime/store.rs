//! Hash-addressed content store.
//!
//! The store is external and shared; other page loads may write to it
//! concurrently. Writes are idempotent (same digest, same bytes), so the
//! key itself enforces at most one logical value per entry and no locking
//! is needed.

use std::path::PathBuf;

use async_trait::async_trait;
use dashmap::DashMap;
use thiserror::Error;
use tracing::warn;

/// Key for one store entry: digest algorithm plus hex digest of the content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DigestKey {
    pub algorithm: &'static str,
    pub value: String,
}

impl DigestKey {
    pub fn sha256(value: impl Into<String>) -> Self {
        Self {
            algorithm: "SHA-256",
            value: value.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum StoreError {
    /// The store has no entry for this digest. A cache miss, not a failure.
    #[error("no entry for digest")]
    NotFound,

    #[error("store backend error: {0}")]
    Backend(String),
}

/// Read/write access to a content-addressed byte store.
#[async_trait]
pub trait ContentStore: Send + Sync {
    async fn read(&self, key: &DigestKey) -> Result<Vec<u8>, StoreError>;

    /// Durable once this returns `Ok`.
    async fn write(&self, key: &DigestKey, bytes: &[u8]) -> Result<(), StoreError>;
}

/// Directory-backed store, one file per digest under
/// `<root>/<algorithm>/<digest>`.
pub struct DirStore {
    root: PathBuf,
}

impl DirStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// One-shot capability probe, performed once per page load. `None`
    /// puts the caller in pure network mode for every chunk.
    pub fn probe(root: impl Into<PathBuf>) -> Option<Self> {
        let root: PathBuf = root.into();
        match std::fs::create_dir_all(&root) {
            Ok(()) => Some(Self { root }),
            Err(err) => {
                warn!(root = %root.display(), %err, "content store unavailable");
                None
            }
        }
    }

    fn entry_dir(&self, key: &DigestKey) -> PathBuf {
        self.root.join(key.algorithm.to_ascii_lowercase())
    }
}

#[async_trait]
impl ContentStore for DirStore {
    async fn read(&self, key: &DigestKey) -> Result<Vec<u8>, StoreError> {
        let path = self.entry_dir(key).join(&key.value);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound),
            Err(err) => Err(StoreError::Backend(err.to_string())),
        }
    }

    async fn write(&self, key: &DigestKey, bytes: &[u8]) -> Result<(), StoreError> {
        let dir = self.entry_dir(key);
        tokio::fs::create_dir_all(&dir)
            .await
            .map_err(backend)?;

        // finalize via rename so a torn write is never visible under the digest
        let tmp = dir.join(format!("{}.partial", key.value));
        tokio::fs::write(&tmp, bytes).await.map_err(backend)?;
        tokio::fs::rename(&tmp, dir.join(&key.value))
            .await
            .map_err(backend)?;

        Ok(())
    }
}

fn backend(err: std::io::Error) -> StoreError {
    StoreError::Backend(err.to_string())
}

/// In-memory store. Useful in tests and as a per-process cache.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, Vec<u8>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, key: &DigestKey) -> bool {
        self.entries.contains_key(&storage_key(key))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl ContentStore for MemoryStore {
    async fn read(&self, key: &DigestKey) -> Result<Vec<u8>, StoreError> {
        self.entries
            .get(&storage_key(key))
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)
    }

    async fn write(&self, key: &DigestKey, bytes: &[u8]) -> Result<(), StoreError> {
        self.entries.insert(storage_key(key), bytes.to_vec());
        Ok(())
    }
}

fn storage_key(key: &DigestKey) -> String {
    format!("{}/{}", key.algorithm, key.value)
}
