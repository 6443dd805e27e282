//! Byte acquisition for one chunk: store first, network on miss,
//! best-effort write-back.

use std::sync::Arc;

use tracing::{debug, warn};

use super::fetch::{ChunkFetcher, FetchError};
use super::store::{ContentStore, DigestKey, StoreError};
use crate::utils::join_base;

/// Obtains chunk bytes from the hash-addressed store or the network.
///
/// The store capability is probed once when the resolver is constructed;
/// `None` means every chunk goes straight to the network for the whole
/// page load. Callers are expected to request each virtual identifier at
/// most once per page load (the virtualizer shares in-flight resolutions),
/// which is what bounds this to a single network fetch per chunk.
pub struct CacheResolver {
    store: Option<Arc<dyn ContentStore>>,
    fetcher: Arc<dyn ChunkFetcher>,
    base: String,
}

impl CacheResolver {
    pub fn new(
        store: Option<Arc<dyn ContentStore>>,
        fetcher: Arc<dyn ChunkFetcher>,
        base: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fetcher,
            base: base.into(),
        }
    }

    /// Fetch the bytes for one chunk.
    ///
    /// A store miss or store failure falls through to the network; a store
    /// write failure is logged and absorbed. Only a failed network fetch is
    /// terminal for the chunk.
    pub async fn fetch_bytes(
        &self,
        virtual_id: &str,
        hash: &str,
        path: &str,
    ) -> Result<Vec<u8>, FetchError> {
        if let Some(store) = &self.store {
            match store.read(&DigestKey::sha256(hash)).await {
                Ok(bytes) => {
                    debug!(%virtual_id, "store hit");
                    return Ok(bytes);
                }
                Err(StoreError::NotFound) => {
                    debug!(%virtual_id, "store miss");
                }
                Err(err) => {
                    warn!(%virtual_id, %err, "store read failed, falling back to network");
                }
            }
        }

        let server_path = join_base(&self.base, path);
        let bytes = self.fetcher.fetch(&server_path).await?;

        if let Some(store) = &self.store {
            if let Err(err) = store.write(&DigestKey::sha256(hash), &bytes).await {
                // the current page load must never depend on a cache write
                warn!(%virtual_id, %err, "store write failed");
            }
        }

        Ok(bytes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::runtime::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingFetcher {
        bytes: Vec<u8>,
        calls: AtomicUsize,
        fail: bool,
    }

    impl CountingFetcher {
        fn new(bytes: &[u8]) -> Self {
            Self {
                bytes: bytes.to_vec(),
                calls: AtomicUsize::new(0),
                fail: false,
            }
        }

        fn failing() -> Self {
            Self {
                bytes: Vec::new(),
                calls: AtomicUsize::new(0),
                fail: true,
            }
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl ChunkFetcher for CountingFetcher {
        async fn fetch(&self, server_path: &str) -> Result<Vec<u8>, FetchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(FetchError::Status {
                    path: server_path.to_string(),
                    status: 500,
                });
            }
            Ok(self.bytes.clone())
        }
    }

    struct BrokenStore;

    #[async_trait]
    impl ContentStore for BrokenStore {
        async fn read(&self, _key: &DigestKey) -> Result<Vec<u8>, StoreError> {
            Err(StoreError::Backend("disk on fire".to_string()))
        }

        async fn write(&self, _key: &DigestKey, _bytes: &[u8]) -> Result<(), StoreError> {
            Err(StoreError::Backend("disk on fire".to_string()))
        }
    }

    #[tokio::test]
    async fn test_store_hit_issues_no_fetch() {
        let store = Arc::new(MemoryStore::new());
        let hash = crate::manifest::content_hash(b"cached");
        store
            .write(&DigestKey::sha256(hash.clone()), b"cached")
            .await
            .unwrap();

        let fetcher = Arc::new(CountingFetcher::new(b"network"));
        let resolver = CacheResolver::new(Some(store), fetcher.clone(), "/assets");

        let bytes = resolver
            .fetch_bytes("vault:a.js", &hash, "a.js")
            .await
            .unwrap();
        assert_eq!(bytes, b"cached");
        assert_eq!(fetcher.calls(), 0);
    }

    #[tokio::test]
    async fn test_store_miss_fetches_once_and_writes_back() {
        let store = Arc::new(MemoryStore::new());
        let hash = crate::manifest::content_hash(b"network");
        let fetcher = Arc::new(CountingFetcher::new(b"network"));
        let resolver = CacheResolver::new(Some(store.clone()), fetcher.clone(), "/assets");

        let bytes = resolver
            .fetch_bytes("vault:a.js", &hash, "a.js")
            .await
            .unwrap();
        assert_eq!(bytes, b"network");
        assert_eq!(fetcher.calls(), 1);
        assert!(store.contains(&DigestKey::sha256(hash)));
    }

    #[tokio::test]
    async fn test_absent_store_means_pure_network_mode() {
        let fetcher = Arc::new(CountingFetcher::new(b"network"));
        let resolver = CacheResolver::new(None, fetcher.clone(), "/assets");

        let bytes = resolver
            .fetch_bytes("vault:a.js", "00", "a.js")
            .await
            .unwrap();
        assert_eq!(bytes, b"network");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_broken_store_is_absorbed() {
        let fetcher = Arc::new(CountingFetcher::new(b"network"));
        let resolver = CacheResolver::new(Some(Arc::new(BrokenStore)), fetcher.clone(), "/");

        // read failure falls through to the network, write failure is logged only
        let bytes = resolver
            .fetch_bytes("vault:a.js", "00", "a.js")
            .await
            .unwrap();
        assert_eq!(bytes, b"network");
        assert_eq!(fetcher.calls(), 1);
    }

    #[tokio::test]
    async fn test_fetch_failure_is_terminal() {
        let fetcher = Arc::new(CountingFetcher::failing());
        let resolver = CacheResolver::new(None, fetcher, "/");

        assert!(resolver.fetch_bytes("vault:a.js", "00", "a.js").await.is_err());
    }
}
