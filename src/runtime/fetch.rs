//! Network interface for chunk bytes.
//!
//! A fetch targets the chunk's declared server path. Any non-2xx response
//! is a fetch failure, terminal for that chunk.

use std::io::Read;
use std::path::PathBuf;

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("fetch of {path} returned status {status}")]
    Status { path: String, status: u16 },

    #[error("fetch of {path} failed: {message}")]
    Transport { path: String, message: String },
}

/// Fetches chunk bytes by server path.
#[async_trait]
pub trait ChunkFetcher: Send + Sync {
    async fn fetch(&self, server_path: &str) -> Result<Vec<u8>, FetchError>;
}

/// HTTP fetcher over a blocking client, bridged onto the runtime.
pub struct HttpFetcher {
    origin: Url,
    agent: ureq::Agent,
}

impl HttpFetcher {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            agent: ureq::Agent::new(),
        }
    }
}

#[async_trait]
impl ChunkFetcher for HttpFetcher {
    async fn fetch(&self, server_path: &str) -> Result<Vec<u8>, FetchError> {
        let path = server_path.to_string();
        let url = self.origin.join(&path).map_err(|err| FetchError::Transport {
            path: path.clone(),
            message: err.to_string(),
        })?;
        let agent = self.agent.clone();

        tokio::task::spawn_blocking(move || match agent.get(url.as_str()).call() {
            Ok(response) => {
                let mut bytes = Vec::new();
                response
                    .into_reader()
                    .read_to_end(&mut bytes)
                    .map_err(|err| FetchError::Transport {
                        path: path.clone(),
                        message: err.to_string(),
                    })?;
                Ok(bytes)
            }
            Err(ureq::Error::Status(status, _)) => Err(FetchError::Status { path, status }),
            Err(err) => Err(FetchError::Transport {
                path,
                message: err.to_string(),
            }),
        })
        .await
        .map_err(|err| FetchError::Transport {
            path: server_path.to_string(),
            message: err.to_string(),
        })?
    }
}

/// Serves chunk paths from a local directory tree. Used by tests and by
/// local previews of a built output directory.
pub struct FsFetcher {
    root: PathBuf,
}

impl FsFetcher {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }
}

#[async_trait]
impl ChunkFetcher for FsFetcher {
    async fn fetch(&self, server_path: &str) -> Result<Vec<u8>, FetchError> {
        let rel = server_path.trim_start_matches('/');
        match tokio::fs::read(self.root.join(rel)).await {
            Ok(bytes) => Ok(bytes),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Err(FetchError::Status {
                path: server_path.to_string(),
                status: 404,
            }),
            Err(err) => Err(FetchError::Transport {
                path: server_path.to_string(),
                message: err.to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fs_fetcher_serves_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("assets")).unwrap();
        std::fs::write(dir.path().join("assets/a.js"), b"export {};").unwrap();

        let fetcher = FsFetcher::new(dir.path());
        let bytes = fetcher.fetch("/assets/a.js").await.unwrap();
        assert_eq!(bytes, b"export {};");
    }

    #[tokio::test]
    async fn test_fs_fetcher_missing_file_is_a_status_failure() {
        let dir = tempfile::tempdir().unwrap();
        let fetcher = FsFetcher::new(dir.path());

        match fetcher.fetch("/missing.js").await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 404),
            other => panic!("expected status failure, got {:?}", other),
        }
    }
}
