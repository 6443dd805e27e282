//! Runtime resolution engine
//!
//! Consumes the manifest emitted by the build half and turns virtual
//! identifiers into loadable modules: bytes come from a hash-addressed
//! store with a network fallback, identity is virtualized through a
//! per-page-load resolution table, and circular chunk references resolve
//! through lazy aliases.

mod fetch;
mod resolver;
mod store;
mod virtualize;

pub use fetch::{ChunkFetcher, FetchError, FsFetcher, HttpFetcher};
pub use resolver::CacheResolver;
pub use store::{ContentStore, DigestKey, DirStore, MemoryStore, StoreError};
pub use virtualize::{
    DataUrlHost, HostError, MemoryHost, ModuleHandle, ModuleHost, ResolveError, Virtualizer,
};
