//! Virtual module identity and resolution.
//!
//! Maps each virtual identifier to a concrete, re-importable reference.
//! Resolution state lives in a table scoped to one bootstrap invocation;
//! it is created per page navigation and never persisted. Circular chunk
//! references are broken with lazy aliases: a request for an identifier
//! whose resolution is already waiting on the requester gets a thin
//! forwarding module instead of blocking, and the forward goes live once
//! the finished table is installed.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use dashmap::DashMap;
use futures_util::future::{self, BoxFuture, Shared};
use futures_util::FutureExt;
use parking_lot::Mutex;
use thiserror::Error;
use tracing::{debug, error, warn};

use super::resolver::CacheResolver;
use crate::manifest::{virtual_id, Manifest};
use crate::utils::join_base;

/// A concrete, re-importable reference to a registered module.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ModuleHandle(pub String);

#[derive(Debug, Error)]
pub enum HostError {
    #[error("resolution table has not been installed")]
    NotInstalled,

    #[error("no resolution for {0}")]
    Unresolvable(String),
}

/// Execution environment seam.
///
/// Registers module source under a concrete reference, receives the
/// finished resolution table in a single step, and performs the entry
/// import. Partial table visibility must never be observable, so `install`
/// is called exactly once, before any import.
#[async_trait]
pub trait ModuleHost: Send + Sync {
    fn register(&self, source: &str) -> ModuleHandle;

    fn install(&self, table: HashMap<String, ModuleHandle>);

    async fn import(&self, virtual_id: &str) -> Result<ModuleHandle, HostError>;
}

/// Mints self-contained `data:` URLs, so registered modules are loadable
/// without any server cooperation.
#[derive(Default)]
pub struct DataUrlHost {
    table: Mutex<Option<HashMap<String, ModuleHandle>>>,
}

impl DataUrlHost {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ModuleHost for DataUrlHost {
    fn register(&self, source: &str) -> ModuleHandle {
        ModuleHandle(format!(
            "data:text/javascript;base64,{}",
            BASE64.encode(source)
        ))
    }

    fn install(&self, table: HashMap<String, ModuleHandle>) {
        *self.table.lock() = Some(table);
    }

    async fn import(&self, virtual_id: &str) -> Result<ModuleHandle, HostError> {
        let table = self.table.lock();
        let table = table.as_ref().ok_or(HostError::NotInstalled)?;
        table
            .get(virtual_id)
            .cloned()
            .ok_or_else(|| HostError::Unresolvable(virtual_id.to_string()))
    }
}

/// Keeps registered sources readable. Used by tests and debugging sessions.
#[derive(Default)]
pub struct MemoryHost {
    modules: DashMap<String, String>,
    next: AtomicUsize,
    table: Mutex<Option<HashMap<String, ModuleHandle>>>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Source text registered under `handle`, if any.
    pub fn source(&self, handle: &ModuleHandle) -> Option<String> {
        self.modules.get(&handle.0).map(|entry| entry.value().clone())
    }

    /// Source text of every registered module, in registration order.
    pub fn sources(&self) -> Vec<String> {
        (0..self.next.load(Ordering::Relaxed))
            .filter_map(|id| {
                self.modules
                    .get(&format!("mem:{id:04}"))
                    .map(|entry| entry.value().clone())
            })
            .collect()
    }

    /// The installed resolution table, if `install` has run.
    pub fn installed(&self) -> Option<HashMap<String, ModuleHandle>> {
        self.table.lock().clone()
    }
}

#[async_trait]
impl ModuleHost for MemoryHost {
    fn register(&self, source: &str) -> ModuleHandle {
        let id = self.next.fetch_add(1, Ordering::Relaxed);
        let handle = ModuleHandle(format!("mem:{id:04}"));
        self.modules.insert(handle.0.clone(), source.to_string());
        handle
    }

    fn install(&self, table: HashMap<String, ModuleHandle>) {
        *self.table.lock() = Some(table);
    }

    async fn import(&self, virtual_id: &str) -> Result<ModuleHandle, HostError> {
        let table = self.table.lock();
        let table = table.as_ref().ok_or(HostError::NotInstalled)?;
        table
            .get(virtual_id)
            .cloned()
            .ok_or_else(|| HostError::Unresolvable(virtual_id.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum ResolveError {
    #[error("manifest declares no entry for {0}")]
    MissingEntry(String),

    #[error("fetch for {virtual_id} failed: {message}")]
    Fetch { virtual_id: String, message: String },

    #[error("{virtual_id} depends on {dep}, which failed: {message}")]
    Dependency {
        virtual_id: String,
        dep: String,
        message: String,
    },

    #[error("module host rejected the import: {0}")]
    Host(String),
}

type ResolutionResult = Result<ModuleHandle, ResolveError>;
type ResolutionFuture = Shared<BoxFuture<'static, ResolutionResult>>;

/// Per-identifier state. Entries are created lazily on first reference and
/// only ever move forward: resolving, then resolved or failed. Terminal
/// states never transition again within one page load.
enum ResolutionState {
    Resolving(ResolutionFuture),
    Resolved(ModuleHandle),
    Failed(ResolveError),
}

/// Identifiers being resolved higher up the current call chain.
/// Membership means a reference cycle within one chain.
#[derive(Clone)]
struct Chain(Arc<HashSet<String>>);

impl Chain {
    fn root() -> Self {
        Self(Arc::new(HashSet::new()))
    }

    fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    fn with(&self, id: &str) -> Self {
        let mut set = (*self.0).clone();
        set.insert(id.to_string());
        Self(Arc::new(set))
    }
}

enum Action {
    Finished(ResolutionResult),
    Await(ResolutionFuture),
    Alias,
}

/// Page-load-scoped resolution context. One instance per bootstrap
/// invocation; dropped at navigation.
#[derive(Clone)]
pub struct Virtualizer {
    inner: Arc<Inner>,
}

struct Inner {
    manifest: Manifest,
    resolver: CacheResolver,
    host: Arc<dyn ModuleHost>,
    table: Mutex<HashMap<String, ResolutionState>>,
    aliases: Mutex<HashMap<String, ModuleHandle>>,

    /// Wait edges between in-flight resolutions: `waits[x]` holds the
    /// identifiers whose resolutions x is currently waiting on. Used to
    /// detect cycles that span concurrently-started chains.
    waits: Mutex<HashMap<String, HashSet<String>>>,
}

impl Virtualizer {
    pub fn new(manifest: Manifest, resolver: CacheResolver, host: Arc<dyn ModuleHost>) -> Self {
        Self {
            inner: Arc::new(Inner {
                manifest,
                resolver,
                host,
                table: Mutex::new(HashMap::new()),
                aliases: Mutex::new(HashMap::new()),
                waits: Mutex::new(HashMap::new()),
            }),
        }
    }

    /// Resolve one virtual identifier to its concrete reference.
    pub async fn resolve(&self, virtual_id: &str) -> ResolutionResult {
        Inner::resolve(self.inner.clone(), virtual_id.to_string(), Chain::root(), None).await
    }

    /// One invocation per page navigation.
    ///
    /// Registers unmanaged chunks, resolves every declared chunk
    /// concurrently, installs the complete resolution table in one step,
    /// and only then imports the entry. A failed chunk takes down its
    /// dependents and, if the entry is among them, the entry import;
    /// independent subgraphs still resolve.
    pub async fn bootstrap(&self) -> ResolutionResult {
        self.inner.register_unmanaged();

        let ids: Vec<String> = self.inner.manifest.chunks.keys().cloned().collect();
        let resolutions: Vec<_> = ids
            .iter()
            .map(|id| Inner::resolve(self.inner.clone(), id.clone(), Chain::root(), None))
            .collect();
        let results = future::join_all(resolutions).await;
        for (id, result) in ids.iter().zip(&results) {
            if let Err(err) = result {
                warn!(virtual_id = %id, %err, "chunk failed to resolve");
            }
        }

        let installed: HashMap<String, ModuleHandle> = {
            let table = self.inner.table.lock();
            table
                .iter()
                .filter_map(|(id, state)| match state {
                    ResolutionState::Resolved(handle) => Some((id.clone(), handle.clone())),
                    _ => None,
                })
                .collect()
        };
        self.inner.host.install(installed);

        let entry = self.inner.manifest.entry.clone();
        let entry_state = {
            let table = self.inner.table.lock();
            match table.get(&entry) {
                Some(ResolutionState::Resolved(_)) => Ok(()),
                Some(ResolutionState::Failed(err)) => Err(err.clone()),
                _ => Err(ResolveError::MissingEntry(entry.clone())),
            }
        };
        if let Err(err) = entry_state {
            error!(%err, "entry bootstrap failed");
            return Err(err);
        }

        self.inner.host.import(&entry).await.map_err(|err| {
            error!(%err, "entry import rejected");
            ResolveError::Host(err.to_string())
        })
    }
}

impl Inner {
    /// Unmanaged chunks are resolved by direct registration under their
    /// served URL. No hash lookup, no fetch.
    fn register_unmanaged(&self) {
        let mut table = self.table.lock();
        for path in &self.manifest.unmanaged {
            let id = virtual_id(path);
            let handle = ModuleHandle(join_base(&self.manifest.base, path));
            debug!(virtual_id = %id, url = %handle.0, "registered unmanaged chunk");
            table.entry(id).or_insert(ResolutionState::Resolved(handle));
        }
    }

    /// `requester` is the identifier whose materialization asked for `id`,
    /// or `None` for a top-level request.
    fn resolve(
        this: Arc<Self>,
        id: String,
        chain: Chain,
        requester: Option<String>,
    ) -> BoxFuture<'static, ResolutionResult> {
        Box::pin(async move {
            if chain.contains(&id) {
                // already resolving higher up this same chain; hand back a
                // lazy alias instead of recursing forever
                return this.alias(&id);
            }

            let action = {
                let mut table = this.table.lock();
                let existing = match table.get(&id) {
                    Some(ResolutionState::Resolved(handle)) => {
                        Some(Action::Finished(Ok(handle.clone())))
                    }
                    Some(ResolutionState::Failed(err)) => {
                        Some(Action::Finished(Err(err.clone())))
                    }
                    Some(ResolutionState::Resolving(shared)) => Some(match &requester {
                        // a second top-level request observes the same
                        // in-progress resolution; no second fetch
                        None => Action::Await(shared.clone()),
                        Some(waiter) => {
                            if this.would_deadlock(&id, waiter) {
                                // the in-flight resolution is itself waiting
                                // on the requester: a cycle across chains
                                Action::Alias
                            } else {
                                Action::Await(shared.clone())
                            }
                        }
                    }),
                    None => None,
                };
                match existing {
                    Some(action) => action,
                    None => {
                        let work = Self::materialize(this.clone(), id.clone(), chain.with(&id));
                        let shared: ResolutionFuture = work.boxed().shared();
                        table.insert(id.clone(), ResolutionState::Resolving(shared.clone()));
                        Action::Await(shared)
                    }
                }
            };

            let in_flight = match action {
                Action::Finished(result) => return result,
                Action::Alias => return this.alias(&id),
                Action::Await(shared) => shared,
            };

            let result = in_flight.await;

            let mut table = this.table.lock();
            if matches!(table.get(&id), Some(ResolutionState::Resolving(_))) {
                let state = match &result {
                    Ok(handle) => ResolutionState::Resolved(handle.clone()),
                    Err(err) => ResolutionState::Failed(err.clone()),
                };
                table.insert(id.clone(), state);
            }

            result
        })
    }

    /// Whether awaiting `id` from `waiter` closes a cycle in the wait
    /// graph, which would stall both resolutions forever.
    fn would_deadlock(&self, id: &str, waiter: &str) -> bool {
        let waits = self.waits.lock();
        let mut stack = vec![id.to_string()];
        let mut seen = HashSet::new();

        while let Some(node) = stack.pop() {
            if node == waiter {
                return true;
            }
            if !seen.insert(node.clone()) {
                continue;
            }
            if let Some(nexts) = waits.get(&node) {
                stack.extend(nexts.iter().cloned());
            }
        }

        false
    }

    /// Fetch the chunk, resolve everything its rewritten code references,
    /// substitute concrete references into the source, and register the
    /// result plus its forwarding shim.
    async fn materialize(this: Arc<Self>, id: String, chain: Chain) -> ResolutionResult {
        let entry = this
            .manifest
            .chunks
            .get(&id)
            .cloned()
            .ok_or_else(|| ResolveError::MissingEntry(id.clone()))?;

        let bytes = this
            .resolver
            .fetch_bytes(&id, &entry.hash, &entry.path)
            .await
            .map_err(|err| ResolveError::Fetch {
                virtual_id: id.clone(),
                message: err.to_string(),
            })?;
        let mut source = String::from_utf8_lossy(&bytes).into_owned();

        // managed dependencies resolve concurrently; cyclic edges come
        // back as aliases rather than blocking
        {
            let mut waits = this.waits.lock();
            waits
                .entry(id.clone())
                .or_default()
                .extend(entry.deps.iter().cloned());
        }
        let dep_futures: Vec<_> = entry
            .deps
            .iter()
            .map(|dep| Self::resolve(this.clone(), dep.clone(), chain.clone(), Some(id.clone())))
            .collect();
        let resolved = future::join_all(dep_futures).await;
        this.waits.lock().remove(&id);

        for (dep, result) in entry.deps.iter().zip(resolved) {
            let handle = result.map_err(|err| ResolveError::Dependency {
                virtual_id: id.clone(),
                dep: dep.clone(),
                message: err.to_string(),
            })?;
            source = substitute(&source, dep, &handle.0);
        }

        // unmanaged dependencies resolve to their served URL directly
        for path in &entry.external {
            let dep_id = virtual_id(path);
            let url = join_base(&this.manifest.base, path);
            source = substitute(&source, &dep_id, &url);
        }

        let unit = this.host.register(&source);
        debug!(virtual_id = %id, unit = %unit.0, "materialized chunk");

        Ok(this
            .host
            .register(&reexport_source(&unit.0, entry.has_default)))
    }

    /// Forwarding wrapper handed to dependents of an identifier that is
    /// still resolving. It re-exports from the virtual identifier itself,
    /// which resolves through the installed table; that indirection is
    /// what makes it lazy.
    fn alias(&self, id: &str) -> ResolutionResult {
        let mut aliases = self.aliases.lock();
        if let Some(handle) = aliases.get(id) {
            return Ok(handle.clone());
        }

        let entry = self
            .manifest
            .chunks
            .get(id)
            .ok_or_else(|| ResolveError::MissingEntry(id.to_string()))?;
        let handle = self.host.register(&reexport_source(id, entry.has_default));
        debug!(virtual_id = %id, alias = %handle.0, "issued lazy alias");

        aliases.insert(id.to_string(), handle.clone());
        Ok(handle)
    }
}

/// `export *` does not carry a default export, so `default` is forwarded
/// explicitly when the chunk has one.
fn reexport_source(target: &str, has_default: bool) -> String {
    let mut source = format!("export * from \"{target}\";\n");
    if has_default {
        source.push_str(&format!("export {{ default }} from \"{target}\";\n"));
    }
    source
}

/// Replace a quoted identifier with a quoted concrete reference. Virtual
/// identifiers are globally unique strings, so an exact quoted match is
/// unambiguous.
fn substitute(source: &str, from: &str, to: &str) -> String {
    source
        .replace(&format!("\"{from}\""), &format!("\"{to}\""))
        .replace(&format!("'{from}'"), &format!("'{to}'"))
}
