//! Snapshot cache with two invalidation scopes.
//!
//! Each [`Scope`] has at most one current [`Snapshot`]. A snapshot records the
//! dependency and project generations it was built against and is current
//! only while both are unchanged. Invalidation just bumps a counter, so any
//! number of signals before the next request collapse into one rebuild.
//!
//! While one caller rebuilds a scope, other callers for that scope get the
//! previous snapshot instead of waiting. A rebuild can notice through its
//! [`RebuildTicket`] that newer signals arrived and give up early. At most
//! [`MAX_ABANDONED_REBUILDS`] rebuilds in a row may give up, so a steady
//! stream of signals still publishes fresher snapshots.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::Mutex;

use crate::error::ConfscopeError;
use crate::index::{FeatureResolver, IndexBuilder, Scope, TypeIndex};
use crate::types::Declarations;

/// Supplies declarations for a scope. Implementations may return crates in
/// any order.
pub trait DeclarationSource {
    /// The current crate and the other workspace members.
    fn project_declarations(&self, scope: &Scope) -> Result<Vec<Declarations>, ConfscopeError>;

    /// The dependency closure of the current crate.
    fn dependency_declarations(&self, scope: &Scope) -> Result<Vec<Declarations>, ConfscopeError>;
}

/// An index together with the generations it reflects.
#[derive(Debug, Clone)]
pub struct Snapshot {
    pub index: Arc<TypeIndex>,
    pub dependency_generation: u64,
    pub project_generation: u64,
}

impl Snapshot {
    fn generations(&self) -> (u64, u64) {
        (self.dependency_generation, self.project_generation)
    }
}

/// Handed to a rebuild so it can check whether it is still wanted.
pub struct RebuildTicket<'a> {
    cache: &'a IndexCache,
    dependency_generation: u64,
    project_generation: u64,
    has_previous: bool,
    abandoned: u32,
}

impl RebuildTicket<'_> {
    /// Newer invalidation signals arrived since this rebuild started.
    pub fn is_superseded(&self) -> bool {
        self.cache.generations() != (self.dependency_generation, self.project_generation)
    }

    /// A previous snapshot will keep serving if this rebuild gives up.
    pub fn has_previous(&self) -> bool {
        self.has_previous
    }

    /// Giving up now keeps a previous snapshot serving and does not starve
    /// the scope.
    pub fn can_abandon(&self) -> bool {
        self.has_previous && self.abandoned < MAX_ABANDONED_REBUILDS
    }

    pub fn dependency_generation(&self) -> u64 {
        self.dependency_generation
    }

    pub fn project_generation(&self) -> u64 {
        self.project_generation
    }
}

#[derive(Default)]
struct Entry {
    snapshot: Option<Snapshot>,
    rebuilding: bool,
    abandoned: u32,
}

/// Clears the in-flight flag however the rebuild ends.
struct RebuildGuard<'a> {
    cache: &'a IndexCache,
    scope: &'a Scope,
}

impl Drop for RebuildGuard<'_> {
    fn drop(&mut self) {
        if let Some(entry) = self.cache.entries.lock().get_mut(self.scope) {
            entry.rebuilding = false;
        }
    }
}

/// Consecutive rebuilds of one scope that may give up before one must finish.
pub const MAX_ABANDONED_REBUILDS: u32 = 2;

type DependencyEntry = (u64, Arc<Vec<Declarations>>);

#[derive(Default)]
pub struct IndexCache {
    dependency_generation: AtomicU64,
    project_generation: AtomicU64,
    entries: Mutex<HashMap<Scope, Entry>>,
    dependencies: Mutex<HashMap<BTreeSet<String>, DependencyEntry>>,
}

impl IndexCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dependency or library source changed.
    pub fn invalidate_dependencies(&self) {
        self.dependency_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// First-party source changed.
    pub fn invalidate_project(&self) {
        self.project_generation.fetch_add(1, Ordering::SeqCst);
    }

    /// `(dependency, project)` generation counters.
    pub fn generations(&self) -> (u64, u64) {
        (
            self.dependency_generation.load(Ordering::SeqCst),
            self.project_generation.load(Ordering::SeqCst),
        )
    }

    /// The latest snapshot for `scope`, current or not. Never waits on a rebuild.
    pub fn snapshot(&self, scope: &Scope) -> Option<Snapshot> {
        self.entries
            .lock()
            .get(scope)
            .and_then(|entry| entry.snapshot.clone())
    }

    pub fn is_current(&self, snapshot: &Snapshot) -> bool {
        snapshot.generations() == self.generations()
    }

    /// Return the current snapshot for `scope`, rebuilding it with `build`
    /// when it is missing or stale.
    ///
    /// If another caller is already rebuilding the scope, the previous
    /// snapshot (possibly `None`) is returned immediately. If `build` returns
    /// `Ok(None)`, the rebuild is abandoned and the previous snapshot stays.
    pub fn get_or_rebuild<F, E>(&self, scope: &Scope, build: F) -> Result<Option<Snapshot>, E>
    where
        F: FnOnce(&RebuildTicket<'_>) -> Result<Option<TypeIndex>, E>,
    {
        let (dependency_generation, project_generation) = self.generations();
        let (has_previous, abandoned) = {
            let mut entries = self.entries.lock();
            let entry = entries.entry(scope.clone()).or_default();
            if let Some(snapshot) = &entry.snapshot
                && snapshot.generations() == (dependency_generation, project_generation)
            {
                tracing::debug!(crate_name = %scope.current, "index cache hit");
                return Ok(Some(snapshot.clone()));
            }
            if entry.rebuilding {
                tracing::debug!(crate_name = %scope.current, "rebuild in flight, serving previous snapshot");
                return Ok(entry.snapshot.clone());
            }
            entry.rebuilding = true;
            (entry.snapshot.is_some(), entry.abandoned)
        };

        let _guard = RebuildGuard { cache: self, scope };
        let ticket = RebuildTicket {
            cache: self,
            dependency_generation,
            project_generation,
            has_previous,
            abandoned,
        };
        tracing::debug!(
            crate_name = %scope.current,
            dependency_generation,
            project_generation,
            "rebuilding type index"
        );
        let built = build(&ticket)?;

        let mut entries = self.entries.lock();
        let entry = entries.entry(scope.clone()).or_default();
        match built {
            Some(index) => {
                let snapshot = Snapshot {
                    index: Arc::new(index),
                    dependency_generation,
                    project_generation,
                };
                entry.snapshot = Some(snapshot.clone());
                entry.abandoned = 0;
                Ok(Some(snapshot))
            }
            None => {
                entry.abandoned += 1;
                tracing::debug!(
                    crate_name = %scope.current,
                    abandoned = entry.abandoned,
                    "rebuild abandoned"
                );
                Ok(entry.snapshot.clone())
            }
        }
    }

    /// Build or reuse the index for `scope` from `source`.
    ///
    /// Dependency declarations are rescanned only when the dependency
    /// generation moved, so project edits rescan project crates alone. Once
    /// both scans are done the index is installed even if newer signals
    /// arrived meanwhile; it carries the generations it was built against, so
    /// the next request rebuilds again.
    pub fn load(
        &self,
        scope: &Scope,
        source: &dyn DeclarationSource,
        features: &dyn FeatureResolver,
    ) -> Result<Option<Arc<TypeIndex>>, ConfscopeError> {
        let snapshot = self.get_or_rebuild(scope, |ticket| {
            let dependencies = self.dependency_declarations(scope, source, ticket)?;
            if ticket.is_superseded() && ticket.can_abandon() {
                return Ok::<_, ConfscopeError>(None);
            }
            let project = source.project_declarations(scope)?;
            let index = IndexBuilder::new(scope.clone(), features)
                .build(dependencies.iter().chain(project.iter()));
            Ok(Some(index))
        })?;
        Ok(snapshot.map(|s| s.index))
    }

    fn dependency_declarations(
        &self,
        scope: &Scope,
        source: &dyn DeclarationSource,
        ticket: &RebuildTicket<'_>,
    ) -> Result<Arc<Vec<Declarations>>, ConfscopeError> {
        let generation = ticket.dependency_generation();
        if let Some((built_at, decls)) = self.dependencies.lock().get(&scope.dependencies)
            && *built_at == generation
        {
            return Ok(Arc::clone(decls));
        }
        let decls = Arc::new(source.dependency_declarations(scope)?);
        self.dependencies
            .lock()
            .insert(scope.dependencies.clone(), (generation, Arc::clone(&decls)));
        Ok(decls)
    }
}
