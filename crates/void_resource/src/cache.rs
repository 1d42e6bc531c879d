//! Resource cache - canonical path to weak resource
//!
//! The cache observes, it never owns: entries are weak handles, published when
//! a resource is assigned a path and retracted when it is destroyed or moves.
//!
//! Lock order is cache lock, then resource identity lock. Strong handles
//! upgraded while the lock is held are only released after it is dropped,
//! since a last-reference drop re-enters the cache to retract itself.

use std::collections::{BTreeMap, HashMap};
use std::fmt::Write as _;
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::error::{ResourceError, ResourceResult};
use crate::io::FileSystem;
use crate::path::ResourcePath;
use crate::resource::{PathRegistry, Resource, ResourceId, WeakResource};

/// How a load interacts with the cache
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum CacheMode {
    /// Return a cached resource if one is live, publish the loaded one
    #[default]
    Reuse,
    /// Neither consult nor publish to the cache
    Ignore,
    /// Always load, then take over the cache slot
    Replace,
}

struct CacheState {
    entries: HashMap<ResourcePath, WeakResource>,
    /// Resources produced through a translation remap, keyed by id
    remapped: BTreeMap<ResourceId, WeakResource>,
}

struct CacheShared {
    state: RwLock<CacheState>,
}

impl PathRegistry for CacheShared {
    fn resource_dropped(&self, path: &ResourcePath, id: ResourceId) {
        let mut state = self.state.write();
        state.remapped.remove(&id);
        if path.is_empty() {
            return;
        }
        if matches!(state.entries.get(path), Some(entry) if entry.id() == id) {
            state.entries.remove(path);
            log::debug!("Retracted {} on destruction", path);
        }
    }

    fn registry_key(&self) -> usize {
        self as *const CacheShared as usize
    }
}

/// Process-wide map from canonical path to live resource
#[derive(Clone)]
pub struct ResourceCache {
    shared: Arc<CacheShared>,
}

impl ResourceCache {
    /// Create an empty cache
    pub fn new() -> Self {
        Self {
            shared: Arc::new(CacheShared {
                state: RwLock::new(CacheState {
                    entries: HashMap::new(),
                    remapped: BTreeMap::new(),
                }),
            }),
        }
    }

    fn registry(&self) -> Weak<dyn PathRegistry> {
        let weak: Weak<CacheShared> = Arc::downgrade(&self.shared);
        weak
    }

    fn key(&self) -> usize {
        self.shared.registry_key()
    }

    /// Look up a live resource; empty if absent or expired
    pub fn lookup(&self, path: &ResourcePath) -> Option<Resource> {
        let state = self.shared.state.read();
        state.entries.get(path).and_then(WeakResource::upgrade)
    }

    /// Check for a live entry
    pub fn contains(&self, path: &ResourcePath) -> bool {
        let state = self.shared.state.read();
        state.entries.get(path).map(WeakResource::is_alive).unwrap_or(false)
    }

    /// Publish `resource` at `path`
    ///
    /// Replaces an expired entry. A live entry held by another resource is
    /// evicted (its path cleared) with `take_over`, otherwise the call fails
    /// with `PathConflict`.
    pub fn publish(&self, path: &ResourcePath, resource: &Resource, take_over: bool) -> ResourceResult<()> {
        self.assign_path(resource, path.clone(), take_over)
    }

    /// Retract `resource` from `path`; no-op if the slot holds something else
    pub fn retract(&self, path: &ResourcePath, resource: &Resource) {
        let mut state = self.shared.state.write();
        if matches!(state.entries.get(path), Some(entry) if entry.id() == resource.id()) {
            state.entries.remove(path);
            let mut identity = resource.identity();
            if identity.path == *path {
                identity.path = ResourcePath::empty();
            }
            log::debug!("Retracted {}", path);
        }
    }

    /// Move `resource` to `path` (empty path unpublishes)
    pub(crate) fn assign_path(&self, resource: &Resource, path: ResourcePath, take_over: bool) -> ResourceResult<()> {
        let mut evicted: Option<Resource> = None;
        let result = self.assign_path_locked(resource, path, take_over, &mut evicted);
        // Released only now that the write guard is gone
        drop(evicted);
        result
    }

    fn assign_path_locked(
        &self,
        resource: &Resource,
        path: ResourcePath,
        take_over: bool,
        evicted: &mut Option<Resource>,
    ) -> ResourceResult<()> {
        let mut state = self.shared.state.write();
        let mut identity = resource.identity();

        let foreign = identity
            .registry
            .as_ref()
            .and_then(Weak::upgrade)
            .map(|r| r.registry_key() != self.key())
            .unwrap_or(false);
        if foreign && !identity.path.is_empty() {
            return Err(ResourceError::Invalid(format!(
                "resource is published in another cache at {}",
                identity.path
            )));
        }

        if identity.path == path {
            return Ok(());
        }

        if !path.is_empty() {
            let existing = state
                .entries
                .get(&path)
                .and_then(WeakResource::upgrade)
                .filter(|existing| existing.id() != resource.id());
            if let Some(existing) = existing {
                if !take_over {
                    *evicted = Some(existing);
                    return Err(ResourceError::PathConflict(path.to_string()));
                }
                existing.identity().path = ResourcePath::empty();
                log::warn!("Resource {:?} took over {} from {:?}", resource.id(), path, existing.id());
                *evicted = Some(existing);
            }
        }

        let old = std::mem::replace(&mut identity.path, path.clone());
        if !old.is_empty() && matches!(state.entries.get(&old), Some(e) if e.id() == resource.id()) {
            state.entries.remove(&old);
            log::debug!("Retracted {}", old);
        }

        if !path.is_empty() {
            state.entries.insert(path.clone(), resource.downgrade());
            identity.registry = Some(self.registry());
            log::debug!("Published {} as {:?}", path, resource.id());
        }
        Ok(())
    }

    /// Remember that `resource` came from a translation remap of `source`
    pub(crate) fn track_remapped(&self, resource: &Resource, source: &ResourcePath) {
        let mut state = self.shared.state.write();
        let mut identity = resource.identity();
        identity.translation_remapped = true;
        identity.remap_source = Some(source.clone());
        if identity.registry.is_none() {
            identity.registry = Some(self.registry());
        }
        state.remapped.insert(resource.id(), resource.downgrade());
    }

    /// Live translation-remapped resources
    pub fn remapped_resources(&self) -> Vec<Resource> {
        let state = self.shared.state.read();
        state.remapped.values().filter_map(WeakResource::upgrade).collect()
    }

    /// Strong handles to every live cached resource
    pub fn snapshot(&self) -> Vec<Resource> {
        let state = self.shared.state.read();
        state.entries.values().filter_map(WeakResource::upgrade).collect()
    }

    /// Number of entries (live or expired)
    pub fn len(&self) -> usize {
        self.shared.state.read().entries.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop expired entries; returns how many were removed
    pub fn purge_expired(&self) -> usize {
        let mut state = self.shared.state.write();
        let before = state.entries.len();
        state.entries.retain(|_, e| e.is_alive());
        state.remapped.retain(|_, e| e.is_alive());
        before - state.entries.len()
    }

    /// Unpublish every live resource (shutdown sweep); returns them
    pub(crate) fn unpublish_all(&self) -> Vec<Resource> {
        let live = self.snapshot();
        for resource in &live {
            if let Some(path) = resource.path() {
                self.retract(&path, resource);
            }
        }
        {
            let mut state = self.shared.state.write();
            state.entries.clear();
            state.remapped.clear();
        }
        live
    }

    /// Diagnostic report: one line per resource (unless `short`) and a
    /// count per class
    pub fn report(&self, short: bool) -> String {
        let live = self.snapshot();
        let mut by_class: BTreeMap<String, usize> = BTreeMap::new();
        let mut out = String::new();

        let mut sorted: Vec<(String, &Resource)> = live
            .iter()
            .map(|r| (r.path().map(|p| p.to_string()).unwrap_or_default(), r))
            .collect();
        sorted.sort_by(|a, b| a.0.cmp(&b.0));

        for (path, resource) in sorted {
            *by_class.entry(resource.class().to_string()).or_default() += 1;
            if !short {
                let _ = writeln!(
                    out,
                    "{} [{}] refs={}",
                    path,
                    resource.class(),
                    // minus the snapshot's own handle
                    resource.strong_count().saturating_sub(1)
                );
            }
        }
        for (class, count) in &by_class {
            let _ = writeln!(out, "{}: {}", class, count);
        }
        let _ = writeln!(out, "total: {}", live.len());
        out
    }

    /// Write the diagnostic report to `path` through `fs`, or to the log
    pub fn dump(&self, fs: &dyn FileSystem, path: Option<&ResourcePath>, short: bool) -> ResourceResult<()> {
        let report = self.report(short);
        match path {
            Some(path) => fs.write_all(path, report.as_bytes()),
            None => {
                for line in report.lines() {
                    log::info!("{}", line);
                }
                Ok(())
            }
        }
    }
}

impl Default for ResourceCache {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache").field("entries", &self.len()).finish()
    }
}
