//! Loading map - recursion guard and per-path load serialization
//!
//! Every load holds a slot for its canonical path for as long as the loader
//! body runs. A thread asking for a path it already holds gets
//! `CyclicDependency`. A thread asking for a path another thread holds waits
//! until that slot is released, unless waiting would close a cycle of threads
//! waiting on each other, which is reported as `CyclicDependency` as well.

use std::collections::HashMap;
use std::sync::Arc;
use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

use crate::error::{ResourceError, ResourceResult};
use crate::path::ResourcePath;

#[derive(Default)]
struct LoadingState {
    /// Depth per (path, thread)
    depth: HashMap<(ResourcePath, ThreadId), u32>,
    /// Thread currently running the loader body for a path
    owners: HashMap<ResourcePath, ThreadId>,
    /// Path each blocked thread is waiting for
    waiting: HashMap<ThreadId, ResourcePath>,
}

impl LoadingState {
    /// Would `me` waiting on `owner` close a wait-for cycle?
    fn closes_cycle(&self, me: ThreadId, owner: ThreadId) -> bool {
        let mut current = owner;
        for _ in 0..=self.waiting.len() {
            let Some(path) = self.waiting.get(&current) else {
                return false;
            };
            let Some(next) = self.owners.get(path) else {
                return false;
            };
            if *next == me {
                return true;
            }
            current = *next;
        }
        false
    }
}

struct LoadingShared {
    state: Mutex<LoadingState>,
    released: Condvar,
}

/// Shared map of in-flight loads
#[derive(Clone)]
pub struct LoadingMap {
    shared: Arc<LoadingShared>,
}

impl LoadingMap {
    /// Create an empty map
    pub fn new() -> Self {
        Self {
            shared: Arc::new(LoadingShared {
                state: Mutex::new(LoadingState::default()),
                released: Condvar::new(),
            }),
        }
    }

    /// Claim `path` for the current thread, waiting while another thread
    /// holds it
    ///
    /// Returns once the slot is free. Callers should re-check the cache after
    /// this returns, since the previous holder may have published the result.
    pub fn enter(&self, path: &ResourcePath) -> ResourceResult<LoadingGuard> {
        let me = thread::current().id();
        let mut state = self.shared.state.lock();
        loop {
            if state.depth.get(&(path.clone(), me)).copied().unwrap_or(0) > 0 {
                log::warn!("Cyclic load of {} on {:?}", path, me);
                return Err(ResourceError::CyclicDependency(path.to_string()));
            }

            let owner = state.owners.get(path).copied();
            match owner {
                None => {
                    state.owners.insert(path.clone(), me);
                    *state.depth.entry((path.clone(), me)).or_insert(0) += 1;
                    return Ok(LoadingGuard {
                        map: self.clone(),
                        path: path.clone(),
                        thread: me,
                    });
                }
                Some(owner) => {
                    if owner == me || state.closes_cycle(me, owner) {
                        log::warn!("Load of {} would wait on itself through {:?}", path, owner);
                        return Err(ResourceError::CyclicDependency(path.to_string()));
                    }
                    log::debug!("Waiting for {:?} to finish loading {}", owner, path);
                    state.waiting.insert(me, path.clone());
                    self.shared.released.wait(&mut state);
                    state.waiting.remove(&me);
                }
            }
        }
    }

    fn leave(&self, path: &ResourcePath, thread: ThreadId) {
        let mut state = self.shared.state.lock();
        let key = (path.clone(), thread);
        let remaining = match state.depth.get_mut(&key) {
            Some(depth) => {
                *depth = depth.saturating_sub(1);
                *depth
            }
            None => 0,
        };
        if remaining == 0 {
            state.depth.remove(&key);
            if state.owners.get(path) == Some(&thread) {
                state.owners.remove(path);
            }
        }
        drop(state);
        self.shared.released.notify_all();
    }

    /// Check if any thread is loading `path`
    pub fn is_loading(&self, path: &ResourcePath) -> bool {
        self.shared.state.lock().owners.contains_key(path)
    }

    /// Number of in-flight loads
    pub fn active_count(&self) -> usize {
        self.shared.state.lock().owners.len()
    }
}

impl Default for LoadingMap {
    fn default() -> Self {
        Self::new()
    }
}

/// Slot held while a loader body runs; released on drop
pub struct LoadingGuard {
    map: LoadingMap,
    path: ResourcePath,
    thread: ThreadId,
}

impl LoadingGuard {
    /// Path held by this guard
    pub fn path(&self) -> &ResourcePath {
        &self.path
    }

    /// Move the slot to the current thread
    ///
    /// A staged load may be polled on a thread other than the one that
    /// started it; nested loads of the same path must see the poller as the
    /// holder.
    pub fn rebind(&mut self) {
        let me = thread::current().id();
        if me == self.thread {
            return;
        }
        let mut state = self.map.shared.state.lock();
        let moved = state.depth.remove(&(self.path.clone(), self.thread)).unwrap_or(0);
        *state.depth.entry((self.path.clone(), me)).or_insert(0) += moved.max(1);
        if state.owners.get(&self.path) == Some(&self.thread) {
            state.owners.insert(self.path.clone(), me);
        }
        log::trace!("Slot for {} moved from {:?} to {:?}", self.path, self.thread, me);
        self.thread = me;
    }
}

impl Drop for LoadingGuard {
    fn drop(&mut self) {
        self.map.leave(&self.path, self.thread);
    }
}

impl std::fmt::Debug for LoadingGuard {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoadingGuard")
            .field("path", &self.path)
            .field("thread", &self.thread)
            .finish()
    }
}
