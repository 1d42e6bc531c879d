//! Error routing and load/save notifications
//!
//! One [`Observers`] value is injected into each subsystem. Callbacks are
//! cloned out of their slot before being invoked, so a callback may replace
//! callbacks or call back into the subsystem.

use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ResourceError;
use crate::path::ResourcePath;
use crate::resource::{Resource, ResourceUid};

/// Called with the message of every failed load
pub type LoadErrorCallback = Arc<dyn Fn(&str) + Send + Sync>;

/// Called with (resource path, missing dependency, expected type)
pub type DependencyErrorCallback = Arc<dyn Fn(&ResourcePath, &str, &str) + Send + Sync>;

/// Called after every successful load
pub type LoadedCallback = Arc<dyn Fn(&Resource, Option<ResourceUid>) + Send + Sync>;

/// Called after a resource is saved under `res://`
pub type SavedCallback = Arc<dyn Fn(&Resource, &ResourcePath) + Send + Sync>;

/// Pluggable callbacks
#[derive(Default)]
pub struct Observers {
    load_error: RwLock<Option<LoadErrorCallback>>,
    dependency_error: RwLock<Option<DependencyErrorCallback>>,
    loaded: RwLock<Option<LoadedCallback>>,
    saved: RwLock<Option<SavedCallback>>,
}

impl Observers {
    /// No callbacks installed
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder: set the load-error callback
    pub fn with_load_error(self, f: impl Fn(&str) + Send + Sync + 'static) -> Self {
        self.set_load_error(f);
        self
    }

    /// Builder: set the dependency-error callback
    pub fn with_dependency_error(self, f: impl Fn(&ResourcePath, &str, &str) + Send + Sync + 'static) -> Self {
        self.set_dependency_error(f);
        self
    }

    /// Builder: set the loaded callback
    pub fn with_loaded(self, f: impl Fn(&Resource, Option<ResourceUid>) + Send + Sync + 'static) -> Self {
        self.set_loaded(f);
        self
    }

    /// Builder: set the saved callback
    pub fn with_saved(self, f: impl Fn(&Resource, &ResourcePath) + Send + Sync + 'static) -> Self {
        self.set_saved(f);
        self
    }

    /// Replace the load-error callback
    pub fn set_load_error(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        *self.load_error.write() = Some(Arc::new(f));
    }

    /// Replace the dependency-error callback
    pub fn set_dependency_error(&self, f: impl Fn(&ResourcePath, &str, &str) + Send + Sync + 'static) {
        *self.dependency_error.write() = Some(Arc::new(f));
    }

    /// Replace the loaded callback
    pub fn set_loaded(&self, f: impl Fn(&Resource, Option<ResourceUid>) + Send + Sync + 'static) {
        *self.loaded.write() = Some(Arc::new(f));
    }

    /// Replace the saved callback
    pub fn set_saved(&self, f: impl Fn(&Resource, &ResourcePath) + Send + Sync + 'static) {
        *self.saved.write() = Some(Arc::new(f));
    }

    /// Remove every callback
    pub fn clear(&self) {
        *self.load_error.write() = None;
        *self.dependency_error.write() = None;
        *self.loaded.write() = None;
        *self.saved.write() = None;
    }

    pub(crate) fn load_error(&self, err: &ResourceError) {
        log::warn!("{}", err);
        let callback = self.load_error.read().clone();
        if let Some(callback) = callback {
            callback(&err.to_string());
        }
    }

    pub(crate) fn dependency_error(&self, path: &ResourcePath, dependency: &str, expected_type: &str) {
        log::warn!(
            "{} references missing {} (expected type {})",
            path,
            dependency,
            if expected_type.is_empty() { "any" } else { expected_type }
        );
        let callback = self.dependency_error.read().clone();
        if let Some(callback) = callback {
            callback(path, dependency, expected_type);
        }
    }

    pub(crate) fn resource_loaded(&self, resource: &Resource, uid: Option<ResourceUid>) {
        let callback = self.loaded.read().clone();
        if let Some(callback) = callback {
            callback(resource, uid);
        }
    }

    pub(crate) fn resource_saved(&self, resource: &Resource, path: &ResourcePath) {
        let callback = self.saved.read().clone();
        if let Some(callback) = callback {
            callback(resource, path);
        }
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observers")
            .field("load_error", &self.load_error.read().is_some())
            .field("dependency_error", &self.dependency_error.read().is_some())
            .field("loaded", &self.loaded.read().is_some())
            .field("saved", &self.saved.read().is_some())
            .finish()
    }
}
