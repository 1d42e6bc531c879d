//! Format loaders
//!
//! A [`FormatLoader`] claims file extensions and logical type names, and
//! turns a path into a staged [`InteractiveLoad`]. Loaders never publish the
//! resource they produce; the dispatcher does that once the last stage
//! completes.

use std::collections::BTreeMap;

use crate::cache::{CacheMode, ResourceCache};
use crate::class_db::ClassDb;
use crate::error::{ResourceError, ResourceResult};
use crate::io::{FileSystem, ReadSeek};
use crate::path::ResourcePath;
use crate::resource::{Resource, ResourceUid};
use crate::subsystem::ResourceSubsystem;

/// Outcome of one [`InteractiveLoad::poll`]
#[derive(Debug)]
pub enum LoadStep {
    /// More stages remain
    Pending,
    /// The resource is complete
    Ready(Resource),
}

/// Handler-side state machine of a staged load
///
/// Each `poll` performs a bounded amount of work. `stage` is read before
/// every poll and reported together with `stage_count` as progress; the count
/// may grow as the loader discovers more work.
pub trait InteractiveLoad: Send {
    /// Advance one stage
    fn poll(&mut self, ctx: &mut LoadContext<'_>) -> ResourceResult<LoadStep>;

    /// Current stage
    fn stage(&self) -> usize;

    /// Total number of stages known so far
    fn stage_count(&self) -> usize;
}

/// Adapter running a closure as a single-stage load
pub struct SingleStage<F> {
    body: Option<F>,
}

impl<F> InteractiveLoad for SingleStage<F>
where
    F: FnOnce(&mut LoadContext<'_>) -> ResourceResult<Resource> + Send,
{
    fn poll(&mut self, ctx: &mut LoadContext<'_>) -> ResourceResult<LoadStep> {
        let body = self
            .body
            .take()
            .ok_or_else(|| ResourceError::Invalid("single-stage load polled after completion".into()))?;
        body(ctx).map(LoadStep::Ready)
    }

    fn stage(&self) -> usize {
        if self.body.is_some() {
            0
        } else {
            1
        }
    }

    fn stage_count(&self) -> usize {
        1
    }
}

/// Wrap a closure as a one-stage interactive load
pub fn single_stage<F>(body: F) -> Box<dyn InteractiveLoad>
where
    F: FnOnce(&mut LoadContext<'_>) -> ResourceResult<Resource> + Send + 'static,
{
    Box::new(SingleStage { body: Some(body) })
}

/// Trait for format loaders
pub trait FormatLoader: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// File extensions this loader reads (lowercase, without the dot)
    fn recognized_extensions(&self) -> Vec<String>;

    /// Check if this loader produces the logical type `type_name`
    fn handles_type(&self, type_name: &str) -> bool;

    /// Logical type of the file at `path`, if this loader knows it
    fn resource_type(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<String>;

    /// Begin a staged load of `path` (already canonical); `original_path`
    /// is what the caller asked for
    fn load_interactive(
        &self,
        path: &ResourcePath,
        original_path: &ResourcePath,
        type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>>;

    /// Does this loader claim the (extension, type hint) pair?
    fn recognize_path(&self, path: &ResourcePath, type_hint: Option<&str>) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        let claims_ext = self
            .recognized_extensions()
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&ext));
        claims_ext && type_hint.map_or(true, |hint| hint.is_empty() || self.handles_type(hint))
    }

    /// Check that the file behind `path` exists
    fn exists(&self, fs: &dyn FileSystem, path: &ResourcePath) -> bool {
        fs.exists(path)
    }

    /// Paths the file at `path` references; with `add_types` each entry is
    /// `path::Type`
    fn dependencies(&self, _fs: &dyn FileSystem, _path: &ResourcePath, _add_types: bool) -> ResourceResult<Vec<String>> {
        Ok(Vec::new())
    }

    /// Rewrite references inside the file at `path` (old path to new path)
    fn rename_dependencies(
        &self,
        _fs: &dyn FileSystem,
        path: &ResourcePath,
        _renames: &BTreeMap<String, String>,
    ) -> ResourceResult<()> {
        Err(ResourceError::Invalid(format!(
            "{} cannot rewrite dependencies of {}",
            self.name(),
            path
        )))
    }

    /// Persistent UID stored in the file, if the format has one
    fn resource_uid(&self, _fs: &dyn FileSystem, _path: &ResourcePath) -> Option<ResourceUid> {
        None
    }
}

/// What a loader sees while its stages run
pub struct LoadContext<'a> {
    subsystem: &'a ResourceSubsystem,
    path: &'a ResourcePath,
    original_path: &'a ResourcePath,
    type_hint: Option<&'a str>,
    cache_mode: CacheMode,
}

impl<'a> LoadContext<'a> {
    pub(crate) fn new(
        subsystem: &'a ResourceSubsystem,
        path: &'a ResourcePath,
        original_path: &'a ResourcePath,
        type_hint: Option<&'a str>,
        cache_mode: CacheMode,
    ) -> Self {
        Self {
            subsystem,
            path,
            original_path,
            type_hint,
            cache_mode,
        }
    }

    /// Canonical path being loaded
    pub fn path(&self) -> &ResourcePath {
        self.path
    }

    /// Path as requested, before remapping
    pub fn original_path(&self) -> &ResourcePath {
        self.original_path
    }

    /// Type hint given by the caller
    pub fn type_hint(&self) -> Option<&str> {
        self.type_hint
    }

    /// Cache policy of this load
    pub fn cache_mode(&self) -> CacheMode {
        self.cache_mode
    }

    /// Filesystem
    pub fn fs(&self) -> &dyn FileSystem {
        self.subsystem.fs()
    }

    /// Class registry
    pub fn class_db(&self) -> &ClassDb {
        self.subsystem.class_db()
    }

    /// Resource cache
    pub fn cache(&self) -> &ResourceCache {
        self.subsystem.cache()
    }

    /// Open the file being loaded
    pub fn open(&self) -> ResourceResult<Box<dyn ReadSeek>> {
        self.fs().open_read(self.path)
    }

    /// Read the whole file being loaded
    pub fn read_all(&self) -> ResourceResult<Vec<u8>> {
        self.fs().read_all(self.path)
    }

    /// Read the file being loaded as UTF-8
    pub fn read_string(&self) -> ResourceResult<String> {
        self.fs().read_string(self.path)
    }

    /// Instantiate a registered class
    pub fn instantiate(&self, class: &str) -> ResourceResult<Resource> {
        self.class_db()
            .instantiate(class)
            .ok_or_else(|| ResourceError::parse(self.path.as_str(), format!("Unknown resource class '{}'", class)))
    }

    /// Load another resource, sharing the cache
    pub fn load(&self, path: impl Into<ResourcePath>, type_hint: Option<&str>) -> ResourceResult<Resource> {
        self.subsystem.load_with_mode(path, type_hint, CacheMode::Reuse)
    }

    /// Load an external dependency
    ///
    /// A failure is routed to the dependency-error observer. It fails this
    /// load when missing resources are fatal; otherwise `None` is returned and
    /// the loader carries on without the dependency.
    pub fn load_dependency(&self, path: impl Into<ResourcePath>, expected_type: &str) -> ResourceResult<Option<Resource>> {
        let path = path.into();
        let hint = if expected_type.is_empty() { None } else { Some(expected_type) };
        match self.load(path.clone(), hint) {
            Ok(resource) => Ok(Some(resource)),
            Err(err) => {
                log::warn!("Dependency {} of {} failed: {}", path, self.path, err);
                self.report_missing_dependency(path.as_str(), expected_type)?;
                Ok(None)
            }
        }
    }

    /// Report a dependency that could not be resolved
    pub fn report_missing_dependency(&self, dependency: &str, expected_type: &str) -> ResourceResult<()> {
        self.subsystem
            .observers()
            .dependency_error(self.path, dependency, expected_type);
        if self.subsystem.config().abort_on_missing_resource {
            log::error!("Aborting load of {}: missing dependency {}", self.path, dependency);
            return Err(ResourceError::MissingDependency {
                path: self.path.to_string(),
                dependency: dependency.to_string(),
                expected_type: expected_type.to_string(),
            });
        }
        Ok(())
    }

    /// Path a sub-resource with `local_id` is cached under
    pub fn subresource_path(&self, local_id: &str) -> ResourcePath {
        ResourcePath::new(format!("{}::{}", self.path, local_id))
    }

    /// Cached sub-resource to reuse instead of building a new one
    pub fn cached_subresource(&self, local_id: &str) -> Option<Resource> {
        match self.cache_mode {
            CacheMode::Reuse => self.cache().lookup(&self.subresource_path(local_id)),
            CacheMode::Ignore | CacheMode::Replace => None,
        }
    }

    /// Publish a finished sub-resource under [`Self::subresource_path`]
    ///
    /// Sub-resources stay cached even if the enclosing load later fails.
    pub fn publish_subresource(&self, resource: &Resource, local_id: &str) {
        let path = self.subresource_path(local_id);
        let result = match self.cache_mode {
            CacheMode::Ignore => return,
            CacheMode::Reuse => resource.set_path(self.cache(), path.clone(), false),
            CacheMode::Replace => resource.set_path(self.cache(), path.clone(), true),
        };
        if let Err(err) = result {
            log::debug!("Sub-resource {} not published: {}", path, err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct ExtOnly;

    impl FormatLoader for ExtOnly {
        fn name(&self) -> &str {
            "ExtOnly"
        }

        fn recognized_extensions(&self) -> Vec<String> {
            vec!["data".into()]
        }

        fn handles_type(&self, type_name: &str) -> bool {
            type_name == "Data"
        }

        fn resource_type(&self, _fs: &dyn FileSystem, _path: &ResourcePath) -> Option<String> {
            Some("Data".into())
        }

        fn load_interactive(
            &self,
            _path: &ResourcePath,
            _original_path: &ResourcePath,
            _type_hint: Option<&str>,
        ) -> ResourceResult<Box<dyn InteractiveLoad>> {
            Ok(single_stage(|_ctx| Ok(Resource::new("Data"))))
        }
    }

    #[test]
    fn test_recognize_path() {
        let loader = ExtOnly;
        assert!(loader.recognize_path(&ResourcePath::new("res://a.DATA"), None));
        assert!(loader.recognize_path(&ResourcePath::new("res://a.data"), Some("Data")));
        assert!(loader.recognize_path(&ResourcePath::new("res://a.data"), Some("")));
        assert!(!loader.recognize_path(&ResourcePath::new("res://a.data"), Some("Texture")));
        assert!(!loader.recognize_path(&ResourcePath::new("res://a.png"), None));
        assert!(!loader.recognize_path(&ResourcePath::new("res://noext"), None));
    }

    #[test]
    fn test_single_stage_progress() {
        let stage = SingleStage {
            body: Some(|_ctx: &mut LoadContext<'_>| Ok::<_, ResourceError>(Resource::new("Data"))),
        };
        assert_eq!(stage.stage(), 0);
        assert_eq!(stage.stage_count(), 1);
    }
}
