//! Resource subsystem - the dispatcher façade
//!
//! A [`ResourceSubsystem`] owns the cache, the remap tables, the loading map,
//! the handler registries and the observers. It is a cheap clonable handle;
//! the engine root usually owns one and tests build their own.
//!
//! A read goes: canonicalize, cache lookup, loading-map slot, pick loader,
//! run the staged load, publish, release the slot, loaded callback.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};

use crate::cache::{CacheMode, ResourceCache};
use crate::class_db::ClassDb;
use crate::config::{validate_locale, ResourceConfig};
use crate::error::{ResourceError, ResourceResult};
use crate::interactive::InteractiveLoader;
use crate::io::FileSystem;
use crate::loader::FormatLoader;
use crate::loading_map::LoadingMap;
use crate::observers::Observers;
use crate::path::ResourcePath;
use crate::registry::{LoaderRegistry, SaverRegistry};
use crate::remap::{self, ImportTable, PathRemapper, RemapTables, TranslationTable};
use crate::resource::{Resource, ResourceUid};
use crate::saver::{FormatSaver, SaveFlags};

struct Shared {
    fs: Arc<dyn FileSystem>,
    config: RwLock<ResourceConfig>,
    class_db: Arc<ClassDb>,
    cache: ResourceCache,
    remapper: PathRemapper,
    loading: LoadingMap,
    loaders: LoaderRegistry,
    savers: SaverRegistry,
    observers: Observers,
    initialized: AtomicBool,
}

/// Builder for [`ResourceSubsystem`]
pub struct ResourceSubsystemBuilder {
    fs: Arc<dyn FileSystem>,
    config: ResourceConfig,
    observers: Observers,
    class_db: Option<Arc<ClassDb>>,
    remaps: RemapTables,
}

impl ResourceSubsystemBuilder {
    /// Use this configuration
    pub fn config(mut self, config: ResourceConfig) -> Self {
        self.config = config;
        self
    }

    /// Use these observers
    pub fn observers(mut self, observers: Observers) -> Self {
        self.observers = observers;
        self
    }

    /// Share an existing class registry
    pub fn class_db(mut self, class_db: Arc<ClassDb>) -> Self {
        self.class_db = Some(class_db);
        self
    }

    /// Start with these remap tables
    pub fn remaps(mut self, remaps: RemapTables) -> Self {
        self.remaps = remaps;
        self
    }

    /// Build the subsystem
    pub fn build(self) -> ResourceSubsystem {
        let mut remaps = self.remaps;
        for (alias, target) in &self.config.path_aliases {
            remaps.aliases.insert(alias.clone(), target.clone());
        }
        ResourceSubsystem {
            shared: Arc::new(Shared {
                fs: self.fs,
                config: RwLock::new(self.config),
                class_db: self.class_db.unwrap_or_default(),
                cache: ResourceCache::new(),
                remapper: PathRemapper::new(remaps),
                loading: LoadingMap::new(),
                loaders: LoaderRegistry::new(),
                savers: SaverRegistry::new(),
                observers: self.observers,
                initialized: AtomicBool::new(false),
            }),
        }
    }
}

/// The resource subsystem
#[derive(Clone)]
pub struct ResourceSubsystem {
    shared: Arc<Shared>,
}

impl ResourceSubsystem {
    /// Start building a subsystem on top of `fs`
    pub fn builder(fs: Arc<dyn FileSystem>) -> ResourceSubsystemBuilder {
        ResourceSubsystemBuilder {
            fs,
            config: ResourceConfig::default(),
            observers: Observers::new(),
            class_db: None,
            remaps: RemapTables::default(),
        }
    }

    /// Subsystem with default configuration
    pub fn new(fs: Arc<dyn FileSystem>) -> Self {
        Self::builder(fs).build()
    }

    // --- collaborators --------------------------------------------------

    /// Filesystem
    pub fn fs(&self) -> &dyn FileSystem {
        self.shared.fs.as_ref()
    }

    /// Class registry
    pub fn class_db(&self) -> &ClassDb {
        &self.shared.class_db
    }

    /// Resource cache
    pub fn cache(&self) -> &ResourceCache {
        &self.shared.cache
    }

    /// Observers
    pub fn observers(&self) -> &Observers {
        &self.shared.observers
    }

    /// Current configuration
    pub fn config(&self) -> RwLockReadGuard<'_, ResourceConfig> {
        self.shared.config.read()
    }

    /// Path remapper
    pub fn remapper(&self) -> &PathRemapper {
        &self.shared.remapper
    }

    /// Loading map
    pub fn loading_map(&self) -> &LoadingMap {
        &self.shared.loading
    }

    /// Check if two handles refer to the same subsystem
    pub fn ptr_eq(&self, other: &ResourceSubsystem) -> bool {
        Arc::ptr_eq(&self.shared, &other.shared)
    }

    // --- lifecycle ------------------------------------------------------

    /// Read the configured remap tables
    ///
    /// Table files that are configured but absent are skipped with a
    /// warning; malformed tables fail.
    pub fn initialize(&self) -> ResourceResult<()> {
        let aliases = self.config().path_aliases.clone();
        {
            let remapper = self.remapper();
            for (alias, target) in aliases {
                remapper.add_path_alias(alias, target);
            }
        }
        self.reload_import_remaps()?;
        let translation_file = self.config().translation_remap_file.clone();
        if let Some(table) = self.read_table(translation_file.as_ref(), remap::load_translation_table)? {
            self.remapper().set_translation_remaps(table);
        }
        self.shared.initialized.store(true, Ordering::Release);
        log::info!(
            "Resource subsystem initialized ({} loaders, {} savers)",
            self.shared.loaders.len(),
            self.shared.savers.len()
        );
        Ok(())
    }

    /// Tear down: unpublish every cached resource, drop remaps and handlers
    pub fn finalize(&self) {
        self.remapper().set_path_aliases(BTreeMap::new());
        self.remapper().set_import_remaps(ImportTable::new());
        self.remapper().clear_translation_remaps();

        let live = self.cache().unpublish_all();
        if !live.is_empty() {
            log::warn!("{} resource(s) still in use at shutdown", live.len());
        }
        drop(live);

        self.shared.loaders.clear();
        self.shared.savers.clear();
        self.shared.initialized.store(false, Ordering::Release);
        log::info!("Resource subsystem finalized");
    }

    /// Check if `initialize` ran (and `finalize` did not)
    pub fn is_initialized(&self) -> bool {
        self.shared.initialized.load(Ordering::Acquire)
    }

    fn read_table<T>(
        &self,
        file: Option<&ResourcePath>,
        read: impl FnOnce(&dyn FileSystem, &ResourcePath) -> ResourceResult<T>,
    ) -> ResourceResult<Option<T>> {
        let Some(file) = file else {
            return Ok(None);
        };
        if !self.fs().exists(file) {
            log::warn!("Remap table {} does not exist", file);
            return Ok(None);
        }
        read(self.fs(), file).map(Some)
    }

    // --- canonicalization -----------------------------------------------

    /// Active locale
    pub fn locale(&self) -> String {
        self.config().locale.clone()
    }

    /// Change the locale and re-target translation-remapped resources;
    /// returns how many moved
    pub fn set_locale(&self, locale: &str) -> ResourceResult<usize> {
        let locale = validate_locale(locale).map_err(|e| ResourceError::Invalid(e.to_string()))?;
        self.shared.config.write().locale = locale;
        Ok(self.retarget_translated())
    }

    /// Canonical path for `path` and whether a translation remap applied
    pub fn canonicalize(&self, path: &ResourcePath) -> (ResourcePath, bool) {
        let locale = self.locale();
        self.remapper().remap(path, Some(&locale))
    }

    /// Replace the translation table
    pub fn set_translation_remaps(&self, table: TranslationTable) {
        self.remapper().set_translation_remaps(table);
    }

    /// Replace the import table
    pub fn set_import_remaps(&self, table: ImportTable) {
        self.remapper().set_import_remaps(table);
    }

    /// Add a path alias
    pub fn add_path_alias(&self, alias: impl Into<ResourcePath>, target: impl Into<ResourcePath>) {
        self.remapper().add_path_alias(alias, target);
    }

    /// Re-read the translation table from the configured file, then move
    /// every live translation-remapped resource whose variant changed;
    /// returns how many moved
    pub fn reload_translation_remaps(&self) -> ResourceResult<usize> {
        let file = self.config().translation_remap_file.clone();
        if let Some(table) = self.read_table(file.as_ref(), remap::load_translation_table)? {
            self.remapper().set_translation_remaps(table);
        }
        Ok(self.retarget_translated())
    }

    /// Drop every translation remap
    pub fn clear_translation_remaps(&self) {
        self.remapper().clear_translation_remaps();
    }

    /// Rebuild the import table from the configured file and side-cars
    pub fn reload_import_remaps(&self) -> ResourceResult<()> {
        let (file, scan) = {
            let config = self.config();
            (config.import_remap_file.clone(), config.scan_import_sidecars)
        };
        let mut table = self
            .read_table(file.as_ref(), remap::load_import_table)?
            .unwrap_or_default();
        if scan {
            table.extend(remap::scan_import_sidecars(self.fs(), &ResourcePath::new("res://"))?);
        }
        self.remapper().set_import_remaps(table);
        Ok(())
    }

    fn retarget_translated(&self) -> usize {
        let tables = self.remapper().tables();
        let locale = self.locale();
        let mut moved = 0;
        for resource in self.cache().remapped_resources() {
            let Some(source) = resource.remap_source() else {
                continue;
            };
            let (target, _) = tables.remap(&source, Some(&locale));
            if resource.path().as_ref() == Some(&target) {
                continue;
            }
            match self.load_with_mode(target.clone(), None, CacheMode::Ignore) {
                Ok(fresh) => {
                    resource.copy_from(&fresh);
                    match resource.set_path(self.cache(), target.clone(), true) {
                        Ok(()) => {
                            log::debug!("Re-targeted translated {} to {}", source, target);
                            moved += 1;
                        }
                        Err(err) => log::warn!("Could not move {} to {}: {}", source, target, err),
                    }
                }
                Err(err) => log::warn!("Could not reload {} for {}: {}", target, source, err),
            }
        }
        moved
    }

    // --- loading --------------------------------------------------------

    /// Load `path`; with `no_cache` the cache is neither consulted nor
    /// updated
    pub fn load(&self, path: impl Into<ResourcePath>, type_hint: Option<&str>, no_cache: bool) -> ResourceResult<Resource> {
        let mode = if no_cache { CacheMode::Ignore } else { CacheMode::Reuse };
        self.load_with_mode(path, type_hint, mode)
    }

    /// Load `path` with an explicit cache policy
    pub fn load_with_mode(
        &self,
        path: impl Into<ResourcePath>,
        type_hint: Option<&str>,
        mode: CacheMode,
    ) -> ResourceResult<Resource> {
        self.load_interactive_with_mode(path, type_hint, mode)?.wait()
    }

    /// Begin a staged load of `path`
    pub fn load_interactive(&self, path: impl Into<ResourcePath>, type_hint: Option<&str>) -> ResourceResult<InteractiveLoader> {
        self.load_interactive_with_mode(path, type_hint, CacheMode::Reuse)
    }

    /// Begin a staged load with an explicit cache policy
    pub fn load_interactive_with_mode(
        &self,
        path: impl Into<ResourcePath>,
        type_hint: Option<&str>,
        mode: CacheMode,
    ) -> ResourceResult<InteractiveLoader> {
        let original = path.into();
        if original.is_empty() {
            return Err(self.fail(ResourceError::Invalid("cannot load an empty path".into())));
        }
        let type_hint = type_hint.filter(|h| !h.is_empty());
        let (canonical, translated) = self.canonicalize(&original);

        if mode == CacheMode::Reuse {
            if let Some(cached) = self.cache().lookup(&canonical) {
                return Ok(InteractiveLoader::finished(self.clone(), canonical, cached));
            }
        }

        let guard = self.shared.loading.enter(&canonical).map_err(|e| self.fail(e))?;

        // The previous holder of the slot may have published it
        if mode == CacheMode::Reuse {
            if let Some(cached) = self.cache().lookup(&canonical) {
                drop(guard);
                return Ok(InteractiveLoader::finished(self.clone(), canonical, cached));
            }
        }

        let loader = self
            .shared
            .loaders
            .pick_loader(&canonical, type_hint)
            .ok_or_else(|| self.fail(ResourceError::no_handler(canonical.as_str(), type_hint)))?;
        log::debug!("Loading {} with {}", canonical, loader.name());

        let body = loader
            .load_interactive(&canonical, &original, type_hint)
            .map_err(|e| self.fail(e))?;

        Ok(InteractiveLoader::running(
            self.clone(),
            canonical,
            original,
            type_hint.map(str::to_string),
            mode,
            translated,
            body,
            guard,
        ))
    }

    fn fail(&self, err: ResourceError) -> ResourceError {
        self.observers().load_error(&err);
        err
    }

    /// Re-run the loader on `resource`'s path and copy the stored properties
    /// of the fresh instance into it
    pub fn reload_from_file(&self, resource: &Resource) -> ResourceResult<()> {
        let path = resource
            .path()
            .ok_or_else(|| ResourceError::Invalid("cannot reload a resource without a path".into()))?;
        let fresh = self.load_with_mode(path.clone(), None, CacheMode::Ignore)?;
        resource.copy_from(&fresh);
        if self.config().timestamp_on_load {
            resource.set_last_modified(self.fs().modified_time(&path).ok());
        }
        log::debug!("Reloaded {}", path);
        Ok(())
    }

    /// Cache hit, or some loader claims the (extension, type) pair and the
    /// file exists
    pub fn exists(&self, path: impl Into<ResourcePath>, type_hint: Option<&str>) -> bool {
        let (canonical, _) = self.canonicalize(&path.into());
        if self.cache().contains(&canonical) {
            return true;
        }
        self.shared
            .loaders
            .loaders()
            .iter()
            .any(|loader| loader.recognize_path(&canonical, type_hint) && loader.exists(self.fs(), &canonical))
    }

    /// Paths the file at `path` references
    pub fn get_dependencies(&self, path: impl Into<ResourcePath>, add_types: bool) -> ResourceResult<Vec<String>> {
        let (canonical, _) = self.canonicalize(&path.into());
        self.shared
            .loaders
            .dependencies(self.fs(), &canonical, add_types)
            .unwrap_or_else(|| Err(ResourceError::no_handler(canonical.as_str(), None)))
    }

    /// Rewrite references inside the file at `path`
    pub fn rename_dependencies(&self, path: impl Into<ResourcePath>, renames: &BTreeMap<String, String>) -> ResourceResult<()> {
        let (canonical, _) = self.canonicalize(&path.into());
        self.shared
            .loaders
            .rename_dependencies(self.fs(), &canonical, renames)
            .unwrap_or_else(|| Err(ResourceError::no_handler(canonical.as_str(), None)))
    }

    /// Logical type of the file at `path`
    pub fn get_resource_type(&self, path: impl Into<ResourcePath>) -> Option<String> {
        let (canonical, _) = self.canonicalize(&path.into());
        self.shared.loaders.resource_type(self.fs(), &canonical)
    }

    /// Persistent UID stored in the file at `path`
    pub fn get_resource_uid(&self, path: impl Into<ResourcePath>) -> Option<ResourceUid> {
        let (canonical, _) = self.canonicalize(&path.into());
        self.shared.loaders.resource_uid(self.fs(), &canonical)
    }

    /// Extensions loadable as `type_name` (every extension for an empty name)
    pub fn get_recognized_extensions_for_type(&self, type_name: &str) -> BTreeSet<String> {
        self.shared.loaders.recognized_extensions_for_type(type_name)
    }

    /// Extensions `resource` can be saved as
    pub fn get_recognized_extensions_for_resource(&self, resource: &Resource) -> BTreeSet<String> {
        self.shared.savers.recognized_extensions(resource)
    }

    // --- saving ---------------------------------------------------------

    /// Save `resource` to `path` with the first saver that recognizes it and
    /// claims the extension
    pub fn save(&self, path: impl Into<ResourcePath>, resource: &Resource, flags: SaveFlags) -> ResourceResult<()> {
        let path = path.into();
        if path.is_empty() {
            return Err(ResourceError::Invalid("cannot save to an empty path".into()));
        }
        let saver = self
            .shared
            .savers
            .pick_saver(resource, &path)
            .ok_or_else(|| ResourceError::no_handler(path.as_str(), Some(resource.class())))?;

        if let Err(err) = saver.save(self.fs(), &path, resource, flags) {
            log::warn!("Failed to save {} with {}: {}", path, saver.name(), err);
            return Err(err);
        }

        if flags.contains(SaveFlags::CHANGE_PATH) {
            // The file is written either way; a live holder keeps the path
            if let Err(err) = resource.set_path(self.cache(), path.clone(), false) {
                log::warn!("Saved {} but kept the previous path of {:?}: {}", path, resource.id(), err);
            }
        }

        if self.config().timestamp_on_save {
            resource.set_last_modified(self.fs().modified_time(&path).ok());
        }
        if path.is_project_path() {
            self.observers().resource_saved(resource, &path);
        }
        log::debug!("Saved {} with {}", path, saver.name());
        Ok(())
    }

    // --- handlers and callbacks -----------------------------------------

    /// Register a loader
    pub fn add_loader(&self, loader: Arc<dyn FormatLoader>, at_front: bool) {
        self.shared.loaders.add(loader, at_front);
    }

    /// Unregister a loader
    pub fn remove_loader(&self, loader: &Arc<dyn FormatLoader>) -> bool {
        self.shared.loaders.remove(loader)
    }

    /// Register a saver
    pub fn add_saver(&self, saver: Arc<dyn FormatSaver>, at_front: bool) {
        self.shared.savers.add(saver, at_front);
    }

    /// Unregister a saver
    pub fn remove_saver(&self, saver: &Arc<dyn FormatSaver>) -> bool {
        self.shared.savers.remove(saver)
    }

    /// Loader registry
    pub fn loaders(&self) -> &LoaderRegistry {
        &self.shared.loaders
    }

    /// Saver registry
    pub fn savers(&self) -> &SaverRegistry {
        &self.shared.savers
    }

    /// Called with the message of every failed load
    pub fn set_error_callback(&self, f: impl Fn(&str) + Send + Sync + 'static) {
        self.observers().set_load_error(f);
    }

    /// Called when a loader reports a missing dependency
    pub fn set_dependency_error_callback(&self, f: impl Fn(&ResourcePath, &str, &str) + Send + Sync + 'static) {
        self.observers().set_dependency_error(f);
    }

    /// Called after every successful load
    pub fn set_loaded_callback(&self, f: impl Fn(&Resource, Option<ResourceUid>) + Send + Sync + 'static) {
        self.observers().set_loaded(f);
    }

    /// Called after a resource is saved under `res://`
    pub fn set_saved_callback(&self, f: impl Fn(&Resource, &ResourcePath) + Send + Sync + 'static) {
        self.observers().set_saved(f);
    }

    /// Make missing dependencies fatal (or not)
    pub fn set_abort_on_missing_resource(&self, abort: bool) {
        self.shared.config.write().abort_on_missing_resource = abort;
    }

    // --- diagnostics ----------------------------------------------------

    /// Write the cache report to `path`, or to the log
    pub fn dump_cache(&self, path: Option<&str>, short: bool) -> ResourceResult<()> {
        let path = path.map(ResourcePath::new);
        self.cache().dump(self.fs(), path.as_ref(), short)
    }
}

impl std::fmt::Debug for ResourceSubsystem {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceSubsystem")
            .field("cache", &self.shared.cache)
            .field("loaders", &self.shared.loaders.len())
            .field("savers", &self.shared.savers.len())
            .field("initialized", &self.is_initialized())
            .finish()
    }
}
