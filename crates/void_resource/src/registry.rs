//! Handler registries
//!
//! Ordered lists of loaders and savers. Order is the tie-break for files more
//! than one handler claims: handlers added `at_front` are consulted first.
//! Queries clone the `Arc` handlers out of the lock before calling into them.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::error::ResourceResult;
use crate::io::FileSystem;
use crate::loader::FormatLoader;
use crate::path::ResourcePath;
use crate::resource::{Resource, ResourceUid};
use crate::saver::FormatSaver;

/// Ordered list of shared handlers
pub struct HandlerList<T: ?Sized> {
    handlers: RwLock<Vec<Arc<T>>>,
}

impl<T: ?Sized> HandlerList<T> {
    /// Create an empty list
    pub fn new() -> Self {
        Self {
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Add a handler at the back, or at the front
    pub fn add(&self, handler: Arc<T>, at_front: bool) {
        let mut handlers = self.handlers.write();
        if at_front {
            handlers.insert(0, handler);
        } else {
            handlers.push(handler);
        }
    }

    /// Remove a handler by identity
    pub fn remove(&self, handler: &Arc<T>) -> bool {
        let mut handlers = self.handlers.write();
        let before = handlers.len();
        handlers.retain(|h| !same_handler(h, handler));
        handlers.len() != before
    }

    /// Check if a handler is registered
    pub fn contains(&self, handler: &Arc<T>) -> bool {
        self.handlers.read().iter().any(|h| same_handler(h, handler))
    }

    /// Handlers in consultation order
    pub fn snapshot(&self) -> Vec<Arc<T>> {
        self.handlers.read().clone()
    }

    /// Remove every handler
    pub fn clear(&self) {
        self.handlers.write().clear();
    }

    /// Number of handlers
    pub fn len(&self) -> usize {
        self.handlers.read().len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.handlers.read().is_empty()
    }
}

impl<T: ?Sized> Default for HandlerList<T> {
    fn default() -> Self {
        Self::new()
    }
}

/// Pointer identity, ignoring vtables
fn same_handler<T: ?Sized>(a: &Arc<T>, b: &Arc<T>) -> bool {
    Arc::as_ptr(a) as *const () == Arc::as_ptr(b) as *const ()
}

/// Registry of format loaders
#[derive(Default)]
pub struct LoaderRegistry {
    list: HandlerList<dyn FormatLoader>,
}

impl LoaderRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a loader
    pub fn add(&self, loader: Arc<dyn FormatLoader>, at_front: bool) {
        log::debug!("Registered loader {}", loader.name());
        self.list.add(loader, at_front);
    }

    /// Unregister a loader
    pub fn remove(&self, loader: &Arc<dyn FormatLoader>) -> bool {
        self.list.remove(loader)
    }

    /// Loaders in consultation order
    pub fn loaders(&self) -> Vec<Arc<dyn FormatLoader>> {
        self.list.snapshot()
    }

    /// Remove every loader
    pub fn clear(&self) {
        self.list.clear();
    }

    /// Number of loaders
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// First loader claiming the extension and accepting the hint
    pub fn pick_loader(&self, path: &ResourcePath, type_hint: Option<&str>) -> Option<Arc<dyn FormatLoader>> {
        self.list
            .snapshot()
            .into_iter()
            .find(|loader| loader.recognize_path(path, type_hint))
    }

    /// Union of extensions of every loader handling `type_name`
    pub fn recognized_extensions_for_type(&self, type_name: &str) -> BTreeSet<String> {
        self.list
            .snapshot()
            .iter()
            .filter(|loader| type_name.is_empty() || loader.handles_type(type_name))
            .flat_map(|loader| loader.recognized_extensions())
            .map(|ext| ext.to_lowercase())
            .collect()
    }

    /// Every extension any loader reads
    pub fn recognized_extensions(&self) -> BTreeSet<String> {
        self.recognized_extensions_for_type("")
    }

    /// First non-empty type answer
    pub fn resource_type(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        self.list
            .snapshot()
            .iter()
            .filter_map(|loader| loader.resource_type(fs, path))
            .find(|t| !t.is_empty())
    }

    /// First UID answer among the loaders claiming `path`
    pub fn resource_uid(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<ResourceUid> {
        self.list
            .snapshot()
            .iter()
            .filter(|loader| loader.recognize_path(path, None))
            .find_map(|loader| loader.resource_uid(fs, path))
    }

    /// Dependencies of `path` according to the loader that claims it
    pub fn dependencies(&self, fs: &dyn FileSystem, path: &ResourcePath, add_types: bool) -> Option<ResourceResult<Vec<String>>> {
        self.pick_loader(path, None)
            .map(|loader| loader.dependencies(fs, path, add_types))
    }

    /// Rewrite references through the loader that claims `path`
    pub fn rename_dependencies(
        &self,
        fs: &dyn FileSystem,
        path: &ResourcePath,
        renames: &BTreeMap<String, String>,
    ) -> Option<ResourceResult<()>> {
        self.pick_loader(path, None)
            .map(|loader| loader.rename_dependencies(fs, path, renames))
    }
}

/// Registry of format savers
#[derive(Default)]
pub struct SaverRegistry {
    list: HandlerList<dyn FormatSaver>,
}

impl SaverRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a saver
    pub fn add(&self, saver: Arc<dyn FormatSaver>, at_front: bool) {
        log::debug!("Registered saver {}", saver.name());
        self.list.add(saver, at_front);
    }

    /// Unregister a saver
    pub fn remove(&self, saver: &Arc<dyn FormatSaver>) -> bool {
        self.list.remove(saver)
    }

    /// Savers in consultation order
    pub fn savers(&self) -> Vec<Arc<dyn FormatSaver>> {
        self.list.snapshot()
    }

    /// Remove every saver
    pub fn clear(&self) {
        self.list.clear();
    }

    /// Number of savers
    pub fn len(&self) -> usize {
        self.list.len()
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.list.is_empty()
    }

    /// First saver that recognizes `resource` and claims the extension
    pub fn pick_saver(&self, resource: &Resource, path: &ResourcePath) -> Option<Arc<dyn FormatSaver>> {
        self.list
            .snapshot()
            .into_iter()
            .find(|saver| saver.recognize(resource) && saver.recognize_path(resource, path))
    }

    /// Extensions `resource` can be saved as
    pub fn recognized_extensions(&self, resource: &Resource) -> BTreeSet<String> {
        self.list
            .snapshot()
            .iter()
            .filter(|saver| saver.recognize(resource))
            .flat_map(|saver| saver.recognized_extensions(resource))
            .map(|ext| ext.to_lowercase())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ResourceError;
    use crate::io::MemoryFileSystem;
    use crate::loader::{single_stage, InteractiveLoad};
    use crate::saver::SaveFlags;

    struct TypedLoader {
        name: &'static str,
        ext: &'static str,
        ty: &'static str,
    }

    impl FormatLoader for TypedLoader {
        fn name(&self) -> &str {
            self.name
        }

        fn recognized_extensions(&self) -> Vec<String> {
            vec![self.ext.to_string()]
        }

        fn handles_type(&self, type_name: &str) -> bool {
            type_name == self.ty
        }

        fn resource_type(&self, _fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
            (path.extension().as_deref() == Some(self.ext)).then(|| self.ty.to_string())
        }

        fn load_interactive(
            &self,
            _path: &ResourcePath,
            _original_path: &ResourcePath,
            _type_hint: Option<&str>,
        ) -> ResourceResult<Box<dyn InteractiveLoad>> {
            let ty = self.ty;
            Ok(single_stage(move |_ctx| Ok(Resource::new(ty))))
        }
    }

    fn loader(name: &'static str, ext: &'static str, ty: &'static str) -> Arc<dyn FormatLoader> {
        Arc::new(TypedLoader { name, ext, ty })
    }

    #[test]
    fn test_front_insertion_wins() {
        let registry = LoaderRegistry::new();
        let a = loader("A", "x", "T1");
        let b = loader("B", "x", "T2");
        registry.add(a.clone(), false);
        registry.add(b.clone(), true);

        let fs = MemoryFileSystem::new();
        let path = ResourcePath::new("f.x");
        assert_eq!(registry.resource_type(&fs, &path).as_deref(), Some("T2"));
        assert_eq!(registry.pick_loader(&path, None).unwrap().name(), "B");

        assert!(registry.remove(&b));
        assert_eq!(registry.resource_type(&fs, &path).as_deref(), Some("T1"));
        assert!(!registry.remove(&b));
    }

    #[test]
    fn test_pick_loader_respects_hint() {
        let registry = LoaderRegistry::new();
        registry.add(loader("A", "x", "T1"), false);
        registry.add(loader("B", "x", "T2"), false);

        let path = ResourcePath::new("res://f.x");
        assert_eq!(registry.pick_loader(&path, Some("T2")).unwrap().name(), "B");
        assert_eq!(registry.pick_loader(&path, Some("T1")).unwrap().name(), "A");
        assert!(registry.pick_loader(&path, Some("T3")).is_none());
        assert!(registry.pick_loader(&ResourcePath::new("res://f.y"), None).is_none());
    }

    #[test]
    fn test_pick_loader_is_stable() {
        let registry = LoaderRegistry::new();
        registry.add(loader("A", "x", "T"), false);
        registry.add(loader("B", "x", "T"), false);
        let path = ResourcePath::new("res://f.x");
        for _ in 0..10 {
            assert_eq!(registry.pick_loader(&path, Some("T")).unwrap().name(), "A");
        }
    }

    #[test]
    fn test_extensions_for_type() {
        let registry = LoaderRegistry::new();
        registry.add(loader("A", "png", "Texture"), false);
        registry.add(loader("B", "JPG", "Texture"), false);
        registry.add(loader("C", "ogg", "Audio"), false);

        let exts = registry.recognized_extensions_for_type("Texture");
        assert_eq!(exts.into_iter().collect::<Vec<_>>(), vec!["jpg".to_string(), "png".to_string()]);
        assert_eq!(registry.recognized_extensions().len(), 3);
    }

    struct NamedSaver;

    impl FormatSaver for NamedSaver {
        fn name(&self) -> &str {
            "NamedSaver"
        }

        fn recognize(&self, resource: &Resource) -> bool {
            resource.class() == "Note"
        }

        fn recognized_extensions(&self, _resource: &Resource) -> Vec<String> {
            vec!["note".into()]
        }

        fn save(&self, _fs: &dyn FileSystem, _path: &ResourcePath, _resource: &Resource, _flags: SaveFlags) -> ResourceResult<()> {
            Err(ResourceError::Invalid("not used".into()))
        }
    }

    #[test]
    fn test_pick_saver() {
        let registry = SaverRegistry::new();
        let saver: Arc<dyn FormatSaver> = Arc::new(NamedSaver);
        registry.add(saver.clone(), false);

        let note = Resource::new("Note");
        let other = Resource::new("Other");
        assert!(registry.pick_saver(&note, &ResourcePath::new("res://a.note")).is_some());
        assert!(registry.pick_saver(&note, &ResourcePath::new("res://a.txt")).is_none());
        assert!(registry.pick_saver(&other, &ResourcePath::new("res://a.note")).is_none());
        assert_eq!(registry.recognized_extensions(&note).len(), 1);
        assert!(registry.remove(&saver));
        assert!(registry.is_empty());
    }
}
