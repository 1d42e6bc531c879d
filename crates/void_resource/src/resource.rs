//! Resource - the shared, reference-counted asset object
//!
//! A [`Resource`] is a cheap, clonable strong handle. The last strong handle
//! dropping destroys the resource, and destruction retracts its cache entry
//! before anything else can observe the stale slot.
//!
//! Identity (path, name, scene scope, owners) lives behind a mutex; the
//! serializable state is a property map behind a reader-writer lock.

use core::sync::atomic::{AtomicU64, Ordering};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Weak};

use parking_lot::{Mutex, MutexGuard, RwLock};
use uuid::Uuid;

use crate::path::ResourcePath;
use crate::variant::Variant;

/// Unique identifier of a live resource instance
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceId(u64);

impl ResourceId {
    fn next() -> Self {
        static NEXT: AtomicU64 = AtomicU64::new(1);
        Self(NEXT.fetch_add(1, Ordering::Relaxed))
    }

    /// Get raw ID value
    pub const fn id(&self) -> u64 {
        self.0
    }
}

/// Persistent resource identifier, stable across renames
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ResourceUid(pub Uuid);

impl ResourceUid {
    /// Generate a fresh random UID
    pub fn generate() -> Self {
        Self(Uuid::new_v4())
    }

    /// Parse from the canonical hyphenated form
    pub fn parse(text: &str) -> Option<Self> {
        Uuid::parse_str(text).ok().map(Self)
    }
}

impl fmt::Display for ResourceUid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Identifier of a scene instance that owns local-to-scene copies
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SceneId(pub u64);

/// Identifier of a registered owner
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct OwnerId(pub u64);

/// Memo of sub-resources already duplicated for a scene
pub type LocalSceneCache = HashMap<ResourceId, Resource>;

/// Per-property usage flags
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct PropertyUsage(u32);

impl PropertyUsage {
    /// Saved and loaded by format handlers
    pub const STORAGE: u32 = 1 << 0;
    /// Only meaningful inside the editor
    pub const EDITOR: u32 = 1 << 1;
    /// Sub-resource held here is always duplicated, never shared
    pub const NO_SHARE_ON_DUPLICATE: u32 = 1 << 2;

    /// Default usage: stored and edited
    pub const DEFAULT: PropertyUsage = PropertyUsage(Self::STORAGE | Self::EDITOR);

    /// Create from raw bits
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    /// Raw bits
    pub const fn bits(&self) -> u32 {
        self.0
    }

    /// Check a flag
    pub const fn contains(&self, flag: u32) -> bool {
        self.0 & flag == flag
    }

    /// Check if serialized
    pub const fn is_stored(&self) -> bool {
        self.contains(Self::STORAGE)
    }
}

impl Default for PropertyUsage {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// A stored property
#[derive(Clone, Debug, PartialEq)]
pub struct Property {
    /// Current value
    pub value: Variant,
    /// Usage flags
    pub usage: PropertyUsage,
}

/// Something that wants to hear when a resource's serializable state changes
pub trait ResourceOwner: Send + Sync {
    /// Called after the resource emitted `changed`
    fn resource_changed(&self, resource: &Resource);
}

/// Hook the cache implements so a dying resource can retract itself
pub(crate) trait PathRegistry: Send + Sync {
    /// The resource `id`, last published at `path`, is being destroyed
    fn resource_dropped(&self, path: &ResourcePath, id: ResourceId);

    /// Identity of the registry, for "same cache" checks
    fn registry_key(&self) -> usize;
}

type ChangeListener = Arc<dyn Fn(&Resource) + Send + Sync>;

/// Identity and bookkeeping, guarded by one mutex
pub(crate) struct Identity {
    pub(crate) path: ResourcePath,
    pub(crate) registry: Option<Weak<dyn PathRegistry>>,
    pub(crate) name: String,
    pub(crate) subindex: i32,
    pub(crate) local_to_scene: bool,
    pub(crate) local_scene: Option<SceneId>,
    pub(crate) translation_remapped: bool,
    pub(crate) remap_source: Option<ResourcePath>,
    pub(crate) last_modified: Option<u64>,
    pub(crate) uid: Option<ResourceUid>,
    owners: BTreeMap<OwnerId, Weak<dyn ResourceOwner>>,
}

struct ResourceInner {
    id: ResourceId,
    class: String,
    identity: Mutex<Identity>,
    properties: RwLock<BTreeMap<String, Property>>,
    listeners: Mutex<Vec<(u64, ChangeListener)>>,
    next_listener: AtomicU64,
}

impl Drop for ResourceInner {
    fn drop(&mut self) {
        let identity = self.identity.get_mut();
        if let Some(registry) = identity.registry.take().and_then(|w| w.upgrade()) {
            registry.resource_dropped(&identity.path, self.id);
        }
        if !identity.owners.is_empty() {
            log::debug!(
                "Resource {:?} ({}) destroyed with {} registered owner(s)",
                self.id,
                self.class,
                identity.owners.len()
            );
        }
    }
}

/// Strong handle to a resource
#[derive(Clone)]
pub struct Resource {
    inner: Arc<ResourceInner>,
}

impl Resource {
    /// Create an unpublished resource of the given class with no properties
    pub fn new(class: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(ResourceInner {
                id: ResourceId::next(),
                class: class.into(),
                identity: Mutex::new(Identity {
                    path: ResourcePath::empty(),
                    registry: None,
                    name: String::new(),
                    subindex: 0,
                    local_to_scene: false,
                    local_scene: None,
                    translation_remapped: false,
                    remap_source: None,
                    last_modified: None,
                    uid: None,
                    owners: BTreeMap::new(),
                }),
                properties: RwLock::new(BTreeMap::new()),
                listeners: Mutex::new(Vec::new()),
                next_listener: AtomicU64::new(1),
            }),
        }
    }

    /// Instance identifier
    pub fn id(&self) -> ResourceId {
        self.inner.id
    }

    /// Class name this resource was instantiated as
    pub fn class(&self) -> &str {
        &self.inner.class
    }

    /// Is this resource's class `name` or derived from it?
    pub fn is_class(&self, name: &str, class_db: &crate::class_db::ClassDb) -> bool {
        class_db.is_parent_class(&self.inner.class, name)
    }

    /// Check identity with another handle
    pub fn ptr_eq(&self, other: &Resource) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Create a weak handle
    pub fn downgrade(&self) -> WeakResource {
        WeakResource {
            id: self.inner.id,
            inner: Arc::downgrade(&self.inner),
        }
    }

    /// Number of strong handles
    pub fn strong_count(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    pub(crate) fn identity(&self) -> MutexGuard<'_, Identity> {
        self.inner.identity.lock()
    }

    // --- identity -------------------------------------------------------

    /// Canonical path, `None` while unpublished
    pub fn path(&self) -> Option<ResourcePath> {
        let identity = self.identity();
        if identity.path.is_empty() {
            None
        } else {
            Some(identity.path.clone())
        }
    }

    /// Display name
    pub fn name(&self) -> String {
        self.identity().name.clone()
    }

    /// Set the display name
    pub fn set_name(&self, name: impl Into<String>) {
        self.identity().name = name.into();
        self.emit_changed();
    }

    /// Index inside a multi-resource file (0 for the main resource)
    pub fn subindex(&self) -> i32 {
        self.identity().subindex
    }

    /// Set the subindex
    pub fn set_subindex(&self, subindex: i32) {
        self.identity().subindex = subindex;
    }

    /// Whether scene instancing should give each scene its own copy
    pub fn is_local_to_scene(&self) -> bool {
        self.identity().local_to_scene
    }

    /// Mark as local to scene
    pub fn set_local_to_scene(&self, enable: bool) {
        self.identity().local_to_scene = enable;
        self.emit_changed();
    }

    /// Scene this copy was made for, if any
    pub fn local_scene(&self) -> Option<SceneId> {
        self.identity().local_scene
    }

    /// Rebind to a scene
    pub fn set_local_scene(&self, scene: Option<SceneId>) {
        self.identity().local_scene = scene;
    }

    /// Whether the load that produced this resource substituted a
    /// locale-specific variant
    pub fn is_translation_remapped(&self) -> bool {
        self.identity().translation_remapped
    }

    /// Path requested before translation remapping, if it was remapped
    pub fn remap_source(&self) -> Option<ResourcePath> {
        self.identity().remap_source.clone()
    }

    /// Last modification timestamp of the backing file (seconds since epoch)
    pub fn last_modified(&self) -> Option<u64> {
        self.identity().last_modified
    }

    /// Set the modification timestamp
    pub fn set_last_modified(&self, time: Option<u64>) {
        self.identity().last_modified = time;
    }

    /// Persistent UID
    pub fn uid(&self) -> Option<ResourceUid> {
        self.identity().uid
    }

    /// Set the persistent UID
    pub fn set_uid(&self, uid: Option<ResourceUid>) {
        self.identity().uid = uid;
    }

    /// Publish at `path` in `cache` (or unpublish when `path` is empty)
    ///
    /// With `take_over` a live resource already at `path` is evicted and its
    /// path cleared; without it the call fails with `PathConflict`.
    pub fn set_path(
        &self,
        cache: &crate::cache::ResourceCache,
        path: impl Into<ResourcePath>,
        take_over: bool,
    ) -> crate::error::ResourceResult<()> {
        cache.assign_path(self, path.into(), take_over)
    }

    // --- properties -----------------------------------------------------

    /// Get a property value
    pub fn get(&self, name: &str) -> Option<Variant> {
        self.inner.properties.read().get(name).map(|p| p.value.clone())
    }

    /// Check if a property exists
    pub fn has(&self, name: &str) -> bool {
        self.inner.properties.read().contains_key(name)
    }

    /// Set a property value, keeping existing usage flags, and emit `changed`
    pub fn set(&self, name: &str, value: impl Into<Variant>) {
        self.store(name, value.into(), None);
        self.emit_changed();
    }

    /// Define a property with explicit usage flags, and emit `changed`
    pub fn set_with_usage(&self, name: &str, value: impl Into<Variant>, usage: PropertyUsage) {
        self.store(name, value.into(), Some(usage));
        self.emit_changed();
    }

    /// Set a property without emitting `changed` (used while building)
    pub fn set_silent(&self, name: &str, value: impl Into<Variant>) {
        self.store(name, value.into(), None);
    }

    /// Define a property with usage flags without emitting `changed`
    pub fn define(&self, name: &str, value: impl Into<Variant>, usage: PropertyUsage) {
        self.store(name, value.into(), Some(usage));
    }

    fn store(&self, name: &str, value: Variant, usage: Option<PropertyUsage>) {
        let mut props = self.inner.properties.write();
        match props.get_mut(name) {
            Some(prop) => {
                prop.value = value;
                if let Some(usage) = usage {
                    prop.usage = usage;
                }
            }
            None => {
                props.insert(
                    name.to_string(),
                    Property {
                        value,
                        usage: usage.unwrap_or_default(),
                    },
                );
            }
        }
    }

    /// Remove a property
    pub fn remove(&self, name: &str) -> Option<Variant> {
        let removed = self.inner.properties.write().remove(name).map(|p| p.value);
        if removed.is_some() {
            self.emit_changed();
        }
        removed
    }

    /// Usage flags of a property
    pub fn usage(&self, name: &str) -> Option<PropertyUsage> {
        self.inner.properties.read().get(name).map(|p| p.usage)
    }

    /// Snapshot of all properties, ordered by name
    pub fn properties(&self) -> Vec<(String, Property)> {
        self.inner
            .properties
            .read()
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect()
    }

    /// Snapshot of the serializable properties
    pub fn stored_properties(&self) -> Vec<(String, Variant)> {
        self.inner
            .properties
            .read()
            .iter()
            .filter(|(_, p)| p.usage.is_stored())
            .map(|(k, p)| (k.clone(), p.value.clone()))
            .collect()
    }

    /// Resources directly referenced by properties
    pub fn subresources(&self) -> Vec<Resource> {
        let mut out = Vec::new();
        for (_, prop) in self.properties() {
            prop.value.for_each_resource(&mut |r| out.push(r.clone()));
        }
        out
    }

    /// Copy every serializable property of `other` into `self`, then emit
    /// `changed`. The path is not touched.
    pub fn copy_from(&self, other: &Resource) {
        if self.ptr_eq(other) {
            return;
        }
        let incoming: Vec<(String, Property)> = other
            .properties()
            .into_iter()
            .filter(|(_, p)| p.usage.is_stored())
            .collect();
        {
            let mut props = self.inner.properties.write();
            for (name, prop) in incoming {
                props.insert(name, prop);
            }
        }
        self.emit_changed();
    }

    // --- duplication ----------------------------------------------------

    /// Produce a fresh, unpublished copy
    ///
    /// Referenced resources are shared unless `subresources` is set or the
    /// property is flagged `NO_SHARE_ON_DUPLICATE`. A resource reachable
    /// several times is copied once.
    pub fn duplicate(&self, subresources: bool) -> Resource {
        let mut memo = HashMap::new();
        self.duplicate_with(subresources, &mut memo)
    }

    fn duplicate_with(&self, subresources: bool, memo: &mut HashMap<ResourceId, Resource>) -> Resource {
        if let Some(copy) = memo.get(&self.id()) {
            return copy.clone();
        }
        let copy = self.blank_copy();
        memo.insert(self.id(), copy.clone());

        for (name, prop) in self.properties() {
            let value = if subresources || prop.usage.contains(PropertyUsage::NO_SHARE_ON_DUPLICATE) {
                prop.value.map_resources(&mut |r| r.duplicate_with(subresources, memo))
            } else {
                prop.value
            };
            copy.store(&name, value, Some(prop.usage));
        }
        copy
    }

    /// Copy for a scene instance: every local-to-scene sub-resource is
    /// duplicated once per scene (memoized in `remap_cache`) and bound to
    /// `scene`; everything else is shared.
    pub fn duplicate_for_local_scene(&self, scene: SceneId, remap_cache: &mut LocalSceneCache) -> Resource {
        let copy = self.blank_copy();
        copy.set_local_scene(Some(scene));
        // Registered before recursing so reference cycles resolve to the copy
        if self.is_local_to_scene() {
            remap_cache.insert(self.id(), copy.clone());
        }

        for (name, prop) in self.properties() {
            let value = prop.value.map_resources(&mut |sub| {
                if !sub.is_local_to_scene() {
                    return sub.clone();
                }
                match remap_cache.get(&sub.id()) {
                    Some(existing) => existing.clone(),
                    None => sub.duplicate_for_local_scene(scene, remap_cache),
                }
            });
            copy.store(&name, value, Some(prop.usage));
        }
        copy
    }

    fn blank_copy(&self) -> Resource {
        let copy = Resource::new(self.class());
        {
            let src = self.identity();
            let mut dst = copy.identity();
            dst.name = src.name.clone();
            dst.local_to_scene = src.local_to_scene;
            dst.subindex = src.subindex;
        }
        copy
    }

    /// Deep structural equality over serializable state
    ///
    /// Referenced resources compare by content; cycles are tolerated.
    pub fn content_eq(&self, other: &Resource) -> bool {
        let mut visited = HashSet::new();
        self.content_eq_with(other, &mut visited)
    }

    fn content_eq_with(&self, other: &Resource, visited: &mut HashSet<(ResourceId, ResourceId)>) -> bool {
        if self.ptr_eq(other) || !visited.insert((self.id(), other.id())) {
            return true;
        }
        if self.class() != other.class() {
            return false;
        }
        let a = self.stored_properties();
        let b = other.stored_properties();
        a.len() == b.len()
            && a.iter().zip(b.iter()).all(|((ka, va), (kb, vb))| {
                ka == kb && variant_content_eq(va, vb, visited)
            })
    }

    // --- change notification --------------------------------------------

    /// Connect a listener to the `changed` signal; returns a token for
    /// [`Resource::disconnect_changed`]
    pub fn connect_changed(&self, listener: impl Fn(&Resource) + Send + Sync + 'static) -> u64 {
        let token = self.inner.next_listener.fetch_add(1, Ordering::Relaxed);
        self.inner.listeners.lock().push((token, Arc::new(listener)));
        token
    }

    /// Disconnect a listener
    pub fn disconnect_changed(&self, token: u64) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(t, _)| *t != token);
        listeners.len() != before
    }

    /// Emit the `changed` signal: listeners first, then owners
    pub fn emit_changed(&self) {
        let listeners: Vec<ChangeListener> =
            self.inner.listeners.lock().iter().map(|(_, l)| l.clone()).collect();
        for listener in listeners {
            listener(self);
        }
        self.notify_change_to_owners();
    }

    /// Register an owner; it is notified on every change until unregistered
    pub fn register_owner(&self, id: OwnerId, owner: &Arc<dyn ResourceOwner>) {
        self.identity().owners.insert(id, Arc::downgrade(owner));
    }

    /// Unregister an owner (mandatory before the owner is torn down)
    pub fn unregister_owner(&self, id: OwnerId) -> bool {
        self.identity().owners.remove(&id).is_some()
    }

    /// Registered owner ids
    pub fn owners(&self) -> Vec<OwnerId> {
        self.identity().owners.keys().copied().collect()
    }

    /// Deliver `resource_changed` to every registered owner
    pub fn notify_change_to_owners(&self) {
        let owners: Vec<(OwnerId, Option<Arc<dyn ResourceOwner>>)> = self
            .identity()
            .owners
            .iter()
            .map(|(id, weak)| (*id, weak.upgrade()))
            .collect();

        let mut stale = Vec::new();
        for (id, owner) in owners {
            match owner {
                Some(owner) => owner.resource_changed(self),
                None => {
                    log::warn!(
                        "Owner {:?} of resource {:?} was torn down without unregistering",
                        id,
                        self.id()
                    );
                    stale.push(id);
                }
            }
        }
        if !stale.is_empty() {
            let mut identity = self.identity();
            for id in stale {
                identity.owners.remove(&id);
            }
        }
    }
}

fn variant_content_eq(a: &Variant, b: &Variant, visited: &mut HashSet<(ResourceId, ResourceId)>) -> bool {
    match (a, b) {
        (Variant::Object(ra), Variant::Object(rb)) => ra.content_eq_with(rb, visited),
        (Variant::Array(xa), Variant::Array(xb)) => {
            xa.len() == xb.len() && xa.iter().zip(xb.iter()).all(|(x, y)| variant_content_eq(x, y, visited))
        }
        (Variant::Dictionary(da), Variant::Dictionary(db)) => {
            da.len() == db.len()
                && da
                    .iter()
                    .zip(db.iter())
                    .all(|((ka, va), (kb, vb))| ka == kb && variant_content_eq(va, vb, visited))
        }
        _ => a == b,
    }
}

impl PartialEq for Resource {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Resource {}

impl std::hash::Hash for Resource {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.inner.id.hash(state);
    }
}

impl fmt::Debug for Resource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.inner.identity.try_lock().map(|i| i.path.clone());
        f.debug_struct("Resource")
            .field("id", &self.inner.id)
            .field("class", &self.inner.class)
            .field("path", &path)
            .finish()
    }
}

/// Weak handle to a resource
///
/// Does not keep the resource alive. Can be upgraded to a strong handle.
#[derive(Clone)]
pub struct WeakResource {
    id: ResourceId,
    inner: Weak<ResourceInner>,
}

impl WeakResource {
    /// Try to upgrade to a strong handle
    pub fn upgrade(&self) -> Option<Resource> {
        self.inner.upgrade().map(|inner| Resource { inner })
    }

    /// Check if the resource is still alive
    pub fn is_alive(&self) -> bool {
        self.inner.strong_count() > 0
    }

    /// Id of the observed resource
    pub fn id(&self) -> ResourceId {
        self.id
    }
}

impl fmt::Debug for WeakResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("WeakResource")
            .field("id", &self.id)
            .field("alive", &self.is_alive())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_resource_basic() {
        let r = Resource::new("Texture");
        assert_eq!(r.class(), "Texture");
        assert!(r.path().is_none());
        r.set("width", 64);
        assert_eq!(r.get("width"), Some(Variant::Int(64)));
        assert_eq!(r.usage("width"), Some(PropertyUsage::DEFAULT));
    }

    #[test]
    fn test_is_class() {
        let db = crate::class_db::ClassDb::new();
        db.register(crate::class_db::ClassInfo::new("Texture", "Resource"));
        let r = Resource::new("Texture");
        assert!(r.is_class("Texture", &db));
        assert!(r.is_class("Resource", &db));
        assert!(!r.is_class("Mesh", &db));
    }

    #[test]
    fn test_weak_resource() {
        let r = Resource::new("Resource");
        let weak = r.downgrade();
        assert!(weak.is_alive());
        assert_eq!(weak.upgrade(), Some(r.clone()));

        drop(r);
        assert!(!weak.is_alive());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn test_duplicate_shallow_shares_subresources() {
        let sub = Resource::new("Material");
        let r = Resource::new("Mesh");
        r.set("material", sub.clone());
        r.set("name", "cube");

        let copy = r.duplicate(false);
        assert!(!copy.ptr_eq(&r));
        assert_eq!(copy.get("material"), Some(Variant::Object(sub)));
        assert_eq!(copy.get("name"), r.get("name"));
    }

    #[test]
    fn test_duplicate_deep_copies_subresources() {
        let sub = Resource::new("Material");
        sub.set("albedo", 0.5);
        let r = Resource::new("Mesh");
        r.set("material", sub.clone());
        r.set("materials", Variant::Array(vec![Variant::Object(sub.clone())]));

        let copy = r.duplicate(true);
        let copied_sub = copy.get("material").and_then(|v| v.as_resource().cloned()).unwrap();
        assert!(!copied_sub.ptr_eq(&sub));
        assert!(copied_sub.content_eq(&sub));

        // Same source sub-resource maps to the same copy
        let in_array = copy.get("materials").unwrap();
        assert_eq!(in_array.as_array().unwrap()[0], Variant::Object(copied_sub));
        assert!(copy.content_eq(&r));
    }

    #[test]
    fn test_duplicate_no_share_flag() {
        let sub = Resource::new("Curve");
        let r = Resource::new("Particles");
        r.set_with_usage(
            "curve",
            sub.clone(),
            PropertyUsage::from_bits(PropertyUsage::STORAGE | PropertyUsage::NO_SHARE_ON_DUPLICATE),
        );
        let copy = r.duplicate(false);
        let copied = copy.get("curve").unwrap();
        assert!(!copied.as_resource().unwrap().ptr_eq(&sub));
    }

    #[test]
    fn test_duplicate_handles_cycles() {
        let a = Resource::new("Node");
        let b = Resource::new("Node");
        a.set("next", b.clone());
        b.set("next", a.clone());

        let copy = a.duplicate(true);
        let b_copy = copy.get("next").unwrap().as_resource().cloned().unwrap();
        let back = b_copy.get("next").unwrap().as_resource().cloned().unwrap();
        assert!(back.ptr_eq(&copy));

        // Break the cycles so the test does not leak
        a.remove("next");
        copy.remove("next");
    }

    #[test]
    fn test_duplicate_for_local_scene() {
        let shared = Resource::new("Shape");
        let local = Resource::new("Material");
        local.set_local_to_scene(true);

        let a = Resource::new("Mesh");
        a.set("shape", shared.clone());
        a.set("material", local.clone());
        let b = Resource::new("Mesh");
        b.set("material", local.clone());

        let scene = SceneId(7);
        let mut cache = LocalSceneCache::new();
        let a2 = a.duplicate_for_local_scene(scene, &mut cache);
        let b2 = b.duplicate_for_local_scene(scene, &mut cache);

        let a_mat = a2.get("material").unwrap().as_resource().cloned().unwrap();
        let b_mat = b2.get("material").unwrap().as_resource().cloned().unwrap();
        assert!(!a_mat.ptr_eq(&local));
        assert!(a_mat.ptr_eq(&b_mat));
        assert_eq!(a_mat.local_scene(), Some(scene));
        assert_eq!(a2.get("shape"), Some(Variant::Object(shared)));
    }

    #[test]
    fn test_duplicate_for_local_scene_handles_cycles() {
        let a = Resource::new("Node");
        let b = Resource::new("Node");
        a.set_local_to_scene(true);
        b.set_local_to_scene(true);
        a.set("next", b.clone());
        b.set("next", a.clone());

        let holder = Resource::new("Scene");
        holder.set("root", a.clone());

        let scene = SceneId(3);
        let mut cache = LocalSceneCache::new();
        let holder2 = holder.duplicate_for_local_scene(scene, &mut cache);
        let a2 = holder2.get("root").unwrap().as_resource().cloned().unwrap();
        let b2 = a2.get("next").unwrap().as_resource().cloned().unwrap();
        let back = b2.get("next").unwrap().as_resource().cloned().unwrap();
        assert!(!a2.ptr_eq(&a));
        assert!(!b2.ptr_eq(&b));
        assert!(back.ptr_eq(&a2));
        assert_eq!(b2.local_scene(), Some(scene));

        // Break the cycles so the test does not leak
        a.remove("next");
        a2.remove("next");
        cache.clear();
    }

    struct CountingOwner(AtomicUsize);

    impl ResourceOwner for CountingOwner {
        fn resource_changed(&self, _resource: &Resource) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn test_owner_notification() {
        let owner = Arc::new(CountingOwner(AtomicUsize::new(0)));
        let dyn_owner: Arc<dyn ResourceOwner> = owner.clone();
        let r = Resource::new("Resource");

        r.register_owner(OwnerId(1), &dyn_owner);
        r.set("x", 1);
        r.set("x", 2);
        assert_eq!(owner.0.load(Ordering::SeqCst), 2);

        assert!(r.unregister_owner(OwnerId(1)));
        r.set("x", 3);
        assert_eq!(owner.0.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_stale_owner_is_pruned() {
        let r = Resource::new("Resource");
        {
            let owner: Arc<dyn ResourceOwner> = Arc::new(CountingOwner(AtomicUsize::new(0)));
            r.register_owner(OwnerId(9), &owner);
        }
        r.notify_change_to_owners();
        assert!(r.owners().is_empty());
    }

    #[test]
    fn test_changed_listener() {
        let hits = Arc::new(AtomicUsize::new(0));
        let r = Resource::new("Resource");
        let counter = hits.clone();
        let token = r.connect_changed(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        r.set("a", true);
        assert!(r.disconnect_changed(token));
        r.set("a", false);
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_copy_from_skips_non_storage() {
        let a = Resource::new("Resource");
        let b = Resource::new("Resource");
        b.set("stored", 1);
        b.set_with_usage("runtime", 2, PropertyUsage::from_bits(PropertyUsage::EDITOR));
        a.copy_from(&b);
        assert_eq!(a.get("stored"), Some(Variant::Int(1)));
        assert!(!a.has("runtime"));
    }
}
