//! End-to-end scenarios for void_resource

mod common;

use std::collections::BTreeMap;
use std::sync::Arc;

use common::{memory_subsystem, ValueLoader};
use void_resource::prelude::*;
use void_resource::TranslationEntry;

/// Loads a file and, mid-load, asks for its own path again
struct RingLoader;

impl FormatLoader for RingLoader {
    fn name(&self) -> &str {
        "ring"
    }

    fn recognized_extensions(&self) -> Vec<String> {
        vec!["ring".into()]
    }

    fn handles_type(&self, type_name: &str) -> bool {
        type_name == "Ring"
    }

    fn resource_type(&self, _fs: &dyn FileSystem, _path: &ResourcePath) -> Option<String> {
        Some("Ring".into())
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(single_stage(|ctx| {
            let resource = Resource::new("Ring");
            resource.set_silent("text", ctx.read_string()?);
            match ctx.load(ctx.path().clone(), None) {
                Ok(dep) => resource.set_silent("dep", dep),
                Err(err) => resource.set_silent("dep", err.kind().as_str()),
            }
            Ok(resource)
        }))
    }
}

#[test]
fn test_cache_hit_returns_same_instance() {
    let (fs, resources) = memory_subsystem();
    fs.insert("res://a.data", "42");
    let loader = ValueLoader::new("data", "Data");
    let polls = loader.polls.clone();
    resources.add_loader(Arc::new(loader), false);

    let r1 = resources.load("res://a.data", None, false).unwrap();
    assert_eq!(r1.get("value"), Some(Variant::Int(42)));
    let after_first = polls.load(std::sync::atomic::Ordering::SeqCst);
    assert!(after_first > 0);

    let r2 = resources.load("res://a.data", None, false).unwrap();
    assert!(r1.ptr_eq(&r2));
    assert_eq!(polls.load(std::sync::atomic::Ordering::SeqCst), after_first);
}

#[test]
fn test_recursive_load_is_broken() {
    let (fs, resources) = memory_subsystem();
    fs.insert("res://loop.ring", "around");
    resources.add_loader(Arc::new(RingLoader), false);

    let ring = resources.load("res://loop.ring", None, false).unwrap();
    assert_eq!(ring.get("text"), Some(Variant::from("around")));
    assert_eq!(ring.get("dep"), Some(Variant::from("cyclic_dependency")));
    assert_eq!(ring.path(), Some(ResourcePath::new("res://loop.ring")));
    assert!(!resources.loading_map().is_loading(&ResourcePath::new("res://loop.ring")));
}

#[test]
fn test_take_over() {
    let (_fs, resources) = memory_subsystem();
    let cache = resources.cache();

    let r1 = Resource::new("Resource");
    r1.set_path(cache, "res://x", false).unwrap();

    let r2 = Resource::new("Resource");
    assert_eq!(
        r2.set_path(cache, "res://x", false),
        Err(ResourceError::PathConflict("res://x".into()))
    );
    r2.set_path(cache, "res://x", true).unwrap();

    assert_eq!(r1.path(), None);
    let loaded = resources.load("res://x", None, false).unwrap();
    assert!(loaded.ptr_eq(&r2));
}

#[test]
fn test_extension_dispatch_order() {
    let (_fs, resources) = memory_subsystem();
    let a: Arc<dyn FormatLoader> = Arc::new(ValueLoader::new("x", "T1"));
    let b: Arc<dyn FormatLoader> = Arc::new(ValueLoader::new("x", "T2"));
    resources.add_loader(a, false);
    resources.add_loader(b.clone(), true);

    assert_eq!(resources.get_resource_type("res://f.x").as_deref(), Some("T2"));
    assert!(resources.remove_loader(&b));
    assert_eq!(resources.get_resource_type("res://f.x").as_deref(), Some("T1"));
}

#[test]
fn test_translation_remap() {
    let (fs, resources) = memory_subsystem();
    fs.insert("res://msg.en", "hello");
    fs.insert("res://msg.fr", "bonjour");
    resources.add_loader(Arc::new(ValueLoader::new("en", "Message").with_extensions(&["en", "fr"])), false);

    let mut table = BTreeMap::new();
    table.insert(
        ResourcePath::new("res://msg"),
        vec![
            TranslationEntry::new("en", "res://msg.en"),
            TranslationEntry::new("fr", "res://msg.fr"),
        ],
    );
    resources.set_translation_remaps(table);
    resources.set_locale("fr").unwrap();

    let msg = resources.load("res://msg", None, false).unwrap();
    assert_eq!(msg.get("value"), Some(Variant::from("bonjour")));
    assert!(msg.is_translation_remapped());
    assert_eq!(msg.path(), Some(ResourcePath::new("res://msg.fr")));
    assert_eq!(msg.remap_source(), Some(ResourcePath::new("res://msg")));
}

#[test]
fn test_interactive_progress() {
    let (fs, resources) = memory_subsystem();
    fs.insert("res://a.data", "1");
    fs.insert("res://b.data", "2");
    resources.add_loader(Arc::new(ValueLoader::new("data", "Data").with_stages(3)), false);

    let mut loader = resources.load_interactive("res://a.data", None).unwrap();
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 0, total: 3 }));
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 1, total: 3 }));
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 2, total: 3 }));
    match loader.poll() {
        LoadPoll::Done(resource) => assert_eq!(resource.get("value"), Some(Variant::Int(1))),
        other => panic!("expected Done, got {:?}", other),
    }

    // Abandoned after two polls
    let path = ResourcePath::new("res://b.data");
    let mut loader = resources.load_interactive(path.clone(), None).unwrap();
    assert!(loader.poll().is_in_progress());
    assert!(loader.poll().is_in_progress());
    drop(loader);

    assert!(!resources.cache().contains(&path));
    assert!(!resources.loading_map().is_loading(&path));
    let b = resources.load(path, None, false).unwrap();
    assert_eq!(b.get("value"), Some(Variant::Int(2)));
}

#[test]
fn test_recursive_load_polled_on_worker() {
    let (fs, resources) = memory_subsystem();
    fs.insert("res://loop.ring", "elsewhere");
    resources.add_loader(Arc::new(RingLoader), false);

    let loader = resources.load_interactive("res://loop.ring", None).unwrap();
    let (tx, rx) = std::sync::mpsc::channel();
    let handle = std::thread::spawn(move || {
        let _ = tx.send(loader.wait());
    });

    let ring = rx
        .recv_timeout(std::time::Duration::from_secs(5))
        .expect("worker finished")
        .unwrap();
    handle.join().unwrap();
    assert_eq!(ring.get("text"), Some(Variant::from("elsewhere")));
    assert_eq!(ring.get("dep"), Some(Variant::from("cyclic_dependency")));
    assert!(!resources.loading_map().is_loading(&ResourcePath::new("res://loop.ring")));
}
