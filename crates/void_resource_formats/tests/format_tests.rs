//! Tests for the built-in resource formats

use std::collections::BTreeMap;

use parking_lot::Mutex;
use void_resource::prelude::*;
use void_resource::{ClassInfo, PropertyInfo, ResourceUid, ROOT_CLASS};
use void_resource_formats::{register_default_formats, RAW_DATA_CLASS, TEXT_FILE_CLASS};

fn setup() -> (Arc<MemoryFileSystem>, ResourceSubsystem) {
    let fs = Arc::new(MemoryFileSystem::new());
    let resources = ResourceSubsystem::new(fs.clone());
    register_default_formats(&resources);
    (fs, resources)
}

/// Material referencing a published text file and an embedded gradient
fn material(resources: &ResourceSubsystem) -> (Resource, Resource) {
    let notes = resources.load("res://docs/notes.txt", None, false).unwrap();
    let gradient = Resource::new("Gradient");
    gradient.set("stops", vec![Variant::Float(0.0), Variant::Float(0.5), Variant::Float(1.0)]);

    let material = Resource::new("Material");
    material.set("name", "steel");
    material.set("roughness", 0.25);
    material.set("layers", 3);
    material.set("gradient", gradient);
    material.set("notes", notes.clone());
    material.set("__editor_color", "red");
    (material, notes)
}

#[test]
fn test_text_roundtrip() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "keep it shiny");
    let (original, notes) = material(&resources);

    let flags = SaveFlags::NONE.with(SaveFlags::RELATIVE_PATHS);
    resources.save("res://materials/steel.tres", &original, flags).unwrap();
    let text = fs.read_string(&ResourcePath::new("res://materials/steel.tres")).unwrap();
    assert!(text.contains("../docs/notes.txt"));

    let loaded = resources.load("res://materials/steel.tres", None, false).unwrap();
    assert!(!loaded.ptr_eq(&original));
    assert_eq!(loaded.class(), "Material");
    assert_eq!(loaded.get("name"), Some(Variant::from("steel")));
    assert_eq!(loaded.get("roughness"), Some(Variant::Float(0.25)));
    assert_eq!(loaded.get("layers"), Some(Variant::Int(3)));
    assert_eq!(loaded.get("__editor_color"), Some(Variant::from("red")));

    // External references resolve through the cache
    let loaded_notes = loaded.get("notes").unwrap();
    assert!(loaded_notes.as_resource().unwrap().ptr_eq(&notes));

    // Embedded resources are published under a sub-resource path
    let gradient = loaded.get("gradient").unwrap().as_resource().unwrap().clone();
    assert_eq!(gradient.class(), "Gradient");
    assert_eq!(gradient.get("stops").unwrap().as_array().unwrap().len(), 3);
    let sub_path = gradient.path().unwrap();
    assert!(sub_path.as_str().starts_with("res://materials/steel.tres::"));
    assert!(resources.cache().lookup(&sub_path).unwrap().ptr_eq(&gradient));
}

#[test]
fn test_binary_roundtrip_compressed() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "keep it shiny");
    let (original, _notes) = material(&resources);
    let uid = ResourceUid::generate();
    original.set_uid(Some(uid));

    let flags = SaveFlags::NONE
        .with(SaveFlags::COMPRESS)
        .with(SaveFlags::OMIT_EDITOR_PROPERTIES);
    resources.save("res://steel.res", &original, flags).unwrap();

    let data = fs.read_all(&ResourcePath::new("res://steel.res")).unwrap();
    assert_eq!(&data[..4], b"VRES");
    assert_eq!(data[4] & 1, 1);

    assert_eq!(resources.get_resource_type("res://steel.res").as_deref(), Some("Material"));
    assert_eq!(resources.get_resource_uid("res://steel.res"), Some(uid));

    let loaded = resources.load("res://steel.res", None, false).unwrap();
    assert_eq!(loaded.uid(), Some(uid));
    assert_eq!(loaded.get("name"), Some(Variant::from("steel")));
    assert_eq!(loaded.get("__editor_color"), None);
    assert_eq!(
        loaded.get("gradient").unwrap().as_resource().unwrap().get("stops"),
        original.get("gradient").unwrap().as_resource().unwrap().get("stops")
    );
}

#[test]
fn test_text_rejects_compression() {
    let (fs, resources) = setup();
    let res = Resource::new("Material");
    let err = resources
        .save("res://a.tres", &res, SaveFlags::NONE.with(SaveFlags::COMPRESS))
        .unwrap_err();
    assert!(matches!(err, ResourceError::Invalid(_)));
    assert!(!fs.exists(&ResourcePath::new("res://a.tres")));
}

#[test]
fn test_bundled_references_are_embedded() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "inline me");
    let (original, _notes) = material(&resources);

    resources
        .save("res://bundle.tres", &original, SaveFlags::NONE.with(SaveFlags::BUNDLE_RESOURCES))
        .unwrap();
    assert!(resources.get_dependencies("res://bundle.tres", false).unwrap().is_empty());

    let loaded = resources.load("res://bundle.tres", None, true).unwrap();
    let notes = loaded.get("notes").unwrap().as_resource().unwrap().clone();
    assert_eq!(notes.class(), TEXT_FILE_CLASS);
    assert_eq!(notes.get("text"), Some(Variant::from("inline me")));
}

#[test]
fn test_staged_progress() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "stages");
    let (original, _notes) = material(&resources);
    resources.save("res://staged.tres", &original, SaveFlags::NONE).unwrap();

    // parse, one external, one embedded, then the material itself
    let mut loader = resources.load_interactive("res://staged.tres", None).unwrap();
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 0, total: 4 }));
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 1, total: 4 }));
    assert!(matches!(loader.poll(), LoadPoll::InProgress { stage: 2, total: 4 }));
    match loader.poll() {
        LoadPoll::Done(resource) => assert_eq!(resource.get("layers"), Some(Variant::Int(3))),
        other => panic!("expected Done, got {:?}", other),
    }
}

#[test]
fn test_dependencies_and_rename() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "v1");
    fs.insert("res://docs/notes_v2.txt", "v2");
    let (original, _notes) = material(&resources);

    for path in ["res://mat.tres", "res://mat.res"] {
        let flags = if path.ends_with(".res") {
            SaveFlags::NONE.with(SaveFlags::COMPRESS)
        } else {
            SaveFlags::NONE
        };
        resources.save(path, &original, flags).unwrap();
        assert_eq!(
            resources.get_dependencies(path, false).unwrap(),
            vec!["res://docs/notes.txt".to_string()]
        );
        assert_eq!(
            resources.get_dependencies(path, true).unwrap(),
            vec![format!("res://docs/notes.txt::{}", TEXT_FILE_CLASS)]
        );

        let mut renames = BTreeMap::new();
        renames.insert("res://docs/notes.txt".to_string(), "res://docs/notes_v2.txt".to_string());
        resources.rename_dependencies(path, &renames).unwrap();
        assert_eq!(
            resources.get_dependencies(path, false).unwrap(),
            vec!["res://docs/notes_v2.txt".to_string()]
        );

        let loaded = resources.load(path, None, true).unwrap();
        let notes = loaded.get("notes").unwrap().as_resource().unwrap().clone();
        assert_eq!(notes.get("text"), Some(Variant::from("v2")));
    }

    // Compression survives the rewrite
    let data = fs.read_all(&ResourcePath::new("res://mat.res")).unwrap();
    assert_eq!(data[4] & 1, 1);
}

#[test]
fn test_missing_dependency() {
    let (fs, resources) = setup();
    fs.insert("res://docs/notes.txt", "gone soon");
    let (original, notes) = material(&resources);
    resources.save("res://mat.tres", &original, SaveFlags::NONE).unwrap();

    // Unpublish and delete the referenced file
    drop(original);
    notes.set_path(resources.cache(), "", false).unwrap();
    fs.remove(&ResourcePath::new("res://docs/notes.txt"));

    let reported = Arc::new(Mutex::new(Vec::new()));
    let sink = reported.clone();
    resources.set_dependency_error_callback(move |path, dep, ty| {
        sink.lock().push((path.to_string(), dep.to_string(), ty.to_string()));
    });

    let loaded = resources.load("res://mat.tres", None, true).unwrap();
    assert_eq!(loaded.get("notes"), Some(Variant::Nil));
    assert_eq!(
        reported.lock().as_slice(),
        &[(
            "res://mat.tres".to_string(),
            "res://docs/notes.txt".to_string(),
            TEXT_FILE_CLASS.to_string()
        )]
    );

    resources.set_abort_on_missing_resource(true);
    let err = resources.load("res://mat.tres", None, true).unwrap_err();
    assert!(matches!(err, ResourceError::MissingDependency { .. }));
}

#[test]
fn test_registered_class_defaults() {
    let (_fs, resources) = setup();
    resources.class_db().register(
        ClassInfo::new("Material", ROOT_CLASS).with_property(PropertyInfo::new("roughness", 0.5)),
    );

    let material = Resource::new("Material");
    material.set("name", "plain");
    resources.save("res://plain.tres", &material, SaveFlags::NONE).unwrap();

    let loaded = resources.load("res://plain.tres", None, false).unwrap();
    assert_eq!(loaded.get("roughness"), Some(Variant::Float(0.5)));
    assert_eq!(loaded.get("name"), Some(Variant::from("plain")));
}

#[test]
fn test_corrupt_document() {
    let (fs, resources) = setup();
    fs.insert("res://broken.tres", "{ not json");
    fs.insert("res://broken.res", "RIFF....");

    let err = resources.load("res://broken.tres", None, false).unwrap_err();
    assert!(matches!(err, ResourceError::ParseError { .. }));
    let err = resources.load("res://broken.res", None, false).unwrap_err();
    assert!(matches!(err, ResourceError::ParseError { .. }));
    assert_eq!(resources.get_resource_type("res://broken.res"), None);
}

#[test]
fn test_plain_files() {
    let (fs, resources) = setup();
    fs.insert("res://readme.md", "# hello");
    fs.insert("res://blob.bin", vec![1u8, 2, 3]);

    let readme = resources.load("res://readme.md", None, false).unwrap();
    assert_eq!(readme.class(), TEXT_FILE_CLASS);
    assert_eq!(readme.get("text"), Some(Variant::from("# hello")));

    let blob = resources.load("res://blob.bin", None, false).unwrap();
    assert_eq!(blob.class(), RAW_DATA_CLASS);
    assert_eq!(blob.get("data"), Some(Variant::Bytes(vec![1, 2, 3])));

    readme.set("text", "# changed");
    resources.save("user://readme.md", &readme, SaveFlags::NONE).unwrap();
    assert_eq!(
        fs.read_string(&ResourcePath::new("user://readme.md")).unwrap(),
        "# changed"
    );
}
