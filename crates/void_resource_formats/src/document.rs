//! Resource documents
//!
//! Both the text (`.tres`) and binary (`.res`) formats store the same
//! document: a header (class, uid), the external resources it references, the
//! sub-resources embedded in it and the properties of the main resource.
//! Sub-resources are listed dependencies-first so a loader can build them in
//! order.
//!
//! Binary files start with the magic `VRES` and a little-endian `u32` flag
//! word; bit 0 marks an LZ4-compressed payload.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use void_resource::{
    FileSystem, InteractiveLoad, LoadContext, LoadStep, Resource, ResourceError, ResourceId, ResourcePath,
    ResourceResult, ResourceUid, SaveFlags, Variant,
};

use crate::error::FormatError;

/// Current document version
pub const FORMAT_VERSION: u32 = 1;

/// Prefix of editor metadata properties dropped by `OMIT_EDITOR_PROPERTIES`
pub const EDITOR_PROPERTY_PREFIX: &str = "__editor";

const BINARY_MAGIC: &[u8; 4] = b"VRES";
const FLAG_LZ4: u32 = 1;
const HEADER_LEN: usize = 8;

/// A stored property value
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Bytes(Vec<u8>),
    Array(Vec<Value>),
    Dictionary(BTreeMap<String, Value>),
    /// Reference to an entry of `ext_resources`
    ExtResource(String),
    /// Reference to an entry of `sub_resources`
    SubResource(String),
}

/// Reference to a resource stored in another file
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ExtResource {
    pub id: String,
    /// Absolute, or relative to the document's directory
    pub path: String,
    #[serde(rename = "type")]
    pub type_name: String,
}

/// Resource embedded in the document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SubResource {
    pub id: String,
    pub class: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

/// On-disk resource document
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ResourceDocument {
    pub format: u32,
    pub class: String,
    pub uid: Option<String>,
    #[serde(default)]
    pub ext_resources: Vec<ExtResource>,
    #[serde(default)]
    pub sub_resources: Vec<SubResource>,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

impl ResourceDocument {
    /// Build the document for saving `resource` to `path`
    pub fn from_resource(path: &ResourcePath, resource: &Resource, flags: SaveFlags) -> Result<Self, FormatError> {
        DocumentWriter::new(path, resource, flags).write(resource)
    }

    /// External dependencies as absolute paths, in document order
    pub fn dependency_paths(&self, path: &ResourcePath) -> Vec<(ResourcePath, &str)> {
        self.ext_resources
            .iter()
            .map(|e| (resolve(path, &e.path), e.type_name.as_str()))
            .collect()
    }
}

/// Document serialization
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Encoding {
    /// Pretty-printed JSON
    Text,
    /// Header plus bincode, optionally LZ4-compressed
    Binary,
}

impl Encoding {
    /// Serialize `doc`; `compress` only applies to [`Encoding::Binary`]
    pub fn encode(self, doc: &ResourceDocument, compress: bool) -> Result<Vec<u8>, FormatError> {
        match self {
            Encoding::Text => {
                let mut text = serde_json::to_string_pretty(doc)?;
                text.push('\n');
                Ok(text.into_bytes())
            }
            Encoding::Binary => {
                let payload = bincode::serialize(doc)?;
                let (flags, payload) = if compress {
                    (FLAG_LZ4, lz4_flex::compress_prepend_size(&payload))
                } else {
                    (0, payload)
                };
                let mut out = Vec::with_capacity(HEADER_LEN + payload.len());
                out.extend_from_slice(BINARY_MAGIC);
                out.extend_from_slice(&flags.to_le_bytes());
                out.extend_from_slice(&payload);
                Ok(out)
            }
        }
    }

    /// Deserialize a document; also reports whether it was compressed
    pub fn decode(self, data: &[u8]) -> Result<(ResourceDocument, bool), FormatError> {
        let (doc, compressed): (ResourceDocument, bool) = match self {
            Encoding::Text => (serde_json::from_slice(data)?, false),
            Encoding::Binary => {
                if data.len() < HEADER_LEN || &data[..4] != BINARY_MAGIC {
                    return Err(FormatError::BadHeader);
                }
                let mut word = [0u8; 4];
                word.copy_from_slice(&data[4..HEADER_LEN]);
                let flags = u32::from_le_bytes(word);
                let payload = &data[HEADER_LEN..];
                if flags & FLAG_LZ4 != 0 {
                    let raw = lz4_flex::decompress_size_prepended(payload)?;
                    (bincode::deserialize(&raw)?, true)
                } else {
                    (bincode::deserialize(payload)?, false)
                }
            }
        };
        if doc.format != FORMAT_VERSION {
            return Err(FormatError::UnsupportedVersion(doc.format));
        }
        Ok((doc, compressed))
    }
}

/// Resolve a stored reference against the document's directory
pub fn resolve(document: &ResourcePath, stored: &str) -> ResourcePath {
    document.base_dir().join(stored)
}

// --- writing -------------------------------------------------------------

struct DocumentWriter<'a> {
    path: &'a ResourcePath,
    flags: SaveFlags,
    main: ResourceId,
    ext: Vec<ExtResource>,
    ext_ids: HashMap<ResourcePath, String>,
    subs: Vec<SubResource>,
    sub_ids: HashMap<ResourceId, String>,
    used_ids: HashSet<String>,
    visiting: HashSet<ResourceId>,
}

impl<'a> DocumentWriter<'a> {
    fn new(path: &'a ResourcePath, main: &Resource, flags: SaveFlags) -> Self {
        Self {
            path,
            flags,
            main: main.id(),
            ext: Vec::new(),
            ext_ids: HashMap::new(),
            subs: Vec::new(),
            sub_ids: HashMap::new(),
            used_ids: HashSet::new(),
            visiting: HashSet::new(),
        }
    }

    fn write(mut self, resource: &Resource) -> Result<ResourceDocument, FormatError> {
        let properties = self.properties(resource)?;
        Ok(ResourceDocument {
            format: FORMAT_VERSION,
            class: resource.class().to_string(),
            uid: resource.uid().map(|u| u.to_string()),
            ext_resources: self.ext,
            sub_resources: self.subs,
            properties,
        })
    }

    fn properties(&mut self, resource: &Resource) -> Result<BTreeMap<String, Value>, FormatError> {
        let omit_editor = self.flags.contains(SaveFlags::OMIT_EDITOR_PROPERTIES);
        let mut out = BTreeMap::new();
        for (name, prop) in resource.properties() {
            if !prop.usage.is_stored() || (omit_editor && name.starts_with(EDITOR_PROPERTY_PREFIX)) {
                continue;
            }
            let value = self.value(&prop.value)?;
            out.insert(name, value);
        }
        Ok(out)
    }

    fn value(&mut self, value: &Variant) -> Result<Value, FormatError> {
        Ok(match value {
            Variant::Nil => Value::Nil,
            Variant::Bool(v) => Value::Bool(*v),
            Variant::Int(v) => Value::Int(*v),
            Variant::Float(v) => Value::Float(*v),
            Variant::String(v) => Value::String(v.clone()),
            Variant::Bytes(v) => Value::Bytes(v.clone()),
            Variant::Array(items) => Value::Array(items.iter().map(|v| self.value(v)).collect::<Result<_, _>>()?),
            Variant::Dictionary(map) => {
                let mut out = BTreeMap::new();
                for (key, v) in map {
                    out.insert(key.clone(), self.value(v)?);
                }
                Value::Dictionary(out)
            }
            Variant::Object(resource) => self.reference(resource)?,
        })
    }

    fn reference(&mut self, resource: &Resource) -> Result<Value, FormatError> {
        if resource.id() == self.main || self.visiting.contains(&resource.id()) {
            return Err(FormatError::Cycle(resource.class().to_string()));
        }
        if let Some(id) = self.sub_ids.get(&resource.id()) {
            return Ok(Value::SubResource(id.clone()));
        }
        if let Some(path) = self.external_path(resource) {
            if let Some(id) = self.ext_ids.get(&path) {
                return Ok(Value::ExtResource(id.clone()));
            }
            let id = (self.ext.len() + 1).to_string();
            let stored = if self.flags.contains(SaveFlags::RELATIVE_PATHS) {
                path.relative_to(&self.path.base_dir()).unwrap_or_else(|| path.to_string())
            } else {
                path.to_string()
            };
            self.ext.push(ExtResource {
                id: id.clone(),
                path: stored,
                type_name: resource.class().to_string(),
            });
            self.ext_ids.insert(path, id.clone());
            return Ok(Value::ExtResource(id));
        }

        // Embedded: its own references come first
        self.visiting.insert(resource.id());
        let properties = self.properties(resource)?;
        self.visiting.remove(&resource.id());

        let id = self.sub_id(resource);
        self.sub_ids.insert(resource.id(), id.clone());
        self.subs.push(SubResource {
            id: id.clone(),
            class: resource.class().to_string(),
            properties,
        });
        Ok(Value::SubResource(id))
    }

    /// Path to reference `resource` by, if it lives in its own file
    fn external_path(&self, resource: &Resource) -> Option<ResourcePath> {
        if self.flags.contains(SaveFlags::BUNDLE_RESOURCES) {
            return None;
        }
        let path = resource.path()?;
        if path.as_str().contains("::") || path == *self.path {
            return None;
        }
        Some(path)
    }

    /// Keep the local id a sub-resource was loaded with, if any
    fn sub_id(&mut self, resource: &Resource) -> String {
        let prefix = format!("{}::", self.path);
        let kept = resource
            .path()
            .and_then(|p| p.as_str().strip_prefix(&prefix).map(str::to_string))
            .filter(|id| !id.is_empty() && !self.used_ids.contains(id));
        let id = match kept {
            Some(id) => id,
            None => {
                let mut n = self.subs.len() + 1;
                loop {
                    let candidate = format!("{}_{}", resource.class(), n);
                    if !self.used_ids.contains(&candidate) {
                        break candidate;
                    }
                    n += 1;
                }
            }
        };
        self.used_ids.insert(id.clone());
        id
    }
}

// --- reading -------------------------------------------------------------

fn decode_value(
    value: &Value,
    ext: &HashMap<String, Variant>,
    subs: &HashMap<String, Resource>,
) -> Result<Variant, FormatError> {
    Ok(match value {
        Value::Nil => Variant::Nil,
        Value::Bool(v) => Variant::Bool(*v),
        Value::Int(v) => Variant::Int(*v),
        Value::Float(v) => Variant::Float(*v),
        Value::String(v) => Variant::String(v.clone()),
        Value::Bytes(v) => Variant::Bytes(v.clone()),
        Value::Array(items) => Variant::Array(
            items
                .iter()
                .map(|v| decode_value(v, ext, subs))
                .collect::<Result<_, _>>()?,
        ),
        Value::Dictionary(map) => {
            let mut out = BTreeMap::new();
            for (key, v) in map {
                out.insert(key.clone(), decode_value(v, ext, subs)?);
            }
            Variant::Dictionary(out)
        }
        Value::ExtResource(id) => ext.get(id).cloned().ok_or_else(|| FormatError::UnknownReference {
            kind: "external",
            id: id.clone(),
        })?,
        Value::SubResource(id) => subs
            .get(id)
            .cloned()
            .map(Variant::Object)
            .ok_or_else(|| FormatError::UnknownReference {
                kind: "sub-resource",
                id: id.clone(),
            })?,
    })
}

/// Registered classes get their declared defaults; unknown classes load as
/// plain resources carrying the class name
fn instantiate(ctx: &LoadContext<'_>, class: &str) -> ResourceResult<Resource> {
    if ctx.class_db().class_exists(class) {
        ctx.instantiate(class)
    } else {
        log::debug!("{}: class {} is not registered", ctx.path(), class);
        Ok(Resource::new(class))
    }
}

/// Staged load of a document: parse, one stage per external resource, one
/// per sub-resource, then the main resource
pub struct DocumentLoad {
    encoding: Encoding,
    doc: Option<ResourceDocument>,
    ext: HashMap<String, Variant>,
    subs: HashMap<String, Resource>,
    stage: usize,
}

impl DocumentLoad {
    pub fn new(encoding: Encoding) -> Self {
        Self {
            encoding,
            doc: None,
            ext: HashMap::new(),
            subs: HashMap::new(),
            stage: 0,
        }
    }

    fn apply(&self, ctx: &LoadContext<'_>, resource: &Resource, properties: &BTreeMap<String, Value>) -> ResourceResult<()> {
        for (name, value) in properties {
            let value = decode_value(value, &self.ext, &self.subs).map_err(|e| e.at(ctx.path()))?;
            resource.set_silent(name, value);
        }
        Ok(())
    }
}

impl InteractiveLoad for DocumentLoad {
    fn poll(&mut self, ctx: &mut LoadContext<'_>) -> ResourceResult<LoadStep> {
        let Some(doc) = self.doc.as_ref() else {
            let data = ctx.read_all()?;
            let (doc, _) = self.encoding.decode(&data).map_err(|e| e.at(ctx.path()))?;
            log::trace!(
                "{}: {} external, {} embedded",
                ctx.path(),
                doc.ext_resources.len(),
                doc.sub_resources.len()
            );
            self.doc = Some(doc);
            self.stage = 1;
            return Ok(LoadStep::Pending);
        };

        let index = self.stage - 1;
        let ext_count = doc.ext_resources.len();
        let sub_count = doc.sub_resources.len();

        if index < ext_count {
            let entry = doc.ext_resources[index].clone();
            let path = resolve(ctx.path(), &entry.path);
            let value = ctx
                .load_dependency(path, &entry.type_name)?
                .map(Variant::Object)
                .unwrap_or(Variant::Nil);
            self.ext.insert(entry.id, value);
        } else if index < ext_count + sub_count {
            let entry = doc.sub_resources[index - ext_count].clone();
            let resource = match ctx.cached_subresource(&entry.id) {
                Some(cached) => cached,
                None => {
                    let resource = instantiate(ctx, &entry.class)?;
                    self.apply(ctx, &resource, &entry.properties)?;
                    ctx.publish_subresource(&resource, &entry.id);
                    resource
                }
            };
            self.subs.insert(entry.id, resource);
        } else {
            let class = doc.class.clone();
            let properties = doc.properties.clone();
            let uid = doc.uid.as_deref().and_then(ResourceUid::parse);
            let resource = instantiate(ctx, &class)?;
            self.apply(ctx, &resource, &properties)?;
            resource.set_uid(uid);
            return Ok(LoadStep::Ready(resource));
        }

        self.stage += 1;
        Ok(LoadStep::Pending)
    }

    fn stage(&self) -> usize {
        self.stage
    }

    fn stage_count(&self) -> usize {
        match &self.doc {
            Some(doc) => doc.ext_resources.len() + doc.sub_resources.len() + 2,
            None => 1,
        }
    }
}

// --- handler helpers ------------------------------------------------------

/// Read and decode the document at `path`
pub fn read_document(fs: &dyn FileSystem, path: &ResourcePath, encoding: Encoding) -> ResourceResult<(ResourceDocument, bool)> {
    let data = fs.read_all(path)?;
    encoding.decode(&data).map_err(|e| e.at(path))
}

/// Dependencies of the document at `path`
pub fn dependencies(fs: &dyn FileSystem, path: &ResourcePath, encoding: Encoding, add_types: bool) -> ResourceResult<Vec<String>> {
    let (doc, _) = read_document(fs, path, encoding)?;
    Ok(doc
        .dependency_paths(path)
        .into_iter()
        .map(|(dep, type_name)| {
            if add_types {
                format!("{}::{}", dep, type_name)
            } else {
                dep.to_string()
            }
        })
        .collect())
}

/// Rewrite external references of the document at `path`
///
/// Keys of `renames` match either the stored or the resolved path. The file
/// keeps its encoding and compression.
pub fn rename_dependencies(
    fs: &dyn FileSystem,
    path: &ResourcePath,
    encoding: Encoding,
    renames: &BTreeMap<String, String>,
) -> ResourceResult<()> {
    let (mut doc, compressed) = read_document(fs, path, encoding)?;
    let mut changed = 0;
    for entry in &mut doc.ext_resources {
        let resolved = resolve(path, &entry.path).to_string();
        if let Some(target) = renames.get(&resolved).or_else(|| renames.get(&entry.path)) {
            log::debug!("{}: {} -> {}", path, entry.path, target);
            entry.path = target.clone();
            changed += 1;
        }
    }
    if changed == 0 {
        return Ok(());
    }
    let data = encoding.encode(&doc, compressed).map_err(|e| e.at(path))?;
    fs.write_all(path, &data)
}

/// Class stored in the header of the document at `path`
pub fn resource_type(fs: &dyn FileSystem, path: &ResourcePath, encoding: Encoding) -> Option<String> {
    match read_document(fs, path, encoding) {
        Ok((doc, _)) => Some(doc.class),
        Err(err) => {
            log::debug!("No type for {}: {}", path, err);
            None
        }
    }
}

/// UID stored in the header of the document at `path`
pub fn resource_uid(fs: &dyn FileSystem, path: &ResourcePath, encoding: Encoding) -> Option<ResourceUid> {
    let (doc, _) = read_document(fs, path, encoding).ok()?;
    doc.uid.as_deref().and_then(ResourceUid::parse)
}

/// Encode `resource` and write it to `path`
pub fn save(
    fs: &dyn FileSystem,
    path: &ResourcePath,
    resource: &Resource,
    flags: SaveFlags,
    encoding: Encoding,
) -> ResourceResult<()> {
    let doc = ResourceDocument::from_resource(path, resource, flags).map_err(|e| match e {
        FormatError::Cycle(class) => ResourceError::Invalid(format!("cannot save {}: resource cycle through {}", path, class)),
        other => other.at(path),
    })?;
    let data = encoding
        .encode(&doc, flags.contains(SaveFlags::COMPRESS))
        .map_err(|e| e.at(path))?;
    fs.write_all(path, &data)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Resource {
        let shared = Resource::new("Gradient");
        shared.set("stops", vec![Variant::Float(0.0), Variant::Float(1.0)]);
        let material = Resource::new("Material");
        material.set("gradient", shared.clone());
        material.set("tint", shared);
        material.set("name", "steel");
        material
    }

    #[test]
    fn test_shared_subresource_written_once() {
        let path = ResourcePath::new("res://mat.tres");
        let doc = ResourceDocument::from_resource(&path, &sample(), SaveFlags::NONE).unwrap();
        assert_eq!(doc.sub_resources.len(), 1);
        assert_eq!(doc.sub_resources[0].id, "Gradient_1");
        assert_eq!(doc.properties["gradient"], Value::SubResource("Gradient_1".into()));
        assert_eq!(doc.properties["tint"], Value::SubResource("Gradient_1".into()));
    }

    #[test]
    fn test_external_reference_relative() {
        let texture = Resource::new("Texture");
        let cache = void_resource::ResourceCache::new();
        texture.set_path(&cache, "res://textures/wood.png", false).unwrap();
        let material = Resource::new("Material");
        material.set("albedo", texture.clone());
        material.set("detail", texture);

        let path = ResourcePath::new("res://materials/wood.tres");
        let flags = SaveFlags::NONE.with(SaveFlags::RELATIVE_PATHS);
        let doc = ResourceDocument::from_resource(&path, &material, flags).unwrap();
        assert_eq!(doc.ext_resources.len(), 1);
        assert_eq!(doc.ext_resources[0].path, "../textures/wood.png");
        assert_eq!(
            doc.dependency_paths(&path),
            vec![(ResourcePath::new("res://textures/wood.png"), "Texture")]
        );

        let bundled = ResourceDocument::from_resource(&path, &material, SaveFlags::NONE.with(SaveFlags::BUNDLE_RESOURCES)).unwrap();
        assert!(bundled.ext_resources.is_empty());
        assert_eq!(bundled.sub_resources.len(), 1);
    }

    #[test]
    fn test_cycle_is_rejected() {
        let a = Resource::new("Node");
        let b = Resource::new("Node");
        a.set("next", b.clone());
        b.set("next", a.clone());
        let result = ResourceDocument::from_resource(&ResourcePath::new("res://a.tres"), &a, SaveFlags::NONE);
        assert!(matches!(result, Err(FormatError::Cycle(_))));
    }

    #[test]
    fn test_binary_header() {
        let path = ResourcePath::new("res://mat.res");
        let doc = ResourceDocument::from_resource(&path, &sample(), SaveFlags::NONE).unwrap();

        for compress in [false, true] {
            let data = Encoding::Binary.encode(&doc, compress).unwrap();
            assert_eq!(&data[..4], b"VRES");
            let (decoded, compressed) = Encoding::Binary.decode(&data).unwrap();
            assert_eq!(decoded, doc);
            assert_eq!(compressed, compress);
        }
        assert!(matches!(Encoding::Binary.decode(b"nope"), Err(FormatError::BadHeader)));
    }

    #[test]
    fn test_unsupported_version() {
        let text = br#"{"format": 99, "class": "Resource", "uid": null}"#;
        assert!(matches!(
            Encoding::Text.decode(text),
            Err(FormatError::UnsupportedVersion(99))
        ));
    }
}
