//! Binary resource format (`.res`)
//!
//! bincode payload behind a small header, optionally LZ4-compressed with
//! [`SaveFlags::COMPRESS`]. Renaming dependencies keeps the file's
//! compression.

use std::collections::BTreeMap;

use void_resource::{
    FileSystem, FormatLoader, FormatSaver, InteractiveLoad, Resource, ResourcePath, ResourceResult, ResourceUid,
    SaveFlags,
};

use crate::document::{self, DocumentLoad, Encoding};

/// Extension of binary resource files
pub const BINARY_EXTENSION: &str = "res";

/// Loads `.res` documents of any class
#[derive(Default)]
pub struct BinaryResourceLoader;

impl FormatLoader for BinaryResourceLoader {
    fn name(&self) -> &str {
        "binary_resource"
    }

    fn recognized_extensions(&self) -> Vec<String> {
        vec![BINARY_EXTENSION.to_string()]
    }

    fn handles_type(&self, _type_name: &str) -> bool {
        true
    }

    fn resource_type(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        if !self.recognize_path(path, None) {
            return None;
        }
        document::resource_type(fs, path, Encoding::Binary)
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(Box::new(DocumentLoad::new(Encoding::Binary)))
    }

    fn dependencies(&self, fs: &dyn FileSystem, path: &ResourcePath, add_types: bool) -> ResourceResult<Vec<String>> {
        document::dependencies(fs, path, Encoding::Binary, add_types)
    }

    fn rename_dependencies(
        &self,
        fs: &dyn FileSystem,
        path: &ResourcePath,
        renames: &BTreeMap<String, String>,
    ) -> ResourceResult<()> {
        document::rename_dependencies(fs, path, Encoding::Binary, renames)
    }

    fn resource_uid(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<ResourceUid> {
        document::resource_uid(fs, path, Encoding::Binary)
    }
}

/// Saves any resource as a `.res` document
#[derive(Default)]
pub struct BinaryResourceSaver;

impl FormatSaver for BinaryResourceSaver {
    fn name(&self) -> &str {
        "binary_resource"
    }

    fn recognize(&self, _resource: &Resource) -> bool {
        true
    }

    fn recognized_extensions(&self, _resource: &Resource) -> Vec<String> {
        vec![BINARY_EXTENSION.to_string()]
    }

    fn save(&self, fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, flags: SaveFlags) -> ResourceResult<()> {
        document::save(fs, path, resource, flags, Encoding::Binary)
    }
}
