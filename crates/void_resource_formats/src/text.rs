//! Text resource format (`.tres`)
//!
//! Human-readable JSON documents. Suited to version control; no compression.

use std::collections::BTreeMap;

use void_resource::{
    FileSystem, FormatLoader, FormatSaver, InteractiveLoad, Resource, ResourceError, ResourcePath, ResourceResult,
    ResourceUid, SaveFlags,
};

use crate::document::{self, DocumentLoad, Encoding};

/// Extension of text resource files
pub const TEXT_EXTENSION: &str = "tres";

/// Loads `.tres` documents of any class
#[derive(Default)]
pub struct TextResourceLoader;

impl FormatLoader for TextResourceLoader {
    fn name(&self) -> &str {
        "text_resource"
    }

    fn recognized_extensions(&self) -> Vec<String> {
        vec![TEXT_EXTENSION.to_string()]
    }

    fn handles_type(&self, _type_name: &str) -> bool {
        true
    }

    fn resource_type(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        if !self.recognize_path(path, None) {
            return None;
        }
        document::resource_type(fs, path, Encoding::Text)
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(Box::new(DocumentLoad::new(Encoding::Text)))
    }

    fn dependencies(&self, fs: &dyn FileSystem, path: &ResourcePath, add_types: bool) -> ResourceResult<Vec<String>> {
        document::dependencies(fs, path, Encoding::Text, add_types)
    }

    fn rename_dependencies(
        &self,
        fs: &dyn FileSystem,
        path: &ResourcePath,
        renames: &BTreeMap<String, String>,
    ) -> ResourceResult<()> {
        document::rename_dependencies(fs, path, Encoding::Text, renames)
    }

    fn resource_uid(&self, fs: &dyn FileSystem, path: &ResourcePath) -> Option<ResourceUid> {
        document::resource_uid(fs, path, Encoding::Text)
    }
}

/// Saves any resource as a `.tres` document
#[derive(Default)]
pub struct TextResourceSaver;

impl FormatSaver for TextResourceSaver {
    fn name(&self) -> &str {
        "text_resource"
    }

    fn recognize(&self, _resource: &Resource) -> bool {
        true
    }

    fn recognized_extensions(&self, _resource: &Resource) -> Vec<String> {
        vec![TEXT_EXTENSION.to_string()]
    }

    fn save(&self, fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, flags: SaveFlags) -> ResourceResult<()> {
        if flags.contains(SaveFlags::COMPRESS) {
            return Err(ResourceError::Invalid(format!(
                "text resources cannot be compressed: {}",
                path
            )));
        }
        document::save(fs, path, resource, flags, Encoding::Text)
    }
}
