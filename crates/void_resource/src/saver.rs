//! Format savers

use crate::error::ResourceResult;
use crate::io::FileSystem;
use crate::path::ResourcePath;
use crate::resource::Resource;

/// Flags accepted by savers
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SaveFlags(u32);

impl SaveFlags {
    /// Store external references relative to the saved file
    pub const RELATIVE_PATHS: u32 = 1 << 0;
    /// Embed external resources as sub-resources
    pub const BUNDLE_RESOURCES: u32 = 1 << 1;
    /// Publish the resource at the saved path
    pub const CHANGE_PATH: u32 = 1 << 2;
    /// Skip editor metadata (properties whose name starts with `__editor`)
    pub const OMIT_EDITOR_PROPERTIES: u32 = 1 << 3;
    /// Compress the payload (binary formats only)
    pub const COMPRESS: u32 = 1 << 4;

    /// No flags
    pub const NONE: SaveFlags = SaveFlags(0);

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

    /// Add a flag
    pub const fn with(self, flag: u32) -> Self {
        Self(self.0 | flag)
    }
}

/// Trait for format savers
pub trait FormatSaver: Send + Sync {
    /// Name used in diagnostics
    fn name(&self) -> &str;

    /// Check if this saver can write `resource`
    fn recognize(&self, resource: &Resource) -> bool;

    /// Extensions this saver can write `resource` as
    fn recognized_extensions(&self, resource: &Resource) -> Vec<String>;

    /// Write `resource` to `path`
    fn save(&self, fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, flags: SaveFlags) -> ResourceResult<()>;

    /// Does this saver claim `path` for `resource`?
    fn recognize_path(&self, resource: &Resource, path: &ResourcePath) -> bool {
        let Some(ext) = path.extension() else {
            return false;
        };
        self.recognized_extensions(resource)
            .iter()
            .any(|e| e.eq_ignore_ascii_case(&ext))
    }
}
