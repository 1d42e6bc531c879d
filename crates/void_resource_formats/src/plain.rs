//! Plain files: text documents and raw bytes
//!
//! These have no header, so the resource type comes from the extension.

use void_resource::{
    single_stage, FileSystem, FormatLoader, FormatSaver, InteractiveLoad, LoadContext, Resource, ResourceError,
    ResourcePath, ResourceResult, SaveFlags, Variant,
};

/// Class of resources loaded from plain text files
pub const TEXT_FILE_CLASS: &str = "TextFile";
/// Class of resources loaded from raw byte files
pub const RAW_DATA_CLASS: &str = "RawData";

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "cfg", "csv"];
const BYTES_EXTENSIONS: &[&str] = &["bin", "dat"];

fn to_strings(exts: &[&str]) -> Vec<String> {
    exts.iter().map(|e| e.to_string()).collect()
}

fn instantiate(ctx: &LoadContext<'_>, class: &str) -> ResourceResult<Resource> {
    if ctx.class_db().class_exists(class) {
        ctx.instantiate(class)
    } else {
        Ok(Resource::new(class))
    }
}

// --- text ----------------------------------------------------------------

/// Loads UTF-8 text into a `TextFile` with a `text` property
#[derive(Default)]
pub struct PlainTextLoader;

impl FormatLoader for PlainTextLoader {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn recognized_extensions(&self) -> Vec<String> {
        to_strings(TEXT_EXTENSIONS)
    }

    fn handles_type(&self, type_name: &str) -> bool {
        type_name == TEXT_FILE_CLASS
    }

    fn resource_type(&self, _fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        self.recognize_path(path, None).then(|| TEXT_FILE_CLASS.to_string())
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(single_stage(|ctx| {
            let text = ctx.read_string()?;
            let resource = instantiate(ctx, TEXT_FILE_CLASS)?;
            resource.set_silent("text", text);
            Ok(resource)
        }))
    }
}

/// Writes the `text` property of a `TextFile`
#[derive(Default)]
pub struct PlainTextSaver;

impl FormatSaver for PlainTextSaver {
    fn name(&self) -> &str {
        "plain_text"
    }

    fn recognize(&self, resource: &Resource) -> bool {
        resource.class() == TEXT_FILE_CLASS
    }

    fn recognized_extensions(&self, resource: &Resource) -> Vec<String> {
        if self.recognize(resource) {
            to_strings(TEXT_EXTENSIONS)
        } else {
            Vec::new()
        }
    }

    fn save(&self, fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, _flags: SaveFlags) -> ResourceResult<()> {
        match resource.get("text") {
            Some(Variant::String(text)) => fs.write_all(path, text.as_bytes()),
            _ => Err(ResourceError::Invalid(format!("{} has no text to save", path))),
        }
    }
}

// --- bytes ---------------------------------------------------------------

/// Loads a file verbatim into a `RawData` with a `data` property
#[derive(Default)]
pub struct BytesLoader;

impl FormatLoader for BytesLoader {
    fn name(&self) -> &str {
        "bytes"
    }

    fn recognized_extensions(&self) -> Vec<String> {
        to_strings(BYTES_EXTENSIONS)
    }

    fn handles_type(&self, type_name: &str) -> bool {
        type_name == RAW_DATA_CLASS
    }

    fn resource_type(&self, _fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        self.recognize_path(path, None).then(|| RAW_DATA_CLASS.to_string())
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        Ok(single_stage(|ctx| {
            let data = ctx.read_all()?;
            let resource = instantiate(ctx, RAW_DATA_CLASS)?;
            resource.set_silent("data", data);
            Ok(resource)
        }))
    }
}
