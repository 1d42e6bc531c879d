//! # void_resource_formats
//!
//! Built-in loaders and savers for the void_resource subsystem:
//!
//! - **Text resources** (`.tres`): JSON documents, readable and diffable
//! - **Binary resources** (`.res`): bincode documents with optional LZ4 compression
//! - **Plain text** (`.txt`, `.md`, `.cfg`, `.csv`) and **raw bytes** (`.bin`, `.dat`)
//!
//! Resource documents keep external references as paths and embed
//! everything else as sub-resources, loaded one stage at a time.
//!
//! ## Example
//!
//! ```ignore
//! use void_resource::prelude::*;
//!
//! let resources = ResourceSubsystem::new(Arc::new(OsFileSystem::new("project", "user")));
//! void_resource_formats::register_default_formats(&resources);
//!
//! let material = Resource::new("Material");
//! material.set("roughness", 0.4);
//! resources.save("res://materials/steel.res", &material, SaveFlags::NONE.with(SaveFlags::COMPRESS))?;
//! ```

pub mod binary;
pub mod document;
pub mod error;
pub mod plain;
pub mod text;

use std::sync::Arc;

use void_resource::{ClassDb, ClassInfo, PropertyInfo, ResourceSubsystem, ROOT_CLASS};

pub use binary::{BinaryResourceLoader, BinaryResourceSaver, BINARY_EXTENSION};
pub use document::{Encoding, ResourceDocument, Value, FORMAT_VERSION};
pub use error::FormatError;
pub use plain::{BytesLoader, PlainTextLoader, PlainTextSaver, RAW_DATA_CLASS, TEXT_FILE_CLASS};
pub use text::{TextResourceLoader, TextResourceSaver, TEXT_EXTENSION};

/// Register the classes produced by the plain loaders
pub fn register_classes(class_db: &ClassDb) {
    class_db
        .register(ClassInfo::new(TEXT_FILE_CLASS, ROOT_CLASS).with_property(PropertyInfo::new("text", "")))
        .register(ClassInfo::new(RAW_DATA_CLASS, ROOT_CLASS).with_property(PropertyInfo::new("data", Vec::<u8>::new())));
}

/// Register every built-in class, loader and saver with `resources`
pub fn register_default_formats(resources: &ResourceSubsystem) {
    register_classes(resources.class_db());

    resources.add_loader(Arc::new(TextResourceLoader), false);
    resources.add_loader(Arc::new(BinaryResourceLoader), false);
    resources.add_loader(Arc::new(PlainTextLoader), false);
    resources.add_loader(Arc::new(BytesLoader), false);

    resources.add_saver(Arc::new(TextResourceSaver), false);
    resources.add_saver(Arc::new(BinaryResourceSaver), false);
    resources.add_saver(Arc::new(PlainTextSaver), false);

    log::info!("Registered built-in resource formats");
}
