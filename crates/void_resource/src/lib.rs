//! # void_resource - Resource Subsystem
//!
//! Path-addressed engine resources with:
//! - Canonical paths with alias, import and per-locale translation remapping
//! - A weak cache guaranteeing one live instance per path
//! - Pluggable loaders and savers (native or scripted), registered at runtime
//! - Interactive (staged) loading with per-path load serialization
//! - Cycle detection across nested and cross-thread loads
//! - Pluggable error and load/save notifications
//! - Hot-reload of cached resources (feature `hot-reload`)
//!
//! ## Example
//!
//! ```ignore
//! use void_resource::prelude::*;
//!
//! let fs = Arc::new(OsFileSystem::new("project", "user"));
//! let resources = ResourceSubsystem::builder(fs)
//!     .config(ResourceConfig::load("project/resources.toml")?)
//!     .build();
//! resources.add_loader(Arc::new(MyTextureLoader), false);
//! resources.initialize()?;
//!
//! // Same path, same instance, while anything holds it
//! let a = resources.load("res://textures/player.png", None, false)?;
//! let b = resources.load("res://textures/player.png", None, false)?;
//! assert!(a.ptr_eq(&b));
//!
//! // Staged loading for progress bars
//! let mut loader = resources.load_interactive("res://levels/big.tres", None)?;
//! while let LoadPoll::InProgress { stage, total } = loader.poll() {
//!     println!("{}/{}", stage, total);
//! }
//! ```

pub mod cache;
pub mod class_db;
pub mod config;
pub mod error;
pub mod global;
pub mod interactive;
pub mod io;
pub mod loader;
pub mod loading_map;
pub mod observers;
pub mod path;
pub mod registry;
pub mod remap;
pub mod resource;
pub mod saver;
pub mod script_bridge;
pub mod subsystem;
pub mod variant;

#[cfg(feature = "hot-reload")]
pub mod watcher;

pub use cache::{CacheMode, ResourceCache};
pub use class_db::{ClassDb, ClassInfo, PropertyInfo, ROOT_CLASS};
pub use config::{ResourceConfig, DEFAULT_LOCALE};
pub use error::{ConfigError, ErrorKind, ResourceError, ResourceResult};
pub use interactive::{InteractiveLoader, LoadPoll};
pub use io::{FileSystem, MemoryFileSystem, OsFileSystem, ReadSeek};
pub use loader::{single_stage, FormatLoader, InteractiveLoad, LoadContext, LoadStep};
pub use loading_map::{LoadingGuard, LoadingMap};
pub use observers::Observers;
pub use path::{PathOrigin, ResourcePath};
pub use registry::{HandlerList, LoaderRegistry, SaverRegistry};
pub use remap::{PathRemapper, RemapTables, TranslationEntry};
pub use resource::{
    OwnerId, PropertyUsage, Resource, ResourceId, ResourceOwner, ResourceUid, SceneId, WeakResource,
};
pub use saver::{FormatSaver, SaveFlags};
pub use script_bridge::{GlobalClass, ScriptError, ScriptHost, ScriptInstance, ScriptedHandlerBridge};
pub use subsystem::{ResourceSubsystem, ResourceSubsystemBuilder};
pub use variant::Variant;

#[cfg(feature = "hot-reload")]
pub use watcher::ResourceWatcher;

/// Prelude - commonly used types
pub mod prelude {
    pub use crate::cache::CacheMode;
    pub use crate::config::ResourceConfig;
    pub use crate::error::{ResourceError, ResourceResult};
    pub use crate::interactive::{InteractiveLoader, LoadPoll};
    pub use crate::io::{FileSystem, MemoryFileSystem, OsFileSystem};
    pub use crate::loader::{single_stage, FormatLoader, InteractiveLoad, LoadContext, LoadStep};
    pub use crate::path::ResourcePath;
    pub use crate::resource::{PropertyUsage, Resource, WeakResource};
    pub use crate::saver::{FormatSaver, SaveFlags};
    pub use crate::subsystem::ResourceSubsystem;
    pub use crate::variant::Variant;
    pub use std::sync::Arc;
}
