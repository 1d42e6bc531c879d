//! Process-wide subsystem
//!
//! Engines usually run a single [`ResourceSubsystem`]. Installing it here
//! makes it reachable from code that has no handle to pass around. Nothing
//! else in this crate depends on the global.

use parking_lot::RwLock;

use crate::error::{ResourceError, ResourceResult};
use crate::path::ResourcePath;
use crate::resource::Resource;
use crate::saver::SaveFlags;
use crate::subsystem::ResourceSubsystem;

static GLOBAL: RwLock<Option<ResourceSubsystem>> = RwLock::new(None);

/// Install `subsystem` as the process-wide instance, returning the previous one
pub fn install(subsystem: ResourceSubsystem) -> Option<ResourceSubsystem> {
    GLOBAL.write().replace(subsystem)
}

/// Remove the process-wide instance
pub fn uninstall() -> Option<ResourceSubsystem> {
    GLOBAL.write().take()
}

/// The process-wide instance, if installed
pub fn get() -> Option<ResourceSubsystem> {
    GLOBAL.read().clone()
}

fn installed() -> ResourceResult<ResourceSubsystem> {
    get().ok_or_else(|| ResourceError::Invalid("no resource subsystem installed".into()))
}

/// Load through the process-wide instance
pub fn load(path: impl Into<ResourcePath>, type_hint: Option<&str>) -> ResourceResult<Resource> {
    installed()?.load(path, type_hint, false)
}

/// Save through the process-wide instance
pub fn save(path: impl Into<ResourcePath>, resource: &Resource, flags: SaveFlags) -> ResourceResult<()> {
    installed()?.save(path, resource, flags)
}

/// Existence check through the process-wide instance
pub fn exists(path: impl Into<ResourcePath>, type_hint: Option<&str>) -> bool {
    get().map(|s| s.exists(path, type_hint)).unwrap_or(false)
}
