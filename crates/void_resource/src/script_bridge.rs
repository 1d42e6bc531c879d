//! Scripted handler bridge
//!
//! Lets scripts implement loaders and savers. A script instance that
//! inherits `ResourceFormatLoader` (or `ResourceFormatSaver`) is wrapped in a
//! [`ScriptedLoader`] (or [`ScriptedSaver`]) and registered like any native
//! handler; dispatch does not distinguish the two.
//!
//! Scripts implement the handler interface through these methods:
//!
//! | Method | Arguments | Returns |
//! |---|---|---|
//! | `_get_recognized_extensions` | (loader) none, (saver) resource | array of strings |
//! | `_handles_type` | type name | bool |
//! | `_get_resource_type` | path | string, empty for unknown |
//! | `_get_dependencies` | path, add_types | array of strings |
//! | `_rename_dependencies` | path, dictionary | int error code |
//! | `_load` | path, original path, type hint, cache mode | resource or int error code |
//! | `_recognize` | resource | bool |
//! | `_save` | resource, path, flags | int error code |

use std::collections::BTreeMap;
use std::sync::Arc;

use parking_lot::Mutex;
use thiserror::Error;

use crate::cache::CacheMode;
use crate::error::{ResourceError, ResourceResult};
use crate::io::FileSystem;
use crate::loader::{single_stage, FormatLoader, InteractiveLoad};
use crate::path::ResourcePath;
use crate::resource::Resource;
use crate::saver::{FormatSaver, SaveFlags};
use crate::subsystem::ResourceSubsystem;
use crate::variant::Variant;

/// Base class scripted loaders inherit
pub const LOADER_BASE_CLASS: &str = "ResourceFormatLoader";
/// Base class scripted savers inherit
pub const SAVER_BASE_CLASS: &str = "ResourceFormatSaver";

/// Script host errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ScriptError {
    #[error("Script not found: {0}")]
    NotFound(String),

    #[error("Failed to instantiate {path}: {details}")]
    Instantiate { path: String, details: String },

    #[error("Script does not implement {0}")]
    MissingMethod(String),

    #[error("Call to {method} failed: {details}")]
    CallFailed { method: String, details: String },
}

impl From<ScriptError> for ResourceError {
    fn from(err: ScriptError) -> Self {
        ResourceError::Script(err.to_string())
    }
}

/// A live script object
pub trait ScriptInstance: Send + Sync {
    /// Class name the script declares (may be empty)
    fn class_name(&self) -> String;

    /// Check if the script's class is or derives from `class`
    fn inherits(&self, class: &str) -> bool;

    /// Check if the script defines `method`
    fn has_method(&self, method: &str) -> bool;

    /// Call `method`
    fn call(&self, method: &str, args: &[Variant]) -> Result<Variant, ScriptError>;
}

/// A class the script host exposes globally
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct GlobalClass {
    /// Class name
    pub name: String,
    /// Base class name (script or native)
    pub base: String,
    /// Script defining the class
    pub path: ResourcePath,
}

/// The scripting runtime, as far as the bridge needs it
pub trait ScriptHost: Send + Sync {
    /// Instantiate the script at `path`
    fn instantiate(&self, path: &ResourcePath) -> Result<Arc<dyn ScriptInstance>, ScriptError>;

    /// Every globally named script class
    fn global_classes(&self) -> Vec<GlobalClass>;
}

/// Error code returned by script methods for success
const OK: i64 = 0;

fn call_optional(script: &dyn ScriptInstance, method: &str, args: &[Variant]) -> Result<Option<Variant>, ScriptError> {
    if !script.has_method(method) {
        return Ok(None);
    }
    script.call(method, args).map(Some)
}

fn string_list(value: &Variant) -> Vec<String> {
    value
        .as_array()
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}

fn check_code(method: &str, value: Variant) -> ResourceResult<()> {
    match value {
        Variant::Nil => Ok(()),
        Variant::Int(OK) => Ok(()),
        Variant::Int(code) => Err(ScriptError::CallFailed {
            method: method.to_string(),
            details: format!("error code {}", code),
        }
        .into()),
        other => Err(ScriptError::CallFailed {
            method: method.to_string(),
            details: format!("expected an error code, got {}", other.type_name()),
        }
        .into()),
    }
}

fn cache_mode_code(mode: CacheMode) -> i64 {
    match mode {
        CacheMode::Ignore => 0,
        CacheMode::Reuse => 1,
        CacheMode::Replace => 2,
    }
}

/// Script instance adapted to [`FormatLoader`]
pub struct ScriptedLoader {
    script: Arc<dyn ScriptInstance>,
    name: String,
}

impl ScriptedLoader {
    /// Wrap `script`, which must inherit `ResourceFormatLoader`
    pub fn new(script: Arc<dyn ScriptInstance>, script_path: &ResourcePath) -> ResourceResult<Self> {
        if !script.inherits(LOADER_BASE_CLASS) {
            return Err(ResourceError::Invalid(format!(
                "{} does not inherit {}",
                script_path, LOADER_BASE_CLASS
            )));
        }
        let class = script.class_name();
        let name = if class.is_empty() { script_path.to_string() } else { class };
        Ok(Self { script, name })
    }
}

impl FormatLoader for ScriptedLoader {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognized_extensions(&self) -> Vec<String> {
        match call_optional(self.script.as_ref(), "_get_recognized_extensions", &[]) {
            Ok(Some(value)) => string_list(&value),
            Ok(None) => Vec::new(),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                Vec::new()
            }
        }
    }

    fn handles_type(&self, type_name: &str) -> bool {
        match call_optional(self.script.as_ref(), "_handles_type", &[type_name.into()]) {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                false
            }
        }
    }

    fn resource_type(&self, _fs: &dyn FileSystem, path: &ResourcePath) -> Option<String> {
        match call_optional(self.script.as_ref(), "_get_resource_type", &[path.as_str().into()]) {
            Ok(value) => value
                .and_then(|v| v.as_str().map(str::to_string))
                .filter(|t| !t.is_empty()),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                None
            }
        }
    }

    fn dependencies(&self, _fs: &dyn FileSystem, path: &ResourcePath, add_types: bool) -> ResourceResult<Vec<String>> {
        let value = call_optional(
            self.script.as_ref(),
            "_get_dependencies",
            &[path.as_str().into(), add_types.into()],
        )?;
        Ok(value.map(|v| string_list(&v)).unwrap_or_default())
    }

    fn rename_dependencies(
        &self,
        _fs: &dyn FileSystem,
        path: &ResourcePath,
        renames: &BTreeMap<String, String>,
    ) -> ResourceResult<()> {
        let map = renames
            .iter()
            .map(|(from, to)| (from.clone(), Variant::from(to.as_str())))
            .collect();
        match call_optional(
            self.script.as_ref(),
            "_rename_dependencies",
            &[path.as_str().into(), Variant::Dictionary(map)],
        )? {
            Some(code) => check_code("_rename_dependencies", code),
            None => Err(ScriptError::MissingMethod("_rename_dependencies".into()).into()),
        }
    }

    fn load_interactive(
        &self,
        _path: &ResourcePath,
        _original_path: &ResourcePath,
        _type_hint: Option<&str>,
    ) -> ResourceResult<Box<dyn InteractiveLoad>> {
        if !self.script.has_method("_load") {
            return Err(ScriptError::MissingMethod("_load".into()).into());
        }
        let script = self.script.clone();
        Ok(single_stage(move |ctx| {
            let args = [
                ctx.path().as_str().into(),
                ctx.original_path().as_str().into(),
                ctx.type_hint().unwrap_or("").into(),
                Variant::Int(cache_mode_code(ctx.cache_mode())),
            ];
            match script.call("_load", &args)? {
                Variant::Object(resource) => Ok(resource),
                Variant::Int(code) => Err(ScriptError::CallFailed {
                    method: "_load".into(),
                    details: format!("error code {} loading {}", code, ctx.path()),
                }
                .into()),
                other => Err(ResourceError::parse(
                    ctx.path().as_str(),
                    format!("_load returned {} instead of a resource", other.type_name()),
                )),
            }
        }))
    }
}

/// Script instance adapted to [`FormatSaver`]
pub struct ScriptedSaver {
    script: Arc<dyn ScriptInstance>,
    name: String,
}

impl ScriptedSaver {
    /// Wrap `script`, which must inherit `ResourceFormatSaver`
    pub fn new(script: Arc<dyn ScriptInstance>, script_path: &ResourcePath) -> ResourceResult<Self> {
        if !script.inherits(SAVER_BASE_CLASS) {
            return Err(ResourceError::Invalid(format!(
                "{} does not inherit {}",
                script_path, SAVER_BASE_CLASS
            )));
        }
        let class = script.class_name();
        let name = if class.is_empty() { script_path.to_string() } else { class };
        Ok(Self { script, name })
    }
}

impl FormatSaver for ScriptedSaver {
    fn name(&self) -> &str {
        &self.name
    }

    fn recognize(&self, resource: &Resource) -> bool {
        match call_optional(self.script.as_ref(), "_recognize", &[resource.clone().into()]) {
            Ok(value) => value.and_then(|v| v.as_bool()).unwrap_or(false),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                false
            }
        }
    }

    fn recognized_extensions(&self, resource: &Resource) -> Vec<String> {
        match call_optional(self.script.as_ref(), "_get_recognized_extensions", &[resource.clone().into()]) {
            Ok(value) => value.map(|v| string_list(&v)).unwrap_or_default(),
            Err(err) => {
                log::warn!("{}: {}", self.name, err);
                Vec::new()
            }
        }
    }

    fn save(&self, _fs: &dyn FileSystem, path: &ResourcePath, resource: &Resource, flags: SaveFlags) -> ResourceResult<()> {
        let args = [
            resource.clone().into(),
            path.as_str().into(),
            Variant::Int(i64::from(flags.bits())),
        ];
        match call_optional(self.script.as_ref(), "_save", &args)? {
            Some(code) => check_code("_save", code),
            None => Err(ScriptError::MissingMethod("_save".into()).into()),
        }
    }
}

/// Installs and removes scripted handlers on a subsystem
pub struct ScriptedHandlerBridge {
    host: Arc<dyn ScriptHost>,
    subsystem: ResourceSubsystem,
    loaders: Mutex<BTreeMap<ResourcePath, Arc<dyn FormatLoader>>>,
    savers: Mutex<BTreeMap<ResourcePath, Arc<dyn FormatSaver>>>,
}

impl ScriptedHandlerBridge {
    /// Create a bridge installing into `subsystem`
    pub fn new(host: Arc<dyn ScriptHost>, subsystem: ResourceSubsystem) -> Self {
        Self {
            host,
            subsystem,
            loaders: Mutex::new(BTreeMap::new()),
            savers: Mutex::new(BTreeMap::new()),
        }
    }

    /// Instantiate the loader script at `script_path` and register it
    pub fn add_scripted_loader(&self, script_path: impl Into<ResourcePath>, at_front: bool) -> ResourceResult<()> {
        let script_path = script_path.into();
        if self.loaders.lock().contains_key(&script_path) {
            return Err(ResourceError::Invalid(format!("loader {} is already installed", script_path)));
        }
        let script = self.host.instantiate(&script_path)?;
        let loader: Arc<dyn FormatLoader> = Arc::new(ScriptedLoader::new(script, &script_path)?);
        self.subsystem.add_loader(loader.clone(), at_front);
        self.loaders.lock().insert(script_path.clone(), loader);
        log::info!("Installed scripted loader {}", script_path);
        Ok(())
    }

    /// Unregister the loader installed from `script_path`
    pub fn remove_scripted_loader(&self, script_path: impl Into<ResourcePath>) -> bool {
        let script_path = script_path.into();
        let removed = self.loaders.lock().remove(&script_path);
        match removed {
            Some(loader) => {
                self.subsystem.remove_loader(&loader);
                log::info!("Removed scripted loader {}", script_path);
                true
            }
            None => false,
        }
    }

    /// Instantiate the saver script at `script_path` and register it
    pub fn add_scripted_saver(&self, script_path: impl Into<ResourcePath>, at_front: bool) -> ResourceResult<()> {
        let script_path = script_path.into();
        if self.savers.lock().contains_key(&script_path) {
            return Err(ResourceError::Invalid(format!("saver {} is already installed", script_path)));
        }
        let script = self.host.instantiate(&script_path)?;
        let saver: Arc<dyn FormatSaver> = Arc::new(ScriptedSaver::new(script, &script_path)?);
        self.subsystem.add_saver(saver.clone(), at_front);
        self.savers.lock().insert(script_path.clone(), saver);
        log::info!("Installed scripted saver {}", script_path);
        Ok(())
    }

    /// Unregister the saver installed from `script_path`
    pub fn remove_scripted_saver(&self, script_path: impl Into<ResourcePath>) -> bool {
        let script_path = script_path.into();
        let removed = self.savers.lock().remove(&script_path);
        match removed {
            Some(saver) => {
                self.subsystem.remove_saver(&saver);
                log::info!("Removed scripted saver {}", script_path);
                true
            }
            None => false,
        }
    }

    /// Install every global class deriving from the loader or saver base
    /// class; returns how many were installed
    pub fn add_custom_handlers(&self) -> usize {
        let classes = self.host.global_classes();
        let bases: BTreeMap<&str, &str> = classes.iter().map(|c| (c.name.as_str(), c.base.as_str())).collect();
        let mut installed = 0;

        for class in &classes {
            let result = if derives_from(&bases, &class.name, LOADER_BASE_CLASS) {
                self.add_scripted_loader(class.path.clone(), false)
            } else if derives_from(&bases, &class.name, SAVER_BASE_CLASS) {
                self.add_scripted_saver(class.path.clone(), false)
            } else {
                continue;
            };
            match result {
                Ok(()) => installed += 1,
                Err(err) => log::warn!("Could not install handler class {}: {}", class.name, err),
            }
        }
        installed
    }

    /// Remove every handler this bridge installed
    pub fn remove_custom_handlers(&self) {
        let loaders: Vec<ResourcePath> = self.loaders.lock().keys().cloned().collect();
        for path in loaders {
            self.remove_scripted_loader(path);
        }
        let savers: Vec<ResourcePath> = self.savers.lock().keys().cloned().collect();
        for path in savers {
            self.remove_scripted_saver(path);
        }
    }

    /// Paths of installed loader scripts
    pub fn installed_loaders(&self) -> Vec<ResourcePath> {
        self.loaders.lock().keys().cloned().collect()
    }

    /// Paths of installed saver scripts
    pub fn installed_savers(&self) -> Vec<ResourcePath> {
        self.savers.lock().keys().cloned().collect()
    }
}

/// Walk the global class chain of `class` looking for `base`
fn derives_from(bases: &BTreeMap<&str, &str>, class: &str, base: &str) -> bool {
    let mut current = class;
    for _ in 0..=bases.len() {
        match bases.get(current) {
            Some(parent) if *parent == base => return true,
            Some(parent) => current = parent,
            None => return false,
        }
    }
    false
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derives_from() {
        let bases: BTreeMap<&str, &str> = [
            ("JsonLoader", LOADER_BASE_CLASS),
            ("FancyJsonLoader", "JsonLoader"),
            ("Player", "Node"),
        ]
        .into_iter()
        .collect();
        assert!(derives_from(&bases, "JsonLoader", LOADER_BASE_CLASS));
        assert!(derives_from(&bases, "FancyJsonLoader", LOADER_BASE_CLASS));
        assert!(!derives_from(&bases, "Player", LOADER_BASE_CLASS));
        assert!(!derives_from(&bases, "Unknown", LOADER_BASE_CLASS));
    }

    #[test]
    fn test_check_code() {
        assert!(check_code("_save", Variant::Int(0)).is_ok());
        assert!(check_code("_save", Variant::Nil).is_ok());
        assert!(matches!(check_code("_save", Variant::Int(7)), Err(ResourceError::Script(_))));
        assert!(matches!(check_code("_save", Variant::from("x")), Err(ResourceError::Script(_))));
    }
}
