//! Resource subsystem configuration
//!
//! Read from the `[resources]` section of a project settings file:
//!
//! ```toml
//! [resources]
//! locale = "fr_CA"
//! abort_on_missing_resource = false
//! timestamp_on_load = true
//! timestamp_on_save = true
//! import_remap_file = "res://.import/remaps.toml"
//! translation_remap_file = "res://translations.toml"
//! scan_import_sidecars = false
//!
//! [resources.path_aliases]
//! "res://old/player.tres" = "res://actors/player.tres"
//! ```

use std::collections::BTreeMap;
use std::path::Path;

use serde::Deserialize;

use crate::error::ConfigError;
use crate::path::ResourcePath;

/// Result type for config operations
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Default locale when none is configured
pub const DEFAULT_LOCALE: &str = "en";

/// Raw TOML structure for the resources section
#[derive(Debug, Deserialize, Default)]
struct ResourcesToml {
    locale: Option<String>,
    #[serde(default)]
    abort_on_missing_resource: bool,
    #[serde(default)]
    timestamp_on_load: bool,
    #[serde(default)]
    timestamp_on_save: bool,
    import_remap_file: Option<String>,
    translation_remap_file: Option<String>,
    #[serde(default)]
    path_aliases: BTreeMap<String, String>,
    #[serde(default)]
    scan_import_sidecars: bool,
}

/// Root TOML structure
#[derive(Debug, Deserialize, Default)]
struct SettingsToml {
    #[serde(default)]
    resources: Option<ResourcesToml>,
}

/// Validated configuration
#[derive(Clone, Debug, PartialEq)]
pub struct ResourceConfig {
    /// Active locale, e.g. `en` or `fr_CA`
    pub locale: String,
    /// Missing dependencies fail the whole load
    pub abort_on_missing_resource: bool,
    /// Record file modification time on loaded resources
    pub timestamp_on_load: bool,
    /// Record file modification time on saved resources
    pub timestamp_on_save: bool,
    /// Location of the import remap table
    pub import_remap_file: Option<ResourcePath>,
    /// Location of the translation remap table
    pub translation_remap_file: Option<ResourcePath>,
    /// Path aliases, applied before any other remap
    pub path_aliases: BTreeMap<ResourcePath, ResourcePath>,
    /// Build the import table from `*.import` side-car files
    pub scan_import_sidecars: bool,
}

impl Default for ResourceConfig {
    fn default() -> Self {
        Self {
            locale: DEFAULT_LOCALE.to_string(),
            abort_on_missing_resource: false,
            timestamp_on_load: false,
            timestamp_on_save: false,
            import_remap_file: None,
            translation_remap_file: None,
            path_aliases: BTreeMap::new(),
            scan_import_sidecars: false,
        }
    }
}

impl ResourceConfig {
    /// Parse from a TOML string; a missing `[resources]` section yields the
    /// defaults
    pub fn from_toml_str(content: &str) -> ConfigResult<Self> {
        let raw: SettingsToml = toml::from_str(content)?;
        let raw = raw.resources.unwrap_or_default();

        let locale = match raw.locale {
            Some(locale) => validate_locale(&locale)?,
            None => DEFAULT_LOCALE.to_string(),
        };

        let mut path_aliases = BTreeMap::new();
        for (alias, target) in raw.path_aliases {
            if alias.trim().is_empty() || target.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "path_aliases".into(),
                    reason: "alias and target must be non-empty".into(),
                });
            }
            path_aliases.insert(ResourcePath::new(alias), ResourcePath::new(target));
        }

        Ok(Self {
            locale,
            abort_on_missing_resource: raw.abort_on_missing_resource,
            timestamp_on_load: raw.timestamp_on_load,
            timestamp_on_save: raw.timestamp_on_save,
            import_remap_file: raw.import_remap_file.map(ResourcePath::new),
            translation_remap_file: raw.translation_remap_file.map(ResourcePath::new),
            path_aliases,
            scan_import_sidecars: raw.scan_import_sidecars,
        })
    }

    /// Load from a settings file on disk
    pub fn load(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

/// Locale identifiers are `lang` or `lang_REGION`, ASCII alphanumerics only
pub(crate) fn validate_locale(locale: &str) -> ConfigResult<String> {
    let locale = locale.trim();
    let valid = !locale.is_empty()
        && locale
            .split(|c| c == '_' || c == '-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric()));
    if valid {
        Ok(locale.replace('-', "_"))
    } else {
        Err(ConfigError::InvalidValue {
            key: "locale".into(),
            reason: format!("'{}' is not a locale identifier", locale),
        })
    }
}
