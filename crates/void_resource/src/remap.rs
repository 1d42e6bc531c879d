//! Path canonicalization
//!
//! Turns a user-supplied path into the path that actually gets opened.
//! Three tables apply in order on every pass: path aliases, the import table
//! (source asset to baked artifact) and the translation table (per-locale
//! variants). Passes repeat until the path stops changing.
//!
//! The tables live behind an `Arc` that is swapped whole on every update. A
//! load snapshots the `Arc` once, so a concurrent reload never tears it.
//!
//! On-disk formats:
//!
//! ```toml
//! # translation table
//! [translations]
//! "res://msg.txt" = ["res://msg.en.txt:en", "res://msg.fr.txt:fr", "res://msg.any.txt"]
//!
//! # import table
//! [import]
//! "res://icon.png" = "res://.import/icon.png.res"
//!
//! # side-car, e.g. res://icon.png.import
//! [remap]
//! path = "res://.import/icon.png.res"
//! ```

use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Deserialize;

use crate::error::{ResourceError, ResourceResult};
use crate::io::FileSystem;
use crate::path::ResourcePath;

/// Extension of import side-car files
pub const IMPORT_SIDECAR_EXTENSION: &str = "import";

/// Upper bound on remap passes
const MAX_REMAP_PASSES: usize = 16;

/// A locale-specific variant of a path
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TranslationEntry {
    /// Locale, or empty for the default variant
    pub locale: String,
    /// Path of the variant
    pub path: ResourcePath,
}

impl TranslationEntry {
    /// Create an entry
    pub fn new(locale: impl Into<String>, path: impl Into<ResourcePath>) -> Self {
        Self {
            locale: locale.into(),
            path: path.into(),
        }
    }
}

/// Source path to locale variants
pub type TranslationTable = BTreeMap<ResourcePath, Vec<TranslationEntry>>;

/// Source asset to baked artifact
pub type ImportTable = BTreeMap<ResourcePath, ResourcePath>;

/// The three remap tables
#[derive(Clone, Debug, Default)]
pub struct RemapTables {
    pub aliases: BTreeMap<ResourcePath, ResourcePath>,
    pub import: ImportTable,
    pub translation: TranslationTable,
}

impl RemapTables {
    /// Canonicalize `path` for `locale`
    ///
    /// Returns the canonical path and whether a translation remap applied.
    /// A remap cycle leaves the path unchanged.
    pub fn remap(&self, path: &ResourcePath, locale: Option<&str>) -> (ResourcePath, bool) {
        let mut current = path.clone();
        let mut translated = false;
        let mut seen = HashSet::new();
        seen.insert(current.clone());

        for _ in 0..MAX_REMAP_PASSES {
            let (next, was_translated) = self.remap_once(&current, locale);
            if next == current {
                return (current, translated);
            }
            if !seen.insert(next.clone()) {
                log::warn!("Remap cycle through {}; using the path as given", next);
                return (path.clone(), false);
            }
            translated |= was_translated;
            current = next;
        }

        log::warn!("Remapping {} did not settle; using the path as given", path);
        (path.clone(), false)
    }

    fn remap_once(&self, path: &ResourcePath, locale: Option<&str>) -> (ResourcePath, bool) {
        let mut current = self.aliases.get(path).cloned().unwrap_or_else(|| path.clone());
        if let Some(artifact) = self.import.get(&current) {
            current = artifact.clone();
        }
        if let Some(entries) = self.translation.get(&current) {
            if let Some(variant) = pick_translation(entries, locale) {
                return (variant.clone(), true);
            }
        }
        (current, false)
    }

    /// Check if any table has entries
    pub fn is_empty(&self) -> bool {
        self.aliases.is_empty() && self.import.is_empty() && self.translation.is_empty()
    }
}

/// Language part of a locale (`fr_CA` -> `fr`)
fn language(locale: &str) -> &str {
    locale.split(|c| c == '_' || c == '-').next().unwrap_or(locale)
}

/// Choose the best variant for `locale`: exact match, then language-only
/// match, then the default (empty-locale) entry
pub fn pick_translation<'a>(entries: &'a [TranslationEntry], locale: Option<&str>) -> Option<&'a ResourcePath> {
    if let Some(locale) = locale.filter(|l| !l.is_empty()) {
        if let Some(entry) = entries.iter().find(|e| e.locale.eq_ignore_ascii_case(locale)) {
            return Some(&entry.path);
        }
        let lang = language(locale);
        if let Some(entry) = entries
            .iter()
            .find(|e| !e.locale.is_empty() && language(&e.locale).eq_ignore_ascii_case(lang))
        {
            return Some(&entry.path);
        }
    }
    entries.iter().find(|e| e.locale.is_empty()).map(|e| &e.path)
}

/// Holder of the live tables
pub struct PathRemapper {
    tables: RwLock<Arc<RemapTables>>,
}

impl PathRemapper {
    /// Create with the given tables
    pub fn new(tables: RemapTables) -> Self {
        Self {
            tables: RwLock::new(Arc::new(tables)),
        }
    }

    /// Snapshot of the current tables
    pub fn tables(&self) -> Arc<RemapTables> {
        self.tables.read().clone()
    }

    /// Canonicalize against the current tables
    pub fn remap(&self, path: &ResourcePath, locale: Option<&str>) -> (ResourcePath, bool) {
        self.tables().remap(path, locale)
    }

    fn update(&self, f: impl FnOnce(&mut RemapTables)) {
        let mut guard = self.tables.write();
        let mut next = RemapTables::clone(&guard);
        f(&mut next);
        *guard = Arc::new(next);
    }

    /// Replace the translation table
    pub fn set_translation_remaps(&self, table: TranslationTable) {
        log::debug!("Installed {} translation remap(s)", table.len());
        self.update(|t| t.translation = table);
    }

    /// Drop every translation remap
    pub fn clear_translation_remaps(&self) {
        self.update(|t| t.translation.clear());
    }

    /// Replace the import table
    pub fn set_import_remaps(&self, table: ImportTable) {
        log::debug!("Installed {} import remap(s)", table.len());
        self.update(|t| t.import = table);
    }

    /// Replace the alias table
    pub fn set_path_aliases(&self, aliases: BTreeMap<ResourcePath, ResourcePath>) {
        self.update(|t| t.aliases = aliases);
    }

    /// Add one alias
    pub fn add_path_alias(&self, alias: impl Into<ResourcePath>, target: impl Into<ResourcePath>) {
        let (alias, target) = (alias.into(), target.into());
        self.update(|t| {
            t.aliases.insert(alias, target);
        });
    }
}

impl Default for PathRemapper {
    fn default() -> Self {
        Self::new(RemapTables::default())
    }
}

#[derive(Debug, Deserialize, Default)]
struct TranslationToml {
    #[serde(default)]
    translations: BTreeMap<String, Vec<String>>,
}

#[derive(Debug, Deserialize, Default)]
struct ImportToml {
    #[serde(default)]
    import: BTreeMap<String, String>,
}

#[derive(Debug, Deserialize)]
struct SidecarRemapToml {
    path: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SidecarToml {
    remap: Option<SidecarRemapToml>,
}

/// Split a `"path:locale"` entry; entries without a locale are defaults
fn parse_translation_entry(entry: &str) -> TranslationEntry {
    match entry.rsplit_once(':') {
        Some((path, locale)) if !locale.contains('/') && !path.is_empty() => {
            TranslationEntry::new(locale.trim(), path)
        }
        _ => TranslationEntry::new("", entry),
    }
}

/// Parse a translation table document
pub fn parse_translation_table(source: &ResourcePath, text: &str) -> ResourceResult<TranslationTable> {
    let raw: TranslationToml =
        toml::from_str(text).map_err(|e| ResourceError::parse(source.as_str(), e.to_string()))?;
    Ok(raw
        .translations
        .into_iter()
        .map(|(path, entries)| {
            let entries = entries.iter().map(|e| parse_translation_entry(e)).collect();
            (ResourcePath::new(path), entries)
        })
        .collect())
}

/// Parse an import table document
pub fn parse_import_table(source: &ResourcePath, text: &str) -> ResourceResult<ImportTable> {
    let raw: ImportToml = toml::from_str(text).map_err(|e| ResourceError::parse(source.as_str(), e.to_string()))?;
    Ok(raw
        .import
        .into_iter()
        .map(|(from, to)| (ResourcePath::new(from), ResourcePath::new(to)))
        .collect())
}

/// Parse one `*.import` side-car; returns `(source asset, artifact)`
pub fn parse_import_sidecar(sidecar: &ResourcePath, text: &str) -> ResourceResult<Option<(ResourcePath, ResourcePath)>> {
    let raw: SidecarToml = toml::from_str(text).map_err(|e| ResourceError::parse(sidecar.as_str(), e.to_string()))?;
    let Some(target) = raw.remap.and_then(|r| r.path) else {
        return Ok(None);
    };
    let source = sidecar
        .as_str()
        .strip_suffix(&format!(".{}", IMPORT_SIDECAR_EXTENSION))
        .map(ResourcePath::new)
        .ok_or_else(|| ResourceError::Invalid(format!("{} is not an import side-car", sidecar)))?;
    Ok(Some((source, ResourcePath::new(target))))
}

/// Read a translation table through `fs`
pub fn load_translation_table(fs: &dyn FileSystem, path: &ResourcePath) -> ResourceResult<TranslationTable> {
    let text = fs.read_string(path)?;
    parse_translation_table(path, &text)
}

/// Read an import table through `fs`
pub fn load_import_table(fs: &dyn FileSystem, path: &ResourcePath) -> ResourceResult<ImportTable> {
    let text = fs.read_string(path)?;
    parse_import_table(path, &text)
}

/// Build an import table from every side-car below `root`
///
/// Malformed side-cars are skipped with a warning.
pub fn scan_import_sidecars(fs: &dyn FileSystem, root: &ResourcePath) -> ResourceResult<ImportTable> {
    let mut table = ImportTable::new();
    for file in fs.walk(root)? {
        if file.extension().as_deref() != Some(IMPORT_SIDECAR_EXTENSION) {
            continue;
        }
        let parsed = fs.read_string(&file).and_then(|text| parse_import_sidecar(&file, &text));
        match parsed {
            Ok(Some((source, artifact))) => {
                table.insert(source, artifact);
            }
            Ok(None) => {}
            Err(err) => log::warn!("Skipping import side-car: {}", err),
        }
    }
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::MemoryFileSystem;

    fn msg_tables() -> RemapTables {
        let mut tables = RemapTables::default();
        tables.translation.insert(
            ResourcePath::new("res://msg"),
            vec![
                TranslationEntry::new("en", "res://msg.en"),
                TranslationEntry::new("fr", "res://msg.fr"),
                TranslationEntry::new("pt_BR", "res://msg.pt_br"),
                TranslationEntry::new("", "res://msg.default"),
            ],
        );
        tables
    }

    #[test]
    fn test_locale_fallback() {
        let tables = msg_tables();
        let p = ResourcePath::new("res://msg");

        assert_eq!(tables.remap(&p, Some("fr")), (ResourcePath::new("res://msg.fr"), true));
        // Language-only match
        assert_eq!(tables.remap(&p, Some("fr_CA")).0.as_str(), "res://msg.fr");
        assert_eq!(tables.remap(&p, Some("pt")).0.as_str(), "res://msg.pt_br");
        // Default entry
        assert_eq!(tables.remap(&p, Some("de")).0.as_str(), "res://msg.default");
        assert_eq!(tables.remap(&p, None).0.as_str(), "res://msg.default");
    }

    #[test]
    fn test_no_match_keeps_original() {
        let mut tables = RemapTables::default();
        tables.translation.insert(
            ResourcePath::new("res://msg"),
            vec![TranslationEntry::new("fr", "res://msg.fr")],
        );
        let p = ResourcePath::new("res://msg");
        assert_eq!(tables.remap(&p, Some("de")), (p.clone(), false));
    }

    #[test]
    fn test_alias_import_translation_chain() {
        let mut tables = RemapTables::default();
        tables.aliases.insert("res://old.png".into(), "res://icon.png".into());
        tables.import.insert("res://icon.png".into(), "res://.import/icon.res".into());
        tables.translation.insert(
            "res://.import/icon.res".into(),
            vec![TranslationEntry::new("fr", "res://.import/icon.fr.res")],
        );

        let (out, translated) = tables.remap(&ResourcePath::new("res://old.png"), Some("fr"));
        assert_eq!(out.as_str(), "res://.import/icon.fr.res");
        assert!(translated);
    }

    #[test]
    fn test_remap_idempotent() {
        let mut tables = msg_tables();
        tables.import.insert("res://a".into(), "res://msg".into());
        for input in ["res://a", "res://msg", "res://msg.fr", "res://other"] {
            let once = tables.remap(&ResourcePath::new(input), Some("fr")).0;
            let twice = tables.remap(&once, Some("fr")).0;
            assert_eq!(once, twice, "input {}", input);
        }
    }

    #[test]
    fn test_remap_cycle_keeps_path() {
        let mut tables = RemapTables::default();
        tables.aliases.insert("res://a".into(), "res://b".into());
        tables.aliases.insert("res://b".into(), "res://a".into());
        let p = ResourcePath::new("res://a");
        assert_eq!(tables.remap(&p, None), (p.clone(), false));
    }

    #[test]
    fn test_parse_translation_table() {
        let text = r#"
[translations]
"res://msg" = ["res://msg.en:en", "res://msg.fr:fr", "res://msg.any"]
"#;
        let table = parse_translation_table(&ResourcePath::new("res://t.toml"), text).unwrap();
        let entries = &table[&ResourcePath::new("res://msg")];
        assert_eq!(entries[0], TranslationEntry::new("en", "res://msg.en"));
        assert_eq!(entries[1], TranslationEntry::new("fr", "res://msg.fr"));
        assert_eq!(entries[2], TranslationEntry::new("", "res://msg.any"));
    }

    #[test]
    fn test_parse_errors_are_parse_errors() {
        let err = parse_import_table(&ResourcePath::new("res://i.toml"), "[import\n").unwrap_err();
        assert!(matches!(err, ResourceError::ParseError { ref path, .. } if path == "res://i.toml"));
    }

    #[test]
    fn test_scan_import_sidecars() {
        let fs = MemoryFileSystem::new();
        fs.insert("res://art/icon.png", b"png".to_vec());
        fs.insert(
            "res://art/icon.png.import",
            b"[remap]\npath = \"res://.import/icon.res\"\n".to_vec(),
        );
        fs.insert("res://art/broken.png.import", b"[remap\n".to_vec());

        let table = scan_import_sidecars(&fs, &ResourcePath::new("res://")).unwrap();
        assert_eq!(table.len(), 1);
        assert_eq!(
            table.get(&ResourcePath::new("res://art/icon.png")),
            Some(&ResourcePath::new("res://.import/icon.res"))
        );
    }

    #[test]
    fn test_remapper_swap() {
        let remapper = PathRemapper::default();
        let before = remapper.tables();
        remapper.set_translation_remaps(msg_tables().translation);
        // An old snapshot is unaffected by the swap
        assert!(before.translation.is_empty());
        assert_eq!(
            remapper.remap(&ResourcePath::new("res://msg"), Some("en")).0.as_str(),
            "res://msg.en"
        );
        remapper.clear_translation_remaps();
        assert!(!remapper.remap(&ResourcePath::new("res://msg"), Some("en")).1);
    }
}
