//! Class registry for resources
//!
//! Loaders instantiate resources by class name and the dispatcher checks
//! type hints with "is-a" queries. Classes form a single-inheritance tree
//! rooted at [`ROOT_CLASS`]; each class can declare default properties that
//! [`ClassDb::instantiate`] applies along its ancestry, root first.

use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::resource::{PropertyUsage, Resource};
use crate::variant::Variant;

/// Root of the resource class tree
pub const ROOT_CLASS: &str = "Resource";

/// A declared property with its default value
#[derive(Clone, Debug, PartialEq)]
pub struct PropertyInfo {
    pub name: String,
    pub default: Variant,
    pub usage: PropertyUsage,
}

impl PropertyInfo {
    /// Stored, editable property
    pub fn new(name: impl Into<String>, default: impl Into<Variant>) -> Self {
        Self {
            name: name.into(),
            default: default.into(),
            usage: PropertyUsage::DEFAULT,
        }
    }

    /// Override usage flags
    pub fn with_usage(mut self, usage: PropertyUsage) -> Self {
        self.usage = usage;
        self
    }
}

/// Information about a registered class
#[derive(Clone, Debug)]
pub struct ClassInfo {
    /// Class name
    pub name: String,
    /// Parent class name (`None` only for the root)
    pub parent: Option<String>,
    /// Declared properties
    pub properties: Vec<PropertyInfo>,
}

impl ClassInfo {
    /// Create a class deriving from `parent`
    pub fn new(name: impl Into<String>, parent: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            parent: Some(parent.into()),
            properties: Vec::new(),
        }
    }

    /// Add a property
    pub fn with_property(mut self, property: PropertyInfo) -> Self {
        self.properties.push(property);
        self
    }
}

/// Registry of resource classes
pub struct ClassDb {
    classes: RwLock<BTreeMap<String, ClassInfo>>,
}

impl ClassDb {
    /// Create a registry containing only the root class
    pub fn new() -> Self {
        let mut classes = BTreeMap::new();
        classes.insert(
            ROOT_CLASS.to_string(),
            ClassInfo {
                name: ROOT_CLASS.to_string(),
                parent: None,
                properties: Vec::new(),
            },
        );
        Self {
            classes: RwLock::new(classes),
        }
    }

    /// Register (or replace) a class
    pub fn register(&self, info: ClassInfo) -> &Self {
        log::debug!("Registered resource class {}", info.name);
        self.classes.write().insert(info.name.clone(), info);
        self
    }

    /// Check if a class is registered
    pub fn class_exists(&self, name: &str) -> bool {
        self.classes.read().contains_key(name)
    }

    /// Get class info
    pub fn get(&self, name: &str) -> Option<ClassInfo> {
        self.classes.read().get(name).cloned()
    }

    /// Parent class name
    pub fn parent_of(&self, name: &str) -> Option<String> {
        self.classes.read().get(name).and_then(|c| c.parent.clone())
    }

    /// Check whether `class` is `ancestor` or derives from it
    ///
    /// Unregistered classes are only related to themselves.
    pub fn is_parent_class(&self, class: &str, ancestor: &str) -> bool {
        if class == ancestor {
            return true;
        }
        let classes = self.classes.read();
        let mut current = classes.get(class).and_then(|c| c.parent.as_deref());
        // Bounded by the number of classes in case of a malformed parent chain
        for _ in 0..classes.len() {
            match current {
                Some(name) if name == ancestor => return true,
                Some(name) => current = classes.get(name).and_then(|c| c.parent.as_deref()),
                None => return false,
            }
        }
        false
    }

    /// Every registered class deriving from `ancestor` (inclusive)
    pub fn inheriters_of(&self, ancestor: &str) -> Vec<String> {
        let names: Vec<String> = self.classes.read().keys().cloned().collect();
        names
            .into_iter()
            .filter(|name| self.is_parent_class(name, ancestor))
            .collect()
    }

    /// Create a resource of `name` with every declared default applied
    pub fn instantiate(&self, name: &str) -> Option<Resource> {
        let chain = {
            let classes = self.classes.read();
            let mut chain = Vec::new();
            let mut current = classes.get(name);
            while let Some(info) = current {
                if chain.len() > classes.len() {
                    break;
                }
                chain.push(info.clone());
                current = info.parent.as_deref().and_then(|p| classes.get(p));
            }
            chain
        };
        if chain.is_empty() {
            return None;
        }

        let resource = Resource::new(name);
        for info in chain.iter().rev() {
            for prop in &info.properties {
                resource.define(&prop.name, prop.default.clone(), prop.usage);
            }
        }
        Some(resource)
    }
}

impl Default for ClassDb {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ClassDb {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClassDb")
            .field("classes", &self.classes.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> ClassDb {
        let db = ClassDb::new();
        db.register(ClassInfo::new("Texture", ROOT_CLASS).with_property(PropertyInfo::new("width", 0)));
        db.register(
            ClassInfo::new("ImageTexture", "Texture").with_property(PropertyInfo::new("format", "rgba8")),
        );
        db
    }

    #[test]
    fn test_is_parent_class() {
        let db = db();
        assert!(db.is_parent_class("ImageTexture", "Texture"));
        assert!(db.is_parent_class("ImageTexture", ROOT_CLASS));
        assert!(db.is_parent_class("Texture", "Texture"));
        assert!(!db.is_parent_class("Texture", "ImageTexture"));
        assert!(!db.is_parent_class("Unknown", ROOT_CLASS));
    }

    #[test]
    fn test_instantiate_applies_defaults() {
        let db = db();
        let r = db.instantiate("ImageTexture").unwrap();
        assert_eq!(r.class(), "ImageTexture");
        assert_eq!(r.get("width"), Some(Variant::Int(0)));
        assert_eq!(r.get("format"), Some(Variant::from("rgba8")));
        assert!(db.instantiate("Nope").is_none());
    }

    #[test]
    fn test_inheriters_of() {
        let db = db();
        let mut names = db.inheriters_of("Texture");
        names.sort();
        assert_eq!(names, vec!["ImageTexture".to_string(), "Texture".to_string()]);
    }
}
