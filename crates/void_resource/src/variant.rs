//! Property values
//!
//! Resources store their serializable state as named [`Variant`] properties.
//! `Object` values reference other resources; this is how sub-resources and
//! external dependencies appear in the property graph.

use std::collections::BTreeMap;

use crate::resource::Resource;

/// A dynamically typed property value
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Variant {
    /// No value
    #[default]
    Nil,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Raw bytes
    Bytes(Vec<u8>),
    /// Array of values
    Array(Vec<Variant>),
    /// Dictionary keyed by string, ordered by key
    Dictionary(BTreeMap<String, Variant>),
    /// Reference to another resource (compared by identity)
    Object(Resource),
}

impl Variant {
    /// Check if nil
    pub fn is_nil(&self) -> bool {
        matches!(self, Variant::Nil)
    }

    /// Get as bool
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Variant::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Get as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Variant::Int(v) => Some(*v),
            Variant::Float(v) => Some(*v as i64),
            _ => None,
        }
    }

    /// Get as float
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Variant::Float(v) => Some(*v),
            Variant::Int(v) => Some(*v as f64),
            _ => None,
        }
    }

    /// Get as string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Variant::String(v) => Some(v),
            _ => None,
        }
    }

    /// Get as bytes
    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Variant::Bytes(v) => Some(v),
            _ => None,
        }
    }

    /// Get as array
    pub fn as_array(&self) -> Option<&[Variant]> {
        match self {
            Variant::Array(v) => Some(v),
            _ => None,
        }
    }

    /// Get as resource
    pub fn as_resource(&self) -> Option<&Resource> {
        match self {
            Variant::Object(r) => Some(r),
            _ => None,
        }
    }

    /// Get type name for debugging
    pub fn type_name(&self) -> &'static str {
        match self {
            Variant::Nil => "nil",
            Variant::Bool(_) => "bool",
            Variant::Int(_) => "int",
            Variant::Float(_) => "float",
            Variant::String(_) => "string",
            Variant::Bytes(_) => "bytes",
            Variant::Array(_) => "array",
            Variant::Dictionary(_) => "dictionary",
            Variant::Object(_) => "object",
        }
    }

    /// Visit every resource reachable from this value (not recursing into
    /// the resources themselves)
    pub fn for_each_resource(&self, f: &mut dyn FnMut(&Resource)) {
        match self {
            Variant::Object(r) => f(r),
            Variant::Array(items) => items.iter().for_each(|v| v.for_each_resource(f)),
            Variant::Dictionary(map) => map.values().for_each(|v| v.for_each_resource(f)),
            _ => {}
        }
    }

    /// Rebuild this value, replacing every resource through `f`
    pub fn map_resources(&self, f: &mut dyn FnMut(&Resource) -> Resource) -> Variant {
        match self {
            Variant::Object(r) => Variant::Object(f(r)),
            Variant::Array(items) => {
                Variant::Array(items.iter().map(|v| v.map_resources(f)).collect())
            }
            Variant::Dictionary(map) => Variant::Dictionary(
                map.iter().map(|(k, v)| (k.clone(), v.map_resources(f))).collect(),
            ),
            other => other.clone(),
        }
    }
}

impl From<bool> for Variant {
    fn from(v: bool) -> Self {
        Variant::Bool(v)
    }
}

impl From<i64> for Variant {
    fn from(v: i64) -> Self {
        Variant::Int(v)
    }
}

impl From<i32> for Variant {
    fn from(v: i32) -> Self {
        Variant::Int(v as i64)
    }
}

impl From<f64> for Variant {
    fn from(v: f64) -> Self {
        Variant::Float(v)
    }
}

impl From<&str> for Variant {
    fn from(v: &str) -> Self {
        Variant::String(v.to_string())
    }
}

impl From<String> for Variant {
    fn from(v: String) -> Self {
        Variant::String(v)
    }
}

impl From<Vec<u8>> for Variant {
    fn from(v: Vec<u8>) -> Self {
        Variant::Bytes(v)
    }
}

impl From<Resource> for Variant {
    fn from(v: Resource) -> Self {
        Variant::Object(v)
    }
}

impl From<Vec<Variant>> for Variant {
    fn from(v: Vec<Variant>) -> Self {
        Variant::Array(v)
    }
}
