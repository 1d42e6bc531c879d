//! Resource paths
//!
//! A [`ResourcePath`] is the single interior path type of the subsystem. It is
//! an immutable, cheaply clonable string with an origin prefix:
//!
//! - `res://...` - relative to the project root
//! - `user://...` - relative to the per-user data directory
//! - anything else - an absolute filesystem path
//!
//! Paths are simplified on construction (`.` and `..` segments folded,
//! duplicate separators removed, backslashes normalized), so two spellings of
//! the same file compare equal and hash to the same cache slot.

use std::fmt;
use std::sync::Arc;

/// Project-root prefix
pub const PROJECT_PREFIX: &str = "res://";
/// User-data prefix
pub const USER_PREFIX: &str = "user://";

/// Where a path is rooted
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum PathOrigin {
    /// `res://`
    Project,
    /// `user://`
    User,
    /// Plain filesystem path
    Absolute,
}

/// Canonical resource path
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourcePath(Arc<str>);

impl ResourcePath {
    /// Create a path, simplifying it
    pub fn new(path: impl AsRef<str>) -> Self {
        Self(Arc::from(simplify(path.as_ref())))
    }

    /// The empty path (an unpublished resource)
    pub fn empty() -> Self {
        Self(Arc::from(""))
    }

    /// Check if empty
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Get the path as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Get the origin of this path
    pub fn origin(&self) -> PathOrigin {
        if self.0.starts_with(PROJECT_PREFIX) {
            PathOrigin::Project
        } else if self.0.starts_with(USER_PREFIX) {
            PathOrigin::User
        } else {
            PathOrigin::Absolute
        }
    }

    /// Check if rooted at the project
    pub fn is_project_path(&self) -> bool {
        self.origin() == PathOrigin::Project
    }

    /// Path without its origin prefix
    pub fn relative(&self) -> &str {
        match self.origin() {
            PathOrigin::Project => &self.0[PROJECT_PREFIX.len()..],
            PathOrigin::User => &self.0[USER_PREFIX.len()..],
            PathOrigin::Absolute => &self.0,
        }
    }

    /// Last path segment
    pub fn file_name(&self) -> &str {
        let rel = self.relative();
        rel.rsplit('/').next().unwrap_or(rel)
    }

    /// Lowercase extension of the leaf, if any
    pub fn extension(&self) -> Option<String> {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => None,
            Some(idx) => Some(name[idx + 1..].to_lowercase()),
        }
    }

    /// Leaf name without extension
    pub fn stem(&self) -> &str {
        let name = self.file_name();
        match name.rfind('.') {
            Some(0) | None => name,
            Some(idx) => &name[..idx],
        }
    }

    /// Directory containing this path, keeping the origin prefix
    pub fn base_dir(&self) -> ResourcePath {
        let prefix_len = self.0.len() - self.relative().len();
        let rel = self.relative();
        match rel.rfind('/') {
            Some(idx) => Self(Arc::from(format!("{}{}", &self.0[..prefix_len], &rel[..idx]))),
            None => Self(Arc::from(&self.0[..prefix_len])),
        }
    }

    /// Join a relative segment onto this path (treated as a directory)
    ///
    /// If `other` already carries an origin it is returned as-is.
    pub fn join(&self, other: &str) -> ResourcePath {
        if has_origin(other) || self.is_empty() {
            return ResourcePath::new(other);
        }
        let base = self.as_str();
        if base.ends_with('/') {
            ResourcePath::new(format!("{}{}", base, other))
        } else {
            ResourcePath::new(format!("{}/{}", base, other))
        }
    }

    /// Path with the extension replaced
    pub fn with_extension(&self, ext: &str) -> ResourcePath {
        let name = self.file_name();
        let cut = match name.rfind('.') {
            Some(0) | None => self.0.len(),
            Some(idx) => self.0.len() - name.len() + idx,
        };
        ResourcePath::new(format!("{}.{}", &self.0[..cut], ext))
    }

    /// Express `self` relative to the directory `dir`, if both share an origin
    pub fn relative_to(&self, dir: &ResourcePath) -> Option<String> {
        if self.origin() != dir.origin() {
            return None;
        }
        let from: Vec<&str> = dir.relative().split('/').filter(|s| !s.is_empty()).collect();
        let to: Vec<&str> = self.relative().split('/').filter(|s| !s.is_empty()).collect();
        let common = from.iter().zip(to.iter()).take_while(|(a, b)| a == b).count();

        let mut parts: Vec<&str> = Vec::new();
        for _ in common..from.len() {
            parts.push("..");
        }
        parts.extend(&to[common..]);
        Some(parts.join("/"))
    }
}

impl Default for ResourcePath {
    fn default() -> Self {
        Self::empty()
    }
}

impl fmt::Debug for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", &*self.0)
    }
}

impl fmt::Display for ResourcePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ResourcePath {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<&str> for ResourcePath {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for ResourcePath {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<&String> for ResourcePath {
    fn from(s: &String) -> Self {
        Self::new(s)
    }
}

impl From<&ResourcePath> for ResourcePath {
    fn from(p: &ResourcePath) -> Self {
        p.clone()
    }
}

fn has_origin(path: &str) -> bool {
    path.starts_with(PROJECT_PREFIX) || path.starts_with(USER_PREFIX) || path.starts_with('/')
        || is_drive_path(path)
}

fn is_drive_path(path: &str) -> bool {
    let bytes = path.as_bytes();
    bytes.len() >= 3 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':' && bytes[2] == b'/'
}

/// Fold `.`/`..` segments and duplicate separators
fn simplify(raw: &str) -> String {
    let normalized = raw.trim().replace('\\', "/");
    if normalized.is_empty() {
        return normalized;
    }

    let (prefix, rest) = if let Some(rest) = normalized.strip_prefix(PROJECT_PREFIX) {
        (PROJECT_PREFIX, rest)
    } else if let Some(rest) = normalized.strip_prefix(USER_PREFIX) {
        (USER_PREFIX, rest)
    } else if let Some(rest) = normalized.strip_prefix('/') {
        ("/", rest)
    } else if is_drive_path(&normalized) {
        let (drive, rest) = normalized.split_at(3);
        return format!("{}{}", drive, fold_segments(rest, true));
    } else {
        ("", normalized.as_str())
    };

    format!("{}{}", prefix, fold_segments(rest, !prefix.is_empty()))
}

fn fold_segments(rest: &str, rooted: bool) -> String {
    let mut out: Vec<&str> = Vec::new();
    for segment in rest.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                if matches!(out.last(), Some(last) if *last != "..") {
                    out.pop();
                } else if !rooted {
                    out.push("..");
                }
            }
            s => out.push(s),
        }
    }
    out.join("/")
}
