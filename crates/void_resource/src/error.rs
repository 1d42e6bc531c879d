//! Error types for the resource subsystem
//!
//! Every failure the subsystem reports is a [`ResourceError`]. Errors are
//! `Clone` so one failure can be handed back to the caller and fanned out to
//! the registered observers at the same time.

use thiserror::Error;

/// Resource subsystem errors
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("No handler for '{path}'{}", hint_suffix(.hint))]
    NoHandler { path: String, hint: Option<String> },

    #[error("Cyclic dependency while loading: {0}")]
    CyclicDependency(String),

    #[error("Parse error in {path}: {details}")]
    ParseError { path: String, details: String },

    #[error("Missing dependency of {path}: {dependency} (expected type {expected_type})")]
    MissingDependency {
        path: String,
        dependency: String,
        expected_type: String,
    },

    #[error("Path already in use by a live resource: {0}")]
    PathConflict(String),

    #[error("Invalid operation: {0}")]
    Invalid(String),

    #[error("IO error on {path}: {details}")]
    Io { path: String, details: String },

    #[error("Script error: {0}")]
    Script(String),
}

fn hint_suffix(hint: &Option<String>) -> String {
    match hint {
        Some(hint) if !hint.is_empty() => format!(" (type hint '{}')", hint),
        _ => String::new(),
    }
}

/// Discriminant of a [`ResourceError`] without its payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    NotFound,
    NoHandler,
    CyclicDependency,
    ParseError,
    MissingDependency,
    PathConflict,
    Invalid,
    Io,
    Script,
}

impl ErrorKind {
    /// Stable lowercase name, used in diagnostics and error markers
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::NotFound => "not_found",
            ErrorKind::NoHandler => "no_handler",
            ErrorKind::CyclicDependency => "cyclic_dependency",
            ErrorKind::ParseError => "parse_error",
            ErrorKind::MissingDependency => "missing_dependency",
            ErrorKind::PathConflict => "path_conflict",
            ErrorKind::Invalid => "invalid",
            ErrorKind::Io => "io",
            ErrorKind::Script => "script",
        }
    }
}

impl ResourceError {
    /// Get the error kind
    pub fn kind(&self) -> ErrorKind {
        match self {
            ResourceError::NotFound(_) => ErrorKind::NotFound,
            ResourceError::NoHandler { .. } => ErrorKind::NoHandler,
            ResourceError::CyclicDependency(_) => ErrorKind::CyclicDependency,
            ResourceError::ParseError { .. } => ErrorKind::ParseError,
            ResourceError::MissingDependency { .. } => ErrorKind::MissingDependency,
            ResourceError::PathConflict(_) => ErrorKind::PathConflict,
            ResourceError::Invalid(_) => ErrorKind::Invalid,
            ResourceError::Io { .. } => ErrorKind::Io,
            ResourceError::Script(_) => ErrorKind::Script,
        }
    }

    /// Shorthand for a parse error
    pub fn parse(path: impl Into<String>, details: impl Into<String>) -> Self {
        ResourceError::ParseError {
            path: path.into(),
            details: details.into(),
        }
    }

    /// Shorthand for a missing handler
    pub fn no_handler(path: impl Into<String>, hint: Option<&str>) -> Self {
        ResourceError::NoHandler {
            path: path.into(),
            hint: hint.map(str::to_string),
        }
    }

    /// Convert an I/O error, mapping `NotFound` onto the dedicated kind
    pub fn from_io(path: impl Into<String>, err: std::io::Error) -> Self {
        let path = path.into();
        if err.kind() == std::io::ErrorKind::NotFound {
            ResourceError::NotFound(path)
        } else {
            ResourceError::Io {
                path,
                details: err.to_string(),
            }
        }
    }
}

/// Result type for resource operations
pub type ResourceResult<T> = Result<T, ResourceError>;

/// Configuration errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for '{key}': {reason}")]
    InvalidValue { key: String, reason: String },
}
