//! Format errors

use thiserror::Error;
use void_resource::{ResourceError, ResourcePath};

/// Errors raised while encoding or decoding a resource document
#[derive(Debug, Error)]
pub enum FormatError {
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Binary encoding error: {0}")]
    Bincode(#[from] bincode::Error),

    #[error("Decompression failed: {0}")]
    Decompress(#[from] lz4_flex::block::DecompressError),

    #[error("Not a binary resource (bad header)")]
    BadHeader,

    #[error("Unsupported document version {0}")]
    UnsupportedVersion(u32),

    #[error("Unknown {kind} reference '{id}'")]
    UnknownReference { kind: &'static str, id: String },

    #[error("Resource cycle through {0}")]
    Cycle(String),
}

impl FormatError {
    /// Attach the file the error came from
    pub fn at(self, path: &ResourcePath) -> ResourceError {
        ResourceError::parse(path.as_str(), self.to_string())
    }
}
