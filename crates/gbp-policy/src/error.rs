//! Error types for policy snapshot loading.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Result type alias for policy operations.
pub type Result<T> = std::result::Result<T, PolicyError>;

#[derive(Debug, Error)]
pub enum PolicyError {
    /// Failed to read a snapshot file.
    #[error("Failed to read policy snapshot {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// Snapshot content did not deserialize.
    #[error("Failed to parse {format} policy snapshot: {message}")]
    Parse { format: String, message: String },
}

impl PolicyError {
    pub fn io(path: impl AsRef<Path>, source: io::Error) -> Self {
        Self::Io {
            path: path.as_ref().to_path_buf(),
            source,
        }
    }

    pub fn parse(format: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Parse {
            format: format.into(),
            message: message.into(),
        }
    }
}
