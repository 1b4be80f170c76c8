//! Error types for PFB decoding.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur while reading a PFB file.
#[derive(Error, Debug)]
pub enum PfbError {
    /// The file contents do not match the PFB layout.
    #[error("invalid PFB format: {0}")]
    Format(String),

    /// A caller-supplied argument was rejected before any I/O.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// A window request extends past the grid.
    #[error("window {requested} is outside grid extent {grid}")]
    OutOfRange { requested: String, grid: String },

    /// Filesystem error while opening or reading a file.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl PfbError {
    /// Create a Format error.
    pub fn format(msg: impl Into<String>) -> Self {
        Self::Format(msg.into())
    }

    /// Create an InvalidArgument error.
    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// Create an OutOfRange error.
    pub fn out_of_range(requested: impl Into<String>, grid: impl Into<String>) -> Self {
        Self::OutOfRange {
            requested: requested.into(),
            grid: grid.into(),
        }
    }

    /// Attach a path to an I/O error.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error was raised by argument validation.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(self, Self::InvalidArgument(_))
    }
}

/// Result type for PFB operations.
pub type PfbResult<T> = std::result::Result<T, PfbError>;
