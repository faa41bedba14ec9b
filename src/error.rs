// Error Module - Failure Kinds for Container and File Operations
// =======================================================
// Every failure a file task can hit maps onto one of the variants below.
// Variants that concern a specific file carry its path so the message that
// reaches the console is self-contained.

use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Convenience alias used across the library
pub type Result<T> = std::result::Result<T, CryptError>;

/// The error type for all container, cipher and file-task operations.
#[derive(Error, Debug)]
pub enum CryptError {
    /// Bad signature, truncated header, or ciphertext that is not block aligned.
    #[error("invalid container {}: {reason}", .path.display())]
    Format { path: PathBuf, reason: String },

    /// Open/read/write/stat failure on a specific path.
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// The cipher was handed an input that is not exactly one block.
    #[error("invalid block size: expected 16 bytes, got {len}")]
    BlockSize { len: usize },

    /// The cipher rejected the key material.
    #[error("invalid key length: expected 32 bytes, got {len}")]
    Key { len: usize },

    /// Wrong file extension for the requested operation.
    #[error("{} does not match the expected suffix ({expected})", .path.display())]
    Suffix { path: PathBuf, expected: String },
}

impl CryptError {
    pub fn io(path: &Path, source: io::Error) -> Self {
        CryptError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub fn format(path: &Path, reason: impl Into<String>) -> Self {
        CryptError::Format {
            path: path.to_path_buf(),
            reason: reason.into(),
        }
    }
}

/// Attach a path to a raw `io::Result`.
pub trait IoContext<T> {
    fn with_path(self, path: &Path) -> Result<T>;
}

impl<T> IoContext<T> for io::Result<T> {
    fn with_path(self, path: &Path) -> Result<T> {
        self.map_err(|e| CryptError::io(path, e))
    }
}
