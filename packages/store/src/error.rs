//! Error types for storage operations.

use thiserror::Error;

use crate::Path;

/// Errors raised by stores and the root storage.
///
/// Read-like operations report a missing path as `Ok(None)` rather than
/// `NotFound`; the error variant exists for internal signalling and for
/// operations where absence is a genuine failure.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Path does not exist.
    #[error("path not found: {0}")]
    NotFound(Path),

    /// Reads are not permitted on this mount.
    #[error("path not readable: {0}")]
    NotReadable(Path),

    /// Writes are not permitted on this mount.
    #[error("path not writable: {0}")]
    NotWritable(Path),

    /// Mount table operation against inconsistent state.
    #[error("storage conflict: {0}")]
    Conflict(String),

    /// Malformed archive or document.
    #[error("data format error: {0}")]
    Format(String),

    /// Semantic rejection of an operation or value.
    #[error("validation error: {0}")]
    Validation(String),

    /// Underlying disk or archive failure.
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
