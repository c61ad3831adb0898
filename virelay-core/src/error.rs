use std::path::PathBuf;

use thiserror::Error;

/// Failures surfaced by a [`crate::storage::StorageBackend`].
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("advisory lock contended")]
    LockContended,

    #[error("file handle already closed")]
    Closed,
}

impl StorageError {
    /// True when the error means the target simply does not exist, which the
    /// cache treats as a miss rather than a failure.
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::NotFound(_) => true,
            Self::Io(err) => err.kind() == std::io::ErrorKind::NotFound,
            _ => false,
        }
    }

    /// True when an exclusive lock could not be taken because another holder
    /// already has it.
    pub fn is_lock_contended(&self) -> bool {
        matches!(self, Self::LockContended)
    }
}

/// Failures loading or persisting the per-entry metadata sidecar.
#[derive(Error, Debug)]
pub enum MetadataError {
    #[error("metadata sidecar missing at {}", .0.display())]
    Missing(PathBuf),

    #[error("metadata sidecar invalid: {0}")]
    Invalid(String),

    #[error(transparent)]
    Storage(#[from] StorageError),
}
