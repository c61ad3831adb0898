//! Pluggable asynchronous storage operations.
//!
//! The stream cache consumes this interface and never reaches for process
//! global state: the resolved backend is passed into
//! [`crate::cache::StreamCache`] explicitly, and tests swap in decorated
//! backends to inject failures.

mod localfs;

pub use localfs::LocalFsStorage;

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageError;

/// How a file should be opened.
///
/// The shipped combinations mirror the flag sets the cache actually uses:
/// a non-creating read-only probe, a `O_WRONLY | O_CREAT` artifact open with
/// mode `0600`, and a truncating rewrite for the metadata sidecar.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpenFlags {
    pub read: bool,
    pub write: bool,
    pub create: bool,
    pub truncate: bool,
    /// Unix permission bits applied when the open creates the file.
    pub mode: u32,
}

impl OpenFlags {
    /// Read-only, non-creating.
    pub fn read_only() -> Self {
        Self { read: true, write: false, create: false, truncate: false, mode: 0 }
    }

    /// Write-only, created `0600` if absent, existing bytes kept.
    pub fn write_create() -> Self {
        Self { read: false, write: true, create: true, truncate: false, mode: 0o600 }
    }

    /// Write-only, created `0600` if absent, truncated otherwise.
    pub fn write_truncate() -> Self {
        Self { read: false, write: true, create: true, truncate: true, mode: 0o600 }
    }
}

/// An open storage file.
///
/// Handles own their position; the cache reads and writes strictly
/// sequentially. Dropping a handle releases any advisory lock it holds along
/// with the descriptor.
#[async_trait]
pub trait StorageFile: Send + std::fmt::Debug {
    /// Read into `buf`, filling it until it is full or the end of the file
    /// is reached. A short count therefore means end of stream.
    async fn read(&mut self, buf: &mut [u8]) -> Result<usize, StorageError>;

    /// Append `data` in full at the current position.
    async fn write_all(&mut self, data: &[u8]) -> Result<(), StorageError>;

    /// Take an exclusive advisory lock without blocking.
    ///
    /// Fails with [`StorageError::LockContended`] when another handle, in
    /// this process or any other, already holds the lock.
    async fn try_lock_exclusive(&mut self) -> Result<(), StorageError>;

    /// Release a previously taken advisory lock.
    async fn unlock(&mut self) -> Result<(), StorageError>;

    /// Flush and close the handle.
    async fn close(self: Box<Self>) -> Result<(), StorageError>;
}

/// Asynchronous filesystem-like operations rooted at a backend-defined base.
///
/// All paths are relative to that base. Every operation yields to the
/// runtime; none blocks the executor.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Create a single directory level.
    ///
    /// With `allow_exists`, an already-present directory is not an error.
    async fn mkdir(&self, path: &Path, allow_exists: bool) -> Result<(), StorageError>;

    /// Open `path` according to `flags`.
    async fn open(
        &self,
        path: &Path,
        flags: OpenFlags,
    ) -> Result<Box<dyn StorageFile>, StorageError>;
}
