//! Core library for the Virelay media service.
//!
//! The centerpiece is the [`cache::StreamCache`]: an on-demand,
//! content-addressed cache sitting between the media file processors and the
//! streaming response writer. Around it live the pluggable async
//! [`storage`] backend, the per-entry metadata sidecar store, and the
//! [`processor`] registry that turns a persisted processor kind back into a
//! running block producer.

pub mod cache;
pub mod error;
pub mod processor;
pub mod report;
pub mod storage;

pub use cache::{
    CacheEntry, CacheMetadata, EntryMode, MediaOrigin, StreamCache, StreamSpec,
    ENCRYPTED_FOLDER, METADATA_FILENAME, TRANSCODED_FOLDER,
};
pub use error::{MetadataError, StorageError};
pub use processor::{ProcessorError, ProcessorRegistry, StreamBlock, StreamProcessor};
pub use report::{CacheFailure, ErrorReport, FailureKind, Subsystem};
pub use storage::{LocalFsStorage, OpenFlags, StorageBackend, StorageFile};
