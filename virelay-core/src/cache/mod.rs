//! The on-demand encrypted stream cache.
//!
//! Sits between the media file processors and the streaming response
//! writer: a request for a `(document, detail-path)` pair is either served
//! straight from the cached artifact on disk, or produced live by the
//! processor named in the entry's metadata sidecar while every block is
//! simultaneously persisted and handed to the caller. An exclusive advisory
//! lock on the artifact file serializes concurrent producers across
//! processes.

mod entry;
mod metadata;

pub use entry::{CacheEntry, EntryMode, StreamCache, StreamSpec};
pub use metadata::{load_metadata, save_metadata, CacheMetadata, MediaOrigin};

/// Folder under the storage base holding encrypted stream artifacts.
pub const ENCRYPTED_FOLDER: &str = "encrypted";

/// Folder under the storage base holding packaged transcoder output.
pub const TRANSCODED_FOLDER: &str = "transcoded";

/// File name of the per-entry metadata sidecar.
pub const METADATA_FILENAME: &str = "metadata.json";
