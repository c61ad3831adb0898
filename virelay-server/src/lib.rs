//! # Virelay Server
//!
//! Staff-portal media service: uploads are packaged into HLS renditions and
//! encrypted stream fragments are served on demand through a file-locked,
//! content-addressed stream cache.

/// Route organization
pub mod routes;

/// Application state shared across handlers
pub mod state;

/// Error types and handling
pub mod errors;

/// Stream serving through the cache
pub mod stream_handlers;

/// Upload packaging endpoints
pub mod transcode_handlers;

/// FFmpeg-backed HLS packaging
pub mod transcode;
