//! Stream processors and their registry.
//!
//! A processor is an opaque generator of artifact bytes for one media
//! format. The cache never knows what a processor does internally; it only
//! drives one producer step at a time and honors the final-block flag.
//! Variants are selected by the `processor_kind` string persisted in the
//! entry's metadata sidecar, through a registry of factory closures.

mod hls;

pub use hls::HlsReplayProcessor;

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

use crate::cache::{CacheMetadata, StreamSpec};
use crate::storage::StorageBackend;

/// One produced block of artifact bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamBlock {
    pub data: Vec<u8>,
    /// Set on the last block of the stream.
    pub is_final: bool,
}

impl StreamBlock {
    pub fn new(data: Vec<u8>, is_final: bool) -> Self {
        Self { data, is_final }
    }

    /// An empty terminal block.
    pub fn terminal() -> Self {
        Self { data: Vec::new(), is_final: true }
    }
}

/// A failure inside a processor step.
#[derive(Error, Debug, Clone)]
#[error("{0}")]
pub struct ProcessorError(pub String);

/// An opaque generator of artifact bytes.
#[async_trait]
pub trait StreamProcessor: Send {
    /// Drive one producer step.
    ///
    /// May complete synchronously or await internal I/O; either way exactly
    /// one block comes back per call. Blocks must never exceed the capacity
    /// the processor was constructed with.
    async fn process(&mut self) -> Result<StreamBlock, ProcessorError>;

    /// Release processor-owned resources. Called exactly once at entry
    /// teardown.
    async fn deinit(&mut self) {}
}

type ProcessorFactory = Box<
    dyn Fn(&CacheMetadata, &StreamSpec, usize) -> Result<Box<dyn StreamProcessor>, ProcessorError>
        + Send
        + Sync,
>;

/// Maps processor-kind strings to factories producing running processors.
///
/// Dispatch is a single table lookup at cache admission.
pub struct ProcessorRegistry {
    factories: HashMap<String, ProcessorFactory>,
}

impl ProcessorRegistry {
    /// A registry with no variants; callers register their own.
    pub fn empty() -> Self {
        Self { factories: HashMap::new() }
    }

    /// The stock registry: `"hls"` replays packaged HLS rendition elements
    /// out of the transcoded source area.
    pub fn with_defaults(storage: Arc<dyn StorageBackend>) -> Self {
        let mut registry = Self::empty();
        registry.register("hls", move |metadata, spec, capacity| {
            Ok(Box::new(HlsReplayProcessor::new(
                storage.clone(),
                metadata,
                spec,
                capacity,
            )))
        });
        registry
    }

    pub fn register<F>(&mut self, kind: impl Into<String>, factory: F)
    where
        F: Fn(&CacheMetadata, &StreamSpec, usize) -> Result<Box<dyn StreamProcessor>, ProcessorError>
            + Send
            + Sync
            + 'static,
    {
        self.factories.insert(kind.into(), Box::new(factory));
    }

    /// Instantiate the processor named by the metadata's kind.
    pub fn instantiate(
        &self,
        metadata: &CacheMetadata,
        spec: &StreamSpec,
        block_capacity: usize,
    ) -> Result<Box<dyn StreamProcessor>, ProcessorError> {
        let factory = self.factories.get(&metadata.processor_kind).ok_or_else(|| {
            ProcessorError(format!(
                "unknown processor kind `{}`",
                metadata.processor_kind
            ))
        })?;
        factory(metadata, spec, block_capacity)
    }
}

impl fmt::Debug for ProcessorRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProcessorRegistry")
            .field("kinds", &self.factories.keys().collect::<Vec<_>>())
            .finish()
    }
}
