//! Cache lookup & admission, the block pump, and entry teardown.

use std::any::Any;
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;

use serde::Deserialize;
use tracing::{debug, warn};

use super::metadata::load_metadata;
use crate::processor::{ProcessorRegistry, StreamBlock, StreamProcessor};
use crate::report::{CacheFailure, ErrorReport, FailureKind, Subsystem};
use crate::storage::{OpenFlags, StorageBackend, StorageFile};

/// The recognized request options for one stream-cache interaction.
///
/// `extra` carries any processor-specific fields the selected processor may
/// want to read; the cache itself never interprets them.
#[derive(Debug, Clone, Deserialize)]
pub struct StreamSpec {
    /// Directory of the cached document, relative to the storage base.
    pub doc_basepath: String,
    /// Relative file path of the requested element inside the entry.
    pub detail_element: String,
    #[serde(default)]
    pub crypto_key_id: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl StreamSpec {
    pub fn new(doc_basepath: impl Into<String>, detail_element: impl Into<String>) -> Self {
        Self {
            doc_basepath: doc_basepath.into(),
            detail_element: detail_element.into(),
            crypto_key_id: None,
            extra: serde_json::Map::new(),
        }
    }

    fn validate(&self) -> Result<(), String> {
        if self.doc_basepath.is_empty() {
            return Err("doc_basepath must not be empty".to_owned());
        }
        let detail = Path::new(&self.detail_element);
        if self.detail_element.is_empty() || detail.is_absolute() {
            return Err("detail_element must be a relative path".to_owned());
        }
        if detail
            .components()
            .any(|c| !matches!(c, Component::Normal(_)))
        {
            return Err("detail_element must not traverse outside the entry".to_owned());
        }
        Ok(())
    }
}

/// How an admitted entry serves blocks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryMode {
    /// The artifact is being produced now; blocks are teed to storage and
    /// to the caller, under an exclusive advisory lock.
    FillFromProducer,
    /// The artifact already exists; blocks are read back from storage.
    ServeFromCache,
}

/// The stream cache service.
///
/// Holds the resolved storage backend and processor registry; one instance
/// serves the whole process. Each request admits its own [`CacheEntry`].
#[derive(Clone)]
pub struct StreamCache {
    storage: Arc<dyn StorageBackend>,
    registry: Arc<ProcessorRegistry>,
}

impl StreamCache {
    pub fn new(storage: Arc<dyn StorageBackend>, registry: Arc<ProcessorRegistry>) -> Self {
        Self { storage, registry }
    }

    pub fn storage(&self) -> &Arc<dyn StorageBackend> {
        &self.storage
    }

    /// Admit one `(document, detail-path)` request.
    ///
    /// Resolves the cache key to its on-disk location, then either opens the
    /// cached artifact for reading (hit) or loads the metadata sidecar,
    /// instantiates the named processor, opens the artifact for writing
    /// under an exclusive advisory lock, and primes the first block (miss).
    /// Every failure leg routes through the same teardown before the error
    /// is returned, so no half-initialized entry ever escapes.
    pub async fn admit(
        &self,
        spec: StreamSpec,
        buf_sz: usize,
    ) -> Result<CacheEntry, CacheFailure> {
        let mut report = ErrorReport::new();
        if let Err(msg) = spec.validate() {
            report.insert(Subsystem::Storage, msg);
            return Err(CacheFailure::new(FailureKind::InvalidSpec, report));
        }

        let target = PathBuf::from(&spec.doc_basepath);
        let artifact = target.join(&spec.detail_element);

        // Parent directories of the artifact, one level at a time. The
        // entry directory itself was created at upload time.
        if let Some(parents) = Path::new(&spec.detail_element).parent() {
            let mut current = target.clone();
            for component in parents.components() {
                current.push(component);
                if let Err(err) = self.storage.mkdir(&current, true).await {
                    report.insert(
                        Subsystem::Storage,
                        format!("mkdir {}: {err}", current.display()),
                    );
                    return Err(CacheFailure::new(FailureKind::MkdirFailed, report));
                }
            }
        }

        match self.storage.open(&artifact, OpenFlags::read_only()).await {
            Ok(file) => {
                debug!(artifact = %artifact.display(), "cache hit");
                Ok(CacheEntry::new(EntryMode::ServeFromCache, spec, Some(file), buf_sz))
            }
            Err(err) if err.is_not_found() => {
                debug!(artifact = %artifact.display(), "cache miss, filling from producer");
                self.admit_miss(spec, &target, &artifact, buf_sz, report).await
            }
            Err(err) => {
                report.insert(
                    Subsystem::Storage,
                    format!("open {}: {err}", artifact.display()),
                );
                Err(CacheFailure::new(FailureKind::OpenFailed, report))
            }
        }
    }

    async fn admit_miss(
        &self,
        spec: StreamSpec,
        target: &Path,
        artifact: &Path,
        buf_sz: usize,
        mut report: ErrorReport,
    ) -> Result<CacheEntry, CacheFailure> {
        let metadata = match load_metadata(&*self.storage, target).await {
            Ok(metadata) => metadata,
            Err(err) => {
                report.insert(Subsystem::Metadata, err.to_string());
                return Err(CacheFailure::new(FailureKind::MetadataMissing, report));
            }
        };

        let processor = match self.registry.instantiate(&metadata, &spec, buf_sz) {
            Ok(processor) => processor,
            Err(err) => {
                report.insert(Subsystem::Transcoder, err.to_string());
                return Err(CacheFailure::new(FailureKind::ProcessorFailed, report));
            }
        };

        let mut entry = CacheEntry::new(EntryMode::FillFromProducer, spec, None, buf_sz);
        entry.processor = Some(processor);

        let mut file = match self.storage.open(artifact, OpenFlags::write_create()).await {
            Ok(file) => file,
            Err(err) => {
                report.insert(
                    Subsystem::Storage,
                    format!("open {}: {err}", artifact.display()),
                );
                entry.deinit().await;
                return Err(CacheFailure::new(FailureKind::OpenFailed, report));
            }
        };

        if let Err(err) = file.try_lock_exclusive().await {
            let kind = if err.is_lock_contended() {
                report.insert(
                    Subsystem::Storage,
                    "concurrent build in progress on the same artifact",
                );
                FailureKind::LockContended
            } else {
                report.insert(
                    Subsystem::Storage,
                    format!("lock {}: {err}", artifact.display()),
                );
                FailureKind::OpenFailed
            };
            if let Err(err) = file.close().await {
                warn!("closing unlockable artifact: {err}");
            }
            entry.deinit().await;
            return Err(CacheFailure::new(kind, report));
        }

        entry.file = Some(file);
        entry.locked = true;

        // Prime the first block: validates the processor pipeline end to end
        // before admission completes, and persists the block so delivered
        // and durable bytes stay identical from the start.
        match entry.produce_one().await {
            Ok(block) => {
                entry.primed = Some(block);
                Ok(entry)
            }
            Err(failure) => {
                entry.deinit().await;
                Err(failure)
            }
        }
    }
}

impl fmt::Debug for StreamCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StreamCache").finish_non_exhaustive()
    }
}

/// One active cache interaction.
///
/// Admitted by [`StreamCache::admit`]; serves zero or more [`proceed`]
/// calls, each producing one block; torn down by an explicit [`deinit`]
/// which releases the lock, closes the descriptor, and frees the processor.
/// Exactly one entry can be filling a given artifact at a time; the
/// advisory lock enforces that within and across processes.
///
/// [`proceed`]: CacheEntry::proceed
/// [`deinit`]: CacheEntry::deinit
pub struct CacheEntry {
    mode: EntryMode,
    spec: StreamSpec,
    file: Option<Box<dyn StorageFile>>,
    processor: Option<Box<dyn StreamProcessor>>,
    buffer: Vec<u8>,
    primed: Option<StreamBlock>,
    report: ErrorReport,
    locked: bool,
    finished: bool,
    user_data: Option<Box<dyn Any + Send + Sync>>,
}

impl CacheEntry {
    fn new(
        mode: EntryMode,
        spec: StreamSpec,
        file: Option<Box<dyn StorageFile>>,
        buf_sz: usize,
    ) -> Self {
        Self {
            mode,
            spec,
            file,
            processor: None,
            buffer: vec![0u8; buf_sz],
            primed: None,
            report: ErrorReport::new(),
            locked: false,
            finished: false,
            user_data: None,
        }
    }

    pub fn mode(&self) -> EntryMode {
        self.mode
    }

    pub fn spec(&self) -> &StreamSpec {
        &self.spec
    }

    /// The attached processor; present iff the entry is filling.
    pub fn processor(&self) -> Option<&dyn StreamProcessor> {
        self.processor.as_deref()
    }

    /// Errors accumulated across this entry's operations.
    pub fn errors(&self) -> &ErrorReport {
        &self.report
    }

    /// True once a final block has been delivered.
    pub fn finished(&self) -> bool {
        self.finished
    }

    /// Attach caller-owned context to the entry; the cache never looks at
    /// it.
    pub fn set_user_data(&mut self, data: Box<dyn Any + Send + Sync>) {
        self.user_data = Some(data);
    }

    pub fn user_data(&self) -> Option<&(dyn Any + Send + Sync)> {
        self.user_data.as_deref()
    }

    /// Produce exactly one block.
    ///
    /// On a hit, reads the next block of the cached artifact; a short read
    /// marks the final block. On a miss, drives one producer step and
    /// persists its output before handing it back, so the caller sees bytes
    /// in exactly the order they reach storage. Calls are strictly serial;
    /// calling again after a final block has been delivered is undefined
    /// and the caller must not do it.
    pub async fn proceed(&mut self) -> Result<StreamBlock, CacheFailure> {
        match self.mode {
            EntryMode::ServeFromCache => self.read_cached().await,
            EntryMode::FillFromProducer => {
                if let Some(block) = self.primed.take() {
                    if block.is_final {
                        self.finished = true;
                    }
                    return Ok(block);
                }
                self.produce_one().await
            }
        }
    }

    async fn read_cached(&mut self) -> Result<StreamBlock, CacheFailure> {
        let capacity = self.buffer.len();
        let Some(file) = self.file.as_mut() else {
            self.report.insert(Subsystem::Storage, "entry already torn down");
            return Err(CacheFailure::new(FailureKind::ReadFailed, self.report.clone()));
        };
        let n = match file.read(&mut self.buffer).await {
            Ok(n) => n,
            Err(err) => {
                self.report.insert(Subsystem::Storage, format!("read: {err}"));
                return Err(CacheFailure::new(FailureKind::ReadFailed, self.report.clone()));
            }
        };
        let is_final = n < capacity;
        if is_final {
            self.finished = true;
        }
        Ok(StreamBlock::new(self.buffer[..n].to_vec(), is_final))
    }

    /// One producer step plus one durable write.
    async fn produce_one(&mut self) -> Result<StreamBlock, CacheFailure> {
        let capacity = self.buffer.len();
        let Some(processor) = self.processor.as_mut() else {
            self.report.insert(Subsystem::Transcoder, "no processor attached");
            return Err(CacheFailure::new(
                FailureKind::ProcessorFailed,
                self.report.clone(),
            ));
        };

        let block = match processor.process().await {
            Ok(block) => block,
            Err(err) => {
                self.report.insert(Subsystem::Transcoder, err.to_string());
                return Err(CacheFailure::new(
                    FailureKind::ProcessorFailed,
                    self.report.clone(),
                ));
            }
        };

        if block.data.len() > capacity {
            self.report.insert(
                Subsystem::Transcoder,
                format!(
                    "produced block of {} bytes exceeds buffer capacity {capacity}",
                    block.data.len()
                ),
            );
            return Err(CacheFailure::new(
                FailureKind::ProcessorFailed,
                self.report.clone(),
            ));
        }

        let Some(file) = self.file.as_mut() else {
            self.report.insert(Subsystem::Storage, "entry already torn down");
            return Err(CacheFailure::new(FailureKind::WriteFailed, self.report.clone()));
        };
        if let Err(err) = file.write_all(&block.data).await {
            self.report.insert(Subsystem::Storage, format!("write: {err}"));
            return Err(CacheFailure::new(FailureKind::WriteFailed, self.report.clone()));
        }

        if block.is_final {
            self.finished = true;
        }
        Ok(block)
    }

    /// Tear the entry down.
    ///
    /// Releases the processor, the advisory lock, and the artifact
    /// descriptor, in that order. Safe to call from any terminal state,
    /// including mid-admission failure; repeated calls are no-ops because
    /// every resource slot is taken at most once.
    pub async fn deinit(&mut self) {
        if let Some(mut processor) = self.processor.take() {
            processor.deinit().await;
        }
        if let Some(mut file) = self.file.take() {
            if self.locked {
                if let Err(err) = file.unlock().await {
                    warn!("releasing artifact lock: {err}");
                }
                self.locked = false;
            }
            if let Err(err) = file.close().await {
                warn!("closing artifact: {err}");
            }
        }
        self.primed = None;
        self.buffer = Vec::new();
    }
}

impl fmt::Debug for CacheEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CacheEntry")
            .field("mode", &self.mode)
            .field("doc_basepath", &self.spec.doc_basepath)
            .field("detail_element", &self.spec.detail_element)
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
