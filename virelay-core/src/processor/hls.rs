use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use super::{ProcessorError, StreamBlock, StreamProcessor};
use crate::cache::{CacheMetadata, StreamSpec, TRANSCODED_FOLDER};
use crate::storage::{OpenFlags, StorageBackend, StorageFile};

/// Replays one packaged HLS rendition element from the transcoded source
/// area, in blocks sized to the cache entry's buffer.
///
/// The source lives at `{transcoded}/{usr_id}/{upld_req_id}/{detail}`,
/// where the transcode pipeline placed it when the upload was packaged.
/// The input is opened lazily on the first producer step so construction
/// stays synchronous for the registry.
pub struct HlsReplayProcessor {
    storage: Arc<dyn StorageBackend>,
    source: PathBuf,
    block_capacity: usize,
    file: Option<Box<dyn StorageFile>>,
    done: bool,
}

impl HlsReplayProcessor {
    pub fn new(
        storage: Arc<dyn StorageBackend>,
        metadata: &CacheMetadata,
        spec: &StreamSpec,
        block_capacity: usize,
    ) -> Self {
        let source = PathBuf::from(TRANSCODED_FOLDER)
            .join(metadata.usr_id.to_string())
            .join(metadata.upld_req_id.to_string())
            .join(&spec.detail_element);
        Self { storage, source, block_capacity, file: None, done: false }
    }

    async fn input(&mut self) -> Result<&mut Box<dyn StorageFile>, ProcessorError> {
        let file = match self.file.take() {
            Some(file) => file,
            None => {
                debug!(source = %self.source.display(), "opening hls replay source");
                self.storage
                    .open(&self.source, OpenFlags::read_only())
                    .await
                    .map_err(|err| {
                        ProcessorError(format!(
                            "hls source {}: {err}",
                            self.source.display()
                        ))
                    })?
            }
        };
        Ok(self.file.insert(file))
    }
}

#[async_trait]
impl StreamProcessor for HlsReplayProcessor {
    async fn process(&mut self) -> Result<StreamBlock, ProcessorError> {
        if self.done {
            return Ok(StreamBlock::terminal());
        }
        let capacity = self.block_capacity;
        let file = self.input().await?;
        let mut buf = vec![0u8; capacity];
        let n = file
            .read(&mut buf)
            .await
            .map_err(|err| ProcessorError(format!("hls source read: {err}")))?;
        buf.truncate(n);
        let is_final = n < capacity;
        if is_final {
            self.done = true;
        }
        Ok(StreamBlock::new(buf, is_final))
    }

    async fn deinit(&mut self) {
        if let Some(file) = self.file.take() {
            if let Err(err) = file.close().await {
                debug!("closing hls replay source: {err}");
            }
        }
    }
}

impl std::fmt::Debug for HlsReplayProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HlsReplayProcessor")
            .field("source", &self.source)
            .field("block_capacity", &self.block_capacity)
            .field("done", &self.done)
            .finish_non_exhaustive()
    }
}
