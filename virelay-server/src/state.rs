use std::fmt;
use std::sync::Arc;

use virelay_config::Settings;
use virelay_core::cache::StreamCache;
use virelay_core::processor::ProcessorRegistry;
use virelay_core::storage::{LocalFsStorage, StorageBackend};

use crate::transcode::Transcoder;

#[derive(Clone)]
pub struct AppState {
    pub settings: Arc<Settings>,
    pub storage: Arc<dyn StorageBackend>,
    pub stream_cache: Arc<StreamCache>,
    pub transcoder: Arc<Transcoder>,
}

impl AppState {
    /// Wire the service graph: local-filesystem storage rooted at the
    /// configured base path, the stock processor registry, the stream
    /// cache, and the FFmpeg packager.
    pub fn from_settings(settings: Settings) -> Self {
        let storage: Arc<dyn StorageBackend> =
            Arc::new(LocalFsStorage::new(settings.storage.base_path.clone()));
        let registry = Arc::new(ProcessorRegistry::with_defaults(storage.clone()));
        let stream_cache = Arc::new(StreamCache::new(storage.clone(), registry));
        let transcoder = Arc::new(Transcoder::new(&settings.transcode));
        Self {
            settings: Arc::new(settings),
            storage,
            stream_cache,
            transcoder,
        }
    }
}

impl fmt::Debug for AppState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AppState").finish_non_exhaustive()
    }
}
