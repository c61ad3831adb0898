//! Per-entry metadata sidecar.
//!
//! A small JSON document next to each cached artifact directory recording
//! which processor produced the entry and the identifiers it was produced
//! for. It is written by the upload/transcode pipeline before any artifact
//! bytes exist; cache admission reads it on a miss to pick the processor
//! variant. Its absence on a pre-existing directory means a corrupted or
//! partial prior run.

use std::path::Path;

use serde::{Deserialize, Serialize};

use super::METADATA_FILENAME;
use crate::error::MetadataError;
use crate::storage::{OpenFlags, StorageBackend};

/// The persisted sidecar fields.
///
/// Unknown fields in the file are ignored; missing ones reject.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheMetadata {
    pub processor_kind: String,
    pub usr_id: u32,
    pub upld_req_id: u32,
    pub crypto_key_id: String,
}

/// Identifies the upload a cache entry was produced from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaOrigin {
    pub usr_id: u32,
    pub upld_req_id: u32,
    pub crypto_key_id: String,
}

/// Serialize the sidecar into `target_dir`, overwriting any previous one.
///
/// The transcode pipeline calls this before producing artifact bytes, which
/// is what lets admission treat a missing sidecar as corruption.
pub async fn save_metadata(
    storage: &dyn StorageBackend,
    target_dir: &Path,
    processor_kind: &str,
    origin: &MediaOrigin,
) -> Result<(), MetadataError> {
    let metadata = CacheMetadata {
        processor_kind: processor_kind.to_owned(),
        usr_id: origin.usr_id,
        upld_req_id: origin.upld_req_id,
        crypto_key_id: origin.crypto_key_id.clone(),
    };
    let bytes = serde_json::to_vec(&metadata)
        .map_err(|err| MetadataError::Invalid(err.to_string()))?;
    let path = target_dir.join(METADATA_FILENAME);
    let mut file = storage.open(&path, OpenFlags::write_truncate()).await?;
    file.write_all(&bytes).await?;
    file.close().await?;
    Ok(())
}

/// Parse and validate the sidecar in `target_dir`.
pub async fn load_metadata(
    storage: &dyn StorageBackend,
    target_dir: &Path,
) -> Result<CacheMetadata, MetadataError> {
    let path = target_dir.join(METADATA_FILENAME);
    let mut file = match storage.open(&path, OpenFlags::read_only()).await {
        Ok(file) => file,
        Err(err) if err.is_not_found() => return Err(MetadataError::Missing(path)),
        Err(err) => return Err(err.into()),
    };
    let mut contents = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = file.read(&mut chunk).await?;
        contents.extend_from_slice(&chunk[..n]);
        if n < chunk.len() {
            break;
        }
    }
    file.close().await?;
    serde_json::from_slice(&contents).map_err(|err| MetadataError::Invalid(err.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    use tempfile::TempDir;

    use crate::storage::LocalFsStorage;

    fn origin() -> MediaOrigin {
        MediaOrigin {
            usr_id: 246,
            upld_req_id: 0xe2ac_ce55,
            crypto_key_id: "its_key_id".to_owned(),
        }
    }

    #[tokio::test]
    async fn round_trips_through_storage() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());

        save_metadata(&storage, Path::new(""), "hls", &origin())
            .await
            .expect("save");
        let loaded = load_metadata(&storage, Path::new("")).await.expect("load");

        assert_eq!(loaded.processor_kind, "hls");
        assert_eq!(loaded.usr_id, 246);
        assert_eq!(loaded.upld_req_id, 3_802_124_373);
        assert_eq!(loaded.crypto_key_id, "its_key_id");
    }

    #[tokio::test]
    async fn save_overwrites_previous_sidecar() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());

        save_metadata(&storage, Path::new(""), "hls", &origin()).await.unwrap();
        let mut second = origin();
        second.crypto_key_id = "rotated".to_owned();
        save_metadata(&storage, Path::new(""), "hls", &second).await.unwrap();

        let loaded = load_metadata(&storage, Path::new("")).await.unwrap();
        assert_eq!(loaded.crypto_key_id, "rotated");
    }

    #[tokio::test]
    async fn missing_sidecar_is_its_own_error() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());

        let err = load_metadata(&storage, Path::new("")).await.unwrap_err();
        assert!(matches!(err, MetadataError::Missing(_)));
    }

    #[tokio::test]
    async fn unknown_fields_are_ignored() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        std::fs::write(
            dir.path().join(METADATA_FILENAME),
            br#"{"processor_kind":"hls","usr_id":246,"upld_req_id":3802124373,"crypto_key_id":"its_key_id","extra":"stuff"}"#,
        )
        .unwrap();

        let loaded = load_metadata(&storage, Path::new("")).await.expect("load");
        assert_eq!(loaded.processor_kind, "hls");
    }

    #[tokio::test]
    async fn missing_required_field_rejects() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        std::fs::write(
            dir.path().join(METADATA_FILENAME),
            br#"{"processor_kind":"hls","usr_id":246}"#,
        )
        .unwrap();

        let err = load_metadata(&storage, Path::new("")).await.unwrap_err();
        assert!(matches!(err, MetadataError::Invalid(_)));
    }

    #[tokio::test]
    async fn garbage_sidecar_rejects() {
        let dir = TempDir::new().unwrap();
        let storage = LocalFsStorage::new(dir.path());
        std::fs::write(dir.path().join(METADATA_FILENAME), b"not json at all").unwrap();

        let err = load_metadata(&storage, Path::new("")).await.unwrap_err();
        assert!(matches!(err, MetadataError::Invalid(_)));
    }
}
