use std::path::{Path as FsPath, PathBuf};

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;

use virelay_core::cache::{
    save_metadata, MediaOrigin, ENCRYPTED_FOLDER, TRANSCODED_FOLDER,
};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct TranscodeRequest {
    /// Absolute path of the uploaded source file.
    pub src_path: String,
    pub usr_id: u32,
    pub upld_req_id: u32,
    pub crypto_key_id: String,
}

#[derive(Debug, Serialize)]
pub struct TranscodeResponse {
    pub doc_id: String,
    pub playlist: String,
}

/// Package an upload into an HLS rendition and prepare its cache entry.
///
/// The metadata sidecar is persisted before any stream artifact can be
/// produced for this document, which is what lets cache admission treat a
/// missing sidecar as corruption.
pub async fn transcode_upload(
    State(state): State<AppState>,
    Path(doc_id): Path<String>,
    Json(request): Json<TranscodeRequest>,
) -> AppResult<Json<TranscodeResponse>> {
    if doc_id.is_empty() || doc_id.contains('/') {
        return Err(AppError::bad_request("malformed document id"));
    }

    let out_dir = state
        .settings
        .storage
        .base_path
        .join(TRANSCODED_FOLDER)
        .join(request.usr_id.to_string())
        .join(request.upld_req_id.to_string());
    state
        .transcoder
        .package_hls(FsPath::new(&request.src_path), &out_dir, None)
        .await?;

    let target = PathBuf::from(format!("{ENCRYPTED_FOLDER}/{doc_id}"));
    state
        .storage
        .mkdir(FsPath::new(ENCRYPTED_FOLDER), true)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;
    state
        .storage
        .mkdir(&target, true)
        .await
        .map_err(|err| AppError::internal(err.to_string()))?;
    save_metadata(
        &*state.storage,
        &target,
        "hls",
        &MediaOrigin {
            usr_id: request.usr_id,
            upld_req_id: request.upld_req_id,
            crypto_key_id: request.crypto_key_id,
        },
    )
    .await
    .map_err(|err| AppError::internal(err.to_string()))?;

    info!(%doc_id, usr_id = request.usr_id, "upload packaged and registered");
    Ok(Json(TranscodeResponse {
        doc_id,
        playlist: "playlist.m3u8".to_owned(),
    }))
}
