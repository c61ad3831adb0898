use axum::{
    body::{Body, Bytes},
    extract::{Path, Query, State},
    http::{header, StatusCode},
    response::Response,
};
use serde::Deserialize;
use tracing::{debug, warn};

use virelay_core::cache::{StreamSpec, ENCRYPTED_FOLDER};

use crate::errors::{AppError, AppResult};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct StreamQuery {
    #[serde(default)]
    key_id: Option<String>,
}

/// Serve one element of a document's encrypted stream.
///
/// Cache hits are read straight off storage; misses are produced live by
/// the processor recorded in the entry's metadata sidecar while every block
/// is persisted for the next request. A concurrent producer on the same
/// element turns into `503` with `Retry-After`.
pub async fn serve_stream_element(
    State(state): State<AppState>,
    Path((doc_id, detail)): Path<(String, String)>,
    Query(query): Query<StreamQuery>,
) -> AppResult<Response> {
    if doc_id.is_empty() || doc_id.contains('/') {
        return Err(AppError::bad_request("malformed document id"));
    }
    debug!(%doc_id, %detail, "stream element requested");

    let mut spec = StreamSpec::new(format!("{ENCRYPTED_FOLDER}/{doc_id}"), detail.clone());
    spec.crypto_key_id = query.key_id;

    let block_size = state.settings.cache.block_size;
    let mut entry = state.stream_cache.admit(spec, block_size).await?;

    let body = async_stream::stream! {
        loop {
            match entry.proceed().await {
                Ok(block) => {
                    let is_final = block.is_final;
                    yield Ok::<_, std::io::Error>(Bytes::from(block.data));
                    if is_final {
                        break;
                    }
                }
                Err(failure) => {
                    warn!("stream pump failed: {failure}");
                    yield Err(std::io::Error::other(failure));
                    break;
                }
            }
        }
        entry.deinit().await;
    };

    Response::builder()
        .status(StatusCode::OK)
        .header(header::CONTENT_TYPE, content_type_for(&detail))
        .body(Body::from_stream(body))
        .map_err(|err| AppError::internal(err.to_string()))
}

fn content_type_for(detail: &str) -> &'static str {
    match detail.rsplit('.').next() {
        Some("m3u8") => "application/vnd.apple.mpegurl",
        Some("ts") => "video/mp2t",
        Some("key") => "application/octet-stream",
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_types_follow_the_element_extension() {
        assert_eq!(content_type_for("playlist.m3u8"), "application/vnd.apple.mpegurl");
        assert_eq!(content_type_for("seg/00001.ts"), "video/mp2t");
        assert_eq!(content_type_for("unknown.bin"), "application/octet-stream");
    }
}
