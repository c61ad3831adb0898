//! HTTP-level behavior of the stream endpoint against a real on-disk cache.

use std::path::Path;

use axum_test::TestServer;
use tempfile::TempDir;

use virelay_config::Settings;
use virelay_core::cache::{save_metadata, MediaOrigin, ENCRYPTED_FOLDER, TRANSCODED_FOLDER};
use virelay_core::storage::LocalFsStorage;
use virelay_server::routes::build_router;
use virelay_server::state::AppState;

const DOC_ID: &str = "doc-e2acce55";

fn test_server(root: &TempDir) -> TestServer {
    let mut settings = Settings::default();
    settings.storage.base_path = root.path().to_path_buf();
    settings.cache.block_size = 32;
    let state = AppState::from_settings(settings);
    TestServer::new(build_router(state)).expect("test server")
}

fn seed_doc_dir(root: &TempDir) {
    std::fs::create_dir_all(root.path().join(ENCRYPTED_FOLDER).join(DOC_ID)).unwrap();
}

async fn seed_metadata(root: &TempDir) {
    let storage = LocalFsStorage::new(root.path());
    save_metadata(
        &storage,
        &Path::new(ENCRYPTED_FOLDER).join(DOC_ID),
        "hls",
        &MediaOrigin {
            usr_id: 246,
            upld_req_id: 3_802_124_373,
            crypto_key_id: "its_key_id".to_owned(),
        },
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn healthz_responds() {
    let root = TempDir::new().unwrap();
    let server = test_server(&root);

    let response = server.get("/healthz").await;
    response.assert_status_ok();
    response.assert_text("ok");
}

#[tokio::test]
async fn cached_artifact_streams_back_verbatim() {
    let root = TempDir::new().unwrap();
    seed_doc_dir(&root);

    let payload: Vec<u8> = (0u8..100).collect();
    let artifact_dir = root.path().join(ENCRYPTED_FOLDER).join(DOC_ID).join("v1");
    std::fs::create_dir_all(&artifact_dir).unwrap();
    std::fs::write(artifact_dir.join("seg_00001.ts"), &payload).unwrap();

    let server = test_server(&root);
    let response = server
        .get(&format!("/api/v1/stream/{DOC_ID}/v1/seg_00001.ts"))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "video/mp2t"
    );
    assert_eq!(response.as_bytes().as_ref(), payload.as_slice());
}

#[tokio::test]
async fn miss_is_produced_from_the_transcoded_source() {
    let root = TempDir::new().unwrap();
    seed_doc_dir(&root);
    seed_metadata(&root).await;

    let payload = b"#EXTM3U\n#EXT-X-VERSION:3\n#EXT-X-ENDLIST\n";
    let source_dir = root
        .path()
        .join(TRANSCODED_FOLDER)
        .join("246")
        .join("3802124373");
    std::fs::create_dir_all(&source_dir).unwrap();
    std::fs::write(source_dir.join("playlist.m3u8"), payload).unwrap();

    let server = test_server(&root);
    let response = server
        .get(&format!("/api/v1/stream/{DOC_ID}/playlist.m3u8"))
        .await;
    response.assert_status_ok();
    assert_eq!(
        response.header("content-type").to_str().unwrap(),
        "application/vnd.apple.mpegurl"
    );
    assert_eq!(response.as_bytes().as_ref(), payload.as_slice());

    // The produced artifact is now cached on disk for the next request.
    let cached = root
        .path()
        .join(ENCRYPTED_FOLDER)
        .join(DOC_ID)
        .join("playlist.m3u8");
    assert_eq!(std::fs::read(cached).unwrap(), payload);
}

#[tokio::test]
async fn miss_without_sidecar_is_not_found() {
    let root = TempDir::new().unwrap();
    seed_doc_dir(&root);

    let server = test_server(&root);
    let response = server
        .get(&format!("/api/v1/stream/{DOC_ID}/playlist.m3u8"))
        .await;
    response.assert_status(axum::http::StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn traversal_in_the_detail_path_is_rejected() {
    let root = TempDir::new().unwrap();
    seed_doc_dir(&root);

    let server = test_server(&root);
    let response = server
        .get(&format!("/api/v1/stream/{DOC_ID}/..%2F..%2Fsecrets"))
        .await;
    response.assert_status(axum::http::StatusCode::BAD_REQUEST);
}
