use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::state::AppState;
use crate::{stream_handlers, transcode_handlers};

/// The versioned application router.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route(
            "/api/v1/stream/{doc_id}/{*detail}",
            get(stream_handlers::serve_stream_element),
        )
        .route(
            "/api/v1/media/{doc_id}/transcode",
            post(transcode_handlers::transcode_upload),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}

async fn healthz() -> &'static str {
    "ok"
}
