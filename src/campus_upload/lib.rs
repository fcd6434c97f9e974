//! Campus upload normalizer.
//!
//! Photos attached to complaints and lost/found postings are normalized before
//! they are embedded in a form body: decoded, downscaled so the longer side is
//! at most 1024px, re-encoded as JPEG at quality 70 and returned as plain
//! base64 with `mimeType: "image/jpeg"`. Uploads over 5 MiB are rejected
//! before decoding.
//!
//! # Routes
//!
//! - `POST /normalize` multipart field `image`
//! - `POST /normalize/data-url` JSON `{ "url": "data:image/png;base64,..." }`
//! - `PUT | GET | DELETE /forms/:form_id/attachment` per-form attachment slot
//!
//! # Configuration
//!
//! | Variable | Default |
//! |---|---|
//! | `CAMPUS_UPLOAD_PORT` | `3300` |
//! | `CAMPUS_UPLOAD_MAX_BYTES` | `5242880` |
//! | `CAMPUS_UPLOAD_MAX_DIMENSION` | `1024` |
//! | `CAMPUS_UPLOAD_JPEG_QUALITY` | `70` |
//! | `CAMPUS_UPLOAD_MAX_FORMS` | `1024` |
//! | `CAMPUS_UPLOAD_FORM_IDLE_SECS` | `1800` |
//!
//! Log level is read from `RUST_LOG`.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::{
    extract::DefaultBodyLimit,
    http::{header::CONTENT_TYPE, Method},
    routing::post,
    Router,
};
use tokio::signal;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

pub mod application;
pub mod config;
pub mod domain;
pub mod infrastructure;

use application::attachment_slot::FormRegistry;
use application::upload_service::UploadService;
use config::{FormLimits, NormalizerConfig, ServerConfig};
use infrastructure::axum_handler::{
    discard_attachment_handler, get_attachment_handler, normalize_data_url_handler,
    normalize_upload_handler, replace_attachment_handler, AppState,
};
use infrastructure::jpeg_normalizer::JpegNormalizer;

pub fn build_app(config: &NormalizerConfig, forms: FormLimits) -> Router {
    let normalizer = Arc::new(JpegNormalizer::new(config.clone()));
    let state = Arc::new(AppState {
        upload_service: Arc::new(UploadService::new(normalizer, config)),
        forms: Arc::new(FormRegistry::new(forms)),
    });

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([CONTENT_TYPE]);

    // multipart はハンドラ側で読みながら上限を確認するので、ボディ上限は外す
    let multipart_routes = Router::new()
        .route("/normalize", post(normalize_upload_handler))
        .route(
            "/forms/:form_id/attachment",
            axum::routing::put(replace_attachment_handler)
                .get(get_attachment_handler)
                .delete(discard_attachment_handler),
        )
        .layer(DefaultBodyLimit::disable());

    // data URL は base64 で約 4/3 倍になる
    let json_routes = Router::new()
        .route("/normalize/data-url", post(normalize_data_url_handler))
        .layer(DefaultBodyLimit::max(config.max_upload_bytes.saturating_mul(2)));

    multipart_routes.merge(json_routes).layer(cors).with_state(state)
}

pub async fn start_server(config: ServerConfig) -> anyhow::Result<()> {
    let app = build_app(&config.normalizer, config.forms);
    let address = SocketAddr::from(([0, 0, 0, 0], config.port));
    info!(
        "Listening on {} (max upload {} bytes, bound {}px, quality {})",
        address,
        config.normalizer.max_upload_bytes,
        config.normalizer.max_dimension,
        config.normalizer.jpeg_quality
    );

    axum::Server::bind(&address)
        .serve(app.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = signal::ctrl_c().await {
        tracing::warn!("Failed to listen for ctrl-c: {}", e);
        std::future::pending::<()>().await;
    }
}
