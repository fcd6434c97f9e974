pub mod axum_handler;
pub mod data_url;
pub mod error;
pub mod jpeg_normalizer;
