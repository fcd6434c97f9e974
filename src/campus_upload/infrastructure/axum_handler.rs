use crate::application::error::ApplicationError;
use axum::{
    extract::{multipart::MultipartError, rejection::JsonRejection, Json, Multipart, Path, State},
    http::{header::CONTENT_LENGTH, HeaderMap, StatusCode},
};
use serde::Deserialize;
use std::sync::Arc;
use tracing::{info, warn};

use super::data_url::decode_data_url;
use super::error::InfrastructureError;
use crate::application::attachment_slot::FormRegistry;
use crate::application::upload_service::UploadService;
use crate::domain::error::NormalizeError;
use crate::domain::image::{ImageAttachment, NormalizedImage, UploadedImage};

pub const IMAGE_FIELD: &str = "image";

#[derive(Clone)]
pub struct AppState {
    pub upload_service: Arc<UploadService>,
    pub forms: Arc<FormRegistry>,
}

#[derive(Deserialize, Debug)]
pub struct DataUrlParams {
    pub url: String,
}

fn multipart_rejection(err: MultipartError, limit: usize, received: usize) -> ApplicationError {
    if err.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return NormalizeError::SizeRejected { size: received, limit }.into();
    }
    InfrastructureError::from(err).into()
}

// multipart から `image` フィールドを取り出す
// 画像は limit バイト、リクエスト全体は limit の2倍までしか読まない
async fn read_image_field(mut multipart: Multipart, limit: usize) -> Result<UploadedImage, ApplicationError> {
    let request_cap = limit.saturating_mul(2);
    let mut received = 0usize;
    let mut image = None;

    while let Some(mut field) = multipart
        .next_field()
        .await
        .map_err(|e| multipart_rejection(e, limit, received))?
    {
        let is_image = image.is_none() && field.name() == Some(IMAGE_FIELD);
        let media_type = field.content_type().map(str::to_string);
        let mut data = Vec::new();

        while let Some(chunk) = field
            .chunk()
            .await
            .map_err(|e| multipart_rejection(e, limit, received))?
        {
            received += chunk.len();
            if is_image {
                if data.len() + chunk.len() > limit {
                    return Err(NormalizeError::SizeRejected { size: data.len() + chunk.len(), limit }.into());
                }
                data.extend_from_slice(&chunk);
            }
            if received > request_cap {
                return Err(NormalizeError::SizeRejected { size: received, limit }.into());
            }
        }

        if is_image {
            image = Some(UploadedImage::new(data, media_type));
        }
    }

    image.ok_or_else(|| InfrastructureError::MissingField(IMAGE_FIELD).into())
}

pub async fn normalize_upload_handler(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> Result<Json<NormalizedImage>, ApplicationError> {
    let upload = read_image_field(multipart, state.upload_service.max_upload_bytes()).await?;
    let normalized = state.upload_service.accept(upload).await?;
    Ok(Json(normalized))
}

pub async fn normalize_data_url_handler(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    payload: Result<Json<DataUrlParams>, JsonRejection>,
) -> Result<Json<NormalizedImage>, ApplicationError> {
    let Json(params) = payload.map_err(|rejection| {
        if rejection.status() == StatusCode::PAYLOAD_TOO_LARGE {
            let declared = headers
                .get(CONTENT_LENGTH)
                .and_then(|value| value.to_str().ok())
                .and_then(|value| value.parse().ok())
                .unwrap_or(0);
            ApplicationError::from(NormalizeError::SizeRejected {
                size: declared,
                limit: state.upload_service.max_upload_bytes(),
            })
        } else {
            InfrastructureError::MalformedRequest(rejection.body_text()).into()
        }
    })?;

    let upload = decode_data_url(&params.url)?;
    let normalized = state.upload_service.accept(upload).await?;
    Ok(Json(normalized))
}

pub async fn replace_attachment_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
    multipart: Multipart,
) -> Result<Json<NormalizedImage>, ApplicationError> {
    let upload = read_image_field(multipart, state.upload_service.max_upload_bytes()).await?;

    let slot = state.forms.slot(&form_id)?;
    let result = slot.replace(Arc::clone(&state.upload_service), upload).await;
    drop(slot);

    match result {
        Ok(normalized) => {
            info!("Attached {}x{} image to form {}", normalized.width, normalized.height, form_id);
            Ok(Json(normalized))
        }
        Err(err) => {
            // 画像を持たない空のスロットは残さない
            state.forms.prune(&form_id);
            warn!("Attachment for form {} failed: {}", form_id, err);
            Err(err)
        }
    }
}

pub async fn get_attachment_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
) -> Json<ImageAttachment> {
    let current = state.forms.get(&form_id).and_then(|slot| slot.current());
    Json(ImageAttachment::from(current))
}

pub async fn discard_attachment_handler(
    State(state): State<Arc<AppState>>,
    Path(form_id): Path<String>,
) -> StatusCode {
    state.forms.discard(&form_id);
    StatusCode::NO_CONTENT
}
