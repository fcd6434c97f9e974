use super::error::InfrastructureError;
use crate::domain::image::{strip_data_uri_prefix, UploadedImage};

/// `data:image/png;base64,....` を UploadedImage に変換する
pub fn decode_data_url(url: &str) -> Result<UploadedImage, InfrastructureError> {
    let header = url
        .strip_prefix("data:")
        .ok_or_else(|| InfrastructureError::InvalidDataUrl("expected a data: URL".to_string()))?;
    let (meta, _) = header
        .split_once(',')
        .ok_or_else(|| InfrastructureError::InvalidDataUrl("missing comma".to_string()))?;

    let mut parts = meta.split(';');
    let media_type = parts.next().filter(|m| !m.is_empty()).map(str::to_string);
    if !parts.any(|p| p == "base64") {
        return Err(InfrastructureError::InvalidDataUrl("payload is not base64".to_string()));
    }

    let payload = strip_data_uri_prefix(url).trim();
    let bytes = base64::decode(payload)?;
    Ok(UploadedImage::new(bytes, media_type))
}
