use serde::{Deserialize, Serialize};

pub const OUTPUT_MIME_TYPE: &str = "image/jpeg";

/// ユーザーが選択した画像ファイル (デコード前のバイト列)
#[derive(Debug, Clone)]
pub struct UploadedImage {
    pub bytes: Vec<u8>,
    pub media_type: Option<String>,
}

impl UploadedImage {
    pub fn new(bytes: Vec<u8>, media_type: Option<String>) -> Self {
        Self { bytes, media_type }
    }

    pub fn size(&self) -> usize {
        self.bytes.len()
    }
}

/// Resized JPEG ready to embed in a JSON form body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NormalizedImage {
    pub base64: String,
    #[serde(rename = "mimeType")]
    pub mime_type: String,
    #[serde(skip)]
    pub width: u32,
    #[serde(skip)]
    pub height: u32,
}

impl NormalizedImage {
    pub fn new(base64: String, width: u32, height: u32) -> Self {
        Self {
            base64: strip_data_uri_prefix(&base64).to_string(),
            mime_type: OUTPUT_MIME_TYPE.to_string(),
            width,
            height,
        }
    }
}

/// The `imageBase64` / `mimeType` pair carried by complaint and lost/found forms.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImageAttachment {
    #[serde(rename = "imageBase64")]
    pub image_base64: Option<String>,
    #[serde(rename = "mimeType")]
    pub mime_type: Option<String>,
}

impl From<NormalizedImage> for ImageAttachment {
    fn from(image: NormalizedImage) -> Self {
        Self {
            image_base64: Some(image.base64),
            mime_type: Some(image.mime_type),
        }
    }
}

impl From<Option<NormalizedImage>> for ImageAttachment {
    fn from(image: Option<NormalizedImage>) -> Self {
        image.map(Into::into).unwrap_or_default()
    }
}

/// `data:image/png;base64,AAAA` -> `AAAA`. Text without a data-URI header is returned as-is.
pub fn strip_data_uri_prefix(text: &str) -> &str {
    if !text.starts_with("data:") {
        return text;
    }
    match text.split_once(',') {
        Some((_, payload)) => payload,
        None => text,
    }
}
