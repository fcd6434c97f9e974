use crate::domain::error::NormalizeError;
use crate::domain::image::{NormalizedImage, UploadedImage};

// 画像の正規化 (デコード -> 縮小 -> JPEG -> base64) を行うトレイト
// 実装はインフラ層の JpegNormalizer
#[cfg_attr(test, mockall::automock)]
pub trait ImageNormalizer {
    fn normalize(&self, image: &UploadedImage) -> Result<NormalizedImage, NormalizeError>;
}
