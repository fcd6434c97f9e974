use thiserror::Error;

pub const SIZE_REJECTED_MESSAGE: &str = "Image size should be less than 5MB";
pub const PROCESSING_FAILED_MESSAGE: &str = "Failed to process image";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum NormalizeError {
    // size は実際に受信できたバイト数 (途中で打ち切った場合は下限値)
    #[error("Upload exceeds the {limit} byte limit ({size} bytes received)")]
    SizeRejected { size: usize, limit: usize },

    #[error("Image decode failed: {0}")]
    DecodeFailed(String),

    #[error("Image encode failed: {0}")]
    EncodeFailed(String),

    // 同じフィールドで新しい画像が選択され、この処理は破棄された
    #[error("Superseded by a newer selection")]
    Superseded,
}

impl NormalizeError {
    /// Text shown to the person who selected the file.
    pub fn user_message(&self) -> &'static str {
        match self {
            NormalizeError::SizeRejected { .. } => SIZE_REJECTED_MESSAGE,
            NormalizeError::DecodeFailed(_) | NormalizeError::EncodeFailed(_) => {
                PROCESSING_FAILED_MESSAGE
            }
            NormalizeError::Superseded => "Image selection was replaced",
        }
    }
}
