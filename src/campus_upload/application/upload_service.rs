use std::sync::Arc;
use tracing::{info, warn};

use super::error::ApplicationError;
use crate::config::NormalizerConfig;
use crate::domain::error::NormalizeError;
use crate::domain::image::{NormalizedImage, UploadedImage};
use crate::domain::normalizer_trait::ImageNormalizer;
use crate::infrastructure::error::InfrastructureError;

pub struct UploadService {
    normalizer: Arc<dyn ImageNormalizer + Send + Sync>, // トレイトオブジェクトとして保持
    max_upload_bytes: usize,
}

impl UploadService {
    pub fn new(normalizer: Arc<dyn ImageNormalizer + Send + Sync>, config: &NormalizerConfig) -> Self {
        Self {
            normalizer,
            max_upload_bytes: config.max_upload_bytes,
        }
    }

    pub fn max_upload_bytes(&self) -> usize {
        self.max_upload_bytes
    }

    /// サイズ上限を確認してから正規化する。上限超過時はデコーダを一切呼ばない
    pub fn check_size(&self, upload: &UploadedImage) -> Result<(), NormalizeError> {
        if upload.size() > self.max_upload_bytes {
            return Err(NormalizeError::SizeRejected {
                size: upload.size(),
                limit: self.max_upload_bytes,
            });
        }
        Ok(())
    }

    pub async fn accept(&self, upload: UploadedImage) -> Result<NormalizedImage, ApplicationError> {
        if let Err(err) = self.check_size(&upload) {
            warn!("Rejected upload before decoding: {}", err);
            return Err(err.into());
        }

        // デコード/エンコードは CPU バウンドなのでブロッキングプールで実行する
        let normalizer = Arc::clone(&self.normalizer);
        let size = upload.size();
        let result = tokio::task::spawn_blocking(move || normalizer.normalize(&upload))
            .await
            .map_err(|e| InfrastructureError::TaskJoinError(e.to_string()))?;

        match result {
            Ok(normalized) => {
                info!(
                    "Normalized upload of {} bytes to {}x{} JPEG",
                    size, normalized.width, normalized.height
                );
                Ok(normalized)
            }
            Err(err) => {
                warn!("Failed to normalize upload of {} bytes: {}", size, err);
                Err(err.into())
            }
        }
    }
}
