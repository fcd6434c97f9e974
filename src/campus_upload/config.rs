use std::{env, fmt::Display, str::FromStr, time::Duration};

use image::imageops::FilterType;
use tracing::{info, warn};

pub const DEFAULT_MAX_UPLOAD_BYTES: usize = 5 * 1024 * 1024;
pub const DEFAULT_MAX_DIMENSION: u32 = 1024;
/// Quality 0.7 on the 1-100 JPEG scale.
pub const DEFAULT_JPEG_QUALITY: u8 = 70;

#[derive(Debug, Clone)]
pub struct NormalizerConfig {
    /// 正規化前に受け付ける最大バイト数
    pub max_upload_bytes: usize,
    /// 長辺の上限 (px)
    pub max_dimension: u32,
    pub jpeg_quality: u8,
    pub resize_filter: FilterType,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self {
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            max_dimension: DEFAULT_MAX_DIMENSION,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            resize_filter: FilterType::Triangle,
        }
    }
}

/// Bounds on the per-form attachment slots held in memory.
#[derive(Debug, Clone, Copy)]
pub struct FormLimits {
    pub max_forms: usize,
    /// この時間触られていないスロットは新規作成時に破棄される
    pub idle_ttl: Duration,
}

impl Default for FormLimits {
    fn default() -> Self {
        Self {
            max_forms: 1024,
            idle_ttl: Duration::from_secs(30 * 60),
        }
    }
}

#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub port: u16,
    pub normalizer: NormalizerConfig,
    pub forms: FormLimits,
}

impl ServerConfig {
    pub fn load() -> Self {
        Self {
            port: try_load("CAMPUS_UPLOAD_PORT", 3300),
            normalizer: NormalizerConfig {
                max_upload_bytes: try_load("CAMPUS_UPLOAD_MAX_BYTES", DEFAULT_MAX_UPLOAD_BYTES),
                max_dimension: try_load("CAMPUS_UPLOAD_MAX_DIMENSION", DEFAULT_MAX_DIMENSION),
                jpeg_quality: try_load("CAMPUS_UPLOAD_JPEG_QUALITY", DEFAULT_JPEG_QUALITY)
                    .clamp(1, 100),
                ..NormalizerConfig::default()
            },
            forms: FormLimits {
                max_forms: try_load("CAMPUS_UPLOAD_MAX_FORMS", FormLimits::default().max_forms).max(1),
                idle_ttl: Duration::from_secs(try_load(
                    "CAMPUS_UPLOAD_FORM_IDLE_SECS",
                    FormLimits::default().idle_ttl.as_secs(),
                )),
            },
        }
    }
}

fn try_load<T>(key: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    match env::var(key) {
        Ok(raw) => parse_or(key, &raw, default),
        Err(_) => {
            info!("{key} not set, using default: {default}");
            default
        }
    }
}

fn parse_or<T>(key: &str, raw: &str, default: T) -> T
where
    T: FromStr + Display,
    T::Err: Display,
{
    raw.trim().parse().unwrap_or_else(|e| {
        warn!("Invalid {key} value {raw:?}: {e}, using default: {default}");
        default
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_upload_rules() {
        let config = NormalizerConfig::default();
        assert_eq!(config.max_upload_bytes, 5_242_880);
        assert_eq!(config.max_dimension, 1024);
        assert_eq!(config.jpeg_quality, 70);
    }

    #[test]
    fn test_parse_or_falls_back_on_garbage() {
        assert_eq!(parse_or("PORT", " 8080 ", 3300u16), 8080);
        assert_eq!(parse_or("PORT", "eighty", 3300u16), 3300);
        assert_eq!(parse_or("QUALITY", "300", 70u8), 70);
    }

    #[test]
    fn test_try_load_missing_key_uses_default() {
        assert_eq!(try_load("CAMPUS_UPLOAD_TEST_UNSET_KEY", 42usize), 42);
    }
}
