use crate::config::NormalizerConfig;
use crate::domain::dimensions::ScaledDimensions;
use crate::domain::error::NormalizeError;
use crate::domain::image::{NormalizedImage, UploadedImage};
use crate::domain::normalizer_trait::ImageNormalizer;
use image::codecs::jpeg::JpegEncoder;
use image::{ColorType, DynamicImage, GenericImageView, ImageFormat, Rgb, RgbImage};
use std::io::Cursor;
use tracing::debug;

// ImageNormalizer の実装: image クレートでデコードし、JPEG に再エンコードする
pub struct JpegNormalizer {
    config: NormalizerConfig,
}

impl JpegNormalizer {
    pub fn new(config: NormalizerConfig) -> Self {
        Self { config }
    }

    fn decode(&self, image: &UploadedImage) -> Result<DynamicImage, NormalizeError> {
        let mut reader = image::io::Reader::new(Cursor::new(image.bytes.as_slice()))
            .with_guessed_format()
            .map_err(|e| NormalizeError::DecodeFailed(e.to_string()))?;

        // マジックナンバーで判定できない場合は申告された MIME タイプを使う
        if reader.format().is_none() {
            if let Some(format) = image.media_type.as_deref().and_then(ImageFormat::from_mime_type) {
                reader.set_format(format);
            }
        }

        reader.decode().map_err(|e| NormalizeError::DecodeFailed(e.to_string()))
    }

    fn encode_jpeg(&self, image: &RgbImage) -> Result<Vec<u8>, NormalizeError> {
        let mut buffer = Vec::new();
        let mut encoder = JpegEncoder::new_with_quality(&mut buffer, self.config.jpeg_quality);
        encoder
            .encode(image.as_raw(), image.width(), image.height(), ColorType::Rgb8)
            .map_err(|e| NormalizeError::EncodeFailed(e.to_string()))?;
        Ok(buffer)
    }
}

impl ImageNormalizer for JpegNormalizer {
    fn normalize(&self, image: &UploadedImage) -> Result<NormalizedImage, NormalizeError> {
        let decoded = self.decode(image)?;
        let (source_width, source_height) = decoded.dimensions();

        let target = ScaledDimensions::fit_within(source_width, source_height, self.config.max_dimension);
        if target.is_fractional() {
            debug!(
                "Fractional target {:.2}x{:.2} truncated to {:?}",
                target.width,
                target.height,
                target.surface_size()
            );
        }

        let resized = if target.requires_resize(source_width, source_height) {
            let (width, height) = target.surface_size();
            decoded.resize_exact(width, height, self.config.resize_filter)
        } else {
            decoded
        };

        let surface = flatten_onto_black(&resized);
        let jpeg = self.encode_jpeg(&surface)?;

        debug!(
            "Normalized {}x{} ({} bytes) -> {}x{} JPEG ({} bytes)",
            source_width,
            source_height,
            image.size(),
            surface.width(),
            surface.height(),
            jpeg.len()
        );

        Ok(NormalizedImage::new(base64::encode(&jpeg), surface.width(), surface.height()))
    }
}

/// JPEG has no alpha channel; transparent pixels end up black, as on a fresh canvas.
fn flatten_onto_black(image: &DynamicImage) -> RgbImage {
    if !image.color().has_alpha() {
        return image.to_rgb8();
    }
    let rgba = image.to_rgba8();
    RgbImage::from_fn(rgba.width(), rgba.height(), |x, y| {
        let [r, g, b, a] = rgba.get_pixel(x, y).0;
        let blend = |c: u8| ((c as u16 * a as u16 + 127) / 255) as u8;
        Rgb([blend(r), blend(g), blend(b)])
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    fn encode(image: DynamicImage, format: ImageFormat) -> Vec<u8> {
        let mut buffer = Cursor::new(Vec::new());
        image.write_to(&mut buffer, format).unwrap();
        buffer.into_inner()
    }

    fn gradient(width: u32, height: u32) -> DynamicImage {
        DynamicImage::ImageRgb8(RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x % 256) as u8, (y % 256) as u8, 128])
        }))
    }

    fn decode_output(output: &NormalizedImage) -> DynamicImage {
        let bytes = base64::decode(&output.base64).unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
        image::load_from_memory(&bytes).unwrap()
    }

    #[test]
    fn test_large_png_is_downscaled_to_jpeg() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let upload = UploadedImage::new(encode(gradient(2048, 1024), ImageFormat::Png), Some("image/png".to_string()));

        let output = normalizer.normalize(&upload).unwrap();
        assert_eq!(output.mime_type, "image/jpeg");
        assert!(!output.base64.is_empty());
        assert!(!output.base64.starts_with("data:"));
        assert_eq!((output.width, output.height), (1024, 512));
        assert_eq!(decode_output(&output).dimensions(), (1024, 512));
    }

    #[test]
    fn test_small_jpeg_keeps_its_dimensions() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let upload = UploadedImage::new(encode(gradient(500, 300), ImageFormat::Jpeg), Some("image/jpeg".to_string()));

        let output = normalizer.normalize(&upload).unwrap();
        assert_eq!(decode_output(&output).dimensions(), (500, 300));
    }

    #[test]
    fn test_tall_image_is_bounded_by_height() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let upload = UploadedImage::new(encode(gradient(600, 1200), ImageFormat::Png), None);

        let output = normalizer.normalize(&upload).unwrap();
        assert_eq!(decode_output(&output).dimensions(), (512, 1024));
    }

    #[test]
    fn test_transparent_pixels_become_black() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let clear = DynamicImage::ImageRgba8(RgbaImage::from_pixel(16, 16, Rgba([255, 255, 255, 0])));
        let upload = UploadedImage::new(encode(clear, ImageFormat::Png), Some("image/png".to_string()));

        let output = decode_output(&normalizer.normalize(&upload).unwrap()).to_rgb8();
        let Rgb([r, g, b]) = *output.get_pixel(8, 8);
        assert!(r < 16 && g < 16 && b < 16, "expected black, got {:?}", (r, g, b));
    }

    #[test]
    fn test_corrupt_input_is_decode_failure() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let upload = UploadedImage::new(vec![1, 2, 3, 4], Some("image/png".to_string()));

        match normalizer.normalize(&upload) {
            Err(NormalizeError::DecodeFailed(_)) => {}
            other => panic!("Expected DecodeFailed, got {:?}", other),
        }
    }

    #[test]
    fn test_truncated_png_is_decode_failure() {
        let normalizer = JpegNormalizer::new(NormalizerConfig::default());
        let mut bytes = encode(gradient(64, 64), ImageFormat::Png);
        bytes.truncate(bytes.len() / 2);

        let result = normalizer.normalize(&UploadedImage::new(bytes, None));
        assert!(matches!(result, Err(NormalizeError::DecodeFailed(_))));
    }
}
