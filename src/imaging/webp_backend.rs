//! Production backend: `image` crate decoders + libwebp lossy encoder.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Decode (JPEG, PNG) | `image::ImageReader` → `DynamicImage::from_decoder` |
//! | EXIF orientation | `ImageDecoder::orientation` → [`OrientationTag::from_decoded`] |
//! | Encode → WebP | `webp::Encoder::encode_advanced` (lossy, method 6) |
//!
//! The `image` crate only writes lossless WebP, which cannot trade quality for
//! size, so encoding goes through the `webp` bindings instead.

use super::backend::{CanonicalImage, ImageBackend, ImagingError, SourceImage};
use super::orientation::OrientationTag;
use super::params::Quality;
use image::{DynamicImage, ImageDecoder, ImageReader};
use std::path::Path;

/// Source extensions picked up by the conversion pool (matched case-insensitively).
pub const SOURCE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png"];

/// Extension of every converted file.
pub const OUTPUT_EXTENSION: &str = "webp";

/// libwebp `method`: 0 = fastest, 6 = slowest / smallest output.
const WEBP_METHOD: i32 = 6;

/// Whether `path` has one of the [`SOURCE_EXTENSIONS`].
pub fn is_source_image(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|ext| {
            SOURCE_EXTENSIONS
                .iter()
                .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        })
}

/// Decodes with the `image` crate, encodes lossy WebP with libwebp.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebpBackend;

impl WebpBackend {
    pub fn new() -> Self {
        Self
    }
}

fn decode_error(path: &Path, err: impl std::fmt::Display) -> ImagingError {
    ImagingError::Decode {
        path: path.to_path_buf(),
        message: err.to_string(),
    }
}

impl ImageBackend for WebpBackend {
    fn load(&self, path: &Path) -> Result<SourceImage, ImagingError> {
        let reader = ImageReader::open(path)
            .map_err(|e| decode_error(path, e))?
            .with_guessed_format()
            .map_err(|e| decode_error(path, e))?;
        let mut decoder = reader.into_decoder().map_err(|e| decode_error(path, e))?;

        // Missing or unreadable EXIF means "no transform", never a failure.
        let orientation = decoder
            .orientation()
            .ok()
            .and_then(OrientationTag::from_decoded);

        let pixels = DynamicImage::from_decoder(decoder).map_err(|e| decode_error(path, e))?;
        Ok(SourceImage {
            pixels,
            orientation,
        })
    }

    fn encode(&self, image: &CanonicalImage, quality: Quality) -> Result<Vec<u8>, ImagingError> {
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ImagingError::Encode("failed to initialise WebP config".to_string()))?;
        config.lossless = 0;
        config.quality = quality.value() as f32;
        config.method = WEBP_METHOD;

        let encoder = webp::Encoder::from_rgb(image.as_raw(), image.width(), image.height());
        let memory = encoder
            .encode_advanced(&config)
            .map_err(|e| ImagingError::Encode(format!("WebP encode failed: {e:?}")))?;
        Ok(memory.to_vec())
    }
}
