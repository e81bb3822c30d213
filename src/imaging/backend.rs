//! Image codec backend trait and shared types.
//!
//! The [`ImageBackend`] trait defines the two operations the conversion
//! pipeline needs from a codec: decode a source file (pixels plus embedded
//! orientation) and encode a canonical RGB buffer at a given lossy quality.
//!
//! The production implementation is
//! [`WebpBackend`](super::webp_backend::WebpBackend). Tests use the recording
//! [`MockBackend`](tests::MockBackend), whose encoded sizes are a pure
//! function of quality.

use super::orientation::OrientationTag;
use super::params::Quality;
use image::{DynamicImage, RgbImage};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pixel buffer in canonical orientation: top-left origin, 8-bit RGB.
pub type CanonicalImage = RgbImage;

#[derive(Error, Debug)]
pub enum ImagingError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to decode {}: {message}", path.display())]
    Decode { path: PathBuf, message: String },
    #[error("encode failed: {0}")]
    Encode(String),
}

/// A decoded source file, before orientation is applied.
#[derive(Debug, Clone)]
pub struct SourceImage {
    pub pixels: DynamicImage,
    /// `None` when the file carries no (readable) orientation tag.
    pub orientation: Option<OrientationTag>,
}

/// Trait for image codec backends.
///
/// `Sync` because the conversion pool shares one backend across all workers.
pub trait ImageBackend: Sync {
    /// Decode a JPEG/PNG file and read its EXIF orientation.
    fn load(&self, path: &Path) -> Result<SourceImage, ImagingError>;

    /// Encode a canonical buffer with the lossy codec at `quality`.
    ///
    /// Must be deterministic: same buffer and quality, same bytes.
    fn encode(&self, image: &CanonicalImage, quality: Quality) -> Result<Vec<u8>, ImagingError>;
}
