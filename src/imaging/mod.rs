//! Image re-encoding: orientation-correct, size-bounded WebP.
//!
//! | Step | Module |
//! |---|---|
//! | **Decode + read EXIF orientation** | [`webp_backend`] via the [`ImageBackend`] trait |
//! | **Bake orientation into pixels, drop alpha** | [`orientation`] |
//! | **Pick the highest quality under a byte budget** | [`budget`] |
//!
//! [`convert_image`] chains the three for one file; the
//! [`convert`](crate::convert) module fans it out over a worker pool.

pub mod backend;
pub mod budget;
pub mod orientation;
mod params;
pub mod webp_backend;

pub use backend::{CanonicalImage, ImageBackend, ImagingError, SourceImage};
pub use budget::{EncodingResult, encode_within_budget};
pub use orientation::{OrientationTag, normalize};
pub use params::{EncodeBudget, Quality};
pub use webp_backend::{OUTPUT_EXTENSION, SOURCE_EXTENSIONS, WebpBackend, is_source_image};

use std::path::Path;

/// Decode `source`, normalise its orientation and encode it within `budget`.
pub fn convert_image(
    backend: &impl ImageBackend,
    source: &Path,
    budget: &EncodeBudget,
) -> Result<EncodingResult, ImagingError> {
    let SourceImage {
        pixels,
        orientation,
    } = backend.load(source)?;
    let canonical = normalize(pixels, orientation);
    encode_within_budget(backend, &canonical, budget)
}
