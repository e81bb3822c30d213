//! EXIF orientation: reading the tag and applying it to pixels.
//!
//! Cameras store pixels in sensor order and record how to display them in
//! EXIF tag 0x0112. Browsers do not reliably honour that tag on WebP, so the
//! conversion pipeline bakes the transform into the pixels and discards the
//! metadata.
//!
//! | Tag | Transform |
//! |---|---|
//! | 1 / absent | identity |
//! | 2 | flip horizontal |
//! | 3 | rotate 180° |
//! | 4 | flip vertical |
//! | 5 | transpose (flip horizontal, then rotate 90° counter-clockwise) |
//! | 6 | rotate 90° clockwise |
//! | 7 | transverse (flip horizontal, then rotate 90° clockwise) |
//! | 8 | rotate 90° counter-clockwise |
//!
//! The tag itself is read by the `image` decoders ([`ImageDecoder::orientation`]);
//! [`OrientationTag::from_decoded`] maps their value onto this table.
//!
//! [`ImageDecoder::orientation`]: image::ImageDecoder::orientation

use super::backend::CanonicalImage;
use image::DynamicImage;
use image::metadata::Orientation;

/// EXIF orientation values 1–8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrientationTag {
    Normal = 1,
    FlipHorizontal = 2,
    Rotate180 = 3,
    FlipVertical = 4,
    Transpose = 5,
    Rotate90 = 6,
    Transverse = 7,
    Rotate270 = 8,
}

impl OrientationTag {
    pub const ALL: [OrientationTag; 8] = [
        Self::Normal,
        Self::FlipHorizontal,
        Self::Rotate180,
        Self::FlipVertical,
        Self::Transpose,
        Self::Rotate90,
        Self::Transverse,
        Self::Rotate270,
    ];

    /// Map the orientation reported by an `image` decoder. The identity
    /// (including "no EXIF") yields `None`.
    pub fn from_decoded(orientation: Orientation) -> Option<Self> {
        match orientation {
            Orientation::NoTransforms => None,
            Orientation::FlipHorizontal => Some(Self::FlipHorizontal),
            Orientation::Rotate180 => Some(Self::Rotate180),
            Orientation::FlipVertical => Some(Self::FlipVertical),
            Orientation::Rotate90FlipH => Some(Self::Transpose),
            Orientation::Rotate90 => Some(Self::Rotate90),
            Orientation::Rotate270FlipH => Some(Self::Transverse),
            Orientation::Rotate270 => Some(Self::Rotate270),
        }
    }

    /// Whether the transform swaps width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(
            self,
            Self::Transpose | Self::Rotate90 | Self::Transverse | Self::Rotate270
        )
    }
}

/// Apply `orientation` to `image` and convert to 8-bit RGB.
///
/// Alpha and any colour profile are dropped.
pub fn normalize(image: DynamicImage, orientation: Option<OrientationTag>) -> CanonicalImage {
    let oriented = match orientation {
        None | Some(OrientationTag::Normal) => image,
        Some(OrientationTag::FlipHorizontal) => image.fliph(),
        Some(OrientationTag::Rotate180) => image.rotate180(),
        Some(OrientationTag::FlipVertical) => image.flipv(),
        Some(OrientationTag::Transpose) => image.fliph().rotate270(),
        Some(OrientationTag::Rotate90) => image.rotate90(),
        Some(OrientationTag::Transverse) => image.fliph().rotate90(),
        Some(OrientationTag::Rotate270) => image.rotate270(),
    };
    oriented.to_rgb8()
}
