//! Shared test utilities: synthetic source images written to temp dirs.
//!
//! Nothing binary is checked in; every fixture is generated from a formula so
//! the expected pixels are obvious from the test.

use crate::imaging::CanonicalImage;
use image::{ExtendedColorType, ImageEncoder, Rgb, RgbImage, Rgba, RgbaImage};
use std::path::Path;

fn gradient(width: u32, height: u32) -> RgbImage {
    RgbImage::from_fn(width, height, |x, y| {
        Rgb([(x % 256) as u8, (y % 256) as u8, 128])
    })
}

/// Deterministic high-entropy image; compresses poorly so quality matters.
pub fn noisy_image(width: u32, height: u32) -> CanonicalImage {
    let mut state: u32 = 0x2545_F491;
    RgbImage::from_fn(width, height, |_, _| {
        let mut channel = || {
            state ^= state << 13;
            state ^= state >> 17;
            state ^= state << 5;
            (state >> 24) as u8
        };
        Rgb([channel(), channel(), channel()])
    })
}

fn encode_jpeg(image: &RgbImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    image::codecs::jpeg::JpegEncoder::new(&mut bytes)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgb8,
        )
        .unwrap();
    bytes
}

/// Write a gradient JPEG.
pub fn write_jpeg(path: &Path, width: u32, height: u32) {
    std::fs::write(path, encode_jpeg(&gradient(width, height))).unwrap();
}

/// EXIF blob (with `Exif\0\0` prefix) whose IFD0 holds only the
/// orientation entry (tag 0x0112, one SHORT).
pub fn exif_with_orientation(value: u16, big_endian: bool) -> Vec<u8> {
    let u16_bytes = |v: u16| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };
    let u32_bytes = |v: u32| if big_endian { v.to_be_bytes() } else { v.to_le_bytes() };

    let mut blob = b"Exif\0\0".to_vec();
    blob.extend_from_slice(if big_endian { b"MM" } else { b"II" });
    blob.extend_from_slice(&u16_bytes(42));
    blob.extend_from_slice(&u32_bytes(8));
    blob.extend_from_slice(&u16_bytes(1));
    blob.extend_from_slice(&u16_bytes(0x0112));
    blob.extend_from_slice(&u16_bytes(3));
    blob.extend_from_slice(&u32_bytes(1));
    blob.extend_from_slice(&u16_bytes(value));
    blob.extend_from_slice(&[0, 0]);
    blob.extend_from_slice(&u32_bytes(0));
    blob
}

/// Write a gradient JPEG carrying an APP1 EXIF segment with `orientation`.
pub fn write_jpeg_with_orientation(path: &Path, width: u32, height: u32, orientation: u16) {
    write_jpeg_with_exif(path, width, height, &exif_with_orientation(orientation, true));
}

/// Write a gradient JPEG with `exif` spliced in as an APP1 segment.
pub fn write_jpeg_with_exif(path: &Path, width: u32, height: u32, exif: &[u8]) {
    let jpeg = encode_jpeg(&gradient(width, height));

    let mut out = Vec::with_capacity(jpeg.len() + exif.len() + 4);
    out.extend_from_slice(&jpeg[..2]); // SOI
    out.extend_from_slice(&[0xFF, 0xE1]);
    out.extend_from_slice(&((exif.len() + 2) as u16).to_be_bytes());
    out.extend_from_slice(exif);
    out.extend_from_slice(&jpeg[2..]);
    std::fs::write(path, out).unwrap();
}

/// Write a half-transparent RGBA PNG.
pub fn write_png_rgba(path: &Path, width: u32, height: u32) {
    let image = RgbaImage::from_fn(width, height, |x, y| {
        Rgba([(x * 16) as u8, (y * 16) as u8, 64, if x % 2 == 0 { 255 } else { 0 }])
    });
    image.save(path).unwrap();
}
