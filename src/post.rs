use std::io::Cursor;

use anyhow::Result;
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::ImageFormat;

/// Longest-side bound for images sent to the scoring service.
pub const SCORING_MAX_DIMENSION: u32 = 1024;
/// Longest-side bound for reference images sent to the generation service.
pub const GENERATION_MAX_DIMENSION: u32 = 3072;

const JPEG_QUALITY: u8 = 85;

/// Re-encode raw image bytes for transport: bound the longest side to
/// `max_dimension` (aspect ratio preserved), then emit PNG when the source
/// carries transparency and RGB JPEG otherwise. Returns the mime type with
/// the bytes.
pub fn optimize(bytes: &[u8], max_dimension: u32) -> Result<(&'static str, Vec<u8>)> {
    let mut img = image::load_from_memory(bytes)?;
    if img.width().max(img.height()) > max_dimension {
        img = img.resize(max_dimension, max_dimension, FilterType::Lanczos3);
    }

    let mut out = Vec::new();
    if img.color().has_alpha() {
        img.write_to(&mut Cursor::new(&mut out), ImageFormat::Png)?;
        Ok(("image/png", out))
    } else {
        let rgb = img.to_rgb8();
        JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&rgb)?;
        Ok(("image/jpeg", out))
    }
}
