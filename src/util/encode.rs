//! Frame encoding
//!
//! Converts [`Frame`]s into compressed bytes for saving to disk and for the
//! remote frame channel, and decodes them back.
//!
//! # Format Support
//!
//! - **PNG**: Lossless, three compression levels (Fast, Default, Best)
//! - **JPEG**: Lossy, quality 1-100, alpha is dropped
//! - **WebP**: Lossless only in image crate v0.25 (quality is ignored)
//!
//! # Examples
//!
//! ```
//! use framegrab::{
//!     capture::Frame,
//!     util::encode::{ImageFormat, decode_frame, encode_frame},
//! };
//!
//! let frame = Frame::from_test_pattern(64, 48);
//! let png = encode_frame(&frame, ImageFormat::Png, 80).unwrap();
//! let decoded = decode_frame(&png).unwrap();
//! assert_eq!(decoded.dimensions(), (64, 48));
//! ```

use std::{fmt, io::Cursor, path::Path, str::FromStr};

use image::{
    ImageEncoder,
    codecs::{
        jpeg::JpegEncoder,
        png::{CompressionType, FilterType, PngEncoder},
        webp::WebPEncoder,
    },
};
use serde::{Deserialize, Serialize};

use crate::{
    capture::Frame,
    error::{CaptureError, CaptureResult},
};

/// Output image format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ImageFormat {
    #[default]
    Png,
    Jpeg,
    Webp,
}

impl ImageFormat {
    /// File extension without the dot
    pub fn extension(&self) -> &'static str {
        match self {
            ImageFormat::Png => "png",
            ImageFormat::Jpeg => "jpg",
            ImageFormat::Webp => "webp",
        }
    }

    /// Guesses the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(|ext| ext.parse().ok())
    }
}

impl fmt::Display for ImageFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension())
    }
}

impl FromStr for ImageFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "png" => Ok(ImageFormat::Png),
            "jpg" | "jpeg" => Ok(ImageFormat::Jpeg),
            "webp" => Ok(ImageFormat::Webp),
            other => Err(format!("unknown image format '{other}' (expected png, jpeg or webp)")),
        }
    }
}

/// Maps a quality value (0-100) to a PNG compression type
///
/// - 0-33: Fast
/// - 34-66: Default
/// - 67-100: Best
pub fn compression_type_from_quality(quality: u8) -> CompressionType {
    match quality {
        0..=33 => CompressionType::Fast,
        34..=66 => CompressionType::Default,
        _ => CompressionType::Best,
    }
}

fn ensure_not_empty(frame: &Frame) -> CaptureResult<()> {
    if frame.is_empty() {
        return Err(CaptureError::InvalidParameter {
            parameter: "frame".to_string(),
            reason:    "Frame dimensions must be > 0".to_string(),
        });
    }
    Ok(())
}

/// Encodes a frame as PNG with default compression
pub fn encode_png(frame: &Frame) -> CaptureResult<Vec<u8>> {
    encode_png_with_compression(frame, CompressionType::Default)
}

/// Encodes a frame as PNG with the given compression level
pub fn encode_png_with_compression(
    frame: &Frame,
    compression: CompressionType,
) -> CaptureResult<Vec<u8>> {
    ensure_not_empty(frame)?;
    let mut output = Vec::new();

    // Adaptive filter picks the best filter per scanline
    let encoder =
        PngEncoder::new_with_quality(Cursor::new(&mut output), compression, FilterType::Adaptive);

    let rgba = frame.to_rgba8();
    let (width, height) = rgba.dimensions();

    encoder
        .write_image(rgba.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .map_err(|e| CaptureError::EncodingFailed {
            format: "png".to_string(),
            reason: e.to_string(),
        })?;

    Ok(output)
}

/// Encodes a frame as JPEG; quality is clamped to 1-100
pub fn encode_jpeg(frame: &Frame, quality: u8) -> CaptureResult<Vec<u8>> {
    ensure_not_empty(frame)?;
    let quality = quality.clamp(1, 100);

    let mut output = Vec::new();
    let encoder = JpegEncoder::new_with_quality(Cursor::new(&mut output), quality);

    // JPEG has no alpha channel
    let rgb = frame.inner().to_rgb8();
    let (width, height) = rgb.dimensions();

    encoder
        .write_image(rgb.as_raw(), width, height, image::ExtendedColorType::Rgb8)
        .map_err(|e| CaptureError::EncodingFailed {
            format: "jpeg".to_string(),
            reason: e.to_string(),
        })?;

    Ok(output)
}

/// Encodes a frame as lossless WebP
pub fn encode_webp(frame: &Frame) -> CaptureResult<Vec<u8>> {
    ensure_not_empty(frame)?;
    let mut output = Vec::new();
    let encoder = WebPEncoder::new_lossless(Cursor::new(&mut output));

    let rgba = frame.to_rgba8();
    let (width, height) = rgba.dimensions();

    encoder
        .write_image(rgba.as_raw(), width, height, image::ExtendedColorType::Rgba8)
        .map_err(|e| CaptureError::EncodingFailed {
            format: "webp".to_string(),
            reason: e.to_string(),
        })?;

    Ok(output)
}

/// Encodes a frame in `format`
///
/// `quality` selects the PNG compression level or the JPEG quality and is
/// ignored for WebP.
pub fn encode_frame(frame: &Frame, format: ImageFormat, quality: u8) -> CaptureResult<Vec<u8>> {
    match format {
        ImageFormat::Png => encode_png_with_compression(frame, compression_type_from_quality(quality)),
        ImageFormat::Jpeg => encode_jpeg(frame, quality),
        ImageFormat::Webp => encode_webp(frame),
    }
}

/// Decodes an encoded image into a frame, guessing the format from its bytes
pub fn decode_frame(bytes: &[u8]) -> CaptureResult<Frame> {
    image::load_from_memory(bytes)
        .map(Frame::new)
        .map_err(|e| CaptureError::ImageError(format!("Failed to decode frame: {e}")))
}

/// Encodes a frame and writes it to `path`, picking the format from the
/// extension (PNG if unknown)
pub fn save_frame(frame: &Frame, path: &Path, quality: u8) -> CaptureResult<ImageFormat> {
    let format = ImageFormat::from_path(path).unwrap_or_default();
    let bytes = encode_frame(frame, format, quality)?;
    std::fs::write(path, bytes)?;
    Ok(format)
}

#[cfg(test)]
mod tests {
    use image::GenericImageView;

    use super::*;

    const PNG_MAGIC: [u8; 8] = [137, 80, 78, 71, 13, 10, 26, 10];

    #[test]
    fn test_compression_type_from_quality() {
        assert!(matches!(compression_type_from_quality(0), CompressionType::Fast));
        assert!(matches!(compression_type_from_quality(33), CompressionType::Fast));
        assert!(matches!(compression_type_from_quality(34), CompressionType::Default));
        assert!(matches!(compression_type_from_quality(66), CompressionType::Default));
        assert!(matches!(compression_type_from_quality(67), CompressionType::Best));
        assert!(matches!(compression_type_from_quality(255), CompressionType::Best));
    }

    #[test]
    fn test_image_format_parse() {
        assert_eq!("PNG".parse::<ImageFormat>().unwrap(), ImageFormat::Png);
        assert_eq!("jpg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("jpeg".parse::<ImageFormat>().unwrap(), ImageFormat::Jpeg);
        assert_eq!("webp".parse::<ImageFormat>().unwrap(), ImageFormat::Webp);
        assert!("bmp".parse::<ImageFormat>().is_err());
    }

    #[test]
    fn test_image_format_from_path() {
        assert_eq!(ImageFormat::from_path(Path::new("a/frame.JPG")), Some(ImageFormat::Jpeg));
        assert_eq!(ImageFormat::from_path(Path::new("frame.webp")), Some(ImageFormat::Webp));
        assert_eq!(ImageFormat::from_path(Path::new("frame")), None);
    }

    #[test]
    fn test_encode_png_signature_and_lossless() {
        let frame = Frame::from_test_pattern(100, 60);
        let bytes = encode_png(&frame).unwrap();
        assert_eq!(&bytes[0..8], &PNG_MAGIC);

        let decoded = image::load_from_memory(&bytes).unwrap();
        assert_eq!(decoded.dimensions(), (100, 60));
        assert_eq!(decoded.to_rgba8(), frame.to_rgba8());
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = Frame::from_test_pattern(100, 100);
        let bytes = encode_jpeg(&frame, 80).unwrap();
        assert_eq!(&bytes[0..2], &[0xff, 0xd8]);

        // Out-of-range qualities are clamped
        assert!(encode_jpeg(&frame, 0).is_ok());
        assert!(encode_jpeg(&frame, 150).is_ok());
    }

    #[test]
    fn test_encode_jpeg_quality_affects_size() {
        let frame = Frame::from_test_pattern(640, 480);
        let low = encode_jpeg(&frame, 30).unwrap();
        let high = encode_jpeg(&frame, 100).unwrap();
        assert!(low.len() < high.len());
    }

    #[test]
    fn test_encode_webp() {
        let frame = Frame::from_test_pattern(100, 100);
        let bytes = encode_webp(&frame).unwrap();
        assert_eq!(&bytes[0..4], b"RIFF");
        assert_eq!(&bytes[8..12], b"WEBP");
    }

    #[test]
    fn test_encode_empty_frame_rejected() {
        let frame = Frame::empty();
        for format in [ImageFormat::Png, ImageFormat::Jpeg, ImageFormat::Webp] {
            assert!(matches!(
                encode_frame(&frame, format, 80),
                Err(CaptureError::InvalidParameter { .. })
            ));
        }
    }

    #[test]
    fn test_decode_garbage() {
        assert!(matches!(decode_frame(b"not an image"), Err(CaptureError::ImageError(_))));
    }

    #[test]
    fn test_save_frame_uses_extension() {
        let dir = tempfile::tempdir().unwrap();
        let frame = Frame::from_test_pattern(32, 32);

        let path = dir.path().join("frame.jpg");
        assert_eq!(save_frame(&frame, &path, 90).unwrap(), ImageFormat::Jpeg);
        assert_eq!(&std::fs::read(&path).unwrap()[0..2], &[0xff, 0xd8]);

        let path = dir.path().join("frame.raw");
        assert_eq!(save_frame(&frame, &path, 90).unwrap(), ImageFormat::Png);
        assert_eq!(&std::fs::read(&path).unwrap()[0..8], &PNG_MAGIC);
    }
}
