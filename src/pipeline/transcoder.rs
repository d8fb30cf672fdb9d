//! Image transcoding - decodes an uploaded image and re-encodes it as JPEG
//! at the requested quality.
//!
//! Kept pure (bytes in, bytes out) so it can fan out on the worker pool and
//! be tested without touching the filesystem.

use image::ImageError;
use image::codecs::jpeg::JpegEncoder;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TranscodeError {
    #[error("unsupported image format")]
    UnsupportedFormat(#[source] ImageError),

    #[error("corrupt image data")]
    CorruptInput(#[source] ImageError),

    #[error("jpeg encoding failed")]
    Encode(#[source] ImageError),
}

/// Re-encode one image as JPEG at `quality` (1 = smallest, 100 = best
/// fidelity). The source format and its metadata are discarded.
///
/// Fails fast on unreadable input and never produces partial output.
pub fn compress_image(source: &[u8], quality: u8) -> Result<Vec<u8>, TranscodeError> {
    let dynamic_image = image::load_from_memory(source).map_err(|error| match error {
        ImageError::Unsupported(_) => TranscodeError::UnsupportedFormat(error),
        other => TranscodeError::CorruptInput(other),
    })?;

    // JPEG cannot carry an alpha channel
    let rgb_image = dynamic_image.to_rgb8();

    let mut output = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut output, quality);
    encoder
        .encode_image(&rgb_image)
        .map_err(TranscodeError::Encode)?;

    Ok(output)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgb, RgbImage};
    use std::io::Cursor;

    fn png_fixture(width: u32, height: u32) -> Vec<u8> {
        let img = RgbImage::from_fn(width, height, |x, y| {
            Rgb([(x * 7 % 256) as u8, (y * 13 % 256) as u8, ((x + y) % 256) as u8])
        });
        let mut bytes = Vec::new();
        DynamicImage::ImageRgb8(img)
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .unwrap();
        bytes
    }

    #[test]
    fn compresses_png_to_jpeg() {
        let source = png_fixture(64, 64);
        let output = compress_image(&source, 80).unwrap();

        // JPEG start-of-image marker.
        assert!(output.len() > 2);
        assert_eq!(&output[..2], &[0xFF, 0xD8]);
    }

    #[test]
    fn quality_extremes_are_accepted() {
        let source = png_fixture(32, 32);
        assert!(compress_image(&source, 1).is_ok());
        assert!(compress_image(&source, 100).is_ok());
    }

    #[test]
    fn higher_quality_yields_larger_output() {
        let source = png_fixture(128, 128);
        let low = compress_image(&source, 5).unwrap();
        let high = compress_image(&source, 95).unwrap();
        assert!(high.len() > low.len());
    }

    #[test]
    fn garbage_bytes_are_unsupported() {
        let result = compress_image(b"definitely not an image", 80);
        assert!(matches!(result, Err(TranscodeError::UnsupportedFormat(_))));
    }

    #[test]
    fn truncated_png_is_corrupt() {
        let mut source = png_fixture(64, 64);
        source.truncate(source.len() / 2);
        let result = compress_image(&source, 80);
        assert!(matches!(result, Err(TranscodeError::CorruptInput(_))));
    }
}
