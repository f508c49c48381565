//! Input limits.
//!
//! The encoded file is bounded per format before anything parses it. After
//! decoding there are two pixel ceilings: a hard one ([`validate_size`]) that rejects the input and a
//! soft one ([`downscale_if_needed`]) that shrinks it before tracing, since
//! tracing cost grows faster than the pixel count.

use image::imageops::FilterType;

use crate::error::{ConvertError, Result};
use crate::format::DetectedFormat;
use crate::raster::NormalizedRaster;

const MB: usize = 1024 * 1024;

/// Hard ceiling: 16 megapixels.
pub const DEFAULT_MAX_PIXELS: u64 = 16_000_000;

/// Soft ceiling applied before tracing: 4 megapixels.
pub const DEFAULT_EFFICIENT_PIXELS: u64 = 4_000_000;

/// Largest accepted encoded file, in bytes.
pub const fn file_size_limit(format: DetectedFormat) -> usize {
    match format {
        DetectedFormat::Ico => MB,
        DetectedFormat::Jpg => 15 * MB,
        DetectedFormat::Png => 20 * MB,
        DetectedFormat::Tiff | DetectedFormat::Bmp => 50 * MB,
        DetectedFormat::Heic | DetectedFormat::Unknown => 10 * MB,
    }
}

/// Reject empty buffers and buffers over the format's file size limit.
pub fn validate_file(buffer: &[u8], format: DetectedFormat) -> Result<()> {
    if buffer.is_empty() {
        return Err(ConvertError::FileValidation(
            "file is empty. Please provide a file with content".into(),
        ));
    }
    let limit = file_size_limit(format);
    if buffer.len() > limit {
        return Err(ConvertError::FileTooLarge {
            format,
            size: buffer.len(),
            limit,
        });
    }
    Ok(())
}

/// Fail if `width * height` exceeds `max_pixels`.
pub fn validate_size(width: u32, height: u32, max_pixels: u64) -> Result<()> {
    let pixels = u64::from(width) * u64::from(height);
    if pixels > max_pixels {
        return Err(ConvertError::ImageTooLarge {
            width,
            height,
            max_pixels,
        });
    }
    Ok(())
}

/// Shrink `raster` uniformly so it holds at most `max_pixels` pixels.
///
/// Rasters already within the budget are returned untouched, so calling
/// this twice is the same as calling it once.
pub fn downscale_if_needed(raster: NormalizedRaster, max_pixels: u64) -> Result<NormalizedRaster> {
    let current = raster.pixel_count();
    if current <= max_pixels || current == 0 {
        return Ok(raster);
    }

    let (width, height) = scaled_dimensions(raster.width, raster.height, max_pixels);
    log::debug!(
        "downscaling {}x{} to {}x{} (budget {} px)",
        raster.width,
        raster.height,
        width,
        height,
        max_pixels
    );

    let image = raster.decode()?;
    let resized = image.resize_exact(width, height, FilterType::Lanczos3);
    NormalizedRaster::from_image(&resized)
}

/// Target size for a uniform `sqrt(max / current)` scale, floored so the
/// result never exceeds the budget and clamped to at least 1x1.
pub fn scaled_dimensions(width: u32, height: u32, max_pixels: u64) -> (u32, u32) {
    let current = u64::from(width) * u64::from(height);
    let scale = (max_pixels as f64 / current as f64).sqrt();
    let mut w = ((f64::from(width) * scale).floor() as u32).max(1);
    let mut h = ((f64::from(height) * scale).floor() as u32).max(1);
    // The 1px clamp on a degenerate axis can push the other one over budget.
    if u64::from(w) * u64::from(h) > max_pixels {
        if h == 1 {
            w = u32::try_from(max_pixels.max(1)).unwrap_or(u32::MAX);
        } else {
            h = u32::try_from((max_pixels / u64::from(w)).max(1)).unwrap_or(u32::MAX);
        }
    }
    (w, h)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn raster(w: u32, h: u32) -> NormalizedRaster {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(w, h, Rgba([9, 9, 9, 255])));
        NormalizedRaster::from_image(&image).expect("encode")
    }

    #[test]
    fn empty_file_is_rejected() {
        let err = validate_file(&[], DetectedFormat::Png).unwrap_err();
        assert_eq!(err.code(), "FILE_VALIDATION_FAILED");
        assert!(err.to_string().contains("empty"));
    }

    #[test]
    fn file_limits_follow_format() {
        let limit = file_size_limit(DetectedFormat::Ico);
        assert!(validate_file(&vec![0; limit], DetectedFormat::Ico).is_ok());

        let over = vec![0; limit + 1];
        let err = validate_file(&over, DetectedFormat::Ico).unwrap_err();
        assert_eq!(err.code(), "FILE_SIZE_EXCEEDED");
        assert!(validate_file(&over, DetectedFormat::Tiff).is_ok());

        assert_eq!(file_size_limit(DetectedFormat::Jpg), 15 * MB);
        assert_eq!(file_size_limit(DetectedFormat::Png), 20 * MB);
        assert_eq!(file_size_limit(DetectedFormat::Bmp), 50 * MB);
    }

    #[test]
    fn accepts_exactly_max_pixels() {
        assert!(validate_size(4000, 4000, DEFAULT_MAX_PIXELS).is_ok());
    }

    #[test]
    fn rejects_over_max_pixels() {
        let err = validate_size(5000, 5000, DEFAULT_MAX_PIXELS).unwrap_err();
        assert_eq!(err.code(), "IMAGE_TOO_LARGE");
    }

    #[test]
    fn huge_dimensions_do_not_overflow() {
        assert!(validate_size(u32::MAX, u32::MAX, DEFAULT_MAX_PIXELS).is_err());
    }

    #[test]
    fn small_rasters_pass_through_unchanged() {
        let input = raster(40, 30);
        let output = downscale_if_needed(input.clone(), 1_200).expect("downscale");
        assert_eq!(output, input);
    }

    #[test]
    fn large_rasters_shrink_under_budget() {
        let input = raster(200, 100);
        let output = downscale_if_needed(input, 5_000).expect("downscale");
        assert!(output.pixel_count() <= 5_000);
        assert_eq!((output.width, output.height), (100, 50));
    }

    #[test]
    fn downscaling_is_idempotent() {
        let once = downscale_if_needed(raster(300, 120), 9_000).expect("first");
        let twice = downscale_if_needed(once.clone(), 9_000).expect("second");
        assert_eq!(once.bytes, twice.bytes);
    }

    #[test]
    fn scaled_dimensions_keep_aspect() {
        assert_eq!(scaled_dimensions(4000, 2000, 2_000_000), (2000, 1000));
        assert_eq!(scaled_dimensions(10_000, 1, 100), (100, 1));
    }
}
