//! HEIC decoding through the system libheif (`heif` feature).

use image::codecs::jpeg::JpegEncoder;
use image::ExtendedColorType;
use libheif_rs::{ColorSpace, HeifContext, HeifError, HeifErrorCode, LibHeif, RgbChroma};

use super::heic::{HeicCodec, HeicCodecError};

/// Decodes the primary image with libheif and re-encodes it as JPEG.
#[derive(Debug, Default, Clone, Copy)]
pub struct LibheifCodec;

impl HeicCodec for LibheifCodec {
    fn to_jpeg(&self, heic: &[u8], quality: f32) -> Result<Vec<u8>, HeicCodecError> {
        let lib = LibHeif::new();
        let context = HeifContext::read_from_bytes(heic).map_err(codec_error)?;
        let handle = context.primary_image_handle().map_err(codec_error)?;
        let image = lib
            .decode(&handle, ColorSpace::Rgb(RgbChroma::Rgb), None)
            .map_err(codec_error)?;
        let plane = image
            .planes()
            .interleaved
            .ok_or_else(|| HeicCodecError::Failed("decoded image has no interleaved plane".into()))?;

        let (width, height) = (plane.width, plane.height);
        let row = width as usize * 3;
        let mut pixels = Vec::with_capacity(row * height as usize);
        for line in plane.data.chunks(plane.stride).take(height as usize) {
            let line = line
                .get(..row)
                .ok_or_else(|| HeicCodecError::Failed(format!("short row in {width}x{height} plane")))?;
            pixels.extend_from_slice(line);
        }
        log::debug!("libheif: decoded {width}x{height} primary image");

        let mut jpeg = Vec::new();
        let quality = (quality * 100.0).round().clamp(1.0, 100.0) as u8;
        JpegEncoder::new_with_quality(&mut jpeg, quality)
            .encode(&pixels, width, height, ExtendedColorType::Rgb8)
            .map_err(|e| HeicCodecError::Failed(e.to_string()))?;
        Ok(jpeg)
    }
}

fn codec_error(error: HeifError) -> HeicCodecError {
    match error.code {
        // Missing HEVC decoder plugin.
        HeifErrorCode::UnsupportedFeature => HeicCodecError::Unsupported(error.to_string()),
        _ => HeicCodecError::Failed(error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decode::heic::{self, tests::heic_stub};

    #[test]
    fn truncated_container_is_a_decode_error() {
        let err = heic::decode(&heic_stub(b"heic"), &LibheifCodec, 0.92).unwrap_err();
        assert_eq!(err.code(), "HEIC_DECODE_FAILED");
    }
}
