//! HEIC/HEIF input.
//!
//! HEVC decoding is delegated to a [`HeicCodec`]; this module validates the
//! container signature and maps codec failures onto the error taxonomy.

use thiserror::Error;

use crate::error::{ConvertError, Result};
use crate::format::{heic_brand, HEIC_BRANDS};
use crate::raster::{NormalizedRaster, RasterEncoding};

#[derive(Debug, Error)]
pub enum HeicCodecError {
    /// The current runtime has no usable HEVC decoder.
    #[error("{0}")]
    Unsupported(String),
    #[error("{0}")]
    Failed(String),
}

/// Decodes a HEIC file into an intermediate JPEG.
pub trait HeicCodec: Send + Sync {
    /// `quality` is the JPEG quality factor in (0, 1].
    fn to_jpeg(&self, heic: &[u8], quality: f32) -> std::result::Result<Vec<u8>, HeicCodecError>;
}

/// Codec used when the build carries no HEVC decoder.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnavailableHeicCodec;

impl HeicCodec for UnavailableHeicCodec {
    fn to_jpeg(&self, _heic: &[u8], _quality: f32) -> std::result::Result<Vec<u8>, HeicCodecError> {
        Err(HeicCodecError::Unsupported(
            "HEIC decoding is not supported in this environment".into(),
        ))
    }
}

/// Check that `buffer` carries an `ftyp` box with a HEIC brand.
pub fn validate(buffer: &[u8]) -> Result<()> {
    if buffer.len() < 12 {
        return Err(ConvertError::FileValidation(format!(
            "file too small to be a valid HEIC ({} bytes)",
            buffer.len()
        )));
    }
    let Some(brand) = heic_brand(buffer) else {
        return Err(ConvertError::UnsupportedFormat {
            format: "unknown".into(),
            message: "file does not appear to be a valid HEIC/HEIF format".into(),
        });
    };
    if !HEIC_BRANDS.contains(&brand) {
        let brand = String::from_utf8_lossy(brand).into_owned();
        return Err(ConvertError::UnsupportedFormat {
            message: format!(
                "invalid HEIC brand: {brand}. Expected one of: heic, heix, hevc, hevx, mif1"
            ),
            format: brand,
        });
    }
    Ok(())
}

pub fn decode(buffer: &[u8], codec: &dyn HeicCodec, jpeg_quality: f32) -> Result<NormalizedRaster> {
    validate(buffer)?;
    let jpeg = codec.to_jpeg(buffer, jpeg_quality).map_err(|e| match e {
        HeicCodecError::Unsupported(msg) => ConvertError::EnvironmentUnsupported(format!(
            "HEIC format is not supported here ({msg}). Please use a runtime with HEVC support."
        )),
        HeicCodecError::Failed(msg) => ConvertError::HeicDecode(msg),
    })?;
    NormalizedRaster::from_encoded(jpeg, RasterEncoding::Jpeg)
}
