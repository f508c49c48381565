//! Container decoders.
//!
//! Each variant turns one container format into a [`NormalizedRaster`].
//! Decoders re-check the bytes they are given instead of trusting the
//! sniffer, so a mis-routed buffer is rejected at the decoder as well.

pub mod heic;
pub mod ico;
#[cfg(feature = "heif")]
pub mod libheif;
pub mod tiff;

use crate::error::{ConvertError, Result};
use crate::format::{self, DetectedFormat};
use crate::raster::{NormalizedRaster, RasterEncoding};

pub use self::heic::{HeicCodec, HeicCodecError, UnavailableHeicCodec};
pub use self::ico::IconEntry;
#[cfg(feature = "heif")]
pub use self::libheif::LibheifCodec;

/// A format-specific decoder together with its selector.
pub enum Decoder<'a> {
    /// JPEG, PNG and BMP are handed to the tracer as-is.
    Passthrough(RasterEncoding),
    Ico { preferred_size: Option<u32> },
    Tiff { page: usize },
    Heic {
        codec: &'a dyn HeicCodec,
        jpeg_quality: f32,
    },
}

impl Decoder<'_> {
    pub fn decode(&self, buffer: &[u8], max_pixels: u64) -> Result<NormalizedRaster> {
        match self {
            Self::Passthrough(encoding) => passthrough(buffer, *encoding),
            Self::Ico { preferred_size } => ico::decode(buffer, *preferred_size),
            Self::Tiff { page } => tiff::decode(buffer, *page, max_pixels),
            Self::Heic {
                codec,
                jpeg_quality,
            } => heic::decode(buffer, *codec, *jpeg_quality),
        }
    }
}

fn passthrough(buffer: &[u8], encoding: RasterEncoding) -> Result<NormalizedRaster> {
    let expected = match encoding {
        RasterEncoding::Jpeg => DetectedFormat::Jpg,
        RasterEncoding::Png => DetectedFormat::Png,
        RasterEncoding::Bmp => DetectedFormat::Bmp,
    };
    let detected = format::detect(buffer);
    if detected != expected {
        return Err(ConvertError::FormatMismatch { expected, detected });
    }
    NormalizedRaster::from_encoded(buffer.to_vec(), encoding)
}
