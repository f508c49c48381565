use std::io::Cursor;

use image::{DynamicImage, ImageFormat, ImageReader};

use crate::error::{ConvertError, Result};

/// Encoding of the bytes inside a [`NormalizedRaster`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RasterEncoding {
    Png,
    Jpeg,
    Bmp,
}

impl RasterEncoding {
    pub const fn image_format(self) -> ImageFormat {
        match self {
            Self::Png => ImageFormat::Png,
            Self::Jpeg => ImageFormat::Jpeg,
            Self::Bmp => ImageFormat::Bmp,
        }
    }

    pub const fn mime_type(self) -> &'static str {
        match self {
            Self::Png => "image/png",
            Self::Jpeg => "image/jpeg",
            Self::Bmp => "image/bmp",
        }
    }
}

/// A single decoded still image, still in encoded form, plus its pixel size.
///
/// Every container decoder produces one of these; everything downstream
/// (size governor, tracer) only ever sees this type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NormalizedRaster {
    pub bytes: Vec<u8>,
    pub encoding: RasterEncoding,
    pub width: u32,
    pub height: u32,
}

impl NormalizedRaster {
    /// Wrap already-encoded bytes, reading the dimensions from the header.
    pub fn from_encoded(bytes: Vec<u8>, encoding: RasterEncoding) -> Result<Self> {
        let (width, height) = probe_dimensions(&bytes, encoding)?;
        Ok(Self {
            bytes,
            encoding,
            width,
            height,
        })
    }

    /// Encode a decoded image as PNG.
    pub fn from_image(image: &DynamicImage) -> Result<Self> {
        let mut bytes = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
            .map_err(|e| ConvertError::RasterEncode(e.to_string()))?;
        Ok(Self {
            bytes,
            encoding: RasterEncoding::Png,
            width: image.width(),
            height: image.height(),
        })
    }

    pub fn pixel_count(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }

    pub fn decode(&self) -> Result<DynamicImage> {
        Ok(image::load_from_memory_with_format(
            &self.bytes,
            self.encoding.image_format(),
        )?)
    }
}

/// Read width/height from the image header without decoding pixels.
pub fn probe_dimensions(bytes: &[u8], encoding: RasterEncoding) -> Result<(u32, u32)> {
    let mut reader = ImageReader::new(Cursor::new(bytes));
    reader.set_format(encoding.image_format());
    Ok(reader.into_dimensions()?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{Rgba, RgbaImage};

    #[test]
    fn png_round_trip_keeps_dimensions() {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_pixel(7, 3, Rgba([1, 2, 3, 255])));
        let raster = NormalizedRaster::from_image(&image).expect("encode");
        assert_eq!((raster.width, raster.height), (7, 3));
        assert_eq!(raster.pixel_count(), 21);

        let probed = NormalizedRaster::from_encoded(raster.bytes.clone(), RasterEncoding::Png)
            .expect("probe");
        assert_eq!(probed, raster);
        assert_eq!(raster.decode().expect("decode").width(), 7);
    }

    #[test]
    fn garbage_is_a_decode_error() {
        let err = NormalizedRaster::from_encoded(vec![1, 2, 3], RasterEncoding::Png).unwrap_err();
        assert_eq!(err.code(), "RASTER_DECODE_FAILED");
    }
}
