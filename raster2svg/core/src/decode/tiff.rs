//! Multi-page TIFF extraction.

use std::io::Cursor;

use image::{DynamicImage, GrayAlphaImage, GrayImage, ImageBuffer, RgbImage, RgbaImage};
use tiff::decoder::{Decoder, DecodingResult};
use tiff::ColorType;

use crate::error::{ConvertError, Result};
use crate::governor;
use crate::raster::NormalizedRaster;

/// Number of image file directories (pages) in `buffer`.
pub fn page_count(buffer: &[u8]) -> Result<usize> {
    let mut decoder = open(buffer)?;
    let mut count = 1;
    while decoder.more_images() {
        decoder.next_image().map_err(extraction)?;
        count += 1;
    }
    Ok(count)
}

/// Decode page `page` (0-indexed) and re-encode it as PNG.
///
/// The page's dimensions are checked against `max_pixels` before any pixel
/// data is decoded.
pub fn decode(buffer: &[u8], page: usize, max_pixels: u64) -> Result<NormalizedRaster> {
    let count = page_count(buffer)?;
    if page >= count {
        return Err(ConvertError::InvalidPageNumber {
            requested: page,
            count,
        });
    }

    let mut decoder = open(buffer)?;
    if page > 0 {
        decoder.seek_to_image(page).map_err(extraction)?;
    }
    let (width, height) = decoder.dimensions().map_err(extraction)?;
    governor::validate_size(width, height, max_pixels)?;

    let color = decoder.colortype().map_err(extraction)?;
    let pixels = decoder.read_image().map_err(extraction)?;
    log::debug!("tiff: page {page}/{count} is {width}x{height} {color:?}");

    let image = to_dynamic(width, height, color, pixels)?;
    NormalizedRaster::from_image(&image)
}

fn open(buffer: &[u8]) -> Result<Decoder<Cursor<&[u8]>>> {
    if first_ifd_offset(buffer) == Some(0) {
        return Err(ConvertError::TiffNoPages);
    }
    Decoder::new(Cursor::new(buffer)).map_err(extraction)
}

/// Offset of the first IFD from a classic TIFF header.
fn first_ifd_offset(buffer: &[u8]) -> Option<u32> {
    let bytes: [u8; 4] = buffer.get(4..8)?.try_into().ok()?;
    match buffer.get(..2)? {
        b"II" => Some(u32::from_le_bytes(bytes)),
        b"MM" => Some(u32::from_be_bytes(bytes)),
        _ => None,
    }
}

fn to_dynamic(
    width: u32,
    height: u32,
    color: ColorType,
    pixels: DecodingResult,
) -> Result<DynamicImage> {
    let mismatch = || {
        ConvertError::TiffExtraction(format!(
            "pixel data does not match {width}x{height} {color:?}"
        ))
    };
    let image = match (color, pixels) {
        (ColorType::Gray(8), DecodingResult::U8(data)) => {
            DynamicImage::ImageLuma8(GrayImage::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (ColorType::GrayA(8), DecodingResult::U8(data)) => DynamicImage::ImageLumaA8(
            GrayAlphaImage::from_raw(width, height, data).ok_or_else(mismatch)?,
        ),
        (ColorType::RGB(8), DecodingResult::U8(data)) => {
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (ColorType::RGBA(8), DecodingResult::U8(data)) => {
            DynamicImage::ImageRgba8(RgbaImage::from_raw(width, height, data).ok_or_else(mismatch)?)
        }
        (ColorType::CMYK(8), DecodingResult::U8(data)) => {
            let rgb = data
                .chunks_exact(4)
                .flat_map(|p| {
                    let k = 255 - u16::from(p[3]);
                    [0, 1, 2].map(|i| ((255 - u16::from(p[i])) * k / 255) as u8)
                })
                .collect();
            DynamicImage::ImageRgb8(RgbImage::from_raw(width, height, rgb).ok_or_else(mismatch)?)
        }
        (ColorType::Gray(16), DecodingResult::U16(data)) => DynamicImage::ImageLuma16(
            ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?,
        ),
        (ColorType::RGB(16), DecodingResult::U16(data)) => DynamicImage::ImageRgb16(
            ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?,
        ),
        (ColorType::RGBA(16), DecodingResult::U16(data)) => DynamicImage::ImageRgba16(
            ImageBuffer::from_raw(width, height, data).ok_or_else(mismatch)?,
        ),
        (other, _) => {
            return Err(ConvertError::TiffExtraction(format!(
                "unsupported colour layout {other:?}"
            )))
        }
    };
    Ok(image)
}

fn extraction(error: tiff::TiffError) -> ConvertError {
    ConvertError::TiffExtraction(error.to_string())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tiff::encoder::{colortype, TiffEncoder};

    /// A TIFF with one RGB page per `(width, height)` pair.
    pub(crate) fn multi_page_tiff(pages: &[(u32, u32)]) -> Vec<u8> {
        let mut out = Cursor::new(Vec::new());
        {
            let mut encoder = TiffEncoder::new(&mut out).expect("encoder");
            for (i, &(w, h)) in pages.iter().enumerate() {
                let shade = (i as u8).wrapping_mul(80);
                let data: Vec<u8> = (0..w * h)
                    .flat_map(|p| [shade, (p % 251) as u8, 255 - shade])
                    .collect();
                encoder
                    .write_image::<colortype::RGB8>(w, h, &data)
                    .expect("write page");
            }
        }
        out.into_inner()
    }

    #[test]
    fn counts_pages() {
        let tiff = multi_page_tiff(&[(4, 4), (8, 2), (3, 3)]);
        assert_eq!(page_count(&tiff).expect("count"), 3);
    }

    #[test]
    fn decodes_requested_page() {
        let tiff = multi_page_tiff(&[(4, 4), (8, 2), (3, 3)]);
        let first = decode(&tiff, 0, u64::MAX).expect("page 0");
        assert_eq!((first.width, first.height), (4, 4));
        let second = decode(&tiff, 1, u64::MAX).expect("page 1");
        assert_eq!((second.width, second.height), (8, 2));
        assert!(second.bytes.starts_with(&[0x89, b'P', b'N', b'G']));
    }

    #[test]
    fn page_out_of_range_names_count() {
        let tiff = multi_page_tiff(&[(4, 4), (4, 4), (4, 4)]);
        for page in [3, 5, 100] {
            let err = decode(&tiff, page, u64::MAX).unwrap_err();
            assert_eq!(err.code(), "INVALID_PAGE_NUMBER");
            assert!(err.to_string().contains('3'));
        }
    }

    #[test]
    fn oversized_page_fails_before_pixel_decode() {
        let tiff = multi_page_tiff(&[(20, 20)]);
        let err = decode(&tiff, 0, 100).unwrap_err();
        assert_eq!(err.code(), "IMAGE_TOO_LARGE");
    }

    #[test]
    fn header_without_pages() {
        let err = decode(b"II*\0\0\0\0\0", 0, u64::MAX).unwrap_err();
        assert_eq!(err.code(), "TIFF_NO_PAGES");
    }

    #[test]
    fn truncated_file_is_extraction_error() {
        let err = decode(b"II*\0\x08\0\0\0\x01", 0, u64::MAX).unwrap_err();
        assert_eq!(err.code(), "TIFF_EXTRACTION_FAILED");
    }
}
