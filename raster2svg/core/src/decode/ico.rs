//! ICO directory parsing and icon extraction.
//!
//! Layout: a 6-byte header (reserved, type, count) followed by `count`
//! 16-byte directory entries. Entry payloads are either complete PNG files
//! or headerless BMP (DIB) data whose height covers both the colour bitmap
//! and the 1-bit AND mask.

use crate::error::{ConvertError, Result};
use crate::raster::{NormalizedRaster, RasterEncoding};

const HEADER_SIZE: usize = 6;
const ENTRY_SIZE: usize = 16;
const BMP_FILE_HEADER_SIZE: usize = 14;
const PNG_MAGIC: [u8; 4] = [0x89, b'P', b'N', b'G'];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IcoHeader {
    pub reserved: u16,
    pub kind: u16,
    pub count: u16,
}

/// One icon image listed in the directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IconEntry {
    pub width: u32,
    pub height: u32,
    pub color_count: u8,
    pub planes: u16,
    pub bit_count: u16,
    pub size: u32,
    pub offset: u32,
}

impl IconEntry {
    pub fn area(&self) -> u64 {
        u64::from(self.width) * u64::from(self.height)
    }
}

pub fn parse_header(buffer: &[u8]) -> Result<IcoHeader> {
    if buffer.len() < HEADER_SIZE {
        return Err(ConvertError::IcoInvalidHeader { len: buffer.len() });
    }
    Ok(IcoHeader {
        reserved: read_u16(buffer, 0),
        kind: read_u16(buffer, 2),
        count: read_u16(buffer, 4),
    })
}

pub fn parse_directory(buffer: &[u8], count: u16) -> Result<Vec<IconEntry>> {
    (0..usize::from(count))
        .map(|index| {
            let at = HEADER_SIZE + index * ENTRY_SIZE;
            if at + ENTRY_SIZE > buffer.len() {
                return Err(ConvertError::IcoInvalidDirectory {
                    index,
                    end: at + ENTRY_SIZE,
                    len: buffer.len(),
                });
            }
            // A zero byte encodes 256.
            let dimension = |byte: u8| if byte == 0 { 256 } else { u32::from(byte) };
            Ok(IconEntry {
                width: dimension(buffer[at]),
                height: dimension(buffer[at + 1]),
                color_count: buffer[at + 2],
                planes: read_u16(buffer, at + 4),
                bit_count: read_u16(buffer, at + 6),
                size: read_u32(buffer, at + 8),
                offset: read_u32(buffer, at + 12),
            })
        })
        .collect()
}

/// Pick the icon to trace.
///
/// With a preferred size: the first entry of exactly that width, else the
/// one with the closest width. Without: the largest by area. Ties go to the
/// entry listed first. Returns `None` only for an empty slice.
pub fn select_best_icon(entries: &[IconEntry], preferred_size: Option<u32>) -> Option<&IconEntry> {
    let first = entries.first()?;
    match preferred_size {
        Some(size) => entries
            .iter()
            .find(|e| e.width == size)
            .or_else(|| entries.iter().min_by_key(|e| e.width.abs_diff(size))),
        None => Some(entries.iter().fold(first, |best, entry| {
            if entry.area() > best.area() {
                entry
            } else {
                best
            }
        })),
    }
}

/// Parse `buffer` as an ICO file and normalize the selected icon.
pub fn decode(buffer: &[u8], preferred_size: Option<u32>) -> Result<NormalizedRaster> {
    let header = parse_header(buffer)?;
    if header.kind != 1 {
        return Err(ConvertError::IcoInvalidType { found: header.kind });
    }
    if header.count == 0 {
        return Err(ConvertError::IcoNoIcons);
    }

    let entries = parse_directory(buffer, header.count)?;
    let entry = select_best_icon(&entries, preferred_size).ok_or(ConvertError::IcoNoIcons)?;
    log::debug!(
        "ico: {} entries, selected {}x{} ({} bpp, {} bytes)",
        entries.len(),
        entry.width,
        entry.height,
        entry.bit_count,
        entry.size
    );

    let data = entry_data(buffer, entry)?;
    if data.starts_with(&PNG_MAGIC) {
        return NormalizedRaster::from_encoded(data.to_vec(), RasterEncoding::Png);
    }
    NormalizedRaster::from_encoded(wrap_dib(data)?, RasterEncoding::Bmp)
}

fn entry_data<'a>(buffer: &'a [u8], entry: &IconEntry) -> Result<&'a [u8]> {
    let start = u64::from(entry.offset);
    let end = start + u64::from(entry.size);
    if end > buffer.len() as u64 {
        return Err(ConvertError::IcoInvalidData {
            offset: start,
            size: u64::from(entry.size),
            len: buffer.len(),
        });
    }
    Ok(&buffer[start as usize..end as usize])
}

/// Prefix headerless DIB data with a BMP file header.
///
/// The pixel-data offset accounts for the DIB header and the colour table,
/// and the DIB height is halved so only the colour bitmap (not the AND
/// mask) is described.
pub fn wrap_dib(dib: &[u8]) -> Result<Vec<u8>> {
    if dib.len() < 40 {
        return Err(ConvertError::FileValidation(format!(
            "invalid ICO file: bitmap entry is {} bytes, shorter than its 40-byte header",
            dib.len()
        )));
    }
    let header_size = read_u32(dib, 0) as usize;
    let bit_count = read_u16(dib, 14);
    let colors_used = read_u32(dib, 32) as usize;
    let palette_entries = match (bit_count, colors_used) {
        (1..=8, 0) => 1usize << bit_count,
        (1..=8, n) => n,
        _ => 0,
    };
    let pixel_offset = BMP_FILE_HEADER_SIZE + header_size + palette_entries * 4;
    let total = BMP_FILE_HEADER_SIZE + dib.len();

    let mut out = Vec::with_capacity(total);
    out.extend_from_slice(b"BM");
    out.extend_from_slice(&(total as u32).to_le_bytes());
    out.extend_from_slice(&[0; 4]);
    out.extend_from_slice(&(pixel_offset as u32).to_le_bytes());
    out.extend_from_slice(dib);

    let height = i32::from_le_bytes([dib[8], dib[9], dib[10], dib[11]]);
    let at = BMP_FILE_HEADER_SIZE + 8;
    out[at..at + 4].copy_from_slice(&(height / 2).to_le_bytes());
    Ok(out)
}

fn read_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn read_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{DynamicImage, ImageFormat, Rgba, RgbaImage};
    use proptest::prelude::*;
    use std::io::Cursor;

    pub(crate) fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let image = DynamicImage::ImageRgba8(RgbaImage::from_fn(w, h, |x, y| {
            if (x / 4 + y / 4) % 2 == 0 {
                Rgba([220, 30, 30, 255])
            } else {
                Rgba([20, 20, 200, 255])
            }
        }));
        let mut out = Vec::new();
        image
            .write_to(&mut Cursor::new(&mut out), ImageFormat::Png)
            .expect("png");
        out
    }

    /// Build an ICO file from `(width byte, height byte, payload)` triples.
    pub(crate) fn build_ico(images: &[(u8, u8, Vec<u8>)]) -> Vec<u8> {
        let mut out = vec![0, 0, 1, 0];
        out.extend_from_slice(&(images.len() as u16).to_le_bytes());
        let mut offset = HEADER_SIZE + images.len() * ENTRY_SIZE;
        for (w, h, payload) in images {
            out.extend_from_slice(&[*w, *h, 0, 0]);
            out.extend_from_slice(&1u16.to_le_bytes());
            out.extend_from_slice(&32u16.to_le_bytes());
            out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
            out.extend_from_slice(&(offset as u32).to_le_bytes());
            offset += payload.len();
        }
        for (_, _, payload) in images {
            out.extend_from_slice(payload);
        }
        out
    }

    /// 32bpp DIB with a doubled height, as stored in ICO files.
    fn dib_32bpp(w: u32, h: u32) -> Vec<u8> {
        let mut dib = Vec::new();
        dib.extend_from_slice(&40u32.to_le_bytes());
        dib.extend_from_slice(&(w as i32).to_le_bytes());
        dib.extend_from_slice(&((h * 2) as i32).to_le_bytes());
        dib.extend_from_slice(&1u16.to_le_bytes());
        dib.extend_from_slice(&32u16.to_le_bytes());
        dib.extend_from_slice(&[0; 24]);
        for _ in 0..w * h {
            dib.extend_from_slice(&[10, 200, 10, 255]);
        }
        // AND mask rows are padded to 4 bytes.
        let mask_row = ((w + 31) / 32 * 4) as usize;
        dib.extend(std::iter::repeat(0).take(mask_row * h as usize));
        dib
    }

    fn entry(width: u32, height: u32) -> IconEntry {
        IconEntry {
            width,
            height,
            color_count: 0,
            planes: 1,
            bit_count: 32,
            size: 0,
            offset: 0,
        }
    }

    #[test]
    fn zero_byte_means_256() {
        let ico = build_ico(&[(0, 0, vec![0; 4])]);
        let entries = parse_directory(&ico, 1).expect("directory");
        assert_eq!((entries[0].width, entries[0].height), (256, 256));
    }

    #[test]
    fn selects_largest_by_default() {
        let entries = [entry(16, 16), entry(48, 48), entry(32, 32)];
        assert_eq!(select_best_icon(&entries, None), Some(&entries[1]));
    }

    #[test]
    fn selects_exact_then_closest_width() {
        let entries = [entry(16, 16), entry(48, 48), entry(32, 32)];
        assert_eq!(select_best_icon(&entries, Some(32)), Some(&entries[2]));
        assert_eq!(select_best_icon(&entries, Some(40)), Some(&entries[2]));
        assert_eq!(select_best_icon(&entries, Some(200)), Some(&entries[1]));
        assert_eq!(select_best_icon(&[], Some(200)), None);
    }

    #[test]
    fn decodes_png_entry() {
        let ico = build_ico(&[(16, 16, png_bytes(16, 16)), (32, 32, png_bytes(32, 32))]);
        let raster = decode(&ico, None).expect("decode");
        assert_eq!(raster.encoding, RasterEncoding::Png);
        assert_eq!((raster.width, raster.height), (32, 32));

        let small = decode(&ico, Some(16)).expect("decode");
        assert_eq!((small.width, small.height), (16, 16));
    }

    #[test]
    fn decodes_bmp_entry_without_mask_rows() {
        let ico = build_ico(&[(8, 8, dib_32bpp(8, 8))]);
        let raster = decode(&ico, None).expect("decode");
        assert_eq!(raster.encoding, RasterEncoding::Bmp);
        assert!(raster.bytes.starts_with(b"BM"));
        assert_eq!((raster.width, raster.height), (8, 8));
        let image = raster.decode().expect("bmp decodes").to_rgba8();
        assert_eq!(image.get_pixel(3, 3).0[1], 200);
    }

    #[test]
    fn rejects_cursor_type() {
        let mut ico = build_ico(&[(16, 16, png_bytes(16, 16))]);
        ico[2] = 2;
        let err = decode(&ico, None).unwrap_err();
        assert_eq!(err.code(), "ICO_INVALID_TYPE");
    }

    #[test]
    fn rejects_empty_directory() {
        let err = decode(&[0, 0, 1, 0, 0, 0], None).unwrap_err();
        assert_eq!(err.code(), "ICO_NO_ICONS");
    }

    #[test]
    fn rejects_short_header_and_directory() {
        assert_eq!(decode(&[0, 0, 1], None).unwrap_err().code(), "ICO_INVALID_HEADER");
        let err = decode(&[0, 0, 1, 0, 2, 0, 16, 16], None).unwrap_err();
        assert_eq!(err.code(), "ICO_INVALID_DIRECTORY");
    }

    #[test]
    fn out_of_bounds_payload_is_fatal() {
        let mut ico = build_ico(&[(16, 16, png_bytes(16, 16))]);
        let len = ico.len() as u32;
        // Declare a payload one byte longer than the file holds.
        let declared = len - (HEADER_SIZE + ENTRY_SIZE) as u32 + 1;
        ico[14..18].copy_from_slice(&declared.to_le_bytes());
        let err = decode(&ico, None).unwrap_err();
        assert_eq!(err.code(), "ICO_INVALID_DATA");
        assert!(err.to_string().contains(&len.to_string()));
    }

    proptest! {
        #[test]
        fn selection_is_a_member_and_maximizes_area(
            dims in prop::collection::vec((1u32..=256, 1u32..=256), 1..12),
            preferred in prop::option::of(1u32..=256),
        ) {
            let entries: Vec<IconEntry> = dims.iter().map(|&(w, h)| entry(w, h)).collect();
            let picked = select_best_icon(&entries, preferred).expect("non-empty");
            prop_assert!(entries.contains(picked));
            if preferred.is_none() {
                let max = entries.iter().map(IconEntry::area).max().unwrap_or(0);
                prop_assert_eq!(picked.area(), max);
            }
        }
    }
}
