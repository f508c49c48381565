//! Content-based format sniffing.
//!
//! Filenames and declared MIME types are untrusted, so detection only
//! looks at the leading bytes of the buffer.

use std::fmt;

use serde::{Deserialize, Serialize};

const PNG_SIGNATURE: [u8; 8] = [0x89, b'P', b'N', b'G', 0x0d, 0x0a, 0x1a, 0x0a];
const JPEG_SOI: [u8; 3] = [0xff, 0xd8, 0xff];
const TIFF_LE: [u8; 4] = [b'I', b'I', 0x2a, 0x00];
const TIFF_BE: [u8; 4] = [b'M', b'M', 0x00, 0x2a];
const ICO_HEADER: [u8; 4] = [0x00, 0x00, 0x01, 0x00];

/// ISO-BMFF major brands accepted as HEIC/HEIF still images.
pub const HEIC_BRANDS: [&[u8; 4]; 5] = [b"heic", b"heix", b"hevc", b"hevx", b"mif1"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectedFormat {
    Jpg,
    Tiff,
    Ico,
    Heic,
    Png,
    Bmp,
    Unknown,
}

impl DetectedFormat {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Jpg => "jpg",
            Self::Tiff => "tiff",
            Self::Ico => "ico",
            Self::Heic => "heic",
            Self::Png => "png",
            Self::Bmp => "bmp",
            Self::Unknown => "unknown",
        }
    }

    /// Code used when an unexpected failure is wrapped by the façade.
    pub const fn failure_code(self) -> &'static str {
        match self {
            Self::Jpg => "JPG_TO_SVG_FAILED",
            Self::Tiff => "TIFF_TO_SVG_FAILED",
            Self::Ico => "ICO_TO_SVG_FAILED",
            Self::Heic => "HEIC_TO_SVG_FAILED",
            Self::Png => "PNG_TO_SVG_FAILED",
            Self::Bmp => "BMP_TO_SVG_FAILED",
            Self::Unknown => "CONVERSION_FAILED",
        }
    }

    pub fn parse(name: &str) -> Option<Self> {
        match name.trim().to_lowercase().as_str() {
            "jpg" | "jpeg" => Some(Self::Jpg),
            "tif" | "tiff" => Some(Self::Tiff),
            "ico" => Some(Self::Ico),
            "heic" | "heif" => Some(Self::Heic),
            "png" => Some(Self::Png),
            "bmp" => Some(Self::Bmp),
            _ => None,
        }
    }
}

impl fmt::Display for DetectedFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unknown => f.write_str("unknown"),
            other => f.write_str(&other.as_str().to_uppercase()),
        }
    }
}

/// Identify the container format of `buffer` from its magic bytes.
///
/// Never fails: anything unrecognised is [`DetectedFormat::Unknown`].
pub fn detect(buffer: &[u8]) -> DetectedFormat {
    if buffer.starts_with(&PNG_SIGNATURE) {
        DetectedFormat::Png
    } else if buffer.starts_with(&JPEG_SOI) {
        DetectedFormat::Jpg
    } else if buffer.starts_with(&TIFF_LE) || buffer.starts_with(&TIFF_BE) {
        DetectedFormat::Tiff
    } else if is_heic(buffer) {
        DetectedFormat::Heic
    } else if buffer.len() >= 6 && buffer.starts_with(&ICO_HEADER) {
        DetectedFormat::Ico
    } else if buffer.len() >= 14 && buffer.starts_with(b"BM") {
        DetectedFormat::Bmp
    } else {
        DetectedFormat::Unknown
    }
}

/// `ftyp` box at offset 4 followed by one of [`HEIC_BRANDS`].
pub fn is_heic(buffer: &[u8]) -> bool {
    heic_brand(buffer).is_some_and(|brand| HEIC_BRANDS.iter().any(|b| *b == brand))
}

/// The four brand bytes following an `ftyp` box marker, if present.
pub(crate) fn heic_brand(buffer: &[u8]) -> Option<&[u8; 4]> {
    if buffer.len() < 12 || &buffer[4..8] != b"ftyp" {
        return None;
    }
    buffer[8..12].try_into().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_known_signatures() {
        assert_eq!(detect(&[0xff, 0xd8, 0xff, 0xe0, 0, 0]), DetectedFormat::Jpg);
        assert_eq!(detect(b"II*\0\x08\0\0\0"), DetectedFormat::Tiff);
        assert_eq!(detect(b"MM\0*\0\0\0\x08"), DetectedFormat::Tiff);
        assert_eq!(detect(&[0, 0, 1, 0, 1, 0]), DetectedFormat::Ico);
        assert_eq!(detect(&PNG_SIGNATURE), DetectedFormat::Png);
        assert_eq!(detect(b"BM\0\0\0\0\0\0\0\0\x36\0\0\0"), DetectedFormat::Bmp);
    }

    #[test]
    fn detects_every_heic_brand() {
        for brand in HEIC_BRANDS {
            let mut buf = vec![0, 0, 0, 0x18];
            buf.extend_from_slice(b"ftyp");
            buf.extend_from_slice(brand);
            buf.extend_from_slice(&[0; 8]);
            assert_eq!(detect(&buf), DetectedFormat::Heic, "brand {brand:?}");
        }
    }

    #[test]
    fn other_iso_brands_are_unknown() {
        let mut buf = vec![0, 0, 0, 0x18];
        buf.extend_from_slice(b"ftypavif");
        buf.extend_from_slice(&[0; 8]);
        assert_eq!(detect(&buf), DetectedFormat::Unknown);
    }

    #[test]
    fn cursor_files_are_not_icons() {
        assert_eq!(detect(&[0, 0, 2, 0, 1, 0]), DetectedFormat::Unknown);
    }

    #[test]
    fn short_and_empty_buffers_are_unknown() {
        assert_eq!(detect(&[]), DetectedFormat::Unknown);
        assert_eq!(detect(&[0xff]), DetectedFormat::Unknown);
        assert_eq!(detect(b"hello world"), DetectedFormat::Unknown);
    }

    #[test]
    fn parses_format_names() {
        assert_eq!(DetectedFormat::parse("JPEG"), Some(DetectedFormat::Jpg));
        assert_eq!(DetectedFormat::parse("tif"), Some(DetectedFormat::Tiff));
        assert_eq!(DetectedFormat::parse("gif"), None);
    }
}
