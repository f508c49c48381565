use std::any::Any;
use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::format::DetectedFormat;

/// Broad failure classes. The UI uses these to decide whether to suggest
/// another file, another browser/runtime, or a smaller image.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ErrorKind {
    Validation,
    Environment,
    Resource,
    Execution,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation => f.write_str("validation"),
            Self::Environment => f.write_str("environment"),
            Self::Resource => f.write_str("resource"),
            Self::Execution => f.write_str("execution"),
        }
    }
}

#[derive(Debug, Error)]
pub enum ConvertError {
    #[error("expected {expected} file but detected {detected} format")]
    FormatMismatch {
        expected: DetectedFormat,
        detected: DetectedFormat,
    },
    #[error("{0}")]
    FileValidation(String),
    #[error("unsupported format '{format}': {message}")]
    UnsupportedFormat { format: String, message: String },
    #[error("invalid parameters: {0}")]
    InvalidParameters(String),

    #[error("invalid ICO file: too small ({len} bytes, header needs 6)")]
    IcoInvalidHeader { len: usize },
    #[error("invalid ICO file: wrong type {found} (expected 1 for icons)")]
    IcoInvalidType { found: u16 },
    #[error("invalid ICO file: no icons found")]
    IcoNoIcons,
    #[error("invalid ICO file: directory entry {index} ends at byte {end} but file is {len} bytes")]
    IcoInvalidDirectory { index: usize, end: usize, len: usize },
    #[error("invalid ICO file: icon data at offset {offset} with length {size} exceeds file length {len}")]
    IcoInvalidData { offset: u64, size: u64, len: usize },

    #[error("invalid TIFF file: no pages found")]
    TiffNoPages,
    #[error("{}", page_message(.requested, .count))]
    InvalidPageNumber { requested: usize, count: usize },
    #[error("failed to extract TIFF page: {0}")]
    TiffExtraction(String),

    #[error("{0}")]
    EnvironmentUnsupported(String),
    #[error("HEIC decoding failed: {0}")]
    HeicDecode(String),

    #[error("{}", file_size_message(.format, .size, .limit))]
    FileTooLarge {
        format: DetectedFormat,
        size: usize,
        limit: usize,
    },
    #[error("{}", too_large_message(.width, .height, .max_pixels))]
    ImageTooLarge {
        width: u32,
        height: u32,
        max_pixels: u64,
    },

    #[error("failed to decode raster: {0}")]
    RasterDecode(#[from] image::ImageError),
    #[error("failed to encode raster: {0}")]
    RasterEncode(String),
    #[error("tracing failed: {0}")]
    Trace(String),
    #[error("image tracing timeout after {secs}s")]
    TraceTimeout { secs: u64 },
    #[error("tracing worker unavailable: {0}")]
    WorkerUnavailable(String),
    #[error("failed to load required libraries: {0}")]
    LibraryLoad(String),

    #[error("{format} to SVG conversion failed: {message}")]
    Conversion {
        format: DetectedFormat,
        message: String,
    },
}

fn page_message(requested: &usize, count: &usize) -> String {
    format!(
        "page {requested} does not exist. TIFF has {count} page(s) (0-indexed, valid range 0..={})",
        count.saturating_sub(1)
    )
}

fn file_size_message(format: &DetectedFormat, size: &usize, limit: &usize) -> String {
    const MB: f64 = 1024.0 * 1024.0;
    format!(
        "file size ({:.1}MB) exceeds the maximum allowed size for {format} files ({:.1}MB). \
         Please use a smaller file or compress it before uploading.",
        *size as f64 / MB,
        *limit as f64 / MB,
    )
}

fn too_large_message(width: &u32, height: &u32, max_pixels: &u64) -> String {
    let pixels = f64::from(*width) * f64::from(*height);
    let side = (*max_pixels as f64).sqrt().floor() as u64;
    format!(
        "image is too large ({width}x{height} = {:.1}MP). Maximum supported size is {:.0}MP \
         (approximately {side}x{side}). Please resize your image before converting.",
        pixels / 1_000_000.0,
        *max_pixels as f64 / 1_000_000.0,
    )
}

impl ConvertError {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Self::FormatMismatch { .. } => "FORMAT_MISMATCH",
            Self::FileValidation(_) => "FILE_VALIDATION_FAILED",
            Self::UnsupportedFormat { .. } => "UNSUPPORTED_FORMAT",
            Self::InvalidParameters(_) => "INVALID_PARAMETERS",
            Self::IcoInvalidHeader { .. } => "ICO_INVALID_HEADER",
            Self::IcoInvalidType { .. } => "ICO_INVALID_TYPE",
            Self::IcoNoIcons => "ICO_NO_ICONS",
            Self::IcoInvalidDirectory { .. } => "ICO_INVALID_DIRECTORY",
            Self::IcoInvalidData { .. } => "ICO_INVALID_DATA",
            Self::TiffNoPages => "TIFF_NO_PAGES",
            Self::InvalidPageNumber { .. } => "INVALID_PAGE_NUMBER",
            Self::TiffExtraction(_) => "TIFF_EXTRACTION_FAILED",
            Self::EnvironmentUnsupported(_) => "BROWSER_NOT_SUPPORTED",
            Self::HeicDecode(_) => "HEIC_DECODE_FAILED",
            Self::FileTooLarge { .. } => "FILE_SIZE_EXCEEDED",
            Self::ImageTooLarge { .. } => "IMAGE_TOO_LARGE",
            Self::RasterDecode(_) => "RASTER_DECODE_FAILED",
            Self::RasterEncode(_) => "RASTER_ENCODE_FAILED",
            Self::Trace(_) => "TRACE_FAILED",
            Self::TraceTimeout { .. } => "TRACE_TIMEOUT",
            Self::WorkerUnavailable(_) => "WORKER_UNAVAILABLE",
            Self::LibraryLoad(_) => "LIBRARY_LOAD_FAILED",
            Self::Conversion { format, .. } => format.failure_code(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::EnvironmentUnsupported(_) => ErrorKind::Environment,
            Self::FileTooLarge { .. } | Self::ImageTooLarge { .. } => ErrorKind::Resource,
            Self::RasterDecode(_)
            | Self::RasterEncode(_)
            | Self::Trace(_)
            | Self::TraceTimeout { .. }
            | Self::WorkerUnavailable(_)
            | Self::LibraryLoad(_)
            | Self::Conversion { .. } => ErrorKind::Execution,
            _ => ErrorKind::Validation,
        }
    }
}

/// The failure half of a [`ConversionResult`](crate::ConversionResult).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Error)]
#[error("[{code}] {message}")]
pub struct ConversionFailure {
    pub kind: ErrorKind,
    pub code: String,
    pub message: String,
}

impl From<ConvertError> for ConversionFailure {
    fn from(error: ConvertError) -> Self {
        Self {
            kind: error.kind(),
            code: error.code().to_string(),
            message: error.to_string(),
        }
    }
}

pub type Result<T, E = ConvertError> = std::result::Result<T, E>;

/// Text of a caught panic payload.
pub(crate) fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| (*s).to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".into())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn too_large_message_names_dimensions_and_ceiling() {
        let err = ConvertError::ImageTooLarge {
            width: 5000,
            height: 5000,
            max_pixels: 16_000_000,
        };
        let msg = err.to_string();
        assert!(msg.contains("5000x5000"));
        assert!(msg.contains("25.0MP"));
        assert!(msg.contains("16MP"));
        assert!(msg.contains("4000x4000"));
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn file_size_message_names_format_and_limit() {
        let err = ConvertError::FileTooLarge {
            format: DetectedFormat::Ico,
            size: 2 * 1024 * 1024,
            limit: 1024 * 1024,
        };
        let msg = err.to_string();
        assert!(msg.contains("2.0MB"), "{msg}");
        assert!(msg.contains("ICO files (1.0MB)"), "{msg}");
        assert_eq!(err.code(), "FILE_SIZE_EXCEEDED");
        assert_eq!(err.kind(), ErrorKind::Resource);
    }

    #[test]
    fn page_error_mentions_count() {
        let err = ConvertError::InvalidPageNumber {
            requested: 5,
            count: 3,
        };
        assert_eq!(err.code(), "INVALID_PAGE_NUMBER");
        assert!(err.to_string().contains("3 page(s)"));
        assert!(err.to_string().contains("0..=2"));
    }

    #[test]
    fn environment_errors_are_distinct() {
        let failure = ConversionFailure::from(ConvertError::EnvironmentUnsupported(
            "no codec".into(),
        ));
        assert_eq!(failure.kind, ErrorKind::Environment);
        assert_eq!(failure.code, "BROWSER_NOT_SUPPORTED");
    }

    #[test]
    fn wrapped_failures_use_format_code() {
        let err = ConvertError::Conversion {
            format: DetectedFormat::Ico,
            message: "boom".into(),
        };
        assert_eq!(err.code(), "ICO_TO_SVG_FAILED");
        assert_eq!(err.to_string(), "ICO to SVG conversion failed: boom");
    }
}
