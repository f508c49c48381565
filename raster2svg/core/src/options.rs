use serde::{Deserialize, Serialize};

use crate::error::{ConvertError, Result};
use crate::governor::DEFAULT_MAX_PIXELS;
use crate::planner::{TraceOverrides, DEFAULT_QUALITY};

/// Default quality for the intermediate JPEG produced from HEIC input.
pub const DEFAULT_JPEG_QUALITY: f32 = 0.92;

/// Options accepted by every converter.
///
/// Deserializes from the camelCase object the UI layer sends; format
/// selectors that do not apply to a converter are ignored by it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ConvertOptions {
    /// Quality dial, 1-100.
    pub quality: u8,
    /// Hard pixel ceiling.
    pub max_pixels: u64,
    /// Target output width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    /// Target output height.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    pub preserve_aspect_ratio: bool,
    /// TIFF page, 0-indexed.
    pub page: usize,
    /// Preferred ICO icon width.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub preferred_size: Option<u32>,
    /// Intermediate JPEG quality for HEIC decoding, in (0, 1].
    pub jpeg_quality: f32,
    #[serde(flatten)]
    pub trace: TraceOverrides,
}

impl Default for ConvertOptions {
    fn default() -> Self {
        Self {
            quality: DEFAULT_QUALITY,
            max_pixels: DEFAULT_MAX_PIXELS,
            width: None,
            height: None,
            preserve_aspect_ratio: true,
            page: 0,
            preferred_size: None,
            jpeg_quality: DEFAULT_JPEG_QUALITY,
            trace: TraceOverrides::default(),
        }
    }
}

impl ConvertOptions {
    /// Reject parameter values no converter can honour.
    pub fn validate(&self) -> Result<()> {
        if !(1..=100).contains(&self.quality) {
            return Err(ConvertError::InvalidParameters(format!(
                "quality must be between 1 and 100, got {}",
                self.quality
            )));
        }
        if self.max_pixels == 0 {
            return Err(ConvertError::InvalidParameters(
                "maxPixels must be greater than 0".into(),
            ));
        }
        if self.width == Some(0) || self.height == Some(0) {
            return Err(ConvertError::InvalidParameters(format!(
                "target dimensions must be positive, got width={:?} height={:?}",
                self.width, self.height
            )));
        }
        if !(self.jpeg_quality > 0.0 && self.jpeg_quality <= 1.0) {
            return Err(ConvertError::InvalidParameters(format!(
                "jpegQuality must be in (0, 1], got {}",
                self.jpeg_quality
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_documented_values() {
        let options = ConvertOptions::default();
        assert_eq!(options.quality, 50);
        assert_eq!(options.max_pixels, 16_000_000);
        assert!(options.preserve_aspect_ratio);
        assert_eq!(options.page, 0);
        assert!(options.validate().is_ok());
    }

    #[test]
    fn parses_camel_case_with_tracer_fields() {
        let options: ConvertOptions = serde_json::from_str(
            r#"{"quality": 80, "preserveAspectRatio": false, "preferredSize": 48,
                "width": 100, "pathomit": 4}"#,
        )
        .expect("json");
        assert_eq!(options.quality, 80);
        assert!(!options.preserve_aspect_ratio);
        assert_eq!(options.preferred_size, Some(48));
        assert_eq!(options.width, Some(100));
        assert_eq!(options.trace.path_omit, Some(4));
        assert_eq!(options.max_pixels, 16_000_000);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let bad = [
            ConvertOptions {
                quality: 0,
                ..ConvertOptions::default()
            },
            ConvertOptions {
                quality: 101,
                ..ConvertOptions::default()
            },
            ConvertOptions {
                max_pixels: 0,
                ..ConvertOptions::default()
            },
            ConvertOptions {
                height: Some(0),
                ..ConvertOptions::default()
            },
            ConvertOptions {
                jpeg_quality: 1.5,
                ..ConvertOptions::default()
            },
        ];
        for options in bad {
            let err = options.validate().unwrap_err();
            assert_eq!(err.code(), "INVALID_PARAMETERS", "{options:?}");
        }
    }
}
