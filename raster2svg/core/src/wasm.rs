use serde_json::{json, Value};
use wasm_bindgen::prelude::*;

use crate::convert::Converter;
use crate::error::{ConversionFailure, ConvertError};
use crate::format::DetectedFormat;
use crate::options::ConvertOptions;

/// Convert `bytes` and return the outcome as JSON:
/// `{"success": true, "data", "mimeType", "metadata"}` or
/// `{"success": false, "error": {"kind", "code", "message"}}`.
///
/// `format` names the source format (`"auto"` sniffs it); `options_json` is
/// an optional camelCase options object.
#[wasm_bindgen(js_name = convertToSvg)]
pub fn convert_to_svg(format: &str, bytes: &[u8], options_json: Option<String>) -> String {
    envelope(convert(format, bytes, options_json.as_deref())).to_string()
}

fn convert(
    format: &str,
    bytes: &[u8],
    options_json: Option<&str>,
) -> Result<crate::convert::SvgConversion, ConversionFailure> {
    let options = match options_json.map(str::trim).filter(|s| !s.is_empty()) {
        Some(json) => serde_json::from_str::<ConvertOptions>(json)
            .map_err(|e| ConvertError::InvalidParameters(format!("options: {e}")))?,
        None => ConvertOptions::default(),
    };
    let converter = if format.eq_ignore_ascii_case("auto") {
        Converter::auto(bytes)?
    } else {
        let parsed = DetectedFormat::parse(format).ok_or_else(|| ConvertError::UnsupportedFormat {
            format: format.to_string(),
            message: "unknown source format".into(),
        })?;
        Converter::new(parsed)?
    };
    converter.convert(bytes, &options, None)
}

fn envelope(result: Result<crate::convert::SvgConversion, ConversionFailure>) -> Value {
    match result {
        Ok(conversion) => json!({
            "success": true,
            "data": conversion.svg,
            "mimeType": conversion.mime_type,
            "metadata": conversion.metadata,
        }),
        Err(failure) => json!({
            "success": false,
            "error": failure,
        }),
    }
}
