//! Raster-to-SVG conversion.
//!
//! Input bytes are sniffed, decoded from their container (JPEG, PNG, BMP,
//! ICO, TIFF, HEIC) into a single raster, size-checked, traced into colour
//! layers and written out as SVG. [`Converter`] is the entry point:
//!
//! ```no_run
//! use raster2svg_core::{ConvertOptions, Converter};
//!
//! let bytes = std::fs::read("icon.ico").unwrap();
//! let result = Converter::ico().convert(&bytes, &ConvertOptions::default(), None);
//! match result {
//!     Ok(svg) => println!("{}", svg.svg),
//!     Err(failure) => eprintln!("{}: {}", failure.code, failure.message),
//! }
//! ```

pub mod convert;
pub mod decode;
pub mod engine;
pub mod error;
pub mod format;
pub mod governor;
pub mod options;
pub mod planner;
pub mod postprocess;
pub mod raster;
pub mod trace;
mod wasm;

pub use convert::{
    convert_auto, ConversionMetadata, ConversionResult, Converter, Libraries, SvgConversion,
    SVG_MIME_TYPE, TRACE_METHOD,
};
pub use decode::{HeicCodec, HeicCodecError, IconEntry, UnavailableHeicCodec};
#[cfg(feature = "heif")]
pub use decode::LibheifCodec;
pub use engine::{EngineConfig, ProgressReporter, TracingEngine};
pub use error::{ConversionFailure, ConvertError, ErrorKind};
pub use format::{detect, DetectedFormat};
pub use options::ConvertOptions;
pub use planner::{plan, SizeTier, TraceOptions, TraceOverrides};
pub use raster::{NormalizedRaster, RasterEncoding};
pub use trace::{PaletteTracer, TraceBackend};
pub use wasm::convert_to_svg;
