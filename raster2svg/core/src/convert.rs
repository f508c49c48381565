//! Per-format converters.
//!
//! Every [`Converter`] runs the same pipeline: bound the file size, confirm
//! the format, decode to
//! a [`NormalizedRaster`](crate::raster::NormalizedRaster), enforce the pixel
//! ceiling, downscale, plan, trace, resize. Only the decoder differs between
//! formats. Failures of any kind, panics included, come back as a
//! [`ConversionFailure`].

use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::time::{Duration, Instant};

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

use crate::decode::{Decoder, HeicCodec};
use crate::engine::{EngineConfig, ProgressReporter, TracingEngine};
use crate::error::{panic_message, ConversionFailure, ConvertError, ErrorKind, Result};
use crate::format::{self, DetectedFormat};
use crate::governor::{self, DEFAULT_EFFICIENT_PIXELS};
use crate::options::ConvertOptions;
use crate::planner;
use crate::postprocess;
use crate::raster::RasterEncoding;
use crate::trace::{PaletteTracer, TraceBackend};

pub const SVG_MIME_TYPE: &str = "image/svg+xml";

/// Reported as `metadata.method` for every traced result.
pub const TRACE_METHOD: &str = "imagetracerjs";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversionMetadata {
    pub width: f64,
    pub height: f64,
    pub method: String,
    pub quality: u8,
    /// Output size in bytes.
    pub size: usize,
    pub format: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SvgConversion {
    pub svg: String,
    pub mime_type: String,
    pub metadata: ConversionMetadata,
}

pub type ConversionResult = std::result::Result<SvgConversion, ConversionFailure>;

static SHARED: OnceCell<Libraries> = OnceCell::new();

/// Decode and trace back-ends, loaded once and shared by all converters.
pub struct Libraries {
    heic: Arc<dyn HeicCodec>,
    engine: TracingEngine,
}

impl Libraries {
    pub fn new(tracer: Arc<dyn TraceBackend>, heic: Arc<dyn HeicCodec>, config: EngineConfig) -> Self {
        Self {
            heic,
            engine: TracingEngine::new(tracer, config),
        }
    }

    /// Build the default back-ends.
    pub fn load(config: EngineConfig) -> anyhow::Result<Self> {
        anyhow::ensure!(
            config.job_timeout > Duration::ZERO,
            "job timeout must be positive"
        );
        anyhow::ensure!(
            !config.use_worker || config.worker_init_timeout > Duration::ZERO,
            "worker init timeout must be positive"
        );
        Ok(Self::new(Arc::new(PaletteTracer), default_heic_codec(), config))
    }

    /// The process-wide instance, initialized on first use.
    ///
    /// Concurrent first callers wait for a single initialization. A failed
    /// initialization is not cached; the next call tries again.
    pub fn shared() -> Result<&'static Self> {
        SHARED.get_or_try_init(|| {
            log::debug!("loading conversion libraries");
            Self::load(EngineConfig::default())
                .map_err(|e| ConvertError::LibraryLoad(format!("{e:#}")))
        })
    }

    pub fn engine(&self) -> &TracingEngine {
        &self.engine
    }
}

#[cfg(feature = "heif")]
fn default_heic_codec() -> Arc<dyn HeicCodec> {
    Arc::new(crate::decode::LibheifCodec)
}

#[cfg(not(feature = "heif"))]
fn default_heic_codec() -> Arc<dyn HeicCodec> {
    Arc::new(crate::decode::UnavailableHeicCodec)
}

/// Converter for one source format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Converter {
    format: DetectedFormat,
}

impl Converter {
    pub fn new(format: DetectedFormat) -> Result<Self> {
        if format == DetectedFormat::Unknown {
            return Err(ConvertError::UnsupportedFormat {
                format: format.as_str().into(),
                message: "no converter for this file type".into(),
            });
        }
        Ok(Self { format })
    }

    pub const fn jpg() -> Self {
        Self {
            format: DetectedFormat::Jpg,
        }
    }

    pub const fn png() -> Self {
        Self {
            format: DetectedFormat::Png,
        }
    }

    pub const fn bmp() -> Self {
        Self {
            format: DetectedFormat::Bmp,
        }
    }

    pub const fn ico() -> Self {
        Self {
            format: DetectedFormat::Ico,
        }
    }

    pub const fn tiff() -> Self {
        Self {
            format: DetectedFormat::Tiff,
        }
    }

    pub const fn heic() -> Self {
        Self {
            format: DetectedFormat::Heic,
        }
    }

    /// Pick the converter from the buffer's content.
    pub fn auto(buffer: &[u8]) -> Result<Self> {
        Self::new(format::detect(buffer))
    }

    pub const fn format(&self) -> DetectedFormat {
        self.format
    }

    /// Convert with the process-wide [`Libraries`].
    pub fn convert(
        &self,
        buffer: &[u8],
        options: &ConvertOptions,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> ConversionResult {
        match Libraries::shared() {
            Ok(libraries) => self.convert_with(libraries, buffer, options, on_progress),
            Err(e) => Err(self.fail(e)),
        }
    }

    pub fn convert_with(
        &self,
        libraries: &Libraries,
        buffer: &[u8],
        options: &ConvertOptions,
        on_progress: Option<&mut dyn FnMut(f64)>,
    ) -> ConversionResult {
        let started = Instant::now();
        let mut progress = ProgressReporter::new(on_progress);
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
            self.run(libraries, buffer, options, &mut progress)
        }))
        .unwrap_or_else(|payload| {
            Err(ConvertError::Conversion {
                format: self.format,
                message: format!("internal panic: {}", panic_message(payload.as_ref())),
            })
        });

        match outcome {
            Ok(result) => {
                log::info!(
                    "{} -> svg: {}x{}, {} bytes in {:?}",
                    self.format,
                    result.metadata.width,
                    result.metadata.height,
                    result.metadata.size,
                    started.elapsed()
                );
                Ok(result)
            }
            Err(e) => Err(self.fail(e)),
        }
    }

    fn run(
        &self,
        libraries: &Libraries,
        buffer: &[u8],
        options: &ConvertOptions,
        progress: &mut ProgressReporter<'_>,
    ) -> Result<SvgConversion> {
        options.validate()?;
        governor::validate_file(buffer, self.format)?;
        let detected = format::detect(buffer);
        if detected != self.format {
            return Err(ConvertError::FormatMismatch {
                expected: self.format,
                detected,
            });
        }

        let raster = self.decoder(libraries, options)?.decode(buffer, options.max_pixels)?;
        governor::validate_size(raster.width, raster.height, options.max_pixels)?;
        log::debug!(
            "decoded {} input to {}x{} {}",
            self.format,
            raster.width,
            raster.height,
            raster.encoding.mime_type()
        );
        progress.report(0.1);

        let raster = governor::downscale_if_needed(raster, DEFAULT_EFFICIENT_PIXELS)?;
        progress.report(0.2);

        let (traced_width, traced_height) = (raster.width, raster.height);
        let trace_options = planner::plan(
            traced_width,
            traced_height,
            options.quality,
            &options.trace,
        );
        let svg = libraries
            .engine
            .trace(Arc::new(raster), &trace_options, progress)?;

        let svg = postprocess::resize(
            &svg,
            options.width,
            options.height,
            options.preserve_aspect_ratio,
        );
        let (width, height) = postprocess::extract_dimensions(&svg)
            .unwrap_or((f64::from(traced_width), f64::from(traced_height)));
        progress.report(1.0);

        Ok(SvgConversion {
            metadata: ConversionMetadata {
                width,
                height,
                method: TRACE_METHOD.into(),
                quality: options.quality,
                size: svg.len(),
                format: "svg".into(),
            },
            svg,
            mime_type: SVG_MIME_TYPE.into(),
        })
    }

    fn decoder<'a>(&self, libraries: &'a Libraries, options: &ConvertOptions) -> Result<Decoder<'a>> {
        Ok(match self.format {
            DetectedFormat::Jpg => Decoder::Passthrough(RasterEncoding::Jpeg),
            DetectedFormat::Png => Decoder::Passthrough(RasterEncoding::Png),
            DetectedFormat::Bmp => Decoder::Passthrough(RasterEncoding::Bmp),
            DetectedFormat::Ico => Decoder::Ico {
                preferred_size: options.preferred_size,
            },
            DetectedFormat::Tiff => Decoder::Tiff { page: options.page },
            DetectedFormat::Heic => Decoder::Heic {
                codec: libraries.heic.as_ref(),
                jpeg_quality: options.jpeg_quality,
            },
            DetectedFormat::Unknown => {
                return Err(ConvertError::UnsupportedFormat {
                    format: "unknown".into(),
                    message: "no decoder for this file type".into(),
                })
            }
        })
    }

    /// Library errors without a code of their own are reported under the
    /// format's `<FORMAT>_TO_SVG_FAILED` code.
    fn fail(&self, error: ConvertError) -> ConversionFailure {
        let error = match error {
            ConvertError::RasterDecode(_) | ConvertError::RasterEncode(_) | ConvertError::Trace(_) => {
                ConvertError::Conversion {
                    format: self.format,
                    message: error.to_string(),
                }
            }
            other => other,
        };
        let failure = ConversionFailure::from(error);
        if failure.kind == ErrorKind::Execution {
            log::warn!("{} conversion failed: {failure}", self.format);
        } else {
            log::debug!("{} conversion rejected: {failure}", self.format);
        }
        failure
    }
}

/// Convert `buffer` with the converter matching its content.
pub fn convert_auto(
    buffer: &[u8],
    options: &ConvertOptions,
    on_progress: Option<&mut dyn FnMut(f64)>,
) -> ConversionResult {
    Converter::auto(buffer)
        .map_err(ConversionFailure::from)?
        .convert(buffer, options, on_progress)
}
