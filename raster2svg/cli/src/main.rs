use std::fs;
use std::path::PathBuf;
use std::process;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::{ArgAction, Parser};
use raster2svg_core::{ConvertOptions, Converter, DetectedFormat, EngineConfig, Libraries};

/// Command-line front-end for the raster2svg core engine.
#[derive(Parser, Debug)]
#[command(
    name = "raster2svg",
    about = "Convert JPEG, PNG, BMP, ICO, TIFF and HEIC images into SVG",
    long_about = "Convert raster images into SVG by palette reduction and outline tracing. \
                  The source format is detected from the file content unless --format is given."
)]
struct Cli {
    /// Path to the input image.
    input: PathBuf,
    /// Optional path to write the SVG output. Defaults to stdout.
    #[arg(short, long)]
    output: Option<PathBuf>,
    /// Force a source format instead of sniffing the content.
    #[arg(long, value_parser = parse_format, value_name = "jpg|png|bmp|ico|tiff|heic")]
    format: Option<DetectedFormat>,
    /// JSON file with conversion options (camelCase keys). Flags override it.
    #[arg(long, value_name = "FILE")]
    options: Option<PathBuf>,
    #[arg(
        short = 'q',
        long,
        value_parser = parse_quality,
        help = "Trace quality (1-100). Higher keeps more colours and detail."
    )]
    quality: Option<u8>,
    /// Reject images with more pixels than this.
    #[arg(long)]
    max_pixels: Option<u64>,
    /// Output width in pixels.
    #[arg(short = 'W', long)]
    width: Option<u32>,
    /// Output height in pixels.
    #[arg(short = 'H', long)]
    height: Option<u32>,
    /// Stretch to --width/--height instead of fitting inside them.
    #[arg(long, action = ArgAction::SetTrue)]
    stretch: bool,
    /// TIFF page to convert (0-indexed).
    #[arg(long)]
    page: Option<usize>,
    /// Preferred ICO icon width.
    #[arg(long)]
    preferred_size: Option<u32>,
    #[arg(
        long,
        value_parser = parse_jpeg_quality,
        help = "Quality of the intermediate JPEG for HEIC input (0.01-1.0)."
    )]
    jpeg_quality: Option<f32>,
    #[arg(
        short = 'c',
        long,
        value_parser = parse_colors,
        help = "Number of colors to quantize the image to (2-64)."
    )]
    colors: Option<u32>,
    /// Regions smaller than this many pixels are merged away.
    #[arg(long)]
    path_omit: Option<u32>,
    /// Emit a viewBox instead of width/height.
    #[arg(long, action = ArgAction::SetTrue)]
    viewbox: bool,
    /// Trace on the calling thread only.
    #[arg(long, action = ArgAction::SetTrue)]
    no_worker: bool,
    /// Seconds before a worker job is abandoned.
    #[arg(long, default_value_t = 120)]
    job_timeout: u64,
    /// Log pipeline stages and progress.
    #[arg(long, action = ArgAction::SetTrue)]
    debug: bool,
}

fn parse_format(value: &str) -> Result<DetectedFormat, String> {
    DetectedFormat::parse(value).ok_or_else(|| "format must be one of: jpg, png, bmp, ico, tiff, heic".into())
}

fn parse_quality(value: &str) -> Result<u8, String> {
    let parsed: u8 = value
        .parse()
        .map_err(|_| "quality must be a whole number between 1 and 100".to_string())?;
    if (1..=100).contains(&parsed) {
        Ok(parsed)
    } else {
        Err("quality must be between 1 and 100".into())
    }
}

fn parse_colors(value: &str) -> Result<u32, String> {
    let parsed: u32 = value
        .parse()
        .map_err(|_| "colors must be a whole number between 2 and 64".to_string())?;
    if (2..=64).contains(&parsed) {
        Ok(parsed)
    } else {
        Err("colors must be between 2 and 64".into())
    }
}

fn parse_jpeg_quality(value: &str) -> Result<f32, String> {
    let parsed: f32 = value
        .parse()
        .map_err(|_| "jpeg-quality must be a number between 0.01 and 1.0".to_string())?;
    if (0.01..=1.0).contains(&parsed) {
        Ok(parsed)
    } else {
        Err("jpeg-quality must be between 0.01 and 1.0".into())
    }
}

fn main() {
    if let Err(err) = run() {
        eprintln!("[raster2svg] error: {err}");
        for cause in err.chain().skip(1) {
            eprintln!("  caused by: {cause}");
        }
        process::exit(1);
    }
}

fn run() -> Result<()> {
    let cli = Cli::parse();
    let default_filter = if cli.debug { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    let bytes = fs::read(&cli.input)
        .with_context(|| format!("failed to read input file: {}", cli.input.display()))?;

    let options = build_options(&cli)?;
    log::debug!("options: {options:?}");

    let converter = match cli.format {
        Some(format) => Converter::new(format)?,
        None => Converter::auto(&bytes)
            .with_context(|| format!("cannot convert {}", cli.input.display()))?,
    };

    let libraries = Libraries::load(EngineConfig {
        use_worker: !cli.no_worker,
        job_timeout: Duration::from_secs(cli.job_timeout),
        ..EngineConfig::default()
    })
    .context("failed to initialize the conversion engine")?;

    let mut on_progress = |p: f64| log::debug!("progress {:>3.0}%", p * 100.0);
    let result = converter
        .convert_with(&libraries, &bytes, &options, Some(&mut on_progress))
        .with_context(|| format!("failed to convert {}", cli.input.display()))?;
    libraries.engine().terminate();

    match cli.output {
        Some(path) => {
            fs::write(&path, &result.svg)
                .with_context(|| format!("failed to write {}", path.display()))?;
            log::info!(
                "wrote {} ({}x{}, {} bytes)",
                path.display(),
                result.metadata.width,
                result.metadata.height,
                result.metadata.size
            );
        }
        None => {
            println!("{}", result.svg);
        }
    }

    Ok(())
}

/// Options from `--options`, then individual flags on top.
fn build_options(cli: &Cli) -> Result<ConvertOptions> {
    let mut options = match &cli.options {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read options file: {}", path.display()))?;
            serde_json::from_str(&text)
                .with_context(|| format!("invalid options file: {}", path.display()))?
        }
        None => ConvertOptions::default(),
    };

    if let Some(quality) = cli.quality {
        options.quality = quality;
    }
    if let Some(max_pixels) = cli.max_pixels {
        options.max_pixels = max_pixels;
    }
    if cli.width.is_some() {
        options.width = cli.width;
    }
    if cli.height.is_some() {
        options.height = cli.height;
    }
    if cli.stretch {
        options.preserve_aspect_ratio = false;
    }
    if let Some(page) = cli.page {
        options.page = page;
    }
    if cli.preferred_size.is_some() {
        options.preferred_size = cli.preferred_size;
    }
    if let Some(jpeg_quality) = cli.jpeg_quality {
        options.jpeg_quality = jpeg_quality;
    }
    if cli.colors.is_some() {
        options.trace.number_of_colors = cli.colors;
    }
    if cli.path_omit.is_some() {
        options.trace.path_omit = cli.path_omit;
    }
    if cli.viewbox {
        options.trace.viewbox = Some(true);
    }

    options.validate()?;
    Ok(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "raster2svg",
            "in.tiff",
            "--page",
            "2",
            "-W",
            "64",
            "--stretch",
            "--colors",
            "4",
            "--viewbox",
        ]);
        let options = build_options(&cli).expect("options");
        assert_eq!(options.page, 2);
        assert_eq!(options.width, Some(64));
        assert!(!options.preserve_aspect_ratio);
        assert_eq!(options.trace.number_of_colors, Some(4));
        assert_eq!(options.trace.viewbox, Some(true));
        assert_eq!(options.quality, 50);
    }

    #[test]
    fn rejects_out_of_range_quality() {
        assert!(Cli::try_parse_from(["raster2svg", "in.png", "-q", "0"]).is_err());
        assert!(Cli::try_parse_from(["raster2svg", "in.png", "--format", "gif"]).is_err());
    }
}
