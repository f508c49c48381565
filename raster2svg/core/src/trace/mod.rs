//! The bitmap-to-vector tracing primitive.
//!
//! [`PaletteTracer`] reduces the raster to a small palette, removes speckles,
//! traces each colour layer into closed outlines and writes one even-odd
//! `<path>` per layer.

pub mod outline;
pub mod palette;
pub mod regions;
pub mod svg;

use crate::error::{ConvertError, Result};
use crate::planner::TraceOptions;
use crate::raster::NormalizedRaster;

use self::outline::Point;
use self::palette::TRANSPARENT;
use self::svg::Layer;

/// Turns a raster into SVG markup.
///
/// Implementations must be callable from the worker thread, and report
/// progress in [0, 1] relative to their own work.
pub trait TraceBackend: Send + Sync {
    fn trace(
        &self,
        raster: &NormalizedRaster,
        options: &TraceOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<String>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct PaletteTracer;

impl TraceBackend for PaletteTracer {
    fn trace(
        &self,
        raster: &NormalizedRaster,
        options: &TraceOptions,
        progress: &mut dyn FnMut(f64),
    ) -> Result<String> {
        let image = raster.decode()?.to_rgba8();
        let (width, height) = image.dimensions();
        if width == 0 || height == 0 {
            return Err(ConvertError::Trace(format!(
                "cannot trace an empty {width}x{height} raster"
            )));
        }
        progress(0.05);

        let image = palette::selective_blur(&image, options.blur_radius, options.blur_delta);
        progress(0.1);

        let mut colors = palette::build_palette(&image, options.number_of_colors.max(1) as usize);
        palette::refine(&image, &mut colors, options.color_quant_cycles);
        progress(0.3);

        let (w, h) = (width as usize, height as usize);
        let mut indexed = palette::map_to_palette(&image, &colors);
        let merged = regions::merge_speckles(&mut indexed, w, h, options.path_omit);
        progress(0.45);

        let mut counts = vec![0usize; colors.len()];
        for &index in indexed.iter().filter(|&&i| i != TRANSPARENT) {
            counts[index] += 1;
        }
        let mut order: Vec<usize> = (0..colors.len()).filter(|&i| counts[i] > 0).collect();
        order.sort_by(|&a, &b| counts[b].cmp(&counts[a]).then(a.cmp(&b)));

        let line_tolerance = f64::from(options.line_threshold) / 10.0;
        let quad_tolerance = f64::from(options.quad_threshold) / 10.0;
        let mut layers = Vec::with_capacity(order.len());
        for (done, &index) in order.iter().enumerate() {
            let outlines = outline::trace_layer(&indexed, w, h, index)
                .into_iter()
                .filter_map(|polygon| {
                    let points: Vec<Point> = polygon
                        .iter()
                        .map(|&(x, y)| Point::new(f64::from(x), f64::from(y)))
                        .collect();
                    let simplified = outline::simplify(&points, line_tolerance);
                    (simplified.len() >= 3).then(|| {
                        outline::smooth(&simplified, options.right_angle_enhance, quad_tolerance)
                    })
                })
                .collect();
            layers.push(Layer {
                color: colors[index],
                pixels: counts[index],
                outlines,
            });
            progress(0.45 + 0.5 * (done + 1) as f64 / order.len() as f64);
        }

        log::debug!(
            "traced {width}x{height}: {} layer(s) from {} colour(s), {merged} speckle(s) merged",
            layers.len(),
            colors.len()
        );
        let markup = svg::render(width, height, &layers, options);
        progress(1.0);
        Ok(markup)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{DynamicImage, Rgba, RgbaImage};

    fn raster(image: RgbaImage) -> NormalizedRaster {
        NormalizedRaster::from_image(&DynamicImage::ImageRgba8(image)).expect("encode")
    }

    fn quadrants() -> RgbaImage {
        RgbaImage::from_fn(16, 16, |x, y| match (x < 8, y < 8) {
            (true, true) => Rgba([255, 0, 0, 255]),
            (false, true) => Rgba([0, 255, 0, 255]),
            (true, false) => Rgba([0, 0, 255, 255]),
            (false, false) => Rgba([255, 255, 255, 255]),
        })
    }

    #[test]
    fn creates_svg_output() {
        let mut seen = Vec::new();
        let svg = PaletteTracer
            .trace(&raster(quadrants()), &TraceOptions::default(), &mut |p| seen.push(p))
            .expect("trace");

        assert!(svg.starts_with("<svg"));
        assert!(svg.contains("width=\"16\" height=\"16\""));
        for hex in ["ff0000", "00ff00", "0000ff", "ffffff"] {
            assert!(svg.contains(&format!("fill=\"#{hex}\"")), "missing layer {hex}");
        }
        assert_eq!(seen.last(), Some(&1.0));
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn palette_size_bounds_layers() {
        let gradient = RgbaImage::from_fn(32, 8, |x, _| Rgba([(x * 8) as u8, 0, 0, 255]));
        let options = TraceOptions {
            number_of_colors: 3,
            path_omit: 0,
            ..TraceOptions::default()
        };
        let svg = PaletteTracer
            .trace(&raster(gradient), &options, &mut |_| {})
            .expect("trace");
        assert!(svg.matches("<path").count() <= 3);
    }

    #[test]
    fn fully_transparent_image_has_no_paths() {
        let empty = RgbaImage::from_pixel(5, 5, Rgba([0, 0, 0, 0]));
        let svg = PaletteTracer
            .trace(&raster(empty), &TraceOptions::default(), &mut |_| {})
            .expect("trace");
        assert!(!svg.contains("<path"));
    }

    #[test]
    fn speckles_are_absorbed() {
        let mut image = RgbaImage::from_pixel(10, 10, Rgba([20, 20, 20, 255]));
        image.put_pixel(5, 5, Rgba([250, 250, 250, 255]));
        let options = TraceOptions {
            path_omit: 4,
            ..TraceOptions::default()
        };
        let svg = PaletteTracer
            .trace(&raster(image), &options, &mut |_| {})
            .expect("trace");
        assert_eq!(svg.matches("<path").count(), 1);
        assert!(!svg.contains("fafafa"));
    }
}
