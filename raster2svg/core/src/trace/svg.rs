use std::fmt::Write as FmtWrite;

use super::outline::{Outline, Point, Segment};
use super::palette::to_hex;
use crate::planner::TraceOptions;

/// One filled colour layer.
pub struct Layer {
    pub color: [u8; 4],
    pub pixels: usize,
    pub outlines: Vec<Outline>,
}

pub fn render(width: u32, height: u32, layers: &[Layer], options: &TraceOptions) -> String {
    let mut svg = String::with_capacity(256 + layers.len() * 1024);
    if options.viewbox {
        writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" viewBox=\"0 0 {width} {height}\">"
        )
        .ok();
    } else {
        writeln!(
            svg,
            "<svg xmlns=\"http://www.w3.org/2000/svg\" version=\"1.1\" width=\"{width}\" height=\"{height}\">"
        )
        .ok();
    }

    for (index, layer) in layers.iter().enumerate() {
        if layer.outlines.is_empty() {
            continue;
        }
        let hex = to_hex(layer.color);
        if options.desc {
            writeln!(
                svg,
                "  <!-- layer {index}: #{hex}, {} px, {} outline(s) -->",
                layer.pixels,
                layer.outlines.len()
            )
            .ok();
        }

        write!(svg, "  <path fill=\"#{hex}\"").ok();
        if layer.color[3] < 255 {
            write!(svg, " fill-opacity=\"{:.3}\"", f32::from(layer.color[3]) / 255.0).ok();
        }
        if options.stroke_width > 0.0 {
            write!(svg, " stroke=\"#{hex}\" stroke-width=\"{}\"", options.stroke_width).ok();
        }
        svg.push_str(" fill-rule=\"evenodd\" d=\"");
        for (n, outline) in layer.outlines.iter().enumerate() {
            if n > 0 {
                svg.push(' ');
            }
            write_outline(&mut svg, outline);
        }
        svg.push_str("\" />\n");
    }

    svg.push_str("</svg>");
    svg
}

fn write_outline(svg: &mut String, outline: &Outline) {
    write!(svg, "M{}", coords(outline.start)).ok();
    for segment in &outline.segments {
        match segment {
            Segment::Line(p) => write!(svg, " L{}", coords(*p)).ok(),
            Segment::Quad(c, p) => write!(svg, " Q{} {}", coords(*c), coords(*p)).ok(),
        };
    }
    svg.push_str(" Z");
}

fn coords(p: Point) -> String {
    format!("{},{}", round2(p.x), round2(p.y))
}

fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
