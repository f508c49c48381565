//! Textual rewrites of the root `<svg>` element.
//!
//! Only the viewport declaration changes; path geometry is never touched.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static ROOT_TAG: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"<svg\b[^>]*>").expect("root tag pattern is valid"));

static VIEW_BOX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r#"\sviewBox\s*=\s*["']\s*[-+]?[\d.]+[\s,]+[-+]?[\d.]+[\s,]+([\d.]+)[\s,]+([\d.]+)\s*["']"#,
    )
    .expect("viewBox pattern is valid")
});

static WIDTH: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"(\s)width\s*=\s*["']([^"']*)["']"#).expect("width pattern is valid"));

static HEIGHT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r#"(\s)height\s*=\s*["']([^"']*)["']"#).expect("height pattern is valid")
});

/// Intrinsic size: the viewBox extent if present, else the width/height
/// attributes.
pub fn intrinsic_dimensions(svg: &str) -> Option<(f64, f64)> {
    let tag = ROOT_TAG.find(svg)?.as_str();
    view_box(tag).or_else(|| attributes(tag))
}

/// Rendered size: the width/height attributes if present, else the viewBox
/// extent.
pub fn extract_dimensions(svg: &str) -> Option<(f64, f64)> {
    let tag = ROOT_TAG.find(svg)?.as_str();
    attributes(tag).or_else(|| view_box(tag))
}

fn view_box(tag: &str) -> Option<(f64, f64)> {
    let caps = VIEW_BOX.captures(tag)?;
    Some((parse_length(&caps[1])?, parse_length(&caps[2])?))
}

fn attributes(tag: &str) -> Option<(f64, f64)> {
    let width = parse_length(&WIDTH.captures(tag)?[2])?;
    let height = parse_length(&HEIGHT.captures(tag)?[2])?;
    Some((width, height))
}

/// Accepts unitless and `px` lengths only.
fn parse_length(value: &str) -> Option<f64> {
    let value = value.trim();
    let value = value.strip_suffix("px").unwrap_or(value);
    value
        .parse::<f64>()
        .ok()
        .filter(|v| v.is_finite() && *v > 0.0)
}

/// Rewrite the root element's width/height for the requested target size.
///
/// With `preserve_aspect_ratio`, a single target derives the other axis from
/// the intrinsic aspect ratio, and two targets fit the image inside that box.
/// Without it, missing targets keep the intrinsic value. Attributes that do
/// not exist yet are inserted right after `<svg`.
pub fn resize(
    svg: &str,
    width: Option<u32>,
    height: Option<u32>,
    preserve_aspect_ratio: bool,
) -> String {
    if width.is_none() && height.is_none() {
        return svg.to_string();
    }
    let Some(tag) = ROOT_TAG.find(svg) else {
        return svg.to_string();
    };

    let size = match (intrinsic_dimensions(svg), width, height) {
        (Some(current), _, _) => target_size(current, width, height, preserve_aspect_ratio),
        (None, Some(w), Some(h)) => (f64::from(w), f64::from(h)),
        (None, _, _) => {
            log::debug!("resize skipped: svg declares no dimensions");
            return svg.to_string();
        }
    };

    let rewritten = set_attribute(tag.as_str(), &WIDTH, "width", size.0);
    let rewritten = set_attribute(&rewritten, &HEIGHT, "height", size.1);
    format!("{}{}{}", &svg[..tag.start()], rewritten, &svg[tag.end()..])
}

fn target_size(
    (width, height): (f64, f64),
    target_width: Option<u32>,
    target_height: Option<u32>,
    preserve_aspect_ratio: bool,
) -> (f64, f64) {
    let tw = target_width.map(f64::from);
    let th = target_height.map(f64::from);
    if !preserve_aspect_ratio {
        return (tw.unwrap_or(width), th.unwrap_or(height));
    }

    let aspect = width / height;
    let whole = |v: f64| v.round().max(1.0);
    match (tw, th) {
        (Some(tw), None) => (tw, whole(tw / aspect)),
        (None, Some(th)) => (whole(th * aspect), th),
        (Some(tw), Some(th)) => {
            let scale = (tw / width).min(th / height);
            (whole(width * scale), whole(height * scale))
        }
        (None, None) => (width, height),
    }
}

fn set_attribute(tag: &str, pattern: &Regex, name: &str, value: f64) -> String {
    if pattern.is_match(tag) {
        pattern
            .replace(tag, |caps: &Captures| format!("{}{name}=\"{value}\"", &caps[1]))
            .into_owned()
    } else {
        format!("<svg {name}=\"{value}\"{}", &tag["<svg".len()..])
    }
}
