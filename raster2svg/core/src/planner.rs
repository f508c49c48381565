//! Derives tracing parameters from image size and the quality dial.
//!
//! Larger images get fewer colours and more aggressive path omission so the
//! trace stays tractable. For very large inputs the palette and quantization
//! caps hold even against explicit caller overrides.

use serde::{Deserialize, Serialize};

/// Quality dial default when the caller gives none.
pub const DEFAULT_QUALITY: u8 = 50;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SizeTier {
    /// Up to 1MP.
    Normal,
    /// Up to 4MP.
    Large,
    /// Up to 10MP.
    VeryLarge,
    Extreme,
}

impl SizeTier {
    pub fn classify(width: u32, height: u32) -> Self {
        match u64::from(width) * u64::from(height) {
            0..=1_000_000 => Self::Normal,
            1_000_001..=4_000_000 => Self::Large,
            4_000_001..=10_000_000 => Self::VeryLarge,
            _ => Self::Extreme,
        }
    }

    const fn base_colors(self) -> u32 {
        match self {
            Self::Normal => 8,
            Self::Large => 6,
            Self::VeryLarge => 4,
            Self::Extreme => 3,
        }
    }

    const fn base_path_omit(self) -> u32 {
        match self {
            Self::Normal => 12,
            Self::Large => 15,
            Self::VeryLarge => 20,
            Self::Extreme => 25,
        }
    }

    /// `(max colours, max quantization cycles)` for tiers with a hard cap.
    pub const fn caps(self) -> Option<(u32, u32)> {
        match self {
            Self::Normal | Self::Large => None,
            Self::VeryLarge => Some((6, 1)),
            Self::Extreme => Some((4, 1)),
        }
    }
}

/// Parameters handed to the tracing primitive.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceOptions {
    #[serde(rename = "numberofcolors")]
    pub number_of_colors: u32,
    #[serde(rename = "colorquantcycles")]
    pub color_quant_cycles: u32,
    /// Regions smaller than this many pixels are merged into a neighbour.
    #[serde(rename = "pathomit")]
    pub path_omit: u32,
    #[serde(rename = "blurradius")]
    pub blur_radius: u32,
    #[serde(rename = "blurdelta")]
    pub blur_delta: u32,
    #[serde(rename = "strokewidth")]
    pub stroke_width: f32,
    /// Tolerated deviation when straightening outlines, in tenths of a pixel.
    #[serde(rename = "linethreshold")]
    pub line_threshold: f32,
    #[serde(rename = "quadthreshold")]
    pub quad_threshold: f32,
    #[serde(rename = "rightangleenhance")]
    pub right_angle_enhance: bool,
    pub viewbox: bool,
    pub desc: bool,
}

impl Default for TraceOptions {
    fn default() -> Self {
        plan(0, 0, DEFAULT_QUALITY, &TraceOverrides::default())
    }
}

/// Caller-supplied values for individual [`TraceOptions`] fields.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceOverrides {
    #[serde(rename = "numberofcolors", skip_serializing_if = "Option::is_none")]
    pub number_of_colors: Option<u32>,
    #[serde(rename = "colorquantcycles", skip_serializing_if = "Option::is_none")]
    pub color_quant_cycles: Option<u32>,
    #[serde(rename = "pathomit", skip_serializing_if = "Option::is_none")]
    pub path_omit: Option<u32>,
    #[serde(rename = "blurradius", skip_serializing_if = "Option::is_none")]
    pub blur_radius: Option<u32>,
    #[serde(rename = "blurdelta", skip_serializing_if = "Option::is_none")]
    pub blur_delta: Option<u32>,
    #[serde(rename = "strokewidth", skip_serializing_if = "Option::is_none")]
    pub stroke_width: Option<f32>,
    #[serde(rename = "linethreshold", skip_serializing_if = "Option::is_none")]
    pub line_threshold: Option<f32>,
    #[serde(rename = "quadthreshold", skip_serializing_if = "Option::is_none")]
    pub quad_threshold: Option<f32>,
    #[serde(rename = "rightangleenhance", skip_serializing_if = "Option::is_none")]
    pub right_angle_enhance: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub viewbox: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub desc: Option<bool>,
}

impl TraceOverrides {
    fn apply(&self, options: &mut TraceOptions) {
        fn set<T: Copy>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }
        set(&mut options.number_of_colors, self.number_of_colors);
        set(&mut options.color_quant_cycles, self.color_quant_cycles);
        set(&mut options.path_omit, self.path_omit);
        set(&mut options.blur_radius, self.blur_radius);
        set(&mut options.blur_delta, self.blur_delta);
        set(&mut options.stroke_width, self.stroke_width);
        set(&mut options.line_threshold, self.line_threshold);
        set(&mut options.quad_threshold, self.quad_threshold);
        set(&mut options.right_angle_enhance, self.right_angle_enhance);
        set(&mut options.viewbox, self.viewbox);
        set(&mut options.desc, self.desc);
    }
}

/// Build [`TraceOptions`] for a `width`x`height` image.
///
/// `quality` is clamped to 1-100. Above 70 the palette widens and
/// simplification loosens; below 30 the most aggressive settings are used
/// whatever the tier. `overrides` are applied last, then the very-large
/// tier caps are enforced again.
pub fn plan(width: u32, height: u32, quality: u8, overrides: &TraceOverrides) -> TraceOptions {
    let tier = SizeTier::classify(width, height);
    let quality = quality.clamp(1, 100);
    let large = tier >= SizeTier::Large;

    let mut options = TraceOptions {
        number_of_colors: tier.base_colors(),
        color_quant_cycles: if large { 1 } else { 2 },
        path_omit: tier.base_path_omit(),
        blur_radius: if large {
            0
        } else {
            overrides.blur_radius.unwrap_or(0)
        },
        blur_delta: 20,
        stroke_width: 1.0,
        line_threshold: 10.0,
        quad_threshold: 10.0,
        right_angle_enhance: !large && overrides.right_angle_enhance != Some(false),
        viewbox: false,
        desc: false,
    };

    if quality > 70 {
        options.number_of_colors = (options.number_of_colors * 2).min(16);
        options.color_quant_cycles = (options.color_quant_cycles + 1).min(3);
        options.path_omit = options.path_omit.saturating_sub(4).max(8);
    } else if quality < 30 {
        options.number_of_colors = (options.number_of_colors / 2).max(2);
        options.color_quant_cycles = 1;
        options.path_omit = (options.path_omit + 8).min(30);
    }
    enforce_caps(&mut options, tier);

    overrides.apply(&mut options);
    enforce_caps(&mut options, tier);

    log::debug!(
        "planned trace for {width}x{height} ({tier:?}, quality {quality}): \
         {} colours, {} cycles, pathomit {}",
        options.number_of_colors,
        options.color_quant_cycles,
        options.path_omit
    );
    options
}

fn enforce_caps(options: &mut TraceOptions, tier: SizeTier) {
    if let Some((max_colors, max_cycles)) = tier.caps() {
        options.number_of_colors = options.number_of_colors.min(max_colors);
        options.color_quant_cycles = options.color_quant_cycles.min(max_cycles);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn none() -> TraceOverrides {
        TraceOverrides::default()
    }

    #[test]
    fn classifies_tiers_at_boundaries() {
        assert_eq!(SizeTier::classify(1000, 1000), SizeTier::Normal);
        assert_eq!(SizeTier::classify(1001, 1000), SizeTier::Large);
        assert_eq!(SizeTier::classify(2000, 2000), SizeTier::Large);
        assert_eq!(SizeTier::classify(2001, 2000), SizeTier::VeryLarge);
        assert_eq!(SizeTier::classify(5000, 2000), SizeTier::VeryLarge);
        assert_eq!(SizeTier::classify(5001, 2000), SizeTier::Extreme);
    }

    #[test]
    fn larger_tiers_trace_coarser() {
        let normal = plan(500, 500, 50, &none());
        let large = plan(1500, 1500, 50, &none());
        let very = plan(2500, 2500, 50, &none());
        let extreme = plan(4000, 4000, 50, &none());
        assert_eq!(normal.number_of_colors, 8);
        assert_eq!(normal.color_quant_cycles, 2);
        assert!(normal.right_angle_enhance);
        assert!(!large.right_angle_enhance);
        assert!(large.number_of_colors < normal.number_of_colors);
        assert!(very.number_of_colors < large.number_of_colors);
        assert!(extreme.number_of_colors < very.number_of_colors);
        assert!(extreme.path_omit > very.path_omit && very.path_omit > large.path_omit);
    }

    #[test]
    fn high_quality_widens_palette() {
        let opts = plan(200, 200, 90, &none());
        assert_eq!(opts.number_of_colors, 16);
        assert_eq!(opts.color_quant_cycles, 3);
        assert_eq!(opts.path_omit, 8);
    }

    #[test]
    fn high_quality_cannot_lift_very_large_caps() {
        let opts = plan(3000, 3000, 100, &none());
        assert_eq!(opts.number_of_colors, 6);
        assert_eq!(opts.color_quant_cycles, 1);
    }

    #[test]
    fn low_quality_is_aggressive_everywhere() {
        let opts = plan(100, 100, 10, &none());
        assert_eq!(opts.number_of_colors, 4);
        assert_eq!(opts.color_quant_cycles, 1);
        assert_eq!(opts.path_omit, 20);

        let tiny_budget = plan(4000, 4000, 1, &none());
        assert_eq!(tiny_budget.number_of_colors, 2);
        assert_eq!(tiny_budget.path_omit, 30);
    }

    #[test]
    fn overrides_apply_last() {
        let overrides = TraceOverrides {
            number_of_colors: Some(32),
            path_omit: Some(0),
            viewbox: Some(true),
            ..TraceOverrides::default()
        };
        let opts = plan(100, 100, 50, &overrides);
        assert_eq!(opts.number_of_colors, 32);
        assert_eq!(opts.path_omit, 0);
        assert!(opts.viewbox);
    }

    #[test]
    fn overrides_cannot_defeat_caps() {
        let overrides = TraceOverrides {
            number_of_colors: Some(64),
            color_quant_cycles: Some(10),
            ..TraceOverrides::default()
        };
        let very = plan(3000, 3000, 50, &overrides);
        assert_eq!((very.number_of_colors, very.color_quant_cycles), (6, 1));
        let extreme = plan(4000, 4000, 50, &overrides);
        assert_eq!((extreme.number_of_colors, extreme.color_quant_cycles), (4, 1));
    }

    #[test]
    fn blur_defaults_off_for_large_images() {
        let overrides = TraceOverrides {
            blur_radius: Some(3),
            ..TraceOverrides::default()
        };
        assert_eq!(plan(100, 100, 50, &overrides).blur_radius, 3);
        // Explicit overrides still win over the tier default.
        assert_eq!(plan(1500, 1500, 50, &overrides).blur_radius, 3);
        assert_eq!(plan(1500, 1500, 50, &none()).blur_radius, 0);
    }

    #[test]
    fn overrides_deserialize_from_tracer_names() {
        let overrides: TraceOverrides =
            serde_json::from_str(r#"{"numberofcolors": 5, "rightangleenhance": false}"#)
                .expect("json");
        assert_eq!(overrides.number_of_colors, Some(5));
        assert_eq!(overrides.right_angle_enhance, Some(false));
        assert_eq!(overrides.path_omit, None);
    }
}
