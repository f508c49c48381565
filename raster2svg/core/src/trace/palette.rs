//! Colour reduction: selective blur, histogram palette, k-means refinement.

use std::collections::HashMap;
use std::fmt::Write as FmtWrite;

use image::{Rgba, RgbaImage};

/// Palette index for fully transparent pixels.
pub const TRANSPARENT: usize = usize::MAX;

const MAX_BLUR_RADIUS: u32 = 5;

/// Box blur that leaves a pixel untouched when the blurred value would move
/// it more than `delta` (summed over RGBA channels). Keeps hard edges sharp.
pub fn selective_blur(image: &RgbaImage, radius: u32, delta: u32) -> RgbaImage {
    let radius = radius.min(MAX_BLUR_RADIUS);
    if radius == 0 {
        return image.clone();
    }
    let (width, height) = image.dimensions();
    let r = radius as i64;

    RgbaImage::from_fn(width, height, |x, y| {
        let mut sum = [0u32; 4];
        let mut n = 0u32;
        for dy in -r..=r {
            let yy = y as i64 + dy;
            if yy < 0 || yy >= height as i64 {
                continue;
            }
            for dx in -r..=r {
                let xx = x as i64 + dx;
                if xx < 0 || xx >= width as i64 {
                    continue;
                }
                let p = image.get_pixel(xx as u32, yy as u32);
                for c in 0..4 {
                    sum[c] += u32::from(p[c]);
                }
                n += 1;
            }
        }
        let original = image.get_pixel(x, y);
        let blurred = sum.map(|s| (s / n.max(1)) as u8);
        let moved: u32 = (0..4)
            .map(|c| u32::from(original[c].abs_diff(blurred[c])))
            .sum();
        if moved > delta {
            *original
        } else {
            Rgba(blurred)
        }
    })
}

/// The `max_colors` most frequent opaque colours, most frequent first.
pub fn build_palette(image: &RgbaImage, max_colors: usize) -> Vec<[u8; 4]> {
    let mut histogram: HashMap<[u8; 4], u32> = HashMap::new();

    for pixel in image.pixels() {
        if pixel[3] == 0 {
            continue;
        }
        *histogram.entry(pixel.0).or_insert(0) += 1;
    }

    let mut entries: Vec<([u8; 4], u32)> = histogram.into_iter().collect();
    entries.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

    entries
        .into_iter()
        .take(max_colors.max(1))
        .map(|(color, _)| color)
        .collect()
}

/// Run `cycles` k-means passes, moving each palette entry to the mean of the
/// pixels nearest to it. Entries that attract no pixels stay where they are.
pub fn refine(image: &RgbaImage, palette: &mut [[u8; 4]], cycles: u32) {
    for _ in 0..cycles {
        let mut sums = vec![[0u64; 4]; palette.len()];
        let mut counts = vec![0u64; palette.len()];
        for pixel in image.pixels() {
            if pixel[3] == 0 {
                continue;
            }
            let idx = nearest_palette_index(pixel, palette);
            for c in 0..4 {
                sums[idx][c] += u64::from(pixel[c]);
            }
            counts[idx] += 1;
        }

        let mut moved = false;
        for (entry, (sum, count)) in palette.iter_mut().zip(sums.iter().zip(&counts)) {
            if *count == 0 {
                continue;
            }
            let mean = sum.map(|s| (s / count) as u8);
            moved |= mean != *entry;
            *entry = mean;
        }
        if !moved {
            break;
        }
    }
}

/// Index of the nearest palette entry per pixel, or [`TRANSPARENT`].
pub fn map_to_palette(image: &RgbaImage, palette: &[[u8; 4]]) -> Vec<usize> {
    image
        .pixels()
        .map(|pixel| {
            if pixel[3] == 0 || palette.is_empty() {
                TRANSPARENT
            } else {
                nearest_palette_index(pixel, palette)
            }
        })
        .collect()
}

pub fn nearest_palette_index(pixel: &Rgba<u8>, palette: &[[u8; 4]]) -> usize {
    let mut best = 0;
    let mut best_dist = u32::MAX;

    for (idx, color) in palette.iter().enumerate() {
        let dist = color_distance(pixel.0, *color);
        if dist < best_dist {
            best = idx;
            best_dist = dist;
        }
    }

    best
}

fn color_distance(a: [u8; 4], b: [u8; 4]) -> u32 {
    let dr = a[0] as i32 - b[0] as i32;
    let dg = a[1] as i32 - b[1] as i32;
    let db = a[2] as i32 - b[2] as i32;
    let da = a[3] as i32 - b[3] as i32;
    (dr * dr + dg * dg + db * db + da * da) as u32
}

pub fn to_hex(color: [u8; 4]) -> String {
    let mut s = String::with_capacity(6);
    write!(&mut s, "{:02x}{:02x}{:02x}", color[0], color[1], color[2]).ok();
    s
}
