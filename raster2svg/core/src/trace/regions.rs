//! Speckle removal on an indexed image.

use std::collections::HashMap;

use super::palette::TRANSPARENT;

/// Recolour every 4-connected region smaller than `min_area` pixels with the
/// colour it shares the longest border with. Returns the number of regions
/// merged. Transparent regions are left alone but can absorb speckles.
pub fn merge_speckles(indexed: &mut [usize], width: usize, height: usize, min_area: u32) -> usize {
    if min_area <= 1 || indexed.is_empty() {
        return 0;
    }
    let (labels, regions) = label_regions(indexed, width, height);

    let small: Vec<bool> = regions
        .iter()
        .map(|r| r.color != TRANSPARENT && r.area < min_area as usize)
        .collect();

    let mut borders: HashMap<u32, HashMap<usize, usize>> = HashMap::new();
    for y in 0..height {
        for x in 0..width {
            let i = y * width + x;
            let label = labels[i];
            if !small[label as usize] {
                continue;
            }
            for j in neighbours(x, y, width, height) {
                if labels[j] != label {
                    *borders
                        .entry(label)
                        .or_default()
                        .entry(indexed[j])
                        .or_insert(0) += 1;
                }
            }
        }
    }

    let replacement: HashMap<u32, usize> = borders
        .into_iter()
        .filter_map(|(label, counts)| {
            counts
                .into_iter()
                .max_by(|a, b| a.1.cmp(&b.1).then(b.0.cmp(&a.0)))
                .map(|(color, _)| (label, color))
        })
        .collect();

    for (value, label) in indexed.iter_mut().zip(&labels) {
        if let Some(&color) = replacement.get(label) {
            *value = color;
        }
    }
    replacement.len()
}

struct Region {
    color: usize,
    area: usize,
}

fn label_regions(indexed: &[usize], width: usize, height: usize) -> (Vec<u32>, Vec<Region>) {
    let mut labels = vec![u32::MAX; indexed.len()];
    let mut regions = Vec::new();
    let mut stack = Vec::new();

    for start in 0..indexed.len() {
        if labels[start] != u32::MAX {
            continue;
        }
        let label = regions.len() as u32;
        let color = indexed[start];
        let mut area = 0;
        labels[start] = label;
        stack.push(start);
        while let Some(i) = stack.pop() {
            area += 1;
            for j in neighbours(i % width, i / width, width, height) {
                if labels[j] == u32::MAX && indexed[j] == color {
                    labels[j] = label;
                    stack.push(j);
                }
            }
        }
        regions.push(Region { color, area });
    }
    (labels, regions)
}

fn neighbours(x: usize, y: usize, width: usize, height: usize) -> impl Iterator<Item = usize> {
    let left = (x > 0).then(|| y * width + x - 1);
    let right = (x + 1 < width).then(|| y * width + x + 1);
    let up = (y > 0).then(|| (y - 1) * width + x);
    let down = (y + 1 < height).then(|| (y + 1) * width + x);
    [left, right, up, down].into_iter().flatten()
}
