//! Glyph-like blob extraction.
//!
//! A threshold sweep keeps connected regions whose area barely changes between
//! neighbouring gray levels, which is the maximally-stable-extremal-region
//! criterion evaluated on a fixed level grid.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::components::{label, Connectivity};
use crate::geometry::BBox;
use crate::raster::Mask;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlobOptions {
    /// Gray-level step between compared thresholds.
    pub delta: u8,
    pub min_area: usize,
    pub max_area: usize,
    /// Maximum relative area growth across `2 * delta` levels.
    pub max_variation: f64,
    /// Also sweep the inverted image (light glyphs on dark ground).
    pub both_polarities: bool,
}

impl Default for BlobOptions {
    fn default() -> Self {
        Self {
            delta: 5,
            min_area: 60,
            max_area: usize::MAX,
            max_variation: 0.25,
            both_polarities: false,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Blob {
    pub bbox: BBox,
    pub area: usize,
    pub level: u8,
}

struct LevelLabels {
    labels: Vec<u32>,
    areas: Vec<usize>,
}

impl LevelLabels {
    fn empty(len: usize) -> Self {
        Self { labels: vec![0; len], areas: vec![0] }
    }

    fn area_at(&self, idx: usize) -> usize {
        self.areas[self.labels[idx] as usize]
    }
}

struct LevelRegion {
    bbox: BBox,
    area: usize,
    darkest: usize,
}

fn label_level(img: &GrayImage, level: u8) -> (LevelLabels, Vec<LevelRegion>) {
    let raw = img.as_raw();
    let mask = Mask {
        width: img.width(),
        height: img.height(),
        data: raw.iter().map(|&v| v <= level).collect(),
    };
    let comps = label(&mask, Connectivity::Eight);
    let mut labels = vec![0u32; raw.len()];
    let mut areas = Vec::with_capacity(comps.len() + 1);
    areas.push(0);
    let mut regions = Vec::with_capacity(comps.len());
    for (i, comp) in comps.iter().enumerate() {
        let id = (i + 1) as u32;
        let mut darkest = comp.seed;
        for &p in &comp.pixels {
            labels[p] = id;
            if raw[p] < raw[darkest] {
                darkest = p;
            }
        }
        areas.push(comp.area);
        regions.push(LevelRegion { bbox: comp.bbox, area: comp.area, darkest });
    }
    (LevelLabels { labels, areas }, regions)
}

fn sweep(img: &GrayImage, opts: &BlobOptions, out: &mut Vec<Blob>, seen: &mut HashSet<BBox>) {
    let delta = opts.delta.max(1) as usize;
    let levels: Vec<u8> = (0..=255usize).step_by(delta).map(|v| v as u8).collect();
    if levels.len() < 2 {
        return;
    }
    let len = img.as_raw().len();
    let mut prev = LevelLabels::empty(len);
    let (mut cur, mut cur_regions) = label_level(img, levels[0]);
    for i in 0..levels.len() - 1 {
        let (next, next_regions) = label_level(img, levels[i + 1]);
        for region in &cur_regions {
            if region.area < opts.min_area || region.area > opts.max_area {
                continue;
            }
            let below = prev.area_at(region.darkest);
            let above = next.area_at(region.darkest);
            let variation = (above.saturating_sub(below)) as f64 / region.area as f64;
            if variation <= opts.max_variation && seen.insert(region.bbox) {
                out.push(Blob { bbox: region.bbox, area: region.area, level: levels[i] });
            }
        }
        prev = cur;
        cur = next;
        cur_regions = next_regions;
    }
}

/// Stable dark regions of `img` (and light ones when `both_polarities` is set).
pub fn detect_blobs(img: &GrayImage, opts: &BlobOptions) -> Vec<Blob> {
    let mut out = Vec::new();
    let mut seen = HashSet::new();
    if img.width() == 0 || img.height() == 0 {
        return out;
    }
    sweep(img, opts, &mut out, &mut seen);
    if opts.both_polarities {
        let mut inverted = img.clone();
        image::imageops::invert(&mut inverted);
        sweep(&inverted, opts, &mut out, &mut seen);
    }
    out
}

/// Greedy overlap suppression in reading order (`y + 0.1 x`): a box survives
/// unless it overlaps an earlier survivor by more than `iou_thr`. The result is
/// sorted by `(y, x)`.
pub fn suppress_overlaps(mut boxes: Vec<BBox>, iou_thr: f64) -> Vec<BBox> {
    boxes.sort_by(|a, b| {
        let ka = a.y as f64 + 0.1 * a.x as f64;
        let kb = b.y as f64 + 0.1 * b.x as f64;
        ka.total_cmp(&kb)
    });
    let mut kept: Vec<BBox> = Vec::new();
    for b in boxes {
        if !kept.iter().any(|k| k.iou(&b) > iou_thr) {
            kept.push(b);
        }
    }
    kept.sort_by_key(|b| (b.y, b.x));
    kept
}

/// Paint `boxes`, dilate with a `kw` x `kh` rectangle and return the bounding
/// boxes of the fused regions.
pub fn fuse_boxes(boxes: &[BBox], width: u32, height: u32, kw: u32, kh: u32) -> Vec<BBox> {
    if boxes.is_empty() {
        return Vec::new();
    }
    let mut mask = Mask::new(width, height);
    for b in boxes {
        mask.fill_box(b);
    }
    let dilated = mask.dilate(kw, kh);
    label(&dilated, Connectivity::Eight).into_iter().map(|c| c.bbox).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn page_with_bars() -> GrayImage {
        let mut img = GrayImage::from_pixel(120, 60, Luma([255]));
        for (x0, y0) in [(10u32, 10u32), (50, 10), (90, 30)] {
            for y in y0..y0 + 16 {
                for x in x0..x0 + 6 {
                    img.put_pixel(x, y, Luma([0]));
                }
            }
        }
        img
    }

    #[test]
    fn crisp_dark_bars_are_stable() {
        let blobs = detect_blobs(&page_with_bars(), &BlobOptions { min_area: 30, ..Default::default() });
        assert_eq!(blobs.len(), 3);
        assert!(blobs.iter().all(|b| b.bbox.w == 6 && b.bbox.h == 16));
    }

    #[test]
    fn blank_page_has_no_blobs() {
        let img = GrayImage::from_pixel(64, 64, Luma([255]));
        assert!(detect_blobs(&img, &BlobOptions::default()).is_empty());
    }

    #[test]
    fn overlapping_boxes_are_suppressed() {
        let merged = suppress_overlaps(
            vec![BBox::new(0, 0, 10, 10), BBox::new(2, 2, 10, 10), BBox::new(40, 40, 5, 5)],
            0.2,
        );
        assert_eq!(merged.len(), 2);
        assert_eq!(merged[0], BBox::new(0, 0, 10, 10));
    }

    #[test]
    fn horizontal_dilation_fuses_neighbours() {
        let fused = fuse_boxes(&[BBox::new(10, 10, 8, 10), BBox::new(24, 10, 8, 10)], 64, 64, 9, 3);
        assert_eq!(fused.len(), 1);
    }
}
