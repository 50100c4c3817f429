//! Detection of synthetic or flattened text.
//!
//! Rendered text pasted into a page tends to have constant stroke width,
//! near-pure ink and clean antialiasing halos. Those three signals are
//! measured per glyph box and combined with a box-count gate.

use std::sync::OnceLock;

use image::GrayImage;
use rayon::prelude::*;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::{bilateral, canny, magnitude, otsu_ink_mask, sobel};
use crate::geometry::BBox;
use crate::glyphs::{detect_blobs, suppress_overlaps, BlobOptions};
use crate::hough::{detect_segments, HoughParams, LineSummary};
use crate::raster::{crop_gray, FloatMap, Mask};
use crate::stroke::{mean_std, stroke_stats, StrokeStats};
use crate::{AnalysisError, SuspicionLevel};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyntheticTextOptions {
    pub bilateral_d: u32,
    pub bilateral_sigma_color: f32,
    pub bilateral_sigma_space: f32,
    pub blob_delta: u8,
    pub blob_min_area: usize,
    /// Largest blob as a fraction of the page.
    pub blob_max_area_frac: f64,
    pub min_box_area: u64,
    pub min_aspect: f64,
    pub max_aspect: f64,
    pub min_box_height: u32,
    pub max_box_height_frac: f64,
    pub merge_iou: f64,
    pub box_pad: u32,
    pub stroke_cv_max: f64,
    pub stroke_mean_min: f64,
    pub pure_ratio_min: f64,
    pub halo_min: f64,
    pub many_boxes: usize,
    pub dense_boxes: usize,
    pub line_density_min: f64,
    pub hough: HoughParams,
}

impl Default for SyntheticTextOptions {
    fn default() -> Self {
        Self {
            bilateral_d: 7,
            bilateral_sigma_color: 25.0,
            bilateral_sigma_space: 7.0,
            blob_delta: 5,
            blob_min_area: 60,
            blob_max_area_frac: 0.05,
            min_box_area: 80,
            min_aspect: 0.15,
            max_aspect: 15.0,
            min_box_height: 8,
            max_box_height_frac: 0.25,
            merge_iou: 0.2,
            box_pad: 2,
            stroke_cv_max: 0.45,
            stroke_mean_min: 1.2,
            pure_ratio_min: 0.6,
            halo_min: 0.45,
            many_boxes: 30,
            dense_boxes: 50,
            line_density_min: 0.8,
            hough: HoughParams { threshold: 60, min_length: 25.0, max_gap: 6.0 },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BoxMetrics {
    pub bbox: BBox,
    pub stroke: StrokeStats,
    pub color_mean: f64,
    pub color_pure: bool,
    pub halo_ratio: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct SyntheticSignals {
    pub many_boxes: bool,
    pub uniform_stroke: bool,
    pub pure_color: bool,
    pub high_halo: bool,
}

impl SyntheticSignals {
    pub fn quality_signals(&self) -> usize {
        self.uniform_stroke as usize + self.pure_color as usize + self.high_halo as usize
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeSummary {
    pub mean: f64,
    pub std: f64,
    pub cv: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyntheticTextReport {
    pub tiene_texto_sintetico: bool,
    pub nivel_sospecha: SuspicionLevel,
    pub boxes: Vec<BBox>,
    pub stroke: StrokeSummary,
    pub color_mean: f64,
    pub pure_ratio: f64,
    pub halo_mean: f64,
    pub lines: LineSummary,
    pub signals: SyntheticSignals,
    pub coincide_con_montos_fechas: bool,
    pub details: Vec<BoxMetrics>,
}

impl SyntheticTextReport {
    fn empty(boxes: Vec<BBox>, lines: LineSummary) -> Self {
        Self {
            tiene_texto_sintetico: false,
            nivel_sospecha: SuspicionLevel::Bajo,
            boxes,
            stroke: StrokeSummary { cv: 1.0, ..StrokeSummary::default() },
            color_mean: 0.0,
            pure_ratio: 0.0,
            halo_mean: 0.0,
            lines,
            signals: SyntheticSignals::default(),
            coincide_con_montos_fechas: false,
            details: Vec::new(),
        }
    }
}

static AMOUNT_RE: OnceLock<Option<Regex>> = OnceLock::new();
static DATE_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// True when `text` contains a monetary amount or a date.
pub fn mentions_amount_or_date(text: &str) -> bool {
    let amount = AMOUNT_RE
        .get_or_init(|| Regex::new(r"(?:\$?\s*)\d{1,3}(?:[.,]\d{3})*(?:[.,]\d{2})").ok());
    let date = DATE_RE
        .get_or_init(|| Regex::new(r"(\d{1,2}[/-]\d{1,2}[/-]\d{2,4}|\d{4}-\d{2}-\d{2})").ok());
    let lowered = text.to_lowercase();
    [amount, date]
        .into_iter()
        .flatten()
        .any(|re| re.is_match(&lowered))
}

/// Glyph-sized candidate boxes on an already smoothed page.
pub fn candidate_boxes(filtered: &GrayImage, opts: &SyntheticTextOptions) -> Vec<BBox> {
    let (w, h) = (filtered.width(), filtered.height());
    let blob_opts = BlobOptions {
        delta: opts.blob_delta,
        min_area: opts.blob_min_area,
        max_area: (opts.blob_max_area_frac * w as f64 * h as f64) as usize,
        ..BlobOptions::default()
    };
    let max_h = (opts.max_box_height_frac * h as f64) as u32;
    let boxes = detect_blobs(filtered, &blob_opts)
        .into_iter()
        .map(|b| b.bbox)
        .filter(|b| b.area() >= opts.min_box_area)
        .filter(|b| {
            let ar = b.aspect();
            ar >= opts.min_aspect && ar <= opts.max_aspect && b.h >= opts.min_box_height && b.h <= max_h
        })
        .collect();
    suppress_overlaps(boxes, opts.merge_iou)
}

fn masked_mean_std(values: &[f32], mask: &Mask) -> Option<(f64, f64)> {
    let selected: Vec<f64> = values
        .iter()
        .zip(&mask.data)
        .filter(|(_, on)| **on)
        .map(|(v, _)| *v as f64)
        .collect();
    if selected.is_empty() {
        return None;
    }
    Some(mean_std(selected.iter().copied()))
}

fn box_metrics(filtered: &GrayImage, bbox: BBox, pad: u32) -> BoxMetrics {
    let region = bbox.padded(pad, filtered.width(), filtered.height());
    let crop = crop_gray(filtered, &region);
    let ink = otsu_ink_mask(&crop);
    let stroke = stroke_stats(&ink);

    let edges = canny(&crop, 80.0, 180.0);
    let inner = edges.dilate(3, 3);
    let outer = edges.dilate(5, 5);
    let ring = outer.and_not(&inner);
    let plane = FloatMap::from_gray(&crop);

    let (color_mean, color_pure) = match masked_mean_std(&plane.data, &inner) {
        Some((mean, std)) => (mean, (mean < 40.0 && std < 30.0) || (mean > 215.0 && std < 30.0)),
        None => (0.0, false),
    };

    let (gx, gy) = sobel(&plane);
    let mag = magnitude(&gx, &gy);
    let out_e = masked_mean_std(&mag.data, &ring).map(|m| m.0).unwrap_or(0.0);
    let in_e = masked_mean_std(&mag.data, &inner).map(|m| m.0).unwrap_or(1e-6);
    let halo_ratio = out_e / (in_e + 1e-6);

    BoxMetrics { bbox, stroke, color_mean, color_pure, halo_ratio }
}

pub fn line_summary(gray: &GrayImage, params: &HoughParams) -> LineSummary {
    let edges = canny(gray, 60.0, 150.0);
    let segments = detect_segments(&edges, params);
    LineSummary::from_segments(&segments, gray.width(), gray.height())
}

/// Run the detector on `gray`; `ocr_text` is the recognized text, if any.
pub fn analyze_synthetic_text(
    gray: &GrayImage,
    ocr_text: &str,
    opts: &SyntheticTextOptions,
) -> Result<SyntheticTextReport, AnalysisError> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    let filtered = bilateral(
        gray,
        opts.bilateral_d,
        opts.bilateral_sigma_color,
        opts.bilateral_sigma_space,
    );
    let boxes = candidate_boxes(&filtered, opts);
    let lines = line_summary(gray, &opts.hough);
    if boxes.is_empty() {
        debug!("no text candidates");
        return Ok(SyntheticTextReport::empty(boxes, lines));
    }

    let details: Vec<BoxMetrics> = boxes
        .par_iter()
        .map(|b| box_metrics(&filtered, *b, opts.box_pad))
        .collect();

    let reliable: Vec<&StrokeStats> = details.iter().map(|d| &d.stroke).filter(|s| s.is_reliable()).collect();
    let n_reliable = reliable.len().max(1) as f64;
    let sw_mean = if reliable.is_empty() { 0.0 } else { reliable.iter().map(|s| s.mean).sum::<f64>() / n_reliable };
    let sw_std = if reliable.is_empty() { 0.0 } else { reliable.iter().map(|s| s.std).sum::<f64>() / n_reliable };
    let cv = if sw_mean > 0.0 { sw_std / (sw_mean + 1e-6) } else { 1.0 };

    let n = details.len() as f64;
    let pure_ratio = details.iter().filter(|d| d.color_pure).count() as f64 / n;
    let halo_mean = details.iter().map(|d| d.halo_ratio).sum::<f64>() / n;
    let color_mean = details.iter().map(|d| d.color_mean).sum::<f64>() / n;

    let signals = SyntheticSignals {
        many_boxes: boxes.len() >= opts.many_boxes || lines.density >= opts.line_density_min,
        uniform_stroke: cv < opts.stroke_cv_max && sw_mean >= opts.stroke_mean_min,
        pure_color: pure_ratio >= opts.pure_ratio_min,
        high_halo: halo_mean >= opts.halo_min,
    };
    let strong = signals.quality_signals() >= 2;
    let dense = boxes.len() >= opts.dense_boxes && strong;
    let detected = signals.many_boxes && (strong || dense);
    let coincide = !ocr_text.is_empty() && mentions_amount_or_date(ocr_text);
    let nivel = match (detected, coincide) {
        (true, true) => SuspicionLevel::Alto,
        (true, false) => SuspicionLevel::Medio,
        _ => SuspicionLevel::Bajo,
    };
    debug!(
        boxes = boxes.len(),
        cv,
        pure_ratio,
        halo_mean,
        density = lines.density,
        detected,
        "synthetic text analysis complete"
    );

    Ok(SyntheticTextReport {
        tiene_texto_sintetico: detected,
        nivel_sospecha: nivel,
        boxes,
        stroke: StrokeSummary { mean: sw_mean, std: sw_std, cv },
        color_mean,
        pure_ratio,
        halo_mean,
        lines,
        signals,
        coincide_con_montos_fechas: coincide,
        details,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn amount_and_date_patterns() {
        assert!(mentions_amount_or_date("TOTAL $ 1,234.56"));
        assert!(mentions_amount_or_date("fecha 01/02/2025"));
        assert!(mentions_amount_or_date("2025-02-01"));
        assert!(!mentions_amount_or_date("no numbers here"));
        assert!(!mentions_amount_or_date("ref 7"));
    }

    #[test]
    fn blank_page_is_not_synthetic() {
        let img = GrayImage::from_pixel(120, 80, Luma([255]));
        let report = analyze_synthetic_text(&img, "", &SyntheticTextOptions::default()).expect("report");
        assert!(report.boxes.is_empty());
        assert!(!report.tiene_texto_sintetico);
        assert_eq!(report.nivel_sospecha, SuspicionLevel::Bajo);
    }

    #[test]
    fn crisp_box_is_pure_with_uniform_stroke() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([255]));
        for y in 8..32 {
            for x in 16..20 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let m = box_metrics(&img, BBox::new(16, 8, 4, 24), 2);
        assert!(m.stroke.is_reliable());
        assert!((m.stroke.mean - 4.0).abs() < 0.5);
    }
}
