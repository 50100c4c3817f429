//! Focused error-level analysis.
//!
//! The equalized page is recompressed once; the absolute difference is
//! thresholded robustly, summarised on a tile grid, and tiles that are both
//! dense and intense are clustered. An edit is reported only when a compact
//! cluster lands on a text-like box and carries a strong peak.

use image::GrayImage;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{label, Connectivity};
use crate::filters::{abs_diff, equalize_histogram, jpeg_roundtrip};
use crate::geometry::BBox;
use crate::glyphs::{detect_blobs, fuse_boxes, BlobOptions};
use crate::raster::Mask;
use crate::{AnalysisError, TextToken};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ElaOptions {
    /// JPEG quality used for the recompression, clipped to `[50, 98]`.
    pub quality: u8,
    pub tile_min: u32,
    /// Minimum suspicious-pixel fraction for a tile.
    pub perc_thr: f64,
    /// Minimum tile peak error (0..255).
    pub ela_max_thr: f64,
    pub robust_k: f64,
    pub min_cluster_tiles: usize,
    pub localized_compactness: f64,
}

impl Default for ElaOptions {
    fn default() -> Self {
        Self {
            quality: 90,
            tile_min: 64,
            perc_thr: 0.10,
            ela_max_thr: 60.0,
            robust_k: 3.0,
            min_cluster_tiles: 3,
            localized_compactness: 6.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ElaLevel {
    Secundario,
    Prioritario,
}

impl ElaLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            ElaLevel::Secundario => "SECUNDARIO",
            ElaLevel::Prioritario => "PRIORITARIO",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ErrorStats {
    pub mean: f64,
    pub std: f64,
    pub max: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TileGrid {
    pub nx: u32,
    pub ny: u32,
    pub tile_w: u32,
    pub tile_h: u32,
    /// Row-major `ny x nx` suspicious-pixel fractions.
    pub perc: Vec<f64>,
    pub max: Vec<f64>,
    pub suspicious: Vec<bool>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElaCluster {
    pub size_tiles: usize,
    pub bbox: BBox,
    pub perc_mean: f64,
    pub peak: f64,
    /// Bounding-box area over covered tile area; always `>= 1`.
    pub compactness: f64,
    pub localized: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TextOverlap {
    pub num_boxes: usize,
    pub boxes: Vec<BBox>,
    pub overlap_text: bool,
    pub overlap_digits: bool,
    pub peak_hits: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElaReport {
    pub quality: u8,
    pub thr_robusto: f64,
    pub global: ErrorStats,
    pub suspicious_global_ratio: f64,
    pub grid: TileGrid,
    pub clusters_total: usize,
    pub clusters: Vec<ElaCluster>,
    pub texto: TextOverlap,
    pub criteria: ElaOptions,
    pub marca_editada: bool,
    pub nivel_sospecha: ElaLevel,
}

impl ElaReport {
    pub fn localized(&self) -> impl Iterator<Item = &ElaCluster> {
        self.clusters.iter().filter(|c| c.localized)
    }
}

/// `median + k * 1.4826 * MAD`, clamped to `[5, 255]`.
pub fn robust_threshold(diff: &GrayImage, k: f64) -> f64 {
    let mut hist = [0u64; 256];
    for &v in diff.as_raw() {
        hist[v as usize] += 1;
    }
    let med = weighted_median((0..256).map(|v| (v as f64, hist[v])));
    let mut dev: Vec<(f64, u64)> = (0..256).map(|v| ((v as f64 - med).abs(), hist[v])).collect();
    dev.sort_by(|a, b| a.0.total_cmp(&b.0));
    let mad = weighted_median(dev.into_iter());
    (med + k * 1.4826 * (mad + 1e-6)).clamp(5.0, 255.0)
}

/// Median of sorted `(value, count)` pairs; an even total averages the middle pair.
fn weighted_median(pairs: impl Iterator<Item = (f64, u64)> + Clone) -> f64 {
    let total: u64 = pairs.clone().map(|(_, c)| c).sum();
    if total == 0 {
        return 0.0;
    }
    let nth = |n: u64| -> f64 {
        let mut seen = 0u64;
        for (v, c) in pairs.clone() {
            seen += c;
            if seen > n {
                return v;
            }
        }
        0.0
    };
    if total % 2 == 1 {
        nth(total / 2)
    } else {
        (nth(total / 2 - 1) + nth(total / 2)) / 2.0
    }
}

fn error_stats(diff: &GrayImage) -> ErrorStats {
    let raw = diff.as_raw();
    let n = raw.len().max(1) as f64;
    let mean = raw.iter().map(|&v| v as f64).sum::<f64>() / n;
    let var = raw.iter().map(|&v| (v as f64 - mean).powi(2)).sum::<f64>() / n;
    let max = raw.iter().copied().max().unwrap_or(0) as f64;
    ErrorStats { mean, std: var.sqrt(), max }
}

fn tile_grid(diff: &GrayImage, suspicious: &Mask, opts: &ElaOptions) -> TileGrid {
    let (w, h) = (diff.width(), diff.height());
    let tile = opts.tile_min.max(w.min(h) / 16);
    let nx = (w / tile).max(4);
    let ny = (h / tile).max(4);
    let (tile_w, tile_h) = (w / nx, h / ny);
    let cells: Vec<(f64, f64)> = (0..ny * nx)
        .into_par_iter()
        .map(|cell| {
            let (i, j) = (cell % nx, cell / nx);
            let (x0, y0) = (i * tile_w, j * tile_h);
            let mut hits = 0usize;
            let mut peak = 0u8;
            for y in y0..y0 + tile_h {
                for x in x0..x0 + tile_w {
                    hits += suspicious.get(x, y) as usize;
                    peak = peak.max(diff.get_pixel(x, y).0[0]);
                }
            }
            let area = (tile_w as usize * tile_h as usize).max(1);
            (hits as f64 / area as f64, peak as f64)
        })
        .collect();
    let perc: Vec<f64> = cells.iter().map(|c| c.0).collect();
    let max: Vec<f64> = cells.iter().map(|c| c.1).collect();
    let suspicious = cells
        .iter()
        .map(|&(p, m)| p >= opts.perc_thr && m >= opts.ela_max_thr)
        .collect();
    TileGrid { nx, ny, tile_w, tile_h, perc, max, suspicious }
}

fn cluster_tiles(grid: &TileGrid, width: u32, height: u32, opts: &ElaOptions) -> Vec<ElaCluster> {
    let mask = Mask { width: grid.nx, height: grid.ny, data: grid.suspicious.clone() };
    label(&mask, Connectivity::Four)
        .into_iter()
        .filter(|c| c.area >= opts.min_cluster_tiles)
        .map(|comp| {
            let t = comp.bbox;
            let x0 = t.x * grid.tile_w;
            let y0 = t.y * grid.tile_h;
            let x1 = (t.right() * grid.tile_w).min(width);
            let y1 = (t.bottom() * grid.tile_h).min(height);
            let bbox = BBox::new(x0, y0, x1 - x0, y1 - y0);
            let tiles_area = comp.area as f64 * grid.tile_w as f64 * grid.tile_h as f64;
            let compactness = bbox.area() as f64 / (tiles_area + 1e-6);
            let perc_mean = comp.pixels.iter().map(|&i| grid.perc[i]).sum::<f64>() / comp.area as f64;
            let peak = comp.pixels.iter().map(|&i| grid.max[i]).fold(0.0, f64::max);
            ElaCluster {
                size_tiles: comp.area,
                bbox,
                perc_mean,
                peak,
                compactness,
                localized: compactness < opts.localized_compactness,
            }
        })
        .collect()
}

/// Text-like boxes: stable blobs of both polarities, fused horizontally.
pub fn text_boxes(gray: &GrayImage) -> Vec<BBox> {
    let (w, h) = (gray.width(), gray.height());
    let page = w as f64 * h as f64;
    let opts = BlobOptions {
        min_area: 60,
        max_area: (0.25 * page) as usize,
        both_polarities: true,
        ..BlobOptions::default()
    };
    let boxes: Vec<BBox> = detect_blobs(gray, &opts)
        .into_iter()
        .map(|b| b.bbox)
        .filter(|b| b.w >= 8 && b.h >= 8)
        .filter(|b| (0.3..=15.0).contains(&b.aspect()) && (b.area() as f64) < 0.3 * page)
        .collect();
    fuse_boxes(&boxes, w, h, 9, 3)
}

fn digits_in(bbox: &BBox, tokens: &[TextToken]) -> String {
    tokens
        .iter()
        .filter(|t| t.bbox.intersects(bbox))
        .flat_map(|t| t.text.chars())
        .filter(|c| c.is_ascii_digit() || matches!(c, '.' | ',' | '-'))
        .collect()
}

pub fn analyze_ela(
    gray: &GrayImage,
    tokens: &[TextToken],
    opts: &ElaOptions,
) -> Result<ElaReport, AnalysisError> {
    let (w, h) = (gray.width(), gray.height());
    if w == 0 || h == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    if w < 4 || h < 4 {
        return Err(AnalysisError::TooSmall { width: w, height: h, min: 4 });
    }
    let quality = opts.quality.clamp(50, 98);
    let eq = equalize_histogram(gray);
    let recompressed = jpeg_roundtrip(&eq, quality)?;
    let diff = abs_diff(&eq, &recompressed);

    let global = error_stats(&diff);
    let thr = robust_threshold(&diff, opts.robust_k);
    let suspicious = Mask {
        width: w,
        height: h,
        data: diff.as_raw().iter().map(|&v| v as f64 > thr).collect(),
    };
    let suspicious_global_ratio = suspicious.count() as f64 / suspicious.data.len() as f64;

    let grid = tile_grid(&diff, &suspicious, opts);
    let clusters = cluster_tiles(&grid, w, h, opts);
    let boxes = text_boxes(&eq);

    let mut texto = TextOverlap { num_boxes: boxes.len(), ..TextOverlap::default() };
    for cluster in clusters.iter().filter(|c| c.localized) {
        for tb in &boxes {
            if !cluster.bbox.intersects(tb) {
                continue;
            }
            texto.overlap_text = true;
            let digits = digits_in(tb, tokens);
            if digits.chars().count() >= 2 && digits.chars().any(|c| c.is_ascii_digit()) {
                texto.overlap_digits = true;
            }
            if cluster.peak >= opts.ela_max_thr {
                texto.peak_hits += 1;
            }
        }
    }
    texto.boxes = boxes;

    let has_localized = clusters.iter().any(|c| c.localized);
    let marca_editada = has_localized && texto.overlap_text && texto.peak_hits > 0;
    let intense = clusters.iter().filter(|c| c.localized).any(|c| {
        c.perc_mean >= opts.perc_thr + 0.05 || c.peak >= opts.ela_max_thr + 20.0
    });
    let nivel_sospecha = if marca_editada && (texto.overlap_digits || intense) {
        ElaLevel::Prioritario
    } else {
        ElaLevel::Secundario
    };
    debug!(
        thr,
        clusters = clusters.len(),
        localized = clusters.iter().filter(|c| c.localized).count(),
        marca_editada,
        "ela analysis complete"
    );

    Ok(ElaReport {
        quality,
        thr_robusto: thr,
        global,
        suspicious_global_ratio,
        grid,
        clusters_total: clusters.len(),
        clusters,
        texto,
        criteria: opts.clone(),
        marca_editada,
        nivel_sospecha,
    })
}
