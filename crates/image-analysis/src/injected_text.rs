//! Per-token scoring of numeric text that was typed onto an image after
//! the fact. Each recognized numeric token is compared against its own
//! surroundings: stroke regularity, recompression error, gray-level entropy
//! and edge sharpness.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::filters::{abs_diff, adaptive_threshold_inv, jpeg_roundtrip};
use crate::geometry::BBox;
use crate::raster::{crop_gray, FloatMap, Mask};
use crate::stroke::{mean_std, ridge_widths};
use crate::{AnalysisError, TextToken};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct InjectedTextOptions {
    pub ela_quality: u8,
    pub min_digit_ratio: f64,
    pub min_width: u32,
    pub min_height: u32,
    pub min_confidence: f64,
    pub ring_px: u32,
    pub adaptive_block: usize,
    pub adaptive_c: f32,
    pub stroke_cv_max: f64,
    pub stroke_mean_min: f64,
    pub ela_ratio_min: f64,
    pub ela_roi_min: f64,
    pub entropy_max: f64,
    pub edge_density_min: f64,
    pub token_flag_score: u32,
    pub prioritario_score: u32,
    pub max_reported: usize,
}

impl Default for InjectedTextOptions {
    fn default() -> Self {
        Self {
            ela_quality: 85,
            min_digit_ratio: 0.6,
            min_width: 20,
            min_height: 10,
            min_confidence: 0.40,
            ring_px: 6,
            adaptive_block: 21,
            adaptive_c: 10.0,
            stroke_cv_max: 0.55,
            stroke_mean_min: 1.0,
            ela_ratio_min: 1.8,
            ela_roi_min: 0.02,
            entropy_max: 3.0,
            edge_density_min: 0.18,
            token_flag_score: 14,
            prioritario_score: 25,
            max_reported: 10,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InjectedLevel {
    Bajo,
    Medio,
    Prioritario,
}

impl InjectedLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            InjectedLevel::Bajo => "BAJO",
            InjectedLevel::Medio => "MEDIO",
            InjectedLevel::Prioritario => "PRIORITARIO",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct TokenMetrics {
    pub stroke_mean: f64,
    pub stroke_cv: f64,
    pub ela_roi: f64,
    pub ela_ring: f64,
    pub ela_ratio: f64,
    pub entropy: f64,
    pub edge_density: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedToken {
    pub text: String,
    pub confidence: f64,
    pub bbox: BBox,
    pub score: u32,
    pub reasons: Vec<String>,
    pub metrics: TokenMetrics,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InjectedTextReport {
    #[serde(rename = "match")]
    pub matched: bool,
    pub nivel: InjectedLevel,
    /// Sum of flagged token scores, capped at 100.
    pub score: u32,
    pub tokens_considered: usize,
    pub sospechosos: Vec<InjectedToken>,
}

pub fn digit_ratio(text: &str) -> f64 {
    let total = text.chars().count();
    if total == 0 {
        return 0.0;
    }
    text.chars().filter(|c| c.is_ascii_digit()).count() as f64 / total as f64
}

/// Recompression error, min-max normalized to `[0, 1]`.
pub fn normalized_error_map(gray: &GrayImage, quality: u8) -> Result<FloatMap, AnalysisError> {
    let recompressed = jpeg_roundtrip(gray, quality)?;
    let diff = abs_diff(gray, &recompressed);
    let mut map = FloatMap::from_gray(&diff);
    let (lo, hi) = (map.min(), map.max());
    let span = hi - lo;
    for v in &mut map.data {
        *v = if span > 0.0 { (*v - lo) / span } else { 0.0 };
    }
    Ok(map)
}

/// Mean stroke width and its coefficient of variation; `(0, 999)` without strokes.
pub fn stroke_mean_cv(ink: &Mask) -> (f64, f64) {
    if ink.count() == 0 {
        return (0.0, 999.0);
    }
    let widths = ridge_widths(ink);
    if widths.is_empty() {
        return (0.0, 999.0);
    }
    let (mean, std) = mean_std(widths.iter().map(|&v| v as f64));
    (mean, std / (mean + 1e-6))
}

/// Natural-log entropy of the 256-bin histogram.
pub fn gray_entropy(img: &GrayImage) -> f64 {
    let mut hist = [0f64; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1.0;
    }
    let total: f64 = hist.iter().sum::<f64>() + 1e-6;
    -hist
        .iter()
        .map(|&c| {
            let p = c / total;
            p * (p + 1e-12).ln()
        })
        .sum::<f64>()
}

fn region_mean(map: &FloatMap, bbox: &BBox) -> f64 {
    let b = bbox.clamp_to(map.width, map.height);
    if b.is_empty() {
        return 0.0;
    }
    let mut sum = 0.0f64;
    for y in b.y..b.bottom() {
        for x in b.x..b.right() {
            sum += map.get(x, y) as f64;
        }
    }
    sum / b.area() as f64
}

fn ring_mean(map: &FloatMap, inner: &BBox, outer: &BBox) -> f64 {
    let outer_sum = region_mean(map, outer) * outer.area() as f64;
    let inner_sum = region_mean(map, inner) * inner.area() as f64;
    let ring_area = outer.area().saturating_sub(inner.area());
    if ring_area == 0 {
        return region_mean(map, outer);
    }
    (outer_sum - inner_sum) / ring_area as f64
}

fn score_token(
    gray: &GrayImage,
    ela: &FloatMap,
    token: &TextToken,
    bbox: BBox,
    opts: &InjectedTextOptions,
) -> InjectedToken {
    let roi = crop_gray(gray, &bbox);
    let ink = adaptive_threshold_inv(&roi, opts.adaptive_block, opts.adaptive_c);
    let (stroke_mean, stroke_cv) = stroke_mean_cv(&ink);

    let around = bbox.padded(opts.ring_px, gray.width(), gray.height());
    let ela_roi = region_mean(ela, &bbox);
    let ela_ring = ring_mean(ela, &bbox, &around);
    let ela_ratio = (ela_roi + 1e-6) / (ela_ring + 1e-6);
    let entropy = gray_entropy(&roi);
    let edge = ink.gradient(3);
    let edge_density = edge.count() as f64 / edge.data.len().max(1) as f64;

    let mut score = 0u32;
    let mut reasons = Vec::new();
    if stroke_cv <= opts.stroke_cv_max && stroke_mean >= opts.stroke_mean_min {
        score += 10;
        reasons.push(format!("stroke_cv={:.2}", stroke_cv));
    }
    if ela_ratio >= opts.ela_ratio_min && ela_roi >= opts.ela_roi_min {
        score += 8;
        reasons.push(format!("ela_ratio={:.2}", ela_ratio));
    }
    if entropy <= opts.entropy_max {
        score += 6;
        reasons.push(format!("entropy={:.2}", entropy));
    }
    if edge_density >= opts.edge_density_min {
        score += 6;
        reasons.push(format!("edge_density={:.2}", edge_density));
    }
    InjectedToken {
        text: token.text.trim().to_string(),
        confidence: token.confidence,
        bbox,
        score,
        reasons,
        metrics: TokenMetrics {
            stroke_mean,
            stroke_cv,
            ela_roi,
            ela_ring,
            ela_ratio,
            entropy,
            edge_density,
        },
    }
}

pub fn analyze_injected_text(
    gray: &GrayImage,
    tokens: &[TextToken],
    opts: &InjectedTextOptions,
) -> Result<InjectedTextReport, AnalysisError> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    let candidates: Vec<(&TextToken, BBox)> = tokens
        .iter()
        .filter(|t| !t.text.trim().is_empty())
        .filter(|t| t.confidence >= opts.min_confidence)
        .filter(|t| t.bbox.w >= opts.min_width && t.bbox.h >= opts.min_height)
        .filter(|t| digit_ratio(t.text.trim()) >= opts.min_digit_ratio)
        .map(|t| (t, t.bbox.clamp_to(gray.width(), gray.height())))
        .filter(|(_, b)| !b.is_empty())
        .collect();

    let mut flagged = Vec::new();
    if !candidates.is_empty() {
        let ela = normalized_error_map(gray, opts.ela_quality)?;
        for (token, bbox) in &candidates {
            let scored = score_token(gray, &ela, token, *bbox, opts);
            if scored.score >= opts.token_flag_score {
                flagged.push(scored);
            }
        }
    }

    let total: u32 = flagged.iter().map(|t| t.score).sum();
    let nivel = if total >= opts.prioritario_score {
        InjectedLevel::Prioritario
    } else if total >= opts.token_flag_score {
        InjectedLevel::Medio
    } else {
        InjectedLevel::Bajo
    };
    debug!(candidates = candidates.len(), flagged = flagged.len(), total, "injected text scoring complete");
    let matched = !flagged.is_empty();
    flagged.truncate(opts.max_reported);
    Ok(InjectedTextReport {
        matched,
        nivel,
        score: total.min(100),
        tokens_considered: candidates.len(),
        sospechosos: flagged,
    })
}
