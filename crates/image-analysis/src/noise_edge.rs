//! Noise and edge inconsistency analysis.
//!
//! Local edits leave patches whose high-frequency noise differs from the
//! rest of the page and boundaries that are jagged rather than smooth.

use image::GrayImage;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::components::{
    external_components, label, polygon_area, polygon_perimeter, simplify_chain,
    trace_outer_contour, Connectivity,
};
use crate::filters::{canny, laplacian};
use crate::geometry::BBox;
use crate::raster::{FloatMap, Mask};
use crate::stroke::mean_std;
use crate::texture::{analyze_texture, TextureReport};
use crate::AnalysisError;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NoiseEdgeOptions {
    pub noise_threshold: f64,
    pub noise_variance_threshold: f64,
    pub edge_continuity_threshold: f64,
    pub min_circularity: f64,
    pub inconsistency_threshold: f64,
    pub area_min_size: usize,
    pub canny_low: f32,
    pub canny_high: f32,
    pub texture_window: u32,
}

impl Default for NoiseEdgeOptions {
    fn default() -> Self {
        Self {
            noise_threshold: 0.1,
            noise_variance_threshold: 0.05,
            edge_continuity_threshold: 0.8,
            min_circularity: 0.3,
            inconsistency_threshold: 0.3,
            area_min_size: 100,
            canny_low: 50.0,
            canny_high: 150.0,
            texture_window: 8,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InconsistencyLevel {
    Bajo,
    Medio,
    Alto,
    MuyAlto,
}

impl InconsistencyLevel {
    /// Level for a total count of flagged areas, noise regions and edges.
    pub fn from_count(total: usize) -> Self {
        match total {
            0 => InconsistencyLevel::Bajo,
            1..=2 => InconsistencyLevel::Medio,
            3..=5 => InconsistencyLevel::Alto,
            _ => InconsistencyLevel::MuyAlto,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            InconsistencyLevel::Bajo => "bajo",
            InconsistencyLevel::Medio => "medio",
            InconsistencyLevel::Alto => "alto",
            InconsistencyLevel::MuyAlto => "muy_alto",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseRegion {
    pub area: usize,
    pub bbox: BBox,
    pub std: f64,
    pub mean_abs: f64,
    pub inconsistente: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeContour {
    pub area: f64,
    pub perimeter: f64,
    pub circularity: f64,
    pub smoothness: f64,
    pub bbox: BBox,
    pub irregular: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InconsistencyArea {
    pub area: usize,
    pub bbox: BBox,
    pub variance: f64,
    pub mean_intensity: f64,
    pub sospechosa: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NoiseEdgeReport {
    pub inconsistencias_detectadas: bool,
    pub nivel_inconsistencia: InconsistencyLevel,
    pub areas_sospechosas: usize,
    pub patrones_ruido_inconsistentes: usize,
    pub bordes_irregulares: usize,
    pub noise_variance_total: f64,
    pub areas: Vec<InconsistencyArea>,
    pub noise_regions: Vec<NoiseRegion>,
    pub edges: Vec<EdgeContour>,
    pub texture: TextureReport,
    pub indicadores: Vec<String>,
}

fn noise_regions(lap: &FloatMap, opts: &NoiseEdgeOptions) -> Vec<NoiseRegion> {
    let mask = Mask {
        width: lap.width,
        height: lap.height,
        data: lap.data.iter().map(|v| (v.abs() as f64) > opts.noise_threshold).collect(),
    };
    label(&mask, Connectivity::Eight)
        .into_iter()
        .filter(|c| c.area > opts.area_min_size)
        .map(|c| {
            let patch = lap.crop(&c.bbox);
            let (_, std) = mean_std(patch.data.iter().map(|&v| v as f64));
            let mean_abs = patch.data.iter().map(|v| v.abs() as f64).sum::<f64>()
                / patch.data.len().max(1) as f64;
            let inconsistente =
                std > opts.noise_variance_threshold || mean_abs > opts.noise_threshold * 2.0;
            NoiseRegion { area: c.area, bbox: c.bbox, std, mean_abs, inconsistente }
        })
        .collect()
}

/// `1 / (1 + var)` of successive tangent-angle differences, wrapped to `[0, pi]`.
pub fn contour_smoothness(points: &[(i64, i64)]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let angles: Vec<f64> = points
        .windows(2)
        .map(|p| ((p[1].1 - p[0].1) as f64).atan2((p[1].0 - p[0].0) as f64))
        .collect();
    let diffs: Vec<f64> = angles
        .windows(2)
        .map(|a| {
            let d = (a[1] - a[0]).abs();
            d.min(2.0 * std::f64::consts::PI - d)
        })
        .collect();
    let (_, std) = mean_std(diffs.iter().copied());
    1.0 / (1.0 + std * std)
}

fn edge_contours(gray: &GrayImage, opts: &NoiseEdgeOptions) -> Vec<EdgeContour> {
    let edges = canny(gray, opts.canny_low, opts.canny_high);
    external_components(&edges)
        .into_iter()
        .filter_map(|c| {
            let contour = simplify_chain(&trace_outer_contour(&edges, c.seed));
            let area = polygon_area(&contour);
            if area <= opts.area_min_size as f64 {
                return None;
            }
            let perimeter = polygon_perimeter(&contour);
            let circularity = if perimeter > 0.0 {
                4.0 * std::f64::consts::PI * area / (perimeter * perimeter)
            } else {
                0.0
            };
            let smoothness = contour_smoothness(&contour);
            let irregular =
                circularity < opts.min_circularity || smoothness < opts.edge_continuity_threshold;
            Some(EdgeContour { area, perimeter, circularity, smoothness, bbox: c.bbox, irregular })
        })
        .collect()
}

fn combined_areas(
    unit: &FloatMap,
    noise: &[NoiseRegion],
    edges: &[EdgeContour],
    opts: &NoiseEdgeOptions,
) -> Vec<InconsistencyArea> {
    let mut mask = Mask::new(unit.width, unit.height);
    noise.iter().filter(|n| n.inconsistente).for_each(|n| mask.fill_box(&n.bbox));
    edges.iter().filter(|e| e.irregular).for_each(|e| mask.fill_box(&e.bbox));
    label(&mask, Connectivity::Eight)
        .into_iter()
        .filter(|c| c.area > opts.area_min_size)
        .map(|c| {
            let patch = unit.crop(&c.bbox);
            let (mean, std) = mean_std(patch.data.iter().map(|&v| v as f64));
            let variance = std * std;
            InconsistencyArea {
                area: c.area,
                bbox: c.bbox,
                variance,
                mean_intensity: mean,
                sospechosa: variance > opts.inconsistency_threshold
                    || c.area > opts.area_min_size * 2,
            }
        })
        .collect()
}

/// Human-readable indicators for the counts found.
pub fn indicators(level: InconsistencyLevel, areas: usize, noise: usize, edges: usize) -> Vec<String> {
    let mut out = Vec::new();
    if areas + noise + edges > 0 {
        out.push("Inconsistencies detected in noise and edge patterns".to_string());
    }
    if level >= InconsistencyLevel::Alto {
        out.push(format!("High inconsistency level: {}", level.as_str()));
    }
    if areas > 0 {
        out.push(format!("{} suspicious areas detected", areas));
    }
    if noise > 0 {
        out.push(format!("{} inconsistent noise patterns", noise));
    }
    if edges > 0 {
        out.push(format!("{} irregular edges detected", edges));
    }
    if areas > 3 {
        out.push("Multiple suspicious areas: possible local edit".to_string());
    }
    if noise > 2 {
        out.push("Multiple inconsistent noise patterns: possible cloning".to_string());
    }
    if edges > 2 {
        out.push("Multiple irregular edges: possible pasted elements".to_string());
    }
    out
}

pub fn analyze_noise_edges(
    gray: &GrayImage,
    opts: &NoiseEdgeOptions,
) -> Result<NoiseEdgeReport, AnalysisError> {
    if gray.width() == 0 || gray.height() == 0 {
        return Err(AnalysisError::EmptyImage);
    }
    let unit = FloatMap::from_gray_unit(gray);
    let lap = laplacian(&unit);
    let (_, lap_std) = mean_std(lap.data.iter().map(|&v| v as f64));

    let noise = noise_regions(&lap, opts);
    let edges = edge_contours(gray, opts);
    let areas = combined_areas(&unit, &noise, &edges, opts);
    let texture = analyze_texture(gray, opts.texture_window);

    let areas_sospechosas = areas.iter().filter(|a| a.sospechosa).count();
    let patrones = noise.iter().filter(|n| n.inconsistente).count();
    let bordes = edges.iter().filter(|e| e.irregular).count();
    let level = InconsistencyLevel::from_count(areas_sospechosas + patrones + bordes);
    debug!(
        areas = areas_sospechosas,
        noise = patrones,
        edges = bordes,
        level = level.as_str(),
        "noise/edge analysis complete"
    );

    Ok(NoiseEdgeReport {
        inconsistencias_detectadas: areas_sospechosas + patrones + bordes > 0,
        nivel_inconsistencia: level,
        areas_sospechosas,
        patrones_ruido_inconsistentes: patrones,
        bordes_irregulares: bordes,
        noise_variance_total: lap_std * lap_std,
        indicadores: indicators(level, areas_sospechosas, patrones, bordes),
        areas,
        noise_regions: noise,
        edges,
        texture,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    #[test]
    fn level_is_monotonic_in_flag_count() {
        assert_eq!(InconsistencyLevel::from_count(0), InconsistencyLevel::Bajo);
        assert_eq!(InconsistencyLevel::from_count(2), InconsistencyLevel::Medio);
        assert_eq!(InconsistencyLevel::from_count(3), InconsistencyLevel::Alto);
        assert_eq!(InconsistencyLevel::from_count(6), InconsistencyLevel::MuyAlto);
        let levels: Vec<_> = (0..12).map(InconsistencyLevel::from_count).collect();
        assert!(levels.windows(2).all(|w| w[0] <= w[1]));
    }

    #[test]
    fn straight_contour_is_smooth() {
        let line: Vec<(i64, i64)> = (0..10).map(|x| (x, 0)).collect();
        assert!((contour_smoothness(&line) - 1.0).abs() < 1e-9);
        assert_eq!(contour_smoothness(&line[..2]), 0.0);
    }

    #[test]
    fn flat_image_is_consistent() {
        let img = GrayImage::from_pixel(64, 64, Luma([0]));
        let report = analyze_noise_edges(&img, &NoiseEdgeOptions::default()).expect("report");
        assert!(!report.inconsistencias_detectadas);
        assert_eq!(report.nivel_inconsistencia, InconsistencyLevel::Bajo);
        assert!(report.indicadores.is_empty());
    }

    #[test]
    fn indicator_messages_follow_counts() {
        let msgs = indicators(InconsistencyLevel::MuyAlto, 4, 3, 0);
        assert_eq!(msgs.len(), 6);
        assert!(msgs.iter().any(|m| m.contains("possible local edit")));
        assert!(msgs.iter().any(|m| m.contains("possible cloning")));
    }

    #[test]
    fn pasted_noisy_patch_is_flagged() {
        let mut img = GrayImage::from_pixel(96, 96, Luma([128]));
        for y in 30..60 {
            for x in 30..60 {
                let v = if (x * 31 + y * 17) % 7 < 3 { 40 } else { 220 };
                img.put_pixel(x, y, Luma([v]));
            }
        }
        let report = analyze_noise_edges(&img, &NoiseEdgeOptions::default()).expect("report");
        assert!(report.patrones_ruido_inconsistentes >= 1);
        assert!(report.nivel_inconsistencia >= InconsistencyLevel::Medio);
    }
}
