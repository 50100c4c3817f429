//! Stroke-width estimation from the medial ridge of a distance map.

use serde::{Deserialize, Serialize};

use crate::filters::distance_transform;
use crate::raster::Mask;

const MIN_WIDTH: f32 = 0.8;
const MAX_WIDTH: f32 = 80.0;
pub const MIN_SAMPLES: usize = 10;

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct StrokeStats {
    pub mean: f64,
    pub std: f64,
    pub samples: usize,
}

impl StrokeStats {
    pub fn is_reliable(&self) -> bool {
        self.samples >= MIN_SAMPLES
    }

    /// Coefficient of variation, or `None` when there is no usable stroke.
    pub fn cv(&self) -> Option<f64> {
        (self.samples > 0 && self.mean > 0.0).then(|| self.std / (self.mean + 1e-6))
    }
}

/// Stroke widths (`2 * dt`) sampled on the ridge of the distance transform of `ink`.
pub fn ridge_widths(ink: &Mask) -> Vec<f32> {
    let dt = distance_transform(ink);
    let (w, h) = (dt.width as i64, dt.height as i64);
    let mut widths = Vec::new();
    for y in 0..h {
        for x in 0..w {
            let v = dt.get(x as u32, y as u32);
            if v <= 0.5 {
                continue;
            }
            let mut is_ridge = true;
            'scan: for dy in -1..=1 {
                for dx in -1..=1 {
                    if dt.get_clamped(x + dx, y + dy) > v + 1e-6 {
                        is_ridge = false;
                        break 'scan;
                    }
                }
            }
            if is_ridge {
                let width = 2.0 * v;
                if width > MIN_WIDTH && width < MAX_WIDTH {
                    widths.push(width);
                }
            }
        }
    }
    widths
}

/// Mean and population standard deviation of the ridge widths. Fewer than
/// ten samples yields zeros with the sample count preserved.
pub fn stroke_stats(ink: &Mask) -> StrokeStats {
    let widths = ridge_widths(ink);
    if widths.len() < MIN_SAMPLES {
        return StrokeStats { mean: 0.0, std: 0.0, samples: widths.len() };
    }
    let (mean, std) = mean_std(widths.iter().map(|&v| v as f64));
    StrokeStats { mean, std, samples: widths.len() }
}

pub(crate) fn mean_std(values: impl Iterator<Item = f64> + Clone) -> (f64, f64) {
    let mut n = 0usize;
    let mut sum = 0.0;
    for v in values.clone() {
        n += 1;
        sum += v;
    }
    if n == 0 {
        return (0.0, 0.0);
    }
    let mean = sum / n as f64;
    let var = values.map(|v| (v - mean) * (v - mean)).sum::<f64>() / n as f64;
    (mean, var.sqrt())
}
