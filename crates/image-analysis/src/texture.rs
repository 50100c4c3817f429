//! Local-binary-pattern texture statistics.

use image::GrayImage;
use serde::{Deserialize, Serialize};

/// Rotation-invariant uniform LBP with `P = 8`, `R = 1` yields codes `0..=9`.
pub const LBP_BINS: usize = 10;
const P: usize = 8;

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TextureReport {
    /// Shannon entropy (bits) of the LBP histogram.
    pub entropy: f64,
    /// Share of pixels whose local LBP variance exceeds the 95th percentile.
    pub inconsistency: f64,
    pub histogram: Vec<f64>,
}

fn bilinear(img: &GrayImage, x: f64, y: f64) -> f64 {
    let (w, h) = (img.width() as i64, img.height() as i64);
    let sample = |xi: i64, yi: i64| -> f64 {
        if xi < 0 || yi < 0 || xi >= w || yi >= h {
            0.0
        } else {
            img.get_pixel(xi as u32, yi as u32).0[0] as f64
        }
    };
    let (x0, y0) = (x.floor(), y.floor());
    let (fx, fy) = (x - x0, y - y0);
    let (xi, yi) = (x0 as i64, y0 as i64);
    sample(xi, yi) * (1.0 - fx) * (1.0 - fy)
        + sample(xi + 1, yi) * fx * (1.0 - fy)
        + sample(xi, yi + 1) * (1.0 - fx) * fy
        + sample(xi + 1, yi + 1) * fx * fy
}

/// Uniform LBP code per pixel: the number of set bits for patterns with at
/// most two circular transitions, `P + 1` otherwise.
pub fn lbp_uniform(img: &GrayImage) -> Vec<u8> {
    let offsets: Vec<(f64, f64)> = (0..P)
        .map(|k| {
            let a = 2.0 * std::f64::consts::PI * k as f64 / P as f64;
            let (dy, dx) = (-a.sin(), a.cos());
            (snap(dx), snap(dy))
        })
        .collect();
    let mut out = Vec::with_capacity(img.as_raw().len());
    for y in 0..img.height() {
        for x in 0..img.width() {
            let c = img.get_pixel(x, y).0[0] as f64;
            let bits: Vec<bool> = offsets
                .iter()
                .map(|(dx, dy)| bilinear(img, x as f64 + dx, y as f64 + dy) >= c - 1e-9)
                .collect();
            let transitions = (0..P).filter(|&k| bits[k] != bits[(k + 1) % P]).count();
            let ones = bits.iter().filter(|b| **b).count();
            out.push(if transitions <= 2 { ones as u8 } else { (P + 1) as u8 });
        }
    }
    out
}

// Axis-aligned samples land exactly on pixel centres.
fn snap(v: f64) -> f64 {
    if (v - v.round()).abs() < 1e-9 {
        v.round()
    } else {
        v
    }
}

pub fn analyze_texture(img: &GrayImage, window: u32) -> TextureReport {
    let codes = lbp_uniform(img);
    if codes.is_empty() {
        return TextureReport::default();
    }
    let mut hist = vec![0.0f64; LBP_BINS];
    for &c in &codes {
        hist[c as usize] += 1.0;
    }
    let total: f64 = hist.iter().sum::<f64>() + 1e-7;
    for v in &mut hist {
        *v /= total;
    }
    let entropy = -hist.iter().map(|p| p * (p + 1e-7).log2()).sum::<f64>();
    let variance = local_variance(&codes, img.width() as usize, img.height() as usize, window as usize);
    TextureReport { entropy, inconsistency: share_above_p95(&variance), histogram: hist }
}

/// Variance over a `k` x `k` window (offsets `-k/2 .. k - k/2`) with zero padding.
fn local_variance(codes: &[u8], w: usize, h: usize, k: usize) -> Vec<f64> {
    let k = k.max(1);
    let iw = w + 1;
    let mut s1 = vec![0.0f64; iw * (h + 1)];
    let mut s2 = vec![0.0f64; iw * (h + 1)];
    for y in 0..h {
        for x in 0..w {
            let v = codes[y * w + x] as f64;
            let i = (y + 1) * iw + x + 1;
            s1[i] = v + s1[i - 1] + s1[i - iw] - s1[i - iw - 1];
            s2[i] = v * v + s2[i - 1] + s2[i - iw] - s2[i - iw - 1];
        }
    }
    let rect = |s: &[f64], x0: usize, y0: usize, x1: usize, y1: usize| {
        s[y1 * iw + x1] - s[y0 * iw + x1] - s[y1 * iw + x0] + s[y0 * iw + x0]
    };
    let n = (k * k) as f64;
    let half = k / 2;
    let mut out = Vec::with_capacity(w * h);
    for y in 0..h {
        for x in 0..w {
            let x0 = x.saturating_sub(half);
            let y0 = y.saturating_sub(half);
            let x1 = (x + k - half).min(w);
            let y1 = (y + k - half).min(h);
            let m = rect(&s1, x0, y0, x1, y1) / n;
            let m2 = rect(&s2, x0, y0, x1, y1) / n;
            out.push((m2 - m * m).max(0.0));
        }
    }
    out
}

fn share_above_p95(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let thr = percentile(values, 95.0);
    values.iter().filter(|v| **v > thr).count() as f64 / values.len() as f64
}

/// Linear-interpolated percentile.
pub fn percentile(values: &[f64], q: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.total_cmp(b));
    let pos = q / 100.0 * (sorted.len() - 1) as f64;
    let lo = pos.floor() as usize;
    let hi = pos.ceil() as usize;
    sorted[lo] + (sorted[hi] - sorted[lo]) * (pos - lo as f64)
}
