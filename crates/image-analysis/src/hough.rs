//! Line-segment extraction with a Hough accumulator.
//!
//! Peaks are visited in descending vote order; the edge pixels on each peak
//! line are split into runs at gaps wider than `max_gap`, runs at least
//! `min_length` long become segments, and their pixels stop voting.

use serde::{Deserialize, Serialize};

use crate::raster::Mask;

const THETA_BINS: usize = 180;

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct HoughParams {
    pub threshold: u32,
    pub min_length: f64,
    pub max_gap: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub x0: i64,
    pub y0: i64,
    pub x1: i64,
    pub y1: i64,
}

impl Segment {
    pub fn length(&self) -> f64 {
        (((self.x1 - self.x0).pow(2) + (self.y1 - self.y0).pow(2)) as f64).sqrt()
    }

    pub fn is_horizontal(&self) -> bool {
        (self.y1 - self.y0).abs() <= 1
    }

    pub fn is_vertical(&self) -> bool {
        (self.x1 - self.x0).abs() <= 1
    }
}

/// Line counts summarised over a whole image.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct LineSummary {
    pub total: usize,
    pub axis_aligned: usize,
    /// Segments per 10 000 pixels.
    pub density: f64,
}

impl LineSummary {
    pub fn from_segments(segments: &[Segment], width: u32, height: u32) -> Self {
        let area = width as f64 * height as f64;
        let axis_aligned = segments
            .iter()
            .map(|s| s.is_horizontal() as usize + s.is_vertical() as usize)
            .sum();
        Self {
            total: segments.len(),
            axis_aligned,
            density: if area > 0.0 { segments.len() as f64 / area * 1e4 } else { 0.0 },
        }
    }
}

struct Trig {
    cos: Vec<f64>,
    sin: Vec<f64>,
}

impl Trig {
    fn new() -> Self {
        let step = std::f64::consts::PI / THETA_BINS as f64;
        Self {
            cos: (0..THETA_BINS).map(|t| (t as f64 * step).cos()).collect(),
            sin: (0..THETA_BINS).map(|t| (t as f64 * step).sin()).collect(),
        }
    }

    fn rho(&self, x: i64, y: i64, t: usize) -> i64 {
        (x as f64 * self.cos[t] + y as f64 * self.sin[t]).round() as i64
    }
}

pub fn detect_segments(edges: &Mask, params: &HoughParams) -> Vec<Segment> {
    let points: Vec<(i64, i64)> = edges
        .data
        .iter()
        .enumerate()
        .filter(|(_, on)| **on)
        .map(|(i, _)| ((i % edges.width as usize) as i64, (i / edges.width as usize) as i64))
        .collect();
    if points.is_empty() {
        return Vec::new();
    }
    let trig = Trig::new();
    let diag = ((edges.width as f64).hypot(edges.height as f64)).ceil() as i64;
    let rho_bins = (2 * diag + 1) as usize;
    let cell = |rho: i64, t: usize| t * rho_bins + (rho + diag) as usize;

    let mut acc = vec![0u32; THETA_BINS * rho_bins];
    for &(x, y) in &points {
        for t in 0..THETA_BINS {
            acc[cell(trig.rho(x, y, t), t)] += 1;
        }
    }

    let mut peaks: Vec<(u32, usize)> = acc
        .iter()
        .enumerate()
        .filter(|(_, v)| **v >= params.threshold)
        .map(|(i, v)| (*v, i))
        .collect();
    peaks.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));

    let mut alive = vec![true; points.len()];
    let mut segments = Vec::new();
    for (_, idx) in peaks {
        if acc[idx] < params.threshold {
            continue;
        }
        let t = idx / rho_bins;
        let rho = (idx % rho_bins) as i64 - diag;
        // Direction along the line is (-sin, cos).
        let (dx, dy) = (-trig.sin[t], trig.cos[t]);
        let mut on_line: Vec<(f64, usize)> = points
            .iter()
            .enumerate()
            .filter(|(i, &(x, y))| alive[*i] && trig.rho(x, y, t) == rho)
            .map(|(i, &(x, y))| (x as f64 * dx + y as f64 * dy, i))
            .collect();
        on_line.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut start = 0;
        for k in 1..=on_line.len() {
            let split = k == on_line.len() || on_line[k].0 - on_line[k - 1].0 > params.max_gap + 1.0;
            if !split {
                continue;
            }
            let run = &on_line[start..k];
            start = k;
            let (a, b) = (points[run[0].1], points[run[run.len() - 1].1]);
            let seg = Segment { x0: a.0, y0: a.1, x1: b.0, y1: b.1 };
            if seg.length() < params.min_length {
                continue;
            }
            for &(_, i) in run {
                alive[i] = false;
                let (x, y) = points[i];
                for tt in 0..THETA_BINS {
                    let c = cell(trig.rho(x, y, tt), tt);
                    acc[c] = acc[c].saturating_sub(1);
                }
            }
            segments.push(seg);
        }
    }
    segments
}
