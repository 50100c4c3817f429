//! Convolution, thresholding and edge primitives over gray buffers.

use std::collections::VecDeque;
use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::{GrayImage, Luma};

use crate::raster::{FloatMap, Mask};
use crate::AnalysisError;

/// Histogram equalization using the cumulative distribution.
pub fn equalize_histogram(img: &GrayImage) -> GrayImage {
    let mut hist = [0u64; 256];
    for &v in img.as_raw() {
        hist[v as usize] += 1;
    }
    let total: u64 = hist.iter().sum();
    let Some(first) = hist.iter().position(|&c| c > 0) else {
        return img.clone();
    };
    let cdf_min = hist[first];
    if total == cdf_min {
        return img.clone();
    }
    let mut lut = [0u8; 256];
    let mut cdf = 0u64;
    let scale = 255.0 / (total - cdf_min) as f64;
    for (i, &count) in hist.iter().enumerate() {
        cdf += count;
        let mapped = (cdf.saturating_sub(cdf_min)) as f64 * scale;
        lut[i] = mapped.round().clamp(0.0, 255.0) as u8;
    }
    let mut out = img.clone();
    for p in out.pixels_mut() {
        p.0[0] = lut[p.0[0] as usize];
    }
    out
}

/// Encode as baseline JPEG at `quality` and decode it back.
pub fn jpeg_roundtrip(img: &GrayImage, quality: u8) -> Result<GrayImage, AnalysisError> {
    let mut buf = Vec::new();
    let mut encoder = JpegEncoder::new_with_quality(&mut buf, quality);
    encoder
        .encode_image(img)
        .map_err(|e| AnalysisError::Codec(e.to_string()))?;
    let decoded = image::load_from_memory_with_format(&buf, image::ImageFormat::Jpeg)
        .map_err(|e| AnalysisError::Codec(e.to_string()))?;
    Ok(decoded.to_luma8())
}

pub fn abs_diff(a: &GrayImage, b: &GrayImage) -> GrayImage {
    let mut out = GrayImage::new(a.width(), a.height());
    for (o, (pa, pb)) in out.pixels_mut().zip(a.pixels().zip(b.pixels())) {
        *o = Luma([pa.0[0].abs_diff(pb.0[0])]);
    }
    out
}

pub fn gaussian_kernel(ksize: usize, sigma: f32) -> Vec<f32> {
    let ksize = ksize.max(1) | 1;
    let sigma = if sigma <= 0.0 { 0.3 * ((ksize as f32 - 1.0) * 0.5 - 1.0) + 0.8 } else { sigma };
    let half = (ksize / 2) as i32;
    let mut k: Vec<f32> = (-half..=half)
        .map(|i| (-(i * i) as f32 / (2.0 * sigma * sigma)).exp())
        .collect();
    let sum: f32 = k.iter().sum();
    for v in &mut k {
        *v /= sum;
    }
    k
}

pub fn convolve_separable(src: &FloatMap, kx: &[f32], ky: &[f32]) -> FloatMap {
    let (w, h) = (src.width, src.height);
    let hx = (kx.len() / 2) as i64;
    let hy = (ky.len() / 2) as i64;
    let mut tmp = FloatMap::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, k) in kx.iter().enumerate() {
                acc += k * src.get_clamped(x as i64 + i as i64 - hx, y as i64);
            }
            tmp.set(x, y, acc);
        }
    }
    let mut out = FloatMap::new(w, h);
    for y in 0..h {
        for x in 0..w {
            let mut acc = 0.0;
            for (i, k) in ky.iter().enumerate() {
                acc += k * tmp.get_clamped(x as i64, y as i64 + i as i64 - hy);
            }
            out.set(x, y, acc);
        }
    }
    out
}

pub fn gaussian_blur(src: &FloatMap, ksize: usize, sigma: f32) -> FloatMap {
    let k = gaussian_kernel(ksize, sigma);
    convolve_separable(src, &k, &k)
}

/// 3x3 Sobel derivatives with replicated borders.
pub fn sobel(src: &FloatMap) -> (FloatMap, FloatMap) {
    let gx = convolve_separable(src, &[-1.0, 0.0, 1.0], &[1.0, 2.0, 1.0]);
    let gy = convolve_separable(src, &[1.0, 2.0, 1.0], &[-1.0, 0.0, 1.0]);
    (gx, gy)
}

pub fn magnitude(gx: &FloatMap, gy: &FloatMap) -> FloatMap {
    FloatMap {
        width: gx.width,
        height: gx.height,
        data: gx.data.iter().zip(&gy.data).map(|(a, b)| (a * a + b * b).sqrt()).collect(),
    }
}

/// 4-neighbour Laplacian.
pub fn laplacian(src: &FloatMap) -> FloatMap {
    let mut out = FloatMap::new(src.width, src.height);
    for y in 0..src.height {
        for x in 0..src.width {
            let (xi, yi) = (x as i64, y as i64);
            let v = src.get_clamped(xi - 1, yi)
                + src.get_clamped(xi + 1, yi)
                + src.get_clamped(xi, yi - 1)
                + src.get_clamped(xi, yi + 1)
                - 4.0 * src.get(x, y);
            out.set(x, y, v);
        }
    }
    out
}

/// Canny edge detector: Sobel L1 magnitude, non-maximum suppression and
/// hysteresis between `low` and `high`.
pub fn canny(img: &GrayImage, low: f32, high: f32) -> Mask {
    let (w, h) = (img.width(), img.height());
    let mut edges = Mask::new(w, h);
    if w < 3 || h < 3 {
        return edges;
    }
    let src = FloatMap::from_gray(img);
    let (gx, gy) = sobel(&src);
    let mag = FloatMap {
        width: w,
        height: h,
        data: gx.data.iter().zip(&gy.data).map(|(a, b)| a.abs() + b.abs()).collect(),
    };

    // 0 = suppressed, 1 = weak, 2 = strong
    let mut state = vec![0u8; (w * h) as usize];
    let tan22 = 0.414_213_57_f32;
    for y in 1..h - 1 {
        for x in 1..w - 1 {
            let m = mag.get(x, y);
            if m <= low {
                continue;
            }
            let (dx, dy) = (gx.get(x, y), gy.get(x, y));
            let (ax, ay) = (dx.abs(), dy.abs());
            let (n1, n2) = if ay <= ax * tan22 {
                (mag.get(x - 1, y), mag.get(x + 1, y))
            } else if ay >= ax / tan22 {
                (mag.get(x, y - 1), mag.get(x, y + 1))
            } else if (dx > 0.0) == (dy > 0.0) {
                (mag.get(x - 1, y - 1), mag.get(x + 1, y + 1))
            } else {
                (mag.get(x + 1, y - 1), mag.get(x - 1, y + 1))
            };
            if m > n1 && m >= n2 {
                state[(y * w + x) as usize] = if m > high { 2 } else { 1 };
            }
        }
    }

    let mut queue: VecDeque<(u32, u32)> = VecDeque::new();
    for y in 0..h {
        for x in 0..w {
            if state[(y * w + x) as usize] == 2 {
                edges.set(x, y, true);
                queue.push_back((x, y));
            }
        }
    }
    while let Some((x, y)) = queue.pop_front() {
        for dy in -1i64..=1 {
            for dx in -1i64..=1 {
                let (nx, ny) = (x as i64 + dx, y as i64 + dy);
                if nx < 0 || ny < 0 || nx >= w as i64 || ny >= h as i64 {
                    continue;
                }
                let idx = (ny as u32 * w + nx as u32) as usize;
                if state[idx] == 1 && !edges.data[idx] {
                    edges.data[idx] = true;
                    queue.push_back((nx as u32, ny as u32));
                }
            }
        }
    }
    edges
}

/// Edge-preserving bilateral filter with a square window of diameter `d`.
pub fn bilateral(img: &GrayImage, d: u32, sigma_color: f32, sigma_space: f32) -> GrayImage {
    let (w, h) = (img.width(), img.height());
    let radius = (d / 2).max(1) as i64;
    let color_coeff = -0.5 / (sigma_color * sigma_color);
    let space_coeff = -0.5 / (sigma_space * sigma_space);
    let mut spatial = Vec::new();
    for dy in -radius..=radius {
        for dx in -radius..=radius {
            let r2 = (dx * dx + dy * dy) as f32;
            if r2 > (radius * radius) as f32 {
                continue;
            }
            spatial.push((dx, dy, (r2 * space_coeff).exp()));
        }
    }
    let color_lut: Vec<f32> = (0..256).map(|i| ((i * i) as f32 * color_coeff).exp()).collect();
    let mut out = GrayImage::new(w, h);
    for y in 0..h as i64 {
        for x in 0..w as i64 {
            let center = img.get_pixel(x as u32, y as u32).0[0];
            let mut sum = 0.0f32;
            let mut wsum = 0.0f32;
            for &(dx, dy, ws) in &spatial {
                let nx = (x + dx).clamp(0, w as i64 - 1) as u32;
                let ny = (y + dy).clamp(0, h as i64 - 1) as u32;
                let v = img.get_pixel(nx, ny).0[0];
                let wgt = ws * color_lut[v.abs_diff(center) as usize];
                sum += wgt * v as f32;
                wsum += wgt;
            }
            let value = if wsum > 0.0 { sum / wsum } else { center as f32 };
            out.put_pixel(x as u32, y as u32, Luma([value.round().clamp(0.0, 255.0) as u8]));
        }
    }
    out
}

/// Otsu's between-class-variance threshold.
pub fn otsu_threshold(samples: &[u8]) -> u8 {
    let mut hist = [0u64; 256];
    for &v in samples {
        hist[v as usize] += 1;
    }
    let total = samples.len() as f64;
    if total == 0.0 {
        return 0;
    }
    let sum_all: f64 = hist.iter().enumerate().map(|(i, &c)| i as f64 * c as f64).sum();
    let (mut w_b, mut sum_b) = (0.0f64, 0.0f64);
    let (mut best, mut best_t) = (-1.0f64, 0u8);
    for (t, &count) in hist.iter().enumerate() {
        w_b += count as f64;
        if w_b == 0.0 {
            continue;
        }
        let w_f = total - w_b;
        if w_f == 0.0 {
            break;
        }
        sum_b += t as f64 * count as f64;
        let m_b = sum_b / w_b;
        let m_f = (sum_all - sum_b) / w_f;
        let between = w_b * w_f * (m_b - m_f) * (m_b - m_f);
        if between > best {
            best = between;
            best_t = t as u8;
        }
    }
    best_t
}

/// Binary mask of pixels strictly above `thr`, or at/below it when `invert` is set.
pub fn threshold(img: &GrayImage, thr: u8, invert: bool) -> Mask {
    Mask {
        width: img.width(),
        height: img.height(),
        data: img.as_raw().iter().map(|&v| (v > thr) != invert).collect(),
    }
}

/// Otsu binarization that marks the minority (ink) class as foreground.
pub fn otsu_ink_mask(img: &GrayImage) -> Mask {
    let thr = otsu_threshold(img.as_raw());
    let above = threshold(img, thr, false);
    if above.count() * 2 > above.data.len() {
        threshold(img, thr, true)
    } else {
        above
    }
}

/// Inverted adaptive threshold against a Gaussian-weighted local mean:
/// a pixel is foreground when it is at or below `mean - c`.
pub fn adaptive_threshold_inv(img: &GrayImage, block: usize, c: f32) -> Mask {
    let src = FloatMap::from_gray(img);
    let mean = gaussian_blur(&src, block, 0.0);
    Mask {
        width: img.width(),
        height: img.height(),
        data: src.data.iter().zip(&mean.data).map(|(v, m)| *v <= m - c).collect(),
    }
}

/// Exact Euclidean distance from each foreground pixel to the nearest background pixel.
pub fn distance_transform(mask: &Mask) -> FloatMap {
    let (w, h) = (mask.width as usize, mask.height as usize);
    let inf = 1e20f32;
    let mut grid: Vec<f32> = mask.data.iter().map(|&fg| if fg { inf } else { 0.0 }).collect();

    let mut f = vec![0.0f32; w.max(h)];
    let mut d = vec![0.0f32; w.max(h)];
    let mut v = vec![0usize; w.max(h)];
    let mut z = vec![0.0f32; w.max(h) + 1];

    for x in 0..w {
        for y in 0..h {
            f[y] = grid[y * w + x];
        }
        edt_1d(&f[..h], &mut d[..h], &mut v, &mut z);
        for y in 0..h {
            grid[y * w + x] = d[y];
        }
    }
    for y in 0..h {
        f[..w].copy_from_slice(&grid[y * w..(y + 1) * w]);
        edt_1d(&f[..w], &mut d[..w], &mut v, &mut z);
        grid[y * w..(y + 1) * w].copy_from_slice(&d[..w]);
    }
    FloatMap {
        width: mask.width,
        height: mask.height,
        data: grid.into_iter().map(|s| if s >= 1e19 { 0.0 } else { s.sqrt() }).collect(),
    }
}

// Felzenszwalb-Huttenlocher lower envelope of parabolas.
fn edt_1d(f: &[f32], d: &mut [f32], v: &mut [usize], z: &mut [f32]) {
    let n = f.len();
    if n == 0 {
        return;
    }
    let mut k = 0usize;
    v[0] = 0;
    z[0] = f32::NEG_INFINITY;
    z[1] = f32::INFINITY;
    for q in 1..n {
        loop {
            let p = v[k];
            let s = ((f[q] + (q * q) as f32) - (f[p] + (p * p) as f32)) / (2.0 * q as f32 - 2.0 * p as f32);
            if s <= z[k] && k > 0 {
                k -= 1;
                continue;
            }
            if s <= z[k] {
                // k == 0 and the new parabola dominates everywhere
                v[0] = q;
                z[0] = f32::NEG_INFINITY;
                z[1] = f32::INFINITY;
                break;
            }
            k += 1;
            v[k] = q;
            z[k] = s;
            z[k + 1] = f32::INFINITY;
            break;
        }
    }
    k = 0;
    for q in 0..n {
        while z[k + 1] < q as f32 {
            k += 1;
        }
        let p = v[k];
        let dq = q as f32 - p as f32;
        d[q] = dq * dq + f[p];
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::BBox;

    #[test]
    fn otsu_splits_bimodal_samples() {
        let mut samples = vec![20u8; 100];
        samples.extend(vec![220u8; 100]);
        let t = otsu_threshold(&samples);
        assert!(t >= 20 && t < 220, "threshold {t}");
    }

    #[test]
    fn distance_transform_peaks_in_centre() {
        let mut m = Mask::new(11, 11);
        m.fill_box(&BBox::new(1, 1, 9, 9));
        let dt = distance_transform(&m);
        assert_eq!(dt.get(0, 0), 0.0);
        assert!((dt.get(1, 1) - 1.0).abs() < 1e-4);
        assert!((dt.get(5, 5) - 5.0).abs() < 1e-4);
    }

    #[test]
    fn canny_finds_square_outline() {
        let mut img = GrayImage::from_pixel(40, 40, Luma([255]));
        for y in 10..30 {
            for x in 10..30 {
                img.put_pixel(x, y, Luma([0]));
            }
        }
        let edges = canny(&img, 50.0, 150.0);
        assert!(edges.count() > 40);
        assert!(!edges.get(20, 20));
        assert!(!edges.get(2, 2));
    }

    #[test]
    fn equalization_stretches_narrow_range() {
        let mut img = GrayImage::new(2, 1);
        img.put_pixel(0, 0, Luma([100]));
        img.put_pixel(1, 0, Luma([110]));
        let eq = equalize_histogram(&img);
        assert_eq!(eq.get_pixel(0, 0).0[0], 0);
        assert_eq!(eq.get_pixel(1, 0).0[0], 255);
    }

    #[test]
    fn jpeg_roundtrip_preserves_dimensions() {
        let img = GrayImage::from_fn(33, 17, |x, y| Luma([((x * 7 + y * 3) % 255) as u8]));
        let out = jpeg_roundtrip(&img, 90).expect("roundtrip");
        assert_eq!(out.dimensions(), (33, 17));
    }
}
