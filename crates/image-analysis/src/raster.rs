//! Owned sample planes used by the analyzers.
//!
//! `GrayImage` from the `image` crate carries 8-bit input; the analyzers need
//! float planes (gradients, distance maps) and boolean masks, which live here.

use image::GrayImage;

use crate::geometry::BBox;

#[derive(Debug, Clone, PartialEq)]
pub struct FloatMap {
    pub width: u32,
    pub height: u32,
    pub data: Vec<f32>,
}

impl FloatMap {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![0.0; width as usize * height as usize] }
    }

    pub fn from_gray(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().iter().map(|&v| v as f32).collect(),
        }
    }

    /// Gray values scaled into `[0, 1]`.
    pub fn from_gray_unit(img: &GrayImage) -> Self {
        Self {
            width: img.width(),
            height: img.height(),
            data: img.as_raw().iter().map(|&v| v as f32 / 255.0).collect(),
        }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> f32 {
        self.data[self.index(x, y)]
    }

    /// Sample with replicated borders.
    #[inline]
    pub fn get_clamped(&self, x: i64, y: i64) -> f32 {
        let cx = x.clamp(0, self.width as i64 - 1) as u32;
        let cy = y.clamp(0, self.height as i64 - 1) as u32;
        self.get(cx, cy)
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: f32) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    pub fn crop(&self, bbox: &BBox) -> FloatMap {
        let b = bbox.clamp_to(self.width, self.height);
        let mut out = FloatMap::new(b.w, b.h);
        for y in 0..b.h {
            let src = self.index(b.x, b.y + y);
            let dst = out.index(0, y);
            out.data[dst..dst + b.w as usize].copy_from_slice(&self.data[src..src + b.w as usize]);
        }
        out
    }

    pub fn max(&self) -> f32 {
        self.data.iter().copied().fold(0.0, f32::max)
    }

    pub fn min(&self) -> f32 {
        self.data.iter().copied().fold(f32::INFINITY, f32::min)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mask {
    pub width: u32,
    pub height: u32,
    pub data: Vec<bool>,
}

impl Mask {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![false; width as usize * height as usize] }
    }

    pub fn from_fn(width: u32, height: u32, mut f: impl FnMut(u32, u32) -> bool) -> Self {
        let mut data = Vec::with_capacity(width as usize * height as usize);
        for y in 0..height {
            for x in 0..width {
                data.push(f(x, y));
            }
        }
        Self { width, height, data }
    }

    #[inline]
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    #[inline]
    pub fn get(&self, x: u32, y: u32) -> bool {
        self.data[self.index(x, y)]
    }

    #[inline]
    pub fn get_signed(&self, x: i64, y: i64) -> bool {
        if x < 0 || y < 0 || x >= self.width as i64 || y >= self.height as i64 {
            return false;
        }
        self.get(x as u32, y as u32)
    }

    #[inline]
    pub fn set(&mut self, x: u32, y: u32, value: bool) {
        let idx = self.index(x, y);
        self.data[idx] = value;
    }

    pub fn count(&self) -> usize {
        self.data.iter().filter(|v| **v).count()
    }

    pub fn fill_box(&mut self, bbox: &BBox) {
        let b = bbox.clamp_to(self.width, self.height);
        for y in b.y..b.bottom() {
            for x in b.x..b.right() {
                self.set(x, y, true);
            }
        }
    }

    pub fn or(&self, other: &Mask) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().zip(&other.data).map(|(a, b)| *a || *b).collect(),
        }
    }

    pub fn and_not(&self, other: &Mask) -> Mask {
        Mask {
            width: self.width,
            height: self.height,
            data: self.data.iter().zip(&other.data).map(|(a, b)| *a && !*b).collect(),
        }
    }

    /// Rectangular dilation with a `kw` x `kh` structuring element anchored at its centre.
    pub fn dilate(&self, kw: u32, kh: u32) -> Mask {
        self.morph(kw, kh, true)
    }

    pub fn erode(&self, kw: u32, kh: u32) -> Mask {
        self.morph(kw, kh, false)
    }

    fn morph(&self, kw: u32, kh: u32, dilate: bool) -> Mask {
        let (w, h) = (self.width as i64, self.height as i64);
        let (ax, ay) = (kw as i64 / 2, kh as i64 / 2);
        // Separable: rows first, then columns.
        let mut rows = vec![!dilate; self.data.len()];
        for y in 0..h {
            for x in 0..w {
                let mut acc = !dilate;
                for dx in -ax..(kw as i64 - ax) {
                    let nx = x + dx;
                    let v = if nx < 0 || nx >= w { !dilate } else { self.data[(y * w + nx) as usize] };
                    if v == dilate {
                        acc = dilate;
                        break;
                    }
                }
                rows[(y * w + x) as usize] = acc;
            }
        }
        let mut out = Mask::new(self.width, self.height);
        for y in 0..h {
            for x in 0..w {
                let mut acc = !dilate;
                for dy in -ay..(kh as i64 - ay) {
                    let ny = y + dy;
                    let v = if ny < 0 || ny >= h { !dilate } else { rows[(ny * w + x) as usize] };
                    if v == dilate {
                        acc = dilate;
                        break;
                    }
                }
                out.data[(y * w + x) as usize] = acc;
            }
        }
        out
    }

    /// Dilation minus erosion with a square kernel.
    pub fn gradient(&self, k: u32) -> Mask {
        self.dilate(k, k).and_not(&self.erode(k, k))
    }

    pub fn crop(&self, bbox: &BBox) -> Mask {
        let b = bbox.clamp_to(self.width, self.height);
        Mask::from_fn(b.w, b.h, |x, y| self.get(b.x + x, b.y + y))
    }
}

pub fn crop_gray(img: &GrayImage, bbox: &BBox) -> GrayImage {
    let b = bbox.clamp_to(img.width(), img.height());
    image::imageops::crop_imm(img, b.x, b.y, b.w, b.h).to_image()
}
