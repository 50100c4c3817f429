use serde::{Deserialize, Serialize};

use crate::document::LayeredDocument;

/// Which candidate layers of a page are painted. Indices are the page's
/// layer ordinals; flipping one is a single slot write.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LayerVisibility {
    shown: Vec<bool>,
}

impl LayerVisibility {
    pub fn all_hidden(count: usize) -> Self {
        Self { shown: vec![false; count] }
    }

    pub fn all_shown(count: usize) -> Self {
        Self { shown: vec![true; count] }
    }

    pub fn show(&mut self, index: usize) {
        if let Some(slot) = self.shown.get_mut(index) {
            *slot = true;
        }
    }

    pub fn hide(&mut self, index: usize) {
        if let Some(slot) = self.shown.get_mut(index) {
            *slot = false;
        }
    }

    pub fn is_visible(&self, index: usize) -> bool {
        self.shown.get(index).copied().unwrap_or(false)
    }

    pub fn len(&self) -> usize {
        self.shown.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shown.is_empty()
    }

    pub fn visible_count(&self) -> usize {
        self.shown.iter().filter(|s| **s).count()
    }
}

/// 8-bit grayscale render of one page.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    pub width: u32,
    pub height: u32,
    pub data: Vec<u8>,
}

impl Raster {
    pub fn blank(width: u32, height: u32) -> Self {
        Self { width, height, data: vec![255; width as usize * height as usize] }
    }

    pub fn fill_rect(&mut self, x: u32, y: u32, w: u32, h: u32, value: u8) {
        let x1 = x.saturating_add(w).min(self.width);
        let y1 = y.saturating_add(h).min(self.height);
        for yy in y.min(self.height)..y1 {
            let row = yy as usize * self.width as usize;
            for xx in x.min(self.width)..x1 {
                self.data[row + xx as usize] = value;
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum RenderError {
    PageOutOfRange(u32),
    Unsupported(String),
    Failed(String),
}

impl std::fmt::Display for RenderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RenderError::PageOutOfRange(p) => write!(f, "page {} is out of range", p),
            RenderError::Unsupported(s) => write!(f, "unsupported content: {}", s),
            RenderError::Failed(s) => write!(f, "render failed: {}", s),
        }
    }
}

impl std::error::Error for RenderError {}

/// Renders a page of an already parsed document with a chosen layer set.
pub trait PageRasterizer: Send + Sync {
    fn name(&self) -> &'static str;

    fn render(
        &self,
        doc: &LayeredDocument,
        page_index: usize,
        dpi: u32,
        visibility: &LayerVisibility,
    ) -> Result<Raster, RenderError>;
}

/// Pixel rectangle enclosing every differing sample.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiffRegion {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

/// Share of samples that differ at all between two renders. Renders of
/// different size are treated as fully changed.
pub fn diff_ratio(a: &Raster, b: &Raster) -> f64 {
    if a.width != b.width || a.height != b.height {
        return 1.0;
    }
    if a.data.is_empty() {
        return 0.0;
    }
    let differing = a.data.iter().zip(&b.data).filter(|(p, q)| p != q).count();
    differing as f64 / a.data.len() as f64
}

pub fn diff_region(a: &Raster, b: &Raster) -> Option<DiffRegion> {
    if a.width != b.width || a.height != b.height {
        return None;
    }
    let w = a.width as usize;
    let (mut x0, mut y0, mut x1, mut y1) = (usize::MAX, usize::MAX, 0usize, 0usize);
    for (i, (p, q)) in a.data.iter().zip(&b.data).enumerate() {
        if p != q {
            let (x, y) = (i % w, i / w);
            x0 = x0.min(x);
            y0 = y0.min(y);
            x1 = x1.max(x);
            y1 = y1.max(y);
        }
    }
    if x0 == usize::MAX {
        return None;
    }
    Some(DiffRegion { x: x0 as u32, y: y0 as u32, w: (x1 - x0 + 1) as u32, h: (y1 - y0 + 1) as u32 })
}
