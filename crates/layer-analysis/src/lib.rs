#![forbid(unsafe_code)]

//! Localizes content added on top of a PDF page: extra content streams,
//! annotations, Form XObjects and optional content groups are rendered one
//! at a time against a cached baseline.

pub mod document;
pub mod inventory;
pub mod overlay;
pub mod render;
pub mod static_scan;

use serde::{Deserialize, Serialize};

pub use document::{DocumentError, LayerDescriptor, LayerKind, LayeredDocument, PageLayers};
pub use inventory::ImageInfo;
pub use overlay::{analyze_document, analyze_layers, DiffMethod, LayerReport, LayerRisk, PageLayerReport, StreamAnalysis};
pub use render::{diff_ratio, DiffRegion, LayerVisibility, PageRasterizer, Raster, RenderError};
pub use static_scan::{scan_markers, stream_markers, text_origins, PatternHit, StaticScan, StreamMarkers};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LayerOptions {
    /// Render resolution for baseline and probes.
    pub dpi: u32,
    /// A layer counts as changed when more than this share of pixels differs.
    pub diff_threshold: f64,
    pub max_pages: usize,
    pub max_layers_per_page: usize,
    pub max_concurrent_renders: usize,
    pub max_input_bytes: usize,
}

impl Default for LayerOptions {
    fn default() -> Self {
        Self {
            dpi: 144,
            diff_threshold: 0.05,
            max_pages: 20,
            max_layers_per_page: 64,
            max_concurrent_renders: 4,
            max_input_bytes: 64 * 1024 * 1024,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum LayerError {
    InputTooLarge { size: usize, limit: usize },
    Document(DocumentError),
}

impl std::fmt::Display for LayerError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LayerError::InputTooLarge { size, limit } => {
                write!(f, "PDF of {} bytes exceeds the {} byte limit", size, limit)
            }
            LayerError::Document(e) => write!(f, "{}", e),
        }
    }
}

impl std::error::Error for LayerError {}
