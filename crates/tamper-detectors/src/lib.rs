#![forbid(unsafe_code)]

use std::sync::Arc;

use layer_analysis::PageRasterizer;
use tamper_core::detect::Detector;

pub mod ela;
pub mod fonts;
pub mod injected_text;
pub mod noise_edge;
pub mod pdf_layers;
pub mod synthetic_text;

/// The full detector set. Without a rasterizer the layer detector falls back
/// to static marker scoring.
pub fn default_detectors(rasterizer: Option<Arc<dyn PageRasterizer>>) -> Vec<Box<dyn Detector>> {
    vec![
        Box::new(ela::ElaDetector),
        Box::new(synthetic_text::SyntheticTextDetector),
        Box::new(injected_text::InjectedTextDetector),
        Box::new(noise_edge::NoiseEdgeDetector),
        Box::new(pdf_layers::PdfLayerDetector::new(rasterizer)),
        Box::new(fonts::FontConsistencyDetector),
    ]
}
