#![forbid(unsafe_code)]

//! Pixel-level tampering analyzers over a decoded grayscale page.

pub mod components;
pub mod ela;
pub mod filters;
pub mod geometry;
pub mod glyphs;
pub mod hough;
pub mod injected_text;
pub mod noise_edge;
pub mod pixel_buffer;
pub mod raster;
pub mod screenshot;
pub mod stroke;
pub mod synthetic_text;
pub mod texture;

use serde::{Deserialize, Serialize};

pub use ela::{analyze_ela, ElaLevel, ElaOptions, ElaReport};
pub use geometry::BBox;
pub use injected_text::{analyze_injected_text, InjectedLevel, InjectedTextOptions, InjectedTextReport};
pub use noise_edge::{analyze_noise_edges, InconsistencyLevel, NoiseEdgeOptions, NoiseEdgeReport};
pub use pixel_buffer::{from_luma, load_pixels, LoaderOptions, PixelBuffer, PixelError};
pub use screenshot::{classify_screenshot, ScreenshotEvidence, ScreenshotOptions, ScreenshotVerdict};
pub use synthetic_text::{analyze_synthetic_text, SyntheticTextOptions, SyntheticTextReport};

/// A recognized word with its box, as produced by an external OCR engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TextToken {
    pub text: String,
    /// Recognition confidence in `[0, 1]`.
    pub confidence: f64,
    pub bbox: BBox,
}

impl TextToken {
    pub fn new(text: impl Into<String>, confidence: f64, bbox: BBox) -> Self {
        Self { text: text.into(), confidence, bbox }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SuspicionLevel {
    Bajo,
    Medio,
    Alto,
}

impl SuspicionLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            SuspicionLevel::Bajo => "BAJO",
            SuspicionLevel::Medio => "MEDIO",
            SuspicionLevel::Alto => "ALTO",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum AnalysisError {
    EmptyImage,
    TooSmall { width: u32, height: u32, min: u32 },
    Codec(String),
}

impl std::fmt::Display for AnalysisError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::EmptyImage => write!(f, "image has no pixels"),
            Self::TooSmall { width, height, min } => {
                write!(f, "image {}x{} is below the {}px minimum", width, height, min)
            }
            Self::Codec(s) => write!(f, "recompression failed: {}", s),
        }
    }
}

impl std::error::Error for AnalysisError {}
