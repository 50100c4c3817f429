#![forbid(unsafe_code)]

//! Typography consistency over per-word font metadata reported by OCR.

pub mod catalog;
pub mod consistency;
pub mod model;
pub mod normalize;

pub use consistency::analyze_font_consistency;
pub use model::{
    DetectedFont, FontConsistencyConfig, FontConsistencyReport, FontGroup, FontObservation, FontRisk, FontStyle,
    FontWeight, SuspiciousFont,
};
pub use normalize::normalize_family;
