#![forbid(unsafe_code)]

//! Shared model, configuration and runner for the tampering pipeline.
//! Detector implementations live in `tamper-detectors`.

pub mod aggregate;
pub mod config;
pub mod detect;
pub mod error;
pub mod evidence;
pub mod model;
pub mod runner;
pub mod scan;
pub mod security_log;

pub use aggregate::{aggregate, SCREENSHOT_NOTE};
pub use config::Config;
pub use detect::{Cost, Detector, DetectorOutput, Needs};
pub use error::{ConfigError, DecodeError, DetectorError};
pub use evidence::EvidenceBuilder;
pub use model::{
    AggregatedResult, AnalysisReport, CheckScore, DetectorReport, EvidenceItem, ForensicVerdict, GradoConfianza,
    InputKind, OcrToken, Outcome, Severity,
};
pub use runner::ForensicPipeline;
pub use scan::{checks, CheckWeights, Grading, ScanContext, ScanOptions};
