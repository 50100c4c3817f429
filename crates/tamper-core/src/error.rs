use std::fmt;

use image_analysis::{AnalysisError, PixelError};
use layer_analysis::DocumentError;

/// Input bytes that cannot be turned into pixels or a PDF model.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodeError {
    Empty,
    Image(PixelError),
    Pdf(DocumentError),
    InputTooLarge { size: usize, limit: usize },
}

impl fmt::Display for DecodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeError::Empty => write!(f, "input is empty"),
            DecodeError::Image(e) => write!(f, "image decode failed: {}", e),
            DecodeError::Pdf(e) => write!(f, "PDF parse failed: {}", e),
            DecodeError::InputTooLarge { size, limit } => {
                write!(f, "input of {} bytes exceeds the {} byte limit", size, limit)
            }
        }
    }
}

impl std::error::Error for DecodeError {}

#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    OutOfRange { field: &'static str, value: String, expected: &'static str },
    UnknownCheck(String),
    Invalid { field: &'static str, reason: String },
}

impl ConfigError {
    pub(crate) fn out_of_range(field: &'static str, value: impl fmt::Display, expected: &'static str) -> Self {
        ConfigError::OutOfRange { field, value: value.to_string(), expected }
    }
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::OutOfRange { field, value, expected } => {
                write!(f, "{} = {} is out of range (expected {})", field, value, expected)
            }
            ConfigError::UnknownCheck(name) => write!(f, "unknown check in weight table: {}", name),
            ConfigError::Invalid { field, reason } => write!(f, "{}: {}", field, reason),
        }
    }
}

impl std::error::Error for ConfigError {}

/// Failure inside a single analyzer. Recovered by the runner.
#[derive(Debug, Clone, PartialEq)]
pub enum DetectorError {
    Analysis(AnalysisError),
    MissingInput(&'static str),
    Unsupported(String),
}

impl fmt::Display for DetectorError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DetectorError::Analysis(e) => write!(f, "{}", e),
            DetectorError::MissingInput(what) => write!(f, "missing input: {}", what),
            DetectorError::Unsupported(s) => write!(f, "unsupported: {}", s),
        }
    }
}

impl std::error::Error for DetectorError {}

impl From<AnalysisError> for DetectorError {
    fn from(e: AnalysisError) -> Self {
        DetectorError::Analysis(e)
    }
}
