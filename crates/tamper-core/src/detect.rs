use image_analysis::ScreenshotEvidence;

use crate::model::{EvidenceItem, Outcome};
use crate::scan::ScanContext;

bitflags::bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Needs: u32 {
        const PIXELS        = 0b0001;
        const OCR_TOKENS    = 0b0010;
        const FONT_METADATA = 0b0100;
        const PDF           = 0b1000;
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum Cost {
    Cheap,
    Moderate,
    Expensive,
}

impl Cost {
    pub fn as_str(&self) -> &'static str {
        match self {
            Cost::Cheap => "cheap",
            Cost::Moderate => "moderate",
            Cost::Expensive => "expensive",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DetectorOutput {
    pub outcome: Outcome,
    pub evidence: Vec<EvidenceItem>,
    /// Facts for the screenshot heuristic, reported by the detector that has them.
    pub screenshot: Option<ScreenshotEvidence>,
}

impl DetectorOutput {
    pub fn new(outcome: Outcome, evidence: Vec<EvidenceItem>) -> Self {
        Self { outcome, evidence, screenshot: None }
    }

    pub fn neutral(reason: impl Into<String>) -> Self {
        Self::new(Outcome::neutral(reason), Vec::new())
    }

    pub fn with_screenshot(mut self, evidence: ScreenshotEvidence) -> Self {
        self.screenshot = Some(evidence);
        self
    }
}

pub trait Detector: Send + Sync {
    fn id(&self) -> &'static str;
    /// Weight-table key, one of [`crate::scan::checks::ALL`].
    fn check(&self) -> &'static str;
    fn needs(&self) -> Needs;
    fn cost(&self) -> Cost;
    fn run(&self, ctx: &ScanContext) -> anyhow::Result<DetectorOutput>;
}
