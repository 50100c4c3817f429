use font_analysis::FontObservation;
use image_analysis::{BBox, ScreenshotVerdict, TextToken};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    Medium,
    High,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
        }
    }
}

/// Verdict of one analyzer that ran to completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForensicVerdict {
    pub detected: bool,
    /// Analyzer-specific level label, e.g. `PRIORITARIO` or `muy_alto`.
    pub nivel: String,
    pub confianza: f64,
    pub severity: Severity,
    /// Full analyzer report.
    pub details: serde_json::Value,
}

impl ForensicVerdict {
    pub fn clean(nivel: &str, details: serde_json::Value) -> Self {
        Self { detected: false, nivel: nivel.to_string(), confianza: 0.0, severity: Severity::Low, details }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Analyzed(ForensicVerdict),
    /// The analyzer produced nothing usable; carries no evidence and no weight.
    Neutral { reason: String },
}

impl Outcome {
    pub fn neutral(reason: impl Into<String>) -> Self {
        Outcome::Neutral { reason: reason.into() }
    }

    pub fn verdict(&self) -> Option<&ForensicVerdict> {
        match self {
            Outcome::Analyzed(v) => Some(v),
            Outcome::Neutral { .. } => None,
        }
    }

    pub fn detected(&self) -> bool {
        self.verdict().map(|v| v.detected).unwrap_or(false)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceItem {
    /// Stable content hash, see [`crate::evidence::evidence_id`].
    pub id: String,
    pub check: String,
    pub tipo: String,
    pub severidad: Severity,
    pub detalle: String,
    pub bbox: Option<BBox>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectorReport {
    pub detector: String,
    /// Weight-table key this detector scores under.
    pub check: String,
    pub outcome: Outcome,
    pub evidence: Vec<EvidenceItem>,
    pub elapsed_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum GradoConfianza {
    Bajo,
    Medio,
    Alto,
}

impl GradoConfianza {
    pub fn as_str(&self) -> &'static str {
        match self {
            GradoConfianza::Bajo => "BAJO",
            GradoConfianza::Medio => "MEDIO",
            GradoConfianza::Alto => "ALTO",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CheckScore {
    pub check: String,
    pub weight: u32,
    pub points: u32,
    pub ran: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregatedResult {
    pub evidencias: Vec<EvidenceItem>,
    pub puntuacion: u32,
    pub max_puntuacion: u32,
    pub porcentaje_confianza: f64,
    pub grado_confianza: GradoConfianza,
    pub es_screenshot: bool,
    pub tipo_imagen: String,
    pub risk_level: GradoConfianza,
    pub screenshot: Option<ScreenshotVerdict>,
    pub checks: Vec<CheckScore>,
    pub notes: Vec<String>,
}

fn full_confidence() -> f64 {
    1.0
}

/// One recognized word as delivered by the OCR collaborator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcrToken {
    pub text: String,
    #[serde(default = "full_confidence")]
    pub confidence: f64,
    pub bbox: BBox,
    #[serde(default)]
    pub font_family: Option<String>,
    #[serde(default)]
    pub font_size: Option<f64>,
    #[serde(default)]
    pub font_style: Option<String>,
    #[serde(default)]
    pub font_weight: Option<String>,
}

impl OcrToken {
    pub fn new(text: impl Into<String>, confidence: f64, bbox: BBox) -> Self {
        Self {
            text: text.into(),
            confidence,
            bbox,
            font_family: None,
            font_size: None,
            font_style: None,
            font_weight: None,
        }
    }

    pub fn with_font(mut self, family: &str, size: f64) -> Self {
        self.font_family = Some(family.to_string());
        self.font_size = Some(size);
        self
    }

    pub fn has_font_metadata(&self) -> bool {
        self.font_family.is_some() && self.font_size.is_some()
    }

    /// Confidence clamped to `[0, 1]`; some engines report percentages.
    pub fn unit_confidence(&self) -> f64 {
        let c = if self.confidence > 1.0 { self.confidence / 100.0 } else { self.confidence };
        c.clamp(0.0, 1.0)
    }

    pub fn to_text_token(&self) -> TextToken {
        TextToken::new(self.text.clone(), self.unit_confidence(), self.bbox)
    }

    pub fn to_font_observation(&self) -> FontObservation {
        FontObservation {
            text: self.text.clone(),
            family: self.font_family.clone(),
            size: self.font_size,
            style: self.font_style.clone(),
            weight: self.font_weight.clone(),
            confidence: self.unit_confidence(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InputKind {
    Image,
    Pdf,
}

impl InputKind {
    /// PDFs may carry junk before the header; readers accept it within the first KiB.
    pub fn sniff(bytes: &[u8]) -> Self {
        let head = &bytes[..bytes.len().min(1024)];
        if head.windows(5).any(|w| w == b"%PDF-") {
            InputKind::Pdf
        } else {
            InputKind::Image
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// blake3 of the input bytes.
    pub input_id: String,
    pub kind: InputKind,
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub detectors: Vec<DetectorReport>,
    pub aggregate: AggregatedResult,
}
