use anyhow::Result;
use image_analysis::{analyze_injected_text, InjectedLevel};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::error::DetectorError;
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;

pub struct InjectedTextDetector;

impl Detector for InjectedTextDetector {
    fn id(&self) -> &'static str {
        "injected_text"
    }

    fn check(&self) -> &'static str {
        checks::INJECTED_TEXT
    }

    fn needs(&self) -> Needs {
        Needs::PIXELS | Needs::OCR_TOKENS
    }

    fn cost(&self) -> Cost {
        Cost::Moderate
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let pixels = ctx.pixels.as_ref().ok_or(DetectorError::MissingInput("pixels"))?;
        let tokens = ctx.text_tokens();
        let report = analyze_injected_text(&pixels.gray, &tokens, &ctx.options.injected)
            .map_err(DetectorError::from)?;

        let severity = match report.nivel {
            InjectedLevel::Prioritario => Severity::High,
            InjectedLevel::Medio => Severity::Medium,
            InjectedLevel::Bajo => Severity::Low,
        };
        let mut evidence = EvidenceBuilder::new(checks::INJECTED_TEXT).within(pixels.width, pixels.height);
        if report.matched {
            for token in &report.sospechosos {
                evidence.push(
                    "token_sospechoso",
                    severity,
                    format!("'{}' score {} ({})", token.text, token.score, token.reasons.join(", ")),
                    Some(token.bbox),
                );
            }
        }
        let verdict = ForensicVerdict {
            detected: report.matched,
            nivel: report.nivel.as_str().to_string(),
            confianza: (report.score as f64 / 100.0).clamp(0.0, 1.0),
            severity,
            details: serde_json::to_value(&report)?,
        };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence.build()))
    }
}
