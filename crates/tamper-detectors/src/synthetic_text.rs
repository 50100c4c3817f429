use anyhow::Result;
use image_analysis::{analyze_synthetic_text, ScreenshotEvidence, SuspicionLevel};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::error::DetectorError;
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;

/// Flattened or pasted text: uniform strokes, pure fill and a halo around glyphs.
/// Also reports the facts the screenshot heuristic needs.
pub struct SyntheticTextDetector;

impl Detector for SyntheticTextDetector {
    fn id(&self) -> &'static str {
        "synthetic_text"
    }

    fn check(&self) -> &'static str {
        checks::SYNTHETIC_TEXT
    }

    fn needs(&self) -> Needs {
        Needs::PIXELS
    }

    fn cost(&self) -> Cost {
        Cost::Expensive
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let pixels = ctx.pixels.as_ref().ok_or(DetectorError::MissingInput("pixels"))?;
        let report = analyze_synthetic_text(&pixels.gray, &ctx.ocr_text(), &ctx.options.synthetic)
            .map_err(DetectorError::from)?;

        let screenshot = ScreenshotEvidence {
            width: pixels.width,
            height: pixels.height,
            line_density: report.lines.density,
            has_exif: pixels.has_exif,
            text_boxes: report.boxes.len(),
        };
        let detected = report.tiene_texto_sintetico;
        let severity = match report.nivel_sospecha {
            SuspicionLevel::Alto => Severity::High,
            SuspicionLevel::Medio => Severity::Medium,
            SuspicionLevel::Bajo => Severity::Low,
        };

        let mut evidence = EvidenceBuilder::new(checks::SYNTHETIC_TEXT).within(pixels.width, pixels.height);
        if detected {
            evidence.push(
                "texto_sintetico",
                severity,
                format!(
                    "{} candidate boxes, stroke cv {:.2}, pure ratio {:.2}, halo {:.2}",
                    report.boxes.len(),
                    report.stroke.cv,
                    report.pure_ratio,
                    report.halo_mean
                ),
                None,
            );
            for metrics in report.details.iter().filter(|m| m.color_pure) {
                evidence.push(
                    "caja_texto_uniforme",
                    severity,
                    format!("halo {:.2}, color mean {:.0}", metrics.halo_ratio, metrics.color_mean),
                    Some(metrics.bbox),
                );
            }
            if report.coincide_con_montos_fechas {
                evidence.push("montos_fechas", Severity::High, "synthetic text near amounts or dates", None);
            }
        }
        let verdict = ForensicVerdict {
            detected,
            nivel: report.nivel_sospecha.as_str().to_string(),
            confianza: report.signals.quality_signals() as f64 / 3.0,
            severity,
            details: serde_json::to_value(&report)?,
        };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence.build()).with_screenshot(screenshot))
    }
}
