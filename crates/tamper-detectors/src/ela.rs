use anyhow::Result;
use image_analysis::{analyze_ela, ElaLevel};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::error::DetectorError;
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;

pub struct ElaDetector;

impl Detector for ElaDetector {
    fn id(&self) -> &'static str {
        "ela"
    }

    fn check(&self) -> &'static str {
        checks::ELA
    }

    fn needs(&self) -> Needs {
        Needs::PIXELS
    }

    fn cost(&self) -> Cost {
        Cost::Moderate
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let pixels = ctx.pixels.as_ref().ok_or(DetectorError::MissingInput("pixels"))?;
        let tokens = ctx.text_tokens();
        let report = analyze_ela(&pixels.gray, &tokens, &ctx.options.ela).map_err(DetectorError::from)?;

        let detected = report.marca_editada;
        let severity = match report.nivel_sospecha {
            ElaLevel::Prioritario => Severity::High,
            ElaLevel::Secundario => Severity::Medium,
        };
        let mut evidence = EvidenceBuilder::new(checks::ELA).within(pixels.width, pixels.height);
        if detected {
            for cluster in report.localized() {
                evidence.push(
                    "ela_cluster",
                    severity,
                    format!(
                        "{} tiles, perc_mean {:.3}, peak {:.0}, compactness {:.2}",
                        cluster.size_tiles, cluster.perc_mean, cluster.peak, cluster.compactness
                    ),
                    Some(cluster.bbox),
                );
            }
            if report.texto.overlap_digits {
                evidence.push("ela_digits", severity, "error peaks overlap numeric text", None);
            }
        }
        let confianza = report.localized().map(|c| c.perc_mean).fold(0.0, f64::max).clamp(0.0, 1.0);
        let nivel = if detected { report.nivel_sospecha.as_str() } else { "SIN_MARCA" };
        let verdict = ForensicVerdict {
            detected,
            nivel: nivel.to_string(),
            confianza: if detected { confianza } else { report.suspicious_global_ratio.clamp(0.0, 1.0) },
            severity: if detected { severity } else { Severity::Low },
            details: serde_json::to_value(&report)?,
        };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence.build()))
    }
}
