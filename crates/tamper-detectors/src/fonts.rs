use anyhow::Result;
use font_analysis::{analyze_font_consistency, FontRisk};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;

pub struct FontConsistencyDetector;

impl Detector for FontConsistencyDetector {
    fn id(&self) -> &'static str {
        "font_consistency"
    }

    fn check(&self) -> &'static str {
        checks::FONTS
    }

    fn needs(&self) -> Needs {
        Needs::FONT_METADATA
    }

    fn cost(&self) -> Cost {
        Cost::Cheap
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let words = ctx.font_observations();
        let report = analyze_font_consistency(&words, &ctx.options.fonts);
        if report.total_fuentes == 0 {
            return Ok(DetectorOutput::neutral("no words passed the font size and confidence filters"));
        }

        let (detected, severity) = match report.risk {
            FontRisk::High => (true, Severity::High),
            FontRisk::Medium => (true, Severity::Medium),
            FontRisk::Low => (false, Severity::Low),
        };
        let mut evidence = EvidenceBuilder::new(checks::FONTS);
        if detected {
            evidence.push(
                "inconsistencia_tipografica",
                severity,
                format!(
                    "{} groups over {} families, consistency {:.2}, diversity {:.2}",
                    report.grupos, report.familias_unicas, report.consistencia_score, report.indice_diversidad
                ),
                None,
            );
            for font in &report.fuentes_sospechosas {
                evidence.push("fuente_sospechosa", Severity::High, font.describe(), None);
            }
        }
        let verdict = ForensicVerdict {
            detected,
            nivel: report.risk.as_str().to_string(),
            confianza: (1.0 - report.consistencia_score).clamp(0.0, 1.0),
            severity,
            details: serde_json::to_value(&report)?,
        };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence.build()))
    }
}
