use anyhow::Result;
use image_analysis::{analyze_noise_edges, InconsistencyLevel};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::error::DetectorError;
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;

pub struct NoiseEdgeDetector;

impl Detector for NoiseEdgeDetector {
    fn id(&self) -> &'static str {
        "noise_edge"
    }

    fn check(&self) -> &'static str {
        checks::NOISE_EDGE
    }

    fn needs(&self) -> Needs {
        Needs::PIXELS
    }

    fn cost(&self) -> Cost {
        Cost::Moderate
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let pixels = ctx.pixels.as_ref().ok_or(DetectorError::MissingInput("pixels"))?;
        let report = analyze_noise_edges(&pixels.gray, &ctx.options.noise_edge).map_err(DetectorError::from)?;

        let severity = match report.nivel_inconsistencia {
            InconsistencyLevel::MuyAlto | InconsistencyLevel::Alto => Severity::High,
            InconsistencyLevel::Medio => Severity::Medium,
            InconsistencyLevel::Bajo => Severity::Low,
        };
        let detected = report.inconsistencias_detectadas;
        let mut evidence = EvidenceBuilder::new(checks::NOISE_EDGE).within(pixels.width, pixels.height);
        if detected {
            for area in report.areas.iter().filter(|a| a.sospechosa) {
                evidence.push("area_sospechosa", severity, format!("variance {:.1}", area.variance), Some(area.bbox));
            }
            for region in report.noise_regions.iter().filter(|r| r.inconsistente) {
                evidence.push("ruido_inconsistente", severity, format!("noise std {:.3}", region.std), Some(region.bbox));
            }
            for edge in report.edges.iter().filter(|e| e.irregular) {
                evidence.push(
                    "borde_irregular",
                    severity,
                    format!("circularity {:.2}, smoothness {:.2}", edge.circularity, edge.smoothness),
                    Some(edge.bbox),
                );
            }
        }
        let flagged = report.areas_sospechosas + report.patrones_ruido_inconsistentes + report.bordes_irregulares;
        let verdict = ForensicVerdict {
            detected,
            nivel: report.nivel_inconsistencia.as_str().to_string(),
            confianza: (flagged as f64 / 6.0).min(1.0),
            severity,
            details: serde_json::to_value(&report)?,
        };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence.build()))
    }
}
