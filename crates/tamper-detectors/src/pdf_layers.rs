use std::sync::Arc;

use anyhow::Result;
use image_analysis::BBox;
use layer_analysis::{analyze_document, DiffMethod, LayerError, LayerRisk, PageRasterizer};
use tamper_core::detect::{Cost, Detector, DetectorOutput, Needs};
use tamper_core::error::DetectorError;
use tamper_core::model::{ForensicVerdict, Outcome, Severity};
use tamper_core::scan::{checks, ScanContext};
use tamper_core::EvidenceBuilder;
use tracing::debug;

/// Hidden or added PDF content. Renders each candidate layer against a
/// baseline when a rasterizer is available, otherwise scores static markers.
pub struct PdfLayerDetector {
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl PdfLayerDetector {
    pub fn new(rasterizer: Option<Arc<dyn PageRasterizer>>) -> Self {
        Self { rasterizer }
    }
}

impl Detector for PdfLayerDetector {
    fn id(&self) -> &'static str {
        "pdf_layers"
    }

    fn check(&self) -> &'static str {
        checks::PDF_LAYERS
    }

    fn needs(&self) -> Needs {
        Needs::PDF
    }

    fn cost(&self) -> Cost {
        if self.rasterizer.is_some() {
            Cost::Expensive
        } else {
            Cost::Cheap
        }
    }

    fn run(&self, ctx: &ScanContext) -> Result<DetectorOutput> {
        let doc = ctx.pdf.as_ref().ok_or(DetectorError::MissingInput("pdf"))?;
        let opts = &ctx.options.layers;
        if ctx.bytes.len() > opts.max_input_bytes {
            return Err(LayerError::InputTooLarge { size: ctx.bytes.len(), limit: opts.max_input_bytes }.into());
        }
        let report = analyze_document(ctx.bytes, doc, self.rasterizer.as_deref(), opts);

        let mut evidence = EvidenceBuilder::new(checks::PDF_LAYERS);
        for page in &report.pages {
            for layer in page.layers.iter().filter(|l| l.changed) {
                let label = match &layer.name {
                    Some(name) => format!("{} '{}'", layer.layer, name),
                    None => layer.layer.clone(),
                };
                let detalle = match report.method {
                    DiffMethod::RenderDiff => {
                        format!("{} changes {:.1}% of page {}", label, layer.diff_ratio * 100.0, page.page)
                    }
                    DiffMethod::Static => format!("{} carries {} on page {}", label, layer.markers.join(", "), page.page),
                };
                evidence.push(
                    "capa_modificada",
                    Severity::High,
                    detalle,
                    layer.region.map(|r| BBox::new(r.x, r.y, r.w, r.h)),
                );
            }
            for image in page.images.iter().filter(|i| i.suspicious) {
                evidence.push(
                    "imagen_parche",
                    Severity::Medium,
                    format!("{} {}x{} on page {}", image.name, image.width, image.height, page.page),
                    None,
                );
            }
        }
        if report.method == DiffMethod::Static && report.static_scan.has_ocg {
            evidence.push(
                "contenido_opcional",
                Severity::Medium,
                format!(
                    "{} optional-content markers, confidence {:.2}",
                    report.static_scan.ocg_count, report.static_scan.ocg_confidence
                ),
                None,
            );
        }
        if report.static_scan.has_acroform {
            evidence.push(
                "formulario_acroform",
                Severity::Low,
                format!(
                    "AcroForm with {} fields, {} annotations over body text",
                    report.static_scan.acroform_fields, report.static_scan.annotation_overlaps
                ),
                None,
            );
        }

        let changed = report.changed_layers().count();
        let flagged = report.flagged_images();
        let severity = match report.risk {
            LayerRisk::High => Severity::High,
            LayerRisk::Medium => Severity::Medium,
            LayerRisk::Low => Severity::Low,
        };
        let detected = report.risk != LayerRisk::Low || changed > 0 || flagged > 0;
        debug!(changed, flagged, risk = report.risk.as_str(), "layer verdict");
        let verdict = ForensicVerdict {
            detected,
            nivel: report.risk.as_str().to_string(),
            confianza: report.probability,
            severity,
            details: serde_json::to_value(&report)?,
        };
        let evidence = if detected { evidence.build() } else { Vec::new() };
        Ok(DetectorOutput::new(Outcome::Analyzed(verdict), evidence))
    }
}
