use std::sync::Arc;
use std::time::Instant;

use image_analysis::{classify_screenshot, from_luma, load_pixels, PixelBuffer};
use layer_analysis::{LayerVisibility, LayeredDocument, PageRasterizer};
use rayon::prelude::*;
use tracing::{debug, info, warn, Level};

use crate::aggregate::aggregate;
use crate::detect::{Detector, DetectorOutput};
use crate::error::{ConfigError, DecodeError};
use crate::model::{AnalysisReport, DetectorReport, InputKind, OcrToken, Outcome, Severity};
use crate::scan::{ScanContext, ScanOptions};
use crate::security_log::{AuditDomain, AuditEvent};

/// Validated options plus the detector set. Built once, reused per input.
pub struct ForensicPipeline {
    options: ScanOptions,
    detectors: Vec<Box<dyn Detector>>,
    rasterizer: Option<Arc<dyn PageRasterizer>>,
}

impl ForensicPipeline {
    pub fn new(options: ScanOptions, detectors: Vec<Box<dyn Detector>>) -> Result<Self, ConfigError> {
        options.validate()?;
        Ok(Self { options, detectors, rasterizer: None })
    }

    /// Renders the first page of PDF inputs so the pixel analyzers can run on it.
    pub fn with_rasterizer(mut self, rasterizer: Arc<dyn PageRasterizer>) -> Self {
        self.rasterizer = Some(rasterizer);
        self
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn detector_ids(&self) -> Vec<&'static str> {
        self.detectors.iter().map(|d| d.id()).collect()
    }

    /// Decode `bytes` and build the shared context. Fails before any detector runs.
    pub fn decode<'a>(
        &'a self,
        bytes: &'a [u8],
        tokens: &'a [OcrToken],
        notes: &mut Vec<String>,
    ) -> Result<ScanContext<'a>, DecodeError> {
        if bytes.is_empty() {
            return Err(DecodeError::Empty);
        }
        if bytes.len() > self.options.max_input_bytes {
            return Err(DecodeError::InputTooLarge { size: bytes.len(), limit: self.options.max_input_bytes });
        }
        let ctx = ScanContext::new(bytes, tokens, &self.options);
        match ctx.kind {
            InputKind::Image => {
                let pixels = load_pixels(bytes, &self.options.loader).map_err(DecodeError::Image)?;
                Ok(ctx.with_pixels(pixels))
            }
            InputKind::Pdf => {
                let doc = LayeredDocument::parse(bytes).map_err(DecodeError::Pdf)?;
                let pixels = self.render_first_page(&doc, notes);
                let ctx = ctx.with_pdf(doc);
                Ok(match pixels {
                    Some(p) => ctx.with_pixels(p),
                    None => ctx,
                })
            }
        }
    }

    fn render_first_page(&self, doc: &LayeredDocument, notes: &mut Vec<String>) -> Option<PixelBuffer> {
        let Some(rasterizer) = self.rasterizer.as_deref() else {
            notes.push("no rasterizer configured; pixel analyzers skipped for PDF input".to_string());
            return None;
        };
        let page = doc.pages().first()?;
        let visibility = LayerVisibility::all_shown(page.layers.len());
        match rasterizer.render(doc, 0, self.options.render_dpi, &visibility) {
            Ok(raster) => {
                let (w, h) = (raster.width, raster.height);
                let pixels = from_luma(w, h, raster.data);
                if pixels.is_none() {
                    notes.push(format!("rasterizer {} returned a malformed {}x{} page", rasterizer.name(), w, h));
                }
                pixels
            }
            Err(e) => {
                warn!(rasterizer = rasterizer.name(), error = %e, "first page render failed");
                notes.push(format!("first page render failed: {}", e));
                None
            }
        }
    }

    pub fn analyze(&self, bytes: &[u8], tokens: &[OcrToken]) -> Result<AnalysisReport, DecodeError> {
        let span = tracing::info_span!(
            "analyze",
            bytes_len = bytes.len(),
            tokens = tokens.len(),
            parallel = self.options.parallel
        );
        let _guard = span.enter();

        let mut notes = Vec::new();
        let ctx = match self.decode(bytes, tokens, &mut notes) {
            Ok(ctx) => ctx,
            Err(e) => {
                AuditEvent::new(AuditDomain::Input, "decode_failed", "Input could not be decoded")
                    .severity(Severity::Medium)
                    .emit();
                warn!(error = %e, "Input could not be decoded");
                return Err(e);
            }
        };
        info!(input_id = %ctx.input_id, kind = ?ctx.kind, "Starting analysis");

        let available = ctx.available();
        let (runnable, skipped): (Vec<&dyn Detector>, Vec<&dyn Detector>) =
            self.detectors.iter().map(|d| d.as_ref()).partition(|d| available.contains(d.needs()));
        for d in &skipped {
            debug!(detector = d.id(), needs = ?d.needs(), "Detector skipped; input not available");
            notes.push(format!("{} not run: required input not provided", d.check()));
        }

        let outputs = self.run_detectors(&ctx, &runnable);
        let screenshot = outputs
            .iter()
            .find_map(|(_, out)| out.screenshot)
            .map(|facts| classify_screenshot(&facts, &self.options.screenshot));

        let reports: Vec<DetectorReport> = outputs.into_iter().map(|(report, _)| report).collect();
        let mut aggregate = aggregate(&reports, screenshot, &self.options);
        notes.append(&mut aggregate.notes);
        aggregate.notes = notes;
        info!(
            puntuacion = aggregate.puntuacion,
            max = aggregate.max_puntuacion,
            grado = aggregate.grado_confianza.as_str(),
            "Analysis complete"
        );

        Ok(AnalysisReport {
            input_id: ctx.input_id.clone(),
            kind: ctx.kind,
            width: ctx.pixels.as_ref().map(|p| p.width),
            height: ctx.pixels.as_ref().map(|p| p.height),
            detectors: reports,
            aggregate,
        })
    }

    fn run_detectors(&self, ctx: &ScanContext, detectors: &[&dyn Detector]) -> Vec<(DetectorReport, DetectorOutput)> {
        if self.options.parallel && detectors.len() > 1 {
            match rayon::ThreadPoolBuilder::new().num_threads(self.options.max_parallel_detectors).build() {
                Ok(pool) => {
                    return pool.install(|| detectors.par_iter().map(|d| run_one(*d, ctx)).collect::<Vec<_>>());
                }
                Err(err) => {
                    AuditEvent::new(AuditDomain::Runtime, "detector_pool_unavailable", "Detector pool build failed")
                        .emit();
                    warn!(error = %err, "Detector pool build failed; running sequentially");
                }
            }
        }
        detectors.iter().map(|d| run_one(*d, ctx)).collect()
    }
}

/// Run one detector; an error becomes its neutral outcome.
fn run_one(detector: &dyn Detector, ctx: &ScanContext) -> (DetectorReport, DetectorOutput) {
    let start = Instant::now();
    let output = match detector.run(ctx) {
        Ok(output) => output,
        Err(err) => {
            let message = format!("{:#}", err);
            AuditEvent {
                level: Level::WARN,
                domain: AuditDomain::Detection,
                severity: Severity::Low,
                kind: "detector_degraded",
                detector: Some(detector.id()),
                input_id: Some(&ctx.input_id),
                message: "Detector failed; using neutral result",
            }
            .emit();
            warn!(detector = detector.id(), error = %message, "Detector failed; using neutral result");
            DetectorOutput::neutral(message)
        }
    };
    let elapsed_ms = start.elapsed().as_millis() as u64;
    debug!(
        detector = detector.id(),
        cost = detector.cost().as_str(),
        elapsed_ms,
        detected = output.outcome.detected(),
        "Detector finished"
    );
    let evidence = match &output.outcome {
        Outcome::Analyzed(_) => output.evidence.clone(),
        Outcome::Neutral { .. } => Vec::new(),
    };
    let report = DetectorReport {
        detector: detector.id().to_string(),
        check: detector.check().to_string(),
        outcome: output.outcome.clone(),
        evidence,
        elapsed_ms,
    };
    (report, output)
}
