use std::io::Cursor;

use image::{GrayImage, ImageFormat, Luma};
use image_analysis::{BBox, ScreenshotEvidence};
use tamper_core::{
    checks, ConfigError, Cost, DecodeError, Detector, DetectorOutput, EvidenceBuilder, ForensicPipeline,
    ForensicVerdict, GradoConfianza, Needs, OcrToken, Outcome, ScanContext, ScanOptions, Severity,
};

struct Fixed {
    id: &'static str,
    check: &'static str,
    needs: Needs,
    severity: Option<Severity>,
    screenshot: Option<ScreenshotEvidence>,
}

impl Fixed {
    fn new(id: &'static str, check: &'static str, needs: Needs, severity: Option<Severity>) -> Self {
        Self { id, check, needs, severity, screenshot: None }
    }
}

impl Detector for Fixed {
    fn id(&self) -> &'static str {
        self.id
    }
    fn check(&self) -> &'static str {
        self.check
    }
    fn needs(&self) -> Needs {
        self.needs
    }
    fn cost(&self) -> Cost {
        Cost::Cheap
    }
    fn run(&self, ctx: &ScanContext) -> anyhow::Result<DetectorOutput> {
        let pixels = ctx.pixels.as_ref().map(|p| (p.width, p.height)).unwrap_or((0, 0));
        let verdict = ForensicVerdict {
            detected: self.severity.is_some(),
            nivel: "TEST".into(),
            confianza: 0.5,
            severity: self.severity.unwrap_or(Severity::Low),
            details: serde_json::json!({ "width": pixels.0 }),
        };
        let evidence = EvidenceBuilder::new(self.check)
            .within(pixels.0, pixels.1)
            .region("test", verdict.severity, self.id, BBox::new(0, 0, 4, 4))
            .build();
        let mut out = DetectorOutput::new(Outcome::Analyzed(verdict), evidence);
        out.screenshot = self.screenshot;
        Ok(out)
    }
}

struct Failing;

impl Detector for Failing {
    fn id(&self) -> &'static str {
        "failing"
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
    fn run(&self, _: &ScanContext) -> anyhow::Result<DetectorOutput> {
        Err(anyhow::anyhow!("empty crop"))
    }
}

fn png(w: u32, h: u32) -> Vec<u8> {
    let img = GrayImage::from_pixel(w, h, Luma([180]));
    let mut out = Cursor::new(Vec::new());
    img.write_to(&mut out, ImageFormat::Png).expect("encode");
    out.into_inner()
}

fn pipeline(opts: ScanOptions, detectors: Vec<Box<dyn Detector>>) -> ForensicPipeline {
    ForensicPipeline::new(opts, detectors).expect("valid options")
}

#[test]
fn failing_detector_degrades_to_neutral() {
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(Fixed::new("ela", checks::ELA, Needs::PIXELS, Some(Severity::High))),
        Box::new(Failing),
    ];
    let report = pipeline(ScanOptions::default(), detectors).analyze(&png(32, 32), &[]).expect("report");
    assert_eq!(report.detectors.len(), 2);
    assert!(report.detectors[0].outcome.detected());
    match &report.detectors[1].outcome {
        Outcome::Neutral { reason } => assert!(reason.contains("empty crop")),
        other => panic!("expected neutral, got {:?}", other),
    }
    assert!(report.detectors[1].evidence.is_empty());
    assert_eq!(report.aggregate.max_puntuacion, 5);
    assert_eq!(report.aggregate.puntuacion, 5);
    assert_eq!(report.aggregate.grado_confianza, GradoConfianza::Alto);
    assert!(report.aggregate.notes.iter().any(|n| n.contains("empty crop")));
}

#[test]
fn detectors_without_input_are_skipped() {
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(Fixed::new("ela", checks::ELA, Needs::PIXELS, None)),
        Box::new(Fixed::new("fonts", checks::FONTS, Needs::FONT_METADATA, Some(Severity::High))),
        Box::new(Fixed::new("layers", checks::PDF_LAYERS, Needs::PDF, Some(Severity::High))),
    ];
    let p = pipeline(ScanOptions::default(), detectors);

    let report = p.analyze(&png(16, 16), &[]).expect("report");
    assert_eq!(report.detectors.len(), 1);
    assert_eq!(report.aggregate.puntuacion, 0);
    assert_eq!(report.aggregate.grado_confianza, GradoConfianza::Bajo);
    assert!(report.aggregate.notes.iter().any(|n| n.starts_with(checks::FONTS)));

    let tokens = vec![OcrToken::new("Total", 0.9, BBox::new(1, 1, 8, 4)).with_font("Arial", 11.0)];
    let report = p.analyze(&png(16, 16), &tokens).expect("report");
    assert_eq!(report.detectors.len(), 2);
    assert_eq!(report.aggregate.puntuacion, 15);
    assert_eq!(report.aggregate.max_puntuacion, 20);
}

#[test]
fn parallel_and_sequential_agree() {
    let make = || -> Vec<Box<dyn Detector>> {
        vec![
            Box::new(Fixed::new("a", checks::ELA, Needs::PIXELS, Some(Severity::Medium))),
            Box::new(Fixed::new("b", checks::SYNTHETIC_TEXT, Needs::PIXELS, None)),
            Box::new(Fixed::new("c", checks::NOISE_EDGE, Needs::PIXELS, Some(Severity::Low))),
        ]
    };
    let bytes = png(20, 20);
    let par = pipeline(ScanOptions::default(), make()).analyze(&bytes, &[]).expect("report");
    let seq = pipeline(ScanOptions { parallel: false, ..ScanOptions::default() }, make())
        .analyze(&bytes, &[])
        .expect("report");
    let ids = |r: &tamper_core::AnalysisReport| r.detectors.iter().map(|d| d.detector.clone()).collect::<Vec<_>>();
    assert_eq!(ids(&par), vec!["a", "b", "c"]);
    assert_eq!(ids(&par), ids(&seq));
    assert_eq!(par.aggregate.puntuacion, seq.aggregate.puntuacion);
    assert_eq!(par.aggregate.evidencias, seq.aggregate.evidencias);
    assert_eq!(par.input_id, seq.input_id);
}

#[test]
fn screenshot_facts_reach_the_aggregate() {
    let mut synth = Fixed::new("synthetic", checks::SYNTHETIC_TEXT, Needs::PIXELS, Some(Severity::High));
    synth.screenshot =
        Some(ScreenshotEvidence { width: 1080, height: 1920, line_density: 0.4, has_exif: false, text_boxes: 9 });
    let detectors: Vec<Box<dyn Detector>> = vec![
        Box::new(synth),
        Box::new(Fixed::new("ela", checks::ELA, Needs::PIXELS, None)),
        Box::new(Fixed::new("noise", checks::NOISE_EDGE, Needs::PIXELS, None)),
    ];
    let report = pipeline(ScanOptions::default(), detectors).analyze(&png(8, 8), &[]).expect("report");
    assert!(report.aggregate.es_screenshot);
    assert_eq!(report.aggregate.puntuacion, 6);
    assert_eq!(report.aggregate.grado_confianza, GradoConfianza::Bajo);
    assert!(report.aggregate.notes.iter().any(|n| n == tamper_core::SCREENSHOT_NOTE));
}

#[test]
fn undecodable_input_fails_before_detectors() {
    let p = pipeline(ScanOptions::default(), vec![Box::new(Failing)]);
    assert_eq!(p.analyze(b"", &[]).unwrap_err(), DecodeError::Empty);
    assert!(matches!(p.analyze(b"definitely not an image", &[]), Err(DecodeError::Image(_))));
    assert!(matches!(p.analyze(b"%PDF-1.4\ngarbage", &[]), Err(DecodeError::Pdf(_))));

    let small = pipeline(ScanOptions { max_input_bytes: 4, ..ScanOptions::default() }, Vec::new());
    assert!(matches!(small.analyze(&png(4, 4), &[]), Err(DecodeError::InputTooLarge { .. })));
}

#[test]
fn invalid_options_fail_construction() {
    let mut opts = ScanOptions::default();
    opts.noise_edge.canny_low = 200.0;
    let err = ForensicPipeline::new(opts, Vec::new()).err().expect("config error");
    assert!(matches!(err, ConfigError::Invalid { field: "noise_edge.canny_low", .. }));
}

#[test]
fn report_serializes() {
    let detectors: Vec<Box<dyn Detector>> =
        vec![Box::new(Fixed::new("ela", checks::ELA, Needs::PIXELS, Some(Severity::High)))];
    let report = pipeline(ScanOptions::default(), detectors).analyze(&png(8, 8), &[]).expect("report");
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["kind"], "image");
    assert_eq!(json["detectors"][0]["outcome"]["status"], "analyzed");
    assert_eq!(json["detectors"][0]["outcome"]["severity"], "high");
    assert_eq!(json["aggregate"]["grado_confianza"], "ALTO");
    assert_eq!(json["aggregate"]["evidencias"][0]["bbox"]["w"], 4);
}
