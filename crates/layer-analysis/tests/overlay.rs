use std::collections::HashMap;

use layer_analysis::{
    analyze_layers, DiffMethod, LayerError, LayerKind, LayerOptions, LayerRisk, LayerVisibility, LayeredDocument,
    PageRasterizer, Raster, RenderError,
};
use lopdf::{dictionary, Document, Object, Stream};

#[derive(Default)]
struct Fixture {
    ocg: bool,
    extra_stream: bool,
    image: Option<(i64, i64)>,
    annotations: usize,
    /// Second content stream painting a transparency-group Form XObject.
    form_overlay: bool,
    /// Form field widget sitting over the body text, listed in an AcroForm.
    widget_over_text: bool,
}

fn build_pdf(f: &Fixture) -> Vec<u8> {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let font_id = doc.add_object(dictionary! {
        "Type" => "Font",
        "Subtype" => "Type1",
        "BaseFont" => "Helvetica",
    });
    let body = b"BT /F1 12 Tf 72 720 Td (Total 100.00) Tj ET".to_vec();
    let body_id = doc.add_object(Stream::new(dictionary! {}, body));
    let mut contents: Vec<Object> = vec![body_id.into()];
    let mut resources = dictionary! { "Font" => dictionary! { "F1" => font_id } };
    let mut catalog = dictionary! { "Type" => "Catalog", "Pages" => pages_id };

    if f.extra_stream {
        let patch = b"1 1 1 rg 300 650 120 30 re f".to_vec();
        contents.push(doc.add_object(Stream::new(dictionary! {}, patch)).into());
    }
    if f.ocg {
        let ocg_id = doc.add_object(dictionary! {
            "Type" => "OCG",
            "Name" => Object::string_literal("Edits"),
        });
        let overlay =
            b"/OC /MC0 BDC 1 1 1 rg 300 700 200 40 re f BT /F1 12 Tf 310 710 Td (Total 900.00) Tj ET EMC".to_vec();
        contents.push(doc.add_object(Stream::new(dictionary! {}, overlay)).into());
        resources.set("Properties", dictionary! { "MC0" => ocg_id });
        catalog.set(
            "OCProperties",
            dictionary! {
                "OCGs" => vec![ocg_id.into()],
                "D" => dictionary! { "ON" => vec![ocg_id.into()] },
            },
        );
    }
    let mut xobjects = lopdf::Dictionary::new();
    if f.form_overlay {
        let form = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Form",
                "BBox" => vec![0.into(), 0.into(), 120.into(), 30.into()],
                "Group" => dictionary! { "S" => "Transparency" },
            },
            b"0.95 g 0 0 120 30 re f BT /F1 12 Tf 4 8 Td (Total 900.00) Tj ET".to_vec(),
        );
        xobjects.set("Fm0", doc.add_object(form));
        let paint = b"q 1 0 0 1 300 650 cm /Fm0 Do Q".to_vec();
        contents.push(doc.add_object(Stream::new(dictionary! {}, paint)).into());
    }
    if let Some((w, h)) = f.image {
        let img = Stream::new(
            dictionary! {
                "Type" => "XObject",
                "Subtype" => "Image",
                "Width" => w,
                "Height" => h,
                "ColorSpace" => "DeviceGray",
                "BitsPerComponent" => 8,
            },
            vec![0u8; (w * h) as usize],
        );
        xobjects.set("Im1", doc.add_object(img));
    }
    if !xobjects.is_empty() {
        resources.set("XObject", xobjects);
    }

    let mut page = dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => contents,
        "Resources" => resources,
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    };
    if f.annotations > 0 {
        let annots: Vec<Object> = (0..f.annotations)
            .map(|i| {
                let y = 100 + 40 * i as i64;
                doc.add_object(dictionary! {
                    "Type" => "Annot",
                    "Subtype" => "FreeText",
                    "Rect" => vec![100.into(), y.into(), 300.into(), (y + 30).into()],
                })
                .into()
            })
            .collect();
        page.set("Annots", annots);
    }
    let page_id = doc.new_object_id();
    if f.widget_over_text {
        let widget = doc.add_object(dictionary! {
            "Type" => "Annot",
            "Subtype" => "Widget",
            "FT" => "Tx",
            "T" => Object::string_literal("total"),
            "Rect" => vec![60.into(), 710.into(), 200.into(), 740.into()],
            "P" => page_id,
        });
        page.set("Annots", vec![widget.into()]);
        catalog.set("AcroForm", dictionary! { "Fields" => vec![widget.into()] });
    }
    doc.objects.insert(page_id, Object::Dictionary(page));
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! {
            "Type" => "Pages",
            "Kids" => vec![page_id.into()],
            "Count" => 1,
        }),
    );
    let catalog_id = doc.add_object(catalog);
    doc.trailer.set("Root", catalog_id);
    let mut out = Vec::new();
    doc.save_to(&mut out).expect("save pdf");
    out
}

/// Paints a fixed rectangle for every visible layer of the given kind.
struct StampRasterizer {
    stamps: HashMap<LayerKind, (u32, u32, u32, u32)>,
}

impl PageRasterizer for StampRasterizer {
    fn name(&self) -> &'static str {
        "stamp"
    }

    fn render(
        &self,
        doc: &LayeredDocument,
        page_index: usize,
        _dpi: u32,
        visibility: &LayerVisibility,
    ) -> Result<Raster, RenderError> {
        let page = doc.pages().get(page_index).ok_or(RenderError::PageOutOfRange(page_index as u32))?;
        let mut raster = Raster::blank(100, 100);
        raster.fill_rect(10, 10, 40, 5, 0);
        for layer in &page.layers {
            if visibility.is_visible(layer.index) {
                if let Some(&(x, y, w, h)) = self.stamps.get(&layer.kind) {
                    raster.fill_rect(x, y, w, h, 30);
                }
            }
        }
        Ok(raster)
    }
}

struct BrokenRasterizer;

impl PageRasterizer for BrokenRasterizer {
    fn name(&self) -> &'static str {
        "broken"
    }

    fn render(&self, _: &LayeredDocument, _: usize, _: u32, _: &LayerVisibility) -> Result<Raster, RenderError> {
        Err(RenderError::Failed("no backend".into()))
    }
}

fn stamps(kind: LayerKind, side: u32) -> StampRasterizer {
    StampRasterizer { stamps: HashMap::from([(kind, (50, 50, side, side))]) }
}

#[test]
fn enumerates_candidate_layers() {
    let bytes = build_pdf(&Fixture { ocg: true, extra_stream: true, annotations: 2, ..Default::default() });
    let doc = LayeredDocument::parse(&bytes).expect("parse");
    let kinds: Vec<LayerKind> = doc.pages()[0].layers.iter().map(|l| l.kind).collect();
    assert_eq!(
        kinds,
        vec![
            LayerKind::ContentStream,
            LayerKind::ContentStream,
            LayerKind::Annotation,
            LayerKind::Annotation,
            LayerKind::Ocg,
        ]
    );
    let ocg = &doc.pages()[0].layers[4];
    assert_eq!(ocg.name.as_deref(), Some("Edits"));
    assert_eq!(ocg.id, "p1:ocg:1");
    assert_eq!(doc.pages()[0].layers[3].rect, Some([100.0, 140.0, 300.0, 170.0]));
}

#[test]
fn visible_ocg_overlay_exceeds_threshold() {
    let bytes = build_pdf(&Fixture { ocg: true, ..Default::default() });
    let rasterizer = stamps(LayerKind::Ocg, 30);
    let report = analyze_layers(&bytes, Some(&rasterizer), &LayerOptions::default()).expect("report");
    assert_eq!(report.method, DiffMethod::RenderDiff);
    let ocg = report.pages[0].layers.iter().find(|l| l.kind == LayerKind::Ocg).expect("ocg layer");
    assert!(ocg.diff_ratio > 0.05, "ratio {}", ocg.diff_ratio);
    assert!(ocg.changed);
    let region = ocg.region.expect("region");
    assert_eq!((region.x, region.y, region.w, region.h), (50, 50, 30, 30));
    // The OCG stream itself paints nothing under this rasterizer.
    let stream = report.pages[0].layers.iter().find(|l| l.kind == LayerKind::ContentStream).expect("stream");
    assert_eq!(stream.diff_ratio, 0.0);
    assert!((report.pages[0].probability - 0.5).abs() < 1e-12);
    assert!((report.probability - 0.25).abs() < 1e-12);
    assert_eq!(report.risk, LayerRisk::Medium);
}

#[test]
fn invisible_ocg_barely_changes_pixels() {
    let bytes = build_pdf(&Fixture { ocg: true, ..Default::default() });
    let rasterizer = stamps(LayerKind::Ocg, 1);
    let report = analyze_layers(&bytes, Some(&rasterizer), &LayerOptions::default()).expect("report");
    assert_eq!(report.changed_layers().count(), 0);
    assert!(report.pages[0].layers.iter().all(|l| l.diff_ratio < 0.001));
    assert_eq!(report.risk, LayerRisk::Low);
}

#[test]
fn plain_page_is_low_risk() {
    let bytes = build_pdf(&Fixture::default());
    let rasterizer = stamps(LayerKind::Ocg, 30);
    let report = analyze_layers(&bytes, Some(&rasterizer), &LayerOptions::default()).expect("report");
    assert_eq!(report.pages[0].candidates, 0);
    assert_eq!(report.probability, 0.0);
    assert_eq!(report.risk, LayerRisk::Low);
    assert!(!report.static_scan.has_ocg);
}

#[test]
fn static_fallback_uses_ocg_markers() {
    let bytes = build_pdf(&Fixture { ocg: true, ..Default::default() });
    let report = analyze_layers(&bytes, None, &LayerOptions::default()).expect("report");
    assert_eq!(report.method, DiffMethod::Static);
    assert!(report.static_scan.has_ocg);
    assert_eq!(report.static_scan.catalog_ocgs, 1);
    assert_eq!(report.static_scan.ocg_pages, vec![1]);
    let page = &report.pages[0];
    assert_eq!((page.candidates, page.changed), (2, 2));
    let stream = &page.layers[0];
    assert_eq!(stream.kind, LayerKind::ContentStream);
    assert_eq!(stream.markers, vec!["optional_content", "white_fill"]);
    assert_eq!(page.layers[1].markers, vec!["marked_content"]);
    assert_eq!(report.probability, 0.5);
    assert_eq!(report.risk, LayerRisk::High);
    assert!(report.notes.iter().any(|n| n.contains("static markers")));
}

#[test]
fn static_fallback_flags_transparent_form_overlay() {
    let bytes = build_pdf(&Fixture { form_overlay: true, ..Default::default() });
    let report = analyze_layers(&bytes, None, &LayerOptions::default()).expect("report");
    assert_eq!(report.method, DiffMethod::Static);
    assert!(!report.static_scan.has_ocg);
    let page = &report.pages[0];
    assert_eq!(page.candidates, 2);
    assert_eq!(page.changed, 2);
    let form = page.layers.iter().find(|l| l.kind == LayerKind::FormXObject).expect("form layer");
    assert_eq!(form.name.as_deref(), Some("Fm0"));
    assert_eq!(form.markers, vec!["transparency", "painted_by_overlay"]);

    assert_eq!(page.stream_markers.len(), 2);
    assert!(page.stream_markers[0].hits.is_empty());
    assert_eq!(page.stream_markers[1].index, 1);
    assert!(page.stream_markers[1].has("xobject_paint"));
    assert!(report.probability > 0.0);
    assert_eq!(report.risk, LayerRisk::High);
}

#[test]
fn plain_page_has_no_static_candidates() {
    let bytes = build_pdf(&Fixture::default());
    let report = analyze_layers(&bytes, None, &LayerOptions::default()).expect("report");
    assert_eq!(report.pages[0].candidates, 0);
    assert_eq!(report.probability, 0.0);
    assert_eq!(report.risk, LayerRisk::Low);
}

#[test]
fn widget_over_body_text_is_reported() {
    let bytes = build_pdf(&Fixture { widget_over_text: true, ..Default::default() });
    let report = analyze_layers(&bytes, None, &LayerOptions::default()).expect("report");
    assert!(report.static_scan.has_acroform);
    assert_eq!(report.static_scan.acroform_fields, 1);
    assert_eq!(report.static_scan.annotation_overlaps, 1);
    assert!(report.notes.iter().any(|n| n.contains("AcroForm with 1 fields")));
    let page = &report.pages[0];
    assert_eq!(page.annotation_overlaps, 1);
    let widget = page.layers.iter().find(|l| l.name.as_deref() == Some("Widget")).expect("widget");
    assert!(widget.changed);
    assert_eq!(widget.markers, vec!["covers_text"]);
}

#[test]
fn failed_renders_count_as_unchanged() {
    let bytes = build_pdf(&Fixture { ocg: true, extra_stream: true, ..Default::default() });
    let report = analyze_layers(&bytes, Some(&BrokenRasterizer), &LayerOptions::default()).expect("report");
    let page = &report.pages[0];
    assert!(page.baseline_error.is_some());
    assert_eq!(page.candidates, 3);
    assert_eq!(page.changed, 0);
    assert!(page.layers.iter().all(|l| l.error.is_some()));
}

#[test]
fn tiny_images_are_flagged_as_patches() {
    let bytes = build_pdf(&Fixture { image: Some((20, 400)), ..Default::default() });
    let report = analyze_layers(&bytes, None, &LayerOptions::default()).expect("report");
    assert_eq!(report.pages[0].images.len(), 1);
    assert_eq!(report.flagged_images(), 1);
    assert_eq!(report.pages[0].probability, 1.0);
    assert_eq!(report.probability, 0.5);

    let ok = build_pdf(&Fixture { image: Some((120, 80)), ..Default::default() });
    let report = analyze_layers(&ok, None, &LayerOptions::default()).expect("report");
    assert_eq!(report.flagged_images(), 0);
}

#[test]
fn layer_cap_is_noted() {
    let bytes = build_pdf(&Fixture { annotations: 5, ..Default::default() });
    let opts = LayerOptions { max_layers_per_page: 2, ..Default::default() };
    let report = analyze_layers(&bytes, Some(&stamps(LayerKind::Annotation, 10)), &opts).expect("report");
    assert_eq!(report.pages[0].candidates, 2);
    assert!(report.notes.iter().any(|n| n.contains("probed 2 of 5 layers")));
}

#[test]
fn garbage_is_a_document_error() {
    let err = analyze_layers(b"not a pdf", None, &LayerOptions::default()).unwrap_err();
    assert!(matches!(err, LayerError::Document(_)));
}

#[test]
fn report_is_serializable() {
    let bytes = build_pdf(&Fixture { ocg: true, ..Default::default() });
    let report = analyze_layers(&bytes, Some(&stamps(LayerKind::Ocg, 30)), &LayerOptions::default()).expect("report");
    let json = serde_json::to_value(&report).expect("json");
    assert_eq!(json["risk"], "MEDIUM");
    assert_eq!(json["pages"][0]["layers"][1]["kind"], "ocg");
}
