//! Integration tests for the `tamper` CLI binary.
//!
//! These tests invoke the compiled binary directly via `std::process::Command`.
//! Run with: `cargo test -p tamper --test cli_integration`

use std::io::Write;
use std::path::Path;
use std::process::Command;

use image::{GrayImage, ImageFormat, Luma};
use lopdf::{dictionary, Document, Object, Stream};

fn tamper_bin() -> &'static str {
    env!("CARGO_BIN_EXE_tamper")
}

fn write_png(path: &Path, value: u8) {
    GrayImage::from_pixel(96, 96, Luma([value])).save_with_format(path, ImageFormat::Png).expect("write png");
}

fn write_file(dir: &Path, name: &str, body: &str) -> std::path::PathBuf {
    let path = dir.join(name);
    let mut f = std::fs::File::create(&path).expect("create");
    f.write_all(body.as_bytes()).expect("write");
    path
}

fn write_ocg_pdf(path: &Path) {
    let mut doc = Document::with_version("1.5");
    let pages_id = doc.new_object_id();
    let body = doc.add_object(Stream::new(dictionary! {}, b"BT /F1 12 Tf 72 720 Td (Saldo 10.00) Tj ET".to_vec()));
    let ocg_id = doc.add_object(dictionary! { "Type" => "OCG", "Name" => Object::string_literal("Correccion") });
    let overlay =
        doc.add_object(Stream::new(dictionary! {}, b"/OC /MC0 BDC 1 1 1 rg 300 700 200 40 re f EMC".to_vec()));
    let page_id = doc.add_object(dictionary! {
        "Type" => "Page",
        "Parent" => pages_id,
        "Contents" => vec![body.into(), overlay.into()],
        "Resources" => dictionary! { "Properties" => dictionary! { "MC0" => ocg_id } },
        "MediaBox" => vec![0.into(), 0.into(), 612.into(), 792.into()],
    });
    doc.objects.insert(
        pages_id,
        Object::Dictionary(dictionary! { "Type" => "Pages", "Kids" => vec![page_id.into()], "Count" => 1 }),
    );
    let catalog = doc.add_object(dictionary! {
        "Type" => "Catalog",
        "Pages" => pages_id,
        "OCProperties" => dictionary! { "OCGs" => vec![ocg_id.into()] },
    });
    doc.trailer.set("Root", catalog);
    doc.save(path).expect("save pdf");
}

fn run(args: &[&str]) -> std::process::Output {
    Command::new(tamper_bin()).args(args).env_remove("RUST_LOG").output().expect("failed to run tamper")
}

#[test]
fn analyze_json_on_blank_image_is_low() {
    let dir = tempfile::tempdir().expect("tempdir");
    let img = dir.path().join("blank.png");
    write_png(&img, 0);
    let out = run(&["analyze", img.to_str().expect("utf8"), "--json"]);
    assert!(out.status.success(), "exit code: {}", out.status);
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("stdout is not valid JSON");
    assert_eq!(json["kind"], "image");
    assert_eq!(json["width"], 96);
    assert_eq!(json["aggregate"]["grado_confianza"], "BAJO");
    assert_eq!(json["aggregate"]["puntuacion"], 0);
    assert!(json["detectors"].as_array().is_some_and(|d| !d.is_empty()));
}

#[test]
fn analyze_text_summary_lists_checks() {
    let dir = tempfile::tempdir().expect("tempdir");
    let img = dir.path().join("page.png");
    write_png(&img, 255);
    let out = run(&["analyze", img.to_str().expect("utf8")]);
    assert!(out.status.success());
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("grado_confianza: BAJO"), "{}", stdout);
    assert!(stdout.contains("analisis_ela_sospechoso"));
    assert!(stdout.contains("sha256: "));
}

#[test]
fn analyze_reads_ocr_tokens_and_profile() {
    let dir = tempfile::tempdir().expect("tempdir");
    let img = dir.path().join("page.png");
    write_png(&img, 255);
    let tokens = write_file(
        dir.path(),
        "tokens.json",
        r#"{"tokens": [{"text": "Total", "confidence": 91, "bbox": {"x": 4, "y": 4, "w": 30, "h": 10},
            "font_family": "Arial", "font_size": 11.0}]}"#,
    );
    let cfg = write_file(
        dir.path(),
        "tamper.toml",
        "[profiles.fonts_only.scan.weights]\nanalisis_ela_sospechoso = 0\nevidencias_forenses = 0\n",
    );
    let out = run(&[
        "analyze",
        img.to_str().expect("utf8"),
        "--ocr",
        tokens.to_str().expect("utf8"),
        "--config",
        cfg.to_str().expect("utf8"),
        "--profile",
        "fonts_only",
        "--json",
    ]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    let checks = json["aggregate"]["checks"].as_array().expect("checks");
    let ela = checks.iter().find(|c| c["check"] == "analisis_ela_sospechoso").expect("ela score");
    assert_eq!(ela["weight"], 0);
    assert!(json["detectors"].as_array().expect("detectors").iter().any(|d| d["check"] == "consistencia_fuentes"));
}

#[test]
fn malformed_ocr_file_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let img = dir.path().join("page.png");
    write_png(&img, 255);
    let tokens = write_file(dir.path(), "tokens.json", "{\"words\": 3}");
    let out = run(&["analyze", img.to_str().expect("utf8"), "--ocr", tokens.to_str().expect("utf8")]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("invalid OCR token file"));
}

#[test]
fn missing_file_exits_nonzero() {
    let out = run(&["analyze", "/nonexistent/scan.png"]);
    assert!(!out.status.success());
}

#[test]
fn undecodable_input_exits_nonzero() {
    let dir = tempfile::tempdir().expect("tempdir");
    let bad = write_file(dir.path(), "bad.png", "not an image at all");
    let out = run(&["analyze", bad.to_str().expect("utf8")]);
    assert!(!out.status.success());
}

#[test]
fn batch_mode_emits_one_line_per_match() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_png(&dir.path().join("a.png"), 0);
    write_png(&dir.path().join("b.png"), 255);
    write_file(dir.path(), "notes.txt", "skip me");
    let out = run(&["analyze", "--path", dir.path().to_str().expect("utf8"), "--glob", "*.png", "--json"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<serde_json::Value> = stdout
        .lines()
        .filter(|l| !l.trim().is_empty())
        .map(|l| serde_json::from_str(l).expect("JSONL line is not valid JSON"))
        .collect();
    assert_eq!(lines.len(), 2);
    for line in &lines {
        assert_eq!(line["sha256"].as_str().map(str::len), Some(64));
        assert!(line["path"].as_str().is_some_and(|p| p.ends_with(".png")));
        assert!(line["report"]["aggregate"].is_object());
    }
}

#[test]
fn batch_without_matches_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    write_file(dir.path(), "notes.txt", "nothing");
    let out = run(&["analyze", "--path", dir.path().to_str().expect("utf8"), "--glob", "*.png"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("no files matched"));
}

#[test]
fn layers_reports_optional_content_statically() {
    let dir = tempfile::tempdir().expect("tempdir");
    let pdf = dir.path().join("stamped.pdf");
    write_ocg_pdf(&pdf);
    let out = run(&["layers", pdf.to_str().expect("utf8"), "--json"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(json["method"], "static");
    assert_eq!(json["pages_total"], 1);
    assert_eq!(json["static_scan"]["has_ocg"], true);
    assert_eq!(json["pages"][0]["candidates"], 2);
    assert_eq!(json["pages"][0]["stream_markers"][1]["hits"][0]["pattern"], "optional_content");

    let out = run(&["layers", pdf.to_str().expect("utf8")]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("2 of 2 layers changed"));

    let out = run(&["layers", pdf.to_str().expect("utf8"), "--page", "3"]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("out of range"));
}

#[test]
fn config_check_accepts_valid_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = write_file(
        dir.path(),
        "tamper.yaml",
        "scan:\n  weights:\n    capas_ocultas: 30\nprofiles:\n  strict:\n    scan:\n      grading:\n        alto: 60.0\n",
    );
    let out = run(&["config-check", cfg.to_str().expect("utf8"), "--profile", "strict", "--json"]);
    assert!(out.status.success(), "stderr: {}", String::from_utf8_lossy(&out.stderr));
    let json: serde_json::Value = serde_json::from_slice(&out.stdout).expect("json");
    assert_eq!(json["weights"]["capas_ocultas"], 30);
    assert_eq!(json["grading"]["alto"], 60.0);

    let out = run(&["config-check", cfg.to_str().expect("utf8")]);
    assert!(out.status.success());
    assert!(String::from_utf8_lossy(&out.stdout).contains("profiles: strict"));
}

#[test]
fn config_check_rejects_invalid_values() {
    let dir = tempfile::tempdir().expect("tempdir");
    let cfg = write_file(dir.path(), "bad.toml", "[scan.layers]\ndiff_threshold = 3.5\n");
    let out = run(&["config-check", cfg.to_str().expect("utf8")]);
    assert!(!out.status.success());
    assert!(String::from_utf8_lossy(&out.stderr).contains("diff_threshold"));

    let cfg = write_file(dir.path(), "ok.toml", "[scan]\nparallel = false\n");
    let out = run(&["config-check", cfg.to_str().expect("utf8"), "--profile", "missing"]);
    assert!(!out.status.success());
}
