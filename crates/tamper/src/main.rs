#![forbid(unsafe_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{anyhow, Result};
use clap::{Parser, Subcommand};
use globset::Glob;
use layer_analysis::{analyze_layers, LayerReport};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tamper_core::{AnalysisReport, Config, ForensicPipeline, OcrToken, Outcome, ScanOptions};
use tamper_detectors::default_detectors;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkdir::WalkDir;

const MAX_INPUT_BYTES: u64 = 256 * 1024 * 1024;
const MAX_OCR_BYTES: u64 = 16 * 1024 * 1024;
const MAX_BATCH_FILES: usize = 10_000;
const MAX_WALK_DEPTH: usize = 10;

#[derive(Parser)]
#[command(name = "tamper", version, about = "Detect digital tampering in document images and PDFs")]
struct Args {
    /// Log filter used when RUST_LOG is unset, e.g. `info` or `tamper_core=debug`.
    #[arg(long, global = true)]
    log_level: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    #[command(about = "Run every detector on an image or PDF and aggregate the evidence")]
    Analyze {
        #[arg(value_name = "INPUT", required_unless_present = "path")]
        input: Option<PathBuf>,
        /// Analyze every matching file below this directory.
        #[arg(long, conflicts_with = "input")]
        path: Option<PathBuf>,
        #[arg(long, default_value = "*.{png,jpg,jpeg,pdf}")]
        glob: String,
        /// OCR tokens as a JSON array, or an object with a `tokens` array.
        #[arg(long)]
        ocr: Option<PathBuf>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        json: bool,
        #[arg(long, alias = "seq")]
        sequential: bool,
    },
    #[command(about = "Report added or hidden PDF content layers (static markers only)")]
    Layers {
        #[arg(value_name = "PDF")]
        pdf: PathBuf,
        /// Only show this 1-based page.
        #[arg(long)]
        page: Option<u32>,
        #[arg(long)]
        config: Option<PathBuf>,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        json: bool,
    },
    #[command(about = "Validate a configuration file and print the effective options")]
    ConfigCheck {
        #[arg(value_name = "FILE")]
        file: PathBuf,
        #[arg(long)]
        profile: Option<String>,
        #[arg(long)]
        json: bool,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();
    let config_path = match &args.command {
        Command::Analyze { config, .. } | Command::Layers { config, .. } => config.clone(),
        Command::ConfigCheck { file, .. } => Some(file.clone()),
    };
    let config = config_path.as_deref().map(Config::load).transpose()?;
    init_logging(args.log_level.as_deref().or_else(|| config.as_ref().and_then(|c| c.log_level())));

    match args.command {
        Command::Analyze { input, path, glob, ocr, profile, json, sequential, .. } => {
            let mut opts = options_from(config.as_ref(), profile.as_deref());
            if sequential {
                opts.parallel = false;
            }
            let tokens = match ocr {
                Some(p) => read_tokens(&p)?,
                None => Vec::new(),
            };
            let pipeline = ForensicPipeline::new(opts, default_detectors(None))?;
            match (input, path) {
                (Some(input), _) => run_analyze(&pipeline, &input, &tokens, json),
                (None, Some(dir)) => run_batch(&pipeline, &dir, &glob, &tokens, json),
                (None, None) => Err(anyhow!("either INPUT or --path is required")),
            }
        }
        Command::Layers { pdf, page, profile, json, .. } => {
            let opts = options_from(config.as_ref(), profile.as_deref());
            opts.validate()?;
            run_layers(&pdf, page, &opts, json)
        }
        Command::ConfigCheck { file, profile, json } => {
            let config = config.ok_or_else(|| anyhow!("config {} not loaded", file.display()))?;
            run_config_check(&config, profile.as_deref(), json)
        }
    }
}

fn init_logging(level: Option<&str>) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.unwrap_or("warn")));
    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .try_init();
}

fn options_from(config: Option<&Config>, profile: Option<&str>) -> ScanOptions {
    let mut opts = ScanOptions::default();
    if let Some(cfg) = config {
        cfg.apply(&mut opts, profile);
    }
    opts
}

fn read_with_limit(path: &Path, max_bytes: u64) -> Result<Vec<u8>> {
    if let Ok(meta) = fs::metadata(path) {
        if meta.len() > max_bytes {
            eprintln!(
                "security_boundary: read rejected for {} ({} bytes exceeds limit {})",
                path.display(),
                meta.len(),
                max_bytes
            );
            return Err(anyhow!("file {} exceeds {} bytes", path.display(), max_bytes));
        }
    }
    Ok(fs::read(path)?)
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenFile {
    List(Vec<OcrToken>),
    Wrapped { tokens: Vec<OcrToken> },
}

fn read_tokens(path: &Path) -> Result<Vec<OcrToken>> {
    let data = read_with_limit(path, MAX_OCR_BYTES)?;
    let tokens = match serde_json::from_slice::<TokenFile>(&data)
        .map_err(|e| anyhow!("invalid OCR token file {}: {}", path.display(), e))?
    {
        TokenFile::List(t) | TokenFile::Wrapped { tokens: t } => t,
    };
    info!(path = %path.display(), tokens = tokens.len(), "Loaded OCR tokens");
    Ok(tokens)
}

fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[derive(Serialize)]
struct FileReport<'a> {
    path: String,
    sha256: String,
    report: &'a AnalysisReport,
}

fn run_analyze(pipeline: &ForensicPipeline, input: &Path, tokens: &[OcrToken], json: bool) -> Result<()> {
    let bytes = read_with_limit(input, MAX_INPUT_BYTES)?;
    let report = pipeline.analyze(&bytes, tokens)?;
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(input, &sha256_hex(&bytes), &report);
    }
    Ok(())
}

fn run_batch(pipeline: &ForensicPipeline, dir: &Path, glob: &str, tokens: &[OcrToken], json: bool) -> Result<()> {
    let matcher = Glob::new(glob)?.compile_matcher();
    let mut paths = Vec::new();
    for entry in WalkDir::new(dir).follow_links(false).max_depth(MAX_WALK_DEPTH).into_iter().filter_map(Result::ok) {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        if !(matcher.is_match(entry.path()) || matcher.is_match(name.as_ref())) {
            continue;
        }
        paths.push(entry.path().to_path_buf());
        if paths.len() > MAX_BATCH_FILES {
            eprintln!("security_boundary: batch file count exceeded (max {})", MAX_BATCH_FILES);
            return Err(anyhow!("batch file count exceeds {}", MAX_BATCH_FILES));
        }
    }
    if paths.is_empty() {
        return Err(anyhow!("no files matched {} in {}", glob, dir.display()));
    }
    paths.sort();

    let results: Vec<(PathBuf, Result<(String, AnalysisReport)>)> = paths
        .par_iter()
        .map(|path| {
            let outcome = read_with_limit(path, MAX_INPUT_BYTES).and_then(|bytes| {
                let report = pipeline.analyze(&bytes, tokens)?;
                Ok((sha256_hex(&bytes), report))
            });
            (path.clone(), outcome)
        })
        .collect();

    let mut failures = 0usize;
    for (path, outcome) in &results {
        match outcome {
            Ok((sha256, report)) if json => {
                let line = FileReport { path: path.display().to_string(), sha256: sha256.clone(), report };
                println!("{}", serde_json::to_string(&line)?);
            }
            Ok((_, report)) => println!(
                "{}\t{}\t{:.1}%\t{}/{}",
                path.display(),
                report.aggregate.grado_confianza.as_str(),
                report.aggregate.porcentaje_confianza,
                report.aggregate.puntuacion,
                report.aggregate.max_puntuacion
            ),
            Err(e) => {
                failures += 1;
                warn!(path = %path.display(), error = %e, "Analysis failed");
                eprintln!("{}: {}", path.display(), e);
            }
        }
    }
    info!(files = results.len(), failures, "Batch complete");
    if failures == results.len() {
        return Err(anyhow!("all {} files failed", failures));
    }
    Ok(())
}

fn print_summary(input: &Path, sha256: &str, report: &AnalysisReport) {
    let agg = &report.aggregate;
    println!("input: {}", input.display());
    println!("sha256: {}", sha256);
    match (report.width, report.height) {
        (Some(w), Some(h)) => println!("kind: {:?} {}x{}", report.kind, w, h),
        _ => println!("kind: {:?}", report.kind),
    }
    println!(
        "grado_confianza: {} ({:.1}%, {}/{})",
        agg.grado_confianza.as_str(),
        agg.porcentaje_confianza,
        agg.puntuacion,
        agg.max_puntuacion
    );
    println!("tipo_imagen: {}", agg.tipo_imagen);
    println!("checks:");
    for d in &report.detectors {
        let status = match &d.outcome {
            Outcome::Analyzed(v) if v.detected => format!("{} ({})", v.nivel, v.severity.as_str()),
            Outcome::Analyzed(_) => "clean".to_string(),
            Outcome::Neutral { reason } => format!("neutral: {}", reason),
        };
        let points = agg.checks.iter().find(|c| c.check == d.check).map(|c| c.points).unwrap_or(0);
        println!("  {:<30} {:>3}  {}", d.check, points, status);
    }
    if !agg.evidencias.is_empty() {
        println!("evidence:");
        for e in &agg.evidencias {
            match e.bbox {
                Some(b) => println!(
                    "  [{}] {}/{} @ {},{} {}x{}: {}",
                    e.severidad.as_str(),
                    e.check,
                    e.tipo,
                    b.x,
                    b.y,
                    b.w,
                    b.h,
                    e.detalle
                ),
                None => println!("  [{}] {}/{}: {}", e.severidad.as_str(), e.check, e.tipo, e.detalle),
            }
        }
    }
    if !agg.notes.is_empty() {
        println!("notes:");
        for n in &agg.notes {
            println!("  - {}", n);
        }
    }
}

fn run_layers(pdf: &Path, page: Option<u32>, opts: &ScanOptions, json: bool) -> Result<()> {
    let bytes = read_with_limit(pdf, MAX_INPUT_BYTES)?;
    let mut report: LayerReport = analyze_layers(&bytes, None, &opts.layers)?;
    if let Some(n) = page {
        if n == 0 || n as usize > report.pages_total {
            return Err(anyhow!("page {} out of range (document has {} pages)", n, report.pages_total));
        }
        report.pages.retain(|p| p.page == n);
    }
    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    println!("method: {:?}", report.method);
    println!("pages: {}", report.pages_total);
    println!(
        "optional content: {} markers, {} catalog groups, confidence {:.2}",
        report.static_scan.ocg_count, report.static_scan.catalog_ocgs, report.static_scan.ocg_confidence
    );
    println!(
        "overlay markers: {}, transparency: {}, suspicious operators: {}",
        report.static_scan.overlay_count,
        report.static_scan.transparency_count,
        report.static_scan.suspicious_operator_count
    );
    if report.static_scan.has_acroform {
        println!("acroform: {} fields", report.static_scan.acroform_fields);
    }
    for p in &report.pages {
        println!(
            "page {}: {} of {} layers changed, {} images ({} flagged), probability {:.2}",
            p.page,
            p.changed,
            p.candidates,
            p.images.len(),
            p.flagged_images,
            p.probability
        );
        for layer in p.layers.iter().filter(|l| l.changed) {
            println!("  layer {} [{}]", layer.layer, layer.markers.join(", "));
        }
        for stream in p.stream_markers.iter().filter(|s| !s.hits.is_empty()) {
            let hits: Vec<String> = stream.hits.iter().map(|h| format!("{}x{}", h.pattern, h.count)).collect();
            println!("  stream {}: {}", stream.index, hits.join(" "));
        }
        if p.annotation_overlaps > 0 {
            println!("  {} annotations over body text", p.annotation_overlaps);
        }
        for img in p.images.iter().filter(|i| i.suspicious) {
            println!("  patch {} {}x{}", img.name, img.width, img.height);
        }
    }
    println!("probability: {:.3} (context factor {:.1})", report.probability, report.context_factor);
    println!("risk: {}", report.risk.as_str());
    for n in &report.notes {
        println!("note: {}", n);
    }
    Ok(())
}

fn run_config_check(config: &Config, profile: Option<&str>, json: bool) -> Result<()> {
    if let Some(p) = profile {
        if !config.profile_names().contains(&p) {
            return Err(anyhow!("profile {} is not defined", p));
        }
    }
    let mut opts = ScanOptions::default();
    config.apply(&mut opts, profile);
    opts.validate()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&opts)?);
    } else {
        println!("config ok");
        let names = config.profile_names();
        if !names.is_empty() {
            println!("profiles: {}", names.join(", "));
        }
        for (check, weight) in opts.weights.iter() {
            println!("  {:<30} {:>3}", check, weight);
        }
    }
    Ok(())
}
