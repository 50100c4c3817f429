//! Marker counting over raw and decoded PDF bytes. Runs without a
//! rasterizer and backs the verdict when re-rendering is unavailable.

use std::sync::OnceLock;

use regex::bytes::Regex;
use serde::{Deserialize, Serialize};

use crate::document::LayeredDocument;

const OCG_PATTERNS: &[&str] = &[
    r"/OCGs",
    r"/OCProperties",
    r"/OC\s",
    r"/ON\s+\[",
    r"/OFF\s+\[",
    r"/Order\s+\[",
    r"/RBGroups",
    r"/Locked\s+\[",
    r"/AS\s+<<",
    r"/Category\s+\[",
];

const OVERLAY_PATTERNS: &[&str] = &[
    r"/Type\s*/XObject",
    r"/Subtype\s*/Form",
    r"/Group\s*<<",
    r"/S\s*/Transparency",
    r"/BM\s*/\w+",
    r"/CA\s+[\d.]+",
    r"/ca\s+[\d.]+",
];

const TRANSPARENCY_PATTERNS: &[&str] =
    &[r"/S\s*/Transparency", r"/BM\s*/\w+", r"/CA\s+[\d.]+", r"/ca\s+[\d.]+", r"/SMask", r"/Group\s*<<"];

const OPERATOR_PATTERNS: &[&str] = &[r"q\s+[\d.\-\s]+cm", r"Do\s", r"gs\s", r"/G\d+\s+gs"];

const PAGE_OC_MARKER: &str = r"(?i)/OC(?:MD)?\b";

/// Named markers looked for inside each individual content stream.
const STREAM_MARKERS: &[(&str, &str)] = &[
    ("optional_content", r"/OC(?:MD)?\b"),
    ("xobject_paint", r"/[^\s/\[\]<>()]+\s+Do\b"),
    ("graphics_state", r"/[^\s/\[\]<>()]+\s+gs\b"),
    (
        "white_fill",
        r"(?:^|\s)(?:(?:1(?:\.0*)?\s+){3}rg|1(?:\.0*)?\s+g)\s+(?:-?[\d.]+\s+){4}re\s+f\*?",
    ),
    ("transparency", r"/Transparency\b|/SMask\b|/BM\s*/\w+"),
    ("form_xobject", r"/XObject\b|/Form\b"),
];

const TEXT_POSITION: &str =
    r"\bBT\b|(?P<tx>-?[\d.]+)\s+(?P<ty>-?[\d.]+)\s+T[dD]\b|(?P<e>-?[\d.]+)\s+(?P<f>-?[\d.]+)\s+Tm\b";

/// Signal count at which the count term saturates.
const OCG_COUNT_CAP: usize = 12;
/// Signals per MiB at which the density term saturates.
const OCG_DENSITY_CAP: f64 = 20.0;

type PatternSet = Vec<(&'static str, Regex)>;

static OCG_SET: OnceLock<PatternSet> = OnceLock::new();
static OVERLAY_SET: OnceLock<PatternSet> = OnceLock::new();
static TRANSPARENCY_SET: OnceLock<PatternSet> = OnceLock::new();
static OPERATOR_SET: OnceLock<PatternSet> = OnceLock::new();
static PAGE_OC_RE: OnceLock<Option<Regex>> = OnceLock::new();
static STREAM_SET: OnceLock<PatternSet> = OnceLock::new();
static TEXT_POSITION_RE: OnceLock<Option<Regex>> = OnceLock::new();

fn compile(patterns: &'static [&'static str]) -> PatternSet {
    patterns
        .iter()
        .filter_map(|p| Regex::new(p).ok().map(|re| (*p, re)))
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternHit {
    pub pattern: String,
    pub count: usize,
}

/// Markers found in one content stream of a page. Index 0 is the page body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamMarkers {
    pub index: usize,
    pub object: Option<(u32, u16)>,
    pub hits: Vec<PatternHit>,
}

impl StreamMarkers {
    pub fn has(&self, marker: &str) -> bool {
        self.hits.iter().any(|h| h.pattern == marker)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StaticScan {
    pub has_ocg: bool,
    pub ocg_count: usize,
    pub ocg_patterns: Vec<PatternHit>,
    pub catalog_ocgs: usize,
    pub ocg_pages: Vec<u32>,
    pub total_pages: usize,
    pub density_per_mb: f64,
    pub coverage: f64,
    pub ocg_confidence: f64,
    pub overlay_count: usize,
    pub transparency_count: usize,
    pub suspicious_operator_count: usize,
    pub has_acroform: bool,
    pub acroform_fields: usize,
    /// Annotations whose rectangle sits over a text position of the page body.
    pub annotation_overlaps: usize,
}

fn count_all(set: &PatternSet, haystacks: &[&[u8]]) -> (usize, Vec<PatternHit>) {
    let mut total = 0;
    let mut hits = Vec::new();
    for (pattern, re) in set {
        let count: usize = haystacks.iter().map(|h| re.find_iter(h).count()).sum();
        if count > 0 {
            total += count;
            hits.push(PatternHit { pattern: pattern.to_string(), count });
        }
    }
    (total, hits)
}

/// Counts the named overlay markers in one decoded content stream.
pub fn stream_markers(content: &[u8]) -> Vec<PatternHit> {
    let set = STREAM_SET.get_or_init(|| {
        STREAM_MARKERS
            .iter()
            .filter_map(|(name, p)| Regex::new(p).ok().map(|re| (*name, re)))
            .collect()
    });
    count_all(set, &[content]).1
}

fn capture_number(m: Option<regex::bytes::Match<'_>>) -> Option<f64> {
    std::str::from_utf8(m?.as_bytes()).ok()?.parse().ok()
}

/// Approximate text origins in user space, following `Td`, `TD` and `Tm`
/// inside `BT`/`ET` blocks. Line advances without operands are ignored.
pub fn text_origins(content: &[u8]) -> Vec<(f64, f64)> {
    let Some(re) = TEXT_POSITION_RE.get_or_init(|| Regex::new(TEXT_POSITION).ok()).as_ref() else {
        return Vec::new();
    };
    let mut line = (0.0, 0.0);
    let mut out = Vec::new();
    for caps in re.captures_iter(content) {
        if let (Some(tx), Some(ty)) = (capture_number(caps.name("tx")), capture_number(caps.name("ty"))) {
            line = (line.0 + tx, line.1 + ty);
            out.push(line);
        } else if let (Some(e), Some(f)) = (capture_number(caps.name("e")), capture_number(caps.name("f"))) {
            line = (e, f);
            out.push(line);
        } else if &caps[0] == b"BT" {
            line = (0.0, 0.0);
        }
    }
    out
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Smoothed confidence that optional content is in use, capped at 0.95.
pub fn ocg_confidence(ocg_count: usize, coverage: f64, density: f64) -> f64 {
    let coverage = coverage.clamp(0.0, 1.0);
    let dens_norm = (density / OCG_DENSITY_CAP).clamp(0.0, 1.0);
    let capped = ocg_count.min(OCG_COUNT_CAP) as f64;
    let raw = 0.7 * (capped / OCG_COUNT_CAP as f64) + 0.2 * coverage + 0.1 * dens_norm;
    let p = sigmoid(8.0 * (raw - 0.35));
    let base = if ocg_count > 0 { 0.05 } else { 0.0 };
    (base + 0.85 * p).min(0.95)
}

pub fn scan_markers(bytes: &[u8], doc: Option<&LayeredDocument>) -> StaticScan {
    let ocg_set = OCG_SET.get_or_init(|| compile(OCG_PATTERNS));
    let overlay_set = OVERLAY_SET.get_or_init(|| compile(OVERLAY_PATTERNS));
    let transparency_set = TRANSPARENCY_SET.get_or_init(|| compile(TRANSPARENCY_PATTERNS));
    let operator_set = OPERATOR_SET.get_or_init(|| compile(OPERATOR_PATTERNS));

    let contents: Vec<&[u8]> = doc
        .map(|d| d.pages().iter().map(|p| p.content.as_slice()).collect())
        .unwrap_or_default();
    let mut all: Vec<&[u8]> = vec![bytes];
    all.extend(contents.iter().copied());

    let (mut ocg_count, ocg_patterns) = count_all(ocg_set, &[bytes]);
    let catalog_ocgs = doc.map(|d| d.catalog_ocg_names().count()).unwrap_or(0);
    ocg_count += catalog_ocgs;

    let mut ocg_pages = Vec::new();
    if let (Some(d), Some(re)) = (doc, PAGE_OC_RE.get_or_init(|| Regex::new(PAGE_OC_MARKER).ok()).as_ref()) {
        for page in d.pages() {
            if re.is_match(&page.content) {
                ocg_pages.push(page.number);
            }
        }
    }
    let total_pages = doc.map(|d| d.page_count()).unwrap_or(0);
    let acroform_fields = doc.and_then(|d| d.acroform_fields());
    let annotation_overlaps = doc
        .map(|d| {
            d.pages()
                .iter()
                .flat_map(|p| p.layers.iter())
                .filter(|l| l.markers.iter().any(|m| m == "covers_text"))
                .count()
        })
        .unwrap_or(0);
    let coverage = if total_pages > 0 { ocg_pages.len() as f64 / total_pages as f64 } else { 0.0 };
    let mib = (bytes.len() as f64 / (1024.0 * 1024.0)).max(1e-6);
    let density_per_mb = ocg_count as f64 / mib;

    StaticScan {
        has_ocg: ocg_count > 0,
        ocg_count,
        ocg_patterns,
        catalog_ocgs,
        ocg_pages,
        total_pages,
        density_per_mb,
        coverage,
        ocg_confidence: ocg_confidence(ocg_count, coverage, density_per_mb),
        overlay_count: count_all(overlay_set, &all).0,
        transparency_count: count_all(transparency_set, &all).0,
        suspicious_operator_count: count_all(operator_set, &contents).0,
        has_acroform: acroform_fields.is_some(),
        acroform_fields: acroform_fields.unwrap_or(0),
        annotation_overlaps,
    }
}
