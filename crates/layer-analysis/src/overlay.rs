use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::document::{LayerDescriptor, LayerKind, LayeredDocument, PageLayers};
use crate::inventory::ImageInfo;
use crate::render::{diff_ratio, diff_region, DiffRegion, LayerVisibility, PageRasterizer};
use crate::static_scan::{scan_markers, StaticScan, StreamMarkers};
use crate::{LayerError, LayerOptions};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffMethod {
    RenderDiff,
    Static,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LayerRisk {
    Low,
    Medium,
    High,
}

impl LayerRisk {
    pub fn from_probability(p: f64) -> Self {
        if p < 0.2 {
            LayerRisk::Low
        } else if p < 0.5 {
            LayerRisk::Medium
        } else {
            LayerRisk::High
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            LayerRisk::Low => "LOW",
            LayerRisk::Medium => "MEDIUM",
            LayerRisk::High => "HIGH",
        }
    }
}

/// Outcome of probing one candidate layer, by render diff or by its
/// static markers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StreamAnalysis {
    pub layer: String,
    pub kind: LayerKind,
    pub object: Option<(u32, u16)>,
    pub name: Option<String>,
    pub diff_ratio: f64,
    pub changed: bool,
    pub region: Option<DiffRegion>,
    pub error: Option<String>,
    #[serde(default)]
    pub markers: Vec<String>,
}

impl StreamAnalysis {
    fn unrendered(layer: &LayerDescriptor, changed: bool, error: Option<String>) -> Self {
        Self {
            layer: layer.id.clone(),
            kind: layer.kind,
            object: layer.object,
            name: layer.name.clone(),
            diff_ratio: 0.0,
            changed,
            region: None,
            error,
            markers: layer.markers.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PageLayerReport {
    pub page: u32,
    pub candidates: usize,
    pub changed: usize,
    pub images: Vec<ImageInfo>,
    pub flagged_images: usize,
    pub probability: f64,
    pub layers: Vec<StreamAnalysis>,
    pub baseline_error: Option<String>,
    /// Marker hits per content stream, the page body included.
    pub stream_markers: Vec<StreamMarkers>,
    pub annotation_overlaps: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerReport {
    pub method: DiffMethod,
    pub pages_total: usize,
    pub pages: Vec<PageLayerReport>,
    pub static_scan: StaticScan,
    pub context_factor: f64,
    pub probability: f64,
    pub risk: LayerRisk,
    pub notes: Vec<String>,
}

impl LayerReport {
    pub fn changed_layers(&self) -> impl Iterator<Item = &StreamAnalysis> {
        self.pages.iter().flat_map(|p| p.layers.iter()).filter(|l| l.changed)
    }

    pub fn flagged_images(&self) -> usize {
        self.pages.iter().map(|p| p.flagged_images).sum()
    }
}

/// Short documents carry less overlay evidence per page.
pub fn context_factor(pages: usize) -> f64 {
    match pages {
        0 | 1 => 0.5,
        2 | 3 => 0.8,
        _ => 1.0,
    }
}

pub fn page_probability(changed: usize, candidates: usize, flagged_images: usize, images: usize) -> f64 {
    let denom = candidates + images;
    if denom == 0 {
        return 0.0;
    }
    (changed + flagged_images) as f64 / denom as f64
}

fn probe_layers(
    doc: &LayeredDocument,
    page_index: usize,
    page: &PageLayers,
    limit: usize,
    rasterizer: &dyn PageRasterizer,
    pool: Option<&rayon::ThreadPool>,
    opts: &LayerOptions,
) -> (Vec<StreamAnalysis>, Option<String>) {
    let layers = &page.layers[..page.layers.len().min(limit)];
    let hidden = LayerVisibility::all_hidden(page.layers.len());
    let baseline = match rasterizer.render(doc, page_index, opts.dpi, &hidden) {
        Ok(r) => r,
        Err(e) => {
            warn!(page = page.number, error = %e, "baseline render failed; page layers count as unchanged");
            let unchanged =
                layers.iter().map(|l| StreamAnalysis::unrendered(l, false, Some(e.to_string()))).collect();
            return (unchanged, Some(e.to_string()));
        }
    };

    let probe = |layer: &LayerDescriptor| {
        let mut vis = hidden.clone();
        vis.show(layer.index);
        let (ratio, region, error) = match rasterizer.render(doc, page_index, opts.dpi, &vis) {
            Ok(r) => (diff_ratio(&baseline, &r), diff_region(&baseline, &r), None),
            Err(e) => {
                debug!(layer = %layer.id, error = %e, "layer render failed");
                (0.0, None, Some(e.to_string()))
            }
        };
        StreamAnalysis {
            layer: layer.id.clone(),
            kind: layer.kind,
            object: layer.object,
            name: layer.name.clone(),
            diff_ratio: ratio,
            changed: ratio > opts.diff_threshold,
            region,
            error,
            markers: layer.markers.clone(),
        }
    };

    let results: Vec<StreamAnalysis> = match pool {
        Some(pool) => pool.install(|| layers.par_iter().map(probe).collect::<Vec<_>>()),
        None => layers.iter().map(probe).collect(),
    };
    (results, None)
}

/// Without a rasterizer a candidate counts as changed when it carries any
/// overlay marker.
fn static_layers(page: &PageLayers, limit: usize) -> Vec<StreamAnalysis> {
    page.layers
        .iter()
        .take(limit)
        .map(|l| StreamAnalysis::unrendered(l, !l.markers.is_empty(), None))
        .collect()
}

pub fn analyze_document(
    bytes: &[u8],
    doc: &LayeredDocument,
    rasterizer: Option<&dyn PageRasterizer>,
    opts: &LayerOptions,
) -> LayerReport {
    let static_scan = scan_markers(bytes, Some(doc));
    let mut notes = Vec::new();
    let pages_total = doc.page_count();
    if pages_total > opts.max_pages {
        notes.push(format!("analyzed the first {} of {} pages", opts.max_pages, pages_total));
    }

    let pool = match rasterizer {
        Some(_) => match rayon::ThreadPoolBuilder::new().num_threads(opts.max_concurrent_renders.max(1)).build() {
            Ok(pool) => Some(pool),
            Err(err) => {
                warn!(error = %err, "failed to build render pool; rendering sequentially");
                None
            }
        },
        None => None,
    };

    let mut pages = Vec::new();
    for (index, page) in doc.pages().iter().enumerate().take(opts.max_pages) {
        if page.layers.len() > opts.max_layers_per_page {
            notes.push(format!(
                "page {}: probed {} of {} layers",
                page.number, opts.max_layers_per_page, page.layers.len()
            ));
        }
        let (layers, baseline_error) = match rasterizer {
            Some(r) => probe_layers(doc, index, page, opts.max_layers_per_page, r, pool.as_ref(), opts),
            None => (static_layers(page, opts.max_layers_per_page), None),
        };
        let changed = layers.iter().filter(|l| l.changed).count();
        let flagged_images = page.images.iter().filter(|i| i.suspicious).count();
        let probability = page_probability(changed, layers.len(), flagged_images, page.images.len());
        let annotation_overlaps = page
            .layers
            .iter()
            .filter(|l| l.kind == LayerKind::Annotation && l.markers.iter().any(|m| m == "covers_text"))
            .count();
        pages.push(PageLayerReport {
            page: page.number,
            candidates: layers.len(),
            changed,
            images: page.images.clone(),
            flagged_images,
            probability,
            layers,
            baseline_error,
            stream_markers: page.stream_markers.clone(),
            annotation_overlaps,
        });
    }

    let mean = if pages.is_empty() {
        0.0
    } else {
        pages.iter().map(|p| p.probability).sum::<f64>() / pages.len() as f64
    };
    let method = if rasterizer.is_some() { DiffMethod::RenderDiff } else { DiffMethod::Static };
    let base = match method {
        DiffMethod::RenderDiff => mean,
        DiffMethod::Static => {
            notes.push("no rasterizer available; layer verdict from static markers".to_string());
            if static_scan.has_acroform {
                notes.push(format!("document carries an AcroForm with {} fields", static_scan.acroform_fields));
            }
            if static_scan.has_ocg {
                mean.max(static_scan.ocg_confidence)
            } else {
                mean
            }
        }
    };
    let factor = context_factor(pages_total);
    let probability = (base * factor).clamp(0.0, 1.0);
    let risk = LayerRisk::from_probability(probability);
    debug!(
        pages = pages.len(),
        method = ?method,
        probability,
        risk = risk.as_str(),
        "layer analysis complete"
    );
    LayerReport {
        method,
        pages_total,
        pages,
        static_scan,
        context_factor: factor,
        probability,
        risk,
        notes,
    }
}

pub fn analyze_layers(
    bytes: &[u8],
    rasterizer: Option<&dyn PageRasterizer>,
    opts: &LayerOptions,
) -> Result<LayerReport, LayerError> {
    if bytes.len() > opts.max_input_bytes {
        return Err(LayerError::InputTooLarge { size: bytes.len(), limit: opts.max_input_bytes });
    }
    let doc = LayeredDocument::parse(bytes).map_err(LayerError::Document)?;
    Ok(analyze_document(bytes, &doc, rasterizer, opts))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probability_counts_images_and_layers() {
        assert_eq!(page_probability(0, 0, 0, 0), 0.0);
        assert_eq!(page_probability(1, 3, 1, 1), 0.5);
    }

    #[test]
    fn short_documents_are_discounted() {
        assert_eq!(context_factor(1), 0.5);
        assert_eq!(context_factor(3), 0.8);
        assert_eq!(context_factor(4), 1.0);
    }

    #[test]
    fn risk_bands() {
        assert_eq!(LayerRisk::from_probability(0.19), LayerRisk::Low);
        assert_eq!(LayerRisk::from_probability(0.2), LayerRisk::Medium);
        assert_eq!(LayerRisk::from_probability(0.5), LayerRisk::High);
    }
}
