use std::collections::BTreeMap;

use font_analysis::{FontConsistencyConfig, FontObservation};
use image_analysis::{
    ElaOptions, InjectedTextOptions, LoaderOptions, NoiseEdgeOptions, PixelBuffer, ScreenshotOptions,
    SyntheticTextOptions, TextToken,
};
use layer_analysis::{LayerOptions, LayeredDocument};
use serde::{Deserialize, Serialize};

use crate::detect::Needs;
use crate::error::ConfigError;
use crate::model::{InputKind, OcrToken};

/// Weight-table keys, one per analyzer.
pub mod checks {
    pub const ELA: &str = "analisis_ela_sospechoso";
    pub const SYNTHETIC_TEXT: &str = "evidencias_forenses";
    pub const INJECTED_TEXT: &str = "texto_superpuesto";
    pub const NOISE_EDGE: &str = "inconsistencias_ruido_bordes";
    pub const PDF_LAYERS: &str = "capas_ocultas";
    pub const FONTS: &str = "consistencia_fuentes";

    pub const ALL: [&str; 6] = [ELA, SYNTHETIC_TEXT, INJECTED_TEXT, NOISE_EDGE, PDF_LAYERS, FONTS];
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CheckWeights(BTreeMap<String, u32>);

impl Default for CheckWeights {
    fn default() -> Self {
        Self(BTreeMap::from([
            (checks::ELA.to_string(), 5),
            (checks::SYNTHETIC_TEXT.to_string(), 15),
            (checks::INJECTED_TEXT.to_string(), 25),
            (checks::NOISE_EDGE.to_string(), 5),
            (checks::PDF_LAYERS.to_string(), 20),
            (checks::FONTS.to_string(), 15),
        ]))
    }
}

impl CheckWeights {
    pub fn get(&self, check: &str) -> u32 {
        self.0.get(check).copied().unwrap_or(0)
    }

    pub fn set(&mut self, check: &str, weight: u32) {
        self.0.insert(check.to_string(), weight);
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, u32)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn total(&self) -> u32 {
        self.0.values().sum()
    }
}

/// Cut-offs for the confidence grade and the points each verdict severity earns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Grading {
    /// Percentages at or above this grade ALTO.
    pub alto: f64,
    /// Percentages strictly above this grade MEDIO.
    pub medio: f64,
    /// Screenshots below this percentage always grade BAJO.
    pub screenshot_ceiling: f64,
    pub high_factor: f64,
    pub medium_factor: f64,
    pub low_factor: f64,
    /// Share of the synthetic-text weight awarded on a screenshot.
    pub screenshot_synthetic_factor: f64,
}

impl Default for Grading {
    fn default() -> Self {
        Self {
            alto: 70.0,
            medio: 40.0,
            screenshot_ceiling: 30.0,
            high_factor: 1.0,
            medium_factor: 0.6,
            low_factor: 0.3,
            screenshot_synthetic_factor: 0.4,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ScanOptions {
    pub parallel: bool,
    pub max_parallel_detectors: usize,
    pub max_input_bytes: usize,
    /// Resolution for rendering the first PDF page for the pixel analyzers.
    pub render_dpi: u32,
    pub loader: LoaderOptions,
    pub ela: ElaOptions,
    pub synthetic: SyntheticTextOptions,
    pub injected: InjectedTextOptions,
    pub noise_edge: NoiseEdgeOptions,
    pub screenshot: ScreenshotOptions,
    pub layers: LayerOptions,
    pub fonts: FontConsistencyConfig,
    pub weights: CheckWeights,
    pub grading: Grading,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            parallel: true,
            max_parallel_detectors: 4,
            max_input_bytes: 64 * 1024 * 1024,
            render_dpi: 150,
            loader: LoaderOptions::default(),
            ela: ElaOptions::default(),
            synthetic: SyntheticTextOptions::default(),
            injected: InjectedTextOptions::default(),
            noise_edge: NoiseEdgeOptions::default(),
            screenshot: ScreenshotOptions::default(),
            layers: LayerOptions::default(),
            fonts: FontConsistencyConfig::default(),
            weights: CheckWeights::default(),
            grading: Grading::default(),
        }
    }
}

fn unit(field: &'static str, v: f64) -> Result<(), ConfigError> {
    if (0.0..=1.0).contains(&v) {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, v, "[0, 1]"))
    }
}

fn at_least<T: PartialOrd + std::fmt::Display>(
    field: &'static str,
    v: T,
    min: T,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if v >= min {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, v, expected))
    }
}

fn within<T: PartialOrd + std::fmt::Display>(
    field: &'static str,
    v: T,
    lo: T,
    hi: T,
    expected: &'static str,
) -> Result<(), ConfigError> {
    if v >= lo && v <= hi {
        Ok(())
    } else {
        Err(ConfigError::out_of_range(field, v, expected))
    }
}

impl ScanOptions {
    pub fn validate(&self) -> Result<(), ConfigError> {
        within("max_parallel_detectors", self.max_parallel_detectors, 1, 64, "1..=64")?;
        at_least("max_input_bytes", self.max_input_bytes, 1, ">= 1")?;
        within("render_dpi", self.render_dpi, 36, 600, "36..=600")?;
        at_least("loader.max_dimension", self.loader.max_dimension, 1, ">= 1")?;
        at_least("loader.max_pixels", self.loader.max_pixels, 1, ">= 1")?;

        within("ela.quality", self.ela.quality, 1, 100, "1..=100")?;
        at_least("ela.tile_min", self.ela.tile_min, 8, ">= 8")?;
        unit("ela.perc_thr", self.ela.perc_thr)?;
        within("ela.ela_max_thr", self.ela.ela_max_thr, 0.0, 255.0, "[0, 255]")?;
        if self.ela.robust_k <= 0.0 {
            return Err(ConfigError::out_of_range("ela.robust_k", self.ela.robust_k, "> 0"));
        }
        at_least("ela.min_cluster_tiles", self.ela.min_cluster_tiles, 1, ">= 1")?;
        at_least("ela.localized_compactness", self.ela.localized_compactness, 1.0, ">= 1")?;

        let s = &self.synthetic;
        if s.min_aspect >= s.max_aspect {
            return Err(ConfigError::Invalid {
                field: "synthetic.min_aspect",
                reason: format!("must be below max_aspect ({} >= {})", s.min_aspect, s.max_aspect),
            });
        }
        unit("synthetic.blob_max_area_frac", s.blob_max_area_frac)?;
        unit("synthetic.max_box_height_frac", s.max_box_height_frac)?;
        unit("synthetic.merge_iou", s.merge_iou)?;
        unit("synthetic.pure_ratio_min", s.pure_ratio_min)?;
        unit("synthetic.line_density_min", s.line_density_min)?;
        at_least("synthetic.hough.threshold", s.hough.threshold, 1, ">= 1")?;

        let i = &self.injected;
        within("injected.ela_quality", i.ela_quality, 1, 100, "1..=100")?;
        unit("injected.min_digit_ratio", i.min_digit_ratio)?;
        unit("injected.min_confidence", i.min_confidence)?;
        if i.adaptive_block < 3 || i.adaptive_block % 2 == 0 {
            return Err(ConfigError::out_of_range("injected.adaptive_block", i.adaptive_block, "odd, >= 3"));
        }
        at_least("injected.token_flag_score", i.token_flag_score, 1, ">= 1")?;

        let n = &self.noise_edge;
        if n.noise_threshold <= 0.0 {
            return Err(ConfigError::out_of_range("noise_edge.noise_threshold", n.noise_threshold, "> 0"));
        }
        if n.canny_low >= n.canny_high {
            return Err(ConfigError::Invalid {
                field: "noise_edge.canny_low",
                reason: format!("must be below canny_high ({} >= {})", n.canny_low, n.canny_high),
            });
        }
        unit("noise_edge.min_circularity", n.min_circularity)?;
        at_least("noise_edge.texture_window", n.texture_window, 3, ">= 3")?;

        unit("screenshot.min_line_density", self.screenshot.min_line_density)?;

        let l = &self.layers;
        within("layers.dpi", l.dpi, 36, 600, "36..=600")?;
        if !(l.diff_threshold > 0.0 && l.diff_threshold < 1.0) {
            return Err(ConfigError::out_of_range("layers.diff_threshold", l.diff_threshold, "(0, 1)"));
        }
        at_least("layers.max_pages", l.max_pages, 1, ">= 1")?;
        at_least("layers.max_layers_per_page", l.max_layers_per_page, 1, ">= 1")?;
        within("layers.max_concurrent_renders", l.max_concurrent_renders, 1, 64, "1..=64")?;

        self.fonts.validate().map_err(|reason| ConfigError::Invalid { field: "fonts", reason })?;

        for (name, _) in self.weights.iter() {
            if !checks::ALL.contains(&name) {
                return Err(ConfigError::UnknownCheck(name.to_string()));
            }
        }
        if self.weights.total() == 0 {
            return Err(ConfigError::Invalid { field: "weights", reason: "all weights are zero".into() });
        }

        let g = &self.grading;
        within("grading.alto", g.alto, 0.0, 100.0, "[0, 100]")?;
        if !(g.medio >= 0.0 && g.medio < g.alto) {
            return Err(ConfigError::out_of_range("grading.medio", g.medio, "[0, alto)"));
        }
        within("grading.screenshot_ceiling", g.screenshot_ceiling, 0.0, 100.0, "[0, 100]")?;
        unit("grading.high_factor", g.high_factor)?;
        unit("grading.medium_factor", g.medium_factor)?;
        unit("grading.low_factor", g.low_factor)?;
        unit("grading.screenshot_synthetic_factor", g.screenshot_synthetic_factor)?;
        Ok(())
    }
}

/// Decoded input shared read-only by every detector of one analysis.
pub struct ScanContext<'a> {
    pub bytes: &'a [u8],
    pub input_id: String,
    pub kind: InputKind,
    pub pixels: Option<PixelBuffer>,
    pub pdf: Option<LayeredDocument>,
    pub tokens: &'a [OcrToken],
    pub options: &'a ScanOptions,
}

impl<'a> ScanContext<'a> {
    pub fn new(bytes: &'a [u8], tokens: &'a [OcrToken], options: &'a ScanOptions) -> Self {
        Self {
            bytes,
            input_id: input_id(bytes),
            kind: InputKind::sniff(bytes),
            pixels: None,
            pdf: None,
            tokens,
            options,
        }
    }

    pub fn with_pixels(mut self, pixels: PixelBuffer) -> Self {
        self.pixels = Some(pixels);
        self
    }

    pub fn with_pdf(mut self, doc: LayeredDocument) -> Self {
        self.kind = InputKind::Pdf;
        self.pdf = Some(doc);
        self
    }

    /// Inputs this context can feed to a detector.
    pub fn available(&self) -> Needs {
        let mut needs = Needs::empty();
        if self.pixels.is_some() {
            needs |= Needs::PIXELS;
        }
        if !self.tokens.is_empty() {
            needs |= Needs::OCR_TOKENS;
        }
        if self.tokens.iter().any(OcrToken::has_font_metadata) {
            needs |= Needs::FONT_METADATA;
        }
        if self.pdf.is_some() {
            needs |= Needs::PDF;
        }
        needs
    }

    pub fn ocr_text(&self) -> String {
        self.tokens.iter().map(|t| t.text.as_str()).collect::<Vec<_>>().join(" ")
    }

    pub fn text_tokens(&self) -> Vec<TextToken> {
        self.tokens.iter().map(OcrToken::to_text_token).collect()
    }

    pub fn font_observations(&self) -> Vec<FontObservation> {
        self.tokens.iter().map(OcrToken::to_font_observation).collect()
    }
}

pub fn input_id(bytes: &[u8]) -> String {
    blake3::hash(bytes).to_hex().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_validate() {
        ScanOptions::default().validate().expect("defaults are valid");
        assert_eq!(CheckWeights::default().total(), 85);
    }

    #[test]
    fn rejects_out_of_range_values() {
        let mut opts = ScanOptions::default();
        opts.layers.diff_threshold = 1.5;
        assert!(matches!(
            opts.validate(),
            Err(ConfigError::OutOfRange { field: "layers.diff_threshold", .. })
        ));

        let mut opts = ScanOptions::default();
        opts.ela.quality = 0;
        assert!(opts.validate().is_err());

        let mut opts = ScanOptions::default();
        opts.grading.medio = 80.0;
        assert!(opts.validate().is_err());
    }

    #[test]
    fn rejects_unknown_checks() {
        let mut opts = ScanOptions::default();
        opts.weights.set("sri_validation", 10);
        assert_eq!(opts.validate(), Err(ConfigError::UnknownCheck("sri_validation".into())));
    }

    #[test]
    fn font_config_errors_surface() {
        let mut opts = ScanOptions::default();
        opts.fonts.min_size = 100.0;
        assert!(matches!(opts.validate(), Err(ConfigError::Invalid { field: "fonts", .. })));
    }

    #[test]
    fn context_reports_available_inputs() {
        let opts = ScanOptions::default();
        let tokens = vec![OcrToken::new("Total", 0.9, image_analysis::BBox::new(0, 0, 10, 5)).with_font("Arial", 10.0)];
        let ctx = ScanContext::new(b"abc", &tokens, &opts);
        let needs = ctx.available();
        assert!(needs.contains(Needs::OCR_TOKENS | Needs::FONT_METADATA));
        assert!(!needs.contains(Needs::PIXELS));
        assert_eq!(ctx.input_id.len(), 64);
    }
}
