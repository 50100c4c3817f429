use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use font_analysis::FontConsistencyConfig;
use image_analysis::{
    ElaOptions, InjectedTextOptions, LoaderOptions, NoiseEdgeOptions, ScreenshotOptions, SyntheticTextOptions,
};
use layer_analysis::LayerOptions;
use serde::Deserialize;
use tracing::{info, warn};

use crate::scan::{checks, Grading, ScanOptions};
use crate::security_log::{AuditDomain, AuditEvent};

const MAX_CONFIG_BYTES: u64 = 1024 * 1024;
const MAX_PARALLEL_DETECTORS: usize = 64;
const MAX_INPUT_BYTES: usize = 1024 * 1024 * 1024;
const MAX_CHECK_WEIGHT: u32 = 1000;

#[derive(Debug, Deserialize)]
pub struct Config {
    pub profiles: Option<HashMap<String, Profile>>,
    pub scan: Option<ScanConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct Profile {
    pub scan: Option<ScanConfig>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct LoggingConfig {
    pub level: Option<String>,
}

/// Overrides; unset keys leave the current value alone. Analyzer sections
/// replace the whole analyzer block, with missing fields at their defaults.
#[derive(Debug, Deserialize, Clone)]
pub struct ScanConfig {
    pub parallel: Option<bool>,
    pub max_parallel_detectors: Option<usize>,
    pub max_input_bytes: Option<usize>,
    pub render_dpi: Option<u32>,
    pub weights: Option<BTreeMap<String, u32>>,
    pub grading: Option<Grading>,
    pub loader: Option<LoaderOptions>,
    pub ela: Option<ElaOptions>,
    pub synthetic: Option<SyntheticTextOptions>,
    pub injected: Option<InjectedTextOptions>,
    #[serde(alias = "noise-edge")]
    pub noise_edge: Option<NoiseEdgeOptions>,
    pub screenshot: Option<ScreenshotOptions>,
    pub layers: Option<LayerOptions>,
    pub fonts: Option<FontConsistencyConfig>,
}

impl Config {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if let Ok(meta) = fs::metadata(path) {
            if meta.len() > MAX_CONFIG_BYTES {
                return Err(anyhow::anyhow!("config {} exceeds {} bytes", path.display(), MAX_CONFIG_BYTES));
            }
        }
        let data = fs::read_to_string(path)?;
        let cfg = match path.extension().and_then(|s| s.to_str()) {
            Some("toml") => toml::from_str::<Config>(&data)?,
            Some("yaml") | Some("yml") => serde_yaml::from_str::<Config>(&data)?,
            _ => toml::from_str::<Config>(&data).or_else(|_| serde_yaml::from_str::<Config>(&data))?,
        };
        Ok(cfg)
    }

    pub fn log_level(&self) -> Option<&str> {
        self.logging.as_ref().and_then(|l| l.level.as_deref())
    }

    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> =
            self.profiles.iter().flat_map(|p| p.keys()).map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Base `[scan]` first, then the named profile on top.
    pub fn apply(&self, opts: &mut ScanOptions, profile: Option<&str>) {
        if let Some(scan) = &self.scan {
            apply_scan(scan, opts);
        }
        if let Some(p) = profile {
            match self.profiles.as_ref().and_then(|profiles| profiles.get(p)) {
                Some(Profile { scan: Some(scan) }) => apply_scan(scan, opts),
                Some(_) => {}
                None => {
                    AuditEvent::new(AuditDomain::Config, "unknown_profile", "Unknown profile requested").emit();
                    warn!(profile = p, "Unknown profile requested; using base settings");
                }
            }
        }
    }
}

fn reject(kind: &str, message: &str) {
    AuditEvent::new(AuditDomain::Config, kind, message).emit();
}

fn apply_scan(scan: &ScanConfig, opts: &mut ScanOptions) {
    if let Some(v) = scan.parallel {
        opts.parallel = v;
    }
    if let Some(v) = scan.max_parallel_detectors {
        if v == 0 || v > MAX_PARALLEL_DETECTORS {
            reject("invalid_max_parallel_detectors", "Invalid max_parallel_detectors in config");
            warn!(value = v, limit = MAX_PARALLEL_DETECTORS, "Invalid max_parallel_detectors in config");
        } else {
            info!(value = v, "Config override max_parallel_detectors");
            opts.max_parallel_detectors = v;
        }
    }
    if let Some(v) = scan.max_input_bytes {
        if v == 0 || v > MAX_INPUT_BYTES {
            reject("invalid_max_input_bytes", "Invalid max_input_bytes in config");
            warn!(value = v, limit = MAX_INPUT_BYTES, "Invalid max_input_bytes in config");
        } else {
            info!(value = v, "Config override max_input_bytes");
            opts.max_input_bytes = v;
        }
    }
    if let Some(v) = scan.render_dpi {
        opts.render_dpi = v;
    }
    if let Some(weights) = &scan.weights {
        for (check, &weight) in weights {
            if !checks::ALL.contains(&check.as_str()) {
                reject("unknown_check_weight", "Unknown check in weight table");
                warn!(check = %check, "Unknown check in weight table; ignored");
            } else if weight > MAX_CHECK_WEIGHT {
                reject("invalid_check_weight", "Invalid check weight in config");
                warn!(check = %check, value = weight, limit = MAX_CHECK_WEIGHT, "Invalid check weight in config");
            } else {
                info!(check = %check, value = weight, "Config override check weight");
                opts.weights.set(check, weight);
            }
        }
    }
    if let Some(v) = &scan.grading {
        opts.grading = v.clone();
    }
    if let Some(v) = &scan.loader {
        opts.loader = v.clone();
    }
    if let Some(v) = &scan.ela {
        opts.ela = v.clone();
    }
    if let Some(v) = &scan.synthetic {
        opts.synthetic = v.clone();
    }
    if let Some(v) = &scan.injected {
        opts.injected = v.clone();
    }
    if let Some(v) = &scan.noise_edge {
        opts.noise_edge = v.clone();
    }
    if let Some(v) = scan.screenshot {
        opts.screenshot = v;
    }
    if let Some(v) = &scan.layers {
        opts.layers = v.clone();
    }
    if let Some(v) = &scan.fonts {
        opts.fonts = v.clone();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn write_config(ext: &str, body: &str) -> tempfile::NamedTempFile {
        let mut file = tempfile::Builder::new().suffix(ext).tempfile().expect("tempfile");
        file.write_all(body.as_bytes()).expect("write");
        file
    }

    #[test]
    fn loads_toml_with_profile() {
        let file = write_config(
            ".toml",
            r#"
[logging]
level = "debug"

[scan]
max_parallel_detectors = 2

[scan.weights]
capas_ocultas = 30

[scan.layers]
diff_threshold = 0.1

[profiles.strict.scan.grading]
alto = 60.0
"#,
        );
        let cfg = Config::load(file.path()).expect("load");
        assert_eq!(cfg.log_level(), Some("debug"));
        assert_eq!(cfg.profile_names(), vec!["strict"]);

        let mut opts = ScanOptions::default();
        cfg.apply(&mut opts, None);
        assert_eq!(opts.max_parallel_detectors, 2);
        assert_eq!(opts.weights.get(checks::PDF_LAYERS), 30);
        assert_eq!(opts.weights.get(checks::FONTS), 15);
        assert_eq!(opts.layers.diff_threshold, 0.1);
        assert_eq!(opts.layers.max_pages, LayerOptions::default().max_pages);
        assert_eq!(opts.grading.alto, 70.0);

        cfg.apply(&mut opts, Some("strict"));
        assert_eq!(opts.grading.alto, 60.0);
        assert_eq!(opts.grading.medio, 40.0);
    }

    #[test]
    fn loads_yaml_by_extension() {
        let file = write_config(".yml", "scan:\n  parallel: false\n  fonts:\n    min_confidence: 0.5\n");
        let cfg = Config::load(file.path()).expect("load");
        let mut opts = ScanOptions::default();
        cfg.apply(&mut opts, None);
        assert!(!opts.parallel);
        assert_eq!(opts.fonts.min_confidence, 0.5);
    }

    #[test]
    fn invalid_overrides_are_ignored() {
        let file = write_config(
            ".toml",
            "[scan]\nmax_parallel_detectors = 0\n[scan.weights]\nsri_validation = 10\nconsistencia_fuentes = 5000\n",
        );
        let cfg = Config::load(file.path()).expect("load");
        let mut opts = ScanOptions::default();
        cfg.apply(&mut opts, Some("missing"));
        assert_eq!(opts.max_parallel_detectors, 4);
        assert_eq!(opts.weights.get("sri_validation"), 0);
        assert_eq!(opts.weights.get(checks::FONTS), 15);
        opts.validate().expect("still valid");
    }

    #[test]
    fn oversized_config_is_rejected() {
        let body = format!("# {}\n", "x".repeat(MAX_CONFIG_BYTES as usize));
        let file = write_config(".toml", &body);
        let err = Config::load(file.path()).unwrap_err();
        assert!(err.to_string().contains("exceeds"));
    }
}
