use serde::{Deserialize, Serialize};

/// Font attributes of one recognized word.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FontObservation {
    #[serde(default)]
    pub text: String,
    pub family: Option<String>,
    pub size: Option<f64>,
    pub style: Option<String>,
    pub weight: Option<String>,
    pub confidence: f64,
}

impl FontObservation {
    pub fn new(family: &str, size: f64, confidence: f64) -> Self {
        Self {
            text: String::new(),
            family: Some(family.to_string()),
            size: Some(size),
            style: None,
            weight: None,
            confidence,
        }
    }

    pub fn with_style(mut self, style: &str) -> Self {
        self.style = Some(style.to_string());
        self
    }

    pub fn with_weight(mut self, weight: &str) -> Self {
        self.weight = Some(weight.to_string());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontStyle {
    Normal,
    Italic,
}

impl FontStyle {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontStyle::Normal => "normal",
            FontStyle::Italic => "italic",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FontWeight {
    Normal,
    Bold,
}

impl FontWeight {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontWeight::Normal => "normal",
            FontWeight::Bold => "bold",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FontRisk {
    Low,
    Medium,
    High,
}

impl FontRisk {
    pub fn as_str(&self) -> &'static str {
        match self {
            FontRisk::Low => "LOW",
            FontRisk::Medium => "MEDIUM",
            FontRisk::High => "HIGH",
        }
    }
}

/// Words sharing normalized family, half-point size bucket, style and weight.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontGroup {
    pub family: String,
    pub size_bucket: f64,
    pub style: FontStyle,
    pub weight: FontWeight,
    pub count: usize,
    pub confidence_avg: f64,
    /// Family spellings as reported before normalization.
    pub raw_families: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DetectedFont {
    pub family: String,
    pub size: f64,
    pub style: FontStyle,
    pub weight: FontWeight,
    pub count: usize,
    pub percentage: f64,
    pub confidence_avg: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SuspiciousFont {
    pub family: String,
    pub size: f64,
    pub style: FontStyle,
    pub weight: FontWeight,
    pub variants: Vec<String>,
    pub coverage: f64,
    pub score: u32,
}

impl SuspiciousFont {
    pub fn describe(&self) -> String {
        format!(
            "suspicious font '{}' {:.1}pt {}/{} (variants: {}) coverage {:.1}%, score {}",
            self.family,
            self.size,
            self.style.as_str(),
            self.weight.as_str(),
            self.variants.join(", "),
            self.coverage * 100.0,
            self.score
        )
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FontConsistencyReport {
    pub fuentes_detectadas: Vec<DetectedFont>,
    /// Words that survived size and confidence filtering.
    pub total_fuentes: usize,
    pub grupos: usize,
    pub familias_unicas: usize,
    pub indice_diversidad: f64,
    pub fuentes_sospechosas: Vec<SuspiciousFont>,
    pub consistencia_score: f64,
    pub risk: FontRisk,
    pub notes: Vec<String>,
}

impl FontConsistencyReport {
    pub fn empty() -> Self {
        Self {
            fuentes_detectadas: Vec::new(),
            total_fuentes: 0,
            grupos: 0,
            familias_unicas: 0,
            indice_diversidad: 0.0,
            fuentes_sospechosas: Vec::new(),
            consistencia_score: 1.0,
            risk: FontRisk::Low,
            notes: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FontConsistencyConfig {
    /// Smallest plausible point size
    pub min_size: f64,

    /// Largest plausible point size
    pub max_size: f64,

    /// Words recognized below this confidence are ignored
    pub min_confidence: f64,

    /// Single-word groups below this average confidence are left out of the detected list
    pub singleton_min_confidence: f64,

    pub hhi_weight: f64,
    pub diversity_weight: f64,
    pub family_penalty_weight: f64,

    /// Number of families tolerated before the family penalty starts
    pub family_penalty_free: usize,

    pub family_penalty_cap: f64,

    /// Non-standard families under this share of words earn a point
    pub rare_coverage: f64,

    /// Families are only flagged while their share stays under this
    pub flag_coverage: f64,

    pub flag_score: u32,

    /// Consistency needed for a LOW verdict
    pub low_risk_consistency: f64,

    /// Consistency needed for a MEDIUM verdict
    pub medium_risk_consistency: f64,

    /// Diversity above which the verdict is always HIGH
    pub high_risk_diversity: f64,
}

impl Default for FontConsistencyConfig {
    fn default() -> Self {
        Self {
            min_size: 5.0,
            max_size: 72.0,
            min_confidence: 0.3,
            singleton_min_confidence: 0.5,
            hhi_weight: 0.55,
            diversity_weight: 0.30,
            family_penalty_weight: 0.15,
            family_penalty_free: 5,
            family_penalty_cap: 0.4,
            rare_coverage: 0.10,
            flag_coverage: 0.20,
            flag_score: 2,
            low_risk_consistency: 0.8,
            medium_risk_consistency: 0.6,
            high_risk_diversity: 0.8,
        }
    }
}

impl FontConsistencyConfig {
    /// Load configuration from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, String> {
        toml::from_str(toml).map_err(|e| format!("Failed to parse TOML: {}", e))
    }

    /// Load configuration from JSON string
    pub fn from_json(json: &str) -> Result<Self, String> {
        serde_json::from_str(json).map_err(|e| format!("Failed to parse JSON: {}", e))
    }

    /// Load configuration from YAML string
    pub fn from_yaml(yaml: &str) -> Result<Self, String> {
        serde_yaml::from_str(yaml).map_err(|e| format!("Failed to parse YAML: {}", e))
    }

    pub fn to_json(&self) -> Result<String, String> {
        serde_json::to_string_pretty(self).map_err(|e| format!("Failed to serialize to JSON: {}", e))
    }

    pub fn to_yaml(&self) -> Result<String, String> {
        serde_yaml::to_string(self).map_err(|e| format!("Failed to serialize to YAML: {}", e))
    }

    pub fn validate(&self) -> Result<(), String> {
        if !(self.min_size > 0.0 && self.min_size < self.max_size) {
            return Err(format!("font size range [{}, {}] is empty", self.min_size, self.max_size));
        }
        for (name, v) in [
            ("min_confidence", self.min_confidence),
            ("rare_coverage", self.rare_coverage),
            ("flag_coverage", self.flag_coverage),
            ("family_penalty_cap", self.family_penalty_cap),
        ] {
            if !(0.0..=1.0).contains(&v) {
                return Err(format!("{} must be within [0, 1], got {}", name, v));
            }
        }
        let total = self.hhi_weight + self.diversity_weight + self.family_penalty_weight;
        if (total - 1.0).abs() > 1e-6 {
            return Err(format!("consistency weights must sum to 1, got {}", total));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_default() {
        let config = FontConsistencyConfig::default();
        assert_eq!(config.min_size, 5.0);
        assert_eq!(config.max_size, 72.0);
        assert_eq!(config.flag_score, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_config_from_json() {
        let json = r#"{
            "min_size": 6.0,
            "max_size": 48.0,
            "flag_score": 3
        }"#;

        let config = FontConsistencyConfig::from_json(json).unwrap();
        assert_eq!(config.min_size, 6.0);
        assert_eq!(config.max_size, 48.0);
        assert_eq!(config.flag_score, 3);
        assert_eq!(config.min_confidence, 0.3);
    }

    #[test]
    fn test_config_from_yaml() {
        let yaml = r#"
min_confidence: 0.5
rare_coverage: 0.05
"#;

        let config = FontConsistencyConfig::from_yaml(yaml).unwrap();
        assert_eq!(config.min_confidence, 0.5);
        assert_eq!(config.rare_coverage, 0.05);
    }

    #[test]
    fn test_config_from_toml() {
        let config = FontConsistencyConfig::from_toml("flag_coverage = 0.25\n").unwrap();
        assert_eq!(config.flag_coverage, 0.25);
        assert!(FontConsistencyConfig::from_toml("flag_coverage = \"x\"").is_err());
    }

    #[test]
    fn test_config_roundtrip_json() {
        let config = FontConsistencyConfig::default();
        let json = config.to_json().unwrap();
        assert!(json.contains("\"hhi_weight\""));
        let config2 = FontConsistencyConfig::from_json(&json).unwrap();
        assert_eq!(config.max_size, config2.max_size);
        assert_eq!(config.family_penalty_free, config2.family_penalty_free);
    }

    #[test]
    fn test_config_to_yaml() {
        let yaml = FontConsistencyConfig::default().to_yaml().unwrap();
        assert!(yaml.contains("min_size:"));
    }

    #[test]
    fn unbalanced_weights_are_rejected() {
        let config = FontConsistencyConfig { hhi_weight: 0.9, ..Default::default() };
        assert!(config.validate().is_err());
    }
}
