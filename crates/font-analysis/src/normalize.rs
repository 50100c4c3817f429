use std::sync::OnceLock;

use regex::Regex;

use crate::catalog::alias_of;
use crate::model::{FontStyle, FontWeight};

static STYLE_SUFFIX_RE: OnceLock<Option<Regex>> = OnceLock::new();
static SPACES_RE: OnceLock<Option<Regex>> = OnceLock::new();

/// Canonical family name: lowercase, style suffix removed, separators
/// turned into single spaces, then mapped through the alias table.
pub fn normalize_family(name: &str) -> String {
    let mut n = name.trim().to_lowercase();
    if let Some(re) = STYLE_SUFFIX_RE
        .get_or_init(|| {
            Regex::new(r"[-\s]?(bold|italic|oblique|regular|medium|light|semibold|black|mt|psmt)$").ok()
        })
        .as_ref()
    {
        n = re.replace(&n, "").into_owned();
    }
    n = n.replace(['-', '_'], " ");
    if let Some(re) = SPACES_RE.get_or_init(|| Regex::new(r"\s+").ok()).as_ref() {
        n = re.replace_all(&n, " ").into_owned();
    }
    let n = n.trim();
    match alias_of(n) {
        Some(base) => base.to_string(),
        None => n.to_string(),
    }
}

pub fn normalize_style(style: Option<&str>) -> FontStyle {
    let s = style.unwrap_or_default().to_lowercase();
    if s.contains("italic") || s.contains("oblique") {
        FontStyle::Italic
    } else {
        FontStyle::Normal
    }
}

pub fn normalize_weight(weight: Option<&str>) -> FontWeight {
    let w = weight.unwrap_or_default().trim().to_lowercase();
    if !w.is_empty() && w.chars().all(|c| c.is_ascii_digit()) {
        return match w.parse::<u32>() {
            Ok(v) if v >= 600 => FontWeight::Bold,
            _ => FontWeight::Normal,
        };
    }
    if w.contains("bold") {
        FontWeight::Bold
    } else {
        FontWeight::Normal
    }
}

/// Half-point size bucket.
pub fn size_bucket(size: f64) -> f64 {
    (size * 2.0).round() / 2.0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_style_suffix_and_aliases() {
        assert_eq!(normalize_family("Arial-BoldMT"), "arial bold");
        assert_eq!(normalize_family("ArialMT"), "arial");
        assert_eq!(normalize_family("Helvetica-Bold"), "helvetica");
        assert_eq!(normalize_family("Times New Roman"), "times");
        assert_eq!(normalize_family("TimesNewRomanPSMT"), "times");
        assert_eq!(normalize_family("  Courier_New  "), "courier new");
        assert_eq!(normalize_family("Segoe UI Variable"), "segoe ui");
    }

    #[test]
    fn style_and_weight_inference() {
        assert_eq!(normalize_style(Some("Oblique")), FontStyle::Italic);
        assert_eq!(normalize_style(None), FontStyle::Normal);
        assert_eq!(normalize_weight(Some("700")), FontWeight::Bold);
        assert_eq!(normalize_weight(Some("400")), FontWeight::Normal);
        assert_eq!(normalize_weight(Some("SemiBold")), FontWeight::Bold);
        assert_eq!(normalize_weight(None), FontWeight::Normal);
    }

    #[test]
    fn buckets_to_half_points() {
        assert_eq!(size_bucket(11.2), 11.0);
        assert_eq!(size_bucket(11.3), 11.5);
        assert_eq!(size_bucket(12.0), 12.0);
    }
}
