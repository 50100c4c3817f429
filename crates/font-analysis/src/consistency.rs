use std::collections::{BTreeMap, BTreeSet};

use tracing::debug;

use crate::catalog::{has_suspicious_keyword, is_blacklisted, is_standard};
use crate::model::{
    DetectedFont, FontConsistencyConfig, FontConsistencyReport, FontGroup, FontObservation, FontRisk, FontStyle,
    FontWeight, SuspiciousFont,
};
use crate::normalize::{normalize_family, normalize_style, normalize_weight, size_bucket};

struct Sample {
    raw: String,
    family: String,
    size: f64,
    style: FontStyle,
    weight: FontWeight,
    confidence: f64,
}

fn extract(words: &[FontObservation], config: &FontConsistencyConfig) -> Vec<Sample> {
    words
        .iter()
        .filter_map(|w| {
            let raw = w.family.as_deref()?.trim();
            let family = normalize_family(raw);
            if family.is_empty() {
                return None;
            }
            let size = w.size.unwrap_or(0.0);
            if size < config.min_size || size > config.max_size || w.confidence < config.min_confidence {
                return None;
            }
            Some(Sample {
                raw: raw.to_string(),
                family,
                size,
                style: normalize_style(w.style.as_deref()),
                weight: normalize_weight(w.weight.as_deref()),
                confidence: w.confidence,
            })
        })
        .collect()
}

pub fn group_fonts(words: &[FontObservation], config: &FontConsistencyConfig) -> Vec<FontGroup> {
    // Sizes are keyed in half points so the map key stays integral.
    let mut groups: BTreeMap<(String, i64, FontStyle, FontWeight), (usize, f64, BTreeSet<String>)> =
        BTreeMap::new();
    for s in extract(words, config) {
        let key = (s.family, (size_bucket(s.size) * 2.0) as i64, s.style, s.weight);
        let entry = groups.entry(key).or_insert_with(|| (0, 0.0, BTreeSet::new()));
        entry.0 += 1;
        entry.1 += s.confidence;
        entry.2.insert(s.raw);
    }
    groups
        .into_iter()
        .map(|((family, half_points, style, weight), (count, conf_sum, raws))| FontGroup {
            family,
            size_bucket: half_points as f64 / 2.0,
            style,
            weight,
            count,
            confidence_avg: conf_sum / count as f64,
            raw_families: raws.into_iter().collect(),
        })
        .collect()
}

/// Shannon entropy over group shares, normalized by `ln(#groups)`.
pub fn diversity_index(groups: &[FontGroup]) -> f64 {
    let total: usize = groups.iter().map(|g| g.count).sum();
    if groups.len() < 2 || total == 0 {
        return 0.0;
    }
    let h: f64 = groups
        .iter()
        .map(|g| g.count as f64 / total as f64)
        .filter(|&p| p > 0.0)
        .map(|p| -p * p.ln())
        .sum();
    (h / (groups.len() as f64).ln()).clamp(0.0, 1.0)
}

pub fn consistency_score(
    groups: &[FontGroup],
    diversity: f64,
    unique_families: usize,
    config: &FontConsistencyConfig,
) -> f64 {
    let total: usize = groups.iter().map(|g| g.count).sum();
    if total == 0 {
        return 1.0;
    }
    let hhi: f64 = groups
        .iter()
        .map(|g| {
            let p = g.count as f64 / total as f64;
            p * p
        })
        .sum();
    let penalty = (unique_families.saturating_sub(config.family_penalty_free) as f64 / 10.0)
        .clamp(0.0, config.family_penalty_cap);
    let score = config.hhi_weight * hhi
        + config.diversity_weight * (1.0 - diversity)
        + config.family_penalty_weight * (1.0 - penalty);
    score.clamp(0.0, 1.0)
}

/// Scores every group on its own share of the words, so a family spread over
/// several sizes or styles is judged per variant.
pub fn suspicious_fonts(groups: &[FontGroup], config: &FontConsistencyConfig) -> Vec<SuspiciousFont> {
    let total: usize = groups.iter().map(|g| g.count).sum();
    if total == 0 {
        return Vec::new();
    }
    groups
        .iter()
        .filter_map(|g| {
            let coverage = g.count as f64 / total as f64;
            let family = g.family.as_str();
            let mut score = 0u32;
            if is_blacklisted(family) {
                score += 2;
            }
            if has_suspicious_keyword(family) {
                score += 1;
            }
            if !is_standard(family) && coverage < config.rare_coverage {
                score += 1;
            }
            if score < config.flag_score || coverage >= config.flag_coverage {
                return None;
            }
            Some(SuspiciousFont {
                family: g.family.clone(),
                size: g.size_bucket,
                style: g.style,
                weight: g.weight,
                variants: g.raw_families.clone(),
                coverage,
                score,
            })
        })
        .collect()
}

fn detected_list(groups: &[FontGroup], total: usize, config: &FontConsistencyConfig) -> Vec<DetectedFont> {
    let mut list: Vec<DetectedFont> = groups
        .iter()
        .filter(|g| !(g.count == 1 && g.confidence_avg < config.singleton_min_confidence))
        .map(|g| DetectedFont {
            family: g.family.clone(),
            size: g.size_bucket,
            style: g.style,
            weight: g.weight,
            count: g.count,
            percentage: g.count as f64 / total.max(1) as f64 * 100.0,
            confidence_avg: g.confidence_avg,
        })
        .collect();
    list.sort_by(|a, b| b.count.cmp(&a.count));
    list
}

fn classify(report: &FontConsistencyReport, config: &FontConsistencyConfig) -> FontRisk {
    let mut risk = if report.consistencia_score >= config.low_risk_consistency && report.grupos <= 2 {
        FontRisk::Low
    } else if report.consistencia_score >= config.medium_risk_consistency && report.grupos <= 3 {
        FontRisk::Medium
    } else {
        FontRisk::High
    };
    if !report.fuentes_sospechosas.is_empty()
        || report.indice_diversidad > config.high_risk_diversity
        || report.familias_unicas > config.family_penalty_free
    {
        risk = FontRisk::High;
    }
    risk
}

fn notes(report: &FontConsistencyReport) -> Vec<String> {
    let mut notes = vec![
        format!("words with font data: {}", report.total_fuentes),
        format!("font groups: {}", report.grupos),
        format!("diversity index: {:.2}", report.indice_diversidad),
        format!("consistency score: {:.2}", report.consistencia_score),
    ];
    if let Some(first) = report.fuentes_detectadas.first() {
        notes.push(format!("most common font: {}", first.family));
    }
    if report.fuentes_sospechosas.is_empty() {
        notes.push("no suspicious fonts".to_string());
    } else {
        notes.push(format!("{} suspicious fonts", report.fuentes_sospechosas.len()));
        notes.extend(report.fuentes_sospechosas.iter().take(3).map(|s| format!("- {}", s.describe())));
    }
    notes.push(
        if report.consistencia_score >= 0.8 {
            "consistent font usage"
        } else if report.consistencia_score >= 0.6 {
            "moderate font consistency"
        } else {
            "low font consistency, possible manipulation"
        }
        .to_string(),
    );
    notes
}

pub fn analyze_font_consistency(words: &[FontObservation], config: &FontConsistencyConfig) -> FontConsistencyReport {
    let groups = group_fonts(words, config);
    if groups.is_empty() {
        return FontConsistencyReport::empty();
    }
    let total: usize = groups.iter().map(|g| g.count).sum();
    let unique_families = groups.iter().map(|g| g.family.as_str()).collect::<BTreeSet<_>>().len();
    let diversity = diversity_index(&groups);
    let mut report = FontConsistencyReport {
        fuentes_detectadas: detected_list(&groups, total, config),
        total_fuentes: total,
        grupos: groups.len(),
        familias_unicas: unique_families,
        indice_diversidad: diversity,
        fuentes_sospechosas: suspicious_fonts(&groups, config),
        consistencia_score: consistency_score(&groups, diversity, unique_families, config),
        risk: FontRisk::Low,
        notes: Vec::new(),
    };
    report.risk = classify(&report, config);
    report.notes = notes(&report);
    debug!(
        words = total,
        groups = report.grupos,
        families = unique_families,
        consistency = report.consistencia_score,
        risk = report.risk.as_str(),
        "font consistency computed"
    );
    report
}
