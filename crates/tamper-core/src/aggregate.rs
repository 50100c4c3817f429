//! Weighted fusion of detector verdicts into one confidence grade.
//!
//! Each check that produced a verdict adds its weight to the maximum score.
//! A detected verdict earns `weight * factor(severity)` points, rounded.
//! Neutral outcomes neither earn points nor count toward the maximum.

use image_analysis::ScreenshotVerdict;
use tracing::debug;

use crate::model::{AggregatedResult, CheckScore, DetectorReport, ForensicVerdict, GradoConfianza, Outcome, Severity};
use crate::scan::{checks, Grading, ScanOptions};

pub const SCREENSHOT_NOTE: &str = "image looks like a recompressed screenshot/web capture";

pub fn severity_factor(severity: Severity, grading: &Grading) -> f64 {
    match severity {
        Severity::High => grading.high_factor,
        Severity::Medium => grading.medium_factor,
        Severity::Low => grading.low_factor,
    }
}

pub fn earned_points(check: &str, weight: u32, verdict: &ForensicVerdict, es_screenshot: bool, grading: &Grading) -> u32 {
    if !verdict.detected {
        return 0;
    }
    let factor = if es_screenshot && check == checks::SYNTHETIC_TEXT {
        grading.screenshot_synthetic_factor
    } else {
        severity_factor(verdict.severity, grading)
    };
    (weight as f64 * factor).round() as u32
}

pub fn grade(porcentaje: f64, es_screenshot: bool, grading: &Grading) -> GradoConfianza {
    if es_screenshot && porcentaje < grading.screenshot_ceiling {
        GradoConfianza::Bajo
    } else if porcentaje >= grading.alto {
        GradoConfianza::Alto
    } else if porcentaje > grading.medio {
        GradoConfianza::Medio
    } else {
        GradoConfianza::Bajo
    }
}

pub fn aggregate(
    reports: &[DetectorReport],
    screenshot: Option<ScreenshotVerdict>,
    opts: &ScanOptions,
) -> AggregatedResult {
    let grading = &opts.grading;
    let es_screenshot = screenshot.map(|s| s.is_screenshot()).unwrap_or(false);
    let tipo_imagen = screenshot.map(|s| s.image_kind()).unwrap_or("imagen_normal").to_string();

    let mut evidencias = Vec::new();
    let mut checks = Vec::with_capacity(reports.len());
    let mut notes = Vec::new();
    let mut puntuacion = 0u32;
    let mut max_puntuacion = 0u32;

    for report in reports {
        let weight = opts.weights.get(&report.check);
        match &report.outcome {
            Outcome::Analyzed(verdict) => {
                let points = earned_points(&report.check, weight, verdict, es_screenshot, grading);
                max_puntuacion += weight;
                puntuacion += points;
                if verdict.detected {
                    evidencias.extend(report.evidence.iter().cloned());
                }
                checks.push(CheckScore { check: report.check.clone(), weight, points, ran: true });
            }
            Outcome::Neutral { reason } => {
                notes.push(format!("{} did not contribute: {}", report.check, reason));
                checks.push(CheckScore { check: report.check.clone(), weight, points: 0, ran: false });
            }
        }
    }

    let porcentaje_confianza = if max_puntuacion == 0 {
        0.0
    } else {
        (puntuacion as f64 * 100.0 / max_puntuacion as f64).clamp(0.0, 100.0)
    };
    let grado_confianza = grade(porcentaje_confianza, es_screenshot, grading);
    if es_screenshot && porcentaje_confianza < grading.screenshot_ceiling {
        notes.push(SCREENSHOT_NOTE.to_string());
    }
    debug!(
        puntuacion,
        max_puntuacion,
        porcentaje = porcentaje_confianza,
        grado = grado_confianza.as_str(),
        es_screenshot,
        "aggregated verdicts"
    );

    AggregatedResult {
        evidencias,
        puntuacion,
        max_puntuacion,
        porcentaje_confianza,
        grado_confianza,
        es_screenshot,
        tipo_imagen,
        risk_level: grado_confianza,
        screenshot,
        checks,
        notes,
    }
}
