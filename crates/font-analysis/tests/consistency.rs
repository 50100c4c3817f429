use font_analysis::{analyze_font_consistency, FontConsistencyConfig, FontObservation, FontRisk};

fn page(words: &[(&str, f64, usize)]) -> Vec<FontObservation> {
    words
        .iter()
        .flat_map(|&(family, size, n)| (0..n).map(move |i| FontObservation {
            text: format!("w{}", i),
            ..FontObservation::new(family, size, 0.92)
        }))
        .collect()
}

#[test]
fn single_font_document_is_consistent() {
    let words = page(&[("ArialMT", 11.0, 200)]);
    let report = analyze_font_consistency(&words, &FontConsistencyConfig::default());
    assert_eq!(report.total_fuentes, 200);
    assert_eq!(report.indice_diversidad, 0.0);
    assert!(report.consistencia_score >= 0.8, "score {}", report.consistencia_score);
    assert!(report.fuentes_sospechosas.is_empty());
    assert_eq!(report.risk, FontRisk::Low);
    assert_eq!(report.fuentes_detectadas[0].family, "arial");
    assert_eq!(report.fuentes_detectadas[0].percentage, 100.0);
}

#[test]
fn spelling_variants_collapse_into_one_family() {
    let words = page(&[("Times New Roman", 10.2, 50), ("TimesNewRomanPSMT", 10.0, 50)]);
    let report = analyze_font_consistency(&words, &FontConsistencyConfig::default());
    assert_eq!(report.grupos, 1);
    assert_eq!(report.familias_unicas, 1);
}

#[test]
fn indices_stay_in_unit_range() {
    let cfg = FontConsistencyConfig::default();
    let mixes: [&[(&str, f64, usize)]; 3] = [
        &[("Arial", 11.0, 1)],
        &[("Arial", 11.0, 90), ("Georgia", 14.0, 5), ("Wingdings", 9.0, 2)],
        &[("A", 8.0, 3), ("B", 9.0, 3), ("C", 10.0, 3), ("D", 11.0, 3), ("E", 12.0, 3), ("F", 13.0, 3)],
    ];
    for mix in mixes {
        let report = analyze_font_consistency(&page(mix), &cfg);
        assert!((0.0..=1.0).contains(&report.indice_diversidad));
        assert!((0.0..=1.0).contains(&report.consistencia_score));
    }
}

#[test]
fn pasted_amount_in_foreign_font_is_reported() {
    let words = page(&[("Helvetica", 10.0, 60), ("Hacked-Regular", 10.0, 2)]);
    let report = analyze_font_consistency(&words, &FontConsistencyConfig::default());
    let flagged: Vec<_> = report.fuentes_sospechosas.iter().map(|s| s.family.as_str()).collect();
    assert_eq!(flagged, vec!["hacked"]);
    assert!(report.notes.iter().any(|n| n.contains("suspicious font 'hacked'")));
}

#[test]
fn forged_family_split_across_sizes_is_reported_per_size() {
    let words = page(&[("Arial", 11.0, 100), ("FakeSans", 9.0, 6), ("FakeSans", 12.0, 6), ("FakeSans", 14.0, 6)]);
    let report = analyze_font_consistency(&words, &FontConsistencyConfig::default());
    assert_eq!(report.grupos, 4);
    assert_eq!(report.fuentes_sospechosas.len(), 3);
    assert!(report.fuentes_sospechosas.iter().all(|s| s.family == "fakesans" && s.coverage < 0.10));
    assert_eq!(report.risk, FontRisk::High);
    assert!(report.notes.iter().any(|n| n.contains("suspicious font 'fakesans' 12.0pt")));
}

#[test]
fn report_serializes_to_json() {
    let report = analyze_font_consistency(&page(&[("Calibri", 11.0, 5)]), &FontConsistencyConfig::default());
    let json = serde_json::to_string(&report).unwrap();
    assert!(json.contains("\"consistencia_score\""));
    assert!(json.contains("\"risk\":\"LOW\""));
}
