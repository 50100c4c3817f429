use image_analysis::BBox;

use crate::model::{EvidenceItem, Severity};

/// Hex prefix of a blake3 digest over the fields that identify an item.
/// Identical evidence from repeated runs keeps the same id.
pub fn evidence_id(check: &str, tipo: &str, detalle: &str, bbox: Option<&BBox>) -> String {
    let mut hasher = blake3::Hasher::new();
    hasher.update(check.as_bytes());
    hasher.update(&[0]);
    hasher.update(tipo.as_bytes());
    hasher.update(&[0]);
    hasher.update(detalle.as_bytes());
    if let Some(b) = bbox {
        for v in [b.x, b.y, b.w, b.h] {
            hasher.update(&v.to_le_bytes());
        }
    }
    let hex = hasher.finalize().to_hex();
    format!("ev-{}", &hex[..16])
}

pub struct EvidenceBuilder {
    check: String,
    bounds: Option<(u32, u32)>,
    items: Vec<EvidenceItem>,
}

impl EvidenceBuilder {
    pub fn new(check: &str) -> Self {
        Self { check: check.to_string(), bounds: None, items: Vec::new() }
    }

    /// Clamp every region to a `width x height` buffer.
    pub fn within(mut self, width: u32, height: u32) -> Self {
        self.bounds = Some((width, height));
        self
    }

    pub fn item(mut self, tipo: &str, severidad: Severity, detalle: impl Into<String>) -> Self {
        self.push(tipo, severidad, detalle, None);
        self
    }

    pub fn region(mut self, tipo: &str, severidad: Severity, detalle: impl Into<String>, bbox: BBox) -> Self {
        self.push(tipo, severidad, detalle, Some(bbox));
        self
    }

    pub fn push(&mut self, tipo: &str, severidad: Severity, detalle: impl Into<String>, bbox: Option<BBox>) {
        let detalle = detalle.into();
        let bbox = match (bbox, self.bounds) {
            (Some(b), Some((w, h))) => Some(b.clamp_to(w, h)),
            (b, _) => b,
        };
        self.items.push(EvidenceItem {
            id: evidence_id(&self.check, tipo, &detalle, bbox.as_ref()),
            check: self.check.clone(),
            tipo: tipo.to_string(),
            severidad,
            detalle,
            bbox,
        });
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn build(self) -> Vec<EvidenceItem> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_stable_and_field_sensitive() {
        let a = evidence_id("capas_ocultas", "layer", "p1:ocg:1", None);
        assert_eq!(a, evidence_id("capas_ocultas", "layer", "p1:ocg:1", None));
        assert_ne!(a, evidence_id("capas_ocultas", "layer", "p1:ocg:2", None));
        assert_ne!(a, evidence_id("capas_ocultas", "layer", "p1:ocg:1", Some(&BBox::new(0, 0, 1, 1))));
        assert_eq!(a.len(), 19);
    }

    #[test]
    fn regions_are_clamped() {
        let items = EvidenceBuilder::new("analisis_ela_sospechoso")
            .within(100, 50)
            .region("ela_cluster", Severity::High, "cluster", BBox::new(90, 40, 30, 30))
            .item("ela_global", Severity::Low, "ratio")
            .build();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].bbox, Some(BBox::new(90, 40, 10, 10)));
        assert_eq!(items[1].bbox, None);
    }
}
