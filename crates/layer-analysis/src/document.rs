//! Parsed PDF with every page's candidate overlay layers enumerated once.

use lopdf::{Dictionary, Document, Object, ObjectId};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::inventory::{image_inventory, ImageInfo};
use crate::static_scan::{stream_markers, text_origins, StreamMarkers};

const MAX_INDIRECTION: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LayerKind {
    ContentStream,
    Annotation,
    FormXObject,
    Ocg,
}

impl LayerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            LayerKind::ContentStream => "stream",
            LayerKind::Annotation => "annot",
            LayerKind::FormXObject => "xobject",
            LayerKind::Ocg => "ocg",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerDescriptor {
    /// Ordinal within the page, used as the visibility slot.
    pub index: usize,
    pub id: String,
    pub kind: LayerKind,
    pub object: Option<(u32, u16)>,
    pub name: Option<String>,
    /// Page-space rectangle when the object declares one.
    pub rect: Option<[f64; 4]>,
    /// Overlay markers found without rendering, e.g. `covers_text`.
    #[serde(default)]
    pub markers: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct PageLayers {
    pub number: u32,
    pub object: ObjectId,
    pub media_box: [f64; 4],
    pub layers: Vec<LayerDescriptor>,
    pub images: Vec<ImageInfo>,
    /// Decoded page content, streams concatenated in paint order.
    pub content: Vec<u8>,
    pub stream_markers: Vec<StreamMarkers>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum DocumentError {
    Parse(String),
    NoPages,
}

impl std::fmt::Display for DocumentError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DocumentError::Parse(s) => write!(f, "PDF parse failed: {}", s),
            DocumentError::NoPages => write!(f, "PDF has no pages"),
        }
    }
}

impl std::error::Error for DocumentError {}

pub struct LayeredDocument {
    inner: Document,
    pages: Vec<PageLayers>,
    catalog_ocgs: Vec<(Option<ObjectId>, String)>,
    acroform_fields: Option<usize>,
}

impl std::fmt::Debug for LayeredDocument {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LayeredDocument")
            .field("pages", &self.pages.len())
            .field("catalog_ocgs", &self.catalog_ocgs.len())
            .finish()
    }
}

pub(crate) fn resolve<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Object> {
    let mut cur = obj;
    for _ in 0..MAX_INDIRECTION {
        match cur {
            Object::Reference(id) => cur = doc.get_object(*id).ok()?,
            other => return Some(other),
        }
    }
    None
}

pub(crate) fn resolve_dict<'a>(doc: &'a Document, obj: &'a Object) -> Option<&'a Dictionary> {
    match resolve(doc, obj)? {
        Object::Dictionary(d) => Some(d),
        Object::Stream(s) => Some(&s.dict),
        _ => None,
    }
}

pub(crate) fn number(obj: &Object) -> Option<f64> {
    match obj {
        Object::Integer(i) => Some(*i as f64),
        Object::Real(r) => Some(*r as f64),
        _ => None,
    }
}

fn rect(doc: &Document, obj: &Object) -> Option<[f64; 4]> {
    let arr = resolve(doc, obj)?.as_array().ok()?;
    if arr.len() != 4 {
        return None;
    }
    let mut out = [0.0; 4];
    for (slot, v) in out.iter_mut().zip(arr) {
        *slot = number(resolve(doc, v)?)?;
    }
    Some(out)
}

fn name_of(dict: &Dictionary, key: &[u8]) -> Option<String> {
    match dict.get(key).ok()? {
        Object::Name(n) => Some(String::from_utf8_lossy(n).into_owned()),
        Object::String(s, _) => Some(String::from_utf8_lossy(s).into_owned()),
        _ => None,
    }
}

/// Looks a key up on the page and then up the `/Parent` chain.
fn inherited<'a>(doc: &'a Document, page: ObjectId, key: &[u8]) -> Option<&'a Object> {
    let mut node = doc.get_object(page).ok()?.as_dict().ok()?;
    for _ in 0..MAX_INDIRECTION {
        if let Ok(v) = node.get(key) {
            return Some(v);
        }
        node = resolve_dict(doc, node.get(b"Parent").ok()?)?;
    }
    None
}

/// Decoded bytes of every content stream of the page, in paint order.
fn page_streams(doc: &Document, page: ObjectId) -> Vec<(ObjectId, Vec<u8>)> {
    doc.get_page_contents(page)
        .into_iter()
        .map(|id| {
            let bytes = match doc.get_object(id) {
                Ok(Object::Stream(s)) => s.decompressed_content().unwrap_or_else(|_| s.content.clone()),
                _ => Vec::new(),
            };
            (id, bytes)
        })
        .collect()
}

/// True when `content` holds `/<name>` followed by `op`, separated by whitespace.
fn names_operand(content: &[u8], name: &[u8], op: &[u8]) -> bool {
    let mut needle = Vec::with_capacity(name.len() + 1);
    needle.push(b'/');
    needle.extend_from_slice(name);
    let mut rest = content;
    while let Some(pos) = rest.windows(needle.len()).position(|w| w == needle.as_slice()) {
        let after = &rest[pos + needle.len()..];
        let gap = after.iter().take_while(|b| b.is_ascii_whitespace()).count();
        if gap > 0 && after[gap..].starts_with(op) {
            return true;
        }
        rest = after;
    }
    false
}

fn contains_point(r: &[f64; 4], (x, y): (f64, f64)) -> bool {
    let (x0, x1) = (r[0].min(r[2]), r[0].max(r[2]));
    let (y0, y1) = (r[1].min(r[3]), r[1].max(r[3]));
    x >= x0 && x <= x1 && y >= y0 && y <= y1
}

fn form_markers(doc: &Document, dict: &Dictionary, key: &[u8], overlays: &[(ObjectId, Vec<u8>)]) -> Vec<String> {
    let mut markers = Vec::new();
    let group_transparent = dict
        .get(b"Group")
        .ok()
        .and_then(|g| resolve_dict(doc, g))
        .is_some_and(|g| name_of(g, b"S").as_deref() == Some("Transparency"));
    if group_transparent || dict.has(b"SMask") {
        markers.push("transparency".to_string());
    }
    if dict.has(b"OC") {
        markers.push("optional_content".to_string());
    }
    if overlays.iter().any(|(_, bytes)| names_operand(bytes, key, b"Do")) {
        markers.push("painted_by_overlay".to_string());
    }
    markers
}

fn catalog_ocgs(doc: &Document) -> Vec<(Option<ObjectId>, String)> {
    let Some(root) = doc.trailer.get(b"Root").ok().and_then(|r| resolve_dict(doc, r)) else {
        return Vec::new();
    };
    let Some(props) = root.get(b"OCProperties").ok().and_then(|p| resolve_dict(doc, p)) else {
        return Vec::new();
    };
    let Some(list) = props.get(b"OCGs").ok().and_then(|o| resolve(doc, o)).and_then(|o| o.as_array().ok())
    else {
        return Vec::new();
    };
    list.iter()
        .enumerate()
        .filter_map(|(i, entry)| {
            let id = entry.as_reference().ok();
            let dict = resolve_dict(doc, entry)?;
            Some((id, name_of(dict, b"Name").unwrap_or_else(|| format!("ocg{}", i))))
        })
        .collect()
}

fn acroform_fields(doc: &Document) -> Option<usize> {
    let root = doc.trailer.get(b"Root").ok().and_then(|r| resolve_dict(doc, r))?;
    let form = root.get(b"AcroForm").ok().and_then(|f| resolve_dict(doc, f))?;
    Some(
        form.get(b"Fields")
            .ok()
            .and_then(|f| resolve(doc, f))
            .and_then(|f| f.as_array().ok())
            .map_or(0, |f| f.len()),
    )
}

fn page_layers(
    doc: &Document,
    number: u32,
    page: ObjectId,
    streams: &[(ObjectId, Vec<u8>)],
    content: &[u8],
    catalog: &[(Option<ObjectId>, String)],
) -> (Vec<LayerDescriptor>, Vec<StreamMarkers>) {
    let mut layers = Vec::new();
    let mut push = |kind: LayerKind,
                    object: Option<ObjectId>,
                    name: Option<String>,
                    rect: Option<[f64; 4]>,
                    markers: Vec<String>| {
        let n = layers.iter().filter(|l: &&LayerDescriptor| l.kind == kind).count();
        layers.push(LayerDescriptor {
            index: layers.len(),
            id: format!("p{}:{}:{}", number, kind.as_str(), n + 1),
            kind,
            object,
            name,
            rect,
            markers,
        });
    };

    let per_stream: Vec<StreamMarkers> = streams
        .iter()
        .enumerate()
        .map(|(index, (id, bytes))| StreamMarkers { index, object: Some(*id), hits: stream_markers(bytes) })
        .collect();
    let overlays = streams.get(1..).unwrap_or_default();
    let body_text = streams.first().map(|(_, bytes)| text_origins(bytes)).unwrap_or_default();

    // The first stream is the page body; later ones are candidate overlays.
    for marks in per_stream.iter().skip(1) {
        let markers = marks.hits.iter().map(|h| h.pattern.clone()).collect();
        push(LayerKind::ContentStream, marks.object, None, None, markers);
    }

    if let Some(annots) = doc
        .get_object(page)
        .ok()
        .and_then(|p| p.as_dict().ok())
        .and_then(|p| p.get(b"Annots").ok())
        .and_then(|a| resolve(doc, a))
        .and_then(|a| a.as_array().ok())
    {
        for entry in annots {
            let Some(dict) = resolve_dict(doc, entry) else { continue };
            let r = dict.get(b"Rect").ok().and_then(|r| rect(doc, r));
            let mut markers = Vec::new();
            if r.is_some_and(|r| body_text.iter().any(|p| contains_point(&r, *p))) {
                markers.push("covers_text".to_string());
            }
            if dict.has(b"OC") {
                markers.push("optional_content".to_string());
            }
            push(LayerKind::Annotation, entry.as_reference().ok(), name_of(dict, b"Subtype"), r, markers);
        }
    }

    let resources = inherited(doc, page, b"Resources").and_then(|r| resolve_dict(doc, r));
    let mut page_ocgs = Vec::new();
    if let Some(res) = resources {
        if let Some(xobjects) = res.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) {
            for (key, entry) in xobjects.iter() {
                let Some(dict) = resolve_dict(doc, entry) else { continue };
                if name_of(dict, b"Subtype").as_deref() == Some("Form") {
                    let r = dict.get(b"BBox").ok().and_then(|b| rect(doc, b));
                    let markers = form_markers(doc, dict, key, overlays);
                    let name = String::from_utf8_lossy(key).into_owned();
                    push(LayerKind::FormXObject, entry.as_reference().ok(), Some(name), r, markers);
                }
            }
        }
        if let Some(props) = res.get(b"Properties").ok().and_then(|p| resolve_dict(doc, p)) {
            for (key, entry) in props.iter() {
                let Some(dict) = resolve_dict(doc, entry) else { continue };
                if name_of(dict, b"Type").as_deref() == Some("OCG") {
                    let name = name_of(dict, b"Name").unwrap_or_else(|| String::from_utf8_lossy(key).into_owned());
                    let marked = names_operand(content, key, b"BDC");
                    page_ocgs.push((entry.as_reference().ok(), name, marked));
                }
            }
        }
    }
    // Pages that mark optional content without declaring it in their
    // resources are probed against every document-level group.
    if page_ocgs.is_empty() && content.windows(3).any(|w| w == b"/OC") {
        page_ocgs.extend(catalog.iter().map(|(id, name)| (*id, name.clone(), true)));
    }
    for (id, name, marked) in page_ocgs {
        let markers = if marked { vec!["marked_content".to_string()] } else { Vec::new() };
        push(LayerKind::Ocg, id, Some(name), None, markers);
    }
    (layers, per_stream)
}

impl LayeredDocument {
    pub fn parse(bytes: &[u8]) -> Result<Self, DocumentError> {
        let inner = Document::load_mem(bytes).map_err(|e| DocumentError::Parse(e.to_string()))?;
        Self::from_document(inner)
    }

    pub fn from_document(inner: Document) -> Result<Self, DocumentError> {
        let catalog = catalog_ocgs(&inner);
        let acroform = acroform_fields(&inner);
        let mut pages = Vec::new();
        for (number, page) in inner.get_pages() {
            let streams = page_streams(&inner, page);
            let mut content = Vec::new();
            for (_, bytes) in &streams {
                content.extend_from_slice(bytes);
                content.push(b'\n');
            }
            let (layers, stream_markers) = page_layers(&inner, number, page, &streams, &content, &catalog);
            let media_box = inherited(&inner, page, b"MediaBox")
                .and_then(|m| rect(&inner, m))
                .unwrap_or([0.0, 0.0, 612.0, 792.0]);
            let images = inherited(&inner, page, b"Resources")
                .and_then(|r| resolve_dict(&inner, r))
                .map(|res| image_inventory(&inner, res))
                .unwrap_or_default();
            debug!(page = number, layers = layers.len(), images = images.len(), "page layers enumerated");
            pages.push(PageLayers { number, object: page, media_box, layers, images, content, stream_markers });
        }
        if pages.is_empty() {
            return Err(DocumentError::NoPages);
        }
        Ok(Self { inner, pages, catalog_ocgs: catalog, acroform_fields: acroform })
    }

    pub fn pages(&self) -> &[PageLayers] {
        &self.pages
    }

    pub fn page_count(&self) -> usize {
        self.pages.len()
    }

    pub fn catalog_ocg_names(&self) -> impl Iterator<Item = &str> {
        self.catalog_ocgs.iter().map(|(_, n)| n.as_str())
    }

    /// Number of `/Fields` in the catalog's `/AcroForm`, `None` without a form.
    pub fn acroform_fields(&self) -> Option<usize> {
        self.acroform_fields
    }

    /// Underlying object model, for rasterizers that paint from it.
    pub fn inner(&self) -> &Document {
        &self.inner
    }
}
