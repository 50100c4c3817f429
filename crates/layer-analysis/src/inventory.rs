use lopdf::{Dictionary, Document};
use serde::{Deserialize, Serialize};

use crate::document::{number, resolve, resolve_dict};

/// Images narrower or shorter than this many samples look like pasted patches.
pub const PATCH_MAX_SIDE: u32 = 50;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageInfo {
    pub name: String,
    pub object: Option<(u32, u16)>,
    pub width: u32,
    pub height: u32,
    pub bytes: usize,
    pub suspicious: bool,
}

pub fn is_patch(width: u32, height: u32) -> bool {
    width < PATCH_MAX_SIDE || height < PATCH_MAX_SIDE
}

/// Image XObjects referenced directly from a resource dictionary.
pub fn image_inventory(doc: &Document, resources: &Dictionary) -> Vec<ImageInfo> {
    let Some(xobjects) = resources.get(b"XObject").ok().and_then(|x| resolve_dict(doc, x)) else {
        return Vec::new();
    };
    let mut out = Vec::new();
    for (key, entry) in xobjects.iter() {
        let Some(lopdf::Object::Stream(stream)) = resolve(doc, entry) else { continue };
        let is_image = matches!(stream.dict.get(b"Subtype"), Ok(lopdf::Object::Name(n)) if n.as_slice() == b"Image");
        if !is_image {
            continue;
        }
        let dim = |k: &[u8]| {
            stream
                .dict
                .get(k)
                .ok()
                .and_then(|v| resolve(doc, v))
                .and_then(number)
                .map(|v| v.max(0.0) as u32)
                .unwrap_or(0)
        };
        let (width, height) = (dim(b"Width"), dim(b"Height"));
        out.push(ImageInfo {
            name: String::from_utf8_lossy(key).into_owned(),
            object: entry.as_reference().ok(),
            width,
            height,
            bytes: stream.content.len(),
            suspicious: is_patch(width, height),
        });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn small_side_marks_a_patch() {
        assert!(is_patch(49, 400));
        assert!(is_patch(400, 12));
        assert!(!is_patch(50, 50));
    }
}
