use serde::{Deserialize, Serialize};

const ROUND_WIDTHS: [u32; 4] = [900, 1080, 1200, 1600];
const ROUND_HEIGHTS: [u32; 5] = [600, 900, 1200, 1600, 1920];

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
#[serde(default)]
pub struct ScreenshotOptions {
    pub min_line_density: f64,
    pub min_text_boxes: usize,
}

impl Default for ScreenshotOptions {
    fn default() -> Self {
        Self { min_line_density: 0.2, min_text_boxes: 5 }
    }
}

/// Facts gathered by the other analyzers that the screenshot test needs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct ScreenshotEvidence {
    pub width: u32,
    pub height: u32,
    pub line_density: f64,
    pub has_exif: bool,
    pub text_boxes: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScreenshotVerdict {
    pub round_resolution: bool,
    pub dense_lines: bool,
    pub no_exif: bool,
    pub many_text_boxes: bool,
}

impl ScreenshotVerdict {
    pub fn is_screenshot(&self) -> bool {
        self.round_resolution && self.dense_lines && self.no_exif && self.many_text_boxes
    }

    pub fn image_kind(&self) -> &'static str {
        if self.is_screenshot() {
            "screenshot/web"
        } else {
            "imagen_normal"
        }
    }
}

/// Recompressed web captures come in display-sized resolutions, are full of
/// UI lines and text, and carry no camera metadata.
pub fn classify_screenshot(ev: &ScreenshotEvidence, opts: &ScreenshotOptions) -> ScreenshotVerdict {
    ScreenshotVerdict {
        round_resolution: ROUND_WIDTHS.contains(&ev.width) && ROUND_HEIGHTS.contains(&ev.height),
        dense_lines: ev.line_density > opts.min_line_density,
        no_exif: !ev.has_exif,
        many_text_boxes: ev.text_boxes > opts.min_text_boxes,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn web_capture() -> ScreenshotEvidence {
        ScreenshotEvidence { width: 1080, height: 1920, line_density: 0.5, has_exif: false, text_boxes: 12 }
    }

    #[test]
    fn web_capture_is_screenshot() {
        let v = classify_screenshot(&web_capture(), &ScreenshotOptions::default());
        assert!(v.is_screenshot());
        assert_eq!(v.image_kind(), "screenshot/web");
    }

    #[test]
    fn camera_photo_is_not() {
        let ev = ScreenshotEvidence { has_exif: true, ..web_capture() };
        assert!(!classify_screenshot(&ev, &ScreenshotOptions::default()).is_screenshot());
        let odd = ScreenshotEvidence { width: 1081, ..web_capture() };
        assert_eq!(classify_screenshot(&odd, &ScreenshotOptions::default()).image_kind(), "imagen_normal");
    }
}
