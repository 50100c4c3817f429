use std::io::Cursor;

use image::{GrayImage, ImageFormat, ImageReader, Limits};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Decode limits applied before any pixel work starts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoaderOptions {
    pub max_dimension: u32,
    pub max_pixels: u64,
    pub max_input_bytes: usize,
}

impl Default for LoaderOptions {
    fn default() -> Self {
        Self {
            max_dimension: 20_000,
            max_pixels: 100_000_000,
            max_input_bytes: 64 * 1024 * 1024,
        }
    }
}

/// Decoded grayscale samples plus the container facts the analyzers need.
#[derive(Debug, Clone)]
pub struct PixelBuffer {
    pub width: u32,
    pub height: u32,
    pub gray: GrayImage,
    /// The container carried an EXIF block.
    pub has_exif: bool,
    pub format: ImageFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub enum PixelError {
    Empty,
    /// Input exceeds `max_input_bytes`.
    InputTooLarge { size: usize, limit: usize },
    UnknownFormat,
    DimensionsExceeded { width: u32, height: u32 },
    Decode(String),
}

impl std::fmt::Display for PixelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Empty => write!(f, "empty image input"),
            Self::InputTooLarge { size, limit } => {
                write!(f, "input {} bytes exceeds limit {} bytes", size, limit)
            }
            Self::UnknownFormat => write!(f, "unrecognised image format"),
            Self::DimensionsExceeded { width, height } => {
                write!(f, "image {}x{} exceeds decode limits", width, height)
            }
            Self::Decode(s) => write!(f, "decode failed: {}", s),
        }
    }
}

impl std::error::Error for PixelError {}

/// Decode `bytes` into an 8-bit grayscale buffer (ITU-R 601 luma).
pub fn load_pixels(bytes: &[u8], opts: &LoaderOptions) -> Result<PixelBuffer, PixelError> {
    if bytes.is_empty() {
        return Err(PixelError::Empty);
    }
    if bytes.len() > opts.max_input_bytes {
        return Err(PixelError::InputTooLarge { size: bytes.len(), limit: opts.max_input_bytes });
    }
    let format = image::guess_format(bytes).map_err(|_| PixelError::UnknownFormat)?;

    let (width, height) = ImageReader::with_format(Cursor::new(bytes), format)
        .into_dimensions()
        .map_err(|e| PixelError::Decode(e.to_string()))?;
    if width == 0 || height == 0 {
        return Err(PixelError::Empty);
    }
    if width > opts.max_dimension
        || height > opts.max_dimension
        || width as u64 * height as u64 > opts.max_pixels
    {
        return Err(PixelError::DimensionsExceeded { width, height });
    }

    let mut limits = Limits::default();
    limits.max_image_width = Some(opts.max_dimension);
    limits.max_image_height = Some(opts.max_dimension);
    let mut reader = ImageReader::with_format(Cursor::new(bytes), format);
    reader.limits(limits);
    let decoded = reader.decode().map_err(|e| PixelError::Decode(e.to_string()))?;
    let gray = decoded.to_luma8();
    let has_exif = has_exif_block(bytes);
    debug!(width, height, ?format, has_exif, "decoded image");
    Ok(PixelBuffer { width, height, gray, has_exif, format })
}

/// Wrap an already-decoded buffer, e.g. a rendered page.
pub fn from_gray(gray: GrayImage) -> PixelBuffer {
    PixelBuffer {
        width: gray.width(),
        height: gray.height(),
        gray,
        has_exif: false,
        format: ImageFormat::Png,
    }
}

/// Wrap raw 8-bit luma samples; `None` when the length does not match.
pub fn from_luma(width: u32, height: u32, data: Vec<u8>) -> Option<PixelBuffer> {
    GrayImage::from_raw(width, height, data).map(from_gray)
}

fn has_exif_block(bytes: &[u8]) -> bool {
    let mut cursor = Cursor::new(bytes);
    exif::Reader::new().read_from_container(&mut cursor).is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::Luma;

    fn png_bytes(w: u32, h: u32) -> Vec<u8> {
        let img = GrayImage::from_pixel(w, h, Luma([200]));
        let mut out = Cursor::new(Vec::new());
        img.write_to(&mut out, ImageFormat::Png).expect("encode png");
        out.into_inner()
    }

    #[test]
    fn decodes_png_to_gray() {
        let buf = load_pixels(&png_bytes(20, 10), &LoaderOptions::default()).expect("load");
        assert_eq!((buf.width, buf.height), (20, 10));
        assert_eq!(buf.gray.get_pixel(3, 3).0[0], 200);
        assert!(!buf.has_exif);
        assert_eq!(buf.format, ImageFormat::Png);
    }

    #[test]
    fn rejects_garbage() {
        assert_eq!(load_pixels(b"", &LoaderOptions::default()).unwrap_err(), PixelError::Empty);
        assert_eq!(
            load_pixels(b"not an image at all", &LoaderOptions::default()).unwrap_err(),
            PixelError::UnknownFormat
        );
    }

    #[test]
    fn enforces_dimension_limit() {
        let opts = LoaderOptions { max_dimension: 16, ..LoaderOptions::default() };
        let err = load_pixels(&png_bytes(20, 10), &opts).unwrap_err();
        assert_eq!(err, PixelError::DimensionsExceeded { width: 20, height: 10 });
    }
}
