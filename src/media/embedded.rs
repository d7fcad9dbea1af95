//! Embedded images stored inline on entries
//!
//! An embedded image is self-describing: it carries its MIME type next to the
//! raw encoded bytes, and is persisted as a `data:` URL string. Pixel
//! dimensions and byte size are never stored; they are derived on demand by
//! probing the encoded header.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use image::{ImageFormat, ImageReader};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;

use crate::error::ImageLoadError;

/// An encoded image (PNG, JPEG, ...) with its MIME type
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct EmbeddedImage {
    mime: String,
    bytes: Vec<u8>,
}

/// Derived, non-persisted image metadata
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ImageMeta {
    pub width: u32,
    pub height: u32,
    pub byte_size: usize,
}

impl EmbeddedImage {
    /// Wrap encoded bytes, sniffing the format from the magic number
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, ImageLoadError> {
        let format = image::guess_format(&bytes).map_err(|_| ImageLoadError::UnknownFormat)?;
        Ok(Self {
            mime: format.to_mime_type().to_string(),
            bytes,
        })
    }

    /// Parse a `data:<mime>;base64,<payload>` URL
    pub fn from_data_url(url: &str) -> Result<Self, ImageLoadError> {
        let rest = url
            .strip_prefix("data:")
            .ok_or_else(|| ImageLoadError::Malformed("missing data: prefix".to_string()))?;
        let (header, payload) = rest
            .split_once(',')
            .ok_or_else(|| ImageLoadError::Malformed("missing payload separator".to_string()))?;
        let mime = header
            .strip_suffix(";base64")
            .ok_or_else(|| ImageLoadError::Malformed("only base64 payloads are supported".to_string()))?;
        if !mime.starts_with("image/") {
            return Err(ImageLoadError::Malformed(format!("not an image type: {}", mime)));
        }

        let bytes = STANDARD
            .decode(payload.trim())
            .map_err(|e| ImageLoadError::Malformed(e.to_string()))?;

        Ok(Self {
            mime: mime.to_string(),
            bytes,
        })
    }

    /// Encode as a `data:` URL (the persisted form)
    pub fn to_data_url(&self) -> String {
        format!("data:{};base64,{}", self.mime, STANDARD.encode(&self.bytes))
    }

    pub fn mime(&self) -> &str {
        &self.mime
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Size of the encoded payload in bytes
    pub fn byte_size(&self) -> usize {
        self.bytes.len()
    }

    /// The decoder format, if the MIME type is one `image` understands
    pub fn format(&self) -> Option<ImageFormat> {
        ImageFormat::from_mime_type(&self.mime)
    }

    /// File extension hint used when writing the image out ("png", "jpg", ...)
    pub fn extension(&self) -> String {
        if let Some(ext) = self.format().and_then(|f| f.extensions_str().first().copied()) {
            return ext.to_string();
        }

        // Fall back to the MIME subtype ("image/svg+xml" -> "svg")
        let subtype = self.mime.trim_start_matches("image/");
        subtype
            .split(|c: char| !c.is_ascii_alphanumeric())
            .next()
            .filter(|s| !s.is_empty())
            .unwrap_or("bin")
            .to_ascii_lowercase()
    }

    /// Pixel dimensions, read from the encoded header without a full decode
    pub fn dimensions(&self) -> Result<(u32, u32), ImageLoadError> {
        let reader = ImageReader::new(Cursor::new(&self.bytes)).with_guessed_format()?;
        Ok(reader.into_dimensions()?)
    }

    /// Dimensions and byte size together
    pub fn meta(&self) -> Result<ImageMeta, ImageLoadError> {
        let (width, height) = self.dimensions()?;
        Ok(ImageMeta {
            width,
            height,
            byte_size: self.byte_size(),
        })
    }
}

impl TryFrom<String> for EmbeddedImage {
    type Error = ImageLoadError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_data_url(&value)
    }
}

impl From<EmbeddedImage> for String {
    fn from(image: EmbeddedImage) -> Self {
        image.to_data_url()
    }
}

// Keep multi-megabyte payloads out of debug output
impl fmt::Debug for EmbeddedImage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EmbeddedImage")
            .field("mime", &self.mime)
            .field("byte_size", &self.bytes.len())
            .finish()
    }
}

impl fmt::Display for ImageMeta {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} x {} px, {}",
            self.width,
            self.height,
            format_byte_size(self.byte_size)
        )
    }
}

/// Human-readable byte size ("512 B", "12.3 KB", "1.50 MB")
pub fn format_byte_size(bytes: usize) -> String {
    const KB: f64 = 1024.0;
    const MB: f64 = KB * 1024.0;

    let value = bytes as f64;
    if value < KB {
        format!("{} B", bytes)
    } else if value < MB {
        format!("{:.1} KB", value / KB)
    } else {
        format!("{:.2} MB", value / MB)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use image::{ImageBuffer, Rgb};

    /// Encode a solid-colour PNG of the given size
    pub(crate) fn png_bytes(width: u32, height: u32) -> Vec<u8> {
        let buffer = ImageBuffer::from_pixel(width, height, Rgb([200u8, 40, 90]));
        let mut out = Cursor::new(Vec::new());
        image::DynamicImage::ImageRgb8(buffer)
            .write_to(&mut out, ImageFormat::Png)
            .unwrap();
        out.into_inner()
    }

    #[test]
    fn test_sniffs_png() {
        let image = EmbeddedImage::from_bytes(png_bytes(4, 3)).unwrap();
        assert_eq!(image.mime(), "image/png");
        assert_eq!(image.extension(), "png");
        assert_eq!(image.dimensions().unwrap(), (4, 3));
    }

    #[test]
    fn test_rejects_unknown_bytes() {
        let result = EmbeddedImage::from_bytes(b"definitely not an image".to_vec());
        assert!(matches!(result, Err(ImageLoadError::UnknownFormat)));
    }

    #[test]
    fn test_data_url_serde() {
        let image = EmbeddedImage::from_bytes(png_bytes(2, 2)).unwrap();
        let json = serde_json::to_string(&image).unwrap();
        assert!(json.starts_with("\"data:image/png;base64,"));

        let restored: EmbeddedImage = serde_json::from_str(&json).unwrap();
        assert_eq!(restored, image);
    }

    #[test]
    fn test_malformed_data_url() {
        assert!(EmbeddedImage::from_data_url("http://example.com/a.png").is_err());
        assert!(EmbeddedImage::from_data_url("data:text/plain;base64,aGk=").is_err());
        assert!(EmbeddedImage::from_data_url("data:image/png,raw").is_err());
    }

    #[test]
    fn test_extension_fallback() {
        let image = EmbeddedImage::from_data_url("data:image/svg+xml;base64,PHN2Zz4=").unwrap();
        assert_eq!(image.extension(), "svg");
    }

    #[test]
    fn test_meta_display() {
        let image = EmbeddedImage::from_bytes(png_bytes(10, 5)).unwrap();
        let meta = image.meta().unwrap();
        assert_eq!((meta.width, meta.height), (10, 5));
        assert!(meta.to_string().starts_with("10 x 5 px, "));
    }

    #[test]
    fn test_format_byte_size() {
        assert_eq!(format_byte_size(512), "512 B");
        assert_eq!(format_byte_size(2048), "2.0 KB");
        assert_eq!(format_byte_size(3 * 1024 * 1024), "3.00 MB");
    }
}
