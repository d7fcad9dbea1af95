//! Error kinds for the catalog
//!
//! Every failure in the catalog is terminal for the single user action that
//! caused it. Nothing here is retried; callers report the error and the user
//! tries again.

use thiserror::Error;

/// Result alias used across the library
pub type Result<T, E = GalleryError> = std::result::Result<T, E>;

/// Entry Editor validation failures (save is blocked, nothing changes)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("prompt text is required")]
    MissingPrompt,
    #[error("at least one image (before or after) is required")]
    MissingImage,
}

impl ValidationError {
    /// Name of the editor field the error should be shown next to
    pub fn field(&self) -> &'static str {
        match self {
            ValidationError::MissingPrompt => "prompt",
            ValidationError::MissingImage => "image",
        }
    }
}

/// Storage read/write failures
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("storage quota exceeded: {needed} bytes requested, {quota} allowed")]
    QuotaExceeded { needed: usize, quota: usize },
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),
    #[error("failed to serialize entries: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error("storage I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Spreadsheet or bundle could not be read
#[derive(Debug, Error)]
pub enum ImportParseError {
    #[error("could not open workbook: {0}")]
    Workbook(String),
    #[error("workbook has no '{0}' worksheet")]
    MissingWorksheet(String),
    #[error("bundle does not contain a spreadsheet")]
    MissingSpreadsheet,
    #[error("could not read bundle: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("import I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// An image could not be loaded or decoded
#[derive(Debug, Error)]
pub enum ImageLoadError {
    #[error("could not read image file: {0}")]
    Io(#[from] std::io::Error),
    #[error("could not fetch image: {0}")]
    Fetch(#[from] reqwest::Error),
    #[error("remote server answered {0}")]
    Status(u16),
    #[error("not a recognised image format")]
    UnknownFormat,
    #[error("could not decode image: {0}")]
    Decode(#[from] image::ImageError),
    #[error("malformed embedded image: {0}")]
    Malformed(String),
    #[error("image task failed: {0}")]
    Task(String),
}

/// A PDF, workbook or archive could not be produced
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("nothing to export")]
    Empty,
    #[error("spreadsheet generation failed: {0}")]
    Spreadsheet(#[from] rust_xlsxwriter::XlsxError),
    #[error("PDF generation failed: {0}")]
    Pdf(String),
    #[error("archive generation failed: {0}")]
    Archive(#[from] zip::result::ZipError),
    #[error("export I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Top-level error wrapping every kind
#[derive(Debug, Error)]
pub enum GalleryError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error(transparent)]
    ImportParse(#[from] ImportParseError),
    #[error(transparent)]
    ImageLoad(#[from] ImageLoadError),
    #[error(transparent)]
    Export(#[from] ExportError),
    #[error("no entry with id {0}")]
    NotFound(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_cites_field() {
        assert_eq!(ValidationError::MissingPrompt.field(), "prompt");
        assert_eq!(ValidationError::MissingImage.field(), "image");
    }

    #[test]
    fn test_wraps_into_gallery_error() {
        let err: GalleryError = ValidationError::MissingImage.into();
        assert!(matches!(err, GalleryError::Validation(ValidationError::MissingImage)));
        assert_eq!(err.to_string(), "at least one image (before or after) is required");
    }
}
