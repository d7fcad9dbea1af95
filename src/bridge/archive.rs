//! Export bundles
//!
//! A bundle is a zip holding the workbook plus a `DATA/` folder with every
//! image as a standalone file (`{n}_Before.{ext}`, `{n}_After.{ext}`). Reading
//! a bundle parses the workbook and reattaches the images in one step.

use chrono::{DateTime, Utc};
use std::io::{Cursor, Read, Write};
use tracing::{debug, info};
use zip::{write::FileOptions, CompressionMethod, ZipArchive, ZipWriter};

use super::reattach::{image_file_name, reattach_images, ReattachReport};
use super::spreadsheet::{read_workbook, write_workbook};
use crate::error::{ExportError, ImportParseError};
use crate::state::data::{ImageSide, PromptEntry};

/// Folder inside the bundle holding the images
pub const IMAGE_FOLDER: &str = "DATA";

/// A named, downloadable file
#[derive(Debug, Clone)]
pub struct ExportFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

/// Build the workbook and the zip bundle around it
pub fn build_bundle(entries: &[PromptEntry], now: DateTime<Utc>) -> Result<ExportFile, ExportError> {
    if entries.is_empty() {
        return Err(ExportError::Empty);
    }

    let stamp = now.format("%Y-%m-%d");
    let workbook = write_workbook(entries)?;

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut zip = ZipWriter::new(&mut cursor);
        let deflated = FileOptions::default().compression_method(CompressionMethod::Deflated);
        // Image payloads are already compressed
        let stored = FileOptions::default().compression_method(CompressionMethod::Stored);

        zip.start_file(format!("Prompt_Gallery_{}.xlsx", stamp), deflated)?;
        zip.write_all(&workbook)?;

        let mut image_count = 0;
        for (i, entry) in entries.iter().enumerate() {
            for side in [ImageSide::Before, ImageSide::After] {
                if let Some(image) = entry.image(side) {
                    let path = format!("{}/{}", IMAGE_FOLDER, image_file_name(i + 1, side, image));
                    zip.start_file(path, stored)?;
                    zip.write_all(image.bytes())?;
                    image_count += 1;
                }
            }
        }

        zip.finish()?;
        info!(entries = entries.len(), images = image_count, "Bundle built");
    }

    Ok(ExportFile {
        file_name: format!("Prompt_Gallery_{}.zip", stamp),
        bytes: cursor.into_inner(),
    })
}

/// Entries recovered from a bundle, images attached
#[derive(Debug, Default)]
pub struct BundleImport {
    pub entries: Vec<PromptEntry>,
    pub skipped_rows: usize,
    pub images: ReattachReport,
}

/// Read a bundle produced by `build_bundle`
pub fn read_bundle(bytes: &[u8], now: DateTime<Utc>) -> Result<BundleImport, ImportParseError> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;

    let mut workbook: Option<Vec<u8>> = None;
    let mut images = Vec::new();

    for i in 0..archive.len() {
        let mut file = archive.by_index(i)?;
        if file.is_dir() {
            continue;
        }
        let name = file.name().to_string();
        // Skip resource-fork litter from macOS archivers
        if name.starts_with("__MACOSX/") {
            continue;
        }

        let mut buffer = Vec::new();
        file.read_to_end(&mut buffer)?;

        if name.to_ascii_lowercase().ends_with(".xlsx") {
            if workbook.is_none() {
                debug!(file = %name, "Found workbook in bundle");
                workbook = Some(buffer);
            }
        } else {
            images.push((name, buffer));
        }
    }

    let workbook = workbook.ok_or(ImportParseError::MissingSpreadsheet)?;
    let sheet = read_workbook(&workbook, now)?;

    let mut entries = sheet.entries;
    let report = reattach_images(&mut entries, images);

    Ok(BundleImport {
        entries,
        skipped_rows: sheet.skipped_rows,
        images: report,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::embedded::tests::png_bytes;
    use crate::media::EmbeddedImage;

    fn entry(prompt: &str, before: bool, after: bool) -> PromptEntry {
        let mut e = PromptEntry::new(prompt, Utc::now());
        if before {
            e.before_image = Some(EmbeddedImage::from_bytes(png_bytes(3, 2)).unwrap());
        }
        if after {
            e.after_image = Some(EmbeddedImage::from_bytes(png_bytes(2, 3)).unwrap());
        }
        e
    }

    fn names(bytes: &[u8]) -> Vec<String> {
        let archive = ZipArchive::new(Cursor::new(bytes)).unwrap();
        let mut names: Vec<String> = archive.file_names().map(str::to_string).collect();
        names.sort();
        names
    }

    #[test]
    fn test_bundle_layout() {
        let entries = vec![entry("one", true, false), entry("two", true, true)];
        let now = chrono::TimeZone::with_ymd_and_hms(&Utc, 2024, 6, 7, 0, 0, 0).unwrap();
        let bundle = build_bundle(&entries, now).unwrap();

        assert_eq!(bundle.file_name, "Prompt_Gallery_2024-06-07.zip");
        assert_eq!(
            names(&bundle.bytes),
            vec![
                "DATA/1_Before.png",
                "DATA/2_After.png",
                "DATA/2_Before.png",
                "Prompt_Gallery_2024-06-07.xlsx",
            ]
        );
    }

    #[test]
    fn test_empty_export_rejected() {
        assert!(matches!(build_bundle(&[], Utc::now()), Err(ExportError::Empty)));
    }

    #[test]
    fn test_bundle_roundtrip_restores_images() {
        let entries = vec![entry("one", true, false), entry("two", false, true)];
        let bundle = build_bundle(&entries, Utc::now()).unwrap();

        let import = read_bundle(&bundle.bytes, Utc::now()).unwrap();
        assert_eq!(import.entries.len(), 2);
        assert_eq!(import.images.attached, 2);
        assert_eq!(import.entries[0].before_image, entries[0].before_image);
        assert!(import.entries[0].after_image.is_none());
        assert_eq!(import.entries[1].after_image, entries[1].after_image);
    }

    #[test]
    fn test_bundle_without_workbook() {
        let mut cursor = Cursor::new(Vec::new());
        {
            let mut zip = ZipWriter::new(&mut cursor);
            zip.start_file("DATA/1_Before.png", FileOptions::default()).unwrap();
            zip.write_all(&png_bytes(1, 1)).unwrap();
            zip.finish().unwrap();
        }
        let err = read_bundle(&cursor.into_inner(), Utc::now()).unwrap_err();
        assert!(matches!(err, ImportParseError::MissingSpreadsheet));
    }
}
