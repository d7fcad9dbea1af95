//! Image reattachment
//!
//! Spreadsheet import never reads images. They come back from loose files
//! named `{n}_Before.{ext}` / `{n}_After.{ext}` (case-insensitive), where `n`
//! is the 1-based row position of the entry.

use regex::Regex;
use std::path::Path;
use std::sync::LazyLock;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use crate::media::EmbeddedImage;
use crate::state::data::{ImageSide, PromptEntry};

static IMAGE_FILE_NAME: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)^(\d+)_(before|after)\.([a-z0-9]+)$")
        .expect("Invalid regex pattern for image file names")
});

/// Name of the image file for entry `index` (1-based)
pub fn image_file_name(index: usize, side: ImageSide, image: &EmbeddedImage) -> String {
    format!("{}_{}.{}", index, side.label(), image.extension())
}

/// Parse `{n}_{Before|After}.{ext}` into (n, side)
///
/// Only the final path component is considered, so "DATA/2_after.PNG" works.
pub fn parse_image_file_name(name: &str) -> Option<(usize, ImageSide)> {
    let file_name = name.rsplit(['/', '\\']).next().unwrap_or(name);
    let captures = IMAGE_FILE_NAME.captures(file_name)?;

    let index: usize = captures[1].parse().ok()?;
    let side = if captures[2].eq_ignore_ascii_case("before") {
        ImageSide::Before
    } else {
        ImageSide::After
    };
    Some((index, side))
}

/// Outcome of a reattachment pass
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ReattachReport {
    /// Images placed onto entries
    pub attached: usize,
    /// Files whose name didn't match or whose index has no entry
    pub unmatched: Vec<String>,
    /// Matching files that aren't decodable images
    pub invalid: Vec<String>,
}

/// Attach each matching file to the entry at its 1-based position
///
/// Entries (and sides) with no matching file are left untouched.
pub fn reattach_images<I>(entries: &mut [PromptEntry], files: I) -> ReattachReport
where
    I: IntoIterator<Item = (String, Vec<u8>)>,
{
    let mut report = ReattachReport::default();

    for (name, bytes) in files {
        let Some((index, side)) = parse_image_file_name(&name) else {
            report.unmatched.push(name);
            continue;
        };
        let Some(entry) = index.checked_sub(1).and_then(|i| entries.get_mut(i)) else {
            debug!(file = %name, index, "No entry at this position");
            report.unmatched.push(name);
            continue;
        };

        match EmbeddedImage::from_bytes(bytes) {
            Ok(image) => {
                entry.set_image(side, Some(image));
                report.attached += 1;
            }
            Err(e) => {
                warn!(file = %name, error = %e, "Skipping unreadable image");
                report.invalid.push(name);
            }
        }
    }

    info!(
        attached = report.attached,
        unmatched = report.unmatched.len(),
        invalid = report.invalid.len(),
        "Reattached images"
    );
    report
}

/// Read every `{n}_{Before|After}.{ext}` file under `folder` (recursively)
///
/// Other files are ignored. Results are sorted by file name.
pub fn collect_folder_images(folder: &Path) -> std::io::Result<Vec<(String, Vec<u8>)>> {
    let mut files = Vec::new();

    // Walk the directory tree recursively
    for entry in WalkDir::new(folder)
        .follow_links(true)
        .into_iter()
        .filter_map(|e| e.ok())
    {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }

        let file_name = entry.file_name().to_string_lossy().to_string();
        if parse_image_file_name(&file_name).is_none() {
            continue;
        }

        files.push((file_name, std::fs::read(path)?));
    }

    files.sort_by(|a, b| a.0.cmp(&b.0));
    debug!(folder = %folder.display(), count = files.len(), "Collected image files");
    Ok(files)
}
