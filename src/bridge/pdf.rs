//! PDF reports
//!
//! Single-entry export renders one entry: header, model/tags line,
//! parameter table, the full prompt, and both images annotated with pixel
//! dimensions and byte size.
//!
//! Batch export adds a cover page and a summary table before the
//! per-entry pages, and caps each prompt at a fixed number of lines.
//!
//! Every page is stamped with a footer and "Page i of n" once layout is done.
//!
//! Text uses the PDF builtin fonts, which only cover Latin-1; other
//! characters are replaced with '?'.

use chrono::{DateTime, Utc};
use printpdf::image_crate::{self, imageops::FilterType, DynamicImage, GenericImageView};
use printpdf::{
    BuiltinFont, Image, ImageTransform, IndirectFontRef, Mm, PdfDocument, PdfDocumentReference,
    PdfLayerReference,
};
use tracing::{debug, info, warn};

use super::archive::ExportFile;
use crate::error::ExportError;
use crate::media::{format_byte_size, EmbeddedImage};
use crate::state::data::{ImageSide, PromptEntry};
use crate::state::view::favorites_count;

// ========== Page geometry (mm) ==========

const PAGE_WIDTH: f32 = 210.0;
const PAGE_HEIGHT: f32 = 297.0;
const MARGIN: f32 = 15.0;
const FOOTER_HEIGHT: f32 = 12.0;
const CONTENT_WIDTH: f32 = PAGE_WIDTH - 2.0 * MARGIN;

/// Box each of the two images is fitted into
const IMAGE_BOX_WIDTH: f32 = (CONTENT_WIDTH - 10.0) / 2.0;
const IMAGE_BOX_HEIGHT: f32 = 85.0;

/// Longest side of an image as embedded in the PDF
const MAX_EMBED_PX: u32 = 1200;

/// Points to millimetres
const PT_TO_MM: f32 = 0.3528;

// ========== Batch limits ==========

/// Prompt lines printed per entry in batch mode
pub const BATCH_PROMPT_LINES: usize = 25;
/// Tag text shown per row of the batch summary table
const SUMMARY_TAG_CHARS: usize = 40;

/// Export one entry as its own PDF
pub fn export_entry(entry: &PromptEntry, now: DateTime<Utc>) -> Result<ExportFile, ExportError> {
    let mut writer = PdfWriter::new("Prompt Entry")?;
    writer.entry_details(entry, None, None);

    let bytes = writer.finish(&format!("Prompt Gallery - exported {}", now.format("%Y-%m-%d %H:%M")))?;
    info!(id = %entry.id, size = bytes.len(), "Entry PDF written");

    Ok(ExportFile {
        file_name: format!(
            "prompt_{}_{}.pdf",
            entry.created_at.format("%Y-%m-%d"),
            entry.short_id()
        ),
        bytes,
    })
}

/// Export many entries as one report
pub fn export_batch(entries: &[PromptEntry], now: DateTime<Utc>) -> Result<ExportFile, ExportError> {
    if entries.is_empty() {
        return Err(ExportError::Empty);
    }

    let mut writer = PdfWriter::new("Prompt Gallery Report")?;

    // Cover page
    writer.gap(60.0);
    writer.line("Prompt Gallery Report", 26.0, Style::Bold);
    writer.gap(6.0);
    writer.line(&format!("{} entries", entries.len()), 14.0, Style::Regular);
    writer.line(&format!("{} favorites", favorites_count(entries)), 14.0, Style::Regular);
    writer.line(&format!("Exported {}", now.format("%Y-%m-%d %H:%M")), 12.0, Style::Regular);

    // Summary table
    writer.new_page();
    writer.line("Summary", 16.0, Style::Bold);
    writer.gap(2.0);
    let rows: Vec<Vec<String>> = entries
        .iter()
        .enumerate()
        .map(|(i, e)| {
            vec![
                (i + 1).to_string(),
                e.model.clone().unwrap_or_else(|| "-".to_string()),
                truncate_chars(&e.tags.join(", "), SUMMARY_TAG_CHARS),
                e.created_at.format("%Y-%m-%d").to_string(),
                if e.is_favorite { "*".to_string() } else { String::new() },
            ]
        })
        .collect();
    writer.table(&["#", "Model", "Tags", "Date", "Fav"], &[12.0, 45.0, 80.0, 28.0, 15.0], &rows);

    // Details
    for (i, entry) in entries.iter().enumerate() {
        writer.new_page();
        writer.entry_details(entry, Some(i + 1), Some(BATCH_PROMPT_LINES));
    }

    let bytes = writer.finish(&format!("Prompt Gallery report - {}", now.format("%Y-%m-%d")))?;
    info!(entries = entries.len(), size = bytes.len(), "Batch PDF written");

    Ok(ExportFile {
        file_name: format!("prompt_report_{}.pdf", now.format("%Y-%m-%d")),
        bytes,
    })
}

#[derive(Debug, Clone, Copy)]
enum Style {
    Regular,
    Bold,
    Mono,
}

/// Cursor-based page layout over a printpdf document
struct PdfWriter {
    doc: PdfDocumentReference,
    layers: Vec<PdfLayerReference>,
    regular: IndirectFontRef,
    bold: IndirectFontRef,
    mono: IndirectFontRef,
    /// Baseline of the next line, measured from the bottom edge
    y: f32,
}

impl PdfWriter {
    fn new(title: &str) -> Result<Self, ExportError> {
        let (doc, page, layer) = PdfDocument::new(title, Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        let font = |f: BuiltinFont| doc.add_builtin_font(f).map_err(|e| ExportError::Pdf(e.to_string()));

        let regular = font(BuiltinFont::Helvetica)?;
        let bold = font(BuiltinFont::HelveticaBold)?;
        let mono = font(BuiltinFont::Courier)?;
        let first = doc.get_page(page).get_layer(layer);

        Ok(Self {
            doc,
            layers: vec![first],
            regular,
            bold,
            mono,
            y: PAGE_HEIGHT - MARGIN,
        })
    }

    fn layer(&self) -> PdfLayerReference {
        // layers is never empty: new() pushes the first page
        self.layers[self.layers.len() - 1].clone()
    }

    fn font(&self, style: Style) -> &IndirectFontRef {
        match style {
            Style::Regular => &self.regular,
            Style::Bold => &self.bold,
            Style::Mono => &self.mono,
        }
    }

    fn new_page(&mut self) {
        let (page, layer) = self.doc.add_page(Mm(PAGE_WIDTH), Mm(PAGE_HEIGHT), "Layer 1");
        self.layers.push(self.doc.get_page(page).get_layer(layer));
        self.y = PAGE_HEIGHT - MARGIN;
    }

    /// Break the page if fewer than `needed` mm remain above the footer
    fn ensure_space(&mut self, needed: f32) {
        if self.y - needed < MARGIN + FOOTER_HEIGHT {
            self.new_page();
        }
    }

    fn gap(&mut self, mm: f32) {
        self.y -= mm;
    }

    fn text_at(&self, text: &str, size: f32, style: Style, x: f32, y: f32) {
        self.layer()
            .use_text(sanitize(text), size, Mm(x), Mm(y), self.font(style));
    }

    /// One line at the left margin
    fn line(&mut self, text: &str, size: f32, style: Style) {
        let height = line_height(size);
        self.ensure_space(height);
        self.y -= height;
        self.text_at(text, size, style, MARGIN, self.y);
    }

    /// Word-wrapped paragraph(s); returns true if lines were cut
    fn paragraph(&mut self, text: &str, size: f32, style: Style, max_lines: Option<usize>) -> bool {
        let lines = wrap_text(text, chars_per_line(CONTENT_WIDTH, size, style));
        let (lines, truncated) = match max_lines {
            Some(budget) => truncate_lines(lines, budget),
            None => (lines, false),
        };

        for line in &lines {
            self.line(line, size, style);
        }
        if truncated {
            self.line("(truncated)", size, Style::Bold);
        }
        truncated
    }

    /// Simple table; header row repeats after page breaks
    fn table(&mut self, headers: &[&str], widths: &[f32], rows: &[Vec<String>]) {
        const SIZE: f32 = 9.0;
        let height = line_height(SIZE) + 1.0;

        let header_row: Vec<String> = headers.iter().map(|h| h.to_string()).collect();
        self.table_row(&header_row, widths, SIZE, Style::Bold);

        for row in rows {
            if self.y - height < MARGIN + FOOTER_HEIGHT {
                self.new_page();
                self.table_row(&header_row, widths, SIZE, Style::Bold);
            }
            self.table_row(row, widths, SIZE, Style::Regular);
        }
    }

    fn table_row(&mut self, cells: &[String], widths: &[f32], size: f32, style: Style) {
        let height = line_height(size) + 1.0;
        self.ensure_space(height);
        self.y -= height;

        let mut x = MARGIN;
        for (cell, width) in cells.iter().zip(widths) {
            let fitted = truncate_chars(cell, chars_per_line(*width - 2.0, size, style));
            self.text_at(&fitted, size, style, x, self.y);
            x += width;
        }
    }

    /// Full detail block for one entry
    fn entry_details(
        &mut self,
        entry: &PromptEntry,
        index: Option<usize>,
        prompt_budget: Option<usize>,
    ) {
        let title = match index {
            Some(i) => format!("#{}  Prompt Entry", i),
            None => "Prompt Entry".to_string(),
        };
        self.line(&title, 18.0, Style::Bold);

        let mut subtitle = format!(
            "Created {}  |  ID {}",
            entry.created_at.format("%Y-%m-%d %H:%M"),
            entry.id
        );
        if entry.is_favorite {
            subtitle.push_str("  |  Favorite");
        }
        self.line(&subtitle, 9.0, Style::Regular);
        self.gap(3.0);

        let mut meta = Vec::new();
        if let Some(model) = entry.model.as_deref() {
            meta.push(format!("Model: {}", model));
        }
        if !entry.tags.is_empty() {
            meta.push(format!("Tags: {}", entry.tags.join(", ")));
        }
        if !meta.is_empty() {
            self.paragraph(&meta.join("    "), 10.0, Style::Regular, None);
            self.gap(2.0);
        }

        if !entry.parameters.is_empty() {
            self.line("Parameters", 12.0, Style::Bold);
            let rows: Vec<Vec<String>> = entry
                .parameters
                .iter()
                .map(|p| vec![p.key.clone(), p.value.clone()])
                .collect();
            self.table(&["Key", "Value"], &[50.0, CONTENT_WIDTH - 50.0], &rows);
            self.gap(3.0);
        }

        self.line("Prompt", 12.0, Style::Bold);
        self.paragraph(&entry.prompt, 9.0, Style::Mono, prompt_budget);
        self.gap(4.0);

        self.images(entry);
    }

    /// Before and after images side by side, each with its annotation
    fn images(&mut self, entry: &PromptEntry) {
        let label_height = line_height(11.0);
        let note_height = line_height(8.0);
        self.ensure_space(label_height + IMAGE_BOX_HEIGHT + note_height + 2.0);

        self.y -= label_height;
        let top = self.y;
        let mut lowest = top;

        for (column, side) in [ImageSide::Before, ImageSide::After].into_iter().enumerate() {
            let x = MARGIN + column as f32 * (IMAGE_BOX_WIDTH + 10.0);
            self.text_at(side.label(), 11.0, Style::Bold, x, top);

            let bottom = match entry.image(side) {
                Some(image) => self.place_image(image, x, top - 2.0),
                None => {
                    self.text_at("(no image)", 9.0, Style::Regular, x, top - note_height - 2.0);
                    top - note_height - 2.0
                }
            };
            lowest = lowest.min(bottom);
        }

        self.y = lowest - 2.0;
    }

    /// Draw `image` with its top-left corner at (x, top); returns the lowest y used
    fn place_image(&self, image: &EmbeddedImage, x: f32, top: f32) -> f32 {
        let note_y = |bottom: f32| bottom - line_height(8.0);

        let (annotation, decoded) = match image_crate::load_from_memory(image.bytes()) {
            Ok(decoded) => {
                let (w, h) = decoded.dimensions();
                (
                    format!("{} x {} px, {}", w, h, format_byte_size(image.byte_size())),
                    Some(decoded),
                )
            }
            Err(e) => {
                warn!(mime = image.mime(), error = %e, "Image cannot be drawn in the PDF");
                let annotation = match image.meta() {
                    Ok(meta) => meta.to_string(),
                    Err(_) => format_byte_size(image.byte_size()),
                };
                (annotation, None)
            }
        };

        let Some(decoded) = decoded else {
            let y = note_y(top);
            self.text_at(&format!("[{} image] {}", image.extension(), annotation), 8.0, Style::Regular, x, y);
            return y;
        };

        let prepared = prepare_for_pdf(decoded);
        let (w, h) = prepared.dimensions();
        let dpi = fit_dpi(w, h, IMAGE_BOX_WIDTH, IMAGE_BOX_HEIGHT);
        let height_mm = h as f32 / dpi * 25.4;
        let bottom = top - height_mm;
        debug!(w, h, dpi, "Placing image");

        Image::from_dynamic_image(&prepared).add_to_layer(
            self.layer(),
            ImageTransform {
                translate_x: Some(Mm(x)),
                translate_y: Some(Mm(bottom)),
                dpi: Some(dpi),
                ..Default::default()
            },
        );

        let y = note_y(bottom);
        self.text_at(&annotation, 8.0, Style::Regular, x, y);
        y
    }

    /// Stamp footers and page numbers, then serialize
    fn finish(self, footer: &str) -> Result<Vec<u8>, ExportError> {
        let total = self.layers.len();
        for (i, layer) in self.layers.iter().enumerate() {
            let page_label = format!("Page {} of {}", i + 1, total);
            layer.use_text(sanitize(footer), 8.0, Mm(MARGIN), Mm(MARGIN - 5.0), &self.regular);
            layer.use_text(
                page_label,
                8.0,
                Mm(PAGE_WIDTH - MARGIN - 25.0),
                Mm(MARGIN - 5.0),
                &self.regular,
            );
        }

        self.doc
            .save_to_bytes()
            .map_err(|e| ExportError::Pdf(e.to_string()))
    }
}

/// Downscale oversized images and drop alpha
fn prepare_for_pdf(image: DynamicImage) -> DynamicImage {
    let (w, h) = image.dimensions();
    let image = if w.max(h) > MAX_EMBED_PX {
        image.resize(MAX_EMBED_PX, MAX_EMBED_PX, FilterType::Lanczos3)
    } else {
        image
    };
    DynamicImage::ImageRgb8(image.to_rgb8())
}

/// DPI at which a `w`x`h` pixel image exactly fits the box (aspect preserved)
fn fit_dpi(w: u32, h: u32, box_width: f32, box_height: f32) -> f32 {
    let by_width = w.max(1) as f32 * 25.4 / box_width;
    let by_height = h.max(1) as f32 * 25.4 / box_height;
    by_width.max(by_height)
}

fn line_height(size: f32) -> f32 {
    size * PT_TO_MM * 1.35
}

/// Estimated characters per line for the builtin fonts
fn chars_per_line(width: f32, size: f32, style: Style) -> usize {
    let em = match style {
        Style::Mono => 0.6,
        Style::Regular => 0.5,
        Style::Bold => 0.55,
    };
    ((width / (size * PT_TO_MM * em)) as usize).max(1)
}

/// Replace characters the builtin fonts can't show
fn sanitize(text: &str) -> String {
    text.chars()
        .map(|c| match c {
            '\t' => ' ',
            c if (' '..='~').contains(&c) || ('\u{a0}'..='\u{ff}').contains(&c) => c,
            _ => '?',
        })
        .collect()
}

/// Greedy word wrap; words longer than a line are split
pub fn wrap_text(text: &str, max_chars: usize) -> Vec<String> {
    let max_chars = max_chars.max(1);
    let mut lines = Vec::new();

    for paragraph in text.lines() {
        let mut current = String::new();
        for word in paragraph.split_whitespace() {
            let mut word: Vec<char> = word.chars().collect();

            while word.len() > max_chars {
                if !current.is_empty() {
                    lines.push(std::mem::take(&mut current));
                }
                let rest = word.split_off(max_chars);
                lines.push(word.into_iter().collect());
                word = rest;
            }

            let needed = if current.is_empty() { word.len() } else { current.chars().count() + 1 + word.len() };
            if needed > max_chars {
                lines.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push(' ');
            }
            current.extend(word);
        }
        lines.push(current);
    }

    lines
}

/// Keep at most `budget` lines; the flag reports whether anything was cut
pub fn truncate_lines(mut lines: Vec<String>, budget: usize) -> (Vec<String>, bool) {
    if lines.len() <= budget {
        return (lines, false);
    }
    lines.truncate(budget);
    (lines, true)
}

/// Shorten to `max` characters, ending with "..." when cut
pub fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let keep = max.saturating_sub(3);
    let mut out: String = text.chars().take(keep).collect();
    out.push_str("...");
    out
}
