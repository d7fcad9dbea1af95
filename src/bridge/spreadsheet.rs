//! Spreadsheet export and import
//!
//! One worksheet, one row per entry, ten fixed columns:
//! index, before image, after image, prompt, model, tags, parameters,
//! created date, favorite flag, id. Row 0 is the header.
//!
//! Images are embedded in their cells on export but never read back on
//! import; they are reattached from the bundle's image files instead.

use calamine::{open_workbook_from_rs, Data, Reader, Xlsx};
use chrono::{DateTime, NaiveDateTime, Utc};
use rust_xlsxwriter::{Format, FormatAlign, Image, Workbook, Worksheet};
use std::io::Cursor;
use tracing::{debug, info, warn};

use crate::error::{ExportError, ImportParseError};
use crate::media::EmbeddedImage;
use crate::state::data::{new_id, ImageSide, PromptEntry, PromptParameter, TagSet};

/// Name of the worksheet holding the entries
pub const SHEET_NAME: &str = "Prompts";

/// Header row
pub const HEADERS: [&str; 10] = [
    "#",
    "Before",
    "After",
    "Prompt",
    "Model",
    "Tags",
    "Parameters",
    "Created",
    "Favorite",
    "ID",
];

/// Format of the "Created" column
pub const DATE_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

// Column positions
const COL_INDEX: u16 = 0;
const COL_BEFORE: u16 = 1;
const COL_AFTER: u16 = 2;
const COL_PROMPT: u16 = 3;
const COL_MODEL: u16 = 4;
const COL_TAGS: u16 = 5;
const COL_PARAMS: u16 = 6;
const COL_CREATED: u16 = 7;
const COL_FAVORITE: u16 = 8;
const COL_ID: u16 = 9;

/// Height of rows that hold images, in points
const IMAGE_ROW_HEIGHT: f64 = 90.0;

/// Build the workbook for `entries` (in the given order)
pub fn write_workbook(entries: &[PromptEntry]) -> Result<Vec<u8>, ExportError> {
    let mut workbook = Workbook::new();
    let worksheet = workbook.add_worksheet();
    worksheet.set_name(SHEET_NAME)?;

    let header = Format::new().set_bold().set_align(FormatAlign::Center);
    let cell = Format::new().set_text_wrap().set_align(FormatAlign::Top);

    for (col, title) in HEADERS.iter().enumerate() {
        worksheet.write_string_with_format(0, col as u16, *title, &header)?;
    }
    for (col, width) in [(COL_INDEX, 5.0), (COL_BEFORE, 18.0), (COL_AFTER, 18.0), (COL_PROMPT, 60.0),
        (COL_MODEL, 18.0), (COL_TAGS, 24.0), (COL_PARAMS, 30.0), (COL_CREATED, 20.0),
        (COL_FAVORITE, 9.0), (COL_ID, 38.0)]
    {
        worksheet.set_column_width(col, width)?;
    }
    worksheet.set_freeze_panes(1, 0)?;

    for (i, entry) in entries.iter().enumerate() {
        let row = (i + 1) as u32;

        worksheet.write_number_with_format(row, COL_INDEX, (i + 1) as f64, &cell)?;
        worksheet.write_string_with_format(row, COL_PROMPT, &entry.prompt, &cell)?;
        worksheet.write_string_with_format(row, COL_MODEL, entry.model.as_deref().unwrap_or(""), &cell)?;
        worksheet.write_string_with_format(row, COL_TAGS, entry.tags.join(", "), &cell)?;
        worksheet.write_string_with_format(
            row,
            COL_PARAMS,
            entry.parameter_pairs().collect::<Vec<_>>().join("; "),
            &cell,
        )?;
        worksheet.write_string_with_format(
            row,
            COL_CREATED,
            entry.created_at.format(DATE_FORMAT).to_string(),
            &cell,
        )?;
        worksheet.write_string_with_format(
            row,
            COL_FAVORITE,
            if entry.is_favorite { "Yes" } else { "No" },
            &cell,
        )?;
        worksheet.write_string_with_format(row, COL_ID, &entry.id, &cell)?;

        let mut has_image = false;
        for (side, col) in [(ImageSide::Before, COL_BEFORE), (ImageSide::After, COL_AFTER)] {
            if let Some(image) = entry.image(side) {
                embed_image(worksheet, row, col, image)?;
                has_image = true;
            }
        }
        if has_image {
            worksheet.set_row_height(row, IMAGE_ROW_HEIGHT)?;
        }
    }

    info!(rows = entries.len(), "Workbook written");
    Ok(workbook.save_to_buffer()?)
}

/// Place an image in a cell, or a text placeholder if the format can't be embedded
fn embed_image(
    worksheet: &mut Worksheet,
    row: u32,
    col: u16,
    image: &EmbeddedImage,
) -> Result<(), ExportError> {
    match Image::new_from_buffer(image.bytes()) {
        Ok(cell_image) => {
            worksheet.insert_image_fit_to_cell(row, col, &cell_image, true)?;
        }
        Err(e) => {
            warn!(row, mime = image.mime(), error = %e, "Image cannot be embedded in the workbook");
            worksheet.write_string(row, col, format!("[{} image]", image.extension()))?;
        }
    }
    Ok(())
}

/// Entries read back from a workbook
#[derive(Debug, Default)]
pub struct SheetImport {
    /// Parsed entries in sheet order, without images
    pub entries: Vec<PromptEntry>,
    /// Non-empty rows dropped because they had no prompt
    pub skipped_rows: usize,
}

/// Parse a workbook written by `write_workbook`
///
/// Missing ids and dates default to a fresh id and `now`. Nothing is applied
/// anywhere; the caller decides what to do with the result.
pub fn read_workbook(bytes: &[u8], now: DateTime<Utc>) -> Result<SheetImport, ImportParseError> {
    let mut workbook = open_workbook_from_rs::<Xlsx<_>, _>(Cursor::new(bytes))
        .map_err(|e| ImportParseError::Workbook(e.to_string()))?;

    if !workbook.sheet_names().iter().any(|name| name == SHEET_NAME) {
        return Err(ImportParseError::MissingWorksheet(SHEET_NAME.to_string()));
    }
    let range = workbook
        .worksheet_range(SHEET_NAME)
        .map_err(|e| ImportParseError::Workbook(e.to_string()))?;

    debug!(height = range.height(), width = range.width(), "Reading worksheet");

    let mut import = SheetImport::default();
    for row in range.rows().skip(1) {
        if row.iter().all(|c| cell_text(c).trim().is_empty()) {
            continue;
        }
        match parse_row(row, now) {
            Some(entry) => import.entries.push(entry),
            None => import.skipped_rows += 1,
        }
    }

    if import.skipped_rows > 0 {
        warn!(skipped = import.skipped_rows, "Rows without a prompt were skipped");
    }
    info!(count = import.entries.len(), "Workbook parsed");
    Ok(import)
}

fn parse_row(row: &[Data], now: DateTime<Utc>) -> Option<PromptEntry> {
    let column = |col: u16| row.get(col as usize).map(cell_text).unwrap_or_default();

    let prompt = column(COL_PROMPT);
    if prompt.trim().is_empty() {
        return None;
    }

    let model = Some(column(COL_MODEL).trim().to_string()).filter(|m| !m.is_empty());
    let tags: TagSet = column(COL_TAGS).split(',').collect();
    let parameters = parse_parameters(&column(COL_PARAMS));
    let created_at = parse_date(&column(COL_CREATED)).unwrap_or(now);
    let is_favorite = parse_flag(&column(COL_FAVORITE));
    let id = Some(column(COL_ID).trim().to_string())
        .filter(|id| !id.is_empty())
        .unwrap_or_else(new_id);

    Some(PromptEntry {
        id,
        before_image: None,
        after_image: None,
        prompt,
        model,
        parameters,
        tags,
        created_at,
        is_favorite,
    })
}

/// "steps: 30; cfg: 7" -> [(steps, 30), (cfg, 7)]; pairs with a blank side are dropped
pub fn parse_parameters(text: &str) -> Vec<PromptParameter> {
    text.split(';')
        .filter_map(|pair| {
            let (key, value) = pair.split_once(':')?;
            let (key, value) = (key.trim(), value.trim());
            if key.is_empty() || value.is_empty() {
                return None;
            }
            Some(PromptParameter::new(key, value))
        })
        .collect()
}

/// Accepts the export format, RFC 3339, or a bare date
fn parse_date(text: &str) -> Option<DateTime<Utc>> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Ok(naive) = NaiveDateTime::parse_from_str(text, DATE_FORMAT) {
        return Some(naive.and_utc());
    }
    if let Ok(parsed) = DateTime::parse_from_rfc3339(text) {
        return Some(parsed.with_timezone(&Utc));
    }
    chrono::NaiveDate::parse_from_str(text, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

fn parse_flag(text: &str) -> bool {
    matches!(
        text.trim().to_ascii_lowercase().as_str(),
        "yes" | "y" | "true" | "1" | "x" | "\u{2605}"
    )
}

/// Cell contents as text, whatever type the spreadsheet stored
fn cell_text(cell: &Data) -> String {
    match cell {
        Data::String(s) => s.clone(),
        Data::Int(i) => i.to_string(),
        Data::Float(f) if f.fract() == 0.0 => format!("{}", *f as i64),
        Data::Float(f) => f.to_string(),
        Data::Bool(b) => b.to_string(),
        Data::DateTime(dt) => dt
            .as_datetime()
            .map(|d| d.format(DATE_FORMAT).to_string())
            .unwrap_or_default(),
        Data::DateTimeIso(s) | Data::DurationIso(s) => s.clone(),
        _ => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::embedded::tests::png_bytes;
    use chrono::TimeZone;

    fn sample() -> Vec<PromptEntry> {
        let created = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        let mut a = PromptEntry::new("a red fox, studio light", created);
        a.model = Some("SDXL 1.0".to_string());
        a.tags = ["animals", "studio"].into_iter().collect();
        a.parameters = vec![
            PromptParameter::new("steps", "30"),
            PromptParameter::new("sampler", "dpm++ 2m: karras"),
        ];
        a.is_favorite = true;
        a.before_image = Some(EmbeddedImage::from_bytes(png_bytes(8, 8)).unwrap());

        let b = PromptEntry::new("plain", created);
        vec![a, b]
    }

    #[test]
    fn test_roundtrip_fields() {
        let entries = sample();
        let bytes = write_workbook(&entries).unwrap();
        let import = read_workbook(&bytes, Utc::now()).unwrap();

        assert_eq!(import.skipped_rows, 0);
        assert_eq!(import.entries.len(), 2);
        for (original, parsed) in entries.iter().zip(&import.entries) {
            assert_eq!(parsed.id, original.id);
            assert_eq!(parsed.prompt, original.prompt);
            assert_eq!(parsed.model, original.model);
            assert_eq!(parsed.tags, original.tags);
            assert_eq!(parsed.is_favorite, original.is_favorite);
            assert_eq!(parsed.created_at, original.created_at);
            let pairs: Vec<_> = parsed.parameter_pairs().collect();
            let expected: Vec<_> = original.parameter_pairs().collect();
            assert_eq!(pairs, expected);
            assert!(parsed.before_image.is_none());
            assert!(parsed.after_image.is_none());
        }
    }

    #[test]
    fn test_missing_worksheet() {
        let mut workbook = Workbook::new();
        workbook.add_worksheet().set_name("Other").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let err = read_workbook(&bytes, Utc::now()).unwrap_err();
        assert!(matches!(err, ImportParseError::MissingWorksheet(_)));
    }

    #[test]
    fn test_not_a_workbook() {
        let err = read_workbook(b"plain text", Utc::now()).unwrap_err();
        assert!(matches!(err, ImportParseError::Workbook(_)));
    }

    #[test]
    fn test_defaults_for_sparse_rows() {
        let mut workbook = Workbook::new();
        let sheet = workbook.add_worksheet();
        sheet.set_name(SHEET_NAME).unwrap();
        for (col, title) in HEADERS.iter().enumerate() {
            sheet.write_string(0, col as u16, *title).unwrap();
        }
        sheet.write_string(1, COL_PROMPT, "only a prompt").unwrap();
        sheet.write_string(2, COL_MODEL, "model without prompt").unwrap();
        let bytes = workbook.save_to_buffer().unwrap();

        let now = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
        let import = read_workbook(&bytes, now).unwrap();
        assert_eq!(import.entries.len(), 1);
        assert_eq!(import.skipped_rows, 1);

        let entry = &import.entries[0];
        assert_eq!(entry.created_at, now);
        assert!(!entry.id.is_empty());
        assert!(!entry.is_favorite);
        assert!(entry.model.is_none());
    }

    #[test]
    fn test_parse_parameters_drops_half_pairs() {
        let params = parse_parameters("steps: 30; :orphan; seed: ; cfg:7;junk");
        let pairs: Vec<(String, String)> = params.into_iter().map(|p| (p.key, p.value)).collect();
        assert_eq!(
            pairs,
            vec![
                ("steps".to_string(), "30".to_string()),
                ("cfg".to_string(), "7".to_string())
            ]
        );
    }

    #[test]
    fn test_parse_date_variants() {
        assert!(parse_date("2024-02-03 04:05:06").is_some());
        assert!(parse_date("2024-02-03T04:05:06Z").is_some());
        assert!(parse_date("2024-02-03").is_some());
        assert!(parse_date("yesterday").is_none());
    }
}
