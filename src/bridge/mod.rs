/// Export/import bridge
///
/// This module translates between the entry collection and exchange formats:
/// - PDF reports, single entry or batch (pdf.rs)
/// - The ten-column workbook (spreadsheet.rs)
/// - Zip bundles of workbook + image files (archive.rs)
/// - Matching loose image files back onto imported entries (reattach.rs)

pub mod archive;
pub mod pdf;
pub mod reattach;
pub mod spreadsheet;

pub use archive::{build_bundle, read_bundle, BundleImport, ExportFile};
pub use reattach::{collect_folder_images, reattach_images, ReattachReport};
pub use spreadsheet::{read_workbook, write_workbook, SheetImport};
