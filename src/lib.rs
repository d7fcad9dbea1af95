//! Prompt Gallery
//!
//! A local catalog of before/after image + prompt records with search,
//! tagging, favorites, PDF reports and spreadsheet export/import.
//!
//! - `state`: the data model, entry store, derived views and entry editor
//! - `media`: embedded images and image intake
//! - `bridge`: PDF, workbook and bundle export/import
//! - `app`: the application facade the CLI drives
//! - `config`: settings file handling

pub mod app;
pub mod bridge;
pub mod config;
pub mod error;
pub mod media;
pub mod state;

pub use app::{App, Message, Notice, NoticeLevel};
pub use config::AppConfig;
pub use error::{GalleryError, Result};
