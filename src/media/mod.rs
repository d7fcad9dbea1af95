/// Image handling module
///
/// This module handles:
/// - The inline, self-describing image representation stored on entries
/// - Derived image metadata (dimensions, byte size, extension)
/// - Loading images from files, dropped bytes and URLs

pub mod embedded;
pub mod intake;

pub use embedded::{format_byte_size, EmbeddedImage, ImageMeta};
pub use intake::{ImageIntake, ImageSource};
