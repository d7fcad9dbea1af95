/// State management module
///
/// This module handles all catalog state, including:
/// - Shared data structures (data.rs)
/// - The persistence primitive (storage.rs)
/// - The entry store (library.rs)
/// - Derived, filtered and paginated views (view.rs)
/// - Staging and validating edits (editor.rs)

pub mod data;
pub mod editor;
pub mod library;
pub mod storage;
pub mod view;

pub use data::{ImageSide, PromptEntry, PromptParameter, TagSet};
pub use editor::{EntryEditor, TagKey};
pub use library::EntryStore;
pub use storage::{MemoryStorage, SqliteStorage, Storage};
pub use view::{FilterCriteria, ViewMode, PAGE_SIZE};
