//! Application state
//!
//! `App` owns the entry store together with everything the display layer
//! selects: view, search text, selected tags, current page and the set of
//! entries picked for bulk actions. Selection changes arrive as `Message`s;
//! mutations and exports are methods.
//!
//! Boundary operations (exports, imports) never propagate their errors. A
//! failure becomes a `Notice` for the user and leaves the store as it was.

use chrono::{DateTime, Utc};
use std::collections::HashSet;
use std::fmt;
use std::path::Path;
use tracing::{error, info, warn};

use crate::bridge::{self, reattach, ExportFile};
use crate::error::{GalleryError, ImportParseError, PersistenceError, ValidationError};
use crate::state::data::PromptEntry;
use crate::state::editor::EntryEditor;
use crate::state::library::EntryStore;
use crate::state::storage::Storage;
use crate::state::view::{self, FilterCriteria, Report, ViewMode};

/// Severity of a user-facing notice
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    Info,
    Warning,
    Error,
}

/// A message for the user (status line, toast)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl fmt::Display for Notice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self.level {
            NoticeLevel::Info => "info",
            NoticeLevel::Warning => "warning",
            NoticeLevel::Error => "error",
        };
        write!(f, "{}: {}", prefix, self.message)
    }
}

/// Selection events from the display layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    /// User switched between all, favorites and report
    SetView(ViewMode),
    /// Search box text changed
    SetSearch(String),
    /// Add the tag to the tag filter, or remove it if already selected
    ToggleTag(String),
    /// User cleared the tag filter
    ClearTags,
    /// Jump to a 1-based page (clamped into range)
    GoToPage(usize),
    NextPage,
    PreviousPage,
    /// Add or remove one entry from the bulk selection
    ToggleSelected(String),
    /// Add one entry to the bulk selection; repeats are no-ops
    Select(String),
    /// Add every entry on the current page to the bulk selection
    SelectAllVisible,
    /// Empty the bulk selection
    ClearSelection,
}

/// Main application state
pub struct App<S: Storage> {
    store: EntryStore<S>,
    criteria: FilterCriteria,
    /// 1-based, always within the current page range
    page: usize,
    page_size: usize,
    selected: HashSet<String>,
    notices: Vec<Notice>,
}

impl<S: Storage> App<S> {
    pub fn new(store: EntryStore<S>, page_size: usize) -> Self {
        Self {
            store,
            criteria: FilterCriteria::default(),
            page: 1,
            page_size: page_size.max(1),
            selected: HashSet::new(),
            notices: Vec::new(),
        }
    }

    // ========== Read access ==========

    pub fn store(&self) -> &EntryStore<S> {
        &self.store
    }

    pub fn criteria(&self) -> &FilterCriteria {
        &self.criteria
    }

    pub fn page(&self) -> usize {
        self.page
    }

    pub fn page_size(&self) -> usize {
        self.page_size
    }

    pub fn page_count(&self) -> usize {
        view::page_count(self.filtered().len(), self.page_size)
    }

    pub fn all_tags(&self) -> Vec<String> {
        view::all_tags(self.store.entries())
    }

    pub fn favorites_count(&self) -> usize {
        view::favorites_count(self.store.entries())
    }

    pub fn report(&self) -> Report {
        view::report(self.store.entries())
    }

    /// Every entry passing the current filter, newest first
    pub fn filtered(&self) -> Vec<&PromptEntry> {
        view::filter(self.store.entries(), &self.criteria)
    }

    /// The entries on the current page
    pub fn visible(&self) -> Vec<&PromptEntry> {
        let filtered = self.filtered();
        view::paginate(&filtered, self.page, self.page_size).to_vec()
    }

    pub fn selected(&self) -> &HashSet<String> {
        &self.selected
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.selected.contains(id)
    }

    pub fn notices(&self) -> &[Notice] {
        &self.notices
    }

    /// Hand the pending notices to the caller
    pub fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    // ========== Selection ==========

    /// Handle a selection event and keep the page in range
    pub fn update(&mut self, message: Message) {
        match message {
            Message::SetView(view) => {
                self.criteria.view = view;
                self.page = 1;
            }
            Message::SetSearch(term) => {
                self.criteria.search_term = term;
                self.page = 1;
            }
            Message::ToggleTag(tag) => {
                if !self.criteria.selected_tags.remove(&tag) {
                    self.criteria.selected_tags.insert(tag);
                }
                self.page = 1;
            }
            Message::ClearTags => {
                self.criteria.selected_tags.clear();
                self.page = 1;
            }
            Message::GoToPage(page) => self.page = page,
            Message::NextPage => self.page = self.page.saturating_add(1),
            Message::PreviousPage => self.page = self.page.saturating_sub(1),
            Message::ToggleSelected(id) => {
                if !self.selected.remove(&id) {
                    self.selected.insert(id);
                }
            }
            Message::Select(id) => {
                self.selected.insert(id);
            }
            Message::SelectAllVisible => {
                let ids: Vec<String> = self.visible().iter().map(|e| e.id.clone()).collect();
                self.selected.extend(ids);
            }
            Message::ClearSelection => self.selected.clear(),
        }
        self.clamp_page();
    }

    /// Pull the page back into range after the result set changed
    fn clamp_page(&mut self) {
        let len = self.filtered().len();
        self.page = view::clamp_page(self.page, len, self.page_size);
    }

    /// Entries a bulk action applies to: the selection if any, otherwise
    /// everything matching the current filter. Newest first.
    pub fn bulk_targets(&self) -> Vec<&PromptEntry> {
        if self.selected.is_empty() {
            return self.filtered();
        }
        let mut targets: Vec<&PromptEntry> = self
            .store
            .entries()
            .iter()
            .filter(|e| self.selected.contains(&e.id))
            .collect();
        targets.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        targets
    }

    // ========== Mutations ==========

    /// Validate the editor's staged entry and upsert it; returns its id
    ///
    /// A failed write is reported as a warning; the entry is still in the
    /// catalog for this session.
    pub fn save_editor(&mut self, editor: &EntryEditor) -> Result<String, ValidationError> {
        self.save_editor_at(editor, Utc::now())
    }

    pub fn save_editor_at(
        &mut self,
        editor: &EntryEditor,
        now: DateTime<Utc>,
    ) -> Result<String, ValidationError> {
        let entry = editor.save_at(now)?;
        let id = entry.id.clone();
        let editing = editor.is_editing();

        let result = self.store.upsert(entry);
        self.persisted(result);
        self.clamp_page();

        info!(id = %id, editing, "Entry saved");
        Ok(id)
    }

    /// Delete one entry once `confirm` agrees. Returns true if it was removed.
    pub fn delete<F>(&mut self, id: &str, confirm: F) -> bool
    where
        F: FnOnce(&PromptEntry) -> bool,
    {
        let Some(entry) = self.store.get(id) else {
            return false;
        };
        if !confirm(entry) {
            return false;
        }

        let result = self.store.delete(id);
        self.persisted(result);
        self.selected.remove(id);
        self.clamp_page();
        true
    }

    /// Delete every bulk target once `confirm` agrees with the count.
    /// Returns how many entries were removed.
    pub fn delete_selected<F>(&mut self, confirm: F) -> usize
    where
        F: FnOnce(usize) -> bool,
    {
        let ids: HashSet<String> = self.bulk_targets().iter().map(|e| e.id.clone()).collect();
        if ids.is_empty() || !confirm(ids.len()) {
            return 0;
        }

        let result = self.store.delete_many(&ids);
        self.persisted(result);
        self.selected.retain(|id| !ids.contains(id));
        self.clamp_page();
        ids.len()
    }

    /// Flip the favorite flag of `id`
    pub fn toggle_favorite(&mut self, id: &str) {
        let result = self.store.toggle_favorite(id);
        self.persisted(result);
        // Leaving the favorites view shrinks the result set
        self.clamp_page();
    }

    /// Turn a failed write into a warning notice
    fn persisted(&mut self, result: Result<(), PersistenceError>) {
        if let Err(e) = result {
            self.notify(
                NoticeLevel::Warning,
                format!("Changes could not be saved and will be lost on exit: {}", e),
            );
        }
    }

    // ========== Export / import ==========

    /// Export one entry as a PDF
    pub fn export_entry_pdf(&mut self, id: &str, now: DateTime<Utc>) -> Option<ExportFile> {
        let result = match self.store.get(id) {
            Some(entry) => bridge::pdf::export_entry(entry, now).map_err(GalleryError::from),
            None => Err(GalleryError::NotFound(id.to_string())),
        };
        self.boundary("PDF export", result)
    }

    /// Export the bulk targets as one PDF report
    pub fn export_batch_pdf(&mut self, now: DateTime<Utc>) -> Option<ExportFile> {
        let entries: Vec<PromptEntry> = self.bulk_targets().into_iter().cloned().collect();
        let result = bridge::pdf::export_batch(&entries, now);
        self.boundary("PDF export", result)
    }

    /// Export the bulk targets as a workbook + images bundle
    pub fn export_bundle(&mut self, now: DateTime<Utc>) -> Option<ExportFile> {
        let entries: Vec<PromptEntry> = self.bulk_targets().into_iter().cloned().collect();
        let result = bridge::build_bundle(&entries, now);
        self.boundary("Spreadsheet export", result)
    }

    /// Import a workbook, reattaching images from `image_dir` if given
    ///
    /// Returns the number of entries imported. Nothing is applied unless the
    /// workbook parses and the folder can be read.
    pub fn import_workbook(
        &mut self,
        bytes: &[u8],
        image_dir: Option<&Path>,
        now: DateTime<Utc>,
    ) -> Option<usize> {
        let parsed = bridge::read_workbook(bytes, now).map_err(GalleryError::from);
        let sheet = self.boundary("Spreadsheet import", parsed)?;
        let mut entries = sheet.entries;

        if let Some(dir) = image_dir {
            let files = reattach::collect_folder_images(dir).map_err(ImportParseError::Io);
            let files = self.boundary("Image folder scan", files)?;
            let report = bridge::reattach_images(&mut entries, files);
            self.reattach_notice(&report);
        }

        Some(self.apply_import(entries, sheet.skipped_rows))
    }

    /// Import a bundle produced by `export_bundle`
    pub fn import_bundle(&mut self, bytes: &[u8], now: DateTime<Utc>) -> Option<usize> {
        let parsed = bridge::read_bundle(bytes, now);
        let bundle = self.boundary("Bundle import", parsed)?;
        self.reattach_notice(&bundle.images);
        Some(self.apply_import(bundle.entries, bundle.skipped_rows))
    }

    fn apply_import(&mut self, entries: Vec<PromptEntry>, skipped_rows: usize) -> usize {
        let count = entries.len();
        let result = self.store.import_many(entries);
        self.persisted(result);
        self.clamp_page();

        let mut message = format!("Imported {} entries", count);
        if skipped_rows > 0 {
            message.push_str(&format!(" ({} rows without a prompt skipped)", skipped_rows));
        }
        self.notify(NoticeLevel::Info, message);
        count
    }

    fn reattach_notice(&mut self, report: &reattach::ReattachReport) {
        if !report.invalid.is_empty() {
            self.notify(
                NoticeLevel::Warning,
                format!("Unreadable images skipped: {}", report.invalid.join(", ")),
            );
        }
    }

    /// Catch a boundary failure and report it
    fn boundary<T, E>(&mut self, action: &str, result: Result<T, E>) -> Option<T>
    where
        E: fmt::Display,
    {
        match result {
            Ok(value) => Some(value),
            Err(e) => {
                error!(action, error = %e, "Operation failed");
                self.notify(NoticeLevel::Error, format!("{} failed: {}", action, e));
                None
            }
        }
    }

    fn notify(&mut self, level: NoticeLevel, message: String) {
        if level == NoticeLevel::Warning {
            warn!(message = %message, "Notice");
        }
        self.notices.push(Notice { level, message });
    }
}

impl<S: Storage> fmt::Debug for App<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("App")
            .field("store", &self.store)
            .field("criteria", &self.criteria)
            .field("page", &self.page)
            .field("selected", &self.selected.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::embedded::tests::png_bytes;
    use crate::media::EmbeddedImage;
    use crate::state::data::ImageSide;
    use crate::state::storage::MemoryStorage;
    use chrono::{Duration, TimeZone};

    const KEY: &str = "entries";

    fn base() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 9, 0, 0).unwrap()
    }

    fn image() -> EmbeddedImage {
        EmbeddedImage::from_bytes(png_bytes(2, 2)).unwrap()
    }

    fn app_with(storage: MemoryStorage, page_size: usize) -> App<MemoryStorage> {
        App::new(EntryStore::load(storage, KEY), page_size)
    }

    fn add(app: &mut App<MemoryStorage>, prompt: &str, minute: i64, tags: &[&str]) -> String {
        let mut editor = EntryEditor::new();
        editor.set_prompt(prompt);
        editor.set_image(ImageSide::Before, Some(image()));
        for tag in tags {
            editor.add_tag(tag);
        }
        app.save_editor_at(&editor, base() + Duration::minutes(minute)).unwrap()
    }

    #[test]
    fn test_save_rejects_invalid_editor() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let mut editor = EntryEditor::new();
        editor.set_prompt("no image");
        assert_eq!(app.save_editor(&editor), Err(ValidationError::MissingImage));
        assert!(app.store().is_empty());
    }

    #[test]
    fn test_page_clamps_when_filter_shrinks() {
        let mut app = app_with(MemoryStorage::new(), 2);
        for i in 0..5 {
            add(&mut app, &format!("cat {}", i), i, &[]);
        }
        add(&mut app, "dog", 10, &[]);

        app.update(Message::GoToPage(3));
        assert_eq!(app.page(), 3);
        assert_eq!(app.visible().len(), 2);

        app.update(Message::GoToPage(99));
        assert_eq!(app.page(), 3);

        app.update(Message::SetSearch("dog".to_string()));
        assert_eq!(app.page(), 1);
        assert_eq!(app.visible().len(), 1);

        app.update(Message::SetSearch("zebra".to_string()));
        assert_eq!(app.page(), 1);
        assert!(app.visible().is_empty());
    }

    #[test]
    fn test_delete_on_last_page_moves_back() {
        let mut app = app_with(MemoryStorage::new(), 2);
        let ids: Vec<String> = (0..3).map(|i| add(&mut app, "p", i, &[])).collect();

        app.update(Message::GoToPage(2));
        // Oldest entry sits alone on page 2
        assert!(app.delete(&ids[0], |_| true));
        assert_eq!(app.page(), 1);
        assert_eq!(app.page_count(), 1);
    }

    #[test]
    fn test_declined_confirmation_keeps_entry() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let id = add(&mut app, "keep me", 0, &[]);

        assert!(!app.delete(&id, |_| false));
        assert_eq!(app.delete_selected(|_| false), 0);
        assert_eq!(app.store().len(), 1);
    }

    #[test]
    fn test_bulk_delete_uses_selection() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let a = add(&mut app, "a", 0, &[]);
        let b = add(&mut app, "b", 1, &[]);
        let c = add(&mut app, "c", 2, &[]);

        app.update(Message::ToggleSelected(a.clone()));
        app.update(Message::ToggleSelected(c.clone()));
        let mut asked = 0;
        let removed = app.delete_selected(|n| {
            asked = n;
            true
        });

        assert_eq!((asked, removed), (2, 2));
        assert!(app.selected().is_empty());
        assert_eq!(app.store().len(), 1);
        assert!(app.store().get(&b).is_some());
    }

    #[test]
    fn test_select_all_visible_and_targets() {
        let mut app = app_with(MemoryStorage::new(), 2);
        add(&mut app, "one", 0, &[]);
        let two = add(&mut app, "two", 1, &[]);
        let three = add(&mut app, "three", 2, &[]);

        app.update(Message::SelectAllVisible);
        let targets: Vec<&str> = app.bulk_targets().iter().map(|e| e.id.as_str()).collect();
        assert_eq!(targets, vec![three.as_str(), two.as_str()]);

        app.update(Message::ClearSelection);
        assert_eq!(app.bulk_targets().len(), 3);
    }

    #[test]
    fn test_favorites_view_follows_toggle() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let id = add(&mut app, "star", 0, &[]);
        add(&mut app, "plain", 1, &[]);

        app.toggle_favorite(&id);
        app.update(Message::SetView(ViewMode::Favorites));
        assert_eq!(app.visible().len(), 1);
        assert_eq!(app.favorites_count(), 1);

        app.toggle_favorite(&id);
        assert!(app.visible().is_empty());
        assert_eq!(app.page(), 1);
    }

    #[test]
    fn test_tag_filter_toggles() {
        let mut app = app_with(MemoryStorage::new(), 12);
        add(&mut app, "a", 0, &["red"]);
        add(&mut app, "b", 1, &["blue"]);
        add(&mut app, "c", 2, &[]);

        app.update(Message::ToggleTag("red".to_string()));
        app.update(Message::ToggleTag("blue".to_string()));
        assert_eq!(app.filtered().len(), 2);

        app.update(Message::ToggleTag("red".to_string()));
        assert_eq!(app.filtered().len(), 1);

        app.update(Message::ClearTags);
        assert_eq!(app.filtered().len(), 3);
        assert_eq!(app.all_tags(), vec!["blue", "red"]);
    }

    #[test]
    fn test_quota_failure_becomes_warning() {
        let mut app = app_with(MemoryStorage::with_quota(16), 12);
        let id = add(&mut app, "too big to persist", 0, &[]);

        assert!(app.store().get(&id).is_some());
        let notices = app.take_notices();
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].level, NoticeLevel::Warning);
        assert!(app.notices().is_empty());
    }

    #[test]
    fn test_failed_import_leaves_store_untouched() {
        let mut app = app_with(MemoryStorage::new(), 12);
        add(&mut app, "existing", 0, &[]);

        assert_eq!(app.import_workbook(b"not a workbook", None, base()), None);
        assert_eq!(app.import_bundle(b"not a zip", base()), None);
        assert_eq!(app.store().len(), 1);

        let notices = app.take_notices();
        assert_eq!(notices.len(), 2);
        assert!(notices.iter().all(|n| n.level == NoticeLevel::Error));
    }

    #[test]
    fn test_export_failures_are_reported() {
        let mut app = app_with(MemoryStorage::new(), 12);
        assert!(app.export_bundle(base()).is_none());
        assert!(app.export_batch_pdf(base()).is_none());
        assert!(app.export_entry_pdf("missing", base()).is_none());
        assert_eq!(app.take_notices().len(), 3);
    }

    #[test]
    fn test_bundle_roundtrip_through_app() {
        let mut source = app_with(MemoryStorage::new(), 12);
        add(&mut source, "first", 0, &["x"]);
        add(&mut source, "second", 1, &["y"]);
        let bundle = source.export_bundle(base()).unwrap();

        let mut target = app_with(MemoryStorage::new(), 12);
        assert_eq!(target.import_bundle(&bundle.bytes, base()), Some(2));
        assert_eq!(target.store().len(), 2);
        assert!(target.store().entries().iter().all(|e| e.before_image.is_some()));

        // Same ids: importing again replaces rather than duplicates
        assert_eq!(target.import_bundle(&bundle.bytes, base()), Some(2));
        assert_eq!(target.store().len(), 2);
    }

    #[test]
    fn test_repeated_select_keeps_entry_selected() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let a = add(&mut app, "a", 0, &[]);
        add(&mut app, "b", 1, &[]);
        add(&mut app, "c", 2, &[]);

        app.update(Message::Select(a.clone()));
        app.update(Message::Select(a.clone()));
        assert!(app.is_selected(&a));

        let removed = app.delete_selected(|_| true);
        assert_eq!(removed, 1);
        assert_eq!(app.store().len(), 2);
        assert!(app.store().get(&a).is_none());
    }

    #[test]
    fn test_toggled_off_selection_falls_back_to_filter() {
        let mut app = app_with(MemoryStorage::new(), 12);
        let a = add(&mut app, "a", 0, &[]);
        add(&mut app, "b", 1, &[]);

        app.update(Message::ToggleSelected(a.clone()));
        app.update(Message::ToggleSelected(a));
        assert!(app.selected().is_empty());
        assert_eq!(app.bulk_targets().len(), 2);
    }

    #[test]
    fn test_workbook_with_repeated_ids_imports_once() {
        let mut first = PromptEntry::new("first copy", base());
        first.id = "dup".to_string();
        let mut second = PromptEntry::new("second copy", base());
        second.id = "dup".to_string();
        let workbook = bridge::write_workbook(&[first, second]).unwrap();

        let mut app = app_with(MemoryStorage::new(), 12);
        assert_eq!(app.import_workbook(&workbook, None, base()), Some(2));

        let copies: Vec<&PromptEntry> =
            app.store().entries().iter().filter(|e| e.id == "dup").collect();
        assert_eq!(copies.len(), 1);
        assert_eq!(copies[0].prompt, "second copy");

        app.toggle_favorite("dup");
        let favorites: Vec<bool> = app
            .store()
            .entries()
            .iter()
            .filter(|e| e.id == "dup")
            .map(|e| e.is_favorite)
            .collect();
        assert_eq!(favorites, vec![true]);
    }
}
