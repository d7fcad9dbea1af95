use chrono::{DateTime, Duration, TimeZone, Utc};
use image::{ImageFormat, Rgb, RgbImage};
use std::io::Cursor;

use prompt_gallery::bridge::{read_workbook, reattach_images, write_workbook};
use prompt_gallery::media::EmbeddedImage;
use prompt_gallery::state::view::{filter, paginate};
use prompt_gallery::state::{
    EntryEditor, EntryStore, FilterCriteria, ImageSide, MemoryStorage, PromptEntry, SqliteStorage,
    ViewMode,
};
use prompt_gallery::{App, Message};

const KEY: &str = "prompt-gallery-entries";

fn png(width: u32, height: u32) -> Vec<u8> {
    let img = RgbImage::from_pixel(width, height, Rgb([200, 40, 90]));
    let mut bytes = Cursor::new(Vec::new());
    img.write_to(&mut bytes, ImageFormat::Png).unwrap();
    bytes.into_inner()
}

fn t(minutes: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 2, 10, 8, 0, 0).unwrap() + Duration::minutes(minutes)
}

fn editor(prompt: &str, side: ImageSide) -> EntryEditor {
    let mut editor = EntryEditor::new();
    editor.set_prompt(prompt);
    editor.set_image(side, Some(EmbeddedImage::from_bytes(png(4, 3)).unwrap()));
    editor
}

#[test]
fn test_cat_and_dog_walkthrough() {
    let mut store = EntryStore::load(MemoryStorage::new(), KEY);

    let a = editor("cat", ImageSide::Before).save_at(t(1)).unwrap();
    let b = editor("dog", ImageSide::After).save_at(t(2)).unwrap();
    store.upsert(a.clone()).unwrap();
    store.upsert(b.clone()).unwrap();

    let all = FilterCriteria {
        view: ViewMode::All,
        ..FilterCriteria::default()
    };
    let ids: Vec<&str> = filter(store.entries(), &all).iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![b.id.as_str(), a.id.as_str()]);

    let cats = FilterCriteria {
        search_term: "cat".to_string(),
        ..FilterCriteria::default()
    };
    let ids: Vec<&str> = filter(store.entries(), &cats).iter().map(|e| e.id.as_str()).collect();
    assert_eq!(ids, vec![a.id.as_str()]);

    store.delete(&a.id).unwrap();
    assert_eq!(store.len(), 1);
    assert_eq!(store.entries()[0].id, b.id);
}

#[test]
fn test_catalog_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = {
        let storage = SqliteStorage::open(dir.path()).unwrap();
        let mut app = App::new(EntryStore::load(storage, KEY), 12);
        let mut staged = editor("neon city at dusk", ImageSide::Before);
        staged.set_model("sdxl");
        staged.set_tag_input("city, night,");
        let id = app.save_editor(&staged).unwrap();
        app.toggle_favorite(&id);
        id
    };

    let storage = SqliteStorage::open(dir.path()).unwrap();
    let mut app = App::new(EntryStore::load(storage, KEY), 12);
    app.update(Message::SetView(ViewMode::Favorites));

    let visible = app.visible();
    assert_eq!(visible.len(), 1);
    assert_eq!(visible[0].id, id);
    assert_eq!(visible[0].model.as_deref(), Some("sdxl"));
    assert_eq!(visible[0].tags.join(","), "city,night");
    assert!(visible[0].before_image.is_some());
}

#[test]
fn test_edit_keeps_identity_and_creation_time() {
    let mut store = EntryStore::load(MemoryStorage::new(), KEY);
    let original = editor("first draft", ImageSide::Before).save_at(t(0)).unwrap();
    store.upsert(original.clone()).unwrap();
    store.upsert(editor("other", ImageSide::After).save_at(t(5)).unwrap()).unwrap();

    let mut staged = EntryEditor::edit(store.get(&original.id).unwrap());
    staged.set_prompt("final draft");
    let edited = staged.save_at(t(60)).unwrap();
    store.upsert(edited).unwrap();

    assert_eq!(store.len(), 2);
    let stored = store.get(&original.id).unwrap();
    assert_eq!(stored.prompt, "final draft");
    assert_eq!(stored.created_at, original.created_at);
    // Position preserved: the other entry was prepended after the original
    assert_eq!(store.entries()[1].id, original.id);
}

#[test]
fn test_pages_cover_filter_result_once() {
    let entries: Vec<PromptEntry> = (0..29).map(|i| PromptEntry::new(format!("p{}", i), t(i))).collect();
    let filtered = filter(&entries, &FilterCriteria::default());

    let mut seen = Vec::new();
    for page in 1..=3 {
        let slice = paginate(&filtered, page, 12);
        assert!(slice.len() <= 12);
        seen.extend(slice.iter().map(|e| e.id.clone()));
    }
    let expected: Vec<String> = filtered.iter().map(|e| e.id.clone()).collect();
    assert_eq!(seen, expected);
}

#[test]
fn test_spreadsheet_roundtrip_then_reattach() {
    let mut first = PromptEntry::new("portrait, soft light", t(0));
    first.model = Some("mj-6".to_string());
    first.tags = ["portrait", "studio"].into_iter().collect();
    first.before_image = Some(EmbeddedImage::from_bytes(png(5, 5)).unwrap());
    first.is_favorite = true;
    let mut editor_second = editor("landscape", ImageSide::After);
    editor_second.add_parameter_with("steps", "30");
    editor_second.add_parameter_with("cfg", "7.5");
    let second = editor_second.save_at(t(1)).unwrap();

    let workbook = write_workbook(&[first.clone(), second.clone()]).unwrap();
    let mut imported = read_workbook(&workbook, t(100)).unwrap().entries;

    assert_eq!(imported.len(), 2);
    for (back, original) in imported.iter().zip([&first, &second]) {
        assert_eq!(back.id, original.id);
        assert_eq!(back.prompt, original.prompt);
        assert_eq!(back.model, original.model);
        assert_eq!(back.tags, original.tags);
        assert_eq!(back.is_favorite, original.is_favorite);
        let pairs: Vec<String> = back.parameter_pairs().collect();
        let expected: Vec<String> = original.parameter_pairs().collect();
        assert_eq!(pairs, expected);
        assert!(!back.has_image());
    }

    let report = reattach_images(&mut imported, vec![("2_After.png".to_string(), png(6, 2))]);
    assert_eq!(report.attached, 1);
    assert!(imported[0].before_image.is_none());
    assert!(imported[1].before_image.is_none());
    assert_eq!(imported[1].after_image.as_ref().unwrap().dimensions().unwrap(), (6, 2));
}
