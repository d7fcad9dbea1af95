use anyhow::{anyhow, bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use indexmap::IndexSet;
use std::io::{self, BufRead, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use prompt_gallery::bridge::{spreadsheet::parse_parameters, ExportFile};
use prompt_gallery::media::{ImageIntake, ImageSource};
use prompt_gallery::state::{
    EntryEditor, EntryStore, ImageSide, PromptEntry, SqliteStorage, TagKey, ViewMode,
};
use prompt_gallery::{App, AppConfig, Message, NoticeLevel};

#[derive(Parser)]
#[clap(author, version, about)]
struct Cli {
    /// Config file (defaults to <config_dir>/prompt-gallery/config.toml)
    #[clap(long, global = true)]
    config: Option<PathBuf>,
    /// Directory holding the catalog database
    #[clap(long, global = true)]
    data_dir: Option<PathBuf>,
    /// Debug logging
    #[clap(short, long, global = true)]
    verbose: bool,
    #[clap(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// List entries, newest first
    List {
        /// all, favorites or report
        #[clap(long, default_value = "all")]
        view: ViewMode,
        /// Case-insensitive text search over prompt, model and tags
        #[clap(short, long)]
        search: Option<String>,
        /// Only entries with any of these tags
        #[clap(short, long)]
        tag: Vec<String>,
        #[clap(short, long, default_value = "1")]
        page: usize,
    },
    /// Show one entry in full
    Show { id: String },
    /// Add a new entry
    Add {
        #[clap(long)]
        prompt: String,
        /// Before image: a file path or URL
        #[clap(long)]
        before: Option<String>,
        /// After image: a file path or URL
        #[clap(long)]
        after: Option<String>,
        #[clap(long)]
        model: Option<String>,
        /// Comma-separated tags
        #[clap(long)]
        tags: Option<String>,
        /// Parameter as "key: value" (repeatable)
        #[clap(long)]
        param: Vec<String>,
    },
    /// Change an existing entry
    Edit {
        id: String,
        #[clap(long)]
        prompt: Option<String>,
        #[clap(long)]
        before: Option<String>,
        #[clap(long)]
        after: Option<String>,
        /// Empty string clears the model
        #[clap(long)]
        model: Option<String>,
        #[clap(long)]
        add_tag: Vec<String>,
        #[clap(long)]
        remove_tag: Vec<String>,
        /// Replace all parameters with these "key: value" pairs
        #[clap(long)]
        param: Vec<String>,
        #[clap(long)]
        clear_params: bool,
    },
    /// Delete one or more entries
    Delete {
        #[clap(required = true)]
        ids: Vec<String>,
        /// Skip the confirmation prompt
        #[clap(short, long)]
        yes: bool,
    },
    /// Toggle the favorite flag
    Favorite { id: String },
    /// List every tag in use
    Tags,
    /// Catalog statistics
    Report,
    /// Export entries as PDF (one id: single entry, otherwise a batch report)
    ExportPdf {
        /// Entries to export (all when omitted)
        ids: Vec<String>,
    },
    /// Export entries as a workbook + images zip bundle
    ExportXlsx {
        /// Entries to export (all when omitted)
        ids: Vec<String>,
    },
    /// Import a workbook (.xlsx) or a bundle (.zip)
    ImportXlsx {
        file: PathBuf,
        /// Folder of {n}_Before/{n}_After image files to reattach
        #[clap(long)]
        images: Option<PathBuf>,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup_logging(cli.verbose);

    let mut config = AppConfig::load(cli.config.as_deref());
    if let Some(dir) = cli.data_dir {
        config.data_dir = dir;
    }
    debug!(?config, "Configuration");

    let storage = SqliteStorage::open(&config.data_dir).with_context(|| {
        format!("Failed to open catalog in {}", config.data_dir.display())
    })?;
    let store = EntryStore::load(storage, config.storage_key.clone());
    let mut app = App::new(store, config.page_size);

    let result = run(cli.command, &mut app, &config).await;
    flush_notices(&mut app)?;
    result
}

async fn run(command: Commands, app: &mut App<SqliteStorage>, config: &AppConfig) -> Result<()> {
    match command {
        Commands::List {
            view,
            search,
            tag,
            page,
        } => {
            app.update(Message::SetView(view));
            app.update(Message::SetSearch(search.unwrap_or_default()));
            for t in tag {
                app.update(Message::ToggleTag(t));
            }
            app.update(Message::GoToPage(page));
            print_list(app);
        }
        Commands::Show { id } => {
            let id = resolve_id(app, &id)?;
            if let Some(entry) = app.store().get(&id) {
                print_entry(entry);
            }
        }
        Commands::Add {
            prompt,
            before,
            after,
            model,
            tags,
            param,
        } => {
            let intake = ImageIntake::new(config.fetch_timeout())?;
            let mut editor = EntryEditor::new();
            editor.set_prompt(prompt);
            editor.set_model(model.unwrap_or_default());
            if let Some(tags) = tags {
                editor.set_tag_input(tags);
                editor.handle_tag_key(TagKey::Enter);
            }
            for p in &param {
                for parameter in parse_parameters(p) {
                    editor.add_parameter_with(parameter.key, parameter.value);
                }
            }
            stage(&mut editor, ImageSide::Before, before, &intake).await?;
            stage(&mut editor, ImageSide::After, after, &intake).await?;

            let id = app
                .save_editor(&editor)
                .map_err(|e| anyhow!("{} ({} field)", e, e.field()))?;
            println!("Added {}", id);
        }
        Commands::Edit {
            id,
            prompt,
            before,
            after,
            model,
            add_tag,
            remove_tag,
            param,
            clear_params,
        } => {
            let id = resolve_id(app, &id)?;
            let entry = app
                .store()
                .get(&id)
                .ok_or_else(|| anyhow!("No entry with id {}", id))?;
            let mut editor = EntryEditor::edit(entry);

            if let Some(prompt) = prompt {
                editor.set_prompt(prompt);
            }
            if let Some(model) = model {
                editor.set_model(model);
            }
            for tag in &remove_tag {
                editor.remove_tag(tag);
            }
            for tag in &add_tag {
                editor.add_tag(tag);
            }
            if clear_params || !param.is_empty() {
                let ids: Vec<String> = editor.parameters().iter().map(|p| p.id.clone()).collect();
                for pid in ids {
                    editor.remove_parameter(&pid);
                }
            }
            for p in &param {
                for parameter in parse_parameters(p) {
                    editor.add_parameter_with(parameter.key, parameter.value);
                }
            }

            let intake = ImageIntake::new(config.fetch_timeout())?;
            stage(&mut editor, ImageSide::Before, before, &intake).await?;
            stage(&mut editor, ImageSide::After, after, &intake).await?;

            app.save_editor(&editor)
                .map_err(|e| anyhow!("{} ({} field)", e, e.field()))?;
            println!("Updated {}", id);
        }
        Commands::Delete { ids, yes } => {
            let ids = resolve_ids(app, &ids)?;

            if let [id] = ids.as_slice() {
                let removed = app.delete(id, |entry| {
                    yes || confirm(&format!("Delete \"{}\"?", preview(&entry.prompt, 50)))
                });
                if removed {
                    println!("Deleted 1 entry");
                }
            } else {
                for id in ids {
                    app.update(Message::Select(id));
                }
                let removed = app.delete_selected(|n| yes || confirm(&format!("Delete {} entries?", n)));
                if removed > 0 {
                    println!("Deleted {} entries", removed);
                }
            }
        }
        Commands::Favorite { id } => {
            let id = resolve_id(app, &id)?;
            app.toggle_favorite(&id);
            let state = app.store().get(&id).is_some_and(|e| e.is_favorite);
            println!("{} is {}", id, if state { "a favorite" } else { "no longer a favorite" });
        }
        Commands::Tags => {
            for tag in app.all_tags() {
                println!("{}", tag);
            }
        }
        Commands::Report => print_report(app),
        Commands::ExportPdf { ids } => {
            let ids = resolve_ids(app, &ids)?;
            let file = if let [id] = ids.as_slice() {
                app.export_entry_pdf(id, Utc::now())
            } else {
                for id in ids {
                    app.update(Message::Select(id));
                }
                app.export_batch_pdf(Utc::now())
            };
            if let Some(file) = file {
                write_export(&config.export_dir, &file)?;
            }
        }
        Commands::ExportXlsx { ids } => {
            for id in resolve_ids(app, &ids)? {
                app.update(Message::Select(id));
            }
            if let Some(file) = app.export_bundle(Utc::now()) {
                write_export(&config.export_dir, &file)?;
            }
        }
        Commands::ImportXlsx { file, images } => {
            let bytes = std::fs::read(&file)
                .with_context(|| format!("Failed to read {}", file.display()))?;
            let is_bundle = file
                .extension()
                .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));

            let imported = if is_bundle {
                app.import_bundle(&bytes, Utc::now())
            } else {
                app.import_workbook(&bytes, images.as_deref(), Utc::now())
            };
            if let Some(count) = imported {
                info!(count, file = %file.display(), "Import finished");
            }
        }
    }

    Ok(())
}

/// Stage an image from a path or URL, if one was given
async fn stage(
    editor: &mut EntryEditor,
    side: ImageSide,
    arg: Option<String>,
    intake: &ImageIntake,
) -> Result<()> {
    let Some(arg) = arg else {
        return Ok(());
    };
    editor
        .stage_image(side, ImageSource::parse(&arg), intake)
        .await
        .with_context(|| format!("Failed to load {} image from {}", side, arg))
}

/// Find the entry whose id is, or starts with, `prefix`
fn resolve_id(app: &App<SqliteStorage>, prefix: &str) -> Result<String> {
    if app.store().get(prefix).is_some() {
        return Ok(prefix.to_string());
    }
    let matches: Vec<&PromptEntry> = app
        .store()
        .entries()
        .iter()
        .filter(|e| e.id.starts_with(prefix))
        .collect();
    match matches.as_slice() {
        [entry] => Ok(entry.id.clone()),
        [] => bail!("No entry with id {}", prefix),
        _ => bail!("Id prefix {} is ambiguous ({} matches)", prefix, matches.len()),
    }
}

/// Resolve every argument, dropping repeats (two prefixes of one id count once)
fn resolve_ids(app: &App<SqliteStorage>, prefixes: &[String]) -> Result<Vec<String>> {
    let mut ids = IndexSet::new();
    for prefix in prefixes {
        ids.insert(resolve_id(app, prefix)?);
    }
    Ok(ids.into_iter().collect())
}

fn confirm(question: &str) -> bool {
    print!("{} [y/N] ", question);
    if io::stdout().flush().is_err() {
        return false;
    }
    let mut answer = String::new();
    if io::stdin().lock().read_line(&mut answer).is_err() {
        return false;
    }
    matches!(answer.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn write_export(dir: &Path, file: &ExportFile) -> Result<()> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let path = dir.join(&file.file_name);
    std::fs::write(&path, &file.bytes)
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Wrote {}", path.display());
    Ok(())
}

/// Print pending notices; an error notice fails the command
fn flush_notices(app: &mut App<SqliteStorage>) -> Result<()> {
    let mut failed = false;
    for notice in app.take_notices() {
        eprintln!("{}", notice);
        failed |= notice.level == NoticeLevel::Error;
    }
    if failed {
        bail!("Command failed");
    }
    Ok(())
}

// ========== Output ==========

fn preview(text: &str, max: usize) -> String {
    let line = text.lines().next().unwrap_or("");
    if line.chars().count() <= max {
        return line.to_string();
    }
    let cut: String = line.chars().take(max.saturating_sub(3)).collect();
    format!("{}...", cut)
}

fn print_list(app: &App<SqliteStorage>) {
    let filtered = app.filtered().len();
    let visible = app.visible();
    if visible.is_empty() {
        println!("No entries");
        return;
    }

    println!("{:<8}  {:<10}  {:<3}  {:<16}  {:<24}  PROMPT", "ID", "DATE", "FAV", "MODEL", "TAGS");
    for entry in &visible {
        println!(
            "{:<8}  {:<10}  {:<3}  {:<16}  {:<24}  {}",
            entry.short_id(),
            entry.created_at.format("%Y-%m-%d"),
            if entry.is_favorite { "*" } else { "" },
            preview(entry.model.as_deref().unwrap_or("-"), 16),
            preview(&entry.tags.join(", "), 24),
            preview(&entry.prompt, 60),
        );
    }
    println!(
        "Page {} of {} ({} entries, {} favorites in catalog)",
        app.page(),
        app.page_count(),
        filtered,
        app.favorites_count()
    );

    if app.criteria().view == ViewMode::Report {
        println!();
        print_report(app);
    }
}

fn print_entry(entry: &PromptEntry) {
    println!("ID:       {}", entry.id);
    println!("Created:  {}", entry.created_at.format("%Y-%m-%d %H:%M:%S"));
    println!("Favorite: {}", if entry.is_favorite { "yes" } else { "no" });
    if let Some(model) = &entry.model {
        println!("Model:    {}", model);
    }
    if !entry.tags.is_empty() {
        println!("Tags:     {}", entry.tags.join(", "));
    }
    for side in [ImageSide::Before, ImageSide::After] {
        if let Some(image) = entry.image(side) {
            match image.meta() {
                Ok(meta) => println!("{:<9} {} ({})", format!("{}:", side), meta, image.mime()),
                Err(e) => println!("{:<9} unreadable ({})", format!("{}:", side), e),
            }
        }
    }
    if !entry.parameters.is_empty() {
        println!("Parameters:");
        for pair in entry.parameter_pairs() {
            println!("  {}", pair);
        }
    }
    println!();
    println!("{}", entry.prompt);
}

fn print_report(app: &App<SqliteStorage>) {
    let summary = app.report();
    println!("Entries:          {}", summary.total);
    println!("Favorites:        {}", summary.favorites);
    println!("Both images:      {}", summary.with_both_images);
    println!("Before only:      {}", summary.before_only);
    println!("After only:       {}", summary.after_only);
    if !summary.models.is_empty() {
        println!("Models:");
        for (model, count) in &summary.models {
            println!("  {:<24} {}", model, count);
        }
    }
    if !summary.tags.is_empty() {
        println!("Tags:");
        for (tag, count) in &summary.tags {
            println!("  {:<24} {}", tag, count);
        }
    }
}

fn setup_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(false)
        .init();
}
