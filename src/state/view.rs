//! Derived views over the entry store
//!
//! Pure functions from a snapshot of entries plus the current selection
//! (view, search text, selected tags, page) to what should be shown. Nothing
//! here mutates the store; results are recomputed whenever the inputs change.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use super::data::PromptEntry;

/// Entries per page
pub const PAGE_SIZE: usize = 12;

/// Top-level display mode
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewMode {
    #[default]
    All,
    Favorites,
    /// Statistics view; lists the same entries as `All`
    Report,
}

impl FromStr for ViewMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "all" => Ok(ViewMode::All),
            "favorites" | "favourites" => Ok(ViewMode::Favorites),
            "report" => Ok(ViewMode::Report),
            other => Err(format!("unknown view '{}'", other)),
        }
    }
}

impl fmt::Display for ViewMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ViewMode::All => "all",
            ViewMode::Favorites => "favorites",
            ViewMode::Report => "report",
        })
    }
}

/// What the user is currently filtering by
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FilterCriteria {
    pub view: ViewMode,
    pub search_term: String,
    pub selected_tags: BTreeSet<String>,
}

/// Every tag used by any entry, deduplicated and sorted
pub fn all_tags(entries: &[PromptEntry]) -> Vec<String> {
    entries
        .iter()
        .flat_map(|e| e.tags.iter())
        .map(str::to_string)
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Number of favorited entries
pub fn favorites_count(entries: &[PromptEntry]) -> usize {
    entries.iter().filter(|e| e.is_favorite).count()
}

/// Apply view, text and tag filters, newest first
///
/// Text matching is a case-insensitive substring search over prompt, model
/// and tags. Tag matching is OR: any selected tag is enough. Entries with the
/// same `created_at` keep their store order.
pub fn filter<'a>(entries: &'a [PromptEntry], criteria: &FilterCriteria) -> Vec<&'a PromptEntry> {
    let needle = criteria.search_term.trim().to_lowercase();

    let mut matched: Vec<&PromptEntry> = entries
        .iter()
        .filter(|e| criteria.view != ViewMode::Favorites || e.is_favorite)
        .filter(|e| e.matches_text(&needle))
        .filter(|e| criteria.selected_tags.is_empty() || e.tags.intersects(&criteria.selected_tags))
        .collect();

    // sort_by is stable
    matched.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    matched
}

/// Number of pages for `len` items (0 when there are none)
pub fn page_count(len: usize, page_size: usize) -> usize {
    if page_size == 0 {
        return 0;
    }
    len.div_ceil(page_size)
}

/// Bring a 1-based page back into range after the result set changed
///
/// Empty results land on page 1; otherwise pages past the end land on the
/// last page.
pub fn clamp_page(page: usize, len: usize, page_size: usize) -> usize {
    let pages = page_count(len, page_size);
    if pages == 0 {
        1
    } else {
        page.clamp(1, pages)
    }
}

/// The 1-based `page` of `items`: `[(page-1)*size, page*size)`
pub fn paginate<T>(items: &[T], page: usize, page_size: usize) -> &[T] {
    let start = page.saturating_sub(1).saturating_mul(page_size);
    if start >= items.len() {
        return &[];
    }
    let end = start.saturating_add(page_size).min(items.len());
    &items[start..end]
}

/// Summary shown by the report view
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Report {
    pub total: usize,
    pub favorites: usize,
    pub with_both_images: usize,
    pub before_only: usize,
    pub after_only: usize,
    /// (model, count), most used first; entries without a model are not counted
    pub models: Vec<(String, usize)>,
    /// (tag, count), most used first
    pub tags: Vec<(String, usize)>,
}

/// Compute the report summary
pub fn report(entries: &[PromptEntry]) -> Report {
    let mut summary = Report {
        total: entries.len(),
        favorites: favorites_count(entries),
        ..Report::default()
    };

    let mut models: BTreeMap<String, usize> = BTreeMap::new();
    let mut tags: BTreeMap<String, usize> = BTreeMap::new();

    for entry in entries {
        match (entry.before_image.is_some(), entry.after_image.is_some()) {
            (true, true) => summary.with_both_images += 1,
            (true, false) => summary.before_only += 1,
            (false, true) => summary.after_only += 1,
            (false, false) => {}
        }
        if let Some(model) = entry.model.as_deref().map(str::trim).filter(|m| !m.is_empty()) {
            *models.entry(model.to_string()).or_default() += 1;
        }
        for tag in entry.tags.iter() {
            *tags.entry(tag.to_string()).or_default() += 1;
        }
    }

    summary.models = ranked(models);
    summary.tags = ranked(tags);
    summary
}

/// Count descending, then name ascending
fn ranked(counts: BTreeMap<String, usize>) -> Vec<(String, usize)> {
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked
}
