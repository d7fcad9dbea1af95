//! Shared data structures for the application state
//!
//! These structs represent the data model that flows between
//! the entry store, the editor, the view engine and the exporters.

use chrono::{DateTime, Utc};
use indexmap::IndexSet;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use uuid::Uuid;

use crate::media::EmbeddedImage;

/// Mint a fresh, globally unique identity
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}

/// One key/value row of a prompt's parameters (e.g. "steps: 30")
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PromptParameter {
    /// Stable identity for the editing session
    pub id: String,
    pub key: String,
    pub value: String,
}

impl PromptParameter {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            key: key.into(),
            value: value.into(),
        }
    }
}

/// Which of the two images of an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageSide {
    Before,
    After,
}

impl ImageSide {
    /// Label used in file names and headers ("Before" / "After")
    pub fn label(&self) -> &'static str {
        match self {
            ImageSide::Before => "Before",
            ImageSide::After => "After",
        }
    }
}

impl fmt::Display for ImageSide {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Tags of a single entry
///
/// A real set (no duplicates) that remembers insertion order, so it
/// serializes as a plain ordered list of strings.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TagSet(IndexSet<String>);

impl TagSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a tag (trimmed). Returns false for blanks and duplicates.
    pub fn insert(&mut self, tag: &str) -> bool {
        let tag = tag.trim();
        if tag.is_empty() {
            return false;
        }
        self.0.insert(tag.to_string())
    }

    /// Remove a tag, keeping the order of the others
    pub fn remove(&mut self, tag: &str) -> bool {
        self.0.shift_remove(tag)
    }

    pub fn contains(&self, tag: &str) -> bool {
        self.0.contains(tag)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn clear(&mut self) {
        self.0.clear();
    }

    /// True if any of `wanted` is present (OR semantics)
    pub fn intersects(&self, wanted: &BTreeSet<String>) -> bool {
        self.0.iter().any(|tag| wanted.contains(tag))
    }

    /// Tags joined with `separator`, in insertion order
    pub fn join(&self, separator: &str) -> String {
        self.0.iter().map(String::as_str).collect::<Vec<_>>().join(separator)
    }
}

impl<S: AsRef<str>> FromIterator<S> for TagSet {
    fn from_iter<I: IntoIterator<Item = S>>(iter: I) -> Self {
        let mut tags = TagSet::new();
        for tag in iter {
            tags.insert(tag.as_ref());
        }
        tags
    }
}

/// A single before/after prompt record
///
/// Field names follow the persisted JSON layout (camelCase).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PromptEntry {
    /// Unique identity within the store
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before_image: Option<EmbeddedImage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after_image: Option<EmbeddedImage>,
    pub prompt: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    #[serde(default)]
    pub parameters: Vec<PromptParameter>,
    #[serde(default)]
    pub tags: TagSet,
    /// Assigned once at creation, never changed by edits
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub is_favorite: bool,
}

impl PromptEntry {
    /// A bare entry with a fresh id, stamped `created_at`
    pub fn new(prompt: impl Into<String>, created_at: DateTime<Utc>) -> Self {
        Self {
            id: new_id(),
            before_image: None,
            after_image: None,
            prompt: prompt.into(),
            model: None,
            parameters: Vec::new(),
            tags: TagSet::new(),
            created_at,
            is_favorite: false,
        }
    }

    pub fn image(&self, side: ImageSide) -> Option<&EmbeddedImage> {
        match side {
            ImageSide::Before => self.before_image.as_ref(),
            ImageSide::After => self.after_image.as_ref(),
        }
    }

    pub fn set_image(&mut self, side: ImageSide, image: Option<EmbeddedImage>) {
        match side {
            ImageSide::Before => self.before_image = image,
            ImageSide::After => self.after_image = image,
        }
    }

    pub fn has_image(&self) -> bool {
        self.before_image.is_some() || self.after_image.is_some()
    }

    /// Case-insensitive substring match against prompt, model and tags
    ///
    /// `needle` must already be lowercased.
    pub fn matches_text(&self, needle: &str) -> bool {
        if needle.is_empty() {
            return true;
        }
        self.prompt.to_lowercase().contains(needle)
            || self
                .model
                .as_deref()
                .is_some_and(|m| m.to_lowercase().contains(needle))
            || self.tags.iter().any(|t| t.to_lowercase().contains(needle))
    }

    /// Parameters rendered as "key: value" pairs
    pub fn parameter_pairs(&self) -> impl Iterator<Item = String> + '_ {
        self.parameters
            .iter()
            .map(|p| format!("{}: {}", p.key, p.value))
    }

    /// First eight characters of the id, for file names and listings
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}
