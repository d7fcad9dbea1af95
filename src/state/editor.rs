//! Entry editor
//!
//! Stages the fields of a single entry, new or existing, and validates them
//! before producing a `PromptEntry`. The editor never touches the store; the
//! caller upserts the saved entry. Dropping the editor discards the staged
//! edits.

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use super::data::{new_id, ImageSide, PromptEntry, PromptParameter, TagSet};
use crate::error::{ImageLoadError, ValidationError};
use crate::media::{EmbeddedImage, ImageIntake, ImageSource};

/// Keys that commit the pending tag input
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TagKey {
    Enter,
    Comma,
}

/// Identity carried over when editing an existing entry
#[derive(Debug, Clone)]
struct Original {
    id: String,
    created_at: DateTime<Utc>,
    is_favorite: bool,
}

/// Staged edits for one entry
#[derive(Debug, Clone, Default)]
pub struct EntryEditor {
    original: Option<Original>,
    prompt: String,
    model: String,
    before_image: Option<EmbeddedImage>,
    after_image: Option<EmbeddedImage>,
    parameters: Vec<PromptParameter>,
    tags: TagSet,
    /// Tag text typed but not yet committed
    tag_input: String,
}

impl EntryEditor {
    /// An empty editor for a new entry
    pub fn new() -> Self {
        Self::default()
    }

    /// An editor pre-filled from an existing entry
    pub fn edit(entry: &PromptEntry) -> Self {
        Self {
            original: Some(Original {
                id: entry.id.clone(),
                created_at: entry.created_at,
                is_favorite: entry.is_favorite,
            }),
            prompt: entry.prompt.clone(),
            model: entry.model.clone().unwrap_or_default(),
            before_image: entry.before_image.clone(),
            after_image: entry.after_image.clone(),
            parameters: entry.parameters.clone(),
            tags: entry.tags.clone(),
            tag_input: String::new(),
        }
    }

    pub fn is_editing(&self) -> bool {
        self.original.is_some()
    }

    // ========== Text fields ==========

    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    pub fn set_prompt(&mut self, prompt: impl Into<String>) {
        self.prompt = prompt.into();
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn set_model(&mut self, model: impl Into<String>) {
        self.model = model.into();
    }

    // ========== Images ==========

    pub fn image(&self, side: ImageSide) -> Option<&EmbeddedImage> {
        match side {
            ImageSide::Before => self.before_image.as_ref(),
            ImageSide::After => self.after_image.as_ref(),
        }
    }

    /// Stage (or clear, with `None`) one of the two images
    pub fn set_image(&mut self, side: ImageSide, image: Option<EmbeddedImage>) {
        match side {
            ImageSide::Before => self.before_image = image,
            ImageSide::After => self.after_image = image,
        }
    }

    /// Load an image from any source and stage it
    ///
    /// On failure the slot keeps whatever it held before.
    pub async fn stage_image(
        &mut self,
        side: ImageSide,
        source: ImageSource,
        intake: &ImageIntake,
    ) -> Result<(), ImageLoadError> {
        match intake.load(source).await {
            Ok(image) => {
                debug!(side = %side, mime = image.mime(), "Staged image");
                self.set_image(side, Some(image));
                Ok(())
            }
            Err(e) => {
                warn!(side = %side, error = %e, "Image could not be loaded");
                Err(e)
            }
        }
    }

    // ========== Parameters ==========

    pub fn parameters(&self) -> &[PromptParameter] {
        &self.parameters
    }

    /// Append an empty parameter row and return its id
    pub fn add_parameter(&mut self) -> String {
        self.add_parameter_with("", "")
    }

    /// Append a filled parameter row and return its id
    pub fn add_parameter_with(&mut self, key: impl Into<String>, value: impl Into<String>) -> String {
        let parameter = PromptParameter::new(key, value);
        let id = parameter.id.clone();
        self.parameters.push(parameter);
        id
    }

    /// Change a row's key and value. Returns false if the row is gone.
    pub fn update_parameter(&mut self, id: &str, key: impl Into<String>, value: impl Into<String>) -> bool {
        match self.parameters.iter_mut().find(|p| p.id == id) {
            Some(parameter) => {
                parameter.key = key.into();
                parameter.value = value.into();
                true
            }
            None => false,
        }
    }

    pub fn remove_parameter(&mut self, id: &str) -> bool {
        let before = self.parameters.len();
        self.parameters.retain(|p| p.id != id);
        self.parameters.len() != before
    }

    // ========== Tags ==========

    pub fn tags(&self) -> &TagSet {
        &self.tags
    }

    pub fn tag_input(&self) -> &str {
        &self.tag_input
    }

    /// Replace the pending tag text
    ///
    /// Typing a comma commits everything before it; the text after the last
    /// comma stays pending.
    pub fn set_tag_input(&mut self, text: impl Into<String>) {
        let text = text.into();
        match text.rsplit_once(',') {
            Some((committed, pending)) => {
                for tag in committed.split(',') {
                    self.tags.insert(tag);
                }
                self.tag_input = pending.to_string();
            }
            None => self.tag_input = text,
        }
    }

    /// Handle a delimiter key press in the tag field
    pub fn handle_tag_key(&mut self, key: TagKey) {
        match key {
            TagKey::Enter | TagKey::Comma => self.commit_tag_input(),
        }
    }

    /// Turn the pending text into a tag (trimmed, deduplicated)
    pub fn commit_tag_input(&mut self) {
        let pending = std::mem::take(&mut self.tag_input);
        self.tags.insert(&pending);
    }

    pub fn add_tag(&mut self, tag: &str) -> bool {
        self.tags.insert(tag)
    }

    pub fn remove_tag(&mut self, tag: &str) -> bool {
        self.tags.remove(tag)
    }

    pub fn clear_tags(&mut self) {
        self.tags.clear();
    }

    // ========== Save ==========

    /// Validate and build the entry, stamping new entries with the current time
    pub fn save(&self) -> Result<PromptEntry, ValidationError> {
        self.save_at(Utc::now())
    }

    /// Validate and build the entry, stamping new entries with `now`
    ///
    /// Editing keeps the original id, creation time and favorite flag.
    /// Parameter rows with a blank key are dropped, and pending tag text is
    /// folded in as a final tag.
    pub fn save_at(&self, now: DateTime<Utc>) -> Result<PromptEntry, ValidationError> {
        if self.prompt.trim().is_empty() {
            return Err(ValidationError::MissingPrompt);
        }
        if self.before_image.is_none() && self.after_image.is_none() {
            return Err(ValidationError::MissingImage);
        }

        let mut tags = self.tags.clone();
        tags.insert(&self.tag_input);

        let parameters = self
            .parameters
            .iter()
            .filter(|p| !p.key.trim().is_empty())
            .cloned()
            .collect();

        let model = Some(self.model.trim())
            .filter(|m| !m.is_empty())
            .map(str::to_string);

        let (id, created_at, is_favorite) = match &self.original {
            Some(original) => (original.id.clone(), original.created_at, original.is_favorite),
            None => (new_id(), now, false),
        };

        Ok(PromptEntry {
            id,
            before_image: self.before_image.clone(),
            after_image: self.after_image.clone(),
            prompt: self.prompt.clone(),
            model,
            parameters,
            tags,
            created_at,
            is_favorite,
        })
    }
}
