use indexmap::IndexMap;
use std::collections::HashSet;
use tracing::{debug, info, warn};

use super::data::PromptEntry;
use super::storage::Storage;
use crate::error::PersistenceError;

/// The EntryStore owns the catalog.
/// It holds the ordered sequence of entries (newest additions first) and
/// writes the whole sequence to its storage slot after every mutation.
///
/// Mutations always update memory first. A failed write is returned to the
/// caller as a non-fatal warning; the in-memory sequence stays as mutated.
pub struct EntryStore<S: Storage> {
    storage: S,
    key: String,
    entries: Vec<PromptEntry>,
}

impl<S: Storage> EntryStore<S> {
    /// Load the persisted sequence from `storage[key]`.
    ///
    /// Never fails: a missing slot, a read error or unparseable JSON all
    /// yield an empty catalog.
    pub fn load(storage: S, key: impl Into<String>) -> Self {
        let key = key.into();

        let entries = match storage.get(&key) {
            Ok(Some(json)) => match serde_json::from_str::<Vec<PromptEntry>>(&json) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!(key = %key, error = %e, "Persisted entries are unreadable, starting empty");
                    Vec::new()
                }
            },
            Ok(None) => Vec::new(),
            Err(e) => {
                warn!(key = %key, error = %e, "Could not read persisted entries, starting empty");
                Vec::new()
            }
        };

        info!(count = entries.len(), "Entry store loaded");
        Self { storage, key, entries }
    }

    /// All entries in store order
    pub fn entries(&self) -> &[PromptEntry] {
        &self.entries
    }

    pub fn get(&self, id: &str) -> Option<&PromptEntry> {
        self.entries.iter().find(|e| e.id == id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the entry with the same id in place, or prepend a new one
    pub fn upsert(&mut self, entry: PromptEntry) -> Result<(), PersistenceError> {
        match self.entries.iter_mut().find(|e| e.id == entry.id) {
            Some(existing) => {
                debug!(id = %entry.id, "Replacing entry");
                *existing = entry;
            }
            None => {
                debug!(id = %entry.id, "Adding entry");
                self.entries.insert(0, entry);
            }
        }
        self.persist()
    }

    /// Upsert many entries with a single write
    ///
    /// Existing ids are replaced in place; new entries are prepended in the
    /// order given. Repeated ids within the batch collapse to the last one,
    /// kept at the position of the first.
    pub fn import_many(&mut self, entries: Vec<PromptEntry>) -> Result<(), PersistenceError> {
        let total = entries.len();
        let mut batch: IndexMap<String, PromptEntry> = IndexMap::with_capacity(total);
        for entry in entries {
            batch.insert(entry.id.clone(), entry);
        }
        if batch.len() < total {
            warn!(duplicates = total - batch.len(), "Import batch repeats ids, keeping the last of each");
        }

        let mut fresh = Vec::new();
        for (_, entry) in batch {
            match self.entries.iter_mut().find(|e| e.id == entry.id) {
                Some(existing) => *existing = entry,
                None => fresh.push(entry),
            }
        }

        info!(added = fresh.len(), "Importing entries");
        fresh.append(&mut self.entries);
        self.entries = fresh;
        self.persist()
    }

    /// Remove the entry with `id`. Absent ids are a no-op (no write).
    pub fn delete(&mut self, id: &str) -> Result<(), PersistenceError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Ok(());
        }
        debug!(id = %id, "Deleted entry");
        self.persist()
    }

    /// Remove every entry whose id is in `ids`, with a single write
    pub fn delete_many(&mut self, ids: &HashSet<String>) -> Result<(), PersistenceError> {
        let before = self.entries.len();
        self.entries.retain(|e| !ids.contains(&e.id));
        let removed = before - self.entries.len();
        if removed == 0 {
            return Ok(());
        }
        info!(removed, "Deleted entries");
        self.persist()
    }

    /// Flip the favorite flag of `id`. Absent ids are a no-op.
    pub fn toggle_favorite(&mut self, id: &str) -> Result<(), PersistenceError> {
        let Some(entry) = self.entries.iter_mut().find(|e| e.id == id) else {
            return Ok(());
        };
        entry.is_favorite = !entry.is_favorite;
        debug!(id = %id, favorite = entry.is_favorite, "Toggled favorite");
        self.persist()
    }

    /// Access the underlying storage
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Write the full sequence to the storage slot
    fn persist(&mut self) -> Result<(), PersistenceError> {
        let result = serde_json::to_string(&self.entries)
            .map_err(PersistenceError::from)
            .and_then(|json| self.storage.set(&self.key, &json));

        if let Err(e) = &result {
            warn!(error = %e, "Could not persist entries; changes are kept in memory only");
        }
        result
    }
}

// Implement Debug for better error messages
impl<S: Storage> std::fmt::Debug for EntryStore<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntryStore")
            .field("key", &self.key)
            .field("entries", &self.entries.len())
            .finish()
    }
}
