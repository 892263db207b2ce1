//! Index from remote project id to the note currently carrying it.
//!
//! Rebuilt from the vault on every run and never persisted, so it reflects
//! moves and archival done by earlier runs as well as manual edits.

use crate::fs::FileSystem;
use crate::vault::{self, LocalFile, Vault};
use std::collections::HashMap;

/// Two notes claiming the same remote id. The later note in enumeration
/// order is kept.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DuplicateLink {
    pub todoist_id: String,
    /// Path now registered for the id
    pub kept: String,
    /// Path that lost the id
    pub shadowed: String,
}

#[derive(Debug, Default)]
pub struct FileIndex {
    by_id: HashMap<String, LocalFile>,
    duplicates: Vec<DuplicateLink>,
}

impl FileIndex {
    /// Register every file whose header carries a `TodoistId`.
    pub fn build(files: impl IntoIterator<Item = LocalFile>) -> Self {
        let mut index = Self::default();

        for file in files {
            let Some(id) = file.todoist_id() else {
                continue;
            };

            let path = file.path.clone();
            if let Some(previous) = index.by_id.insert(id.clone(), file) {
                tracing::warn!(
                    "Notes {} and {} both link project {}; using {}",
                    previous.path,
                    path,
                    id,
                    path
                );
                index.duplicates.push(DuplicateLink {
                    todoist_id: id,
                    kept: path,
                    shadowed: previous.path,
                });
            }
        }

        index
    }

    /// Enumerate the vault's notes and index them.
    pub async fn load<F: FileSystem>(vault: &Vault<F>) -> vault::Result<Self> {
        let notes = vault.list_notes().await?;
        let index = Self::build(notes);
        tracing::debug!("Indexed {} linked note(s)", index.by_id.len());
        Ok(index)
    }

    pub fn get(&self, todoist_id: &str) -> Option<&LocalFile> {
        self.by_id.get(todoist_id)
    }

    /// Linked notes, sorted by remote id.
    pub fn entries(&self) -> Vec<(&str, &LocalFile)> {
        let mut entries: Vec<_> = self
            .by_id
            .iter()
            .map(|(id, file)| (id.as_str(), file))
            .collect();
        entries.sort_by(|a, b| a.0.cmp(b.0));
        entries
    }

    pub fn duplicates(&self) -> &[DuplicateLink] {
        &self.duplicates
    }
}
