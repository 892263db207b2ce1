//! Removal of folders left empty after a note moves out.

use crate::fs::FileSystem;
use crate::vault::{self, Vault, parent_folder};

/// Walks upward from a folder, trashing each ancestor that is now empty.
pub struct TreeCleanup<'a, F: FileSystem> {
    vault: &'a Vault<F>,
    /// Configured project root; never trashed, nor is anything above it
    project_root: &'a str,
}

impl<'a, F: FileSystem> TreeCleanup<'a, F> {
    pub fn new(vault: &'a Vault<F>, project_root: &'a str) -> Self {
        Self {
            vault,
            project_root: project_root.trim_matches('/'),
        }
    }

    /// Trash `folder` if empty, then its parent if that became empty, and so on.
    ///
    /// Stops at the first non-empty or missing folder, at the project root, or
    /// at the vault root. Returns the trashed folders, deepest first.
    pub async fn prune_empty_ancestors(&self, folder: &str) -> vault::Result<Vec<String>> {
        let mut trashed = Vec::new();
        let mut current = folder.trim_matches('/').to_string();

        while !current.is_empty() && !self.is_protected(&current) {
            if !self.vault.is_empty_folder(&current).await? {
                break;
            }

            self.vault.trash(&current).await?;
            tracing::info!("Trashed empty folder: {}", current);

            let parent = parent_folder(&current).to_string();
            trashed.push(current);
            current = parent;
        }

        Ok(trashed)
    }

    /// The project root and every folder above it.
    fn is_protected(&self, folder: &str) -> bool {
        folder == self.project_root
            || self
                .project_root
                .strip_prefix(folder)
                .is_some_and(|rest| rest.starts_with('/'))
    }
}

/// Convenience wrapper around [`TreeCleanup::prune_empty_ancestors`].
pub async fn prune_empty_ancestors<F: FileSystem>(
    vault: &Vault<F>,
    project_root: &str,
    folder: &str,
) -> vault::Result<Vec<String>> {
    TreeCleanup::new(vault, project_root)
        .prune_empty_ancestors(folder)
        .await
}
