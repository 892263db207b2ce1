//! Vault: note-level operations over a `FileSystem`.
//!
//! This is the document store the reconciler works against: existence checks,
//! folder creation, note enumeration with parsed headers, creation, moves,
//! header edits and recoverable deletes.

use crate::fs::{FileSystem, FsError};
use crate::markdown::{self, Header, PROJECT_NAME_KEY, TODOIST_ID_KEY};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Filesystem error: {0}")]
    Fs(#[from] FsError),

    #[error("Note is not valid UTF-8: {0}")]
    InvalidUtf8(String),

    #[error("Invalid vault path '{path}': {reason}")]
    InvalidPath { path: String, reason: &'static str },
}

pub type Result<T> = std::result::Result<T, VaultError>;

/// A markdown note in the vault and its parsed header.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalFile {
    /// Vault-relative path including the `.md` suffix
    pub path: String,
    pub header: Option<Header>,
}

impl LocalFile {
    /// Remote project id this note is linked to, if any.
    pub fn todoist_id(&self) -> Option<String> {
        self.header
            .as_ref()
            .and_then(|h| markdown::header_string(h, TODOIST_ID_KEY))
    }

    /// Name recorded when the note was archived, if any.
    pub fn project_name(&self) -> Option<String> {
        self.header
            .as_ref()
            .and_then(|h| markdown::header_string(h, PROJECT_NAME_KEY))
    }

    /// File name without folder or `.md` suffix.
    pub fn base_name(&self) -> &str {
        file_stem(&self.path)
    }

    /// Folder containing the note (`""` for the vault root).
    pub fn folder(&self) -> &str {
        parent_folder(&self.path)
    }
}

/// Folder part of a vault path (`""` for top-level entries).
pub fn parent_folder(path: &str) -> &str {
    match path.trim_end_matches('/').rfind('/') {
        Some(pos) => &path[..pos],
        None => "",
    }
}

/// Last path segment without a trailing `.md`.
pub fn file_stem(path: &str) -> &str {
    let name = match path.rfind('/') {
        Some(pos) => &path[pos + 1..],
        None => path,
    };
    name.strip_suffix(".md").unwrap_or(name)
}

/// Reject paths that could escape the vault or address something odd.
pub fn validate_path(path: &str) -> Result<()> {
    let reason = if path.split('/').any(|segment| segment == ".." || segment == ".") {
        Some("path traversal not allowed")
    } else if path.starts_with('/') {
        Some("absolute path not allowed")
    } else if path.contains("//") {
        Some("empty path segment not allowed")
    } else if path.contains('\\') {
        Some("backslash in path not allowed")
    } else if path.chars().any(|c| c.is_control()) {
        Some("control character in path not allowed")
    } else if path.len() > 1024 {
        Some("path too long")
    } else {
        None
    };

    match reason {
        Some(reason) => Err(VaultError::InvalidPath {
            path: path.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Note-level access to a vault
pub struct Vault<F: FileSystem> {
    fs: F,
}

impl<F: FileSystem> Vault<F> {
    pub fn new(fs: F) -> Self {
        Self { fs }
    }

    /// Underlying filesystem
    pub fn fs(&self) -> &F {
        &self.fs
    }

    pub async fn exists(&self, path: &str) -> Result<bool> {
        Ok(self.fs.exists(path).await?)
    }

    /// Create a folder and its parents. A no-op when it already exists.
    pub async fn create_folder(&self, path: &str) -> Result<()> {
        validate_path(path)?;
        if path.is_empty() || self.fs.exists(path).await? {
            return Ok(());
        }
        self.fs.mkdir(path).await?;
        tracing::debug!("Created folder: {}", path);
        Ok(())
    }

    /// List all markdown files in the vault, sorted by path.
    ///
    /// Hidden entries (`.trash`, `.obsidian`, ...) are skipped at every level.
    pub async fn list_files(&self) -> Result<Vec<String>> {
        let mut files = Vec::new();
        let mut dirs_to_visit = vec![String::new()]; // Start with root

        while let Some(dir) = dirs_to_visit.pop() {
            let entries = self.fs.list(&dir).await?;

            for entry in entries {
                if entry.name.starts_with('.') {
                    continue;
                }

                let path = if dir.is_empty() {
                    entry.name.clone()
                } else {
                    format!("{}/{}", dir, entry.name)
                };

                if entry.is_dir {
                    dirs_to_visit.push(path);
                } else if path.ends_with(".md") {
                    files.push(path);
                }
            }
        }

        files.sort();
        Ok(files)
    }

    /// Enumerate notes together with their parsed headers.
    ///
    /// Notes that cannot be read are logged and skipped rather than failing
    /// the whole listing.
    pub async fn list_notes(&self) -> Result<Vec<LocalFile>> {
        let mut notes = Vec::new();
        for path in self.list_files().await? {
            match self.read_header(&path).await {
                Ok(header) => notes.push(LocalFile { path, header }),
                Err(e) => tracing::warn!("Skipping unreadable note {}: {}", path, e),
            }
        }
        Ok(notes)
    }

    pub async fn read(&self, path: &str) -> Result<String> {
        let bytes = self.fs.read(path).await?;
        String::from_utf8(bytes).map_err(|_| VaultError::InvalidUtf8(path.to_string()))
    }

    pub async fn read_header(&self, path: &str) -> Result<Option<Header>> {
        let raw = self.read(path).await?;
        Ok(markdown::parse(&raw).header)
    }

    pub async fn read_body(&self, path: &str) -> Result<String> {
        let raw = self.read(path).await?;
        Ok(markdown::parse(&raw).body.to_string())
    }

    /// Load a single note with its header.
    pub async fn note(&self, path: &str) -> Result<LocalFile> {
        let header = self.read_header(path).await?;
        Ok(LocalFile {
            path: path.to_string(),
            header,
        })
    }

    /// Create a new note. Fails with `AlreadyExists` rather than overwriting.
    pub async fn create(&self, path: &str, content: &str) -> Result<()> {
        validate_path(path)?;
        if self.fs.exists(path).await? {
            return Err(FsError::AlreadyExists(path.to_string()).into());
        }
        self.fs.write(path, content.as_bytes()).await?;
        Ok(())
    }

    /// Move or rename a note; content is untouched.
    pub async fn move_or_rename(&self, from: &str, to: &str) -> Result<()> {
        validate_path(to)?;
        self.fs.rename(from, to).await?;
        Ok(())
    }

    /// Rewrite a note's content through `mutation`, skipping the write when
    /// nothing changed.
    pub async fn modify<M>(&self, path: &str, mutation: M) -> Result<bool>
    where
        M: FnOnce(&str) -> String + Send,
    {
        let raw = self.read(path).await?;
        let updated = mutation(&raw);
        if updated == raw {
            return Ok(false);
        }
        self.fs.write(path, updated.as_bytes()).await?;
        Ok(true)
    }

    /// Add `key: value` to a note's header, keeping the rest of the file intact.
    pub async fn insert_header_field(&self, path: &str, key: &str, value: &str) -> Result<()> {
        self.modify(path, |raw| markdown::insert_field(raw, key, value))
            .await?;
        Ok(())
    }

    /// Whether a folder exists and has no entries at all.
    pub async fn is_empty_folder(&self, path: &str) -> Result<bool> {
        if !self.fs.exists(path).await? {
            return Ok(false);
        }
        match self.fs.list(path).await {
            Ok(entries) => Ok(entries.is_empty()),
            Err(FsError::NotDirectory(_)) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// Recoverable delete of a file or folder.
    pub async fn trash(&self, path: &str) -> Result<()> {
        self.fs.trash(path).await?;
        Ok(())
    }
}
