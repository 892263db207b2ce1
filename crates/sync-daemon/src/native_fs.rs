//! Native filesystem implementation using tokio::fs.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use todoist_sync_core::fs::{FileEntry, FileSystem, FsError, Result};
use tokio::fs;

/// Hidden folder under the vault root that receives trashed entries.
pub const TRASH_DIR: &str = ".trash";

/// Native filesystem implementation for the daemon
pub struct NativeFs {
    base_path: PathBuf,
}

impl NativeFs {
    pub fn new(base_path: PathBuf) -> Self {
        Self { base_path }
    }

    fn full_path(&self, path: &str) -> PathBuf {
        let path = path.trim_matches('/');
        if path.is_empty() {
            self.base_path.clone()
        } else {
            self.base_path.join(path)
        }
    }

    /// First free name in the trash folder for an entry called `name`.
    async fn trash_destination(&self, name: &str) -> Result<PathBuf> {
        let trash = self.base_path.join(TRASH_DIR);
        fs::create_dir_all(&trash)
            .await
            .map_err(|e| map_io(e, TRASH_DIR))?;

        let mut candidate = trash.join(name);
        let mut counter = 1;
        while fs::try_exists(&candidate).await.unwrap_or(false) {
            candidate = trash.join(format!("{} {}", name, counter));
            counter += 1;
        }
        Ok(candidate)
    }
}

fn map_io(e: std::io::Error, path: &str) -> FsError {
    match e.kind() {
        ErrorKind::NotFound => FsError::NotFound(path.to_string()),
        ErrorKind::AlreadyExists => FsError::AlreadyExists(path.to_string()),
        _ => FsError::Io(format!("{}: {}", path, e)),
    }
}

#[async_trait]
impl FileSystem for NativeFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let full_path = self.full_path(path);
        if full_path.is_dir() {
            return Err(FsError::IsDirectory(path.to_string()));
        }
        fs::read(&full_path).await.map_err(|e| map_io(e, path))
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let full_path = self.full_path(path);

        // Create parent directories if needed
        if let Some(parent) = full_path.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, path))?;
        }

        fs::write(&full_path, content)
            .await
            .map_err(|e| map_io(e, path))
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let full_path = self.full_path(path);
        if full_path.is_file() {
            return Err(FsError::NotDirectory(path.to_string()));
        }
        let mut entries = Vec::new();

        let mut dir = fs::read_dir(&full_path)
            .await
            .map_err(|e| map_io(e, path))?;

        while let Some(entry) = dir.next_entry().await.map_err(|e| map_io(e, path))? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await.map_err(|e| map_io(e, path))?;

            entries.push(FileEntry {
                name,
                is_dir: metadata.is_dir(),
            });
        }

        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let full_path = self.full_path(path);
        fs::try_exists(&full_path)
            .await
            .map_err(|e| map_io(e, path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let full_path = self.full_path(path);
        if full_path.is_file() {
            return Err(FsError::NotDirectory(path.to_string()));
        }
        fs::create_dir_all(&full_path)
            .await
            .map_err(|e| map_io(e, path))
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let source = self.full_path(from);
        let target = self.full_path(to);

        // fs::rename silently replaces files on Unix
        if fs::try_exists(&target).await.map_err(|e| map_io(e, to))? {
            return Err(FsError::AlreadyExists(to.to_string()));
        }
        if !fs::try_exists(&source).await.map_err(|e| map_io(e, from))? {
            return Err(FsError::NotFound(from.to_string()));
        }
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| map_io(e, to))?;
        }

        fs::rename(&source, &target)
            .await
            .map_err(|e| map_io(e, from))
    }

    async fn trash(&self, path: &str) -> Result<()> {
        let trimmed = path.trim_matches('/');
        if trimmed.is_empty() {
            return Err(FsError::Io("Refusing to trash the vault root".to_string()));
        }

        let source = self.full_path(trimmed);
        if !fs::try_exists(&source).await.map_err(|e| map_io(e, path))? {
            return Err(FsError::NotFound(path.to_string()));
        }

        let name = trimmed.rsplit('/').next().unwrap_or(trimmed);
        let destination = self.trash_destination(name).await?;
        fs::rename(&source, &destination)
            .await
            .map_err(|e| map_io(e, path))
    }
}
