//! FileSystem trait abstraction for the document store the reconciler drives.
//!
//! Implementations:
//! - `InMemoryFs` - For testing
//! - `NativeFs` (in sync-daemon) - Uses tokio::fs against a vault directory
//!
//! All paths are vault-relative, `/`-separated, with no leading slash.

use async_trait::async_trait;
use std::collections::{HashMap, HashSet};
use std::sync::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum FsError {
    #[error("File not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Is a directory: {0}")]
    IsDirectory(String),

    #[error("Not a directory: {0}")]
    NotDirectory(String),

    #[error("IO error: {0}")]
    Io(String),
}

pub type Result<T> = std::result::Result<T, FsError>;

/// Directory entry
#[derive(Debug, Clone)]
pub struct FileEntry {
    /// File or directory name (not full path)
    pub name: String,
    /// Whether this is a directory
    pub is_dir: bool,
}

/// Platform-independent document store.
///
/// Implementations must be `Send + Sync` so a run can be driven from a
/// spawned task.
#[async_trait]
pub trait FileSystem: Send + Sync {
    /// Read file contents
    async fn read(&self, path: &str) -> Result<Vec<u8>>;

    /// Write file contents (creates parent directories if needed)
    async fn write(&self, path: &str, content: &[u8]) -> Result<()>;

    /// List directory contents
    async fn list(&self, path: &str) -> Result<Vec<FileEntry>>;

    /// Check if path exists
    async fn exists(&self, path: &str) -> Result<bool>;

    /// Create directory (and parents if needed)
    async fn mkdir(&self, path: &str) -> Result<()>;

    /// Move or rename a file or directory.
    ///
    /// Fails with `AlreadyExists` instead of overwriting the destination.
    async fn rename(&self, from: &str, to: &str) -> Result<()>;

    /// Recoverable delete of a file or directory.
    async fn trash(&self, path: &str) -> Result<()>;
}

/// In-memory filesystem for testing
pub struct InMemoryFs {
    files: RwLock<HashMap<String, Vec<u8>>>,
    dirs: RwLock<HashSet<String>>,
    /// Paths handed to `trash`, in call order
    trashed: RwLock<Vec<String>>,
    /// Number of mutating operations that changed state
    mutations: AtomicUsize,
}

impl InMemoryFs {
    pub fn new() -> Self {
        let mut dirs = HashSet::new();
        dirs.insert(String::new()); // Root directory
        Self {
            files: RwLock::new(HashMap::new()),
            dirs: RwLock::new(dirs),
            trashed: RwLock::new(Vec::new()),
            mutations: AtomicUsize::new(0),
        }
    }

    /// Number of state-changing operations performed so far.
    pub fn mutation_count(&self) -> usize {
        self.mutations.load(Ordering::SeqCst)
    }

    /// Paths that were moved to the trash, oldest first.
    pub fn trashed(&self) -> Vec<String> {
        self.trashed.read().unwrap().clone()
    }

    /// All file paths currently stored, sorted.
    pub fn file_paths(&self) -> Vec<String> {
        let mut paths: Vec<String> = self.files.read().unwrap().keys().cloned().collect();
        paths.sort();
        paths
    }

    fn bump(&self) {
        self.mutations.fetch_add(1, Ordering::SeqCst);
    }

    fn normalize_path(path: &str) -> String {
        path.trim_matches('/').to_string()
    }

    fn parent_path(path: &str) -> Option<String> {
        let normalized = Self::normalize_path(path);
        if normalized.is_empty() {
            None
        } else {
            match normalized.rfind('/') {
                Some(pos) => Some(normalized[..pos].to_string()),
                None => Some(String::new()),
            }
        }
    }

    /// Remove a path and everything beneath it. Returns false if nothing matched.
    fn remove_tree(&self, path: &str) -> bool {
        let prefix = format!("{}/", path);
        let mut files = self.files.write().unwrap();
        let mut dirs = self.dirs.write().unwrap();

        if files.remove(path).is_some() {
            return true;
        }
        if !dirs.remove(path) {
            return false;
        }
        files.retain(|p, _| !p.starts_with(&prefix));
        dirs.retain(|p| !p.starts_with(&prefix));
        true
    }
}

impl Default for InMemoryFs {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl FileSystem for InMemoryFs {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        match files.get(&path) {
            Some(content) => Ok(content.clone()),
            None if self.dirs.read().unwrap().contains(&path) => Err(FsError::IsDirectory(path)),
            None => Err(FsError::NotFound(path)),
        }
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        let path = Self::normalize_path(path);
        if self.dirs.read().unwrap().contains(&path) {
            return Err(FsError::IsDirectory(path));
        }

        // Create parent directories
        if let Some(parent) = Self::parent_path(&path) {
            self.mkdir(&parent).await?;
        }

        let mut files = self.files.write().unwrap();
        files.insert(path, content.to_vec());
        drop(files);

        self.bump();
        Ok(())
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        let path = Self::normalize_path(path);
        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{}/", path)
        };

        // Lock order everywhere: files, then dirs
        let files = self.files.read().unwrap();
        let dirs = self.dirs.read().unwrap();
        if !dirs.contains(&path) {
            if files.contains_key(&path) {
                return Err(FsError::NotDirectory(path));
            }
            return Err(FsError::NotFound(path));
        }

        let mut entries = Vec::new();
        let mut seen = HashSet::new();

        for file_path in files.keys() {
            if let Some(rest) = file_path.strip_prefix(&prefix) {
                if !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: false,
                    });
                }
            }
        }

        for dir_path in dirs.iter() {
            if let Some(rest) = dir_path.strip_prefix(&prefix) {
                if !rest.is_empty() && !rest.contains('/') && seen.insert(rest.to_string()) {
                    entries.push(FileEntry {
                        name: rest.to_string(),
                        is_dir: true,
                    });
                }
            }
        }

        Ok(entries)
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        let path = Self::normalize_path(path);
        let files = self.files.read().unwrap();
        let dirs = self.dirs.read().unwrap();
        Ok(files.contains_key(&path) || dirs.contains(&path))
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Ok(()); // Root always exists
        }
        if self.files.read().unwrap().contains_key(&path) {
            return Err(FsError::NotDirectory(path));
        }

        // Create parent first
        if let Some(parent) = Self::parent_path(&path) {
            Box::pin(self.mkdir(&parent)).await?;
        }

        let mut dirs = self.dirs.write().unwrap();
        if dirs.insert(path) {
            drop(dirs);
            self.bump();
        }
        Ok(())
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        let from = Self::normalize_path(from);
        let to = Self::normalize_path(to);

        if self.exists(&to).await? {
            return Err(FsError::AlreadyExists(to));
        }
        if !self.exists(&from).await? {
            return Err(FsError::NotFound(from));
        }
        if let Some(parent) = Self::parent_path(&to) {
            self.mkdir(&parent).await?;
        }

        let from_prefix = format!("{}/", from);
        let mut files = self.files.write().unwrap();
        let mut dirs = self.dirs.write().unwrap();

        if let Some(content) = files.remove(&from) {
            files.insert(to, content);
        } else {
            dirs.remove(&from);
            dirs.insert(to.clone());

            let moved_files: Vec<String> = files
                .keys()
                .filter(|p| p.starts_with(&from_prefix))
                .cloned()
                .collect();
            for old in moved_files {
                if let Some(content) = files.remove(&old) {
                    files.insert(format!("{}/{}", to, &old[from_prefix.len()..]), content);
                }
            }

            let moved_dirs: Vec<String> = dirs
                .iter()
                .filter(|p| p.starts_with(&from_prefix))
                .cloned()
                .collect();
            for old in moved_dirs {
                dirs.remove(&old);
                dirs.insert(format!("{}/{}", to, &old[from_prefix.len()..]));
            }
        }
        drop(files);
        drop(dirs);

        self.bump();
        Ok(())
    }

    async fn trash(&self, path: &str) -> Result<()> {
        let path = Self::normalize_path(path);
        if path.is_empty() {
            return Err(FsError::Io("Refusing to trash the vault root".to_string()));
        }
        if !self.remove_tree(&path) {
            return Err(FsError::NotFound(path));
        }
        self.trashed.write().unwrap().push(path);
        self.bump();
        Ok(())
    }
}

// Implement FileSystem for Arc<T> where T: FileSystem
// This allows a test to keep a handle on the store it gave to a Vault
#[async_trait]
impl<T: FileSystem + Send + Sync> FileSystem for std::sync::Arc<T> {
    async fn read(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read(path).await
    }

    async fn write(&self, path: &str, content: &[u8]) -> Result<()> {
        (**self).write(path, content).await
    }

    async fn list(&self, path: &str) -> Result<Vec<FileEntry>> {
        (**self).list(path).await
    }

    async fn exists(&self, path: &str) -> Result<bool> {
        (**self).exists(path).await
    }

    async fn mkdir(&self, path: &str) -> Result<()> {
        (**self).mkdir(path).await
    }

    async fn rename(&self, from: &str, to: &str) -> Result<()> {
        (**self).rename(from, to).await
    }

    async fn trash(&self, path: &str) -> Result<()> {
        (**self).trash(path).await
    }
}
