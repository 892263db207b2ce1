//! todoist-sync-core: Mirrors a remote Todoist project hierarchy into vault notes.
//!
//! This crate provides the core functionality for:
//! - Parsing and editing note headers
//! - Resolving project placement from the parent chain
//! - Reconciling linked notes: create, move, archive, prune
//! - FileSystem and ProjectSource trait abstractions

pub mod cleanup;
pub mod fs;
pub mod hierarchy;
pub mod index;
pub mod markdown;
pub mod project;
pub mod reconcile;
pub mod template;
pub mod vault;

pub use cleanup::TreeCleanup;
pub use fs::{FileEntry, FileSystem, FsError, InMemoryFs};
pub use hierarchy::{HierarchyError, ProjectTree, resolve_path};
pub use index::{DuplicateLink, FileIndex};
pub use project::{ProjectSource, RemoteError, RemoteProject, StaticProjects};
pub use reconcile::{
    ReconcileConfig, ReconcileError, ReconcileReport, Reconciler, StoreConflict, SyncAction,
};
pub use template::NoteTemplate;
pub use vault::{LocalFile, Vault, VaultError};
