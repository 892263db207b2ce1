//! Reconciliation of the remote project hierarchy into vault notes.
//!
//! One run:
//! 1. Ensures the project root exists and rebuilds the [`FileIndex`].
//! 2. Walks the fetched projects root-first. Each project's note is left
//!    alone if already at its target path, created if no note carries its id,
//!    or moved from wherever the linked note currently is.
//! 3. Archives every linked note whose project was not in the fetch.
//!
//! Every effect is a [`SyncAction`] applied on its own. Actions are awaited
//! one at a time, so two actions never touch the same path concurrently.
//! Faults local to one project or one action are collected in the
//! [`ReconcileReport`] and the run carries on; re-running converges from any
//! partially applied state.

use crate::cleanup::TreeCleanup;
use crate::fs::{FileSystem, FsError};
use crate::hierarchy::{HierarchyError, ProjectTree, join_path, sanitize_segment};
use crate::index::{DuplicateLink, FileIndex};
use crate::markdown::PROJECT_NAME_KEY;
use crate::project::{ProjectSource, RemoteError, RemoteProject};
use crate::template::NoteTemplate;
use crate::vault::{self, LocalFile, Vault, VaultError, parent_folder};
use std::collections::HashSet;
use std::fmt;
use thiserror::Error;

/// Subfolder of the project root holding notes of deleted projects.
pub const ARCHIVE_FOLDER: &str = "archive";

/// Failures that abort a whole run.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("Failed to fetch projects: {0}")]
    Remote(#[from] RemoteError),

    #[error("Vault error: {0}")]
    Vault(#[from] VaultError),
}

/// What the reconciler needs to know about the vault layout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcileConfig {
    /// Vault-relative folder mirroring the project hierarchy
    pub project_root: String,
    /// Body for newly created notes
    pub template: NoteTemplate,
}

impl Default for ReconcileConfig {
    fn default() -> Self {
        Self {
            project_root: "Projects".to_string(),
            template: NoteTemplate::default(),
        }
    }
}

impl ReconcileConfig {
    pub fn new(project_root: impl Into<String>) -> Self {
        Self {
            project_root: project_root.into().trim_matches('/').to_string(),
            ..Self::default()
        }
    }

    pub fn with_template(mut self, template: NoteTemplate) -> Self {
        self.template = template;
        self
    }

    pub fn archive_folder(&self) -> String {
        join_path([self.project_root.as_str(), ARCHIVE_FOLDER])
    }

    /// Where the note for `todoist_id` lands once archived.
    pub fn archive_path(&self, todoist_id: &str) -> String {
        let file_name = format!("{}.md", sanitize_segment(todoist_id));
        join_path([self.archive_folder().as_str(), file_name.as_str()])
    }
}

/// A single store mutation. Each one is independently retryable.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncAction {
    CreateFolder {
        path: String,
    },
    CreateNote {
        todoist_id: String,
        path: String,
        content: String,
    },
    MoveNote {
        todoist_id: String,
        from: String,
        to: String,
    },
    StampProjectName {
        path: String,
        name: String,
    },
    ArchiveNote {
        todoist_id: String,
        from: String,
        to: String,
    },
    TrashFolder {
        path: String,
    },
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::CreateFolder { path } => write!(f, "create folder {}", path),
            SyncAction::CreateNote { path, .. } => write!(f, "create note {}", path),
            SyncAction::MoveNote { from, to, .. } => write!(f, "move {} -> {}", from, to),
            SyncAction::StampProjectName { path, name } => {
                write!(f, "stamp {}: {} on {}", PROJECT_NAME_KEY, name, path)
            }
            SyncAction::ArchiveNote { from, to, .. } => write!(f, "archive {} -> {}", from, to),
            SyncAction::TrashFolder { path } => write!(f, "trash folder {}", path),
        }
    }
}

/// A note move performed by a run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMove {
    pub from: String,
    pub to: String,
}

/// Why an action was skipped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConflictReason {
    /// Something already sits at the destination
    TargetExists,
    /// The note to move disappeared after the index was built
    SourceMissing,
    /// The note at the target path is linked to a different project
    TargetLinkedTo(String),
}

/// An action skipped because the store changed under the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConflict {
    pub todoist_id: String,
    pub path: String,
    pub reason: ConflictReason,
}

impl fmt::Display for StoreConflict {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.reason {
            ConflictReason::TargetExists => {
                write!(f, "{} already exists (project {})", self.path, self.todoist_id)
            }
            ConflictReason::SourceMissing => {
                write!(f, "{} vanished (project {})", self.path, self.todoist_id)
            }
            ConflictReason::TargetLinkedTo(other) => write!(
                f,
                "{} belongs to project {}, not {}",
                self.path, other, self.todoist_id
            ),
        }
    }
}

/// An action that failed for a reason other than a conflict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    pub action: SyncAction,
    pub error: String,
}

/// Outcome of one run
#[derive(Debug, Default)]
pub struct ReconcileReport {
    /// Actions applied, in order
    pub applied: Vec<SyncAction>,
    /// Notes found already at their target path
    pub verified: Vec<String>,
    /// Projects skipped because their parent chain is broken
    pub faults: Vec<HierarchyError>,
    pub conflicts: Vec<StoreConflict>,
    pub duplicates: Vec<DuplicateLink>,
    pub failures: Vec<ActionFailure>,
}

impl ReconcileReport {
    /// Number of store mutations the run performed
    pub fn action_count(&self) -> usize {
        self.applied.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.applied.is_empty()
    }

    pub fn is_clean(&self) -> bool {
        self.faults.is_empty()
            && self.conflicts.is_empty()
            && self.duplicates.is_empty()
            && self.failures.is_empty()
    }

    pub fn created(&self) -> Vec<&str> {
        self.applied
            .iter()
            .filter_map(|a| match a {
                SyncAction::CreateNote { path, .. } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn moved(&self) -> Vec<FileMove> {
        self.applied
            .iter()
            .filter_map(|a| match a {
                SyncAction::MoveNote { from, to, .. } => Some(FileMove {
                    from: from.clone(),
                    to: to.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn archived(&self) -> Vec<FileMove> {
        self.applied
            .iter()
            .filter_map(|a| match a {
                SyncAction::ArchiveNote { from, to, .. } => Some(FileMove {
                    from: from.clone(),
                    to: to.clone(),
                }),
                _ => None,
            })
            .collect()
    }

    pub fn pruned(&self) -> Vec<&str> {
        self.applied
            .iter()
            .filter_map(|a| match a {
                SyncAction::TrashFolder { path } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }
}

impl fmt::Display for ReconcileReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} moved, {} archived, {} verified, {} folder(s) pruned, \
             {} fault(s), {} conflict(s), {} failure(s)",
            self.created().len(),
            self.moved().len(),
            self.archived().len(),
            self.verified.len(),
            self.pruned().len(),
            self.faults.len(),
            self.conflicts.len(),
            self.failures.len()
        )
    }
}

/// Outcome of trying to apply one action
enum Applied {
    Done,
    Conflict(ConflictReason),
    Failed(String),
}

/// Drives a vault towards the remote project hierarchy
pub struct Reconciler<F: FileSystem> {
    vault: Vault<F>,
    config: ReconcileConfig,
}

impl<F: FileSystem> Reconciler<F> {
    pub fn new(vault: Vault<F>, config: ReconcileConfig) -> Self {
        Self { vault, config }
    }

    /// Fetch the project list and reconcile against it.
    ///
    /// A fetch failure aborts before the vault is touched.
    pub async fn sync<S>(&self, source: &S) -> Result<ReconcileReport, ReconcileError>
    where
        S: ProjectSource + ?Sized,
    {
        let projects = source.fetch_projects().await?;
        tracing::debug!("Fetched {} project(s)", projects.len());
        self.reconcile(&projects).await
    }

    /// Bring the vault in line with `projects`.
    pub async fn reconcile(
        &self,
        projects: &[RemoteProject],
    ) -> Result<ReconcileReport, ReconcileError> {
        let mut report = ReconcileReport::default();

        let root = self.config.project_root.clone();
        if !root.is_empty() && !self.vault.exists(&root).await? {
            let action = SyncAction::CreateFolder { path: root };
            self.apply(&action).await?;
            report.applied.push(action);
        }

        let index = FileIndex::load(&self.vault).await?;
        report.duplicates = index.duplicates().to_vec();

        // Every fetched id counts as handled, including projects whose
        // placement fails, so their existing notes are not archived.
        let handled: HashSet<&str> = projects.iter().map(|p| p.id.as_str()).collect();

        let tree = ProjectTree::new(projects);
        let mut placed = Vec::with_capacity(projects.len());
        for project in projects {
            match tree.note_path(&project.id).and_then(|path| {
                tree.depth(&project.id).map(|depth| (depth, path))
            }) {
                Ok((depth, path)) => placed.push((depth, project, path)),
                Err(fault) => {
                    tracing::error!("Skipping project {} ({}): {}", project.name, project.id, fault);
                    report.faults.push(fault);
                }
            }
        }
        placed.sort_by(|a, b| (a.0, &a.2, &a.1.id).cmp(&(b.0, &b.2, &b.1.id)));

        for (_, project, relative_path) in placed {
            let target = join_path([self.config.project_root.as_str(), relative_path.as_str()]);
            self.reconcile_project(project, &target, &index, &mut report)
                .await;
        }

        for (todoist_id, file) in index.entries() {
            if !handled.contains(todoist_id) {
                self.archive_note(todoist_id, file, &mut report).await;
            }
        }

        Ok(report)
    }

    /// Apply one action to the vault.
    pub async fn apply(&self, action: &SyncAction) -> vault::Result<()> {
        match action {
            SyncAction::CreateFolder { path } => self.vault.create_folder(path).await,
            SyncAction::CreateNote { path, content, .. } => self.vault.create(path, content).await,
            SyncAction::MoveNote { from, to, .. } | SyncAction::ArchiveNote { from, to, .. } => {
                self.vault.move_or_rename(from, to).await
            }
            SyncAction::StampProjectName { path, name } => {
                self.vault
                    .insert_header_field(path, PROJECT_NAME_KEY, name)
                    .await
            }
            SyncAction::TrashFolder { path } => self.vault.trash(path).await,
        }
    }

    async fn reconcile_project(
        &self,
        project: &RemoteProject,
        target: &str,
        index: &FileIndex,
        report: &mut ReconcileReport,
    ) {
        let folder = parent_folder(target).to_string();
        if !self.ensure_folder(&folder, report).await {
            return;
        }

        match self.vault.exists(target).await {
            Ok(true) => {
                self.verify_target(project, target, report).await;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                tracing::error!("Failed to check {}: {}", target, e);
                return;
            }
        }

        let Some(linked) = index.get(&project.id) else {
            let action = SyncAction::CreateNote {
                todoist_id: project.id.clone(),
                path: target.to_string(),
                content: self.config.template.render_note(project),
            };
            self.run_action(action, &project.id, report).await;
            return;
        };

        match self.vault.exists(&linked.path).await {
            Ok(true) => {}
            Ok(false) => {
                self.record_conflict(&project.id, &linked.path, ConflictReason::SourceMissing, report);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to check {}: {}", linked.path, e);
                return;
            }
        }

        let action = SyncAction::MoveNote {
            todoist_id: project.id.clone(),
            from: linked.path.clone(),
            to: target.to_string(),
        };
        if self.run_action(action, &project.id, report).await {
            self.prune(linked.folder(), report).await;
        }
    }

    /// A note already sits at the target path; make sure it is ours.
    async fn verify_target(&self, project: &RemoteProject, target: &str, report: &mut ReconcileReport) {
        match self.vault.note(target).await {
            Ok(note) => match note.todoist_id() {
                Some(other) if other != project.id => {
                    self.record_conflict(
                        &project.id,
                        target,
                        ConflictReason::TargetLinkedTo(other),
                        report,
                    );
                }
                _ => {
                    tracing::debug!("Verified {} for project {}", target, project.id);
                    report.verified.push(target.to_string());
                }
            },
            Err(e) => {
                // Present but unreadable (binary, a folder named like a note, ...)
                tracing::warn!("Cannot read {} for project {}: {}", target, project.id, e);
                self.record_conflict(&project.id, target, ConflictReason::TargetExists, report);
            }
        }
    }

    async fn archive_note(&self, todoist_id: &str, file: &LocalFile, report: &mut ReconcileReport) {
        let archive_folder = self.config.archive_folder();
        if !self.ensure_folder(&archive_folder, report).await {
            return;
        }

        if file.project_name().is_none() {
            let stamp = SyncAction::StampProjectName {
                path: file.path.clone(),
                name: file.base_name().to_string(),
            };
            if !self.run_action(stamp, todoist_id, report).await {
                return;
            }
        }

        let destination = self.config.archive_path(todoist_id);
        if file.path == destination {
            return;
        }

        match self.vault.exists(&destination).await {
            Ok(false) => {}
            Ok(true) => {
                self.record_conflict(todoist_id, &destination, ConflictReason::TargetExists, report);
                return;
            }
            Err(e) => {
                tracing::error!("Failed to check {}: {}", destination, e);
                return;
            }
        }

        let action = SyncAction::ArchiveNote {
            todoist_id: todoist_id.to_string(),
            from: file.path.clone(),
            to: destination,
        };
        if self.run_action(action, todoist_id, report).await {
            self.prune(file.folder(), report).await;
        }
    }

    /// Create `folder` if missing. Returns false if the project must be skipped.
    async fn ensure_folder(&self, folder: &str, report: &mut ReconcileReport) -> bool {
        if folder.is_empty() {
            return true;
        }
        match self.vault.exists(folder).await {
            Ok(true) => true,
            Ok(false) => {
                let action = SyncAction::CreateFolder {
                    path: folder.to_string(),
                };
                self.run_action(action, "", report).await
            }
            Err(e) => {
                tracing::error!("Failed to check folder {}: {}", folder, e);
                false
            }
        }
    }

    async fn prune(&self, folder: &str, report: &mut ReconcileReport) {
        let cleanup = TreeCleanup::new(&self.vault, &self.config.project_root);
        match cleanup.prune_empty_ancestors(folder).await {
            Ok(trashed) => report
                .applied
                .extend(trashed.into_iter().map(|path| SyncAction::TrashFolder { path })),
            Err(e) => {
                tracing::warn!("Failed to prune empty folders above {}: {}", folder, e);
                report.failures.push(ActionFailure {
                    action: SyncAction::TrashFolder {
                        path: folder.to_string(),
                    },
                    error: e.to_string(),
                });
            }
        }
    }

    /// Apply an action and record the outcome. Returns true if it was applied.
    async fn run_action(
        &self,
        action: SyncAction,
        todoist_id: &str,
        report: &mut ReconcileReport,
    ) -> bool {
        let outcome = match self.apply(&action).await {
            Ok(()) => Applied::Done,
            Err(VaultError::Fs(FsError::AlreadyExists(_))) => {
                Applied::Conflict(ConflictReason::TargetExists)
            }
            Err(VaultError::Fs(FsError::NotFound(_))) => {
                Applied::Conflict(ConflictReason::SourceMissing)
            }
            Err(e) => Applied::Failed(e.to_string()),
        };

        match outcome {
            Applied::Done => {
                tracing::info!("Applied: {}", action);
                report.applied.push(action);
                true
            }
            Applied::Conflict(reason) => {
                let path = match &action {
                    SyncAction::CreateFolder { path }
                    | SyncAction::CreateNote { path, .. }
                    | SyncAction::StampProjectName { path, .. }
                    | SyncAction::TrashFolder { path } => path.clone(),
                    SyncAction::MoveNote { from, to, .. }
                    | SyncAction::ArchiveNote { from, to, .. } => match reason {
                        ConflictReason::SourceMissing => from.clone(),
                        _ => to.clone(),
                    },
                };
                self.record_conflict(todoist_id, &path, reason, report);
                false
            }
            Applied::Failed(error) => {
                tracing::error!("Failed to {}: {}", action, error);
                report.failures.push(ActionFailure { action, error });
                false
            }
        }
    }

    fn record_conflict(
        &self,
        todoist_id: &str,
        path: &str,
        reason: ConflictReason,
        report: &mut ReconcileReport,
    ) {
        let conflict = StoreConflict {
            todoist_id: todoist_id.to_string(),
            path: path.to_string(),
            reason,
        };
        tracing::warn!("Skipped: {}", conflict);
        report.conflicts.push(conflict);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fs::InMemoryFs;
    use crate::project::StaticProjects;
    use async_trait::async_trait;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicBool, Ordering};

    fn reconciler(fs: &Arc<InMemoryFs>) -> Reconciler<Arc<InMemoryFs>> {
        Reconciler::new(Vault::new(Arc::clone(fs)), ReconcileConfig::new("Projects"))
    }

    fn home_and_improvement() -> Vec<RemoteProject> {
        vec![
            RemoteProject::new("1", "Home"),
            RemoteProject::new("2", "Improvement").with_parent("1"),
        ]
    }

    #[tokio::test]
    async fn test_first_run_creates_nested_notes() {
        let fs = Arc::new(InMemoryFs::new());
        let report = reconciler(&fs)
            .reconcile(&home_and_improvement())
            .await
            .unwrap();

        assert_eq!(
            report.created(),
            vec!["Projects/Home/Home.md", "Projects/Home/Improvement.md"]
        );
        assert!(report.is_clean());

        let note = Vault::new(Arc::clone(&fs))
            .note("Projects/Home/Improvement.md")
            .await
            .unwrap();
        assert_eq!(note.todoist_id().as_deref(), Some("2"));
    }

    #[tokio::test]
    async fn test_rename_then_delete_scenario() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);

        sync.reconcile(&home_and_improvement()).await.unwrap();
        let home_before = fs.read("Projects/Home/Home.md").await.unwrap();

        // Improvement renamed to Reno
        let renamed = vec![
            RemoteProject::new("1", "Home"),
            RemoteProject::new("2", "Reno").with_parent("1"),
        ];
        let report = sync.reconcile(&renamed).await.unwrap();
        assert_eq!(
            report.moved(),
            vec![FileMove {
                from: "Projects/Home/Improvement.md".to_string(),
                to: "Projects/Home/Reno.md".to_string(),
            }]
        );
        assert!(report.created().is_empty());
        assert_eq!(fs.read("Projects/Home/Home.md").await.unwrap(), home_before);

        // Reno removed remotely; Home loses its only child
        let report = sync
            .reconcile(&[RemoteProject::new("1", "Home")])
            .await
            .unwrap();
        assert_eq!(
            report.archived(),
            vec![FileMove {
                from: "Projects/Home/Reno.md".to_string(),
                to: "Projects/archive/2.md".to_string(),
            }]
        );

        let archived = Vault::new(Arc::clone(&fs))
            .note("Projects/archive/2.md")
            .await
            .unwrap();
        assert_eq!(archived.project_name().as_deref(), Some("Reno"));
        assert_eq!(archived.todoist_id().as_deref(), Some("2"));

        // Childless Home now sits directly under the root and its folder is gone
        assert!(fs.exists("Projects/Home.md").await.unwrap());
        assert!(!fs.exists("Projects/Home").await.unwrap());
        assert_eq!(report.pruned(), vec!["Projects/Home"]);
    }

    #[tokio::test]
    async fn test_second_run_is_idempotent() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        let projects = vec![
            RemoteProject::new("1", "Home"),
            RemoteProject::new("2", "Improvement").with_parent("1"),
            RemoteProject::new("3", "Garden").with_parent("2"),
            RemoteProject::new("4", "Work"),
        ];

        let first = sync.reconcile(&projects).await.unwrap();
        assert!(first.has_changes());
        let mutations = fs.mutation_count();

        let second = sync.reconcile(&projects).await.unwrap();

        assert_eq!(second.action_count(), 0);
        assert_eq!(second.verified.len(), 4);
        assert_eq!(fs.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_archival_is_idempotent() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        sync.reconcile(&home_and_improvement()).await.unwrap();
        sync.reconcile(&[RemoteProject::new("1", "Home")]).await.unwrap();
        let mutations = fs.mutation_count();

        let report = sync
            .reconcile(&[RemoteProject::new("1", "Home")])
            .await
            .unwrap();

        assert_eq!(report.action_count(), 0);
        assert_eq!(fs.mutation_count(), mutations);
    }

    #[tokio::test]
    async fn test_move_preserves_id_and_body() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        sync.reconcile(&[RemoteProject::new("9", "Garden")])
            .await
            .unwrap();

        let edited = "---\nTodoistId: 9\ncustom: value\n---\nMy own notes\n- [ ] water plants\n";
        fs.write("Projects/Garden.md", edited.as_bytes()).await.unwrap();

        let projects = vec![
            RemoteProject::new("1", "Home"),
            RemoteProject::new("9", "Backyard").with_parent("1"),
        ];
        sync.reconcile(&projects).await.unwrap();

        assert!(!fs.exists("Projects/Garden.md").await.unwrap());
        let moved = fs.read("Projects/Home/Backyard.md").await.unwrap();
        assert_eq!(String::from_utf8(moved).unwrap(), edited);
    }

    #[tokio::test]
    async fn test_reparent_prunes_emptied_folders() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        let projects = vec![
            RemoteProject::new("a", "A"),
            RemoteProject::new("b", "B").with_parent("a"),
            RemoteProject::new("c", "C").with_parent("b"),
            RemoteProject::new("z", "Z"),
        ];
        sync.reconcile(&projects).await.unwrap();
        assert!(fs.exists("Projects/A/B/C.md").await.unwrap());

        // C moves under Z; B becomes childless, A keeps B
        let projects = vec![
            RemoteProject::new("a", "A"),
            RemoteProject::new("b", "B").with_parent("a"),
            RemoteProject::new("c", "C").with_parent("z"),
            RemoteProject::new("z", "Z"),
        ];
        let report = sync.reconcile(&projects).await.unwrap();

        assert!(fs.exists("Projects/A/B.md").await.unwrap());
        assert!(fs.exists("Projects/Z/Z.md").await.unwrap());
        assert!(fs.exists("Projects/Z/C.md").await.unwrap());
        assert!(!fs.exists("Projects/A/B").await.unwrap());
        assert!(fs.exists("Projects/A/A.md").await.unwrap());
        assert!(report.pruned().contains(&"Projects/A/B"));
        assert!(fs.trashed().iter().all(|p| p != "Projects"));
    }

    #[tokio::test]
    async fn test_orphan_pruning_stops_below_project_root() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        sync.reconcile(&[
            RemoteProject::new("a", "A"),
            RemoteProject::new("b", "B").with_parent("a"),
        ])
        .await
        .unwrap();

        // Both projects gone
        let report = sync.reconcile(&[]).await.unwrap();

        assert_eq!(report.archived().len(), 2);
        assert!(!fs.exists("Projects/A").await.unwrap());
        assert!(fs.exists("Projects").await.unwrap());
        assert!(fs.exists("Projects/archive/a.md").await.unwrap());
        assert!(fs.exists("Projects/archive/b.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_missing_parent_is_isolated() {
        let fs = Arc::new(InMemoryFs::new());
        let projects = vec![
            RemoteProject::new("A", "Alpha"),
            RemoteProject::new("B", "Beta").with_parent("missing-id"),
        ];

        let report = reconciler(&fs).reconcile(&projects).await.unwrap();

        assert_eq!(report.created(), vec!["Projects/Alpha.md"]);
        assert_eq!(
            report.faults,
            vec![HierarchyError::MissingParent {
                project: "B".to_string(),
                ancestor: "B".to_string(),
                parent: "missing-id".to_string(),
            }]
        );
        assert_eq!(fs.file_paths(), vec!["Projects/Alpha.md".to_string()]);
    }

    #[tokio::test]
    async fn test_faulty_project_keeps_existing_note() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        sync.reconcile(&[RemoteProject::new("B", "Beta")]).await.unwrap();

        let report = sync
            .reconcile(&[RemoteProject::new("B", "Beta").with_parent("gone")])
            .await
            .unwrap();

        assert_eq!(report.faults.len(), 1);
        assert!(report.archived().is_empty());
        assert!(fs.exists("Projects/Beta.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_stamp_keeps_existing_project_name() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write(
            "Projects/Renamed by hand.md",
            b"---\nTodoistId: 5\nprojectName: Original\n---\nbody",
        )
        .await
        .unwrap();

        let report = reconciler(&fs).reconcile(&[]).await.unwrap();

        assert!(
            !report
                .applied
                .iter()
                .any(|a| matches!(a, SyncAction::StampProjectName { .. }))
        );
        let note = Vault::new(Arc::clone(&fs))
            .note("Projects/archive/5.md")
            .await
            .unwrap();
        assert_eq!(note.project_name().as_deref(), Some("Original"));
        assert_eq!(
            Vault::new(Arc::clone(&fs))
                .read_body("Projects/archive/5.md")
                .await
                .unwrap(),
            "body"
        );
    }

    #[tokio::test]
    async fn test_reappearing_project_is_restored_from_archive() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        sync.reconcile(&[RemoteProject::new("7", "Trip")]).await.unwrap();
        sync.reconcile(&[]).await.unwrap();
        assert!(fs.exists("Projects/archive/7.md").await.unwrap());

        let report = sync
            .reconcile(&[RemoteProject::new("7", "Trip")])
            .await
            .unwrap();

        assert_eq!(
            report.moved(),
            vec![FileMove {
                from: "Projects/archive/7.md".to_string(),
                to: "Projects/Trip.md".to_string(),
            }]
        );
        assert!(report.created().is_empty());
        // Emptied archive folder is pruned, the root is kept
        assert!(!fs.exists("Projects/archive").await.unwrap());
        assert!(fs.exists("Projects").await.unwrap());
    }

    #[tokio::test]
    async fn test_target_linked_to_other_project_is_conflict() {
        let fs = Arc::new(InMemoryFs::new());
        let projects = vec![RemoteProject::new("1", "Same"), RemoteProject::new("2", "Same")];

        let report = reconciler(&fs).reconcile(&projects).await.unwrap();

        assert_eq!(report.created(), vec!["Projects/Same.md"]);
        assert_eq!(
            report.conflicts,
            vec![StoreConflict {
                todoist_id: "2".to_string(),
                path: "Projects/Same.md".to_string(),
                reason: ConflictReason::TargetLinkedTo("1".to_string()),
            }]
        );
    }

    #[tokio::test]
    async fn test_unlinked_note_at_target_is_left_alone() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/Home.md", b"hand written").await.unwrap();

        let report = reconciler(&fs)
            .reconcile(&[RemoteProject::new("1", "Home")])
            .await
            .unwrap();

        assert_eq!(report.verified, vec!["Projects/Home.md"]);
        assert_eq!(fs.read("Projects/Home.md").await.unwrap(), b"hand written");
    }

    #[tokio::test]
    async fn test_duplicate_links_are_reported() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/A.md", b"---\nTodoistId: 1\n---\n").await.unwrap();
        fs.write("Projects/B.md", b"---\nTodoistId: 1\n---\n").await.unwrap();

        let report = reconciler(&fs)
            .reconcile(&[RemoteProject::new("1", "C")])
            .await
            .unwrap();

        assert_eq!(report.duplicates.len(), 1);
        assert_eq!(
            report.moved(),
            vec![FileMove {
                from: "Projects/B.md".to_string(),
                to: "Projects/C.md".to_string(),
            }]
        );
        assert!(fs.exists("Projects/A.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_archive_destination_taken_is_conflict() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/Old.md", b"---\nTodoistId: 3\n---\n").await.unwrap();
        fs.write("Projects/archive/3.md", b"someone else's file").await.unwrap();

        let report = reconciler(&fs).reconcile(&[]).await.unwrap();

        assert_eq!(
            report.conflicts,
            vec![StoreConflict {
                todoist_id: "3".to_string(),
                path: "Projects/archive/3.md".to_string(),
                reason: ConflictReason::TargetExists,
            }]
        );
        assert!(fs.exists("Projects/Old.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_custom_template() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = Reconciler::new(
            Vault::new(Arc::clone(&fs)),
            ReconcileConfig::new("Todoist").with_template(NoteTemplate::new("# <name> (<id>)\n")),
        );

        sync.reconcile(&[RemoteProject::new("42", "Errands")])
            .await
            .unwrap();

        assert_eq!(
            fs.read("Todoist/Errands.md").await.unwrap(),
            b"---\nTodoistId: 42\n---\n# Errands (42)\n"
        );
    }

    #[tokio::test]
    async fn test_apply_replays_single_action() {
        let fs = Arc::new(InMemoryFs::new());
        let sync = reconciler(&fs);
        let action = SyncAction::CreateNote {
            todoist_id: "1".to_string(),
            path: "Projects/Home.md".to_string(),
            content: "---\nTodoistId: 1\n---\n".to_string(),
        };

        sync.apply(&action).await.unwrap();

        assert!(sync.apply(&action).await.is_err());
        assert!(fs.exists("Projects/Home.md").await.unwrap());
    }

    struct FailingSource;

    #[async_trait]
    impl ProjectSource for FailingSource {
        async fn fetch_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
            Err(RemoteError::Unauthorized { status: 401 })
        }
    }

    #[tokio::test]
    async fn test_remote_fault_leaves_vault_untouched() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/Home.md", b"---\nTodoistId: 1\n---\n").await.unwrap();
        let mutations = fs.mutation_count();

        let err = reconciler(&fs).sync(&FailingSource).await.unwrap_err();

        assert!(matches!(err, ReconcileError::Remote(RemoteError::Unauthorized { .. })));
        assert_eq!(fs.mutation_count(), mutations);
        assert!(fs.exists("Projects/Home.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_sync_from_source() {
        let fs = Arc::new(InMemoryFs::new());
        let source = StaticProjects(home_and_improvement());

        let report = reconciler(&fs).sync(&source).await.unwrap();

        assert_eq!(report.created().len(), 2);
    }

    #[tokio::test]
    async fn test_names_with_dots_are_created() {
        let fs = Arc::new(InMemoryFs::new());
        let projects = vec![
            RemoteProject::new("1", "Ideas..."),
            RemoteProject::new("2", "Someday").with_parent("1"),
            RemoteProject::new("3", "v1..v2 migration"),
        ];
        let sync = reconciler(&fs);

        let report = sync.reconcile(&projects).await.unwrap();

        assert_eq!(
            report.created(),
            vec![
                "Projects/Ideas.../Ideas....md",
                "Projects/v1..v2 migration.md",
                "Projects/Ideas.../Someday.md",
            ]
        );
        assert!(report.is_clean());

        let again = sync.reconcile(&projects).await.unwrap();
        assert_eq!(again.action_count(), 0);
        assert_eq!(again.verified.len(), 3);
    }

    /// Store wrapper that injects faults into an otherwise healthy vault.
    struct FaultyFs {
        inner: Arc<InMemoryFs>,
        /// Path that disappears the first time its existence is checked
        vanish: Option<String>,
        vanished: AtomicBool,
        rename_error: Option<fn(&str) -> FsError>,
    }

    impl FaultyFs {
        fn new(inner: &Arc<InMemoryFs>) -> Self {
            Self {
                inner: Arc::clone(inner),
                vanish: None,
                vanished: AtomicBool::new(false),
                rename_error: None,
            }
        }
    }

    #[async_trait]
    impl FileSystem for FaultyFs {
        async fn read(&self, path: &str) -> crate::fs::Result<Vec<u8>> {
            self.inner.read(path).await
        }

        async fn write(&self, path: &str, content: &[u8]) -> crate::fs::Result<()> {
            self.inner.write(path, content).await
        }

        async fn list(&self, path: &str) -> crate::fs::Result<Vec<crate::fs::FileEntry>> {
            self.inner.list(path).await
        }

        async fn exists(&self, path: &str) -> crate::fs::Result<bool> {
            if self.vanish.as_deref() == Some(path) && !self.vanished.swap(true, Ordering::SeqCst) {
                self.inner.trash(path).await?;
            }
            self.inner.exists(path).await
        }

        async fn mkdir(&self, path: &str) -> crate::fs::Result<()> {
            self.inner.mkdir(path).await
        }

        async fn rename(&self, from: &str, to: &str) -> crate::fs::Result<()> {
            match self.rename_error {
                Some(error) => Err(error(from)),
                None => self.inner.rename(from, to).await,
            }
        }

        async fn trash(&self, path: &str) -> crate::fs::Result<()> {
            self.inner.trash(path).await
        }
    }

    fn source_not_found(from: &str) -> FsError {
        FsError::NotFound(from.to_string())
    }

    fn disk_full(_: &str) -> FsError {
        FsError::Io("disk full".to_string())
    }

    fn faulty_reconciler(fs: FaultyFs) -> Reconciler<FaultyFs> {
        Reconciler::new(Vault::new(fs), ReconcileConfig::new("Projects"))
    }

    #[tokio::test]
    async fn test_note_removed_after_indexing_is_conflict() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Inbox/Trip.md", b"---\nTodoistId: 5\n---\nPacking list\n")
            .await
            .unwrap();
        let faulty = FaultyFs {
            vanish: Some("Inbox/Trip.md".to_string()),
            ..FaultyFs::new(&fs)
        };

        let report = faulty_reconciler(faulty)
            .reconcile(&[RemoteProject::new("5", "Trip"), RemoteProject::new("6", "Home")])
            .await
            .unwrap();

        assert_eq!(
            report.conflicts,
            vec![StoreConflict {
                todoist_id: "5".to_string(),
                path: "Inbox/Trip.md".to_string(),
                reason: ConflictReason::SourceMissing,
            }]
        );
        assert_eq!(report.created(), vec!["Projects/Home.md"]);
        assert!(report.archived().is_empty());
        assert!(report.failures.is_empty());
        assert!(!fs.exists("Projects/Trip.md").await.unwrap());
    }

    #[tokio::test]
    async fn test_move_source_not_found_is_conflict() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/Old.md", b"---\nTodoistId: 2\n---\n").await.unwrap();
        let faulty = FaultyFs {
            rename_error: Some(source_not_found),
            ..FaultyFs::new(&fs)
        };

        let report = faulty_reconciler(faulty)
            .reconcile(&[RemoteProject::new("2", "New")])
            .await
            .unwrap();

        assert_eq!(
            report.conflicts,
            vec![StoreConflict {
                todoist_id: "2".to_string(),
                path: "Projects/Old.md".to_string(),
                reason: ConflictReason::SourceMissing,
            }]
        );
        assert!(report.moved().is_empty());
        assert!(report.failures.is_empty());
    }

    #[tokio::test]
    async fn test_store_error_is_recorded_and_run_continues() {
        let fs = Arc::new(InMemoryFs::new());
        fs.write("Projects/Old.md", b"---\nTodoistId: 2\n---\n").await.unwrap();
        let faulty = FaultyFs {
            rename_error: Some(disk_full),
            ..FaultyFs::new(&fs)
        };

        let report = faulty_reconciler(faulty)
            .reconcile(&[RemoteProject::new("2", "New"), RemoteProject::new("3", "Home")])
            .await
            .unwrap();

        assert_eq!(
            report.failures,
            vec![ActionFailure {
                action: SyncAction::MoveNote {
                    todoist_id: "2".to_string(),
                    from: "Projects/Old.md".to_string(),
                    to: "Projects/New.md".to_string(),
                },
                error: "Filesystem error: IO error: disk full".to_string(),
            }]
        );
        assert!(report.conflicts.is_empty());
        assert!(!report.is_clean());
        assert_eq!(report.created(), vec!["Projects/Home.md"]);
        assert!(fs.exists("Projects/Old.md").await.unwrap());
    }
}
