//! Folder placement for remote projects.
//!
//! Paths produced here are relative to the project root folder and use `/`
//! separators with no leading or trailing slash; `""` is the root itself.

use crate::project::RemoteProject;
use std::collections::{HashMap, HashSet};
use thiserror::Error;

/// A project whose ancestor chain cannot be resolved within one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HierarchyError {
    #[error("Project {0} is not part of the fetched project set")]
    UnknownProject(String),

    /// `ancestor` is the project in the chain (possibly `project` itself)
    /// whose parent is absent.
    #[error("Project {project}: ancestor {ancestor} references missing parent {parent}")]
    MissingParent {
        project: String,
        ancestor: String,
        parent: String,
    },

    #[error("Parent chain of project {project} loops back to {repeated}")]
    Cycle { project: String, repeated: String },
}

impl HierarchyError {
    /// Id of the project whose reconciliation is abandoned.
    pub fn project_id(&self) -> &str {
        match self {
            HierarchyError::UnknownProject(id) => id,
            HierarchyError::MissingParent { project, .. } => project,
            HierarchyError::Cycle { project, .. } => project,
        }
    }
}

/// Characters the host application refuses in file and folder names.
const FORBIDDEN_CHARS: &[char] = &['/', '\\', ':', '*', '?', '"', '<', '>', '|'];

/// Turn a project name into a single path segment.
///
/// A blank result falls back to the project id.
pub fn segment_name(project: &RemoteProject) -> String {
    let cleaned = sanitize_segment(&project.name);
    if cleaned.is_empty() {
        sanitize_segment(&project.id)
    } else {
        cleaned
    }
}

/// Replace forbidden characters with `-` and drop leading dots so the entry
/// is not hidden.
pub fn sanitize_segment(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| {
            if FORBIDDEN_CHARS.contains(&c) || c.is_control() {
                '-'
            } else {
                c
            }
        })
        .collect();
    cleaned.trim().trim_start_matches('.').trim().to_string()
}

/// Join non-empty path segments with `/`.
pub fn join_path<'a>(segments: impl IntoIterator<Item = &'a str>) -> String {
    segments
        .into_iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Parent/child view over one fetch of remote projects.
pub struct ProjectTree<'a> {
    by_id: HashMap<&'a str, &'a RemoteProject>,
    child_counts: HashMap<&'a str, usize>,
}

impl<'a> ProjectTree<'a> {
    pub fn new(projects: &'a [RemoteProject]) -> Self {
        let mut by_id = HashMap::with_capacity(projects.len());
        let mut child_counts: HashMap<&str, usize> = HashMap::new();

        for project in projects {
            by_id.insert(project.id.as_str(), project);
            if let Some(parent) = project.parent_id.as_deref() {
                *child_counts.entry(parent).or_default() += 1;
            }
        }

        Self {
            by_id,
            child_counts,
        }
    }

    pub fn get(&self, id: &str) -> Option<&'a RemoteProject> {
        self.by_id.get(id).copied()
    }

    /// Whether any project in this fetch names `id` as its parent.
    pub fn has_children(&self, id: &str) -> bool {
        self.child_counts.get(id).copied().unwrap_or(0) > 0
    }

    /// Ancestors of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Result<Vec<&'a RemoteProject>, HierarchyError> {
        let project = self
            .get(id)
            .ok_or_else(|| HierarchyError::UnknownProject(id.to_string()))?;

        let mut visited: HashSet<&str> = HashSet::new();
        visited.insert(project.id.as_str());

        let mut chain = Vec::new();
        let mut current = project;
        while let Some(parent_id) = current.parent_id.as_deref() {
            let parent = self
                .get(parent_id)
                .ok_or_else(|| HierarchyError::MissingParent {
                    project: id.to_string(),
                    ancestor: current.id.clone(),
                    parent: parent_id.to_string(),
                })?;
            if !visited.insert(parent.id.as_str()) {
                return Err(HierarchyError::Cycle {
                    project: id.to_string(),
                    repeated: parent.id.clone(),
                });
            }
            chain.push(parent);
            current = parent;
        }

        Ok(chain)
    }

    /// Number of ancestors; 0 for a top-level project.
    pub fn depth(&self, id: &str) -> Result<usize, HierarchyError> {
        self.ancestors(id).map(|chain| chain.len())
    }

    /// Folder built from the ancestor chain, root first; `""` for a top-level project.
    pub fn resolve_path(&self, id: &str) -> Result<String, HierarchyError> {
        let ancestors = self.ancestors(id)?;
        let segments: Vec<String> = ancestors.iter().rev().map(|p| segment_name(p)).collect();
        Ok(join_path(segments.iter().map(String::as_str)))
    }

    /// Folder that holds the project's own note.
    ///
    /// A project with children lives inside its own folder, next to its
    /// children's notes and subfolders; a childless project lives in its
    /// parent's folder.
    pub fn note_folder(&self, id: &str) -> Result<String, HierarchyError> {
        let folder = self.resolve_path(id)?;
        if !self.has_children(id) {
            return Ok(folder);
        }
        // resolve_path succeeded, so the project exists
        let own = self.get(id).map(segment_name).unwrap_or_else(|| id.to_string());
        Ok(join_path([folder.as_str(), own.as_str()]))
    }

    /// Note path (folder + `<name>.md`), relative to the project root.
    pub fn note_path(&self, id: &str) -> Result<String, HierarchyError> {
        let folder = self.note_folder(id)?;
        let file_name = self
            .get(id)
            .map(|p| format!("{}.md", segment_name(p)))
            .ok_or_else(|| HierarchyError::UnknownProject(id.to_string()))?;
        Ok(join_path([folder.as_str(), file_name.as_str()]))
    }
}

/// Folder path for `project_id` built from its ancestor chain.
pub fn resolve_path(projects: &[RemoteProject], project_id: &str) -> Result<String, HierarchyError> {
    ProjectTree::new(projects).resolve_path(project_id)
}
