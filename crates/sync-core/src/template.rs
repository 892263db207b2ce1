//! Body template for freshly created project notes.
//!
//! The template is plain text with two placeholders, `<id>` and `<name>`,
//! substituted once at creation time. Later edits to the body are never
//! touched by the reconciler.

use crate::markdown::{self, TODOIST_ID_KEY};
use crate::project::RemoteProject;

pub const ID_PLACEHOLDER: &str = "<id>";
pub const NAME_PLACEHOLDER: &str = "<name>";

/// Link to the project plus a live task query block rendered by the
/// Todoist plugin for the host application.
pub const DEFAULT_TEMPLATE: &str = "[<name>](https://todoist.com/app/project/<id>)\n\
```todoist\n\
\"name\": \"<name>\"\n\
\"filter\": \"#<name>\"\n\
```\n";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NoteTemplate {
    body: String,
}

impl Default for NoteTemplate {
    fn default() -> Self {
        Self::new(DEFAULT_TEMPLATE)
    }
}

impl NoteTemplate {
    pub fn new(body: impl Into<String>) -> Self {
        Self { body: body.into() }
    }

    pub fn as_str(&self) -> &str {
        &self.body
    }

    /// Body text with placeholders filled in for `project`.
    pub fn render_body(&self, project: &RemoteProject) -> String {
        self.body
            .replace(ID_PLACEHOLDER, &project.id)
            .replace(NAME_PLACEHOLDER, &project.name)
    }

    /// Complete note: a header carrying the project id, then the body.
    pub fn render_note(&self, project: &RemoteProject) -> String {
        markdown::render_note(&[(TODOIST_ID_KEY, project.id.as_str())], &self.render_body(project))
    }
}
