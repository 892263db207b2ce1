//! Remote project model and the source that produces it.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A node in the remote project hierarchy, as returned by one fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteProject {
    #[serde(deserialize_with = "id_string")]
    pub id: String,
    pub name: String,
    /// Absent for top-level projects
    #[serde(default, alias = "parentId", deserialize_with = "optional_id_string")]
    pub parent_id: Option<String>,
}

/// Ids arrive as strings from current API versions and as integers from older ones.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(u64),
}

impl From<RawId> for String {
    fn from(raw: RawId) -> Self {
        match raw {
            RawId::Text(s) => s,
            RawId::Number(n) => n.to_string(),
        }
    }
}

fn id_string<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<String, D::Error> {
    RawId::deserialize(deserializer).map(String::from)
}

fn optional_id_string<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Option<String>, D::Error> {
    Ok(Option::<RawId>::deserialize(deserializer)?
        .map(String::from)
        .filter(|id| !id.is_empty()))
}

impl RemoteProject {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            parent_id: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}

/// Failure to fetch the project list. Aborts the whole run.
#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("Request failed: {0}")]
    Transport(String),

    #[error("Authentication rejected (HTTP {status})")]
    Unauthorized { status: u16 },

    #[error("Unexpected HTTP status {status}: {body}")]
    Status { status: u16, body: String },

    #[error("Failed to decode project list: {0}")]
    Decode(String),
}

/// Produces the complete current project list.
#[async_trait]
pub trait ProjectSource: Send + Sync {
    async fn fetch_projects(&self) -> Result<Vec<RemoteProject>, RemoteError>;
}

/// Fixed project list, for tests and dry runs.
#[derive(Debug, Clone, Default)]
pub struct StaticProjects(pub Vec<RemoteProject>);

#[async_trait]
impl ProjectSource for StaticProjects {
    async fn fetch_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
        Ok(self.0.clone())
    }
}

#[async_trait]
impl<T: ProjectSource + ?Sized> ProjectSource for std::sync::Arc<T> {
    async fn fetch_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
        (**self).fetch_projects().await
    }
}
