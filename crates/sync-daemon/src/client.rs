//! HTTP client for the Todoist projects endpoint.

use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use todoist_sync_core::project::{ProjectSource, RemoteError, RemoteProject};

pub const DEFAULT_API_URL: &str = "https://api.todoist.com/rest/v2";

/// Upper bound on followed pages, in case the server keeps returning a cursor.
const MAX_PAGES: usize = 100;

/// One response body from the projects endpoint.
///
/// Older API versions return a bare array; newer ones wrap it in a page with
/// a continuation cursor.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ProjectsPage {
    Bare(Vec<RemoteProject>),
    Paged {
        results: Vec<RemoteProject>,
        #[serde(default)]
        next_cursor: Option<String>,
    },
}

/// Parse one page, returning its projects and the cursor for the next page.
pub fn parse_page(body: &str) -> Result<(Vec<RemoteProject>, Option<String>), RemoteError> {
    let page: ProjectsPage =
        serde_json::from_str(body).map_err(|e| RemoteError::Decode(e.to_string()))?;
    Ok(match page {
        ProjectsPage::Bare(projects) => (projects, None),
        ProjectsPage::Paged {
            results,
            next_cursor,
        } => (results, next_cursor.filter(|c| !c.is_empty())),
    })
}

pub struct TodoistClient {
    http: reqwest::Client,
    api_url: String,
    token: String,
}

impl TodoistClient {
    pub fn new(token: impl Into<String>) -> Result<Self, RemoteError> {
        Self::with_api_url(token, DEFAULT_API_URL)
    }

    pub fn with_api_url(
        token: impl Into<String>,
        api_url: impl Into<String>,
    ) -> Result<Self, RemoteError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        Ok(Self {
            http,
            api_url: api_url.into().trim_end_matches('/').to_string(),
            token: token.into(),
        })
    }

    pub fn api_url(&self) -> &str {
        &self.api_url
    }

    async fn fetch_page(&self, cursor: Option<&str>) -> Result<String, RemoteError> {
        let url = format!("{}/projects", self.api_url);
        let mut request = self.http.get(&url).bearer_auth(&self.token);
        if let Some(cursor) = cursor {
            request = request.query(&[("cursor", cursor)]);
        }

        let response = request
            .send()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::FORBIDDEN {
            return Err(RemoteError::Unauthorized {
                status: status.as_u16(),
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| RemoteError::Transport(e.to_string()))?;

        if !status.is_success() {
            return Err(RemoteError::Status {
                status: status.as_u16(),
                body,
            });
        }

        Ok(body)
    }
}

#[async_trait]
impl ProjectSource for TodoistClient {
    async fn fetch_projects(&self) -> Result<Vec<RemoteProject>, RemoteError> {
        let mut projects = Vec::new();
        let mut cursor: Option<String> = None;

        for _ in 0..MAX_PAGES {
            let body = self.fetch_page(cursor.as_deref()).await?;
            let (page, next) = parse_page(&body)?;
            projects.extend(page);

            match next {
                Some(next) => cursor = Some(next),
                None => return Ok(projects),
            }
        }

        Err(RemoteError::Decode(format!(
            "project list did not end after {} pages",
            MAX_PAGES
        )))
    }
}
