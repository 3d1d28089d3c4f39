//! GitLab REST API client (repository tree and raw files).

use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::errors::GitLabError;
use crate::retry::{is_transient, with_retry, RetryError, RetryPolicy};

const PER_PAGE: &str = "100";

/// One node of `GET /projects/{id}/repository/tree`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeEntry {
    pub name: String,
    pub path: String,
    #[serde(rename = "type")]
    pub kind: String,
}

impl TreeEntry {
    pub fn is_blob(&self) -> bool {
        self.kind == "blob"
    }
}

/// Asynchronous GitLab client bound to one project and ref.
#[derive(Clone)]
pub struct GitLabClient {
    http: reqwest::Client,
    base_url: String,
    project_id: String,
    git_ref: String,
    retry: RetryPolicy,
}

impl GitLabClient {
    pub fn new(
        base_url: impl Into<String>,
        token: &str,
        project_id: impl Into<String>,
        git_ref: impl Into<String>,
        retry: RetryPolicy,
    ) -> Result<Self, GitLabError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        let mut private_token =
            HeaderValue::from_str(token).map_err(|e| GitLabError::InvalidToken(e.to_string()))?;
        private_token.set_sensitive(true);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("scriptsync/0.1"));
        headers.insert("PRIVATE-TOKEN", private_token);
        let http = reqwest::Client::builder()
            .default_headers(headers)
            .build()?;
        let client = Self {
            http,
            base_url,
            project_id: project_id.into(),
            git_ref: git_ref.into(),
            retry,
        };
        info!(base_url = %client.base_url, project = %client.project_id, git_ref = %client.git_ref, "created GitLabClient");
        Ok(client)
    }

    /// Every node of the repository, following pagination to the end.
    #[instrument(skip(self), fields(project = %self.project_id))]
    pub async fn list_repository_tree(&self) -> Result<Vec<TreeEntry>, GitLabError> {
        let mut entries = Vec::new();
        let mut page = "1".to_string();
        loop {
            let mut url = self.project_url(&["repository", "tree"])?;
            url.query_pairs_mut()
                .append_pair("recursive", "true")
                .append_pair("ref", &self.git_ref)
                .append_pair("per_page", PER_PAGE)
                .append_pair("page", &page);

            let resp = self.get(url, "list_repository_tree").await?;
            let next = resp
                .headers()
                .get("x-next-page")
                .and_then(|v| v.to_str().ok())
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty());
            let batch: Vec<TreeEntry> = resp
                .json()
                .await
                .map_err(|e| GitLabError::ParseError(e.to_string()))?;
            debug!(page = %page, count = batch.len(), "fetched tree page");
            entries.extend(batch);

            match next {
                Some(n) => page = n,
                None => break,
            }
        }
        debug!(count = entries.len(), "fetched repository tree");
        Ok(entries)
    }

    /// Raw content of one file at the configured ref.
    #[instrument(skip(self), fields(project = %self.project_id))]
    pub async fn get_raw_file(&self, path: &str) -> Result<String, GitLabError> {
        let mut url = self.project_url(&["repository", "files", path, "raw"])?;
        url.query_pairs_mut().append_pair("ref", &self.git_ref);
        let resp = self.get(url, "get_raw_file").await?;
        let text = resp.text().await?;
        debug!(path, len = text.len(), "fetched raw file");
        Ok(text)
    }

    /// `{base}/api/v4/projects/{id}/<segments>`, each segment percent-encoded
    /// so that file paths and `group/project` ids keep their slashes escaped.
    fn project_url(&self, segments: &[&str]) -> Result<Url, GitLabError> {
        let mut url =
            Url::parse(&self.base_url).map_err(|_| GitLabError::InvalidUrl(self.base_url.clone()))?;
        url.path_segments_mut()
            .map_err(|_| GitLabError::InvalidUrl(self.base_url.clone()))?
            .pop_if_empty()
            .extend(["api", "v4", "projects", self.project_id.as_str()])
            .extend(segments);
        Ok(url)
    }

    async fn get(&self, url: Url, operation: &str) -> Result<reqwest::Response, GitLabError> {
        let resp = with_retry(self.retry, operation, is_transient, || {
            self.http.get(url.clone()).send()
        })
        .await
        .map_err(|e| match e {
            RetryError::Exhausted { attempts, last } => GitLabError::Unavailable {
                attempts,
                detail: last.to_string(),
            },
            RetryError::Failed(e) => GitLabError::HttpError(e),
        })?;
        self.check_response(&resp, operation)?;
        Ok(resp)
    }

    fn check_response(&self, resp: &reqwest::Response, operation: &str) -> Result<(), GitLabError> {
        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        warn!(status = status.as_u16(), operation, "GitLab returned error status");
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(GitLabError::AuthenticationFailed(format!("HTTP {}", status)));
        }
        Err(GitLabError::Status {
            status: status.as_u16(),
            operation: operation.to_string(),
        })
    }
}
