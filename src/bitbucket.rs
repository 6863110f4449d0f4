//! Bitbucket Server (REST 1.0) client for pull-request changes, diffs and comments.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::ACCEPT;
use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::{json, Value};
use thiserror::Error;
use tracing::{debug, error, info};

use crate::source::{ChangeSource, ChangeType, ChangedFile, CommentAck};

const PAGE_LIMIT: u32 = 1000;
/// Upper bound on pages followed for one listing.
const MAX_PAGES: usize = 100;

#[derive(Debug, Error)]
pub enum BitbucketError {
    #[error("request to Bitbucket failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Bitbucket API error: {status} - {body}")]
    Status { status: StatusCode, body: String },
    #[error("malformed Bitbucket response: {0}")]
    Malformed(String),
    #[error("invalid Bitbucket base URL: {0}")]
    InvalidBaseUrl(String),
}

#[derive(Clone)]
pub enum Auth {
    Token(String),
    Basic { username: String, password: String },
}

impl std::fmt::Debug for Auth {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Token(_) => f.write_str("Token(..)"),
            Self::Basic { username, .. } => f
                .debug_struct("Basic")
                .field("username", username)
                .finish_non_exhaustive(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct BitbucketConfig {
    pub base_url: Url,
    pub project_key: String,
    pub repository_slug: String,
    pub auth: Auth,
}

#[derive(Clone)]
pub struct BitbucketClient {
    client: Client,
    config: BitbucketConfig,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    path: RawPath,
    #[serde(rename = "type")]
    change_type: Option<ChangeType>,
}

#[derive(Debug, Deserialize)]
struct RawPath {
    #[serde(rename = "toString")]
    to_string: String,
}

impl BitbucketClient {
    pub fn new(config: BitbucketConfig) -> Result<Self, BitbucketError> {
        if config.base_url.cannot_be_a_base() {
            return Err(BitbucketError::InvalidBaseUrl(config.base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .user_agent(concat!("pr-reviewer/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self { client, config })
    }

    /// `{base}/rest/api/1.0/projects/{key}/repos/{slug}/pull-requests/{pr}/{tail..}`
    fn pr_url(&self, pr_id: &str, tail: &[&str]) -> Result<Url, BitbucketError> {
        let mut url = self.config.base_url.clone();
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| BitbucketError::InvalidBaseUrl(self.config.base_url.to_string()))?;
            segments
                .pop_if_empty()
                .extend(["rest", "api", "1.0", "projects"])
                .push(&self.config.project_key)
                .push("repos")
                .push(&self.config.repository_slug)
                .extend(["pull-requests", pr_id])
                .extend(tail);
        }
        Ok(url)
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.config.auth {
            Auth::Token(token) => request.bearer_auth(token),
            Auth::Basic { username, password } => request.basic_auth(username, Some(password)),
        }
    }

    async fn check(response: Response, what: &str) -> Result<Response, BitbucketError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        error!("Bitbucket API error {}: {} - {}", what, status, body);
        Err(BitbucketError::Status { status, body })
    }

    fn parse_changes(page: &Value) -> Result<Vec<ChangedFile>, BitbucketError> {
        let values = page
            .get("values")
            .and_then(Value::as_array)
            .ok_or_else(|| BitbucketError::Malformed("missing `values` array".into()))?;

        values
            .iter()
            .map(|value| {
                let raw: RawChange = serde_json::from_value(value.clone())
                    .map_err(|e| BitbucketError::Malformed(format!("change entry: {e}")))?;
                Ok(ChangedFile {
                    path: raw.path.to_string,
                    change_type: raw.change_type.unwrap_or(ChangeType::Modify),
                })
            })
            .collect()
    }
}

#[async_trait]
impl ChangeSource for BitbucketClient {
    async fn list_changed_files(&self, pr_id: &str) -> Result<Vec<ChangedFile>, BitbucketError> {
        info!("Fetching changed files for PR #{}", pr_id);

        let url = self.pr_url(pr_id, &["changes"])?;
        let mut files = Vec::new();
        let mut start = 0u64;

        let mut reached_last = false;

        for _ in 0..MAX_PAGES {
            let request = self
                .client
                .get(url.clone())
                .query(&[("start", start), ("limit", u64::from(PAGE_LIMIT))]);
            let response = self.authorize(request).send().await?;
            let page: Value = Self::check(response, "listing changes").await?.json().await?;

            files.extend(Self::parse_changes(&page)?);

            let is_last = page.get("isLastPage").and_then(Value::as_bool).unwrap_or(true);
            match page.get("nextPageStart").and_then(Value::as_u64) {
                Some(next) if !is_last && next <= start => {
                    return Err(BitbucketError::Malformed(format!(
                        "nextPageStart {} did not advance past {}",
                        next, start
                    )));
                }
                Some(next) if !is_last => start = next,
                _ => {
                    reached_last = true;
                    break;
                }
            }
        }

        // A truncated listing would silently drop files from the review.
        if !reached_last {
            error!("PR #{} changes still paging after {} pages", pr_id, MAX_PAGES);
            return Err(BitbucketError::Malformed(format!(
                "changes listing did not end within {} pages",
                MAX_PAGES
            )));
        }

        info!("PR #{} has {} changed files", pr_id, files.len());
        Ok(files)
    }

    async fn fetch_file_diff(&self, pr_id: &str, path: &str) -> Result<String, BitbucketError> {
        let mut tail = vec!["diff"];
        tail.extend(path.split('/'));
        let url = self.pr_url(pr_id, &tail)?;

        let request = self.client.get(url).header(ACCEPT, "text/plain");
        let response = self.authorize(request).send().await?;
        let diff = Self::check(response, "fetching diff").await?.text().await?;

        debug!("Fetched diff for {} on PR #{} ({} bytes)", path, pr_id, diff.len());
        Ok(diff)
    }

    async fn post_comment(
        &self,
        pr_id: &str,
        path: &str,
        line: u32,
        text: &str,
    ) -> Result<CommentAck, BitbucketError> {
        info!("Posting comment on {}:{} in PR #{}", path, line, pr_id);

        let url = self.pr_url(pr_id, &["comments"])?;
        let body = json!({
            "text": text,
            "anchor": {
                "path": path,
                "line": line,
                "lineType": "CONTEXT",
                "fileType": "TO",
                "diffType": "EFFECTIVE",
            },
        });

        let request = self.client.post(url).json(&body);
        let response = self.authorize(request).send().await?;
        let created: Value = Self::check(response, "posting comment").await?.json().await?;

        Ok(CommentAck {
            id: created.get("id").and_then(Value::as_u64),
            version: created.get("version").and_then(Value::as_u64),
        })
    }
}
