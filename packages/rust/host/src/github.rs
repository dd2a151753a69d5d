//! GitHub REST API implementation of [`SourceHost`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION, HeaderMap, LINK};
use reqwest::{Client, StatusCode};
use tracing::{debug, instrument};
use url::Url;

use repodoc_shared::{HostErrorCode, RepoDocError, Result};

use crate::{CompareResponse, SourceHost};

/// User-Agent string for host API requests.
const USER_AGENT: &str = concat!("repodoc/", env!("CARGO_PKG_VERSION"));

/// Media type recommended by the GitHub REST API.
const GITHUB_JSON: &str = "application/vnd.github+json";

/// Default timeout in seconds for host API requests.
const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Connection settings for [`GitHubHost`].
#[derive(Debug, Clone)]
pub struct GitHubHostOptions {
    /// API base URL, e.g. `https://api.github.com`.
    pub api_base_url: Url,
    /// Bearer token, if any.
    pub token: Option<String>,
    /// Timeout for each request in seconds.
    pub timeout_secs: u64,
}

impl GitHubHostOptions {
    /// Options for an API base with no token and the default timeout.
    pub fn new(api_base_url: Url) -> Self {
        Self {
            api_base_url,
            token: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

/// Source host backed by the GitHub REST API.
pub struct GitHubHost {
    client: Client,
    api_base: Url,
    token: Option<String>,
}

impl GitHubHost {
    /// Create a client for the given options.
    pub fn new(opts: GitHubHostOptions) -> Result<Self> {
        if opts.api_base_url.cannot_be_a_base() {
            return Err(RepoDocError::config(format!(
                "host API base '{}' cannot carry a path",
                opts.api_base_url
            )));
        }

        let client = Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(opts.timeout_secs))
            .build()
            .map_err(|e| RepoDocError::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            api_base: opts.api_base_url,
            token: opts.token,
        })
    }

    /// `{api_base}/repos/{owner}/{repo}/{tail..}` with every segment
    /// percent-encoded. `/` inside a tail part stays a separator.
    fn repo_url(&self, owner: &str, repo: &str, tail: &[&str]) -> Result<Url> {
        let mut url = self.api_base.clone();
        url.path_segments_mut()
            .map_err(|()| {
                RepoDocError::config(format!(
                    "host API base '{}' cannot carry a path",
                    self.api_base
                ))
            })?
            .pop_if_empty()
            .extend(["repos", owner, repo])
            .extend(tail.iter().flat_map(|part| part.split('/')));
        Ok(url)
    }

    /// GET a JSON document, classifying a 404 with `not_found`.
    async fn get_json(
        &self,
        url: &Url,
        query: &[(&str, String)],
        not_found: HostErrorCode,
    ) -> Result<(serde_json::Value, HeaderMap)> {
        let mut request = self.client.get(url.clone()).header(ACCEPT, GITHUB_JSON).query(query);
        if let Some(token) = &self.token {
            request = request.header(AUTHORIZATION, format!("Bearer {token}"));
        }

        let response = request
            .send()
            .await
            .map_err(|e| RepoDocError::Network(format!("{url}: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            return Err(classify_status(status, url, not_found));
        }

        let headers = response.headers().clone();
        let body = response
            .json::<serde_json::Value>()
            .await
            .map_err(|e| RepoDocError::Network(format!("{url}: failed to read body: {e}")))?;

        Ok((body, headers))
    }
}

#[async_trait]
impl SourceHost for GitHubHost {
    #[instrument(skip(self))]
    async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        let url = self.repo_url(owner, repo, &[])?;
        let (body, _) = self.get_json(&url, &[], HostErrorCode::RepoNotFound).await?;

        body.get("default_branch")
            .and_then(|v| v.as_str())
            .map(String::from)
            .ok_or_else(|| {
                RepoDocError::validation(format!("{url}: response has no default_branch"))
            })
    }

    #[instrument(skip(self))]
    async fn get_branch_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String> {
        let url = self.repo_url(owner, repo, &["branches", branch])?;
        let (body, _) = self.get_json(&url, &[], HostErrorCode::RefNotFound).await?;

        body.pointer("/commit/sha")
            .and_then(|v| v.as_str())
            .map(str::to_lowercase)
            .ok_or_else(|| RepoDocError::validation(format!("{url}: response has no commit.sha")))
    }

    #[instrument(skip(self))]
    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CompareResponse> {
        let range = format!("{base}...{head}");
        let url = self.repo_url(owner, repo, &["compare", &range])?;
        let query = [("page", page.to_string()), ("per_page", per_page.to_string())];
        let (body, headers) = self
            .get_json(&url, &query, HostErrorCode::RefNotFound)
            .await?;

        let has_next_page = headers
            .get(LINK)
            .and_then(|v| v.to_str().ok())
            .is_some_and(link_has_next);

        let response = CompareResponse {
            status: body
                .get("status")
                .and_then(|v| v.as_str())
                .map(String::from),
            files: body.get("files").cloned(),
            has_next_page,
        };

        debug!(
            status = response.status.as_deref().unwrap_or("<none>"),
            has_next_page, "compare response received"
        );
        Ok(response)
    }

    fn name(&self) -> &str {
        "github"
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn classify_status(status: StatusCode, url: &Url, not_found: HostErrorCode) -> RepoDocError {
    let code = match status {
        StatusCode::NOT_FOUND => not_found,
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => HostErrorCode::AuthFailed,
        _ => HostErrorCode::RequestFailed,
    };
    RepoDocError::host(code, format!("{url}: HTTP {status}"))
}

/// Whether an RFC 8288 `Link` header advertises `rel="next"`.
fn link_has_next(header: &str) -> bool {
    header.split(',').any(|link| {
        link.split(';')
            .skip(1)
            .any(|param| matches!(param.trim(), "rel=\"next\"" | "rel=next"))
    })
}
