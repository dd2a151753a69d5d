//! Scripted in-memory [`SourceHost`] for tests and offline runs.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use serde::Deserialize;

use repodoc_shared::{HostErrorCode, RepoDocError, Result};

use crate::{CompareResponse, SourceHost};

/// A canned compare-commits answer for one `base..head` pair.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ScriptedCompare {
    pub base: String,
    pub head: String,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(default)]
    pub files: Option<serde_json::Value>,
    #[serde(default)]
    pub has_next_page: bool,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ScriptedRepo {
    default_branch: String,
    #[serde(default)]
    branches: BTreeMap<String, String>,
    #[serde(default)]
    compares: Vec<ScriptedCompare>,
}

/// Host whose answers are scripted up front.
///
/// Unknown repositories, branches and compare ranges fail with the same
/// classified errors the real host produces.
#[derive(Debug, Default, Deserialize)]
pub struct ScriptedHost {
    #[serde(default)]
    repos: BTreeMap<String, ScriptedRepo>,
    #[serde(skip)]
    compare_calls: AtomicUsize,
}

impl ScriptedHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a scripted host from a JSON document.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| RepoDocError::io(path, e))?;
        let mut host: Self = serde_json::from_str(&content).map_err(|e| {
            RepoDocError::config(format!("invalid host fixture {}: {e}", path.display()))
        })?;
        host.repos = std::mem::take(&mut host.repos)
            .into_iter()
            .map(|(k, v)| (k.to_lowercase(), v))
            .collect();
        Ok(host)
    }

    /// Register a repository and its default branch.
    pub fn with_repo(mut self, full_name: &str, default_branch: &str) -> Self {
        self.repos
            .entry(full_name.to_lowercase())
            .or_default()
            .default_branch = default_branch.to_string();
        self
    }

    /// Set the head commit of a branch.
    pub fn with_branch(mut self, full_name: &str, branch: &str, head: &str) -> Self {
        self.repos
            .entry(full_name.to_lowercase())
            .or_default()
            .branches
            .insert(branch.to_string(), head.to_string());
        self
    }

    /// Script the answer for a compare range.
    pub fn with_compare(mut self, full_name: &str, compare: ScriptedCompare) -> Self {
        self.repos
            .entry(full_name.to_lowercase())
            .or_default()
            .compares
            .push(compare);
        self
    }

    /// Number of compare calls served so far.
    pub fn compare_calls(&self) -> usize {
        self.compare_calls.load(Ordering::SeqCst)
    }

    fn repo(&self, owner: &str, repo: &str) -> Result<&ScriptedRepo> {
        let full_name = format!("{owner}/{repo}").to_lowercase();
        self.repos.get(&full_name).ok_or_else(|| {
            RepoDocError::host(
                HostErrorCode::RepoNotFound,
                format!("repository {full_name} not found"),
            )
        })
    }
}

#[async_trait]
impl SourceHost for ScriptedHost {
    async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String> {
        Ok(self.repo(owner, repo)?.default_branch.clone())
    }

    async fn get_branch_head_commit(
        &self,
        owner: &str,
        repo: &str,
        branch: &str,
    ) -> Result<String> {
        self.repo(owner, repo)?
            .branches
            .get(branch)
            .map(|sha| sha.to_lowercase())
            .ok_or_else(|| {
                RepoDocError::host(
                    HostErrorCode::RefNotFound,
                    format!("branch '{branch}' not found in {owner}/{repo}"),
                )
            })
    }

    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
        _page: u32,
        _per_page: u32,
    ) -> Result<CompareResponse> {
        self.compare_calls.fetch_add(1, Ordering::SeqCst);

        self.repo(owner, repo)?
            .compares
            .iter()
            .find(|c| c.base.eq_ignore_ascii_case(base) && c.head.eq_ignore_ascii_case(head))
            .map(|c| CompareResponse {
                status: c.status.clone(),
                files: c.files.clone(),
                has_next_page: c.has_next_page,
            })
            .ok_or_else(|| {
                RepoDocError::host(
                    HostErrorCode::RefNotFound,
                    format!("no comparison {base}...{head} in {owner}/{repo}"),
                )
            })
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
