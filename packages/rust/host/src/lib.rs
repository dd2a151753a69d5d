//! Source-control host capability.
//!
//! The detector and the snapshot stage only ever need three questions answered
//! by the host: what is the default branch, what is a branch's head commit, and
//! what changed between two commits. [`SourceHost`] is that narrow capability.
//! Implementations are chosen at the process boundary and injected downward:
//! - [`GitHubHost`]: the GitHub REST API
//! - [`ScriptedHost`]: an in-memory fixture for tests and offline runs

mod github;
mod resolve;
mod scripted;

use async_trait::async_trait;
use repodoc_shared::Result;

pub use github::{GitHubHost, GitHubHostOptions};
pub use resolve::{ResolvedRef, resolve_commit};
pub use scripted::{ScriptedCompare, ScriptedHost};

/// One page of a compare-commits response.
///
/// `files` is kept as raw JSON so the detector can tell a missing or
/// malformed file list apart from an empty one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CompareResponse {
    /// `ahead`, `behind`, `identical`, `diverged`, or absent.
    pub status: Option<String>,
    /// The `files` value exactly as returned.
    pub files: Option<serde_json::Value>,
    /// Whether the host advertised a further page.
    pub has_next_page: bool,
}

/// Narrow source-control host capability.
#[async_trait]
pub trait SourceHost: Send + Sync {
    /// Current default branch of `owner/repo`.
    async fn get_default_branch(&self, owner: &str, repo: &str) -> Result<String>;

    /// Head commit sha of `branch`.
    async fn get_branch_head_commit(&self, owner: &str, repo: &str, branch: &str)
    -> Result<String>;

    /// Compare `base..head`, returning the requested page.
    async fn compare_commits(
        &self,
        owner: &str,
        repo: &str,
        base: &str,
        head: &str,
        page: u32,
        per_page: u32,
    ) -> Result<CompareResponse>;

    /// Human-readable host name for tracing.
    fn name(&self) -> &str;
}
