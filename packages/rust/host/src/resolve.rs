//! Resolve a parsed repository reference to a concrete commit.

use serde::Serialize;
use tracing::{debug, instrument};

use repodoc_shared::{ParsedRepoRef, RefType, Result};

use crate::SourceHost;

/// A requested ref pinned to a commit.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedRef {
    /// Lowercase commit sha.
    pub commit_sha: String,
    /// Branch name or sha that produced `commit_sha`.
    pub resolved_ref: String,
    /// The ref the caller asked for, if any.
    pub source_ref: Option<String>,
    /// Default branch, when it had to be queried.
    pub source_default_branch: Option<String>,
}

/// Pin `parsed` to a commit.
///
/// Explicit shas are trusted as-is and cost no host call; branches cost one;
/// the default branch costs two.
#[instrument(skip_all, fields(repo = %parsed))]
pub async fn resolve_commit(host: &dyn SourceHost, parsed: &ParsedRepoRef) -> Result<ResolvedRef> {
    let resolved = match (parsed.ref_type(), parsed.requested_ref.as_deref()) {
        (RefType::Sha, Some(sha)) => ResolvedRef {
            commit_sha: sha.to_lowercase(),
            resolved_ref: sha.to_lowercase(),
            source_ref: parsed.requested_ref.clone(),
            source_default_branch: None,
        },
        (RefType::Branch, Some(branch)) => {
            let head = host
                .get_branch_head_commit(&parsed.owner, &parsed.repo, branch)
                .await?;
            ResolvedRef {
                commit_sha: head.to_lowercase(),
                resolved_ref: branch.to_string(),
                source_ref: parsed.requested_ref.clone(),
                source_default_branch: None,
            }
        }
        _ => {
            let branch = host.get_default_branch(&parsed.owner, &parsed.repo).await?;
            let head = host
                .get_branch_head_commit(&parsed.owner, &parsed.repo, &branch)
                .await?;
            ResolvedRef {
                commit_sha: head.to_lowercase(),
                resolved_ref: branch.clone(),
                source_ref: None,
                source_default_branch: Some(branch),
            }
        }
    };

    debug!(commit = %resolved.commit_sha, via = %resolved.resolved_ref, "ref resolved");
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ScriptedHost;
    use repodoc_shared::parse_repo_ref;

    fn host() -> ScriptedHost {
        ScriptedHost::new()
            .with_repo("acme/widget", "main")
            .with_branch("acme/widget", "main", "1111111")
            .with_branch("acme/widget", "release/2.x", "2222222")
    }

    #[tokio::test]
    async fn default_branch_is_queried() {
        let parsed = parse_repo_ref("acme/widget").unwrap();
        let resolved = resolve_commit(&host(), &parsed).await.unwrap();
        assert_eq!(resolved.commit_sha, "1111111");
        assert_eq!(resolved.resolved_ref, "main");
        assert_eq!(resolved.source_default_branch.as_deref(), Some("main"));
        assert_eq!(resolved.source_ref, None);
    }

    #[tokio::test]
    async fn branch_ref_uses_branch_head() {
        let parsed = parse_repo_ref("acme/widget@refs/heads/release/2.x").unwrap();
        let resolved = resolve_commit(&host(), &parsed).await.unwrap();
        assert_eq!(resolved.commit_sha, "2222222");
        assert_eq!(resolved.resolved_ref, "release/2.x");
        assert_eq!(resolved.source_ref.as_deref(), Some("release/2.x"));
    }

    #[tokio::test]
    async fn sha_ref_needs_no_host() {
        let parsed = parse_repo_ref("acme/unknown@ABCDEF0").unwrap();
        // The scripted host does not know this repo; a sha must not hit it.
        let resolved = resolve_commit(&host(), &parsed).await.unwrap();
        assert_eq!(resolved.commit_sha, "abcdef0");
    }

    #[tokio::test]
    async fn missing_branch_keeps_error_code() {
        let parsed = parse_repo_ref("acme/widget@feature").unwrap();
        let err = resolve_commit(&host(), &parsed).await.unwrap_err();
        assert_eq!(err.code(), Some("REF_NOT_FOUND"));
    }
}
