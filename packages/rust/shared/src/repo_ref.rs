//! Repository reference parsing and normalization.
//!
//! Accepts `owner/repo` optionally followed by a single `@ref` and produces
//! the canonical lowercase identity used for snapshot paths and state keys.

use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::{RepoDocError, Result};

const BRANCH_REF_PREFIX: &str = "refs/heads/";

static NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9._-]+$").expect("valid regex"));

static SHA_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^(?:[0-9a-fA-F]{7}|[0-9a-fA-F]{40})$").expect("valid regex"));

/// Canonical repository identity parsed from `owner/repo[@ref]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ParsedRepoRef {
    /// Lowercased owner.
    pub owner: String,
    /// Lowercased repository name.
    pub repo: String,
    /// Lowercased `owner/repo`.
    pub full_name: String,
    /// Normalized ref after `@`, if one was given.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub requested_ref: Option<String>,
}

impl ParsedRepoRef {
    /// Classification of the requested ref.
    pub fn ref_type(&self) -> RefType {
        infer_ref_type(self.requested_ref.as_deref())
    }
}

impl std::fmt::Display for ParsedRepoRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.requested_ref {
            Some(r) => write!(f, "{}@{r}", self.full_name),
            None => f.write_str(&self.full_name),
        }
    }
}

/// How a requested ref must be resolved to a commit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RefType {
    /// A branch name; its head commit must be looked up.
    Branch,
    /// An explicit abbreviated or full commit hash.
    Sha,
    /// No ref given; the default branch must be queried first.
    Default,
}

/// Parse `owner/repo[@ref]` into its canonical form.
pub fn parse_repo_ref(input: &str) -> Result<ParsedRepoRef> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(RepoDocError::invalid_reference(input, "empty reference"));
    }

    let mut at_parts = trimmed.split('@');
    let name_part = at_parts.next().unwrap_or_default();
    let ref_part = at_parts.next();
    if at_parts.next().is_some() {
        return Err(RepoDocError::invalid_reference(
            input,
            "at most one '@ref' suffix is allowed",
        ));
    }

    let segments: Vec<&str> = name_part.split('/').collect();
    let [owner, repo] = segments.as_slice() else {
        return Err(RepoDocError::invalid_reference(
            input,
            "expected exactly one 'owner/repo' pair",
        ));
    };

    for (label, value) in [("owner", owner), ("repo", repo)] {
        if !NAME_RE.is_match(value) {
            return Err(RepoDocError::invalid_reference(
                input,
                format!("{label} must match [A-Za-z0-9._-]+"),
            ));
        }
        if *value == "." || *value == ".." {
            return Err(RepoDocError::invalid_reference(
                input,
                format!("{label} cannot be '{value}'"),
            ));
        }
    }

    let requested_ref = match ref_part {
        Some(raw) => match normalize_ref(raw) {
            Some(r) => Some(r),
            None => {
                return Err(RepoDocError::invalid_reference(
                    input,
                    "ref after '@' is empty",
                ));
            }
        },
        None => None,
    };

    let owner = owner.to_lowercase();
    let repo = repo.to_lowercase();
    Ok(ParsedRepoRef {
        full_name: format!("{owner}/{repo}"),
        owner,
        repo,
        requested_ref,
    })
}

/// Strip a `refs/heads/` prefix; empty or whitespace-only input maps to `None`.
pub fn normalize_ref(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    let stripped = trimmed.strip_prefix(BRANCH_REF_PREFIX).unwrap_or(trimmed).trim();
    if stripped.is_empty() {
        None
    } else {
        Some(stripped.to_string())
    }
}

/// Classify a normalized ref. `None` means "use the default branch".
pub fn infer_ref_type(r: Option<&str>) -> RefType {
    match r {
        None => RefType::Default,
        Some(r) if SHA_RE.is_match(r) => RefType::Sha,
        Some(_) => RefType::Branch,
    }
}

/// Normalize a repository-relative path: forward slashes, no leading `./` or `/`.
///
/// Returns `None` for paths that are empty after normalization.
pub fn normalize_repo_path(raw: &str) -> Option<String> {
    let mut path = raw.trim().replace('\\', "/");
    loop {
        if let Some(rest) = path.strip_prefix("./") {
            path = rest.to_string();
        } else if let Some(rest) = path.strip_prefix('/') {
            path = rest.to_string();
        } else {
            break;
        }
    }
    if path.is_empty() { None } else { Some(path) }
}
