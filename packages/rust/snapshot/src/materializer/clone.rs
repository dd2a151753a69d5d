//! Materialize by fetching the exact commit with the `git` CLI.

use std::path::Path;
use std::process::Stdio;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tokio::process::Command;
use tracing::{debug, instrument};

use repodoc_shared::{RepoDocError, Result};

use super::Materializer;

/// Shallow-fetches one commit into the target, then strips `.git`.
pub struct GitCloneMaterializer {
    base_url: String,
    git_bin: String,
    token: Option<String>,
}

impl GitCloneMaterializer {
    pub fn new(base_url: &str, git_bin: &str, token: Option<String>) -> Self {
        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            git_bin: git_bin.to_string(),
            token,
        }
    }

    fn remote_url(&self, repo_full_name: &str) -> String {
        format!("{}/{repo_full_name}.git", self.base_url)
    }

    /// `http.extraHeader` carrying the token, passed through the environment
    /// so it stays out of the process arguments.
    fn auth_header(&self) -> Option<String> {
        self.token.as_ref().map(|token| {
            let credentials = STANDARD.encode(format!("x-access-token:{token}"));
            format!("Authorization: Basic {credentials}")
        })
    }

    fn redact(&self, text: &str) -> String {
        let mut text = text.to_string();
        if let Some(token) = &self.token {
            text = text.replace(token.as_str(), "***");
        }
        if let Some(header) = self.auth_header() {
            text = text.replace(header.as_str(), "Authorization: ***");
        }
        text
    }

    async fn git(&self, cwd: &Path, args: &[&str], display_cmd: &str) -> Result<()> {
        debug!(cwd = %cwd.display(), command = display_cmd, "running git");
        let mut command = Command::new(&self.git_bin);
        command
            .args(args)
            .current_dir(cwd)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null());
        if let Some(header) = self.auth_header() {
            command
                .env("GIT_CONFIG_COUNT", "1")
                .env("GIT_CONFIG_KEY_0", "http.extraHeader")
                .env("GIT_CONFIG_VALUE_0", header);
        }

        let output = command
            .output()
            .await
            .map_err(|e| {
                RepoDocError::Materialization(format!("failed to run {}: {e}", self.git_bin))
            })?;

        if !output.status.success() {
            let stderr = self.redact(&String::from_utf8_lossy(&output.stderr));
            return Err(RepoDocError::Materialization(format!(
                "`git {display_cmd}` failed ({}): {}",
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl Materializer for GitCloneMaterializer {
    #[instrument(skip_all, fields(repo = repo_full_name, commit = commit_sha))]
    async fn materialize(
        &self,
        repo_full_name: &str,
        commit_sha: &str,
        target: &Path,
    ) -> Result<()> {
        let url = self.remote_url(repo_full_name);

        self.git(target, &["init", "--quiet"], "init").await?;

        // Servers only accept full object ids in a fetch refspec, so an
        // abbreviated sha needs the full history to resolve.
        if commit_sha.len() == 40 {
            self.git(
                target,
                &["fetch", "--quiet", "--depth", "1", &url, commit_sha],
                "fetch --depth 1 <remote> <sha>",
            )
            .await?;
            self.git(
                target,
                &["checkout", "--quiet", "--detach", "FETCH_HEAD"],
                "checkout --detach FETCH_HEAD",
            )
            .await?;
        } else {
            self.git(
                target,
                &["fetch", "--quiet", &url, "+refs/heads/*:refs/remotes/origin/*"],
                "fetch <remote>",
            )
            .await?;
            self.git(
                target,
                &["checkout", "--quiet", "--detach", commit_sha],
                "checkout --detach <sha>",
            )
            .await?;
        }

        let git_dir = target.join(".git");
        tokio::fs::remove_dir_all(&git_dir)
            .await
            .map_err(|e| RepoDocError::io(&git_dir, e))?;
        Ok(())
    }

    fn name(&self) -> &str {
        "git-clone"
    }
}
