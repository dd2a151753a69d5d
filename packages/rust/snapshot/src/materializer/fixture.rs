//! Materialize by copying a local fixture tree.
//!
//! Lookup order: `<root>/<owner>/<repo>/<commit>`, then `<root>/<owner>/<repo>`.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use repodoc_shared::{RepoDocError, Result};

use super::Materializer;
use crate::manifest::walk_tracked;

pub struct FixtureMaterializer {
    root: PathBuf,
}

impl FixtureMaterializer {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn source_dir(&self, repo_full_name: &str, commit_sha: &str) -> Option<PathBuf> {
        let repo_dir = self.root.join(repo_full_name);
        [repo_dir.join(commit_sha), repo_dir]
            .into_iter()
            .find(|p| p.is_dir())
    }
}

fn copy_tree(source: &Path, target: &Path) -> Result<usize> {
    let files = walk_tracked(source)?;
    for file in &files {
        let dest = target.join(&file.rel_path);
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent).map_err(|e| RepoDocError::io(parent, e))?;
        }
        std::fs::copy(&file.abs_path, &dest).map_err(|e| RepoDocError::io(&dest, e))?;
    }
    Ok(files.len())
}

#[async_trait]
impl Materializer for FixtureMaterializer {
    async fn materialize(
        &self,
        repo_full_name: &str,
        commit_sha: &str,
        target: &Path,
    ) -> Result<()> {
        let source = self.source_dir(repo_full_name, commit_sha).ok_or_else(|| {
            RepoDocError::Materialization(format!(
                "no fixture for {repo_full_name}@{commit_sha} under {}",
                self.root.display()
            ))
        })?;

        let target = target.to_path_buf();
        let from = source.clone();
        let copied = tokio::task::spawn_blocking(move || copy_tree(&from, &target))
            .await
            .map_err(|e| RepoDocError::Materialization(format!("join copy task: {e}")))??;

        debug!(source = %source.display(), files = copied, "fixture copied");
        Ok(())
    }

    fn name(&self) -> &str {
        "fixture"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(label: &str) -> PathBuf {
        std::env::temp_dir().join(format!("repodoc-fixture-{label}-{}", uuid::Uuid::now_v7()))
    }

    #[tokio::test]
    async fn prefers_commit_specific_fixture() {
        let root = temp_dir("root");
        std::fs::create_dir_all(root.join("acme/widget/abc1234/src")).unwrap();
        std::fs::write(root.join("acme/widget/abc1234/src/lib.rs"), "v2").unwrap();
        std::fs::write(root.join("acme/widget/README.md"), "v1").unwrap();

        let materializer = FixtureMaterializer::new(&root);

        let pinned = temp_dir("pinned");
        std::fs::create_dir_all(&pinned).unwrap();
        materializer
            .materialize("acme/widget", "abc1234", &pinned)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(pinned.join("src/lib.rs")).unwrap(), "v2");
        assert!(!pinned.join("README.md").exists());

        let fallback = temp_dir("fallback");
        std::fs::create_dir_all(&fallback).unwrap();
        materializer
            .materialize("acme/widget", "def5678", &fallback)
            .await
            .unwrap();
        assert_eq!(std::fs::read_to_string(fallback.join("README.md")).unwrap(), "v1");

        for dir in [root, pinned, fallback] {
            std::fs::remove_dir_all(dir).ok();
        }
    }

    #[tokio::test]
    async fn missing_fixture_is_error() {
        let root = temp_dir("empty");
        let target = temp_dir("target");
        std::fs::create_dir_all(&target).unwrap();

        let err = FixtureMaterializer::new(&root)
            .materialize("acme/none", "abc1234", &target)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoDocError::Materialization(_)));

        std::fs::remove_dir_all(&target).ok();
    }
}
