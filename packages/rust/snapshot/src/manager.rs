//! Snapshot lifecycle: reuse a verified snapshot or materialize a new one.
//!
//! Each `(owner, repo, commit)` maps to one directory. Writers for the same
//! snapshot are serialized by a file lock, and new trees are built in a
//! staging directory that is swapped into place only once its manifest has
//! been written.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use repodoc_shared::{FileLock, RepoDocError, Result, SnapshotManifest, parse_repo_ref};

use crate::manifest::{
    ManifestSource, compute_manifest, manifest_signature, read_manifest, scan_tree,
    write_manifest,
};
use crate::materializer::Materializer;
use crate::snapshot_id;

const LOCKS_DIR: &str = ".locks";
const STAGING_DIR: &str = ".staging";

/// Input to [`SnapshotManager::create_snapshot`].
#[derive(Debug, Clone, Default)]
pub struct SnapshotRequest {
    pub owner: String,
    pub repo: String,
    pub commit_sha: String,
    /// Ref the commit was resolved from; defaults to the commit itself.
    pub resolved_ref: Option<String>,
    pub source_ref: Option<String>,
    pub source_default_branch: Option<String>,
    /// Skip the reuse check and always rematerialize.
    pub force_rebuild: bool,
}

/// Outcome of [`SnapshotManager::create_snapshot`].
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SnapshotResult {
    pub snapshot_path: PathBuf,
    pub snapshot_id: String,
    pub manifest: SnapshotManifest,
    /// The existing snapshot was verified and reused.
    pub idempotent_hit: bool,
}

pub struct SnapshotManager {
    root: PathBuf,
    materializer: Box<dyn Materializer>,
}

fn is_commit_sha(value: &str) -> bool {
    (7..=40).contains(&value.len()) && value.chars().all(|c| c.is_ascii_hexdigit())
}

/// Blocking filesystem work runs off the async runtime.
async fn blocking<T, F>(task: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(task)
        .await
        .map_err(|e| RepoDocError::Materialization(format!("join snapshot task: {e}")))?
}

async fn remove_dir_if_exists(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(RepoDocError::io(dir, e)),
    }
}

impl SnapshotManager {
    pub fn new(root: impl AsRef<Path>, materializer: Box<dyn Materializer>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            materializer,
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Directory holding the snapshot with the given id.
    pub fn snapshot_path(&self, snapshot_id: &str) -> PathBuf {
        snapshot_id
            .split('/')
            .fold(self.root.clone(), |path, segment| path.join(segment))
    }

    fn lock_path(&self, snapshot_id: &str) -> PathBuf {
        let mut path = self.root.join(LOCKS_DIR);
        for segment in snapshot_id.split('/') {
            path.push(segment);
        }
        path.with_extension("lock")
    }

    /// Return a verified existing snapshot or materialize a fresh one.
    #[instrument(
        skip_all,
        fields(owner = %request.owner, repo = %request.repo, commit = %request.commit_sha)
    )]
    pub async fn create_snapshot(&self, request: &SnapshotRequest) -> Result<SnapshotResult> {
        let parsed = parse_repo_ref(&format!("{}/{}", request.owner, request.repo))?;
        let commit_sha = request.commit_sha.trim().to_lowercase();
        if !is_commit_sha(&commit_sha) {
            return Err(RepoDocError::validation(format!(
                "'{}' is not a commit sha",
                request.commit_sha
            )));
        }

        let snapshot_id = snapshot_id(&parsed.full_name, &commit_sha);
        let snapshot_path = self.snapshot_path(&snapshot_id);

        let _lock = FileLock::acquire(self.lock_path(&snapshot_id)).await?;

        if !request.force_rebuild {
            if let Some(manifest) = self.verify_existing(&snapshot_path, &commit_sha).await {
                info!(snapshot_id = %snapshot_id, "reusing verified snapshot");
                return Ok(SnapshotResult {
                    snapshot_path,
                    snapshot_id,
                    manifest,
                    idempotent_hit: true,
                });
            }
        }

        let source = ManifestSource {
            repo_full_name: parsed.full_name.clone(),
            commit_sha: commit_sha.clone(),
            resolved_ref: request
                .resolved_ref
                .clone()
                .unwrap_or_else(|| commit_sha.clone()),
            source_ref: request.source_ref.clone(),
            source_default_branch: request.source_default_branch.clone(),
        };

        let staging = self.root.join(STAGING_DIR).join(Uuid::now_v7().to_string());
        tokio::fs::create_dir_all(&staging)
            .await
            .map_err(|e| RepoDocError::io(&staging, e))?;

        let built = self.build_into(&staging, &source).await;
        let manifest = match built {
            Ok(manifest) => manifest,
            Err(e) => {
                if let Err(cleanup) = remove_dir_if_exists(&staging).await {
                    warn!(
                        path = %staging.display(),
                        error = %cleanup,
                        "failed to clean staging dir"
                    );
                }
                return Err(e);
            }
        };

        if let Err(e) = self.swap_into_place(&staging, &snapshot_path).await {
            remove_dir_if_exists(&staging).await.ok();
            return Err(e);
        }

        info!(
            snapshot_id = %snapshot_id,
            materializer = self.materializer.name(),
            files = manifest.file_count,
            total_bytes = manifest.total_bytes,
            "snapshot materialized"
        );

        Ok(SnapshotResult {
            snapshot_path,
            snapshot_id,
            manifest,
            idempotent_hit: false,
        })
    }

    /// The stored manifest, if it still describes the tree on disk.
    async fn verify_existing(
        &self,
        snapshot_path: &Path,
        commit_sha: &str,
    ) -> Option<SnapshotManifest> {
        let dir = snapshot_path.to_path_buf();
        let stored = blocking(move || Ok(read_manifest(&dir))).await.ok().flatten()?;

        if stored.commit_sha != commit_sha {
            debug!(stored = %stored.commit_sha, "stored manifest is for another commit");
            return None;
        }

        let dir = snapshot_path.to_path_buf();
        let current = match blocking(move || scan_tree(&dir)).await {
            Ok(entries) => manifest_signature(&entries),
            Err(e) => {
                warn!(error = %e, "failed to rescan existing snapshot, rebuilding");
                return None;
            }
        };

        if current != stored.manifest_signature {
            warn!(
                stored = %stored.manifest_signature,
                current = %current,
                "snapshot tree no longer matches its manifest, rebuilding"
            );
            return None;
        }

        Some(stored)
    }

    async fn build_into(
        &self,
        staging: &Path,
        source: &ManifestSource,
    ) -> Result<SnapshotManifest> {
        self.materializer
            .materialize(&source.repo_full_name, &source.commit_sha, staging)
            .await?;

        let dir = staging.to_path_buf();
        let source = source.clone();
        blocking(move || {
            let manifest = compute_manifest(&dir, &source)?;
            write_manifest(&dir, &manifest)?;
            Ok(manifest)
        })
        .await
    }

    async fn swap_into_place(&self, staging: &Path, snapshot_path: &Path) -> Result<()> {
        remove_dir_if_exists(snapshot_path).await?;
        if let Some(parent) = snapshot_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoDocError::io(parent, e))?;
        }
        tokio::fs::rename(staging, snapshot_path)
            .await
            .map_err(|e| RepoDocError::io(snapshot_path, e))
    }
}
