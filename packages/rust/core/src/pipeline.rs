//! End-to-end `snapshot` pipeline: reference → commit → materialized tree.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, instrument};

use repodoc_host::{SourceHost, resolve_commit};
use repodoc_shared::{ObjectStorageConfig, Result, SnapshotConfig, parse_repo_ref};
use repodoc_snapshot::{SnapshotManager, SnapshotRequest, SnapshotResult, build_materializer};
use repodoc_storage::ObjectStore;

/// Configuration for the `snapshot_repo` pipeline.
#[derive(Debug, Clone)]
pub struct SnapshotRepoConfig {
    /// `owner/repo[@ref]` as typed by the user.
    pub reference: String,
    /// Snapshot root and materialization strategy.
    pub snapshot: SnapshotConfig,
    /// Archive key prefix and backend selection.
    pub object_storage: ObjectStorageConfig,
    /// Token used by the clone strategy for private repositories.
    pub host_token: Option<String>,
    /// Rematerialize even if a verified snapshot exists.
    pub force_rebuild: bool,
}

/// Progress callback for reporting pipeline status.
pub trait ProgressReporter: Send + Sync {
    /// Called when entering a new phase.
    fn phase(&self, name: &str);
    /// Called when the snapshot is ready.
    fn snapshot_ready(&self, result: &SnapshotResult, elapsed: std::time::Duration);
}

/// No-op progress reporter for headless/test usage.
pub struct SilentProgress;

impl ProgressReporter for SilentProgress {
    fn phase(&self, _name: &str) {}
    fn snapshot_ready(&self, _result: &SnapshotResult, _elapsed: std::time::Duration) {}
}

/// Run the full `snapshot` pipeline.
///
/// 1. Parse the reference
/// 2. Resolve it to a commit via the host
/// 3. Reuse or materialize the snapshot for that commit
#[instrument(skip_all, fields(reference = %config.reference, force = config.force_rebuild))]
pub async fn snapshot_repo(
    config: &SnapshotRepoConfig,
    host: &dyn SourceHost,
    object_store: Option<Arc<dyn ObjectStore>>,
    progress: &dyn ProgressReporter,
) -> Result<SnapshotResult> {
    let start = Instant::now();

    let parsed = parse_repo_ref(&config.reference)?;

    progress.phase("Resolving reference");
    let resolved = resolve_commit(host, &parsed).await?;
    info!(
        repo = %parsed.full_name,
        commit = %resolved.commit_sha,
        resolved_ref = %resolved.resolved_ref,
        "reference resolved"
    );

    progress.phase("Materializing snapshot");
    let materializer = build_materializer(
        &config.snapshot,
        config.host_token.clone(),
        object_store,
        &config.object_storage.snapshot_prefix,
    )?;
    let manager = SnapshotManager::new(PathBuf::from(&config.snapshot.root), materializer);

    let result = manager
        .create_snapshot(&SnapshotRequest {
            owner: parsed.owner.clone(),
            repo: parsed.repo.clone(),
            commit_sha: resolved.commit_sha,
            resolved_ref: Some(resolved.resolved_ref),
            source_ref: resolved.source_ref,
            source_default_branch: resolved.source_default_branch,
            force_rebuild: config.force_rebuild,
        })
        .await?;

    let elapsed = start.elapsed();
    info!(
        snapshot_id = %result.snapshot_id,
        idempotent_hit = result.idempotent_hit,
        files = result.manifest.file_count,
        elapsed_ms = elapsed.as_millis() as u64,
        "snapshot pipeline complete"
    );
    progress.snapshot_ready(&result, elapsed);

    Ok(result)
}
