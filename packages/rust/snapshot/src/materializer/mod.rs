//! Materializer trait and built-in strategies.
//!
//! A materializer populates an empty directory with the file tree of one
//! repository at one commit. Strategies:
//! - [`GitCloneMaterializer`]: shallow fetch of the exact commit
//! - [`FixtureMaterializer`]: copy from a local fixture tree
//! - [`ObjectCacheMaterializer`]: archive cache in front of another strategy

mod clone;
mod fixture;
mod object_cache;

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use repodoc_shared::{MaterializeStrategy, RepoDocError, Result, SnapshotConfig};
use repodoc_storage::ObjectStore;

pub use clone::GitCloneMaterializer;
pub use fixture::FixtureMaterializer;
pub use object_cache::{ObjectCacheMaterializer, archive_key};

// ---------------------------------------------------------------------------
// Trait
// ---------------------------------------------------------------------------

/// Populates a directory with a repository's files at a commit.
#[async_trait]
pub trait Materializer: Send + Sync {
    /// Write the tree of `repo_full_name` at `commit_sha` into `target`.
    ///
    /// `target` exists and is empty when this is called. On error the
    /// caller discards it.
    async fn materialize(&self, repo_full_name: &str, commit_sha: &str, target: &Path)
    -> Result<()>;

    /// Human-readable strategy name for tracing.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// Construction
// ---------------------------------------------------------------------------

/// Build the configured strategy, wrapped in the archive cache when an
/// object store is available.
pub fn build_materializer(
    config: &SnapshotConfig,
    host_token: Option<String>,
    store: Option<Arc<dyn ObjectStore>>,
    snapshot_prefix: &str,
) -> Result<Box<dyn Materializer>> {
    let base: Box<dyn Materializer> = match config.strategy {
        MaterializeStrategy::Clone => Box::new(GitCloneMaterializer::new(
            &config.clone_base_url,
            &config.git_bin,
            host_token,
        )),
        MaterializeStrategy::Fixture => {
            let root = config.fixture_root.as_deref().ok_or_else(|| {
                RepoDocError::config("snapshot.fixture_root is required for strategy = \"fixture\"")
            })?;
            Box::new(FixtureMaterializer::new(root))
        }
    };

    Ok(match store {
        Some(store) => Box::new(ObjectCacheMaterializer::new(store, base, snapshot_prefix)),
        None => base,
    })
}

/// Empty `dir` without removing it.
pub(crate) async fn reset_dir(dir: &Path) -> Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(RepoDocError::io(dir, e)),
    }
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| RepoDocError::io(dir, e))
}
