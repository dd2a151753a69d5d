//! Archive cache in front of another materializer.
//!
//! A hit restores the tree from `{prefix}{snapshot_id}.tar.gz`. A miss, or
//! any download/extract failure, falls through to the wrapped strategy and
//! then uploads a fresh archive. Cache trouble is logged, never fatal.

use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, instrument, warn};

use repodoc_shared::Result;
use repodoc_storage::ObjectStore;

use super::{Materializer, reset_dir};
use crate::archive::{pack_tree, unpack_tree};
use crate::snapshot_id;

/// Object key of the archive for one snapshot.
pub fn archive_key(prefix: &str, repo_full_name: &str, commit_sha: &str) -> String {
    format!("{prefix}{}.tar.gz", snapshot_id(repo_full_name, commit_sha))
}

pub struct ObjectCacheMaterializer {
    store: Arc<dyn ObjectStore>,
    fallback: Box<dyn Materializer>,
    prefix: String,
}

impl ObjectCacheMaterializer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        fallback: Box<dyn Materializer>,
        prefix: impl Into<String>,
    ) -> Self {
        Self {
            store,
            fallback,
            prefix: prefix.into(),
        }
    }

    /// Try the cache. `true` means `target` now holds the tree.
    async fn restore(&self, key: &str, target: &Path) -> bool {
        let bytes = match self.store.get(key).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_object_not_found() => {
                debug!(key, "archive cache miss");
                return false;
            }
            Err(e) => {
                warn!(
                    key,
                    store = self.store.name(),
                    error = %e,
                    "archive download failed, falling back"
                );
                return false;
            }
        };

        let dest = target.to_path_buf();
        let extracted = match tokio::task::spawn_blocking(move || unpack_tree(&bytes, &dest)).await
        {
            Ok(extracted) => extracted,
            Err(e) => {
                warn!(key, error = %e, "extract task failed, falling back");
                self.discard_partial(key, target).await;
                return false;
            }
        };

        match extracted {
            Ok(files) => {
                info!(key, files, "restored snapshot from archive cache");
                true
            }
            Err(e) => {
                warn!(key, error = %e, "archive extraction failed, falling back");
                self.discard_partial(key, target).await;
                false
            }
        }
    }

    async fn discard_partial(&self, key: &str, target: &Path) {
        if let Err(e) = reset_dir(target).await {
            warn!(key, error = %e, "could not clear partial extraction");
        }
    }

    async fn upload(&self, key: &str, target: &Path) {
        let root = target.to_path_buf();
        let packed = tokio::task::spawn_blocking(move || pack_tree(&root)).await;
        let bytes = match packed {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(e)) => {
                warn!(key, error = %e, "failed to pack snapshot archive");
                return;
            }
            Err(e) => {
                warn!(key, error = %e, "archive task failed");
                return;
            }
        };

        let size = bytes.len();
        match self.store.put(key, bytes).await {
            Ok(()) => info!(key, size, "uploaded snapshot archive"),
            Err(e) => warn!(key, store = self.store.name(), error = %e, "archive upload failed"),
        }
    }
}

#[async_trait]
impl Materializer for ObjectCacheMaterializer {
    #[instrument(
        skip_all,
        fields(repo = repo_full_name, commit = commit_sha, fallback = self.fallback.name())
    )]
    async fn materialize(
        &self,
        repo_full_name: &str,
        commit_sha: &str,
        target: &Path,
    ) -> Result<()> {
        let key = archive_key(&self.prefix, repo_full_name, commit_sha);

        if self.restore(&key, target).await {
            return Ok(());
        }

        self.fallback
            .materialize(repo_full_name, commit_sha, target)
            .await?;
        self.upload(&key, target).await;
        Ok(())
    }

    fn name(&self) -> &str {
        "object-cache"
    }
}
