//! Object storage layer.
//!
//! The [`ObjectStore`] trait is the only surface the rest of the workspace
//! sees: `head`, `get` and `put` by key. It backs both the snapshot archive
//! cache and the freshness-state mirror.
//!
//! **Error contract:**
//! - a missing key is always [`RepoDocError::ObjectNotFound`]
//! - every other failure is [`RepoDocError::ObjectStore`] or [`RepoDocError::Network`]
//!
//! Callers rely on that split to tell a cache miss from a broken backend.

mod http;
mod local;

use std::sync::Arc;

use async_trait::async_trait;
use repodoc_shared::{ObjectStorageConfig, ObjectStorageKind, RepoDocError, Result, read_token};

pub use http::HttpObjectStore;
pub use local::LocalObjectStore;

/// Metadata returned by [`ObjectStore::head`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectMeta {
    pub key: String,
    /// Size in bytes, when the backend reports it.
    pub size: Option<u64>,
}

/// Key/value blob storage.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Check that `key` exists.
    async fn head(&self, key: &str) -> Result<ObjectMeta>;

    /// Fetch the full object body.
    async fn get(&self, key: &str) -> Result<Vec<u8>>;

    /// Create or overwrite `key`.
    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()>;

    /// Human-readable backend name for tracing.
    fn name(&self) -> &str;
}

/// Build the configured backend, or `None` when object storage is disabled.
pub fn open_object_store(config: &ObjectStorageConfig) -> Result<Option<Arc<dyn ObjectStore>>> {
    match config.kind {
        ObjectStorageKind::None => Ok(None),
        ObjectStorageKind::Local => {
            let root = config.local_root.as_deref().ok_or_else(|| {
                RepoDocError::config("object_storage.local_root is required for kind = \"local\"")
            })?;
            Ok(Some(Arc::new(LocalObjectStore::new(root))))
        }
        ObjectStorageKind::Http => {
            let base = config.base_url.as_deref().ok_or_else(|| {
                RepoDocError::config("object_storage.base_url is required for kind = \"http\"")
            })?;
            let base = url::Url::parse(base).map_err(|e| {
                RepoDocError::config(format!("invalid object_storage.base_url '{base}': {e}"))
            })?;
            let token = config.token_env.as_deref().and_then(read_token);
            Ok(Some(Arc::new(HttpObjectStore::new(base, token)?)))
        }
    }
}

/// Reject keys that are empty or could escape a directory-backed store.
pub(crate) fn validate_key(key: &str) -> Result<()> {
    let bad = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|seg| seg.is_empty() || seg == "." || seg == "..");
    if bad {
        return Err(RepoDocError::ObjectStore(format!("invalid object key '{key}'")));
    }
    Ok(())
}
