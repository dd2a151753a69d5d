//! Directory-backed object store.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;
use uuid::Uuid;

use repodoc_shared::{RepoDocError, Result};

use crate::{ObjectMeta, ObjectStore, validate_key};

/// Stores each key as a file under `root`.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
}

impl LocalObjectStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn path_for(&self, key: &str) -> Result<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }
}

fn map_read_error(key: &str, path: &Path, e: std::io::Error) -> RepoDocError {
    if e.kind() == ErrorKind::NotFound {
        RepoDocError::ObjectNotFound {
            key: key.to_string(),
        }
    } else {
        RepoDocError::io(path, e)
    }
}

#[async_trait]
impl ObjectStore for LocalObjectStore {
    async fn head(&self, key: &str) -> Result<ObjectMeta> {
        let path = self.path_for(key)?;
        let meta = tokio::fs::metadata(&path)
            .await
            .map_err(|e| map_read_error(key, &path, e))?;
        if !meta.is_file() {
            return Err(RepoDocError::ObjectNotFound {
                key: key.to_string(),
            });
        }
        Ok(ObjectMeta {
            key: key.to_string(),
            size: Some(meta.len()),
        })
    }

    async fn get(&self, key: &str) -> Result<Vec<u8>> {
        let path = self.path_for(key)?;
        tokio::fs::read(&path)
            .await
            .map_err(|e| map_read_error(key, &path, e))
    }

    async fn put(&self, key: &str, body: Vec<u8>) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoDocError::io(parent, e))?;
        }

        // Write to temp file first, then rename into place
        let temp = path.with_extension(format!("{}.tmp", Uuid::now_v7()));
        tokio::fs::write(&temp, &body)
            .await
            .map_err(|e| RepoDocError::io(&temp, e))?;
        tokio::fs::rename(&temp, &path)
            .await
            .map_err(|e| RepoDocError::io(&path, e))?;

        debug!(key, size = body.len(), "stored object");
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}
