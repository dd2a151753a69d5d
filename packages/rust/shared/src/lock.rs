//! Advisory inter-process file locks.
//!
//! Used to serialize snapshot materialization per snapshot id and
//! freshness-state read-modify-write cycles per state file.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::time::Instant;

use fs2::FileExt;
use tracing::debug;

use crate::{RepoDocError, Result};

/// An exclusive lock held until dropped.
#[derive(Debug)]
pub struct FileLock {
    file: File,
    path: PathBuf,
}

impl FileLock {
    /// Block (off the async runtime) until the lock at `path` is acquired.
    ///
    /// The lock file and its parent directories are created if missing.
    pub async fn acquire(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| RepoDocError::io(parent, e))?;
        }

        tokio::task::spawn_blocking(move || -> Result<FileLock> {
            let file = OpenOptions::new()
                .create(true)
                .read(true)
                .write(true)
                .truncate(false)
                .open(&path)
                .map_err(|e| RepoDocError::io(&path, e))?;

            let start = Instant::now();
            file.lock_exclusive()
                .map_err(|e| RepoDocError::io(&path, e))?;
            debug!(
                path = %path.display(),
                wait_ms = start.elapsed().as_millis() as u64,
                "lock acquired"
            );

            Ok(FileLock { file, path })
        })
        .await
        .map_err(|e| RepoDocError::validation(format!("join lock task: {e}")))?
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        let _ = self.file.unlock();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[tokio::test]
    async fn lock_serializes_holders() {
        let path = std::env::temp_dir()
            .join(format!("repodoc-lock-test-{}", uuid::Uuid::now_v7()))
            .join("nested/a.lock");

        let inside = Arc::new(AtomicUsize::new(0));
        let max_inside = Arc::new(AtomicUsize::new(0));

        let mut tasks = Vec::new();
        for _ in 0..4 {
            let path = path.clone();
            let inside = inside.clone();
            let max_inside = max_inside.clone();
            tasks.push(tokio::spawn(async move {
                let _lock = FileLock::acquire(&path).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_inside.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(20)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        assert_eq!(max_inside.load(Ordering::SeqCst), 1);
        assert!(path.exists());
        std::fs::remove_dir_all(path.parent().unwrap().parent().unwrap()).ok();
    }
}
