//! Commit-pinned repository snapshots.
//!
//! A snapshot is the file tree of one repository at one commit, stored at
//! `{root}/{owner}/{repo}/{commit_sha}` with a manifest beside the files.
//! [`SnapshotManager`] is the entry point; [`Materializer`] implementations
//! decide how files arrive.

pub mod archive;
pub mod manager;
pub mod manifest;
pub mod materializer;

pub use manager::{SnapshotManager, SnapshotRequest, SnapshotResult};
pub use manifest::{
    ManifestSource, compute_manifest, manifest_signature, read_manifest, scan_tree,
    write_manifest,
};
pub use materializer::{
    FixtureMaterializer, GitCloneMaterializer, Materializer, ObjectCacheMaterializer,
    archive_key, build_materializer,
};

/// Stable identifier of a snapshot: `{owner}/{repo}/{commit_sha}`, lowercase.
pub fn snapshot_id(repo_full_name: &str, commit_sha: &str) -> String {
    format!("{repo_full_name}/{commit_sha}").to_lowercase()
}
