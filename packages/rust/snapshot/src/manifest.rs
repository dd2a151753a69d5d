//! Deterministic manifests over materialized file trees.
//!
//! The signature is a pure function of the sorted `(path, bytes, content_hash)`
//! triples of every tracked file. Version-control metadata and the manifest
//! file itself are never tracked.

use std::cmp::Ordering;
use std::ffi::OsStr;
use std::fs::File;
use std::path::{Path, PathBuf};

use chrono::Utc;
use sha2::{Digest, Sha256};
use tracing::{debug, warn};
use walkdir::{DirEntry, WalkDir};

use repodoc_shared::{
    MANIFEST_FILE_NAME, ManifestFileEntry, RepoDocError, Result, SnapshotManifest,
    VCS_METADATA_DIRS,
};

/// Identity fields copied into a freshly computed manifest.
#[derive(Debug, Clone)]
pub struct ManifestSource {
    pub repo_full_name: String,
    pub commit_sha: String,
    pub resolved_ref: String,
    pub source_ref: Option<String>,
    pub source_default_branch: Option<String>,
}

/// A tracked file: forward-slash relative path plus its location on disk.
#[derive(Debug, Clone)]
pub(crate) struct TrackedFile {
    pub rel_path: String,
    pub abs_path: PathBuf,
}

/// Case-insensitive collation with a byte-order tie break, so the walk
/// order is total and independent of the filesystem.
fn collate(a: &OsStr, b: &OsStr) -> Ordering {
    let (a, b) = (a.to_string_lossy(), b.to_string_lossy());
    a.to_lowercase()
        .cmp(&b.to_lowercase())
        .then_with(|| a.cmp(&b))
}

fn is_untracked(entry: &DirEntry) -> bool {
    let name = entry.file_name().to_string_lossy();
    if VCS_METADATA_DIRS.contains(&name.as_ref()) {
        return true;
    }
    entry.depth() == 1 && name == MANIFEST_FILE_NAME
}

/// Walk `root` in fully sorted order and list tracked regular files.
///
/// Symbolic links are neither followed nor tracked.
pub(crate) fn walk_tracked(root: &Path) -> Result<Vec<TrackedFile>> {
    let mut files = Vec::new();
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by(|a, b| collate(a.file_name(), b.file_name()))
        .into_iter()
        .filter_entry(|e| !is_untracked(e));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_else(|| root.to_path_buf());
            match e.into_io_error() {
                Some(io) => RepoDocError::io(path, io),
                None => RepoDocError::validation(format!(
                    "filesystem loop under {}",
                    path.display()
                )),
            }
        })?;
        if !entry.file_type().is_file() {
            continue;
        }

        let rel = entry
            .path()
            .strip_prefix(root)
            .map_err(|e| RepoDocError::validation(format!("path outside snapshot root: {e}")))?;
        let rel_path = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        files.push(TrackedFile {
            rel_path,
            abs_path: entry.into_path(),
        });
    }

    Ok(files)
}

/// Hash every tracked file under `root`, returning entries sorted by path.
pub fn scan_tree(root: &Path) -> Result<Vec<ManifestFileEntry>> {
    let mut entries = Vec::new();

    for file in walk_tracked(root)? {
        let mut reader =
            File::open(&file.abs_path).map_err(|e| RepoDocError::io(&file.abs_path, e))?;
        let mut hasher = Sha256::new();
        let bytes = std::io::copy(&mut reader, &mut hasher)
            .map_err(|e| RepoDocError::io(&file.abs_path, e))?;

        entries.push(ManifestFileEntry {
            path: file.rel_path,
            bytes,
            content_hash: format!("{:x}", hasher.finalize()),
        });
    }

    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

/// Running digest over `path:bytes:content_hash\n` lines in path order.
pub fn manifest_signature(entries: &[ManifestFileEntry]) -> String {
    let mut sorted: Vec<&ManifestFileEntry> = entries.iter().collect();
    sorted.sort_by(|a, b| a.path.cmp(&b.path));

    let mut hasher = Sha256::new();
    for entry in sorted {
        hasher.update(
            format!("{}:{}:{}\n", entry.path, entry.bytes, entry.content_hash).as_bytes(),
        );
    }
    format!("{:x}", hasher.finalize())
}

/// Scan `root` and build a complete manifest for it.
pub fn compute_manifest(root: &Path, source: &ManifestSource) -> Result<SnapshotManifest> {
    let files = scan_tree(root)?;
    let total_bytes = files.iter().map(|f| f.bytes).sum();
    let manifest_signature = manifest_signature(&files);

    debug!(
        root = %root.display(),
        files = files.len(),
        total_bytes,
        signature = %manifest_signature,
        "manifest computed"
    );

    Ok(SnapshotManifest {
        repo_full_name: source.repo_full_name.clone(),
        commit_sha: source.commit_sha.clone(),
        resolved_ref: source.resolved_ref.clone(),
        source_ref: source.source_ref.clone(),
        source_default_branch: source.source_default_branch.clone(),
        file_count: files.len(),
        total_bytes,
        manifest_signature,
        created_at: Utc::now(),
        files,
    })
}

/// Read the stored manifest of a snapshot directory.
///
/// Missing and unreadable manifests both mean "nothing reusable here".
pub fn read_manifest(snapshot_dir: &Path) -> Option<SnapshotManifest> {
    let path = snapshot_dir.join(MANIFEST_FILE_NAME);
    let content = match std::fs::read_to_string(&path) {
        Ok(content) => content,
        Err(e) => {
            debug!(path = %path.display(), error = %e, "no stored manifest");
            return None;
        }
    };

    match serde_json::from_str(&content) {
        Ok(manifest) => Some(manifest),
        Err(e) => {
            warn!(path = %path.display(), error = %e, "stored manifest is corrupt, ignoring");
            None
        }
    }
}

/// Persist `manifest` into `snapshot_dir` (temp file, then rename).
pub fn write_manifest(snapshot_dir: &Path, manifest: &SnapshotManifest) -> Result<()> {
    let mut json = serde_json::to_string_pretty(manifest)
        .map_err(|e| RepoDocError::validation(format!("JSON serialization failed: {e}")))?;
    json.push('\n');

    let target = snapshot_dir.join(MANIFEST_FILE_NAME);
    let temp = snapshot_dir.join(format!("{MANIFEST_FILE_NAME}.tmp"));
    std::fs::write(&temp, json).map_err(|e| RepoDocError::io(&temp, e))?;
    std::fs::rename(&temp, &target).map_err(|e| RepoDocError::io(&target, e))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_tree(files: &[(&str, &str)]) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "repodoc-manifest-test-{}",
            uuid::Uuid::now_v7()
        ));
        for (path, content) in files {
            let file = dir.join(path);
            std::fs::create_dir_all(file.parent().unwrap()).unwrap();
            std::fs::write(file, content).unwrap();
        }
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn signature_of(dir: &Path) -> String {
        manifest_signature(&scan_tree(dir).unwrap())
    }

    fn source() -> ManifestSource {
        ManifestSource {
            repo_full_name: "acme/widget".into(),
            commit_sha: "abc1234".into(),
            resolved_ref: "main".into(),
            source_ref: None,
            source_default_branch: Some("main".into()),
        }
    }

    const TREE: &[(&str, &str)] = &[
        ("README.md", "# Widget\n"),
        ("src/lib.rs", "pub fn widget() {}\n"),
        ("src/Util.rs", "pub fn util() {}\n"),
        ("docs/guide/intro.md", "Intro\n"),
    ];

    #[test]
    fn signature_is_deterministic_across_trees() {
        let a = temp_tree(TREE);
        let mut reversed: Vec<_> = TREE.to_vec();
        reversed.reverse();
        let b = temp_tree(&reversed);

        assert_eq!(signature_of(&a), signature_of(&a));
        assert_eq!(signature_of(&a), signature_of(&b));

        std::fs::remove_dir_all(&a).ok();
        std::fs::remove_dir_all(&b).ok();
    }

    #[test]
    fn signature_ignores_entry_order_and_separators() {
        let entries = vec![
            ManifestFileEntry { path: "b.txt".into(), bytes: 1, content_hash: "h1".into() },
            ManifestFileEntry { path: "a/c.txt".into(), bytes: 2, content_hash: "h2".into() },
        ];
        let mut shuffled = entries.clone();
        shuffled.reverse();
        assert_eq!(manifest_signature(&entries), manifest_signature(&shuffled));
    }

    #[test]
    fn signature_is_sensitive_to_changes() {
        let dir = temp_tree(TREE);
        let original = signature_of(&dir);

        // Single byte change
        std::fs::write(dir.join("README.md"), "# Widgeu\n").unwrap();
        let edited = signature_of(&dir);
        assert_ne!(original, edited);

        // Add
        std::fs::write(dir.join("NEW.md"), "").unwrap();
        let added = signature_of(&dir);
        assert_ne!(edited, added);

        // Rename
        std::fs::rename(dir.join("NEW.md"), dir.join("NEWER.md")).unwrap();
        let renamed = signature_of(&dir);
        assert_ne!(added, renamed);

        // Delete
        std::fs::remove_file(dir.join("NEWER.md")).unwrap();
        assert_eq!(signature_of(&dir), edited);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn vcs_metadata_and_manifest_are_untracked() {
        let dir = temp_tree(TREE);
        let before = signature_of(&dir);

        std::fs::create_dir_all(dir.join(".git/objects")).unwrap();
        std::fs::write(dir.join(".git/HEAD"), "ref: refs/heads/main\n").unwrap();
        std::fs::write(dir.join(MANIFEST_FILE_NAME), "{}").unwrap();
        assert_eq!(signature_of(&dir), before);

        // A nested file with the manifest's name is ordinary content.
        std::fs::write(dir.join("docs").join(MANIFEST_FILE_NAME), "{}").unwrap();
        assert_ne!(signature_of(&dir), before);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn entries_use_forward_slashes_and_sizes() {
        let dir = temp_tree(TREE);
        let entries = scan_tree(&dir).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["README.md", "docs/guide/intro.md", "src/Util.rs", "src/lib.rs"]
        );
        assert_eq!(entries[0].bytes, 9);
        assert_eq!(entries[0].content_hash.len(), 64);

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn manifest_write_read_roundtrip() {
        let dir = temp_tree(TREE);
        let manifest = compute_manifest(&dir, &source()).unwrap();
        assert_eq!(manifest.file_count, 4);
        assert_eq!(manifest.total_bytes, entries_total(&dir));

        write_manifest(&dir, &manifest).unwrap();
        let stored = read_manifest(&dir).unwrap();
        assert_eq!(stored, manifest);

        // Writing the manifest does not change the tree's signature.
        assert_eq!(signature_of(&dir), manifest.manifest_signature);

        std::fs::remove_dir_all(&dir).ok();
    }

    fn entries_total(dir: &Path) -> u64 {
        scan_tree(dir).unwrap().iter().map(|e| e.bytes).sum()
    }

    #[test]
    fn corrupt_manifest_reads_as_none() {
        let dir = temp_tree(TREE);
        std::fs::write(dir.join(MANIFEST_FILE_NAME), "{ not json").unwrap();
        assert!(read_manifest(&dir).is_none());
        std::fs::remove_dir_all(&dir).ok();
    }
}
