//! Persisted domain types: snapshot manifests and freshness baselines.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current schema version for the freshness state document.
pub const FRESHNESS_SCHEMA_VERSION: u32 = 1;

/// File name of the manifest stored at the root of every snapshot.
pub const MANIFEST_FILE_NAME: &str = ".repodoc-manifest.json";

/// Version-control metadata directories never tracked in a snapshot.
pub const VCS_METADATA_DIRS: &[&str] = &[".git", ".hg", ".svn"];

// ---------------------------------------------------------------------------
// SnapshotManifest
// ---------------------------------------------------------------------------

/// One tracked file of a materialized snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ManifestFileEntry {
    /// Forward-slash path relative to the snapshot root.
    pub path: String,
    /// File size in bytes.
    pub bytes: u64,
    /// SHA-256 of the file contents (lowercase hex).
    pub content_hash: String,
}

/// The manifest persisted alongside a materialized file tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotManifest {
    /// Lowercased `owner/repo`.
    pub repo_full_name: String,
    /// Commit the tree was materialized from.
    pub commit_sha: String,
    /// The ref that was resolved to `commit_sha` (branch name or sha).
    pub resolved_ref: String,
    /// The ref the caller asked for, if any.
    #[serde(default)]
    pub source_ref: Option<String>,
    /// Default branch reported by the host when it was queried.
    #[serde(default)]
    pub source_default_branch: Option<String>,
    /// Number of tracked files.
    pub file_count: usize,
    /// Sum of tracked file sizes.
    pub total_bytes: u64,
    /// Digest over the sorted `(path, bytes, content_hash)` triples.
    pub manifest_signature: String,
    /// When the manifest was computed.
    pub created_at: DateTime<Utc>,
    /// Tracked files in lexicographic path order.
    #[serde(default)]
    pub files: Vec<ManifestFileEntry>,
}

// ---------------------------------------------------------------------------
// Freshness baseline
// ---------------------------------------------------------------------------

/// Repository paths a generated content section was derived from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionEvidence {
    #[serde(rename = "sectionId")]
    pub section_id: String,
    #[serde(rename = "repoPaths", default)]
    pub repo_paths: Vec<String>,
}

/// Last known-good delivery state for one repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessBaseline {
    /// Canonical `owner/repo`.
    pub repo_ref: String,
    /// Commit of the last successful delivery.
    pub last_delivery_commit: String,
    /// Opaque validator from the last delivery, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub etag: Option<String>,
    /// Section → evidence paths recorded at delivery time.
    #[serde(rename = "sectionEvidenceIndex", default)]
    pub section_evidence_index: Vec<SectionEvidence>,
}

/// Durable store of all baselines, keyed by canonical repo ref.
///
/// Transitions are pure: they consume the state and return the next one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FreshnessStateFile {
    pub schema_version: u32,
    #[serde(default)]
    pub repos: BTreeMap<String, FreshnessBaseline>,
}

impl Default for FreshnessStateFile {
    fn default() -> Self {
        Self {
            schema_version: FRESHNESS_SCHEMA_VERSION,
            repos: BTreeMap::new(),
        }
    }
}

impl FreshnessStateFile {
    /// Insert or replace the baseline under its own `repo_ref`.
    pub fn upsert(mut self, baseline: FreshnessBaseline) -> Self {
        self.repos.insert(baseline.repo_ref.clone(), baseline);
        self
    }

    /// Drop the baseline for `repo_ref`, if present.
    pub fn remove(mut self, repo_ref: &str) -> Self {
        self.repos.remove(repo_ref);
        self
    }

    /// Look up a baseline by canonical repo ref.
    pub fn baseline(&self, repo_ref: &str) -> Option<&FreshnessBaseline> {
        self.repos.get(repo_ref)
    }
}

// ---------------------------------------------------------------------------
// ChangedFile
// ---------------------------------------------------------------------------

/// File-level change status reported by the host's compare operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeStatus {
    Added,
    Modified,
    Removed,
    Renamed,
    Copied,
    Changed,
    Unchanged,
}

impl ChangeStatus {
    /// Parse the host's status string.
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "added" => Some(Self::Added),
            "modified" => Some(Self::Modified),
            "removed" => Some(Self::Removed),
            "renamed" => Some(Self::Renamed),
            "copied" => Some(Self::Copied),
            "changed" => Some(Self::Changed),
            "unchanged" => Some(Self::Unchanged),
            _ => None,
        }
    }
}

/// One file-level diff entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangedFile {
    pub path: String,
    pub status: ChangeStatus,
    /// Only present for [`ChangeStatus::Renamed`].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn baseline(repo: &str, commit: &str) -> FreshnessBaseline {
        FreshnessBaseline {
            repo_ref: repo.into(),
            last_delivery_commit: commit.into(),
            etag: None,
            section_evidence_index: vec![SectionEvidence {
                section_id: "sec-1".into(),
                repo_paths: vec!["src/a.ts".into()],
            }],
        }
    }

    #[test]
    fn baseline_uses_camel_case_index_fields() {
        let json = serde_json::to_value(baseline("acme/widget", "abc")).unwrap();
        assert!(json.get("sectionEvidenceIndex").is_some());
        assert_eq!(json["sectionEvidenceIndex"][0]["sectionId"], "sec-1");
        assert_eq!(json["sectionEvidenceIndex"][0]["repoPaths"][0], "src/a.ts");
        assert!(json.get("etag").is_none());
    }

    #[test]
    fn state_upsert_and_remove_are_transitions() {
        let state = FreshnessStateFile::default()
            .upsert(baseline("acme/widget", "c1"))
            .upsert(baseline("acme/gadget", "c2"))
            .upsert(baseline("acme/widget", "c3"));

        assert_eq!(state.repos.len(), 2);
        assert_eq!(state.baseline("acme/widget").unwrap().last_delivery_commit, "c3");

        let state = state.remove("acme/gadget");
        assert!(state.baseline("acme/gadget").is_none());
        assert_eq!(state.schema_version, FRESHNESS_SCHEMA_VERSION);
    }

    #[test]
    fn change_status_parsing() {
        assert_eq!(ChangeStatus::parse("renamed"), Some(ChangeStatus::Renamed));
        assert_eq!(ChangeStatus::parse("unchanged"), Some(ChangeStatus::Unchanged));
        assert_eq!(ChangeStatus::parse("Renamed"), None);
        assert_eq!(ChangeStatus::parse("deleted"), None);
    }

    #[test]
    fn manifest_serialization() {
        let manifest = SnapshotManifest {
            repo_full_name: "acme/widget".into(),
            commit_sha: "0123456789abcdef0123456789abcdef01234567".into(),
            resolved_ref: "main".into(),
            source_ref: None,
            source_default_branch: Some("main".into()),
            file_count: 1,
            total_bytes: 5,
            manifest_signature: "sig".into(),
            created_at: Utc::now(),
            files: vec![ManifestFileEntry {
                path: "README.md".into(),
                bytes: 5,
                content_hash: "h".into(),
            }],
        };

        let json = serde_json::to_string_pretty(&manifest).expect("serialize");
        let parsed: SnapshotManifest = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(parsed, manifest);
    }
}
