//! Change detection between a delivered baseline and the current head.

use std::collections::BTreeSet;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument};

use repodoc_host::SourceHost;
use repodoc_shared::{
    ChangeStatus, ChangedFile, FreshnessBaseline, RepoDocError, Result, normalize_repo_path,
    parse_repo_ref,
};

/// Files returned per compare page requested from the host.
pub const DEFAULT_COMPARE_PER_PAGE: u32 = 100;

/// The host truncates compare file lists at this many entries.
pub const DEFAULT_COMPARE_FILE_CAP: usize = 300;

/// Why a compare result cannot be trusted for incremental mapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AmbiguityReason {
    /// The file list is absent or not an array.
    CompareFileListMissing,
    /// The host reports a further page of files.
    ComparePaginated,
    /// The file list reached the host's per-response cap.
    CompareFileCapReached,
    /// Base and head have diverged.
    CompareStatusDiverged,
    /// The compare status is missing or blank.
    CompareStatusUnknown,
    /// At least one file entry could not be normalized.
    CompareFileEntryInvalid,
}

impl AmbiguityReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CompareFileListMissing => "COMPARE_FILE_LIST_MISSING",
            Self::ComparePaginated => "COMPARE_PAGINATED",
            Self::CompareFileCapReached => "COMPARE_FILE_CAP_REACHED",
            Self::CompareStatusDiverged => "COMPARE_STATUS_DIVERGED",
            Self::CompareStatusUnknown => "COMPARE_STATUS_UNKNOWN",
            Self::CompareFileEntryInvalid => "COMPARE_FILE_ENTRY_INVALID",
        }
    }
}

impl std::fmt::Display for AmbiguityReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectionMode {
    Noop,
    IncrementalCandidate,
    FullRebuildRequired,
}

/// Result of [`ChangeDetector::detect`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectorOutcome {
    pub mode: DetectionMode,
    pub repo_ref: String,
    pub base_commit: String,
    pub head_commit: String,
    /// Sorted, deduplicated; both sides of a rename are included.
    pub changed_paths: Vec<String>,
    pub changed_files: Vec<ChangedFile>,
    pub ambiguity_reasons: Vec<AmbiguityReason>,
}

/// Compares a baseline commit against the current default-branch head.
pub struct ChangeDetector {
    host: Arc<dyn SourceHost>,
    per_page: u32,
    file_cap: usize,
}

impl ChangeDetector {
    pub fn new(host: Arc<dyn SourceHost>) -> Self {
        Self {
            host,
            per_page: DEFAULT_COMPARE_PER_PAGE,
            file_cap: DEFAULT_COMPARE_FILE_CAP,
        }
    }

    pub fn with_per_page(mut self, per_page: u32) -> Self {
        self.per_page = per_page.max(1);
        self
    }

    pub fn with_file_cap(mut self, file_cap: usize) -> Self {
        self.file_cap = file_cap.max(1);
        self
    }

    /// Detect what changed in `repo_ref` since `baseline`.
    ///
    /// Host failures propagate; ambiguous compare results never do, they
    /// become [`DetectionMode::FullRebuildRequired`] with reasons.
    #[instrument(skip_all, fields(repo = repo_ref, host = self.host.name()))]
    pub async fn detect(
        &self,
        repo_ref: &str,
        baseline: &FreshnessBaseline,
    ) -> Result<DetectorOutcome> {
        let parsed = parse_repo_ref(repo_ref)?;
        let expected = parse_repo_ref(&baseline.repo_ref)?;
        if parsed.full_name != expected.full_name {
            return Err(RepoDocError::RepoMismatch {
                expected: expected.full_name,
                actual: parsed.full_name,
            });
        }

        let default_branch = self
            .host
            .get_default_branch(&parsed.owner, &parsed.repo)
            .await?;
        let head_commit = self
            .host
            .get_branch_head_commit(&parsed.owner, &parsed.repo, &default_branch)
            .await?
            .to_lowercase();
        let base_commit = baseline.last_delivery_commit.trim().to_lowercase();

        if head_commit == base_commit {
            info!(commit = %head_commit, "head matches baseline, nothing to do");
            return Ok(DetectorOutcome {
                mode: DetectionMode::Noop,
                repo_ref: parsed.full_name,
                base_commit,
                head_commit,
                changed_paths: Vec::new(),
                changed_files: Vec::new(),
                ambiguity_reasons: Vec::new(),
            });
        }

        let compare = self
            .host
            .compare_commits(
                &parsed.owner,
                &parsed.repo,
                &base_commit,
                &head_commit,
                1,
                self.per_page,
            )
            .await?;

        let mut reasons = BTreeSet::new();
        let mut changed_files = Vec::new();
        let mut changed_paths = BTreeSet::new();

        match compare.files.as_ref().and_then(Value::as_array) {
            None => {
                reasons.insert(AmbiguityReason::CompareFileListMissing);
            }
            Some(entries) => {
                if entries.len() >= self.file_cap {
                    reasons.insert(AmbiguityReason::CompareFileCapReached);
                }
                for entry in entries {
                    match normalize_entry(entry) {
                        Some(file) => {
                            changed_paths.insert(file.path.clone());
                            if let Some(previous) = &file.previous_path {
                                changed_paths.insert(previous.clone());
                            }
                            changed_files.push(file);
                        }
                        None => {
                            debug!(entry = %entry, "unusable compare entry");
                            reasons.insert(AmbiguityReason::CompareFileEntryInvalid);
                        }
                    }
                }
            }
        }

        if compare.has_next_page {
            reasons.insert(AmbiguityReason::ComparePaginated);
        }

        match compare.status.as_deref().map(str::trim) {
            None | Some("") => {
                reasons.insert(AmbiguityReason::CompareStatusUnknown);
            }
            Some("diverged") => {
                reasons.insert(AmbiguityReason::CompareStatusDiverged);
            }
            Some(_) => {}
        }

        let mode = if reasons.is_empty() {
            DetectionMode::IncrementalCandidate
        } else {
            DetectionMode::FullRebuildRequired
        };

        info!(
            base = %base_commit,
            head = %head_commit,
            changed = changed_paths.len(),
            ambiguous = reasons.len(),
            ?mode,
            "compare evaluated"
        );

        Ok(DetectorOutcome {
            mode,
            repo_ref: parsed.full_name,
            base_commit,
            head_commit,
            changed_paths: changed_paths.into_iter().collect(),
            changed_files,
            ambiguity_reasons: reasons.into_iter().collect(),
        })
    }
}

/// Turn one raw compare entry into a [`ChangedFile`].
///
/// Requires a usable `filename` and a known `status`; renames also need
/// `previous_filename`.
fn normalize_entry(entry: &Value) -> Option<ChangedFile> {
    let path = entry
        .get("filename")
        .and_then(Value::as_str)
        .and_then(normalize_repo_path)?;
    let status = entry
        .get("status")
        .and_then(Value::as_str)
        .and_then(ChangeStatus::parse)?;

    let previous_path = match status {
        ChangeStatus::Renamed => Some(
            entry
                .get("previous_filename")
                .and_then(Value::as_str)
                .and_then(normalize_repo_path)?,
        ),
        _ => None,
    };

    Some(ChangedFile {
        path,
        status,
        previous_path,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use repodoc_host::{ScriptedCompare, ScriptedHost};
    use serde_json::json;

    const BASE: &str = "aaaaaaa";
    const HEAD: &str = "bbbbbbb";

    fn baseline(commit: &str) -> FreshnessBaseline {
        FreshnessBaseline {
            repo_ref: "acme/widget".into(),
            last_delivery_commit: commit.into(),
            etag: None,
            section_evidence_index: vec![],
        }
    }

    fn host_with(compare: ScriptedCompare) -> Arc<ScriptedHost> {
        Arc::new(
            ScriptedHost::new()
                .with_repo("acme/widget", "main")
                .with_branch("acme/widget", "main", HEAD)
                .with_compare(
                    "acme/widget",
                    ScriptedCompare {
                        base: BASE.into(),
                        head: HEAD.into(),
                        ..compare
                    },
                ),
        )
    }

    fn ahead(files: Value) -> ScriptedCompare {
        ScriptedCompare {
            status: Some("ahead".into()),
            files: Some(files),
            ..Default::default()
        }
    }

    async fn detect(host: &Arc<ScriptedHost>, commit: &str) -> DetectorOutcome {
        ChangeDetector::new(host.clone())
            .detect("Acme/Widget", &baseline(commit))
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn noop_short_circuits_compare() {
        let host = host_with(ahead(json!([])));
        let outcome = detect(&host, "BBBBBBB").await;

        assert_eq!(outcome.mode, DetectionMode::Noop);
        assert!(outcome.changed_paths.is_empty());
        assert_eq!(outcome.head_commit, HEAD);
        assert_eq!(host.compare_calls(), 0);
    }

    #[tokio::test]
    async fn rename_contributes_both_paths() {
        let host = host_with(ahead(json!([
            {"filename": "src/new.ts", "status": "renamed", "previous_filename": "src/old.ts"},
            {"filename": "README.md", "status": "modified"},
            {"filename": "README.md", "status": "modified"},
        ])));
        let outcome = detect(&host, BASE).await;

        assert_eq!(outcome.mode, DetectionMode::IncrementalCandidate);
        assert_eq!(outcome.changed_paths, vec!["README.md", "src/new.ts", "src/old.ts"]);
        assert_eq!(outcome.changed_files[0].previous_path.as_deref(), Some("src/old.ts"));
        assert!(outcome.ambiguity_reasons.is_empty());
        assert_eq!(host.compare_calls(), 1);
    }

    #[tokio::test]
    async fn next_page_forces_full_rebuild() {
        let host = host_with(ScriptedCompare {
            has_next_page: true,
            ..ahead(json!([{"filename": "src/a.ts", "status": "modified"}]))
        });
        let outcome = detect(&host, BASE).await;

        assert_eq!(outcome.mode, DetectionMode::FullRebuildRequired);
        assert_eq!(outcome.ambiguity_reasons, vec![AmbiguityReason::ComparePaginated]);
        assert_eq!(outcome.changed_paths, vec!["src/a.ts"]);
    }

    #[tokio::test]
    async fn file_cap_is_ambiguous() {
        let files: Vec<Value> = (0..3)
            .map(|i| json!({"filename": format!("f{i}.md"), "status": "added"}))
            .collect();
        let host = host_with(ahead(Value::Array(files)));
        let outcome = ChangeDetector::new(host.clone())
            .with_file_cap(3)
            .detect("acme/widget", &baseline(BASE))
            .await
            .unwrap();

        assert_eq!(
            outcome.ambiguity_reasons,
            vec![AmbiguityReason::CompareFileCapReached]
        );
    }

    #[tokio::test]
    async fn status_and_list_problems_accumulate() {
        let host = host_with(ScriptedCompare {
            status: Some("diverged".into()),
            files: Some(json!({"not": "an array"})),
            ..Default::default()
        });
        let outcome = detect(&host, BASE).await;
        assert_eq!(
            outcome.ambiguity_reasons,
            vec![
                AmbiguityReason::CompareFileListMissing,
                AmbiguityReason::CompareStatusDiverged,
            ]
        );

        let host = host_with(ScriptedCompare {
            status: None,
            files: Some(json!([
                {"filename": "ok.md", "status": "added"},
                {"filename": "", "status": "added"},
                {"filename": "moved.md", "status": "renamed"},
                {"filename": "odd.md", "status": "exploded"},
            ])),
            ..Default::default()
        });
        let outcome = detect(&host, BASE).await;
        assert_eq!(outcome.mode, DetectionMode::FullRebuildRequired);
        assert_eq!(
            outcome.ambiguity_reasons,
            vec![
                AmbiguityReason::CompareStatusUnknown,
                AmbiguityReason::CompareFileEntryInvalid,
            ]
        );
        assert_eq!(outcome.changed_paths, vec!["ok.md"]);
    }

    #[tokio::test]
    async fn mismatched_baseline_is_error() {
        let host = host_with(ahead(json!([])));
        let mut other = baseline(BASE);
        other.repo_ref = "acme/gadget".into();

        let err = ChangeDetector::new(host.clone())
            .detect("acme/widget", &other)
            .await
            .unwrap_err();
        assert!(matches!(err, RepoDocError::RepoMismatch { .. }));
        assert_eq!(host.compare_calls(), 0);
    }

    #[tokio::test]
    async fn host_errors_propagate() {
        let host = Arc::new(ScriptedHost::new().with_repo("acme/widget", "main"));
        let err = ChangeDetector::new(host)
            .detect("acme/widget", &baseline(BASE))
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("REF_NOT_FOUND"));
    }

    #[test]
    fn reasons_serialize_as_codes() {
        let json = serde_json::to_string(&AmbiguityReason::CompareFileCapReached).unwrap();
        assert_eq!(json, "\"COMPARE_FILE_CAP_REACHED\"");
        let json = serde_json::to_string(&DetectionMode::FullRebuildRequired).unwrap();
        assert_eq!(json, "\"full-rebuild-required\"");
    }
}
