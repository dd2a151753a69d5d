//! Caller-facing change detection: baseline lookup, compare, impact mapping.
//!
//! Folds the detector outcome and impact mapping into one report whose
//! `status` tells the delivery stage how much work to schedule.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use tracing::{info, instrument};

use repodoc_freshness::{
    AmbiguityReason, ChangeDetector, DetectionMode, ImpactMode, RemoteStateMirror,
    load_freshness_state, map_changed_paths_to_impacted_sections,
};
use repodoc_host::SourceHost;
use repodoc_shared::{RepoDocError, Result, parse_repo_ref};

use crate::pipeline::ProgressReporter;

// ---------------------------------------------------------------------------
// Detect config & report
// ---------------------------------------------------------------------------

/// Configuration for [`detect_changes`].
#[derive(Clone)]
pub struct DetectConfig {
    /// `owner/repo` to check.
    pub repo_ref: String,
    /// Local freshness state document.
    pub state_path: PathBuf,
    /// Optional remote mirror of the state document.
    pub remote: Option<RemoteStateMirror>,
    /// `per_page` for the single compare request.
    pub compare_per_page: u32,
    /// File count treated as a truncated compare.
    pub compare_file_cap: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DetectStatus {
    Noop,
    Incremental,
    FullRebuild,
}

/// Why a full rebuild was chosen.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FullRebuildReason {
    /// No baseline has ever been delivered for the repository.
    BaselineMissing,
    /// The compare result carried ambiguity reasons.
    CompareAmbiguous,
    /// Changed paths matched no section evidence.
    ImpactUnmapped,
}

/// Result of [`detect_changes`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DetectReport {
    pub status: DetectStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<FullRebuildReason>,
    pub repo_ref: String,
    pub base_commit: Option<String>,
    pub head_commit: Option<String>,
    pub changed_paths: Vec<String>,
    pub impacted_section_ids: Vec<String>,
    pub unmatched_changed_paths: Vec<String>,
    pub ambiguity_reasons: Vec<AmbiguityReason>,
}

impl DetectReport {
    fn baseline_missing(repo_ref: String) -> Self {
        Self {
            status: DetectStatus::FullRebuild,
            reason: Some(FullRebuildReason::BaselineMissing),
            repo_ref,
            base_commit: None,
            head_commit: None,
            changed_paths: Vec::new(),
            impacted_section_ids: Vec::new(),
            unmatched_changed_paths: Vec::new(),
            ambiguity_reasons: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Detect flow
// ---------------------------------------------------------------------------

/// Decide whether `config.repo_ref` needs no work, an incremental update or
/// a full rebuild.
///
/// A missing baseline never touches the host. Host failures and corrupt
/// state propagate; they are never folded into a default report.
#[instrument(skip_all, fields(repo = %config.repo_ref))]
pub async fn detect_changes(
    config: &DetectConfig,
    host: Arc<dyn SourceHost>,
    progress: &dyn ProgressReporter,
) -> Result<DetectReport> {
    let start = Instant::now();

    let parsed = parse_repo_ref(&config.repo_ref)?;
    if parsed.requested_ref.is_some() {
        return Err(RepoDocError::invalid_reference(
            &config.repo_ref,
            "detection always tracks the default branch; drop the '@ref'",
        ));
    }
    let repo_ref = parsed.full_name;

    progress.phase("Loading freshness state");
    let state = load_freshness_state(&config.state_path, config.remote.as_ref()).await?;

    let Some(baseline) = state.baseline(&repo_ref) else {
        info!(repo = %repo_ref, "no baseline recorded, full rebuild required");
        return Ok(DetectReport::baseline_missing(repo_ref));
    };

    progress.phase("Comparing against head");
    let outcome = ChangeDetector::new(host)
        .with_per_page(config.compare_per_page)
        .with_file_cap(config.compare_file_cap)
        .detect(&repo_ref, baseline)
        .await?;

    let mut report = DetectReport {
        status: DetectStatus::Noop,
        reason: None,
        repo_ref: outcome.repo_ref,
        base_commit: Some(outcome.base_commit),
        head_commit: Some(outcome.head_commit),
        changed_paths: outcome.changed_paths,
        impacted_section_ids: Vec::new(),
        unmatched_changed_paths: Vec::new(),
        ambiguity_reasons: outcome.ambiguity_reasons,
    };

    match outcome.mode {
        DetectionMode::Noop => {}
        DetectionMode::FullRebuildRequired => {
            report.status = DetectStatus::FullRebuild;
            report.reason = Some(FullRebuildReason::CompareAmbiguous);
        }
        DetectionMode::IncrementalCandidate => {
            progress.phase("Mapping impact");
            let impact = map_changed_paths_to_impacted_sections(
                &report.changed_paths,
                &baseline.section_evidence_index,
            );
            report.impacted_section_ids = impact.impacted_section_ids;
            report.unmatched_changed_paths = impact.unmatched_changed_paths;
            match impact.mode {
                ImpactMode::ImpactMapped => report.status = DetectStatus::Incremental,
                ImpactMode::FullRebuildRequired => {
                    report.status = DetectStatus::FullRebuild;
                    report.reason = Some(FullRebuildReason::ImpactUnmapped);
                }
            }
        }
    }

    info!(
        status = ?report.status,
        reason = ?report.reason,
        changed = report.changed_paths.len(),
        impacted = report.impacted_section_ids.len(),
        elapsed_ms = start.elapsed().as_millis() as u64,
        "detection complete"
    );

    Ok(report)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::SilentProgress;
    use repodoc_freshness::save_freshness_state;
    use repodoc_host::{ScriptedCompare, ScriptedHost};
    use repodoc_shared::{FreshnessBaseline, FreshnessStateFile, SectionEvidence};
    use serde_json::json;

    const BASE: &str = "aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa";
    const HEAD: &str = "bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb";

    struct Env {
        dir: PathBuf,
        config: DetectConfig,
    }

    impl Drop for Env {
        fn drop(&mut self) {
            std::fs::remove_dir_all(&self.dir).ok();
        }
    }

    async fn env_with(baseline: Option<FreshnessBaseline>) -> Env {
        let dir = std::env::temp_dir().join(format!("repodoc-detect-{}", uuid::Uuid::now_v7()));
        let state_path = dir.join("state.json");
        if let Some(baseline) = baseline {
            let state = FreshnessStateFile::default().upsert(baseline);
            save_freshness_state(&state_path, &state, None).await.unwrap();
        }
        Env {
            dir,
            config: DetectConfig {
                repo_ref: "acme/widget".into(),
                state_path,
                remote: None,
                compare_per_page: 100,
                compare_file_cap: 300,
            },
        }
    }

    fn baseline(commit: &str) -> FreshnessBaseline {
        FreshnessBaseline {
            repo_ref: "acme/widget".into(),
            last_delivery_commit: commit.into(),
            etag: None,
            section_evidence_index: vec![
                SectionEvidence {
                    section_id: "sec-2".into(),
                    repo_paths: vec!["src/core/service.ts".into()],
                },
                SectionEvidence {
                    section_id: "sec-1".into(),
                    repo_paths: vec!["src/ui/page.tsx".into()],
                },
            ],
        }
    }

    fn host(files: serde_json::Value, has_next_page: bool) -> Arc<ScriptedHost> {
        Arc::new(
            ScriptedHost::new()
                .with_repo("acme/widget", "main")
                .with_branch("acme/widget", "main", HEAD)
                .with_compare(
                    "acme/widget",
                    ScriptedCompare {
                        base: BASE.into(),
                        head: HEAD.into(),
                        status: Some("ahead".into()),
                        files: Some(files),
                        has_next_page,
                    },
                ),
        )
    }

    #[tokio::test]
    async fn missing_baseline_skips_host() {
        let env = env_with(None).await;
        let host = host(json!([]), false);

        let report = detect_changes(&env.config, host.clone(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.status, DetectStatus::FullRebuild);
        assert_eq!(report.reason, Some(FullRebuildReason::BaselineMissing));
        assert_eq!(host.compare_calls(), 0);

        let json = serde_json::to_value(&report).unwrap();
        assert_eq!(json["status"], "full-rebuild");
        assert_eq!(json["reason"], "BASELINE_MISSING");
    }

    #[tokio::test]
    async fn impacted_sections_are_sorted() {
        let env = env_with(Some(baseline(BASE))).await;
        let host = host(
            json!([
                {"filename": "src/core/service.ts", "status": "modified"},
                {"filename": "src/ui/page.tsx", "status": "modified"},
            ]),
            false,
        );

        let report = detect_changes(&env.config, host, &SilentProgress).await.unwrap();
        assert_eq!(report.status, DetectStatus::Incremental);
        assert_eq!(report.reason, None);
        assert_eq!(report.impacted_section_ids, vec!["sec-1", "sec-2"]);
        assert_eq!(report.head_commit.as_deref(), Some(HEAD));
    }

    #[tokio::test]
    async fn head_at_baseline_is_noop() {
        let env = env_with(Some(baseline(HEAD))).await;
        let host = host(json!([]), false);

        let report = detect_changes(&env.config, host.clone(), &SilentProgress)
            .await
            .unwrap();
        assert_eq!(report.status, DetectStatus::Noop);
        assert!(report.changed_paths.is_empty());
        assert!(report.impacted_section_ids.is_empty());
        assert_eq!(host.compare_calls(), 0);

        let json = serde_json::to_value(&report).unwrap();
        assert!(json.get("reason").is_none());
    }

    #[tokio::test]
    async fn pagination_dominates_matches() {
        let env = env_with(Some(baseline(BASE))).await;
        let host = host(
            json!([{"filename": "src/ui/page.tsx", "status": "modified"}]),
            true,
        );

        let report = detect_changes(&env.config, host, &SilentProgress).await.unwrap();
        assert_eq!(report.status, DetectStatus::FullRebuild);
        assert_eq!(report.reason, Some(FullRebuildReason::CompareAmbiguous));
        assert_eq!(report.ambiguity_reasons, vec![AmbiguityReason::ComparePaginated]);
        assert!(report.impacted_section_ids.is_empty());
    }

    #[tokio::test]
    async fn unmapped_change_forces_rebuild() {
        let env = env_with(Some(baseline(BASE))).await;
        let host = host(
            json!([{"filename": "docs/changelog.md", "status": "added"}]),
            false,
        );

        let report = detect_changes(&env.config, host, &SilentProgress).await.unwrap();
        assert_eq!(report.status, DetectStatus::FullRebuild);
        assert_eq!(report.reason, Some(FullRebuildReason::ImpactUnmapped));
        assert_eq!(report.unmatched_changed_paths, vec!["docs/changelog.md"]);
    }

    #[tokio::test]
    async fn corrupt_state_is_not_missing_baseline() {
        let env = env_with(None).await;
        std::fs::create_dir_all(&env.dir).unwrap();
        std::fs::write(&env.config.state_path, "{").unwrap();

        let err = detect_changes(&env.config, host(json!([]), false), &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("STATE_CORRUPT"));
    }

    #[tokio::test]
    async fn ref_suffix_is_rejected() {
        let mut env = env_with(None).await;
        env.config.repo_ref = "acme/widget@main".into();

        let err = detect_changes(&env.config, host(json!([]), false), &SilentProgress)
            .await
            .unwrap_err();
        assert_eq!(err.code(), Some("INVALID_REFERENCE"));
    }
}
