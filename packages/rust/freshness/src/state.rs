//! Durable freshness state: canonical JSON on disk, optionally mirrored to
//! object storage.
//!
//! A missing document is an empty state. A document that exists but does
//! not parse or validate is [`RepoDocError::StateCorrupt`], never "no
//! baseline".

use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use repodoc_shared::{
    FRESHNESS_SCHEMA_VERSION, FileLock, FreshnessBaseline, FreshnessStateFile, RepoDocError,
    Result, SectionEvidence, normalize_repo_path, parse_repo_ref,
};
use repodoc_storage::ObjectStore;

/// Remote copy of the state document.
#[derive(Clone)]
pub struct RemoteStateMirror {
    pub store: Arc<dyn ObjectStore>,
    pub key: String,
    /// The remote is the only source of truth: a failed remote read yields
    /// the empty state instead of the local file.
    pub exclusive: bool,
}

impl RemoteStateMirror {
    fn location(&self) -> String {
        format!("{}:{}", self.store.name(), self.key)
    }
}

// ---------------------------------------------------------------------------
// Canonicalization
// ---------------------------------------------------------------------------

fn canonical_repo_key(raw: &str) -> std::result::Result<String, String> {
    let parsed = parse_repo_ref(raw).map_err(|e| e.to_string())?;
    if parsed.requested_ref.is_some() {
        return Err(format!("repository key '{raw}' must not carry a ref"));
    }
    Ok(parsed.full_name)
}

/// Entries sharing a section id are kept; they order by their joined paths.
fn canonical_evidence(index: Vec<SectionEvidence>) -> Vec<SectionEvidence> {
    let mut entries: Vec<(String, SectionEvidence)> = index
        .into_iter()
        .map(|entry| {
            let paths: BTreeSet<String> = entry
                .repo_paths
                .iter()
                .filter_map(|p| normalize_repo_path(p))
                .collect();
            let repo_paths: Vec<String> = paths.into_iter().collect();
            let signature = repo_paths.join("|");
            let evidence = SectionEvidence {
                section_id: entry.section_id,
                repo_paths,
            };
            (signature, evidence)
        })
        .collect();
    entries.sort_by(|(sig_a, a), (sig_b, b)| {
        a.section_id.cmp(&b.section_id).then_with(|| sig_a.cmp(sig_b))
    });
    entries.into_iter().map(|(_, evidence)| evidence).collect()
}

fn canonicalize(state: FreshnessStateFile) -> std::result::Result<FreshnessStateFile, String> {
    if state.schema_version != FRESHNESS_SCHEMA_VERSION {
        return Err(format!(
            "unsupported schema_version {} (expected {FRESHNESS_SCHEMA_VERSION})",
            state.schema_version
        ));
    }

    let mut repos = BTreeMap::new();
    for (key, baseline) in state.repos {
        let canonical = canonical_repo_key(&key)?;
        let declared = canonical_repo_key(&baseline.repo_ref)?;
        if declared != canonical {
            return Err(format!(
                "key '{key}' holds baseline for '{}'",
                baseline.repo_ref
            ));
        }

        let last_delivery_commit = baseline.last_delivery_commit.trim().to_lowercase();
        if last_delivery_commit.is_empty() {
            return Err(format!("baseline '{canonical}' has an empty last_delivery_commit"));
        }

        let normalized = FreshnessBaseline {
            repo_ref: canonical.clone(),
            last_delivery_commit,
            etag: baseline.etag,
            section_evidence_index: canonical_evidence(baseline.section_evidence_index),
        };
        if repos.insert(canonical.clone(), normalized).is_some() {
            return Err(format!("duplicate repository key '{canonical}'"));
        }
    }

    Ok(FreshnessStateFile {
        schema_version: FRESHNESS_SCHEMA_VERSION,
        repos,
    })
}

/// Validate `state` and bring it to canonical form.
///
/// Keys and commits are lowercased, evidence entries are ordered by section
/// id and path signature, and paths are normalized, deduplicated and sorted.
pub fn canonicalize_state(state: FreshnessStateFile) -> Result<FreshnessStateFile> {
    canonicalize(state).map_err(RepoDocError::validation)
}

/// Canonical serialized form: pretty JSON plus a trailing newline.
pub fn render_state(state: &FreshnessStateFile) -> Result<String> {
    let canonical = canonicalize_state(state.clone())?;
    let mut json = serde_json::to_string_pretty(&canonical)
        .map_err(|e| RepoDocError::validation(format!("JSON serialization failed: {e}")))?;
    json.push('\n');
    Ok(json)
}

fn parse_document(bytes: &[u8], origin: &str) -> Result<FreshnessStateFile> {
    let state: FreshnessStateFile = serde_json::from_slice(bytes)
        .map_err(|e| RepoDocError::state_corrupt(origin, format!("invalid JSON: {e}")))?;
    canonicalize(state).map_err(|message| RepoDocError::state_corrupt(origin, message))
}

// ---------------------------------------------------------------------------
// Load / save
// ---------------------------------------------------------------------------

async fn load_local(path: &Path) -> Result<FreshnessStateFile> {
    match tokio::fs::read(path).await {
        Ok(bytes) => parse_document(&bytes, &path.display().to_string()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "no freshness state yet");
            Ok(FreshnessStateFile::default())
        }
        Err(e) => Err(RepoDocError::io(path, e)),
    }
}

/// Load the state, preferring the remote mirror when one is configured.
#[instrument(skip_all, fields(path = %path.display(), remote = remote.is_some()))]
pub async fn load_freshness_state(
    path: &Path,
    remote: Option<&RemoteStateMirror>,
) -> Result<FreshnessStateFile> {
    let Some(remote) = remote else {
        return load_local(path).await;
    };

    match remote.store.get(&remote.key).await {
        Ok(bytes) => parse_document(&bytes, &remote.location()),
        Err(e) if remote.exclusive => {
            if e.is_object_not_found() {
                debug!(key = %remote.key, "no remote freshness state yet");
            } else {
                warn!(
                    key = %remote.key,
                    error = %e,
                    "remote state unavailable, using empty state"
                );
            }
            Ok(FreshnessStateFile::default())
        }
        Err(e) => {
            if !e.is_object_not_found() {
                warn!(
                    key = %remote.key,
                    error = %e,
                    "remote state unavailable, reading local copy"
                );
            }
            load_local(path).await
        }
    }
}

/// Write the canonical document locally, then upload it to the mirror.
#[instrument(skip_all, fields(path = %path.display(), repos = state.repos.len()))]
pub async fn save_freshness_state(
    path: &Path,
    state: &FreshnessStateFile,
    remote: Option<&RemoteStateMirror>,
) -> Result<()> {
    let json = render_state(state)?;

    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| RepoDocError::io(parent, e))?;
    }

    // Write to temp file first, then rename into place
    let temp = temp_path(path);
    tokio::fs::write(&temp, json.as_bytes())
        .await
        .map_err(|e| RepoDocError::io(&temp, e))?;
    tokio::fs::rename(&temp, path)
        .await
        .map_err(|e| RepoDocError::io(path, e))?;

    if let Some(remote) = remote {
        remote.store.put(&remote.key, json.into_bytes()).await?;
        debug!(key = %remote.key, "mirrored freshness state");
    }

    info!("freshness state saved");
    Ok(())
}

/// Locked read-modify-write of the state document.
///
/// Local writers are serialized on `{path}.lock` and the document is
/// re-read under the lock, so concurrent updates to different repositories
/// both survive. The remote mirror is still last-writer-wins.
pub async fn update_freshness_state<F>(
    path: &Path,
    remote: Option<&RemoteStateMirror>,
    update: F,
) -> Result<FreshnessStateFile>
where
    F: FnOnce(FreshnessStateFile) -> FreshnessStateFile,
{
    let _lock = FileLock::acquire(lock_path(path)).await?;
    let current = load_freshness_state(path, remote).await?;
    let next = canonicalize_state(update(current))?;
    save_freshness_state(path, &next, remote).await?;
    Ok(next)
}

fn with_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut os = path.as_os_str().to_owned();
    os.push(suffix);
    PathBuf::from(os)
}

fn lock_path(path: &Path) -> PathBuf {
    with_suffix(path, ".lock")
}

fn temp_path(path: &Path) -> PathBuf {
    with_suffix(path, &format!(".{}.tmp", Uuid::now_v7()))
}
