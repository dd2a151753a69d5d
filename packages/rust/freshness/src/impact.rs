//! Map changed paths onto the sections whose evidence they touch.

use std::collections::{BTreeMap, BTreeSet};

use serde::Serialize;

use repodoc_shared::{SectionEvidence, normalize_repo_path};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ImpactMode {
    ImpactMapped,
    FullRebuildRequired,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ImpactMappingResult {
    pub mode: ImpactMode,
    pub impacted_section_ids: Vec<String>,
    pub unmatched_changed_paths: Vec<String>,
}

/// Resolve `changed_paths` against the evidence index.
///
/// An empty change set impacts nothing. A non-empty one that impacts no
/// section is treated as a stale index and forces a full rebuild.
pub fn map_changed_paths_to_impacted_sections(
    changed_paths: &[String],
    section_evidence_index: &[SectionEvidence],
) -> ImpactMappingResult {
    let changed: BTreeSet<String> = changed_paths
        .iter()
        .filter_map(|p| normalize_repo_path(p))
        .collect();

    if changed.is_empty() {
        return ImpactMappingResult {
            mode: ImpactMode::ImpactMapped,
            impacted_section_ids: Vec::new(),
            unmatched_changed_paths: Vec::new(),
        };
    }

    // path -> sections citing it
    let mut citations: BTreeMap<String, BTreeSet<&str>> = BTreeMap::new();
    for section in section_evidence_index {
        for path in section.repo_paths.iter().filter_map(|p| normalize_repo_path(p)) {
            citations
                .entry(path)
                .or_default()
                .insert(section.section_id.as_str());
        }
    }

    let mut impacted = BTreeSet::new();
    let mut unmatched = Vec::new();
    for path in changed {
        match citations.get(&path) {
            Some(sections) => impacted.extend(sections.iter().map(|s| s.to_string())),
            None => unmatched.push(path),
        }
    }

    let mode = if impacted.is_empty() {
        ImpactMode::FullRebuildRequired
    } else {
        ImpactMode::ImpactMapped
    };

    ImpactMappingResult {
        mode,
        impacted_section_ids: impacted.into_iter().collect(),
        unmatched_changed_paths: unmatched,
    }
}
