//! Freshness tracking: persisted baselines, change detection against the
//! host, and impact mapping onto documentation sections.
//!
//! Policy throughout: anything resolvable by doing more work (a full
//! rebuild) degrades with a structured reason; anything that would mean
//! trusting possibly-stale data fails loudly.

pub mod detector;
pub mod impact;
pub mod state;

pub use detector::{
    AmbiguityReason, ChangeDetector, DEFAULT_COMPARE_FILE_CAP, DEFAULT_COMPARE_PER_PAGE,
    DetectionMode, DetectorOutcome,
};
pub use impact::{ImpactMappingResult, ImpactMode, map_changed_paths_to_impacted_sections};
pub use state::{
    RemoteStateMirror, canonicalize_state, load_freshness_state, render_state,
    save_freshness_state, update_freshness_state,
};
