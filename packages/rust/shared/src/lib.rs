//! Shared types, error model, and configuration for repodoc.
//!
//! This crate is the foundation depended on by all other repodoc crates.
//! It provides:
//! - [`RepoDocError`]: the unified error type
//! - Repository reference parsing ([`parse_repo_ref`], [`normalize_ref`], [`infer_ref_type`])
//! - Persisted types ([`SnapshotManifest`], [`FreshnessStateFile`], [`FreshnessBaseline`])
//! - Configuration ([`AppConfig`], config loading)
//! - Advisory file locking ([`FileLock`])

pub mod config;
pub mod error;
pub mod lock;
pub mod repo_ref;
pub mod types;

// Re-export public API at crate root for ergonomic imports.
pub use config::{
    AppConfig, FreshnessConfig, HostConfig, MaterializeStrategy, ObjectStorageConfig,
    ObjectStorageKind, SnapshotConfig, config_dir, config_file_path, init_config, load_config,
    load_config_from, read_token,
};
pub use error::{HostErrorCode, RepoDocError, Result};
pub use lock::FileLock;
pub use repo_ref::{
    ParsedRepoRef, RefType, infer_ref_type, normalize_ref, normalize_repo_path, parse_repo_ref,
};
pub use types::{
    ChangeStatus, ChangedFile, FRESHNESS_SCHEMA_VERSION, FreshnessBaseline, FreshnessStateFile,
    MANIFEST_FILE_NAME, ManifestFileEntry, SectionEvidence, SnapshotManifest, VCS_METADATA_DIRS,
};
