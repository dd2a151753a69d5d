//! Core orchestration for repodoc.
//!
//! Ties reference resolution, snapshot materialization and freshness
//! detection into the end-to-end flows the CLI exposes
//! ([`snapshot_repo`], [`detect_changes`]).

pub mod detect;
pub mod pipeline;
pub mod services;

pub use detect::{DetectConfig, DetectReport, DetectStatus, FullRebuildReason, detect_changes};
pub use pipeline::{ProgressReporter, SilentProgress, SnapshotRepoConfig, snapshot_repo};
pub use services::{Services, github_host, state_mirror};
